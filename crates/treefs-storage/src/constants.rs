//! Storage node constants.

/// Chunk size used when pulling a file from another node (1 MiB).
pub const DEFAULT_COPY_CHUNK_SIZE: usize = 1024 * 1024;

/// Largest byte count a single read or write call may carry.
pub const MAX_IO_LEN: i64 = i32::MAX as i64;

/// Marks the temporary sibling a copy is pulled into before it replaces
/// the target. Scans skip files carrying it.
pub const COPY_TEMP_MARKER: &str = ".treefs-copy.";
