//! Hierarchical per-path lock table.
//!
//! Each path has an explicit lock state machine: free, shared by `n` holders,
//! or exclusive. Requests that cannot be granted join a FIFO queue on the
//! path and are woken in order as holders release. Consecutive shared
//! requests at the head of a queue are granted together; a shared request
//! never jumps ahead of a queued exclusive request.
//!
//! Locking a path means share-locking every ancestor from the root down and
//! then taking the requested mode on the path itself. Multi-path requests are
//! merged into one plan and acquired in ascending [`Path`] order. Since every
//! ancestor sorts before its descendants, this is the same root-to-leaf order
//! a single chain uses, so two callers can never wait on each other in a
//! cycle.
//!
//! The table's bookkeeping lives behind a `parking_lot::Mutex` that is never
//! held across an await.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use treefs_types::Path;

/// Lock mode requested on a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// Concurrent readers.
    Shared,
    /// A single writer, excluding everyone else.
    Exclusive,
}

impl LockMode {
    pub fn from_exclusive(exclusive: bool) -> Self {
        if exclusive {
            LockMode::Exclusive
        } else {
            LockMode::Shared
        }
    }
}

/// Current holders of a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockState {
    #[default]
    Free,
    Shared(usize),
    Exclusive,
}

impl LockState {
    fn admits(&self, mode: LockMode) -> bool {
        match (self, mode) {
            (LockState::Free, _) => true,
            (LockState::Shared(_), LockMode::Shared) => true,
            _ => false,
        }
    }

    fn grant(&mut self, mode: LockMode) {
        *self = match (*self, mode) {
            (LockState::Shared(n), LockMode::Shared) => LockState::Shared(n + 1),
            (_, LockMode::Shared) => LockState::Shared(1),
            (_, LockMode::Exclusive) => LockState::Exclusive,
        };
    }

    fn holds(&self, mode: LockMode) -> bool {
        matches!(
            (self, mode),
            (LockState::Shared(_), LockMode::Shared) | (LockState::Exclusive, LockMode::Exclusive)
        )
    }

    fn release(&mut self, mode: LockMode) {
        *self = match (*self, mode) {
            (LockState::Shared(n), LockMode::Shared) if n > 1 => LockState::Shared(n - 1),
            _ => LockState::Free,
        };
    }
}

struct Waiter {
    ticket: u64,
    mode: LockMode,
    grant: oneshot::Sender<()>,
}

#[derive(Default)]
struct Entry {
    state: LockState,
    queue: VecDeque<Waiter>,
}

impl Entry {
    fn is_idle(&self) -> bool {
        self.state == LockState::Free && self.queue.is_empty()
    }

    /// Hand the lock to as many queued waiters as the state admits, in order.
    fn promote(&mut self) {
        while let Some(front) = self.queue.front() {
            if !self.state.admits(front.mode) {
                break;
            }
            let Some(waiter) = self.queue.pop_front() else {
                break;
            };
            self.state.grant(waiter.mode);
            // The receiver is alive: a dropped request removes itself from
            // the queue under the same mutex before its receiver goes away.
            let _ = waiter.grant.send(());
        }
    }
}

#[derive(Default)]
struct Inner {
    entries: HashMap<Path, Entry>,
    next_ticket: u64,
}

/// Per-path lock table.
#[derive(Default)]
pub struct LockTable {
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for LockTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockTable")
            .field("entries", &self.inner.lock().entries.len())
            .finish()
    }
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock a single path, ignoring its ancestors.
    ///
    /// Building block for [`LockTable::lock`]; callers that need hierarchy
    /// semantics should use that instead.
    pub async fn acquire(&self, path: &Path, mode: LockMode) {
        let (ticket, rx) = {
            let mut inner = self.inner.lock();
            let ticket = inner.next_ticket;
            inner.next_ticket += 1;

            let entry = inner.entries.entry(path.clone()).or_default();
            if entry.queue.is_empty() && entry.state.admits(mode) {
                entry.state.grant(mode);
                return;
            }

            let (tx, rx) = oneshot::channel();
            entry.queue.push_back(Waiter {
                ticket,
                mode,
                grant: tx,
            });
            (ticket, rx)
        };

        let mut pending = PendingRequest {
            table: self,
            path,
            mode,
            ticket,
            done: false,
        };
        // The sender is only dropped after a send, so this cannot fail while
        // `self` is borrowed.
        let _ = rx.await;
        pending.done = true;
    }

    /// Release a single path. Returns false if it was not held in `mode`.
    pub fn release(&self, path: &Path, mode: LockMode) -> bool {
        let mut inner = self.inner.lock();
        Self::release_locked(&mut inner, path, mode)
    }

    fn release_locked(inner: &mut Inner, path: &Path, mode: LockMode) -> bool {
        let Some(entry) = inner.entries.get_mut(path) else {
            return false;
        };
        if !entry.state.holds(mode) {
            return false;
        }
        entry.state.release(mode);
        entry.promote();
        if entry.is_idle() {
            inner.entries.remove(path);
        }
        true
    }

    /// Release a whole plan atomically, in reverse order.
    ///
    /// Either every step is held and everything is released, or nothing
    /// changes and false is returned.
    pub fn release_plan(&self, plan: &[(Path, LockMode)]) -> bool {
        let mut inner = self.inner.lock();

        // Count the shared holds the plan needs on each path, so a plan that
        // names a path twice is validated against enough holders.
        let mut needed: HashMap<&Path, (usize, bool)> = HashMap::new();
        for (path, mode) in plan {
            let slot = needed.entry(path).or_default();
            match mode {
                LockMode::Shared => slot.0 += 1,
                LockMode::Exclusive => slot.1 = true,
            }
        }
        let valid = needed.iter().all(|(path, (shared, exclusive))| {
            match inner.entries.get(*path).map(|e| e.state) {
                Some(LockState::Exclusive) => *exclusive && *shared == 0,
                Some(LockState::Shared(n)) => !*exclusive && n >= *shared,
                _ => false,
            }
        });
        if !valid {
            return false;
        }

        for (path, mode) in plan.iter().rev() {
            Self::release_locked(&mut inner, path, *mode);
        }
        true
    }

    /// Lock `path` in `mode`, share-locking every ancestor first.
    pub async fn lock(self: &Arc<Self>, path: &Path, mode: LockMode) -> PathGuard {
        self.lock_many([(path.clone(), mode)]).await
    }

    /// Lock several paths without risk of deadlock against other callers.
    pub async fn lock_many<I>(self: &Arc<Self>, targets: I) -> PathGuard
    where
        I: IntoIterator<Item = (Path, LockMode)>,
    {
        let plan = Self::plan(targets);
        let mut guard = PathGuard {
            table: Arc::clone(self),
            held: Vec::with_capacity(plan.len()),
        };
        for (path, mode) in plan {
            self.acquire(&path, mode).await;
            guard.held.push((path, mode));
        }
        guard
    }

    /// Merge the lock chains of several targets into one ascending plan.
    ///
    /// Ancestors are shared; a path that is both an ancestor of one target
    /// and itself requested exclusively is locked exclusively once.
    pub fn plan<I>(targets: I) -> Vec<(Path, LockMode)>
    where
        I: IntoIterator<Item = (Path, LockMode)>,
    {
        let mut plan: BTreeMap<Path, LockMode> = BTreeMap::new();
        for (path, mode) in targets {
            for ancestor in path.ancestors() {
                plan.entry(ancestor).or_insert(LockMode::Shared);
            }
            let slot = plan.entry(path).or_insert(mode);
            if mode == LockMode::Exclusive {
                *slot = LockMode::Exclusive;
            }
        }
        plan.into_iter().collect()
    }

    /// Current state of a single path (free if the table has no entry).
    pub fn state(&self, path: &Path) -> LockState {
        self.inner
            .lock()
            .entries
            .get(path)
            .map(|e| e.state)
            .unwrap_or_default()
    }

    /// Number of live entries (held or waited on).
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A request that has joined a queue and not yet observed its grant.
///
/// Dropping it early (the awaiting future was cancelled) either withdraws
/// the request or, if the grant already happened, releases the lock.
struct PendingRequest<'a> {
    table: &'a LockTable,
    path: &'a Path,
    mode: LockMode,
    ticket: u64,
    done: bool,
}

impl Drop for PendingRequest<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let mut inner = self.table.inner.lock();
        let Some(entry) = inner.entries.get_mut(self.path) else {
            return;
        };
        if let Some(pos) = entry.queue.iter().position(|w| w.ticket == self.ticket) {
            entry.queue.remove(pos);
            entry.promote();
            if entry.is_idle() {
                inner.entries.remove(self.path);
            }
        } else {
            LockTable::release_locked(&mut inner, self.path, self.mode);
        }
    }
}

/// Held locks, released in reverse acquisition order on drop.
#[must_use = "locks are released as soon as the guard is dropped"]
pub struct PathGuard {
    table: Arc<LockTable>,
    held: Vec<(Path, LockMode)>,
}

impl PathGuard {
    /// The locks held, in acquisition order.
    pub fn held(&self) -> &[(Path, LockMode)] {
        &self.held
    }

    /// Keep the locks past the guard's lifetime.
    ///
    /// Used by the client lock surface, where the matching unlock arrives as
    /// a separate call and goes through [`LockTable::release_plan`].
    pub fn into_held(mut self) -> Vec<(Path, LockMode)> {
        std::mem::take(&mut self.held)
    }
}

impl Drop for PathGuard {
    fn drop(&mut self) {
        for (path, mode) in self.held.drain(..).rev() {
            self.table.release(&path, mode);
        }
    }
}

impl std::fmt::Debug for PathGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathGuard").field("held", &self.held).finish()
    }
}
