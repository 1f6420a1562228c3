//! Hierarchical filesystem paths.
//!
//! A [`Path`] is a sequence of non-empty components. The empty sequence is the
//! root. The string form always starts with `/`, components are separated by
//! `/`, and `:` is reserved (no component may contain it).
//!
//! ## Ordering
//!
//! Paths compare lexicographically by component, with a proper prefix
//! sorting before its extensions. Every ancestor therefore sorts before each
//! of its descendants, which is what lets the lock table acquire a whole set
//! of hierarchical locks in one ascending sweep without cyclic waits.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PathError;

/// Component separator.
pub const SEPARATOR: char = '/';

/// Reserved delimiter, never legal inside a component.
pub const DELIMITER: char = ':';

/// An immutable path in the distributed namespace.
#[derive(Clone, Default, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Path {
    components: Vec<String>,
}

impl Path {
    /// The root directory.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a path string such as `/etc/dfs/conf.txt`.
    ///
    /// Empty components are dropped, so `//a///b/` parses as `/a/b`.
    pub fn parse(s: &str) -> Result<Self, PathError> {
        if s.is_empty() {
            return Err(PathError::Empty);
        }
        if !s.starts_with(SEPARATOR) {
            return Err(PathError::not_absolute(s));
        }
        if s.contains(DELIMITER) {
            return Err(PathError::invalid_component(s));
        }

        let components = s
            .split(SEPARATOR)
            .filter(|c| !c.is_empty())
            .map(str::to_owned)
            .collect();
        Ok(Self { components })
    }

    /// Build a path from individual components, validating each one.
    pub fn from_components<I, S>(components: I) -> Result<Self, PathError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        components
            .into_iter()
            .try_fold(Self::root(), |path, c| path.join(c.as_ref()))
    }

    /// Append one component, producing a new path.
    pub fn join(&self, component: &str) -> Result<Self, PathError> {
        validate_component(component)?;
        let mut components = Vec::with_capacity(self.components.len() + 1);
        components.extend(self.components.iter().cloned());
        components.push(component.to_owned());
        Ok(Self { components })
    }

    /// Returns true for the root directory.
    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// Number of components (zero for the root).
    pub fn depth(&self) -> usize {
        self.components.len()
    }

    /// The parent directory.
    pub fn parent(&self) -> Result<Self, PathError> {
        match self.components.split_last() {
            Some((_, rest)) => Ok(Self {
                components: rest.to_vec(),
            }),
            None => Err(PathError::RootHasNoParent),
        }
    }

    /// The final component.
    pub fn last(&self) -> Result<&str, PathError> {
        self.components
            .last()
            .map(String::as_str)
            .ok_or(PathError::RootHasNoLast)
    }

    /// Iterate over the components, root first.
    pub fn components(&self) -> Components<'_> {
        Components {
            inner: self.components.iter(),
        }
    }

    /// Returns true if `other` is a prefix of this path.
    ///
    /// Every path is a subpath of itself, and the root is a subpath of
    /// everything.
    pub fn is_subpath(&self, other: &Path) -> bool {
        self.components.starts_with(&other.components)
    }

    /// Strict ancestors, from the root down to the parent.
    ///
    /// Empty for the root.
    pub fn ancestors(&self) -> impl Iterator<Item = Path> + '_ {
        (0..self.components.len()).map(move |len| Self {
            components: self.components[..len].to_vec(),
        })
    }

    /// Map this path beneath a directory on the local filesystem.
    pub fn to_local(&self, root: &std::path::Path) -> std::path::PathBuf {
        let mut local = root.to_path_buf();
        local.extend(self.components.iter());
        local
    }
}

fn validate_component(component: &str) -> Result<(), PathError> {
    if component.is_empty() || component.contains(SEPARATOR) || component.contains(DELIMITER) {
        return Err(PathError::invalid_component(component));
    }
    Ok(())
}

/// Iterator over the components of a [`Path`].
#[derive(Debug, Clone)]
pub struct Components<'a> {
    inner: std::slice::Iter<'a, String>,
}

impl<'a> Iterator for Components<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(String::as_str)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Components<'_> {}

impl<'a> IntoIterator for &'a Path {
    type Item = &'a str;
    type IntoIter = Components<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.components()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return f.write_str("/");
        }
        for component in &self.components {
            write!(f, "/{}", component)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Path({})", self)
    }
}

impl FromStr for Path {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Path {
    type Error = PathError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl TryFrom<&str> for Path {
    type Error = PathError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl From<Path> for String {
    fn from(p: Path) -> String {
        p.to_string()
    }
}
