//! Auxiliary library resolution (`require`).
//!
//! Action scripts may pull in shared helper code kept in the library
//! directory. Resolution never leaves that directory.

use std::path::{Component, Path, PathBuf};

/// Errors raised while resolving a library.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LibraryError {
    #[error("No library directory configured")]
    NotConfigured,

    #[error("Invalid library name: '{0}'")]
    InvalidName(String),

    #[error("Library not found: {0}")]
    NotFound(String),
}

/// Resolves library names to files under a fixed directory.
#[derive(Debug, Clone, Default)]
pub struct LibraryResolver {
    root: Option<PathBuf>,
}

impl LibraryResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    /// A resolver that rejects every lookup.
    pub fn disabled() -> Self {
        Self { root: None }
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Resolve `name` (a relative path such as `mail/format.sh`) to an
    /// existing file inside the library directory.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, LibraryError> {
        let root = self.root.as_ref().ok_or(LibraryError::NotConfigured)?;

        let relative = Path::new(name);
        let only_normal = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if name.is_empty() || !only_normal {
            return Err(LibraryError::InvalidName(name.to_string()));
        }

        let path = root.join(relative);
        if path.is_file() {
            Ok(path)
        } else {
            Err(LibraryError::NotFound(name.to_string()))
        }
    }
}
