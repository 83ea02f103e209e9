//! Loader for actions implemented in Rust.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use super::executor::{Executable, LoadError, ScriptLoader};

/// Extension used for native action paths.
pub const NATIVE_EXTENSION: &str = "native";

/// Serves pre-registered [`Executable`]s, keyed by normalized action name.
///
/// The registry still derives a path (`<dir>/<name>.native`); only the file
/// stem is used for lookup, nothing is read from disk.
#[derive(Default, Clone)]
pub struct NativeLoader {
    executables: HashMap<String, Arc<dyn Executable>>,
}

impl NativeLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `executable` under the normalized action `name`.
    pub fn register(mut self, name: impl Into<String>, executable: Arc<dyn Executable>) -> Self {
        self.executables.insert(name.into(), executable);
        self
    }
}

#[async_trait]
impl ScriptLoader for NativeLoader {
    fn extension(&self) -> &str {
        NATIVE_EXTENSION
    }

    async fn load(&self, path: &Path) -> Result<Arc<dyn Executable>, LoadError> {
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| LoadError::Invalid(format!("Bad script path: {}", path.display())))?;

        self.executables
            .get(name)
            .cloned()
            .ok_or_else(|| LoadError::NotFound(path.display().to_string()))
    }
}
