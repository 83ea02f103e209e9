//! Script loading and execution.
//!
//! Two loaders ship with the crate:
//!
//! - [`process::ProcessLoader`] runs each action as a subprocess (bash by
//!   default) speaking the JSON-lines protocol in [`protocol`].
//! - [`native::NativeLoader`] serves Rust [`Executable`](executor::Executable)s
//!   registered by name, for embedding and tests.

pub mod executor;
pub mod native;
pub mod process;
pub mod protocol;

pub use executor::{ActionContext, Executable, ExecutionFailure, LoadError, ScriptLoader};
pub use native::NativeLoader;
pub use process::ProcessLoader;
