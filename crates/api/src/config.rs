use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use actionhost_core::action::{ActionConfig, NameNormalization, ResourceConfig};
use actionhost_core::error::CoreError;
use actionhost_core::registry::RegistrySettings;
use actionhost_core::scripting::ProcessLoader;
use axum::http::HeaderValue;

/// Name of the resource configuration file inside the actions directory.
pub const RESOURCE_CONFIG_FILE: &str = "config.json";

/// Top-level paths served by the API itself.
const RESERVED_PATHS: &[&str] = &["actions", "health"];

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} is invalid: {message}")]
    Invalid { var: &'static str, message: String },

    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Resource(#[from] CoreError),
}

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Graceful shutdown timeout in seconds (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Shared secret marking a request as internal. `None` disables the bypass.
    pub internal_secret: Option<String>,
    /// Base URL scripts use to call back into this server.
    pub internal_base_url: String,
    /// Postgres URL; `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub actions: ActionSettings,
}

/// Where actions live and how they run.
#[derive(Debug, Clone)]
pub struct ActionSettings {
    /// Resource name, used for the route prefix and log tag (default: `action`).
    pub resource_name: String,
    /// Directory holding `config.json` and the scripts.
    pub actions_dir: PathBuf,
    /// Directory searched by `require`.
    pub lib_dir: PathBuf,
    pub interpreter: String,
    pub extension: String,
    pub script_timeout_secs: u64,
    pub normalization: NameNormalization,
}

impl ActionSettings {
    /// Route prefix served by the dispatcher (`/<resource_name>`).
    pub fn route_prefix(&self) -> String {
        format!("/{}", self.resource_name)
    }

    pub fn registry_settings(&self) -> RegistrySettings {
        let mut settings = RegistrySettings::new(&self.resource_name, &self.actions_dir);
        settings.normalization = self.normalization;
        settings
    }

    /// Subprocess loader for the configured interpreter. Shell interpreters
    /// get a `-n` syntax check at load time.
    pub fn process_loader(&self) -> ProcessLoader {
        let loader = ProcessLoader::new(&self.interpreter, &self.extension)
            .with_timeout(Duration::from_secs(self.script_timeout_secs));
        match self.interpreter.as_str() {
            "bash" | "sh" => loader.with_syntax_check(["-n"]),
            _ => loader,
        }
    }

    /// Read the action list from `<actions_dir>/config.json`.
    ///
    /// A missing file yields an empty list so the server can start without
    /// any actions configured.
    pub fn load_actions(&self) -> Result<Vec<ActionConfig>, ConfigError> {
        let path = self.actions_dir.join(RESOURCE_CONFIG_FILE);
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(ResourceConfig::from_json(&text)?.actions),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "No resource configuration found, starting without actions");
                Ok(Vec::new())
            }
            Err(source) => Err(ConfigError::Read { path, source }),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default                    |
    /// |------------------------------|----------------------------|
    /// | `HOST`                       | `0.0.0.0`                  |
    /// | `PORT`                       | `3000`                     |
    /// | `CORS_ORIGINS`               | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS`       | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS`      | `30`                       |
    /// | `INTERNAL_SECRET`            | unset                      |
    /// | `INTERNAL_BASE_URL`          | `http://127.0.0.1:<PORT>`  |
    /// | `DATABASE_URL`               | unset (in-memory store)    |
    /// | `RESOURCE_NAME`              | `action`                   |
    /// | `ACTIONS_DIR`                | `./resources/action`       |
    /// | `ACTION_LIB_DIR`             | `<ACTIONS_DIR>/lib`        |
    /// | `ACTION_SCRIPT_INTERPRETER`  | `bash`                     |
    /// | `ACTION_SCRIPT_EXTENSION`    | `sh`                       |
    /// | `ACTION_SCRIPT_TIMEOUT_SECS` | `30`                       |
    /// | `ACTION_NAME_NORMALIZATION`  | `first`                    |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let host = var("HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = parse(&var, "PORT", 3000)?;

        let cors_origins: Vec<String> = var("CORS_ORIGINS")
            .unwrap_or_else(|| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if let Some(bad) = cors_origins
            .iter()
            .find(|o| o.parse::<HeaderValue>().is_err())
        {
            return Err(ConfigError::Invalid {
                var: "CORS_ORIGINS",
                message: format!("'{bad}' is not a valid origin"),
            });
        }

        let request_timeout_secs: u64 = parse(&var, "REQUEST_TIMEOUT_SECS", 30)?;
        let shutdown_timeout_secs: u64 = parse(&var, "SHUTDOWN_TIMEOUT_SECS", 30)?;

        let internal_base_url = var("INTERNAL_BASE_URL")
            .unwrap_or_else(|| format!("http://127.0.0.1:{port}"))
            .trim_end_matches('/')
            .to_string();

        let actions_dir = PathBuf::from(var("ACTIONS_DIR").unwrap_or_else(|| "./resources/action".into()));
        let lib_dir = var("ACTION_LIB_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| actions_dir.join("lib"));

        let resource_name = var("RESOURCE_NAME").unwrap_or_else(|| "action".into());
        if RESERVED_PATHS.contains(&resource_name.as_str())
            || !resource_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ConfigError::Invalid {
                var: "RESOURCE_NAME",
                message: format!("'{resource_name}' cannot be used as a route segment"),
            });
        }

        let actions = ActionSettings {
            resource_name,
            actions_dir,
            lib_dir,
            interpreter: var("ACTION_SCRIPT_INTERPRETER").unwrap_or_else(|| "bash".into()),
            extension: var("ACTION_SCRIPT_EXTENSION").unwrap_or_else(|| "sh".into()),
            script_timeout_secs: parse(&var, "ACTION_SCRIPT_TIMEOUT_SECS", 30)?,
            normalization: parse(&var, "ACTION_NAME_NORMALIZATION", NameNormalization::default())?,
        };

        Ok(Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            internal_secret: var("INTERNAL_SECRET"),
            internal_base_url,
            database_url: var("DATABASE_URL"),
            actions,
        })
    }
}

fn parse<T, V>(var: &V, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    V: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var: name,
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}
