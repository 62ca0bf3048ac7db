// Client configuration: engine pass-through settings and logging defaults.
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::{Error, ErrorKind};
use crate::core::name::LogName;

use super::client::ApiResult;

pub const ENV_ROUTER: &str = "CHANLOG_ROUTER";
pub const ENV_DEBUG: &str = "CHANLOG_DEBUG";
pub const ENV_SERVER: &str = "CHANLOG_SERVER";
pub const ENV_LOG: &str = "CHANLOG_LOG";

const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Router address handed to the engine untouched.
    pub router: Option<String>,
    /// Engine debug verbosity such as `"*=20"`, handed over untouched.
    pub debug: Option<String>,
    /// Server used by `open_or_create` when the caller names none.
    pub default_server: Option<LogName>,
    /// Fallback tracing directive when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            router: None,
            debug: None,
            default_server: None,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_router(mut self, router: impl Into<String>) -> Self {
        self.router = Some(router.into());
        self
    }

    pub fn with_debug(mut self, debug: impl Into<String>) -> Self {
        self.debug = Some(debug.into());
        self
    }

    pub fn with_default_server(mut self, server: LogName) -> Self {
        self.default_server = Some(server);
        self
    }

    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    pub fn from_json_str(text: &str) -> ApiResult<Self> {
        serde_json::from_str(text).map_err(|err| {
            Error::new(ErrorKind::InvalidArgument)
                .with_message("invalid client config")
                .with_source(err)
        })
    }

    pub fn from_json_file(path: &Path) -> ApiResult<Self> {
        let text = fs::read_to_string(path).map_err(|err| {
            let kind = match err.kind() {
                io::ErrorKind::NotFound => ErrorKind::NotFound,
                _ => ErrorKind::Internal,
            };
            Error::new(kind)
                .with_message(format!("failed to read config {}", path.display()))
                .with_source(err)
        })?;
        Self::from_json_str(&text)
    }

    /// Defaults overridden by `CHANLOG_*` environment variables.
    pub fn from_env() -> ApiResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like `from_env` with a caller-supplied variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ApiResult<Self> {
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = Self {
            router: read(ENV_ROUTER),
            debug: read(ENV_DEBUG),
            ..Self::default()
        };
        if let Some(server) = read(ENV_SERVER) {
            let server = server.parse::<LogName>().map_err(|err| {
                err.with_message(format!("{ENV_SERVER} is not a printable server name"))
            })?;
            config.default_server = Some(server);
        }
        if let Some(filter) = read(ENV_LOG) {
            config.log_filter = filter;
        }
        Ok(config)
    }

    /// Install the tracing subscriber using this config's filter fallback.
    pub fn init_tracing(&self) {
        crate::logging::init_tracing(&self.log_filter);
    }
}
