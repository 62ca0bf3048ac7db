//! Purpose: Define the client context that owns the engine and the handle registry.
//! Exports: `Client`, `ApiResult`.
//! Role: Entry point for creating logs, opening handles and polling events.
//! Invariants: Each client owns its own registry; nothing is process-global.
//! Invariants: A client is the only consumer of its engine's event queue.
//! Invariants: Open-or-create never leaves a registry entry behind on failure.
#![allow(clippy::result_large_err)]

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::core::engine::{Engine, OpenMode, Wait};
use crate::core::error::{Error, ErrorKind};
use crate::core::metadata::Metadata;
use crate::core::name::LogName;

use super::config::ClientConfig;
use super::event::{self, NextEvent};
use super::handle::{self, HandleRef, HandleRegistry, LogHandle};

pub type ApiResult<T> = Result<T, Error>;

#[derive(Clone)]
pub struct Client {
    engine: Arc<dyn Engine>,
    registry: Arc<HandleRegistry>,
    config: ClientConfig,
}

impl Client {
    /// Wrap an engine that is already initialized.
    ///
    /// The engine's event queue is global, so an engine must not be shared
    /// between clients: a global poll on one client would take the other's
    /// events and report them as stale. Clone the client instead.
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self::with_config(engine, ClientConfig::default())
    }

    /// Pass the debug spec and router from `config` to the engine, then initialize it.
    pub fn connect(engine: Arc<dyn Engine>, config: ClientConfig) -> ApiResult<Self> {
        if let Some(spec) = &config.debug {
            engine.set_debug(spec);
        }
        engine
            .init(config.router.as_deref())
            .into_result()
            .map_err(|status| {
                Error::from_status(status)
                    .with_kind(ErrorKind::EngineFailure)
                    .with_operation("connect")
                    .with_message(format!("init(router={:?})", config.router))
            })?;
        debug!(router = ?config.router, "client connected");
        Ok(Self::with_config(engine, config))
    }

    fn with_config(engine: Arc<dyn Engine>, config: ClientConfig) -> Self {
        Self {
            engine,
            registry: Arc::new(HandleRegistry::new()),
            config,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    /// Handles currently registered with this client.
    pub fn open_handles(&self) -> usize {
        self.registry.len()
    }

    /// Provision a new log on `server` with the given ordered metadata.
    pub fn create(&self, name: &LogName, server: &LogName, metadata: &Metadata) -> ApiResult<()> {
        if !name.is_valid() {
            return Err(Error::new(ErrorKind::InvalidArgument)
                .with_operation("create")
                .with_log(*name)
                .with_message("log name must not be all zeroes"));
        }
        self.engine
            .create(name, server, metadata)
            .into_result()
            .map_err(|status| {
                Error::from_status(status)
                    .with_operation("create")
                    .with_log(*name)
                    .with_message(format!(
                        "create(server={}, entries={})",
                        server,
                        metadata.len()
                    ))
            })?;
        debug!(log = %name, %server, entries = metadata.len(), "created log");
        Ok(())
    }

    pub fn open(&self, name: &LogName, mode: OpenMode) -> ApiResult<LogHandle> {
        handle::attach(&self.engine, &self.registry, *name, mode)
    }

    /// Open `name`, creating it first when it does not exist.
    ///
    /// Uses `server`, or the configured default server, for the creation.
    /// A concurrent creator winning the race is not an error.
    pub fn open_or_create(
        &self,
        name: &LogName,
        mode: OpenMode,
        server: Option<&LogName>,
        metadata: &Metadata,
    ) -> ApiResult<LogHandle> {
        match self.open(name, mode) {
            Ok(handle) => return Ok(handle),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(err),
        }

        let server = server
            .copied()
            .or(self.config.default_server)
            .ok_or_else(|| {
                Error::new(ErrorKind::InvalidArgument)
                    .with_operation("open_or_create")
                    .with_log(*name)
                    .with_message("log does not exist and no server was given")
            })?;
        debug!(log = %name, %server, "log not found, creating it");

        match self.create(name, &server, metadata) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                debug!(log = %name, "log was created concurrently");
            }
            Err(err) => {
                return Err(err
                    .with_kind(ErrorKind::EngineFailure)
                    .with_operation("open_or_create"));
            }
        }

        self.open(name, mode).map_err(|err| {
            err.with_kind(ErrorKind::EngineFailure)
                .with_operation("open_or_create")
        })
    }

    /// Next event, for one handle or for any handle of this client.
    pub fn next_event(&self, scope: Option<&HandleRef>, wait: Wait) -> ApiResult<NextEvent> {
        event::next(self.engine.as_ref(), &self.registry, scope, wait)
    }

    /// `next_event` run on the blocking pool of the current tokio runtime.
    pub async fn next_event_async(
        &self,
        scope: Option<HandleRef>,
        wait: Wait,
    ) -> ApiResult<NextEvent> {
        let client = self.clone();
        tokio::task::spawn_blocking(move || client.next_event(scope.as_ref(), wait))
            .await
            .map_err(|err| {
                Error::new(ErrorKind::Internal)
                    .with_operation("next_event")
                    .with_message("event poll task failed")
                    .with_source(err)
            })?
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .field("open_handles", &self.open_handles())
            .finish()
    }
}
