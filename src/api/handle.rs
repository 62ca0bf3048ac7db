//! Purpose: Represent one open log session and its operation surface.
//! Exports: `LogHandle` (owning, closes on drop) and `HandleRef` (non-owning view).
//! Role: Only path from callers to per-session engine calls.
//! Invariants: State is `Open -> Closed`; every operation checks it under the handle lock.
//! Invariants: Operations after close fail `HandleClosed` and never reach the engine.
//! Invariants: Close unregisters, releases the native session, then marks the handle closed.
#![allow(clippy::result_large_err)]

use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, error, warn};

use crate::core::datum::{Datum, Timestamp};
use crate::core::engine::{Engine, NativeId, OpenMode, SessionKey};
use crate::core::error::{Error, ErrorKind};
use crate::core::metadata::Metadata;
use crate::core::name::LogName;
use crate::core::status::Status;

use super::client::ApiResult;
use super::registry::{Generation, Registry};

pub(crate) type HandleRegistry = Registry<HandleInner>;

#[derive(Clone, Copy)]
enum HandleState {
    Open {
        session: SessionKey,
        generation: Generation,
    },
    Closed,
}

pub(crate) struct HandleInner {
    engine: Arc<dyn Engine>,
    registry: Arc<HandleRegistry>,
    name: LogName,
    mode: OpenMode,
    state: Mutex<HandleState>,
}

impl HandleInner {
    fn lock_state(&self) -> MutexGuard<'_, HandleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Open a native session on `name` and register it with `registry`.
pub(crate) fn attach(
    engine: &Arc<dyn Engine>,
    registry: &Arc<HandleRegistry>,
    name: LogName,
    mode: OpenMode,
) -> ApiResult<LogHandle> {
    let session = engine.open(&name, mode).map_err(|status| {
        Error::from_status(status)
            .with_operation("open")
            .with_log(name)
            .with_message(format!("open(mode={mode:?})"))
    })?;
    let id = session.id;
    let since = engine.event_watermark();
    let generation = registry.next_generation();
    let inner = Arc::new(HandleInner {
        engine: Arc::clone(engine),
        registry: Arc::clone(registry),
        name,
        mode,
        state: Mutex::new(HandleState::Open {
            session,
            generation,
        }),
    });
    if let Err(err) = registry.register(id, generation, &inner, since) {
        error!(log = %name, native = %id, "engine returned a native id that is still registered");
        *inner.lock_state() = HandleState::Closed;
        let status = engine.close(id);
        if !status.is_ok() {
            warn!(log = %name, native = %id, %status, "releasing duplicate session failed");
        }
        return Err(err.with_operation("open").with_log(name));
    }
    debug!(log = %name, native = %id, ?mode, "opened handle");
    Ok(LogHandle {
        handle: HandleRef { inner },
    })
}

/// Non-owning view of an open (or closed) handle.
///
/// Events carry these; dropping one never closes the session.
#[derive(Clone)]
pub struct HandleRef {
    inner: Arc<HandleInner>,
}

impl HandleRef {
    pub(crate) fn from_inner(inner: Arc<HandleInner>) -> Self {
        Self { inner }
    }

    pub fn name(&self) -> &LogName {
        &self.inner.name
    }

    pub fn mode(&self) -> OpenMode {
        self.inner.mode
    }

    pub fn is_closed(&self) -> bool {
        matches!(*self.inner.lock_state(), HandleState::Closed)
    }

    /// Current native id, or `None` once closed.
    pub fn native_id(&self) -> Option<NativeId> {
        self.session().map(|session| session.id)
    }

    /// Engine session this handle was opened as, or `None` once closed.
    pub(crate) fn session(&self) -> Option<SessionKey> {
        match *self.inner.lock_state() {
            HandleState::Open { session, .. } => Some(session),
            HandleState::Closed => None,
        }
    }

    /// True when both refer to the same handle object.
    pub fn same(&self, other: &HandleRef) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Append one record and wait for the engine to acknowledge it.
    ///
    /// The assigned record number is not returned; read the log to learn it.
    pub fn append(&self, payload: impl Into<Bytes>) -> ApiResult<()> {
        let datum = Datum::outgoing(payload);
        self.call(
            "append",
            || format!("append(len={})", datum.len()),
            |engine, id| engine.append(id, &datum).into_result(),
        )
    }

    /// Submit one record; the outcome arrives later as an event for this handle.
    pub fn append_async(&self, payload: impl Into<Bytes>) -> ApiResult<()> {
        let datum = Datum::outgoing(payload);
        self.call(
            "append_async",
            || format!("append_async(len={})", datum.len()),
            |engine, id| engine.append_async(id, &datum).into_result(),
        )
    }

    pub fn read_by_recno(&self, recno: u64) -> ApiResult<Datum> {
        self.call(
            "read_by_recno",
            || format!("read_by_recno({recno})"),
            |engine, id| engine.read_by_recno(id, recno),
        )
        .map_err(|err| err.with_recno(recno))
    }

    /// First record stamped at or after `ts`.
    pub fn read_by_ts(&self, ts: &Timestamp) -> ApiResult<Datum> {
        self.call(
            "read_by_ts",
            || format!("read_by_ts({}.{:09})", ts.sec, ts.nsec),
            |engine, id| engine.read_by_ts(id, ts),
        )
    }

    pub fn read_by_recno_async(&self, firstrec: u64, numrecs: u32) -> ApiResult<()> {
        self.call(
            "read_by_recno_async",
            || format!("read_by_recno_async({firstrec}, {numrecs})"),
            |engine, id| engine.read_by_recno_async(id, firstrec, numrecs).into_result(),
        )
    }

    /// Live tail from `firstrec` (0 = next new record) for `numrecs` records
    /// (0 = unbounded). Results arrive through the event dispatcher.
    pub fn subscribe(
        &self,
        firstrec: u64,
        numrecs: u32,
        timeout: Option<Duration>,
    ) -> ApiResult<()> {
        self.call(
            "subscribe",
            || format!("subscribe({firstrec}, {numrecs}, {timeout:?})"),
            |engine, id| {
                engine
                    .subscribe_by_recno(id, firstrec, numrecs, timeout)
                    .into_result()
            },
        )
    }

    pub fn subscribe_by_ts(
        &self,
        start: &Timestamp,
        numrecs: u32,
        timeout: Option<Duration>,
    ) -> ApiResult<()> {
        self.call(
            "subscribe_by_ts",
            || format!("subscribe_by_ts({}.{:09}, {numrecs}, {timeout:?})", start.sec, start.nsec),
            |engine, id| {
                engine
                    .subscribe_by_ts(id, start, numrecs, timeout)
                    .into_result()
            },
        )
    }

    /// Like `subscribe` but limited to records that already exist.
    pub fn multiread(&self, firstrec: u64, numrecs: u32) -> ApiResult<()> {
        self.call(
            "multiread",
            || format!("multiread({firstrec}, {numrecs})"),
            |engine, id| engine.multiread(id, firstrec, numrecs).into_result(),
        )
    }

    pub fn unsubscribe(&self) -> ApiResult<()> {
        self.call(
            "unsubscribe",
            || "unsubscribe()".to_string(),
            |engine, id| engine.unsubscribe(id).into_result(),
        )
    }

    pub fn nrecs(&self) -> ApiResult<u64> {
        self.call("nrecs", || "nrecs()".to_string(), |engine, id| engine.nrecs(id))
    }

    pub fn metadata(&self) -> ApiResult<Metadata> {
        self.call(
            "metadata",
            || "metadata()".to_string(),
            |engine, id| engine.metadata(id),
        )
    }

    /// Release the session. Later calls are no-ops.
    pub fn close(&self) -> ApiResult<()> {
        let mut state = self.inner.lock_state();
        let HandleState::Open {
            session: SessionKey { id, .. },
            generation,
        } = *state
        else {
            return Ok(());
        };
        if !self.inner.registry.unregister(id, generation) {
            warn!(log = %self.inner.name, native = %id, "handle was not registered at close");
        }
        let status = self.inner.engine.close(id);
        *state = HandleState::Closed;
        debug!(log = %self.inner.name, native = %id, %status, "closed handle");
        status
            .into_result()
            .map_err(|status| self.engine_error("close", status, format!("close({id})")))
    }

    pub(crate) fn closed_error(&self, operation: &'static str) -> Error {
        Error::new(ErrorKind::HandleClosed)
            .with_operation(operation)
            .with_log(self.inner.name)
            .with_message("handle is closed")
    }

    fn engine_error(&self, operation: &'static str, status: Status, args: String) -> Error {
        Error::from_status(status)
            .with_operation(operation)
            .with_log(self.inner.name)
            .with_message(args)
    }

    // Runs `op` against the native session with the handle lock held.
    fn call<T>(
        &self,
        operation: &'static str,
        args: impl FnOnce() -> String,
        op: impl FnOnce(&dyn Engine, NativeId) -> Result<T, Status>,
    ) -> ApiResult<T> {
        let state = self.inner.lock_state();
        let HandleState::Open { session, .. } = *state else {
            return Err(self.closed_error(operation));
        };
        op(self.inner.engine.as_ref(), session.id)
            .map_err(|status| self.engine_error(operation, status, args()))
    }
}

impl PartialEq for HandleRef {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl Eq for HandleRef {}

impl fmt::Debug for HandleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleRef")
            .field("name", &self.inner.name)
            .field("mode", &self.inner.mode)
            .field("native", &self.native_id())
            .finish()
    }
}

/// Owning handle: closes its session when dropped.
#[derive(Debug)]
pub struct LogHandle {
    handle: HandleRef,
}

impl LogHandle {
    /// A non-owning view that stays valid after this handle closes.
    pub fn handle_ref(&self) -> HandleRef {
        self.handle.clone()
    }
}

impl Deref for LogHandle {
    type Target = HandleRef;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl Drop for LogHandle {
    fn drop(&mut self) {
        if let Err(err) = self.handle.close() {
            warn!(error = %err, "close on drop failed");
        }
    }
}
