//! Purpose: Define the call surface of the external log engine.
//! Exports: `Engine`, `NativeId`, `SessionKey`, `EventToken`, `RawEvent`, `OpenMode`, `Wait`, event codes.
//! Role: Protocol boundary; the client runtime never sees engine internals.
//! Invariants: Unit operations report a `Status`; values come back as `Result<T, Status>`.
//! Invariants: Any `Err(status)` carries severity at or above warning.
//! Invariants: Every event returned by `event_next` must be released with `event_free`.
//! Invariants: Native ids may be reused once `close` has released them; incarnations never are.

use std::fmt;
use std::time::{Duration, Instant};

use crate::core::datum::{Datum, Timestamp};
use crate::core::error::{Error, ErrorKind};
use crate::core::metadata::Metadata;
use crate::core::name::LogName;
use crate::core::status::Status;

pub type EngineResult<T> = Result<T, Status>;

pub const EVENT_DATA: i32 = 1;
pub const EVENT_DONE: i32 = 2;
pub const EVENT_SHUTDOWN: i32 = 3;
pub const EVENT_CREATED: i32 = 4;
pub const EVENT_SUCCESS: i32 = 5;
pub const EVENT_FAILURE: i32 = 6;
pub const EVENT_MISSING: i32 = 7;

/// Opaque engine reference to one open session.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct NativeId(u64);

impl NativeId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NativeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A native id together with the open that produced it.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct SessionKey {
    pub id: NativeId,
    /// Distinct for every successful `open`, even when `id` is reused.
    pub incarnation: u64,
}

/// Engine-side identity of an undelivered event resource.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct EventToken(u64);

impl EventToken {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// An event as the engine hands it out: tagged only with the native id.
#[derive(Clone, Debug)]
pub struct RawEvent {
    pub token: EventToken,
    pub code: i32,
    pub session: NativeId,
    /// Arrival order at the engine; strictly increasing across all sessions.
    pub sequence: u64,
    pub datum: Option<Datum>,
    pub status: Status,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum OpenMode {
    Any,
    ReadOnly,
    AppendOnly,
    ReadAppend,
}

impl OpenMode {
    pub fn allows_read(self) -> bool {
        !matches!(self, OpenMode::AppendOnly)
    }

    pub fn allows_append(self) -> bool {
        !matches!(self, OpenMode::ReadOnly)
    }

    /// Mode bits understood by the engine; `Any` means read + append.
    pub fn native_bits(self) -> u32 {
        match self {
            OpenMode::Any => 0x3,
            OpenMode::ReadOnly => 0x1,
            OpenMode::AppendOnly => 0x2,
            OpenMode::ReadAppend => 0x3,
        }
    }
}

impl TryFrom<i32> for OpenMode {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(OpenMode::Any),
            1 => Ok(OpenMode::ReadOnly),
            2 => Ok(OpenMode::AppendOnly),
            3 => Ok(OpenMode::ReadAppend),
            other => Err(Error::new(ErrorKind::InvalidArgument)
                .with_message(format!("open mode must be 0-3, got {other}"))),
        }
    }
}

/// How long an event poll may block.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Wait {
    /// Block until an event arrives.
    Forever,
    /// Block for at most this long.
    Within(Duration),
    /// Only take an event that is already queued.
    Immediate,
}

impl Wait {
    pub fn deadline_from(self, now: Instant) -> Option<Instant> {
        match self {
            Wait::Forever => None,
            Wait::Within(duration) => Some(now + duration),
            Wait::Immediate => Some(now),
        }
    }
}

impl From<Option<Duration>> for Wait {
    fn from(timeout: Option<Duration>) -> Self {
        match timeout {
            None => Wait::Forever,
            Some(duration) if duration.is_zero() => Wait::Immediate,
            Some(duration) => Wait::Within(duration),
        }
    }
}

pub trait Engine: Send + Sync {
    /// Connect to the routing layer; `router` is passed through untouched.
    fn init(&self, router: Option<&str>) -> Status;

    /// Debug verbosity such as `"*=20"`, passed through verbatim.
    fn set_debug(&self, spec: &str);

    fn open(&self, name: &LogName, mode: OpenMode) -> EngineResult<SessionKey>;
    fn create(&self, name: &LogName, server: &LogName, metadata: &Metadata) -> Status;
    fn close(&self, id: NativeId) -> Status;

    fn append(&self, id: NativeId, datum: &Datum) -> Status;

    /// Submit a record without waiting for it to be stored.
    ///
    /// Storage failures arrive later as an `EVENT_FAILURE` event for `id`.
    /// Only a session that is not open is reported synchronously.
    fn append_async(&self, id: NativeId, datum: &Datum) -> Status;

    fn read_by_recno(&self, id: NativeId, recno: u64) -> EngineResult<Datum>;
    fn read_by_ts(&self, id: NativeId, ts: &Timestamp) -> EngineResult<Datum>;
    fn read_by_recno_async(&self, id: NativeId, firstrec: u64, numrecs: u32) -> Status;

    /// Existing records only; never waits for future appends.
    fn multiread(&self, id: NativeId, firstrec: u64, numrecs: u32) -> Status {
        self.read_by_recno_async(id, firstrec, numrecs)
    }

    fn subscribe_by_recno(
        &self,
        id: NativeId,
        firstrec: u64,
        numrecs: u32,
        timeout: Option<Duration>,
    ) -> Status;
    fn subscribe_by_ts(
        &self,
        id: NativeId,
        start: &Timestamp,
        numrecs: u32,
        timeout: Option<Duration>,
    ) -> Status;
    fn unsubscribe(&self, id: NativeId) -> Status;

    fn metadata(&self, id: NativeId) -> EngineResult<Metadata>;
    fn nrecs(&self, id: NativeId) -> EngineResult<u64>;

    /// Next queued event, restricted to the `scope` session when given.
    ///
    /// A scoped poll returns `Err(Status::SESSION_CLOSED)` instead of blocking
    /// once the scoped session is closed, including when its native id has
    /// since been handed to a later open.
    fn event_next(&self, scope: Option<SessionKey>, wait: Wait) -> EngineResult<Option<RawEvent>>;
    fn event_free(&self, token: EventToken) -> Status;

    /// Sequence number the next queued event will receive.
    fn event_watermark(&self) -> u64;
}
