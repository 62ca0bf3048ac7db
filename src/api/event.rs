//! Purpose: Deliver engine events to callers as typed events bound to their handles.
//! Exports: `Event`, `EventKind`, `NextEvent`, `StaleEvent`, `StaleReason`.
//! Role: Single blocking point of the client; multiplexes one engine queue over all handles.
//! Invariants: The engine event is freed on every path before `next` returns.
//! Invariants: A poll never holds a handle lock while waiting on the engine.
//! Invariants: A scoped poll whose session closed mid-wait fails `HandleClosed`.
//! Invariants: Events that no longer resolve to a live handle surface as `Stale`.
#![allow(clippy::result_large_err)]

use std::fmt;

use tracing::{debug, error, warn};

use crate::core::datum::Datum;
use crate::core::engine::{
    EVENT_CREATED, EVENT_DATA, EVENT_DONE, EVENT_FAILURE, EVENT_MISSING, EVENT_SHUTDOWN,
    EVENT_SUCCESS, Engine, EventToken, NativeId, Wait,
};
use crate::core::error::{Error, ErrorKind};
use crate::core::status::Status;

use super::client::ApiResult;
use super::handle::{HandleRef, HandleRegistry};
use super::registry::Resolution;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum EventKind {
    /// A record from a subscription or multiread.
    Data,
    /// No more records will arrive for that request.
    EndOfSubscription,
    /// The engine tore the subscription down.
    Shutdown,
    /// An asynchronous append was stored.
    Created,
    Success,
    Failure,
    Missing,
    Other(i32),
}

impl EventKind {
    pub fn from_code(code: i32) -> Self {
        match code {
            EVENT_DATA => EventKind::Data,
            EVENT_DONE => EventKind::EndOfSubscription,
            EVENT_SHUTDOWN => EventKind::Shutdown,
            EVENT_CREATED => EventKind::Created,
            EVENT_SUCCESS => EventKind::Success,
            EVENT_FAILURE => EventKind::Failure,
            EVENT_MISSING => EventKind::Missing,
            other => EventKind::Other(other),
        }
    }

    pub fn code(self) -> i32 {
        match self {
            EventKind::Data => EVENT_DATA,
            EventKind::EndOfSubscription => EVENT_DONE,
            EventKind::Shutdown => EVENT_SHUTDOWN,
            EventKind::Created => EVENT_CREATED,
            EventKind::Success => EVENT_SUCCESS,
            EventKind::Failure => EVENT_FAILURE,
            EventKind::Missing => EVENT_MISSING,
            EventKind::Other(code) => code,
        }
    }

    /// True for kinds after which a subscription delivers nothing more.
    pub fn ends_subscription(self) -> bool {
        matches!(self, EventKind::EndOfSubscription | EventKind::Shutdown)
    }
}

#[derive(Clone, Debug)]
pub struct Event {
    kind: EventKind,
    handle: HandleRef,
    datum: Option<Datum>,
    status: Status,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn handle(&self) -> &HandleRef {
        &self.handle
    }

    pub fn datum(&self) -> Option<&Datum> {
        self.datum.as_ref()
    }

    pub fn into_datum(self) -> Option<Datum> {
        self.datum
    }

    pub fn status(&self) -> Status {
        self.status
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum StaleReason {
    /// No handle is registered under the native id any more.
    Unregistered,
    /// The native id now belongs to a newer session.
    Superseded,
    /// The owning handle was dropped.
    Released,
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StaleReason::Unregistered => "unregistered",
            StaleReason::Superseded => "superseded",
            StaleReason::Released => "released",
        };
        f.write_str(text)
    }
}

/// An event whose originating handle is gone.
#[derive(Clone, Debug)]
pub struct StaleEvent {
    pub kind: EventKind,
    pub native: NativeId,
    pub reason: StaleReason,
    pub datum: Option<Datum>,
    pub status: Status,
}

impl StaleEvent {
    pub fn into_error(self) -> Error {
        Error::new(ErrorKind::StaleEvent)
            .with_operation("next_event")
            .with_status(self.status)
            .with_message(format!(
                "{:?} event for native id {} is {}",
                self.kind, self.native, self.reason
            ))
    }
}

/// Outcome of one poll.
#[derive(Clone, Debug)]
pub enum NextEvent {
    Event(Event),
    /// The wait elapsed with nothing queued.
    NoEvent,
    Stale(StaleEvent),
}

impl NextEvent {
    /// `Some(event)`, `None` for no event, or a `StaleEvent` error.
    pub fn into_event(self) -> ApiResult<Option<Event>> {
        match self {
            NextEvent::Event(event) => Ok(Some(event)),
            NextEvent::NoEvent => Ok(None),
            NextEvent::Stale(stale) => Err(stale.into_error()),
        }
    }

    pub fn is_no_event(&self) -> bool {
        matches!(self, NextEvent::NoEvent)
    }
}

// Frees the engine event when dropped, whichever way `next` exits.
struct EventGuard<'a> {
    engine: &'a dyn Engine,
    token: EventToken,
}

impl Drop for EventGuard<'_> {
    fn drop(&mut self) {
        let status = self.engine.event_free(self.token);
        if !status.is_ok() {
            warn!(token = self.token.raw(), %status, "event free failed");
        }
    }
}

pub(crate) fn next(
    engine: &dyn Engine,
    registry: &HandleRegistry,
    scope: Option<&HandleRef>,
    wait: Wait,
) -> ApiResult<NextEvent> {
    // The session key pins the scope to this open; a reused native id no longer matches.
    let session_scope = match scope {
        Some(handle) => Some(
            handle
                .session()
                .ok_or_else(|| handle.closed_error("next_event"))?,
        ),
        None => None,
    };

    let raw = match engine.event_next(session_scope, wait) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Ok(NextEvent::NoEvent),
        Err(status) => {
            if let Some(handle) = scope {
                if handle.is_closed() || status == Status::SESSION_CLOSED {
                    return Err(handle.closed_error("next_event").with_status(status));
                }
            }
            return Err(Error::from_status(status).with_operation("next_event"));
        }
    };
    let _guard = EventGuard {
        engine,
        token: raw.token,
    };
    let kind = EventKind::from_code(raw.code);

    match registry.resolve(raw.session, raw.sequence) {
        Resolution::Live(inner) => {
            let handle = HandleRef::from_inner(inner);
            if let Some(expected) = scope {
                if !expected.same(&handle) {
                    error!(
                        expected = %expected.name(),
                        received = %handle.name(),
                        native = %raw.session,
                        "scoped poll received another handle's event"
                    );
                    return Err(Error::new(ErrorKind::Internal)
                        .with_operation("next_event")
                        .with_log(*expected.name())
                        .with_status(raw.status)
                        .with_message(format!(
                            "scoped poll received {kind:?} event for native id {}",
                            raw.session
                        )));
                }
            }
            Ok(NextEvent::Event(Event {
                kind,
                handle,
                datum: raw.datum,
                status: raw.status,
            }))
        }
        Resolution::Stale(reason) => {
            debug!(native = %raw.session, ?kind, %reason, "stale event");
            Ok(NextEvent::Stale(StaleEvent {
                kind,
                native: raw.session,
                reason,
                datum: raw.datum,
                status: raw.status,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{EventKind, NextEvent, StaleEvent, StaleReason};
    use crate::core::engine::NativeId;
    use crate::core::error::ErrorKind;
    use crate::core::status::Status;

    #[test]
    fn kinds_map_to_codes_and_back() {
        for code in 1..=7 {
            assert_eq!(EventKind::from_code(code).code(), code);
        }
        assert_eq!(EventKind::from_code(42), EventKind::Other(42));
        assert_eq!(EventKind::Other(42).code(), 42);
        assert_eq!(EventKind::from_code(2), EventKind::EndOfSubscription);
    }

    #[test]
    fn terminal_kinds() {
        assert!(EventKind::EndOfSubscription.ends_subscription());
        assert!(EventKind::Shutdown.ends_subscription());
        assert!(!EventKind::Data.ends_subscription());
    }

    #[test]
    fn stale_outcome_becomes_stale_error() {
        let outcome = NextEvent::Stale(StaleEvent {
            kind: EventKind::Data,
            native: NativeId::new(3),
            reason: StaleReason::Unregistered,
            datum: None,
            status: Status::OK,
        });
        let err = outcome.into_event().expect_err("stale");
        assert_eq!(err.kind(), ErrorKind::StaleEvent);
        assert!(err.to_string().contains("unregistered"), "{err}");
    }

    #[test]
    fn no_event_is_not_an_error() {
        let outcome = NextEvent::NoEvent;
        assert!(outcome.is_no_event());
        assert!(outcome.into_event().expect("ok").is_none());
    }
}
