//! Purpose: Provide an in-process engine that keeps logs, sessions and events in memory.
//! Exports: `MemoryEngine`, `EngineStats`.
//! Role: Loopback `Engine` for tests and for embedders that want a local log.
//! Invariants: Native ids are slot index + 1; the lowest free slot is reused first.
//! Invariants: Events queue in FIFO order with strictly increasing sequence numbers.
//! Invariants: Closing a session discards its queued events and wakes every waiter.
//! Invariants: A scoped poll only matches the incarnation it was opened as.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, trace};

use crate::core::datum::{Datum, Timestamp};
use crate::core::engine::{
    EVENT_CREATED, EVENT_DATA, EVENT_DONE, EVENT_FAILURE, EVENT_SHUTDOWN, Engine, EngineResult,
    EventToken, NativeId, OpenMode, RawEvent, SessionKey, Wait,
};
use crate::core::metadata::Metadata;
use crate::core::name::LogName;
use crate::core::status::Status;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct EngineStats {
    /// Engine entry points invoked so far, including polls and frees.
    pub calls: u64,
    pub open_sessions: usize,
    /// Events handed out by `event_next` and not yet freed.
    pub outstanding_events: usize,
    pub queued_events: usize,
}

struct StoredLog {
    server: LogName,
    metadata: Bytes,
    records: Vec<Datum>,
}

struct Subscription {
    // First record number this subscription still wants.
    start: u64,
    remaining: Option<u32>,
    deadline: Option<Instant>,
}

struct Session {
    log: LogName,
    mode: OpenMode,
    incarnation: u64,
    subscriptions: Vec<Subscription>,
}

#[derive(Default)]
struct EngineState {
    router: Option<String>,
    debug: Option<String>,
    servers: HashSet<LogName>,
    logs: HashMap<LogName, StoredLog>,
    sessions: Vec<Option<Session>>,
    queue: VecDeque<RawEvent>,
    outstanding: HashSet<EventToken>,
    next_sequence: u64,
    next_incarnation: u64,
    calls: u64,
}

#[derive(Default)]
pub struct MemoryEngine {
    state: Mutex<EngineState>,
    ready: Condvar,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_server(self, server: LogName) -> Self {
        self.add_server(server);
        self
    }

    /// Make `server` available as a hosting server for `create`.
    pub fn add_server(&self, server: LogName) {
        self.lock().servers.insert(server);
    }

    pub fn stats(&self) -> EngineStats {
        let state = self.lock();
        EngineStats {
            calls: state.calls,
            open_sessions: state.sessions.iter().flatten().count(),
            outstanding_events: state.outstanding.len(),
            queued_events: state.queue.len(),
        }
    }

    pub fn router(&self) -> Option<String> {
        self.lock().router.clone()
    }

    pub fn debug_spec(&self) -> Option<String> {
        self.lock().debug.clone()
    }

    /// Server that hosts `log`, if the log exists.
    pub fn server_of(&self, log: &LogName) -> Option<LogName> {
        self.lock().logs.get(log).map(|stored| stored.server)
    }

    /// End every active subscription with a shutdown event.
    pub fn shutdown_subscriptions(&self) {
        let mut state = self.lock();
        let mut ended = Vec::new();
        for (index, slot) in state.sessions.iter_mut().enumerate() {
            let Some(session) = slot else { continue };
            for _ in session.subscriptions.drain(..) {
                ended.push(native_id(index));
            }
        }
        debug!(subscriptions = ended.len(), "shutting down subscriptions");
        for id in ended {
            state.enqueue(EVENT_SHUTDOWN, id, None, Status::SHUTDOWN);
        }
        drop(state);
        self.ready.notify_all();
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Every trait entry point goes through here so `stats().calls` counts it.
    fn enter(&self) -> MutexGuard<'_, EngineState> {
        let mut state = self.lock();
        state.calls += 1;
        state
    }

    fn subscribe(
        &self,
        id: NativeId,
        pick: impl FnOnce(&[Datum]) -> (usize, u64),
        numrecs: u32,
        timeout: Option<Duration>,
    ) -> Status {
        let mut state = self.enter();
        let records = match state.readable(id) {
            Ok(stored) => stored.records.as_slice(),
            Err(status) => return status,
        };
        let (backlog_from, start) = pick(records);
        let backlog: Vec<Datum> = records.iter().skip(backlog_from).cloned().collect();
        state.start_subscription(id, backlog, start, numrecs, timeout);
        drop(state);
        self.ready.notify_all();
        Status::OK
    }
}

impl EngineState {
    fn session(&self, id: NativeId) -> Result<&Session, Status> {
        slot_index(id)
            .and_then(|index| self.sessions.get(index))
            .and_then(Option::as_ref)
            .ok_or(Status::SESSION_CLOSED)
    }

    fn session_mut(&mut self, id: NativeId) -> Result<&mut Session, Status> {
        slot_index(id)
            .and_then(|index| self.sessions.get_mut(index))
            .and_then(Option::as_mut)
            .ok_or(Status::SESSION_CLOSED)
    }

    // Append `datum` to the session's log; returns the log and the numbered record.
    fn store(&mut self, id: NativeId, datum: &Datum) -> Result<(LogName, Datum), Status> {
        let session = self.session(id)?;
        if !session.mode.allows_append() {
            return Err(Status::FORBIDDEN);
        }
        let log = session.log;
        let stored = self.logs.get_mut(&log).ok_or(Status::NOT_FOUND)?;
        let recno = stored.records.len() as u64 + 1;
        let assigned = datum.assigned(recno);
        stored.records.push(assigned.clone());
        trace!(log = %log, recno, "stored record");
        Ok((log, assigned))
    }

    fn readable(&self, id: NativeId) -> Result<&StoredLog, Status> {
        let session = self.session(id)?;
        if !session.mode.allows_read() {
            return Err(Status::FORBIDDEN);
        }
        self.logs.get(&session.log).ok_or(Status::NOT_FOUND)
    }

    fn enqueue(&mut self, code: i32, session: NativeId, datum: Option<Datum>, status: Status) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.queue.push_back(RawEvent {
            token: EventToken::new(sequence),
            code,
            session,
            sequence,
            datum,
            status,
        });
    }

    fn start_subscription(
        &mut self,
        id: NativeId,
        backlog: Vec<Datum>,
        start: u64,
        numrecs: u32,
        timeout: Option<Duration>,
    ) {
        let mut remaining = (numrecs > 0).then_some(numrecs);
        let mut start = start;
        for datum in backlog {
            if remaining == Some(0) {
                break;
            }
            start = datum.recno() + 1;
            self.enqueue(EVENT_DATA, id, Some(datum), Status::OK);
            remaining = remaining.map(|left| left - 1);
        }
        if remaining == Some(0) {
            self.enqueue(EVENT_DONE, id, None, Status::OK);
            return;
        }
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        if let Ok(session) = self.session_mut(id) {
            session.subscriptions.push(Subscription {
                start,
                remaining,
                deadline,
            });
        }
    }

    // Hand a freshly stored record to every live subscription on its log.
    fn feed(&mut self, log: LogName, datum: &Datum) {
        let mut emitted = Vec::new();
        for (index, slot) in self.sessions.iter_mut().enumerate() {
            let Some(session) = slot else { continue };
            if session.log != log {
                continue;
            }
            let id = native_id(index);
            session.subscriptions.retain_mut(|sub| {
                if datum.recno() < sub.start {
                    return true;
                }
                sub.start = datum.recno() + 1;
                emitted.push((EVENT_DATA, id, Some(datum.clone()), Status::OK));
                match sub.remaining.as_mut() {
                    Some(left) => {
                        *left -= 1;
                        if *left == 0 {
                            emitted.push((EVENT_DONE, id, None, Status::OK));
                        }
                        *left > 0
                    }
                    None => true,
                }
            });
        }
        for (code, id, datum, status) in emitted {
            self.enqueue(code, id, datum, status);
        }
    }

    fn expire_subscriptions(&mut self, now: Instant) {
        let mut ended = Vec::new();
        for (index, slot) in self.sessions.iter_mut().enumerate() {
            let Some(session) = slot else { continue };
            let before = session.subscriptions.len();
            session
                .subscriptions
                .retain(|sub| sub.deadline.is_none_or(|deadline| deadline > now));
            for _ in session.subscriptions.len()..before {
                ended.push(native_id(index));
            }
        }
        for id in ended {
            debug!(session = %id, "subscription timed out");
            self.enqueue(EVENT_DONE, id, None, Status::TIMED_OUT);
        }
    }

    fn next_subscription_deadline(&self) -> Option<Instant> {
        self.sessions
            .iter()
            .flatten()
            .flat_map(|session| session.subscriptions.iter())
            .filter_map(|sub| sub.deadline)
            .min()
    }

    fn take_event(&mut self, scope: Option<NativeId>) -> Option<RawEvent> {
        let position = match scope {
            None => (!self.queue.is_empty()).then_some(0),
            Some(id) => self.queue.iter().position(|event| event.session == id),
        };
        position.and_then(|index| self.queue.remove(index))
    }

    fn check_scope(&self, key: SessionKey) -> Result<(), Status> {
        match self.session(key.id) {
            Ok(session) if session.incarnation == key.incarnation => Ok(()),
            _ => Err(Status::SESSION_CLOSED),
        }
    }
}

fn slot_index(id: NativeId) -> Option<usize> {
    id.raw()
        .checked_sub(1)
        .and_then(|index| usize::try_from(index).ok())
}

fn native_id(index: usize) -> NativeId {
    NativeId::new(index as u64 + 1)
}

impl Engine for MemoryEngine {
    fn init(&self, router: Option<&str>) -> Status {
        let mut state = self.enter();
        state.router = router.map(str::to_string);
        debug!(router = ?router, "memory engine initialized");
        Status::OK
    }

    fn set_debug(&self, spec: &str) {
        self.enter().debug = Some(spec.to_string());
    }

    fn open(&self, name: &LogName, mode: OpenMode) -> EngineResult<SessionKey> {
        let mut state = self.enter();
        if !state.logs.contains_key(name) {
            return Err(Status::NOT_FOUND);
        }
        let incarnation = state.next_incarnation;
        state.next_incarnation += 1;
        let session = Session {
            log: *name,
            mode,
            incarnation,
            subscriptions: Vec::new(),
        };
        let index = match state.sessions.iter().position(Option::is_none) {
            Some(index) => {
                state.sessions[index] = Some(session);
                index
            }
            None => {
                state.sessions.push(Some(session));
                state.sessions.len() - 1
            }
        };
        Ok(SessionKey {
            id: native_id(index),
            incarnation,
        })
    }

    fn create(&self, name: &LogName, server: &LogName, metadata: &Metadata) -> Status {
        let mut state = self.enter();
        if !name.is_valid() {
            return Status::BAD_REQUEST;
        }
        if !state.servers.contains(server) {
            return Status::UNAVAILABLE;
        }
        if state.logs.contains_key(name) {
            return Status::ALREADY_EXISTS;
        }
        let Ok(wire) = metadata.encode() else {
            return Status::BAD_REQUEST;
        };
        state.logs.insert(
            *name,
            StoredLog {
                server: *server,
                metadata: wire,
                records: Vec::new(),
            },
        );
        Status::OK
    }

    fn close(&self, id: NativeId) -> Status {
        let mut state = self.enter();
        let Some(slot) = slot_index(id).and_then(|index| state.sessions.get_mut(index)) else {
            return Status::SESSION_CLOSED;
        };
        if slot.take().is_none() {
            return Status::SESSION_CLOSED;
        }
        let before = state.queue.len();
        state.queue.retain(|event| event.session != id);
        let discarded = before - state.queue.len();
        if discarded > 0 {
            debug!(session = %id, discarded, "dropped events of closed session");
        }
        drop(state);
        self.ready.notify_all();
        Status::OK
    }

    fn append(&self, id: NativeId, datum: &Datum) -> Status {
        let mut state = self.enter();
        let (log, stored) = match state.store(id, datum) {
            Ok(stored) => stored,
            Err(status) => return status,
        };
        state.feed(log, &stored);
        drop(state);
        self.ready.notify_all();
        Status::CREATED
    }

    fn append_async(&self, id: NativeId, datum: &Datum) -> Status {
        let mut state = self.enter();
        if let Err(status) = state.session(id) {
            return status;
        }
        match state.store(id, datum) {
            Ok((log, stored)) => {
                state.enqueue(EVENT_CREATED, id, Some(stored.clone()), Status::CREATED);
                state.feed(log, &stored);
            }
            Err(status) => {
                debug!(session = %id, %status, "async append failed");
                state.enqueue(EVENT_FAILURE, id, Some(datum.clone()), status);
            }
        }
        drop(state);
        self.ready.notify_all();
        Status::OK
    }

    fn read_by_recno(&self, id: NativeId, recno: u64) -> EngineResult<Datum> {
        let state = self.enter();
        let stored = state.readable(id)?;
        recno
            .checked_sub(1)
            .and_then(|index| stored.records.get(index as usize))
            .cloned()
            .ok_or(Status::NOT_FOUND)
    }

    fn read_by_ts(&self, id: NativeId, ts: &Timestamp) -> EngineResult<Datum> {
        let state = self.enter();
        let stored = state.readable(id)?;
        stored
            .records
            .iter()
            .find(|datum| datum.timestamp().cmp_instant(ts).is_ge())
            .cloned()
            .ok_or(Status::NOT_FOUND)
    }

    fn read_by_recno_async(&self, id: NativeId, firstrec: u64, numrecs: u32) -> Status {
        let mut state = self.enter();
        let batch: Vec<Datum> = match state.readable(id) {
            Ok(stored) => {
                let skip = firstrec.max(1) as usize - 1;
                let take = if numrecs == 0 {
                    usize::MAX
                } else {
                    numrecs as usize
                };
                stored.records.iter().skip(skip).take(take).cloned().collect()
            }
            Err(status) => return status,
        };
        for datum in batch {
            state.enqueue(EVENT_DATA, id, Some(datum), Status::OK);
        }
        state.enqueue(EVENT_DONE, id, None, Status::OK);
        drop(state);
        self.ready.notify_all();
        Status::OK
    }

    fn subscribe_by_recno(
        &self,
        id: NativeId,
        firstrec: u64,
        numrecs: u32,
        timeout: Option<Duration>,
    ) -> Status {
        self.subscribe(
            id,
            |records| {
                let next = records.len() as u64 + 1;
                if firstrec == 0 {
                    (records.len(), next)
                } else {
                    ((firstrec - 1).min(records.len() as u64) as usize, firstrec)
                }
            },
            numrecs,
            timeout,
        )
    }

    fn subscribe_by_ts(
        &self,
        id: NativeId,
        start: &Timestamp,
        numrecs: u32,
        timeout: Option<Duration>,
    ) -> Status {
        self.subscribe(
            id,
            |records| {
                let from = records
                    .iter()
                    .position(|datum| datum.timestamp().cmp_instant(start).is_ge())
                    .unwrap_or(records.len());
                (from, from as u64 + 1)
            },
            numrecs,
            timeout,
        )
    }

    fn unsubscribe(&self, id: NativeId) -> Status {
        let mut state = self.enter();
        let ended = match state.session_mut(id) {
            Ok(session) => session.subscriptions.drain(..).count(),
            Err(status) => return status,
        };
        for _ in 0..ended {
            state.enqueue(EVENT_DONE, id, None, Status::OK);
        }
        drop(state);
        self.ready.notify_all();
        Status::OK
    }

    fn metadata(&self, id: NativeId) -> EngineResult<Metadata> {
        let state = self.enter();
        let session = state.session(id)?;
        let stored = state.logs.get(&session.log).ok_or(Status::NOT_FOUND)?;
        Metadata::decode(&stored.metadata).map_err(|_| Status::UNAVAILABLE)
    }

    fn nrecs(&self, id: NativeId) -> EngineResult<u64> {
        let state = self.enter();
        let session = state.session(id)?;
        let stored = state.logs.get(&session.log).ok_or(Status::NOT_FOUND)?;
        Ok(stored.records.len() as u64)
    }

    fn event_next(&self, scope: Option<SessionKey>, wait: Wait) -> EngineResult<Option<RawEvent>> {
        let deadline = wait.deadline_from(Instant::now());
        let mut state = self.enter();
        loop {
            let now = Instant::now();
            state.expire_subscriptions(now);
            if let Some(key) = scope {
                state.check_scope(key)?;
            }
            if let Some(event) = state.take_event(scope.map(|key| key.id)) {
                state.outstanding.insert(event.token);
                return Ok(Some(event));
            }
            if deadline.is_some_and(|deadline| now >= deadline) {
                return Ok(None);
            }
            let wake = match (deadline, state.next_subscription_deadline()) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
            state = match wake {
                None => self.ready.wait(state).unwrap_or_else(PoisonError::into_inner),
                Some(at) => {
                    self.ready
                        .wait_timeout(state, at.saturating_duration_since(now))
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }

    fn event_free(&self, token: EventToken) -> Status {
        let mut state = self.enter();
        if state.outstanding.remove(&token) {
            Status::OK
        } else {
            Status::BAD_REQUEST
        }
    }

    fn event_watermark(&self) -> u64 {
        self.enter().next_sequence
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryEngine;
    use crate::core::datum::{Datum, Timestamp};
    use crate::core::engine::{
        EVENT_CREATED, EVENT_DATA, EVENT_DONE, EVENT_FAILURE, EVENT_SHUTDOWN, Engine, OpenMode,
        RawEvent, SessionKey, Wait,
    };
    use crate::core::metadata::Metadata;
    use crate::core::name::LogName;
    use crate::core::status::Status;
    use std::time::Duration;

    fn name(byte: u8) -> LogName {
        LogName::new([byte; 32])
    }

    fn engine_with_log(log: LogName) -> MemoryEngine {
        let engine = MemoryEngine::new().with_server(name(0xee));
        assert!(engine.create(&log, &name(0xee), &Metadata::new()).is_ok());
        engine
    }

    fn drain(engine: &MemoryEngine, scope: Option<SessionKey>) -> Vec<RawEvent> {
        let mut events = Vec::new();
        while let Some(event) = engine.event_next(scope, Wait::Immediate).expect("poll") {
            assert!(engine.event_free(event.token).is_ok());
            events.push(event);
        }
        events
    }

    #[test]
    fn create_rules() {
        let engine = MemoryEngine::new().with_server(name(0xee));
        assert_eq!(
            engine.create(&name(0), &name(0xee), &Metadata::new()),
            Status::BAD_REQUEST
        );
        assert_eq!(
            engine.create(&name(1), &name(0xdd), &Metadata::new()),
            Status::UNAVAILABLE
        );
        assert!(engine.create(&name(1), &name(0xee), &Metadata::new()).is_ok());
        assert_eq!(
            engine.create(&name(1), &name(0xee), &Metadata::new()),
            Status::ALREADY_EXISTS
        );
        assert_eq!(engine.server_of(&name(1)), Some(name(0xee)));
    }

    #[test]
    fn open_unknown_log_is_not_found() {
        let engine = MemoryEngine::new();
        let err = engine.open(&name(3), OpenMode::Any).expect_err("missing");
        assert_eq!(err, Status::NOT_FOUND);
    }

    #[test]
    fn lowest_free_native_id_is_reused() {
        let engine = engine_with_log(name(1));
        let a = engine.open(&name(1), OpenMode::Any).expect("a").id;
        let b = engine.open(&name(1), OpenMode::Any).expect("b").id;
        assert_eq!((a.raw(), b.raw()), (1, 2));
        assert!(engine.close(a).is_ok());
        assert_eq!(engine.close(a), Status::SESSION_CLOSED);
        let c = engine.open(&name(1), OpenMode::Any).expect("c").id;
        assert_eq!(c, a);
    }

    #[test]
    fn records_are_numbered_from_one() {
        let engine = engine_with_log(name(1));
        let key = engine.open(&name(1), OpenMode::Any).expect("open");
        let id = key.id;
        assert_eq!(engine.append(id, &Datum::outgoing(&b"a"[..])), Status::CREATED);
        assert_eq!(engine.append(id, &Datum::outgoing(&b"b"[..])), Status::CREATED);
        assert_eq!(engine.nrecs(id).expect("nrecs"), 2);
        let first = engine.read_by_recno(id, 1).expect("read");
        assert_eq!(first.recno(), 1);
        assert_eq!(first.payload().as_ref(), b"a");
        assert_eq!(engine.read_by_recno(id, 0).expect_err("zero"), Status::NOT_FOUND);
        assert_eq!(engine.read_by_recno(id, 3).expect_err("past"), Status::NOT_FOUND);
    }

    #[test]
    fn modes_are_enforced() {
        let engine = engine_with_log(name(1));
        let ro = engine.open(&name(1), OpenMode::ReadOnly).expect("ro").id;
        let ao = engine.open(&name(1), OpenMode::AppendOnly).expect("ao").id;
        assert_eq!(engine.append(ro, &Datum::outgoing(&b"x"[..])), Status::FORBIDDEN);
        assert_eq!(engine.append(ao, &Datum::outgoing(&b"x"[..])), Status::CREATED);
        assert_eq!(engine.read_by_recno(ao, 1).expect_err("ao"), Status::FORBIDDEN);
        assert!(engine.read_by_recno(ro, 1).is_ok());
    }

    #[test]
    fn read_by_ts_finds_first_at_or_after() {
        let engine = engine_with_log(name(1));
        let key = engine.open(&name(1), OpenMode::Any).expect("open");
        let id = key.id;
        for sec in [10, 20, 30] {
            let datum = Datum::new(0, Timestamp::new(sec, 0, 0.0), &b"r"[..]);
            engine.append(id, &datum);
        }
        let hit = engine
            .read_by_ts(id, &Timestamp::new(15, 0, 0.0))
            .expect("read");
        assert_eq!(hit.recno(), 2);
        let miss = engine.read_by_ts(id, &Timestamp::new(31, 0, 0.0));
        assert_eq!(miss.expect_err("miss"), Status::NOT_FOUND);
    }

    #[test]
    fn subscription_from_zero_only_sees_new_records() {
        let engine = engine_with_log(name(1));
        let key = engine.open(&name(1), OpenMode::Any).expect("open");
        let id = key.id;
        engine.append(id, &Datum::outgoing(&b"old"[..]));
        assert!(engine.subscribe_by_recno(id, 0, 2, None).is_ok());
        assert!(drain(&engine, None).is_empty());
        for payload in [&b"n1"[..], &b"n2"[..], &b"n3"[..]] {
            engine.append(id, &Datum::outgoing(payload));
        }
        let events = drain(&engine, Some(key));
        let codes: Vec<i32> = events.iter().map(|event| event.code).collect();
        assert_eq!(codes, vec![EVENT_DATA, EVENT_DATA, EVENT_DONE]);
        let recnos: Vec<u64> = events
            .iter()
            .filter_map(|event| event.datum.as_ref().map(Datum::recno))
            .collect();
        assert_eq!(recnos, vec![2, 3]);
    }

    #[test]
    fn subscription_catches_up_then_follows() {
        let engine = engine_with_log(name(1));
        let key = engine.open(&name(1), OpenMode::Any).expect("open");
        let id = key.id;
        engine.append(id, &Datum::outgoing(&b"1"[..]));
        engine.append(id, &Datum::outgoing(&b"2"[..]));
        assert!(engine.subscribe_by_recno(id, 2, 0, None).is_ok());
        engine.append(id, &Datum::outgoing(&b"3"[..]));
        let recnos: Vec<u64> = drain(&engine, Some(key))
            .iter()
            .filter_map(|event| event.datum.as_ref().map(Datum::recno))
            .collect();
        assert_eq!(recnos, vec![2, 3]);
        assert!(engine.unsubscribe(id).is_ok());
        let tail = drain(&engine, Some(key));
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].code, EVENT_DONE);
    }

    #[test]
    fn multiread_covers_existing_records_only() {
        let engine = engine_with_log(name(1));
        let key = engine.open(&name(1), OpenMode::Any).expect("open");
        let id = key.id;
        engine.append(id, &Datum::outgoing(&b"1"[..]));
        engine.append(id, &Datum::outgoing(&b"2"[..]));
        assert!(engine.multiread(id, 1, 10).is_ok());
        engine.append(id, &Datum::outgoing(&b"3"[..]));
        let codes: Vec<i32> = drain(&engine, Some(key)).iter().map(|e| e.code).collect();
        assert_eq!(codes, vec![EVENT_DATA, EVENT_DATA, EVENT_DONE]);
    }

    #[test]
    fn subscription_deadline_ends_with_done() {
        let engine = engine_with_log(name(1));
        let key = engine.open(&name(1), OpenMode::Any).expect("open");
        let id = key.id;
        assert!(
            engine
                .subscribe_by_recno(id, 0, 0, Some(Duration::from_millis(20)))
                .is_ok()
        );
        let event = engine
            .event_next(Some(key), Wait::Within(Duration::from_secs(5)))
            .expect("poll")
            .expect("event");
        assert_eq!(event.code, EVENT_DONE);
        assert_eq!(event.status, Status::TIMED_OUT);
        assert!(engine.event_free(event.token).is_ok());
    }

    #[test]
    fn async_append_acknowledges_with_created_event() {
        let engine = engine_with_log(name(1));
        let key = engine.open(&name(1), OpenMode::Any).expect("open");
        let id = key.id;
        assert!(engine.append_async(id, &Datum::outgoing(&b"x"[..])).is_ok());
        let events = drain(&engine, None);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].code, EVENT_CREATED);
        assert_eq!(events[0].datum.as_ref().map(Datum::recno), Some(1));
    }

    #[test]
    fn events_are_freed_exactly_once() {
        let engine = engine_with_log(name(1));
        let key = engine.open(&name(1), OpenMode::Any).expect("open");
        let id = key.id;
        engine.append_async(id, &Datum::outgoing(&b"x"[..]));
        let event = engine
            .event_next(None, Wait::Immediate)
            .expect("poll")
            .expect("event");
        assert_eq!(engine.stats().outstanding_events, 1);
        assert!(engine.event_free(event.token).is_ok());
        assert_eq!(engine.event_free(event.token), Status::BAD_REQUEST);
        assert_eq!(engine.stats().outstanding_events, 0);
    }

    #[test]
    fn closing_a_session_discards_its_queued_events() {
        let engine = engine_with_log(name(1));
        let other = engine.open(&name(1), OpenMode::Any).expect("other");
        for _ in 0..20 {
            let key = engine.open(&name(1), OpenMode::Any).expect("open");
            engine.append_async(key.id, &Datum::outgoing(&b"x"[..]));
            assert!(engine.multiread(key.id, 1, 0).is_ok());
            assert!(engine.close(key.id).is_ok());
        }
        assert_eq!(engine.stats().queued_events, 0);

        engine.append_async(other.id, &Datum::outgoing(&b"kept"[..]));
        let victim = engine.open(&name(1), OpenMode::Any).expect("victim");
        engine.append_async(victim.id, &Datum::outgoing(&b"gone"[..]));
        engine.close(victim.id);
        let kept = drain(&engine, Some(other));
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].code, EVENT_CREATED);
        assert_eq!(engine.stats().queued_events, 0);
    }

    #[test]
    fn scoped_poll_rejects_a_reused_native_id() {
        let engine = engine_with_log(name(1));
        let first = engine.open(&name(1), OpenMode::Any).expect("open");
        engine.close(first.id);
        let second = engine.open(&name(1), OpenMode::Any).expect("reopen");
        assert_eq!(first.id, second.id);
        assert_ne!(first.incarnation, second.incarnation);

        engine.append_async(second.id, &Datum::outgoing(&b"new"[..]));
        let err = engine
            .event_next(Some(first), Wait::Immediate)
            .expect_err("old incarnation");
        assert_eq!(err, Status::SESSION_CLOSED);
        assert_eq!(drain(&engine, Some(second)).len(), 1);
    }

    #[test]
    fn scoped_poll_on_closed_session_fails() {
        let engine = engine_with_log(name(1));
        let key = engine.open(&name(1), OpenMode::Any).expect("open");
        engine.close(key.id);
        let err = engine.event_next(Some(key), Wait::Immediate).expect_err("closed");
        assert_eq!(err, Status::SESSION_CLOSED);
    }

    #[test]
    fn async_append_failure_arrives_as_event() {
        let engine = engine_with_log(name(1));
        let key = engine.open(&name(1), OpenMode::ReadOnly).expect("open");
        assert!(engine.append_async(key.id, &Datum::outgoing(&b"x"[..])).is_ok());
        let events = drain(&engine, Some(key));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].code, EVENT_FAILURE);
        assert_eq!(events[0].status, Status::FORBIDDEN);
        assert_eq!(engine.nrecs(key.id).expect("nrecs"), 0);

        engine.close(key.id);
        let err = engine.append_async(key.id, &Datum::outgoing(&b"x"[..]));
        assert_eq!(err, Status::SESSION_CLOSED);
        assert_eq!(engine.stats().queued_events, 0);
    }

    #[test]
    fn shutdown_ends_subscriptions() {
        let engine = engine_with_log(name(1));
        let key = engine.open(&name(1), OpenMode::Any).expect("open");
        let id = key.id;
        engine.subscribe_by_recno(id, 0, 0, None);
        engine.shutdown_subscriptions();
        let events = drain(&engine, None);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].code, EVENT_SHUTDOWN);
    }

    #[test]
    fn debug_and_router_are_recorded_verbatim() {
        let engine = MemoryEngine::new();
        engine.set_debug("*=20");
        assert!(engine.init(Some("127.0.0.1:8007")).is_ok());
        assert_eq!(engine.debug_spec().as_deref(), Some("*=20"));
        assert_eq!(engine.router().as_deref(), Some("127.0.0.1:8007"));
    }
}
