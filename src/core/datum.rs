// Log records (datums) and their wall-clock timestamps.
use std::cmp::Ordering;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::core::error::{Error, ErrorKind};

/// Wall-clock time with the writer's claimed accuracy, in seconds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Timestamp {
    pub sec: i64,
    pub nsec: u32,
    pub accuracy: f32,
}

impl Timestamp {
    pub fn new(sec: i64, nsec: u32, accuracy: f32) -> Self {
        Self {
            sec,
            nsec,
            accuracy,
        }
    }

    pub fn now() -> Self {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            sec: elapsed.as_secs() as i64,
            nsec: elapsed.subsec_nanos(),
            accuracy: 0.0,
        }
    }

    pub fn unix_nanos(&self) -> i128 {
        self.sec as i128 * 1_000_000_000 + self.nsec as i128
    }

    /// Orders by instant only; accuracy does not participate.
    pub fn cmp_instant(&self, other: &Timestamp) -> Ordering {
        (self.sec, self.nsec).cmp(&(other.sec, other.nsec))
    }

    pub fn to_rfc3339(&self) -> Result<String, Error> {
        let ts = OffsetDateTime::from_unix_timestamp_nanos(self.unix_nanos()).map_err(|err| {
            Error::new(ErrorKind::InvalidArgument)
                .with_message("invalid timestamp")
                .with_source(err)
        })?;
        ts.format(&Rfc3339).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("timestamp format failed")
                .with_source(err)
        })
    }

    pub fn from_rfc3339(text: &str) -> Result<Self, Error> {
        let ts = OffsetDateTime::parse(text, &Rfc3339).map_err(|err| {
            Error::new(ErrorKind::InvalidArgument)
                .with_message(format!("invalid RFC 3339 timestamp {text:?}"))
                .with_source(err)
        })?;
        Ok(Self {
            sec: ts.unix_timestamp(),
            nsec: ts.nanosecond(),
            accuracy: 0.0,
        })
    }
}

/// One record of a log. Fields are fixed once the datum has been read.
#[derive(Clone, Debug, PartialEq)]
pub struct Datum {
    recno: u64,
    timestamp: Timestamp,
    payload: Bytes,
    signature: Option<Bytes>,
}

impl Datum {
    pub fn new(recno: u64, timestamp: Timestamp, payload: impl Into<Bytes>) -> Self {
        Self {
            recno,
            timestamp,
            payload: payload.into(),
            signature: None,
        }
    }

    /// A datum ready to be submitted: no record number yet, stamped now.
    pub fn outgoing(payload: impl Into<Bytes>) -> Self {
        Self::new(0, Timestamp::now(), payload)
    }

    pub fn with_signature(mut self, signature: impl Into<Bytes>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    /// Copy of this datum as stored under `recno`.
    pub fn assigned(&self, recno: u64) -> Self {
        Self {
            recno,
            ..self.clone()
        }
    }

    pub fn recno(&self) -> u64 {
        self.recno
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn signature(&self) -> Option<&Bytes> {
        self.signature.as_ref()
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }
}
