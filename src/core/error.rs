use std::error::Error as StdError;
use std::fmt;

use crate::core::name::LogName;
use crate::core::status::Status;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Internal,
    HandleClosed,
    NotFound,
    AlreadyExists,
    InvalidArgument,
    EngineFailure,
    StaleEvent,
    DuplicateHandle,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    operation: Option<&'static str>,
    log: Option<LogName>,
    recno: Option<u64>,
    status: Option<Status>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            operation: None,
            log: None,
            recno: None,
            status: None,
            source: None,
        }
    }

    /// Build an error from a failing engine status, picking the kind from
    /// the status detail.
    pub fn from_status(status: Status) -> Self {
        Error::new(kind_for_status(status)).with_status(status)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn operation(&self) -> Option<&'static str> {
        self.operation
    }

    pub fn log(&self) -> Option<&LogName> {
        self.log.as_ref()
    }

    pub fn recno(&self) -> Option<u64> {
        self.recno
    }

    pub fn status(&self) -> Option<Status> {
        self.status
    }

    pub fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_operation(mut self, operation: &'static str) -> Self {
        self.operation = Some(operation);
        self
    }

    pub fn with_log(mut self, log: LogName) -> Self {
        self.log = Some(log);
        self
    }

    pub fn with_recno(mut self, recno: u64) -> Self {
        self.recno = Some(recno);
        self
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(operation) = self.operation {
            write!(f, " (op: {operation})")?;
        }
        if let Some(log) = &self.log {
            write!(f, " (log: {log})")?;
        }
        if let Some(recno) = self.recno {
            write!(f, " (recno: {recno})")?;
        }
        if let Some(status) = self.status {
            write!(f, " (status: {status})")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

/// Map a status at or above warning severity to the error kind callers see.
pub fn kind_for_status(status: Status) -> ErrorKind {
    match status.detail() {
        400 => ErrorKind::InvalidArgument,
        404 => ErrorKind::NotFound,
        409 => ErrorKind::AlreadyExists,
        410 => ErrorKind::HandleClosed,
        _ => ErrorKind::EngineFailure,
    }
}

/// Stable numeric code per kind, for bindings that cannot carry the enum.
pub fn error_kind_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Internal => 1,
        ErrorKind::HandleClosed => 2,
        ErrorKind::NotFound => 3,
        ErrorKind::AlreadyExists => 4,
        ErrorKind::InvalidArgument => 5,
        ErrorKind::EngineFailure => 6,
        ErrorKind::StaleEvent => 7,
        ErrorKind::DuplicateHandle => 8,
    }
}

/// Treat statuses below warning as success and discard them.
pub fn check_status(status: Status) -> Result<(), Error> {
    if status.is_ok() {
        Ok(())
    } else {
        Err(Error::from_status(status))
    }
}

#[cfg(test)]
mod tests {
    use super::{Error, ErrorKind, check_status, error_kind_code, kind_for_status};
    use crate::core::name::LogName;
    use crate::core::status::{Severity, Status};

    #[test]
    fn status_details_map_to_kinds() {
        let cases = [
            (Status::BAD_REQUEST, ErrorKind::InvalidArgument),
            (Status::NOT_FOUND, ErrorKind::NotFound),
            (Status::ALREADY_EXISTS, ErrorKind::AlreadyExists),
            (Status::SESSION_CLOSED, ErrorKind::HandleClosed),
            (Status::FORBIDDEN, ErrorKind::EngineFailure),
            (Status::UNAVAILABLE, ErrorKind::EngineFailure),
        ];

        for (status, kind) in cases {
            assert_eq!(kind_for_status(status), kind);
        }
    }

    #[test]
    fn kind_code_mapping_is_stable() {
        let cases = [
            (ErrorKind::Internal, 1),
            (ErrorKind::HandleClosed, 2),
            (ErrorKind::NotFound, 3),
            (ErrorKind::AlreadyExists, 4),
            (ErrorKind::InvalidArgument, 5),
            (ErrorKind::EngineFailure, 6),
            (ErrorKind::StaleEvent, 7),
            (ErrorKind::DuplicateHandle, 8),
        ];

        for (kind, code) in cases {
            assert_eq!(error_kind_code(kind), code);
        }
    }

    #[test]
    fn ok_severity_statuses_are_discarded() {
        check_status(Status::OK).expect("ok");
        check_status(Status::CREATED).expect("created");
        let err = check_status(Status::TIMED_OUT).expect_err("warn fails");
        assert_eq!(err.kind(), ErrorKind::EngineFailure);
        assert_eq!(err.status(), Some(Status::TIMED_OUT));
    }

    #[test]
    fn warning_with_known_detail_keeps_kind() {
        let status = Status::NOT_FOUND.with_severity(Severity::Warn);
        let err = check_status(status).expect_err("warn fails");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn display_carries_diagnostic_context() {
        let log = LogName::from_bytes(&[7u8; 32]).expect("name");
        let err = Error::from_status(Status::UNAVAILABLE)
            .with_operation("append")
            .with_log(log)
            .with_recno(12)
            .with_message("append(len=5)");
        let text = err.to_string();
        assert!(text.starts_with("EngineFailure: append(len=5)"), "{text}");
        assert!(text.contains("(op: append)"), "{text}");
        assert!(text.contains(&log.to_string()), "{text}");
        assert!(text.contains("(recno: 12)"), "{text}");
        assert!(text.contains("SEVERE:503"), "{text}");
    }
}
