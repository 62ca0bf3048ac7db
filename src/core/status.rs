// Packed engine status codes: severity, registry, module, detail.
use std::fmt;

const SEVERITY_SHIFT: u32 = 29;
const REGISTRY_SHIFT: u32 = 18;
const MODULE_SHIFT: u32 = 10;
const REGISTRY_MASK: u32 = 0x7ff;
const MODULE_MASK: u32 = 0xff;
const DETAIL_MASK: u32 = 0x3ff;

/// Registry number used by statuses that originate in the log engine.
pub const REGISTRY_CHANLOG: u16 = 0x100;
/// Module number for engine-side request handling.
pub const MODULE_ENGINE: u8 = 1;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Severity {
    Ok,
    Warn,
    Error,
    Severe,
    Abort,
}

impl Severity {
    const fn bits(self) -> u32 {
        match self {
            Severity::Ok => 0,
            Severity::Warn => 4,
            Severity::Error => 5,
            Severity::Severe => 6,
            Severity::Abort => 7,
        }
    }

    fn from_bits(bits: u32) -> Self {
        match bits {
            0..=3 => Severity::Ok,
            4 => Severity::Warn,
            5 => Severity::Error,
            6 => Severity::Severe,
            _ => Severity::Abort,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Severity::Ok => "OK",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Severe => "SEVERE",
            Severity::Abort => "ABORT",
        }
    }
}

/// A 32-bit status word as reported by the engine.
///
/// Anything below [`Severity::Warn`] counts as success; the detail field
/// then only annotates what kind of success it was (e.g. 201 for a created
/// record).
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
pub struct Status(u32);

impl Status {
    pub const OK: Status = Status(0);
    pub const CREATED: Status = Status::engine(Severity::Ok, 201);
    pub const BAD_REQUEST: Status = Status::engine(Severity::Error, 400);
    pub const FORBIDDEN: Status = Status::engine(Severity::Error, 403);
    pub const NOT_FOUND: Status = Status::engine(Severity::Error, 404);
    pub const TIMED_OUT: Status = Status::engine(Severity::Warn, 408);
    pub const ALREADY_EXISTS: Status = Status::engine(Severity::Error, 409);
    pub const SESSION_CLOSED: Status = Status::engine(Severity::Error, 410);
    pub const MISSING: Status = Status::engine(Severity::Warn, 430);
    pub const UNAVAILABLE: Status = Status::engine(Severity::Severe, 503);
    pub const SHUTDOWN: Status = Status::engine(Severity::Severe, 515);

    pub const fn new(severity: Severity, registry: u16, module: u8, detail: u16) -> Self {
        Status(
            (severity.bits() << SEVERITY_SHIFT)
                | ((registry as u32 & REGISTRY_MASK) << REGISTRY_SHIFT)
                | ((module as u32 & MODULE_MASK) << MODULE_SHIFT)
                | (detail as u32 & DETAIL_MASK),
        )
    }

    const fn engine(severity: Severity, detail: u16) -> Self {
        Status::new(severity, REGISTRY_CHANLOG, MODULE_ENGINE, detail)
    }

    pub fn from_code(code: u32) -> Self {
        Status(code)
    }

    pub fn code(self) -> u32 {
        self.0
    }

    pub fn severity(self) -> Severity {
        Severity::from_bits(self.0 >> SEVERITY_SHIFT)
    }

    pub fn registry(self) -> u16 {
        ((self.0 >> REGISTRY_SHIFT) & REGISTRY_MASK) as u16
    }

    pub fn module(self) -> u8 {
        ((self.0 >> MODULE_SHIFT) & MODULE_MASK) as u8
    }

    pub fn detail(self) -> u16 {
        (self.0 & DETAIL_MASK) as u16
    }

    pub fn is_ok(self) -> bool {
        self.severity() < Severity::Warn
    }

    /// `Ok` for success severities, otherwise the status itself as the error.
    pub fn into_result(self) -> Result<(), Status> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(self)
        }
    }

    pub fn with_severity(self, severity: Severity) -> Self {
        let cleared = self.0 & !(0x7 << SEVERITY_SHIFT);
        Status(cleared | (severity.bits() << SEVERITY_SHIFT))
    }
}

impl Default for Status {
    fn default() -> Self {
        Status::OK
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} [{}:{}] (0x{:08x})",
            self.severity().label(),
            self.detail(),
            self.registry(),
            self.module(),
            self.0
        )
    }
}

impl fmt::Debug for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Status({self})")
    }
}
