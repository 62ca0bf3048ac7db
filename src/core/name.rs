// 256-bit names for logs and hosting servers; printable as 64 hex digits.
use std::fmt;
use std::fmt::Write as _;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::error::{Error, ErrorKind};

pub const NAME_LEN: usize = 32;

#[derive(Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LogName([u8; NAME_LEN]);

impl LogName {
    pub const fn new(bytes: [u8; NAME_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let raw: [u8; NAME_LEN] = bytes.try_into().map_err(|_| {
            Error::new(ErrorKind::InvalidArgument)
                .with_message(format!("name must be {NAME_LEN} bytes, got {}", bytes.len()))
        })?;
        Ok(Self(raw))
    }

    pub fn as_bytes(&self) -> &[u8; NAME_LEN] {
        &self.0
    }

    /// The all-zero name is reserved and never names a real log or server.
    pub fn is_valid(&self) -> bool {
        self.0.iter().any(|byte| *byte != 0)
    }

    pub fn printable(&self) -> String {
        let mut hex = String::with_capacity(NAME_LEN * 2);
        for byte in self.0 {
            let _ = write!(hex, "{byte:02x}");
        }
        hex
    }
}

impl fmt::Display for LogName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.printable())
    }
}

impl fmt::Debug for LogName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let printable = self.printable();
        write!(f, "LogName({}..)", &printable[..12])
    }
}

impl FromStr for LogName {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let input = input.trim();
        if input.len() != NAME_LEN * 2 {
            return Err(Error::new(ErrorKind::InvalidArgument).with_message(format!(
                "printable name must be {} hex digits, got {}",
                NAME_LEN * 2,
                input.len()
            )));
        }
        let mut out = [0u8; NAME_LEN];
        for (index, chunk) in input.as_bytes().chunks(2).enumerate() {
            let pair = std::str::from_utf8(chunk).map_err(|err| {
                Error::new(ErrorKind::InvalidArgument)
                    .with_message("printable name is not ASCII")
                    .with_source(err)
            })?;
            out[index] = u8::from_str_radix(pair, 16).map_err(|err| {
                Error::new(ErrorKind::InvalidArgument)
                    .with_message(format!("invalid hex digit pair {pair:?} in name"))
                    .with_source(err)
            })?;
        }
        Ok(Self(out))
    }
}

impl TryFrom<String> for LogName {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LogName> for String {
    fn from(name: LogName) -> Self {
        name.printable()
    }
}
