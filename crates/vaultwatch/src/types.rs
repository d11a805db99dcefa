use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Identifier of a storage module, assigned by the controller.
pub type ModuleId = String;

/// Logical number of a safe within its module.
pub type SafeId = u32;

/// Wire value meaning "this field was omitted from the message".
///
/// Never stored; a reported zero leaves the previous field value intact.
pub const NO_REPORT: u8 = 0;

/// Tri-state hardware status as stored for every module and safe field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "lowercase")]
pub enum StatusValue {
    Ok,
    Fault,
    Unknown,
}

impl StatusValue {
    /// Decode a wire byte. `NO_REPORT` and unrecognized values yield `None`
    /// and must leave the stored field untouched.
    pub fn from_wire(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(StatusValue::Ok),
            2 => Some(StatusValue::Fault),
            255 => Some(StatusValue::Unknown),
            _ => None,
        }
    }

    /// Wire encoding of this value.
    pub fn to_wire(self) -> u8 {
        match self {
            StatusValue::Ok => 1,
            StatusValue::Fault => 2,
            StatusValue::Unknown => 255,
        }
    }

    pub fn is_fault(self) -> bool {
        self == StatusValue::Fault
    }
}

impl Default for StatusValue {
    fn default() -> Self {
        Self::Unknown
    }
}

/// Consolidated per-module display status, derived by strict precedence:
/// Person > Error > Warning > Clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "lowercase")]
pub enum ConsolidatedStatus {
    Person,
    Error,
    Warning,
    Clear,
}

impl ConsolidatedStatus {
    /// Decode an icon-only status hint from the wire.
    /// 0 = Error, 1 = Warning, 2 = Person, anything else clears the icon.
    pub fn from_hint(code: u8) -> Self {
        match code {
            0 => ConsolidatedStatus::Error,
            1 => ConsolidatedStatus::Warning,
            2 => ConsolidatedStatus::Person,
            _ => ConsolidatedStatus::Clear,
        }
    }

    /// Icon asset key shown on the storage scheme, `None` for a clear module.
    pub fn icon_key(self) -> Option<&'static str> {
        match self {
            ConsolidatedStatus::Person => Some("person"),
            ConsolidatedStatus::Error => Some("error"),
            ConsolidatedStatus::Warning => Some("warning"),
            ConsolidatedStatus::Clear => None,
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Server error: {0}")]
    Server(String),
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(err.to_string())
    }
}
