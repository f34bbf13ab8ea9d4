//! Error taxonomy.
//!
//! Errors fall into three families:
//!
//! - [`TransportError`]: the call could not be sent, or the connection went away.
//! - [`RemoteError`]: the backend answered with an explicit error response.
//! - [`ProjectionError`]: a response arrived but could not be adapted to the
//!   shape a [`Promise`](crate::Promise) projection expected.
//!
//! [`RpcError`] is what travels through chains and forks. It is `Clone`
//! because a fork replays the same error to every branch.

use std::fmt;

/// Error codes carried by remote error responses.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Unknown = 0,
    InvalidArgument = 1,
    NotFound = 2,
    Unimplemented = 3,
    FailedPrecondition = 4,
    ResourceExhausted = 5,
    Internal = 6,
}

impl ErrorCode {
    /// Convert from a u32 wire value.
    pub fn from_u32(val: u32) -> Option<Self> {
        Some(match val {
            0 => ErrorCode::Unknown,
            1 => ErrorCode::InvalidArgument,
            2 => ErrorCode::NotFound,
            3 => ErrorCode::Unimplemented,
            4 => ErrorCode::FailedPrecondition,
            5 => ErrorCode::ResourceExhausted,
            6 => ErrorCode::Internal,
            _ => return None,
        })
    }

    pub fn as_u32(self) -> u32 {
        self as u32
    }

    pub fn description(self) -> &'static str {
        match self {
            ErrorCode::Unknown => "unknown error",
            ErrorCode::InvalidArgument => "invalid argument",
            ErrorCode::NotFound => "not found",
            ErrorCode::Unimplemented => "unimplemented",
            ErrorCode::FailedPrecondition => "failed precondition",
            ErrorCode::ResourceExhausted => "resource exhausted",
            ErrorCode::Internal => "internal error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// The RPC call could not be delivered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportError {
    /// The transport (or the session on top of it) is closed.
    Closed,
    /// Too many calls are awaiting a response on this session.
    TooManyPendingCalls { limit: usize },
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Closed => f.write_str("transport closed"),
            TransportError::TooManyPendingCalls { limit } => {
                write!(f, "too many pending calls (limit {})", limit)
            }
        }
    }
}

impl std::error::Error for TransportError {}

/// An explicit error response from the backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteError {
    pub code: ErrorCode,
    pub message: String,
}

impl RemoteError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for RemoteError {}

/// Errors that settle an RPC future.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RpcError {
    /// The call could not be sent or the connection failed.
    Transport(TransportError),
    /// The backend returned an error response.
    Remote(RemoteError),
    /// The request was rejected before it was written (empty method name,
    /// a pipelined capability field that does not hold a capability, ...).
    InvalidRequest(String),
}

impl RpcError {
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        RpcError::InvalidRequest(reason.into())
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcError::Transport(e) => write!(f, "transport error: {}", e),
            RpcError::Remote(e) => write!(f, "remote error: {}", e),
            RpcError::InvalidRequest(reason) => write!(f, "invalid request: {}", reason),
        }
    }
}

impl std::error::Error for RpcError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RpcError::Transport(e) => Some(e),
            RpcError::Remote(e) => Some(e),
            RpcError::InvalidRequest(_) => None,
        }
    }
}

impl From<TransportError> for RpcError {
    fn from(e: TransportError) -> Self {
        RpcError::Transport(e)
    }
}

impl From<RemoteError> for RpcError {
    fn from(e: RemoteError) -> Self {
        RpcError::Remote(e)
    }
}

/// A response field is missing or does not have the expected shape.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldError {
    Missing {
        field: String,
    },
    WrongType {
        field: String,
        expected: &'static str,
        found: &'static str,
    },
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldError::Missing { field } => write!(f, "missing field `{}`", field),
            FieldError::WrongType {
                field,
                expected,
                found,
            } => write!(f, "field `{}`: expected {}, found {}", field, expected, found),
        }
    }
}

impl std::error::Error for FieldError {}

impl From<FieldError> for RpcError {
    fn from(e: FieldError) -> Self {
        RpcError::InvalidRequest(e.to_string())
    }
}

/// A response could not be adapted to the shape the UI expects.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProjectionError {
    Field(FieldError),
    /// An unsigned value does not fit the signed 64-bit UI integer.
    IntegerOverflow { value: u64 },
    /// Capabilities have no UI representation.
    Capability,
    Malformed(String),
}

impl ProjectionError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        ProjectionError::Malformed(reason.into())
    }
}

impl fmt::Display for ProjectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectionError::Field(e) => write!(f, "malformed response: {}", e),
            ProjectionError::IntegerOverflow { value } => {
                write!(f, "malformed response: {} does not fit a 64-bit integer", value)
            }
            ProjectionError::Capability => {
                f.write_str("malformed response: capability where data was expected")
            }
            ProjectionError::Malformed(reason) => write!(f, "malformed response: {}", reason),
        }
    }
}

impl std::error::Error for ProjectionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProjectionError::Field(e) => Some(e),
            _ => None,
        }
    }
}

impl From<FieldError> for ProjectionError {
    fn from(e: FieldError) -> Self {
        ProjectionError::Field(e)
    }
}
