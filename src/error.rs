//! Error taxonomy for the check engine
//!
//! Failures are classified, not collapsed: callers can distinguish
//! "timed out" from "refused" from "unexpected fault" even though all of
//! them derive the same device status.

use std::fmt;

use serde::Serialize;

/// Reason a reachability probe concluded "unreachable"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProbeFailure {
    /// No answer within the probe timeout
    Timeout,

    /// The address could not be resolved
    ResolutionFailure,

    /// The target actively refused the connection attempt
    Refused,

    /// Any other fault (socket errors, missing privileges, ...)
    Unexpected,
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeFailure::Timeout => write!(f, "timeout"),
            ProbeFailure::ResolutionFailure => write!(f, "resolution-failure"),
            ProbeFailure::Refused => write!(f, "refused"),
            ProbeFailure::Unexpected => write!(f, "unexpected-error"),
        }
    }
}

/// Errors from a single attribute query against a device's management
/// protocol. These are absorbed inside the collector and only ever reduce
/// the collected metrics mapping.
#[derive(Debug)]
pub enum QueryError {
    /// The query did not complete within the per-attempt timeout
    Timeout,

    /// A protocol session could not be opened for the device
    Session(String),

    /// The agent answered with an error (bad key, wrong credential, ...)
    Protocol(String),

    /// The attribute key is not valid for the protocol
    InvalidKey(String),
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::Timeout => write!(f, "attribute query timed out"),
            QueryError::Session(msg) => write!(f, "failed to open protocol session: {}", msg),
            QueryError::Protocol(msg) => write!(f, "protocol error: {}", msg),
            QueryError::InvalidKey(key) => write!(f, "invalid attribute key: {}", key),
        }
    }
}

impl std::error::Error for QueryError {}

/// Result type alias for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors from the device registry collaborator.
///
/// Enumeration failure aborts the current tick only; it is never fatal to
/// the scheduler.
#[derive(Debug)]
pub enum RegistryError {
    /// The registry could not be reached or answered with a fault
    Unavailable(String),

    /// The referenced device does not exist
    UnknownDevice(String),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::Unavailable(msg) => write!(f, "device registry unavailable: {}", msg),
            RegistryError::UnknownDevice(id) => write!(f, "unknown device: {}", id),
        }
    }
}

impl std::error::Error for RegistryError {}
