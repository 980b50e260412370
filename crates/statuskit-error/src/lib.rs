//! Unified error values with numeric codes for service boundaries.
//!
//! Every error carries a numeric code, a human-readable message, a
//! string-to-string metadata map, and an optional underlying cause.  The
//! same value is raised by request handlers, matched on by callers via
//! [`Error::is`] / [`Error::equal`], and rebuilt on the far side of an RPC
//! hop (see the companion gRPC bridge crate).
//!
//! Errors are immutable once constructed: [`Error::with_cause`] and
//! [`Error::with_metadata`] return a fresh copy with its own metadata map
//! and never touch the receiver.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

// ---------------------------------------------------------------------------
// Reserved codes
// ---------------------------------------------------------------------------

/// Code assigned when a wire status carries no recognizable application
/// mapping.  Conventionally the HTTP internal-server-error value.
pub const UNKNOWN_CODE: i64 = 500;

/// Non-standard HTTP status code for "client closed the request before a
/// response was sent", as defined by nginx.
///
/// <https://httpstatus.in/499/>
pub const CLIENT_CLOSED: i64 = 499;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Passive data holder for an error: code, message, metadata.
///
/// `metadata` is a [`BTreeMap`] so that rendering and serialization are
/// deterministic.  A missing `metadata` field deserializes to the empty
/// map, never to null.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Status {
    /// Application error code.  Always set.
    pub code: i64,
    /// Human-readable message.  May be empty.
    #[serde(default)]
    pub message: String,
    /// Free-form string-to-string metadata.  May be empty, never absent.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Shared handle to an arbitrary underlying cause.
///
/// Copies of an [`Error`] share the cause by reference; causes are never
/// deep-cloned.
pub type Cause = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// The primary error value: a [`Status`] plus an optional cause.
///
/// An `Error` owns its status and metadata exclusively.  [`Clone`] performs
/// a deep copy of the status (the metadata map is copied key by key into a
/// fresh map) while the cause is copied by reference, so a clone can never
/// observably alter the original.
#[derive(Clone)]
pub struct Error {
    status: Status,
    cause: Option<Cause>,
}

impl Error {
    /// Build an error with the given code and message, empty metadata, and
    /// no cause.  Never fails.
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            status: Status {
                code,
                message: message.into(),
                metadata: BTreeMap::new(),
            },
            cause: None,
        }
    }

    /// The application error code.
    #[must_use]
    pub fn code(&self) -> i64 {
        self.status.code
    }

    /// The human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.status.message
    }

    /// The metadata map.
    #[must_use]
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.status.metadata
    }

    /// The embedded [`Status`] record.
    #[must_use]
    pub fn status(&self) -> &Status {
        &self.status
    }

    /// The underlying cause, if any.
    ///
    /// Equivalent to [`std::error::Error::source`]; exposed as an inherent
    /// method so callers need not import the trait.
    #[must_use]
    pub fn cause(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|c| c.as_ref() as &(dyn std::error::Error + 'static))
    }

    /// Returns true iff `err` is, or transitively wraps, an [`Error`] whose
    /// code equals this one's code.
    ///
    /// Message, metadata, and cause are not compared; code equality is the
    /// sole identity criterion.  Wrapping is followed through arbitrary
    /// levels of [`std::error::Error::source`] hops.
    #[must_use]
    pub fn is(&self, err: &(dyn std::error::Error + 'static)) -> bool {
        find_error(err).is_some_and(|e| e.status.code == self.status.code)
    }

    /// Returns true iff this error's code equals `code`.
    #[must_use]
    pub fn equal(&self, code: i64) -> bool {
        self.status.code == code
    }

    /// Returns a copy of this error with `cause` attached.  The receiver is
    /// unchanged.
    #[must_use]
    pub fn with_cause(&self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        let mut err = self.clone();
        err.cause = Some(Arc::new(cause));
        err
    }

    /// Returns a copy of this error with its metadata replaced (not merged)
    /// by `metadata`.  The receiver is unchanged.
    #[must_use]
    pub fn with_metadata(&self, metadata: BTreeMap<String, String>) -> Self {
        let mut err = self.clone();
        err.status.metadata = metadata;
        err
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Field order is stable and used for log matching; metadata renders
        // deterministically thanks to BTreeMap.
        write!(
            f,
            "error: code = {} msg = {} metadata = {:?} cause = ",
            self.status.code, self.status.message, self.status.metadata
        )?;
        match &self.cause {
            Some(cause) => write!(f, "{cause}"),
            None => f.write_str("None"),
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Error")
            .field("code", &self.status.code)
            .field("message", &self.status.message)
            .field("metadata", &self.status.metadata)
            .field("cause", &self.cause.as_ref().map(|c| c.to_string()))
            .finish()
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|c| c.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Convenience result type for fallible service operations.
pub type Result<T> = std::result::Result<T, Error>;

// ---------------------------------------------------------------------------
// Chain walking
// ---------------------------------------------------------------------------

/// Walks the [`std::error::Error::source`] chain starting at `err` and
/// returns the first node that is an [`Error`], if any.
#[must_use]
pub fn find_error<'a>(err: &'a (dyn std::error::Error + 'static)) -> Option<&'a Error> {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(found) = e.downcast_ref::<Error>() {
            return Some(found);
        }
        current = e.source();
    }
    None
}

// ---------------------------------------------------------------------------
// Well-known sentinels
// ---------------------------------------------------------------------------

/// The successful outcome.
pub static SUCCESS: LazyLock<Error> = LazyLock::new(|| Error::new(200, "success"));

/// A request parameter failed validation.
pub static REQUEST_ERR: LazyLock<Error> = LazyLock::new(|| Error::new(400, "request param error"));

/// The request signature could not be verified.
pub static UNAUTHORIZED_ERR: LazyLock<Error> = LazyLock::new(|| Error::new(401, "sign error"));

/// The caller is not authorized for the operation.
pub static FORBIDDEN_ERR: LazyLock<Error> = LazyLock::new(|| Error::new(403, "no auth"));

/// The requested resource does not exist.
pub static NOT_FOUND_ERR: LazyLock<Error> = LazyLock::new(|| Error::new(404, "resource not found"));

/// The caller exceeded its rate limit.
pub static TOO_MANY_REQUEST_ERR: LazyLock<Error> =
    LazyLock::new(|| Error::new(429, "rate limit exceeded"));

/// An unexpected server-side failure.
pub static SERVER_ERR: LazyLock<Error> = LazyLock::new(|| Error::new(500, "server error"));

/// The upstream service is offline.
pub static BAD_GATEWAY_ERR: LazyLock<Error> =
    LazyLock::new(|| Error::new(502, "service offline, unavailable"));

/// The service is shedding load.
pub static SERVICE_UNAVAILABLE_ERR: LazyLock<Error> =
    LazyLock::new(|| Error::new(503, "service protected, unavailable"));

// ---------------------------------------------------------------------------
// String-level reconstruction
// ---------------------------------------------------------------------------

/// Recovers an [`Error`] from an arbitrary error without consulting any
/// wire machinery.  Total: always yields a usable value.
///
/// - `None` yields [`static@SUCCESS`].
/// - An error that is, or wraps, an [`Error`] yields that value.
/// - Otherwise the error's string rendering is parsed: an empty string
///   yields [`static@SUCCESS`], an integer string yields an error with that
///   code and the string as its message, and anything else yields code `-1`
///   with the string as its message.
///
/// This is the fallback path for contexts where errors arrive as plain
/// strings rather than as protocol status objects.
#[must_use]
pub fn analyse_error(err: Option<&(dyn std::error::Error + 'static)>) -> Error {
    let Some(err) = err else {
        return SUCCESS.clone();
    };
    if let Some(found) = find_error(err) {
        return found.clone();
    }
    error_from_string(&err.to_string())
}

/// `-1` is reserved for "non-numeric error string, cause unknown".
fn error_from_string(s: &str) -> Error {
    if s.is_empty() {
        return SUCCESS.clone();
    }
    match s.parse::<i64>() {
        Ok(code) => Error::new(code, s),
        Err(_) => Error::new(-1, s),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
