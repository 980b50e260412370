// SPDX-License-Identifier: MIT OR Apache-2.0

//! gRPC bridge for `statuskit-error` values.
//!
//! Outbound, [`GrpcStatusExt::to_status`] serializes an [`Error`] into a
//! [`tonic::Status`] whose protocol code comes from the process-wide
//! [`CodeConverter`] and whose metadata rides as a `google.rpc.ErrorInfo`
//! detail, so it survives a network round trip.  Inbound, [`from_error`]
//! inspects an arbitrary error chain and rebuilds the [`Error`] it carries.
//!
//! Both directions are total: no operation here returns a `Result` or
//! panics, and reconstruction always yields a usable value.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use statuskit_error::{CLIENT_CLOSED, Error, SUCCESS, UNKNOWN_CODE, find_error};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, RwLock};
use tonic::{Code, Status};
use tonic_types::{ErrorDetails, StatusExt};
use tracing::debug;

// ---------------------------------------------------------------------------
// Code conversion
// ---------------------------------------------------------------------------

/// Pure mapping between application error codes and gRPC status codes.
///
/// Implementations must be total in both directions: every input maps to
/// *some* output, with an explicit fallback for codes that have no defined
/// mapping.  Conversion never fails.
pub trait CodeConverter: Send + Sync {
    /// Maps an application code to a gRPC status code.
    fn to_grpc(&self, code: i64) -> Code;

    /// Maps a gRPC status code back to an application code.
    fn from_grpc(&self, code: Code) -> i64;
}

/// The conventional HTTP-to-gRPC mapping table.
///
/// Application codes with no entry map to [`Code::Unknown`]; gRPC codes
/// with no entry map to [`UNKNOWN_CODE`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCodeConverter;

impl CodeConverter for DefaultCodeConverter {
    fn to_grpc(&self, code: i64) -> Code {
        match code {
            200 => Code::Ok,
            400 => Code::InvalidArgument,
            401 => Code::Unauthenticated,
            403 => Code::PermissionDenied,
            404 => Code::NotFound,
            409 => Code::Aborted,
            429 => Code::ResourceExhausted,
            CLIENT_CLOSED => Code::Cancelled,
            500 => Code::Internal,
            501 => Code::Unimplemented,
            502 | 503 => Code::Unavailable,
            504 => Code::DeadlineExceeded,
            _ => Code::Unknown,
        }
    }

    fn from_grpc(&self, code: Code) -> i64 {
        match code {
            Code::Ok => 200,
            Code::InvalidArgument => 400,
            Code::Unauthenticated => 401,
            Code::PermissionDenied => 403,
            Code::NotFound => 404,
            Code::Aborted => 409,
            Code::ResourceExhausted => 429,
            Code::Cancelled => CLIENT_CLOSED,
            Code::Internal => 500,
            Code::Unimplemented => 501,
            Code::Unavailable => 503,
            Code::DeadlineExceeded => 504,
            _ => UNKNOWN_CODE,
        }
    }
}

static CONVERTER: LazyLock<RwLock<Arc<dyn CodeConverter>>> =
    LazyLock::new(|| RwLock::new(Arc::new(DefaultCodeConverter)));

/// The process-wide converter used by [`GrpcStatusExt::to_status`] and
/// [`from_error`].
#[must_use]
pub fn converter() -> Arc<dyn CodeConverter> {
    match CONVERTER.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

/// Replaces the process-wide converter.
///
/// The mapping table is read-mostly state: replace it once, early, before
/// concurrent use begins.  Replacing it while lookups are in flight is not
/// a data race, but in-flight conversions may observe either table.
pub fn set_converter(converter: impl CodeConverter + 'static) {
    let mut guard = match CONVERTER.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    *guard = Arc::new(converter);
}

// ---------------------------------------------------------------------------
// Outbound: Error -> tonic::Status
// ---------------------------------------------------------------------------

/// Serialization seam for returning an [`Error`] from a tonic handler.
pub trait GrpcStatusExt {
    /// Produces the wire-level status for this error.
    ///
    /// The protocol code is `converter().to_grpc(code)`, the message is
    /// carried verbatim, and the metadata map is attached as a
    /// `google.rpc.ErrorInfo` detail.  Never fails.
    fn to_status(&self) -> Status;
}

impl GrpcStatusExt for Error {
    fn to_status(&self) -> Status {
        let metadata: HashMap<String, String> = self
            .metadata()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let details = ErrorDetails::with_error_info("", "", metadata);
        Status::with_error_details(converter().to_grpc(self.code()), self.message(), details)
    }
}

// ---------------------------------------------------------------------------
// Inbound: error chain -> Error
// ---------------------------------------------------------------------------

/// Rebuilds an [`Error`] from an arbitrary error.  Total: always yields a
/// usable value.
///
/// - `None` yields [`static@SUCCESS`].
/// - A chain that carries an [`Error`] yields that value.
/// - A chain that carries a [`tonic::Status`] is rebuilt through the
///   process-wide converter; if the status has an error-info detail, its
///   metadata is attached (the first matching detail wins, any other
///   detail kind is ignored).
/// - Anything else collapses to [`UNKNOWN_CODE`] with the error's string
///   rendering as the message.
#[must_use]
pub fn from_error(err: Option<&(dyn std::error::Error + 'static)>) -> Error {
    let Some(err) = err else {
        return SUCCESS.clone();
    };
    if let Some(found) = find_error(err) {
        return found.clone();
    }
    let Some(status) = find_status(err) else {
        debug!(error = %err, "no grpc status in chain, collapsing to unknown code");
        return Error::new(UNKNOWN_CODE, err.to_string());
    };
    let rebuilt = Error::new(converter().from_grpc(status.code()), status.message());
    match status.get_details_error_info() {
        Some(info) => rebuilt.with_metadata(info.metadata.into_iter().collect()),
        None => {
            debug!(code = %status.code(), "grpc status carries no error-info detail");
            rebuilt
        }
    }
}

/// Walks the source chain looking for a [`tonic::Status`].
fn find_status<'a>(err: &'a (dyn std::error::Error + 'static)) -> Option<&'a Status> {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(status) = e.downcast_ref::<Status>() {
            return Some(status);
        }
        current = e.source();
    }
    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_GRPC_CODES: &[Code] = &[
        Code::Ok,
        Code::Cancelled,
        Code::Unknown,
        Code::InvalidArgument,
        Code::DeadlineExceeded,
        Code::NotFound,
        Code::AlreadyExists,
        Code::PermissionDenied,
        Code::ResourceExhausted,
        Code::FailedPrecondition,
        Code::Aborted,
        Code::OutOfRange,
        Code::Unimplemented,
        Code::Internal,
        Code::Unavailable,
        Code::DataLoss,
        Code::Unauthenticated,
    ];

    #[test]
    fn http_table_maps_to_grpc() {
        let conv = DefaultCodeConverter;
        assert_eq!(conv.to_grpc(200), Code::Ok);
        assert_eq!(conv.to_grpc(400), Code::InvalidArgument);
        assert_eq!(conv.to_grpc(401), Code::Unauthenticated);
        assert_eq!(conv.to_grpc(403), Code::PermissionDenied);
        assert_eq!(conv.to_grpc(404), Code::NotFound);
        assert_eq!(conv.to_grpc(429), Code::ResourceExhausted);
        assert_eq!(conv.to_grpc(499), Code::Cancelled);
        assert_eq!(conv.to_grpc(500), Code::Internal);
        assert_eq!(conv.to_grpc(502), Code::Unavailable);
        assert_eq!(conv.to_grpc(503), Code::Unavailable);
        assert_eq!(conv.to_grpc(504), Code::DeadlineExceeded);
    }

    #[test]
    fn unmapped_app_codes_fall_back_to_unknown() {
        let conv = DefaultCodeConverter;
        assert_eq!(conv.to_grpc(1000400), Code::Unknown);
        assert_eq!(conv.to_grpc(-1), Code::Unknown);
        assert_eq!(conv.to_grpc(0), Code::Unknown);
        assert_eq!(conv.to_grpc(i64::MAX), Code::Unknown);
    }

    #[test]
    fn grpc_table_maps_to_http() {
        let conv = DefaultCodeConverter;
        assert_eq!(conv.from_grpc(Code::Ok), 200);
        assert_eq!(conv.from_grpc(Code::InvalidArgument), 400);
        assert_eq!(conv.from_grpc(Code::Unauthenticated), 401);
        assert_eq!(conv.from_grpc(Code::PermissionDenied), 403);
        assert_eq!(conv.from_grpc(Code::NotFound), 404);
        assert_eq!(conv.from_grpc(Code::ResourceExhausted), 429);
        assert_eq!(conv.from_grpc(Code::Cancelled), CLIENT_CLOSED);
        assert_eq!(conv.from_grpc(Code::Internal), 500);
        assert_eq!(conv.from_grpc(Code::Unavailable), 503);
        assert_eq!(conv.from_grpc(Code::DeadlineExceeded), 504);
    }

    #[test]
    fn every_grpc_code_maps_to_some_app_code() {
        let conv = DefaultCodeConverter;
        for code in ALL_GRPC_CODES {
            let mapped = conv.from_grpc(*code);
            assert!(mapped > 0, "{code:?} mapped to non-positive {mapped}");
        }
    }

    #[test]
    fn unmapped_grpc_codes_fall_back_to_unknown_code() {
        let conv = DefaultCodeConverter;
        assert_eq!(conv.from_grpc(Code::DataLoss), UNKNOWN_CODE);
        assert_eq!(conv.from_grpc(Code::Unknown), UNKNOWN_CODE);
        assert_eq!(conv.from_grpc(Code::AlreadyExists), UNKNOWN_CODE);
    }

    #[test]
    fn mapped_http_codes_roundtrip() {
        let conv = DefaultCodeConverter;
        for code in [200, 400, 401, 403, 404, 409, 429, 499, 500, 501, 503, 504] {
            assert_eq!(conv.from_grpc(conv.to_grpc(code)), code, "code {code}");
        }
    }
}
