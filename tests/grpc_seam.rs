// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end journey across the RPC seam: raise, serialize, reconstruct.

use statuskit_error::NOT_FOUND_ERR;
use statuskit_grpc::{GrpcStatusExt, from_error};
use std::collections::BTreeMap;
use tonic::{Code, Status};

/// Stands in for a tonic handler: domain errors leave as wire statuses.
fn lookup_order(id: u64) -> Result<String, Status> {
    if id == 0 {
        let err = NOT_FOUND_ERR
            .with_metadata(BTreeMap::from([("order".to_string(), id.to_string())]));
        return Err(err.to_status());
    }
    Ok(format!("order-{id}"))
}

#[test]
fn handler_error_survives_the_seam() {
    let status = lookup_order(0).unwrap_err();
    assert_eq!(status.code(), Code::NotFound);
    assert_eq!(status.message(), "resource not found");

    // Client side: rebuild the application error from the wire status.
    let rebuilt = from_error(Some(&status));
    assert!(rebuilt.equal(404));
    assert_eq!(rebuilt.message(), "resource not found");
    assert_eq!(
        rebuilt.metadata().get("order").map(String::as_str),
        Some("0")
    );
    assert!(NOT_FOUND_ERR.is(&rebuilt));
}

#[test]
fn success_path_carries_no_error() {
    assert_eq!(lookup_order(7).unwrap(), "order-7");
}

#[test]
fn double_hop_is_stable() {
    let first = from_error(Some(&lookup_order(0).unwrap_err()));
    let second = from_error(Some(&first.to_status()));
    assert_eq!(second.code(), first.code());
    assert_eq!(second.message(), first.message());
    assert_eq!(second.metadata(), first.metadata());
}
