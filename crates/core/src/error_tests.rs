// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::ErrorCode;

#[test]
fn http_status_mapping() {
    assert_eq!(ErrorCode::BadRequest.http_status(), 400);
    assert_eq!(ErrorCode::Unauthorized.http_status(), 401);
    assert_eq!(ErrorCode::Forbidden.http_status(), 403);
    assert_eq!(ErrorCode::NotFound.http_status(), 404);
    assert_eq!(ErrorCode::Conflict.http_status(), 409);
    assert_eq!(ErrorCode::Unavailable.http_status(), 503);
    assert_eq!(ErrorCode::Internal.http_status(), 500);
}

#[test]
fn wire_codes_are_stable() {
    assert_eq!(ErrorCode::Conflict.as_str(), "CONFLICT");
    assert_eq!(ErrorCode::Internal.as_str(), "INTERNAL_ERROR");
    assert_eq!(ErrorCode::NotFound.as_str(), "NOT_FOUND");
}

#[test]
fn grpc_status_carries_message() {
    let status = ErrorCode::Conflict.to_grpc_status("already streaming");
    assert_eq!(status.code(), tonic::Code::FailedPrecondition);
    assert_eq!(status.message(), "already streaming");
}

#[test]
fn error_body_shape() -> anyhow::Result<()> {
    let body = ErrorCode::Forbidden.to_error_body("not the room owner");
    let json = serde_json::to_string(&body)?;
    assert!(json.contains("\"code\":\"FORBIDDEN\""));
    assert!(json.contains("not the room owner"));
    Ok(())
}
