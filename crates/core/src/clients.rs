// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thin HTTP clients for the external collaborators the fabric depends on:
//! the auth service (token validation) and the room directory (ownership
//! checks). Both are specified by their interfaces only; everything else
//! about them lives outside this repository.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// An authenticated identity returned by the auth service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthedUser {
    pub user_id: String,
    pub username: String,
}

/// A room record from the room directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomRecord {
    pub room_id: String,
    pub owner_id: String,
}

#[derive(Debug, Serialize)]
struct ValidatePayload<'a> {
    token: &'a str,
}

/// Client for the external auth service.
#[derive(Clone)]
pub struct AuthClient {
    http: reqwest::Client,
    base_url: String,
}

impl AuthClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(CLIENT_TIMEOUT)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    /// Validate a bearer token. `Ok(None)` means the token was rejected;
    /// `Err` means the auth service could not be reached.
    pub async fn validate(&self, token: &str) -> anyhow::Result<Option<AuthedUser>> {
        let url = format!("{}/api/v1/auth/validate", self.base_url);
        let resp = self.http.post(&url).json(&ValidatePayload { token }).send().await?;
        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            debug!("token rejected by auth service");
            return Ok(None);
        }
        let resp = resp.error_for_status()?;
        Ok(Some(resp.json::<AuthedUser>().await?))
    }
}

/// Client for the external room directory.
#[derive(Clone)]
pub struct RoomDirectory {
    http: reqwest::Client,
    base_url: String,
}

impl RoomDirectory {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(CLIENT_TIMEOUT)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    /// Fetch a room record. `Ok(None)` means the room does not exist.
    pub async fn get_room(&self, room_id: &str) -> anyhow::Result<Option<RoomRecord>> {
        let url = format!("{}/api/v1/rooms/{room_id}", self.base_url);
        let resp = self.http.get(&url).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = resp.error_for_status()?;
        Ok(Some(resp.json::<RoomRecord>().await?))
    }
}
