use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::client::wire::{AuctionStatus, UserId};
use super::domain::Repository;

pub type AppState = Arc<Mutex<Repository>>;

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct AuctionQuery {
    pub status: Option<AuctionStatus>,
}

/// Payload of a session token: base64 encoded JSON naming the user.
///
/// Tokens are only honoured while the repository still maps them to the
/// same user, so a well-formed but unissued token is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "_id")]
    pub user_id: UserId,
    pub iat: i64,
    pub jti: String,
}

impl Claims {
    pub fn new(user_id: UserId, issued_at: DateTime<Utc>) -> Self {
        Claims {
            user_id,
            iat: issued_at.timestamp(),
            jti: Uuid::new_v4().simple().to_string(),
        }
    }

    pub fn encode(&self) -> String {
        let json = serde_json::json!({
            "_id": self.user_id,
            "iat": self.iat,
            "jti": self.jti,
        });
        general_purpose::URL_SAFE_NO_PAD.encode(json.to_string())
    }

    pub fn decode(token: &str) -> Option<Self> {
        let decoded = general_purpose::URL_SAFE_NO_PAD.decode(token).ok()?;
        serde_json::from_slice(&decoded).ok()
    }
}
