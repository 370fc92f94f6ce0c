use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::game::CancelReason;
use crate::model::User;
use crate::types::{Amount, Millis, UserRef};

#[derive(Debug, Deserialize)]
pub struct OpenAccountRequest {
    pub display_name: String,
    #[serde(default)]
    pub opening_balance: Amount,
}

#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub user_ref: UserRef,
    pub display_name: String,
    pub is_active: bool,
}

impl From<User> for AccountResponse {
    fn from(user: User) -> Self {
        Self {
            user_ref: user.reference,
            display_name: user.display_name,
            is_active: user.is_active,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MatchRequestBody {
    #[serde(default)]
    pub legend_ref: Option<String>,
    #[serde(default)]
    pub opening_ref: Option<String>,
    pub initial_time_seconds: u32,
    pub increment_seconds: u32,
    pub stake_amount: Amount,
}

#[derive(Debug, Deserialize)]
pub struct InviteBody {
    pub stake_amount: Amount,
    pub initial_time_seconds: u32,
    pub increment_seconds: u32,
}

#[derive(Debug, Deserialize)]
pub struct MoveBody {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub promotion: Option<String>,
    pub fen: String,
    pub move_history: Vec<String>,
    pub white_time_remaining: Millis,
    pub black_time_remaining: Millis,
}

#[derive(Debug, Deserialize)]
pub struct ClockBody {
    pub white_time_remaining: Millis,
    pub black_time_remaining: Millis,
    pub last_move_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CancelBody {
    pub reason: CancelReason,
}

#[derive(Debug, Serialize)]
pub struct SweepResponse {
    pub expired: u64,
}
