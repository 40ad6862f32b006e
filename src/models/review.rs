use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::trip::TripId;
use crate::models::user::UserId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: u64,
    pub trip_id: TripId,
    pub rater_id: UserId,
    pub ratee_id: UserId,
    pub rating: u8,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}
