use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable numeric id assigned by the chat transport.
pub type UserId = i64;

pub const DEFAULT_RATING: f64 = 5.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Passenger,
    Driver,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub display_name: String,
    /// Base64 AES-GCM payload, never the plain number.
    pub encrypted_phone: Option<String>,
    pub role: Role,
    pub blocked: bool,
    pub rating: f64,
    pub trips_count: u32,
    pub training_completed: bool,
    pub registered_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

impl User {
    pub fn new(id: UserId, display_name: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            display_name,
            encrypted_phone: None,
            role: Role::Passenger,
            blocked: false,
            rating: DEFAULT_RATING,
            trips_count: 0,
            training_completed: false,
            registered_at: now,
            last_active_at: now,
        }
    }

    pub fn has_phone(&self) -> bool {
        self.encrypted_phone.as_deref().is_some_and(|p| !p.is_empty())
    }
}
