use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::driver::VehicleClass;
use crate::models::user::UserId;

pub type TripId = Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    Searching,
    Accepted,
    Started,
    Completed,
    Cancelled,
}

impl TripStatus {
    pub const ALL: [TripStatus; 5] = [
        TripStatus::Searching,
        TripStatus::Accepted,
        TripStatus::Started,
        TripStatus::Completed,
        TripStatus::Cancelled,
    ];

    /// Statuses in which the ride is under way and waiting can be billed.
    pub const ACTIVE: [TripStatus; 2] = [TripStatus::Accepted, TripStatus::Started];

    pub fn as_str(&self) -> &'static str {
        match self {
            TripStatus::Searching => "searching",
            TripStatus::Accepted => "accepted",
            TripStatus::Started => "started",
            TripStatus::Completed => "completed",
            TripStatus::Cancelled => "cancelled",
        }
    }

    /// Statuses in which a driver is bound to the trip.
    pub fn has_driver(&self) -> bool {
        matches!(
            self,
            TripStatus::Accepted | TripStatus::Started | TripStatus::Completed
        )
    }

    pub fn is_active(&self) -> bool {
        matches!(self, TripStatus::Accepted | TripStatus::Started)
    }
}

impl fmt::Display for TripStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cancellation {
    pub actor: UserId,
    pub reason: Option<String>,
    /// Driver that was bound when the trip was cancelled, if any.
    pub unbound_driver: Option<UserId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trip {
    pub id: TripId,
    pub passenger_id: UserId,
    pub driver_id: Option<UserId>,
    pub origin: String,
    pub destination: String,
    pub vehicle_class: VehicleClass,
    pub distance_km: u32,
    pub price: i64,
    pub status: TripStatus,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancellation: Option<Cancellation>,
    /// Set while the driver's waiting timer runs.
    #[serde(default)]
    pub waiting_started_at: Option<DateTime<Utc>>,
    pub waiting_minutes: u32,
    pub waiting_surcharge: i64,
    pub final_price: Option<i64>,
}

impl Trip {
    pub fn is_party(&self, user_id: UserId) -> bool {
        self.passenger_id == user_id || self.driver_id == Some(user_id)
    }

    /// The other side of the trip from `user_id`'s point of view.
    pub fn counterpart(&self, user_id: UserId) -> Option<UserId> {
        if user_id == self.passenger_id {
            self.driver_id
        } else if self.driver_id == Some(user_id) {
            Some(self.passenger_id)
        } else {
            None
        }
    }
}
