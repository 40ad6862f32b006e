use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::user::UserId;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum VehicleClass {
    Economy,
    Comfort,
    Business,
}

impl VehicleClass {
    pub const ALL: [VehicleClass; 3] = [
        VehicleClass::Economy,
        VehicleClass::Comfort,
        VehicleClass::Business,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleClass::Economy => "economy",
            VehicleClass::Comfort => "comfort",
            VehicleClass::Business => "business",
        }
    }
}

impl fmt::Display for VehicleClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VehicleClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "economy" => Ok(VehicleClass::Economy),
            "comfort" => Ok(VehicleClass::Comfort),
            "business" => Ok(VehicleClass::Business),
            other => Err(format!("unknown vehicle class: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Verification {
    Pending,
    Verified,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub user_id: UserId,
    pub full_name: String,
    pub vehicle_model: String,
    pub plate_number: String,
    pub vehicle_class: VehicleClass,
    pub experience_years: u8,
    pub verification: Verification,
    pub verified_by: Option<UserId>,
    pub verified_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    /// Always false unless `verification` is `Verified`.
    pub online: bool,
    pub created_at: DateTime<Utc>,
}

impl Driver {
    pub fn is_verified(&self) -> bool {
        self.verification == Verification::Verified
    }
}
