use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::AppError;
use crate::models::driver::{Driver, Verification, VehicleClass};
use crate::models::user::{Role, User, UserId, DEFAULT_RATING};

/// Users and their 1:1 driver extensions. Never holds locks on both maps at
/// once.
#[derive(Default)]
pub struct UserRegistry {
    users: DashMap<UserId, User>,
    drivers: DashMap<UserId, Driver>,
}

impl UserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the user on first contact, otherwise refreshes last activity.
    /// Returns the user and whether it was just created.
    pub fn touch(&self, id: UserId, display_name: Option<&str>) -> (User, bool) {
        match self.users.entry(id) {
            Entry::Occupied(mut entry) => {
                let user = entry.get_mut();
                user.last_active_at = Utc::now();
                if let Some(name) = display_name.filter(|name| !name.trim().is_empty()) {
                    user.display_name = name.trim().to_string();
                }
                (user.clone(), false)
            }
            Entry::Vacant(entry) => {
                let name = display_name
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map_or_else(|| format!("user {id}"), str::to_string);
                let user = entry.insert(User::new(id, name));
                (user.clone(), true)
            }
        }
    }

    pub fn get_user(&self, id: UserId) -> Option<User> {
        self.users.get(&id).map(|entry| entry.value().clone())
    }

    pub fn get_driver(&self, id: UserId) -> Option<Driver> {
        self.drivers.get(&id).map(|entry| entry.value().clone())
    }

    fn update_user<F>(&self, id: UserId, apply: F) -> Result<User, AppError>
    where
        F: FnOnce(&mut User),
    {
        let mut user = self
            .users
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("user {id} not found")))?;
        apply(&mut user);
        Ok(user.clone())
    }

    pub fn set_phone(&self, id: UserId, encrypted_phone: String) -> Result<User, AppError> {
        self.update_user(id, |user| user.encrypted_phone = Some(encrypted_phone))
    }

    pub fn complete_training(&self, id: UserId) -> Result<User, AppError> {
        self.update_user(id, |user| user.training_completed = true)
    }

    pub fn set_blocked(&self, id: UserId, blocked: bool) -> Result<User, AppError> {
        let user = self.update_user(id, |user| user.blocked = blocked)?;
        if blocked {
            if let Some(mut driver) = self.drivers.get_mut(&id) {
                driver.online = false;
            }
        }
        Ok(user)
    }

    pub fn increment_trips(&self, id: UserId) -> Result<User, AppError> {
        self.update_user(id, |user| user.trips_count = user.trips_count.saturating_add(1))
    }

    /// `average` runs under the user's record lock, so two reviews landing at
    /// once both end up reflected in the stored rating.
    pub fn recompute_rating<F>(&self, id: UserId, average: F) -> Result<User, AppError>
    where
        F: FnOnce() -> Option<f64>,
    {
        self.update_user(id, |user| {
            user.rating = average().unwrap_or(DEFAULT_RATING).clamp(1.0, 5.0);
        })
    }

    /// Stores a pending application. A pending or verified record blocks a
    /// new one; a rejected applicant may apply again.
    pub fn register_driver(&self, driver: Driver) -> Result<Driver, AppError> {
        let id = driver.user_id;
        if !self.users.contains_key(&id) {
            return Err(AppError::NotFound(format!("user {id} not found")));
        }

        let stored = match self.drivers.entry(id) {
            Entry::Occupied(mut entry) => {
                if entry.get().verification != Verification::Rejected {
                    return Err(AppError::Precondition(
                        "driver application already exists".to_string(),
                    ));
                }
                entry.insert(driver);
                entry.get().clone()
            }
            Entry::Vacant(entry) => entry.insert(driver).clone(),
        };

        self.update_user(id, |user| user.role = Role::Driver)?;
        Ok(stored)
    }

    pub fn verify_driver(
        &self,
        id: UserId,
        operator_id: UserId,
        class: Option<VehicleClass>,
        now: DateTime<Utc>,
    ) -> Result<Driver, AppError> {
        let mut driver = self
            .drivers
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))?;

        if driver.verification != Verification::Pending {
            return Err(AppError::InvalidTransition(format!(
                "driver {id} is not pending"
            )));
        }

        driver.verification = Verification::Verified;
        driver.verified_by = Some(operator_id);
        driver.verified_at = Some(now);
        driver.rejection_reason = None;
        if let Some(class) = class {
            driver.vehicle_class = class;
        }

        Ok(driver.clone())
    }

    /// Also revokes a verified driver. The user falls back to passenger so
    /// they can apply again.
    pub fn reject_driver(
        &self,
        id: UserId,
        operator_id: UserId,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Driver, AppError> {
        let rejected = {
            let mut driver = self
                .drivers
                .get_mut(&id)
                .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))?;

            if driver.verification == Verification::Rejected {
                return Err(AppError::InvalidTransition(format!(
                    "driver {id} is already rejected"
                )));
            }

            driver.verification = Verification::Rejected;
            driver.verified_by = Some(operator_id);
            driver.verified_at = Some(now);
            driver.rejection_reason = reason;
            driver.online = false;
            driver.clone()
        };

        self.update_user(id, |user| user.role = Role::Passenger)?;
        Ok(rejected)
    }

    /// Going online requires verification; going offline is always allowed.
    pub fn set_online(&self, id: UserId, online: bool) -> Result<Driver, AppError> {
        let mut driver = self
            .drivers
            .get_mut(&id)
            .ok_or_else(|| AppError::Precondition("not registered as a driver".to_string()))?;

        if online && !driver.is_verified() {
            return Err(AppError::Precondition("driver is not verified".to_string()));
        }

        driver.online = online;
        Ok(driver.clone())
    }

    /// Verified, online, not blocked; oldest registration first.
    pub fn eligible_drivers(&self, limit: usize, exclude: UserId) -> Vec<Driver> {
        let mut candidates: Vec<Driver> = self
            .drivers
            .iter()
            .filter(|entry| entry.is_verified() && entry.online && entry.user_id != exclude)
            .map(|entry| entry.value().clone())
            .collect();

        candidates.retain(|driver| {
            self.users
                .get(&driver.user_id)
                .is_some_and(|user| !user.blocked)
        });
        candidates.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then(a.user_id.cmp(&b.user_id))
        });
        candidates.truncate(limit);
        candidates
    }

    /// Newest applications first.
    pub fn pending_drivers(&self, limit: usize) -> Vec<Driver> {
        let mut pending: Vec<Driver> = self
            .drivers
            .iter()
            .filter(|entry| entry.verification == Verification::Pending)
            .map(|entry| entry.value().clone())
            .collect();

        pending.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        pending.truncate(limit);
        pending
    }

    pub fn all_drivers(&self) -> Vec<Driver> {
        self.drivers
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn driver_count(&self) -> usize {
        self.drivers.len()
    }

    pub fn pending_count(&self) -> usize {
        self.drivers
            .iter()
            .filter(|entry| entry.verification == Verification::Pending)
            .count()
    }
}
