use std::collections::HashMap;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::error::AppError;
use crate::models::trip::{Trip, TripId, TripStatus};
use crate::models::user::UserId;

#[derive(Default)]
pub struct TripStore {
    trips: DashMap<TripId, Trip>,
}

impl TripStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, trip: Trip) {
        self.trips.insert(trip.id, trip);
    }

    pub fn get(&self, id: &TripId) -> Option<Trip> {
        self.trips.get(id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.trips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trips.is_empty()
    }

    /// Compare-and-swap `searching -> accepted`, binding `driver_id` under the
    /// same record lock. Any other current status means the race was lost.
    pub fn claim(&self, id: &TripId, driver_id: UserId, now: DateTime<Utc>) -> Result<Trip, AppError> {
        let mut entry = self
            .trips
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("trip {id} not found")))?;

        if entry.status != TripStatus::Searching {
            return Err(AppError::AlreadyClaimed);
        }

        entry.status = TripStatus::Accepted;
        entry.driver_id = Some(driver_id);
        entry.accepted_at = Some(now);

        Ok(entry.clone())
    }

    /// Applies `apply` to a copy of the trip and stores it only if the current
    /// status is in `expected` and `apply` succeeds. On error the stored record
    /// is untouched.
    pub fn transition<F>(&self, id: &TripId, expected: &[TripStatus], apply: F) -> Result<Trip, AppError>
    where
        F: FnOnce(&mut Trip) -> Result<(), AppError>,
    {
        let mut entry = self
            .trips
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("trip {id} not found")))?;

        if !expected.contains(&entry.status) {
            return Err(AppError::InvalidTransition(format!(
                "trip {id} is {}",
                entry.status
            )));
        }

        let mut updated = entry.clone();
        apply(&mut updated)?;
        *entry = updated.clone();

        Ok(updated)
    }

    /// Most recent first.
    pub fn for_passenger(&self, passenger_id: UserId, limit: usize) -> Vec<Trip> {
        let mut trips: Vec<Trip> = self
            .trips
            .iter()
            .filter(|entry| entry.passenger_id == passenger_id)
            .map(|entry| entry.value().clone())
            .collect();

        trips.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        trips.truncate(limit);
        trips
    }

    /// Completed trips driven by `driver_id`, most recently completed first.
    pub fn completed_by_driver(&self, driver_id: UserId, limit: usize) -> Vec<Trip> {
        let mut trips: Vec<Trip> = self
            .trips
            .iter()
            .filter(|entry| {
                entry.driver_id == Some(driver_id) && entry.status == TripStatus::Completed
            })
            .map(|entry| entry.value().clone())
            .collect();

        trips.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        trips.truncate(limit);
        trips
    }

    /// Latest accepted or started trip the user takes part in.
    pub fn active_for_user(&self, user_id: UserId) -> Option<Trip> {
        self.trips
            .iter()
            .filter(|entry| entry.status.is_active() && entry.is_party(user_id))
            .map(|entry| entry.value().clone())
            .max_by(|a, b| a.created_at.cmp(&b.created_at))
    }

    pub fn count_by_status(&self) -> HashMap<TripStatus, usize> {
        let mut counts: HashMap<TripStatus, usize> =
            TripStatus::ALL.iter().map(|status| (*status, 0)).collect();

        for entry in self.trips.iter() {
            *counts.entry(entry.status).or_default() += 1;
        }
        counts
    }

    pub fn created_since(&self, since: DateTime<Utc>) -> usize {
        self.trips
            .iter()
            .filter(|entry| entry.created_at >= since)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use uuid::Uuid;

    use super::TripStore;
    use crate::error::AppError;
    use crate::models::driver::VehicleClass;
    use crate::models::trip::{Trip, TripStatus};

    fn searching_trip(passenger_id: i64) -> Trip {
        Trip {
            id: Uuid::new_v4(),
            passenger_id,
            driver_id: None,
            origin: "Moscow".to_string(),
            destination: "Tver".to_string(),
            vehicle_class: VehicleClass::Economy,
            distance_km: 180,
            price: 2200,
            status: TripStatus::Searching,
            created_at: Utc::now(),
            accepted_at: None,
            started_at: None,
            completed_at: None,
            cancellation: None,
            waiting_started_at: None,
            waiting_minutes: 0,
            waiting_surcharge: 0,
            final_price: None,
        }
    }

    #[test]
    fn second_claim_is_rejected_and_keeps_first_driver() {
        let store = TripStore::new();
        let trip = searching_trip(1);
        store.insert(trip.clone());

        let claimed = store.claim(&trip.id, 10, Utc::now()).unwrap();
        assert_eq!(claimed.status, TripStatus::Accepted);

        assert!(matches!(
            store.claim(&trip.id, 11, Utc::now()),
            Err(AppError::AlreadyClaimed)
        ));
        assert_eq!(store.get(&trip.id).unwrap().driver_id, Some(10));
    }

    #[test]
    fn concurrent_claims_have_exactly_one_winner() {
        let store = Arc::new(TripStore::new());
        let trip = searching_trip(1);
        store.insert(trip.clone());

        let handles: Vec<_> = (100..132)
            .map(|driver_id| {
                let store = store.clone();
                let trip_id = trip.id;
                std::thread::spawn(move || {
                    store.claim(&trip_id, driver_id, Utc::now()).map(|_| driver_id)
                })
            })
            .collect();

        let results: Vec<_> = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect();

        let winners: Vec<i64> = results.iter().filter_map(|r| r.as_ref().ok().copied()).collect();
        let losers = results
            .iter()
            .filter(|r| matches!(r, Err(AppError::AlreadyClaimed)))
            .count();

        assert_eq!(winners.len(), 1);
        assert_eq!(losers, 31);
        assert_eq!(store.get(&trip.id).unwrap().driver_id, Some(winners[0]));
    }

    #[test]
    fn transition_from_unexpected_status_leaves_record_untouched() {
        let store = TripStore::new();
        let trip = searching_trip(1);
        store.insert(trip.clone());

        let result = store.transition(&trip.id, &[TripStatus::Started], |t| {
            t.status = TripStatus::Completed;
            Ok(())
        });

        assert!(matches!(result, Err(AppError::InvalidTransition(_))));
        let stored = store.get(&trip.id).unwrap();
        assert_eq!(stored.status, TripStatus::Searching);
        assert!(stored.final_price.is_none());
    }

    #[test]
    fn failed_apply_does_not_leak_partial_writes() {
        let store = TripStore::new();
        let trip = searching_trip(1);
        store.insert(trip.clone());

        let result = store.transition(&trip.id, &[TripStatus::Searching], |t| {
            t.status = TripStatus::Cancelled;
            Err(AppError::NotAuthorized)
        });

        assert!(matches!(result, Err(AppError::NotAuthorized)));
        assert_eq!(store.get(&trip.id).unwrap().status, TripStatus::Searching);
    }

    #[test]
    fn passenger_history_is_newest_first_and_limited() {
        let store = TripStore::new();
        for offset in 0..5 {
            let mut trip = searching_trip(1);
            trip.created_at = Utc::now() - chrono::Duration::minutes(offset);
            store.insert(trip);
        }
        store.insert(searching_trip(2));

        let history = store.for_passenger(1, 3);
        assert_eq!(history.len(), 3);
        assert!(history.windows(2).all(|w| w[0].created_at >= w[1].created_at));
    }
}
