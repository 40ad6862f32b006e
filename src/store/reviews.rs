use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::AppError;
use crate::models::review::Review;
use crate::models::trip::TripId;
use crate::models::user::UserId;

/// Reviews keyed by (trip, rater); the key doubles as the uniqueness rule.
#[derive(Default)]
pub struct ReviewStore {
    reviews: DashMap<(TripId, UserId), Review>,
    next_id: AtomicU64,
}

impl ReviewStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_unique(
        &self,
        trip_id: TripId,
        rater_id: UserId,
        ratee_id: UserId,
        rating: u8,
        comment: Option<String>,
    ) -> Result<Review, AppError> {
        match self.reviews.entry((trip_id, rater_id)) {
            Entry::Occupied(_) => Err(AppError::InvalidTransition(
                "review already submitted".to_string(),
            )),
            Entry::Vacant(entry) => {
                let review = Review {
                    id: self.next_id.fetch_add(1, Ordering::Relaxed) + 1,
                    trip_id,
                    rater_id,
                    ratee_id,
                    rating,
                    comment,
                    created_at: Utc::now(),
                };
                entry.insert(review.clone());
                Ok(review)
            }
        }
    }

    pub fn exists(&self, trip_id: TripId, rater_id: UserId) -> bool {
        self.reviews.contains_key(&(trip_id, rater_id))
    }

    /// Arithmetic mean of every rating addressed to `ratee_id`.
    pub fn average_for(&self, ratee_id: UserId) -> Option<f64> {
        let (sum, count) = self
            .reviews
            .iter()
            .filter(|entry| entry.ratee_id == ratee_id)
            .fold((0u64, 0u64), |(sum, count), entry| {
                (sum + u64::from(entry.rating), count + 1)
            });

        (count > 0).then(|| sum as f64 / count as f64)
    }

    pub fn len(&self) -> usize {
        self.reviews.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reviews.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::ReviewStore;

    #[test]
    fn duplicate_review_for_same_trip_and_rater_is_rejected() {
        let store = ReviewStore::new();
        let trip = Uuid::new_v4();

        store.insert_unique(trip, 1, 2, 5, None).unwrap();
        assert!(store.insert_unique(trip, 1, 2, 1, None).is_err());
        assert!(store.insert_unique(trip, 2, 1, 4, None).is_ok());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn average_is_plain_mean() {
        let store = ReviewStore::new();
        for rating in [5, 3, 4] {
            store.insert_unique(Uuid::new_v4(), 1, 9, rating, None).unwrap();
        }

        assert_eq!(store.average_for(9), Some(4.0));
        assert_eq!(store.average_for(1), None);
    }

    #[test]
    fn ids_increase() {
        let store = ReviewStore::new();
        let first = store.insert_unique(Uuid::new_v4(), 1, 2, 5, None).unwrap();
        let second = store.insert_unique(Uuid::new_v4(), 1, 2, 5, None).unwrap();
        assert!(second.id > first.id);
    }
}
