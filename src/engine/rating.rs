use tracing::info;

use crate::error::AppError;
use crate::models::review::Review;
use crate::models::trip::{TripId, TripStatus};
use crate::models::user::UserId;
use crate::state::AppState;
use crate::validation::{validate_comment, validate_rating};

/// Stores the review and refreshes the ratee's rating to the mean of every
/// review they have received.
pub fn submit_review(
    state: &AppState,
    trip_id: TripId,
    rater_id: UserId,
    rating: u8,
    comment: Option<&str>,
) -> Result<Review, AppError> {
    let rating = validate_rating(rating)?;
    let comment = match comment {
        Some(raw) => validate_comment(raw)?,
        None => None,
    };

    let trip = state
        .trips
        .get(&trip_id)
        .filter(|trip| trip.is_party(rater_id))
        .ok_or(AppError::NotAuthorized)?;

    if trip.status != TripStatus::Completed {
        return Err(AppError::InvalidTransition(
            "only completed trips can be reviewed".to_string(),
        ));
    }

    let ratee_id = trip
        .counterpart(rater_id)
        .ok_or_else(|| AppError::Internal(format!("trip {trip_id} has no counterpart")))?;

    let review = state
        .reviews
        .insert_unique(trip_id, rater_id, ratee_id, rating, comment)?;

    let ratee = state
        .users
        .recompute_rating(ratee_id, || state.reviews.average_for(ratee_id))?;

    state.metrics.trip_event("reviewed");
    info!(
        trip_id = %trip_id,
        rater_id,
        ratee_id,
        rating,
        new_rating = ratee.rating,
        "review submitted"
    );

    Ok(review)
}
