//! Trip state machine.
//!
//! ```text
//! searching -> accepted -> started -> completed
//!     \____________\__________\-----> cancelled
//! ```
//!
//! Every transition re-checks the expected prior status under the trip's
//! record lock. Notifications to the other party are sent after the
//! transition is stored and never undo it.

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::conversation::action::ActionKind;
use crate::conversation::render;
use crate::engine::dispatch::{enqueue, DispatchJob};
use crate::engine::pricing::waiting_surcharge;
use crate::error::AppError;
use crate::models::driver::VehicleClass;
use crate::models::trip::{Cancellation, Trip, TripId, TripStatus};
use crate::models::user::UserId;
use crate::notify::{deliver, OutboundMessage};
use crate::state::AppState;

pub async fn create_trip(
    state: &AppState,
    passenger_id: UserId,
    origin: &str,
    destination: &str,
    vehicle_class: VehicleClass,
) -> Result<Trip, AppError> {
    let passenger = state
        .users
        .get_user(passenger_id)
        .ok_or_else(|| AppError::NotFound(format!("user {passenger_id} not found")))?;

    if !passenger.has_phone() {
        return Err(AppError::Precondition(
            "a phone number is required to order a trip".to_string(),
        ));
    }

    if !state.pricing.is_known_city(origin) || !state.pricing.is_known_city(destination) {
        return Err(AppError::Validation("unknown city".to_string()));
    }

    if origin == destination {
        return Err(AppError::Validation(
            "origin and destination must differ".to_string(),
        ));
    }

    let quote = state.pricing.quote(origin, destination, vehicle_class);
    let trip = Trip {
        id: Uuid::new_v4(),
        passenger_id,
        driver_id: None,
        origin: origin.to_string(),
        destination: destination.to_string(),
        vehicle_class,
        distance_km: quote.distance_km,
        price: quote.price,
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
    };

    state.trips.insert(trip.clone());
    state.metrics.trip_event("created");
    state.metrics.trips_searching.inc();

    info!(
        trip_id = %trip.id,
        passenger_id,
        origin,
        destination,
        price = trip.price,
        distance_km = trip.distance_km,
        "trip created"
    );

    if let Err(err) = enqueue(state, DispatchJob::first(trip.id)).await {
        warn!(trip_id = %trip.id, error = %err, "trip created but dispatch was not queued");
    }

    Ok(trip)
}

/// Exactly one concurrent caller wins; the rest get `AlreadyClaimed`.
pub async fn accept_trip(
    state: &AppState,
    trip_id: TripId,
    driver_id: UserId,
) -> Result<Trip, AppError> {
    let driver = state
        .users
        .get_driver(driver_id)
        .filter(|driver| driver.is_verified())
        .ok_or(AppError::NotAuthorized)?;

    let current = state
        .trips
        .get(&trip_id)
        .ok_or_else(|| AppError::NotFound(format!("trip {trip_id} not found")))?;
    if current.passenger_id == driver_id {
        return Err(AppError::NotAuthorized);
    }

    let trip = match state.trips.claim(&trip_id, driver_id, Utc::now()) {
        Err(AppError::AlreadyClaimed) => {
            state.metrics.accept_conflicts_total.inc();
            info!(trip_id = %trip_id, driver_id, "accept lost the race");
            return Err(AppError::AlreadyClaimed);
        }
        other => other?,
    };

    state.metrics.trip_event("accepted");
    state.metrics.trips_searching.dec();
    info!(trip_id = %trip.id, driver_id, "trip accepted");

    let phone = state
        .users
        .get_user(driver_id)
        .map(|user| render::phone_display(state, &user))
        .unwrap_or_else(|| render::PHONE_MISSING.to_string());

    let mut message = OutboundMessage::text(
        trip.passenger_id,
        format!(
            "Driver found: {}, {} {} ({}). Phone: {}.",
            driver.full_name, driver.vehicle_model, driver.plate_number, driver.vehicle_class, phone
        ),
    );
    message.push_choice("Start trip", ActionKind::StartTrip { trip_id: trip.id });
    message.push_choice("Cancel", ActionKind::CancelTrip {
        trip_id: trip.id,
        reason: None,
    });
    deliver(state, message).await;

    Ok(trip)
}

pub async fn start_trip(state: &AppState, trip_id: TripId, actor: UserId) -> Result<Trip, AppError> {
    let trip = state.trips.transition(&trip_id, &[TripStatus::Accepted], |trip| {
        if !trip.is_party(actor) {
            return Err(AppError::NotAuthorized);
        }
        trip.status = TripStatus::Started;
        trip.started_at = Some(Utc::now());
        Ok(())
    })?;

    state.metrics.trip_event("started");
    info!(trip_id = %trip.id, actor, "trip started");

    if let Some(other) = trip.counterpart(actor) {
        let mut message = OutboundMessage::text(other, "The trip has started. Have a good ride!");
        message.push_choice("Complete trip", ActionKind::CompleteTrip { trip_id: trip.id });
        deliver(state, message).await;
    }

    Ok(trip)
}

/// Whole minutes from `anchor` to `now`, never negative.
fn elapsed_minutes(anchor: DateTime<Utc>, now: DateTime<Utc>) -> u32 {
    let minutes = (now - anchor).num_minutes().max(0);
    u32::try_from(minutes).unwrap_or(u32::MAX)
}

fn add_waiting(trip: &mut Trip, minutes: u32) {
    trip.waiting_minutes = trip.waiting_minutes.saturating_add(minutes);
    trip.waiting_surcharge = waiting_surcharge(trip.waiting_minutes);
}

/// Folds a running waiting timer into the trip's total and clears it.
/// Returns the minutes billed.
fn settle_waiting(trip: &mut Trip, now: DateTime<Utc>) -> u32 {
    let Some(anchor) = trip.waiting_started_at.take() else {
        return 0;
    };
    let minutes = elapsed_minutes(anchor, now);
    add_waiting(trip, minutes);
    minutes
}

fn require_bound_driver(trip: &Trip, actor: UserId) -> Result<(), AppError> {
    if trip.driver_id != Some(actor) {
        return Err(AppError::NotAuthorized);
    }
    Ok(())
}

async fn notify_waiting(state: &AppState, trip: &Trip) {
    deliver(
        state,
        OutboundMessage::text(
            trip.passenger_id,
            format!(
                "Waiting time so far: {} min. Waiting charge: {}.",
                trip.waiting_minutes, trip.waiting_surcharge
            ),
        ),
    )
    .await;
}

/// Adds `minutes` to the trip's waiting time and reprices the surcharge over
/// the accumulated total, so split waits cost the same as one long wait.
pub async fn record_waiting(
    state: &AppState,
    trip_id: TripId,
    actor: UserId,
    minutes: u32,
) -> Result<Trip, AppError> {
    let trip = state.trips.transition(&trip_id, &TripStatus::ACTIVE, |trip| {
        require_bound_driver(trip, actor)?;
        add_waiting(trip, minutes);
        Ok(())
    })?;

    state.metrics.trip_event("waiting_recorded");
    info!(
        trip_id = %trip.id,
        minutes,
        total_minutes = trip.waiting_minutes,
        surcharge = trip.waiting_surcharge,
        "waiting recorded"
    );

    notify_waiting(state, &trip).await;
    Ok(trip)
}

/// Starts the bound driver's waiting timer. Pressing it again keeps the
/// original start.
pub fn start_waiting(state: &AppState, trip_id: TripId, actor: UserId) -> Result<Trip, AppError> {
    let trip = state.trips.transition(&trip_id, &TripStatus::ACTIVE, |trip| {
        require_bound_driver(trip, actor)?;
        trip.waiting_started_at.get_or_insert_with(Utc::now);
        Ok(())
    })?;

    info!(trip_id = %trip.id, actor, "waiting timer started");
    Ok(trip)
}

/// Stops the running timer and bills it. Returns the trip and the minutes
/// of this stop.
pub async fn stop_waiting(
    state: &AppState,
    trip_id: TripId,
    actor: UserId,
) -> Result<(Trip, u32), AppError> {
    let mut billed = 0;
    let trip = state.trips.transition(&trip_id, &TripStatus::ACTIVE, |trip| {
        require_bound_driver(trip, actor)?;
        if trip.waiting_started_at.is_none() {
            return Err(AppError::Precondition(
                "the waiting timer is not running".to_string(),
            ));
        }
        billed = settle_waiting(trip, Utc::now());
        Ok(())
    })?;

    state.metrics.trip_event("waiting_recorded");
    info!(
        trip_id = %trip.id,
        minutes = billed,
        total_minutes = trip.waiting_minutes,
        surcharge = trip.waiting_surcharge,
        "waiting timer stopped"
    );

    notify_waiting(state, &trip).await;
    Ok((trip, billed))
}

/// A waiting timer still running is billed in the same update.
pub async fn complete_trip(
    state: &AppState,
    trip_id: TripId,
    actor: UserId,
) -> Result<Trip, AppError> {
    let trip = state.trips.transition(&trip_id, &[TripStatus::Started], |trip| {
        if !trip.is_party(actor) {
            return Err(AppError::NotAuthorized);
        }
        let now = Utc::now();
        settle_waiting(trip, now);
        trip.status = TripStatus::Completed;
        trip.completed_at = Some(now);
        trip.final_price = Some(trip.price + trip.waiting_surcharge);
        Ok(())
    })?;

    state.metrics.trip_event("completed");
    info!(trip_id = %trip.id, final_price = ?trip.final_price, "trip completed");

    let parties = std::iter::once(trip.passenger_id).chain(trip.driver_id);
    for party in parties {
        if let Err(err) = state.users.increment_trips(party) {
            warn!(trip_id = %trip.id, user_id = party, error = %err, "failed to bump trip count");
        }
    }

    if let Some(other) = trip.counterpart(actor) {
        let mut message = OutboundMessage::text(
            other,
            format!(
                "Trip completed. Total: {} (waiting charge {}).",
                trip.final_price.unwrap_or(trip.price),
                trip.waiting_surcharge
            ),
        );
        message.push_choice("Leave a review", ActionKind::LeaveReview { trip_id: trip.id });
        deliver(state, message).await;
    }

    Ok(trip)
}

/// A cancelled trip no longer has a bound driver; the one it had is kept in
/// the cancellation record and told about it.
pub async fn cancel_trip(
    state: &AppState,
    trip_id: TripId,
    actor: UserId,
    reason: Option<String>,
) -> Result<Trip, AppError> {
    let mut was_searching = false;
    let trip = state.trips.transition(
        &trip_id,
        &[TripStatus::Searching, TripStatus::Accepted, TripStatus::Started],
        |trip| {
            if !trip.is_party(actor) {
                return Err(AppError::NotAuthorized);
            }
            was_searching = trip.status == TripStatus::Searching;
            settle_waiting(trip, Utc::now());
            trip.cancellation = Some(Cancellation {
                actor,
                reason,
                unbound_driver: trip.driver_id.take(),
            });
            trip.status = TripStatus::Cancelled;
            Ok(())
        },
    )?;

    state.metrics.trip_event("cancelled");
    if was_searching {
        state.metrics.trips_searching.dec();
    }
    info!(trip_id = %trip.id, actor, "trip cancelled");

    let unbound_driver = trip.cancellation.as_ref().and_then(|c| c.unbound_driver);
    let other = if actor == trip.passenger_id {
        unbound_driver
    } else {
        Some(trip.passenger_id)
    };

    if let Some(other) = other {
        let reason = trip
            .cancellation
            .as_ref()
            .and_then(|c| c.reason.clone())
            .unwrap_or_else(|| "no reason given".to_string());
        deliver(
            state,
            OutboundMessage::text(
                other,
                format!(
                    "Trip {} -> {} was cancelled ({reason}).",
                    trip.origin, trip.destination
                ),
            ),
        )
        .await;
    }

    Ok(trip)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use tokio::sync::mpsc;

    use super::*;
    use crate::config::Config;
    use crate::notify::Notifier;
    use crate::store::users::tests::application;

    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn notify(&self, _message: OutboundMessage) -> Result<(), AppError> {
            Err(AppError::Internal("transport down".to_string()))
        }
    }

    fn setup() -> (Arc<AppState>, mpsc::Receiver<DispatchJob>) {
        let (state, rx) = AppState::with_notifier(&Config::default(), Arc::new(FailingNotifier))
            .unwrap();
        (Arc::new(state), rx)
    }

    fn passenger(state: &AppState, id: UserId) {
        state.users.touch(id, Some("Passenger"));
        let sealed = state.cipher.encrypt("+79991234567").unwrap();
        state.users.set_phone(id, sealed).unwrap();
    }

    fn verified_driver(state: &AppState, id: UserId) {
        state.users.touch(id, Some("Driver"));
        state.users.register_driver(application(id)).unwrap();
        state.users.verify_driver(id, 0, None, Utc::now()).unwrap();
        state.users.set_online(id, true).unwrap();
    }

    async fn searching_trip(state: &AppState) -> Trip {
        create_trip(state, 1, "Moscow", "Tver", VehicleClass::Economy)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn create_requires_phone() {
        let (state, _rx) = setup();
        state.users.touch(1, None);

        let result = create_trip(&state, 1, "Moscow", "Tver", VehicleClass::Economy).await;
        assert!(matches!(result, Err(AppError::Precondition(_))));
        assert!(state.trips.is_empty());
    }

    #[tokio::test]
    async fn create_rejects_unknown_or_identical_cities() {
        let (state, _rx) = setup();
        passenger(&state, 1);

        assert!(matches!(
            create_trip(&state, 1, "Atlantis", "Tver", VehicleClass::Economy).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            create_trip(&state, 1, "Tver", "Tver", VehicleClass::Economy).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn create_prices_from_table_and_queues_dispatch() {
        let (state, mut rx) = setup();
        passenger(&state, 1);

        let trip = searching_trip(&state).await;
        assert_eq!(trip.status, TripStatus::Searching);
        assert_eq!(trip.distance_km, 180);
        assert_eq!(trip.price, 2200);
        assert!(trip.driver_id.is_none());
        assert_eq!(rx.recv().await, Some(DispatchJob::first(trip.id)));
    }

    #[tokio::test]
    async fn unverified_driver_cannot_accept() {
        let (state, _rx) = setup();
        passenger(&state, 1);
        state.users.touch(2, None);
        state.users.register_driver(application(2)).unwrap();

        let trip = searching_trip(&state).await;
        assert!(matches!(
            accept_trip(&state, trip.id, 2).await,
            Err(AppError::NotAuthorized)
        ));
        assert_eq!(state.trips.get(&trip.id).unwrap().status, TripStatus::Searching);
    }

    #[tokio::test]
    async fn passenger_cannot_accept_own_trip() {
        let (state, _rx) = setup();
        passenger(&state, 1);
        state.users.register_driver(application(1)).unwrap();
        state.users.verify_driver(1, 0, None, Utc::now()).unwrap();

        let trip = searching_trip(&state).await;
        assert!(matches!(
            accept_trip(&state, trip.id, 1).await,
            Err(AppError::NotAuthorized)
        ));
    }

    #[tokio::test]
    async fn concurrent_accepts_yield_single_winner() {
        let (state, _rx) = setup();
        passenger(&state, 1);
        let drivers: Vec<UserId> = (100..120).collect();
        for id in &drivers {
            verified_driver(&state, *id);
        }
        let trip = searching_trip(&state).await;

        let handles: Vec<_> = drivers
            .iter()
            .map(|driver_id| {
                let state = state.clone();
                let driver_id = *driver_id;
                tokio::spawn(async move {
                    accept_trip(&state, trip.id, driver_id)
                        .await
                        .map(|_| driver_id)
                })
            })
            .collect();

        let mut winners = Vec::new();
        let mut claimed = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(driver_id) => winners.push(driver_id),
                Err(AppError::AlreadyClaimed) => claimed += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(winners.len(), 1);
        assert_eq!(claimed, drivers.len() - 1);
        let stored = state.trips.get(&trip.id).unwrap();
        assert_eq!(stored.status, TripStatus::Accepted);
        assert_eq!(stored.driver_id, Some(winners[0]));
        assert_eq!(state.metrics.accept_conflicts_total.get(), 19);
    }

    #[tokio::test]
    async fn non_adjacent_transitions_fail_without_mutation() {
        let (state, _rx) = setup();
        passenger(&state, 1);
        verified_driver(&state, 2);
        let trip = searching_trip(&state).await;

        assert!(matches!(
            complete_trip(&state, trip.id, 1).await,
            Err(AppError::InvalidTransition(_))
        ));
        assert!(matches!(
            start_trip(&state, trip.id, 1).await,
            Err(AppError::InvalidTransition(_))
        ));

        let stored = state.trips.get(&trip.id).unwrap();
        assert_eq!(stored.status, TripStatus::Searching);
        assert!(stored.final_price.is_none());
        assert!(stored.started_at.is_none());

        accept_trip(&state, trip.id, 2).await.unwrap();
        start_trip(&state, trip.id, 2).await.unwrap();
        complete_trip(&state, trip.id, 2).await.unwrap();

        assert!(matches!(
            cancel_trip(&state, trip.id, 1, None).await,
            Err(AppError::InvalidTransition(_))
        ));
        assert!(matches!(
            complete_trip(&state, trip.id, 2).await,
            Err(AppError::InvalidTransition(_))
        ));
        assert_eq!(state.users.get_user(1).unwrap().trips_count, 1);
    }

    #[tokio::test]
    async fn outsiders_cannot_drive_transitions() {
        let (state, _rx) = setup();
        passenger(&state, 1);
        verified_driver(&state, 2);
        let trip = searching_trip(&state).await;
        accept_trip(&state, trip.id, 2).await.unwrap();

        assert!(matches!(
            start_trip(&state, trip.id, 3).await,
            Err(AppError::NotAuthorized)
        ));
        assert!(matches!(
            cancel_trip(&state, trip.id, 3, None).await,
            Err(AppError::NotAuthorized)
        ));
        assert!(matches!(
            record_waiting(&state, trip.id, 1, 5).await,
            Err(AppError::NotAuthorized)
        ));
        assert_eq!(state.trips.get(&trip.id).unwrap().status, TripStatus::Accepted);
    }

    #[tokio::test]
    async fn waiting_accumulates_and_final_price_adds_surcharge() {
        let (state, _rx) = setup();
        passenger(&state, 1);
        verified_driver(&state, 2);
        let trip = searching_trip(&state).await;

        accept_trip(&state, trip.id, 2).await.unwrap();
        record_waiting(&state, trip.id, 2, 4).await.unwrap();
        start_trip(&state, trip.id, 1).await.unwrap();
        let waited = record_waiting(&state, trip.id, 2, 2).await.unwrap();
        assert_eq!(waited.waiting_minutes, 6);
        assert_eq!(waited.waiting_surcharge, 13);

        let done = complete_trip(&state, trip.id, 2).await.unwrap();
        assert_eq!(done.final_price, Some(2200 + 13));
        assert_eq!(state.users.get_user(2).unwrap().trips_count, 1);
    }

    #[test]
    fn elapsed_minutes_rounds_down() {
        let now = Utc::now();
        assert_eq!(elapsed_minutes(now - Duration::seconds(359), now), 5);
        assert_eq!(elapsed_minutes(now + Duration::seconds(30), now), 0);
    }

    fn backdate_timer(state: &AppState, trip_id: TripId, seconds: i64) {
        state
            .trips
            .transition(&trip_id, &TripStatus::ACTIVE, |trip| {
                trip.waiting_started_at = Some(Utc::now() - Duration::seconds(seconds));
                Ok(())
            })
            .unwrap();
    }

    #[tokio::test]
    async fn waiting_timer_belongs_to_the_bound_driver() {
        let (state, _rx) = setup();
        passenger(&state, 1);
        verified_driver(&state, 2);
        let trip = searching_trip(&state).await;

        assert!(matches!(
            start_waiting(&state, trip.id, 2),
            Err(AppError::InvalidTransition(_))
        ));
        accept_trip(&state, trip.id, 2).await.unwrap();
        assert!(matches!(
            start_waiting(&state, trip.id, 1),
            Err(AppError::NotAuthorized)
        ));
        assert!(matches!(
            stop_waiting(&state, trip.id, 2).await,
            Err(AppError::Precondition(_))
        ));

        let first = start_waiting(&state, trip.id, 2).unwrap().waiting_started_at;
        let again = start_waiting(&state, trip.id, 2).unwrap().waiting_started_at;
        assert!(first.is_some());
        assert_eq!(first, again);

        backdate_timer(&state, trip.id, 4 * 60 + 10);
        let (stopped, minutes) = stop_waiting(&state, trip.id, 2).await.unwrap();
        assert_eq!(minutes, 4);
        assert_eq!(stopped.waiting_minutes, 4);
        assert!(stopped.waiting_started_at.is_none());
    }

    #[tokio::test]
    async fn completion_by_passenger_bills_running_timer() {
        let (state, _rx) = setup();
        passenger(&state, 1);
        verified_driver(&state, 2);
        let trip = searching_trip(&state).await;
        accept_trip(&state, trip.id, 2).await.unwrap();
        start_trip(&state, trip.id, 1).await.unwrap();

        start_waiting(&state, trip.id, 2).unwrap();
        backdate_timer(&state, trip.id, 6 * 60 + 30);

        let done = complete_trip(&state, trip.id, 1).await.unwrap();
        assert_eq!(done.waiting_minutes, 6);
        assert_eq!(done.waiting_surcharge, 13);
        assert_eq!(done.final_price, Some(2213));
        assert!(done.waiting_started_at.is_none());
    }

    #[tokio::test]
    async fn cancel_clears_running_timer() {
        let (state, _rx) = setup();
        passenger(&state, 1);
        verified_driver(&state, 2);
        let trip = searching_trip(&state).await;
        accept_trip(&state, trip.id, 2).await.unwrap();
        start_waiting(&state, trip.id, 2).unwrap();

        let cancelled = cancel_trip(&state, trip.id, 1, None).await.unwrap();
        assert!(cancelled.waiting_started_at.is_none());
        assert!(cancelled.final_price.is_none());
    }

    #[tokio::test]
    async fn cancel_after_accept_unbinds_driver() {
        let (state, _rx) = setup();
        passenger(&state, 1);
        verified_driver(&state, 2);
        let trip = searching_trip(&state).await;
        accept_trip(&state, trip.id, 2).await.unwrap();

        let cancelled = cancel_trip(&state, trip.id, 1, Some("changed plans".to_string()))
            .await
            .unwrap();

        assert_eq!(cancelled.status, TripStatus::Cancelled);
        assert!(cancelled.driver_id.is_none());
        let cancellation = cancelled.cancellation.unwrap();
        assert_eq!(cancellation.actor, 1);
        assert_eq!(cancellation.unbound_driver, Some(2));
        assert_eq!(cancellation.reason.as_deref(), Some("changed plans"));
    }

    #[tokio::test]
    async fn notification_failures_do_not_roll_back() {
        let (state, _rx) = setup();
        passenger(&state, 1);
        verified_driver(&state, 2);
        let trip = searching_trip(&state).await;

        let accepted = accept_trip(&state, trip.id, 2).await.unwrap();
        assert_eq!(accepted.status, TripStatus::Accepted);
        assert!(state.metrics.notification_failures_total.get() >= 1);
    }
}
