use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::conversation::action::ActionKind;
use crate::error::AppError;
use crate::models::trip::{Trip, TripId, TripStatus};
use crate::notify::{deliver, OutboundMessage};
use crate::state::AppState;

/// One broadcast round for a trip. Round 0 is the initial offer; rounds up to
/// `max_rebroadcasts` repeat it; the round after that only tells the
/// passenger nobody has taken the trip yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchJob {
    pub trip_id: TripId,
    pub round: u32,
}

impl DispatchJob {
    pub fn first(trip_id: TripId) -> Self {
        Self { trip_id, round: 0 }
    }

    fn next(self) -> Self {
        Self {
            trip_id: self.trip_id,
            round: self.round + 1,
        }
    }
}

/// Waits for room on the bounded queue rather than dropping the job.
pub async fn enqueue(state: &AppState, job: DispatchJob) -> Result<(), AppError> {
    state
        .dispatch_tx
        .send(job)
        .await
        .map_err(|_| AppError::Internal(format!("dispatch queue closed; trip {} not offered", job.trip_id)))?;

    state.metrics.dispatch_jobs_in_queue.inc();
    debug!(trip_id = %job.trip_id, round = job.round, "dispatch job queued");
    Ok(())
}

pub async fn run_dispatch_engine(state: Arc<AppState>, mut job_rx: mpsc::Receiver<DispatchJob>) {
    info!("dispatch engine started");

    while let Some(job) = job_rx.recv().await {
        state.metrics.dispatch_jobs_in_queue.dec();

        let start = Instant::now();
        let outcome = match process_job(&state, job).await {
            Ok(_) => "success",
            Err(err) => {
                error!(trip_id = %job.trip_id, round = job.round, error = %err, "failed to process dispatch job");
                "error"
            }
        };

        state
            .metrics
            .dispatch_latency_seconds
            .with_label_values(&[outcome])
            .observe(start.elapsed().as_secs_f64());
    }

    warn!("dispatch engine stopped: queue channel closed");
}

async fn process_job(state: &Arc<AppState>, job: DispatchJob) -> Result<usize, AppError> {
    let trip = state
        .trips
        .get(&job.trip_id)
        .ok_or_else(|| AppError::NotFound(format!("trip {} not found", job.trip_id)))?;

    if trip.status != TripStatus::Searching {
        debug!(trip_id = %trip.id, status = %trip.status, "trip left searching; dropping dispatch job");
        return Ok(0);
    }

    let policy = &state.dispatch_policy;
    if job.round > policy.max_rebroadcasts {
        info!(trip_id = %trip.id, rounds = job.round, "no driver accepted; trip stays searching");
        let mut message = OutboundMessage::text(
            trip.passenger_id,
            "No driver has taken your order yet. It stays open until you cancel it.",
        );
        message.push_choice("Cancel order", ActionKind::CancelTrip {
            trip_id: trip.id,
            reason: Some("no driver found".to_string()),
        });
        deliver(state, message).await;
        return Ok(0);
    }

    let offers = broadcast_offers(state, &trip).await;
    schedule_rebroadcast(state.clone(), job.next());

    Ok(offers)
}

fn schedule_rebroadcast(state: Arc<AppState>, job: DispatchJob) {
    let delay = state.dispatch_policy.rebroadcast_after;
    tokio::spawn(async move {
        sleep(delay).await;
        if let Err(err) = enqueue(&state, job).await {
            error!(trip_id = %job.trip_id, error = %err, "failed to requeue dispatch job");
        }
    });
}

/// Offers carry no reservation; the trip store decides who wins.
pub async fn broadcast_offers(state: &AppState, trip: &Trip) -> usize {
    let drivers = state
        .users
        .eligible_drivers(state.dispatch_policy.offer_fanout, trip.passenger_id);

    if drivers.is_empty() {
        warn!(trip_id = %trip.id, "no eligible drivers online");
        return 0;
    }

    for driver in &drivers {
        let mut offer = OutboundMessage::text(
            driver.user_id,
            format!(
                "New order: {} -> {}, {} km, {} class. Price {}.",
                trip.origin, trip.destination, trip.distance_km, trip.vehicle_class, trip.price
            ),
        );
        offer.push_choice("Accept", ActionKind::AcceptTrip { trip_id: trip.id });
        deliver(state, offer).await;
        state.metrics.offers_sent_total.inc();
    }

    info!(trip_id = %trip.id, offers = drivers.len(), "trip offered to drivers");
    drivers.len()
}
