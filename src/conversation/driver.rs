use chrono::Utc;
use tracing::info;

use crate::conversation::action::ActionKind;
use crate::conversation::{render, Ctx};
use crate::engine::lifecycle;
use crate::error::AppError;
use crate::models::driver::{Driver, Verification, VehicleClass};
use crate::models::trip::TripId;
use crate::notify::{deliver_all, OutboundMessage};
use crate::session::flow::{DriverApplication, Flow, OnboardingDraft, OnboardingProgress, OnboardingStep};

const WAITING_TARIFF: &str = "Up to 2 min free\n2-5 min: 3 per min\n5-7 min: 4 per min\nover 7 min: 5 per min";

pub fn become_driver(ctx: &Ctx<'_>) -> Result<OutboundMessage, AppError> {
    match ctx.state.users.get_driver(ctx.user_id()) {
        Some(driver) if driver.verification == Verification::Verified => {
            return Ok(ctx.reply_with_menu("You are already registered as a driver."));
        }
        Some(driver) if driver.verification == Verification::Pending => {
            return Ok(ctx.reply_with_menu(
                "Your application is under review. Wait for an operator to confirm it.",
            ));
        }
        _ => {}
    }

    ctx.state.sessions.update(ctx.user_id(), |session| {
        session.flow = Some(Flow::DriverOnboarding(OnboardingDraft::new()));
    });

    let mut message = ctx.reply(format!(
        "Driver registration\n\nYou will be asked for your full name, vehicle \
         model, plate number and driving experience. An operator checks every \
         application before you can take orders.\n\n{}",
        OnboardingStep::FullName.prompt()
    ));
    message.push_choice("Cancel", ActionKind::Abort);
    Ok(message)
}

/// Feeds one answer into the onboarding draft. A rejected answer repeats the
/// current step's prompt.
pub async fn onboarding_input(ctx: &Ctx<'_>, input: &str) -> Result<OutboundMessage, AppError> {
    let outcome = ctx.state.sessions.update(ctx.user_id(), |session| {
        let Some(Flow::DriverOnboarding(draft)) = session.flow.as_mut() else {
            return None;
        };
        let step = draft.step;
        let progress = draft.advance(input);
        if matches!(progress, Ok(OnboardingProgress::Complete(_))) {
            session.flow = None;
        }
        Some((step, progress))
    });

    let Some((step, progress)) = outcome else {
        return Ok(ctx.reply_with_menu("Use the menu buttons to navigate."));
    };

    match progress {
        Ok(OnboardingProgress::Next(next)) => {
            let mut message = ctx.reply(format!("Saved.\n\n{}", next.prompt()));
            message.push_choice("Cancel", ActionKind::Abort);
            Ok(message)
        }
        Ok(OnboardingProgress::Complete(application)) => submit_application(ctx, application).await,
        Err(AppError::Validation(msg)) => {
            let mut message = ctx.reply(format!("{msg}.\n\n{}", step.prompt()));
            message.push_choice("Cancel", ActionKind::Abort);
            Ok(message)
        }
        Err(err) => Err(err),
    }
}

async fn submit_application(
    ctx: &Ctx<'_>,
    application: DriverApplication,
) -> Result<OutboundMessage, AppError> {
    let driver = ctx.state.users.register_driver(Driver {
        user_id: ctx.user_id(),
        full_name: application.full_name,
        vehicle_model: application.vehicle_model,
        plate_number: application.plate_number,
        vehicle_class: VehicleClass::Economy,
        experience_years: application.experience_years,
        verification: Verification::Pending,
        verified_by: None,
        verified_at: None,
        rejection_reason: None,
        online: false,
        created_at: Utc::now(),
    })?;

    info!(user_id = driver.user_id, "driver application submitted");

    let card = format!(
        "New driver application\n\n{}\nPhone: {}",
        render::driver_card(&driver),
        render::phone_display(ctx.state, &ctx.user)
    );
    let alerts = ctx
        .operators
        .ids()
        .map(|operator| {
            let mut alert = OutboundMessage::text(operator, card.clone());
            alert.push_choice("Verify", ActionKind::VerifyDriver {
                driver_id: driver.user_id,
                class: None,
            });
            for class in [VehicleClass::Comfort, VehicleClass::Business] {
                alert.push_choice(format!("Verify as {class}"), ActionKind::VerifyDriver {
                    driver_id: driver.user_id,
                    class: Some(class),
                });
            }
            alert.push_choice("Reject", ActionKind::RejectDriver {
                driver_id: driver.user_id,
                reason: None,
            });
            alert
        })
        .collect();
    deliver_all(ctx.state, alerts).await;

    Ok(ctx.reply_with_menu(
        "Application submitted!\n\nAn operator will check your details, usually \
         within 24 hours. After that you can take orders.",
    ))
}

pub fn set_online(ctx: &Ctx<'_>, online: bool) -> Result<OutboundMessage, AppError> {
    let driver = ctx.state.users.set_online(ctx.user_id(), online)?;
    info!(user_id = driver.user_id, online, "driver availability changed");

    let text = if driver.online {
        "You are online and will receive new orders."
    } else {
        "You are offline. New orders will not be offered to you."
    };
    Ok(ctx.reply_with_menu(text))
}

pub async fn accept(ctx: &Ctx<'_>, trip_id: TripId) -> Result<OutboundMessage, AppError> {
    let trip = lifecycle::accept_trip(ctx.state, trip_id, ctx.user_id()).await?;

    let passenger = ctx.state.users.get_user(trip.passenger_id);
    let (name, phone) = match &passenger {
        Some(user) => (
            user.display_name.clone(),
            render::phone_display(ctx.state, user),
        ),
        None => (format!("user {}", trip.passenger_id), render::PHONE_MISSING.to_string()),
    };

    Ok(ctx
        .reply(format!(
            "You accepted the order.\n\n{}\n\nPassenger: {name}\nPhone: {phone}",
            render::trip_summary(&trip)
        ))
        .with_choices(render::trip_choices(&trip, ctx.user_id())))
}

pub fn start_waiting(ctx: &Ctx<'_>, trip_id: TripId) -> Result<OutboundMessage, AppError> {
    lifecycle::start_waiting(ctx.state, trip_id, ctx.user_id())?;

    let mut message = ctx.reply(format!(
        "Waiting started.\n\n{WAITING_TARIFF}\n\nStop the timer when the ride continues."
    ));
    message.push_choice("Stop waiting", ActionKind::StopWaiting { trip_id });
    message.push_choice("Complete trip", ActionKind::CompleteTrip { trip_id });
    Ok(message)
}

pub async fn stop_waiting(ctx: &Ctx<'_>, trip_id: TripId) -> Result<OutboundMessage, AppError> {
    let (trip, minutes) = lifecycle::stop_waiting(ctx.state, trip_id, ctx.user_id()).await?;

    let mut message = ctx.reply(format!(
        "Waiting stopped.\n\nThis stop: {minutes} min\nTotal waiting: {} min\nWaiting charge: +{}",
        trip.waiting_minutes, trip.waiting_surcharge
    ));
    message.push_choice("Start waiting", ActionKind::StartWaiting { trip_id });
    message.push_choice("Complete trip", ActionKind::CompleteTrip { trip_id });
    Ok(message)
}
