use tracing::{info, warn};

use crate::conversation::action::ActionKind;
use crate::conversation::{render, Ctx};
use crate::error::AppError;
use crate::models::trip::Trip;
use crate::models::user::Role;
use crate::notify::{deliver_all, OutboundMessage};
use crate::session::flow::Flow;
use crate::validation::validate_phone;

const PASSENGER_HISTORY: usize = 10;
const DRIVER_HISTORY: usize = 10;

pub fn start(ctx: &Ctx<'_>) -> Result<OutboundMessage, AppError> {
    ctx.state.sessions.abort(ctx.user_id());
    if ctx.user.training_completed {
        Ok(ctx.menu())
    } else {
        training(ctx)
    }
}

pub fn training(ctx: &Ctx<'_>) -> Result<OutboundMessage, AppError> {
    let mut message = ctx.reply(
        "Welcome!\n\nA short walkthrough covers how to order a trip, how drivers \
         accept orders, and what to do if something goes wrong. It takes two or \
         three minutes.",
    );
    message.push_choice("Complete training", ActionKind::CompleteTraining);
    message.push_choice("Skip", ActionKind::SkipTraining);
    Ok(message)
}

pub fn finish_training(ctx: &Ctx<'_>) -> Result<OutboundMessage, AppError> {
    let user = ctx.state.users.complete_training(ctx.user_id())?;
    Ok(render::main_menu(ctx.state, &user, ctx.is_operator()))
}

pub fn profile(ctx: &Ctx<'_>) -> Result<OutboundMessage, AppError> {
    let user = &ctx.user;
    let role = match user.role {
        Role::Passenger => "passenger",
        Role::Driver => "driver",
    };

    let mut text = format!(
        "Profile\n\nID: {}\nName: {}\nPhone: {}\nRole: {role}\nRating: {:.1}\nTrips: {}\nRegistered: {}",
        user.id,
        user.display_name,
        render::phone_display(ctx.state, user),
        user.rating,
        user.trips_count,
        user.registered_at.format("%d.%m.%Y %H:%M"),
    );

    if let Some(driver) = ctx.state.users.get_driver(user.id) {
        text.push_str("\n\nDriver\n");
        text.push_str(&render::driver_card(&driver));
        text.push_str(if driver.online { "\nOnline" } else { "\nOffline" });
    }

    if let Some(trip) = ctx.state.trips.active_for_user(user.id) {
        if let Some(phone) = render::counterpart_phone(ctx.state, &trip, user.id) {
            text.push_str(&format!(
                "\n\nCurrent trip {} -> {}, other party's phone: {phone}",
                trip.origin, trip.destination
            ));
        }
    }

    let mut message = ctx.reply(text);
    message.push_choice("Set phone", ActionKind::SetPhone);
    message.push_choice("Main menu", ActionKind::MainMenu);
    Ok(message)
}

pub fn ask_phone(ctx: &Ctx<'_>) -> Result<OutboundMessage, AppError> {
    ctx.state.sessions.update(ctx.user_id(), |session| {
        session.flow = Some(Flow::Phone);
    });

    let mut message = ctx.reply(
        "Enter your phone number as +79991234567 or 89991234567.\n\
         Only the other party of your trips will see it.",
    );
    message.push_choice("Cancel", ActionKind::Abort);
    Ok(message)
}

pub fn submit_phone(ctx: &Ctx<'_>, input: &str) -> Result<OutboundMessage, AppError> {
    let phone = validate_phone(input)?;
    let sealed = ctx.state.cipher.encrypt(&phone)?;
    ctx.state.users.set_phone(ctx.user_id(), sealed)?;
    ctx.state.sessions.update(ctx.user_id(), |session| {
        if matches!(session.flow, Some(Flow::Phone)) {
            session.flow = None;
        }
    });

    info!(user_id = ctx.user_id(), "phone updated");
    Ok(ctx.reply_with_menu(
        "Phone saved. Only the other party of your trips will see it.",
    ))
}

pub fn my_trips(ctx: &Ctx<'_>) -> Result<OutboundMessage, AppError> {
    let user_id = ctx.user_id();
    let mut sections = Vec::new();

    let ordered = ctx.state.trips.for_passenger(user_id, PASSENGER_HISTORY);
    if !ordered.is_empty() {
        let lines: Vec<String> = ordered.iter().map(history_line).collect();
        sections.push(format!("Your orders:\n{}", lines.join("\n")));
    }

    if ctx.state.users.get_driver(user_id).is_some() {
        let driven = ctx.state.trips.completed_by_driver(user_id, DRIVER_HISTORY);
        if !driven.is_empty() {
            let earned: i64 = driven
                .iter()
                .map(|trip| trip.final_price.unwrap_or(trip.price))
                .sum();
            let lines: Vec<String> = driven.iter().map(history_line).collect();
            sections.push(format!(
                "Driving: {} trips, earned {earned}, rating {:.1}\n{}",
                driven.len(),
                ctx.user.rating,
                lines.join("\n")
            ));
        }
    }

    if sections.is_empty() {
        return Ok(ctx.reply_with_menu("You have no trips yet."));
    }
    Ok(ctx.reply_with_menu(sections.join("\n\n")))
}

fn history_line(trip: &Trip) -> String {
    format!(
        "- {} -> {}, {}, {} ({})",
        trip.origin,
        trip.destination,
        trip.final_price.unwrap_or(trip.price),
        trip.status,
        trip.created_at.format("%d.%m.%Y %H:%M")
    )
}

/// Alerts every operator, including the user's active trip if there is one.
pub async fn sos(ctx: &Ctx<'_>) -> Result<OutboundMessage, AppError> {
    let user = &ctx.user;
    let mut alert = format!(
        "SOS from {} (id {}), phone {}.",
        user.display_name,
        user.id,
        render::phone_display(ctx.state, user)
    );
    match ctx.state.trips.active_for_user(user.id) {
        Some(trip) => {
            alert.push_str("\n\n");
            alert.push_str(&render::trip_summary(&trip));
            alert.push_str(&format!("\nTrip id: {}", trip.id));
        }
        None => alert.push_str("\nNo active trip."),
    }

    let messages: Vec<OutboundMessage> = ctx
        .operators
        .ids()
        .map(|operator| OutboundMessage::text(operator, alert.clone()))
        .collect();

    if messages.is_empty() {
        warn!(user_id = user.id, "SOS raised with no operators configured");
    } else {
        warn!(user_id = user.id, operators = messages.len(), "SOS raised");
    }
    deliver_all(ctx.state, messages).await;

    Ok(ctx.reply_with_menu(
        "Operators have been notified and will contact you. \
         In an emergency call 112.",
    ))
}
