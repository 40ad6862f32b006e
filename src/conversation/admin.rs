use chrono::Utc;
use tracing::info;

use crate::conversation::action::ActionKind;
use crate::conversation::{render, Ctx};
use crate::error::AppError;
use crate::models::driver::VehicleClass;
use crate::models::trip::TripStatus;
use crate::models::user::UserId;
use crate::notify::{deliver, Choice, OutboundMessage};

const PENDING_PAGE: usize = 5;

pub fn panel(ctx: &Ctx<'_>) -> Result<OutboundMessage, AppError> {
    let users = &ctx.state.users;
    let trips = &ctx.state.trips;

    let midnight = Utc::now()
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
        .ok_or_else(|| AppError::Internal("failed to compute start of day".to_string()))?;

    let by_status = trips.count_by_status();
    let status_lines: Vec<String> = TripStatus::ALL
        .iter()
        .map(|status| format!("  {status}: {}", by_status.get(status).copied().unwrap_or(0)))
        .collect();

    let text = format!(
        "Admin panel\n\nUsers: {}\nDrivers: {} ({} pending)\nTrips today: {}\nTrips by status:\n{}\nOperators: {}",
        users.user_count(),
        users.driver_count(),
        users.pending_count(),
        trips.created_since(midnight),
        status_lines.join("\n"),
        ctx.operators.len(),
    );

    let mut message = ctx.reply(text);
    message.push_choice("Pending drivers", ActionKind::AdminPendingDrivers);
    message.push_choice("Main menu", ActionKind::MainMenu);
    Ok(message)
}

/// Newest applications, a page at a time, each with verify and reject
/// buttons.
pub fn pending_drivers(ctx: &Ctx<'_>) -> Result<OutboundMessage, AppError> {
    let pending = ctx.state.users.pending_drivers(PENDING_PAGE);
    if pending.is_empty() {
        let mut message = ctx.reply("No new applications.");
        message.push_choice("Back", ActionKind::AdminPanel);
        return Ok(message);
    }

    let mut cards = Vec::with_capacity(pending.len());
    let mut choices = Vec::new();
    for driver in &pending {
        cards.push(format!(
            "{}\nSubmitted: {}",
            render::driver_card(driver),
            driver.created_at.format("%d.%m.%Y %H:%M")
        ));

        let short_name: String = driver.full_name.chars().take(15).collect();
        choices.push(Choice::new(
            format!("Verify {short_name}"),
            ActionKind::VerifyDriver {
                driver_id: driver.user_id,
                class: None,
            },
        ));
        choices.push(Choice::new(
            format!("Reject {short_name}"),
            ActionKind::RejectDriver {
                driver_id: driver.user_id,
                reason: None,
            },
        ));
    }
    choices.push(Choice::new("Back", ActionKind::AdminPanel));

    Ok(ctx
        .reply(format!("New driver applications:\n\n{}", cards.join("\n\n")))
        .with_choices(choices))
}

pub async fn verify_driver(
    ctx: &Ctx<'_>,
    driver_id: UserId,
    class: Option<VehicleClass>,
) -> Result<OutboundMessage, AppError> {
    let driver = ctx
        .state
        .users
        .verify_driver(driver_id, ctx.user_id(), class, Utc::now())?;

    info!(
        operator_id = ctx.user_id(),
        driver_id,
        class = %driver.vehicle_class,
        "driver verified"
    );

    let mut notice = OutboundMessage::text(
        driver_id,
        format!(
            "Congratulations! Your application is approved ({} class). \
             Go online to start receiving orders.",
            driver.vehicle_class
        ),
    );
    notice.push_choice("Go online", ActionKind::GoOnline);
    deliver(ctx.state, notice).await;

    let mut message = ctx.reply(format!("Driver {} verified.", driver.full_name));
    message.push_choice("Pending drivers", ActionKind::AdminPendingDrivers);
    message.push_choice("Admin panel", ActionKind::AdminPanel);
    Ok(message)
}

pub async fn reject_driver(
    ctx: &Ctx<'_>,
    driver_id: UserId,
    reason: Option<String>,
) -> Result<OutboundMessage, AppError> {
    let driver = ctx
        .state
        .users
        .reject_driver(driver_id, ctx.user_id(), reason, Utc::now())?;

    info!(operator_id = ctx.user_id(), driver_id, "driver rejected");

    let mut text = "Your driver application was rejected.".to_string();
    match driver.rejection_reason.as_deref() {
        Some(reason) => text.push_str(&format!(" Reason: {reason}.")),
        None => text.push_str(" Contact an operator for details."),
    }
    deliver(ctx.state, OutboundMessage::text(driver_id, text)).await;

    let mut message = ctx.reply(format!("Driver {} rejected.", driver.full_name));
    message.push_choice("Pending drivers", ActionKind::AdminPendingDrivers);
    message.push_choice("Admin panel", ActionKind::AdminPanel);
    Ok(message)
}

pub fn set_blocked(ctx: &Ctx<'_>, user_id: UserId, blocked: bool) -> Result<OutboundMessage, AppError> {
    let user = ctx.state.users.set_blocked(user_id, blocked)?;
    info!(operator_id = ctx.user_id(), user_id, blocked, "user block state changed");

    let verb = if user.blocked { "blocked" } else { "unblocked" };
    let mut message = ctx.reply(format!("User {} ({}) {verb}.", user.display_name, user.id));
    message.push_choice("Admin panel", ActionKind::AdminPanel);
    Ok(message)
}
