//! Passenger-side trip flow plus the transitions either party may trigger.

use crate::conversation::action::ActionKind;
use crate::conversation::{render, Ctx};
use crate::engine::{lifecycle, rating};
use crate::error::AppError;
use crate::models::driver::VehicleClass;
use crate::models::trip::{Trip, TripId, TripStatus};
use crate::notify::{Choice, OutboundMessage};
use crate::session::flow::{Flow, ReviewDraft, TripDraft};
use crate::validation::{validate_comment, validate_rating};

/// Party-only view of a trip. Unknown ids and other people's trips look
/// the same to the caller.
fn visible_trip(ctx: &Ctx<'_>, trip_id: TripId) -> Result<Trip, AppError> {
    ctx.state
        .trips
        .get(&trip_id)
        .filter(|trip| trip.is_party(ctx.user_id()) || ctx.is_operator())
        .ok_or(AppError::NotAuthorized)
}

fn phone_required(ctx: &Ctx<'_>) -> OutboundMessage {
    let mut message = ctx.reply(
        "A phone number is required to order a trip, so the driver can reach you.",
    );
    message.push_choice("Set phone", ActionKind::SetPhone);
    message.push_choice("Main menu", ActionKind::MainMenu);
    message
}

pub fn new_trip(ctx: &Ctx<'_>) -> Result<OutboundMessage, AppError> {
    if !ctx.user.has_phone() {
        return Ok(phone_required(ctx));
    }

    ctx.state.sessions.update(ctx.user_id(), |session| {
        session.trip_draft = None;
    });

    let choices = ctx
        .state
        .pricing
        .cities()
        .iter()
        .map(|city| {
            Choice::new(
                format!("{} ({})", city.name, city.region),
                ActionKind::SelectOrigin {
                    city: city.name.clone(),
                },
            )
        })
        .chain(std::iter::once(render::menu_choice()))
        .collect();

    Ok(ctx.reply("New trip\n\nChoose the departure city:").with_choices(choices))
}

pub fn select_origin(ctx: &Ctx<'_>, city: &str) -> Result<OutboundMessage, AppError> {
    if !ctx.state.pricing.is_known_city(city) {
        return Err(AppError::Validation(format!("unknown city {city}")));
    }

    ctx.state.sessions.update(ctx.user_id(), |session| {
        session.trip_draft = Some(TripDraft {
            origin: city.to_string(),
            destination: None,
        });
    });

    let choices = ctx
        .state
        .pricing
        .cities()
        .iter()
        .filter(|candidate| candidate.name != city)
        .map(|candidate| {
            Choice::new(
                candidate.name.clone(),
                ActionKind::SelectDestination {
                    city: candidate.name.clone(),
                },
            )
        })
        .chain(std::iter::once(Choice::new("Back", ActionKind::NewTrip)))
        .collect();

    Ok(ctx
        .reply(format!("From: {city}\n\nChoose the destination:"))
        .with_choices(choices))
}

pub fn select_destination(ctx: &Ctx<'_>, city: &str) -> Result<OutboundMessage, AppError> {
    if !ctx.state.pricing.is_known_city(city) {
        return Err(AppError::Validation(format!("unknown city {city}")));
    }

    let origin = ctx.state.sessions.update(ctx.user_id(), |session| -> Option<Result<String, AppError>> {
        let draft = session.trip_draft.as_mut()?;
        if draft.origin == city {
            return Some(Err(AppError::Validation(
                "destination must differ from the departure city".to_string(),
            )));
        }
        draft.destination = Some(city.to_string());
        Some(Ok(draft.origin.clone()))
    });

    let origin = match origin {
        Some(result) => result?,
        None => {
            return Err(AppError::Precondition(
                "pick a departure city first".to_string(),
            ));
        }
    };

    let mut lines = Vec::new();
    let mut choices = Vec::new();
    for class in VehicleClass::ALL {
        let quote = ctx.state.pricing.quote(&origin, city, class);
        lines.push(format!("{class}: {}", quote.price));
        choices.push(Choice::new(
            format!("{class}, {}", quote.price),
            ActionKind::ConfirmTrip { class },
        ));
    }
    choices.push(Choice::new("Back", ActionKind::SelectOrigin { city: origin.clone() }));

    let distance = ctx.state.pricing.distance_km(&origin, city);
    Ok(ctx
        .reply(format!(
            "Route: {origin} -> {city}, {distance} km\n\n{}\n\nChoose a class:",
            lines.join("\n")
        ))
        .with_choices(choices))
}

pub async fn confirm(ctx: &Ctx<'_>, class: VehicleClass) -> Result<OutboundMessage, AppError> {
    if !ctx.user.has_phone() {
        return Ok(phone_required(ctx));
    }

    let route = ctx
        .state
        .sessions
        .get(ctx.user_id())
        .and_then(|session| session.trip_draft)
        .and_then(|draft| draft.destination.map(|destination| (draft.origin, destination)));

    let Some((origin, destination)) = route else {
        return Err(AppError::Precondition(
            "the route is not selected, start a new trip".to_string(),
        ));
    };

    let trip = lifecycle::create_trip(ctx.state, ctx.user_id(), &origin, &destination, class).await?;
    ctx.state.sessions.update(ctx.user_id(), |session| {
        session.trip_draft = None;
    });

    Ok(ctx
        .reply(format!(
            "Order created!\n\n{}\n\nLooking for a driver. We will notify you when one accepts.",
            render::trip_summary(&trip)
        ))
        .with_choices(render::trip_choices(&trip, ctx.user_id())))
}

pub fn check(ctx: &Ctx<'_>, trip_id: TripId) -> Result<OutboundMessage, AppError> {
    let trip = visible_trip(ctx, trip_id)?;
    let mut text = render::trip_summary(&trip);

    if let Some(driver) = trip.driver_id.and_then(|id| ctx.state.users.get_driver(id)) {
        text.push_str(&format!(
            "\nDriver: {}, {} {}",
            driver.full_name, driver.vehicle_model, driver.plate_number
        ));
    }
    if let Some(phone) = render::counterpart_phone(ctx.state, &trip, ctx.user_id()) {
        text.push_str(&format!("\nPhone: {phone}"));
    }

    Ok(ctx
        .reply(text)
        .with_choices(render::trip_choices(&trip, ctx.user_id())))
}

pub async fn start(ctx: &Ctx<'_>, trip_id: TripId) -> Result<OutboundMessage, AppError> {
    let trip = lifecycle::start_trip(ctx.state, trip_id, ctx.user_id()).await?;
    Ok(ctx
        .reply(format!("The trip has started.\n\n{}", render::trip_summary(&trip)))
        .with_choices(render::trip_choices(&trip, ctx.user_id())))
}

pub async fn complete(ctx: &Ctx<'_>, trip_id: TripId) -> Result<OutboundMessage, AppError> {
    let trip = lifecycle::complete_trip(ctx.state, trip_id, ctx.user_id()).await?;
    Ok(ctx
        .reply(format!(
            "Trip completed.\n\nPrice: {}\nWaiting charge: {}\nTotal: {}\n\nThank you for riding with us!",
            trip.price,
            trip.waiting_surcharge,
            trip.final_price.unwrap_or(trip.price)
        ))
        .with_choices(render::trip_choices(&trip, ctx.user_id())))
}

pub async fn cancel(
    ctx: &Ctx<'_>,
    trip_id: TripId,
    reason: Option<String>,
) -> Result<OutboundMessage, AppError> {
    let reason = match reason {
        Some(raw) => validate_comment(&raw)?,
        None => None,
    };

    let trip = lifecycle::cancel_trip(ctx.state, trip_id, ctx.user_id(), reason).await?;

    Ok(ctx.reply_with_menu(format!(
        "Trip {} -> {} cancelled.",
        trip.origin, trip.destination
    )))
}

fn reviewable_trip(ctx: &Ctx<'_>, trip_id: TripId) -> Result<Trip, AppError> {
    let trip = visible_trip(ctx, trip_id)?;
    if !trip.is_party(ctx.user_id()) {
        return Err(AppError::NotAuthorized);
    }
    if trip.status != TripStatus::Completed || ctx.state.reviews.exists(trip_id, ctx.user_id()) {
        return Err(AppError::InvalidTransition(
            "trip cannot be reviewed".to_string(),
        ));
    }
    Ok(trip)
}

pub fn leave_review(ctx: &Ctx<'_>, trip_id: TripId) -> Result<OutboundMessage, AppError> {
    reviewable_trip(ctx, trip_id)?;

    ctx.state.sessions.update(ctx.user_id(), |session| {
        session.flow = Some(Flow::Review(ReviewDraft {
            trip_id,
            rating: None,
        }));
    });

    let choices = (1..=5u8)
        .map(|rating| Choice::new(rating.to_string(), ActionKind::RateTrip { trip_id, rating }))
        .chain(std::iter::once(Choice::new("Skip", ActionKind::Abort)))
        .collect();

    Ok(ctx.reply("Rate the trip from 1 to 5:").with_choices(choices))
}

pub fn rate(ctx: &Ctx<'_>, trip_id: TripId, rating: u8) -> Result<OutboundMessage, AppError> {
    let rating = validate_rating(rating)?;
    reviewable_trip(ctx, trip_id)?;

    ctx.state.sessions.update(ctx.user_id(), |session| {
        session.flow = Some(Flow::Review(ReviewDraft {
            trip_id,
            rating: Some(rating),
        }));
    });

    let mut message = ctx.reply(format!(
        "Rating: {rating}\n\nWrite a comment for your review or skip it."
    ));
    message.push_choice("Skip comment", ActionKind::SkipComment);
    Ok(message)
}

/// Finishes the review flow. An over-long comment re-prompts and keeps the
/// chosen rating.
pub fn submit_review(ctx: &Ctx<'_>, comment: Option<&str>) -> Result<OutboundMessage, AppError> {
    let comment = match comment {
        Some(raw) => validate_comment(raw)?,
        None => None,
    };

    let draft = ctx.state.sessions.update(ctx.user_id(), |session| {
        match session.flow.take() {
            Some(Flow::Review(ReviewDraft {
                trip_id,
                rating: Some(rating),
            })) => Some((trip_id, rating)),
            other => {
                session.flow = other;
                None
            }
        }
    });

    let Some((trip_id, rating)) = draft else {
        return Err(AppError::Precondition(
            "choose a rating with the buttons first".to_string(),
        ));
    };

    rating::submit_review(ctx.state, trip_id, ctx.user_id(), rating, comment.as_deref())?;
    Ok(ctx.reply_with_menu("Thank you for the review!"))
}
