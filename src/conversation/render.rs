//! Text and button layouts shared by the handlers.

use tracing::warn;

use crate::conversation::action::ActionKind;
use crate::models::driver::{Driver, Verification};
use crate::models::trip::{Trip, TripStatus};
use crate::models::user::{User, UserId};
use crate::notify::{Choice, OutboundMessage};
use crate::state::AppState;
use crate::validation::format_phone;

pub const PHONE_MISSING: &str = "not set";
pub const PHONE_UNAVAILABLE: &str = "unavailable";

/// Decrypted and formatted. A record that fails to decrypt renders as
/// "unavailable" instead of failing the whole reply.
pub fn phone_display(state: &AppState, user: &User) -> String {
    let Some(sealed) = user.encrypted_phone.as_deref() else {
        return PHONE_MISSING.to_string();
    };

    match state.cipher.decrypt(sealed) {
        Ok(phone) => format_phone(&phone),
        Err(err) => {
            warn!(user_id = user.id, error = %err, "stored phone failed to decrypt");
            PHONE_UNAVAILABLE.to_string()
        }
    }
}

/// The other party's phone, shown only to a party of a trip that has been
/// accepted and still has its driver.
pub fn counterpart_phone(state: &AppState, trip: &Trip, viewer: UserId) -> Option<String> {
    if !trip.status.has_driver() {
        return None;
    }

    let other = trip.counterpart(viewer)?;
    state
        .users
        .get_user(other)
        .map(|user| phone_display(state, &user))
}

pub fn trip_summary(trip: &Trip) -> String {
    let mut text = format!(
        "Trip {} -> {} ({} km, {} class)\nStatus: {}\nPrice: {}",
        trip.origin, trip.destination, trip.distance_km, trip.vehicle_class, trip.status, trip.price
    );

    if trip.waiting_minutes > 0 {
        text.push_str(&format!(
            "\nWaiting: {} min, charge {}",
            trip.waiting_minutes, trip.waiting_surcharge
        ));
    }
    if let Some(final_price) = trip.final_price {
        text.push_str(&format!("\nTotal: {final_price}"));
    }
    text
}

/// Buttons that make sense for `viewer` given the trip's current status.
pub fn trip_choices(trip: &Trip, viewer: UserId) -> Vec<Choice> {
    let trip_id = trip.id;
    let is_driver = trip.driver_id == Some(viewer);
    let cancel = Choice::new("Cancel trip", ActionKind::CancelTrip {
        trip_id,
        reason: None,
    });

    match trip.status {
        TripStatus::Searching => vec![
            Choice::new("Check status", ActionKind::CheckTrip { trip_id }),
            cancel,
        ],
        TripStatus::Accepted if is_driver => vec![
            Choice::new("Start trip", ActionKind::StartTrip { trip_id }),
            Choice::new("Start waiting", ActionKind::StartWaiting { trip_id }),
            cancel,
        ],
        TripStatus::Accepted => vec![
            Choice::new("Start trip", ActionKind::StartTrip { trip_id }),
            cancel,
        ],
        TripStatus::Started if is_driver => vec![
            Choice::new("Start waiting", ActionKind::StartWaiting { trip_id }),
            Choice::new("Complete trip", ActionKind::CompleteTrip { trip_id }),
        ],
        TripStatus::Started => vec![Choice::new(
            "Complete trip",
            ActionKind::CompleteTrip { trip_id },
        )],
        TripStatus::Completed => vec![
            Choice::new("Leave a review", ActionKind::LeaveReview { trip_id }),
            menu_choice(),
        ],
        TripStatus::Cancelled => vec![menu_choice()],
    }
}

pub fn menu_choice() -> Choice {
    Choice::new("Main menu", ActionKind::MainMenu)
}

pub fn main_menu(state: &AppState, user: &User, is_operator: bool) -> OutboundMessage {
    let mut message = OutboundMessage::text(
        user.id,
        format!("Main menu\n\nWelcome, {}! Choose an action:", user.display_name),
    );

    message.push_choice("New trip", ActionKind::NewTrip);
    message.push_choice("Profile", ActionKind::ShowProfile);
    message.push_choice("My trips", ActionKind::MyTrips);

    match state.users.get_driver(user.id) {
        Some(driver) if driver.is_verified() => {
            if driver.online {
                message.push_choice("Go offline", ActionKind::GoOffline);
            } else {
                message.push_choice("Go online", ActionKind::GoOnline);
            }
        }
        Some(driver) if driver.verification == Verification::Pending => {}
        _ => message.push_choice("Become a driver", ActionKind::BecomeDriver),
    }

    if !user.training_completed {
        message.push_choice("Training", ActionKind::Training);
    }
    message.push_choice("SOS", ActionKind::Sos);
    if is_operator {
        message.push_choice("Admin panel", ActionKind::AdminPanel);
    }
    message
}

pub fn driver_card(driver: &Driver) -> String {
    let status = match driver.verification {
        Verification::Pending => "under review",
        Verification::Verified => "verified",
        Verification::Rejected => "rejected",
    };

    let mut text = format!(
        "{} (id {})\nVehicle: {} {}, {} class\nExperience: {} years\nStatus: {status}",
        driver.full_name,
        driver.user_id,
        driver.vehicle_model,
        driver.plate_number,
        driver.vehicle_class,
        driver.experience_years
    );
    if let Some(reason) = driver.rejection_reason.as_deref() {
        text.push_str(&format!("\nReason: {reason}"));
    }
    text
}
