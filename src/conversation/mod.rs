//! Inbound action routing.
//!
//! [`handle_action`] is the only entry point: it registers the user on first
//! contact, applies the blocked-user gate, routes the typed action to its
//! handler and turns any [`AppError`] into a reply the user can act on.

pub mod account;
pub mod action;
pub mod admin;
pub mod driver;
pub mod render;
pub mod trips;

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::conversation::action::{Action, ActionKind};
use crate::error::AppError;
use crate::models::user::{User, UserId};
use crate::notify::OutboundMessage;
use crate::operators::OperatorSnapshot;
use crate::session::flow::Flow;
use crate::state::AppState;

const BLOCKED_TEXT: &str = "Your account is blocked. Contact support to have it unblocked.";
const UNAVAILABLE_TEXT: &str = "That option is no longer available.";
const REFUSED_TEXT: &str = "This action is not available.";
const APOLOGY_TEXT: &str = "Something went wrong. Please try again later.";

/// Everything a handler needs about the request. The operator snapshot is
/// taken once per action.
pub struct Ctx<'a> {
    pub state: &'a AppState,
    pub user: User,
    pub operators: Arc<OperatorSnapshot>,
}

impl Ctx<'_> {
    pub fn user_id(&self) -> UserId {
        self.user.id
    }

    pub fn is_operator(&self) -> bool {
        self.operators.is_operator(self.user.id)
    }

    pub fn reply(&self, text: impl Into<String>) -> OutboundMessage {
        OutboundMessage::text(self.user.id, text)
    }

    pub fn menu(&self) -> OutboundMessage {
        render::main_menu(self.state, &self.user, self.is_operator())
    }

    /// `text` followed by the main menu buttons.
    pub fn reply_with_menu(&self, text: impl Into<String>) -> OutboundMessage {
        let menu = self.menu();
        self.reply(text).with_choices(menu.choices)
    }
}

pub async fn handle_action(state: &AppState, action: Action) -> OutboundMessage {
    let Action {
        user_id,
        display_name,
        kind,
    } = action;

    let (user, created) = state.users.touch(user_id, display_name.as_deref());
    if created {
        info!(user_id, "user registered");
    }

    let ctx = Ctx {
        state,
        user,
        operators: state.operators.snapshot(),
    };

    if ctx.user.blocked && !ctx.is_operator() {
        debug!(user_id, action = kind.name(), "blocked user refused");
        return ctx.reply(BLOCKED_TEXT);
    }

    let name = kind.name();
    match route(&ctx, kind).await {
        Ok(reply) => reply,
        Err(err) => error_reply(&ctx, name, err),
    }
}

async fn route(ctx: &Ctx<'_>, kind: ActionKind) -> Result<OutboundMessage, AppError> {
    if kind.is_admin() && !ctx.is_operator() {
        return Err(AppError::NotAuthorized);
    }

    match kind {
        ActionKind::Start => account::start(ctx),
        ActionKind::Abort => {
            if let Some(flow) = ctx.state.sessions.abort(ctx.user_id()) {
                debug!(user_id = ctx.user_id(), flow = flow.name(), "flow aborted");
            }
            Ok(ctx.reply_with_menu("Cancelled."))
        }
        ActionKind::MainMenu => Ok(ctx.menu()),
        ActionKind::Text { text } => on_text(ctx, &text).await,

        ActionKind::ShowProfile => account::profile(ctx),
        ActionKind::SetPhone => account::ask_phone(ctx),
        ActionKind::Training => account::training(ctx),
        ActionKind::SkipTraining | ActionKind::CompleteTraining => account::finish_training(ctx),
        ActionKind::MyTrips => account::my_trips(ctx),
        ActionKind::Sos => account::sos(ctx).await,

        ActionKind::NewTrip => trips::new_trip(ctx),
        ActionKind::SelectOrigin { city } => trips::select_origin(ctx, &city),
        ActionKind::SelectDestination { city } => trips::select_destination(ctx, &city),
        ActionKind::ConfirmTrip { class } => trips::confirm(ctx, class).await,
        ActionKind::CheckTrip { trip_id } => trips::check(ctx, trip_id),
        ActionKind::StartTrip { trip_id } => trips::start(ctx, trip_id).await,
        ActionKind::CompleteTrip { trip_id } => trips::complete(ctx, trip_id).await,
        ActionKind::CancelTrip { trip_id, reason } => trips::cancel(ctx, trip_id, reason).await,
        ActionKind::LeaveReview { trip_id } => trips::leave_review(ctx, trip_id),
        ActionKind::RateTrip { trip_id, rating } => trips::rate(ctx, trip_id, rating),
        ActionKind::SkipComment => trips::submit_review(ctx, None),

        ActionKind::BecomeDriver => driver::become_driver(ctx),
        ActionKind::GoOnline => driver::set_online(ctx, true),
        ActionKind::GoOffline => driver::set_online(ctx, false),
        ActionKind::AcceptTrip { trip_id } => driver::accept(ctx, trip_id).await,
        ActionKind::StartWaiting { trip_id } => driver::start_waiting(ctx, trip_id),
        ActionKind::StopWaiting { trip_id } => driver::stop_waiting(ctx, trip_id).await,

        ActionKind::AdminPanel => admin::panel(ctx),
        ActionKind::AdminPendingDrivers => admin::pending_drivers(ctx),
        ActionKind::VerifyDriver { driver_id, class } => {
            admin::verify_driver(ctx, driver_id, class).await
        }
        ActionKind::RejectDriver { driver_id, reason } => {
            admin::reject_driver(ctx, driver_id, reason).await
        }
        ActionKind::BlockUser { user_id } => admin::set_blocked(ctx, user_id, true),
        ActionKind::UnblockUser { user_id } => admin::set_blocked(ctx, user_id, false),
    }
}

/// Free text goes to whichever flow is active.
async fn on_text(ctx: &Ctx<'_>, text: &str) -> Result<OutboundMessage, AppError> {
    let flow = ctx
        .state
        .sessions
        .get(ctx.user_id())
        .and_then(|session| session.flow);

    match flow {
        Some(Flow::Phone) => account::submit_phone(ctx, text),
        Some(Flow::DriverOnboarding(_)) => driver::onboarding_input(ctx, text).await,
        Some(Flow::Review(_)) => trips::submit_review(ctx, Some(text)),
        None => Ok(ctx.reply_with_menu("Use the menu buttons to navigate.")),
    }
}

fn error_reply(ctx: &Ctx<'_>, action: &str, err: AppError) -> OutboundMessage {
    let user_id = ctx.user_id();
    match err {
        AppError::Validation(msg) | AppError::BadRequest(msg) => {
            ctx.reply(format!("{}. Please try again.", capitalize(&msg)))
        }
        AppError::Precondition(msg) => ctx.reply_with_menu(format!("{}.", capitalize(&msg))),
        AppError::AlreadyClaimed | AppError::InvalidTransition(_) => {
            debug!(user_id, action, error = %err, "stale action");
            ctx.reply_with_menu(UNAVAILABLE_TEXT)
        }
        AppError::NotAuthorized | AppError::NotFound(_) => {
            debug!(user_id, action, error = %err, "action refused");
            ctx.reply_with_menu(REFUSED_TEXT)
        }
        AppError::Crypto(_) | AppError::Internal(_) => {
            error!(user_id, action, error = %err, "action failed");
            ctx.reply_with_menu(APOLOGY_TEXT)
        }
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use tokio::sync::mpsc;

    use super::*;
    use crate::config::Config;
    use crate::engine::dispatch::DispatchJob;
    use crate::models::driver::VehicleClass;
    use crate::models::trip::{TripId, TripStatus};

    pub(crate) fn setup(operators: Vec<UserId>) -> (Arc<AppState>, mpsc::Receiver<DispatchJob>) {
        let config = Config {
            operator_ids: operators,
            ..Config::default()
        };
        let (state, rx) = AppState::new(&config).unwrap();
        (Arc::new(state), rx)
    }

    pub(crate) async fn send(state: &AppState, user_id: UserId, kind: ActionKind) -> OutboundMessage {
        handle_action(state, Action::new(user_id, kind)).await
    }

    pub(crate) fn text(text: &str) -> ActionKind {
        ActionKind::Text {
            text: text.to_string(),
        }
    }

    pub(crate) async fn register_passenger(state: &AppState, user_id: UserId) {
        send(state, user_id, ActionKind::SetPhone).await;
        send(state, user_id, text("+7 999 123-45-67")).await;
    }

    pub(crate) async fn register_driver(state: &AppState, user_id: UserId, operator: UserId) {
        register_passenger(state, user_id).await;
        send(state, user_id, ActionKind::BecomeDriver).await;
        for input in ["Ivan Petrov", "Lada Vesta", "A123BC77", "7"] {
            send(state, user_id, text(input)).await;
        }
        send(
            state,
            operator,
            ActionKind::VerifyDriver {
                driver_id: user_id,
                class: None,
            },
        )
        .await;
        send(state, user_id, ActionKind::GoOnline).await;
    }

    pub(crate) async fn order(state: &AppState, passenger: UserId, from: &str, to: &str) -> TripId {
        send(state, passenger, ActionKind::NewTrip).await;
        send(state, passenger, ActionKind::SelectOrigin { city: from.to_string() }).await;
        send(state, passenger, ActionKind::SelectDestination { city: to.to_string() }).await;
        let reply = send(
            state,
            passenger,
            ActionKind::ConfirmTrip {
                class: VehicleClass::Economy,
            },
        )
        .await;

        reply
            .choices
            .iter()
            .find_map(|choice| match choice.action {
                ActionKind::CheckTrip { trip_id } => Some(trip_id),
                _ => None,
            })
            .unwrap_or_else(|| panic!("no trip created: {}", reply.text))
    }

    #[tokio::test]
    async fn first_contact_offers_training() {
        let (state, _rx) = setup(vec![]);
        let reply = send(&state, 1, ActionKind::Start).await;

        assert!(reply.choices.iter().any(|c| c.action == ActionKind::SkipTraining));
        assert_eq!(state.users.user_count(), 1);

        send(&state, 1, ActionKind::SkipTraining).await;
        let reply = send(&state, 1, ActionKind::Start).await;
        assert!(reply.choices.iter().any(|c| c.action == ActionKind::NewTrip));
    }

    #[tokio::test]
    async fn blocked_users_are_refused_but_operators_are_not() {
        let (state, _rx) = setup(vec![99]);
        send(&state, 1, ActionKind::Start).await;
        send(&state, 99, ActionKind::BlockUser { user_id: 1 }).await;

        let reply = send(&state, 1, ActionKind::NewTrip).await;
        assert_eq!(reply.text, BLOCKED_TEXT);
        assert!(reply.choices.is_empty());

        send(&state, 99, ActionKind::UnblockUser { user_id: 1 }).await;
        let reply = send(&state, 1, ActionKind::MainMenu).await;
        assert_ne!(reply.text, BLOCKED_TEXT);
    }

    #[tokio::test]
    async fn admin_actions_need_an_operator() {
        let (state, _rx) = setup(vec![99]);
        let reply = send(&state, 1, ActionKind::AdminPanel).await;
        assert_eq!(reply.text, REFUSED_TEXT);

        let reply = send(&state, 99, ActionKind::AdminPanel).await;
        assert!(reply.text.contains("Users: 2"));
    }

    #[tokio::test]
    async fn operator_reload_takes_effect_on_next_action() {
        let (state, _rx) = setup(vec![]);
        assert_eq!(send(&state, 5, ActionKind::AdminPanel).await.text, REFUSED_TEXT);

        state.operators.reload([5]);
        assert_ne!(send(&state, 5, ActionKind::AdminPanel).await.text, REFUSED_TEXT);
    }

    #[tokio::test]
    async fn ordering_without_phone_asks_for_one() {
        let (state, _rx) = setup(vec![]);
        let reply = send(&state, 1, ActionKind::NewTrip).await;

        assert!(reply.choices.iter().any(|c| c.action == ActionKind::SetPhone));
        assert!(state.trips.is_empty());
    }

    #[tokio::test]
    async fn invalid_phone_reprompts_and_keeps_flow() {
        let (state, _rx) = setup(vec![]);
        send(&state, 1, ActionKind::SetPhone).await;

        let reply = send(&state, 1, text("12345")).await;
        assert!(reply.text.contains("Please try again"));
        assert!(!state.users.get_user(1).unwrap().has_phone());

        send(&state, 1, text("89991234567")).await;
        assert!(state.users.get_user(1).unwrap().has_phone());
        assert!(state.sessions.get(1).is_none());
    }

    #[tokio::test]
    async fn abort_drops_onboarding_without_persisting() {
        let (state, _rx) = setup(vec![]);
        send(&state, 1, ActionKind::BecomeDriver).await;
        send(&state, 1, text("Ivan Petrov")).await;

        send(&state, 1, ActionKind::Abort).await;
        send(&state, 1, text("Lada Vesta")).await;

        assert!(state.users.get_driver(1).is_none());
        assert!(state.sessions.get(1).is_none());
    }

    #[tokio::test]
    async fn full_ride_through_actions() {
        let (state, _rx) = setup(vec![99]);
        register_passenger(&state, 1).await;
        register_driver(&state, 2, 99).await;

        let trip_id = order(&state, 1, "Moscow", "Tver").await;
        assert_eq!(state.trips.get(&trip_id).unwrap().price, 2200);

        let accepted = send(&state, 2, ActionKind::AcceptTrip { trip_id }).await;
        assert!(accepted.text.contains("+7 (999) 123-45-67"));

        send(&state, 2, ActionKind::StartTrip { trip_id }).await;
        send(&state, 2, ActionKind::StartWaiting { trip_id }).await;
        state
            .trips
            .transition(&trip_id, &[TripStatus::Started], |trip| {
                trip.waiting_started_at = Some(Utc::now() - Duration::seconds(6 * 60 + 30));
                Ok(())
            })
            .unwrap();
        let stopped = send(&state, 2, ActionKind::StopWaiting { trip_id }).await;
        assert!(stopped.text.contains("13"), "{}", stopped.text);

        let done = send(&state, 2, ActionKind::CompleteTrip { trip_id }).await;
        assert!(done.text.contains("2213"), "{}", done.text);
        assert_eq!(state.trips.get(&trip_id).unwrap().status, TripStatus::Completed);

        send(&state, 1, ActionKind::LeaveReview { trip_id }).await;
        send(&state, 1, ActionKind::RateTrip { trip_id, rating: 4 }).await;
        send(&state, 1, text("smooth ride")).await;
        assert_eq!(state.users.get_user(2).unwrap().rating, 4.0);

        let again = send(&state, 1, ActionKind::LeaveReview { trip_id }).await;
        assert_eq!(again.text, UNAVAILABLE_TEXT);
    }

    #[tokio::test]
    async fn second_accept_is_told_trip_is_gone() {
        let (state, _rx) = setup(vec![99]);
        register_passenger(&state, 1).await;
        register_driver(&state, 2, 99).await;
        register_driver(&state, 3, 99).await;

        let trip_id = order(&state, 1, "Moscow", "Tula").await;
        send(&state, 2, ActionKind::AcceptTrip { trip_id }).await;
        let late = send(&state, 3, ActionKind::AcceptTrip { trip_id }).await;

        assert_eq!(late.text, UNAVAILABLE_TEXT);
        assert_eq!(state.trips.get(&trip_id).unwrap().driver_id, Some(2));
    }

    #[tokio::test]
    async fn strangers_cannot_see_or_cancel_trips() {
        let (state, _rx) = setup(vec![]);
        register_passenger(&state, 1).await;
        let trip_id = order(&state, 1, "Moscow", "Kaluga").await;

        assert_eq!(send(&state, 7, ActionKind::CheckTrip { trip_id }).await.text, REFUSED_TEXT);
        let reply = send(
            &state,
            7,
            ActionKind::CancelTrip {
                trip_id,
                reason: None,
            },
        )
        .await;
        assert_eq!(reply.text, REFUSED_TEXT);

        let unknown = uuid::Uuid::new_v4();
        assert_eq!(
            send(&state, 7, ActionKind::CheckTrip { trip_id: unknown }).await.text,
            REFUSED_TEXT
        );
        assert_eq!(state.trips.get(&trip_id).unwrap().status, TripStatus::Searching);
    }
}
