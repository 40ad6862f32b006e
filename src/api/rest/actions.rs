use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::Json;
use axum::Router;
use tracing::debug;

use crate::conversation::action::Action;
use crate::conversation::handle_action;
use crate::notify::OutboundMessage;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/actions", post(submit_action))
}

/// The reply goes back to the actor in the response body; messages for
/// anyone else leave through the notifier.
async fn submit_action(
    State(state): State<Arc<AppState>>,
    Json(action): Json<Action>,
) -> Json<OutboundMessage> {
    debug!(user_id = action.user_id, action = action.kind.name(), "action received");
    Json(handle_action(&state, action).await)
}
