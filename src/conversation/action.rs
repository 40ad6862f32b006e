use serde::{Deserialize, Serialize};

use crate::models::driver::VehicleClass;
use crate::models::trip::TripId;
use crate::models::user::UserId;

/// One inbound event from the chat transport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Action {
    pub user_id: UserId,
    #[serde(default)]
    pub display_name: Option<String>,
    pub kind: ActionKind,
}

impl Action {
    pub fn new(user_id: UserId, kind: ActionKind) -> Self {
        Self {
            user_id,
            display_name: None,
            kind,
        }
    }
}

/// Everything a user can do. Buttons in outbound messages carry one of these
/// back verbatim, so the wire form doubles as the callback payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    Start,
    Abort,
    MainMenu,
    /// Free text typed by the user; consumed by the active flow, if any.
    Text {
        text: String,
    },

    ShowProfile,
    SetPhone,
    Training,
    SkipTraining,
    CompleteTraining,

    NewTrip,
    SelectOrigin {
        city: String,
    },
    SelectDestination {
        city: String,
    },
    ConfirmTrip {
        class: VehicleClass,
    },
    CheckTrip {
        trip_id: TripId,
    },
    AcceptTrip {
        trip_id: TripId,
    },
    StartTrip {
        trip_id: TripId,
    },
    StartWaiting {
        trip_id: TripId,
    },
    StopWaiting {
        trip_id: TripId,
    },
    CompleteTrip {
        trip_id: TripId,
    },
    CancelTrip {
        trip_id: TripId,
        #[serde(default)]
        reason: Option<String>,
    },
    LeaveReview {
        trip_id: TripId,
    },
    RateTrip {
        trip_id: TripId,
        rating: u8,
    },
    SkipComment,
    MyTrips,
    Sos,

    BecomeDriver,
    GoOnline,
    GoOffline,

    AdminPanel,
    AdminPendingDrivers,
    VerifyDriver {
        driver_id: UserId,
        #[serde(default)]
        class: Option<VehicleClass>,
    },
    RejectDriver {
        driver_id: UserId,
        #[serde(default)]
        reason: Option<String>,
    },
    BlockUser {
        user_id: UserId,
    },
    UnblockUser {
        user_id: UserId,
    },
}

impl ActionKind {
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::Start => "start",
            ActionKind::Abort => "abort",
            ActionKind::MainMenu => "main_menu",
            ActionKind::Text { .. } => "text",
            ActionKind::ShowProfile => "show_profile",
            ActionKind::SetPhone => "set_phone",
            ActionKind::Training => "training",
            ActionKind::SkipTraining => "skip_training",
            ActionKind::CompleteTraining => "complete_training",
            ActionKind::NewTrip => "new_trip",
            ActionKind::SelectOrigin { .. } => "select_origin",
            ActionKind::SelectDestination { .. } => "select_destination",
            ActionKind::ConfirmTrip { .. } => "confirm_trip",
            ActionKind::CheckTrip { .. } => "check_trip",
            ActionKind::AcceptTrip { .. } => "accept_trip",
            ActionKind::StartTrip { .. } => "start_trip",
            ActionKind::StartWaiting { .. } => "start_waiting",
            ActionKind::StopWaiting { .. } => "stop_waiting",
            ActionKind::CompleteTrip { .. } => "complete_trip",
            ActionKind::CancelTrip { .. } => "cancel_trip",
            ActionKind::LeaveReview { .. } => "leave_review",
            ActionKind::RateTrip { .. } => "rate_trip",
            ActionKind::SkipComment => "skip_comment",
            ActionKind::MyTrips => "my_trips",
            ActionKind::Sos => "sos",
            ActionKind::BecomeDriver => "become_driver",
            ActionKind::GoOnline => "go_online",
            ActionKind::GoOffline => "go_offline",
            ActionKind::AdminPanel => "admin_panel",
            ActionKind::AdminPendingDrivers => "admin_pending_drivers",
            ActionKind::VerifyDriver { .. } => "verify_driver",
            ActionKind::RejectDriver { .. } => "reject_driver",
            ActionKind::BlockUser { .. } => "block_user",
            ActionKind::UnblockUser { .. } => "unblock_user",
        }
    }

    /// Operator-only actions; everyone else gets a generic refusal.
    pub fn is_admin(&self) -> bool {
        matches!(
            self,
            ActionKind::AdminPanel
                | ActionKind::AdminPendingDrivers
                | ActionKind::VerifyDriver { .. }
                | ActionKind::RejectDriver { .. }
                | ActionKind::BlockUser { .. }
                | ActionKind::UnblockUser { .. }
        )
    }
}
