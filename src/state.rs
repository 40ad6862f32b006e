use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};

use crate::config::Config;
use crate::crypto::PhoneCipher;
use crate::engine::dispatch::DispatchJob;
use crate::engine::pricing::{PricingEngine, Tariffs};
use crate::error::AppError;
use crate::notify::{ChannelNotifier, Notifier, OutboundMessage};
use crate::observability::metrics::Metrics;
use crate::operators::OperatorDirectory;
use crate::session::SessionStore;
use crate::store::reviews::ReviewStore;
use crate::store::trips::TripStore;
use crate::store::users::UserRegistry;

#[derive(Debug, Clone)]
pub struct DispatchPolicy {
    pub offer_fanout: usize,
    pub rebroadcast_after: Duration,
    pub max_rebroadcasts: u32,
}

pub struct AppState {
    pub users: UserRegistry,
    pub trips: TripStore,
    pub reviews: ReviewStore,
    pub sessions: SessionStore,
    pub pricing: PricingEngine,
    pub cipher: PhoneCipher,
    pub operators: OperatorDirectory,
    pub dispatch_policy: DispatchPolicy,
    pub dispatch_tx: mpsc::Sender<DispatchJob>,
    pub outbound_tx: broadcast::Sender<OutboundMessage>,
    pub notifier: Arc<dyn Notifier>,
    pub metrics: Metrics,
}

impl AppState {
    /// Outbound messages go to the `/ws` broadcast channel.
    pub fn new(config: &Config) -> Result<(Self, mpsc::Receiver<DispatchJob>), AppError> {
        let (outbound_tx, _unused_rx) = broadcast::channel(config.event_buffer_size);
        let notifier = Arc::new(ChannelNotifier::new(outbound_tx.clone()));
        Self::build(config, outbound_tx, notifier)
    }

    /// Same as [`AppState::new`] with a caller-supplied transport.
    pub fn with_notifier(
        config: &Config,
        notifier: Arc<dyn Notifier>,
    ) -> Result<(Self, mpsc::Receiver<DispatchJob>), AppError> {
        let (outbound_tx, _unused_rx) = broadcast::channel(config.event_buffer_size);
        Self::build(config, outbound_tx, notifier)
    }

    fn build(
        config: &Config,
        outbound_tx: broadcast::Sender<OutboundMessage>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<(Self, mpsc::Receiver<DispatchJob>), AppError> {
        let tariffs = match &config.tariffs_path {
            Some(path) => Tariffs::from_json_file(path)?,
            None => Tariffs::default(),
        };
        let (dispatch_tx, dispatch_rx) = mpsc::channel(config.dispatch_queue_size);

        Ok((
            Self {
                users: UserRegistry::new(),
                trips: TripStore::new(),
                reviews: ReviewStore::new(),
                sessions: SessionStore::new(config.session_ttl),
                pricing: PricingEngine::new(tariffs)?,
                cipher: PhoneCipher::new(config.encryption_key.as_bytes())?,
                operators: OperatorDirectory::new(config.operator_ids.iter().copied()),
                dispatch_policy: DispatchPolicy {
                    offer_fanout: config.offer_fanout,
                    rebroadcast_after: config.rebroadcast_after,
                    max_rebroadcasts: config.max_rebroadcasts,
                },
                dispatch_tx,
                outbound_tx,
                notifier,
                metrics: Metrics::new(),
            },
            dispatch_rx,
        ))
    }
}
