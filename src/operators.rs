use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use crate::models::user::UserId;

/// Immutable set of privileged operator ids. Handlers take one snapshot per
/// request and never observe a half-applied reload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperatorSnapshot {
    ids: BTreeSet<UserId>,
}

impl OperatorSnapshot {
    pub fn new(ids: impl IntoIterator<Item = UserId>) -> Self {
        Self {
            ids: ids.into_iter().collect(),
        }
    }

    pub fn is_operator(&self, user_id: UserId) -> bool {
        self.ids.contains(&user_id)
    }

    pub fn ids(&self) -> impl Iterator<Item = UserId> + '_ {
        self.ids.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

pub struct OperatorDirectory {
    tx: watch::Sender<Arc<OperatorSnapshot>>,
}

impl OperatorDirectory {
    pub fn new(ids: impl IntoIterator<Item = UserId>) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(OperatorSnapshot::new(ids)));
        Self { tx }
    }

    pub fn snapshot(&self) -> Arc<OperatorSnapshot> {
        self.tx.borrow().clone()
    }

    /// Atomically replaces the whole snapshot.
    pub fn reload(&self, ids: impl IntoIterator<Item = UserId>) -> Arc<OperatorSnapshot> {
        let snapshot = Arc::new(OperatorSnapshot::new(ids));
        self.tx.send_replace(snapshot.clone());
        info!(operators = snapshot.len(), "operator snapshot reloaded");
        snapshot
    }
}
