// ABOUTME: Feeds store change events into the dispatcher
// ABOUTME: Failures are logged per event so one bad write never stops the loop

use caseflow_storage::DocumentChange;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, error, info, warn};

use crate::dispatcher::{DispatchReport, Dispatcher};
use crate::ReconcileResult;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerStats {
    pub received: usize,
    pub dispatched: usize,
    pub failed: usize,
    /// Events dropped because the receiver fell behind the feed
    pub lagged: u64,
}

pub struct ChangeListener {
    dispatcher: Arc<Dispatcher>,
}

impl ChangeListener {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Dispatch one change. Returns the report when a test case was reconciled.
    pub async fn handle(&self, change: &DocumentChange) -> ReconcileResult<Option<DispatchReport>> {
        self.dispatcher
            .on_document_change(change)
            .await
            .inspect_err(|err| {
                error!("Failed to reconcile {} change: {}", change.collection, err);
            })
    }

    /// Process every event already queued on `rx`, then return
    pub async fn drain(&self, rx: &mut broadcast::Receiver<DocumentChange>) -> ListenerStats {
        let mut stats = ListenerStats::default();
        loop {
            match rx.try_recv() {
                Ok(change) => self.record(&change, &mut stats).await,
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!("Change listener lagged, {} events skipped", skipped);
                    stats.lagged += skipped;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        debug!(?stats, "Drained change feed");
        stats
    }

    /// Process events until `shutdown` resolves or the feed closes
    pub async fn run<F>(
        &self,
        mut rx: broadcast::Receiver<DocumentChange>,
        shutdown: F,
    ) -> ListenerStats
    where
        F: Future<Output = ()>,
    {
        let mut stats = ListenerStats::default();
        tokio::pin!(shutdown);
        info!("Change listener started");

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Change listener shutting down");
                    break;
                }
                received = rx.recv() => match received {
                    Ok(change) => self.record(&change, &mut stats).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Change listener lagged, {} events skipped", skipped);
                        stats.lagged += skipped;
                    }
                    Err(RecvError::Closed) => {
                        info!("Change feed closed");
                        break;
                    }
                },
            }
        }

        info!(
            received = stats.received,
            dispatched = stats.dispatched,
            failed = stats.failed,
            "Change listener stopped"
        );
        stats
    }

    async fn record(&self, change: &DocumentChange, stats: &mut ListenerStats) {
        stats.received += 1;
        match self.handle(change).await {
            Ok(Some(_)) => stats.dispatched += 1,
            Ok(None) => {}
            Err(_) => stats.failed += 1,
        }
    }
}
