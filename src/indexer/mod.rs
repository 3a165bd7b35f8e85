//! Audit indexer.
//!
//! Tails the ledger event stream and applies each confirmed event to the
//! read model. Resumes from the store's durable cursor, so a crash between
//! batches replays at-least-once; the store's dedup makes replay a no-op.
//!
//! Transient ledger failures back off exponentially and retry forever. A
//! [`StoreError::ConsistencyViolation`] is different: it means the stream
//! and the projection disagree, and advancing the cursor would silently
//! lose the bad event. The indexer halts and leaves the cursor where it
//! was so an operator can inspect the stream.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::EventCursor;
use crate::ledger::{LedgerClient, LedgerError};
use crate::store::{ApplyOutcome, ReadModelStore, StoreError};

/// Indexer configuration.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Events fetched per poll.
    pub batch_size: usize,

    /// Sleep between polls when the stream is drained.
    pub poll_interval: Duration,

    /// Cap for the exponential backoff after ledger errors.
    pub max_backoff: Duration,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            poll_interval: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        }
    }
}

/// Running statistics.
#[derive(Debug, Default, Clone)]
pub struct IndexerStats {
    pub events_applied: u64,
    pub events_duplicate: u64,
    pub ledger_errors: u64,
    pub last_cursor: Option<EventCursor>,
}

/// Errors that terminate the indexer loop.
#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
    #[error("indexer already running")]
    AlreadyRunning,

    /// The read model refused an event. The cursor has not advanced past
    /// it; restarting the indexer will hit the same event again.
    #[error("indexer halted: {0}")]
    Halted(#[from] StoreError),
}

/// Single consumer of the ledger stream, sole writer of the read model.
pub struct AuditIndexer {
    config: IndexerConfig,
    ledger: Arc<dyn LedgerClient>,
    store: Arc<dyn ReadModelStore>,
    stats: RwLock<IndexerStats>,
    running: RwLock<bool>,
}

impl AuditIndexer {
    pub fn new(
        config: IndexerConfig,
        ledger: Arc<dyn LedgerClient>,
        store: Arc<dyn ReadModelStore>,
    ) -> Self {
        Self {
            config,
            ledger,
            store,
            stats: RwLock::new(IndexerStats::default()),
            running: RwLock::new(false),
        }
    }

    pub async fn stats(&self) -> IndexerStats {
        self.stats.read().await.clone()
    }

    /// Apply one batch starting after the store's cursor. Returns the
    /// number of events fetched (applied or deduplicated).
    async fn step(&self) -> Result<usize, IndexerError> {
        let cursor = self.store.last_cursor().await?;
        let events = match self
            .ledger
            .events_from(cursor, self.config.batch_size)
            .await
        {
            Ok(events) => events,
            Err(e) => {
                self.stats.write().await.ledger_errors += 1;
                warn!(error = %e, "event fetch failed");
                return Ok(0);
            }
        };

        let fetched = events.len();
        if fetched == 0 {
            if let Some(stored) = cursor {
                // An empty batch is only "caught up" if the ledger has
                // actually issued our cursor. A durable cursor past the
                // stream head means events confirmed after it would be
                // skipped forever, so halt instead of idling.
                let head = match self.ledger.head_cursor().await {
                    Ok(head) => head,
                    Err(e) => {
                        self.stats.write().await.ledger_errors += 1;
                        warn!(error = %e, "head cursor fetch failed");
                        return Ok(0);
                    }
                };
                if head.map_or(true, |h| h < stored) {
                    error!(
                        stored = %stored,
                        head = ?head,
                        "durable cursor is ahead of the ledger stream, halting"
                    );
                    return Err(IndexerError::Halted(StoreError::ConsistencyViolation(
                        format!(
                            "durable cursor {stored} is ahead of the ledger head ({head:?})"
                        ),
                    )));
                }
            }
        }
        for event in &events {
            let outcome = self.store.apply(event).await.map_err(|e| {
                error!(
                    tx_id = %event.tx_id,
                    cursor = %event.cursor,
                    error = %e,
                    "event refused by read model, halting"
                );
                IndexerError::from(e)
            })?;

            let mut stats = self.stats.write().await;
            match outcome {
                ApplyOutcome::Applied => stats.events_applied += 1,
                ApplyOutcome::Duplicate => {
                    debug!(tx_id = %event.tx_id, "duplicate event skipped");
                    stats.events_duplicate += 1;
                }
            }
            stats.last_cursor = Some(event.cursor);
        }
        Ok(fetched)
    }

    /// Run until the stream is drained. Test and catch-up entry point; the
    /// long-running service uses [`run`](Self::run).
    pub async fn run_until_idle(&self) -> Result<IndexerStats, IndexerError> {
        loop {
            let cursor_before = self.store.last_cursor().await?;
            let fetched = self.step().await?;
            if fetched == 0 && self.store.last_cursor().await? == cursor_before {
                return Ok(self.stats().await);
            }
        }
    }

    /// Run the indexing loop until [`stop`](Self::stop) is called or a
    /// consistency violation halts it.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), IndexerError> {
        {
            let mut running = self.running.write().await;
            if *running {
                return Err(IndexerError::AlreadyRunning);
            }
            *running = true;
        }
        info!(
            batch_size = self.config.batch_size,
            "audit indexer starting"
        );

        let mut backoff = self.config.poll_interval;
        loop {
            if !*self.running.read().await {
                info!("audit indexer stopping");
                return Ok(());
            }

            let errors_before = self.stats.read().await.ledger_errors;
            let fetched = match self.step().await {
                Ok(n) => n,
                Err(e) => {
                    *self.running.write().await = false;
                    return Err(e);
                }
            };

            if self.stats.read().await.ledger_errors > errors_before {
                // Ledger unreachable, back off and retry
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(self.config.max_backoff);
            } else if fetched == 0 {
                backoff = self.config.poll_interval;
                tokio::time::sleep(self.config.poll_interval).await;
            } else {
                backoff = self.config.poll_interval;
            }
        }
    }

    pub async fn stop(&self) {
        *self.running.write().await = false;
    }
}
