//! Main application orchestration.

use crate::config::AppConfig;
use crate::error::AppResult;
use crate::session::Session;
use std::sync::Arc;
use std::time::Duration;
use tickwire_core::Instrument;
use tickwire_feed::QuoteStore;
use tickwire_persistence::Watchlist;
use tickwire_poller::{HttpFallbackSource, HttpPrimarySource, SnapshotPoller};
use tickwire_registry::CatalogClient;
use tickwire_ws::{SubscriptionSet, TickChannel};
use tracing::{info, warn};

/// Time allowed for background tasks to stop after shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Main application.
pub struct Application {
    config: AppConfig,
    store: Arc<QuoteStore>,
    subscriptions: Arc<SubscriptionSet>,
    channel: Arc<TickChannel>,
    poller: Arc<SnapshotPoller>,
    session: Arc<Session>,
}

impl Application {
    /// Build all components. The catalog is fetched once here; an
    /// unreachable backend leaves it empty rather than failing startup.
    pub async fn new(config: AppConfig) -> AppResult<Self> {
        let catalog_client = Arc::new(CatalogClient::new(&config.api_base_url)?);
        let catalog = catalog_client.fetch_catalog().await;

        let store = Arc::new(QuoteStore::new());
        let subscriptions = Arc::new(SubscriptionSet::new());

        let watchlist = Watchlist::load(&config.watchlist_path);
        let session = Arc::new(Session::new(
            catalog,
            config.search.clone(),
            watchlist,
            subscriptions.clone(),
            store.clone(),
            catalog_client,
        ));

        let channel = Arc::new(TickChannel::new(
            config.channel.to_channel_config(&config.ws_url),
            store.clone(),
            subscriptions.clone(),
        ));

        let timeout = config.poller.request_timeout();
        let primary = Arc::new(HttpPrimarySource::new(&config.api_base_url, timeout)?);
        let fallback = Arc::new(HttpFallbackSource::new(
            config.fallback_quote_url.clone(),
            timeout,
        )?);
        let poller = Arc::new(SnapshotPoller::new(
            config.poller.clone(),
            store.clone(),
            primary,
            fallback,
        ));

        info!(
            catalog = session.catalog().len(),
            watchlist = session.watchlist().len(),
            subscriptions = subscriptions.len(),
            "Application initialized"
        );

        Ok(Self {
            config,
            store,
            subscriptions,
            channel,
            poller,
            session,
        })
    }

    pub fn session(&self) -> Arc<Session> {
        self.session.clone()
    }

    /// Ad-hoc subscribe to each symbol before the loop starts. Returns the
    /// number accepted.
    pub async fn select_symbols(&self, symbols: &[String]) -> usize {
        let mut accepted = 0;
        for symbol in symbols {
            if self.session.select_symbol(symbol).await {
                accepted += 1;
            }
        }
        info!(requested = symbols.len(), accepted, "Startup selections applied");
        accepted
    }

    /// One-shot catalog search.
    pub fn search(&self, query: &str) -> Vec<Instrument> {
        self.session.search(query)
    }

    /// Run until Ctrl-C.
    pub async fn run(self) -> AppResult<()> {
        info!(ws_url = %self.config.ws_url, "Starting application");

        let channel = self.channel.clone();
        let channel_handle = tokio::spawn(async move { channel.run().await });

        let poller = self.poller.clone();
        let poller_handle = tokio::spawn(async move { poller.run().await });

        let mut summary_rx = self.poller.summary();
        let mut status_interval =
            tokio::time::interval(Duration::from_secs(self.config.status_interval_secs));

        loop {
            tokio::select! {
                Ok(()) = summary_rx.changed() => {
                    if let Some(summary) = summary_rx.borrow_and_update().clone() {
                        info!(
                            title = %summary.title,
                            status = %summary.status,
                            available = summary.available_count(),
                            as_of = %summary.as_of,
                            "Index summary updated"
                        );
                        for card in &summary.cards {
                            info!("  {card}");
                        }
                    }
                }

                _ = status_interval.tick() => {
                    self.log_status();
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        self.channel.shutdown();
        self.poller.shutdown();

        for (name, handle) in [("tick channel", channel_handle), ("poller", poller_handle)] {
            match tokio::time::timeout(SHUTDOWN_GRACE, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(task = name, error = %e, "Task panicked"),
                Err(_) => warn!(task = name, "Task did not stop in time"),
            }
        }

        self.log_status();
        info!("Shutdown complete");
        Ok(())
    }

    fn log_status(&self) {
        let summary = self.poller.latest();
        info!(
            state = %self.channel.state(),
            reconnects = self.channel.reconnect_count(),
            ticks = self.channel.ticks_applied(),
            subscriptions = self.subscriptions.len(),
            quotes = self.store.len(),
            poll_status = summary.as_ref().map(|s| s.status.to_string()).unwrap_or_else(|| "pending".to_string()),
            "Status"
        );
    }
}
