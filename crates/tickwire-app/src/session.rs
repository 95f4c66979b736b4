//! User-facing session state.
//!
//! Ties the catalog, search, watchlist and ad-hoc selections to the
//! subscription set. The set is always the watchlist keys followed by the
//! ad-hoc keys, so toggling or selecting never drops a live subscription
//! that another source still needs.

use parking_lot::Mutex;
use std::sync::Arc;
use tickwire_core::{Instrument, InstrumentKey, Quote};
use tickwire_feed::QuoteStore;
use tickwire_persistence::{PersistenceResult, Watchlist};
use tickwire_registry::{Debouncer, SearchConfig, SearchService, SymbolSubscriber};
use tickwire_ws::SubscriptionSet;
use tracing::{debug, info, warn};

pub struct Session {
    catalog: Arc<[Instrument]>,
    search: SearchService,
    debouncer: Debouncer,
    watchlist: Mutex<Watchlist>,
    /// Keys subscribed through `select`, in selection order.
    adhoc: Mutex<Vec<InstrumentKey>>,
    selected: Mutex<Option<Instrument>>,
    subscriptions: Arc<SubscriptionSet>,
    store: Arc<QuoteStore>,
    subscriber: Arc<dyn SymbolSubscriber>,
}

impl Session {
    /// Create a session and seed the subscription set from the watchlist.
    pub fn new(
        catalog: Arc<[Instrument]>,
        search_config: SearchConfig,
        watchlist: Watchlist,
        subscriptions: Arc<SubscriptionSet>,
        store: Arc<QuoteStore>,
        subscriber: Arc<dyn SymbolSubscriber>,
    ) -> Self {
        let debouncer = Debouncer::new(search_config.debounce());
        let session = Self {
            catalog,
            search: SearchService::new(search_config),
            debouncer,
            watchlist: Mutex::new(watchlist),
            adhoc: Mutex::new(Vec::new()),
            selected: Mutex::new(None),
            subscriptions,
            store,
            subscriber,
        };
        session.sync_subscriptions();
        session
    }

    pub fn catalog(&self) -> &Arc<[Instrument]> {
        &self.catalog
    }

    /// Ranked catalog search with the configured default limit.
    pub fn search(&self, query: &str) -> Vec<Instrument> {
        let limit = self.search.config().default_limit;
        self.search.search(&self.catalog, query, limit)
    }

    /// Search after the debounce window. `None` when a later query
    /// superseded this one.
    pub async fn search_debounced(&self, query: &str) -> Option<Vec<Instrument>> {
        let query = self.debouncer.submit(query.to_string()).await?;
        Some(self.search(&query))
    }

    pub fn watchlist(&self) -> Vec<Instrument> {
        self.watchlist.lock().items().to_vec()
    }

    pub fn is_watched(&self, instrument: &Instrument) -> bool {
        self.watchlist.lock().contains(instrument)
    }

    /// Add or remove `instrument` from the watchlist. Returns `true` when it
    /// is now watched. The subscription set only changes after the file
    /// write succeeded.
    pub fn toggle_watchlist(&self, instrument: Instrument) -> PersistenceResult<bool> {
        let symbol = instrument.symbol.clone();
        let watched = self.watchlist.lock().toggle(instrument)?;
        info!(symbol = %symbol, watched, "Watchlist toggled");
        self.sync_subscriptions();
        Ok(watched)
    }

    /// Ad-hoc subscribe to an instrument outside the watchlist. On success
    /// its key joins the subscription set and it becomes the selection.
    pub async fn select(&self, instrument: Instrument) -> bool {
        if !self.subscriber.subscribe(&instrument.symbol).await {
            warn!(symbol = %instrument.symbol, "Selection not subscribed");
            return false;
        }

        {
            let mut adhoc = self.adhoc.lock();
            if !adhoc.contains(&instrument.key) {
                adhoc.push(instrument.key.clone());
            }
        }
        debug!(key = %instrument.key, "Selected instrument");
        *self.selected.lock() = Some(instrument);
        self.sync_subscriptions();
        true
    }

    /// Catalog entry for `symbol` (case-insensitive).
    pub fn find_symbol(&self, symbol: &str) -> Option<Instrument> {
        self.catalog
            .iter()
            .find(|inst| inst.symbol.eq_ignore_ascii_case(symbol))
            .cloned()
    }

    /// [`select`](Self::select) by trading symbol. Symbols missing from the
    /// catalog are rejected without a backend call.
    pub async fn select_symbol(&self, symbol: &str) -> bool {
        match self.find_symbol(symbol) {
            Some(instrument) => self.select(instrument).await,
            None => {
                warn!(symbol, "Symbol not in catalog");
                false
            }
        }
    }

    pub fn selected(&self) -> Option<Instrument> {
        self.selected.lock().clone()
    }

    /// Quote for a symbol: the catalog entry's exact key first, then the
    /// store's containment fallback on the symbol itself.
    pub fn quote_for_symbol(&self, symbol: &str) -> Option<Quote> {
        let exact = self
            .find_symbol(symbol)
            .and_then(|inst| self.store.get(&inst.key));
        exact.or_else(|| self.store.resolve(symbol))
    }

    /// Watchlist entries paired with their current quote, if any.
    pub fn watchlist_quotes(&self) -> Vec<(Instrument, Option<Quote>)> {
        self.watchlist()
            .into_iter()
            .map(|inst| {
                let quote = self.store.get(&inst.key).or_else(|| self.store.resolve(&inst.symbol));
                (inst, quote)
            })
            .collect()
    }

    fn sync_subscriptions(&self) {
        let mut keys = self.watchlist.lock().keys();
        keys.extend(self.adhoc.lock().iter().cloned());
        if self.subscriptions.replace(keys) {
            debug!(count = self.subscriptions.len(), "Subscription set updated");
        }
    }
}
