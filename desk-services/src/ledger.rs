//! Position ledger with live tick valuation
//!
//! The [`PositionLedger`] keeps one [`Position`] per held symbol, revalues it
//! on every inbound trade tick, and notifies summary subscribers
//! synchronously on each change. A periodic reconciliation pass pulls fresh
//! quotes through the same tick path, so a dropped stream cannot leave
//! valuations stale forever.
//!
//! The ledger is a plain service instance: construct it with the manager,
//! store, and price source it should use, clone the handle freely, and call
//! `destroy` when done.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

use desk_core::feed::msg_type;
use desk_core::{HoldingsStore, PortfolioSummary, Position, PriceSource, TradeMessage};
use desk_feed::{FeedManager, MARKET_DATA_CONNECTION};

/// How often reconciliation fetches fresh quotes
const RECONCILE_INTERVAL: Duration = Duration::from_secs(30);

/// Ledger tuning
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Reconciliation cadence
    pub reconcile_interval: Duration,
    /// Which feed connection carries this ledger's topics
    pub feed_connection: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            reconcile_interval: RECONCILE_INTERVAL,
            feed_connection: MARKET_DATA_CONNECTION.to_string(),
        }
    }
}

type SummaryCallback = Arc<dyn Fn(PortfolioSummary) + Send + Sync>;
type Subscriber = (u64, SummaryCallback);

/// Handle for one summary subscription
///
/// Dropping the handle leaves the subscription active; only an explicit
/// `unsubscribe` unregisters the callback.
pub struct SummarySubscription {
    id: u64,
    subscribers: Arc<RwLock<Vec<Subscriber>>>,
}

impl SummarySubscription {
    /// Stop receiving summaries
    pub fn unsubscribe(self) {
        self.subscribers.write().retain(|(id, _)| *id != self.id);
    }
}

impl std::fmt::Debug for SummarySubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SummarySubscription")
            .field("id", &self.id)
            .finish()
    }
}

/// Tick-driven position valuation with observer-style summaries
#[derive(Clone)]
pub struct PositionLedger {
    manager: Arc<FeedManager>,
    store: Arc<dyn HoldingsStore>,
    prices: Arc<dyn PriceSource>,
    config: LedgerConfig,
    positions: Arc<RwLock<HashMap<String, Position>>>,
    subscribers: Arc<RwLock<Vec<Subscriber>>>,
    next_subscriber_id: Arc<AtomicU64>,
    reconcile_task: Arc<RwLock<Option<JoinHandle<()>>>>,
    destroyed: Arc<AtomicBool>,
}

impl std::fmt::Debug for PositionLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PositionLedger")
            .field("config", &self.config)
            .field("positions", &self.positions.read().len())
            .field("subscribers", &self.subscribers.read().len())
            .field("destroyed", &self.destroyed.load(Ordering::SeqCst))
            .finish()
    }
}

impl PositionLedger {
    /// Create a ledger over the given collaborators
    pub fn new(
        manager: Arc<FeedManager>,
        store: Arc<dyn HoldingsStore>,
        prices: Arc<dyn PriceSource>,
        config: LedgerConfig,
    ) -> Self {
        Self {
            manager,
            store,
            prices,
            config,
            positions: Arc::new(RwLock::new(HashMap::new())),
            subscribers: Arc::new(RwLock::new(Vec::new())),
            next_subscriber_id: Arc::new(AtomicU64::new(1)),
            reconcile_task: Arc::new(RwLock::new(None)),
            destroyed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Load a user's holdings and start live valuation
    ///
    /// Replaces the whole position set, subscribes every held symbol's feed
    /// topic, (re)starts reconciliation, and publishes the fresh summary.
    /// Store and price failures degrade instead of failing: a missing
    /// holdings list starts empty, and starting prices fall back from quote
    /// to stored last price to average cost.
    pub async fn initialize(&self, user_id: &str) {
        if self.destroyed.load(Ordering::SeqCst) {
            warn!("Ledger already destroyed, ignoring initialize");
            return;
        }
        info!("Initializing ledger for user {}", user_id);

        let holdings = match self.store.load_holdings(user_id).await {
            Ok(holdings) => holdings,
            Err(e) => {
                warn!("Failed to load holdings for {}: {}", user_id, e);
                Vec::new()
            }
        };

        let mut fresh: HashMap<String, Position> = HashMap::new();
        for holding in &holdings {
            let price = self.resolve_price(&holding.symbol, holding.avg_price).await;
            fresh.insert(
                holding.symbol.clone(),
                Position::new(
                    holding.symbol.clone(),
                    holding.quantity,
                    holding.avg_price,
                    price,
                ),
            );
        }
        *self.positions.write() = fresh;

        for holding in &holdings {
            if let Err(e) = self
                .manager
                .subscribe(&holding.symbol, Some(self.config.feed_connection.as_str()))
                .await
            {
                warn!("Subscribe failed for {}: {}", holding.symbol, e);
            }
        }

        self.start_reconciliation();
        self.publish();
    }

    /// Apply one trade tick
    ///
    /// Unheld symbols are ignored without a publish. For held symbols the
    /// position is revalued against the previous tick and every subscriber
    /// is notified before this returns.
    pub fn on_tick(&self, symbol: &str, price: Decimal) {
        if self.destroyed.load(Ordering::SeqCst) {
            return;
        }

        let applied = {
            let mut positions = self.positions.write();
            match positions.get_mut(symbol) {
                Some(position) => {
                    position.apply_price(price);
                    true
                }
                None => false,
            }
        };

        if applied {
            self.publish();
        } else {
            debug!("Tick for unheld symbol {} ignored", symbol);
        }
    }

    /// Create or replace a position and start streaming its topic
    pub async fn add_position(&self, symbol: &str, quantity: Decimal, avg_price: Decimal) {
        if self.destroyed.load(Ordering::SeqCst) {
            warn!("Ledger already destroyed, ignoring add_position");
            return;
        }

        let price = self.resolve_price(symbol, avg_price).await;
        let position = Position::new(symbol.to_string(), quantity, avg_price, price);
        self.positions.write().insert(symbol.to_string(), position);

        if let Err(e) = self
            .manager
            .subscribe(symbol, Some(self.config.feed_connection.as_str()))
            .await
        {
            warn!("Subscribe failed for {}: {}", symbol, e);
        }

        self.publish();
    }

    /// Drop a position and stop streaming its topic
    pub async fn remove_position(&self, symbol: &str) {
        if self.destroyed.load(Ordering::SeqCst) {
            return;
        }

        if self.positions.write().remove(symbol).is_none() {
            debug!("Remove for unheld symbol {} ignored", symbol);
            return;
        }

        if let Err(e) = self
            .manager
            .unsubscribe(symbol, Some(self.config.feed_connection.as_str()))
            .await
        {
            warn!("Unsubscribe failed for {}: {}", symbol, e);
        }

        self.publish();
    }

    /// Register a summary subscriber
    ///
    /// The callback fires once immediately with the current summary, then on
    /// every subsequent publish. Each subscriber gets its own owned snapshot,
    /// and one panicking subscriber never blocks the others. Callbacks run
    /// with no ledger lock held, so a callback may subscribe or unsubscribe,
    /// including removing itself.
    pub fn subscribe(
        &self,
        callback: impl Fn(PortfolioSummary) + Send + Sync + 'static,
    ) -> SummarySubscription {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::SeqCst);
        let handle = SummarySubscription {
            id,
            subscribers: Arc::clone(&self.subscribers),
        };

        if self.destroyed.load(Ordering::SeqCst) {
            warn!("Ledger already destroyed, subscriber {} will never fire", id);
            return handle;
        }

        let callback: SummaryCallback = Arc::new(callback);
        let snapshot = self.summary();
        if catch_unwind(AssertUnwindSafe(|| (*callback)(snapshot))).is_err() {
            warn!("Summary subscriber {} panicked on initial snapshot", id);
        }
        self.subscribers.write().push((id, callback));

        handle
    }

    /// Snapshot the current portfolio, positions sorted by symbol
    pub fn summary(&self) -> PortfolioSummary {
        let mut positions: Vec<Position> = self.positions.read().values().cloned().collect();
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        PortfolioSummary::from_positions(positions)
    }

    /// Fetch fresh quotes for every held symbol and apply them as ticks
    ///
    /// This is the body of the periodic reconciliation pass; a per-symbol
    /// quote failure skips that symbol and keeps going.
    pub async fn reconcile_once(&self) {
        let symbols: Vec<String> = self.positions.read().keys().cloned().collect();
        for symbol in symbols {
            match self.prices.quote(&symbol).await {
                Ok(quote) => self.on_tick(&symbol, quote.price),
                Err(e) => warn!("Reconciliation quote failed for {}: {}", symbol, e),
            }
        }
    }

    /// Wire this ledger into its manager's trade stream
    ///
    /// Registers the trade frame handler; every tick in an inbound batch
    /// flows through [`PositionLedger::on_tick`].
    pub fn attach(&self) {
        let ledger = self.clone();
        self.manager.on_message(msg_type::TRADE, move |value| {
            ledger.apply_trade_frame(value);
        });
    }

    /// Parse one trade frame and apply its ticks in arrival order
    pub(crate) fn apply_trade_frame(&self, value: Value) {
        match serde_json::from_value::<TradeMessage>(value) {
            Ok(message) => {
                for tick in message.data {
                    self.on_tick(&tick.symbol, tick.price);
                }
            }
            Err(e) => warn!("Malformed trade payload dropped: {}", e),
        }
    }

    /// Stop valuation and release everything
    ///
    /// Cancels reconciliation, unsubscribes every held topic, and clears
    /// positions and subscribers. Idempotent; nothing publishes afterwards.
    pub async fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            debug!("Ledger already destroyed");
            return;
        }

        if let Some(task) = self.reconcile_task.write().take() {
            task.abort();
        }

        let symbols: Vec<String> = self.positions.read().keys().cloned().collect();
        for symbol in symbols {
            if let Err(e) = self
                .manager
                .unsubscribe(&symbol, Some(self.config.feed_connection.as_str()))
                .await
            {
                debug!("Unsubscribe during destroy failed for {}: {}", symbol, e);
            }
        }

        self.positions.write().clear();
        self.subscribers.write().clear();
        info!("Ledger destroyed");
    }

    /// Starting price for a position: live quote, then stored last price,
    /// then average cost so the opening P&L reads zero
    async fn resolve_price(&self, symbol: &str, avg_price: Decimal) -> Decimal {
        match self.prices.quote(symbol).await {
            Ok(quote) => quote.price,
            Err(e) => {
                warn!("Price lookup failed for {}: {}", symbol, e);
                match self.store.last_price(symbol).await {
                    Ok(Some(price)) => price,
                    Ok(None) => avg_price,
                    Err(e) => {
                        warn!("Stored price lookup failed for {}: {}", symbol, e);
                        avg_price
                    }
                }
            }
        }
    }

    fn start_reconciliation(&self) {
        let ledger = self.clone();
        let every = self.config.reconcile_interval;

        let task = tokio::spawn(async move {
            let mut ticker = interval(every);
            // The first tick fires immediately; initialization just resolved
            // prices, so skip it
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if ledger.destroyed.load(Ordering::SeqCst) {
                    break;
                }
                ledger.reconcile_once().await;
            }
        });

        if let Some(old) = self.reconcile_task.write().replace(task) {
            old.abort();
        }
    }

    fn publish(&self) {
        if self.destroyed.load(Ordering::SeqCst) {
            return;
        }

        let summary = self.summary();
        // Clone the list out of the lock; callbacks may re-enter the
        // subscription API, which takes the write side.
        let subscribers: Vec<Subscriber> = self
            .subscribers
            .read()
            .iter()
            .map(|(id, callback)| (*id, Arc::clone(callback)))
            .collect();
        for (id, callback) in subscribers {
            if self.destroyed.load(Ordering::SeqCst) {
                break;
            }
            if catch_unwind(AssertUnwindSafe(|| (*callback)(summary.clone()))).is_err() {
                warn!("Summary subscriber {} panicked", id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use desk_core::{Holding, Quote, RestingOrder};
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct MockPriceSource {
        prices: Mutex<HashMap<String, Decimal>>,
        fail_all: AtomicBool,
    }

    impl MockPriceSource {
        fn set(&self, symbol: &str, price: Decimal) {
            self.prices.lock().insert(symbol.to_string(), price);
        }
    }

    #[async_trait]
    impl PriceSource for MockPriceSource {
        async fn quote(&self, symbol: &str) -> anyhow::Result<Quote> {
            if self.fail_all.load(Ordering::SeqCst) {
                anyhow::bail!("quote source down");
            }
            match self.prices.lock().get(symbol) {
                Some(price) => Ok(Quote {
                    price: *price,
                    prev_close: None,
                }),
                None => anyhow::bail!("no quote for {}", symbol),
            }
        }
    }

    #[derive(Default)]
    struct MockStore {
        holdings: Mutex<Vec<Holding>>,
        last_prices: Mutex<HashMap<String, Decimal>>,
        fail_holdings: AtomicBool,
    }

    #[async_trait]
    impl HoldingsStore for MockStore {
        async fn load_holdings(&self, _user_id: &str) -> anyhow::Result<Vec<Holding>> {
            if self.fail_holdings.load(Ordering::SeqCst) {
                anyhow::bail!("store down");
            }
            Ok(self.holdings.lock().clone())
        }

        async fn last_price(&self, symbol: &str) -> anyhow::Result<Option<Decimal>> {
            Ok(self.last_prices.lock().get(symbol).copied())
        }

        async fn open_orders(&self, _pair: &str) -> anyhow::Result<Vec<RestingOrder>> {
            Ok(Vec::new())
        }
    }

    struct Fixture {
        ledger: PositionLedger,
        store: Arc<MockStore>,
        prices: Arc<MockPriceSource>,
    }

    fn fixture() -> Fixture {
        let manager = Arc::new(FeedManager::new());
        let store = Arc::new(MockStore::default());
        let prices = Arc::new(MockPriceSource::default());
        let ledger = PositionLedger::new(
            manager,
            Arc::clone(&store) as Arc<dyn HoldingsStore>,
            Arc::clone(&prices) as Arc<dyn PriceSource>,
            LedgerConfig::default(),
        );
        Fixture {
            ledger,
            store,
            prices,
        }
    }

    fn counting_subscriber(ledger: &PositionLedger) -> (Arc<AtomicUsize>, SummarySubscription) {
        let count = Arc::new(AtomicUsize::new(0));
        let handle = {
            let count = Arc::clone(&count);
            ledger.subscribe(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };
        (count, handle)
    }

    #[tokio::test]
    async fn tick_for_unheld_symbol_is_ignored() {
        let f = fixture();
        let (count, _handle) = counting_subscriber(&f.ledger);
        assert_eq!(count.load(Ordering::SeqCst), 1); // immediate snapshot

        f.ledger.on_tick("GME", dec!(10));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(f.ledger.summary().positions.is_empty());
    }

    #[tokio::test]
    async fn add_then_tick_revalues_and_notifies_exactly_twice() {
        let f = fixture();
        f.prices.set("X", dec!(50));
        f.ledger.add_position("X", dec!(10), dec!(50)).await;

        let summaries = Arc::new(Mutex::new(Vec::new()));
        let _handle = {
            let summaries = Arc::clone(&summaries);
            f.ledger.subscribe(move |summary| {
                summaries.lock().push(summary);
            })
        };

        f.ledger.on_tick("X", dec!(55));

        let summaries = summaries.lock();
        assert_eq!(summaries.len(), 2);

        let initial = &summaries[0];
        assert_eq!(initial.total_value, dec!(500));
        assert_eq!(initial.total_unrealized_pnl, dec!(0));

        let ticked = &summaries[1];
        assert_eq!(ticked.positions.len(), 1);
        assert_eq!(ticked.positions[0].market_value, dec!(550));
        assert_eq!(ticked.positions[0].unrealized_pnl, dec!(50));
        assert_eq!(ticked.positions[0].day_change, dec!(50));
        assert_eq!(ticked.total_value, dec!(550));
    }

    #[tokio::test]
    async fn panicking_subscriber_does_not_block_others() {
        let f = fixture();
        f.prices.set("X", dec!(50));
        f.ledger.add_position("X", dec!(1), dec!(50)).await;

        let _bad = f.ledger.subscribe(|_| panic!("subscriber bug"));
        let (count, _good) = counting_subscriber(&f.ledger);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        f.ledger.on_tick("X", dec!(51));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unsubscribe_stops_notifications() {
        let f = fixture();
        f.prices.set("X", dec!(50));
        f.ledger.add_position("X", dec!(1), dec!(50)).await;

        let (count, handle) = counting_subscriber(&f.ledger);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        handle.unsubscribe();
        f.ledger.on_tick("X", dec!(51));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn subscriber_can_unsubscribe_itself_mid_publish() {
        let f = fixture();
        f.prices.set("X", dec!(50));
        f.ledger.add_position("X", dec!(1), dec!(50)).await;

        let count = Arc::new(AtomicUsize::new(0));
        let slot: Arc<Mutex<Option<SummarySubscription>>> = Arc::new(Mutex::new(None));
        let handle = {
            let count = Arc::clone(&count);
            let slot = Arc::clone(&slot);
            f.ledger.subscribe(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
                if let Some(handle) = slot.lock().take() {
                    handle.unsubscribe();
                }
            })
        };
        *slot.lock() = Some(handle);
        let (other_count, _other) = counting_subscriber(&f.ledger);

        f.ledger.on_tick("X", dec!(51));
        f.ledger.on_tick("X", dec!(52));

        // Dropped itself on the first tick; the other subscriber keeps going
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(other_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn subscriber_can_register_another_mid_publish() {
        let f = fixture();
        f.prices.set("X", dec!(50));
        f.ledger.add_position("X", dec!(1), dec!(50)).await;

        let inner_count = Arc::new(AtomicUsize::new(0));
        let armed = Arc::new(AtomicBool::new(false));
        let _outer = {
            let ledger = f.ledger.clone();
            let inner_count = Arc::clone(&inner_count);
            let armed = Arc::clone(&armed);
            f.ledger.subscribe(move |_| {
                if armed.swap(false, Ordering::SeqCst) {
                    let inner_count = Arc::clone(&inner_count);
                    let _ = ledger.subscribe(move |_| {
                        inner_count.fetch_add(1, Ordering::SeqCst);
                    });
                }
            })
        };
        armed.store(true, Ordering::SeqCst);

        // The new subscriber lands mid-publish with its immediate snapshot,
        // then joins later publishes
        f.ledger.on_tick("X", dec!(51));
        assert_eq!(inner_count.load(Ordering::SeqCst), 1);
        f.ledger.on_tick("X", dec!(52));
        assert_eq!(inner_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn initialize_resolves_prices_through_fallback_chain() {
        let f = fixture();
        f.store.holdings.lock().extend([
            Holding {
                symbol: "A".to_string(),
                quantity: dec!(10),
                avg_price: dec!(100),
            },
            Holding {
                symbol: "B".to_string(),
                quantity: dec!(5),
                avg_price: dec!(80),
            },
            Holding {
                symbol: "C".to_string(),
                quantity: dec!(2),
                avg_price: dec!(120),
            },
        ]);
        // A quotes live, B only has a stored last price, C has nothing
        f.prices.set("A", dec!(110));
        f.store.last_prices.lock().insert("B".to_string(), dec!(95));

        f.ledger.initialize("user-1").await;

        let summary = f.ledger.summary();
        assert_eq!(summary.positions.len(), 3);
        assert_eq!(summary.positions[0].current_price, dec!(110));
        assert_eq!(summary.positions[1].current_price, dec!(95));
        // Neutral fallback: average cost, so C opens flat
        assert_eq!(summary.positions[2].current_price, dec!(120));
        assert_eq!(summary.positions[2].unrealized_pnl, dec!(0));

        f.ledger.destroy().await;
    }

    #[tokio::test]
    async fn initialize_registers_feed_topics() {
        let manager = Arc::new(FeedManager::new());
        manager
            .connect(
                MARKET_DATA_CONNECTION,
                "ws://127.0.0.1:9",
                Default::default(),
            )
            .unwrap();

        let store = Arc::new(MockStore::default());
        store.holdings.lock().push(Holding {
            symbol: "AAPL".to_string(),
            quantity: dec!(1),
            avg_price: dec!(10),
        });
        let prices = Arc::new(MockPriceSource::default());
        let ledger = PositionLedger::new(
            Arc::clone(&manager),
            store,
            prices,
            LedgerConfig::default(),
        );

        ledger.initialize("user-1").await;
        assert_eq!(
            manager.topics(MARKET_DATA_CONNECTION).unwrap(),
            vec!["AAPL"]
        );

        ledger.destroy().await;
        assert!(manager.topics(MARKET_DATA_CONNECTION).unwrap().is_empty());

        manager.destroy().await;
    }

    #[tokio::test]
    async fn store_failure_starts_empty_not_fatal() {
        let f = fixture();
        f.store.fail_holdings.store(true, Ordering::SeqCst);

        f.ledger.initialize("user-1").await;
        assert!(f.ledger.summary().positions.is_empty());

        f.ledger.destroy().await;
    }

    #[tokio::test]
    async fn reconcile_applies_quotes_as_ticks() {
        let f = fixture();
        f.prices.set("A", dec!(100));
        f.prices.set("B", dec!(40));
        f.ledger.add_position("A", dec!(1), dec!(100)).await;
        f.ledger.add_position("B", dec!(2), dec!(40)).await;

        let (count, _handle) = counting_subscriber(&f.ledger);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // A moves, B's quote now fails; reconciliation keeps going
        f.prices.set("A", dec!(130));
        f.prices.prices.lock().remove("B");
        f.ledger.reconcile_once().await;

        let summary = f.ledger.summary();
        assert_eq!(summary.positions[0].current_price, dec!(130));
        assert_eq!(summary.positions[0].day_change, dec!(30));
        assert_eq!(summary.positions[1].current_price, dec!(40));
        // Only the applied tick published
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn trade_frames_flow_into_ticks() {
        let f = fixture();
        f.prices.set("A", dec!(100));
        f.ledger.add_position("A", dec!(1), dec!(100)).await;

        f.ledger.apply_trade_frame(serde_json::json!({
            "type": "trade",
            "data": [
                {"s": "A", "p": 101, "v": 5, "t": 1_700_000_000_000i64},
                {"s": "A", "p": 102.5, "v": 1, "t": 1_700_000_000_500i64}
            ]
        }));
        assert_eq!(f.ledger.summary().positions[0].current_price, dec!(102.5));

        // Malformed payload is dropped without applying anything
        f.ledger
            .apply_trade_frame(serde_json::json!({"type": "trade", "data": 7}));
        assert_eq!(f.ledger.summary().positions[0].current_price, dec!(102.5));
    }

    #[tokio::test]
    async fn destroy_is_idempotent_and_silences_everything() {
        let f = fixture();
        f.prices.set("X", dec!(50));
        f.ledger.add_position("X", dec!(1), dec!(50)).await;

        let (count, _handle) = counting_subscriber(&f.ledger);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        f.ledger.destroy().await;
        f.ledger.destroy().await;

        f.ledger.on_tick("X", dec!(60));
        f.ledger.add_position("Y", dec!(1), dec!(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(f.ledger.summary().positions.is_empty());
    }
}
