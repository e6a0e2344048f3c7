use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, select, tick, Receiver, Sender, TrySendError};
use rand::Rng;
use tracing::{debug, info, trace};

use crate::cancel::CancelToken;
use crate::config::FeedConfig;
use crate::error::ExecutionError;
use crate::tick::Tick;

/// Lowest price the walk can reach.
pub const PRICE_FLOOR: f64 = 0.01;

const MIN_MOVE: f64 = 0.001;
const MAX_MOVE: f64 = 0.05;

/// Starting price for well-known symbols.
#[must_use]
pub fn seed_price(symbol: &str) -> Option<f64> {
    let price = match symbol {
        "BTC" => 110_000.0,
        "ETH" => 4_200.0,
        "ADA" => 0.65,
        "SOL" => 180.0,
        "DOT" => 8.5,
        "MATIC" => 1.2,
        "AVAX" => 45.0,
        "LINK" => 18.5,
        _ => return None,
    };
    Some(price)
}

/// One random-walk step: a move of 0.1% to 5% of `price`, up or down with
/// equal odds, never below [`PRICE_FLOOR`].
pub fn random_walk<R: Rng + ?Sized>(price: f64, rng: &mut R) -> f64 {
    let magnitude = price * rng.gen_range(MIN_MOVE..MAX_MOVE);
    let next = if rng.gen_bool(0.5) {
        price - magnitude
    } else {
        price + magnitude
    };
    next.max(PRICE_FLOOR)
}

#[derive(Debug, Default)]
struct Prices {
    symbols: Vec<String>,
    current: HashMap<String, f64>,
}

impl Prices {
    fn step<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<Tick> {
        if self.symbols.is_empty() {
            return None;
        }
        let symbol = &self.symbols[rng.gen_range(0..self.symbols.len())];
        let price = self.current.get_mut(symbol)?;
        *price = random_walk(*price, rng);
        Some(Tick::new(symbol.clone(), *price))
    }
}

#[derive(Debug)]
enum Lifecycle {
    Idle,
    Running(JoinHandle<()>),
    Stopped,
}

/// Simulated tick source.
///
/// Once started, every interval it picks one tracked symbol at random, moves
/// its price by a random walk step and offers the tick on a bounded channel.
/// A full channel drops the tick.
#[derive(Debug)]
pub struct MockFeed {
    prices: Arc<RwLock<Prices>>,
    interval: Duration,
    out_tx: Arc<RwLock<Option<Sender<Tick>>>>,
    out_rx: Receiver<Tick>,
    stop_tx: Mutex<Option<Sender<()>>>,
    stop_rx: Receiver<()>,
    lifecycle: Mutex<Lifecycle>,
    dropped: Arc<AtomicU64>,
}

impl MockFeed {
    /// Tracks `symbols`; well-known ones start at their seed price, others
    /// at a random price between 1 and 100.
    #[must_use]
    pub fn new<I, S>(symbols: I, interval: Duration, capacity: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut rng = rand::thread_rng();
        let mut prices = Prices::default();
        for symbol in symbols {
            let symbol = symbol.into();
            if prices.current.contains_key(&symbol) {
                continue;
            }
            let start = seed_price(&symbol).unwrap_or_else(|| rng.gen_range(1.0..100.0));
            prices.current.insert(symbol.clone(), start);
            prices.symbols.push(symbol);
        }

        let (out_tx, out_rx) = bounded(capacity.max(1));
        let (stop_tx, stop_rx) = bounded(1);

        Self {
            prices: Arc::new(RwLock::new(prices)),
            interval,
            out_tx: Arc::new(RwLock::new(Some(out_tx))),
            out_rx,
            stop_tx: Mutex::new(Some(stop_tx)),
            stop_rx,
            lifecycle: Mutex::new(Lifecycle::Idle),
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Feed built from `config`.
    #[must_use]
    pub fn from_config(config: &FeedConfig) -> Self {
        Self::new(
            config.symbols.iter().cloned(),
            config.tick_interval(),
            config.queue_capacity,
        )
    }

    /// Starts generating ticks. Idempotent while running; fails after stop.
    pub fn start(&self, cancel: &CancelToken) -> Result<(), ExecutionError> {
        let mut lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        match *lifecycle {
            Lifecycle::Idle => {}
            Lifecycle::Running(_) => return Ok(()),
            Lifecycle::Stopped => {
                return Err(ExecutionError::Stopped {
                    component: "mock-feed".to_string(),
                })
            }
        }

        let prices = Arc::clone(&self.prices);
        let out_tx = Arc::clone(&self.out_tx);
        let dropped = Arc::clone(&self.dropped);
        let stop_rx = self.stop_rx.clone();
        let cancel_rx = cancel.listener();
        let ticker = tick(self.interval);

        let handle = thread::Builder::new()
            .name("pricewatch-mock-feed".to_string())
            .spawn(move || {
                let mut rng = rand::thread_rng();
                loop {
                    select! {
                        recv(ticker) -> _ => {
                            let next = prices
                                .write()
                                .unwrap_or_else(PoisonError::into_inner)
                                .step(&mut rng);
                            if let Some(t) = next {
                                if !offer(&out_tx, &dropped, t) {
                                    break;
                                }
                            }
                        }
                        recv(stop_rx) -> _ => break,
                        recv(cancel_rx) -> _ => {
                            out_tx.write().unwrap_or_else(PoisonError::into_inner).take();
                            debug!("mock feed cancelled");
                            break;
                        }
                    }
                }
            })
            .map_err(|e| ExecutionError::Spawn {
                component: "mock-feed".to_string(),
                message: e.to_string(),
            })?;

        *lifecycle = Lifecycle::Running(handle);
        info!(interval = ?self.interval, "mock feed started");
        Ok(())
    }

    /// Stops generation and closes the tick channel. Idempotent.
    pub fn stop(&self) {
        self.out_tx
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(
            self.stop_tx
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );

        let previous = {
            let mut lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *lifecycle, Lifecycle::Stopped)
        };
        if let Lifecycle::Running(handle) = previous {
            let _ = handle.join();
            info!("mock feed stopped");
        }
    }

    /// Receiving end of the tick channel. Disconnects once stopped and drained.
    #[must_use]
    pub fn ticks(&self) -> Receiver<Tick> {
        self.out_rx.clone()
    }

    /// Last simulated price for `symbol`.
    #[must_use]
    pub fn current_price(&self, symbol: &str) -> Option<f64> {
        self.prices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .current
            .get(symbol)
            .copied()
    }

    /// Starts tracking `symbol` at `initial_price`. No-op if already tracked.
    pub fn add_symbol(&self, symbol: impl Into<String>, initial_price: f64) {
        let symbol = symbol.into();
        let mut prices = self.prices.write().unwrap_or_else(PoisonError::into_inner);
        if prices.current.contains_key(&symbol) {
            return;
        }
        prices.current.insert(symbol.clone(), initial_price.max(PRICE_FLOOR));
        prices.symbols.push(symbol);
    }

    /// Stops simulating `symbol`.
    pub fn remove_symbol(&self, symbol: &str) {
        let mut prices = self.prices.write().unwrap_or_else(PoisonError::into_inner);
        prices.symbols.retain(|s| s != symbol);
        prices.current.remove(symbol);
    }

    /// Tracked symbols in insertion order.
    #[must_use]
    pub fn symbols(&self) -> Vec<String> {
        self.prices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .symbols
            .clone()
    }

    /// Ticks dropped because the output channel was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for MockFeed {
    fn drop(&mut self) {
        if let Ok(mut tx) = self.out_tx.write() {
            tx.take();
        }
        if let Ok(mut stop_tx) = self.stop_tx.lock() {
            stop_tx.take();
        }
    }
}

/// Returns false once the output channel has been closed.
fn offer(out_tx: &RwLock<Option<Sender<Tick>>>, dropped: &AtomicU64, t: Tick) -> bool {
    let guard = out_tx.read().unwrap_or_else(PoisonError::into_inner);
    let Some(tx) = guard.as_ref() else {
        return false;
    };
    match tx.try_send(t) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            dropped.fetch_add(1, Ordering::Relaxed);
            trace!("mock feed channel full, dropping tick");
            true
        }
        Err(TrySendError::Disconnected(_)) => false,
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn walk_moves_within_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut price = 100.0;
        for _ in 0..1_000 {
            let next = random_walk(price, &mut rng);
            let delta = (next - price).abs() / price;
            assert!(next >= PRICE_FLOOR);
            if next > PRICE_FLOOR {
                assert!(delta >= MIN_MOVE - 1e-12 && delta <= MAX_MOVE + 1e-12);
            }
            price = next;
        }
    }

    #[test]
    fn walk_never_goes_below_floor() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut price = PRICE_FLOOR;
        for _ in 0..200 {
            price = random_walk(price, &mut rng);
            assert!(price >= PRICE_FLOOR);
        }
    }

    #[test]
    fn known_symbols_use_seed_prices() {
        let feed = MockFeed::new(["BTC", "ETH", "XYZ"], Duration::from_millis(10), 8);
        assert_eq!(feed.current_price("BTC"), Some(110_000.0));
        assert_eq!(feed.current_price("ETH"), Some(4_200.0));
        let xyz = feed.current_price("XYZ").unwrap();
        assert!((1.0..100.0).contains(&xyz));
        assert_eq!(feed.current_price("NOPE"), None);
    }

    #[test]
    fn add_and_remove_symbols() {
        let feed = MockFeed::new(["BTC"], Duration::from_millis(10), 8);
        feed.add_symbol("DOGE", 0.2);
        feed.add_symbol("DOGE", 5.0);
        assert_eq!(feed.current_price("DOGE"), Some(0.2));
        assert_eq!(feed.symbols(), vec!["BTC".to_string(), "DOGE".to_string()]);

        feed.remove_symbol("BTC");
        assert_eq!(feed.current_price("BTC"), None);
        assert_eq!(feed.symbols(), vec!["DOGE".to_string()]);
    }

    #[test]
    fn emits_ticks_for_tracked_symbols_until_stopped() {
        let feed = MockFeed::new(["SOL"], Duration::from_millis(5), 64);
        let cancel = CancelToken::new();
        feed.start(&cancel).unwrap();
        feed.start(&cancel).unwrap();

        let ticks = feed.ticks();
        let first = ticks.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(first.symbol, "SOL");
        assert!(first.price >= PRICE_FLOOR);

        feed.stop();
        feed.stop();
        while ticks.try_recv().is_ok() {}
        assert!(ticks.recv_timeout(Duration::from_millis(50)).is_err());
        assert!(feed.start(&cancel).is_err());
    }

    #[test]
    fn full_channel_drops_ticks() {
        let feed = MockFeed::new(["BTC"], Duration::from_millis(1), 1);
        let cancel = CancelToken::new();
        feed.start(&cancel).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while feed.dropped() == 0 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(feed.dropped() > 0);
        cancel.cancel();
        feed.stop();
    }

    #[test]
    fn cancellation_closes_tick_channel() {
        let feed = MockFeed::new(["BTC"], Duration::from_millis(5), 1_000);
        let cancel = CancelToken::new();
        feed.start(&cancel).unwrap();
        let ticks = feed.ticks();

        cancel.cancel();
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        loop {
            match ticks.recv_timeout(Duration::from_millis(100)) {
                Ok(_) => assert!(std::time::Instant::now() < deadline),
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                    panic!("tick channel still open after cancel")
                }
            }
        }
    }
}
