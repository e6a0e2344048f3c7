//! In-process facade over the four core components.
//!
//! [`PriceWatch`] owns one store, one broker, one rule engine and one trigger
//! bus sharing a single [`CancelToken`]. It is what a transport layer would
//! sit on: it validates requests before touching the store, mints subscriber
//! ids, and ties each watch to a guard that unsubscribes on drop.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{select, Receiver};
use tracing::{debug, info};
use uuid::Uuid;

use crate::alert::{validate_symbol, Alert, AlertId, AlertUpdate, Comparator};
use crate::cancel::CancelToken;
use crate::clock::{Clock, SystemClock};
use crate::config::PriceWatchConfig;
use crate::error::{ExecutionError, PriceWatchResult, ValidationError};
use crate::pubsub::{PriceSubscription, Subscription, TickBroker, TriggerBus, TriggerSubscription};
use crate::rules::RuleEngine;
use crate::storage::{AlertStore, InMemoryAlertStore};
use crate::tick::Tick;

/// The assembled price-alert data plane.
#[derive(Debug)]
pub struct PriceWatch {
    config: PriceWatchConfig,
    store: Arc<InMemoryAlertStore>,
    broker: Arc<TickBroker>,
    bus: Arc<TriggerBus>,
    engine: Arc<RuleEngine>,
    cancel: CancelToken,
}

impl PriceWatch {
    /// Builds every component from `config`. Nothing runs until
    /// [`PriceWatch::start`].
    pub fn new(config: PriceWatchConfig) -> PriceWatchResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Same as [`PriceWatch::new`]; the store and the engine read time from
    /// `clock`.
    pub fn with_clock(config: PriceWatchConfig, clock: Arc<dyn Clock>) -> PriceWatchResult<Self> {
        config.validate()?;

        let store = Arc::new(InMemoryAlertStore::with_clock(Arc::clone(&clock)));
        let broker = Arc::new(TickBroker::with_capacity(config.broker.queue_capacity));
        let bus = Arc::new(TriggerBus::with_capacity(config.trigger_bus.queue_capacity));
        let rules_store: Arc<dyn AlertStore> = store.clone();
        let engine = Arc::new(RuleEngine::with_clock(
            rules_store,
            Arc::clone(&bus),
            &config.engine,
            clock,
        ));

        Ok(Self {
            config,
            store,
            broker,
            bus,
            engine,
            cancel: CancelToken::new(),
        })
    }

    /// Starts the trigger bus, the rule engine and the broker.
    pub fn start(&self) -> PriceWatchResult<()> {
        self.bus.start(&self.cancel)?;
        self.engine.start(&self.cancel)?;
        self.broker.start(&self.cancel)?;
        info!("price watch started");
        Ok(())
    }

    /// Stops the engine, then the trigger bus, then the broker, and cancels
    /// the shared token. Idempotent; the instance cannot be restarted.
    pub fn stop(&self) {
        self.engine.stop();
        self.bus.stop();
        self.broker.stop();
        self.cancel.cancel();
        info!("price watch stopped");
    }

    /// Hands a tick to both the broker and the rule engine. Overload on
    /// either path drops the tick there without affecting the other.
    pub fn ingest(&self, tick: Tick) {
        self.broker.publish(tick.clone());
        self.engine.process_tick(tick);
    }

    /// Forwards every tick from `ticks` into [`PriceWatch::ingest`] on a
    /// dedicated thread, until the channel disconnects or the instance stops.
    pub fn spawn_ingest(&self, ticks: Receiver<Tick>) -> PriceWatchResult<JoinHandle<()>> {
        let broker = Arc::clone(&self.broker);
        let engine = Arc::clone(&self.engine);
        let cancel_rx = self.cancel.listener();

        let handle = thread::Builder::new()
            .name("pricewatch-ingest".to_string())
            .spawn(move || loop {
                select! {
                    recv(ticks) -> msg => match msg {
                        Ok(tick) => {
                            broker.publish(tick.clone());
                            engine.process_tick(tick);
                        }
                        Err(_) => {
                            debug!("tick source disconnected");
                            break;
                        }
                    },
                    recv(cancel_rx) -> _ => break,
                }
            })
            .map_err(|e| ExecutionError::Spawn {
                component: "ingest".to_string(),
                message: e.to_string(),
            })?;
        Ok(handle)
    }

    /// Validates and stores a new alert; returns the stored snapshot.
    pub fn create_alert(
        &self,
        symbol: impl Into<String>,
        comparator: Comparator,
        threshold: f64,
        note: impl Into<String>,
    ) -> PriceWatchResult<Alert> {
        let alert = Alert::new(symbol, comparator, threshold, note);
        alert.validate()?;
        self.store.create(alert.clone())?;
        Ok(alert)
    }

    /// Fetches one alert.
    pub fn get_alert(&self, id: &AlertId) -> PriceWatchResult<Alert> {
        Ok(self.store.get(id)?)
    }

    /// All alerts, or only those on `symbol`.
    pub fn list_alerts(&self, symbol: Option<&str>) -> PriceWatchResult<Vec<Alert>> {
        let alerts = match symbol {
            Some(symbol) => self.store.get_by_symbol(symbol)?,
            None => self.store.get_all()?,
        };
        Ok(alerts)
    }

    /// Validates the supplied fields and applies them.
    pub fn update_alert(&self, id: &AlertId, update: &AlertUpdate) -> PriceWatchResult<Alert> {
        if id.as_str().trim().is_empty() {
            return Err(ValidationError::EmptyAlertId.into());
        }
        update.validate()?;
        Ok(self.store.update(id, update)?)
    }

    /// Deletes an alert. Its cooldown entry ages out on the next cleanup.
    pub fn delete_alert(&self, id: &AlertId) -> PriceWatchResult<()> {
        if id.as_str().trim().is_empty() {
            return Err(ValidationError::EmptyAlertId.into());
        }
        Ok(self.store.delete(id)?)
    }

    /// Watches live ticks for `symbols` under a fresh subscriber id.
    pub fn watch_prices<I, S>(&self, symbols: I) -> PriceWatchResult<PriceSubscription>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let symbols: Vec<String> = symbols.into_iter().map(Into::into).collect();
        if symbols.is_empty() {
            return Err(ValidationError::EmptySymbolSet.into());
        }
        for symbol in &symbols {
            validate_symbol(symbol)?;
        }

        let id = subscriber_id("prices");
        let inbox = self
            .broker
            .subscribe(&id, symbols, self.config.broker.inbox_capacity);
        let source: Arc<TickBroker> = Arc::clone(&self.broker);
        Ok(Subscription::new(inbox, source))
    }

    /// Watches every trigger under a fresh subscriber id.
    #[must_use]
    pub fn watch_triggers(&self) -> TriggerSubscription {
        let id = subscriber_id("triggers");
        let inbox = self
            .bus
            .subscribe(&id, self.config.trigger_bus.inbox_capacity);
        let source: Arc<TriggerBus> = Arc::clone(&self.bus);
        Subscription::new(inbox, source)
    }

    /// Purges stale cooldown entries; meant to be called every
    /// `engine.cleanup_interval_secs`.
    pub fn cleanup_cooldowns(&self) -> usize {
        self.engine.cleanup_cooldowns()
    }

    #[must_use]
    pub fn config(&self) -> &PriceWatchConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &InMemoryAlertStore {
        &self.store
    }

    #[must_use]
    pub fn broker(&self) -> &TickBroker {
        &self.broker
    }

    #[must_use]
    pub fn trigger_bus(&self) -> &TriggerBus {
        &self.bus
    }

    #[must_use]
    pub fn engine(&self) -> &RuleEngine {
        &self.engine
    }

    /// The token every component listens on. Cancelling it shuts the
    /// instance down the same way [`PriceWatch::stop`] does.
    #[must_use]
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }
}

impl Drop for PriceWatch {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn subscriber_id(kind: &str) -> String {
    format!("{kind}-{}", Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Duration as ChronoDuration;
    use crossbeam_channel::bounded;

    use super::*;
    use crate::clock::ManualClock;

    const WAIT: Duration = Duration::from_secs(2);

    fn running() -> PriceWatch {
        let pw = PriceWatch::new(PriceWatchConfig::default()).unwrap();
        pw.start().unwrap();
        pw
    }

    #[test]
    fn rejects_invalid_requests_before_the_store() {
        let pw = PriceWatch::new(PriceWatchConfig::default()).unwrap();

        let err = pw.create_alert("", Comparator::Gt, 1.0, "").unwrap_err();
        assert!(err.is_validation());
        let err = pw.create_alert("BTC", Comparator::Gt, 0.0, "").unwrap_err();
        assert!(err.is_validation());
        let err = pw
            .create_alert("BTC", Comparator::Unspecified, 1.0, "")
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(pw.store().count().unwrap(), 0);

        let err = pw.watch_prices(Vec::<String>::new()).unwrap_err();
        assert!(err.is_validation());
        let err = pw.watch_prices(["BTC", " "]).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn crud_maps_store_errors() {
        let pw = PriceWatch::new(PriceWatchConfig::default()).unwrap();
        let alert = pw.create_alert("BTC", Comparator::Gte, 10.0, "n").unwrap();

        assert_eq!(pw.get_alert(&alert.id).unwrap(), alert);
        let updated = pw
            .update_alert(&alert.id, &AlertUpdate::new().symbol("ETH"))
            .unwrap();
        assert_eq!(updated.symbol, "ETH");
        assert_eq!(pw.list_alerts(Some("ETH")).unwrap().len(), 1);
        assert!(pw.list_alerts(Some("BTC")).unwrap().is_empty());

        pw.delete_alert(&alert.id).unwrap();
        assert!(pw.get_alert(&alert.id).unwrap_err().is_not_found());
        assert!(pw.delete_alert(&alert.id).unwrap_err().is_not_found());
        assert!(pw
            .update_alert(&AlertId::from(""), &AlertUpdate::new())
            .unwrap_err()
            .is_validation());
    }

    #[test]
    fn ingest_reaches_watchers_and_triggers() {
        let pw = running();
        pw.create_alert("BTC", Comparator::Gt, 100.0, "").unwrap();
        let prices = pw.watch_prices(["BTC"]).unwrap();
        let triggers = pw.watch_triggers();

        pw.ingest(Tick::new("BTC", 150.0));

        assert!((prices.recv_timeout(WAIT).unwrap().price - 150.0).abs() < f64::EPSILON);
        let trigger = triggers.recv_timeout(WAIT).unwrap();
        assert_eq!(trigger.alert.symbol, "BTC");
        assert!(trigger.alert.last_trigger.is_some());
        pw.stop();
    }

    #[test]
    fn dropping_a_watch_unsubscribes() {
        let pw = running();
        let watch = pw.watch_prices(["BTC", "ETH"]).unwrap();
        let _triggers = pw.watch_triggers();
        assert_eq!(pw.broker().subscriber_count(), 1);
        assert_eq!(pw.trigger_bus().subscriber_count(), 1);

        drop(watch);
        assert_eq!(pw.broker().subscriber_count(), 0);
        pw.stop();
    }

    #[test]
    fn spawn_ingest_forwards_until_source_closes() {
        let pw = running();
        let watch = pw.watch_prices(["SOL"]).unwrap();
        let (tx, rx) = bounded(8);
        let handle = pw.spawn_ingest(rx).unwrap();

        tx.send(Tick::new("SOL", 180.0)).unwrap();
        assert_eq!(watch.recv_timeout(WAIT).unwrap().symbol, "SOL");

        drop(tx);
        handle.join().unwrap();
        pw.stop();
    }

    #[test]
    fn stop_closes_watches_and_blocks_restart() {
        let pw = running();
        let watch = pw.watch_prices(["BTC"]).unwrap();
        let triggers = pw.watch_triggers();

        pw.stop();
        pw.stop();
        assert!(watch.recv_timeout(WAIT).unwrap_err().is_execution());
        assert!(triggers.recv_timeout(WAIT).unwrap_err().is_execution());
        assert!(pw.start().unwrap_err().is_execution());
        assert!(pw.cancel_token().is_cancelled());
    }

    #[test]
    fn cleanup_uses_injected_clock() {
        let clock = Arc::new(ManualClock::default());
        let pw = PriceWatch::with_clock(PriceWatchConfig::default(), clock.clone()).unwrap();
        pw.create_alert("BTC", Comparator::Lt, 10.0, "").unwrap();

        assert_eq!(pw.engine().evaluate_tick(&Tick::new("BTC", 5.0)).len(), 1);
        assert_eq!(pw.cleanup_cooldowns(), 0);
        clock.advance(ChronoDuration::seconds(61));
        assert_eq!(pw.cleanup_cooldowns(), 1);
    }

    #[test]
    fn rejects_invalid_config() {
        let mut config = PriceWatchConfig::default();
        config.engine.queue_capacity = 0;
        assert!(PriceWatch::new(config).is_err());
    }
}
