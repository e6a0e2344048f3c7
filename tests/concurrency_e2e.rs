use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use pricewatch::{
    AlertStore, AlertUpdate, CancelToken, Comparator, PriceWatch, PriceWatchConfig, Tick,
    TickBroker,
};

const WAIT: Duration = Duration::from_secs(5);

#[test]
fn concurrent_producers_and_subscriber_churn() {
    let broker = Arc::new(TickBroker::with_capacity(10_000));
    let cancel = CancelToken::new();
    broker.start(&cancel).unwrap();
    let steady = broker.subscribe("steady", ["BTC"], 100_000);

    let producers: Vec<_> = (0..4)
        .map(|p| {
            let broker = Arc::clone(&broker);
            thread::spawn(move || {
                let mut accepted = 0_u32;
                for i in 0..500 {
                    if broker.publish(Tick::new("BTC", f64::from(p * 1_000 + i))) {
                        accepted += 1;
                    }
                }
                accepted
            })
        })
        .collect();

    let churn = {
        let broker = Arc::clone(&broker);
        thread::spawn(move || {
            for i in 0..200 {
                let id = format!("churn-{}", i % 7);
                let inbox = broker.subscribe(&id, ["BTC", "ETH"], 4);
                inbox.drain();
                broker.unsubscribe(&id);
            }
        })
    };

    let accepted: u32 = producers.into_iter().map(|h| h.join().unwrap()).sum();
    churn.join().unwrap();

    let mut received = 0_u32;
    while received < accepted {
        steady.recv_timeout(WAIT).unwrap();
        received += 1;
    }
    assert_eq!(broker.subscriber_count(), 1);
    broker.stop();
    assert!(steady.recv_timeout(WAIT).is_err());
}

#[test]
fn crud_races_with_evaluation() {
    let pw = Arc::new(PriceWatch::new(PriceWatchConfig::default()).unwrap());
    pw.start().unwrap();
    let triggers = pw.watch_triggers();

    let writers: Vec<_> = (0..3)
        .map(|_| {
            let pw = Arc::clone(&pw);
            thread::spawn(move || {
                for i in 0..100 {
                    let alert = pw
                        .create_alert("DOT", Comparator::Gt, 1.0, format!("w{i}"))
                        .unwrap();
                    if i % 2 == 0 {
                        pw.update_alert(&alert.id, &AlertUpdate::new().symbol("AVAX"))
                            .unwrap();
                    }
                    if i % 3 == 0 {
                        pw.delete_alert(&alert.id).unwrap();
                    }
                }
            })
        })
        .collect();

    for i in 0..200 {
        pw.ingest(Tick::new(if i % 2 == 0 { "DOT" } else { "AVAX" }, 8.5));
    }
    for writer in writers {
        writer.join().unwrap();
    }

    // Index and primary map still agree once the dust settles.
    let store = pw.store();
    let total = store.count().unwrap();
    let indexed: usize = store
        .active_symbols()
        .unwrap()
        .iter()
        .map(|s| store.count_by_symbol(s).unwrap())
        .sum();
    assert_eq!(total, indexed);
    assert_eq!(total, 3 * (100 - 34));

    let deadline = Instant::now() + WAIT;
    while pw.engine().stats().evaluated_ticks < 200 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    let stats = pw.engine().stats();
    assert_eq!(stats.evaluated_ticks + stats.dropped_ticks, 200);
    assert!(triggers.drain().len() as u64 <= stats.triggers_emitted);
    pw.stop();
}
