//! PriceWatch demo server
//!
//! Runs the data plane against the simulated feed, logs every trigger and
//! purges stale cooldown entries on the configured interval.

use std::path::PathBuf;
use std::time::Duration;

use crossbeam_channel::{after, never, select, tick, Receiver};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pricewatch::{Comparator, MockFeed, PriceWatch, PriceWatchConfig};

/// An alert requested on the command line as `SYMBOL:CMP:THRESHOLD`.
struct AlertArg {
    symbol: String,
    comparator: Comparator,
    threshold: f64,
}

/// Server options
#[derive(Default)]
struct Options {
    config_path: Option<PathBuf>,
    symbols: Option<Vec<String>>,
    tick_ms: Option<u64>,
    cooldown_secs: Option<u64>,
    run_secs: Option<u64>,
    alerts: Vec<AlertArg>,
}

fn fail(message: &str) -> ! {
    eprintln!("error: {message}");
    std::process::exit(1);
}

fn value<'a>(args: &'a [String], i: usize, flag: &str) -> &'a str {
    args.get(i + 1)
        .map_or_else(|| fail(&format!("{flag} requires a value")), String::as_str)
}

fn number(raw: &str, flag: &str) -> u64 {
    raw.parse()
        .unwrap_or_else(|_| fail(&format!("invalid number for {flag}: {raw}")))
}

fn parse_alert(raw: &str) -> AlertArg {
    let parts: Vec<&str> = raw.split(':').collect();
    let [symbol, comparator, threshold] = parts.as_slice() else {
        fail(&format!("--alert expects SYMBOL:CMP:THRESHOLD, got {raw}"));
    };
    let comparator: Comparator = comparator
        .parse()
        .unwrap_or_else(|_| fail(&format!("unknown comparator: {comparator}")));
    let threshold: f64 = threshold
        .parse()
        .unwrap_or_else(|_| fail(&format!("invalid threshold: {threshold}")));
    AlertArg {
        symbol: (*symbol).to_string(),
        comparator,
        threshold,
    }
}

fn print_help() {
    println!("pricewatch-server - PriceWatch demo server");
    println!();
    println!("USAGE:");
    println!("    pricewatch-server [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -c, --config <FILE>            JSON configuration file");
    println!("    -s, --symbols <A,B,...>        Symbols for the simulated feed");
    println!("        --tick-ms <MS>             Feed tick interval [default: 200]");
    println!("        --cooldown-secs <SECS>     Alert cooldown [default: 30]");
    println!("    -a, --alert <SYM:CMP:PRICE>    Create an alert at startup (repeatable)");
    println!("        --run-secs <SECS>          Exit after this long [default: run forever]");
    println!("    -h, --help                     Print help information");
    println!();
    println!("Log level is read from RUST_LOG [default: info].");
}

fn parse_args() -> Options {
    let args: Vec<String> = std::env::args().collect();
    let mut options = Options::default();

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "--config" | "-c" => {
                options.config_path = Some(PathBuf::from(value(&args, i, flag)));
                i += 2;
            }
            "--symbols" | "-s" => {
                let symbols = value(&args, i, flag)
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_uppercase)
                    .collect();
                options.symbols = Some(symbols);
                i += 2;
            }
            "--tick-ms" => {
                options.tick_ms = Some(number(value(&args, i, flag), flag));
                i += 2;
            }
            "--cooldown-secs" => {
                options.cooldown_secs = Some(number(value(&args, i, flag), flag));
                i += 2;
            }
            "--run-secs" => {
                options.run_secs = Some(number(value(&args, i, flag), flag));
                i += 2;
            }
            "--alert" | "-a" => {
                options.alerts.push(parse_alert(value(&args, i, flag)));
                i += 2;
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            arg => fail(&format!("unknown argument: {arg}")),
        }
    }

    options
}

fn load_config(options: &Options) -> Result<PriceWatchConfig, Box<dyn std::error::Error>> {
    let mut config = match &options.config_path {
        Some(path) => PriceWatchConfig::from_path(path)?,
        None => PriceWatchConfig::default(),
    };
    if let Some(symbols) = &options.symbols {
        config.feed.symbols.clone_from(symbols);
    }
    if let Some(ms) = options.tick_ms {
        config.feed.tick_interval_ms = ms;
    }
    if let Some(secs) = options.cooldown_secs {
        config.engine.cooldown_secs = secs;
    }
    config.validate()?;
    Ok(config)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let options = parse_args();
    let config = load_config(&options)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        symbols = ?config.feed.symbols,
        cooldown_secs = config.engine.cooldown_secs,
        "starting pricewatch"
    );

    let pw = PriceWatch::new(config.clone())?;
    pw.start()?;

    for alert in &options.alerts {
        match pw.create_alert(&alert.symbol, alert.comparator, alert.threshold, "cli") {
            Ok(created) => info!(
                alert_id = %created.id,
                symbol = %created.symbol,
                comparator = %created.comparator,
                threshold = created.threshold,
                "alert created"
            ),
            Err(e) => warn!(error = %e, symbol = %alert.symbol, "rejected alert"),
        }
    }

    let feed = MockFeed::from_config(&config.feed);
    feed.start(pw.cancel_token())?;
    let ingest = pw.spawn_ingest(feed.ticks())?;

    let triggers = pw.watch_triggers();
    let trigger_rx = triggers.receiver().clone();
    let cleanup = tick(config.engine.cleanup_interval());
    let deadline: Receiver<std::time::Instant> = match options.run_secs {
        Some(secs) => after(Duration::from_secs(secs)),
        None => never(),
    };

    loop {
        select! {
            recv(trigger_rx) -> msg => match msg {
                Ok(trigger) => println!(
                    "TRIGGER {} {} {} @ {:.4} ({})",
                    trigger.alert.symbol,
                    trigger.alert.comparator,
                    trigger.alert.threshold,
                    trigger.triggered_price,
                    trigger.timestamp.to_rfc3339(),
                ),
                Err(_) => break,
            },
            recv(cleanup) -> _ => {
                let purged = pw.cleanup_cooldowns();
                let stats = pw.engine().stats();
                info!(
                    purged,
                    cooldown_entries = stats.cooldown_entries,
                    triggers_emitted = stats.triggers_emitted,
                    dropped_ticks = stats.dropped_ticks,
                    "cooldown cleanup"
                );
            }
            recv(deadline) -> _ => break,
        }
    }

    feed.stop();
    pw.stop();
    let _ = ingest.join();
    info!("shut down");
    Ok(())
}
