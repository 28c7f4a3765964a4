//! feedrelay binary: run one processing pass.
//!
//! Usage: `feedrelay [frequency]`. With a frequency argument (instant,
//! daily, weekly) only that cadence is processed; with none, every
//! cadence is considered and the schedule gate decides what actually
//! runs. Intended to be driven by cron or a systemd timer.

use std::process;

use tracing::{error, info};

use feedrelay::feed::FeedFetcher;
use feedrelay::platform::HttpPlatform;
use feedrelay::{logging, Config, FeedProcessor, Frequency};

const CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() {
    let config = match Config::load(CONFIG_PATH) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("could not load {CONFIG_PATH} ({e}), using defaults");
            Config::default()
        }
    };

    if let Err(e) = logging::init(&config.logging) {
        eprintln!("file logging unavailable ({e}), logging to console");
        logging::init_console_only(&config.logging.level);
    }

    if let Err(e) = config.validate() {
        error!("invalid configuration: {e}");
        process::exit(1);
    }

    let frequencies: Vec<Frequency> = match std::env::args().nth(1) {
        Some(name) => match Frequency::from_name(&name) {
            Some(frequency) => vec![frequency],
            None => {
                error!("unknown frequency: {name} (expected instant, daily, or weekly)");
                process::exit(2);
            }
        },
        None => Frequency::ALL.to_vec(),
    };

    let fetcher = match FeedFetcher::new(&config.fetch) {
        Ok(fetcher) => fetcher,
        Err(e) => {
            error!("could not create feed fetcher: {e}");
            process::exit(1);
        }
    };
    let platform = match HttpPlatform::new(&config.platform) {
        Ok(platform) => platform,
        Err(e) => {
            error!("could not create platform client: {e}");
            process::exit(1);
        }
    };
    let processor = match FeedProcessor::new(fetcher, platform, &config) {
        Ok(processor) => processor,
        Err(e) => {
            error!("could not create processor: {e}");
            process::exit(1);
        }
    };

    for frequency in frequencies {
        match processor.process_feeds_by_frequency(frequency).await {
            Ok(results) => {
                let total: usize = results.values().sum();
                info!(frequency = %frequency, feeds = results.len(), notified = total,
                    "pass complete");
                for (feed, notified) in &results {
                    info!(frequency = %frequency, feed = %feed, notified, "feed result");
                }
            }
            Err(e) => {
                error!(frequency = %frequency, "pass failed: {e}");
            }
        }
    }
}
