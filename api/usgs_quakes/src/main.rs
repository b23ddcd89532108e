extern crate pretty_env_logger;
#[macro_use] extern crate log;

use std::env;
use usgs_quakes::{magnitude_class, Feed, FeedLevel, FeedPeriod, UsgsQuakesAPI, MAGNITUDE_CLASSES};

/// Feed names use the same wire names as map.json
fn parse_arg<T: serde::de::DeserializeOwned>(value: &str) -> Result<T, anyhow::Error> {
    serde_json::from_value(serde_json::Value::String(value.to_string()))
        .map_err(|_| anyhow::anyhow!("Unknown feed name: {}", value))
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    pretty_env_logger::init();

    let args: Vec<String> = env::args().collect();

    let level = match args.get(1) {
        Some(value) => parse_arg::<FeedLevel>(value)?,
        None => FeedLevel::All,
    };
    let period = match args.get(2) {
        Some(value) => parse_arg::<FeedPeriod>(value)?,
        None => FeedPeriod::Day,
    };

    if args.len() > 3 {
        eprintln!("Usage: {} [significant|4.5|2.5|1.0|all] [hour|day|week|month]", args[0]);
        std::process::exit(1);
    }

    let feed = Feed::new(level, period);
    info!("Fetching USGS feed {}...", feed);

    let api = UsgsQuakesAPI::new();
    let mut quakes = api.fetch(feed).await?;

    let mut histogram = [0usize; MAGNITUDE_CLASSES];
    for quake in &quakes {
        histogram[magnitude_class(quake.mag())] += 1;
    }

    println!("Earthquakes in {}: {}", feed, quakes.len());
    for (class, count) in histogram.iter().enumerate() {
        let label = if class + 1 == MAGNITUDE_CLASSES {
            format!("{}+", class)
        } else if class == 0 {
            "<1".to_string()
        } else {
            format!("{}–{}", class, class + 1)
        };
        println!("  {:<5} {:>6}", label, count);
    }

    quakes.sort_by(|a, b| b.mag().total_cmp(&a.mag()));
    for quake in quakes.iter().take(10) {
        let time = quake
            .time
            .map(|t| t.format("%Y-%m-%d %H:%M:%SZ").to_string())
            .unwrap_or_else(|| "—".to_string());
        println!("- {} — {} ({})", quake.magnitude_label(), quake.place, time);
    }

    Ok(())
}
