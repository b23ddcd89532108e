extern crate pretty_env_logger;
#[macro_use] extern crate log;

use nws_alerts::{NwsAlertsAPI, Severity};
use std::collections::HashMap;
use std::env;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    pretty_env_logger::init();

    let args: Vec<String> = env::args().collect();
    let user_agent = args.get(1).map(|s| s.as_str()).unwrap_or("hazard-map (nws_alerts diagnostic)");
    let limit: u32 = match args.get(2) {
        Some(value) => value.parse()?,
        None => nws_alerts::DEFAULT_LIMIT,
    };

    info!("Fetching active NWS alerts (limit {})...", limit);

    let api = NwsAlertsAPI::new(user_agent)?.with_limit(limit);
    let alerts = api.fetch_active().await?;

    let mut by_severity: HashMap<Severity, usize> = HashMap::new();
    for alert in &alerts {
        *by_severity.entry(alert.severity).or_default() += 1;
    }

    println!("Active alerts: {}", alerts.len());
    for severity in Severity::ORDER {
        println!("  {:<9} {:>5}  {}", severity, by_severity.get(&severity).copied().unwrap_or(0), severity.color());
    }

    let drawable = alerts.iter().filter(|a| a.has_geometry()).count();
    println!("With polygon geometry: {}", drawable);

    for alert in alerts.iter().take(10) {
        println!("- [{}] {} ({})", alert.severity, alert.title(), alert.areas());
    }

    Ok(())
}
