use chrono::{DateTime, Local};

use crate::app::config::MapMode;

pub const TOGGLE_HINT: &str = "Use the toggle to switch layers.";
pub const ALERTS_FAILED: &str = "Failed to load alerts (see log).";
pub const QUAKES_FAILED: &str = "Failed to load earthquakes (see log).";

/// Outcome of one feed fetch as far as the status line cares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedStatus {
    Loaded(usize),
    Failed,
    /// The map mode does not use this feed
    Skipped,
}

pub fn loading(mode: MapMode) -> &'static str {
    match mode {
        MapMode::Weather => "Loading active alerts…",
        MapMode::Earthquakes => "Fetching USGS earthquakes…",
        MapMode::Combined => "Loading alerts and earthquakes…",
    }
}

/// Status line once both fetches have settled
pub fn loaded(mode: MapMode, alerts: FeedStatus, quakes: FeedStatus, updated: DateTime<Local>) -> String {
    match mode {
        MapMode::Weather => match alerts {
            FeedStatus::Loaded(count) => format!("Active alerts: {}", count),
            _ => ALERTS_FAILED.to_string(),
        },
        MapMode::Earthquakes => match quakes {
            FeedStatus::Loaded(count) => format!("Earthquakes: {} • Updated {}", count, updated.format("%H:%M:%S")),
            _ => QUAKES_FAILED.to_string(),
        },
        MapMode::Combined => {
            let mut parts: Vec<&str> = Vec::new();
            if alerts == FeedStatus::Failed {
                parts.push(ALERTS_FAILED);
            }
            if quakes == FeedStatus::Failed {
                parts.push(QUAKES_FAILED);
            }
            parts.push(TOGGLE_HINT);
            parts.join(" ")
        }
    }
}
