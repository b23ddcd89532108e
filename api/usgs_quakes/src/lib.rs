#[macro_use] extern crate log;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use geojson::{feature::Id, Feature, GeoJson, JsonObject, Value};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const FEED_BASE_URL: &str = "https://earthquake.usgs.gov/earthquakes/feed/v1.0/summary";
pub const FALLBACK_URL: &str = "https://earthquake.usgs.gov/earthquakes/";

/// Color for magnitudes below every threshold (including negative, -inf and NaN)
const BELOW_SCALE_COLOR: &str = "#a3a3a3";

/// Ascending lower bounds and their colors
const MAGNITUDE_STEPS: [(f64, &str); 6] = [
    (1.0, "#22c55e"),
    (2.0, "#84cc16"),
    (3.0, "#f59e0b"),
    (4.0, "#f97316"),
    (5.0, "#ef4444"),
    (6.0, "#b91c1c"),
];

/// Number of distinct magnitude color classes
pub const MAGNITUDE_CLASSES: usize = MAGNITUDE_STEPS.len() + 1;

/// Minimum magnitude included in a summary feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedLevel {
    Significant,
    #[serde(rename = "4.5")]
    M4_5,
    #[serde(rename = "2.5")]
    M2_5,
    #[serde(rename = "1.0")]
    M1_0,
    All,
}

impl FeedLevel {
    fn as_str(&self) -> &'static str {
        match self {
            FeedLevel::Significant => "significant",
            FeedLevel::M4_5 => "4.5",
            FeedLevel::M2_5 => "2.5",
            FeedLevel::M1_0 => "1.0",
            FeedLevel::All => "all",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedPeriod {
    Hour,
    Day,
    Week,
    Month,
}

impl FeedPeriod {
    fn as_str(&self) -> &'static str {
        match self {
            FeedPeriod::Hour => "hour",
            FeedPeriod::Day => "day",
            FeedPeriod::Week => "week",
            FeedPeriod::Month => "month",
        }
    }
}

/// One of the USGS real-time summary feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feed {
    pub level: FeedLevel,
    pub period: FeedPeriod,
}

impl Default for Feed {
    fn default() -> Self {
        Self {
            level: FeedLevel::All,
            period: FeedPeriod::Day,
        }
    }
}

impl Feed {
    pub fn new(level: FeedLevel, period: FeedPeriod) -> Self {
        Self { level, period }
    }

    pub fn file_name(&self) -> String {
        format!("{}_{}.geojson", self.level.as_str(), self.period.as_str())
    }

    pub fn url(&self, base_url: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), self.file_name())
    }
}

impl fmt::Display for Feed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.level.as_str(), self.period.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Quake {
    pub id: Option<String>,
    pub magnitude: Option<f64>,
    pub place: String,
    pub time: Option<DateTime<Utc>>,
    pub url: String,
    pub lon: f64,
    pub lat: f64,
    pub depth_km: Option<f64>,
}

impl Quake {
    /// Magnitude with missing values treated as zero
    pub fn mag(&self) -> f64 {
        self.magnitude.unwrap_or(0.0)
    }

    pub fn color(&self) -> &'static str {
        magnitude_color(self.mag())
    }

    pub fn radius(&self) -> f64 {
        magnitude_radius(self.mag())
    }

    pub fn marker(&self) -> MarkerStyle {
        MarkerStyle {
            radius: self.radius(),
            color: self.color(),
            weight: 1.5,
            fill_opacity: 0.7,
        }
    }

    /// "M 4.2" style label, "M —" when magnitude is missing
    pub fn magnitude_label(&self) -> String {
        match self.magnitude {
            Some(m) => format!("M {:.1}", m),
            None => "M —".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerStyle {
    pub radius: f64,
    pub color: &'static str,
    pub weight: f32,
    pub fill_opacity: f32,
}

/// Color class for a magnitude: 0 below 1.0, up to 6 at 6.0 and above.
/// Non-decreasing in `m`; NaN falls into class 0.
pub fn magnitude_class(m: f64) -> usize {
    MAGNITUDE_STEPS
        .iter()
        .rposition(|(threshold, _)| m >= *threshold)
        .map(|i| i + 1)
        .unwrap_or(0)
}

pub fn magnitude_color(m: f64) -> &'static str {
    match magnitude_class(m) {
        0 => BELOW_SCALE_COLOR,
        class => MAGNITUDE_STEPS[class - 1].1,
    }
}

/// Marker radius in pixels
pub fn magnitude_radius(m: f64) -> f64 {
    3.0 + m.max(0.0) * 3.0
}

/// Client for the USGS GeoJSON summary feeds
pub struct UsgsQuakesAPI {
    client: Client,
}

impl UsgsQuakesAPI {
    pub fn new() -> Self {
        Self { client: Client::new() }
    }

    /// Fetch every event in the given summary feed
    pub async fn fetch(&self, feed: Feed) -> Result<Vec<Quake>> {
        let url = feed.url(FEED_BASE_URL);
        info!("Fetching earthquakes from {}", url);

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(anyhow!("Earthquake feed request failed: {} - URL: {}", response.status(), url));
        }

        let text = response.text().await?;
        let quakes = parse_quakes(&text)?;
        info!("Fetched {} earthquakes from {}", quakes.len(), feed);
        Ok(quakes)
    }
}

impl Default for UsgsQuakesAPI {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a USGS summary FeatureCollection. Features without a point are skipped.
pub fn parse_quakes(text: &str) -> Result<Vec<Quake>> {
    let geojson: GeoJson = text.parse().context("Earthquake feed is not valid GeoJSON")?;

    let collection = match geojson {
        GeoJson::FeatureCollection(collection) => collection,
        _ => return Err(anyhow!("Earthquake feed is not a FeatureCollection")),
    };

    Ok(collection.features.iter().filter_map(quake_from_feature).collect())
}

fn property<'a>(props: Option<&'a JsonObject>, key: &str) -> Option<&'a serde_json::Value> {
    props?.get(key).filter(|v| !v.is_null())
}

fn quake_from_feature(feature: &Feature) -> Option<Quake> {
    let position = match feature.geometry.as_ref().map(|g| &g.value) {
        Some(Value::Point(position)) if position.len() >= 2 => position,
        _ => {
            debug!("Skipping earthquake feature without point geometry");
            return None;
        }
    };

    let props = feature.properties.as_ref();

    let id = match &feature.id {
        Some(Id::String(s)) => Some(s.clone()),
        Some(Id::Number(n)) => Some(n.to_string()),
        None => None,
    };

    Some(Quake {
        id,
        magnitude: property(props, "mag")
            .and_then(serde_json::Value::as_f64)
            .filter(|m| m.is_finite()),
        place: property(props, "place")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| "Unknown location".to_string()),
        time: property(props, "time")
            .and_then(serde_json::Value::as_i64)
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        url: property(props, "url")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| FALLBACK_URL.to_string()),
        lon: position[0],
        lat: position[1],
        depth_km: position.get(2).copied(),
    })
}
