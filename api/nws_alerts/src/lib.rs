#[macro_use] extern crate log;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, FixedOffset};
use geojson::{feature::Id, Feature, GeoJson, JsonObject, Value};
use reqwest::Client;
use std::fmt;

pub const ACTIVE_ALERTS_URL: &str = "https://api.weather.gov/alerts/active";
pub const DEFAULT_LIMIT: u32 = 500;
pub const FALLBACK_LINK: &str = "https://www.weather.gov/";

/// Categorical alert importance as published by the NWS CAP feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Extreme,
    Severe,
    Moderate,
    Minor,
    Unknown,
}

impl Severity {
    /// Display order used by the severity legend
    pub const ORDER: [Severity; 5] = [
        Severity::Extreme,
        Severity::Severe,
        Severity::Moderate,
        Severity::Minor,
        Severity::Unknown,
    ];

    /// Parse a feed value. Anything missing or unrecognized is `Unknown`.
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("Extreme") => Severity::Extreme,
            Some("Severe") => Severity::Severe,
            Some("Moderate") => Severity::Moderate,
            Some("Minor") => Severity::Minor,
            _ => Severity::Unknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Severity::Extreme => "Extreme",
            Severity::Severe => "Severe",
            Severity::Moderate => "Moderate",
            Severity::Minor => "Minor",
            Severity::Unknown => "Unknown",
        }
    }

    /// Hex color used for outlines and legend swatches
    pub fn color(&self) -> &'static str {
        match self {
            Severity::Extreme => "#ef4444",
            Severity::Severe => "#f59e0b",
            Severity::Moderate => "#eab308",
            Severity::Minor => "#22c55e",
            Severity::Unknown => "#94a3b8",
        }
    }

    /// Polygon style for an alert of this severity
    pub fn style(&self) -> AlertStyle {
        AlertStyle {
            color: self.color(),
            weight: 2.0,
            opacity: 1.0,
            fill_opacity: 0.15,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertStyle {
    pub color: &'static str,
    pub weight: f32,
    pub opacity: f32,
    pub fill_opacity: f32,
}

impl AlertStyle {
    /// Style applied while the pointer is over the alert
    pub fn highlighted(self) -> Self {
        Self {
            weight: 3.0,
            fill_opacity: 0.25,
            ..self
        }
    }
}

/// One ring of lon/lat pairs
pub type Ring = Vec<(f64, f64)>;

#[derive(Debug, Clone)]
pub struct Alert {
    pub id: Option<String>,
    pub event: Option<String>,
    pub headline: Option<String>,
    pub severity: Severity,
    pub area_desc: Option<String>,
    pub sender_name: Option<String>,
    pub sent: Option<DateTime<FixedOffset>>,
    pub effective: Option<DateTime<FixedOffset>>,
    pub expires: Option<DateTime<FixedOffset>>,
    pub link: String,
    /// Outer rings only; alerts issued by zone have none
    pub rings: Vec<Ring>,
}

impl Alert {
    pub fn title(&self) -> &str {
        self.headline
            .as_deref()
            .or(self.event.as_deref())
            .unwrap_or("Weather Alert")
    }

    pub fn sender(&self) -> &str {
        self.sender_name.as_deref().unwrap_or("NWS")
    }

    pub fn areas(&self) -> &str {
        self.area_desc.as_deref().unwrap_or("—")
    }

    pub fn style(&self) -> AlertStyle {
        self.severity.style()
    }

    pub fn has_geometry(&self) -> bool {
        !self.rings.is_empty()
    }
}

/// Client for the NWS active alerts endpoint
pub struct NwsAlertsAPI {
    client: Client,
    limit: u32,
}

impl NwsAlertsAPI {
    /// Create a new client. api.weather.gov rejects requests without a User-Agent.
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .build()
            .context("Failed to build NWS HTTP client")?;

        Ok(Self {
            client,
            limit: DEFAULT_LIMIT,
        })
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    /// Fetch all active, actual alerts
    pub async fn fetch_active(&self) -> Result<Vec<Alert>> {
        let limit = self.limit.to_string();
        let params = [
            ("status", "actual"),
            ("message_type", "alert"),
            ("limit", limit.as_str()),
        ];

        info!("Fetching active alerts from {}", ACTIVE_ALERTS_URL);

        let response = self
            .client
            .get(ACTIVE_ALERTS_URL)
            .header(reqwest::header::ACCEPT, "application/geo+json")
            .query(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("Alerts request failed: {} - URL: {}", response.status(), ACTIVE_ALERTS_URL));
        }

        let text = response.text().await?;
        let alerts = parse_alerts(&text)?;
        info!("Fetched {} active alerts", alerts.len());
        Ok(alerts)
    }
}

/// Parse an alerts GeoJSON FeatureCollection
pub fn parse_alerts(text: &str) -> Result<Vec<Alert>> {
    let geojson: GeoJson = text.parse().context("Alerts feed is not valid GeoJSON")?;

    let collection = match geojson {
        GeoJson::FeatureCollection(collection) => collection,
        _ => return Err(anyhow!("Alerts feed is not a FeatureCollection")),
    };

    Ok(collection.features.iter().map(alert_from_feature).collect())
}

/// String property, or None when it is missing or not a string
fn text(props: Option<&JsonObject>, key: &str) -> Option<String> {
    match props?.get(key)? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Null => None,
        other => {
            warn!("Ignoring alert property {} of unexpected type: {}", key, other);
            None
        }
    }
}

fn alert_from_feature(feature: &Feature) -> Alert {
    let props = feature.properties.as_ref();

    let feature_id = match &feature.id {
        Some(Id::String(s)) => Some(s.clone()),
        Some(Id::Number(n)) => Some(n.to_string()),
        None => None,
    };

    let link = text(props, "@id")
        .or_else(|| feature_id.clone().filter(|id| id.starts_with("http")))
        .unwrap_or_else(|| FALLBACK_LINK.to_string());

    let rings = feature
        .geometry
        .as_ref()
        .map(|g| outer_rings(&g.value))
        .unwrap_or_default();

    Alert {
        id: text(props, "id").or(feature_id),
        event: text(props, "event"),
        headline: text(props, "headline"),
        severity: Severity::parse(text(props, "severity").as_deref()),
        area_desc: text(props, "areaDesc"),
        sender_name: text(props, "senderName"),
        sent: parse_timestamp(text(props, "sent").as_deref()),
        effective: parse_timestamp(text(props, "effective").as_deref()),
        expires: parse_timestamp(text(props, "expires").as_deref()),
        link,
        rings,
    }
}

fn outer_rings(value: &Value) -> Vec<Ring> {
    match value {
        Value::Polygon(polygon) => polygon.first().map(|r| vec![to_ring(r)]).unwrap_or_default(),
        Value::MultiPolygon(polygons) => polygons
            .iter()
            .filter_map(|polygon| polygon.first())
            .map(|r| to_ring(r))
            .collect(),
        Value::GeometryCollection(geometries) => geometries.iter().flat_map(|g| outer_rings(&g.value)).collect(),
        _ => Vec::new(),
    }
}

fn to_ring(positions: &[Vec<f64>]) -> Ring {
    positions
        .iter()
        .filter(|p| p.len() >= 2)
        .map(|p| (p[0], p[1]))
        .collect()
}

fn parse_timestamp(value: Option<&str>) -> Option<DateTime<FixedOffset>> {
    value.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "id": "https://api.weather.gov/alerts/urn:oid:1",
                "type": "Feature",
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[-97.0, 35.0], [-96.0, 35.0], [-96.0, 36.0], [-97.0, 35.0]]]
                },
                "properties": {
                    "@id": "https://api.weather.gov/alerts/urn:oid:1",
                    "id": "urn:oid:1",
                    "areaDesc": "Oklahoma; Cleveland",
                    "sent": "2024-05-06T20:15:00-05:00",
                    "effective": "2024-05-06T20:15:00-05:00",
                    "expires": "2024-05-06T21:00:00-05:00",
                    "severity": "Extreme",
                    "event": "Tornado Warning",
                    "senderName": "NWS Norman OK",
                    "headline": "Tornado Warning issued May 6"
                }
            },
            {
                "id": "https://api.weather.gov/alerts/urn:oid:2",
                "type": "Feature",
                "geometry": null,
                "properties": {
                    "severity": "Whatever",
                    "event": "Heat Advisory",
                    "expires": "not a date"
                }
            }
        ]
    }"#;

    #[test]
    fn test_parse_alerts() {
        let alerts = parse_alerts(FIXTURE).unwrap();
        assert_eq!(alerts.len(), 2);

        let tornado = &alerts[0];
        assert_eq!(tornado.severity, Severity::Extreme);
        assert_eq!(tornado.title(), "Tornado Warning issued May 6");
        assert_eq!(tornado.sender(), "NWS Norman OK");
        assert_eq!(tornado.id.as_deref(), Some("urn:oid:1"));
        assert_eq!(tornado.link, "https://api.weather.gov/alerts/urn:oid:1");
        assert_eq!(tornado.rings.len(), 1);
        assert_eq!(tornado.rings[0][1], (-96.0, 35.0));
        assert!(tornado.expires.is_some());
    }

    #[test]
    fn test_alert_without_geometry_is_kept() {
        let alerts = parse_alerts(FIXTURE).unwrap();
        let heat = &alerts[1];
        assert!(!heat.has_geometry());
        assert_eq!(heat.severity, Severity::Unknown);
        assert_eq!(heat.title(), "Heat Advisory");
        assert_eq!(heat.areas(), "—");
        assert_eq!(heat.sender(), "NWS");
        assert!(heat.expires.is_none());
        assert_eq!(heat.link, "https://api.weather.gov/alerts/urn:oid:2");
    }

    #[test]
    fn test_wrongly_typed_property_keeps_the_rest() {
        let alerts = parse_alerts(
            r#"{"type":"FeatureCollection","features":[{"type":"Feature","geometry":null,
            "properties":{"severity":"Extreme","headline":42,"event":"Flash Flood Warning","areaDesc":"Harris"}}]}"#,
        )
        .unwrap();

        let flood = &alerts[0];
        assert_eq!(flood.severity, Severity::Extreme);
        assert_eq!(flood.headline, None);
        assert_eq!(flood.title(), "Flash Flood Warning");
        assert_eq!(flood.areas(), "Harris");
    }

    #[test]
    fn test_multipolygon_and_collection_rings() {
        let alerts = parse_alerts(
            r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","properties":{"severity":"Severe"},
             "geometry":{"type":"MultiPolygon","coordinates":[
                [[[-90.0,30.0],[-89.0,30.0],[-89.0,31.0],[-90.0,30.0]],[[-89.8,30.2],[-89.5,30.2],[-89.5,30.5],[-89.8,30.2]]],
                [[[-88.0,30.0],[-87.0,30.0],[-87.0,31.0],[-88.0,30.0]]]]}},
            {"type":"Feature","properties":{"severity":"Minor"},
             "geometry":{"type":"GeometryCollection","geometries":[
                {"type":"Polygon","coordinates":[[[-100.0,40.0],[-99.0,40.0],[-99.0,41.0],[-100.0,40.0]]]},
                {"type":"Point","coordinates":[-98.0,40.0]},
                {"type":"MultiPolygon","coordinates":[[[[-97.0,40.0],[-96.0,40.0],[-96.0,41.0],[-97.0,40.0]]]]}]}}]}"#,
        )
        .unwrap();

        // Holes are dropped, one outer ring per polygon
        assert_eq!(alerts[0].rings.len(), 2);
        assert_eq!(alerts[0].rings[1][0], (-88.0, 30.0));
        // Points inside a collection contribute nothing
        assert_eq!(alerts[1].rings.len(), 2);
        assert_eq!(alerts[1].rings[1][1], (-96.0, 40.0));
    }

    #[test]
    fn test_empty_collection() {
        let alerts = parse_alerts(r#"{"type":"FeatureCollection","features":[]}"#).unwrap();
        assert!(alerts.is_empty());
    }

    #[test]
    fn test_rejects_non_collection() {
        let point = r#"{"type":"Point","coordinates":[0.0,0.0]}"#;
        assert!(parse_alerts(point).is_err());
        assert!(parse_alerts("<html>").is_err());
    }

    #[test]
    fn test_severity_parse_is_total() {
        assert_eq!(Severity::parse(Some("Severe")), Severity::Severe);
        assert_eq!(Severity::parse(Some("severe")), Severity::Unknown);
        assert_eq!(Severity::parse(None), Severity::Unknown);
        for severity in Severity::ORDER {
            assert_eq!(Severity::parse(Some(severity.label())), severity);
        }
    }

    #[test]
    fn test_styles() {
        let style = Severity::Moderate.style();
        assert_eq!(style.color, "#eab308");
        assert_eq!(style.weight, 2.0);
        assert_eq!(style.fill_opacity, 0.15);

        let hover = style.highlighted();
        assert_eq!(hover.weight, 3.0);
        assert_eq!(hover.fill_opacity, 0.25);
        assert_eq!(hover.color, style.color);
    }

    #[test]
    fn test_api_creation() {
        let api = NwsAlertsAPI::new("hazard-map-test").map(|api| api.with_limit(10));
        assert!(api.is_ok());
    }
}
