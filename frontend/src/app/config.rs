use anyhow::{anyhow, Context, Result};
use basemap::{BaseLayer, Viewport};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use usgs_quakes::Feed;

use crate::app::layers::{Overlay, OverlaySet};

pub const CONFIG_ENV: &str = "HAZARD_MAP_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "map.json";
pub const DEFAULT_USER_AGENT: &str = "hazard-map/0.1 (desktop hazard viewer)";
pub const DEFAULT_BASEMAP_CACHE: &str = "ui/images";
const MAX_REFRESH_MINUTES: u64 = 7 * 24 * 60;

/// Which map this window shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MapMode {
    Weather,
    Earthquakes,
    #[default]
    Combined,
}

impl MapMode {
    pub fn overlays(&self) -> OverlaySet {
        match self {
            MapMode::Weather => OverlaySet::of(&[Overlay::Alerts, Overlay::Radar]),
            MapMode::Earthquakes => OverlaySet::of(&[Overlay::Earthquakes]),
            MapMode::Combined => OverlaySet::of(&Overlay::ALL),
        }
    }

    /// Only the combined map carries the Weather/Earthquakes toggle
    pub fn has_toggle(&self) -> bool {
        *self == MapMode::Combined
    }

    pub fn wants_alerts(&self) -> bool {
        self.overlays().contains(Overlay::Alerts)
    }

    pub fn wants_radar(&self) -> bool {
        self.overlays().contains(Overlay::Radar)
    }

    pub fn wants_quakes(&self) -> bool {
        self.overlays().contains(Overlay::Earthquakes)
    }

    fn default_center(&self) -> (f64, f64) {
        match self {
            MapMode::Weather => (39.5, -98.5),
            MapMode::Earthquakes => (20.0, 0.0),
            MapMode::Combined => (37.8, -96.0),
        }
    }

    fn default_zoom(&self) -> u32 {
        match self {
            MapMode::Weather => 5,
            MapMode::Earthquakes => 2,
            MapMode::Combined => 4,
        }
    }

    fn default_base_layer(&self) -> BaseLayer {
        match self {
            MapMode::Earthquakes => BaseLayer::DarkMatter,
            _ => BaseLayer::Positron,
        }
    }

    fn default_radar_opacity(&self) -> f32 {
        match self {
            MapMode::Combined => 0.65,
            _ => 0.7,
        }
    }
}

/// Contents of map.json. Every field is optional; unset view fields
/// fall back to the presets of the selected mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    pub mode: MapMode,
    /// [lat, lon]
    pub center: Option<(f64, f64)>,
    pub zoom: Option<u32>,
    pub base_layer: Option<BaseLayer>,
    pub radar_opacity: Option<f32>,
    pub width: u32,
    pub height: u32,
    pub user_agent: String,
    pub quake_feed: Feed,
    pub alerts_limit: u32,
    /// 0 disables periodic refresh
    pub refresh_minutes: u64,
    /// Directory for rendered base maps; null disables the cache
    pub basemap_cache: Option<PathBuf>,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            mode: MapMode::default(),
            center: None,
            zoom: None,
            base_layer: None,
            radar_opacity: None,
            width: 1280,
            height: 720,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            quake_feed: Feed::default(),
            alerts_limit: nws_alerts::DEFAULT_LIMIT,
            refresh_minutes: 10,
            basemap_cache: Some(PathBuf::from(DEFAULT_BASEMAP_CACHE)),
        }
    }
}

impl MapConfig {
    /// Load from `$HAZARD_MAP_CONFIG`, or map.json in the working directory
    pub fn load() -> Result<Self> {
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from(&path)
    }

    /// A missing file means defaults; an unreadable or malformed one is an error
    pub fn load_from(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let config = Self::parse(&content).with_context(|| format!("Invalid map config {}", path.display()))?;
                info!("Loaded map config from {}", path.display());
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No map config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        let config: MapConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(anyhow!("Map size must be non-zero, got {}x{}", self.width, self.height));
        }
        let (lat, lon) = self.center();
        if !(-90.0..=90.0).contains(&lat) || !lon.is_finite() {
            return Err(anyhow!("Invalid map center [{}, {}]", lat, lon));
        }
        let layer = self.base_layer();
        if self.zoom() > layer.max_zoom() {
            return Err(anyhow!("Zoom {} exceeds {} maximum of {}", self.zoom(), layer.display_name(), layer.max_zoom()));
        }
        if self.refresh_minutes > MAX_REFRESH_MINUTES {
            return Err(anyhow!("Refresh interval of {} minutes is longer than a week", self.refresh_minutes));
        }
        if !(0.0..=1.0).contains(&self.radar_opacity()) {
            return Err(anyhow!("Radar opacity must be between 0 and 1, got {}", self.radar_opacity()));
        }
        Ok(())
    }

    pub fn center(&self) -> (f64, f64) {
        self.center.unwrap_or_else(|| self.mode.default_center())
    }

    pub fn zoom(&self) -> u32 {
        self.zoom.unwrap_or_else(|| self.mode.default_zoom())
    }

    pub fn base_layer(&self) -> BaseLayer {
        self.base_layer.unwrap_or_else(|| self.mode.default_base_layer())
    }

    pub fn radar_opacity(&self) -> f32 {
        self.radar_opacity.unwrap_or_else(|| self.mode.default_radar_opacity())
    }

    pub fn viewport(&self) -> Viewport {
        let (lat, lon) = self.center();
        Viewport::new(lat, lon, self.zoom(), self.width, self.height)
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        (self.refresh_minutes > 0).then(|| Duration::from_secs(self.refresh_minutes.saturating_mul(60)))
    }
}
