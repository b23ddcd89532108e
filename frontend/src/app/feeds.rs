use anyhow::Result;
use basemap::{BaseLayer, BasemapAPI, Viewport};
use image::RgbaImage;
use nexrad::{BoundingBox, NexradAPI};
use nws_alerts::{Alert, NwsAlertsAPI};
use std::path::{Path, PathBuf};
use usgs_quakes::{Quake, UsgsQuakesAPI};

use crate::app::config::MapConfig;
use crate::app::status::FeedStatus;
use crate::app::utils::decode_rgba;

/// Results of one round of fetches. `None` means the map mode does not use that source.
pub struct FeedSnapshot {
    pub alerts: Option<Result<Vec<Alert>>>,
    pub quakes: Option<Result<Vec<Quake>>>,
    pub radar: Option<Result<RgbaImage>>,
}

impl FeedSnapshot {
    pub fn alerts_status(&self) -> FeedStatus {
        feed_status(&self.alerts)
    }

    pub fn quakes_status(&self) -> FeedStatus {
        feed_status(&self.quakes)
    }
}

fn feed_status<T>(result: &Option<Result<Vec<T>>>) -> FeedStatus {
    match result {
        Some(Ok(items)) => FeedStatus::Loaded(items.len()),
        Some(Err(_)) => FeedStatus::Failed,
        None => FeedStatus::Skipped,
    }
}

/// Fetch alerts, earthquakes and radar concurrently, as far as the mode needs them
pub async fn fetch_feeds(config: &MapConfig) -> FeedSnapshot {
    let mode = config.mode;
    let viewport = config.viewport();

    let alerts = async {
        if mode.wants_alerts() {
            Some(fetch_alerts(config).await)
        } else {
            None
        }
    };
    let quakes = async {
        if mode.wants_quakes() {
            Some(UsgsQuakesAPI::new().fetch(config.quake_feed).await)
        } else {
            None
        }
    };
    let radar = async {
        if mode.wants_radar() {
            Some(fetch_radar(&viewport).await)
        } else {
            None
        }
    };

    let (alerts, quakes, radar) = tokio::join!(alerts, quakes, radar);
    FeedSnapshot { alerts, quakes, radar }
}

async fn fetch_alerts(config: &MapConfig) -> Result<Vec<Alert>> {
    NwsAlertsAPI::new(&config.user_agent)?
        .with_limit(config.alerts_limit)
        .fetch_active()
        .await
}

/// Radar mosaic for exactly this viewport
pub async fn fetch_radar(viewport: &Viewport) -> Result<RgbaImage> {
    let (min_x, min_y, max_x, max_y) = viewport.mercator_bounds();
    let bbox = BoundingBox::new(min_x, min_y, max_x, max_y);
    let image = NexradAPI::new().get_map(bbox, viewport.width, viewport.height).await?;
    decode_rgba(&image.png)
}

/// Base map for the configured viewport, served from the on-disk cache when present
pub async fn fetch_basemap(config: &MapConfig, layer: BaseLayer) -> Result<RgbaImage> {
    let viewport = config.viewport();
    let cache_path = config
        .basemap_cache
        .as_ref()
        .map(|dir| dir.join(basemap_file_name(layer, &viewport)));

    if let Some(path) = &cache_path {
        if path.exists() {
            info!("Map file {:?} already exists, loading from disk", path);
            return decode_rgba(&std::fs::read(path)?);
        }
    }

    let api = BasemapAPI::new(&config.user_agent)?;
    let image = api.render_viewport(layer, &viewport).await?;

    if let Some(path) = &cache_path {
        match save_basemap(path, &image) {
            Ok(()) => info!("Map saved to {:?}", path),
            Err(e) => warn!("Failed to cache map at {:?}: {}", path, e),
        }
    }

    Ok(image)
}

fn save_basemap(path: &Path, image: &RgbaImage) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    image.save(path)?;
    Ok(())
}

/// One file per layer and framing
pub fn basemap_file_name(layer: BaseLayer, viewport: &Viewport) -> PathBuf {
    PathBuf::from(format!(
        "{}_{}_{}_z{}_{}x{}.png",
        format!("{:?}", layer).to_lowercase(),
        viewport.center_lat,
        viewport.center_lon,
        viewport.zoom,
        viewport.width,
        viewport.height
    ))
}
