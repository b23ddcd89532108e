#[macro_use] extern crate log;

use anyhow::{anyhow, Context};
use futures::future::try_join_all;
use image::{imageops, DynamicImage, Rgba, RgbaImage};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::path::Path;

pub const TILE_SIZE: u32 = 256;
/// Web Mercator latitude limit
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;
const EARTH_RADIUS_M: f64 = 6_378_137.0;
/// Refuse viewports that would need more tiles than this
const MAX_TILES: usize = 400;

/// Slippy-map base layers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseLayer {
    Positron,
    DarkMatter,
    OsmStandard,
}

impl BaseLayer {
    pub const ALL: [BaseLayer; 3] = [BaseLayer::Positron, BaseLayer::DarkMatter, BaseLayer::OsmStandard];

    pub fn display_name(&self) -> &'static str {
        match self {
            BaseLayer::Positron => "CARTO Positron (light)",
            BaseLayer::DarkMatter => "CARTO Dark Matter",
            BaseLayer::OsmStandard => "OSM Standard",
        }
    }

    pub fn url_template(&self) -> &'static str {
        match self {
            BaseLayer::Positron => "https://{s}.basemaps.cartocdn.com/light_all/{z}/{x}/{y}{r}.png",
            BaseLayer::DarkMatter => "https://{s}.basemaps.cartocdn.com/dark_all/{z}/{x}/{y}{r}.png",
            BaseLayer::OsmStandard => "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png",
        }
    }

    pub fn subdomains(&self) -> &'static [&'static str] {
        match self {
            BaseLayer::Positron | BaseLayer::DarkMatter => &["a", "b", "c", "d"],
            BaseLayer::OsmStandard => &["a", "b", "c"],
        }
    }

    pub fn max_zoom(&self) -> u32 {
        match self {
            BaseLayer::Positron | BaseLayer::DarkMatter => 20,
            BaseLayer::OsmStandard => 19,
        }
    }

    pub fn attribution(&self) -> &'static str {
        match self {
            BaseLayer::Positron | BaseLayer::DarkMatter => "© OpenStreetMap, © CARTO",
            BaseLayer::OsmStandard => "© OpenStreetMap contributors",
        }
    }

    /// Fill for areas with no tile (beyond the poles or failed downloads)
    pub fn background(&self) -> Rgba<u8> {
        match self {
            BaseLayer::DarkMatter => Rgba([38, 38, 38, 255]),
            _ => Rgba([221, 221, 221, 255]),
        }
    }

    /// Tile URL; subdomain rotates on x + y like Leaflet does
    pub fn tile_url(&self, z: u32, x: u32, y: u32) -> String {
        let subdomains = self.subdomains();
        let s = subdomains[((x as u64 + y as u64) % subdomains.len() as u64) as usize];
        self.url_template()
            .replace("{s}", s)
            .replace("{z}", &z.to_string())
            .replace("{x}", &x.to_string())
            .replace("{y}", &y.to_string())
            .replace("{r}", "")
    }
}

/// Convert lat/lon to global pixel coordinates at zoom z (pure function)
pub fn lat_lon_to_pixel(lat_deg: f64, lon_deg: f64, zoom: u32) -> (f64, f64) {
    let lat_rad = lat_deg.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    let n = TILE_SIZE as f64 * 2u32.pow(zoom) as f64;
    let x = ((lon_deg + 180.0) / 360.0) * n;
    let y = ((1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0) * n;
    (x, y)
}

/// What part of the world is on screen
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub center_lat: f64,
    pub center_lon: f64,
    pub zoom: u32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(center_lat: f64, center_lon: f64, zoom: u32, width: u32, height: u32) -> Self {
        Self {
            center_lat,
            center_lon,
            zoom,
            width,
            height,
        }
    }

    /// Width of the whole world in pixels at this zoom
    pub fn world_size(&self) -> f64 {
        TILE_SIZE as f64 * 2u32.pow(self.zoom) as f64
    }

    /// Global pixel coordinate of the top-left corner
    pub fn origin(&self) -> (f64, f64) {
        let (cx, cy) = lat_lon_to_pixel(self.center_lat, self.center_lon, self.zoom);
        (cx - self.width as f64 / 2.0, cy - self.height as f64 / 2.0)
    }

    /// Viewport pixel for a lat/lon, using the world copy nearest the center
    pub fn project(&self, lat: f64, lon: f64) -> (f64, f64) {
        let (x, y) = self.project_unwrapped(lat, lon);
        (x + self.wrap_offset(x), y)
    }

    /// Project a lon/lat ring. Each vertex is unwrapped against the previous one
    /// so the ring never tears across the antimeridian, then the whole ring
    /// moves to the world copy of its first vertex.
    pub fn project_ring(&self, ring: &[(f64, f64)]) -> Vec<(f64, f64)> {
        let world = self.world_size();
        let mut points: Vec<(f64, f64)> = Vec::with_capacity(ring.len());
        for &(lon, lat) in ring {
            let (mut x, y) = self.project_unwrapped(lat, lon);
            if let Some(&(prev, _)) = points.last() {
                x -= ((x - prev) / world).round() * world;
            }
            points.push((x, y));
        }
        let offset = points.first().map(|&(x, _)| self.wrap_offset(x)).unwrap_or(0.0);
        points.into_iter().map(|(x, y)| (x + offset, y)).collect()
    }

    fn project_unwrapped(&self, lat: f64, lon: f64) -> (f64, f64) {
        let (px, py) = lat_lon_to_pixel(lat, lon, self.zoom);
        let (ox, oy) = self.origin();
        (px - ox, py - oy)
    }

    fn wrap_offset(&self, x: f64) -> f64 {
        let world = self.world_size();
        -((x - self.width as f64 / 2.0) / world).round() * world
    }

    /// Viewport bounds in EPSG:3857 meters as (min_x, min_y, max_x, max_y)
    pub fn mercator_bounds(&self) -> (f64, f64, f64, f64) {
        let world = self.world_size();
        let half = PI * EARTH_RADIUS_M;
        let to_x = |px: f64| px / world * 2.0 * half - half;
        let to_y = |py: f64| half - py / world * 2.0 * half;

        let (ox, oy) = self.origin();
        (
            to_x(ox),
            to_y(oy + self.height as f64),
            to_x(ox + self.width as f64),
            to_y(oy),
        )
    }

    /// Inclusive tile index range (x0, y0, x1, y1) covering the viewport.
    /// x may fall outside [0, 2^z) and must be wrapped; y may too and must be skipped.
    pub fn tile_range(&self) -> (i64, i64, i64, i64) {
        let (ox, oy) = self.origin();
        let size = TILE_SIZE as f64;
        let x0 = (ox / size).floor() as i64;
        let y0 = (oy / size).floor() as i64;
        let x1 = ((ox + self.width as f64 - 1.0) / size).floor() as i64;
        let y1 = ((oy + self.height as f64 - 1.0) / size).floor() as i64;
        (x0, y0, x1, y1)
    }

    /// Tiles to fetch as (screen tile x, tile y, wrapped tile x)
    pub fn tiles(&self) -> Vec<(i64, i64, u32)> {
        let n = 1i64 << self.zoom;
        let (x0, y0, x1, y1) = self.tile_range();
        let mut tiles = Vec::new();
        for ty in y0.max(0)..=y1.min(n - 1) {
            for tx in x0..=x1 {
                tiles.push((tx, ty, tx.rem_euclid(n) as u32));
            }
        }
        tiles
    }
}

/// Base map tile client
pub struct BasemapAPI {
    client: Client,
}

impl BasemapAPI {
    /// Create a new BasemapAPI instance. Tile servers expect an identifying User-Agent.
    pub fn new(user_agent: &str) -> Result<Self, anyhow::Error> {
        let client = Client::builder()
            .user_agent(user_agent)
            .build()
            .context("Failed to build tile HTTP client")?;
        Ok(Self { client })
    }

    /// Download a single tile as an image (async)
    pub async fn download_tile(&self, layer: BaseLayer, z: u32, x: u32, y: u32) -> Result<DynamicImage, anyhow::Error> {
        let url = layer.tile_url(z, x, y);
        debug!("Downloading {}", url);
        let resp = self.client.get(&url).send().await?;
        if resp.status().is_success() {
            let bytes = resp.bytes().await?;
            Ok(image::load_from_memory(&bytes)?)
        } else {
            Err(anyhow!("Failed to download tile: HTTP {} - URL: {}", resp.status(), url))
        }
    }

    /// Download every covering tile in parallel and stitch them into exactly the viewport
    pub async fn render_viewport(&self, layer: BaseLayer, viewport: &Viewport) -> Result<RgbaImage, anyhow::Error> {
        if viewport.zoom > layer.max_zoom() {
            return Err(anyhow!(
                "Zoom {} exceeds the maximum of {} for {}",
                viewport.zoom,
                layer.max_zoom(),
                layer.display_name()
            ));
        }

        let tiles = viewport.tiles();
        if tiles.len() > MAX_TILES {
            return Err(anyhow!("Viewport needs {} tiles, limit is {}", tiles.len(), MAX_TILES));
        }

        info!("Fetching {} {} tiles at zoom {}", tiles.len(), layer.display_name(), viewport.zoom);

        let images = try_join_all(
            tiles
                .iter()
                .map(|&(_, ty, wrapped_x)| self.download_tile(layer, viewport.zoom, wrapped_x, ty as u32)),
        )
        .await?;

        Ok(stitch_viewport(layer, viewport, &tiles, &images))
    }

    /// Render the viewport and save it to file
    pub async fn download_and_save_viewport(&self, layer: BaseLayer, viewport: &Viewport, output_path: &Path) -> Result<(), anyhow::Error> {
        let image = self.render_viewport(layer, viewport).await?;
        image.save(output_path)?;
        info!("Saved map to {:?}", output_path);
        Ok(())
    }
}

/// Place downloaded tiles onto a viewport-sized canvas (pure function)
pub fn stitch_viewport(layer: BaseLayer, viewport: &Viewport, tiles: &[(i64, i64, u32)], images: &[DynamicImage]) -> RgbaImage {
    let mut canvas = RgbaImage::from_pixel(viewport.width, viewport.height, layer.background());
    let (ox, oy) = viewport.origin();
    let size = TILE_SIZE as f64;

    tiles.iter().zip(images).for_each(|(&(tx, ty, _), tile)| {
        let x = (tx as f64 * size - ox).round() as i64;
        let y = (ty as f64 * size - oy).round() as i64;
        imageops::overlay(&mut canvas, &tile.to_rgba8(), x, y);
    });

    canvas
}
