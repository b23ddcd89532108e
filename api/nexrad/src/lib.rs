#[macro_use] extern crate log;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub const IEM_N0R_URL: &str = "https://mesonet.agron.iastate.edu/cgi-bin/wms/nexrad/n0r.cgi";
pub const N0R_LAYER: &str = "nexrad-n0r-900913";

/// WMS client for the Iowa Environmental Mesonet NEXRAD mosaic
pub struct NexradAPI {
    client: Client,
    base_url: String,
    layer: String,
}

/// Bounding box in EPSG:3857 (Web Mercator) meters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// WMS 1.1.1 BBOX order: minx,miny,maxx,maxy
    pub fn to_string(&self) -> String {
        format!("{},{},{},{}", self.min_x, self.min_y, self.max_x, self.max_y)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WmsCapabilities {
    pub layers: Vec<WmsLayer>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WmsLayer {
    pub name: String,
    pub title: Option<String>,
}

/// A radar mosaic rendered for one viewport
#[derive(Debug, Clone)]
pub struct RadarImage {
    pub png: Vec<u8>,
    pub fetched_at: DateTime<Utc>,
}

impl NexradAPI {
    /// Create a client for the base reflectivity (n0r) mosaic
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: IEM_N0R_URL.to_string(),
            layer: N0R_LAYER.to_string(),
        }
    }

    pub fn with_layer(mut self, layer: &str) -> Self {
        self.layer = layer.to_string();
        self
    }

    pub fn layer(&self) -> &str {
        &self.layer
    }

    /// Get raw WMS capabilities XML
    pub async fn get_capabilities_raw(&self) -> Result<String> {
        let url = format!("{}?SERVICE=WMS&VERSION=1.1.1&REQUEST=GetCapabilities", self.base_url);

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(anyhow!("WMS GetCapabilities request failed: {} - URL: {}", response.status(), url));
        }

        Ok(response.text().await?)
    }

    /// Get WMS capabilities
    pub async fn get_capabilities(&self) -> Result<WmsCapabilities> {
        let xml = self.get_capabilities_raw().await?;
        Ok(parse_capabilities(&xml))
    }

    /// Fetch a transparent PNG of the mosaic covering `bbox`
    pub async fn get_map(&self, bbox: BoundingBox, width: u32, height: u32) -> Result<RadarImage> {
        let bbox_str = bbox.to_string();
        let width_str = width.to_string();
        let height_str = height.to_string();

        let params = [
            ("SERVICE", "WMS"),
            ("VERSION", "1.1.1"),
            ("REQUEST", "GetMap"),
            ("LAYERS", self.layer.as_str()),
            ("STYLES", ""),
            ("SRS", "EPSG:3857"),
            ("BBOX", bbox_str.as_str()),
            ("WIDTH", width_str.as_str()),
            ("HEIGHT", height_str.as_str()),
            ("FORMAT", "image/png"),
            ("TRANSPARENT", "true"),
        ];

        let request_url = || format!("{}?{}", self.base_url, serde_urlencoded::to_string(&params).unwrap_or_default());
        debug!("WMS GetMap {}", request_url());

        let response = self.client.get(&self.base_url).query(&params).send().await?;

        if !response.status().is_success() {
            return Err(anyhow!("WMS request failed: {} - URL: {}", response.status(), request_url()));
        }

        // Service exceptions come back as 200 with an XML body
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if !is_image_content_type(&content_type) {
            let body = response.text().await.unwrap_or_default();
            let excerpt: String = body.chars().take(200).collect();
            return Err(anyhow!("WMS returned {} instead of an image: {}", content_type, excerpt.trim()));
        }

        let bytes = response.bytes().await?;
        info!("Fetched {} bytes of radar imagery ({}x{})", bytes.len(), width, height);

        Ok(RadarImage {
            png: bytes.to_vec(),
            fetched_at: Utc::now(),
        })
    }
}

impl Default for NexradAPI {
    fn default() -> Self {
        Self::new()
    }
}

fn is_image_content_type(content_type: &str) -> bool {
    content_type.trim().to_ascii_lowercase().starts_with("image/")
}

/// Pull layer names out of capabilities XML. Each `<Layer` opening starts a new
/// block, so a parent's title never attaches to its first child.
pub fn parse_capabilities(xml: &str) -> WmsCapabilities {
    let mut layers = Vec::new();

    for block in xml.split("<Layer").skip(1) {
        let name = tag_text(block, "Name");
        let title = tag_text(block, "Title");
        if let Some(name) = name {
            layers.push(WmsLayer {
                name: name.to_string(),
                title: title.map(str::to_string),
            });
        }
    }

    WmsCapabilities { layers }
}

fn tag_text<'a>(block: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);

    let start = block.find(&open)? + open.len();
    let end = block[start..].find(&close)? + start;
    let text = block[start..end].trim();
    (!text.is_empty()).then_some(text)
}
