extern crate pretty_env_logger;
#[macro_use] extern crate log;

use basemap::{BaseLayer, BasemapAPI, Viewport};
use std::env;
use std::path::Path;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    pretty_env_logger::init();

    println!("Base map tile downloader test");

    let args: Vec<String> = env::args().collect();
    let layer = match args.get(1).map(|s| s.as_str()) {
        None | Some("positron") => BaseLayer::Positron,
        Some("dark_matter") => BaseLayer::DarkMatter,
        Some("osm_standard") => BaseLayer::OsmStandard,
        Some(other) => {
            eprintln!("Unknown layer {}; use positron, dark_matter or osm_standard", other);
            std::process::exit(1);
        }
    };

    // Continental US, same framing as the combined hazard map
    let viewport = Viewport::new(37.8, -96.0, 4, 1280, 720);

    info!("Layer: {} ({})", layer.display_name(), layer.attribution());
    info!("Viewport: {:?}", viewport);
    info!("Tiles needed: {}", viewport.tiles().len());

    let api = BasemapAPI::new("hazard-map (basemap diagnostic)")?;

    let output_path = Path::new("basemap.png");
    match api.download_and_save_viewport(layer, &viewport, output_path).await {
        Ok(_) => {
            println!("Successfully downloaded and saved map to {:?}", output_path);
        }
        Err(e) => {
            error!("Error downloading map: {}", e);
        }
    }

    Ok(())
}
