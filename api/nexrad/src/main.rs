use nexrad::{BoundingBox, NexradAPI};
use std::env;

/// Continental US in EPSG:3857 meters
const CONUS: BoundingBox = BoundingBox {
    min_x: -14_000_000.0,
    min_y: 2_700_000.0,
    max_x: -7_000_000.0,
    max_y: 6_500_000.0,
};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    pretty_env_logger::init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <command> [args...]", args[0]);
        eprintln!("Commands:");
        eprintln!("  capabilities - List available layers");
        eprintln!("  map [min_x min_y max_x max_y] [width] [height] - Fetch radar PNG (EPSG:3857 meters, default CONUS)");
        eprintln!("");
        eprintln!("Examples:");
        eprintln!("  {} capabilities", args[0]);
        eprintln!("  {} map", args[0]);
        eprintln!("  {} map -11500000 3800000 -10000000 4800000 1024 768", args[0]);
        std::process::exit(1);
    }

    let api = NexradAPI::new();

    match args[1].as_str() {
        "capabilities" => {
            println!("Fetching WMS capabilities...");
            let caps = api.get_capabilities().await?;
            println!("Found {} layers:", caps.layers.len());
            for layer in &caps.layers {
                match &layer.title {
                    Some(title) => println!("  {} ({})", layer.name, title),
                    None => println!("  {}", layer.name),
                }
            }
        }

        "map" => {
            let (bbox, rest) = if args.len() >= 6 {
                let bbox = BoundingBox::new(args[2].parse::<f64>()?, args[3].parse::<f64>()?, args[4].parse::<f64>()?, args[5].parse::<f64>()?);
                (bbox, &args[6..])
            } else {
                (CONUS, &args[2..])
            };
            let width: u32 = rest.first().map(|s| s.parse::<u32>()).transpose()?.unwrap_or(1024);
            let height: u32 = rest.get(1).map(|s| s.parse::<u32>()).transpose()?.unwrap_or(600);

            println!("Fetching radar for layer: {}", api.layer());
            println!("Bounding box: {}", bbox.to_string());
            println!("Size: {}x{}", width, height);

            let image = api.get_map(bbox, width, height).await?;

            let filename = format!("{}_{}.png", api.layer(), image.fetched_at.format("%Y%m%dT%H%M%SZ"));
            std::fs::write(&filename, &image.png)?;
            println!("Image saved to: {}", filename);
        }

        command => {
            eprintln!("Unknown command: {}", command);
            std::process::exit(1);
        }
    }

    Ok(())
}
