pub mod config;
pub mod feeds;
pub mod layers;
pub mod legend;
pub mod map;
pub mod render;
pub mod status;
pub mod utils;
