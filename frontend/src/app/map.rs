use basemap::{BaseLayer, Viewport};
use chrono::{DateTime, Local};
use image::RgbaImage;
use nws_alerts::Alert;
use slint::{ComponentHandle, ModelRc, SharedString, VecModel};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tokio::runtime::Runtime;
use usgs_quakes::Quake;

use crate::app::config::MapConfig;
use crate::app::feeds::{self, FeedSnapshot};
use crate::app::layers::{LayerController, LayerEvent, Overlay, ToggleMode};
use crate::app::legend::LegendKind;
use crate::app::render::{alert_at, compose, Scene};
use crate::app::status;
use crate::app::utils::{rgba_to_slint_image, slint_color};
use crate::{LegendRow, MainWindow};

/// Everything one map window shows: fetched data, cached imagery and layer state
pub struct MapSession {
    config: MapConfig,
    viewport: Viewport,
    controller: LayerController,
    base_layer: BaseLayer,
    basemaps: HashMap<BaseLayer, RgbaImage>,
    radar: Option<RgbaImage>,
    alerts: Vec<Alert>,
    quakes: Vec<Quake>,
    hovered: Option<usize>,
    status: String,
}

impl MapSession {
    pub fn new(config: MapConfig) -> Self {
        let mut controller = LayerController::new(config.mode.overlays());
        if config.mode.has_toggle() {
            controller.show_weather();
        } else {
            controller.show_all();
        }

        Self {
            viewport: config.viewport(),
            base_layer: config.base_layer(),
            status: status::loading(config.mode).to_string(),
            config,
            controller,
            basemaps: HashMap::new(),
            radar: None,
            alerts: Vec::new(),
            quakes: Vec::new(),
            hovered: None,
        }
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    pub fn controller(&self) -> &LayerController {
        &self.controller
    }

    pub fn legend(&self) -> LegendKind {
        self.controller.legend()
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn alerts(&self) -> &[Alert] {
        &self.alerts
    }

    pub fn quakes(&self) -> &[Quake] {
        &self.quakes
    }

    pub fn base_layer(&self) -> BaseLayer {
        self.base_layer
    }

    pub fn has_basemap(&self, layer: BaseLayer) -> bool {
        self.basemaps.contains_key(&layer)
    }

    pub fn hovered_alert(&self) -> Option<&Alert> {
        self.hovered.and_then(|i| self.alerts.get(i))
    }

    pub fn show_weather(&mut self) -> Vec<LayerEvent> {
        self.controller.show_weather()
    }

    pub fn show_quakes(&mut self) -> Vec<LayerEvent> {
        self.hovered = None;
        self.controller.show_quakes()
    }

    pub fn set_overlay(&mut self, overlay: Overlay, visible: bool) -> Option<LayerEvent> {
        if overlay == Overlay::Alerts && !visible {
            self.hovered = None;
        }
        self.controller.set_overlay(overlay, visible)
    }

    /// Pointer moved to (fx, fy), given as fractions of the map size.
    /// Returns true when the highlighted alert changed.
    pub fn hover(&mut self, fx: f64, fy: f64) -> bool {
        let on_map = (0.0..=1.0).contains(&fx) && (0.0..=1.0).contains(&fy);
        let hovered = if on_map && self.controller.is_visible(Overlay::Alerts) {
            let x = fx * self.viewport.width as f64;
            let y = fy * self.viewport.height as f64;
            alert_at(&self.viewport, &self.alerts, x, y)
        } else {
            None
        };
        if hovered == self.hovered {
            return false;
        }
        if let Some(alert) = hovered.and_then(|i| self.alerts.get(i)) {
            debug!("Hovering alert {}", alert.title());
        }
        self.hovered = hovered;
        true
    }

    /// Switch base layer; returns true when its imagery still has to be fetched
    pub fn select_base_layer(&mut self, layer: BaseLayer) -> bool {
        self.base_layer = layer;
        !self.has_basemap(layer)
    }

    /// Store a rendered base map. After a failure the layer's plain background
    /// is drawn and the next refresh tries again.
    pub fn set_basemap(&mut self, layer: BaseLayer, result: anyhow::Result<RgbaImage>) {
        match result {
            Ok(image) => {
                self.basemaps.insert(layer, image);
            }
            Err(e) => error!("Failed to load {} base map: {}", layer.display_name(), e),
        }
    }

    /// Replace feed data with a fresh snapshot. Failed feeds leave their overlay empty.
    pub fn apply_snapshot(&mut self, snapshot: FeedSnapshot, updated: DateTime<Local>) {
        let alerts_status = snapshot.alerts_status();
        let quakes_status = snapshot.quakes_status();

        self.alerts = match snapshot.alerts {
            Some(Ok(alerts)) => {
                info!("Loaded {} active alerts", alerts.len());
                alerts
            }
            Some(Err(e)) => {
                error!("Failed to load alerts: {}", e);
                Vec::new()
            }
            None => Vec::new(),
        };

        self.quakes = match snapshot.quakes {
            Some(Ok(quakes)) => {
                info!("Loaded {} earthquakes from {}", quakes.len(), self.config.quake_feed);
                quakes
            }
            Some(Err(e)) => {
                error!("Failed to load earthquakes: {}", e);
                Vec::new()
            }
            None => Vec::new(),
        };

        self.radar = match snapshot.radar {
            Some(Ok(radar)) => Some(radar),
            Some(Err(e)) => {
                error!("Failed to load radar: {}", e);
                None
            }
            None => None,
        };

        self.hovered = None;
        self.status = status::loaded(self.config.mode, alerts_status, quakes_status, updated);
    }

    /// Composite the current view
    pub fn render(&self) -> anyhow::Result<RgbaImage> {
        let blank;
        let base = match self.basemaps.get(&self.base_layer) {
            Some(image) => image,
            None => {
                blank = RgbaImage::from_pixel(self.viewport.width, self.viewport.height, self.base_layer.background());
                &blank
            }
        };

        compose(&Scene {
            viewport: &self.viewport,
            base,
            radar: self.radar.as_ref(),
            radar_opacity: self.config.radar_opacity(),
            alerts: &self.alerts,
            quakes: &self.quakes,
            visible: self.controller.visible(),
            highlighted: self.hovered,
        })
    }

    /// Parts of the window that never change for a session
    pub fn setup_window(&self, main_window: &MainWindow) {
        let available = self.controller.available();
        main_window.set_show_toggle(self.config.mode.has_toggle());
        main_window.set_has_alerts(available.contains(Overlay::Alerts));
        main_window.set_has_radar(available.contains(Overlay::Radar));
        main_window.set_has_quakes(available.contains(Overlay::Earthquakes));
        main_window.set_alerts_label(Overlay::Alerts.name().into());
        main_window.set_radar_label(Overlay::Radar.name().into());
        main_window.set_quakes_label(Overlay::Earthquakes.name().into());

        let names: Vec<SharedString> = BaseLayer::ALL.iter().map(|l| l.display_name().into()).collect();
        main_window.set_base_layers(ModelRc::from(Rc::new(VecModel::from(names))));
    }

    /// Push the session state into the window
    pub fn present(&self, main_window: &MainWindow) {
        match self.render() {
            Ok(image) => main_window.set_map_image(rgba_to_slint_image(&image)),
            Err(e) => error!("Failed to render map: {}", e),
        }

        let legend = self.legend();
        let rows: Vec<LegendRow> = legend
            .entries()
            .into_iter()
            .map(|entry| LegendRow {
                swatch: slint_color(entry.color),
                label: entry.label.into(),
            })
            .collect();
        main_window.set_legend_title(legend.title().into());
        main_window.set_legend_rows(ModelRc::from(Rc::new(VecModel::from(rows))));

        let active = self.controller.active();
        main_window.set_weather_active(active == Some(ToggleMode::Weather));
        main_window.set_quakes_active(active == Some(ToggleMode::Quakes));
        main_window.set_alerts_visible(self.controller.is_visible(Overlay::Alerts));
        main_window.set_radar_visible(self.controller.is_visible(Overlay::Radar));
        main_window.set_quakes_visible(self.controller.is_visible(Overlay::Earthquakes));

        let base_index = BaseLayer::ALL.iter().position(|l| *l == self.base_layer).unwrap_or(0);
        main_window.set_base_layer_index(base_index as i32);
        main_window.set_attribution(self.base_layer.attribution().into());
        main_window.set_status_text(self.status.clone().into());
        main_window.set_hover_text(self.hovered_alert().map(hover_text).unwrap_or_default().into());
    }
}

fn hover_text(alert: &Alert) -> String {
    format!("{} · {} · {}", alert.title(), alert.severity, alert.areas())
}

/// Fetch every feed (and the base map if missing) and redraw
pub fn refresh(main_window: &MainWindow, session: &Rc<RefCell<MapSession>>, rt: &Runtime) {
    let (config, layer, needs_base) = {
        let session = session.borrow();
        let layer = session.base_layer();
        (session.config().clone(), layer, !session.has_basemap(layer))
    };

    main_window.set_loading(true);
    main_window.set_status_text(status::loading(config.mode).into());

    let (snapshot, base) = rt.block_on(async {
        tokio::join!(feeds::fetch_feeds(&config), async {
            if needs_base {
                Some(feeds::fetch_basemap(&config, layer).await)
            } else {
                None
            }
        })
    });

    let mut session = session.borrow_mut();
    if let Some(base) = base {
        session.set_basemap(layer, base);
    }
    session.apply_snapshot(snapshot, Local::now());
    session.present(main_window);
    main_window.set_loading(false);
}

pub fn setup_map_callbacks(main_window: &MainWindow, session: Rc<RefCell<MapSession>>, rt: Rc<Runtime>) {
    let window_weak = main_window.as_weak();
    let weather_session = session.clone();
    main_window.on_show_weather(move || {
        debug!("Weather button clicked");
        if let Some(window) = window_weak.upgrade() {
            let mut session = weather_session.borrow_mut();
            session.show_weather();
            session.present(&window);
        }
    });

    let window_weak = main_window.as_weak();
    let quakes_session = session.clone();
    main_window.on_show_quakes(move || {
        debug!("Earthquakes button clicked");
        if let Some(window) = window_weak.upgrade() {
            let mut session = quakes_session.borrow_mut();
            session.show_quakes();
            session.present(&window);
        }
    });

    let window_weak = main_window.as_weak();
    let overlay_session = session.clone();
    main_window.on_overlay_toggled(move |index, visible| {
        let Some(overlay) = usize::try_from(index).ok().and_then(|i| Overlay::ALL.get(i).copied()) else {
            warn!("Unknown overlay index {}", index);
            return;
        };
        debug!("Overlay {} switched {}", overlay.name(), if visible { "on" } else { "off" });
        if let Some(window) = window_weak.upgrade() {
            let mut session = overlay_session.borrow_mut();
            session.set_overlay(overlay, visible);
            session.present(&window);
        }
    });

    let window_weak = main_window.as_weak();
    let base_session = session.clone();
    let base_rt = rt.clone();
    main_window.on_base_layer_selected(move |index| {
        let Some(layer) = usize::try_from(index).ok().and_then(|i| BaseLayer::ALL.get(i).copied()) else {
            warn!("Unknown base layer index {}", index);
            return;
        };
        let Some(window) = window_weak.upgrade() else {
            return;
        };
        info!("Switching base layer to {}", layer.display_name());

        let needs_fetch = base_session.borrow_mut().select_base_layer(layer);
        if needs_fetch {
            let config = base_session.borrow().config().clone();
            window.set_loading(true);
            let image = base_rt.block_on(feeds::fetch_basemap(&config, layer));
            base_session.borrow_mut().set_basemap(layer, image);
            window.set_loading(false);
        }
        base_session.borrow().present(&window);
    });

    let window_weak = main_window.as_weak();
    let hover_session = session.clone();
    main_window.on_map_hovered(move |fx, fy| {
        if let Some(window) = window_weak.upgrade() {
            let mut session = hover_session.borrow_mut();
            if session.hover(fx as f64, fy as f64) {
                session.present(&window);
            }
        }
    });

    let window_weak = main_window.as_weak();
    main_window.on_refresh(move || {
        info!("Refreshing feeds");
        if let Some(window) = window_weak.upgrade() {
            refresh(&window, &session, &rt);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::config::MapMode;
    use chrono::TimeZone;
    use image::Rgba;

    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

    fn config(mode: MapMode) -> MapConfig {
        MapConfig {
            mode,
            center: Some((0.0, 0.0)),
            zoom: Some(3),
            width: 64,
            height: 64,
            ..MapConfig::default()
        }
    }

    fn noon() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 6, 12, 0, 0).single().unwrap()
    }

    fn alerts() -> Vec<Alert> {
        nws_alerts::parse_alerts(
            r#"{"type":"FeatureCollection","features":[{"type":"Feature",
            "geometry":{"type":"Polygon","coordinates":[[[-30.0,-30.0],[30.0,-30.0],[30.0,30.0],[-30.0,30.0],[-30.0,-30.0]]]},
            "properties":{"severity":"Minor"}}]}"#,
        )
        .unwrap()
    }

    fn quakes() -> Vec<Quake> {
        usgs_quakes::parse_quakes(
            r#"{"type":"FeatureCollection","features":[{"type":"Feature","id":"q1",
            "geometry":{"type":"Point","coordinates":[0.0,0.0,10.0]},
            "properties":{"mag":5.5,"place":"Null Island","time":1715000000000}}]}"#,
        )
        .unwrap()
    }

    fn loaded_session(mode: MapMode) -> MapSession {
        let mut session = MapSession::new(config(mode));
        session.set_basemap(BaseLayer::Positron, Ok(RgbaImage::from_pixel(64, 64, WHITE)));
        session.apply_snapshot(
            FeedSnapshot {
                alerts: mode.wants_alerts().then(|| Ok(alerts())),
                quakes: mode.wants_quakes().then(|| Ok(quakes())),
                radar: None,
            },
            noon(),
        );
        session
    }

    #[test]
    fn test_combined_map_starts_on_weather() {
        let session = MapSession::new(config(MapMode::Combined));
        assert_eq!(session.controller().active(), Some(ToggleMode::Weather));
        assert!(session.controller().is_visible(Overlay::Alerts));
        assert!(!session.controller().is_visible(Overlay::Earthquakes));
        assert_eq!(session.legend(), LegendKind::Severity);
        assert_eq!(session.status(), status::loading(MapMode::Combined));
    }

    #[test]
    fn test_earthquake_map_shows_magnitude_legend() {
        let session = MapSession::new(config(MapMode::Earthquakes));
        assert_eq!(session.controller().active(), None);
        assert!(session.controller().is_visible(Overlay::Earthquakes));
        assert_eq!(session.legend(), LegendKind::Magnitude);
    }

    #[test]
    fn test_toggle_changes_rendered_overlays() {
        let mut session = loaded_session(MapMode::Combined);
        assert_eq!(session.status(), status::TOGGLE_HINT);

        // Center pixel: inside the alert polygon and under the quake marker
        let weather = *session.render().unwrap().get_pixel(32, 32);
        assert_ne!(weather, WHITE);

        session.show_quakes();
        assert_eq!(session.legend(), LegendKind::Magnitude);
        let quakes_view = session.render().unwrap();
        assert_ne!(*quakes_view.get_pixel(32, 32), weather);
        // Corner is inside the alert but outside the marker
        assert_eq!(*quakes_view.get_pixel(2, 2), WHITE);

        session.set_overlay(Overlay::Alerts, true);
        assert_eq!(session.legend(), LegendKind::Severity);
        assert_ne!(*session.render().unwrap().get_pixel(2, 2), WHITE);
    }

    #[test]
    fn test_failed_feed_leaves_overlay_empty() {
        let mut session = loaded_session(MapMode::Combined);
        session.apply_snapshot(
            FeedSnapshot {
                alerts: Some(Err(anyhow::anyhow!("HTTP 500"))),
                quakes: Some(Ok(quakes())),
                radar: Some(Err(anyhow::anyhow!("timeout"))),
            },
            noon(),
        );

        assert!(session.alerts().is_empty());
        assert_eq!(session.quakes().len(), 1);
        assert_eq!(session.status(), format!("{} {}", status::ALERTS_FAILED, status::TOGGLE_HINT));
        assert_eq!(*session.render().unwrap().get_pixel(2, 2), WHITE);
    }

    #[test]
    fn test_weather_map_status() {
        let session = loaded_session(MapMode::Weather);
        assert_eq!(session.status(), "Active alerts: 1");
        assert!(session.quakes().is_empty());
    }

    #[test]
    fn test_base_layer_fallback_and_switch() {
        let mut session = MapSession::new(config(MapMode::Combined));
        assert!(!session.has_basemap(BaseLayer::Positron));
        assert_eq!(*session.render().unwrap().get_pixel(0, 0), BaseLayer::Positron.background());

        assert!(session.select_base_layer(BaseLayer::DarkMatter));
        session.set_basemap(BaseLayer::DarkMatter, Err(anyhow::anyhow!("offline")));
        assert!(!session.has_basemap(BaseLayer::DarkMatter));
        assert_eq!(*session.render().unwrap().get_pixel(0, 0), BaseLayer::DarkMatter.background());

        // Still missing, so selecting it again fetches again
        assert!(session.select_base_layer(BaseLayer::DarkMatter));
        session.set_basemap(BaseLayer::DarkMatter, Ok(RgbaImage::from_pixel(64, 64, WHITE)));
        assert!(session.has_basemap(BaseLayer::DarkMatter));
        assert!(!session.select_base_layer(BaseLayer::DarkMatter));
        assert_eq!(*session.render().unwrap().get_pixel(0, 0), WHITE);
    }

    #[test]
    fn test_hover_highlights_alert() {
        let mut session = loaded_session(MapMode::Combined);
        let plain = *session.render().unwrap().get_pixel(4, 4);

        assert!(session.hover(0.0625, 0.0625));
        assert_eq!(session.hovered_alert().map(|a| a.severity), Some(nws_alerts::Severity::Minor));
        let highlighted = *session.render().unwrap().get_pixel(4, 4);
        assert!(highlighted[0] < plain[0]);

        // Same alert again is not a change
        assert!(!session.hover(0.1, 0.1));
        assert!(session.hover(-1.0, -1.0));
        assert!(session.hovered_alert().is_none());
        assert!(session.hover(0.0625, 0.0625));

        // Hiding alerts drops the highlight
        session.show_quakes();
        assert!(session.hovered_alert().is_none());
        assert!(!session.hover(0.0625, 0.0625));
    }

    #[test]
    fn test_hover_without_alerts() {
        let mut session = loaded_session(MapMode::Combined);
        session.set_overlay(Overlay::Alerts, false);
        assert!(!session.hover(0.5, 0.5));

        session.set_overlay(Overlay::Alerts, true);
        assert!(session.hover(0.5, 0.5));
        assert!(session.hovered_alert().is_some());
        session.apply_snapshot(
            FeedSnapshot {
                alerts: Some(Ok(Vec::new())),
                quakes: Some(Ok(quakes())),
                radar: None,
            },
            noon(),
        );
        assert!(session.hovered_alert().is_none());
        assert!(!session.hover(0.5, 0.5));
    }
}
