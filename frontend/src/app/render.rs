use anyhow::{anyhow, Result};
use basemap::Viewport;
use geo::{Contains, LineString, Point, Polygon as GeoPolygon};
use image::{DynamicImage, RgbImage, RgbaImage};
use nws_alerts::Alert;
use plotters::coord::Shift;
use plotters::prelude::*;
use usgs_quakes::Quake;

use crate::app::layers::{Overlay, OverlaySet};
use crate::app::utils::parse_hex_color;

const FALLBACK_RGB: [u8; 3] = [148, 163, 184];

type Canvas<'a> = DrawingArea<BitMapBackend<'a>, Shift>;

/// Everything needed to draw one frame of the map
pub struct Scene<'a> {
    pub viewport: &'a Viewport,
    pub base: &'a RgbaImage,
    pub radar: Option<&'a RgbaImage>,
    pub radar_opacity: f32,
    pub alerts: &'a [Alert],
    pub quakes: &'a [Quake],
    pub visible: OverlaySet,
    /// Index into `alerts` drawn with the highlight style
    pub highlighted: Option<usize>,
}

/// Base map, then radar, alert polygons and earthquake markers for the
/// overlays in `scene.visible`
pub fn compose(scene: &Scene) -> Result<RgbaImage> {
    let (width, height) = scene.base.dimensions();
    let mut buffer = DynamicImage::ImageRgba8(scene.base.clone()).to_rgb8().into_raw();

    {
        let root = BitMapBackend::with_buffer(&mut buffer, (width, height)).into_drawing_area();

        if scene.visible.contains(Overlay::Radar) {
            match scene.radar {
                Some(radar) if radar.dimensions() == (width, height) => {
                    draw_radar(&root, radar, scene.radar_opacity)?;
                }
                Some(radar) => warn!(
                    "Radar image is {:?} but map is {:?}, skipping",
                    radar.dimensions(),
                    (width, height)
                ),
                None => {}
            }
        }

        if scene.visible.contains(Overlay::Alerts) {
            for (index, alert) in scene.alerts.iter().enumerate() {
                draw_alert(&root, scene.viewport, alert, scene.highlighted == Some(index))?;
            }
        }

        if scene.visible.contains(Overlay::Earthquakes) {
            // Largest first so small events stay on top
            let mut quakes: Vec<&Quake> = scene.quakes.iter().collect();
            quakes.sort_by(|a, b| b.radius().total_cmp(&a.radius()));
            for quake in quakes {
                draw_quake(&root, scene.viewport, quake)?;
            }
        }

        root.present()?;
    }

    let rgb = RgbImage::from_raw(width, height, buffer)
        .ok_or_else(|| anyhow!("Map buffer does not hold {}x{} pixels", width, height))?;
    Ok(DynamicImage::ImageRgb8(rgb).to_rgba8())
}

/// Topmost alert with a polygon under the viewport pixel (x, y)
pub fn alert_at(viewport: &Viewport, alerts: &[Alert], x: f64, y: f64) -> Option<usize> {
    let point = Point::new(x, y);
    alerts.iter().rposition(|alert| {
        alert.rings.iter().any(|ring| {
            let outline = LineString::from(viewport.project_ring(ring));
            GeoPolygon::new(outline, vec![]).contains(&point)
        })
    })
}

fn rgb(hex: &str) -> RGBColor {
    let [r, g, b] = parse_hex_color(hex).unwrap_or(FALLBACK_RGB);
    RGBColor(r, g, b)
}

fn draw_radar(root: &Canvas, radar: &RgbaImage, opacity: f32) -> Result<()> {
    for (x, y, pixel) in radar.enumerate_pixels() {
        let alpha = pixel[3] as f64 / 255.0 * opacity as f64;
        if alpha > 0.0 {
            root.draw_pixel((x as i32, y as i32), &RGBColor(pixel[0], pixel[1], pixel[2]).mix(alpha))?;
        }
    }
    Ok(())
}

fn draw_alert(root: &Canvas, viewport: &Viewport, alert: &Alert, highlighted: bool) -> Result<()> {
    let style = if highlighted { alert.style().highlighted() } else { alert.style() };
    let color = rgb(style.color);
    let (width, height) = root.dim_in_pixel();

    for ring in &alert.rings {
        let points: Vec<(i32, i32)> = viewport
            .project_ring(ring)
            .into_iter()
            .map(|(x, y)| (x.round() as i32, y.round() as i32))
            .collect();
        if points.len() < 3 || !touches_canvas(&points, width as i32, height as i32) {
            continue;
        }

        root.draw(&Polygon::new(points.clone(), color.mix(style.fill_opacity as f64).filled()))?;

        let mut outline = points;
        outline.push(outline[0]);
        root.draw(&PathElement::new(
            outline,
            color.mix(style.opacity as f64).stroke_width(style.weight.round() as u32),
        ))?;
    }
    Ok(())
}

fn touches_canvas(points: &[(i32, i32)], width: i32, height: i32) -> bool {
    let (min_x, max_x) = points.iter().fold((i32::MAX, i32::MIN), |(lo, hi), &(x, _)| (lo.min(x), hi.max(x)));
    let (min_y, max_y) = points.iter().fold((i32::MAX, i32::MIN), |(lo, hi), &(_, y)| (lo.min(y), hi.max(y)));
    max_x >= 0 && min_x < width && max_y >= 0 && min_y < height
}

fn draw_quake(root: &Canvas, viewport: &Viewport, quake: &Quake) -> Result<()> {
    let marker = quake.marker();
    let color = rgb(marker.color);
    let (x, y) = viewport.project(quake.lat, quake.lon);
    let center = (x.round() as i32, y.round() as i32);
    let radius = marker.radius.round() as i32;

    root.draw(&Circle::new(center, radius, color.mix(marker.fill_opacity as f64).filled()))?;
    root.draw(&Circle::new(center, radius, color.stroke_width(marker.weight.round() as u32)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

    fn viewport() -> Viewport {
        Viewport::new(0.0, 0.0, 3, 256, 256)
    }

    fn quake(lat: f64, lon: f64, magnitude: f64) -> Quake {
        Quake {
            id: None,
            magnitude: Some(magnitude),
            place: "Test".to_string(),
            time: None,
            url: usgs_quakes::FALLBACK_URL.to_string(),
            lon,
            lat,
            depth_km: None,
        }
    }

    fn square_alert(severity: &str, half: f64) -> Alert {
        let json = format!(
            r#"{{"type":"FeatureCollection","features":[{{"type":"Feature",
            "geometry":{{"type":"Polygon","coordinates":[[[-{h},-{h}],[{h},-{h}],[{h},{h}],[-{h},{h}],[-{h},-{h}]]]}},
            "properties":{{"severity":"{}"}}}}]}}"#,
            severity,
            h = half
        );
        nws_alerts::parse_alerts(&json).unwrap().remove(0)
    }

    fn scene<'a>(viewport: &'a Viewport, base: &'a RgbaImage, alerts: &'a [Alert], quakes: &'a [Quake], visible: OverlaySet) -> Scene<'a> {
        Scene {
            viewport,
            base,
            radar: None,
            radar_opacity: 0.7,
            alerts,
            quakes,
            visible,
            highlighted: None,
        }
    }

    fn close(actual: &Rgba<u8>, expected: [u8; 3]) -> bool {
        (0..3).all(|c| (actual[c] as i32 - expected[c] as i32).abs() <= 3)
    }

    #[test]
    fn test_hidden_overlays_are_not_drawn() {
        let viewport = viewport();
        let base = RgbaImage::from_pixel(256, 256, WHITE);
        let alerts = vec![square_alert("Extreme", 10.0)];
        let quakes = vec![quake(0.0, 0.0, 5.0)];

        let out = compose(&scene(&viewport, &base, &alerts, &quakes, OverlaySet::empty())).unwrap();
        assert_eq!(out, base);
    }

    #[test]
    fn test_quake_marker_drawn_at_location() {
        let viewport = viewport();
        let base = RgbaImage::from_pixel(256, 256, WHITE);
        let quakes = vec![quake(0.0, 0.0, 5.0)];

        let out = compose(&scene(&viewport, &base, &[], &quakes, OverlaySet::of(&[Overlay::Earthquakes]))).unwrap();

        // #ef4444 at 0.7 over white
        let center = out.get_pixel(128, 128);
        assert!(close(center, [244, 124, 124]), "center {:?}", center);
        // Radius for M5 is 18px; well outside stays white
        assert_eq!(*out.get_pixel(128, 160), WHITE);
        assert_eq!(*out.get_pixel(5, 5), WHITE);
    }

    #[test]
    fn test_alert_polygon_fill_and_outline() {
        let viewport = viewport();
        let base = RgbaImage::from_pixel(256, 256, WHITE);
        let alerts = vec![square_alert("Minor", 10.0)];

        let out = compose(&scene(&viewport, &base, &alerts, &[], OverlaySet::of(&[Overlay::Alerts]))).unwrap();

        // #22c55e at 0.15 over white
        let inside = out.get_pixel(128, 128);
        assert!(close(inside, [222, 246, 231]), "inside {:?}", inside);

        // Middle of the top edge carries the full stroke color
        let ring = viewport.project_ring(&alerts[0].rings[0]);
        let top = ring[2].1.round() as u32;
        let edge = out.get_pixel(128, top);
        assert!(edge[0] < 100 && edge[1] > 150, "edge {:?}", edge);

        assert_eq!(*out.get_pixel(2, 2), WHITE);
    }

    #[test]
    fn test_highlighted_alert_is_stronger() {
        let viewport = viewport();
        let base = RgbaImage::from_pixel(256, 256, WHITE);
        let alerts = vec![square_alert("Minor", 10.0)];

        let mut frame = scene(&viewport, &base, &alerts, &[], OverlaySet::of(&[Overlay::Alerts]));
        let normal = *compose(&frame).unwrap().get_pixel(128, 128);
        frame.highlighted = Some(0);
        let highlighted = *compose(&frame).unwrap().get_pixel(128, 128);

        // #22c55e at 0.25 over white
        assert!(close(&highlighted, [200, 241, 215]), "highlighted {:?}", highlighted);
        assert!(highlighted[0] < normal[0]);
    }

    #[test]
    fn test_radar_opacity() {
        let viewport = viewport();
        let base = RgbaImage::from_pixel(256, 256, WHITE);
        let mut radar = RgbaImage::new(256, 256);
        radar.put_pixel(10, 10, Rgba([255, 0, 0, 255]));

        let mut frame = scene(&viewport, &base, &[], &[], OverlaySet::of(&[Overlay::Radar]));
        frame.radar = Some(&radar);
        frame.radar_opacity = 0.5;

        let out = compose(&frame).unwrap();
        let pixel = out.get_pixel(10, 10);
        assert!(close(pixel, [255, 128, 128]), "radar {:?}", pixel);
        // Transparent radar pixels leave the base alone
        assert_eq!(*out.get_pixel(11, 10), WHITE);
    }

    #[test]
    fn test_mismatched_radar_is_skipped() {
        let viewport = viewport();
        let base = RgbaImage::from_pixel(256, 256, WHITE);
        let radar = RgbaImage::from_pixel(16, 16, Rgba([255, 0, 0, 255]));

        let mut frame = scene(&viewport, &base, &[], &[], OverlaySet::of(&[Overlay::Radar]));
        frame.radar = Some(&radar);
        assert_eq!(compose(&frame).unwrap(), base);
    }

    #[test]
    fn test_offscreen_shapes_leave_canvas_alone() {
        let viewport = Viewport::new(0.0, 0.0, 3, 8, 8);
        let base = RgbaImage::from_pixel(8, 8, WHITE);
        let far = nws_alerts::parse_alerts(
            r#"{"type":"FeatureCollection","features":[{"type":"Feature","properties":{},
            "geometry":{"type":"Polygon","coordinates":[[[60.0,40.0],[70.0,40.0],[70.0,50.0],[60.0,40.0]]]}}]}"#,
        )
        .unwrap();
        let quakes = vec![quake(-40.0, -120.0, 4.0)];

        let out = compose(&scene(&viewport, &base, &far, &quakes, OverlaySet::of(&Overlay::ALL))).unwrap();
        assert!(out.pixels().all(|p| *p == WHITE));
    }

    #[test]
    fn test_alert_hit_testing() {
        let viewport = viewport();
        let alerts = vec![square_alert("Minor", 20.0), square_alert("Extreme", 5.0)];

        // Later alerts are drawn on top and win
        assert_eq!(alert_at(&viewport, &alerts, 128.0, 128.0), Some(1));
        let ring = viewport.project_ring(&alerts[0].rings[0]);
        let inner_only = ring[0].0 + 4.0;
        assert_eq!(alert_at(&viewport, &alerts, inner_only, 128.0), Some(0));
        assert_eq!(alert_at(&viewport, &alerts, 1.0, 1.0), None);
    }
}
