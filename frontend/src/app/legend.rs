use nws_alerts::Severity;
use usgs_quakes::magnitude_color;

use crate::app::layers::{Overlay, OverlaySet};

/// Lower bounds of the closed magnitude bins; the last value opens the `6+` bin
const MAGNITUDE_BINS: [u32; 7] = [0, 1, 2, 3, 4, 5, 6];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegendKind {
    Severity,
    Magnitude,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LegendEntry {
    pub label: String,
    pub color: &'static str,
}

/// Magnitude legend when only earthquakes (among alerts/earthquakes) are shown,
/// severity legend for every other combination
pub fn select_legend(visible: &OverlaySet) -> LegendKind {
    if visible.contains(Overlay::Earthquakes) && !visible.contains(Overlay::Alerts) {
        LegendKind::Magnitude
    } else {
        LegendKind::Severity
    }
}

/// Legend for a map offering `available`: a map without one of the two point
/// layers always shows the other's legend
pub fn legend_for(available: &OverlaySet, visible: &OverlaySet) -> LegendKind {
    if !available.contains(Overlay::Alerts) && available.contains(Overlay::Earthquakes) {
        LegendKind::Magnitude
    } else if !available.contains(Overlay::Earthquakes) {
        LegendKind::Severity
    } else {
        select_legend(visible)
    }
}

impl LegendKind {
    pub fn title(&self) -> &'static str {
        match self {
            LegendKind::Severity => "NWS Alert Severity",
            LegendKind::Magnitude => "Magnitude",
        }
    }

    pub fn entries(&self) -> Vec<LegendEntry> {
        match self {
            LegendKind::Severity => Severity::ORDER
                .iter()
                .map(|severity| LegendEntry {
                    label: severity.label().to_string(),
                    color: severity.color(),
                })
                .collect(),
            LegendKind::Magnitude => {
                let mut entries: Vec<LegendEntry> = MAGNITUDE_BINS
                    .windows(2)
                    .map(|bin| LegendEntry {
                        label: format!("{}–{}", bin[0], bin[1]),
                        color: magnitude_color(bin[0] as f64 + 0.01),
                    })
                    .collect();
                entries.push(LegendEntry {
                    label: "6+".to_string(),
                    color: magnitude_color(6.5),
                });
                entries
            }
        }
    }
}
