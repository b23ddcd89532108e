use crate::app::legend::{legend_for, LegendKind};

/// Toggleable layers drawn above the base map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Overlay {
    Alerts,
    Radar,
    Earthquakes,
}

impl Overlay {
    pub const ALL: [Overlay; 3] = [Overlay::Alerts, Overlay::Radar, Overlay::Earthquakes];

    fn bit(self) -> u8 {
        match self {
            Overlay::Alerts => 0b001,
            Overlay::Radar => 0b010,
            Overlay::Earthquakes => 0b100,
        }
    }

    /// Label shown in the layer control
    pub fn name(&self) -> &'static str {
        match self {
            Overlay::Alerts => "NWS Alerts",
            Overlay::Radar => "NEXRAD Radar (WMS)",
            Overlay::Earthquakes => "Earthquakes",
        }
    }
}

/// Explicit set of overlays currently on the map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OverlaySet(u8);

impl OverlaySet {
    pub const fn empty() -> Self {
        OverlaySet(0)
    }

    pub fn of(overlays: &[Overlay]) -> Self {
        let mut set = Self::empty();
        for &overlay in overlays {
            set.insert(overlay);
        }
        set
    }

    pub fn contains(&self, overlay: Overlay) -> bool {
        self.0 & overlay.bit() != 0
    }

    /// Returns true if the overlay was not already present
    pub fn insert(&mut self, overlay: Overlay) -> bool {
        let added = !self.contains(overlay);
        self.0 |= overlay.bit();
        added
    }

    /// Returns true if the overlay was present
    pub fn remove(&mut self, overlay: Overlay) -> bool {
        let removed = self.contains(overlay);
        self.0 &= !overlay.bit();
        removed
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Overlay> + '_ {
        Overlay::ALL.into_iter().filter(move |o| self.contains(*o))
    }
}

/// Which button of the toggle control is highlighted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleMode {
    Weather,
    Quakes,
}

/// Layer add/remove notification, as the map would emit it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerEvent {
    Added(Overlay),
    Removed(Overlay),
}

/// Tracks overlay visibility and picks the legend after every layer event.
///
/// `show_weather` and `show_quakes` keep earthquakes and the weather overlays
/// mutually exclusive. Individual switches through `set_overlay` may produce
/// any combination, which the legend policy handles as well.
#[derive(Debug, Clone)]
pub struct LayerController {
    available: OverlaySet,
    visible: OverlaySet,
    active: Option<ToggleMode>,
    legend: LegendKind,
}

impl LayerController {
    /// `available` limits which overlays this map offers at all
    pub fn new(available: OverlaySet) -> Self {
        let visible = OverlaySet::empty();
        Self {
            available,
            visible,
            active: None,
            legend: legend_for(&available, &visible),
        }
    }

    pub fn show_weather(&mut self) -> Vec<LayerEvent> {
        self.active = Some(ToggleMode::Weather);
        [
            self.add(Overlay::Alerts),
            self.add(Overlay::Radar),
            self.remove(Overlay::Earthquakes),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    pub fn show_quakes(&mut self) -> Vec<LayerEvent> {
        self.active = Some(ToggleMode::Quakes);
        [
            self.add(Overlay::Earthquakes),
            self.remove(Overlay::Alerts),
            self.remove(Overlay::Radar),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Show every overlay the map offers, used for single-purpose maps
    pub fn show_all(&mut self) -> Vec<LayerEvent> {
        Overlay::ALL.into_iter().filter_map(|o| self.add(o)).collect()
    }

    /// Layer-control switch for a single overlay. Leaves the active toggle alone.
    pub fn set_overlay(&mut self, overlay: Overlay, visible: bool) -> Option<LayerEvent> {
        if visible {
            self.add(overlay)
        } else {
            self.remove(overlay)
        }
    }

    pub fn visible(&self) -> OverlaySet {
        self.visible
    }

    pub fn is_visible(&self, overlay: Overlay) -> bool {
        self.visible.contains(overlay)
    }

    pub fn available(&self) -> OverlaySet {
        self.available
    }

    pub fn active(&self) -> Option<ToggleMode> {
        self.active
    }

    pub fn legend(&self) -> LegendKind {
        self.legend
    }

    fn add(&mut self, overlay: Overlay) -> Option<LayerEvent> {
        if !self.available.contains(overlay) || !self.visible.insert(overlay) {
            return None;
        }
        Some(self.notify(LayerEvent::Added(overlay)))
    }

    fn remove(&mut self, overlay: Overlay) -> Option<LayerEvent> {
        if !self.visible.remove(overlay) {
            return None;
        }
        Some(self.notify(LayerEvent::Removed(overlay)))
    }

    fn notify(&mut self, event: LayerEvent) -> LayerEvent {
        debug!("Layer event: {:?}", event);
        let legend = legend_for(&self.available, &self.visible);
        if legend != self.legend {
            info!("Legend switched to {:?}", legend);
            self.legend = legend;
        }
        event
    }
}
