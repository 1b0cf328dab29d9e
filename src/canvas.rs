//! Map canvas accumulating layers across the dashboard sections.
//!
//! A [`Canvas`] is append-only: sections add markers and polylines, fit the
//! view to everything added so far, and hand an immutable [`RenderableMap`]
//! snapshot to the renderer. Coordinates are latitude-first throughout.

use serde::Serialize;

/// A map coordinate, latitude first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Arithmetic mean of `points`, or `None` when there are none.
    pub fn mean(points: &[LatLon]) -> Option<LatLon> {
        if points.is_empty() {
            return None;
        }
        let n = points.len() as f64;
        let (lat, lon) = points
            .iter()
            .fold((0.0, 0.0), |(lat, lon), p| (lat + p.lat, lon + p.lon));
        Some(LatLon::new(lat / n, lon / n))
    }
}

/// Rectangular visible extent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub south_west: LatLon,
    pub north_east: LatLon,
}

impl Bounds {
    /// Tightest bounds containing every point, or `None` for no points.
    pub fn around(points: impl IntoIterator<Item = LatLon>) -> Option<Bounds> {
        points.into_iter().fold(None, |bounds, p| {
            Some(match bounds {
                None => Bounds {
                    south_west: p,
                    north_east: p,
                },
                Some(b) => Bounds {
                    south_west: LatLon::new(
                        b.south_west.lat.min(p.lat),
                        b.south_west.lon.min(p.lon),
                    ),
                    north_east: LatLon::new(
                        b.north_east.lat.max(p.lat),
                        b.north_east.lon.max(p.lon),
                    ),
                },
            })
        })
    }

    pub fn contains(&self, p: LatLon) -> bool {
        (self.south_west.lat..=self.north_east.lat).contains(&p.lat)
            && (self.south_west.lon..=self.north_east.lon).contains(&p.lon)
    }
}

/// Marker color and icon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarkerStyle {
    pub color: String,
    pub icon: String,
}

impl MarkerStyle {
    pub fn new(color: impl Into<String>, icon: impl Into<String>) -> Self {
        Self {
            color: color.into(),
            icon: icon.into(),
        }
    }

    /// Style for the sales center point.
    pub fn center_point() -> Self {
        Self::new("green", "info-sign")
    }

    /// Style for locations far from the center point.
    pub fn outlier() -> Self {
        Self::new("red", "triangle-exclamation")
    }
}

/// One visual element on the map.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Layer {
    Marker {
        position: LatLon,
        label: String,
        style: Option<MarkerStyle>,
    },
    Polyline {
        positions: Vec<LatLon>,
        label: String,
    },
}

impl Layer {
    fn points(&self) -> &[LatLon] {
        match self {
            Layer::Marker { position, .. } => std::slice::from_ref(position),
            Layer::Polyline { positions, .. } => positions,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Layer::Marker { label, .. } | Layer::Polyline { label, .. } => label,
        }
    }

    pub fn is_marker(&self) -> bool {
        matches!(self, Layer::Marker { .. })
    }
}

/// Immutable view of a canvas, handed to the renderer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderableMap {
    pub center: LatLon,
    pub zoom: u8,
    pub layers: Vec<Layer>,
    pub bounds: Option<Bounds>,
    /// Pixel padding `[x, y]` applied when fitting `bounds`.
    pub fit_padding: Option<[u32; 2]>,
}

impl RenderableMap {
    pub fn marker_count(&self) -> usize {
        self.layers.iter().filter(|l| l.is_marker()).count()
    }

    pub fn polyline_count(&self) -> usize {
        self.layers.len() - self.marker_count()
    }
}

/// The single mutable map of one dashboard pass.
#[derive(Debug, Clone)]
pub struct Canvas {
    center: LatLon,
    zoom: u8,
    layers: Vec<Layer>,
    bounds: Option<Bounds>,
    fit_padding: Option<[u32; 2]>,
}

impl Canvas {
    pub fn new(center: LatLon, zoom: u8) -> Self {
        Self {
            center,
            zoom,
            layers: Vec::new(),
            bounds: None,
            fit_padding: None,
        }
    }

    /// Creates a canvas centered on the mean of `points`.
    pub fn centered_on(points: &[LatLon], zoom: u8) -> Option<Self> {
        LatLon::mean(points).map(|center| Self::new(center, zoom))
    }

    pub fn add_marker(
        &mut self,
        position: LatLon,
        label: impl Into<String>,
        style: Option<MarkerStyle>,
    ) {
        self.layers.push(Layer::Marker {
            position,
            label: label.into(),
            style,
        });
    }

    pub fn add_polyline(&mut self, positions: Vec<LatLon>, label: impl Into<String>) {
        self.layers.push(Layer::Polyline {
            positions,
            label: label.into(),
        });
    }

    /// Fits the visible extent to every layer added so far.
    ///
    /// Recomputed from the layers on each call, so repeating it without new
    /// layers yields the same bounds. With no layers the bounds stay unset.
    pub fn fit_bounds(&mut self, padding: Option<[u32; 2]>) {
        self.bounds = Bounds::around(self.layers.iter().flat_map(|l| l.points().iter().copied()));
        self.fit_padding = padding;
    }

    /// Snapshot for rendering; the canvas keeps its layers.
    pub fn snapshot(&self) -> RenderableMap {
        RenderableMap {
            center: self.center,
            zoom: self.zoom,
            layers: self.layers.clone(),
            bounds: self.bounds,
            fit_padding: self.fit_padding,
        }
    }

    pub fn center(&self) -> LatLon {
        self.center
    }

    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn marker_count(&self) -> usize {
        self.layers.iter().filter(|l| l.is_marker()).count()
    }

    pub fn bounds(&self) -> Option<Bounds> {
        self.bounds
    }

    pub fn fit_padding(&self) -> Option<[u32; 2]> {
        self.fit_padding
    }
}
