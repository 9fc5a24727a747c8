use std::fmt::Write as FmtWrite;

use rollum_shared::{Bounds, LatLng, Route, Spot};
use thiserror::Error;

pub type MarkerId = u64;

pub const SPOT_MARKER_COLOR: &str = "#3b82f6";
pub const DRAFT_MARKER_COLOR: &str = "#ef4444";

/// Persisted routes: solid blue.
pub const ROUTE_LINE: LineStyle = LineStyle {
    color: "#3b82f6",
    width: 4.0,
    opacity: 0.8,
    dash: None,
    interactive: true,
};

/// In-progress route: dashed red, so a draft never reads as a saved route.
pub const DRAFT_LINE: LineStyle = LineStyle {
    color: "#ef4444",
    width: 3.0,
    opacity: 0.9,
    dash: Some([2.0, 2.0]),
    interactive: false,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SurfaceError {
    #[error("map could not be created: {0}")]
    Construct(String),
    #[error("map rejected the operation: {0}")]
    Rejected(String),
}

/// Everything needed to construct a map surface.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceOptions {
    pub container_id: String,
    pub style: String,
    pub center: LatLng,
    pub zoom: f64,
    pub access_token: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineStyle {
    pub color: &'static str,
    pub width: f64,
    pub opacity: f64,
    pub dash: Option<[f64; 2]>,
    /// Reported in click and hover hit tests.
    pub interactive: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cursor {
    Default,
    Pointer,
    Crosshair,
}

impl Cursor {
    pub fn css(self) -> &'static str {
        match self {
            Cursor::Default => "",
            Cursor::Pointer => "pointer",
            Cursor::Crosshair => "crosshair",
        }
    }
}

/// Text shown in a spot or route popup.
#[derive(Debug, Clone, PartialEq)]
pub struct PopupContent {
    pub title: String,
    pub description: Option<String>,
    pub distance_km: Option<f64>,
    pub likes: u32,
    pub comments: u32,
}

const NO_DESCRIPTION: &str = "No description";

impl PopupContent {
    pub fn for_spot(spot: &Spot) -> Self {
        Self {
            title: spot.name.clone(),
            description: spot.description.clone(),
            distance_km: None,
            likes: spot.likes_count,
            comments: spot.comments_count,
        }
    }

    pub fn for_route(route: &Route) -> Self {
        Self {
            title: route.name.clone(),
            description: route.description.clone(),
            distance_km: route.distance_km(),
            likes: route.likes_count,
            comments: route.comments_count,
        }
    }

    pub fn to_html(&self) -> String {
        let mut html = String::with_capacity(256);
        html.push_str(r#"<div style="padding: 8px; max-width: 220px;">"#);
        let _ = write!(
            html,
            r#"<h3 style="margin: 0 0 6px 0; font-weight: 600;">{}</h3>"#,
            escape_html(&self.title)
        );
        let description = self
            .description
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or(NO_DESCRIPTION);
        let _ = write!(
            html,
            r#"<p style="margin: 0 0 6px 0; color: #666;">{}</p>"#,
            escape_html(description)
        );
        if let Some(km) = self.distance_km {
            let _ = write!(
                html,
                r#"<p style="margin: 0 0 6px 0; color: #666;">{km:.1} km</p>"#
            );
        }
        let _ = write!(
            html,
            r#"<div style="font-size: 12px; color: #888;">&#x2764; {} &middot; &#x1F4AC; {}</div>"#,
            self.likes, self.comments
        );
        html.push_str("</div>");
        html
    }
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarkerSpec {
    pub at: LatLng,
    pub color: &'static str,
    pub scale: f64,
    pub popup: Option<PopupContent>,
}

/// Camera animation. `ticket` comes back on the matching `CameraSettled` event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Flight {
    pub center: LatLng,
    pub zoom: f64,
    pub duration_ms: f64,
    pub ticket: Option<u64>,
}

/// Raw input from the rendering surface, delivered through one subscription per surface.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceEvent {
    Loaded,
    Failed(String),
    /// `layers` lists the rendered layer ids under the pointer.
    Click { at: LatLng, layers: Vec<String> },
    PointerMove { layers: Vec<String> },
    CameraSettled { ticket: Option<u64> },
}

/// Scene-graph operations the engine needs from a map renderer.
pub trait MapSurface {
    fn add_marker(&mut self, marker: MarkerSpec) -> Result<MarkerId, SurfaceError>;
    fn remove_marker(&mut self, id: MarkerId);
    /// Opens the marker's attached popup; a no-op when it is already open.
    fn open_marker_popup(&mut self, id: MarkerId) -> Result<(), SurfaceError>;
    fn show_popup(&mut self, at: LatLng, content: &PopupContent) -> Result<(), SurfaceError>;

    fn add_line_source(&mut self, id: &str, path: &[LatLng]) -> Result<(), SurfaceError>;
    fn add_line_layer(&mut self, id: &str, source: &str, style: &LineStyle)
    -> Result<(), SurfaceError>;
    fn has_layer(&self, id: &str) -> bool;
    fn has_source(&self, id: &str) -> bool;
    fn remove_layer(&mut self, id: &str);
    fn remove_source(&mut self, id: &str);

    fn set_cursor(&mut self, cursor: Cursor);
    fn fly_to(&mut self, flight: Flight) -> Result<(), SurfaceError>;
    fn fit_bounds(
        &mut self,
        bounds: Bounds,
        padding_px: f64,
        duration_ms: f64,
    ) -> Result<(), SurfaceError>;

    /// Release the surface, its primitives and every event subscription.
    fn destroy(&mut self);
}

pub trait SurfaceFactory {
    fn create(&mut self, options: &SurfaceOptions) -> Result<Box<dyn MapSurface>, SurfaceError>;
}

/// Replace the line keyed `id` (source and layer share the key).
pub fn upsert_line(
    surface: &mut dyn MapSurface,
    id: &str,
    path: &[LatLng],
    style: &LineStyle,
) -> Result<(), SurfaceError> {
    remove_line(surface, id);
    surface.add_line_source(id, path)?;
    if let Err(e) = surface.add_line_layer(id, id, style) {
        surface.remove_source(id);
        return Err(e);
    }
    Ok(())
}

pub fn remove_line(surface: &mut dyn MapSurface, id: &str) {
    if surface.has_layer(id) {
        surface.remove_layer(id);
    }
    if surface.has_source(id) {
        surface.remove_source(id);
    }
}


#[cfg(test)]
mod tests {
    use rollum_shared::LatLng;

    use super::testing::RecordingSurface;
    use super::{DRAFT_LINE, MapSurface, PopupContent, ROUTE_LINE, remove_line, upsert_line};

    #[test]
    fn popup_html_escapes_and_uses_placeholder() {
        let content = PopupContent {
            title: "<b>Park</b> & pier".into(),
            description: None,
            distance_km: Some(2.345),
            likes: 3,
            comments: 7,
        };
        let html = content.to_html();
        assert!(html.contains("&lt;b&gt;Park&lt;/b&gt; &amp; pier"));
        assert!(html.contains("No description"));
        assert!(html.contains("2.3 km"));
        assert!(html.contains("&#x2764; 3"));
        assert!(html.contains("&#x1F4AC; 7"));
    }

    #[test]
    fn blank_description_falls_back_to_placeholder() {
        let content = PopupContent {
            title: "Spot".into(),
            description: Some("   ".into()),
            distance_km: None,
            likes: 0,
            comments: 0,
        };
        assert!(content.to_html().contains("No description"));
    }

    #[test]
    fn upsert_line_replaces_instead_of_duplicating() {
        let mut surface = RecordingSurface::default();
        let first = [LatLng::new(1.0, 1.0), LatLng::new(2.0, 2.0)];
        let second = [LatLng::new(3.0, 3.0), LatLng::new(4.0, 4.0), LatLng::new(5.0, 5.0)];

        upsert_line(&mut surface, "route-a", &first, &ROUTE_LINE).unwrap();
        upsert_line(&mut surface, "route-a", &second, &DRAFT_LINE).unwrap();

        let state = surface.state.borrow();
        assert_eq!(state.sources.len(), 1);
        assert_eq!(state.layers.len(), 1);
        assert_eq!(state.sources["route-a"], second.to_vec());
        assert_eq!(state.layers["route-a"], DRAFT_LINE);
    }

    #[test]
    fn remove_line_is_a_noop_for_unknown_ids() {
        let mut surface = RecordingSurface::default();
        remove_line(&mut surface, "missing");
        assert!(!surface.has_layer("missing"));
        assert!(!surface.has_source("missing"));
    }
}
