use rollum_shared::{LatLng, MIN_ROUTE_POINTS};
use thiserror::Error;

use crate::surface::{
    DRAFT_LINE, DRAFT_MARKER_COLOR, MapSurface, MarkerId, MarkerSpec, SurfaceError, remove_line,
    upsert_line,
};

/// Reserved key for the in-progress line; persisted routes use `route-{id}`.
pub const DRAFT_LAYER_ID: &str = "draft-route";

const DRAFT_MARKER_SCALE: f64 = 0.7;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DrawError {
    #[error("route must contain at least 2 points")]
    TooFewPoints { have: usize },
}

/// A validated draft, ready for the route form.
#[derive(Debug, Clone, PartialEq)]
pub struct FinishedRoute {
    pub points: Vec<LatLng>,
    pub start: LatLng,
    pub end: LatLng,
}

/// Route vertices collected in `DrawRoute` mode.
///
/// `points` and `markers` always have the same length: a point is only kept once its
/// marker exists, and both are cleared together.
#[derive(Debug, Default)]
pub struct DrawingSession {
    points: Vec<LatLng>,
    markers: Vec<MarkerId>,
    line_drawn: bool,
}

impl DrawingSession {
    pub fn add_point(&mut self, surface: &mut dyn MapSurface, at: LatLng) -> Result<(), SurfaceError> {
        let marker = surface.add_marker(MarkerSpec {
            at,
            color: DRAFT_MARKER_COLOR,
            scale: DRAFT_MARKER_SCALE,
            popup: None,
        })?;
        self.points.push(at);
        self.markers.push(marker);

        if self.points.len() >= MIN_ROUTE_POINTS {
            if let Err(e) = upsert_line(surface, DRAFT_LAYER_ID, &self.points, &DRAFT_LINE) {
                tracing::warn!(points = self.points.len(), error = %e, "failed to redraw draft line");
                self.line_drawn = false;
            } else {
                self.line_drawn = true;
            }
        }
        Ok(())
    }

    pub fn clear(&mut self, surface: &mut dyn MapSurface) {
        for marker in self.markers.drain(..) {
            surface.remove_marker(marker);
        }
        self.points.clear();
        remove_line(surface, DRAFT_LAYER_ID);
        self.line_drawn = false;
    }

    /// Drop all state without touching a surface that is already gone.
    pub fn forget(&mut self) {
        self.points.clear();
        self.markers.clear();
        self.line_drawn = false;
    }

    /// Leaves the session untouched on error so the user can keep adding points.
    pub fn finish(&self) -> Result<FinishedRoute, DrawError> {
        let too_few = DrawError::TooFewPoints {
            have: self.points.len(),
        };
        if self.points.len() < MIN_ROUTE_POINTS {
            return Err(too_few);
        }
        match (self.points.first(), self.points.last()) {
            (Some(start), Some(end)) => Ok(FinishedRoute {
                points: self.points.clone(),
                start: *start,
                end: *end,
            }),
            _ => Err(too_few),
        }
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn points(&self) -> &[LatLng] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn has_line(&self) -> bool {
        self.line_drawn
    }
}

#[cfg(test)]
mod tests {
    use rollum_shared::LatLng;

    use super::{DRAFT_LAYER_ID, DrawError, DrawingSession};
    use crate::surface::testing::RecordingSurface;
    use crate::surface::{DRAFT_LINE, DRAFT_MARKER_COLOR};

    fn path() -> [LatLng; 3] {
        [
            LatLng::new(55.70, 37.60),
            LatLng::new(55.71, 37.61),
            LatLng::new(55.72, 37.62),
        ]
    }

    #[test]
    fn single_point_has_marker_but_no_line() {
        let mut surface = RecordingSurface::default();
        let mut session = DrawingSession::default();
        session.add_point(&mut surface, path()[0]).unwrap();

        let state = surface.state.borrow();
        assert_eq!(state.markers.len(), 1);
        assert_eq!(state.markers.values().next().unwrap().color, DRAFT_MARKER_COLOR);
        assert!(!state.layers.contains_key(DRAFT_LAYER_ID));
        assert!(!session.has_line());
    }

    #[test]
    fn line_tracks_accumulated_points_in_order() {
        let mut surface = RecordingSurface::default();
        let mut session = DrawingSession::default();
        let points = path();
        for (i, point) in points.iter().enumerate() {
            session.add_point(&mut surface, *point).unwrap();
            if i >= 1 {
                let state = surface.state.borrow();
                assert_eq!(state.sources[DRAFT_LAYER_ID], points[..=i].to_vec());
                assert_eq!(state.layers[DRAFT_LAYER_ID], DRAFT_LINE);
                assert_eq!(state.layers.len(), 1);
            }
        }
        assert_eq!(session.len(), session.marker_count());
    }

    #[test]
    fn finish_rejects_short_sessions_without_clearing() {
        let mut surface = RecordingSurface::default();
        let mut session = DrawingSession::default();
        assert_eq!(session.finish(), Err(DrawError::TooFewPoints { have: 0 }));

        session.add_point(&mut surface, path()[0]).unwrap();
        let err = session.finish().unwrap_err();
        assert_eq!(err.to_string(), "route must contain at least 2 points");
        assert_eq!(session.points(), &path()[..1]);
        assert_eq!(surface.state.borrow().markers.len(), 1);
    }

    #[test]
    fn finish_exposes_start_and_end() {
        let mut surface = RecordingSurface::default();
        let mut session = DrawingSession::default();
        for point in path() {
            session.add_point(&mut surface, point).unwrap();
        }
        let finished = session.finish().unwrap();
        assert_eq!(finished.start, LatLng::new(55.70, 37.60));
        assert_eq!(finished.end, LatLng::new(55.72, 37.62));
        assert_eq!(finished.points, path().to_vec());
        assert_eq!(surface.state.borrow().sources[DRAFT_LAYER_ID].len(), 3);
    }

    #[test]
    fn clear_removes_markers_and_line() {
        let mut surface = RecordingSurface::default();
        let mut session = DrawingSession::default();
        for point in path() {
            session.add_point(&mut surface, point).unwrap();
        }
        session.clear(&mut surface);

        let state = surface.state.borrow();
        assert!(state.markers.is_empty());
        assert!(!state.layers.contains_key(DRAFT_LAYER_ID));
        assert!(!state.sources.contains_key(DRAFT_LAYER_ID));
        assert!(session.is_empty());
        assert_eq!(session.marker_count(), 0);
    }

    #[test]
    fn clear_on_empty_session_is_harmless() {
        let mut surface = RecordingSurface::default();
        let mut session = DrawingSession::default();
        session.clear(&mut surface);
        assert!(session.is_empty());
        assert!(surface.state.borrow().markers.is_empty());
    }
}
