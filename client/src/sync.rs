use std::collections::HashMap;

use rollum_shared::{LatLng, MIN_ROUTE_POINTS, Route, RoutePathError, Spot};

use crate::surface::{
    MapSurface, MarkerId, MarkerSpec, PopupContent, ROUTE_LINE, SPOT_MARKER_COLOR, remove_line,
    upsert_line,
};

const ROUTE_LAYER_PREFIX: &str = "route-";

/// Layer (and source) id for a persisted route.
pub fn route_layer_id(route_id: &str) -> String {
    format!("{ROUTE_LAYER_PREFIX}{route_id}")
}

#[derive(Debug, Clone)]
struct SpotMarker {
    spot_id: String,
    at: LatLng,
    marker: MarkerId,
}

/// Bookkeeping for the primitives that mirror the persisted spots and routes.
///
/// Spots are rebuilt wholesale on every sync. Routes are upserted by layer id and
/// layers whose route vanished from the snapshot are removed.
#[derive(Debug, Default)]
pub struct RenderSync {
    spot_markers: Vec<SpotMarker>,
    route_layers: HashMap<String, String>,
}

impl RenderSync {
    /// Returns the number of markers now on the map.
    pub fn sync_spots(&mut self, surface: &mut dyn MapSurface, spots: &[Spot]) -> usize {
        self.clear_spots(surface);
        for spot in spots {
            let Some(at) = spot.coordinate() else {
                tracing::warn!(
                    spot_id = %spot.id,
                    latitude = ?spot.latitude,
                    longitude = ?spot.longitude,
                    "skipping spot with malformed coordinate"
                );
                continue;
            };
            let marker = MarkerSpec {
                at,
                color: SPOT_MARKER_COLOR,
                scale: 1.0,
                popup: Some(PopupContent::for_spot(spot)),
            };
            match surface.add_marker(marker) {
                Ok(marker) => self.spot_markers.push(SpotMarker {
                    spot_id: spot.id.clone(),
                    at,
                    marker,
                }),
                Err(e) => tracing::warn!(spot_id = %spot.id, error = %e, "failed to add spot marker"),
            }
        }
        self.spot_markers.len()
    }

    fn clear_spots(&mut self, surface: &mut dyn MapSurface) {
        for entry in self.spot_markers.drain(..) {
            surface.remove_marker(entry.marker);
        }
    }

    /// Returns the number of route layers now on the map.
    pub fn sync_routes(&mut self, surface: &mut dyn MapSurface, routes: &[Route]) -> usize {
        let previous = std::mem::take(&mut self.route_layers);
        for route in routes {
            let layer_id = route_layer_id(&route.id);
            let points = match route.path() {
                Ok(points) if points.len() >= MIN_ROUTE_POINTS => points,
                Ok(points) => {
                    tracing::debug!(route_id = %route.id, points = points.len(), "route too short to draw");
                    continue;
                }
                Err(RoutePathError::Empty) => continue,
                Err(e) => {
                    tracing::warn!(route_id = %route.id, error = %e, "skipping route with unreadable points");
                    continue;
                }
            };
            if let Err(e) = upsert_line(surface, &layer_id, &points, &ROUTE_LINE) {
                tracing::warn!(route_id = %route.id, error = %e, "failed to draw route");
                continue;
            }
            self.route_layers.insert(layer_id, route.id.clone());
        }
        for stale in previous.keys() {
            if !self.route_layers.contains_key(stale) {
                remove_line(surface, stale);
            }
        }
        self.route_layers.len()
    }

    /// Drop bookkeeping for primitives that died with their surface.
    pub fn forget(&mut self) {
        self.spot_markers.clear();
        self.route_layers.clear();
    }

    /// First persisted route among the layers hit by a pointer event.
    pub fn route_at(&self, layers: &[String]) -> Option<&str> {
        layers
            .iter()
            .find_map(|layer| self.route_layers.get(layer))
            .map(String::as_str)
    }

    pub fn spot_marker(&self, spot_id: &str) -> Option<MarkerId> {
        self.spot_markers
            .iter()
            .find(|entry| entry.spot_id == spot_id)
            .map(|entry| entry.marker)
    }

    pub fn marker_near(&self, at: &LatLng, epsilon: f64) -> Option<MarkerId> {
        self.spot_markers
            .iter()
            .find(|entry| entry.at.approx_eq(at, epsilon))
            .map(|entry| entry.marker)
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn spot_marker_count(&self) -> usize {
        self.spot_markers.len()
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn route_layer_count(&self) -> usize {
        self.route_layers.len()
    }
}

#[cfg(test)]
mod tests {
    use rollum_shared::{LatLng, Route, RoutePath, Spot};
    use serde_json::json;

    use super::{RenderSync, route_layer_id};
    use crate::surface::ROUTE_LINE;
    use crate::surface::testing::RecordingSurface;

    fn spot(id: &str, lat: f64, lng: f64) -> Spot {
        serde_json::from_value(json!({
            "id": id,
            "name": format!("Spot {id}"),
            "latitude": lat,
            "longitude": lng,
            "likes_count": 2,
            "comments_count": 1,
        }))
        .unwrap()
    }

    fn route(id: &str, points: serde_json::Value) -> Route {
        serde_json::from_value(json!({
            "id": id,
            "name": format!("Route {id}"),
            "route_points": points,
        }))
        .unwrap()
    }

    #[test]
    fn one_marker_per_spot_with_popup() {
        let mut surface = RecordingSurface::default();
        let mut sync = RenderSync::default();
        let count = sync.sync_spots(&mut surface, &[spot("a", 55.75, 37.61), spot("b", 55.76, 37.62)]);
        assert_eq!(count, 2);

        let state = surface.state.borrow();
        assert_eq!(state.markers.len(), 2);
        let popup = state.markers.values().next().unwrap().popup.clone().unwrap();
        assert_eq!(popup.title, "Spot a");
        assert_eq!((popup.likes, popup.comments), (2, 1));
    }

    #[test]
    fn resync_with_same_spots_is_idempotent() {
        let mut surface = RecordingSurface::default();
        let mut sync = RenderSync::default();
        let spots = [spot("a", 55.75, 37.61), spot("b", 55.76, 37.62)];
        sync.sync_spots(&mut surface, &spots);
        sync.sync_spots(&mut surface, &spots);
        assert_eq!(surface.state.borrow().markers.len(), 2);
        assert_eq!(sync.spot_marker_count(), 2);
    }

    #[test]
    fn malformed_spot_coordinate_is_skipped() {
        let mut surface = RecordingSurface::default();
        let mut sync = RenderSync::default();
        let broken: Spot =
            serde_json::from_value(json!({"id": "x", "name": "x", "latitude": null, "longitude": 1.0}))
                .unwrap();
        let count = sync.sync_spots(&mut surface, &[broken, spot("ok", 1.0, 1.0)]);
        assert_eq!(count, 1);
        assert!(sync.spot_marker("x").is_none());
        assert!(sync.spot_marker("ok").is_some());
    }

    #[test]
    fn route_layer_keeps_point_order() {
        let mut surface = RecordingSurface::default();
        let mut sync = RenderSync::default();
        let r = route(
            "r1",
            json!([
                {"lat": 55.72, "lng": 37.62},
                {"lat": 55.70, "lng": 37.60},
                {"lat": 55.72, "lng": 37.62},
            ]),
        );
        assert_eq!(sync.sync_routes(&mut surface, &[r]), 1);

        let state = surface.state.borrow();
        assert_eq!(
            state.sources["route-r1"],
            vec![
                LatLng::new(55.72, 37.62),
                LatLng::new(55.70, 37.60),
                LatLng::new(55.72, 37.62),
            ]
        );
        assert_eq!(state.layers["route-r1"], ROUTE_LINE);
    }

    #[test]
    fn unreadable_route_does_not_block_others() {
        let mut surface = RecordingSurface::default();
        let mut sync = RenderSync::default();
        let routes = [
            route("good-1", json!([{"lat": 1.0, "lng": 1.0}, {"lat": 2.0, "lng": 2.0}])),
            route("bad", json!("{{not json")),
            route("good-2", json!(r#"[{"lat":3.0,"lng":3.0},{"lat":4.0,"lng":4.0}]"#)),
        ];
        assert_eq!(sync.sync_routes(&mut surface, &routes), 2);

        let state = surface.state.borrow();
        assert!(state.layers.contains_key("route-good-1"));
        assert!(state.layers.contains_key("route-good-2"));
        assert!(!state.layers.contains_key("route-bad"));
    }

    #[test]
    fn short_routes_are_not_drawn() {
        let mut surface = RecordingSurface::default();
        let mut sync = RenderSync::default();
        let routes = [
            route("one", json!([{"lat": 1.0, "lng": 1.0}])),
            route("none", json!([])),
            route("invalid", json!([{"lat": 1.0, "lng": 1.0}, {"lat": 100.0, "lng": 1.0}])),
        ];
        assert_eq!(sync.sync_routes(&mut surface, &routes), 0);
        assert!(surface.state.borrow().layers.is_empty());
    }

    #[test]
    fn resync_replaces_layers_and_drops_vanished_routes() {
        let mut surface = RecordingSurface::default();
        let mut sync = RenderSync::default();
        let a = route("a", json!([{"lat": 1.0, "lng": 1.0}, {"lat": 2.0, "lng": 2.0}]));
        let b = route("b", json!([{"lat": 3.0, "lng": 3.0}, {"lat": 4.0, "lng": 4.0}]));
        sync.sync_routes(&mut surface, &[a.clone(), b]);

        let mut a_moved = a;
        a_moved.route_points = RoutePath::Points(vec![LatLng::new(5.0, 5.0), LatLng::new(6.0, 6.0)]);
        sync.sync_routes(&mut surface, &[a_moved]);

        let state = surface.state.borrow();
        assert_eq!(state.layers.len(), 1);
        assert_eq!(state.sources.len(), 1);
        assert_eq!(state.sources["route-a"][0], LatLng::new(5.0, 5.0));
    }

    #[test]
    fn route_hit_testing_ignores_foreign_layers() {
        let mut surface = RecordingSurface::default();
        let mut sync = RenderSync::default();
        sync.sync_routes(
            &mut surface,
            &[route("a", json!([{"lat": 1.0, "lng": 1.0}, {"lat": 2.0, "lng": 2.0}]))],
        );
        let layers = vec!["water".to_string(), "draft-route".to_string(), route_layer_id("a")];
        assert_eq!(sync.route_at(&layers), Some("a"));
        assert_eq!(sync.route_at(&["water".to_string()]), None);
    }

    #[test]
    fn marker_lookup_by_identity_and_by_coordinate() {
        let mut surface = RecordingSurface::default();
        let mut sync = RenderSync::default();
        sync.sync_spots(&mut surface, &[spot("a", 55.7558, 37.6176)]);
        let by_id = sync.spot_marker("a").unwrap();
        let near = sync
            .marker_near(&LatLng::new(55.755_800_000_2, 37.617_600_000_1), 1e-6)
            .unwrap();
        assert_eq!(by_id, near);
        assert!(sync.marker_near(&LatLng::new(55.76, 37.6176), 1e-6).is_none());
    }
}
