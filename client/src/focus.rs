use rollum_shared::{Bounds, LatLng, Route};
use serde::{Deserialize, Serialize};

use crate::config::{
    COORD_EPSILON, FIT_DURATION_MS, FIT_PADDING_PX, FOCUS_FLY_DURATION_MS, FOCUS_SETTLE_MS,
    FOCUS_ZOOM,
};
use crate::surface::{Flight, MapSurface};
use crate::sync::RenderSync;

/// External instruction to bring a spot or route into view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FocusRequest {
    Spot { id: String, lat: f64, lng: f64 },
    Route { id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FocusTicket(pub u64);

#[derive(Debug, Clone, PartialEq)]
pub enum FocusOutcome {
    /// The spot's popup was opened.
    Revealed,
    MarkerNotFound,
    RouteFitted,
    RouteUnavailable(String),
    CameraFailed(String),
    NotReady,
    Superseded,
    Cancelled,
}

/// Delivered exactly once per ticket.
#[derive(Debug, Clone, PartialEq)]
pub struct FocusCompletion {
    pub ticket: FocusTicket,
    pub outcome: FocusOutcome,
}

#[derive(Debug, Clone)]
struct PendingReveal {
    ticket: FocusTicket,
    spot_id: String,
    at: LatLng,
    reveal_at_ms: f64,
}

/// Camera focus with at most one spot reveal in flight.
///
/// Route focus completes as soon as the fit is issued, so only spot requests ever wait.
#[derive(Debug, Default)]
pub struct FocusController {
    next_ticket: u64,
    pending: Option<PendingReveal>,
}

impl FocusController {
    pub fn issue_ticket(&mut self) -> FocusTicket {
        self.next_ticket += 1;
        FocusTicket(self.next_ticket)
    }

    /// Start a focus. Returned completions include the superseded request, if any.
    pub fn request(
        &mut self,
        surface: &mut dyn MapSurface,
        routes: &[Route],
        request: FocusRequest,
        now_ms: f64,
    ) -> (FocusTicket, Vec<FocusCompletion>) {
        let ticket = self.issue_ticket();
        let mut completions = Vec::new();
        if let Some(previous) = self.pending.take() {
            completions.push(FocusCompletion {
                ticket: previous.ticket,
                outcome: FocusOutcome::Superseded,
            });
        }

        match request {
            FocusRequest::Spot { id, lat, lng } => {
                let at = LatLng::new(lat, lng);
                if !at.is_valid() {
                    completions.push(FocusCompletion {
                        ticket,
                        outcome: FocusOutcome::CameraFailed(format!("invalid coordinate {lat}, {lng}")),
                    });
                    return (ticket, completions);
                }
                let flight = Flight {
                    center: at,
                    zoom: FOCUS_ZOOM,
                    duration_ms: FOCUS_FLY_DURATION_MS,
                    ticket: Some(ticket.0),
                };
                match surface.fly_to(flight) {
                    Ok(()) => {
                        self.pending = Some(PendingReveal {
                            ticket,
                            spot_id: id,
                            at,
                            reveal_at_ms: now_ms + FOCUS_FLY_DURATION_MS + FOCUS_SETTLE_MS,
                        });
                    }
                    Err(e) => completions.push(FocusCompletion {
                        ticket,
                        outcome: FocusOutcome::CameraFailed(e.to_string()),
                    }),
                }
            }
            FocusRequest::Route { id } => {
                let outcome = fit_route(surface, routes, &id);
                completions.push(FocusCompletion { ticket, outcome });
            }
        }
        (ticket, completions)
    }

    /// The surface reported the end of a camera animation.
    pub fn camera_settled(
        &mut self,
        ticket: Option<u64>,
        surface: &mut dyn MapSurface,
        sync: &RenderSync,
    ) -> Option<FocusCompletion> {
        let pending = self.pending.as_ref()?;
        if ticket != Some(pending.ticket.0) {
            return None;
        }
        self.reveal(surface, sync)
    }

    /// Fallback for surfaces that never report settling: reveal after the fixed delay.
    pub fn poll(
        &mut self,
        now_ms: f64,
        surface: &mut dyn MapSurface,
        sync: &RenderSync,
    ) -> Option<FocusCompletion> {
        if now_ms < self.pending.as_ref()?.reveal_at_ms {
            return None;
        }
        self.reveal(surface, sync)
    }

    pub fn cancel(&mut self) -> Option<FocusCompletion> {
        self.pending.take().map(|pending| FocusCompletion {
            ticket: pending.ticket,
            outcome: FocusOutcome::Cancelled,
        })
    }

    pub fn next_deadline(&self) -> Option<f64> {
        self.pending.as_ref().map(|pending| pending.reveal_at_ms)
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    fn reveal(&mut self, surface: &mut dyn MapSurface, sync: &RenderSync) -> Option<FocusCompletion> {
        let pending = self.pending.take()?;
        let marker = sync
            .spot_marker(&pending.spot_id)
            .or_else(|| sync.marker_near(&pending.at, COORD_EPSILON));
        let outcome = match marker {
            Some(marker) => match surface.open_marker_popup(marker) {
                Ok(()) => FocusOutcome::Revealed,
                Err(e) => {
                    tracing::warn!(spot_id = %pending.spot_id, error = %e, "failed to open spot popup");
                    FocusOutcome::MarkerNotFound
                }
            },
            None => FocusOutcome::MarkerNotFound,
        };
        Some(FocusCompletion {
            ticket: pending.ticket,
            outcome,
        })
    }
}

fn fit_route(surface: &mut dyn MapSurface, routes: &[Route], id: &str) -> FocusOutcome {
    let Some(route) = routes.iter().find(|route| route.id == id) else {
        return FocusOutcome::RouteUnavailable(format!("route {id} is not loaded"));
    };
    let points = match route.path() {
        Ok(points) => points,
        Err(e) => return FocusOutcome::RouteUnavailable(e.to_string()),
    };
    let Some(bounds) = Bounds::from_points(&points) else {
        return FocusOutcome::RouteUnavailable(format!("route {id} has no points"));
    };
    match surface.fit_bounds(bounds, FIT_PADDING_PX, FIT_DURATION_MS) {
        Ok(()) => FocusOutcome::RouteFitted,
        Err(e) => FocusOutcome::CameraFailed(e.to_string()),
    }
}
