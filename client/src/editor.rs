use std::rc::Rc;

use futures::future::LocalBoxFuture;
use futures::task::{LocalSpawn, LocalSpawnExt};
use rollum_shared::{Details, DetailsError, LatLng, NewRoute, NewSpot, Route, Spot};
use thiserror::Error;

use crate::config::validate_access_token;
use crate::drawing::{DrawError, DrawingSession, FinishedRoute};
use crate::focus::{FocusCompletion, FocusController, FocusOutcome, FocusRequest, FocusTicket};
use crate::mode::{ClickAction, Mode, ModeController, Transition};
use crate::readiness::{LifecycleGuard, Readiness, ReadinessFailure};
use crate::store::{MapStore, StoreError};
use crate::surface::{
    Cursor, MapSurface, PopupContent, SurfaceError, SurfaceEvent, SurfaceFactory, SurfaceOptions,
};
use crate::sync::RenderSync;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EditorError {
    #[error("map is not ready")]
    NotReady,
    #[error("not available in {} mode", .0.label())]
    WrongMode(Mode),
    #[error(transparent)]
    Draw(#[from] DrawError),
    #[error(transparent)]
    Details(#[from] DetailsError),
    #[error(transparent)]
    Surface(#[from] SurfaceError),
}

/// Result of a fire-and-forget create.
#[derive(Debug, Clone, PartialEq)]
pub enum PersistOutcome {
    SpotCreated(Spot),
    RouteCreated(Route),
    Failed { entity: &'static str, error: StoreError },
}

/// Callbacks from the editor to its host. Every method defaults to a no-op.
pub trait EditorObserver {
    fn readiness_changed(&self, _readiness: &Readiness) {}
    fn mode_changed(&self, _mode: Mode) {}
    /// An `AddSpot` click picked a coordinate for the spot form.
    fn spot_form_requested(&self, _at: LatLng) {}
    fn route_form_requested(&self, _route: &FinishedRoute) {}
    fn draft_changed(&self, _points: usize) {}
    fn focus_completed(&self, _completion: &FocusCompletion) {}
    fn persisted(&self, _outcome: &PersistOutcome) {}
}

pub struct NoopObserver;

impl EditorObserver for NoopObserver {}

/// The map annotation engine: one surface per mount, the primitives mirroring the latest
/// spot/route snapshots, the interaction mode, the route draft and camera focus.
///
/// Nothing touches the surface unless readiness is `Ready`. Work arriving earlier is
/// dropped, except snapshots, which are kept and synced on the ready edge.
pub struct MapEditor {
    options: SurfaceOptions,
    factory: Box<dyn SurfaceFactory>,
    surface: Option<Box<dyn MapSurface>>,
    lifecycle: LifecycleGuard,
    sync: RenderSync,
    modes: ModeController,
    drawing: DrawingSession,
    focus: FocusController,
    spots: Option<Vec<Spot>>,
    routes: Option<Vec<Route>>,
    cursor: Cursor,
    hovering_route: bool,
    store: Rc<dyn MapStore>,
    spawner: Rc<dyn LocalSpawn>,
    observer: Rc<dyn EditorObserver>,
    mounted: bool,
}

impl MapEditor {
    pub fn new(
        options: SurfaceOptions,
        factory: Box<dyn SurfaceFactory>,
        store: Rc<dyn MapStore>,
        spawner: Rc<dyn LocalSpawn>,
        load_timeout_ms: f64,
    ) -> Self {
        Self {
            options,
            factory,
            surface: None,
            lifecycle: LifecycleGuard::new(load_timeout_ms),
            sync: RenderSync::default(),
            modes: ModeController::default(),
            drawing: DrawingSession::default(),
            focus: FocusController::default(),
            spots: None,
            routes: None,
            cursor: Cursor::Default,
            hovering_route: false,
            store,
            spawner,
            observer: Rc::new(NoopObserver),
            mounted: false,
        }
    }

    pub fn set_observer(&mut self, observer: Rc<dyn EditorObserver>) {
        self.observer = observer;
    }

    /// Takes effect on the next construction (mount or retry).
    pub fn set_access_token(&mut self, token: &str) {
        self.options.access_token = token.trim().to_string();
    }

    // ---- lifecycle ----

    /// Create the surface. Repeated calls while mounted are ignored.
    pub fn mount(&mut self, now_ms: f64) {
        if self.mounted {
            tracing::warn!("map editor already mounted");
            return;
        }
        self.mounted = true;
        self.construct(now_ms);
    }

    /// Tear down and rebuild a failed surface. Returns `false` unless readiness was `Failed`.
    pub fn retry(&mut self, now_ms: f64) -> bool {
        if !self.mounted || !self.lifecycle.is_failed() {
            return false;
        }
        tracing::info!("retrying map construction");
        self.teardown();
        self.construct(now_ms);
        true
    }

    /// Release the surface and everything on it.
    pub fn unmount(&mut self) {
        if !self.mounted {
            return;
        }
        self.teardown();
        self.lifecycle.reset();
        self.mounted = false;
        self.observer.readiness_changed(self.lifecycle.readiness());
    }

    fn construct(&mut self, now_ms: f64) {
        self.lifecycle.begin(now_ms);
        self.observer.readiness_changed(self.lifecycle.readiness());

        if let Err(e) = validate_access_token(&self.options.access_token) {
            self.fail(ReadinessFailure::Construct(e.to_string()));
            return;
        }
        match self.factory.create(&self.options) {
            Ok(surface) => self.surface = Some(surface),
            Err(e) => self.fail(ReadinessFailure::Construct(e.to_string())),
        }
    }

    fn teardown(&mut self) {
        if let Some(done) = self.focus.cancel() {
            self.complete_focus(done);
        }
        let had_draft = !self.drawing.is_empty();
        self.drawing.forget();
        self.sync.forget();
        if let Some(mut surface) = self.surface.take() {
            surface.destroy();
        }
        self.cursor = Cursor::Default;
        self.hovering_route = false;
        let transition = self.modes.set(Mode::View);
        if transition.changed() {
            self.observer.mode_changed(Mode::View);
        }
        if had_draft {
            self.observer.draft_changed(0);
        }
    }

    fn fail(&mut self, failure: ReadinessFailure) {
        if self.lifecycle.fail(failure.clone()) {
            self.on_failed(&failure);
        }
    }

    fn on_failed(&mut self, failure: &ReadinessFailure) {
        tracing::error!(error = %failure, "map failed");
        if let Some(done) = self.focus.cancel() {
            self.complete_focus(done);
        }
        let transition = self.modes.set(Mode::View);
        self.after_transition(transition);
        self.observer.readiness_changed(self.lifecycle.readiness());
    }

    // ---- events and time ----

    pub fn handle_event(&mut self, event: SurfaceEvent, now_ms: f64) {
        match event {
            SurfaceEvent::Loaded => self.on_loaded(),
            SurfaceEvent::Failed(reason) => {
                if self.surface.is_some() {
                    self.fail(ReadinessFailure::Surface(reason));
                }
            }
            SurfaceEvent::Click { at, layers } => self.on_click(at, &layers),
            SurfaceEvent::PointerMove { layers } => self.on_pointer_move(&layers),
            SurfaceEvent::CameraSettled { ticket } => {
                let Some(surface) = self.surface.as_deref_mut() else {
                    return;
                };
                if let Some(done) = self.focus.camera_settled(ticket, surface, &self.sync) {
                    self.complete_focus(done);
                }
            }
        }
        self.poll(now_ms);
    }

    /// Fire elapsed deadlines: the load timeout and the focus settle fallback.
    pub fn poll(&mut self, now_ms: f64) {
        if let Some(failure) = self.lifecycle.poll(now_ms) {
            self.on_failed(&failure);
            return;
        }
        if !self.lifecycle.is_ready() {
            return;
        }
        let Some(surface) = self.surface.as_deref_mut() else {
            return;
        };
        if let Some(done) = self.focus.poll(now_ms, surface, &self.sync) {
            self.complete_focus(done);
        }
    }

    /// Earliest time `poll` has work to do.
    pub fn next_deadline(&self) -> Option<f64> {
        match (self.lifecycle.deadline(), self.focus.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn on_loaded(&mut self) {
        if self.surface.is_none() || !self.lifecycle.loaded() {
            return;
        }
        tracing::info!(
            spots = self.spots.as_ref().map_or(0, Vec::len),
            routes = self.routes.as_ref().map_or(0, Vec::len),
            "map ready"
        );
        self.observer.readiness_changed(self.lifecycle.readiness());
        self.resync();
        self.apply_cursor();
    }

    fn on_click(&mut self, at: LatLng, layers: &[String]) {
        if !self.lifecycle.is_ready() {
            return;
        }
        let (action, transition) = self.modes.dispatch_click(at);
        match action {
            ClickAction::Inspect => self.open_route_popup(at, layers),
            ClickAction::OpenSpotForm(at) => {
                self.after_transition(transition);
                self.observer.spot_form_requested(at);
            }
            ClickAction::AddRoutePoint(at) => {
                if let Err(e) = self.push_route_point(at) {
                    tracing::warn!(error = %e, "failed to add route point");
                }
            }
        }
    }

    fn open_route_popup(&mut self, at: LatLng, layers: &[String]) {
        let Some(route_id) = self.sync.route_at(layers) else {
            return;
        };
        let Some(route) = self
            .routes
            .as_deref()
            .and_then(|routes| routes.iter().find(|route| route.id == route_id))
        else {
            return;
        };
        let content = PopupContent::for_route(route);
        if let Some(surface) = self.surface.as_deref_mut() {
            if let Err(e) = surface.show_popup(at, &content) {
                tracing::warn!(route_id = %route.id, error = %e, "failed to open route popup");
            }
        }
    }

    fn on_pointer_move(&mut self, layers: &[String]) {
        if !self.lifecycle.is_ready() {
            return;
        }
        self.hovering_route = self.modes.mode() == Mode::View && self.sync.route_at(layers).is_some();
        self.apply_cursor();
    }

    fn apply_cursor(&mut self) {
        let wanted = match self.modes.mode() {
            Mode::View if self.hovering_route => Cursor::Pointer,
            mode => mode.cursor(),
        };
        if wanted == self.cursor {
            return;
        }
        if let Some(surface) = self.surface.as_deref_mut() {
            surface.set_cursor(wanted);
            self.cursor = wanted;
        }
    }

    // ---- snapshots ----

    pub fn set_spots(&mut self, spots: Vec<Spot>) {
        self.spots = Some(spots);
        if !self.lifecycle.is_ready() {
            return;
        }
        if let (Some(surface), Some(spots)) = (self.surface.as_deref_mut(), self.spots.as_deref()) {
            let count = self.sync.sync_spots(surface, spots);
            tracing::debug!(markers = count, "spots synced");
        }
    }

    pub fn set_routes(&mut self, routes: Vec<Route>) {
        self.routes = Some(routes);
        if !self.lifecycle.is_ready() {
            return;
        }
        if let (Some(surface), Some(routes)) = (self.surface.as_deref_mut(), self.routes.as_deref()) {
            let count = self.sync.sync_routes(surface, routes);
            tracing::debug!(layers = count, "routes synced");
        }
    }

    fn resync(&mut self) {
        let Some(surface) = self.surface.as_deref_mut() else {
            return;
        };
        if let Some(spots) = self.spots.as_deref() {
            self.sync.sync_spots(surface, spots);
        }
        if let Some(routes) = self.routes.as_deref() {
            self.sync.sync_routes(surface, routes);
        }
    }

    // ---- modes and drawing ----

    pub fn set_mode(&mut self, mode: Mode) -> Result<Transition, EditorError> {
        self.ensure_ready()?;
        let transition = self.modes.set(mode);
        self.after_transition(transition);
        Ok(transition)
    }

    /// Toolbar behavior: selecting the active mode goes back to `View`.
    pub fn toggle_mode(&mut self, mode: Mode) -> Result<Transition, EditorError> {
        self.ensure_ready()?;
        let transition = self.modes.toggle(mode);
        self.after_transition(transition);
        Ok(transition)
    }

    pub fn start_route(&mut self) -> Result<Transition, EditorError> {
        self.set_mode(Mode::DrawRoute)
    }

    /// Discard the draft and return to `View`.
    pub fn cancel_route(&mut self) -> Result<Transition, EditorError> {
        self.ensure_mode(Mode::DrawRoute)?;
        self.set_mode(Mode::View)
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn add_route_point(&mut self, at: LatLng) -> Result<(), EditorError> {
        self.ensure_ready()?;
        self.ensure_mode(Mode::DrawRoute)?;
        self.push_route_point(at)
    }

    fn push_route_point(&mut self, at: LatLng) -> Result<(), EditorError> {
        let surface = self.surface.as_deref_mut().ok_or(EditorError::NotReady)?;
        self.drawing.add_point(surface, at)?;
        self.observer.draft_changed(self.drawing.len());
        Ok(())
    }

    /// Validate the draft and hand it to the route form. The draft stays on the map.
    pub fn finish_route(&mut self) -> Result<FinishedRoute, EditorError> {
        self.ensure_mode(Mode::DrawRoute)?;
        let finished = self.drawing.finish()?;
        self.observer.route_form_requested(&finished);
        Ok(finished)
    }

    /// Persist the draft with the form's details, clear it and return to `View`.
    pub fn save_route(&mut self, name: &str, description: &str) -> Result<NewRoute, EditorError> {
        self.ensure_mode(Mode::DrawRoute)?;
        let details = Details::parse(name, description)?;
        let finished = self.drawing.finish()?;
        let have = finished.points.len();
        let new_route =
            NewRoute::from_path(details, finished.points).ok_or(DrawError::TooFewPoints { have })?;

        let transition = self.modes.set(Mode::View);
        self.after_transition(transition);

        tracing::info!(points = have, distance_km = new_route.distance, "saving route");
        let store = self.store.clone();
        let payload = new_route.clone();
        self.spawn_persist(Box::pin(async move {
            match store.create_route(payload).await {
                Ok(route) => PersistOutcome::RouteCreated(route),
                Err(error) => PersistOutcome::Failed {
                    entity: "route",
                    error,
                },
            }
        }));
        Ok(new_route)
    }

    /// Persist a spot picked by an `AddSpot` click.
    pub fn submit_spot(
        &mut self,
        name: &str,
        description: &str,
        at: LatLng,
    ) -> Result<NewSpot, EditorError> {
        let details = Details::parse(name, description)?;
        let new_spot = NewSpot::new(details, at);

        tracing::info!(lat = at.lat, lng = at.lng, "saving spot");
        let store = self.store.clone();
        let payload = new_spot.clone();
        self.spawn_persist(Box::pin(async move {
            match store.create_spot(payload).await {
                Ok(spot) => PersistOutcome::SpotCreated(spot),
                Err(error) => PersistOutcome::Failed {
                    entity: "spot",
                    error,
                },
            }
        }));
        Ok(new_spot)
    }

    fn spawn_persist(&self, task: LocalBoxFuture<'static, PersistOutcome>) {
        let observer = self.observer.clone();
        let spawned = self.spawner.spawn_local(async move {
            let outcome = task.await;
            match &outcome {
                PersistOutcome::Failed { entity, error } => {
                    tracing::warn!(entity, error = %error, "create failed")
                }
                _ => tracing::debug!("create succeeded"),
            }
            observer.persisted(&outcome);
        });
        if let Err(e) = spawned {
            tracing::error!(error = ?e, "failed to spawn persistence task");
        }
    }

    /// Leaving `DrawRoute` drops the draft before anything else observes the new mode.
    fn after_transition(&mut self, transition: Transition) {
        if transition.leaves_drawing() {
            match self.surface.as_deref_mut() {
                Some(surface) => self.drawing.clear(surface),
                None => self.drawing.forget(),
            }
            self.observer.draft_changed(0);
        }
        if transition.changed() {
            self.hovering_route = false;
            self.apply_cursor();
            self.observer.mode_changed(transition.to);
        }
    }

    fn ensure_ready(&self) -> Result<(), EditorError> {
        if self.lifecycle.is_ready() && self.surface.is_some() {
            Ok(())
        } else {
            Err(EditorError::NotReady)
        }
    }

    fn ensure_mode(&self, expected: Mode) -> Result<(), EditorError> {
        let mode = self.modes.mode();
        if mode == expected {
            Ok(())
        } else {
            Err(EditorError::WrongMode(mode))
        }
    }

    // ---- focus ----

    /// Requests made before the map is ready complete at once with `NotReady`.
    pub fn request_focus(&mut self, request: FocusRequest, now_ms: f64) -> FocusTicket {
        let ready = self.lifecycle.is_ready();
        let (ticket, completions) = match self.surface.as_deref_mut() {
            Some(surface) if ready => {
                let routes = self.routes.as_deref().unwrap_or_default();
                self.focus.request(surface, routes, request, now_ms)
            }
            _ => {
                let ticket = self.focus.issue_ticket();
                let not_ready = FocusCompletion {
                    ticket,
                    outcome: FocusOutcome::NotReady,
                };
                (ticket, vec![not_ready])
            }
        };
        for done in completions {
            self.complete_focus(done);
        }
        ticket
    }

    fn complete_focus(&self, done: FocusCompletion) {
        tracing::debug!(ticket = done.ticket.0, outcome = ?done.outcome, "focus completed");
        self.observer.focus_completed(&done);
    }

    // ---- accessors ----

    pub fn readiness(&self) -> &Readiness {
        self.lifecycle.readiness()
    }

    pub fn mode(&self) -> Mode {
        self.modes.mode()
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn draft_points(&self) -> &[LatLng] {
        self.drawing.points()
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn draft_marker_count(&self) -> usize {
        self.drawing.marker_count()
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn spot_marker_count(&self) -> usize {
        self.sync.spot_marker_count()
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn route_layer_count(&self) -> usize {
        self.sync.route_layer_count()
    }
}
