use rollum_shared::LatLng;
use serde::{Deserialize, Serialize};

use crate::surface::Cursor;

/// Interaction mode of the editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    #[default]
    View,
    AddSpot,
    DrawRoute,
}

impl Mode {
    pub fn label(self) -> &'static str {
        match self {
            Mode::View => "View",
            Mode::AddSpot => "Add spot",
            Mode::DrawRoute => "Draw route",
        }
    }

    pub fn cursor(self) -> Cursor {
        match self {
            Mode::View => Cursor::Default,
            Mode::AddSpot | Mode::DrawRoute => Cursor::Crosshair,
        }
    }
}

/// What a map click means in the mode it arrived in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClickAction {
    /// Creation is inert; layer popups may still open.
    Inspect,
    OpenSpotForm(LatLng),
    AddRoutePoint(LatLng),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: Mode,
    pub to: Mode,
}

impl Transition {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }

    /// Any exit from `DrawRoute` discards the drawing session.
    pub fn leaves_drawing(&self) -> bool {
        self.from == Mode::DrawRoute && self.to != Mode::DrawRoute
    }
}

#[derive(Debug, Default)]
pub struct ModeController {
    mode: Mode,
}

impl ModeController {
    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set(&mut self, to: Mode) -> Transition {
        let from = std::mem::replace(&mut self.mode, to);
        Transition { from, to }
    }

    /// Toolbar semantics: pressing the active mode's button returns to `View`.
    pub fn toggle(&mut self, mode: Mode) -> Transition {
        if self.mode == mode {
            self.set(Mode::View)
        } else {
            self.set(mode)
        }
    }

    pub fn dispatch_click(&mut self, at: LatLng) -> (ClickAction, Transition) {
        match self.mode {
            Mode::View => (ClickAction::Inspect, self.set(Mode::View)),
            // Revert as soon as the form opens so further clicks don't stack forms.
            Mode::AddSpot => (ClickAction::OpenSpotForm(at), self.set(Mode::View)),
            Mode::DrawRoute => (ClickAction::AddRoutePoint(at), self.set(Mode::DrawRoute)),
        }
    }
}

#[cfg(test)]
mod tests {
    use rollum_shared::LatLng;

    use super::{ClickAction, Mode, ModeController};
    use crate::surface::Cursor;

    #[test]
    fn starts_in_view() {
        let modes = ModeController::default();
        assert_eq!(modes.mode(), Mode::View);
    }

    #[test]
    fn add_spot_click_opens_form_and_reverts() {
        let mut modes = ModeController::default();
        modes.set(Mode::AddSpot);
        let at = LatLng::new(55.75, 37.61);

        let (action, transition) = modes.dispatch_click(at);
        assert_eq!(action, ClickAction::OpenSpotForm(at));
        assert!(transition.changed());
        assert_eq!(modes.mode(), Mode::View);

        let (action, _) = modes.dispatch_click(at);
        assert_eq!(action, ClickAction::Inspect);
    }

    #[test]
    fn draw_route_clicks_do_not_revert() {
        let mut modes = ModeController::default();
        modes.set(Mode::DrawRoute);
        for i in 0..3 {
            let at = LatLng::new(55.70 + f64::from(i) * 0.01, 37.60);
            let (action, transition) = modes.dispatch_click(at);
            assert_eq!(action, ClickAction::AddRoutePoint(at));
            assert!(!transition.changed());
        }
        assert_eq!(modes.mode(), Mode::DrawRoute);
    }

    #[test]
    fn toggle_returns_to_view() {
        let mut modes = ModeController::default();
        assert_eq!(modes.toggle(Mode::DrawRoute).to, Mode::DrawRoute);
        let transition = modes.toggle(Mode::DrawRoute);
        assert_eq!(transition.to, Mode::View);
        assert!(transition.leaves_drawing());
    }

    #[test]
    fn switching_between_edit_modes_leaves_drawing() {
        let mut modes = ModeController::default();
        modes.set(Mode::DrawRoute);
        assert!(modes.set(Mode::AddSpot).leaves_drawing());
        assert!(!modes.set(Mode::DrawRoute).leaves_drawing());
    }

    #[test]
    fn edit_modes_use_crosshair() {
        assert_eq!(Mode::View.cursor(), Cursor::Default);
        assert_eq!(Mode::AddSpot.cursor(), Cursor::Crosshair);
        assert_eq!(Mode::DrawRoute.cursor(), Cursor::Crosshair);
    }

    #[test]
    fn serializes_kebab_case() {
        assert_eq!(serde_json::to_string(&Mode::AddSpot).unwrap(), "\"add-spot\"");
        let mode: Mode = serde_json::from_str("\"draw-route\"").unwrap();
        assert_eq!(mode, Mode::DrawRoute);
    }
}
