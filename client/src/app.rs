use std::rc::Rc;

use leptos::prelude::*;
use rollum_shared::{LatLng, Route, Spot, path_length_km};
use wasm_bindgen::JsCast;

use crate::config::{MAP_CONTAINER_ID, MapConfig};
use crate::drawing::FinishedRoute;
use crate::editor::{EditorObserver, MapEditor, PersistOutcome};
use crate::focus::{FocusCompletion, FocusOutcome, FocusRequest};
use crate::host::{EditorHandle, now_ms};
use crate::mode::Mode;
use crate::readiness::Readiness;
use crate::store::{self, MapStore};

/// Newtype wrappers so same-typed signals don't overwrite each other in context.
#[derive(Clone, Copy)]
pub(crate) struct MapReadiness(pub RwSignal<Readiness>);
#[derive(Clone, Copy)]
pub(crate) struct ActiveMode(pub RwSignal<Mode>);
#[derive(Clone, Copy)]
pub(crate) struct DraftLength(pub RwSignal<usize>);
#[derive(Clone, Copy)]
pub(crate) struct SpotForm(pub RwSignal<Option<LatLng>>);
#[derive(Clone, Copy)]
pub(crate) struct RouteForm(pub RwSignal<Option<FinishedRoute>>);
#[derive(Clone, Copy)]
pub(crate) struct Notice(pub RwSignal<Option<String>>);
#[derive(Clone, Copy)]
pub(crate) struct Spots(pub RwSignal<Vec<Spot>>);
#[derive(Clone, Copy)]
pub(crate) struct Routes(pub RwSignal<Vec<Route>>);
#[derive(Clone, Copy)]
pub(crate) struct Editor(pub StoredValue<EditorHandle, LocalStorage>);
#[derive(Clone, Copy)]
pub(crate) struct Settings(pub StoredValue<MapConfig>);

impl Editor {
    /// `None` when the handle is gone or the editor is mid-call.
    pub(crate) fn run<R: 'static>(self, f: impl FnOnce(&mut MapEditor) -> R) -> Option<R> {
        self.0.try_with_value(|handle| handle.with(f)).flatten()
    }

    /// Like `run`, but a busy editor gets the call once it is free.
    pub(crate) fn defer(self, f: impl FnOnce(&mut MapEditor) + 'static) {
        self.0.try_with_value(|handle| handle.defer(f));
    }
}

/// Forwards editor callbacks into signals.
struct SignalObserver {
    readiness: RwSignal<Readiness>,
    mode: RwSignal<Mode>,
    draft_len: RwSignal<usize>,
    spot_form: RwSignal<Option<LatLng>>,
    route_form: RwSignal<Option<FinishedRoute>>,
    notice: RwSignal<Option<String>>,
    refresh: RwSignal<u64>,
}

impl EditorObserver for SignalObserver {
    fn readiness_changed(&self, readiness: &Readiness) {
        self.readiness.set(readiness.clone());
    }

    fn mode_changed(&self, mode: Mode) {
        self.mode.set(mode);
        if mode != Mode::DrawRoute {
            self.route_form.set(None);
        }
    }

    fn spot_form_requested(&self, at: LatLng) {
        self.spot_form.set(Some(at));
    }

    fn route_form_requested(&self, route: &FinishedRoute) {
        self.route_form.set(Some(route.clone()));
    }

    fn draft_changed(&self, points: usize) {
        self.draft_len.set(points);
    }

    fn focus_completed(&self, completion: &FocusCompletion) {
        let message = match &completion.outcome {
            FocusOutcome::Revealed
            | FocusOutcome::RouteFitted
            | FocusOutcome::Superseded
            | FocusOutcome::Cancelled => return,
            FocusOutcome::MarkerNotFound => "That spot isn't on the map".to_string(),
            FocusOutcome::RouteUnavailable(reason) => format!("Can't show route: {reason}"),
            FocusOutcome::CameraFailed(reason) => format!("Camera error: {reason}"),
            FocusOutcome::NotReady => "The map is still loading".to_string(),
        };
        self.notice.set(Some(message));
    }

    fn persisted(&self, outcome: &PersistOutcome) {
        let message = match outcome {
            PersistOutcome::SpotCreated(spot) => format!("Saved spot \"{}\"", spot.name),
            PersistOutcome::RouteCreated(route) => format!("Saved route \"{}\"", route.name),
            PersistOutcome::Failed { entity, error } => {
                self.notice.set(Some(format!("Couldn't save {entity}: {error}")));
                return;
            }
        };
        self.notice.set(Some(message));
        self.refresh.update(|n| *n += 1);
    }
}

#[component]
pub fn App() -> impl IntoView {
    let readiness = RwSignal::new(Readiness::Loading);
    let mode = RwSignal::new(Mode::View);
    let draft_len = RwSignal::new(0usize);
    let spot_form: RwSignal<Option<LatLng>> = RwSignal::new(None);
    let route_form: RwSignal<Option<FinishedRoute>> = RwSignal::new(None);
    let notice: RwSignal<Option<String>> = RwSignal::new(None);
    let spots: RwSignal<Vec<Spot>> = RwSignal::new(Vec::new());
    let routes: RwSignal<Vec<Route>> = RwSignal::new(Vec::new());
    let refresh = RwSignal::new(0u64);

    let config = MapConfig::load();
    let map_store: Rc<dyn MapStore> = store::from_config(&config);
    let observer = SignalObserver {
        readiness,
        mode,
        draft_len,
        spot_form,
        route_form,
        notice,
        refresh,
    };
    let handle = EditorHandle::new(&config, map_store.clone(), Rc::new(observer));
    let editor = Editor(StoredValue::new_local(handle));
    let map_store = StoredValue::new_local(map_store);

    provide_context(MapReadiness(readiness));
    provide_context(ActiveMode(mode));
    provide_context(DraftLength(draft_len));
    provide_context(SpotForm(spot_form));
    provide_context(RouteForm(route_form));
    provide_context(Notice(notice));
    provide_context(Spots(spots));
    provide_context(Routes(routes));
    provide_context(editor);
    provide_context(Settings(StoredValue::new(config)));

    // Mount once the container is in the DOM
    Effect::new(move || {
        editor.0.with_value(EditorHandle::mount);
        on_cleanup(move || {
            editor.0.try_with_value(EditorHandle::unmount);
        });
    });

    // Fetch both collections on start and after every successful save
    Effect::new(move || {
        refresh.track();
        let store = map_store.get_value();
        wasm_bindgen_futures::spawn_local(async move {
            let snapshot = store::fetch_all(&*store).await;
            match snapshot.spots {
                Ok(list) => spots.set(list),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to load spots");
                    notice.set(Some(format!("Couldn't load spots: {e}")));
                }
            }
            match snapshot.routes {
                Ok(list) => routes.set(list),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to load routes");
                    notice.set(Some(format!("Couldn't load routes: {e}")));
                }
            }
        });
    });

    Effect::new(move || {
        let list = spots.get();
        editor.defer(move |ed| ed.set_spots(list));
    });
    Effect::new(move || {
        let list = routes.get();
        editor.defer(move |ed| ed.set_routes(list));
    });

    view! {
        <div style="position: fixed; inset: 0; display: flex; font-family: 'Inter', system-ui, sans-serif; background: #f4f3ef; color: #23252f;">
            <Library />
            <div style="position: relative; flex: 1; min-width: 0;">
                <div id=MAP_CONTAINER_ID style="position: absolute; inset: 0;" />
                <Toolbar />
                <LoadingOverlay />
                <FailurePanel />
                <NoticeBar />
                <SpotDialog />
                <RouteDialog />
            </div>
        </div>
    }
}

const BUTTON: &str = "padding: 6px 12px; border: 1px solid #c9c6bb; border-radius: 6px; background: #fff; color: #23252f; font-size: 0.82rem; cursor: pointer;";
const BUTTON_ACTIVE: &str = "padding: 6px 12px; border: 1px solid #2f6fde; border-radius: 6px; background: #2f6fde; color: #fff; font-size: 0.82rem; cursor: pointer;";
const PANEL: &str = "position: absolute; background: #fff; border-radius: 10px; box-shadow: 0 6px 24px rgba(0,0,0,0.18); padding: 16px;";
const FIELD: &str = "width: 100%; box-sizing: border-box; padding: 8px 10px; margin-top: 8px; border: 1px solid #c9c6bb; border-radius: 6px; font: inherit;";

fn input_value(e: &leptos::ev::Event) -> Option<String> {
    let target = e.target()?;
    if let Some(input) = target.dyn_ref::<web_sys::HtmlInputElement>() {
        return Some(input.value());
    }
    target
        .dyn_ref::<web_sys::HtmlTextAreaElement>()
        .map(web_sys::HtmlTextAreaElement::value)
}

#[component]
fn Toolbar() -> impl IntoView {
    let MapReadiness(readiness) = expect_context();
    let ActiveMode(mode) = expect_context();
    let DraftLength(draft_len) = expect_context();
    let Notice(notice) = expect_context();
    let editor: Editor = expect_context();

    let disabled = move || readiness.get() != Readiness::Ready;
    let style_for = move |m: Mode| move || if mode.get() == m { BUTTON_ACTIVE } else { BUTTON };
    let toggle = move |m: Mode| {
        if let Some(Err(e)) = editor.run(|ed| ed.toggle_mode(m)) {
            notice.set(Some(e.to_string()));
        }
    };
    let draw = move |_| {
        let result = if mode.get_untracked() == Mode::DrawRoute {
            editor.run(MapEditor::cancel_route)
        } else {
            editor.run(MapEditor::start_route)
        };
        if let Some(Err(e)) = result {
            notice.set(Some(e.to_string()));
        }
    };

    view! {
        <div style="position: absolute; top: 12px; left: 12px; display: flex; gap: 8px; align-items: center; z-index: 2;">
            <button style=style_for(Mode::AddSpot) disabled=disabled on:click=move |_| toggle(Mode::AddSpot)>
                "Add spot"
            </button>
            <button style=style_for(Mode::DrawRoute) disabled=disabled on:click=draw>
                "Draw route"
            </button>
            {move || {
                if mode.get() != Mode::DrawRoute {
                    return ().into_any();
                }
                let finish = move |_| {
                    if let Some(Err(e)) = editor.run(MapEditor::finish_route) {
                        notice.set(Some(e.to_string()));
                    }
                };
                let cancel = move |_| {
                    editor.run(MapEditor::cancel_route);
                };
                view! {
                    <span style="font-size: 0.78rem; color: #5a5860; background: #fff; padding: 5px 8px; border-radius: 6px;">
                        {move || match draft_len.get() {
                            1 => "1 point".to_string(),
                            n => format!("{n} points"),
                        }}
                    </span>
                    <button style=BUTTON on:click=finish>"Finish"</button>
                    <button style=BUTTON on:click=cancel>"Cancel"</button>
                }
                .into_any()
            }}
        </div>
    }
}

#[component]
fn LoadingOverlay() -> impl IntoView {
    let MapReadiness(readiness) = expect_context();
    view! {
        {move || if readiness.get() == Readiness::Loading {
            view! {
                <div style="position: absolute; inset: 0; display: flex; align-items: center; justify-content: center; color: #5a5860; pointer-events: none;">
                    "Loading map…"
                </div>
            }.into_any()
        } else {
            ().into_any()
        }}
    }
}

#[component]
fn FailurePanel() -> impl IntoView {
    let MapReadiness(readiness) = expect_context();
    let Settings(settings) = expect_context();
    let editor: Editor = expect_context();
    let token = RwSignal::new(String::new());

    let retry = move |_| {
        let entered = token.get_untracked();
        if !entered.trim().is_empty() {
            settings.update_value(|config| {
                config.access_token = entered.trim().to_string();
                config.save();
            });
            editor.run(|ed| ed.set_access_token(&entered));
        }
        editor.run(|ed| ed.retry(now_ms()));
    };

    view! {
        {move || match readiness.get() {
            Readiness::Failed(reason) => view! {
                <div style=format!("{PANEL} top: 50%; left: 50%; transform: translate(-50%, -50%); width: 320px; z-index: 3;")>
                    <div style="font-weight: 600;">"The map failed to load"</div>
                    <div style="font-size: 0.82rem; color: #a33; margin-top: 6px;">{reason.to_string()}</div>
                    <input
                        style=FIELD
                        type="text"
                        placeholder="Mapbox access token (pk.…)"
                        prop:value=move || token.get()
                        on:input=move |e| {
                            if let Some(v) = input_value(&e) {
                                token.set(v);
                            }
                        }
                    />
                    <div style="display: flex; justify-content: flex-end; margin-top: 12px;">
                        <button style=BUTTON_ACTIVE on:click=retry>"Retry"</button>
                    </div>
                </div>
            }.into_any(),
            _ => ().into_any(),
        }}
    }
}

#[component]
fn NoticeBar() -> impl IntoView {
    let Notice(notice) = expect_context();
    view! {
        {move || notice.get().map(|message| view! {
            <div
                style="position: absolute; bottom: 16px; left: 50%; transform: translateX(-50%); background: #23252f; color: #f4f3ef; padding: 8px 14px; border-radius: 6px; font-size: 0.82rem; cursor: pointer; z-index: 4;"
                on:click=move |_| notice.set(None)
            >
                {message}
            </div>
        })}
    }
}

#[component]
fn SpotDialog() -> impl IntoView {
    let SpotForm(spot_form) = expect_context();
    let editor: Editor = expect_context();
    let name = RwSignal::new(String::new());
    let description = RwSignal::new(String::new());
    let error: RwSignal<Option<String>> = RwSignal::new(None);

    let close = move || {
        spot_form.set(None);
        name.set(String::new());
        description.set(String::new());
        error.set(None);
    };

    view! {
        {move || spot_form.get().map(|at| {
            let save = move |_| {
                let result = editor.run(|ed| {
                    ed.submit_spot(&name.get_untracked(), &description.get_untracked(), at)
                });
                match result {
                    Some(Ok(_)) => close(),
                    Some(Err(e)) => error.set(Some(e.to_string())),
                    None => {}
                }
            };
            view! {
                <div style=format!("{PANEL} top: 64px; left: 12px; width: 300px; z-index: 3;")>
                    <div style="font-weight: 600;">"New spot"</div>
                    <div style="font-size: 0.75rem; color: #5a5860; margin-top: 2px;">
                        {format!("{:.5}, {:.5}", at.lat, at.lng)}
                    </div>
                    <DetailsFields name=name description=description />
                    {move || error.get().map(|e| view! {
                        <div style="font-size: 0.78rem; color: #a33; margin-top: 6px;">{e}</div>
                    })}
                    <div style="display: flex; justify-content: flex-end; gap: 8px; margin-top: 12px;">
                        <button style=BUTTON on:click=move |_| close()>"Cancel"</button>
                        <button style=BUTTON_ACTIVE on:click=save>"Save"</button>
                    </div>
                </div>
            }
        })}
    }
}

#[component]
fn RouteDialog() -> impl IntoView {
    let RouteForm(route_form) = expect_context();
    let editor: Editor = expect_context();
    let name = RwSignal::new(String::new());
    let description = RwSignal::new(String::new());
    let error: RwSignal<Option<String>> = RwSignal::new(None);

    let close = move || {
        route_form.set(None);
        name.set(String::new());
        description.set(String::new());
        error.set(None);
    };

    view! {
        {move || route_form.get().map(|route| {
            let save = move |_| {
                let result = editor.run(|ed| {
                    ed.save_route(&name.get_untracked(), &description.get_untracked())
                });
                match result {
                    Some(Ok(_)) => close(),
                    Some(Err(e)) => error.set(Some(e.to_string())),
                    None => {}
                }
            };
            let summary = format!(
                "{} points, {:.2} km",
                route.points.len(),
                path_length_km(&route.points)
            );
            view! {
                <div style=format!("{PANEL} top: 64px; left: 12px; width: 300px; z-index: 3;")>
                    <div style="font-weight: 600;">"Save route"</div>
                    <div style="font-size: 0.75rem; color: #5a5860; margin-top: 2px;">{summary}</div>
                    <DetailsFields name=name description=description />
                    {move || error.get().map(|e| view! {
                        <div style="font-size: 0.78rem; color: #a33; margin-top: 6px;">{e}</div>
                    })}
                    <div style="display: flex; justify-content: flex-end; gap: 8px; margin-top: 12px;">
                        <button style=BUTTON on:click=move |_| close()>"Keep drawing"</button>
                        <button style=BUTTON_ACTIVE on:click=save>"Save"</button>
                    </div>
                </div>
            }
        })}
    }
}

#[component]
fn DetailsFields(name: RwSignal<String>, description: RwSignal<String>) -> impl IntoView {
    view! {
        <input
            style=FIELD
            type="text"
            placeholder="Name"
            prop:value=move || name.get()
            on:input=move |e| {
                if let Some(v) = input_value(&e) {
                    name.set(v);
                }
            }
        />
        <textarea
            style=format!("{FIELD} min-height: 64px; resize: vertical;")
            placeholder="Description (optional)"
            prop:value=move || description.get()
            on:input=move |e| {
                if let Some(v) = input_value(&e) {
                    description.set(v);
                }
            }
        />
    }
}

#[component]
fn Library() -> impl IntoView {
    let Spots(spots) = expect_context();
    let Routes(routes) = expect_context();
    let editor: Editor = expect_context();

    let focus = move |request: FocusRequest| {
        editor.run(move |ed| ed.request_focus(request, now_ms()));
    };

    view! {
        <div style="width: 280px; flex-shrink: 0; overflow-y: auto; border-right: 1px solid #dedbd0; background: #faf9f6;">
            <div style="padding: 16px 16px 8px; font-weight: 700; letter-spacing: 0.04em;">"Spots"</div>
            {move || spots.get().into_iter().map(|spot| {
                let request = spot.coordinate().map(|at| FocusRequest::Spot {
                    id: spot.id.clone(),
                    lat: at.lat,
                    lng: at.lng,
                });
                let missing = request.is_none();
                view! {
                    <div style="display: flex; align-items: center; gap: 8px; padding: 6px 16px; font-size: 0.85rem;">
                        <span style="flex: 1; overflow: hidden; text-overflow: ellipsis; white-space: nowrap;">{spot.name}</span>
                        <button
                            style=BUTTON
                            disabled=missing
                            on:click=move |_| {
                                if let Some(request) = request.clone() {
                                    focus(request);
                                }
                            }
                        >"Show"</button>
                    </div>
                }
            }).collect_view()}
            <div style="padding: 16px 16px 8px; font-weight: 700; letter-spacing: 0.04em;">"Routes"</div>
            {move || routes.get().into_iter().map(|route| {
                let id = route.id.clone();
                let distance = route
                    .distance_km()
                    .map(|km| format!("{km:.1} km"))
                    .unwrap_or_default();
                view! {
                    <div style="display: flex; align-items: center; gap: 8px; padding: 6px 16px; font-size: 0.85rem;">
                        <span style="flex: 1; overflow: hidden; text-overflow: ellipsis; white-space: nowrap;">{route.name}</span>
                        <span style="font-size: 0.72rem; color: #5a5860;">{distance}</span>
                        <button
                            style=BUTTON
                            on:click=move |_| focus(FocusRequest::Route { id: id.clone() })
                        >"Show"</button>
                    </div>
                }
            }).collect_view()}
        </div>
    }
}
