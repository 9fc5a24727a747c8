//! `MapSurface` backed by the mapbox-gl JS library loaded on the page.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use js_sys::{Array, Reflect};
use rollum_shared::{Bounds, LatLng};
use serde::Serialize;
use serde_json::json;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;

use crate::surface::{
    Cursor, Flight, LineStyle, MapSurface, MarkerId, MarkerSpec, PopupContent, SurfaceError,
    SurfaceEvent, SurfaceFactory, SurfaceOptions,
};

const FOCUS_TICKET_KEY: &str = "focusTicket";

mod ffi {
    use wasm_bindgen::prelude::*;

    #[wasm_bindgen]
    extern "C" {
        #[wasm_bindgen(js_namespace = mapboxgl)]
        #[derive(Debug, Clone)]
        pub type Map;

        #[wasm_bindgen(constructor, js_namespace = mapboxgl, catch)]
        pub fn new(options: &JsValue) -> Result<Map, JsValue>;

        #[wasm_bindgen(method, js_name = addSource, catch)]
        pub fn add_source(this: &Map, id: &str, source: &JsValue) -> Result<(), JsValue>;

        #[wasm_bindgen(method, js_name = addLayer, catch)]
        pub fn add_layer(this: &Map, layer: &JsValue) -> Result<(), JsValue>;

        #[wasm_bindgen(method, js_name = getLayer)]
        pub fn get_layer(this: &Map, id: &str) -> JsValue;

        #[wasm_bindgen(method, js_name = getSource)]
        pub fn get_source(this: &Map, id: &str) -> JsValue;

        #[wasm_bindgen(method, js_name = removeLayer)]
        pub fn remove_layer(this: &Map, id: &str);

        #[wasm_bindgen(method, js_name = removeSource)]
        pub fn remove_source(this: &Map, id: &str);

        #[wasm_bindgen(method, js_name = flyTo, catch)]
        pub fn fly_to(this: &Map, options: &JsValue, event_data: &JsValue) -> Result<(), JsValue>;

        #[wasm_bindgen(method, js_name = fitBounds, catch)]
        pub fn fit_bounds(this: &Map, bounds: &JsValue, options: &JsValue) -> Result<(), JsValue>;

        #[wasm_bindgen(method)]
        pub fn on(this: &Map, event: &str, handler: &js_sys::Function);

        #[wasm_bindgen(method)]
        pub fn off(this: &Map, event: &str, handler: &js_sys::Function);

        #[wasm_bindgen(method, js_name = queryRenderedFeatures)]
        pub fn query_rendered_features(this: &Map, point: &JsValue, options: &JsValue) -> js_sys::Array;

        #[wasm_bindgen(method, js_name = getCanvas)]
        pub fn get_canvas(this: &Map) -> web_sys::HtmlElement;

        #[wasm_bindgen(method, js_name = addControl)]
        pub fn add_control(this: &Map, control: &NavigationControl, position: &str);

        #[wasm_bindgen(method)]
        pub fn remove(this: &Map);
    }

    #[wasm_bindgen]
    extern "C" {
        #[wasm_bindgen(js_namespace = mapboxgl)]
        #[derive(Debug, Clone)]
        pub type NavigationControl;

        #[wasm_bindgen(constructor, js_namespace = mapboxgl)]
        pub fn new() -> NavigationControl;
    }

    #[wasm_bindgen]
    extern "C" {
        #[wasm_bindgen(js_namespace = mapboxgl)]
        #[derive(Debug, Clone)]
        pub type Marker;

        #[wasm_bindgen(constructor, js_namespace = mapboxgl)]
        pub fn new(options: &JsValue) -> Marker;

        #[wasm_bindgen(method, js_name = setLngLat)]
        pub fn set_lng_lat(this: &Marker, lng_lat: &JsValue) -> Marker;

        #[wasm_bindgen(method, js_name = setPopup)]
        pub fn set_popup(this: &Marker, popup: &Popup) -> Marker;

        #[wasm_bindgen(method, js_name = addTo)]
        pub fn add_to(this: &Marker, map: &Map) -> Marker;

        #[wasm_bindgen(method, js_name = getPopup)]
        pub fn get_popup(this: &Marker) -> JsValue;

        #[wasm_bindgen(method, js_name = togglePopup)]
        pub fn toggle_popup(this: &Marker) -> Marker;

        #[wasm_bindgen(method)]
        pub fn remove(this: &Marker);
    }

    #[wasm_bindgen]
    extern "C" {
        #[wasm_bindgen(js_namespace = mapboxgl)]
        #[derive(Debug, Clone)]
        pub type Popup;

        #[wasm_bindgen(constructor, js_namespace = mapboxgl)]
        pub fn new(options: &JsValue) -> Popup;

        #[wasm_bindgen(method, js_name = setLngLat)]
        pub fn set_lng_lat(this: &Popup, lng_lat: &JsValue) -> Popup;

        #[wasm_bindgen(method, js_name = setHTML)]
        pub fn set_html(this: &Popup, html: &str) -> Popup;

        #[wasm_bindgen(method, js_name = addTo)]
        pub fn add_to(this: &Popup, map: &Map) -> Popup;

        #[wasm_bindgen(method, js_name = isOpen)]
        pub fn is_open(this: &Popup) -> bool;

        #[wasm_bindgen(method)]
        pub fn remove(this: &Popup);
    }
}

fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, SurfaceError> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| SurfaceError::Rejected(e.to_string()))
}

fn js_error(value: JsValue) -> SurfaceError {
    SurfaceError::Rejected(describe(&value))
}

fn describe(value: &JsValue) -> String {
    if let Some(message) = Reflect::get(value, &"message".into())
        .ok()
        .and_then(|m| m.as_string())
    {
        return message;
    }
    value.as_string().unwrap_or_else(|| format!("{value:?}"))
}

fn get(value: &JsValue, key: &str) -> Option<JsValue> {
    Reflect::get(value, &JsValue::from_str(key))
        .ok()
        .filter(|v| !v.is_undefined() && !v.is_null())
}

fn number(value: &JsValue, key: &str) -> Option<f64> {
    get(value, key).and_then(|v| v.as_f64())
}

fn lng_lat(at: LatLng) -> JsValue {
    Array::of2(&at.lng.into(), &at.lat.into()).into()
}

fn popup_for(content: &PopupContent) -> Result<ffi::Popup, SurfaceError> {
    let options = to_js(&json!({ "offset": 25, "closeButton": true }))?;
    Ok(ffi::Popup::new(&options).set_html(&content.to_html()))
}

type LayerSet = Rc<RefCell<BTreeSet<String>>>;

/// Ids of the interactive layers under the event's pointer position.
fn layers_at(map: &ffi::Map, interactive: &LayerSet, event: &JsValue) -> Vec<String> {
    let interactive = interactive.borrow();
    if interactive.is_empty() {
        return Vec::new();
    }
    let Some(point) = get(event, "point") else {
        return Vec::new();
    };
    let Ok(options) = to_js(&json!({ "layers": &*interactive })) else {
        return Vec::new();
    };
    map.query_rendered_features(&point, &options)
        .iter()
        .filter_map(|feature| get(&feature, "layer"))
        .filter_map(|layer| get(&layer, "id").and_then(|id| id.as_string()))
        .collect()
}

type Sink = Rc<dyn Fn(SurfaceEvent)>;

pub struct MapboxSurface {
    map: ffi::Map,
    markers: HashMap<MarkerId, ffi::Marker>,
    next_marker: MarkerId,
    route_popup: Option<ffi::Popup>,
    interactive: LayerSet,
    handlers: Vec<(&'static str, Closure<dyn Fn(JsValue)>)>,
    destroyed: bool,
}

impl MapboxSurface {
    fn subscribe(&mut self, sink: &Sink) {
        let load = {
            let sink = sink.clone();
            Closure::<dyn Fn(JsValue)>::new(move |_event: JsValue| sink(SurfaceEvent::Loaded))
        };

        let error = {
            let sink = sink.clone();
            Closure::<dyn Fn(JsValue)>::new(move |event: JsValue| {
                let message = get(&event, "error")
                    .map(|e| describe(&e))
                    .unwrap_or_else(|| "unknown map error".to_string());
                // Tile and source errors are recoverable; the map keeps rendering.
                if let Some(source) = get(&event, "sourceId").and_then(|s| s.as_string()) {
                    tracing::warn!(source = %source, error = %message, "map source error");
                    return;
                }
                sink(SurfaceEvent::Failed(message));
            })
        };

        let click = {
            let sink = sink.clone();
            let map = self.map.clone();
            let interactive = self.interactive.clone();
            Closure::<dyn Fn(JsValue)>::new(move |event: JsValue| {
                let Some(at) = get(&event, "lngLat") else {
                    return;
                };
                let (Some(lat), Some(lng)) = (number(&at, "lat"), number(&at, "lng")) else {
                    return;
                };
                sink(SurfaceEvent::Click {
                    at: LatLng::new(lat, lng),
                    layers: layers_at(&map, &interactive, &event),
                });
            })
        };

        let pointer = {
            let sink = sink.clone();
            let map = self.map.clone();
            let interactive = self.interactive.clone();
            Closure::<dyn Fn(JsValue)>::new(move |event: JsValue| {
                sink(SurfaceEvent::PointerMove {
                    layers: layers_at(&map, &interactive, &event),
                });
            })
        };

        let settled = {
            let sink = sink.clone();
            Closure::<dyn Fn(JsValue)>::new(move |event: JsValue| {
                // User pans also end in `moveend`; only tagged flights matter.
                if let Some(ticket) = number(&event, FOCUS_TICKET_KEY) {
                    sink(SurfaceEvent::CameraSettled {
                        ticket: Some(ticket as u64),
                    });
                }
            })
        };

        for (event, handler) in [
            ("load", load),
            ("error", error),
            ("click", click),
            ("mousemove", pointer),
            ("moveend", settled),
        ] {
            self.map.on(event, handler.as_ref().unchecked_ref());
            self.handlers.push((event, handler));
        }
    }
}

impl MapSurface for MapboxSurface {
    fn add_marker(&mut self, marker: MarkerSpec) -> Result<MarkerId, SurfaceError> {
        let options = to_js(&json!({ "color": marker.color, "scale": marker.scale }))?;
        let handle = ffi::Marker::new(&options).set_lng_lat(&lng_lat(marker.at));
        if let Some(content) = &marker.popup {
            handle.set_popup(&popup_for(content)?);
        }
        handle.add_to(&self.map);

        self.next_marker += 1;
        self.markers.insert(self.next_marker, handle);
        Ok(self.next_marker)
    }

    fn remove_marker(&mut self, id: MarkerId) {
        if let Some(marker) = self.markers.remove(&id) {
            marker.remove();
        }
    }

    fn open_marker_popup(&mut self, id: MarkerId) -> Result<(), SurfaceError> {
        let marker = self
            .markers
            .get(&id)
            .ok_or_else(|| SurfaceError::Rejected(format!("no marker {id}")))?;
        let popup = marker.get_popup();
        if popup.is_undefined() || popup.is_null() {
            return Err(SurfaceError::Rejected(format!("marker {id} has no popup")));
        }
        if !popup.unchecked_into::<ffi::Popup>().is_open() {
            marker.toggle_popup();
        }
        Ok(())
    }

    fn show_popup(&mut self, at: LatLng, content: &PopupContent) -> Result<(), SurfaceError> {
        if let Some(previous) = self.route_popup.take() {
            previous.remove();
        }
        let popup = popup_for(content)?
            .set_lng_lat(&lng_lat(at))
            .add_to(&self.map);
        self.route_popup = Some(popup);
        Ok(())
    }

    fn add_line_source(&mut self, id: &str, path: &[LatLng]) -> Result<(), SurfaceError> {
        let coordinates: Vec<[f64; 2]> = path.iter().map(|p| p.to_lng_lat()).collect();
        let source = to_js(&json!({
            "type": "geojson",
            "data": {
                "type": "Feature",
                "properties": {},
                "geometry": { "type": "LineString", "coordinates": coordinates },
            },
        }))?;
        self.map.add_source(id, &source).map_err(js_error)
    }

    fn add_line_layer(
        &mut self,
        id: &str,
        source: &str,
        style: &LineStyle,
    ) -> Result<(), SurfaceError> {
        let mut paint = json!({
            "line-color": style.color,
            "line-width": style.width,
            "line-opacity": style.opacity,
        });
        if let Some(dash) = style.dash {
            paint["line-dasharray"] = json!(dash);
        }
        let layer = to_js(&json!({
            "id": id,
            "type": "line",
            "source": source,
            "layout": { "line-join": "round", "line-cap": "round" },
            "paint": paint,
        }))?;
        self.map.add_layer(&layer).map_err(js_error)?;
        if style.interactive {
            self.interactive.borrow_mut().insert(id.to_string());
        }
        Ok(())
    }

    fn has_layer(&self, id: &str) -> bool {
        let layer = self.map.get_layer(id);
        !layer.is_undefined() && !layer.is_null()
    }

    fn has_source(&self, id: &str) -> bool {
        let source = self.map.get_source(id);
        !source.is_undefined() && !source.is_null()
    }

    fn remove_layer(&mut self, id: &str) {
        self.interactive.borrow_mut().remove(id);
        self.map.remove_layer(id);
    }

    fn remove_source(&mut self, id: &str) {
        self.map.remove_source(id);
    }

    fn set_cursor(&mut self, cursor: Cursor) {
        let canvas = self.map.get_canvas();
        if let Err(e) = canvas.style().set_property("cursor", cursor.css()) {
            tracing::warn!(error = %describe(&e), "failed to set map cursor");
        }
    }

    fn fly_to(&mut self, flight: Flight) -> Result<(), SurfaceError> {
        let options = to_js(&json!({
            "center": flight.center.to_lng_lat(),
            "zoom": flight.zoom,
            "duration": flight.duration_ms,
            "essential": true,
        }))?;
        let event_data = match flight.ticket {
            Some(ticket) => to_js(&json!({ FOCUS_TICKET_KEY: ticket }))?,
            None => to_js(&json!({}))?,
        };
        self.map.fly_to(&options, &event_data).map_err(js_error)
    }

    fn fit_bounds(
        &mut self,
        bounds: Bounds,
        padding_px: f64,
        duration_ms: f64,
    ) -> Result<(), SurfaceError> {
        let corners = to_js(&[
            bounds.south_west.to_lng_lat(),
            bounds.north_east.to_lng_lat(),
        ])?;
        let options = to_js(&json!({ "padding": padding_px, "duration": duration_ms }))?;
        self.map.fit_bounds(&corners, &options).map_err(js_error)
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.interactive.borrow_mut().clear();
        for (event, handler) in self.handlers.drain(..) {
            self.map.off(event, handler.as_ref().unchecked_ref());
        }
        for (_, marker) in self.markers.drain() {
            marker.remove();
        }
        if let Some(popup) = self.route_popup.take() {
            popup.remove();
        }
        self.map.remove();
    }
}

impl Drop for MapboxSurface {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Builds mapbox-gl maps and routes their events into `sink`.
pub struct MapboxFactory {
    sink: Sink,
}

impl MapboxFactory {
    pub fn new(sink: Sink) -> Self {
        Self { sink }
    }
}

impl SurfaceFactory for MapboxFactory {
    fn create(&mut self, options: &SurfaceOptions) -> Result<Box<dyn MapSurface>, SurfaceError> {
        let global = get(&js_sys::global(), "mapboxgl")
            .ok_or_else(|| SurfaceError::Construct("mapbox-gl is not loaded".into()))?;
        Reflect::set(
            &global,
            &"accessToken".into(),
            &options.access_token.trim().into(),
        )
        .map_err(|e| SurfaceError::Construct(describe(&e)))?;

        let map_options = to_js(&json!({
            "container": options.container_id,
            "style": options.style,
            "center": options.center.to_lng_lat(),
            "zoom": options.zoom,
        }))?;
        let map = ffi::Map::new(&map_options).map_err(|e| SurfaceError::Construct(describe(&e)))?;
        map.add_control(&ffi::NavigationControl::new(), "top-right");

        let mut surface = MapboxSurface {
            map,
            markers: HashMap::new(),
            next_marker: 0,
            route_popup: None,
            interactive: LayerSet::default(),
            handlers: Vec::new(),
            destroyed: false,
        };
        surface.subscribe(&self.sink);
        tracing::debug!(container = %options.container_id, "mapbox map created");
        Ok(Box::new(surface))
    }
}
