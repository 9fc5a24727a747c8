mod app;
mod config;
mod drawing;
mod editor;
mod focus;
mod host;
mod logging;
#[cfg(target_arch = "wasm32")]
mod mapbox;
mod mode;
mod readiness;
mod store;
mod surface;
mod sync;

#[cfg(not(target_arch = "wasm32"))]
mod mapbox {
    use std::rc::Rc;

    use crate::surface::{MapSurface, SurfaceError, SurfaceEvent, SurfaceFactory, SurfaceOptions};

    pub struct MapboxFactory;

    impl MapboxFactory {
        pub fn new(_sink: Rc<dyn Fn(SurfaceEvent)>) -> Self {
            Self
        }
    }

    impl SurfaceFactory for MapboxFactory {
        fn create(&mut self, _options: &SurfaceOptions) -> Result<Box<dyn MapSurface>, SurfaceError> {
            Err(SurfaceError::Construct("mapbox-gl requires a browser".into()))
        }
    }
}

use leptos::mount::mount_to;
use std::any::Any;
use std::cell::RefCell;
use wasm_bindgen::JsCast;

thread_local! {
    static APP_MOUNT_HANDLE: RefCell<Option<Box<dyn Any>>> = RefCell::new(None);
}

fn main() {
    console_error_panic_hook::set_once();
    logging::init();
    let Some(window) = web_sys::window() else {
        return;
    };
    let Some(document) = window.document() else {
        return;
    };
    let mount_target = document
        .get_element_by_id("app")
        .and_then(|node| node.dyn_into::<web_sys::HtmlElement>().ok())
        .or_else(|| document.body());
    let Some(target) = mount_target else {
        return;
    };

    APP_MOUNT_HANDLE.with(move |slot| {
        // Drop a previous mount first so its editor unmounts before the new one mounts.
        let _old = slot.borrow_mut().take();
        let handle = mount_to(target, app::App);
        *slot.borrow_mut() = Some(Box::new(handle));
    });
}
