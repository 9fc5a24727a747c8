use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use futures::task::{LocalFutureObj, LocalSpawn, SpawnError};
use gloo_timers::callback::Timeout;

use crate::config::{LOAD_TIMEOUT_MS, MapConfig};
use crate::editor::{EditorObserver, MapEditor};
use crate::mapbox::MapboxFactory;
use crate::store::MapStore;
use crate::surface::SurfaceEvent;

/// Runs persistence tasks on the browser's microtask queue.
pub struct BrowserSpawner;

impl LocalSpawn for BrowserSpawner {
    fn spawn_local_obj(&self, future: LocalFutureObj<'static, ()>) -> Result<(), SpawnError> {
        wasm_bindgen_futures::spawn_local(future);
        Ok(())
    }
}

pub fn now_ms() -> f64 {
    js_sys::Date::now()
}

/// Work waiting for the editor to be free.
enum Pending {
    Event(SurfaceEvent),
    Call(Box<dyn FnOnce(&mut MapEditor)>),
}

type PendingQueue = Rc<RefCell<VecDeque<Pending>>>;

/// Shared handle to the editor plus the queue pending work waits in.
///
/// mapbox-gl may fire events synchronously from inside a call the editor is making, so
/// events are queued and drained once the editor is free.
#[derive(Clone)]
pub struct EditorHandle {
    editor: Rc<RefCell<MapEditor>>,
    queue: PendingQueue,
}

/// The single armed poll timer and the deadline it fires at.
struct PollTimer {
    deadline: f64,
    timeout: Timeout,
}

thread_local! {
    static POLL_TIMER: RefCell<Option<PollTimer>> = const { RefCell::new(None) };
}

impl EditorHandle {
    pub fn new(config: &MapConfig, store: Rc<dyn MapStore>, observer: Rc<dyn EditorObserver>) -> Self {
        let queue: PendingQueue = Rc::default();
        let editor = Rc::new_cyclic(|weak: &Weak<RefCell<MapEditor>>| {
            let weak = weak.clone();
            let pending = queue.clone();
            let sink = Rc::new(move |event: SurfaceEvent| {
                pending.borrow_mut().push_back(Pending::Event(event));
                if let Some(editor) = weak.upgrade() {
                    drain(&editor, &pending);
                }
            });
            let mut editor = MapEditor::new(
                config.surface_options(),
                Box::new(MapboxFactory::new(sink)),
                store,
                Rc::new(BrowserSpawner),
                LOAD_TIMEOUT_MS,
            );
            editor.set_observer(observer);
            RefCell::new(editor)
        });
        Self { editor, queue }
    }

    /// Run `f` against the editor, then deliver any events it triggered.
    /// Returns `None` when the editor is busy; use [`EditorHandle::defer`] for calls that must land.
    pub fn with<R>(&self, f: impl FnOnce(&mut MapEditor) -> R) -> Option<R> {
        let result = {
            let Ok(mut editor) = self.editor.try_borrow_mut() else {
                tracing::warn!("map editor busy, dropping call");
                return None;
            };
            f(&mut editor)
        };
        drain(&self.editor, &self.queue);
        Some(result)
    }

    /// Run `f` now, or in order with queued events once the editor is free.
    pub fn defer(&self, f: impl FnOnce(&mut MapEditor) + 'static) {
        self.queue.borrow_mut().push_back(Pending::Call(Box::new(f)));
        drain(&self.editor, &self.queue);
    }

    pub fn mount(&self) {
        self.with(|editor| editor.mount(now_ms()));
    }

    pub fn unmount(&self) {
        POLL_TIMER.with(|slot| slot.borrow_mut().take());
        self.with(MapEditor::unmount);
        self.queue.borrow_mut().clear();
    }
}

/// Deliver pending work, retrying on the next tick when the editor is busy.
fn drain(editor: &Rc<RefCell<MapEditor>>, queue: &PendingQueue) {
    if drain_now(editor, queue, now_ms) {
        schedule_poll(editor, queue);
        return;
    }
    let editor = Rc::downgrade(editor);
    let queue = queue.clone();
    Timeout::new(0, move || {
        if let Some(editor) = editor.upgrade() {
            drain(&editor, &queue);
        }
    })
    .forget();
}

/// Returns `false`, leaving the queue untouched, when the editor is already borrowed.
fn drain_now(
    editor: &RefCell<MapEditor>,
    queue: &RefCell<VecDeque<Pending>>,
    clock: fn() -> f64,
) -> bool {
    let Ok(mut guard) = editor.try_borrow_mut() else {
        return false;
    };
    loop {
        let next = queue.borrow_mut().pop_front();
        match next {
            Some(Pending::Event(event)) => guard.handle_event(event, clock()),
            Some(Pending::Call(call)) => call(&mut guard),
            None => return true,
        }
    }
}

/// Arm one timer for the editor's next deadline. A timer already armed for the same
/// deadline is kept; no deadline disarms it.
fn schedule_poll(editor: &Rc<RefCell<MapEditor>>, queue: &PendingQueue) {
    let Ok(deadline) = editor.try_borrow().map(|editor| editor.next_deadline()) else {
        return;
    };
    POLL_TIMER.with(|slot| {
        let mut slot = slot.borrow_mut();
        let Some(deadline) = deadline else {
            *slot = None;
            return;
        };
        if slot.as_ref().is_some_and(|timer| timer.deadline == deadline) {
            return;
        }
        let weak = Rc::downgrade(editor);
        let queue = queue.clone();
        let timeout = Timeout::new(delay_until(deadline, now_ms()), move || {
            // Release our own slot without cancelling the callback that is running.
            if let Some(timer) = POLL_TIMER.with(|slot| slot.borrow_mut().take()) {
                let _id = timer.timeout.forget();
            }
            let Some(editor) = weak.upgrade() else {
                return;
            };
            if let Ok(mut guard) = editor.try_borrow_mut() {
                guard.poll(now_ms());
            }
            drain(&editor, &queue);
        });
        *slot = Some(PollTimer { deadline, timeout });
    });
}

/// Whole milliseconds from `now` until `deadline`, zero once it has passed.
fn delay_until(deadline: f64, now: f64) -> u32 {
    let delay = (deadline - now).ceil();
    if delay <= 0.0 {
        0
    } else {
        delay.min(f64::from(u32::MAX)) as u32
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use futures::executor::LocalPool;

    use super::*;
    use crate::readiness::Readiness;
    use crate::store::MemoryStore;
    use crate::surface::testing::RecordingFactory;

    fn editor(pool: &LocalPool) -> RefCell<MapEditor> {
        RefCell::new(MapEditor::new(
            MapConfig::default().surface_options(),
            Box::new(RecordingFactory::default()),
            Rc::new(MemoryStore::default()),
            Rc::new(pool.spawner()),
            LOAD_TIMEOUT_MS,
        ))
    }

    fn counting_call(count: &Rc<Cell<usize>>) -> Pending {
        let count = count.clone();
        Pending::Call(Box::new(move |_: &mut MapEditor| count.set(count.get() + 1)))
    }

    #[test]
    fn calls_wait_while_the_editor_is_busy() {
        let pool = LocalPool::new();
        let editor = editor(&pool);
        let queue = RefCell::new(VecDeque::new());
        let count = Rc::new(Cell::new(0));
        queue.borrow_mut().push_back(counting_call(&count));

        {
            let _busy = editor.borrow_mut();
            assert!(!drain_now(&editor, &queue, || 0.0));
        }
        assert_eq!(count.get(), 0);
        assert_eq!(queue.borrow().len(), 1);

        queue.borrow_mut().push_back(counting_call(&count));
        assert!(drain_now(&editor, &queue, || 0.0));
        assert_eq!(count.get(), 2);
        assert!(queue.borrow().is_empty());
    }

    #[test]
    fn events_and_calls_drain_in_order() {
        let pool = LocalPool::new();
        let editor = editor(&pool);
        let queue = RefCell::new(VecDeque::new());
        let seen = Rc::new(RefCell::new(Vec::new()));
        queue.borrow_mut().push_back(Pending::Event(SurfaceEvent::Loaded));
        let log = seen.clone();
        queue.borrow_mut().push_back(Pending::Call(Box::new(move |ed: &mut MapEditor| {
            log.borrow_mut().push(ed.readiness().clone());
        })));

        assert!(drain_now(&editor, &queue, || 0.0));
        // Unmounted editors ignore surface events, so the call still sees loading.
        assert_eq!(*seen.borrow(), vec![Readiness::Loading]);
        assert!(queue.borrow().is_empty());
    }

    #[test]
    fn delay_rounds_up_and_clamps_past_deadlines() {
        assert_eq!(delay_until(1_500.0, 1_000.0), 500);
        assert_eq!(delay_until(1_000.4, 1_000.0), 1);
        assert_eq!(delay_until(900.0, 1_000.0), 0);
        assert_eq!(delay_until(1_000.0, 1_000.0), 0);
    }
}
