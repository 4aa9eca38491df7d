//! Typed publish/subscribe event bus.
//!
//! The bus is the single channel between the window (OS input), the renderer
//! (camera and cursor state) and the engine (key bindings). It lives on the
//! main thread: handlers are plain `FnMut` closures and the registry is shared
//! through `Rc`.
//!
//! Delivery is queued. `publish` appends to a FIFO queue and `dispatch` drains
//! it, so an event published from inside a handler is delivered later in the
//! same `dispatch` call, after the event currently being handled.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::{Rc, Weak};

use winit::keyboard::KeyCode;

/// Events carried by the bus.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event {
    /// A key went down.
    KeyPressed(KeyCode),
    /// A key went up.
    KeyReleased(KeyCode),
    /// Raw mouse motion since the previous event, in device units.
    MouseMoved { dx: f64, dy: f64 },
    /// Cursor should be hidden and captured (mouse-look mode).
    HideCursor,
    /// Cursor should be shown and released.
    ShowCursor,
    /// The application should close.
    WindowClose,
}

/// Discriminant of [`Event`], used to register interest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    KeyPressed,
    KeyReleased,
    MouseMoved,
    HideCursor,
    ShowCursor,
    WindowClose,
}

impl Event {
    /// Kind of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Event::KeyPressed(_) => EventKind::KeyPressed,
            Event::KeyReleased(_) => EventKind::KeyReleased,
            Event::MouseMoved { .. } => EventKind::MouseMoved,
            Event::HideCursor => EventKind::HideCursor,
            Event::ShowCursor => EventKind::ShowCursor,
            Event::WindowClose => EventKind::WindowClose,
        }
    }
}

type Handler = Rc<RefCell<dyn FnMut(&Event)>>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: HashMap<EventKind, Vec<(u64, Handler)>>,
    queue: VecDeque<Event>,
    dispatching: bool,
}

impl Registry {
    fn is_registered(&self, kind: EventKind, id: u64) -> bool {
        self.handlers
            .get(&kind)
            .is_some_and(|list| list.iter().any(|(hid, _)| *hid == id))
    }

    fn remove(&mut self, id: u64, kinds: &[EventKind]) {
        for kind in kinds {
            if let Some(list) = self.handlers.get_mut(kind) {
                list.retain(|(hid, _)| *hid != id);
            }
        }
    }
}

/// Shared handle to the event registry.
///
/// Cloning is cheap; all clones see the same handlers and queue.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Rc<RefCell<Registry>>,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for every kind in `kinds`.
    ///
    /// The handler stays registered until the returned [`Subscription`] is
    /// dropped.
    #[must_use = "dropping the subscription unregisters the handler"]
    pub fn subscribe<F>(&self, kinds: &[EventKind], handler: F) -> Subscription
    where
        F: FnMut(&Event) + 'static,
    {
        let handler: Handler = Rc::new(RefCell::new(handler));
        let mut registry = self.inner.borrow_mut();
        let id = registry.next_id;
        registry.next_id += 1;

        for kind in kinds {
            registry
                .handlers
                .entry(*kind)
                .or_default()
                .push((id, Rc::clone(&handler)));
        }

        Subscription {
            registry: Rc::downgrade(&self.inner),
            id,
            kinds: kinds.to_vec(),
        }
    }

    /// Queue an event for the next [`dispatch`](Self::dispatch).
    pub fn publish(&self, event: Event) {
        self.inner.borrow_mut().queue.push_back(event);
    }

    /// Deliver every queued event, including events queued by handlers
    /// while dispatching.
    ///
    /// A nested call from inside a handler returns immediately; the outer
    /// call delivers whatever the handler queued.
    pub fn dispatch(&self) {
        {
            let mut registry = self.inner.borrow_mut();
            if registry.dispatching {
                return;
            }
            registry.dispatching = true;
        }

        loop {
            let next = self.inner.borrow_mut().queue.pop_front();
            let Some(event) = next else { break };

            let kind = event.kind();
            let snapshot: Vec<(u64, Handler)> = self
                .inner
                .borrow()
                .handlers
                .get(&kind)
                .cloned()
                .unwrap_or_default();

            for (id, handler) in snapshot {
                // A handler earlier in this pass may have dropped a later one.
                if !self.inner.borrow().is_registered(kind, id) {
                    continue;
                }
                (handler.borrow_mut())(&event);
            }
        }

        self.inner.borrow_mut().dispatching = false;
    }

    /// Publish and immediately dispatch.
    pub fn fire(&self, event: Event) {
        self.publish(event);
        self.dispatch();
    }

    /// Number of live handlers for `kind`.
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.inner
            .borrow()
            .handlers
            .get(&kind)
            .map_or(0, Vec::len)
    }

    /// Number of events waiting for dispatch.
    pub fn pending(&self) -> usize {
        self.inner.borrow().queue.len()
    }
}

/// Registration guard returned by [`EventBus::subscribe`].
pub struct Subscription {
    registry: Weak<RefCell<Registry>>,
    id: u64,
    kinds: Vec<EventKind>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.borrow_mut().remove(self.id, &self.kinds);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("kinds", &self.kinds)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_dispatch_only_to_registered_kinds() {
        let bus = EventBus::new();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let _sub = bus.subscribe(&[EventKind::HideCursor], move |_| h.set(h.get() + 1));

        bus.fire(Event::ShowCursor);
        assert_eq!(hits.get(), 0);
        bus.fire(Event::HideCursor);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_handlers_run_in_registration_order() {
        let bus = EventBus::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let l1 = Rc::clone(&log);
        let _a = bus.subscribe(&[EventKind::WindowClose], move |_| l1.borrow_mut().push("a"));
        let l2 = Rc::clone(&log);
        let _b = bus.subscribe(&[EventKind::WindowClose], move |_| l2.borrow_mut().push("b"));

        bus.fire(Event::WindowClose);
        assert_eq!(*log.borrow(), vec!["a", "b"]);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let bus = EventBus::new();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let sub = bus.subscribe(&[EventKind::KeyPressed, EventKind::KeyReleased], move |_| {
            h.set(h.get() + 1)
        });
        assert_eq!(bus.subscriber_count(EventKind::KeyPressed), 1);
        assert_eq!(bus.subscriber_count(EventKind::KeyReleased), 1);

        drop(sub);
        assert_eq!(bus.subscriber_count(EventKind::KeyPressed), 0);
        bus.fire(Event::KeyPressed(KeyCode::KeyH));
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn test_publish_is_queued_until_dispatch() {
        let bus = EventBus::new();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let _sub = bus.subscribe(&[EventKind::MouseMoved], move |_| h.set(h.get() + 1));

        bus.publish(Event::MouseMoved { dx: 1.0, dy: 2.0 });
        bus.publish(Event::MouseMoved { dx: 3.0, dy: 4.0 });
        assert_eq!(hits.get(), 0);
        assert_eq!(bus.pending(), 2);

        bus.dispatch();
        assert_eq!(hits.get(), 2);
        assert_eq!(bus.pending(), 0);
    }

    #[test]
    fn test_nested_fire_is_delivered_after_current_event() {
        let bus = EventBus::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let inner_bus = bus.clone();
        let l1 = Rc::clone(&log);
        let _toggle = bus.subscribe(&[EventKind::KeyPressed], move |event| {
            l1.borrow_mut().push(format!("{:?}", event.kind()));
            inner_bus.fire(Event::ShowCursor);
            l1.borrow_mut().push("after-fire".to_string());
        });
        let l2 = Rc::clone(&log);
        let _cursor = bus.subscribe(&[EventKind::ShowCursor], move |_| {
            l2.borrow_mut().push("ShowCursor".to_string())
        });

        bus.fire(Event::KeyPressed(KeyCode::KeyH));
        assert_eq!(
            *log.borrow(),
            vec!["KeyPressed", "after-fire", "ShowCursor"]
        );
    }

    #[test]
    fn test_handler_may_drop_later_handler() {
        let bus = EventBus::new();
        let hits = Rc::new(Cell::new(0));

        let victim: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let v = Rc::clone(&victim);
        let _killer = bus.subscribe(&[EventKind::WindowClose], move |_| {
            v.borrow_mut().take();
        });
        let h = Rc::clone(&hits);
        *victim.borrow_mut() =
            Some(bus.subscribe(&[EventKind::WindowClose], move |_| h.set(h.get() + 1)));

        bus.fire(Event::WindowClose);
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn test_subscription_outliving_bus() {
        let bus = EventBus::new();
        let sub = bus.subscribe(&[EventKind::HideCursor], |_| {});
        drop(bus);
        drop(sub);
    }
}
