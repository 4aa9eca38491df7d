//! Engine-level key bindings.
//!
//! | Key                 | Action                                    |
//! |---------------------|-------------------------------------------|
//! | H                   | toggle between mouse-look and free cursor |
//! | Escape              | close the application                     |
//!
//! With the cursor free, the light editor keys apply:
//!
//! | Key                 | Action                                    |
//! |---------------------|-------------------------------------------|
//! | Arrows              | move the light along X and Z              |
//! | PageUp / PageDown   | move the light along Y                    |
//! | R / G / B           | step the red, green or blue channel       |
//! | [ / ]               | halve or double the quadratic attenuation |

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use glam::Vec3;
use stimply_core::{Event, EventBus, EventKind, KeyCode, Subscription};
use stimply_renderer::LightEdit;

/// Distance one light editor key press moves the light.
pub const LIGHT_STEP: f32 = 1.0;

/// Event a key press maps to, given the current cursor mode.
pub fn key_binding(key: KeyCode, cursor_hidden: bool) -> Option<Event> {
    match key {
        KeyCode::KeyH if cursor_hidden => Some(Event::ShowCursor),
        KeyCode::KeyH => Some(Event::HideCursor),
        KeyCode::Escape => Some(Event::WindowClose),
        _ => None,
    }
}

/// Light edit a key press maps to.
pub fn light_binding(key: KeyCode) -> Option<LightEdit> {
    let edit = match key {
        KeyCode::ArrowLeft => LightEdit::Move(Vec3::new(-LIGHT_STEP, 0.0, 0.0)),
        KeyCode::ArrowRight => LightEdit::Move(Vec3::new(LIGHT_STEP, 0.0, 0.0)),
        KeyCode::ArrowUp => LightEdit::Move(Vec3::new(0.0, 0.0, LIGHT_STEP)),
        KeyCode::ArrowDown => LightEdit::Move(Vec3::new(0.0, 0.0, -LIGHT_STEP)),
        KeyCode::PageUp => LightEdit::Move(Vec3::new(0.0, LIGHT_STEP, 0.0)),
        KeyCode::PageDown => LightEdit::Move(Vec3::new(0.0, -LIGHT_STEP, 0.0)),
        KeyCode::KeyR => LightEdit::CycleColor(0),
        KeyCode::KeyG => LightEdit::CycleColor(1),
        KeyCode::KeyB => LightEdit::CycleColor(2),
        KeyCode::BracketLeft => LightEdit::ScaleQuadratic(0.5),
        KeyCode::BracketRight => LightEdit::ScaleQuadratic(2.0),
        _ => return None,
    };
    Some(edit)
}

/// Subscriptions implementing the key bindings and the close request.
pub struct Controls {
    running: Rc<Cell<bool>>,
    cursor_hidden: Rc<Cell<bool>>,
    light_edits: Rc<RefCell<Vec<LightEdit>>>,
    _subscriptions: Vec<Subscription>,
}

impl Controls {
    pub fn new(bus: &EventBus) -> Self {
        let running = Rc::new(Cell::new(true));
        let cursor_hidden = Rc::new(Cell::new(false));
        let light_edits = Rc::new(RefCell::new(Vec::new()));

        let keys = {
            let publisher = bus.clone();
            let hidden = Rc::clone(&cursor_hidden);
            let edits = Rc::clone(&light_edits);
            bus.subscribe(&[EventKind::KeyPressed], move |event| {
                let Event::KeyPressed(key) = *event else {
                    return;
                };
                if let Some(action) = key_binding(key, hidden.get()) {
                    publisher.publish(action);
                } else if !hidden.get()
                    && let Some(edit) = light_binding(key)
                {
                    edits.borrow_mut().push(edit);
                }
            })
        };

        let cursor = {
            let hidden = Rc::clone(&cursor_hidden);
            bus.subscribe(&[EventKind::HideCursor, EventKind::ShowCursor], move |event| {
                hidden.set(matches!(event, Event::HideCursor));
            })
        };

        let close = {
            let running = Rc::clone(&running);
            bus.subscribe(&[EventKind::WindowClose], move |_| {
                tracing::info!("Close requested, shutting down");
                running.set(false);
            })
        };

        Self {
            running,
            cursor_hidden,
            light_edits,
            _subscriptions: vec![keys, cursor, close],
        }
    }

    /// False once a close was requested.
    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.get()
    }

    #[inline]
    pub fn is_cursor_hidden(&self) -> bool {
        self.cursor_hidden.get()
    }

    /// Light edits requested since the last call, oldest first.
    pub fn take_light_edits(&self) -> Vec<LightEdit> {
        std::mem::take(&mut *self.light_edits.borrow_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_binding() {
        assert_eq!(key_binding(KeyCode::KeyH, true), Some(Event::ShowCursor));
        assert_eq!(key_binding(KeyCode::KeyH, false), Some(Event::HideCursor));
        assert_eq!(key_binding(KeyCode::Escape, false), Some(Event::WindowClose));
        assert_eq!(key_binding(KeyCode::KeyW, false), None);
    }

    #[test]
    fn test_h_toggles_cursor() {
        let bus = EventBus::new();
        let controls = Controls::new(&bus);

        bus.fire(Event::HideCursor);
        assert!(controls.is_cursor_hidden());

        bus.fire(Event::KeyPressed(KeyCode::KeyH));
        assert!(!controls.is_cursor_hidden());

        bus.fire(Event::KeyPressed(KeyCode::KeyH));
        assert!(controls.is_cursor_hidden());
    }

    #[test]
    fn test_light_binding() {
        assert_eq!(
            light_binding(KeyCode::PageUp),
            Some(LightEdit::Move(Vec3::new(0.0, LIGHT_STEP, 0.0)))
        );
        assert_eq!(light_binding(KeyCode::KeyB), Some(LightEdit::CycleColor(2)));
        assert_eq!(
            light_binding(KeyCode::BracketRight),
            Some(LightEdit::ScaleQuadratic(2.0))
        );
        assert_eq!(light_binding(KeyCode::KeyW), None);
    }

    #[test]
    fn test_light_keys_only_edit_with_free_cursor() {
        let bus = EventBus::new();
        let controls = Controls::new(&bus);

        bus.fire(Event::HideCursor);
        bus.fire(Event::KeyPressed(KeyCode::ArrowLeft));
        assert!(controls.take_light_edits().is_empty());

        bus.fire(Event::ShowCursor);
        bus.fire(Event::KeyPressed(KeyCode::ArrowLeft));
        bus.fire(Event::KeyPressed(KeyCode::KeyR));
        assert_eq!(
            controls.take_light_edits(),
            vec![
                LightEdit::Move(Vec3::new(-LIGHT_STEP, 0.0, 0.0)),
                LightEdit::CycleColor(0)
            ]
        );
        assert!(controls.take_light_edits().is_empty());
    }

    #[test]
    fn test_escape_stops_running() {
        let bus = EventBus::new();
        let controls = Controls::new(&bus);
        assert!(controls.is_running());

        bus.fire(Event::KeyPressed(KeyCode::Escape));
        assert!(!controls.is_running());
    }

    #[test]
    fn test_drop_releases_handlers() {
        let bus = EventBus::new();
        let controls = Controls::new(&bus);
        assert_eq!(bus.subscriber_count(EventKind::KeyPressed), 1);
        drop(controls);
        assert_eq!(bus.subscriber_count(EventKind::KeyPressed), 0);
        assert_eq!(bus.subscriber_count(EventKind::WindowClose), 0);
    }
}
