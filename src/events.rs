//! Typed hardware events and the handler registry that routes them.
//!
//! Instead of a global, string-keyed action registry, handlers live in an explicit
//! [`HandlerRegistry`] keyed by ([`ActionKind`], optional [`Qualifier`]). Registering for a kind
//! alone receives every event of that kind; registering with a qualifier receives only the
//! events of that one element. When both registrations exist, both fire — generic first.

use std::collections::HashMap;

use crate::device_map::{ButtonSpec, EncoderSpec, Pad};

/// A classified hardware event
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Event {
    PadPressed { pad: Pad, velocity: u8 },
    PadReleased { pad: Pad, velocity: u8 },
    /// Pressure change on a pad. `pad` is `None` for channel aftertouch, which carries no note
    /// number and applies to the grid as a whole.
    PadAftertouch { pad: Option<Pad>, value: u8 },
    ButtonPressed { button: &'static ButtonSpec },
    ButtonReleased { button: &'static ButtonSpec },
    /// Rotation delta: positive clockwise, negative counter-clockwise
    EncoderRotated { encoder: &'static EncoderSpec, delta: i8 },
    EncoderTouched { encoder: &'static EncoderSpec },
    EncoderReleased { encoder: &'static EncoderSpec },
    /// Finger position on the touch strip. In the default pitch-bend mode this is the signed
    /// 14-bit bend amount; in modulation-wheel mode it is the raw 7-bit CC value. Which one
    /// arrives depends on the mode the caller configured — the message itself doesn't say.
    TouchStripTouched { value: i16 },
    SustainPedal { pressed: bool },
    /// Heartbeat messages (re)appeared: the device is alive
    MidiConnected,
    /// No heartbeat within the watchdog window: the device is gone
    MidiDisconnected,
    /// A display write failed; the USB pipe is down until reconfigured
    DisplayDisconnected,
}

impl Event {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::PadPressed { .. } => ActionKind::PadPressed,
            Self::PadReleased { .. } => ActionKind::PadReleased,
            Self::PadAftertouch { .. } => ActionKind::PadAftertouch,
            Self::ButtonPressed { .. } => ActionKind::ButtonPressed,
            Self::ButtonReleased { .. } => ActionKind::ButtonReleased,
            Self::EncoderRotated { .. } => ActionKind::EncoderRotated,
            Self::EncoderTouched { .. } => ActionKind::EncoderTouched,
            Self::EncoderReleased { .. } => ActionKind::EncoderReleased,
            Self::TouchStripTouched { .. } => ActionKind::TouchStripTouched,
            Self::SustainPedal { .. } => ActionKind::SustainPedal,
            Self::MidiConnected => ActionKind::MidiConnected,
            Self::MidiDisconnected => ActionKind::MidiDisconnected,
            Self::DisplayDisconnected => ActionKind::DisplayDisconnected,
        }
    }

    /// The element-specific registration key this event additionally dispatches to, if any
    pub fn qualifier(&self) -> Option<Qualifier> {
        match self {
            Self::PadPressed { pad, .. } | Self::PadReleased { pad, .. } => {
                Some(Qualifier::Pad(pad.number))
            }
            Self::PadAftertouch { pad, .. } => pad.map(|pad| Qualifier::Pad(pad.number)),
            Self::ButtonPressed { button } | Self::ButtonReleased { button } => {
                Some(Qualifier::Button(button.number))
            }
            Self::EncoderRotated { encoder, .. }
            | Self::EncoderTouched { encoder }
            | Self::EncoderReleased { encoder } => Some(Qualifier::Encoder(encoder.number)),
            _ => None,
        }
    }
}

/// The kind of an [`Event`], used as a registration key
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ActionKind {
    PadPressed,
    PadReleased,
    PadAftertouch,
    ButtonPressed,
    ButtonReleased,
    EncoderRotated,
    EncoderTouched,
    EncoderReleased,
    TouchStripTouched,
    SustainPedal,
    MidiConnected,
    MidiDisconnected,
    DisplayDisconnected,
}

/// Narrows a registration to a single element: a pad by note number, a button by CC number, an
/// encoder by rotation CC number
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Qualifier {
    Pad(u8),
    Button(u8),
    Encoder(u8),
}

pub type Handler = Box<dyn FnMut(&Event) + Send>;

/// Ordered lists of handlers keyed by action kind and optional element qualifier
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<(ActionKind, Option<Qualifier>), Vec<Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for every event of the given kind
    pub fn register(&mut self, kind: ActionKind, handler: Handler) {
        self.handlers.entry((kind, None)).or_default().push(handler);
    }

    /// Registers a handler for events of the given kind on one specific element
    pub fn register_for(&mut self, kind: ActionKind, qualifier: Qualifier, handler: Handler) {
        self.handlers
            .entry((kind, Some(qualifier)))
            .or_default()
            .push(handler);
    }

    /// Invokes all handlers for `event`: first those registered for the kind alone, then those
    /// registered for the specific element. Within a list, handlers run in registration order.
    pub fn emit(&mut self, event: &Event) {
        if let Some(handlers) = self.handlers.get_mut(&(event.kind(), None)) {
            for handler in handlers.iter_mut() {
                handler(event);
            }
        }
        if let Some(qualifier) = event.qualifier() {
            if let Some(handlers) = self.handlers.get_mut(&(event.kind(), Some(qualifier))) {
                for handler in handlers.iter_mut() {
                    handler(event);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device_map;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn pad_event(n: u8, velocity: u8) -> Event {
        Event::PadPressed {
            pad: Pad::from_number(n).unwrap(),
            velocity,
        }
    }

    #[test]
    fn generic_and_qualified_handlers_both_fire_in_order() {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut registry = HandlerRegistry::new();

        let log2 = Arc::clone(&log);
        registry.register(
            ActionKind::PadPressed,
            Box::new(move |_| log2.lock().unwrap().push("generic")),
        );
        let log3 = Arc::clone(&log);
        registry.register_for(
            ActionKind::PadPressed,
            Qualifier::Pad(36),
            Box::new(move |_| log3.lock().unwrap().push("pad 36")),
        );

        registry.emit(&pad_event(36, 100));
        assert_eq!(*log.lock().unwrap(), vec!["generic", "pad 36"]);
    }

    #[test]
    fn qualified_handler_ignores_other_elements() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut registry = HandlerRegistry::new();
        let count2 = Arc::clone(&count);
        registry.register_for(
            ActionKind::PadPressed,
            Qualifier::Pad(36),
            Box::new(move |_| {
                count2.fetch_add(1, Ordering::SeqCst);
            }),
        );

        registry.emit(&pad_event(37, 1));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        registry.emit(&pad_event(36, 1));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn channel_aftertouch_has_no_qualifier() {
        let event = Event::PadAftertouch {
            pad: None,
            value: 30,
        };
        assert_eq!(event.qualifier(), None);
        assert_eq!(event.kind(), ActionKind::PadAftertouch);
    }

    #[test]
    fn encoder_events_qualify_by_rotation_cc() {
        let encoder = device_map::encoder_by_cc(71).unwrap();
        let touched = Event::EncoderTouched { encoder };
        assert_eq!(touched.qualifier(), Some(Qualifier::Encoder(71)));
    }
}
