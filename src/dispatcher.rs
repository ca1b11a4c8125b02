//! Classification of raw incoming MIDI into typed [`Event`]s, plus the connection-liveness
//! state machine driven by the device's active-sensing heartbeat.
//!
//! The dispatcher is a plain value that takes the current time as a parameter instead of
//! reading the clock itself, so every timing rule in here is unit-testable without hardware.
//! The surrounding [`Push2`](crate::Push2) object feeds it from the MIDI callback thread and
//! from the watchdog timer thread, and routes the returned events through the
//! [`HandlerRegistry`](crate::HandlerRegistry).

use std::time::{Duration, Instant};

use crate::device_map::{self, Pad, SUSTAIN_PEDAL_CC, TOUCH_STRIP_CC};
use crate::Event;

const NOTE_OFF: u8 = 0x80;
const NOTE_ON: u8 = 0x90;
const POLY_AFTERTOUCH: u8 = 0xA0;
const CONTROL_CHANGE: u8 = 0xB0;
const CHANNEL_AFTERTOUCH: u8 = 0xD0;
const PITCH_BEND: u8 = 0xE0;
const ACTIVE_SENSING: u8 = 0xFE;

/// Turns incoming MIDI messages into zero or more typed events and tracks whether the device
/// is currently alive.
///
/// Right after the device (re)appears it emits a burst of stale internal-state messages.
/// Those must not be mistaken for user input, so for a settling window after the first
/// heartbeat everything else is discarded. This is an observed device quirk, not an
/// optimization.
pub struct Dispatcher {
    heartbeat_window: Duration,
    settle_window: Duration,
    last_heartbeat: Option<Instant>,
    settling_until: Option<Instant>,
}

impl Dispatcher {
    pub fn new(heartbeat_window: Duration, settle_window: Duration) -> Self {
        Self {
            heartbeat_window,
            settle_window,
            last_heartbeat: None,
            settling_until: None,
        }
    }

    /// Whether a heartbeat has been seen recently enough to consider the device connected
    pub fn connected(&self) -> bool {
        self.last_heartbeat.is_some()
    }

    /// Processes one raw incoming MIDI message, stamped with its arrival time.
    ///
    /// Returns the events to dispatch. A returned [`Event::MidiConnected`] additionally means
    /// the LED state cache must be invalidated: the device resets its own LEDs across a
    /// reconnect, so a stale cache would suppress sends the hardware needs.
    pub fn on_midi_message(&mut self, now: Instant, data: &[u8]) -> Vec<Event> {
        if data.first() == Some(&ACTIVE_SENSING) {
            let was_gone = self.last_heartbeat.is_none();
            self.last_heartbeat = Some(now);
            if was_gone {
                self.settling_until = Some(now + self.settle_window);
                return vec![Event::MidiConnected];
            }
            return Vec::new();
        }

        // Anything arriving before the first heartbeat, or during the settling window, is the
        // device's startup noise and gets dropped
        if self.last_heartbeat.is_none() {
            return Vec::new();
        }
        if let Some(until) = self.settling_until {
            if now < until {
                log::debug!("discarding MIDI message during settling window: {:?}", data);
                return Vec::new();
            }
            self.settling_until = None;
        }

        let mut events = Vec::new();

        // Element classifiers in fixed order, first consumer wins
        let consumed = classify_pad(data, &mut events)
            || classify_button(data, &mut events)
            || classify_encoder(data, &mut events)
            || classify_touch_strip(data, &mut events);

        // The sustain pedal is not part of any element map and runs unconditionally
        classify_sustain_pedal(data, &mut events);

        if !consumed && events.is_empty() {
            log::trace!("unhandled MIDI message: {:?}", data);
        }

        events
    }

    /// The recurring watchdog check: call this independently of message arrival.
    ///
    /// If a heartbeat had been seen but none arrived within the watchdog window, returns a
    /// single [`Event::MidiDisconnected`] and forgets the heartbeat, so the next check is
    /// silent. This is the only disconnection signal there is — a silently vanished USB MIDI
    /// device produces no synchronous error.
    pub fn check_heartbeat(&mut self, now: Instant) -> Option<Event> {
        let last = self.last_heartbeat?;
        if now.duration_since(last) >= self.heartbeat_window {
            self.last_heartbeat = None;
            self.settling_until = None;
            return Some(Event::MidiDisconnected);
        }
        None
    }
}

fn classify_pad(data: &[u8], events: &mut Vec<Event>) -> bool {
    match *data {
        [status, note, velocity] if status & 0xF0 == NOTE_ON => match Pad::from_number(note) {
            Some(pad) => {
                // The device never sends zero-velocity note-ons for pads, but treat them as
                // releases like any other MIDI source would mean them
                if velocity == 0 {
                    events.push(Event::PadReleased { pad, velocity });
                } else {
                    events.push(Event::PadPressed { pad, velocity });
                }
                true
            }
            None => false,
        },
        [status, note, velocity] if status & 0xF0 == NOTE_OFF => match Pad::from_number(note) {
            Some(pad) => {
                events.push(Event::PadReleased { pad, velocity });
                true
            }
            None => false,
        },
        [status, note, value] if status & 0xF0 == POLY_AFTERTOUCH => {
            match Pad::from_number(note) {
                Some(pad) => {
                    events.push(Event::PadAftertouch {
                        pad: Some(pad),
                        value,
                    });
                    true
                }
                None => false,
            }
        }
        // Channel aftertouch has no note number; it applies to the whole grid
        [status, value] if status & 0xF0 == CHANNEL_AFTERTOUCH => {
            events.push(Event::PadAftertouch { pad: None, value });
            true
        }
        _ => false,
    }
}

fn classify_button(data: &[u8], events: &mut Vec<Event>) -> bool {
    if let [status, cc, value] = *data {
        if status & 0xF0 == CONTROL_CHANGE {
            if let Some(button) = device_map::button_by_cc(cc) {
                if value == 127 {
                    events.push(Event::ButtonPressed { button });
                } else {
                    events.push(Event::ButtonReleased { button });
                }
                return true;
            }
        }
    }
    false
}

fn classify_encoder(data: &[u8], events: &mut Vec<Event>) -> bool {
    match *data {
        [status, cc, value] if status & 0xF0 == CONTROL_CHANGE => {
            match device_map::encoder_by_cc(cc) {
                Some(encoder) => {
                    events.push(Event::EncoderRotated {
                        encoder,
                        delta: decode_rotation(value),
                    });
                    true
                }
                None => false,
            }
        }
        [status, note, velocity] if status & 0xF0 == NOTE_ON => {
            match device_map::encoder_by_touch_note(note) {
                Some(encoder) => {
                    if velocity == 127 {
                        events.push(Event::EncoderTouched { encoder });
                    } else {
                        events.push(Event::EncoderReleased { encoder });
                    }
                    true
                }
                None => false,
            }
        }
        [status, note, _] if status & 0xF0 == NOTE_OFF => {
            match device_map::encoder_by_touch_note(note) {
                Some(encoder) => {
                    events.push(Event::EncoderReleased { encoder });
                    true
                }
                None => false,
            }
        }
        _ => false,
    }
}

fn classify_touch_strip(data: &[u8], events: &mut Vec<Event>) -> bool {
    match *data {
        [status, lsb, msb] if status & 0xF0 == PITCH_BEND => {
            let value = (((msb as u16) << 7) | lsb as u16) as i16 - 8192;
            events.push(Event::TouchStripTouched { value });
            true
        }
        // In modulation-wheel mode the strip sends plain CC values instead
        [status, TOUCH_STRIP_CC, value] if status & 0xF0 == CONTROL_CHANGE => {
            events.push(Event::TouchStripTouched {
                value: value as i16,
            });
            true
        }
        _ => false,
    }
}

fn classify_sustain_pedal(data: &[u8], events: &mut Vec<Event>) {
    if let [status, SUSTAIN_PEDAL_CC, value] = *data {
        if status & 0xF0 == CONTROL_CHANGE {
            events.push(Event::SustainPedal {
                pressed: value >= 64,
            });
        }
    }
}

/// Rotation deltas use an asymmetric two's-complement-like encoding fixed by the hardware:
/// values above 63 are counter-clockwise steps counted down from 128
fn decode_rotation(value: u8) -> i8 {
    if value > 63 {
        -((128 - value as i16) as i8)
    } else {
        value as i8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ActionKind, HandlerRegistry, Qualifier};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const HEARTBEAT: &[u8] = &[0xFE];

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Duration::from_millis(500), Duration::from_secs(1))
    }

    /// A dispatcher that saw a heartbeat at `t0` and has settled by `t0 + 1.5s`
    fn settled(t0: Instant) -> Dispatcher {
        let mut d = dispatcher();
        assert_eq!(d.on_midi_message(t0, HEARTBEAT), vec![Event::MidiConnected]);
        d
    }

    fn after_settle(t0: Instant) -> Instant {
        t0 + Duration::from_millis(1500)
    }

    #[test]
    fn first_heartbeat_connects_and_opens_settling_window() {
        let t0 = Instant::now();
        let mut d = dispatcher();
        assert_eq!(d.on_midi_message(t0, HEARTBEAT), vec![Event::MidiConnected]);
        // Further heartbeats are silent
        assert!(d
            .on_midi_message(t0 + Duration::from_millis(300), HEARTBEAT)
            .is_empty());
        assert!(d.connected());
    }

    #[test]
    fn messages_before_any_heartbeat_are_dropped() {
        let mut d = dispatcher();
        assert!(d
            .on_midi_message(Instant::now(), &[0x90, 36, 100])
            .is_empty());
    }

    #[test]
    fn settling_window_drops_then_accepts() {
        let t0 = Instant::now();
        let mut d = settled(t0);

        // Within one second of the first heartbeat: dropped
        let during = t0 + Duration::from_millis(900);
        assert!(d.on_midi_message(during, &[0x90, 36, 100]).is_empty());

        // The same message 1.1s after: dispatched
        let after = t0 + Duration::from_millis(1100);
        let events = d.on_midi_message(after, &[0x90, 36, 100]);
        assert_eq!(
            events,
            vec![Event::PadPressed {
                pad: Pad::from_number(36).unwrap(),
                velocity: 100
            }]
        );
    }

    #[test]
    fn heartbeat_gap_emits_exactly_one_disconnect() {
        let t0 = Instant::now();
        let mut d = settled(t0);

        assert_eq!(d.check_heartbeat(t0 + Duration::from_millis(300)), None);
        assert_eq!(d.check_heartbeat(t0 + Duration::from_millis(499)), None);
        assert_eq!(
            d.check_heartbeat(t0 + Duration::from_millis(500)),
            Some(Event::MidiDisconnected)
        );
        // Only once
        assert_eq!(d.check_heartbeat(t0 + Duration::from_millis(700)), None);
        assert!(!d.connected());
    }

    #[test]
    fn heartbeat_after_gap_reconnects_and_settles_again() {
        let t0 = Instant::now();
        let mut d = settled(t0);
        d.check_heartbeat(t0 + Duration::from_secs(1));

        let t1 = t0 + Duration::from_secs(5);
        assert_eq!(d.on_midi_message(t1, HEARTBEAT), vec![Event::MidiConnected]);
        // Settling applies again after the reconnect
        assert!(d
            .on_midi_message(t1 + Duration::from_millis(100), &[0x90, 36, 100])
            .is_empty());
    }

    #[test]
    fn pad_press_release_and_aftertouch() {
        let t0 = Instant::now();
        let mut d = settled(t0);
        let t = after_settle(t0);
        let pad = Pad::from_number(36).unwrap();
        assert_eq!(pad.i, 7);
        assert_eq!(pad.j, 0);

        assert_eq!(
            d.on_midi_message(t, &[0x90, 36, 100]),
            vec![Event::PadPressed { pad, velocity: 100 }]
        );
        assert_eq!(
            d.on_midi_message(t, &[0x80, 36, 0]),
            vec![Event::PadReleased { pad, velocity: 0 }]
        );
        assert_eq!(
            d.on_midi_message(t, &[0xA0, 36, 42]),
            vec![Event::PadAftertouch {
                pad: Some(pad),
                value: 42
            }]
        );
        // Channel aftertouch carries no pad identity
        assert_eq!(
            d.on_midi_message(t, &[0xD0, 55]),
            vec![Event::PadAftertouch {
                pad: None,
                value: 55
            }]
        );
    }

    #[test]
    fn button_press_is_value_127_everything_else_release() {
        let t0 = Instant::now();
        let mut d = settled(t0);
        let t = after_settle(t0);
        let play = device_map::button_by_cc(85).unwrap();

        assert_eq!(
            d.on_midi_message(t, &[0xB0, 85, 127]),
            vec![Event::ButtonPressed { button: play }]
        );
        assert_eq!(
            d.on_midi_message(t, &[0xB0, 85, 0]),
            vec![Event::ButtonReleased { button: play }]
        );
    }

    #[test]
    fn encoder_rotation_decode() {
        assert_eq!(decode_rotation(1), 1);
        assert_eq!(decode_rotation(63), 63);
        assert_eq!(decode_rotation(127), -1);
        assert_eq!(decode_rotation(64), -64);

        let t0 = Instant::now();
        let mut d = settled(t0);
        let t = after_settle(t0);
        let encoder = device_map::encoder_by_cc(71).unwrap();
        assert_eq!(
            d.on_midi_message(t, &[0xB0, 71, 127]),
            vec![Event::EncoderRotated { encoder, delta: -1 }]
        );
    }

    #[test]
    fn encoder_touch_and_release() {
        let t0 = Instant::now();
        let mut d = settled(t0);
        let t = after_settle(t0);
        let tempo = device_map::encoder_by_touch_note(10).unwrap();

        assert_eq!(
            d.on_midi_message(t, &[0x90, 10, 127]),
            vec![Event::EncoderTouched { encoder: tempo }]
        );
        assert_eq!(
            d.on_midi_message(t, &[0x90, 10, 0]),
            vec![Event::EncoderReleased { encoder: tempo }]
        );
        assert_eq!(
            d.on_midi_message(t, &[0x80, 10, 0]),
            vec![Event::EncoderReleased { encoder: tempo }]
        );
    }

    #[test]
    fn touch_strip_pitch_bend_and_cc() {
        let t0 = Instant::now();
        let mut d = settled(t0);
        let t = after_settle(t0);

        // Center position
        assert_eq!(
            d.on_midi_message(t, &[0xE0, 0x00, 0x40]),
            vec![Event::TouchStripTouched { value: 0 }]
        );
        // Full deflection up
        assert_eq!(
            d.on_midi_message(t, &[0xE0, 0x7F, 0x7F]),
            vec![Event::TouchStripTouched { value: 8191 }]
        );
        // Modulation-wheel mode sends plain CC 12 values
        assert_eq!(
            d.on_midi_message(t, &[0xB0, 12, 100]),
            vec![Event::TouchStripTouched { value: 100 }]
        );
    }

    #[test]
    fn sustain_pedal_threshold() {
        let t0 = Instant::now();
        let mut d = settled(t0);
        let t = after_settle(t0);

        assert_eq!(
            d.on_midi_message(t, &[0xB0, 64, 127]),
            vec![Event::SustainPedal { pressed: true }]
        );
        assert_eq!(
            d.on_midi_message(t, &[0xB0, 64, 0]),
            vec![Event::SustainPedal { pressed: false }]
        );
    }

    #[test]
    fn pad_press_reaches_generic_and_individual_handlers() {
        // Pad (0, 3) is note 95
        assert_eq!(device_map::pad_ij_to_pad_n(0, 3), 95);

        let t0 = Instant::now();
        let mut d = settled(t0);
        let events = d.on_midi_message(after_settle(t0), &[0x90, 95, 100]);

        let mut registry = HandlerRegistry::new();
        let generic_velocity = Arc::new(AtomicUsize::new(0));
        let individual_velocity = Arc::new(AtomicUsize::new(0));

        let v = Arc::clone(&generic_velocity);
        registry.register(
            ActionKind::PadPressed,
            Box::new(move |event| {
                if let Event::PadPressed { velocity, .. } = event {
                    v.store(*velocity as usize, Ordering::SeqCst);
                }
            }),
        );
        let v = Arc::clone(&individual_velocity);
        registry.register_for(
            ActionKind::PadPressed,
            Qualifier::Pad(95),
            Box::new(move |event| {
                if let Event::PadPressed { velocity, .. } = event {
                    v.store(*velocity as usize, Ordering::SeqCst);
                }
            }),
        );

        for event in &events {
            registry.emit(event);
        }
        assert_eq!(generic_velocity.load(Ordering::SeqCst), 100);
        assert_eq!(individual_velocity.load(Ordering::SeqCst), 100);
    }
}
