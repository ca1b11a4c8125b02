//! MIDI port lifecycle: finding the Push 2's ports by name, lazy rate-limited (re)connection,
//! and fire-and-forget output.
//!
//! The device exposes two logical port pairs, "Live" (what Ableton Live talks to, the default)
//! and "User". How they show up differs per OS, so the name matching is platform-specific.

use std::time::{Duration, Instant};

use midir::{Ignore, MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};

use crate::ok_or_continue;
use crate::util::RateLimiter;
use crate::Error;

/// Linux ALSA exposes the two port pairs as client-name suffixes `:0` (Live) and `:1` (User)
#[cfg(target_os = "linux")]
fn port_matches(name: &str, user_port: bool) -> bool {
    let suffix = if user_port { ":1" } else { ":0" };
    name.contains("Ableton Push 2") && name.ends_with(suffix)
}

/// Windows gives the second port pair distinct `MIDIIN2`/`MIDIOUT2` names
#[cfg(target_os = "windows")]
fn port_matches(name: &str, user_port: bool) -> bool {
    let is_second_pair = name.contains("MIDIIN2") || name.contains("MIDIOUT2");
    if user_port {
        is_second_pair
    } else {
        name.contains("Ableton Push 2") && !is_second_pair
    }
}

/// macOS uses exact port names
#[cfg(target_os = "macos")]
fn port_matches(name: &str, user_port: bool) -> bool {
    if user_port {
        name == "Ableton Push 2 User Port"
    } else {
        name == "Ableton Push 2 Live Port"
    }
}

#[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
fn port_matches(name: &str, _user_port: bool) -> bool {
    name.contains("Ableton Push 2")
}

fn find_port<T: midir::MidiIO>(midi_io: &T, user_port: bool) -> Option<T::Port> {
    for port in midi_io.ports() {
        let name = ok_or_continue!(midi_io.port_name(&port));
        if port_matches(&name, user_port) {
            return Some(port);
        }
    }
    None
}

/// Opens the MIDI input port and hands every incoming message to `callback`.
///
/// System-message filtering is disabled on the port: the active-sensing heartbeats the
/// dispatcher lives off would otherwise never be delivered.
pub(crate) fn connect_input<F>(
    user_port: bool,
    mut callback: F,
) -> Result<MidiInputConnection<()>, Error>
where
    F: FnMut(u64, &[u8]) + Send + 'static,
{
    let mut midi_input = MidiInput::new(crate::APPLICATION_NAME)?;
    midi_input.ignore(Ignore::None);

    let port = find_port(&midi_input, user_port).ok_or(Error::DeviceNotFound)?;
    let connection = midi_input.connect(
        &port,
        "Pushy Input",
        move |timestamp, data, _| callback(timestamp, data),
        (),
    )?;
    Ok(connection)
}

/// Owns the MIDI output connection. Connection is lazy: the first send triggers an attempt,
/// and failed sends leave the message dropped instead of erroring — LED updates are frequent
/// and fire-and-forget, and callers must keep working with the hardware absent.
pub(crate) struct MidiTransport {
    user_port: bool,
    output: Option<MidiOutputConnection>,
    limiter: RateLimiter,
}

impl MidiTransport {
    pub fn new(user_port: bool, reconnect_interval: Duration) -> Self {
        Self {
            user_port,
            output: None,
            limiter: RateLimiter::new(reconnect_interval),
        }
    }

    pub fn connected(&self) -> bool {
        self.output.is_some()
    }

    /// Sends raw MIDI bytes, connecting first if necessary. Returns whether the message went
    /// out; a `false` means it was dropped (device absent or write failed).
    pub fn send(&mut self, bytes: &[u8]) -> bool {
        if self.output.is_none() && !self.try_connect(Instant::now()) {
            return false;
        }

        let connection = match self.output.as_mut() {
            Some(connection) => connection,
            None => return false,
        };
        match connection.send(bytes) {
            Ok(()) => true,
            Err(e) => {
                // Write failure means the device is gone; drop the connection so the next
                // send attempts a fresh connect
                log::warn!("MIDI send failed, dropping output connection: {}", e);
                self.output = None;
                false
            }
        }
    }

    fn try_connect(&mut self, now: Instant) -> bool {
        if !self.limiter.check(now) {
            return false;
        }

        match Self::open_output(self.user_port) {
            Ok(connection) => {
                log::info!("connected MIDI output");
                self.output = Some(connection);
                self.limiter.reset();
                true
            }
            Err(e) => {
                log::debug!("MIDI output connect attempt failed: {}", e);
                false
            }
        }
    }

    fn open_output(user_port: bool) -> Result<MidiOutputConnection, Error> {
        let midi_output = MidiOutput::new(crate::APPLICATION_NAME)?;
        let port = find_port(&midi_output, user_port).ok_or(Error::DeviceNotFound)?;
        let connection = midi_output.connect(&port, "Pushy Output")?;
        Ok(connection)
    }
}

#[cfg(test)]
#[cfg(target_os = "linux")]
mod tests {
    use super::*;

    #[test]
    fn linux_port_matching_uses_client_suffixes() {
        assert!(port_matches("Ableton Push 2:0", false));
        assert!(!port_matches("Ableton Push 2:0", true));
        assert!(port_matches("Ableton Push 2:1", true));
        assert!(!port_matches("Ableton Push 2:1", false));
        assert!(!port_matches("Midi Through:0", false));
    }
}
