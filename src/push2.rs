//! The device object tying the sections together: MIDI in/out, the dispatcher, the LED/palette
//! output state and the USB display, plus the watchdog thread that detects silent device
//! disappearance and drives reconnection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use midir::MidiInputConnection;

use crate::device_map::{self, Pad};
use crate::dispatcher::Dispatcher;
use crate::display::{DisplayTransport, SendOutcome};
use crate::events::{ActionKind, Event, HandlerRegistry, Qualifier};
use crate::midi_io::{self, MidiTransport};
use crate::output::{
    self, AftertouchMode, Animation, OutputState, TouchStripMode,
};
use crate::pixel::{self, PixelBuffer};
use crate::util::RateLimiter;
use crate::Error;

/// Tunables of a [`Push2`] instance. The defaults match the device's observed behavior; they
/// rarely need changing.
#[derive(Debug, Clone)]
pub struct Config {
    /// Talk to the "User" MIDI port pair instead of the default "Live" pair
    pub use_user_port: bool,
    /// How long without a heartbeat until the device counts as disconnected
    pub heartbeat_window: Duration,
    /// How long after a reconnect all incoming messages are discarded as startup noise
    pub settle_window: Duration,
    /// Minimum interval between MIDI/USB reconnect attempts
    pub reconnect_interval: Duration,
    /// Upper bound for a single USB display transfer
    pub display_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            use_user_port: false,
            heartbeat_window: Duration::from_millis(500),
            settle_window: Duration::from_secs(1),
            reconnect_interval: Duration::from_secs(2),
            display_timeout: Duration::from_secs(1),
        }
    }
}

/// Everything the MIDI callback thread, the watchdog thread and application threads mutate
/// together. One lock; never held while handlers run.
struct SharedState {
    dispatcher: Dispatcher,
    output: OutputState,
    /// Events produced outside the MIDI callback (e.g. a display disconnect noticed during a
    /// frame send). The watchdog drains and emits these, so they can be queued from within a
    /// running handler without self-deadlocking on the handler lock.
    pending_events: Vec<Event>,
}

/// A connected (or about-to-be-connected) Push 2.
///
/// All steady-state operations are fire-and-forget: with the hardware absent, LED and display
/// calls are silently dropped and the instance reconnects by itself once the device shows up.
/// Connection changes surface as [`Event::MidiConnected`] / [`Event::MidiDisconnected`] /
/// [`Event::DisplayDisconnected`] through the registered handlers.
pub struct Push2 {
    config: Config,
    state: Arc<Mutex<SharedState>>,
    handlers: Arc<Mutex<HandlerRegistry>>,
    midi: Mutex<MidiTransport>,
    display: Mutex<DisplayTransport>,
    touch_strip_mode: Mutex<TouchStripMode>,
    stop: Arc<AtomicBool>,
    watchdog: Option<JoinHandle<()>>,
}

/// Locks without propagating poison: a panicking handler must not wedge every other thread
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Push2 {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let state = Arc::new(Mutex::new(SharedState {
            dispatcher: Dispatcher::new(config.heartbeat_window, config.settle_window),
            output: OutputState::default(),
            pending_events: Vec::new(),
        }));
        let handlers = Arc::new(Mutex::new(HandlerRegistry::new()));
        let stop = Arc::new(AtomicBool::new(false));

        let watchdog = spawn_watchdog(
            config.clone(),
            Arc::clone(&state),
            Arc::clone(&handlers),
            Arc::clone(&stop),
        );

        Self {
            midi: Mutex::new(MidiTransport::new(
                config.use_user_port,
                config.reconnect_interval,
            )),
            display: Mutex::new(DisplayTransport::new(
                config.reconnect_interval,
                config.display_timeout,
            )),
            touch_strip_mode: Mutex::new(TouchStripMode::PitchBend),
            config,
            state,
            handlers,
            stop,
            watchdog: Some(watchdog),
        }
    }

    // ---------------------------------------------------------------------------------------
    // Handler registration
    // ---------------------------------------------------------------------------------------

    /// Registers a handler for every event of the given kind
    pub fn on<F>(&self, kind: ActionKind, handler: F)
    where
        F: FnMut(&Event) + Send + 'static,
    {
        lock(&self.handlers).register(kind, Box::new(handler));
    }

    /// Registers a handler for one specific element, e.g. "pad 36 pressed". Generic handlers
    /// for the same kind still fire, before this one.
    pub fn on_element<F>(&self, kind: ActionKind, qualifier: Qualifier, handler: F)
    where
        F: FnMut(&Event) + Send + 'static,
    {
        lock(&self.handlers).register_for(kind, qualifier, Box::new(handler));
    }

    // ---------------------------------------------------------------------------------------
    // LEDs
    // ---------------------------------------------------------------------------------------

    /// Sets the pad at grid coordinate `(i, j)` to the named palette color, statically lit
    pub fn set_pad_color(&self, i: u8, j: u8, color: &str) {
        self.set_pad_color_with(i, j, color, Animation::Static, "black", true);
    }

    /// Full-control variant of [`set_pad_color`](Self::set_pad_color). `animation_end_color`
    /// is the second color of a non-static animation. With `optimize` set, the send is
    /// skipped when the pad already shows exactly this color/animation.
    pub fn set_pad_color_with(
        &self,
        i: u8,
        j: u8,
        color: &str,
        animation: Animation,
        animation_end_color: &str,
        optimize: bool,
    ) {
        let pad = Pad::from_ij(i, j);
        let messages = lock(&self.state).output.pad_color_messages(
            pad.number,
            color,
            animation,
            animation_end_color,
            optimize,
        );
        self.send_midi_messages(&messages);
    }

    /// Sets all 64 pads to one color
    pub fn set_all_pads_color(&self, color: &str, animation: Animation) {
        for i in 0..8 {
            for j in 0..8 {
                self.set_pad_color_with(i, j, color, animation, "black", true);
            }
        }
    }

    /// Sets the named button's LED. RGB-capable buttons resolve `color` against the RGB
    /// palette, monochrome buttons against the monochrome palette. Unknown button names are
    /// ignored.
    pub fn set_button_color(&self, button_name: &str, color: &str) {
        self.set_button_color_with(button_name, color, Animation::Static, "black", true);
    }

    pub fn set_button_color_with(
        &self,
        button_name: &str,
        color: &str,
        animation: Animation,
        animation_end_color: &str,
        optimize: bool,
    ) {
        let button = match device_map::button_by_name(button_name) {
            Some(button) => button,
            None => {
                log::warn!("unknown button name {:?}", button_name);
                return;
            }
        };
        let messages = lock(&self.state).output.button_color_messages(
            button,
            color,
            animation,
            animation_end_color,
            optimize,
        );
        self.send_midi_messages(&messages);
    }

    // ---------------------------------------------------------------------------------------
    // Palette
    // ---------------------------------------------------------------------------------------

    /// Remaps a palette entry locally and on the device. Already-lit LEDs keep their old
    /// colors until [`reapply_color_palette`](Self::reapply_color_palette) is called; palette
    /// definition and application are separate device operations.
    pub fn set_color_palette_entry(
        &self,
        index: u8,
        rgb: Option<(&str, [u8; 3])>,
        bw: Option<(&str, u8)>,
        overwrite: bool,
    ) -> Result<(), Error> {
        let message = lock(&self.state)
            .output
            .palette
            .set_entry(index, rgb, bw, overwrite)?;
        self.send_midi(&message);
        Ok(())
    }

    /// Pushes the current palette onto all lit LEDs
    pub fn reapply_color_palette(&self) {
        self.send_midi(&output::reapply_palette_message());
    }

    // ---------------------------------------------------------------------------------------
    // Device configuration
    // ---------------------------------------------------------------------------------------

    pub fn set_aftertouch_mode(&self, mode: AftertouchMode) {
        self.send_midi(&output::aftertouch_mode_message(mode));
    }

    /// Configures channel aftertouch sensitivity; see [`output`] for the value constraints
    pub fn set_channel_aftertouch_range(&self, range_start: u16, range_end: u16) {
        self.send_midi(&output::aftertouch_range_message(range_start, range_end));
    }

    /// Uploads a pad velocity curve: 128 velocity values over the quantized pressure range
    pub fn set_velocity_curve(&self, velocities: &[u8; 128]) {
        for message in output::velocity_curve_messages(velocities) {
            self.send_midi(&message);
        }
    }

    /// Switches the touch strip between pitch-bend and modulation-wheel operation and
    /// remembers the request — incoming messages don't reveal the active mode
    pub fn set_touch_strip_mode(&self, mode: TouchStripMode) {
        *lock(&self.touch_strip_mode) = mode;
        self.send_midi(&output::touch_strip_config_message(mode.flags()));
    }

    /// Raw variant of [`set_touch_strip_mode`](Self::set_touch_strip_mode) for flag
    /// combinations beyond the two presets
    pub fn set_touch_strip_flags(&self, flags: u8) {
        self.send_midi(&output::touch_strip_config_message(flags));
    }

    /// The most recently requested touch strip mode
    pub fn touch_strip_mode(&self) -> TouchStripMode {
        *lock(&self.touch_strip_mode)
    }

    // ---------------------------------------------------------------------------------------
    // Display
    // ---------------------------------------------------------------------------------------

    /// Explicitly (re)configures the USB display pipe. Optional — the first
    /// [`display_frame`](Self::display_frame) does this on demand — but useful to find out
    /// up front whether a display is present.
    pub fn configure_display(&self) -> Result<(), Error> {
        lock(&self.display).configure()
    }

    pub fn display_configured(&self) -> bool {
        lock(&self.display).configured()
    }

    /// Encodes and sends one frame to the display. Returns an error only for a malformed
    /// buffer; a missing or vanished display is absorbed (the frame is dropped, a
    /// [`Event::DisplayDisconnected`] fires if the pipe just broke).
    pub fn display_frame(&self, buffer: &PixelBuffer<'_>) -> Result<(), Error> {
        let frame = pixel::encode(buffer)?;
        let outcome = lock(&self.display).send(&frame);
        self.after_display_send(outcome);
        Ok(())
    }

    /// Resends the last frame without re-encoding. No-op when nothing was displayed yet.
    pub fn display_last_frame(&self) {
        let outcome = lock(&self.display).redisplay();
        self.after_display_send(outcome);
    }

    fn after_display_send(&self, outcome: SendOutcome) {
        if outcome == SendOutcome::Disconnected {
            // Not emitted directly: display calls are legal from within handlers, where the
            // handler lock is already held. The watchdog picks this up on its next tick.
            lock(&self.state)
                .pending_events
                .push(Event::DisplayDisconnected);
        }
    }

    // ---------------------------------------------------------------------------------------
    // Status / plumbing
    // ---------------------------------------------------------------------------------------

    /// Whether heartbeats are currently arriving from the device
    pub fn midi_connected(&self) -> bool {
        lock(&self.state).dispatcher.connected()
    }

    /// The configuration this instance was created with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Sends raw MIDI bytes to the device. The building blocks above should cover everything;
    /// this is the escape hatch.
    pub fn send_midi(&self, bytes: &[u8]) {
        lock(&self.midi).send(bytes);
    }

    fn send_midi_messages(&self, messages: &[[u8; 3]]) {
        if messages.is_empty() {
            return;
        }
        let mut midi = lock(&self.midi);
        for message in messages {
            if !midi.send(message) {
                break;
            }
        }
    }
}

impl Default for Push2 {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Push2 {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(watchdog) = self.watchdog.take() {
            let _ = watchdog.join();
        }
    }
}

const WATCHDOG_TICK: Duration = Duration::from_millis(100);

/// The watchdog thread: keeps the MIDI input connected (rate-limited) and turns heartbeat
/// silence into a disconnect event. It must never issue display or other blocking bulk
/// writes — those would starve the heartbeat check.
fn spawn_watchdog(
    config: Config,
    state: Arc<Mutex<SharedState>>,
    handlers: Arc<Mutex<HandlerRegistry>>,
    stop: Arc<AtomicBool>,
) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("pushy-watchdog".into())
        .spawn(move || {
            let mut input: Option<MidiInputConnection<()>> = None;
            let mut limiter = RateLimiter::new(config.reconnect_interval);

            while !stop.load(Ordering::SeqCst) {
                if input.is_none() && limiter.check(Instant::now()) {
                    match connect_input(&config, &state, &handlers) {
                        Ok(connection) => {
                            log::info!("MIDI input connected");
                            input = Some(connection);
                        }
                        Err(e) => log::debug!("MIDI input connect attempt failed: {}", e),
                    }
                }

                let mut events = {
                    let mut state = lock(&state);
                    let mut events = std::mem::take(&mut state.pending_events);
                    if let Some(event) = state.dispatcher.check_heartbeat(Instant::now()) {
                        events.push(event);
                    }
                    events
                };
                if events.iter().any(|event| *event == Event::MidiDisconnected) {
                    log::info!("heartbeat lost, device disconnected");
                    // The old connection points at a vanished port; a fresh one is needed
                    input = None;
                    limiter.reset();
                }
                if !events.is_empty() {
                    let mut handlers = lock(&handlers);
                    for event in events.drain(..) {
                        handlers.emit(&event);
                    }
                }

                std::thread::sleep(WATCHDOG_TICK);
            }
        })
        .expect("failed to spawn watchdog thread")
}

fn connect_input(
    config: &Config,
    state: &Arc<Mutex<SharedState>>,
    handlers: &Arc<Mutex<HandlerRegistry>>,
) -> Result<MidiInputConnection<()>, Error> {
    let state = Arc::clone(state);
    let handlers = Arc::clone(handlers);

    midi_io::connect_input(config.use_user_port, move |_timestamp, data| {
        let now = Instant::now();
        // Collect events under the state lock, run handlers outside of it, so handlers can
        // call back into LED/display operations
        let events = {
            let mut state = lock(&state);
            let events = state.dispatcher.on_midi_message(now, data);
            if events.iter().any(|event| *event == Event::MidiConnected) {
                // The device reset its LEDs across the reconnect; a stale cache would
                // suppress sends the hardware needs
                state.output.leds.invalidate();
            }
            events
        };
        if !events.is_empty() {
            let mut handlers = lock(&handlers);
            for event in &events {
                handlers.emit(event);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn construction_and_shutdown_without_hardware() {
        let push = Push2::new();
        assert!(!push.midi_connected());
        assert!(!push.display_configured());
        drop(push); // must join the watchdog and not hang
    }

    #[test]
    fn led_calls_without_hardware_are_silently_dropped() {
        let push = Push2::new();
        push.set_pad_color(0, 0, "green");
        push.set_button_color("Play", "white");
        push.set_button_color("No Such Button", "white");
        push.set_touch_strip_mode(TouchStripMode::ModWheel);
        assert_eq!(push.touch_strip_mode(), TouchStripMode::ModWheel);
    }

    #[test]
    fn malformed_frame_fails_loudly_even_headless() {
        let push = Push2::new();
        let too_small = vec![0u16; 100];
        assert!(matches!(
            push.display_frame(&PixelBuffer::Bgr565(&too_small)),
            Err(Error::InvalidFrameDimensions { .. })
        ));
    }

    #[test]
    fn palette_errors_propagate_but_valid_updates_do_not() {
        let push = Push2::new();
        assert!(push
            .set_color_palette_entry(200, Some(("x", [1, 2, 3])), None, false)
            .is_err());
        // Valid update succeeds locally even with no hardware attached
        push.set_color_palette_entry(10, Some(("orange", [255, 130, 0])), None, false)
            .unwrap();
        push.reapply_color_palette();
    }

    #[test]
    fn handlers_can_be_registered_before_any_connection() {
        let push = Push2::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = Arc::clone(&count);
        push.on(ActionKind::PadPressed, move |_| {
            count2.fetch_add(1, Ordering::SeqCst);
        });
        push.on_element(ActionKind::PadPressed, Qualifier::Pad(36), |_| {});
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
