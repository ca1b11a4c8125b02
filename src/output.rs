//! Outbound MIDI construction: LED color messages, the color palette, the per-element LED
//! state cache, and the SysEx configuration messages (palette updates, aftertouch mode,
//! velocity curve, touch strip mode).

use std::collections::HashMap;

use crate::device_map::ButtonSpec;
use crate::Error;

const NOTE_ON: u8 = 0x90;
const CONTROL_CHANGE: u8 = 0xB0;

/// All Push 2 configuration SysEx messages start with this preface...
pub const SYSEX_PREFACE: [u8; 6] = [0xF0, 0x00, 0x21, 0x1D, 0x01, 0x01];
/// ...and end with this byte
pub const SYSEX_END: u8 = 0xF7;

const CMD_SET_PALETTE_ENTRY: u8 = 0x03;
const CMD_REAPPLY_PALETTE: u8 = 0x05;
const CMD_TOUCH_STRIP_CONFIG: u8 = 0x17;
const CMD_AFTERTOUCH_RANGE: u8 = 0x1B;
const CMD_AFTERTOUCH_MODE: u8 = 0x1E;
const CMD_VELOCITY_CURVE: u8 = 0x20;

/// Device-side LED animations. The animation is selected through the MIDI channel of the
/// color-setting message; the device animates between the previously set static color and the
/// newly set one.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(u8)]
pub enum Animation {
    Static = 0,
    OneShot24th = 1,
    OneShot16th = 2,
    OneShot8th = 3,
    OneShotQuarter = 4,
    OneShotHalf = 5,
    Pulsing24th = 6,
    Pulsing16th = 7,
    Pulsing8th = 8,
    PulsingQuarter = 9,
    PulsingHalf = 10,
    Blinking24th = 11,
    Blinking16th = 12,
    Blinking8th = 13,
    BlinkingQuarter = 14,
    BlinkingHalf = 15,
}

impl Animation {
    pub fn id(self) -> u8 {
        self as u8
    }
}

/// Pad aftertouch mode, set via SysEx
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(u8)]
pub enum AftertouchMode {
    /// One pressure value for the whole grid, no note number
    Channel = 0,
    /// Per-pad pressure values
    Polyphonic = 1,
}

/// Touch strip operation mode. This is device-side configuration; incoming messages don't
/// reveal which mode is active, so track what you requested.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TouchStripMode {
    /// Firmware default: pitch-bend values, point LEDs, auto-return to center
    PitchBend,
    /// Modulation-wheel style: plain CC 12 values, no auto-return
    ModWheel,
}

impl TouchStripMode {
    pub fn flags(self) -> u8 {
        match self {
            Self::PitchBend => 0b0110_1000,
            Self::ModWheel => 0b0000_1100,
        }
    }
}

/// Index used when a color name is not found in the palette
pub const DEFAULT_COLOR_INDEX: u8 = 0;

#[derive(Default, Clone)]
struct PaletteEntry {
    rgb_name: Option<String>,
    bw_name: Option<String>,
}

/// The active color palette: 128 indices, each optionally carrying an RGB color name and a
/// monochrome ("black/white") color name. RGB-capable elements resolve names against the RGB
/// namespace, monochrome-only buttons against the monochrome one.
///
/// Remapping an entry is a two-phase device operation: [`set_entry`](Palette::set_entry)
/// produces the palette-update SysEx, but lit LEDs only change after the separate reapply
/// SysEx ([`reapply_palette_message`]) is sent.
pub struct Palette {
    entries: Vec<PaletteEntry>,
}

impl Default for Palette {
    fn default() -> Self {
        let mut palette = Self {
            entries: vec![PaletteEntry::default(); 128],
        };
        // Factory default names. The device boots with a much larger palette; these are the
        // indices with stable, commonly used colors.
        for &(index, name) in &[
            (0, "black"),
            (122, "white"),
            (123, "light_gray"),
            (124, "dark_gray"),
            (125, "blue"),
            (126, "green"),
            (127, "red"),
        ] {
            palette.entries[index as usize].rgb_name = Some(name.to_string());
        }
        for &(index, name) in &[
            (0, "black"),
            (16, "dark_gray"),
            (48, "light_gray"),
            (127, "white"),
        ] {
            palette.entries[index as usize].bw_name = Some(name.to_string());
        }
        palette
    }
}

impl Palette {
    /// Resolves an RGB color name to its palette index. Unknown names degrade to the default
    /// index instead of failing: LED calls are fire-and-forget.
    pub fn rgb_index(&self, name: &str) -> u8 {
        self.find(name, |entry| entry.rgb_name.as_deref())
    }

    /// Resolves a monochrome color name to its palette index
    pub fn bw_index(&self, name: &str) -> u8 {
        self.find(name, |entry| entry.bw_name.as_deref())
    }

    fn find(&self, name: &str, accessor: impl Fn(&PaletteEntry) -> Option<&str>) -> u8 {
        self.entries
            .iter()
            .position(|entry| accessor(entry) == Some(name))
            .map(|index| index as u8)
            .unwrap_or(DEFAULT_COLOR_INDEX)
    }

    /// Remaps one palette entry and returns the palette-update SysEx to send.
    ///
    /// At least one of `rgb` / `bw` must be given. A name already mapped to a *different*
    /// index is rejected unless `overwrite` is set, in which case the old mapping is removed.
    /// Does not take effect on already-lit LEDs until the reapply SysEx is sent.
    pub fn set_entry(
        &mut self,
        index: u8,
        rgb: Option<(&str, [u8; 3])>,
        bw: Option<(&str, u8)>,
        overwrite: bool,
    ) -> Result<Vec<u8>, Error> {
        if index > 127 {
            return Err(Error::InvalidPaletteArguments(format!(
                "palette index {} out of range 0..=127",
                index
            )));
        }
        if rgb.is_none() && bw.is_none() {
            return Err(Error::InvalidPaletteArguments(
                "at least one of the RGB/monochrome colors must be given".into(),
            ));
        }

        if let Some((name, _)) = rgb {
            self.claim_name(index, name, overwrite, |entry| &mut entry.rgb_name)?;
        }
        if let Some((name, _)) = bw {
            self.claim_name(index, name, overwrite, |entry| &mut entry.bw_name)?;
        }

        let entry = &mut self.entries[index as usize];
        if let Some((name, _)) = rgb {
            entry.rgb_name = Some(name.to_string());
        }
        if let Some((name, _)) = bw {
            entry.bw_name = Some(name.to_string());
        }

        let [r, g, b] = rgb.map(|(_, values)| values).unwrap_or([0, 0, 0]);
        let w = bw.map(|(_, value)| value).unwrap_or(0);
        Ok(sysex(
            CMD_SET_PALETTE_ENTRY,
            &[
                index,
                r & 0x7F,
                r >> 7,
                g & 0x7F,
                g >> 7,
                b & 0x7F,
                b >> 7,
                w & 0x7F,
                w >> 7,
            ],
        ))
    }

    fn claim_name(
        &mut self,
        index: u8,
        name: &str,
        overwrite: bool,
        accessor: impl Fn(&mut PaletteEntry) -> &mut Option<String>,
    ) -> Result<(), Error> {
        for (i, entry) in self.entries.iter_mut().enumerate() {
            if i != index as usize && accessor(entry).as_deref() == Some(name) {
                if !overwrite {
                    return Err(Error::InvalidPaletteArguments(format!(
                        "color name {:?} is already mapped to index {}",
                        name, i
                    )));
                }
                *accessor(entry) = None;
            }
        }
        Ok(())
    }
}

/// Cache key for the LED state of one element
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub(crate) enum LedKey {
    Pad(u8),
    Button(u8),
}

/// Remembers the (color index, animation id) last sent per pad/button, purely to suppress
/// redundant sends. Must be invalidated wholesale on MIDI reconnect: the device resets its
/// LEDs on its own, and a stale cache would suppress re-sends the hardware needs.
#[derive(Default)]
pub(crate) struct LedStateCache {
    state: HashMap<LedKey, (u8, u8)>,
}

impl LedStateCache {
    fn is_current(&self, key: LedKey, color: u8, animation: u8) -> bool {
        self.state.get(&key) == Some(&(color, animation))
    }

    fn record(&mut self, key: LedKey, color: u8, animation: u8) {
        self.state.insert(key, (color, animation));
    }

    pub fn invalidate(&mut self) {
        self.state.clear();
    }
}

/// Palette and LED cache together: everything needed to turn "set this element to that color
/// name" into concrete MIDI messages. Owned by the device object, shared under its state lock.
#[derive(Default)]
pub(crate) struct OutputState {
    pub palette: Palette,
    pub leds: LedStateCache,
}

impl OutputState {
    /// The messages to send for setting a pad's color, or an empty vec when the send is
    /// suppressed because the pad already shows exactly this color/animation pair.
    pub fn pad_color_messages(
        &mut self,
        pad_n: u8,
        color: &str,
        animation: Animation,
        animation_end_color: &str,
        optimize: bool,
    ) -> Vec<[u8; 3]> {
        let color_index = self.palette.rgb_index(color);
        let end_color_index = self.palette.rgb_index(animation_end_color);
        self.element_color_messages(
            LedKey::Pad(pad_n),
            NOTE_ON,
            pad_n,
            color_index,
            animation,
            end_color_index,
            optimize,
        )
    }

    /// Like [`pad_color_messages`](Self::pad_color_messages), for a button. Monochrome-only
    /// buttons resolve the color names against the monochrome palette.
    pub fn button_color_messages(
        &mut self,
        button: &ButtonSpec,
        color: &str,
        animation: Animation,
        animation_end_color: &str,
        optimize: bool,
    ) -> Vec<[u8; 3]> {
        let (color_index, end_color_index) = if button.rgb {
            (
                self.palette.rgb_index(color),
                self.palette.rgb_index(animation_end_color),
            )
        } else {
            (
                self.palette.bw_index(color),
                self.palette.bw_index(animation_end_color),
            )
        };
        self.element_color_messages(
            LedKey::Button(button.number),
            CONTROL_CHANGE,
            button.number,
            color_index,
            animation,
            end_color_index,
            optimize,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn element_color_messages(
        &mut self,
        key: LedKey,
        status_base: u8,
        number: u8,
        color_index: u8,
        animation: Animation,
        end_color_index: u8,
        optimize: bool,
    ) -> Vec<[u8; 3]> {
        if optimize && self.leds.is_current(key, color_index, animation.id()) {
            log::trace!("suppressing redundant LED send for {:?}", key);
            return Vec::new();
        }

        let mut messages = Vec::with_capacity(2);
        if animation != Animation::Static {
            // The device animates between two colors which must both be set explicitly: a
            // static frame with the end color first, then the animation frame
            messages.push([status_base, number, end_color_index]);
        }
        messages.push([status_base | animation.id(), number, color_index]);

        self.leds.record(key, color_index, animation.id());
        messages
    }
}

fn sysex(command: u8, payload: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(SYSEX_PREFACE.len() + 2 + payload.len());
    bytes.extend_from_slice(&SYSEX_PREFACE);
    bytes.push(command);
    bytes.extend_from_slice(payload);
    bytes.push(SYSEX_END);
    bytes
}

/// The SysEx pushing the (previously defined) palette onto all lit LEDs
pub(crate) fn reapply_palette_message() -> Vec<u8> {
    sysex(CMD_REAPPLY_PALETTE, &[])
}

pub(crate) fn aftertouch_mode_message(mode: AftertouchMode) -> Vec<u8> {
    sysex(CMD_AFTERTOUCH_MODE, &[mode as u8])
}

/// Configures at which pressure value channel aftertouch starts triggering (`range_start`) and
/// which pressure maps to aftertouch value 127 (`range_end`). Per the device documentation the
/// values must satisfy `400 < range_start < range_end <= 2048`.
pub(crate) fn aftertouch_range_message(range_start: u16, range_end: u16) -> Vec<u8> {
    assert!(range_start > 400, "range_start must be above 400");
    assert!(range_start < range_end, "range_start must be below range_end");
    assert!(range_end <= 2048, "range_end must be at most 2048");
    sysex(
        CMD_AFTERTOUCH_RANGE,
        &[
            0,
            0,
            0,
            0,
            (range_start % 128) as u8,
            (range_start / 128) as u8,
            (range_end % 128) as u8,
            (range_end / 128) as u8,
        ],
    )
}

/// Uploads the pad velocity curve: 128 velocity values mapped onto the 128 quantized steps of
/// the physical pressure range, sent in eight 16-value chunks
pub(crate) fn velocity_curve_messages(velocities: &[u8; 128]) -> Vec<Vec<u8>> {
    velocities
        .chunks(16)
        .enumerate()
        .map(|(chunk, values)| {
            let mut payload = Vec::with_capacity(17);
            payload.push((chunk * 16) as u8);
            payload.extend_from_slice(values);
            sysex(CMD_VELOCITY_CURVE, &payload)
        })
        .collect()
}

pub(crate) fn touch_strip_config_message(flags: u8) -> Vec<u8> {
    sysex(CMD_TOUCH_STRIP_CONFIG, &[flags & 0x7F])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device_map;

    #[test]
    fn identical_pad_color_is_sent_only_once() {
        let mut state = OutputState::default();
        let first = state.pad_color_messages(95, "green", Animation::Static, "black", true);
        assert_eq!(first, vec![[0x90, 95, 126]]);
        let second = state.pad_color_messages(95, "green", Animation::Static, "black", true);
        assert!(second.is_empty());
    }

    #[test]
    fn suppression_can_be_disabled_per_call() {
        let mut state = OutputState::default();
        state.pad_color_messages(36, "red", Animation::Static, "black", true);
        let again = state.pad_color_messages(36, "red", Animation::Static, "black", false);
        assert_eq!(again, vec![[0x90, 36, 127]]);
    }

    #[test]
    fn reconnect_invalidation_forces_a_resend() {
        let mut state = OutputState::default();
        state.pad_color_messages(36, "red", Animation::Static, "black", true);
        state.leds.invalidate();
        let after_reconnect = state.pad_color_messages(36, "red", Animation::Static, "black", true);
        assert_eq!(after_reconnect, vec![[0x90, 36, 127]]);
    }

    #[test]
    fn non_static_animation_sends_end_color_frame_first() {
        let mut state = OutputState::default();
        let messages =
            state.pad_color_messages(40, "blue", Animation::BlinkingQuarter, "black", true);
        assert_eq!(
            messages,
            vec![
                [0x90, 40, 0],                                    // static end color
                [0x90 | Animation::BlinkingQuarter.id(), 40, 125] // animated start color
            ]
        );
    }

    #[test]
    fn changed_animation_is_not_suppressed() {
        let mut state = OutputState::default();
        state.pad_color_messages(36, "red", Animation::Static, "black", true);
        let messages = state.pad_color_messages(36, "red", Animation::BlinkingHalf, "black", true);
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn unknown_color_degrades_to_default_index() {
        let mut state = OutputState::default();
        let messages = state.pad_color_messages(36, "chartreuse", Animation::Static, "black", true);
        assert_eq!(messages, vec![[0x90, 36, DEFAULT_COLOR_INDEX]]);
    }

    #[test]
    fn monochrome_buttons_resolve_against_the_bw_palette() {
        let mut state = OutputState::default();
        let tap_tempo = device_map::button_by_name("Tap Tempo").unwrap();
        assert!(!tap_tempo.rgb);
        let messages =
            state.button_color_messages(tap_tempo, "white", Animation::Static, "black", true);
        assert_eq!(messages, vec![[0xB0, 3, 127]]);

        let play = device_map::button_by_name("Play").unwrap();
        assert!(play.rgb);
        let messages = state.button_color_messages(play, "white", Animation::Static, "black", true);
        assert_eq!(messages, vec![[0xB0, 85, 122]]);
    }

    #[test]
    fn palette_entry_validation() {
        let mut palette = Palette::default();
        assert!(matches!(
            palette.set_entry(128, Some(("x", [0, 0, 0])), None, false),
            Err(Error::InvalidPaletteArguments(_))
        ));
        assert!(matches!(
            palette.set_entry(10, None, None, false),
            Err(Error::InvalidPaletteArguments(_))
        ));
        // "green" already lives at 126
        assert!(matches!(
            palette.set_entry(10, Some(("green", [0, 255, 0])), None, false),
            Err(Error::InvalidPaletteArguments(_))
        ));
        // ...unless overwriting, which moves the name
        palette
            .set_entry(10, Some(("green", [0, 255, 0])), None, true)
            .unwrap();
        assert_eq!(palette.rgb_index("green"), 10);
    }

    #[test]
    fn palette_entry_sysex_layout() {
        let mut palette = Palette::default();
        let message = palette
            .set_entry(10, Some(("orange", [255, 130, 0])), Some(("half", 64)), false)
            .unwrap();
        assert_eq!(
            message,
            vec![
                0xF0, 0x00, 0x21, 0x1D, 0x01, 0x01, // preface
                0x03, 10, // set-entry command, index
                127, 1, // r = 255
                2, 1, // g = 130
                0, 0, // b = 0
                64, 0, // w = 64
                0xF7,
            ]
        );
        assert_eq!(palette.rgb_index("orange"), 10);
        assert_eq!(palette.bw_index("half"), 10);
    }

    #[test]
    fn configuration_sysex_layouts() {
        assert_eq!(
            reapply_palette_message(),
            vec![0xF0, 0x00, 0x21, 0x1D, 0x01, 0x01, 0x05, 0xF7]
        );
        assert_eq!(
            aftertouch_mode_message(AftertouchMode::Polyphonic),
            vec![0xF0, 0x00, 0x21, 0x1D, 0x01, 0x01, 0x1E, 0x01, 0xF7]
        );
        assert_eq!(
            aftertouch_range_message(401, 2048),
            vec![0xF0, 0x00, 0x21, 0x1D, 0x01, 0x01, 0x1B, 0, 0, 0, 0, 17, 3, 0, 16, 0xF7]
        );
        assert_eq!(
            touch_strip_config_message(TouchStripMode::PitchBend.flags()),
            vec![0xF0, 0x00, 0x21, 0x1D, 0x01, 0x01, 0x17, 0b0110_1000, 0xF7]
        );
    }

    #[test]
    fn velocity_curve_is_split_into_eight_chunks() {
        let mut velocities = [0u8; 128];
        for (i, v) in velocities.iter_mut().enumerate() {
            *v = i as u8;
        }
        let messages = velocity_curve_messages(&velocities);
        assert_eq!(messages.len(), 8);
        for (chunk, message) in messages.iter().enumerate() {
            assert_eq!(message[6], 0x20);
            assert_eq!(message[7], (chunk * 16) as u8);
            assert_eq!(message.len(), 6 + 1 + 1 + 16 + 1);
            assert_eq!(*message.last().unwrap(), 0xF7);
        }
        assert_eq!(messages[7][8..24], (112u8..128).collect::<Vec<_>>()[..]);
    }
}
