//! Static lookup tables for the physical elements of the Push 2: which MIDI note/CC number
//! belongs to which pad, button or encoder, and the pad grid coordinate math.
//!
//! The tables are fixed by the hardware and loaded nowhere — they are compiled in and
//! immutable. Within each element class the number <-> element mapping is bijective.

/// Lowest MIDI note number of the 8x8 pad grid (bottom-left pad)
pub const PAD_NOTE_MIN: u8 = 36;
/// Highest MIDI note number of the 8x8 pad grid (top-right pad)
pub const PAD_NOTE_MAX: u8 = 99;

/// CC number carrying touch strip values when the strip is in modulation-wheel mode
pub const TOUCH_STRIP_CC: u8 = 12;
/// CC number of an attached sustain pedal
pub const SUSTAIN_PEDAL_CC: u8 = 64;

/// One pad of the 8x8 grid: its MIDI note number and its `(i, j)` grid coordinate, where
/// `(0, 0)` is the top-left pad and `(7, 7)` the bottom-right one.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Pad {
    pub number: u8,
    pub i: u8,
    pub j: u8,
}

impl Pad {
    /// The pad with the given MIDI note number, or `None` if the note is outside the grid
    pub fn from_number(number: u8) -> Option<Pad> {
        if !(PAD_NOTE_MIN..=PAD_NOTE_MAX).contains(&number) {
            return None;
        }
        let (i, j) = pad_n_to_ij(number);
        Some(Pad { number, i, j })
    }

    /// The pad at grid coordinate `(i, j)`. Coordinates are clamped into `0..=7`.
    pub fn from_ij(i: u8, j: u8) -> Pad {
        let number = pad_ij_to_pad_n(i, j);
        let (i, j) = pad_n_to_ij(number);
        Pad { number, i, j }
    }
}

/// Transforms `(i, j)` grid coordinates to the corresponding pad MIDI note number.
/// Coordinates outside `0..=7` are clamped.
pub fn pad_ij_to_pad_n(i: u8, j: u8) -> u8 {
    92 - i.min(7) * 8 + j.min(7)
}

/// Transforms a pad MIDI note number to its `(i, j)` grid coordinate. Only meaningful for
/// notes in `36..=99`.
pub fn pad_n_to_ij(n: u8) -> (u8, u8) {
    ((99 - n) / 8, 7 - (99 - n) % 8)
}

/// One of the labelled buttons surrounding the pad grid
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ButtonSpec {
    /// The CC number the button sends and listens on
    pub number: u8,
    pub name: &'static str,
    /// Whether the button's LED takes colors from the RGB palette; monochrome-only otherwise
    pub rgb: bool,
}

/// One of the rotary encoders
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct EncoderSpec {
    /// The CC number rotation deltas arrive on
    pub number: u8,
    /// The note number touch/release events arrive on
    pub touch_number: u8,
    pub name: &'static str,
}

/// Every button of the device, as listed in Ableton's MIDI mapping documentation
pub const BUTTONS: [ButtonSpec; 65] = [
    ButtonSpec { number: 3, name: "Tap Tempo", rgb: false },
    ButtonSpec { number: 9, name: "Metronome", rgb: false },
    ButtonSpec { number: 118, name: "Delete", rgb: false },
    ButtonSpec { number: 119, name: "Undo", rgb: false },
    ButtonSpec { number: 60, name: "Mute", rgb: true },
    ButtonSpec { number: 61, name: "Solo", rgb: true },
    ButtonSpec { number: 29, name: "Stop", rgb: true },
    ButtonSpec { number: 35, name: "Convert", rgb: false },
    ButtonSpec { number: 117, name: "Double Loop", rgb: false },
    ButtonSpec { number: 116, name: "Quantize", rgb: false },
    ButtonSpec { number: 88, name: "Duplicate", rgb: false },
    ButtonSpec { number: 87, name: "New", rgb: false },
    ButtonSpec { number: 90, name: "Fixed Length", rgb: false },
    ButtonSpec { number: 89, name: "Automate", rgb: true },
    ButtonSpec { number: 86, name: "Record", rgb: true },
    ButtonSpec { number: 85, name: "Play", rgb: true },
    ButtonSpec { number: 102, name: "Upper Row 1", rgb: true },
    ButtonSpec { number: 103, name: "Upper Row 2", rgb: true },
    ButtonSpec { number: 104, name: "Upper Row 3", rgb: true },
    ButtonSpec { number: 105, name: "Upper Row 4", rgb: true },
    ButtonSpec { number: 106, name: "Upper Row 5", rgb: true },
    ButtonSpec { number: 107, name: "Upper Row 6", rgb: true },
    ButtonSpec { number: 108, name: "Upper Row 7", rgb: true },
    ButtonSpec { number: 109, name: "Upper Row 8", rgb: true },
    ButtonSpec { number: 20, name: "Lower Row 1", rgb: true },
    ButtonSpec { number: 21, name: "Lower Row 2", rgb: true },
    ButtonSpec { number: 22, name: "Lower Row 3", rgb: true },
    ButtonSpec { number: 23, name: "Lower Row 4", rgb: true },
    ButtonSpec { number: 24, name: "Lower Row 5", rgb: true },
    ButtonSpec { number: 25, name: "Lower Row 6", rgb: true },
    ButtonSpec { number: 26, name: "Lower Row 7", rgb: true },
    ButtonSpec { number: 27, name: "Lower Row 8", rgb: true },
    ButtonSpec { number: 43, name: "1/32t", rgb: true },
    ButtonSpec { number: 42, name: "1/32", rgb: true },
    ButtonSpec { number: 41, name: "1/16t", rgb: true },
    ButtonSpec { number: 40, name: "1/16", rgb: true },
    ButtonSpec { number: 39, name: "1/8t", rgb: true },
    ButtonSpec { number: 38, name: "1/8", rgb: true },
    ButtonSpec { number: 37, name: "1/4t", rgb: true },
    ButtonSpec { number: 36, name: "1/4", rgb: true },
    ButtonSpec { number: 30, name: "Setup", rgb: false },
    ButtonSpec { number: 59, name: "User", rgb: false },
    ButtonSpec { number: 52, name: "Add Device", rgb: false },
    ButtonSpec { number: 53, name: "Add Track", rgb: false },
    ButtonSpec { number: 110, name: "Device", rgb: false },
    ButtonSpec { number: 112, name: "Mix", rgb: false },
    ButtonSpec { number: 111, name: "Browse", rgb: false },
    ButtonSpec { number: 113, name: "Clip", rgb: false },
    ButtonSpec { number: 28, name: "Master", rgb: false },
    ButtonSpec { number: 46, name: "Up", rgb: false },
    ButtonSpec { number: 47, name: "Down", rgb: false },
    ButtonSpec { number: 44, name: "Left", rgb: false },
    ButtonSpec { number: 45, name: "Right", rgb: false },
    ButtonSpec { number: 56, name: "Repeat", rgb: false },
    ButtonSpec { number: 57, name: "Accent", rgb: false },
    ButtonSpec { number: 58, name: "Scale", rgb: false },
    ButtonSpec { number: 31, name: "Layout", rgb: false },
    ButtonSpec { number: 50, name: "Note", rgb: false },
    ButtonSpec { number: 51, name: "Session", rgb: false },
    ButtonSpec { number: 55, name: "Octave Up", rgb: false },
    ButtonSpec { number: 54, name: "Octave Down", rgb: false },
    ButtonSpec { number: 62, name: "Page Left", rgb: false },
    ButtonSpec { number: 63, name: "Page Right", rgb: false },
    ButtonSpec { number: 49, name: "Shift", rgb: false },
    ButtonSpec { number: 48, name: "Select", rgb: false },
];

/// Every rotary encoder of the device
pub const ENCODERS: [EncoderSpec; 11] = [
    EncoderSpec { number: 14, touch_number: 10, name: "Tempo Encoder" },
    EncoderSpec { number: 15, touch_number: 9, name: "Swing Encoder" },
    EncoderSpec { number: 71, touch_number: 0, name: "Track1 Encoder" },
    EncoderSpec { number: 72, touch_number: 1, name: "Track2 Encoder" },
    EncoderSpec { number: 73, touch_number: 2, name: "Track3 Encoder" },
    EncoderSpec { number: 74, touch_number: 3, name: "Track4 Encoder" },
    EncoderSpec { number: 75, touch_number: 4, name: "Track5 Encoder" },
    EncoderSpec { number: 76, touch_number: 5, name: "Track6 Encoder" },
    EncoderSpec { number: 77, touch_number: 6, name: "Track7 Encoder" },
    EncoderSpec { number: 78, touch_number: 7, name: "Track8 Encoder" },
    EncoderSpec { number: 79, touch_number: 8, name: "Master Encoder" },
];

pub fn button_by_cc(cc: u8) -> Option<&'static ButtonSpec> {
    BUTTONS.iter().find(|button| button.number == cc)
}

pub fn button_by_name(name: &str) -> Option<&'static ButtonSpec> {
    BUTTONS.iter().find(|button| button.name == name)
}

pub fn encoder_by_cc(cc: u8) -> Option<&'static EncoderSpec> {
    ENCODERS.iter().find(|encoder| encoder.number == cc)
}

pub fn encoder_by_touch_note(note: u8) -> Option<&'static EncoderSpec> {
    ENCODERS.iter().find(|encoder| encoder.touch_number == note)
}

pub fn encoder_by_name(name: &str) -> Option<&'static EncoderSpec> {
    ENCODERS.iter().find(|encoder| encoder.name == name)
}
