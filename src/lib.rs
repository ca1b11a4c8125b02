/*!
An interfacing library for the Ableton Push 2, covering both of its faces: the 960×160 RGB
display (over USB bulk transfers) and the pads, buttons, encoders and touch strip (over MIDI).

# Events

Incoming hardware actions are decoded into [`Event`]s and delivered to handlers you register
per action kind — either for a whole kind, or for one specific element:

```no_run
use pushy::{ActionKind, Event, Push2, Qualifier};

let push = Push2::new();

push.on(ActionKind::PadPressed, |event| {
    if let Event::PadPressed { pad, velocity } = event {
        println!("pad ({}, {}) hit with velocity {}", pad.i, pad.j, velocity);
    }
});

// Only fires for the top-left pad (and after any generic PadPressed handlers)
push.on_element(ActionKind::PadPressed, Qualifier::Pad(92), |_| {
    println!("top-left!");
});
```

Connection handling is automatic: the device's active-sensing heartbeat is watched in the
background, disappearance and reappearance surface as [`Event::MidiDisconnected`] and
[`Event::MidiConnected`], and all output calls keep working (as silent no-ops) while the
hardware is absent.

# LEDs and the display

LED colors are named entries in a remappable 128-color palette:

```no_run
use pushy::Push2;

let push = Push2::new();
push.set_pad_color(0, 0, "green");
push.set_button_color("Play", "white");
```

Display frames are whole-screen pixel buffers in one of three input formats; encoding to the
device's wire format (including its signal-shaping XOR) happens internally:

```no_run
use pushy::{PixelBuffer, Push2, DISPLAY_HEIGHT, DISPLAY_WIDTH};

let push = Push2::new();
let pixels = vec![0u16; DISPLAY_WIDTH * DISPLAY_HEIGHT];
push.display_frame(&PixelBuffer::Bgr565(&pixels))?;
# Ok::<(), pushy::Error>(())
```
*/

pub mod util;

mod errors;
pub use errors::*;

pub mod device_map;
pub use device_map::{ButtonSpec, EncoderSpec, Pad};

mod events;
pub use events::*;

mod dispatcher;
pub use dispatcher::Dispatcher;

pub mod pixel;
pub use pixel::{PixelBuffer, PreparedFrame, DISPLAY_HEIGHT, DISPLAY_WIDTH};

mod output;
pub use output::{AftertouchMode, Animation, Palette, TouchStripMode};

mod midi_io;
mod display;

mod push2;
pub use push2::{Config, Push2};

pub mod prelude {
    pub use crate::events::{ActionKind, Event, Qualifier};
    pub use crate::output::{AftertouchMode, Animation, TouchStripMode};
    pub use crate::pixel::PixelBuffer;
    pub use crate::push2::{Config, Push2};
}

/// Identifier used for e.g. the midi port names etc.
const APPLICATION_NAME: &str = "Pushy";
