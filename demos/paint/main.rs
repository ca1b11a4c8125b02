//! A tiny paint program: hit a pad to cycle its color, Play clears the canvas, the mirrored
//! canvas is shown on the display. Run with `RUST_LOG=info` to watch (re)connection events.

use std::sync::{Arc, Mutex};

use pushy::prelude::*;
use pushy::{DISPLAY_HEIGHT, DISPLAY_WIDTH};

const COLORS: [&str; 5] = ["black", "red", "green", "blue", "white"];
const COLOR_RGB: [[f32; 3]; 5] = [
    [0.0, 0.0, 0.0],
    [1.0, 0.0, 0.0],
    [0.0, 1.0, 0.0],
    [0.0, 0.0, 1.0],
    [1.0, 1.0, 1.0],
];

struct Canvas {
    cells: [[usize; 8]; 8],
}

impl Canvas {
    fn pixels(&self) -> Vec<[f32; 3]> {
        let mut pixels = vec![[0.0; 3]; DISPLAY_WIDTH * DISPLAY_HEIGHT];
        // The 8x8 grid mapped onto the left, square part of the display
        let cell = DISPLAY_HEIGHT / 8;
        for (i, row) in self.cells.iter().enumerate() {
            for (j, &color) in row.iter().enumerate() {
                for y in i * cell..(i + 1) * cell {
                    for x in j * cell..(j + 1) * cell {
                        pixels[x * DISPLAY_HEIGHT + y] = COLOR_RGB[color];
                    }
                }
            }
        }
        pixels
    }
}

fn main() {
    env_logger::init();

    let push = Arc::new(Push2::new());
    let canvas = Arc::new(Mutex::new(Canvas {
        cells: [[0; 8]; 8],
    }));

    {
        let p = Arc::clone(&push);
        let canvas = Arc::clone(&canvas);
        push.on(ActionKind::PadPressed, move |event| {
            if let Event::PadPressed { pad, .. } = event {
                let mut canvas = canvas.lock().unwrap();
                let cell = &mut canvas.cells[pad.i as usize][pad.j as usize];
                *cell = (*cell + 1) % COLORS.len();
                p.set_pad_color(pad.i, pad.j, COLORS[*cell]);
                let pixels = canvas.pixels();
                drop(canvas);
                let _ = p.display_frame(&PixelBuffer::Rgb(&pixels));
            }
        });
    }

    {
        let p = Arc::clone(&push);
        let canvas = Arc::clone(&canvas);
        push.on_element(ActionKind::ButtonPressed, Qualifier::Button(85), move |_| {
            let mut canvas = canvas.lock().unwrap();
            canvas.cells = [[0; 8]; 8];
            let pixels = canvas.pixels();
            drop(canvas);
            p.set_all_pads_color("black", Animation::Static);
            let _ = p.display_frame(&PixelBuffer::Rgb(&pixels));
        });
    }

    {
        // Repaint everything after a reconnect: the device forgot its LEDs
        let p = Arc::clone(&push);
        let canvas = Arc::clone(&canvas);
        push.on(ActionKind::MidiConnected, move |_| {
            let canvas = canvas.lock().unwrap();
            for i in 0..8u8 {
                for j in 0..8u8 {
                    p.set_pad_color(i, j, COLORS[canvas.cells[i as usize][j as usize]]);
                }
            }
            p.set_button_color("Play", "white");
        });
    }

    println!("Paint away! Play clears the canvas, Ctrl-C quits.");
    loop {
        std::thread::sleep(std::time::Duration::from_secs(1));
    }
}
