//! 88-key keyboard geometry and per-note tile layout.
//!
//! The keyboard spans the full video width with 52 equal white keys;
//! black keys sit between them at the classic offset ratios (measured in
//! 1/22.15ths of a white key width). Sorting all keys by x-position and
//! numbering them from A0 (MIDI 21) reproduces the piano's pitch order.
//! Both the layout and the tiles are computed once after load and stay
//! read-only during rendering.

use crate::config::RenderConfig;
use crate::midi::NoteEvent;

/// Lowest and highest pitch on an 88-key piano (A0..C8).
pub const PITCH_MIN: u8 = 21;
pub const PITCH_MAX: u8 = 108;

const WHITE_KEYS: usize = 52;
/// Offset of the black key following each white key, in 1/22.15ths of a
/// white key width. Zero means no black key follows (B->C and E->F).
/// The cycle starts at A0.
const BLACK_OFFSETS: [f64; 7] = [16.69, 0.0, 13.97, 16.79, 0.0, 12.83, 14.76];
const KEY_UNIT: f64 = 22.15;
const BLACK_WIDTH_UNITS: f64 = 11.0;
/// Black keys cover this fraction of the keyboard strip height.
const BLACK_HEIGHT_RATIO: f64 = 80.0 / 126.27;

#[derive(Debug, Clone)]
pub struct Key {
    pub pitch: u8,
    pub x: f64,
    pub width: f64,
    pub is_black: bool,
}

pub struct KeyboardLayout {
    keys: Vec<Key>,
    /// Y of the keyboard's top edge in raster pixels.
    pub keyboard_line: f64,
    pub white_width: f64,
    pub black_height: f64,
}

impl KeyboardLayout {
    pub fn new(config: &RenderConfig) -> Self {
        let white_width = config.width as f64 / WHITE_KEYS as f64;
        let kb_height = config.height as f64 * config.kb_ratio;

        let mut slots: Vec<(f64, f64, bool)> = Vec::with_capacity(88);
        for i in 0..WHITE_KEYS {
            slots.push((i as f64 * white_width, white_width, false));
        }
        for i in 0..WHITE_KEYS - 1 {
            let offset = BLACK_OFFSETS[i % BLACK_OFFSETS.len()];
            if offset > 0.0 {
                slots.push((
                    i as f64 * white_width + offset / KEY_UNIT * white_width,
                    BLACK_WIDTH_UNITS / KEY_UNIT * white_width,
                    true,
                ));
            }
        }
        slots.sort_by(|a, b| a.0.total_cmp(&b.0));

        let keys = slots
            .into_iter()
            .enumerate()
            .map(|(i, (x, width, is_black))| Key {
                pitch: PITCH_MIN + i as u8,
                x,
                width,
                is_black,
            })
            .collect();

        Self {
            keys,
            keyboard_line: config.keyboard_line(),
            white_width,
            black_height: kb_height * BLACK_HEIGHT_RATIO,
        }
    }

    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    /// The key for a pitch, if it is on the 88-key keyboard.
    pub fn key(&self, pitch: u8) -> Option<&Key> {
        (PITCH_MIN..=PITCH_MAX)
            .contains(&pitch)
            .then(|| &self.keys[(pitch - PITCH_MIN) as usize])
    }
}

/// One falling rectangle, laid out once after load. The vertical position
/// at a given render time is derived on the fly; only the static geometry
/// lives here.
#[derive(Debug, Clone, Copy)]
pub struct Tile {
    pub pitch: u8,
    pub x: f64,
    pub width: f64,
    /// Note duration times fall speed.
    pub height: f64,
    /// When the leading edge reaches the keyboard line (the note start).
    pub hit_time: f64,
    pub end_time: f64,
    pub opacity: f64,
}

/// Map note events onto tiles. Notes outside the 88-key range produce no
/// tile.
pub fn tiles_from_notes(
    notes: &[NoteEvent],
    layout: &KeyboardLayout,
    config: &RenderConfig,
) -> Vec<Tile> {
    notes
        .iter()
        .filter_map(|n| {
            let key = layout.key(n.pitch)?;
            Some(Tile {
                pitch: n.pitch,
                x: key.x,
                width: key.width,
                height: (n.end - n.start) * config.tile_velocity,
                hit_time: n.start,
                end_time: n.end,
                opacity: if config.show_velocity {
                    n.velocity as f64 / 127.0
                } else {
                    1.0
                },
            })
        })
        .collect()
}
