//! Per-frame rasterization.
//!
//! `render_frame` is a pure function of the render time and the immutable
//! layout data: it keeps no state between calls, so any frame can be
//! produced at any time and identical inputs yield identical pixels.
//! Drawing goes through the plotters bitmap backend into a caller-owned
//! RGB24 buffer.

use anyhow::{Context, Result};
use plotters::prelude::*;

use crate::config::RenderConfig;
use crate::keys::{KeyboardLayout, Tile};

/// Vertical extent (top, bottom) of a tile at render time `t`, or `None`
/// when nothing of it is on screen.
///
/// Before its hit time a tile falls at constant speed with full height;
/// afterwards the leading edge stays pinned to the keyboard line while
/// the remainder is consumed at the same speed, vanishing exactly at the
/// note's end.
pub fn tile_extent(tile: &Tile, t: f64, keyboard_line: f64, velocity: f64) -> Option<(f64, f64)> {
    if t >= tile.end_time {
        return None;
    }
    let (bottom, height) = if t >= tile.hit_time {
        (keyboard_line, (tile.end_time - t) * velocity)
    } else {
        (keyboard_line - (tile.hit_time - t) * velocity, tile.height)
    };
    if height <= 0.0 || bottom <= 0.0 {
        return None;
    }
    Some((bottom - height, bottom))
}

/// A key sounds from its hit time up to, but not including, its end time.
pub fn is_sounding(tile: &Tile, t: f64) -> bool {
    tile.hit_time <= t && t < tile.end_time
}

/// The sounding tile that decides a key's highlight, first in draw order.
fn sounding_tile<'a>(tiles: &'a [Tile], t: f64, pitch: u8) -> Option<&'a Tile> {
    tiles.iter().find(|tile| tile.pitch == pitch && is_sounding(tile, t))
}

/// Rasterize the frame at time `t` into `buf` (RGB24, width * height * 3).
pub fn render_frame(
    buf: &mut [u8],
    t: f64,
    tiles: &[Tile],
    layout: &KeyboardLayout,
    config: &RenderConfig,
) -> Result<()> {
    let root =
        BitMapBackend::with_buffer(buf, (config.width, config.height)).into_drawing_area();
    root.fill(&WHITE).context("clearing frame")?;

    let bottom = config.height as i32;
    let line = layout.keyboard_line.round() as i32;

    // Keyboard strip: white keys first, black keys on top of them.
    for key in layout.keys().iter().filter(|k| !k.is_black) {
        let (x0, x1) = (key.x.round() as i32, (key.x + key.width).round() as i32);
        let fill = match sounding_tile(tiles, t, key.pitch) {
            Some(tile) => config.key_color.mix(tile.opacity).filled(),
            None => WHITE.filled(),
        };
        root.draw(&Rectangle::new([(x0, line), (x1, bottom)], fill))
            .context("drawing white key")?;
        root.draw(&Rectangle::new([(x0, line), (x1, bottom)], BLACK.stroke_width(1)))
            .context("drawing key outline")?;
    }
    for key in layout.keys().iter().filter(|k| k.is_black) {
        let (x0, x1) = (key.x.round() as i32, (key.x + key.width).round() as i32);
        let y1 = (layout.keyboard_line + layout.black_height).round() as i32;
        let fill = match sounding_tile(tiles, t, key.pitch) {
            Some(tile) => config.key_color.mix(tile.opacity).filled(),
            None => BLACK.filled(),
        };
        root.draw(&Rectangle::new([(x0, line), (x1, y1)], fill))
            .context("drawing black key")?;
    }
    root.draw(&PathElement::new(
        vec![(0, line), (config.width as i32, line)],
        BLACK.stroke_width(1),
    ))
    .context("drawing keyboard line")?;

    // Falling tiles above the line.
    for tile in tiles {
        if let Some((top, bot)) = tile_extent(tile, t, layout.keyboard_line, config.tile_velocity)
        {
            root.draw(&Rectangle::new(
                [
                    (tile.x.round() as i32, top.round() as i32),
                    ((tile.x + tile.width).round() as i32, bot.round() as i32),
                ],
                config.key_color.mix(tile.opacity).filled(),
            ))
            .context("drawing tile")?;
        }
    }

    root.present().context("finishing frame")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{self, KeyboardLayout};
    use crate::midi::NoteEvent;

    fn cfg() -> RenderConfig {
        RenderConfig::new(1280, 720, 4000, 60, 0.125, 500.0, "green", false).unwrap()
    }

    fn single_tile(config: &RenderConfig, pitch: u8, start: f64, end: f64) -> Vec<Tile> {
        let layout = KeyboardLayout::new(config);
        keys::tiles_from_notes(
            &[NoteEvent { pitch, start, end, velocity: 100, channel: 0 }],
            &layout,
            config,
        )
    }

    #[test]
    fn tile_rides_the_keyboard_line_from_hit_to_end() {
        // 720 * (1 - 0.125) puts the line at 630.
        let config = cfg();
        let tiles = single_tile(&config, 60, 0.0, 1.0);
        assert_eq!(tiles[0].height, 500.0);

        let at = |t| tile_extent(&tiles[0], t, 630.0, config.tile_velocity);
        // At the hit the full tile sits on the line.
        assert_eq!(at(0.0), Some((130.0, 630.0)));
        // Halfway through, half the tile has been consumed.
        assert_eq!(at(0.5), Some((380.0, 630.0)));
        // Consumed exactly at the note end.
        assert_eq!(at(1.0), None);
        assert_eq!(at(2.0), None);
    }

    #[test]
    fn tile_approaches_with_its_leading_edge() {
        let config = cfg();
        let tiles = single_tile(&config, 60, 2.0, 3.0);
        let at = |t| tile_extent(&tiles[0], t, 630.0, config.tile_velocity);
        // One second before the hit the bottom edge is 500px above the line.
        assert_eq!(at(1.0), Some((-370.0, 130.0)));
        // Too early: still entirely above the frame.
        assert_eq!(at(0.5), None);
        assert_eq!(at(2.0), Some((130.0, 630.0)));
    }

    #[test]
    fn sounding_interval_is_start_inclusive_end_exclusive() {
        let config = cfg();
        let tiles = single_tile(&config, 60, 1.0, 2.0);
        assert!(!is_sounding(&tiles[0], 0.999_999));
        assert!(is_sounding(&tiles[0], 1.0));
        assert!(is_sounding(&tiles[0], 1.999_999));
        assert!(!is_sounding(&tiles[0], 2.0));
        assert!(!is_sounding(&tiles[0], 2.5));
    }

    #[test]
    fn rendering_is_pure() {
        let config = RenderConfig::new(320, 180, 4000, 60, 0.2, 100.0, "green", false).unwrap();
        let layout = KeyboardLayout::new(&config);
        let tiles = keys::tiles_from_notes(
            &[
                NoteEvent { pitch: 60, start: 0.0, end: 1.0, velocity: 100, channel: 0 },
                NoteEvent { pitch: 64, start: 0.5, end: 1.5, velocity: 60, channel: 0 },
            ],
            &layout,
            &config,
        );

        let mut a = vec![0u8; 320 * 180 * 3];
        let mut b = vec![0u8; 320 * 180 * 3];
        render_frame(&mut a, 0.25, &tiles, &layout, &config).unwrap();
        render_frame(&mut b, 0.25, &tiles, &layout, &config).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn frame_pixels_show_background_tile_and_active_key() {
        let config = RenderConfig::new(320, 180, 4000, 60, 0.2, 100.0, "red", false).unwrap();
        let layout = KeyboardLayout::new(&config);
        let tiles = keys::tiles_from_notes(
            &[NoteEvent { pitch: 60, start: 0.0, end: 1.0, velocity: 100, channel: 0 }],
            &layout,
            &config,
        );

        let mut buf = vec![0u8; 320 * 180 * 3];
        render_frame(&mut buf, 0.0, &tiles, &layout, &config).unwrap();

        let pixel = |x: i32, y: i32| {
            let i = (y as usize * 320 + x as usize) * 3;
            (buf[i], buf[i + 1], buf[i + 2])
        };

        // Top-left corner is untouched background.
        assert_eq!(pixel(0, 0), (255, 255, 255));

        // The keyboard line sits at 180 * 0.8 = 144; the 100px tile is
        // being consumed on it at t=0, so a pixel just above the line in
        // the key's column is tile-colored.
        let key = layout.key(60).unwrap();
        let cx = (key.x + key.width / 2.0).round() as i32;
        assert_eq!(pixel(cx, 100), (255, 0, 0));

        // The key itself is sounding, so its face is highlighted too.
        assert_eq!(pixel(cx, 160), (255, 0, 0));

        // A far-away white key stays white inside its face.
        let idle = layout.key(43).unwrap();
        let ix = (idle.x + idle.width / 2.0).round() as i32;
        assert_eq!(pixel(ix, 160), (255, 255, 255));
    }
}
