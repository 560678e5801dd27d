//! Render configuration.
//!
//! Every parameter arrives as an explicit construction argument and is
//! validated once, up front; nothing is read from the environment. The
//! resulting `RenderConfig` is immutable for the whole render session.

use plotters::style::RGBColor;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("keyboard ratio must be in [0, 1), got {0}")]
    KeyboardRatio(f64),
    #[error("{name} must be positive, got {value}")]
    NonPositive { name: &'static str, value: f64 },
    #[error("unknown key color {0:?} (expected a color name or #rrggbb)")]
    UnknownColor(String),
}

/// Immutable settings for one render session.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    /// Forwarded to the encoder as the video bitrate, kbit/s.
    pub dpi: u32,
    pub fps: u32,
    /// Fraction of the video height given to the keyboard strip.
    pub kb_ratio: f64,
    /// Tile fall speed, pixels per second.
    pub tile_velocity: f64,
    pub key_color: RGBColor,
    pub show_velocity: bool,
}

impl RenderConfig {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        width: u32,
        height: u32,
        dpi: u32,
        fps: u32,
        kb_ratio: f64,
        tile_velocity: f64,
        key_color: &str,
        show_velocity: bool,
    ) -> Result<Self, ConfigError> {
        for (name, value) in [
            ("video width", width as f64),
            ("video height", height as f64),
            ("video dpi", dpi as f64),
            ("video fps", fps as f64),
            ("tile velocity", tile_velocity),
        ] {
            if value <= 0.0 {
                return Err(ConfigError::NonPositive { name, value });
            }
        }
        if !(0.0..1.0).contains(&kb_ratio) {
            return Err(ConfigError::KeyboardRatio(kb_ratio));
        }
        Ok(Self {
            width,
            height,
            dpi,
            fps,
            kb_ratio,
            tile_velocity,
            key_color: parse_color(key_color)?,
            show_velocity,
        })
    }

    /// Y of the keyboard's top edge, in raster (top-left origin) pixels.
    pub fn keyboard_line(&self) -> f64 {
        self.height as f64 * (1.0 - self.kb_ratio)
    }
}

/// Accepts a small set of CSS color names or a #rrggbb hex triple.
pub fn parse_color(name: &str) -> Result<RGBColor, ConfigError> {
    let s = name.trim();
    if let Some(hex) = s.strip_prefix('#') {
        if hex.len() == 6 {
            if let Ok(v) = u32::from_str_radix(hex, 16) {
                return Ok(RGBColor(
                    (v >> 16) as u8,
                    (v >> 8) as u8,
                    v as u8,
                ));
            }
        }
        return Err(ConfigError::UnknownColor(name.to_string()));
    }
    let rgb = match s.to_ascii_lowercase().as_str() {
        "black" => (0, 0, 0),
        "white" => (255, 255, 255),
        "red" => (255, 0, 0),
        "green" => (0, 128, 0),
        "lime" => (0, 255, 0),
        "blue" => (0, 0, 255),
        "yellow" => (255, 255, 0),
        "cyan" => (0, 255, 255),
        "magenta" => (255, 0, 255),
        "orange" => (255, 165, 0),
        "purple" => (128, 0, 128),
        "pink" => (255, 192, 203),
        "gray" | "grey" => (128, 128, 128),
        _ => return Err(ConfigError::UnknownColor(name.to_string())),
    };
    Ok(RGBColor(rgb.0, rgb.1, rgb.2))
}
