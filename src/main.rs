use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

mod config;
mod frame;
mod keys;
mod midi;
mod video;

use config::RenderConfig;
use video::TileVideo;

/// Render a MIDI file as a falling-tile piano video.
#[derive(Parser, Debug)]
struct Opt {
    /// Input MIDI file (.mid)
    midi: PathBuf,
    /// Output video path; ffmpeg picks the container from the extension
    output: PathBuf,
    /// Video width in pixels
    #[arg(long, default_value_t = 1280)]
    width: u32,
    /// Video height in pixels
    #[arg(long, default_value_t = 720)]
    height: u32,
    /// Encoder bitrate in kbit/s
    #[arg(long, default_value_t = 4000)]
    dpi: u32,
    /// Output frames per second
    #[arg(long, default_value_t = 60)]
    fps: u32,
    /// Fraction of the video height given to the keyboard, in [0, 1)
    #[arg(long, default_value_t = 0.125)]
    kb_ratio: f64,
    /// Tile fall speed in pixels per second
    #[arg(long, default_value_t = 500.0)]
    tile_velocity: f64,
    /// Tile color: a color name or #rrggbb
    #[arg(long, default_value = "green")]
    key_color: String,
    /// Map note velocity to tile opacity
    #[arg(long)]
    show_velocity: bool,
    /// Print progress while loading and rendering
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let opt = Opt::parse();

    let config = RenderConfig::new(
        opt.width,
        opt.height,
        opt.dpi,
        opt.fps,
        opt.kb_ratio,
        opt.tile_velocity,
        &opt.key_color,
        opt.show_velocity,
    )?;

    let mut session = TileVideo::new(config);
    session.load_midi_file(&opt.midi, opt.verbose)?;
    session.render(&opt.output, opt.verbose)?;

    Ok(())
}
