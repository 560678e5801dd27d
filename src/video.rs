//! video.rs
//!
//! Video assembly: owns the render session, iterates output frame
//! timestamps, rasterizes each frame, and pipes the raw RGB data into an
//! `ffmpeg` child process that encodes the final file. ffmpeg is an
//! external collaborator found on `$PATH`; the container and codec come
//! from the output extension and the fixed libx264 settings below.
//!
//! The child process is released on every exit path: `finish` closes the
//! pipe and waits, and dropping an unfinished writer kills the child
//! before reaping it.

use std::ffi::OsString;
use std::io::{Write, stdout};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};

use anyhow::{Context, Result, bail};

use crate::config::RenderConfig;
use crate::frame;
use crate::keys::{self, KeyboardLayout, Tile};
use crate::midi;

#[derive(thiserror::Error, Debug)]
pub enum EncoderError {
    #[error("could not start ffmpeg (is it on PATH?): {0}")]
    Spawn(std::io::Error),
    #[error("ffmpeg exited with {0}")]
    Failed(ExitStatus),
}

/// Arguments for an ffmpeg child consuming raw RGB24 frames on stdin.
fn encoder_args(config: &RenderConfig, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::new();
    for arg in ["-y", "-loglevel", "error", "-f", "rawvideo", "-pixel_format", "rgb24"] {
        args.push(arg.into());
    }
    args.push("-video_size".into());
    args.push(format!("{}x{}", config.width, config.height).into());
    args.push("-framerate".into());
    args.push(config.fps.to_string().into());
    for arg in ["-i", "-", "-pix_fmt", "yuv420p", "-c:v", "libx264"] {
        args.push(arg.into());
    }
    args.push("-b:v".into());
    args.push(format!("{}k", config.dpi).into());
    args.push(output.as_os_str().to_os_string());
    args
}

/// Handle on the encoder child process.
pub struct FfmpegWriter {
    child: Child,
    stdin: Option<ChildStdin>,
}

impl FfmpegWriter {
    pub fn spawn(config: &RenderConfig, output: &Path) -> Result<Self> {
        let mut child = Command::new("ffmpeg")
            .args(encoder_args(config, output))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .spawn()
            .map_err(EncoderError::Spawn)?;
        let stdin = child.stdin.take();
        Ok(Self { child, stdin })
    }

    pub fn write_frame(&mut self, rgb: &[u8]) -> Result<()> {
        let stdin = self.stdin.as_mut().context("encoder already finished")?;
        stdin.write_all(rgb).context("writing frame to ffmpeg")
    }

    /// Close the pipe, let ffmpeg flush, and check its exit status.
    pub fn finish(mut self) -> Result<()> {
        self.stdin.take();
        let status = self.child.wait().context("waiting for ffmpeg")?;
        if !status.success() {
            return Err(EncoderError::Failed(status).into());
        }
        Ok(())
    }
}

impl Drop for FfmpegWriter {
    fn drop(&mut self) {
        self.stdin.take();
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// A render session: validated configuration, the keyboard layout derived
/// from it, and the tiles of the loaded MIDI file.
pub struct TileVideo {
    config: RenderConfig,
    layout: KeyboardLayout,
    tiles: Vec<Tile>,
    total_duration: f64,
}

impl TileVideo {
    pub fn new(config: RenderConfig) -> Self {
        let layout = KeyboardLayout::new(&config);
        Self { config, layout, tiles: Vec::new(), total_duration: 0.0 }
    }

    /// Parse a MIDI file and lay its notes out as tiles.
    pub fn load_midi_file(&mut self, path: &Path, verbose: bool) -> Result<()> {
        let notes = midi::load_notes(path)?;
        self.total_duration = notes.iter().map(|n| n.end).fold(0.0, f64::max);
        self.tiles = keys::tiles_from_notes(&notes, &self.layout, &self.config);
        if verbose {
            println!("Midi file loaded: {}", path.display());
            println!(
                "{} notes, estimated video duration {:.2} secs",
                notes.len(),
                self.total_duration
            );
        }
        Ok(())
    }

    /// Number of output frames: one per 1/fps step over the full duration.
    pub fn frame_count(&self) -> u64 {
        (self.total_duration * self.config.fps as f64).ceil() as u64
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    /// Render every frame and encode them into `output`.
    pub fn render(&self, output: &Path, verbose: bool) -> Result<()> {
        let total = self.frame_count();
        if total == 0 {
            bail!("nothing to render; load a MIDI file first");
        }
        if verbose {
            println!("Start rendering (total {total} frames)");
        }

        let mut writer = FfmpegWriter::spawn(&self.config, output)?;
        let mut buf = vec![0u8; self.config.width as usize * self.config.height as usize * 3];
        let step = (total / 100).max(1);

        for i in 0..total {
            let t = i as f64 / self.config.fps as f64;
            frame::render_frame(&mut buf, t, &self.tiles, &self.layout, &self.config)?;
            writer.write_frame(&buf)?;
            if verbose && (i % step == 0 || i + 1 == total) {
                print!("\rframe {}/{} ({}%)", i + 1, total, (i + 1) * 100 / total);
                stdout().flush().ok();
            }
        }
        writer.finish()?;

        if verbose {
            println!();
            println!("Done rendering");
            println!("File saved {}", output.display());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use midly::num::{u4, u15};
    use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};

    fn cfg() -> RenderConfig {
        RenderConfig::new(1280, 720, 4000, 60, 0.125, 500.0, "green", false).unwrap()
    }

    // One note at the given tick span; 500 ticks per quarter at the
    // default tempo means one tick per millisecond.
    fn save_single_note(path: &Path, pitch: u8, on_tick: u32, off_tick: u32) {
        let mut smf = Smf::new(Header {
            format: Format::SingleTrack,
            timing: Timing::Metrical(u15::from(500)),
        });
        let midi = |message| TrackEventKind::Midi { channel: u4::from(0), message };
        smf.tracks.push(vec![
            TrackEvent {
                delta: on_tick.into(),
                kind: midi(MidiMessage::NoteOn { key: pitch.into(), vel: 100.into() }),
            },
            TrackEvent {
                delta: (off_tick - on_tick).into(),
                kind: midi(MidiMessage::NoteOff { key: pitch.into(), vel: 0.into() }),
            },
            TrackEvent { delta: 0.into(), kind: TrackEventKind::Meta(MetaMessage::EndOfTrack) },
        ]);
        smf.save(path).unwrap();
    }

    #[test]
    fn one_second_note_at_sixty_fps_means_sixty_frames() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        save_single_note(tmp.path(), 60, 0, 1000);

        let mut session = TileVideo::new(cfg());
        session.load_midi_file(tmp.path(), false).unwrap();

        assert_eq!(session.frame_count(), 60);
        assert_eq!(session.tiles().len(), 1);
        assert_eq!(session.tiles()[0].height, 500.0);
        assert_eq!(session.tiles()[0].hit_time, 0.0);
    }

    #[test]
    fn fractional_durations_round_frame_count_up() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        save_single_note(tmp.path(), 60, 0, 1010);

        let mut session = TileVideo::new(cfg());
        session.load_midi_file(tmp.path(), false).unwrap();
        // 1.01s * 60fps = 60.6 frames, rounded up.
        assert_eq!(session.frame_count(), 61);
    }

    #[test]
    fn render_without_a_loaded_file_is_an_error() {
        let session = TileVideo::new(cfg());
        assert!(session.render(Path::new("/tmp/never-written.mp4"), false).is_err());
    }

    #[test]
    fn encoder_args_describe_the_raw_frame_stream() {
        let args = encoder_args(&cfg(), Path::new("out.mp4"));
        let args: Vec<String> =
            args.iter().map(|a| a.to_string_lossy().into_owned()).collect();

        assert_eq!(args[0], "-y");
        let expect_pair = |flag: &str, value: &str| {
            let i = args.iter().position(|a| a == flag).unwrap();
            assert_eq!(args[i + 1], value);
        };
        expect_pair("-f", "rawvideo");
        expect_pair("-pixel_format", "rgb24");
        expect_pair("-video_size", "1280x720");
        expect_pair("-framerate", "60");
        expect_pair("-b:v", "4000k");
        expect_pair("-i", "-");
        assert_eq!(args.last().unwrap(), "out.mp4");
    }
}
