//! midi.rs
//!
//! This module parses a Standard MIDI File (SMF) into a flat, time-ordered
//! list of note events with absolute timestamps in seconds. Tick-based
//! delta times are resolved through a tempo map built from every tempo
//! meta event in the file, and note-on/note-off pairs are matched into
//! single `NoteEvent` records.
//!
//! ### Quick primer on MIDI timing
//! - Events inside a track carry delta times in "ticks". The header's
//!   pulses-per-quarter-note (PPQ) plus tempo events (microseconds per
//!   quarter note) turn ticks into wall-clock time.
//! - Tempo events can appear in any track and apply to the whole file,
//!   so the tempo map is collected globally before any conversion.
//! - SMPTE-timed files instead fix the tick duration directly from the
//!   frame rate; tempo events do not apply to them.
//!
//! ### Pairing rule
//! Note-on and note-off are matched per (channel, pitch) first-in
//! first-out: the oldest unmatched note-on is closed by the next
//! note-off. A note-on with velocity 0 counts as a note-off. Orphan
//! note-offs are skipped with a warning; note-ons never released by the
//! end of the file are dropped with a warning.

use std::collections::{HashMap, VecDeque};
use std::path::Path;

use anyhow::{Context, Result};
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};

#[derive(thiserror::Error, Debug)]
pub enum ParseError {
    #[error("not a standard MIDI file: {0}")]
    Malformed(#[from] midly::Error),
    #[error("no playable notes in {0}")]
    NoNotes(String),
}

/// One sounding note with absolute start/end times in seconds.
///
/// Invariant: `end >= start` (guaranteed by construction, since the end
/// timestamp comes from a later or equal tick in the same track).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NoteEvent {
    pub pitch: u8,
    pub start: f64,
    pub end: f64,
    pub velocity: u8,
    pub channel: u8,
}

/// A tempo change with its precomputed absolute position.
struct TempoChange {
    tick: u64,
    seconds: f64,
    us_per_qn: f64,
}

/// Converts absolute ticks into absolute seconds.
enum TempoMap {
    Metrical { ppq: f64, changes: Vec<TempoChange> },
    /// SMPTE timing: fixed wall-clock duration per tick.
    Timecode { secs_per_tick: f64 },
}

impl TempoMap {
    fn from_smf(smf: &Smf<'_>) -> Self {
        let ppq = match smf.header.timing {
            Timing::Metrical(t) => t.as_int() as f64,
            Timing::Timecode(fps, subframe) => {
                return TempoMap::Timecode {
                    secs_per_tick: 1.0 / (fps.as_f32() as f64 * subframe as f64),
                };
            }
        };

        // Tempo events apply file-wide regardless of which track carries
        // them, so gather them all at absolute ticks before integrating.
        let mut raw: Vec<(u64, f64)> = Vec::new();
        for track in &smf.tracks {
            let mut abs_ticks: u64 = 0;
            for ev in track {
                abs_ticks += ev.delta.as_int() as u64;
                if let TrackEventKind::Meta(MetaMessage::Tempo(tp)) = ev.kind {
                    raw.push((abs_ticks, tp.as_int() as f64));
                }
            }
        }
        raw.sort_by_key(|&(tick, _)| tick);

        // Integrate into cumulative seconds. Default 500,000 us per
        // quarter note (120 BPM) before the first tempo event.
        let mut changes = Vec::with_capacity(raw.len() + 1);
        let mut last = TempoChange { tick: 0, seconds: 0.0, us_per_qn: 500_000.0 };
        for (tick, us_per_qn) in raw {
            if tick == last.tick {
                last.us_per_qn = us_per_qn;
                continue;
            }
            let seconds =
                last.seconds + (tick - last.tick) as f64 / ppq * last.us_per_qn / 1_000_000.0;
            changes.push(last);
            last = TempoChange { tick, seconds, us_per_qn };
        }
        changes.push(last);

        TempoMap::Metrical { ppq, changes }
    }

    fn seconds(&self, tick: u64) -> f64 {
        match self {
            TempoMap::Timecode { secs_per_tick } => tick as f64 * secs_per_tick,
            TempoMap::Metrical { ppq, changes } => {
                // changes[0].tick == 0, so the partition point is >= 1.
                let idx = changes.partition_point(|c| c.tick <= tick);
                let c = &changes[idx - 1];
                c.seconds + (tick - c.tick) as f64 / ppq * c.us_per_qn / 1_000_000.0
            }
        }
    }
}

/// Read and parse a MIDI file into note events.
pub fn load_notes(path: &Path) -> Result<Vec<NoteEvent>> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let smf = Smf::parse(&bytes).map_err(ParseError::Malformed)?;
    let notes = extract_notes(&smf);
    if notes.is_empty() {
        return Err(ParseError::NoNotes(path.display().to_string()).into());
    }
    Ok(notes)
}

/// Walk every track, pair note-on/note-off events, and merge the results
/// into one list sorted by (start ascending, pitch descending). The
/// pitch-descending tiebreak fixes the draw order for simultaneous notes.
pub fn extract_notes(smf: &Smf<'_>) -> Vec<NoteEvent> {
    let tempo = TempoMap::from_smf(smf);
    let mut notes = Vec::new();
    let mut orphan_offs = 0usize;
    let mut unterminated = 0usize;

    for track in &smf.tracks {
        // FIFO queue of unmatched note-ons per (channel, pitch).
        let mut open: HashMap<(u8, u8), VecDeque<(f64, u8)>> = HashMap::new();
        let mut abs_ticks: u64 = 0;

        for ev in track {
            abs_ticks += ev.delta.as_int() as u64;
            let TrackEventKind::Midi { channel, message } = ev.kind else {
                continue;
            };
            let ch = u8::from(channel);
            match message {
                MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                    open.entry((ch, key.as_int()))
                        .or_default()
                        .push_back((tempo.seconds(abs_ticks), vel.as_int()));
                }
                // NoteOn with velocity 0 doubles as NoteOff
                MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                    let end = tempo.seconds(abs_ticks);
                    match open.get_mut(&(ch, key.as_int())).and_then(VecDeque::pop_front) {
                        Some((start, velocity)) => notes.push(NoteEvent {
                            pitch: key.as_int(),
                            start,
                            end,
                            velocity,
                            channel: ch,
                        }),
                        None => orphan_offs += 1,
                    }
                }
                _ => {}
            }
        }
        unterminated += open.values().map(VecDeque::len).sum::<usize>();
    }

    if orphan_offs > 0 {
        eprintln!("warning: skipped {orphan_offs} note-off event(s) with no matching note-on");
    }
    if unterminated > 0 {
        eprintln!("warning: dropped {unterminated} note-on event(s) never released");
    }

    notes.sort_by(|a, b| a.start.total_cmp(&b.start).then(b.pitch.cmp(&a.pitch)));
    notes
}
