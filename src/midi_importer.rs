use crate::model::melody::{Melody, Metadata, REST, Step};
use anyhow::{Result, anyhow};
use log::{debug, info, warn};
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

const DEFAULT_MPQN: u32 = 500_000;
const MICROSECONDS_PER_MINUTE: f64 = 60_000_000.0;

/// 32nd notes per quarter note, the resolution melodies are stored at.
const TICKS_PER_QUARTER: f64 = 8.0;

/// Simple policy for converting polyphonic MIDI to the beacon's single tone line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PolyPolicy {
    /// Pick the highest active pitch for a given set of overlapping notes.
    #[default]
    Highest,

    /// Pick the lowest active pitch for a given set of overlapping notes.
    Lowest,

    /// Pick the highest velocity note for a given set of overlapping notes.
    Loudest,
}

struct NoteInterval {
    pub midi: u8,
    pub start_tick: u64,
    pub end_tick: u64,
    pub velocity: u8,
}

/// A note already transposed and quantized to 32nd ticks.
#[derive(Debug, Clone, PartialEq)]
struct QuantizedNote {
    midi: u8,
    velocity: u8,
    start: u64,
    end: u64,
}

#[derive(Debug, Clone)]
struct Point {
    tick: u64,
    is_start: bool,
    midi: u8,
    velocity: u8,
}

pub fn import_midi_file<P: AsRef<Path>>(
    path: P,
    transpose_semitones: i32,
    policy: PolyPolicy,
) -> Result<Melody> {
    let bytes = fs::read(path.as_ref()).map_err(|e| {
        anyhow!(
            "Failed to read MIDI file {}: {}",
            path.as_ref().display(),
            e
        )
    })?;

    let fallback_title = path
        .as_ref()
        .file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.to_string());

    midi_bytes_to_melody(&bytes, fallback_title, transpose_semitones, policy)
}

/// Convert an in-memory Standard MIDI File. The first track name becomes the title, falling
/// back to `fallback_title`.
pub fn midi_bytes_to_melody(
    bytes: &[u8],
    fallback_title: Option<String>,
    transpose_semitones: i32,
    policy: PolyPolicy,
) -> Result<Melody> {
    let smf = Smf::parse(bytes).map_err(|e| anyhow!("Failed to parse MIDI: {:?}", e))?;

    let ticks_per_quarter = match smf.header.timing {
        Timing::Metrical(t) => t.as_int() as u64,
        Timing::Timecode(_fps, _subframe) => {
            return Err(anyhow!(
                "SMPTE timecode midi timing is not currently supported..!"
            ));
        }
    };
    if ticks_per_quarter == 0 {
        return Err(anyhow!("MIDI header has zero ticks per quarter note..!"));
    }

    let mut track_name = String::new();

    debug!("Ticks per quarter note: {}", ticks_per_quarter);
    debug!(
        "MIDI format: {:?}, tracks: {}",
        smf.header.format,
        smf.tracks.len()
    );

    let mut first_tempo: Option<(u64, u32)> = None;
    let mut intervals: Vec<NoteInterval> = Vec::new();
    let mut open_notes: HashMap<(u8, u8), Vec<(u64, u8)>> = HashMap::new();

    for (track_idx, track) in smf.tracks.iter().enumerate() {
        let mut abs_tick: u64 = 0;
        for event in track.iter() {
            abs_tick = abs_tick.saturating_add(event.delta.as_int() as u64);

            match &event.kind {
                TrackEventKind::Meta(meta) => match meta {
                    MetaMessage::Tempo(micro) => {
                        let mpqn: u32 = micro.as_int();
                        debug!(
                            "Tempo change at tick {} -> {} us/qn (track {})",
                            abs_tick, mpqn, track_idx
                        );
                        if first_tempo.is_none_or(|(tick, _)| abs_tick < tick) {
                            first_tempo = Some((abs_tick, mpqn));
                        }
                    }
                    MetaMessage::TrackName(bytes) => {
                        if track_name.is_empty() {
                            track_name = String::from_utf8_lossy(bytes).trim().to_string();
                            debug!("Track name: {}", track_name);
                        }
                    }
                    _ => {}
                },
                TrackEventKind::Midi { channel, message } => {
                    let ch: u8 = channel.as_int();

                    match message {
                        MidiMessage::NoteOn { key, vel } => {
                            let velocity: u8 = vel.as_int();

                            if velocity == 0 {
                                close_note(
                                    &mut open_notes,
                                    &mut intervals,
                                    ch,
                                    key.as_int(),
                                    abs_tick,
                                );
                            } else {
                                open_notes
                                    .entry((ch, key.as_int()))
                                    .or_default()
                                    .push((abs_tick, velocity));
                            }
                        }
                        MidiMessage::NoteOff { key, vel: _ } => {
                            close_note(&mut open_notes, &mut intervals, ch, key.as_int(), abs_tick);
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }
    }

    let last_tick_estimate = intervals
        .iter()
        .map(|interval| interval.end_tick)
        .max()
        .unwrap_or(0);

    for ((ch, key), stack) in open_notes.into_iter() {
        for (start_tick, start_vel) in stack {
            let end_tick = if last_tick_estimate > start_tick {
                last_tick_estimate
            } else {
                start_tick + ticks_per_quarter
            };

            intervals.push(NoteInterval {
                midi: key,
                start_tick,
                end_tick,
                velocity: start_vel,
            });

            warn!(
                "Unclosed NoteOn for {}, channel: {} at tick: {} auto-closing at: {}..!",
                key, ch, start_tick, end_tick
            );
        }
    }

    let midi_ticks_per_32nd = ticks_per_quarter as f64 / TICKS_PER_QUARTER;
    let quantize = |tick: u64| -> u64 { (tick as f64 / midi_ticks_per_32nd).round() as u64 };

    let mut notes: Vec<QuantizedNote> = Vec::new();
    for interval in intervals.into_iter() {
        let note_id = interval.midi as i32 + transpose_semitones;

        // 0 is the rest sentinel, so C-1 cannot be played either.
        if !(1..=127).contains(&note_id) {
            warn!("Dropping out-of-range MIDI {} after transpose..!", note_id);
            continue;
        }

        let start = quantize(interval.start_tick);
        let end = quantize(interval.end_tick);

        if end <= start {
            debug!(
                "Skipping midi note {} shorter than a 32nd, start: {} end: {}..!",
                interval.midi, interval.start_tick, interval.end_tick
            );
            continue;
        }

        notes.push(QuantizedNote {
            midi: note_id as u8,
            velocity: interval.velocity,
            start,
            end,
        });
    }

    notes.sort_by_key(|note| (note.start, note.midi));

    let line = reduce_to_monophonic(notes, policy);
    let steps = to_steps(&line);

    let mpqn = first_tempo.map_or(DEFAULT_MPQN, |(_, mpqn)| mpqn).max(1);
    let tempo_bpm = (MICROSECONDS_PER_MINUTE / mpqn as f64).round() as u32;

    let title = Some(track_name)
        .filter(|name| !name.is_empty())
        .or(fallback_title);

    let melody = Melody {
        metadata: Metadata { title, tempo_bpm: Some(tempo_bpm) },
        steps,
    };

    info!(
        "Imported '{}': {} steps, {} ticks, source tempo {} BPM..!",
        melody.title(),
        melody.steps.len(),
        melody.total_ticks(),
        tempo_bpm
    );

    Ok(melody)
}

fn close_note(
    open_notes: &mut HashMap<(u8, u8), Vec<(u64, u8)>>,
    intervals: &mut Vec<NoteInterval>,
    ch: u8,
    midi_num: u8,
    abs_tick: u64,
) {
    if let Some((start_tick, start_vel)) = open_notes
        .get_mut(&(ch, midi_num))
        .and_then(|stack| stack.pop())
    {
        intervals.push(NoteInterval {
            midi: midi_num,
            start_tick,
            end_tick: abs_tick,
            velocity: start_vel,
        });
    } else {
        debug!(
            "Orphaned NoteOff for {} ch{} at tick {}..!",
            midi_num, ch, abs_tick
        );
    }
}

/// Given a possibly-overlapping set of notes, reduce to a single non-overlapping line according
/// to the specified policy.
///
/// Basic approach: create a sorted set of tick points where something changes (start or end), and
/// at each point decide which note should be sounding using the policy.
fn reduce_to_monophonic(notes: Vec<QuantizedNote>, policy: PolyPolicy) -> Vec<QuantizedNote> {
    if notes.is_empty() {
        return notes;
    }

    let mut points: Vec<Point> = Vec::with_capacity(notes.len() * 2);
    for note in notes.into_iter() {
        points.push(Point {
            tick: note.start,
            is_start: true,
            midi: note.midi,
            velocity: note.velocity,
        });
        points.push(Point {
            tick: note.end,
            is_start: false,
            midi: note.midi,
            velocity: note.velocity,
        });
    }

    // Ends sort before starts at the same tick, so a note ending at `t` is not still
    // active for a note starting at `t`.
    points.sort_by_key(|pt| (pt.tick, pt.is_start));

    let mut result: Vec<QuantizedNote> = Vec::new();
    let mut current: Option<(u8, u8, u64)> = None;
    // Velocities of every sounding copy of a pitch (several channels may share one).
    let mut active: BTreeMap<u8, Vec<u8>> = BTreeMap::new();

    let mut reduced = false;
    for pt in points.into_iter() {
        if pt.is_start {
            active.entry(pt.midi).or_default().push(pt.velocity);
        } else if let Some(velocities) = active.get_mut(&pt.midi) {
            if let Some(i) = velocities.iter().position(|&v| v == pt.velocity) {
                velocities.swap_remove(i);
            }
            if velocities.is_empty() {
                active.remove(&pt.midi);
            }
        }

        let chosen: Option<(u8, u8)> = match policy {
            PolyPolicy::Highest => active
                .iter()
                .next_back()
                .map(|(&note, vels)| (note, vels.iter().copied().max().unwrap_or(0))),
            PolyPolicy::Lowest => active
                .iter()
                .next()
                .map(|(&note, vels)| (note, vels.iter().copied().max().unwrap_or(0))),
            PolyPolicy::Loudest => active
                .iter()
                .map(|(&note, vels)| (note, vels.iter().copied().max().unwrap_or(0)))
                .max_by_key(|&(_, vel)| vel),
        };

        if active.len() > 1 && !reduced {
            reduced = true;
            warn!(
                "MIDI contains multiple overlapping notes, so reducing to one line according to the chosen policy [{:?}]...",
                policy
            );
        }

        if chosen.map(|(note, _)| note) != current.map(|(note, _, _)| note) {
            if let Some((note, velocity, start)) = current
                && pt.tick > start
            {
                result.push(QuantizedNote {
                    midi: note,
                    velocity,
                    start,
                    end: pt.tick,
                });
            }

            current = chosen.map(|(note, velocity)| (note, velocity, pt.tick));
        }
    }

    result
}

/// Lay the line out as steps, filling gaps between notes with rests. Silence before the
/// first note is dropped.
fn to_steps(line: &[QuantizedNote]) -> Vec<Step> {
    let mut steps = Vec::with_capacity(line.len() * 2);
    let mut cursor = line.first().map_or(0, |note| note.start);

    for note in line {
        if note.start > cursor {
            steps.push(Step::new(REST, ticks(note.start - cursor)));
        }
        steps.push(Step::new(note.midi, ticks(note.end - note.start)));
        cursor = note.end;
    }

    steps
}

fn ticks(span: u64) -> u32 {
    u32::try_from(span).unwrap_or(u32::MAX)
}
