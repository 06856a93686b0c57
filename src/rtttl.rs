//! RTTTL ringtone notation, e.g. `Wannabe:d=4,o=5,b=125:16g,16g,8a#.,2c6`.
//!
//! A ringtone is `name:defaults:notes`. Each note token is
//! `[duration][a-g|p][#|b][octave][.]`. Anything left over after the dot is malformed.
//! Durations become 32nd-note ticks and pitches become MIDI numbers, with 0 as a rest.

use crate::model::melody::{Melody, Metadata, Step};
use crate::model::notes::midi_for_note;
use log::{debug, warn};
use std::fmt;

pub const DEFAULT_DURATION: u32 = 4;
pub const DEFAULT_OCTAVE: i32 = 5;
pub const DEFAULT_TEMPO_BPM: u32 = 120;

/// Ticks for durations outside the standard set.
const FALLBACK_TICKS: u32 = 8;

/// Note length (1 = whole ... 32 = thirty-second) in 32nd-note ticks.
pub fn duration_ticks(duration: u32) -> u32 {
    match duration {
        1 => 32,
        2 => 16,
        4 => 8,
        8 => 4,
        16 => 2,
        32 => 1,
        _ => FALLBACK_TICKS,
    }
}

/// Dotted length, rounded down to whole ticks.
pub fn dotted(ticks: u32) -> u32 {
    ticks * 3 / 2
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RtttlError {
    /// Fewer than three `:`-separated sections.
    MissingSections,
    /// A note token that does not fit the grammar.
    MalformedToken(String),
    /// A well-formed note whose name/octave is not a MIDI note (e.g. `cb5`, `g#9`).
    UnknownNote(String),
}

impl fmt::Display for RtttlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RtttlError::MissingSections => {
                write!(f, "RTTTL string needs name, defaults and notes separated by ':'")
            }
            RtttlError::MalformedToken(token) => write!(f, "Unrecognized token: '{}'", token),
            RtttlError::UnknownNote(name) => write!(f, "Note name not found: '{}'", name),
        }
    }
}

impl std::error::Error for RtttlError {}

#[derive(Debug, Clone, PartialEq)]
pub struct Ringtone {
    pub name: String,
    pub default_duration: u32,
    pub default_octave: i32,
    /// Parsed for reference; the beacon plays everything at its own tempo.
    pub tempo_bpm: u32,
    pub steps: Vec<Step>,
}

impl Ringtone {
    pub fn into_melody(self) -> Melody {
        Melody {
            metadata: Metadata {
                title: Some(self.name).filter(|n| !n.is_empty()),
                tempo_bpm: Some(self.tempo_bpm),
            },
            steps: self.steps,
        }
    }
}

/// The parts of one note token before defaults are applied.
#[derive(Debug, PartialEq)]
struct Token {
    duration: Option<u32>,
    letter: char,
    accidental: Option<char>,
    octave: Option<i32>,
    dotted: bool,
}

fn take_digits(s: &str) -> (&str, &str) {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    s.split_at(end)
}

fn parse_token(token: &str) -> Option<Token> {
    let (duration, rest) = take_digits(token);

    let mut chars = rest.chars();
    let letter = chars.next().filter(|c| matches!(c, 'a'..='g' | 'p'))?;
    let mut rest = chars.as_str();

    let accidental = match rest.chars().next() {
        Some(c @ ('#' | 'b')) => {
            rest = &rest[1..];
            Some(c)
        }
        _ => None,
    };

    let (octave, rest) = take_digits(rest);

    let (dotted, rest) = match rest.strip_prefix('.') {
        Some(after) => (true, after),
        None => (false, rest),
    };

    if !rest.is_empty() {
        return None;
    }

    Some(Token {
        // Absurdly long durations fall back like any other non-standard value.
        duration: (!duration.is_empty()).then(|| duration.parse().unwrap_or(0)),
        letter,
        accidental,
        octave: if octave.is_empty() {
            None
        } else {
            Some(octave.parse().unwrap_or(i32::MAX))
        },
        dotted,
    })
}

fn parse_defaults(section: &str) -> (u32, i32, u32) {
    let mut duration = DEFAULT_DURATION;
    let mut octave = DEFAULT_OCTAVE;
    let mut tempo = DEFAULT_TEMPO_BPM;

    for setting in section.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let Some((key, value)) = setting.split_once('=') else {
            warn!("Ignoring RTTTL setting without a value: '{}'..!", setting);
            continue;
        };
        let value = value.trim();

        let parsed = match key.trim().to_ascii_lowercase().as_str() {
            "d" => value.parse().map(|v| duration = v).is_ok(),
            "o" => value.parse().map(|v| octave = v).is_ok(),
            "b" => value.parse().map(|v| tempo = v).is_ok(),
            other => {
                debug!("ignoring unknown RTTTL setting '{}'", other);
                true
            }
        };

        if !parsed {
            warn!("Bad RTTTL setting '{}', keeping the default..!", setting);
        }
    }

    (duration, octave, tempo)
}

pub fn parse(notation: &str) -> Result<Ringtone, RtttlError> {
    let mut sections = notation.trim().splitn(3, ':');
    let (Some(name), Some(defaults), Some(notes)) =
        (sections.next(), sections.next(), sections.next())
    else {
        return Err(RtttlError::MissingSections);
    };

    let (default_duration, default_octave, tempo_bpm) = parse_defaults(defaults);
    let default_ticks = duration_ticks(default_duration);

    let mut steps = Vec::new();
    for raw in notes.split(',') {
        let token = raw.trim().to_ascii_lowercase();
        if token.is_empty() {
            debug!("skipping empty RTTTL token");
            continue;
        }

        let parsed = parse_token(&token).ok_or_else(|| RtttlError::MalformedToken(token.clone()))?;

        let mut ticks = parsed.duration.map_or(default_ticks, duration_ticks);
        if parsed.dotted {
            ticks = dotted(ticks);
        }

        let pitch = if parsed.letter == 'p' {
            0
        } else {
            let octave = parsed.octave.unwrap_or(default_octave);
            midi_for_note(parsed.letter, parsed.accidental, octave).ok_or_else(|| {
                let accidental = parsed.accidental.map(String::from).unwrap_or_default();
                RtttlError::UnknownNote(format!("{}{}{}", parsed.letter, accidental, octave))
            })?
        };

        steps.push(Step::new(pitch, ticks));
    }

    Ok(Ringtone {
        name: name.trim().to_owned(),
        default_duration,
        default_octave,
        tempo_bpm,
        steps,
    })
}

/// Parse and render as a Rust melody table.
pub fn snippet(notation: &str) -> Result<String, RtttlError> {
    Ok(parse(notation)?.into_melody().to_rust_const())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::notes::midi_for_name;

    fn pairs(notation: &str) -> Vec<(u8, u32)> {
        parse(notation)
            .unwrap()
            .steps
            .iter()
            .map(|s| (s.pitch, s.ticks))
            .collect()
    }

    #[test]
    fn parses_notes_rests_and_dots() {
        let g5 = midi_for_name("g5").unwrap();
        let c6 = midi_for_name("c6").unwrap();

        assert_eq!(pairs("T:d=4,o=5,b=120:16g,8p,c6."), vec![(g5, 2), (0, 4), (c6, 12)]);
        assert_eq!((g5, c6), (79, 84));
    }

    #[test]
    fn header_fields() {
        let tone = parse("Wannabe:d=8,o=6,b=125:c").unwrap();

        assert_eq!(tone.name, "Wannabe");
        assert_eq!(tone.default_duration, 8);
        assert_eq!(tone.default_octave, 6);
        assert_eq!(tone.tempo_bpm, 125);
        assert_eq!(tone.steps, vec![Step::new(84, 4)]);

        let melody = tone.into_melody();
        assert_eq!(melody.title(), "Wannabe");
        assert_eq!(melody.metadata.tempo_bpm, Some(125));
    }

    #[test]
    fn missing_defaults_fall_back() {
        let tone = parse("x::a,8p").unwrap();

        assert_eq!(tone.default_duration, DEFAULT_DURATION);
        assert_eq!(tone.default_octave, DEFAULT_OCTAVE);
        assert_eq!(tone.tempo_bpm, DEFAULT_TEMPO_BPM);
        assert_eq!(pairs("x::a,8p"), vec![(81, 8), (0, 4)]);
        assert_eq!(pairs("x:d=4,o=zz,b=:a"), vec![(81, 8)]);
    }

    #[test]
    fn sharps_and_flats() {
        assert_eq!(
            pairs("x:d=4,o=5,b=100:8c#6,bb4,eb,8a#."),
            vec![(85, 4), (70, 8), (75, 8), (82, 6)]
        );
        assert_eq!(pairs("x:d=4,o=5:c6."), vec![(84, 12)]);
    }

    #[test]
    fn dot_goes_after_the_octave() {
        assert_eq!(
            parse("x:d=4,o=5:c.6").unwrap_err(),
            RtttlError::MalformedToken("c.6".into())
        );
        assert_eq!(
            parse("x:d=4,o=5:8f#.5").unwrap_err(),
            RtttlError::MalformedToken("8f#.5".into())
        );
        assert_eq!(pairs("x:d=4,o=5:c."), vec![(72, 12)]);
    }

    #[test]
    fn nonstandard_duration_and_floor() {
        assert_eq!(pairs("x:d=3,o=4:c,12d,32e."), vec![(60, 8), (62, 8), (64, 1)]);
    }

    #[test]
    fn upper_case_and_whitespace() {
        assert_eq!(pairs(" Song : d=4, o=5 : 16G , 8P ,C6. "), vec![(79, 2), (0, 4), (84, 12)]);
    }

    #[test]
    fn errors() {
        assert_eq!(parse("only:two").unwrap_err(), RtttlError::MissingSections);
        assert_eq!(parse("no sections").unwrap_err(), RtttlError::MissingSections);
        assert_eq!(
            parse("x:d=4:c,h").unwrap_err(),
            RtttlError::MalformedToken("h".into())
        );
        assert_eq!(
            parse("x:d=4:c6x").unwrap_err(),
            RtttlError::MalformedToken("c6x".into())
        );
        assert_eq!(
            parse("x:d=4:c6..").unwrap_err(),
            RtttlError::MalformedToken("c6..".into())
        );
        assert_eq!(
            parse("x:d=4:cb5").unwrap_err(),
            RtttlError::UnknownNote("cb5".into())
        );
        assert_eq!(
            parse("x:d=4:g#9").unwrap_err(),
            RtttlError::UnknownNote("g#9".into())
        );
        assert_eq!(
            parse("x:d=4:g9").unwrap().steps,
            vec![Step::new(127, 8)]
        );
    }

    #[test]
    fn empty_tokens_are_skipped() {
        assert_eq!(pairs("x:d=4,o=5:c,,d,"), vec![(72, 8), (74, 8)]);
    }

    #[test]
    fn rust_snippet() {
        assert_eq!(
            snippet("Top Gun:d=4,o=5:8c#,p").unwrap(),
            "pub const TOP_GUN_MELODY: &[(u8, u32)] = &[\n    (73, 4),\n    (0, 8),\n];"
        );
    }
}
