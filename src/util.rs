use crate::PolyPolicy;
use crate::import_midi_file;
use crate::model::config::{ConvertArgs, OutputFormat};
use crate::model::melody::Melody;
use crate::rtttl;
use anyhow::{Context, Result};
use log::{debug, info};
use std::fs;
use std::path::Path;

pub fn parse_policy(s: &str) -> PolyPolicy {
    match s.to_lowercase().as_str() {
        "h" | "highest" => PolyPolicy::Highest,
        "lw" | "lowest" => PolyPolicy::Lowest,
        "lu" | "loudest" => PolyPolicy::Loudest,
        other => {
            info!("Unknown policy '{}', defaulting to `highest`..!", other);
            PolyPolicy::Highest
        }
    }
}

/// Load one playlist entry. `.json` files hold a serialized [`Melody`], `.mid`/`.midi` files
/// are imported (reduced to one line with `policy`), anything else is read as RTTTL text.
pub fn load_melody<P: AsRef<Path>>(path: P, policy: PolyPolicy) -> Result<Melody> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    let melody = match extension.as_deref() {
        Some("mid" | "midi") => import_midi_file(path, 0, policy)?,
        Some("json") => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read melody file {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse melody JSON in {}", path.display()))?
        }
        _ => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read ringtone file {}", path.display()))?;
            rtttl::parse(&text)
                .with_context(|| format!("Failed to parse RTTTL in {}", path.display()))?
                .into_melody()
        }
    };

    melody.validate()?;
    info!(
        "Loaded '{}' from {} ({} steps)..!",
        melody.title(),
        path.display(),
        melody.steps.len()
    );

    Ok(melody)
}

pub const CONVERT_USAGE: &str = "Usage: rtttl2melody \"<RTTTL_STRING>\"
Example:
   rtttl2melody \"Wannabe:d=4,o=5,b=125:16g,16g,16g,16g,8g,8a,8g,8e,8p,16c,16d,16c\"";

/// What the converter prints, and the status it exits with.
#[derive(Debug, Clone, PartialEq)]
pub enum Conversion {
    /// Nothing to convert.
    Usage,
    Output(String),
}

impl Conversion {
    pub fn exit_code(&self) -> i32 {
        match self {
            Conversion::Usage => 1,
            Conversion::Output(_) => 0,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Conversion::Usage => CONVERT_USAGE,
            Conversion::Output(text) => text,
        }
    }
}

/// Run the offline converter: RTTTL notation or a MIDI file in, a Rust table or JSON out.
pub fn convert(args: &ConvertArgs) -> Result<Conversion> {
    let melody = match (&args.notation, &args.midi) {
        (_, Some(path)) => import_midi_file(path, args.transpose, parse_policy(&args.policy))?,
        (Some(notation), None) => {
            let ringtone = rtttl::parse(notation)?;
            debug!(
                "Parsed '{}': d={}, o={}, b={}",
                ringtone.name, ringtone.default_duration, ringtone.default_octave, ringtone.tempo_bpm
            );
            ringtone.into_melody()
        }
        (None, None) => return Ok(Conversion::Usage),
    };

    let text = match args.format {
        OutputFormat::Rust => format!("Generated melody snippet:\n\n{}", melody.to_rust_const()),
        OutputFormat::Json => serde_json::to_string_pretty(&melody)?,
    };

    Ok(Conversion::Output(text))
}
