use anyhow::bail;
use serde::{Deserialize, Serialize};

/// Pitch value that marks a rest rather than MIDI note 0 (C-1).
pub const REST: u8 = 0;

/// One melody event: a MIDI pitch (or [`REST`]) held for a number of 32nd-note ticks.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub pitch: u8,
    pub ticks: u32,
}

impl Step {
    pub const fn new(pitch: u8, ticks: u32) -> Self {
        Self { pitch, ticks }
    }

    pub const fn rest(ticks: u32) -> Self {
        Self::new(REST, ticks)
    }

    pub const fn is_rest(&self) -> bool {
        self.pitch == REST
    }
}

/// Informational only; playback always uses the beacon's tempo.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    pub title: Option<String>,
    pub tempo_bpm: Option<u32>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Melody {
    pub metadata: Metadata,
    pub steps: Vec<Step>,
}

impl Melody {
    pub fn from_pairs(title: &str, pairs: &[(u8, u32)]) -> Self {
        Self {
            metadata: Metadata {
                title: Some(title.to_owned()),
                tempo_bpm: None,
            },
            steps: pairs.iter().map(|&(pitch, ticks)| Step::new(pitch, ticks)).collect(),
        }
    }

    pub fn title(&self) -> &str {
        self.metadata.title.as_deref().unwrap_or("Untitled")
    }

    pub fn total_ticks(&self) -> u64 {
        self.steps.iter().map(|s| u64::from(s.ticks)).sum()
    }

    /// Reject pitches outside the MIDI range. Needed for melodies read from files.
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some((i, step)) = self.steps.iter().enumerate().find(|(_, s)| s.pitch > 127) {
            bail!(
                "Melody '{}' has an out-of-range pitch {} at step {}..!",
                self.title(),
                step.pitch,
                i
            );
        }

        Ok(())
    }

    /// Render as a Rust table in the same shape as the built-in playlist entries.
    pub fn to_rust_const(&self) -> String {
        let mut out = format!(
            "pub const {}: &[(u8, u32)] = &[\n",
            const_name(self.title())
        );

        for step in &self.steps {
            out.push_str(&format!("    ({}, {}),\n", step.pitch, step.ticks));
        }
        out.push_str("];");

        out
    }
}

fn const_name(title: &str) -> String {
    let mut name: String = title
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();

    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    name.push_str("_MELODY");

    name
}
