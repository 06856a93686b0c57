use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Left at this value the beacon still runs, but warns that nobody set a callsign.
pub const DEFAULT_CALLSIGN: &str = "Fox Hunt";

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Bandwidth {
    /// 12.5 kHz channel.
    Narrow,
    /// 25 kHz channel.
    #[default]
    Wide,
}

impl Bandwidth {
    /// Selector value used by `AT+DMOSETGROUP`.
    pub const fn code(self) -> u8 {
        match self {
            Bandwidth::Narrow => 0,
            Bandwidth::Wide => 1,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "fox_beacon",
    about = "Run a fox-hunt beacon: Morse ID plus a rotating playlist of melodies through an SA868."
)]
pub struct BeaconArgs {
    /// Identification message, sent in Morse at the start of every transmission.
    #[arg(short, long, default_value = DEFAULT_CALLSIGN)]
    pub callsign: String,

    /// Transmit (and receive) frequency in MHz.
    #[arg(short, long, default_value_t = 146.565)]
    pub frequency: f64,

    /// Channel bandwidth.
    #[arg(short, long, value_enum, default_value_t = Bandwidth::Wide)]
    pub bandwidth: Bandwidth,

    /// Squelch level, 0 (open) to 8.
    #[arg(short, long, default_value_t = 3, value_parser = clap::value_parser!(u8).range(0..=8))]
    pub squelch: u8,

    /// Module volume. Clamped to 1..=8 when sent.
    #[arg(long, default_value_t = 5)]
    pub volume: u8,

    /// Idle time between transmissions in milliseconds.
    #[arg(short = 'd', long = "transmit-delay", default_value_t = 30_000)]
    pub transmit_delay_ms: u64,

    /// Playback tempo in beats per minute, shared by every melody.
    #[arg(short, long, default_value_t = 140, value_parser = clap::value_parser!(u32).range(1..))]
    pub tempo: u32,

    /// host:port of a TCP serial bridge wired to the SA868. A simulated module is used when absent.
    #[arg(short, long)]
    pub link: Option<String>,

    /// GPIO character device driving the control lines, e.g. /dev/gpiochip0. Needs the `gpio`
    /// feature; the lines are simulated when absent.
    #[arg(long)]
    pub gpio_chip: Option<PathBuf>,

    /// GPIO line offset of the transmit-enable (PTT) input, active low.
    #[arg(long, default_value_t = 5)]
    pub ptt_line: u32,

    /// GPIO line offset of the power-down input, held high.
    #[arg(long, default_value_t = 6)]
    pub pd_line: u32,

    /// GPIO line offset of the high/low power select, held low.
    #[arg(long, default_value_t = 7)]
    pub hl_line: u32,

    /// sysfs PWM chip number for the audio tone (/sys/class/pwm/pwmchipN). Simulated when absent.
    #[arg(long)]
    pub pwm_chip: Option<u32>,

    /// Channel of the PWM chip wired to the SA868 audio input.
    #[arg(long, default_value_t = 0)]
    pub pwm_channel: u32,

    /// Melody file (.json, .mid or RTTTL text). Repeat to build the playlist; defaults to the built-in set.
    #[arg(short, long = "melody")]
    pub melodies: Vec<PathBuf>,

    /// Polyphony reduction policy for MIDI melodies: highest|lowest|loudest.
    #[arg(short, long, default_value = "highest")]
    pub policy: String,

    /// Stop after this many transmit cycles instead of running until interrupted.
    #[arg(long)]
    pub max_cycles: Option<u64>,

    /// Prints extra information about each cycle.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Radio settings fixed at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct RadioConfig {
    pub callsign: String,
    pub frequency_mhz: f64,
    pub bandwidth: Bandwidth,
    pub squelch: u8,
    pub volume: u8,
    pub transmit_delay_ms: u64,
    pub tempo_bpm: u32,
}

impl RadioConfig {
    pub fn has_default_callsign(&self) -> bool {
        self.callsign == DEFAULT_CALLSIGN
    }
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            callsign: DEFAULT_CALLSIGN.to_owned(),
            frequency_mhz: 146.565,
            bandwidth: Bandwidth::Wide,
            squelch: 3,
            volume: 5,
            transmit_delay_ms: 30_000,
            tempo_bpm: 140,
        }
    }
}

impl From<&BeaconArgs> for RadioConfig {
    fn from(args: &BeaconArgs) -> Self {
        Self {
            callsign: args.callsign.clone(),
            frequency_mhz: args.frequency,
            bandwidth: args.bandwidth,
            squelch: args.squelch,
            volume: args.volume,
            transmit_delay_ms: args.transmit_delay_ms,
            tempo_bpm: args.tempo,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// A `pub const NAME_MELODY: &[(u8, u32)]` table.
    #[default]
    Rust,
    /// The melody as JSON, loadable with `fox_beacon --melody`.
    Json,
}

#[derive(Parser, Debug)]
#[command(
    name = "rtttl2melody",
    about = "Convert an RTTTL ringtone (or a MIDI file) into fox_beacon melody steps."
)]
pub struct ConvertArgs {
    /// RTTTL string, e.g. "Wannabe:d=4,o=5,b=125:16g,16g,16g".
    pub notation: Option<String>,

    /// Convert a standard MIDI file instead of RTTTL notation.
    #[arg(long, conflicts_with = "notation")]
    pub midi: Option<PathBuf>,

    /// Transpose MIDI input in semitones (positive or negative).
    #[arg(short, long, default_value_t = 0, allow_hyphen_values = true)]
    pub transpose: i32,

    /// Polyphony reduction policy for MIDI input: highest|lowest|loudest.
    #[arg(short, long, default_value = "highest")]
    pub policy: String,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Rust)]
    pub format: OutputFormat,
}
