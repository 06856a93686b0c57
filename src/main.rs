use anyhow::Result;
use clap::Parser;
use embedded_hal::digital::OutputPin;
use fox_beacon::pwm::SysfsPwmAudio;
use fox_beacon::sim::{Recorder, SimAudioPin, SimPin};
use fox_beacon::{
    AudioPin, BeaconArgs, BeaconState, Clock, Playlist, RadioConfig, SpinClock, StopFlag,
    ToneSynth, Transceiver, load_melody, open_link, parse_policy,
};
use log::{debug, error, info, warn};
use std::path::Path;

/// Time for the SA868 to power up before it accepts commands.
const BOOT_SETTLE_MS: f64 = 1000.0;

fn main() -> Result<()> {
    env_logger::init();
    let args = BeaconArgs::parse();
    let config = RadioConfig::from(&args);

    if config.has_default_callsign() {
        warn!(
            "Callsign left at its default '{}', set one with `--callsign`..!",
            config.callsign
        );
    }

    let playlist = if args.melodies.is_empty() {
        Playlist::builtin()
    } else {
        let policy = parse_policy(&args.policy);
        let melodies = args
            .melodies
            .iter()
            .map(|path| load_melody(path, policy))
            .collect::<Result<Vec<_>>>()?;
        Playlist::new(melodies)?
    };

    if args.verbose {
        for (i, melody) in playlist.iter().enumerate() {
            info!(
                "Playlist {}: '{}' ({} steps, {} ticks)",
                i + 1,
                melody.title(),
                melody.steps.len(),
                melody.total_ticks()
            );
        }
    }

    if let Some(chip) = &args.gpio_chip {
        return run_on_gpio(chip, &args, config, playlist);
    }

    if args.link.is_some() {
        warn!("`--link` reaches a real SA868 but PTT is simulated, nothing will key up..!");
    }

    // Control lines: receive mode, module powered up, low power.
    let recorder = Recorder::off();
    let mut ptt = SimPin::new("ptt", recorder.clone());
    let mut power_down = SimPin::new("pd", recorder.clone());
    let mut high_low = SimPin::new("hl", recorder);
    ptt.set_high()?;
    power_down.set_high()?;
    high_low.set_low()?;

    drive(&args, config, playlist, ptt, (power_down, high_low))
}

#[cfg(all(feature = "gpio", target_os = "linux"))]
fn run_on_gpio(chip: &Path, args: &BeaconArgs, config: RadioConfig, playlist: Playlist) -> Result<()> {
    use fox_beacon::gpio::ControlLines;

    let lines = ControlLines::open(chip, args.ptt_line, args.pd_line, args.hl_line)?;
    info!(
        "Control lines on {}: PTT {}, PD {}, HL {}",
        chip.display(),
        args.ptt_line,
        args.pd_line,
        args.hl_line
    );

    drive(args, config, playlist, lines.ptt, (lines.power_down, lines.high_low))
}

#[cfg(not(all(feature = "gpio", target_os = "linux")))]
fn run_on_gpio(chip: &Path, _args: &BeaconArgs, _config: RadioConfig, _playlist: Playlist) -> Result<()> {
    anyhow::bail!(
        "`--gpio-chip {}` needs fox_beacon built with the `gpio` feature on Linux..!",
        chip.display()
    )
}

/// Boot, configure the module, then beacon until stopped. `_held` keeps the lines the beacon
/// never touches at their idle levels for the whole run.
fn drive<P: OutputPin, H>(
    args: &BeaconArgs,
    config: RadioConfig,
    playlist: Playlist,
    ptt: P,
    _held: H,
) -> Result<()> {
    let mut clock = SpinClock::new();
    debug!("waiting {} ms for the transceiver to boot", BOOT_SETTLE_MS);
    clock.sleep_ms(BOOT_SETTLE_MS);

    // The link stays open until the beacon stops.
    let _radio = match open_link(args.link.as_deref()) {
        Ok(link) => {
            let mut radio = Transceiver::new(link);
            if let Err(e) = radio.configure(&mut clock, &config) {
                error!("Transceiver setup failed, carrying on regardless: {:#}", e);
            }
            Some(radio)
        }
        Err(e) => {
            error!("Transceiver setup failed, carrying on regardless: {:#}", e);
            None
        }
    };

    let cycles = match args.pwm_chip {
        Some(chip) => {
            let audio = SysfsPwmAudio::open(chip, args.pwm_channel)?;
            info!("Audio on PWM chip {} channel {}", chip, args.pwm_channel);
            run_with(audio, clock, ptt, config, playlist, args.max_cycles)?
        }
        None => {
            if args.link.is_some() {
                warn!("`--link` reaches a real SA868 but audio is simulated, it will transmit silence..!");
            }
            run_with(SimAudioPin::new(Recorder::off()), clock, ptt, config, playlist, args.max_cycles)?
        }
    };

    info!("Beacon finished after {} cycles, exiting..!", cycles);
    Ok(())
}

fn run_with<A: AudioPin, C: Clock, P: OutputPin>(
    audio: A,
    clock: C,
    ptt: P,
    config: RadioConfig,
    playlist: Playlist,
    max_cycles: Option<u64>,
) -> Result<u64> {
    let synth = ToneSynth::new(audio, clock)?;
    let mut beacon = BeaconState::new(config, synth, ptt, playlist)?;

    let stop = StopFlag::new();
    let stop_for_handler = stop.clone();
    ctrlc::set_handler(move || {
        warn!("Ctrl-C received, stopping after the current tone..!");
        stop_for_handler.stop();
    })?;

    Ok(beacon.run(&stop, max_cycles))
}
