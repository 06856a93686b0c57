use crate::engine::{AudioPin, Clock, StopFlag, ToneSynth};
use crate::model::config::RadioConfig;
use crate::model::playlist::Playlist;
use crate::morse::MorseSender;
use crate::player::MelodyPlayer;
use anyhow::{Result, anyhow};
use embedded_hal::digital::OutputPin;
use log::{debug, error, info, warn};

/// Time for the transceiver's TX path to stabilize after keying, and between ID and melody.
pub const TX_SETTLE_MS: f64 = 750.0;

/// The idle wait is slept in slices this long so a stop request is noticed promptly.
pub const IDLE_POLL_MS: u64 = 50;

/// Everything the sequencer mutates, owned in one place: the tone synth (and through it the
/// audio pin and clock), the transmit-enable line and the playlist cursor.
///
/// The transmit-enable line is active-low: low keys the transmitter, high is receive.
pub struct BeaconState<A: AudioPin, C: Clock, P: OutputPin> {
    config: RadioConfig,
    synth: ToneSynth<A, C>,
    ptt: P,
    playlist: Playlist,
    morse: MorseSender,
    player: MelodyPlayer,
    cycles: u64,
}

impl<A: AudioPin, C: Clock, P: OutputPin> BeaconState<A, C, P> {
    /// Puts the transmitter in receive mode before anything else happens.
    pub fn new(
        config: RadioConfig,
        synth: ToneSynth<A, C>,
        ptt: P,
        playlist: Playlist,
    ) -> Result<Self> {
        let player = MelodyPlayer::new(config.tempo_bpm)?;

        let mut state = Self {
            config,
            synth,
            ptt,
            playlist,
            morse: MorseSender::default(),
            player,
            cycles: 0,
        };
        state.set_transmitting(false)?;

        Ok(state)
    }

    fn set_transmitting(&mut self, transmitting: bool) -> Result<()> {
        debug!("ptt -> {}", if transmitting { "transmit" } else { "receive" });

        let driven = if transmitting {
            self.ptt.set_low()
        } else {
            self.ptt.set_high()
        };

        driven.map_err(|e| anyhow!("Failed to drive transmit-enable pin: {:?}", e))
    }

    /// One transmission: key up, settle, Morse ID, settle, current melody, back to receive.
    pub fn transmit(&mut self, stop: &StopFlag) -> Result<()> {
        self.set_transmitting(true)?;
        self.synth.silence(TX_SETTLE_MS);

        self.morse.send(&mut self.synth, &self.config.callsign, stop)?;

        if !stop.is_stopped() {
            self.synth.silence(TX_SETTLE_MS);
            self.player
                .play(&mut self.synth, self.playlist.current(), stop)?;
        }

        self.set_transmitting(false)
    }

    /// Sleep out the inter-transmission delay, waking early only for a stop request.
    pub fn idle(&mut self, stop: &StopFlag) {
        let mut remaining = self.config.transmit_delay_ms;

        while remaining > 0 && !stop.is_stopped() {
            let slice = remaining.min(IDLE_POLL_MS);
            self.synth.silence(slice as f64);
            remaining -= slice;
        }
    }

    /// A full sequencer cycle. A failed transmission is logged, the radio is forced back to
    /// receive and the pin released, and the beacon carries on with the idle wait and the
    /// next melody regardless.
    pub fn cycle(&mut self, stop: &StopFlag) {
        info!(
            "transmission {} starting, melody {}/{}: '{}'",
            self.cycles + 1,
            self.playlist.cursor() + 1,
            self.playlist.len(),
            self.playlist.current().title()
        );

        if let Err(e) = self.transmit(stop) {
            error!("Transmission {} failed: {:#}", self.cycles + 1, e);
            self.recover();
        }

        self.idle(stop);

        let next = self.playlist.advance();
        self.cycles += 1;
        debug!("cycle {} complete, next melody index {}", self.cycles, next);
    }

    fn recover(&mut self) {
        if let Err(e) = self.set_transmitting(false) {
            error!("Could not return to receive mode: {:#}", e);
        }
        if let Err(e) = self.synth.tone_off() {
            error!("Could not release the audio pin: {:#}", e);
        }
    }

    /// Cycle until stopped, or until `max_cycles` transmissions when given. Always leaves the
    /// transmitter in receive mode. Returns the number of cycles run.
    pub fn run(&mut self, stop: &StopFlag, max_cycles: Option<u64>) -> u64 {
        info!(
            "beacon '{}' on {:.4} MHz, {} melodies, {} ms between transmissions..!",
            self.config.callsign,
            self.config.frequency_mhz,
            self.playlist.len(),
            self.config.transmit_delay_ms
        );

        let start = self.cycles;
        while !stop.is_stopped() {
            if max_cycles.is_some_and(|max| self.cycles - start >= max) {
                info!("Reached {} cycles, stopping..!", self.cycles - start);
                break;
            }
            self.cycle(stop);
        }

        if stop.is_stopped() {
            warn!("Beacon stopped after {} cycles..!", self.cycles - start);
        }
        self.recover();

        self.cycles - start
    }

    pub fn config(&self) -> &RadioConfig {
        &self.config
    }

    pub fn playlist(&self) -> &Playlist {
        &self.playlist
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn synth(&self) -> &ToneSynth<A, C> {
        &self.synth
    }

    pub fn ptt(&self) -> &P {
        &self.ptt
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::sim::{Recorder, SimAudioPin, SimClock, SimPin, Span};
    use crate::model::melody::Melody;

    type SimBeacon = BeaconState<SimAudioPin, SimClock, SimPin>;

    fn config(transmit_delay_ms: u64) -> RadioConfig {
        RadioConfig {
            callsign: "e".to_owned(),
            transmit_delay_ms,
            tempo_bpm: 120,
            ..RadioConfig::default()
        }
    }

    fn beacon(recorder: &Recorder, audio: SimAudioPin, playlist: Playlist) -> SimBeacon {
        let synth = ToneSynth::new(audio, SimClock::new(recorder.clone())).unwrap();
        let ptt = SimPin::new("ptt", recorder.clone());

        BeaconState::new(config(100), synth, ptt, playlist).unwrap()
    }

    fn six_short_melodies() -> Playlist {
        Playlist::new(
            (0..6)
                .map(|i| Melody::from_pairs(&format!("m{}", i), &[(60 + i, 1)]))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn cursor_wraps_after_seven_cycles() {
        env_logger::try_init().unwrap_or(());

        let recorder = Recorder::off();
        let mut beacon = beacon(&recorder, SimAudioPin::new(recorder.clone()), six_short_melodies());

        let ran = beacon.run(&StopFlag::new(), Some(7));

        assert_eq!(ran, 7);
        assert_eq!(beacon.cycles(), 7);
        assert_eq!(beacon.playlist().cursor(), 1);
        assert!(beacon.ptt().is_high());
    }

    #[test]
    fn one_cycle_schedule() {
        let recorder = Recorder::new();
        let mut beacon = beacon(&recorder, SimAudioPin::new(recorder.clone()), six_short_melodies());
        recorder.clear();

        beacon.cycle(&StopFlag::new());

        assert_eq!(recorder.levels("ptt"), vec![false, true]);
        assert_eq!(
            recorder.spans(),
            vec![
                Span::Silence { ms: TX_SETTLE_MS },
                // "e": dit, mark gap, letter gap
                Span::Tone { frequency_hz: 800.0, ms: 100.0 },
                Span::Silence { ms: 100.0 },
                Span::Silence { ms: 200.0 },
                Span::Silence { ms: TX_SETTLE_MS },
                // middle C for one 62.5 ms tick at 120 BPM
                Span::Tone { frequency_hz: crate::pitch::midi_to_frequency(60), ms: 62.5 },
                Span::Silence { ms: 50.0 },
                Span::Silence { ms: 50.0 },
            ]
        );
        assert_eq!(beacon.playlist().cursor(), 1);
    }

    #[test]
    fn transmitter_keyed_only_while_sending() {
        let recorder = Recorder::new();
        let mut beacon = beacon(&recorder, SimAudioPin::new(recorder.clone()), six_short_melodies());

        beacon.run(&StopFlag::new(), Some(2));

        assert_eq!(
            recorder.levels("ptt"),
            vec![true, false, true, false, true, true]
        );
        assert!(!beacon.synth().is_sounding());
    }

    #[test]
    fn failed_cycle_still_advances() {
        let recorder = Recorder::new();
        let mut beacon = beacon(&recorder, SimAudioPin::jammed(recorder.clone()), six_short_melodies());

        beacon.run(&StopFlag::new(), Some(3));

        assert_eq!(beacon.cycles(), 3);
        assert_eq!(beacon.playlist().cursor(), 3);
        assert!(beacon.ptt().is_high());
        assert!(!beacon.synth().is_sounding());

        // Idle waits still happen after every failed transmission.
        assert_eq!(beacon.synth().clock().elapsed_ms(), 3.0 * (TX_SETTLE_MS + 100.0));
    }

    #[test]
    fn stop_ends_idle_and_leaves_receive_mode() {
        let recorder = Recorder::off();
        let mut beacon = beacon(&recorder, SimAudioPin::new(recorder.clone()), six_short_melodies());
        let stop = StopFlag::new();
        stop.stop();

        assert_eq!(beacon.run(&stop, None), 0);
        assert!(beacon.ptt().is_high());
        assert_eq!(beacon.synth().clock().elapsed_ms(), 0.0);
    }

    #[test]
    fn idle_slices() {
        let recorder = Recorder::new();
        let synth = ToneSynth::new(SimAudioPin::new(recorder.clone()), SimClock::new(recorder.clone())).unwrap();
        let ptt = SimPin::new("ptt", recorder.clone());
        let mut beacon = BeaconState::new(config(120), synth, ptt, six_short_melodies()).unwrap();
        recorder.clear();

        beacon.idle(&StopFlag::new());

        assert_eq!(
            recorder.spans(),
            vec![
                Span::Silence { ms: 50.0 },
                Span::Silence { ms: 50.0 },
                Span::Silence { ms: 20.0 },
            ]
        );
    }
}
