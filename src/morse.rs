use crate::engine::{AudioPin, Clock, StopFlag, ToneSynth};
use anyhow::Result;
use log::{info, warn};

/// Keying speed of the identification message.
pub const MORSE_WPM: u32 = 12;

/// Sidetone pitch used for every mark.
pub const MORSE_TONE_HZ: f64 = 800.0;

pub const MORSE_TABLE: &[(char, &str)] = &[
    ('a', ".-"),
    ('b', "-..."),
    ('c', "-.-."),
    ('d', "-.."),
    ('e', "."),
    ('f', "..-."),
    ('g', "--."),
    ('h', "...."),
    ('i', ".."),
    ('j', ".---"),
    ('k', "-.-"),
    ('l', ".-.."),
    ('m', "--"),
    ('n', "-."),
    ('o', "---"),
    ('p', ".--."),
    ('q', "--.-"),
    ('r', ".-."),
    ('s', "..."),
    ('t', "-"),
    ('u', "..-"),
    ('v', "...-"),
    ('w', ".--"),
    ('x', "-..-"),
    ('y', "-.--"),
    ('z', "--.."),
    ('0', "-----"),
    ('1', ".----"),
    ('2', "..---"),
    ('3', "...--"),
    ('4', "....-"),
    ('5', "....."),
    ('6', "-...."),
    ('7', "--..."),
    ('8', "---.."),
    ('9', "----."),
    ('.', ".-.-.-"),
    (',', "--..--"),
    ('?', "..--.."),
    ('\'', ".----."),
    ('!', "-.-.--"),
    ('/', "-..-."),
    ('(', "-.--."),
    (')', "-.--.-"),
    ('&', ".-..."),
    (':', "---..."),
    (';', "-.-.-."),
    ('=', "-...-"),
    ('+', ".-.-."),
    ('-', "-....-"),
    ('_', "..--.-"),
    ('"', ".-..-."),
    ('$', "...-..-"),
    ('@', ".--.-."),
];

/// Marks and gaps of the keyed signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Element {
    /// Short mark, 1 unit.
    Dit,
    /// Long mark, 3 units.
    Dah,
    /// Gap after every mark, 1 unit.
    MarkGap,
    /// Added after a character's last mark gap, making 3 units between letters.
    LetterGap,
    /// Added after a letter gap on a space, making 7 units between words.
    WordGap,
}

impl Element {
    pub const fn units(self) -> u32 {
        match self {
            Element::Dit => 1,
            Element::Dah => 3,
            Element::MarkGap => 1,
            Element::LetterGap => 2,
            Element::WordGap => 4,
        }
    }

    pub const fn is_tone(self) -> bool {
        matches!(self, Element::Dit | Element::Dah)
    }
}

/// Code for a character, case-insensitive. Space is not in the table.
pub fn lookup(c: char) -> Option<&'static str> {
    let c = c.to_ascii_lowercase();
    MORSE_TABLE
        .iter()
        .find(|(k, _)| *k == c)
        .map(|(_, code)| *code)
}

/// Elements for one character. Unknown characters produce nothing.
pub fn encode_char(c: char) -> Vec<Element> {
    if c == ' ' {
        return vec![Element::WordGap];
    }

    let Some(code) = lookup(c) else {
        return Vec::new();
    };

    let mut elements = Vec::with_capacity(code.len() * 2 + 1);
    for mark in code.chars() {
        elements.push(if mark == '.' { Element::Dit } else { Element::Dah });
        elements.push(Element::MarkGap);
    }
    elements.push(Element::LetterGap);

    elements
}

pub fn encode(message: &str) -> Vec<Element> {
    message.chars().flat_map(encode_char).collect()
}

/// Human-readable dots and dashes, words separated by `//`.
pub fn render(message: &str) -> String {
    message
        .chars()
        .filter_map(|c| if c == ' ' { Some("//") } else { lookup(c) })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Dot length in milliseconds for a keying speed (PARIS standard, 50 units per word).
pub fn unit_ms(wpm: u32) -> f64 {
    60_000.0 / (f64::from(wpm) * 50.0)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MorseSender {
    wpm: u32,
    tone_hz: f64,
}

impl Default for MorseSender {
    fn default() -> Self {
        Self::new(MORSE_WPM, MORSE_TONE_HZ)
    }
}

impl MorseSender {
    pub fn new(wpm: u32, tone_hz: f64) -> Self {
        Self {
            wpm: wpm.max(1),
            tone_hz,
        }
    }

    pub fn unit_ms(&self) -> f64 {
        unit_ms(self.wpm)
    }

    /// Key `message` through the synth, one element after another. A stop request is
    /// honoured between characters.
    pub fn send<A: AudioPin, C: Clock>(
        &self,
        synth: &mut ToneSynth<A, C>,
        message: &str,
        stop: &StopFlag,
    ) -> Result<()> {
        info!("transmitting '{}': {}", message, render(message));
        let unit = self.unit_ms();

        for c in message.chars() {
            if stop.is_stopped() {
                warn!("Morse stopped before '{}'..!", c);
                return Ok(());
            }

            for element in encode_char(c) {
                let ms = unit * f64::from(element.units());
                if element.is_tone() {
                    synth.tone(self.tone_hz, ms)?;
                } else {
                    synth.silence(ms);
                }
            }
        }

        Ok(())
    }
}
