use crate::model::melody::Melody;
use anyhow::{Result, bail};

// (midi note, 32nd-note ticks): 2 = 16th, 8 = quarter, 32 = whole. Dotted values are
// already multiplied by 1.5. Pitch 0 is a rest.

pub const NEVER_GONNA_GIVE_YOU_UP_MELODY: &[(u8, u32)] = &[
    (69, 2), (71, 2), (74, 2), (71, 2), (78, 6), (78, 6), (76, 12),
    (69, 2), (71, 2), (74, 2), (71, 2), (76, 6), (76, 6), (74, 6),
    (73, 2), (71, 6), (69, 2), (71, 2), (74, 2), (71, 2),
    (74, 8), (76, 4), (73, 6), (71, 2), (69, 4), (69, 4), (69, 4),
    (76, 8), (74, 16), (69, 2), (71, 2), (74, 2), (71, 2),
    (78, 6), (78, 6), (76, 12), (69, 2), (71, 2), (74, 2), (71, 2),
    (81, 8), (73, 4), (74, 6), (73, 2), (71, 4), (69, 2), (71, 2), (74, 2), (71, 2),
    (74, 8), (76, 4), (73, 6), (71, 2), (69, 8), (69, 4), (76, 8), (74, 16), (0, 8),
];

pub const O_CANADA_MELODY: &[(u8, u32)] = &[
    (79, 8), (82, 4), (0, 2), (82, 2), (75, 12), (77, 4), (79, 4),
    (80, 4), (82, 4), (84, 4), (77, 12), (0, 4), (79, 8), (81, 4),
    (0, 2), (81, 2), (82, 12), (84, 4), (86, 4), (86, 4), (84, 4),
    (84, 4), (82, 12), (77, 3), (79, 1), (80, 6), (79, 2), (77, 4),
    (79, 3), (80, 1), (82, 6), (80, 2), (79, 4), (80, 3), (82, 1),
    (84, 4), (82, 4), (80, 4), (79, 4), (77, 12), (77, 3), (79, 1),
    (80, 6), (79, 2), (77, 4), (79, 3), (80, 1), (82, 6), (80, 2),
    (79, 4), (79, 4), (77, 4), (82, 4), (82, 2), (81, 2), (79, 2),
    (81, 2), (82, 8), (0, 8), (79, 8), (82, 6), (82, 2), (75, 8),
    (0, 8), (80, 8), (84, 4), (0, 2), (84, 2), (77, 8), (0, 8),
    (82, 8), (83, 4), (0, 2), (83, 2), (84, 4), (80, 4), (79, 4),
    (77, 4), (75, 8), (77, 8), (79, 8), (0, 8), (82, 8), (87, 4),
    (0, 2), (87, 2), (84, 4), (80, 4), (79, 4), (77, 4), (82, 8),
    (74, 8), (75, 16),
];

pub const TOP_GUN_ANTHEM_MELODY: &[(u8, u32)] = &[
    (0, 4), (61, 8), (68, 8), (68, 8), (66, 4), (65, 4), (66, 4),
    (65, 4), (63, 8), (63, 8), (61, 4), (63, 4), (65, 8), (63, 4),
    (65, 4), (66, 8), (65, 4), (61, 4), (65, 8), (63, 32), (61, 8),
    (68, 8), (68, 8), (66, 4), (65, 4), (66, 4), (65, 4), (63, 8),
    (63, 8), (61, 4), (63, 4), (65, 8), (63, 4), (65, 4), (66, 8),
    (65, 4), (61, 4), (68, 32),
];

pub const THE_FINAL_COUNTDOWN_MELODY: &[(u8, u32)] = &[
    (0, 8), (0, 4), (83, 2), (81, 2), (83, 8), (76, 8), (0, 8),
    (0, 4), (84, 2), (83, 2), (84, 4), (83, 4), (81, 8), (0, 8),
    (0, 4), (84, 2), (83, 2), (84, 8), (76, 8), (0, 8), (0, 4),
    (81, 2), (79, 2), (81, 4), (79, 4), (78, 4), (81, 4), (79, 12),
    (78, 2), (79, 2), (81, 12), (79, 2), (81, 2), (83, 4), (81, 4),
    (79, 4), (78, 4), (76, 8), (84, 8), (83, 24), (83, 2), (84, 2),
    (83, 2), (81, 2), (83, 32),
];

pub const WANNABE_MELODY: &[(u8, u32)] = &[
    (79, 2), (79, 2), (79, 2), (79, 2), (79, 4), (81, 4), (79, 4),
    (76, 4), (0, 4), (72, 2), (74, 2), (72, 2), (74, 4), (74, 4),
    (72, 4), (76, 8), (0, 8), (79, 4), (79, 4), (79, 4), (81, 4),
    (79, 4), (76, 4), (0, 4), (84, 8), (84, 4), (83, 4), (79, 4),
    (81, 4), (83, 2), (81, 2), (79, 8),
];

pub const GOD_SAVE_THE_KING_MELODY: &[(u8, u32)] = &[
    (91, 8), (91, 8), (93, 8), (90, 12), (91, 4), (93, 8), (95, 8),
    (95, 8), (96, 8), (95, 12), (93, 4), (91, 8), (93, 8), (91, 8),
    (90, 8), (91, 8),
];

pub const BUILTIN_MELODIES: &[(&str, &[(u8, u32)])] = &[
    ("Never Gonna Give You Up", NEVER_GONNA_GIVE_YOU_UP_MELODY),
    ("O Canada", O_CANADA_MELODY),
    ("Top Gun Anthem", TOP_GUN_ANTHEM_MELODY),
    ("The Final Countdown", THE_FINAL_COUNTDOWN_MELODY),
    ("Wannabe", WANNABE_MELODY),
    ("God Save the King", GOD_SAVE_THE_KING_MELODY),
];

/// Melodies played in rotation, one per transmission. Never empty.
#[derive(Debug, Clone)]
pub struct Playlist {
    melodies: Vec<Melody>,
    cursor: usize,
}

impl Playlist {
    pub fn new(melodies: Vec<Melody>) -> Result<Self> {
        if melodies.is_empty() {
            bail!("A playlist needs at least one melody..!");
        }

        Ok(Self {
            melodies,
            cursor: 0,
        })
    }

    pub fn builtin() -> Self {
        Self {
            melodies: BUILTIN_MELODIES
                .iter()
                .map(|(title, pairs)| Melody::from_pairs(title, pairs))
                .collect(),
            cursor: 0,
        }
    }

    pub fn current(&self) -> &Melody {
        &self.melodies[self.cursor]
    }

    /// Move to the next melody, wrapping at the end. Returns the new cursor.
    pub fn advance(&mut self) -> usize {
        self.cursor = (self.cursor + 1) % self.melodies.len();
        self.cursor
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.melodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.melodies.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Melody> {
        self.melodies.iter()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn builtin_has_six_valid_melodies() {
        let playlist = Playlist::builtin();
        assert_eq!(playlist.len(), 6);
        assert_eq!(playlist.current().title(), "Never Gonna Give You Up");
        assert!(playlist.iter().all(|m| m.validate().is_ok() && !m.steps.is_empty()));
    }

    #[test]
    fn cursor_wraps() {
        let mut playlist = Playlist::builtin();
        for _ in 0..7 {
            playlist.advance();
        }
        assert_eq!(playlist.cursor(), 1);
        assert_eq!(playlist.current().title(), "O Canada");
    }

    #[test]
    fn single_entry_stays_put() {
        let mut playlist = Playlist::new(vec![Melody::from_pairs("solo", &[(69, 8)])]).unwrap();
        assert_eq!(playlist.advance(), 0);
        assert_eq!(playlist.advance(), 0);
    }

    #[test]
    fn empty_is_rejected() {
        assert!(Playlist::new(Vec::new()).is_err());
    }
}
