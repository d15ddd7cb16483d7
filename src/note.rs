// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// The lowest playable octave.
pub const LOW_OCTAVE: u8 = 3;
/// The highest playable octave.
pub const HIGH_OCTAVE: u8 = 5;

/// The twelve pitch classes, spelled with flats to match the sample file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PitchClass {
    C,
    Db,
    D,
    Eb,
    E,
    F,
    Gb,
    G,
    Ab,
    A,
    Bb,
    B,
}

impl PitchClass {
    const ALL: [PitchClass; 12] = [
        PitchClass::C,
        PitchClass::Db,
        PitchClass::D,
        PitchClass::Eb,
        PitchClass::E,
        PitchClass::F,
        PitchClass::Gb,
        PitchClass::G,
        PitchClass::Ab,
        PitchClass::A,
        PitchClass::Bb,
        PitchClass::B,
    ];

    /// The semitone offset from C within an octave.
    fn semitone(&self) -> u8 {
        *self as u8
    }

    fn name(&self) -> &'static str {
        match self {
            PitchClass::C => "C",
            PitchClass::Db => "Db",
            PitchClass::D => "D",
            PitchClass::Eb => "Eb",
            PitchClass::E => "E",
            PitchClass::F => "F",
            PitchClass::Gb => "Gb",
            PitchClass::G => "G",
            PitchClass::Ab => "Ab",
            PitchClass::A => "A",
            PitchClass::Bb => "Bb",
            PitchClass::B => "B",
        }
    }

    fn from_name(name: &str) -> Option<PitchClass> {
        PitchClass::ALL.into_iter().find(|pc| pc.name() == name)
    }
}

/// Errors encountered while parsing a note name.
#[derive(Debug, Error, PartialEq)]
pub enum ParseNoteError {
    /// The note name could not be understood at all.
    #[error("unrecognized note name: {0}")]
    Unrecognized(String),
    /// The note parsed but its octave falls outside the playable range.
    #[error("octave {0} is outside the playable range ({LOW_OCTAVE}-{HIGH_OCTAVE})")]
    OctaveOutOfRange(u8),
}

/// A playable note: a pitch class plus an octave, e.g. "C3". The playable
/// range spans three chromatic octaves, C3 through B5, for 36 notes total.
// Field order matters here: the derived Ord must compare the octave before
// the pitch class so that notes sort in pitch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Note {
    octave: u8,
    class: PitchClass,
}

impl Note {
    /// Creates a note, rejecting octaves outside the playable range.
    pub fn new(class: PitchClass, octave: u8) -> Result<Note, ParseNoteError> {
        if !(LOW_OCTAVE..=HIGH_OCTAVE).contains(&octave) {
            return Err(ParseNoteError::OctaveOutOfRange(octave));
        }
        Ok(Note { octave, class })
    }

    /// All 36 playable notes in ascending pitch order.
    pub fn all() -> impl Iterator<Item = Note> {
        (LOW_OCTAVE..=HIGH_OCTAVE)
            .flat_map(|octave| PitchClass::ALL.into_iter().map(move |class| Note { octave, class }))
    }

    /// The MIDI note number. Uses the convention where C4 (middle C) is 60.
    pub fn midi(&self) -> u8 {
        (self.octave + 1) * 12 + self.class.semitone()
    }

    /// The equal temperament frequency in Hz, tuned to A4 = 440.
    pub fn frequency(&self) -> f32 {
        440.0 * 2.0_f32.powf((self.midi() as f32 - 69.0) / 12.0)
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.class.name(), self.octave)
    }
}

impl FromStr for Note {
    type Err = ParseNoteError;

    fn from_str(s: &str) -> Result<Note, ParseNoteError> {
        let split = s.len().checked_sub(1).filter(|i| s.is_char_boundary(*i));
        let (name, octave) = match split {
            Some(i) => s.split_at(i),
            None => return Err(ParseNoteError::Unrecognized(s.to_string())),
        };
        let class = PitchClass::from_name(name)
            .ok_or_else(|| ParseNoteError::Unrecognized(s.to_string()))?;
        let octave: u8 = octave
            .parse()
            .map_err(|_| ParseNoteError::Unrecognized(s.to_string()))?;
        Note::new(class, octave)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_and_display_round_trip() {
        for note in Note::all() {
            let parsed: Note = note.to_string().parse().expect("note should parse");
            assert_eq!(note, parsed);
        }
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(
            "".parse::<Note>(),
            Err(ParseNoteError::Unrecognized("".to_string()))
        );
        assert_eq!(
            "H3".parse::<Note>(),
            Err(ParseNoteError::Unrecognized("H3".to_string()))
        );
        assert_eq!(
            "C#3".parse::<Note>(),
            Err(ParseNoteError::Unrecognized("C#3".to_string()))
        );
        assert_eq!(
            "Db".parse::<Note>(),
            Err(ParseNoteError::Unrecognized("Db".to_string()))
        );
    }

    #[test]
    fn test_parse_rejects_out_of_range_octaves() {
        assert_eq!(
            "C2".parse::<Note>(),
            Err(ParseNoteError::OctaveOutOfRange(2))
        );
        assert_eq!(
            "B6".parse::<Note>(),
            Err(ParseNoteError::OctaveOutOfRange(6))
        );
    }

    #[test]
    fn test_all_is_ordered_and_complete() {
        let notes: Vec<Note> = Note::all().collect();
        assert_eq!(notes.len(), 36);
        assert_eq!(notes.first().map(Note::to_string), Some("C3".to_string()));
        assert_eq!(notes.last().map(Note::to_string), Some("B5".to_string()));
        assert!(notes.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_midi_numbers() {
        let c4: Note = "C4".parse().expect("note should parse");
        assert_eq!(c4.midi(), 60);
        let a4: Note = "A4".parse().expect("note should parse");
        assert_eq!(a4.midi(), 69);
    }

    #[test]
    fn test_frequency() {
        let a4: Note = "A4".parse().expect("note should parse");
        assert!((a4.frequency() - 440.0).abs() < 0.001);
        let a5: Note = "A5".parse().expect("note should parse");
        assert!((a5.frequency() - 880.0).abs() < 0.01);
    }
}
