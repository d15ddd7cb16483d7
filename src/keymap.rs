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

//! The physical key to note table. Pure data, no logic.

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::note::Note;

/// Two piano rows: the z-row with its sharps/flats on the home row covers
/// C3-E4, the q-row with its flats on the number row covers F4-B5.
static KEY_TO_NOTE: &[(char, &str)] = &[
    ('z', "C3"),
    ('s', "Db3"),
    ('x', "D3"),
    ('d', "Eb3"),
    ('c', "E3"),
    ('v', "F3"),
    ('g', "Gb3"),
    ('b', "G3"),
    ('h', "Ab3"),
    ('n', "A3"),
    ('j', "Bb3"),
    ('m', "B3"),
    (',', "C4"),
    ('l', "Db4"),
    ('.', "D4"),
    (';', "Eb4"),
    ('/', "E4"),
    ('q', "F4"),
    ('2', "Gb4"),
    ('w', "G4"),
    ('3', "Ab4"),
    ('e', "A4"),
    ('4', "Bb4"),
    ('r', "B4"),
    ('t', "C5"),
    ('6', "Db5"),
    ('y', "D5"),
    ('7', "Eb5"),
    ('u', "E5"),
    ('i', "F5"),
    ('9', "Gb5"),
    ('o', "G5"),
    ('0', "Ab5"),
    ('p', "A5"),
    ('-', "Bb5"),
    ('[', "B5"),
];

fn keymap() -> &'static HashMap<char, Note> {
    static KEYMAP: OnceLock<HashMap<char, Note>> = OnceLock::new();
    KEYMAP.get_or_init(|| {
        KEY_TO_NOTE
            .iter()
            .map(|(key, name)| (*key, name.parse().expect("keymap note names are valid")))
            .collect()
    })
}

/// The note bound to the given key, if any. Case insensitive.
pub fn note_for_key(key: char) -> Option<Note> {
    keymap().get(&key.to_ascii_lowercase()).copied()
}

/// All key bindings in keyboard order.
pub fn bindings() -> impl Iterator<Item = (char, Note)> {
    KEY_TO_NOTE
        .iter()
        .map(|(key, name)| (*key, name.parse().expect("keymap note names are valid")))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_every_note_is_bound_exactly_once() {
        let bound: Vec<Note> = bindings().map(|(_, note)| note).collect();
        assert_eq!(bound.len(), 36);

        let mut sorted = bound.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), 36, "duplicate note binding");
        assert_eq!(sorted, Note::all().collect::<Vec<Note>>());
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert_eq!(note_for_key('z'), note_for_key('Z'));
        assert_eq!(
            note_for_key('z').map(|note| note.to_string()),
            Some("C3".to_string())
        );
    }

    #[test]
    fn test_unbound_keys_return_none() {
        assert_eq!(note_for_key('1'), None);
        assert_eq!(note_for_key(' '), None);
    }
}
