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

//! Input reconciliation.
//!
//! Raw input arrives as heterogeneous contact events: keyboard keys going
//! down and up, a pointer button, touches starting, sliding, and ending.
//! The reconciler normalizes these into a press/release intent stream with
//! one claimed note per contact. It deliberately does not suppress a
//! release just because a sibling contact still claims the same note; the
//! registry tolerates over-release, and the resulting "any release stops
//! the note" behavior for same-note chords is intentional.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::trace;

use crate::note::Note;

/// One physical input contact: a held key on the computer keyboard, a touch
/// identified by its stable id, or the single mouse pointer. Keys are
/// self-identifying, so OS key auto-repeat collapses into its own contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Contact {
    Key(char),
    Touch(u64),
    Pointer,
}

/// Receives the normalized press/release intent stream.
pub trait NoteSink {
    fn press(&self, note: Note);
    fn release(&self, note: Note);
}

impl<S: NoteSink + ?Sized> NoteSink for Arc<S> {
    fn press(&self, note: Note) {
        (**self).press(note);
    }

    fn release(&self, note: Note) {
        (**self).release(note);
    }
}

impl<S: NoteSink + ?Sized> NoteSink for &S {
    fn press(&self, note: Note) {
        (**self).press(note);
    }

    fn release(&self, note: Note) {
        (**self).release(note);
    }
}

/// Converts raw contact events into press/release intents, enforcing one
/// claimed note per contact.
pub struct Reconciler<S> {
    sink: S,
    /// The note each live contact currently claims.
    claims: HashMap<Contact, Note>,
}

impl<S: NoteSink> Reconciler<S> {
    /// Creates a reconciler feeding the given sink.
    pub fn new(sink: S) -> Reconciler<S> {
        Reconciler {
            sink,
            claims: HashMap::new(),
        }
    }

    /// A contact came down. An unmapped contact (no note under it) is
    /// ignored. If the contact already claims a different note, the old
    /// note is released before the new one is pressed. A repeat for the
    /// already-claimed note is a no-op, which is what swallows OS key
    /// auto-repeat.
    pub fn contact_start(&mut self, contact: Contact, note: Option<Note>) {
        let Some(note) = note else {
            return;
        };
        trace!(?contact, %note, "Contact start");
        match self.claims.get(&contact) {
            Some(claimed) if *claimed == note => {}
            Some(claimed) => {
                self.sink.release(*claimed);
                self.sink.press(note);
                self.claims.insert(contact, note);
            }
            None => {
                self.sink.press(note);
                self.claims.insert(contact, note);
            }
        }
    }

    /// A contact moved, possibly onto a different note or off the playable
    /// surface entirely (`None`). Moving to a new note releases the old
    /// claim first; moving off the surface just releases.
    pub fn contact_move(&mut self, contact: Contact, note: Option<Note>) {
        match (self.claims.get(&contact).copied(), note) {
            (Some(old), Some(new)) if old == new => {}
            (Some(old), new) => {
                trace!(?contact, %old, new = ?new.map(|n| n.to_string()), "Contact moved");
                self.sink.release(old);
                self.claims.remove(&contact);
                if let Some(new) = new {
                    self.sink.press(new);
                    self.claims.insert(contact, new);
                }
            }
            (None, Some(new)) => {
                self.sink.press(new);
                self.claims.insert(contact, new);
            }
            (None, None) => {}
        }
    }

    /// A contact lifted. Releases its claimed note, if any. A release is
    /// emitted even when another contact still claims the same note.
    pub fn contact_end(&mut self, contact: Contact) {
        if let Some(note) = self.claims.remove(&contact) {
            trace!(?contact, %note, "Contact end");
            self.sink.release(note);
        }
    }

    /// Releases every live contact. Used when the input surface loses
    /// focus so no claim outlives the event stream that created it.
    pub fn release_all(&mut self) {
        for (_, note) in self.claims.drain() {
            self.sink.release(note);
        }
    }
}
