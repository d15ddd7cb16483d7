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

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::note::Note;

/// A call observed by the mock backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Start(Note),
    Stop(Note),
    Resume,
}

/// A mock backend. Doesn't actually play anything; records every call with
/// the instant it arrived so tests can assert on timing.
pub struct Backend {
    name: String,
    calls: Mutex<Vec<(Call, Instant)>>,
}

impl Backend {
    /// Gets the given mock backend.
    pub fn get(name: &str) -> Backend {
        Backend {
            name: name.to_string(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every recorded call, in arrival order.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().iter().map(|(call, _)| *call).collect()
    }

    /// The notes started, in arrival order.
    pub fn starts(&self) -> Vec<Note> {
        self.calls
            .lock()
            .iter()
            .filter_map(|(call, _)| match call {
                Call::Start(note) => Some(*note),
                _ => None,
            })
            .collect()
    }

    /// The notes stopped, in arrival order.
    pub fn stops(&self) -> Vec<Note> {
        self.stops_at().into_iter().map(|(note, _)| note).collect()
    }

    /// The notes stopped along with when each stop arrived.
    pub fn stops_at(&self) -> Vec<(Note, Instant)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|(call, at)| match call {
                Call::Stop(note) => Some((*note, *at)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().push((call, Instant::now()));
    }
}

impl crate::audio::Backend for Backend {
    fn start(&self, note: Note) {
        debug!(backend = self.name, %note, "Mock start");
        self.record(Call::Start(note));
    }

    fn stop(&self, note: Note) {
        debug!(backend = self.name, %note, "Mock stop");
        self.record(Call::Stop(note));
    }

    fn resume(&self) {
        self.record(Call::Resume);
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}
