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

//! Note playback orchestration.
//!
//! The registry sits between the input layer and the playback backend. It
//! tracks which notes are held, starts and stops backend playback, and
//! guarantees that every triggered sound stays audible for a minimum
//! duration even when the key is released almost immediately. Very short
//! presses would otherwise produce inaudible clicks.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use parking_lot::Mutex;
use tokio::{
    runtime::Handle,
    task::JoinHandle,
    time::{Duration, Instant},
};
use tracing::{debug, info};

use crate::{audio::Backend, input::NoteSink, note::Note};

/// Every triggered sound stays audible for at least this long, even if it
/// is released sooner.
pub const MIN_NOTE_DURATION: Duration = Duration::from_millis(80);

/// A single sounding instance of a note.
struct Source {
    /// Identifies this instance. A deferred stop only fires if the note's
    /// live source still carries the sequence it was scheduled against, so
    /// a stale timer can never stop a successor.
    seq: u64,
    /// When backend playback started.
    started_at: Instant,
    /// The scheduled stop task, present when the note was released before
    /// the minimum duration elapsed. Aborting this handle is the
    /// cancellation path for a retrigger or backend swap.
    deferred_stop: Option<JoinHandle<()>>,
}

struct State {
    backend: Arc<dyn Backend>,
    /// Live sources by note. A note stays in here until its stop has been
    /// issued to the backend, including the window where the stop is
    /// scheduled but has not fired yet.
    sources: HashMap<Note, Source>,
    /// Notes currently held by some input. A note leaves this set the
    /// moment it is released, even when the audible stop is deferred.
    held: HashSet<Note>,
    next_seq: u64,
}

impl State {
    /// Force-stops every live source, cancelling pending deferred stops.
    fn stop_all(&mut self) {
        for (note, source) in self.sources.drain() {
            if let Some(handle) = source.deferred_stop {
                handle.abort();
            }
            self.backend.stop(note);
        }
        self.held.clear();
    }
}

/// Tracks active notes and drives a playback backend.
///
/// All operations for a note are serialized behind a single lock, so a
/// press, a release, and a deferred-stop firing can never interleave.
pub struct Registry {
    state: Arc<Mutex<State>>,
    /// Runtime handle used to schedule deferred stops.
    rt: Handle,
}

impl Registry {
    /// Creates a new registry driving the given backend. Must be called
    /// from within a tokio runtime.
    pub fn new(backend: Arc<dyn Backend>) -> Registry {
        info!(backend = %backend, "Creating note registry");
        Registry {
            state: Arc::new(Mutex::new(State {
                backend,
                sources: HashMap::new(),
                held: HashSet::new(),
                next_seq: 0,
            })),
            rt: Handle::current(),
        }
    }

    /// Starts playback of a note. If the note is already sounding, the
    /// prior instance is force-stopped first: its pending deferred stop (if
    /// any) is cancelled and the backend receives an immediate stop. Only
    /// one audible instance per note exists at a time.
    pub fn press(&self, note: Note) {
        let mut state = self.state.lock();
        state.backend.resume();

        if let Some(prior) = state.sources.remove(&note) {
            if let Some(handle) = prior.deferred_stop {
                handle.abort();
            }
            state.backend.stop(note);
            debug!(%note, "Retriggered note");
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.backend.start(note);
        state.sources.insert(
            note,
            Source {
                seq,
                started_at: Instant::now(),
                deferred_stop: None,
            },
        );
        state.held.insert(note);
    }

    /// Releases a note. The note is unmarked as held immediately; the
    /// backend stop is issued right away if the minimum duration has
    /// elapsed, and otherwise scheduled for the remainder. Releasing a
    /// silent note, or one whose stop is already scheduled, is a no-op.
    pub fn release(&self, note: Note) {
        let mut state = self.state.lock();
        state.held.remove(&note);

        let Some(source) = state.sources.get(&note) else {
            return;
        };
        if source.deferred_stop.is_some() {
            return;
        }

        let elapsed = source.started_at.elapsed();
        if elapsed >= MIN_NOTE_DURATION {
            state.sources.remove(&note);
            state.backend.stop(note);
            return;
        }

        // Released before the minimum duration: keep it sounding for the
        // remainder and remember the timer so a retrigger can cancel it.
        let seq = source.seq;
        let deadline = source.started_at + MIN_NOTE_DURATION;
        debug!(%note, remaining_ms = (MIN_NOTE_DURATION - elapsed).as_millis() as u64, "Deferring stop");

        let shared = Arc::clone(&self.state);
        let handle = self.rt.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let mut state = shared.lock();
            // A retrigger may have superseded this source while we slept.
            if state.sources.get(&note).map(|source| source.seq) != Some(seq) {
                return;
            }
            state.sources.remove(&note);
            state.backend.stop(note);
        });
        if let Some(source) = state.sources.get_mut(&note) {
            source.deferred_stop = Some(handle);
        }
    }

    /// The notes currently held by some input, in ascending pitch order.
    /// This reflects the logical held state, not audibility: a released
    /// note waiting out its minimum duration is not in this set.
    pub fn active(&self) -> Vec<Note> {
        let state = self.state.lock();
        let mut notes: Vec<Note> = state.held.iter().copied().collect();
        notes.sort();
        notes
    }

    /// Swaps the playback backend. Every live source is force-stopped on
    /// the old backend first so neither backend is left with dangling
    /// active-source state.
    pub fn set_backend(&self, backend: Arc<dyn Backend>) {
        let mut state = self.state.lock();
        info!(from = %state.backend, to = %backend, "Switching playback backend");
        state.stop_all();
        state.backend = backend;
    }

    /// Force-stops everything. Used on shutdown.
    pub fn silence(&self) {
        self.state.lock().stop_all();
    }
}

impl NoteSink for Registry {
    fn press(&self, note: Note) {
        Registry::press(self, note);
    }

    fn release(&self, note: Note) {
        Registry::release(self, note);
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use tokio::time::{Duration, Instant};

    use super::{Registry, MIN_NOTE_DURATION};
    use crate::audio::mock::{self, Call};
    use crate::note::Note;

    fn note(name: &str) -> Note {
        name.parse().expect("note should parse")
    }

    async fn sleep_ms(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    fn setup() -> (Registry, Arc<mock::Backend>) {
        let backend = Arc::new(mock::Backend::get("mock"));
        (Registry::new(backend.clone()), backend)
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_without_press_is_noop() {
        let (registry, backend) = setup();

        registry.release(note("C3"));
        sleep_ms(200).await;

        assert!(backend.stops().is_empty());
        assert!(backend.starts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_press_stop_is_deferred_to_minimum_duration() {
        let (registry, backend) = setup();
        let started = Instant::now();

        registry.press(note("C3"));
        sleep_ms(30).await;
        registry.release(note("C3"));

        // The stop must not arrive at release time.
        assert!(backend.stops().is_empty());
        assert!(registry.active().is_empty(), "held state clears on release");

        sleep_ms(49).await;
        assert!(backend.stops().is_empty());

        sleep_ms(2).await;
        let stops = backend.stops_at();
        assert_eq!(stops.len(), 1);
        assert_eq!(stops[0].1.duration_since(started), MIN_NOTE_DURATION);
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_press_stops_immediately() {
        let (registry, backend) = setup();
        let started = Instant::now();

        registry.press(note("C3"));
        sleep_ms(150).await;
        registry.release(note("C3"));

        let stops = backend.stops_at();
        assert_eq!(stops.len(), 1);
        assert_eq!(
            stops[0].1.duration_since(started),
            Duration::from_millis(150)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_retrigger_stops_prior_source_and_starts_fresh() {
        let (registry, backend) = setup();

        registry.press(note("C3"));
        registry.press(note("C3"));

        // Exactly one stop/start pair beyond the first start.
        assert_eq!(
            backend.calls(),
            vec![
                Call::Resume,
                Call::Start(note("C3")),
                Call::Resume,
                Call::Stop(note("C3")),
                Call::Start(note("C3")),
            ]
        );

        // No orphaned deferred stop may fire for the first source.
        sleep_ms(500).await;
        assert_eq!(backend.stops().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retrigger_cancels_pending_deferred_stop() {
        let (registry, backend) = setup();

        registry.press(note("C3"));
        sleep_ms(30).await;
        registry.release(note("C3"));
        sleep_ms(10).await;

        // Re-press at t=40 while the first source is waiting out its
        // minimum duration: the pending timer is cancelled and the first
        // source stops right now.
        registry.press(note("C3"));
        assert_eq!(backend.stops().len(), 1);

        sleep_ms(200).await;
        assert_eq!(backend.stops().len(), 1, "cancelled timer must not fire");

        registry.release(note("C3"));
        assert_eq!(backend.stops().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_is_idempotent_while_stop_is_pending() {
        let (registry, backend) = setup();

        registry.press(note("C3"));
        sleep_ms(10).await;
        registry.release(note("C3"));
        registry.release(note("C3"));
        registry.release(note("C3"));

        assert!(backend.stops().is_empty());
        sleep_ms(100).await;
        assert_eq!(backend.stops().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_independent_notes_do_not_interfere() {
        let (registry, backend) = setup();

        registry.press(note("C3"));
        registry.press(note("E3"));
        sleep_ms(100).await;
        registry.release(note("C3"));

        assert_eq!(backend.stops(), vec![note("C3")]);
        assert_eq!(registry.active(), vec![note("E3")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_backend_stops_active_notes_on_old_backend() {
        let (registry, old_backend) = setup();
        let new_backend = Arc::new(mock::Backend::get("mock2"));

        registry.press(note("C3"));
        registry.press(note("E3"));
        sleep_ms(100).await;

        registry.set_backend(new_backend.clone());

        let mut stops = old_backend.stops();
        stops.sort();
        assert_eq!(stops, vec![note("C3"), note("E3")]);
        assert!(registry.active().is_empty());
        assert!(new_backend.calls().is_empty());

        // The new backend serves subsequent presses.
        registry.press(note("G3"));
        assert_eq!(new_backend.starts(), vec![note("G3")]);
        assert_eq!(old_backend.starts().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_backend_cancels_deferred_stops() {
        let (registry, old_backend) = setup();
        let new_backend = Arc::new(mock::Backend::get("mock2"));

        registry.press(note("C3"));
        sleep_ms(10).await;
        registry.release(note("C3"));

        registry.set_backend(new_backend.clone());
        assert_eq!(old_backend.stops(), vec![note("C3")]);

        sleep_ms(200).await;
        assert_eq!(
            old_backend.stops().len(),
            1,
            "deferred stop must not fire after the swap"
        );
        assert!(new_backend.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_called_on_every_press() {
        let (registry, backend) = setup();

        registry.press(note("C3"));
        sleep_ms(100).await;
        registry.release(note("C3"));
        registry.press(note("D3"));

        let resumes = backend
            .calls()
            .into_iter()
            .filter(|call| *call == Call::Resume)
            .count();
        assert_eq!(resumes, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silence_stops_everything() {
        let (registry, backend) = setup();

        registry.press(note("C3"));
        registry.press(note("E3"));
        sleep_ms(10).await;
        registry.release(note("E3"));

        registry.silence();
        let mut stops = backend.stops();
        stops.sort();
        assert_eq!(stops, vec![note("C3"), note("E3")]);
        assert!(registry.active().is_empty());

        sleep_ms(200).await;
        assert_eq!(backend.stops().len(), 2);
    }
}
