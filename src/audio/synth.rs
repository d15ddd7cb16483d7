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

//! A polyphonic synthesizer backend.
//!
//! Each note gets a voice made of two slightly detuned sine partials with a
//! fast attack and a longer release. Stopping a note puts its voices into
//! the release stage rather than cutting them, so there are no clicks.

use std::{error::Error, fmt, sync::Arc};

use parking_lot::Mutex;
use tracing::info;

use crate::audio::output::{self, OutputStream};
use crate::note::Note;

/// Attack time in seconds.
const ATTACK: f32 = 0.005;
/// Release time in seconds.
const RELEASE: f32 = 0.12;
/// Overall gain applied per voice to leave headroom for chords.
const GAIN: f32 = 0.15;
/// Detune of the second partial, as a frequency ratio.
const DETUNE: f32 = 1.003;

#[derive(PartialEq)]
enum Stage {
    Attack,
    Sustain,
    Release,
}

/// One sounding voice.
struct Voice {
    note: Note,
    phase: f32,
    phase_detuned: f32,
    step: f32,
    step_detuned: f32,
    env: f32,
    stage: Stage,
}

impl Voice {
    fn new(note: Note, sample_rate: u32) -> Voice {
        let step = std::f32::consts::TAU * note.frequency() / sample_rate as f32;
        Voice {
            note,
            phase: 0.0,
            phase_detuned: 0.0,
            step,
            step_detuned: step * DETUNE,
            env: 0.0,
            stage: Stage::Attack,
        }
    }

    /// Produces the next mono sample and advances the envelope.
    fn next_sample(&mut self, sample_rate: u32) -> f32 {
        match self.stage {
            Stage::Attack => {
                self.env += 1.0 / (ATTACK * sample_rate as f32);
                if self.env >= 1.0 {
                    self.env = 1.0;
                    self.stage = Stage::Sustain;
                }
            }
            Stage::Sustain => {}
            Stage::Release => {
                self.env -= 1.0 / (RELEASE * sample_rate as f32);
            }
        }

        let sample = self.phase.sin() * 0.7 + self.phase_detuned.sin() * 0.3;
        self.phase = (self.phase + self.step) % std::f32::consts::TAU;
        self.phase_detuned = (self.phase_detuned + self.step_detuned) % std::f32::consts::TAU;
        sample * self.env.max(0.0) * GAIN
    }

    fn finished(&self) -> bool {
        self.stage == Stage::Release && self.env <= 0.0
    }
}

/// The voice pool. Rendering happens on the audio callback thread; note
/// on/off arrive from the registry. Both sides go through one mutex held
/// only for the duration of a render quantum.
struct Engine {
    sample_rate: u32,
    channels: usize,
    voices: Vec<Voice>,
}

impl Engine {
    fn new(sample_rate: u32, channels: u16) -> Engine {
        Engine {
            sample_rate,
            channels: channels as usize,
            voices: Vec::new(),
        }
    }

    fn note_on(&mut self, note: Note) {
        self.voices.push(Voice::new(note, self.sample_rate));
    }

    /// Releases every still-held voice for the note. Voices already in
    /// release keep fading on their own.
    fn note_off(&mut self, note: Note) {
        for voice in &mut self.voices {
            if voice.note == note && voice.stage != Stage::Release {
                voice.stage = Stage::Release;
            }
        }
    }

    fn render(&mut self, buffer: &mut [f32]) {
        buffer.fill(0.0);
        let frames = buffer.len() / self.channels;
        for voice in &mut self.voices {
            for frame in 0..frames {
                let sample = voice.next_sample(self.sample_rate);
                for channel in 0..self.channels {
                    buffer[frame * self.channels + channel] += sample;
                }
            }
        }
        self.voices.retain(|voice| !voice.finished());
    }
}

/// The synthesizer backend.
pub struct Backend {
    engine: Arc<Mutex<Engine>>,
    output: OutputStream,
}

impl Backend {
    /// Creates a synthesizer backend playing through the given output
    /// device, or the default device when none is named.
    pub fn new(device: Option<&str>) -> Result<Backend, Box<dyn Error>> {
        let open = output::open(device)?;
        let engine = Arc::new(Mutex::new(Engine::new(open.sample_rate(), open.channels())));

        let render_engine = engine.clone();
        let output = open.start(move |buffer| render_engine.lock().render(buffer))?;

        info!(device = output.name(), "Created synthesizer backend");
        Ok(Backend { engine, output })
    }
}

impl crate::audio::Backend for Backend {
    fn start(&self, note: Note) {
        self.engine.lock().note_on(note);
    }

    fn stop(&self, note: Note) {
        self.engine.lock().note_off(note);
    }

    fn resume(&self) {
        self.output.resume();
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Synthesizer)", self.output.name())
    }
}
