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

//! A sample-based playback backend.
//!
//! One WAV file per note, named `<note>.wav`, loaded entirely into memory
//! at startup for zero-latency triggering. A note whose file is missing or
//! undecodable is logged and stays unplayable for the session; every other
//! note is unaffected.

use std::{
    collections::HashMap,
    error::Error,
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::audio::output::{self, OutputStream};
use crate::note::Note;

/// Fade-out applied when a sounding sample is stopped, in seconds. A hard
/// cut mid-waveform clicks audibly.
const STOP_FADE: f32 = 0.005;
/// Overall gain applied per voice to leave headroom for chords.
const GAIN: f32 = 0.8;

/// A decoded sample, shared between the bank and any voices playing it.
#[derive(Clone)]
struct LoadedSample {
    /// Interleaved f32 frames.
    data: Arc<Vec<f32>>,
    channels: u16,
    sample_rate: u32,
}

impl LoadedSample {
    fn frames(&self) -> usize {
        self.data.len() / self.channels as usize
    }
}

/// The per-note sample bank.
struct Bank {
    samples: HashMap<Note, LoadedSample>,
}

impl Bank {
    /// Loads `<note>.wav` for every playable note from the given directory.
    /// Load failures are per-note: the failing note is logged and skipped.
    fn load(dir: &Path) -> Bank {
        let mut samples = HashMap::new();
        for note in Note::all() {
            let path = sample_path(dir, note);
            match Bank::load_wav(&path) {
                Ok(sample) => {
                    debug!(
                        %note,
                        channels = sample.channels,
                        sample_rate = sample.sample_rate,
                        frames = sample.frames(),
                        "Loaded sample"
                    );
                    samples.insert(note, sample);
                }
                Err(err) => {
                    warn!(%note, path = %path.display(), err = err.as_ref(), "Unable to load sample; note will be unplayable");
                }
            }
        }

        if samples.is_empty() {
            warn!(dir = %dir.display(), "No samples could be loaded; the backend will be silent");
        } else {
            info!(dir = %dir.display(), loaded = samples.len(), "Loaded sample bank");
        }
        Bank { samples }
    }

    fn load_wav(path: &Path) -> Result<LoadedSample, Box<dyn Error>> {
        let mut reader = hound::WavReader::open(path)?;
        let spec = reader.spec();

        let data: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => {
                reader.samples::<f32>().collect::<Result<Vec<f32>, _>>()?
            }
            hound::SampleFormat::Int => {
                let scale = (1_i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|sample| sample.map(|sample| sample as f32 / scale))
                    .collect::<Result<Vec<f32>, _>>()?
            }
        };

        Ok(LoadedSample {
            data: Arc::new(data),
            channels: spec.channels,
            sample_rate: spec.sample_rate,
        })
    }

    fn get(&self, note: Note) -> Option<&LoadedSample> {
        self.samples.get(&note)
    }
}

/// One playing sample instance.
struct Voice {
    note: Note,
    sample: LoadedSample,
    /// Source frame cursor; fractional because the source rate rarely
    /// matches the output rate.
    pos: f64,
    /// Source frames consumed per output frame.
    step: f64,
    /// Current gain; 1.0 until the voice is stopped, then ramping down.
    gain: f32,
    /// Per-frame gain decrement once the voice has been stopped.
    fade: Option<f32>,
}

impl Voice {
    fn finished(&self) -> bool {
        self.gain <= 0.0 || self.pos >= self.sample.frames().saturating_sub(1) as f64
    }

    /// The linearly interpolated source frame at the cursor, averaged down
    /// to mono.
    fn sample_at_cursor(&self) -> f32 {
        let channels = self.sample.channels as usize;
        let frame = self.pos.floor() as usize;
        let frac = self.pos.fract() as f32;

        let mut sum = 0.0;
        for channel in 0..channels {
            let s0 = self
                .sample
                .data
                .get(frame * channels + channel)
                .copied()
                .unwrap_or(0.0);
            let s1 = self
                .sample
                .data
                .get((frame + 1) * channels + channel)
                .copied()
                .unwrap_or(s0);
            sum += s0 + (s1 - s0) * frac;
        }
        sum / channels as f32
    }
}

/// Mixes playing voices into the output buffer.
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

    fn note_on(&mut self, note: Note, sample: LoadedSample) {
        self.voices.push(Voice {
            note,
            step: sample.sample_rate as f64 / self.sample_rate as f64,
            sample,
            pos: 0.0,
            gain: 1.0,
            fade: None,
        });
    }

    /// Fades out every still-running voice for the note.
    fn note_off(&mut self, note: Note) {
        let decrement = 1.0 / (STOP_FADE * self.sample_rate as f32);
        for voice in &mut self.voices {
            if voice.note == note && voice.fade.is_none() {
                voice.fade = Some(decrement);
            }
        }
    }

    fn render(&mut self, buffer: &mut [f32]) {
        buffer.fill(0.0);
        let frames = buffer.len() / self.channels;
        for voice in &mut self.voices {
            for frame in 0..frames {
                if voice.finished() {
                    break;
                }
                let sample = voice.sample_at_cursor() * voice.gain * GAIN;
                for channel in 0..self.channels {
                    buffer[frame * self.channels + channel] += sample;
                }
                voice.pos += voice.step;
                if let Some(decrement) = voice.fade {
                    voice.gain -= decrement;
                }
            }
        }
        self.voices.retain(|voice| !voice.finished());
    }
}

/// The sample-based backend.
pub struct Backend {
    bank: Bank,
    engine: Arc<Mutex<Engine>>,
    output: OutputStream,
}

impl Backend {
    /// Creates a sample backend reading `<note>.wav` files from the given
    /// directory and playing through the given output device, or the
    /// default device when none is named.
    pub fn new(dir: &Path, device: Option<&str>) -> Result<Backend, Box<dyn Error>> {
        let open = output::open(device)?;
        let bank = Bank::load(dir);
        let engine = Arc::new(Mutex::new(Engine::new(open.sample_rate(), open.channels())));

        let render_engine = engine.clone();
        let output = open.start(move |buffer| render_engine.lock().render(buffer))?;

        info!(device = output.name(), "Created sample backend");
        Ok(Backend {
            bank,
            engine,
            output,
        })
    }
}

impl crate::audio::Backend for Backend {
    fn start(&self, note: Note) {
        let Some(sample) = self.bank.get(note) else {
            debug!(%note, "No sample loaded for note; ignoring start");
            return;
        };
        self.engine.lock().note_on(note, sample.clone());
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
        write!(f, "{} (Samples)", self.output.name())
    }
}

/// Returns the asset path for a note, exposed for tooling that pre-fetches
/// or verifies the sample set.
pub fn sample_path(dir: &Path, note: Note) -> PathBuf {
    dir.join(format!("{}.wav", note))
}

#[cfg(test)]
mod test {
    use std::f32::consts::TAU;

    use super::*;

    fn note(name: &str) -> Note {
        name.parse().expect("note should parse")
    }

    /// Writes a short mono sine wave for the note into the directory.
    fn write_wav(dir: &Path, note: Note, sample_rate: u32, frames: usize) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(sample_path(dir, note), spec)
            .expect("wav writer should be created");
        for i in 0..frames {
            let value = (TAU * note.frequency() * i as f32 / sample_rate as f32).sin();
            writer
                .write_sample((value * i16::MAX as f32) as i16)
                .expect("sample should be written");
        }
        writer.finalize().expect("wav should be finalized");
    }

    #[test]
    fn test_bank_load_isolates_per_note_failures() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        write_wav(dir.path(), note("C3"), 44100, 512);
        write_wav(dir.path(), note("D3"), 44100, 512);
        // E3 is corrupt, the remaining 33 notes are missing entirely.
        std::fs::write(sample_path(dir.path(), note("E3")), b"not a wav").expect("write");

        let bank = Bank::load(dir.path());

        assert!(bank.get(note("C3")).is_some());
        assert!(bank.get(note("D3")).is_some());
        assert!(bank.get(note("E3")).is_none());
        assert!(bank.get(note("F3")).is_none());
        assert_eq!(bank.samples.len(), 2);
    }

    #[test]
    fn test_load_wav_scales_int_samples() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        write_wav(dir.path(), note("C3"), 44100, 512);

        let sample =
            Bank::load_wav(&sample_path(dir.path(), note("C3"))).expect("wav should load");
        assert_eq!(sample.channels, 1);
        assert_eq!(sample.sample_rate, 44100);
        assert_eq!(sample.frames(), 512);
        assert!(sample.data.iter().all(|value| value.abs() <= 1.0));
        assert!(sample.data.iter().any(|value| value.abs() > 0.5));
    }

    #[test]
    fn test_engine_plays_and_fades_voice() {
        let sample = LoadedSample {
            data: Arc::new(vec![0.5; 48000]),
            channels: 1,
            sample_rate: 48000,
        };
        let mut engine = Engine::new(48000, 2);
        engine.note_on(note("C3"), sample);

        let mut buffer = vec![0.0; 512 * 2];
        engine.render(&mut buffer);
        assert!(buffer.iter().any(|value| value.abs() > 0.01));

        engine.note_off(note("C3"));
        // One render quantum well past the fade duration silences and
        // reaps the voice.
        let mut buffer = vec![0.0; 2048 * 2];
        engine.render(&mut buffer);
        assert!(engine.voices.is_empty());
    }

    #[test]
    fn test_engine_note_off_without_voice_is_noop() {
        let mut engine = Engine::new(48000, 2);
        engine.note_off(note("C3"));
        assert!(engine.voices.is_empty());
    }

    #[test]
    fn test_engine_resamples_across_rates() {
        // A 24000 Hz source played at 48000 Hz advances half a source
        // frame per output frame.
        let sample = LoadedSample {
            data: Arc::new(vec![0.5; 1000]),
            channels: 1,
            sample_rate: 24000,
        };
        let mut engine = Engine::new(48000, 1);
        engine.note_on(note("C3"), sample);

        let mut buffer = vec![0.0; 512];
        engine.render(&mut buffer);
        assert!((engine.voices[0].pos - 256.0).abs() < 0.001);
    }

    #[test]
    fn test_engine_reaps_voice_at_end_of_sample() {
        let sample = LoadedSample {
            data: Arc::new(vec![0.5; 64]),
            channels: 1,
            sample_rate: 48000,
        };
        let mut engine = Engine::new(48000, 1);
        engine.note_on(note("C3"), sample);

        let mut buffer = vec![0.0; 256];
        engine.render(&mut buffer);
        assert!(engine.voices.is_empty());
    }
}
