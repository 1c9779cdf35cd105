//! Audio Test Fixture Generator
//!
//! Synthesizes WAV fixtures with `hound`, either to disk or in memory.

use std::io::Cursor;
use std::path::{Path, PathBuf};

/// Waveform written into the fixture
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Signal {
    /// Steady tone
    Sine { freq_hz: f32, amplitude: f32 },
    /// Short noise bursts on every beat
    ClickTrack { bpm: f32, amplitude: f32 },
    /// Digital silence
    Silence,
}

/// Configuration for generated audio
#[derive(Debug, Clone)]
pub struct AudioConfig {
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub signal: Signal,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            duration_seconds: 5.0,
            sample_rate: 44100,
            channels: 2,
            signal: Signal::Sine {
                freq_hz: 440.0,
                amplitude: 0.3,
            },
        }
    }
}

impl AudioConfig {
    pub fn sine(freq_hz: f32, duration_seconds: f64) -> Self {
        Self {
            duration_seconds,
            signal: Signal::Sine {
                freq_hz,
                amplitude: 0.3,
            },
            ..Self::default()
        }
    }

    pub fn click_track(bpm: f32, duration_seconds: f64) -> Self {
        Self {
            duration_seconds,
            signal: Signal::ClickTrack {
                bpm,
                amplitude: 0.8,
            },
            ..Self::default()
        }
    }

    pub fn silence(duration_seconds: f64) -> Self {
        Self {
            duration_seconds,
            signal: Signal::Silence,
            ..Self::default()
        }
    }
}

/// Deterministic noise in [-1, 1]
fn noise(state: &mut u32) -> f32 {
    *state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
    (*state >> 8) as f32 / (1u32 << 23) as f32 - 1.0
}

fn samples(config: &AudioConfig) -> Vec<i16> {
    let total = (config.duration_seconds * config.sample_rate as f64) as usize;
    let sr = config.sample_rate as f32;
    let mut rng = 0x2545_f491u32;

    (0..total)
        .map(|i| {
            let t = i as f32 / sr;
            let value = match config.signal {
                Signal::Sine { freq_hz, amplitude } => {
                    amplitude * (2.0 * std::f32::consts::PI * freq_hz * t).sin()
                }
                Signal::ClickTrack { bpm, amplitude } => {
                    let beat = 60.0 / bpm;
                    let since_beat = t % beat;
                    if since_beat < 0.02 {
                        amplitude * noise(&mut rng) * (-since_beat * 200.0).exp()
                    } else {
                        0.0
                    }
                }
                Signal::Silence => 0.0,
            };
            (value * i16::MAX as f32) as i16
        })
        .collect()
}

fn spec(config: &AudioConfig) -> hound::WavSpec {
    hound::WavSpec {
        channels: config.channels,
        sample_rate: config.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

/// Generate a test WAV file with specified configuration
pub fn generate_test_wav(path: &Path, config: &AudioConfig) -> anyhow::Result<PathBuf> {
    let mut writer = hound::WavWriter::create(path, spec(config))?;
    for sample in samples(config) {
        for _ in 0..config.channels {
            writer.write_sample(sample)?;
        }
    }
    writer.finalize()?;
    Ok(path.to_path_buf())
}

/// Generate WAV bytes in memory
pub fn wav_bytes(config: &AudioConfig) -> anyhow::Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec(config))?;
        for sample in samples(config) {
            for _ in 0..config.channels {
                writer.write_sample(sample)?;
            }
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}
