//! Audio Analysis Extractors
//!
//! Independent measurement stages run on one decoded [`SampleBuffer`]:
//!
//! 1. **signal_loader** - Decode container → interleaved PCM
//! 2. **core_features** - Tempo, key/mode, spectral, energy, rhythm, MFCC (fatal on failure)
//! 3. **loudness** - Integrated loudness, peak, range, normalization (best-effort)
//! 4. **pitch** - F0 statistics and vocal presence over a bounded window (best-effort)
//! 5. **tag_reader** - Existing container tags (best-effort)
//! 6. **mood_heuristics** - Threshold mood labels from core features
//!
//! Stages share no state and may run concurrently; only the mood heuristics
//! depend on another stage's output.
//!
//! [`SampleBuffer`]: crate::models::SampleBuffer

pub mod core_features;
pub mod loudness;
pub mod mood_heuristics;
pub mod pitch;
pub mod signal_loader;
pub mod tag_reader;

pub use core_features::CoreFeatureExtractor;
pub use loudness::LoudnessAnalyzer;
pub use mood_heuristics::detect_moods;
pub use pitch::{note_name, PitchAnalyzer};
pub use signal_loader::SignalLoader;
pub use tag_reader::LoftyTagReader;
