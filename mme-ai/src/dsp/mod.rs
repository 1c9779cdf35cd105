//! Signal processing primitives
//!
//! Building blocks for the feature extractors: STFT framing, mel and
//! cepstral transforms, chroma folding, rhythm analysis and resampling.
//! Everything here is synchronous and allocation-bounded by the input size.

pub mod chroma;
pub mod mel;
pub mod resample;
pub mod rhythm;
pub mod stft;

pub use resample::resample_mono;
pub use stft::{Spectrogram, HOP_LENGTH, N_FFT};
