//! Data models for mme-ai
//!
//! Every value here is created fresh for one analysis run and dropped when
//! the run completes. Nothing is persisted or shared between runs.

pub mod features;
pub mod metadata;
pub mod sample_buffer;

pub use features::{
    Brightness, CoreFeatures, DynamicRange, EnergyFeatures, ExistingTags, LoudnessFeatures, Mode,
    Normalization, PitchClass, PitchFeatures, RhythmFeatures, SpectralFeatures, TARGET_LUFS,
};
pub use metadata::{
    FinalMetadata, LocalAnalysis, SynthesizedMetadata, TechnicalSummary, TranscriptSegment,
    Transcription,
};
pub use sample_buffer::SampleBuffer;
