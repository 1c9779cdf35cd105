//! Per-run workflow orchestration
//!
//! One [`PipelineOrchestrator`] is built at startup and shared by every
//! request. Runs share no mutable state; each decodes its own audio and
//! drops every intermediate result when it returns.

pub mod pipeline;

pub use pipeline::{
    PipelineOptions, PipelineOrchestrator, PipelineOutcome, PipelineReport, PipelineSettings,
    PipelineStage, PipelineVariant, StageRecord,
};
