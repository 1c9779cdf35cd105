//! Shared test helpers

#![allow(dead_code)]

pub mod audio_generator;
pub mod mocks;

pub use audio_generator::{generate_test_wav, wav_bytes, AudioConfig, Signal};
pub use mocks::{MockGenerator, MockTranscriber};
