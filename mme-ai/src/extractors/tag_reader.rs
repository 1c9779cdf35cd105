//! Container Tag Reader
//!
//! Reads embedded tags (ID3v2, Vorbis comments, MP4 atoms, ...) and stream
//! properties with lofty. Text fields are sanitized to ASCII because they
//! are later embedded in LLM prompts.

use crate::models::ExistingTags;
use crate::types::{PipelineError, TagReader};
use crate::utils::sanitize_ascii;
use lofty::prelude::*;
use lofty::probe::Probe;
use std::path::Path;
use tracing::debug;

/// lofty-backed [`TagReader`]
#[derive(Debug, Clone, Copy, Default)]
pub struct LoftyTagReader;

impl LoftyTagReader {
    pub fn new() -> Self {
        Self
    }
}

fn clean(value: Option<impl AsRef<str>>) -> Option<String> {
    value
        .map(|v| sanitize_ascii(v.as_ref().trim()))
        .filter(|v| !v.is_empty())
}

impl TagReader for LoftyTagReader {
    fn name(&self) -> &'static str {
        "lofty"
    }

    fn read(&self, path: &Path) -> Result<ExistingTags, PipelineError> {
        let tagged_file = Probe::open(path)
            .map_err(|e| PipelineError::TagRead(e.to_string()))?
            .read()
            .map_err(|e| PipelineError::TagRead(e.to_string()))?;

        let properties = tagged_file.properties();
        let mut tags = ExistingTags {
            duration: Some(properties.duration().as_secs_f64()),
            bitrate: properties.audio_bitrate(),
            samplerate: properties.sample_rate(),
            channels: properties.channels(),
            has_cover: tagged_file.tags().iter().any(|t| !t.pictures().is_empty()),
            ..ExistingTags::default()
        };

        if let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) {
            tags.title = clean(tag.title());
            tags.artist = clean(tag.artist());
            tags.album = clean(tag.album());
            tags.year = tag.year().map(|y| y.to_string());
            tags.genre = clean(tag.genre());
        }

        debug!(
            path = %path.display(),
            title = ?tags.title,
            artist = ?tags.artist,
            has_cover = tags.has_cover,
            "Existing tags read"
        );

        Ok(tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean() {
        assert_eq!(clean(Some("  Café  ")), Some("Caf?".to_string()));
        assert_eq!(clean(Some("   ")), None);
        assert_eq!(clean(None::<&str>), None);
    }

    #[test]
    fn test_untagged_wav_reports_properties() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 22050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..22050 * 2 {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();

        let tags = LoftyTagReader::new().read(&path).unwrap();
        assert_eq!(tags.title, None);
        assert_eq!(tags.samplerate, Some(22050));
        assert_eq!(tags.channels, Some(2));
        assert!((tags.duration.unwrap() - 1.0).abs() < 0.01);
        assert!(!tags.has_cover);
    }

    #[test]
    fn test_unreadable_file_is_tag_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.mp3");
        std::fs::write(&path, b"not an mp3 at all").unwrap();
        let err = LoftyTagReader::new().read(&path).unwrap_err();
        assert_eq!(err.stage(), "tags");
    }
}
