//! Signal Loader
//!
//! Decodes an audio container into an interleaved [`SampleBuffer`] using
//! symphonia (MP3, FLAC, AAC, WAV, OGG, ...). Every analysis step reads from
//! the buffer produced here; the file is decoded exactly once per run.

use crate::models::SampleBuffer;
use crate::types::PipelineError;
use anyhow::{Context, Result};
use std::io::Cursor;
use std::path::Path;
use symphonia::core::audio::SampleBuffer as PcmBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Audio decoder producing [`SampleBuffer`]s
#[derive(Debug, Clone, Default)]
pub struct SignalLoader {
    /// Stop decoding after this many seconds (`None` = whole file)
    max_duration_secs: Option<f64>,
}

impl SignalLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loader that decodes at most `seconds` of audio
    pub fn with_max_duration(seconds: f64) -> Self {
        Self {
            max_duration_secs: Some(seconds.max(0.0)),
        }
    }

    /// Decode the file at `path`
    ///
    /// # Errors
    /// Returns `PipelineError::Decode` if the file cannot be opened, probed
    /// or decoded, or contains no audio frames
    pub fn load_path(&self, path: &Path) -> Result<SampleBuffer, PipelineError> {
        debug!(path = %path.display(), "Decoding audio file");

        let file = std::fs::File::open(path)
            .map_err(|e| PipelineError::Decode(format!("Failed to open {}: {}", path.display(), e)))?;

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        self.decode(Box::new(file), hint)
            .map_err(|e| PipelineError::Decode(format!("{:#}", e)))
    }

    /// Decode an in-memory file
    ///
    /// # Arguments
    /// * `bytes` - Complete container contents
    /// * `extension` - Optional format hint (e.g. "mp3")
    ///
    /// # Errors
    /// Returns `PipelineError::Decode` as for [`load_path`](Self::load_path)
    pub fn load_bytes(
        &self,
        bytes: Vec<u8>,
        extension: Option<&str>,
    ) -> Result<SampleBuffer, PipelineError> {
        let mut hint = Hint::new();
        if let Some(ext) = extension {
            hint.with_extension(ext);
        }
        self.decode(Box::new(Cursor::new(bytes)), hint)
            .map_err(|e| PipelineError::Decode(format!("{:#}", e)))
    }

    fn decode(&self, source: Box<dyn MediaSource>, hint: Hint) -> Result<SampleBuffer> {
        let mss = MediaSourceStream::new(source, Default::default());

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .context("Unrecognized audio format")?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .context("No audio track found")?;
        let track_id = track.id;
        let mut sample_rate = track.codec_params.sample_rate;
        let mut channels = track.codec_params.channels.map(|c| c.count());

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .context("Unsupported codec")?;

        let mut samples: Vec<f32> = Vec::new();
        let mut pcm: Option<PcmBuffer<f32>> = None;
        let mut skipped_packets = 0usize;

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(e).context("Failed to read packet"),
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(msg)) => {
                    // Corrupt frame: drop it and keep going
                    skipped_packets += 1;
                    warn!(error = msg, "Skipping undecodable packet");
                    continue;
                }
                Err(e) => return Err(e).context("Failed to decode packet"),
            };

            let spec = *decoded.spec();
            sample_rate.get_or_insert(spec.rate);
            channels.get_or_insert(spec.channels.count());

            // PcmBuffer capacity counts samples, decoder capacity counts frames
            let needed = decoded.capacity() * spec.channels.count();
            if pcm.as_ref().map_or(true, |b| b.capacity() < needed) {
                pcm = Some(PcmBuffer::<f32>::new(decoded.capacity() as u64, spec));
            }
            if let Some(buf) = pcm.as_mut() {
                buf.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buf.samples());
            }

            if let (Some(cap), Some(rate), Some(ch)) = (self.max_duration_secs, sample_rate, channels) {
                let max_samples = (cap * rate as f64) as usize * ch.max(1);
                if samples.len() >= max_samples {
                    samples.truncate(max_samples);
                    break;
                }
            }
        }

        let sample_rate = sample_rate.context("Sample rate unknown")?;
        let channels = channels.context("Channel layout unknown")?;
        let buffer = SampleBuffer::new(samples, channels, sample_rate);
        anyhow::ensure!(!buffer.is_empty(), "File contains no audio frames");

        debug!(
            sample_rate,
            channels,
            frames = buffer.frames(),
            duration_seconds = buffer.duration_seconds(),
            skipped_packets,
            "Audio decoding complete"
        );

        Ok(buffer)
    }
}
