//! Mono sample-rate conversion with rubato

use anyhow::{Context, Result};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use tracing::debug;

/// Resample mono samples from `source_rate` to `target_rate`
///
/// Returns the input unchanged when the rates already match.
///
/// # Errors
/// * Resampler construction fails (invalid ratio)
/// * Resampling fails
pub fn resample_mono(samples: Vec<f32>, source_rate: u32, target_rate: u32) -> Result<Vec<f32>> {
    if samples.is_empty() || source_rate == target_rate {
        return Ok(samples);
    }
    anyhow::ensure!(source_rate > 0, "Source sample rate is zero");

    let num_frames = samples.len();
    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let ratio = target_rate as f64 / source_rate as f64;

    // Single pass: chunk size equals input length
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, num_frames, 1)
        .context("Failed to create rubato resampler")?;

    let mut output = resampler
        .process(&[samples], None)
        .context("Rubato resampling failed")?;
    let resampled = output.pop().unwrap_or_default();

    debug!(
        input_frames = num_frames,
        output_frames = resampled.len(),
        source_rate,
        target_rate,
        "Resampled mono signal"
    );

    Ok(resampled)
}
