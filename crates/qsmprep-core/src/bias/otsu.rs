use burn::tensor::backend::Backend;

use crate::error::{CoreError, Result};
use crate::volume::{PixelType, Volume};

const OTSU_BINS: usize = 256;

/// Threshold maximising the between-class variance of `values`.
pub fn otsu_threshold(values: &[f32]) -> Result<f32> {
    let (min, max) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if !(min.is_finite() && max.is_finite()) {
        return Err(CoreError::degenerate("no finite values to threshold"));
    }
    if max <= min {
        return Err(CoreError::degenerate("constant image has no Otsu threshold"));
    }

    let width = (max - min) as f64 / OTSU_BINS as f64;
    let mut histogram = [0u64; OTSU_BINS];
    for &v in values.iter().filter(|v| v.is_finite()) {
        let bin = (((v - min) as f64 / width) as usize).min(OTSU_BINS - 1);
        histogram[bin] += 1;
    }

    let total: u64 = histogram.iter().sum();
    let weighted_total: f64 = histogram.iter().enumerate().map(|(i, &c)| i as f64 * c as f64).sum();
    let mut background = 0u64;
    let mut background_sum = 0.0;
    let mut best = (f64::NEG_INFINITY, 0usize);
    for (i, &count) in histogram.iter().enumerate() {
        background += count;
        if background == 0 {
            continue;
        }
        let foreground = total - background;
        if foreground == 0 {
            break;
        }
        background_sum += i as f64 * count as f64;
        let mean_b = background_sum / background as f64;
        let mean_f = (weighted_total - background_sum) / foreground as f64;
        let between = background as f64 * foreground as f64 * (mean_b - mean_f).powi(2);
        if between > best.0 {
            best = (between, i);
        }
    }
    Ok(min + ((best.1 + 1) as f64 * width) as f32)
}

/// Binary foreground mask of voxels strictly above the Otsu threshold.
pub fn otsu_mask<B: Backend>(volume: &Volume<B>) -> Result<Volume<B>> {
    let threshold = otsu_threshold(&volume.to_vec()?)?;
    let mask = volume.data().clone().greater_elem(threshold).float();
    Ok(volume.with_data(mask)?.with_pixel_type(PixelType::Categorical))
}
