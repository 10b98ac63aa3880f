//! Compression artifact analysis
//!
//! JPEG-style pipelines quantise the 8×8 block DCT. Re-encoded composites end
//! up either stripped of AC detail or carrying far more of it than a single
//! encode would. Per full 8×8 luminance block (level-shifted by 128), an
//! orthonormal DCT-II; over the 63 AC coefficients, the variance and the mean
//! absolute value (energy). Both are averaged across blocks:
//!
//! ```text
//! ac_variance < min_ac_variance ⇒ +0.5
//! ac_energy   < min_ac_energy   ⇒ +0.5
//! ac_energy   > max_ac_energy   ⇒ +0.5
//! ```

use super::{check_size, finite, ImageSignal};
use crate::config::ImageThresholds;
use crate::dsp;
use crate::error::{ExtractorError, ExtractorResult};
use crate::features::FeatureReport;
use crate::media::DecodedFrame;

pub fn extract(frame: &DecodedFrame, thresholds: &ImageThresholds) -> ExtractorResult<FeatureReport> {
    check_size(frame, thresholds.min_dimension)?;
    let t = &thresholds.compression;
    let luma = frame.luma();

    let blocks_x = luma.width / 8;
    let blocks_y = luma.height / 8;
    if blocks_x == 0 || blocks_y == 0 {
        return Err(ExtractorError::Degenerate("no complete 8x8 block".to_string()));
    }

    let basis = dsp::dct8_basis();
    let mut variances = Vec::with_capacity(blocks_x * blocks_y);
    let mut energies = Vec::with_capacity(blocks_x * blocks_y);
    let mut ac = Vec::with_capacity(63);

    for by in 0..blocks_y {
        for bx in 0..blocks_x {
            let mut block = [[0.0; 8]; 8];
            for (y, row) in block.iter_mut().enumerate() {
                for (x, v) in row.iter_mut().enumerate() {
                    *v = luma.get(bx * 8 + x, by * 8 + y) - 128.0;
                }
            }
            let coeffs = dsp::dct8x8(&block, &basis);

            ac.clear();
            ac.extend(coeffs.iter().flatten().skip(1).copied());
            variances.push(dsp::variance(&ac));
            energies.push(ac.iter().map(|c| c.abs()).sum::<f64>() / ac.len() as f64);
        }
    }

    let ac_variance = finite(dsp::mean(&variances), "dct ac variance")?;
    let ac_energy = finite(dsp::mean(&energies), "dct ac energy")?;

    let mut score = 0.0;
    if ac_variance < t.min_ac_variance {
        score += 0.5;
    }
    if ac_energy < t.min_ac_energy || ac_energy > t.max_ac_energy {
        score += 0.5;
    }

    Ok(
        FeatureReport::unit(ImageSignal::Compression.name(), score, thresholds.suspicious_at)
            .with("ac_variance", ac_variance)
            .with("ac_energy", ac_energy)
            .with("blocks", blocks_x * blocks_y),
    )
}
