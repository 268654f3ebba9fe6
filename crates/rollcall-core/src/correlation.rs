//! Normalized cross-correlation template matching.
//!
//! Scores are the zero-mean normalized correlation coefficient
//! (`TM_CCOEFF_NORMED` in OpenCV terms), maximised over every placement of
//! the template inside the image.

use crate::types::FaceSample;

/// Slide `template` over `image` and return the best correlation score.
///
/// Returns `None` when the template does not fit inside the image.
/// Placements where either patch has zero variance score 0.
pub fn match_template(image: &FaceSample, template: &FaceSample) -> Option<f32> {
    let (iw, ih) = (image.width as usize, image.height as usize);
    let (tw, th) = (template.width as usize, template.height as usize);
    if tw == 0 || th == 0 || tw > iw || th > ih {
        return None;
    }

    let n = (tw * th) as f64;
    let t_mean = template.pixels.iter().map(|&p| p as f64).sum::<f64>() / n;
    let t_dev: Vec<f64> = template.pixels.iter().map(|&p| p as f64 - t_mean).collect();
    let t_norm: f64 = t_dev.iter().map(|d| d * d).sum();

    let mut best = f64::NEG_INFINITY;
    for oy in 0..=(ih - th) {
        for ox in 0..=(iw - tw) {
            let mut sum = 0.0f64;
            let mut sum_sq = 0.0f64;
            let mut cross = 0.0f64;
            for ty in 0..th {
                let row = (oy + ty) * iw + ox;
                let t_row = ty * tw;
                for tx in 0..tw {
                    let v = image.pixels[row + tx] as f64;
                    sum += v;
                    sum_sq += v * v;
                    // Σ(I-Ī)(T-T̄) reduces to Σ I·(T-T̄) because Σ(T-T̄) = 0.
                    cross += v * t_dev[t_row + tx];
                }
            }

            let i_norm = sum_sq - sum * sum / n;
            let score = if i_norm > 0.0 && t_norm > 0.0 {
                cross / (i_norm * t_norm).sqrt()
            } else {
                0.0
            };
            if score > best {
                best = score;
            }
        }
    }

    Some(best.clamp(-1.0, 1.0) as f32)
}

/// Correlation between two samples of identical size.
///
/// Samples of different pixel sizes are not comparable and yield `None`.
pub fn similarity(a: &FaceSample, b: &FaceSample) -> Option<f32> {
    if a.dimensions() != b.dimensions() {
        return None;
    }
    match_template(a, b)
}
