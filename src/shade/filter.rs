// filter.rs - Blur kernels for shadow and AO buffers
//
// All kernels replicate edge pixels and return a new buffer.

use rayon::prelude::*;

use crate::buffer::ScalarBuffer;

/// Gaussian half-width used to denoise AO
pub const AO_BLUR_HALF_WIDTH: usize = 4;

/// Separable box blur of integer radius `radius.round()`
pub fn box_blur(src: &ScalarBuffer, radius: f32) -> ScalarBuffer {
    let r = radius.max(0.0).round() as usize;
    if r == 0 {
        return src.clone();
    }
    let weights = vec![1.0f32; 2 * r + 1];
    separable(src, &weights)
}

/// Two-pass Gaussian with weight exp(-0.5 * offset^2 / 4)
pub fn gaussian_blur(src: &ScalarBuffer, half_width: usize) -> ScalarBuffer {
    let weights: Vec<f32> = (0..=2 * half_width)
        .map(|i| {
            let o = i as f32 - half_width as f32;
            (-0.5 * o * o / 4.0).exp()
        })
        .collect();
    separable(src, &weights)
}

/// Variable-radius blur for contact-hardened shadows.
///
/// `blocker_dist` holds the distance (pixels) to the nearest occluder found
/// by the ray march, or infinity. The kernel radius is
/// `min(2, blocker_dist / 10) * base_radius`, so shadows stay sharp where
/// they touch their caster and widen with distance from it.
pub fn contact_hardening_blur(src: &ScalarBuffer, blocker_dist: &[f32], base_radius: f32) -> ScalarBuffer {
    let (w, h) = src.dims();
    let mut data = vec![0.0f32; w * h];
    if w == 0 || base_radius <= 0.0 {
        return src.clone();
    }

    data.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        for (x, out) in row.iter_mut().enumerate() {
            let i = y * w + x;
            let radius = (blocker_dist[i] / 10.0).min(2.0) * base_radius;
            if radius < 0.5 {
                *out = src.data[i];
                continue;
            }

            let reach = radius.ceil() as isize;
            let mut sum = 0.0f32;
            let mut total = 0.0f32;
            for dy in -reach..=reach {
                let sy = (y as isize + dy).clamp(0, h as isize - 1) as usize;
                for dx in -reach..=reach {
                    let dist = ((dx * dx + dy * dy) as f32).sqrt();
                    let wgt = 1.0 - dist / (radius + 1.0);
                    if wgt <= 0.0 {
                        continue;
                    }
                    let sx = (x as isize + dx).clamp(0, w as isize - 1) as usize;
                    sum += src.data[sy * w + sx] * wgt;
                    total += wgt;
                }
            }
            *out = sum / total.max(1e-6);
        }
    });

    ScalarBuffer { width: w, height: h, data }
}

/// Horizontal then vertical pass with a symmetric, odd-length kernel
fn separable(src: &ScalarBuffer, weights: &[f32]) -> ScalarBuffer {
    let (w, h) = src.dims();
    if w == 0 || h == 0 {
        return src.clone();
    }
    let half = (weights.len() / 2) as isize;
    let norm: f32 = weights.iter().sum();

    let mut tmp = vec![0.0f32; w * h];
    tmp.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        let line = &src.data[y * w..(y + 1) * w];
        for (x, out) in row.iter_mut().enumerate() {
            let mut acc = 0.0f32;
            for (k, wgt) in weights.iter().enumerate() {
                let sx = (x as isize + k as isize - half).clamp(0, w as isize - 1) as usize;
                acc += line[sx] * wgt;
            }
            *out = acc / norm;
        }
    });

    let mut data = vec![0.0f32; w * h];
    data.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        for (x, out) in row.iter_mut().enumerate() {
            let mut acc = 0.0f32;
            for (k, wgt) in weights.iter().enumerate() {
                let sy = (y as isize + k as isize - half).clamp(0, h as isize - 1) as usize;
                acc += tmp[sy * w + x] * wgt;
            }
            *out = acc / norm;
        }
    });

    ScalarBuffer { width: w, height: h, data }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn impulse(w: usize, h: usize) -> ScalarBuffer {
        let mut b = ScalarBuffer::filled(w, h, 0.0);
        b.data[(h / 2) * w + w / 2] = 1.0;
        b
    }

    #[test]
    fn test_box_blur_zero_radius_is_identity() {
        let b = impulse(7, 7);
        assert_eq!(box_blur(&b, 0.2), b);
    }

    #[test]
    fn test_box_blur_preserves_constant() {
        let b = ScalarBuffer::filled(9, 5, 0.25);
        let out = box_blur(&b, 2.0);
        assert!(out.data.iter().all(|v| (v - 0.25).abs() < 1e-6));
    }

    #[test]
    fn test_box_blur_spreads_impulse() {
        let out = box_blur(&impulse(9, 9), 1.0);
        assert!((out.get(4, 4) - 1.0 / 9.0).abs() < 1e-6);
        assert!((out.get(3, 3) - 1.0 / 9.0).abs() < 1e-6);
        assert_eq!(out.get(2, 4), 0.0);
    }

    #[test]
    fn test_gaussian_conserves_energy_in_interior() {
        let out = gaussian_blur(&impulse(21, 21), AO_BLUR_HALF_WIDTH);
        let total: f32 = out.data.iter().sum();
        assert!((total - 1.0).abs() < 1e-4);
        assert!(out.get(10, 10) > out.get(11, 10));
        assert!(out.get(11, 10) > out.get(12, 10));
    }

    #[test]
    fn test_contact_hardening_sharp_near_blocker() {
        let b = impulse(11, 11);
        let near = vec![2.0f32; 121];
        let far = vec![f32::INFINITY; 121];
        let sharp = contact_hardening_blur(&b, &near, 2.0);
        let soft = contact_hardening_blur(&b, &far, 2.0);
        assert_eq!(sharp.get(5, 5), 1.0);
        assert!(soft.get(5, 5) < 1.0);
        assert!(soft.get(7, 5) > 0.0);
    }
}
