// perspective.rs - Homography resampling for geometric edits
//
// The matrix is row-major 3x3 in normalized device coordinates, [-1, 1]^2
// with y pointing down. Forward pass: project the corners to get the output
// box. Backward pass: every destination pixel maps through the inverse to a
// source position and is sampled bilinearly; misses stay transparent.

use rayon::prelude::*;

use crate::buffer::PixelBuffer;

/// Floor for |w| in the homogeneous divide
pub const W_EPSILON: f32 = 1e-5;

/// Matrices with |det| below this are treated as singular
pub const SINGULAR_EPSILON: f32 = 1e-10;

/// Output never exceeds this multiple of the source size per axis
pub const MAX_SCALE: f32 = 4.0;

pub type Homography = [f32; 9];

pub const IDENTITY: Homography = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];

/// Axis-aligned NDC box covering the projected source corners
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NdcBounds {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

pub struct PerspectiveResampler {
    matrix: Homography,
}

impl PerspectiveResampler {
    pub fn new(matrix: Homography) -> Self {
        Self { matrix }
    }

    pub fn matrix(&self) -> &Homography {
        &self.matrix
    }

    /// Forward-project the four corners of [-1, 1]^2
    pub fn bounds(&self) -> NdcBounds {
        let mut b = NdcBounds { min_x: f32::MAX, min_y: f32::MAX, max_x: f32::MIN, max_y: f32::MIN };
        for (cx, cy) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
            let (x, y) = project(&self.matrix, cx, cy);
            b.min_x = b.min_x.min(x);
            b.min_y = b.min_y.min(y);
            b.max_x = b.max_x.max(x);
            b.max_y = b.max_y.max(y);
        }
        b
    }

    /// Resample `src`. A singular matrix (or one that sends the image to
    /// infinity) returns the input unchanged.
    pub fn resample(&self, src: &PixelBuffer) -> PixelBuffer {
        let (sw, sh) = src.dims();
        if sw == 0 || sh == 0 {
            return src.clone();
        }

        let Some(inv) = invert(&self.matrix) else {
            log::warn!("singular homography, leaving image untransformed");
            return src.clone();
        };

        let b = self.bounds();
        let (span_x, span_y) = (b.max_x - b.min_x, b.max_y - b.min_y);
        if !span_x.is_finite() || !span_y.is_finite() {
            log::warn!("homography projects to an unbounded box, leaving image untransformed");
            return src.clone();
        }

        let dw = ((span_x * 0.5 * sw as f32).round()).clamp(1.0, MAX_SCALE * sw as f32) as usize;
        let dh = ((span_y * 0.5 * sh as f32).round()).clamp(1.0, MAX_SCALE * sh as f32) as usize;

        let mut out = PixelBuffer::new(dw, dh);
        out.pixels.par_chunks_mut(dw * 4).enumerate().for_each(|(dy, row)| {
            let ny = b.min_y + (dy as f32 + 0.5) / dh as f32 * span_y;
            for dx in 0..dw {
                let nx = b.min_x + (dx as f32 + 0.5) / dw as f32 * span_x;
                let (u, v) = project(&inv, nx, ny);

                // Source pixel centers sit at integer coordinates
                let sx = (u + 1.0) * 0.5 * sw as f32 - 0.5;
                let sy = (v + 1.0) * 0.5 * sh as f32 - 0.5;
                if !(-0.5..=sw as f32 - 0.5).contains(&sx) || !(-0.5..=sh as f32 - 0.5).contains(&sy) {
                    continue;
                }

                row[dx * 4..dx * 4 + 4].copy_from_slice(&bilinear(src, sx, sy));
            }
        });

        log::debug!("perspective resample {}x{} -> {}x{}", sw, sh, dw, dh);
        out
    }
}

/// Convenience wrapper around `PerspectiveResampler`
pub fn resample_perspective(src: &PixelBuffer, matrix: Homography) -> PixelBuffer {
    PerspectiveResampler::new(matrix).resample(src)
}

#[inline]
fn project(m: &Homography, x: f32, y: f32) -> (f32, f32) {
    let mut w = m[6] * x + m[7] * y + m[8];
    if w.abs() < W_EPSILON {
        w = W_EPSILON.copysign(w);
    }
    ((m[0] * x + m[1] * y + m[2]) / w, (m[3] * x + m[4] * y + m[5]) / w)
}

/// Adjugate inverse, `None` when singular
fn invert(m: &Homography) -> Option<Homography> {
    let [a, b, c, d, e, f, g, h, i] = *m;
    let (co_a, co_b, co_c) = (e * i - f * h, f * g - d * i, d * h - e * g);
    let det = a * co_a + b * co_b + c * co_c;
    if det.abs() < SINGULAR_EPSILON || !det.is_finite() {
        return None;
    }
    let r = 1.0 / det;
    Some([
        co_a * r,
        (c * h - b * i) * r,
        (b * f - c * e) * r,
        co_b * r,
        (a * i - c * g) * r,
        (c * d - a * f) * r,
        co_c * r,
        (b * g - a * h) * r,
        (a * e - b * d) * r,
    ])
}

#[inline]
fn bilinear(src: &PixelBuffer, sx: f32, sy: f32) -> [u8; 4] {
    let (w, h) = src.dims();
    let sx = sx.clamp(0.0, (w - 1) as f32);
    let sy = sy.clamp(0.0, (h - 1) as f32);
    let (x0, y0) = (sx.floor() as usize, sy.floor() as usize);
    let (x1, y1) = ((x0 + 1).min(w - 1), (y0 + 1).min(h - 1));
    let (fx, fy) = (sx - x0 as f32, sy - y0 as f32);

    let (p00, p10, p01, p11) = (src.get(x0, y0), src.get(x1, y0), src.get(x0, y1), src.get(x1, y1));
    let mut out = [0u8; 4];
    for c in 0..4 {
        let top = p00[c] as f32 * (1.0 - fx) + p10[c] as f32 * fx;
        let bottom = p01[c] as f32 * (1.0 - fx) + p11[c] as f32 * fx;
        out[c] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(w: usize, h: usize) -> PixelBuffer {
        let mut pixels = Vec::with_capacity(w * h * 4);
        for y in 0..h {
            for x in 0..w {
                pixels.extend_from_slice(&[(x * 17 % 256) as u8, (y * 29 % 256) as u8, ((x + y) * 7 % 256) as u8, 255]);
            }
        }
        PixelBuffer::from_rgba(w, h, pixels).unwrap()
    }

    #[test]
    fn test_identity_is_lossless() {
        let src = gradient(37, 21);
        let out = resample_perspective(&src, IDENTITY);
        assert_eq!(out, src);
    }

    #[test]
    fn test_singular_returns_input() {
        let src = gradient(8, 8);
        let zero_row = [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0];
        assert_eq!(resample_perspective(&src, zero_row), src);
    }

    #[test]
    fn test_inverse_round_trips_matrix() {
        let m = [1.2, 0.1, 0.05, -0.2, 0.9, 0.0, 0.1, 0.05, 1.0];
        let inv = invert(&m).unwrap();
        let (x, y) = project(&m, 0.3, -0.4);
        let (u, v) = project(&inv, x, y);
        assert!((u - 0.3).abs() < 1e-4 && (v + 0.4).abs() < 1e-4);
    }

    #[test]
    fn test_shrink_halves_output() {
        // Uniform scale by 0.5 around the origin; output box is half the size
        let src = PixelBuffer::filled(16, 16, [200, 100, 50, 255]);
        let half = [0.5, 0.0, 0.0, 0.0, 0.5, 0.0, 0.0, 0.0, 1.0];
        let out = resample_perspective(&src, half);
        assert_eq!(out.dims(), (8, 8));
        assert_eq!(out.get(4, 4), [200, 100, 50, 255]);
    }

    #[test]
    fn test_translation_keeps_size() {
        let src = gradient(20, 10);
        let shift = [1.0, 0.0, 0.4, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];
        let out = resample_perspective(&src, shift);
        assert_eq!(out.dims(), (20, 10));
        // The output box follows the image, so content is unchanged
        assert_eq!(out, src);
    }

    #[test]
    fn test_keystone_has_transparent_corners() {
        let src = PixelBuffer::filled(32, 32, [10, 20, 30, 255]);
        // Bottom edge narrower than the top
        let keystone = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.3, 1.0];
        let out = resample_perspective(&src, keystone);
        let (w, h) = out.dims();
        assert_eq!(out.get(0, h - 1)[3], 0);
        assert_eq!(out.get(w - 1, h - 1)[3], 0);
        assert_eq!(out.get(w / 2, h / 2), [10, 20, 30, 255]);
    }
}
