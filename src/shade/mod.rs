// shade/ - Light transport over the 2.5D height field
//
// - Per-light ray-marched shadow buffers
// - Horizon-based ambient occlusion (light independent)
// - Final compositing with exposure stops and highlight compression
// - Blur filters shared by the above

mod ao;
mod composite;
mod filter;
mod shadow;

pub use ao::*;
pub use composite::*;
pub use filter::*;
pub use shadow::*;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Latency/quality trade-off. Preview is for active dragging; it never
/// changes what is computed, only how densely.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Preview,
    #[default]
    Full,
}

impl Quality {
    /// Pixel stride for skip-and-fill evaluation
    pub fn stride(self) -> usize {
        match self {
            Quality::Preview => 2,
            Quality::Full => 1,
        }
    }
}

/// Evaluate `f` on every `stride`-th pixel in both axes and fill the
/// skipped pixels from the nearest evaluated sample up-left of them.
pub(crate) fn render_strided<T, F>(w: usize, h: usize, stride: usize, f: F) -> Vec<T>
where
    T: Copy + Default + Send + Sync,
    F: Fn(usize, usize) -> T + Sync,
{
    if w == 0 || h == 0 {
        return Vec::new();
    }
    let s = stride.max(1);

    if s == 1 {
        let mut out = vec![T::default(); w * h];
        out.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
            for (x, v) in row.iter_mut().enumerate() {
                *v = f(x, y);
            }
        });
        return out;
    }

    let cw = w.div_ceil(s);
    let ch = h.div_ceil(s);
    let mut coarse = vec![T::default(); cw * ch];
    coarse.par_chunks_mut(cw).enumerate().for_each(|(cy, row)| {
        for (cx, v) in row.iter_mut().enumerate() {
            *v = f(cx * s, cy * s);
        }
    });

    let mut out = vec![T::default(); w * h];
    out.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        let src = &coarse[(y / s) * cw..(y / s + 1) * cw];
        for (x, v) in row.iter_mut().enumerate() {
            *v = src[x / s];
        }
    });
    out
}

/// Deterministic per-pixel hash in [0, 1)
#[inline(always)]
pub(crate) fn pixel_hash(x: usize, y: usize) -> f32 {
    let mut h = (x as u32).wrapping_mul(374_761_393) ^ (y as u32).wrapping_mul(668_265_263);
    h ^= h >> 13;
    h = h.wrapping_mul(1_274_126_177);
    h ^= h >> 16;
    (h >> 8) as f32 * (1.0 / 16_777_216.0)
}
