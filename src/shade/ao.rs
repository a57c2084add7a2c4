// ao.rs - Horizon-based ambient occlusion
//
// Depth becomes a pseudo view-space z (depth * depth_scale). Each pixel
// marches a few screen-space directions, rotated per pixel by a hash to
// trade banding for noise, and tracks the highest horizon (dz / distance)
// along each one. The result is blurred and inverted: 1 = fully visible.

use std::f32::consts::TAU;

use serde::{Deserialize, Serialize};

use super::{AO_BLUR_HALF_WIDTH, Quality, gaussian_blur, pixel_hash, render_strided};
use crate::buffer::{AoBuffer, DepthBuffer};

/// Depth above which a pixel counts as background and is never occluded
pub const AO_FAR_CUTOFF: f32 = 0.99;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AoParams {
    /// March radius in pixels
    pub radius: f32,
    pub num_directions: usize,
    pub num_steps: usize,
    /// Horizon slope ignored as self-occlusion
    pub bias: f32,
    pub intensity: f32,
    /// Pseudo view-space z per unit of normalized depth, in pixels
    pub depth_scale: f32,
}

impl Default for AoParams {
    fn default() -> Self {
        Self {
            radius: 12.0,
            num_directions: 8,
            num_steps: 6,
            bias: 0.1,
            intensity: 1.0,
            depth_scale: 40.0,
        }
    }
}

pub struct AmbientOcclusionComputer {
    params: AoParams,
}

impl AmbientOcclusionComputer {
    pub fn new(params: AoParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &AoParams {
        &self.params
    }

    pub fn compute(&self, depth: &DepthBuffer, quality: Quality) -> AoBuffer {
        let (w, h) = depth.dims();
        let (dirs, steps) = match quality {
            Quality::Full => (self.params.num_directions, self.params.num_steps),
            Quality::Preview => ((self.params.num_directions / 2).max(2), (self.params.num_steps / 2).max(2)),
        };

        let raw = render_strided(w, h, quality.stride(), |x, y| self.horizon_ao(depth, x, y, dirs, steps));
        let mut ao = gaussian_blur(&AoBuffer { width: w, height: h, data: raw }, AO_BLUR_HALF_WIDTH);

        // Blur must not darken the background
        for (v, &d) in ao.data.iter_mut().zip(&depth.data) {
            if d > AO_FAR_CUTOFF {
                *v = 1.0;
            }
        }

        log::debug!("ao {}x{}: {} directions x {} steps, stride {}", w, h, dirs, steps, quality.stride());
        ao
    }

    fn horizon_ao(&self, depth: &DepthBuffer, x: usize, y: usize, dirs: usize, steps: usize) -> f32 {
        let (w, h) = depth.dims();
        let d = depth.data[y * w + x];
        if d > AO_FAR_CUTOFF {
            return 1.0;
        }
        if dirs == 0 || steps == 0 {
            return 1.0;
        }

        let p = &self.params;
        let z = d * p.depth_scale;
        let sector = TAU / dirs as f32;
        let rotation = pixel_hash(x, y) * sector;

        let mut total = 0.0f32;
        for k in 0..dirs {
            let angle = k as f32 * sector + rotation;
            let (sin, cos) = angle.sin_cos();
            let mut horizon = 0.0f32;

            for s in 1..=steps {
                let dist = p.radius * s as f32 / steps as f32;
                let sx = (x as f32 + cos * dist).round();
                let sy = (y as f32 + sin * dist).round();
                if sx < 0.0 || sy < 0.0 || sx >= w as f32 || sy >= h as f32 {
                    break;
                }
                // Nearer samples (smaller depth) rise above the surface
                let sz = depth.data[sy as usize * w + sx as usize] * p.depth_scale;
                horizon = horizon.max((z - sz) / dist.max(1e-6));
            }

            total += (horizon - p.bias).max(0.0);
        }

        let occlusion = (total / dirs as f32 * p.intensity).clamp(0.0, 1.0);
        1.0 - occlusion
    }
}
