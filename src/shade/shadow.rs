// shadow.rs - Per-light screen-space shadow buffers
//
// Each pixel marches toward the light over the depth buffer and keeps the
// strongest occlusion seen along the ray (max, not sum).
//
// Point light:       steps 2 .. min(0.7 * distance, 60), every 1.5 px
// Directional light: 80 steps from 2 px along the light direction, no
//                    distance-based shortening of the ray
//
// A hit at march distance t is weighted by 1 - t / max_t.
//
// Output is occlusion: 0 = unshadowed, 1 = fully shadowed.

use serde::{Deserialize, Serialize};

use super::{Quality, box_blur, contact_hardening_blur, render_strided};
use crate::buffer::{DepthBuffer, ShadowBuffer};
use crate::scene::Light;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShadowSoftening {
    /// Box blur of radius `shadow_softness`
    #[default]
    Uniform,
    /// Blur radius grows with distance from the nearest blocker
    ContactHardening,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowParams {
    pub softening: ShadowSoftening,
    /// Minimum depth difference that counts as an occluder
    pub occluder_threshold: f32,
    /// Occlusion per unit of depth difference
    pub occlusion_gain: f32,
    /// Pixels this close to a point light are never shadowed
    pub light_clearance: f32,
}

impl Default for ShadowParams {
    fn default() -> Self {
        Self {
            softening: ShadowSoftening::Uniform,
            occluder_threshold: 0.02,
            occlusion_gain: 12.0,
            light_clearance: 3.0,
        }
    }
}

/// Ray-march budget for one quality level
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MarchBudget {
    pub start: f32,
    pub step: f32,
    /// Point rays stop at this fraction of the distance to the light ...
    pub point_fraction: f32,
    /// ... or at this many pixels, whichever comes first
    pub point_max: f32,
    pub directional_steps: usize,
}

impl MarchBudget {
    pub fn for_quality(quality: Quality) -> Self {
        match quality {
            Quality::Full => Self { start: 2.0, step: 1.5, point_fraction: 0.7, point_max: 60.0, directional_steps: 80 },
            Quality::Preview => Self { start: 2.0, step: 3.0, point_fraction: 0.7, point_max: 60.0, directional_steps: 40 },
        }
    }
}

/// Raw march result for one pixel
#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct March {
    occlusion: f32,
    /// Distance to the nearest occluding sample, infinity if none
    blocker: f32,
}

pub struct ShadowMapComputer {
    params: ShadowParams,
}

impl ShadowMapComputer {
    pub fn new(params: ShadowParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &ShadowParams {
        &self.params
    }

    /// Shadow buffer for one light. `softness` is the base blur radius in pixels.
    pub fn compute(&self, depth: &DepthBuffer, light: &Light, softness: f32, quality: Quality) -> ShadowBuffer {
        let (w, h) = depth.dims();
        let budget = MarchBudget::for_quality(quality);

        let marched = render_strided(w, h, quality.stride(), |x, y| self.march(depth, light, &budget, x, y));
        let raw = ShadowBuffer { width: w, height: h, data: marched.iter().map(|m| m.occlusion).collect() };

        let softening = match quality {
            Quality::Preview => ShadowSoftening::Uniform,
            Quality::Full => self.params.softening,
        };
        let mut out = match softening {
            ShadowSoftening::Uniform => box_blur(&raw, softness),
            ShadowSoftening::ContactHardening => {
                let blockers: Vec<f32> = marched.iter().map(|m| m.blocker).collect();
                contact_hardening_blur(&raw, &blockers, softness)
            }
        };

        // Blur can bleed shadow into the clearance disc; clear it afterwards
        if let Light::Point { x: lx, y: ly, .. } = *light {
            let (px, py) = (lx * w as f32, ly * h as f32);
            let r = self.params.light_clearance;
            let (x0, x1) = (((px - r).floor().max(0.0)) as usize, ((px + r).ceil().max(0.0)) as usize);
            let (y0, y1) = (((py - r).floor().max(0.0)) as usize, ((py + r).ceil().max(0.0)) as usize);
            for y in y0..=y1.min(h.saturating_sub(1)) {
                for x in x0..=x1.min(w.saturating_sub(1)) {
                    let (dx, dy) = (x as f32 - px, y as f32 - py);
                    if dx * dx + dy * dy <= r * r {
                        out.data[y * w + x] = 0.0;
                    }
                }
            }
        }

        log::trace!("shadow buffer {}x{} for {:?} ({:?})", w, h, light.kind(), softening);
        out
    }

    #[inline]
    fn march(&self, depth: &DepthBuffer, light: &Light, budget: &MarchBudget, x: usize, y: usize) -> March {
        let none = March { occlusion: 0.0, blocker: f32::INFINITY };
        let (w, h) = depth.dims();

        let (dir, max_t) = match *light {
            Light::Point { x: lx, y: ly, .. } => {
                let dx = lx * w as f32 - x as f32;
                let dy = ly * h as f32 - y as f32;
                let dist = (dx * dx + dy * dy).sqrt();
                if dist <= self.params.light_clearance {
                    return none;
                }
                ((dx / dist, dy / dist), (budget.point_fraction * dist).min(budget.point_max))
            }
            Light::Directional { dir_x, dir_y, .. } => {
                let len = (dir_x * dir_x + dir_y * dir_y).sqrt();
                if len < 1e-6 {
                    // Light straight overhead: nothing to march toward
                    return none;
                }
                let steps = budget.directional_steps as f32;
                ((dir_x / len, dir_y / len), budget.start + budget.step * (steps - 1.0))
            }
        };

        let max_steps = match light {
            Light::Point { .. } if max_t < budget.start => 0,
            Light::Point { .. } => ((max_t - budget.start) / budget.step).floor() as usize + 1,
            Light::Directional { .. } => budget.directional_steps,
        };

        let here = depth.data[y * w + x];
        let mut result = none;

        for i in 0..max_steps {
            let t = budget.start + budget.step * i as f32;
            let sx = (x as f32 + dir.0 * t).round();
            let sy = (y as f32 + dir.1 * t).round();
            if sx < 0.0 || sy < 0.0 || sx >= w as f32 || sy >= h as f32 {
                break;
            }

            let diff = depth.data[sy as usize * w + sx as usize] - here;
            if diff > self.params.occluder_threshold {
                let occ = (diff * self.params.occlusion_gain).min(1.0) * (1.0 - t / max_t);
                result.occlusion = result.occlusion.max(occ);
                result.blocker = result.blocker.min(t);
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_x(w: usize, h: usize) -> DepthBuffer {
        let data = (0..w * h).map(|i| (i % w) as f32 / (w - 1) as f32).collect();
        DepthBuffer::new(w, h, data).unwrap()
    }

    #[test]
    fn test_flat_depth_casts_no_shadow() {
        let c = ShadowMapComputer::new(ShadowParams::default());
        let depth = DepthBuffer::filled(32, 32, 0.5);
        for light in [Light::point(0.2, 0.3, 0.5, 1.0), Light::directional(0.3, -1.0, 1.0)] {
            let s = c.compute(&depth, &light, 2.0, Quality::Full);
            assert!(s.data.iter().all(|&v| v == 0.0));
        }
    }

    #[test]
    fn test_directional_ramp_monotonic() {
        let c = ShadowMapComputer::new(ShadowParams::default());
        let s = c.compute(&ramp_x(64, 8), &Light::directional(1.0, 0.0, 1.0), 2.0, Quality::Full);
        for y in 0..8 {
            for x in 1..64 {
                assert!(s.get(x, y) <= s.get(x - 1, y) + 1e-6, "x={x} y={y}");
            }
            assert!(s.get(0, y) > s.get(63, y));
        }
    }

    #[test]
    fn test_max_not_sum() {
        let c = ShadowMapComputer::new(ShadowParams::default());
        let s = c.compute(&ramp_x(64, 4), &Light::directional(1.0, 0.0, 1.0), 0.0, Quality::Full);
        assert!(s.data.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_point_light_clearance() {
        let c = ShadowMapComputer::new(ShadowParams { softening: ShadowSoftening::ContactHardening, ..Default::default() });
        // Checkerboard-ish noise so there is plenty to occlude
        let data = (0..48 * 48).map(|i| ((i * 31) % 17) as f32 / 16.0).collect();
        let depth = DepthBuffer::new(48, 48, data).unwrap();
        let light = Light::point(0.5, 0.5, 0.5, 1.0);
        let s = c.compute(&depth, &light, 3.0, Quality::Full);
        let (px, py) = (24.0f32, 24.0f32);
        let mut shadowed_elsewhere = false;
        for y in 0..48 {
            for x in 0..48 {
                let d = ((x as f32 - px).powi(2) + (y as f32 - py).powi(2)).sqrt();
                if d < 3.0 {
                    assert_eq!(s.get(x, y), 0.0);
                } else if s.get(x, y) > 0.0 {
                    shadowed_elsewhere = true;
                }
            }
        }
        assert!(shadowed_elsewhere);
    }

    fn strip_with_blocker(w: usize, blocker_x: usize) -> DepthBuffer {
        let mut depth = DepthBuffer::filled(w, 1, 0.2);
        depth.data[blocker_x] = 0.7;
        depth
    }

    #[test]
    fn test_occlusion_fades_with_march_distance() {
        let c = ShadowMapComputer::new(ShadowParams::default());
        // Light at x = 20, pixel at x = 10: max_t = 0.7 * 10 = 7
        let light = Light::point(0.5, 0.0, 0.5, 1.0);
        let near = c.compute(&strip_with_blocker(40, 12), &light, 0.0, Quality::Full);
        assert!((near.get(10, 0) - (1.0 - 2.0 / 7.0)).abs() < 1e-5, "{}", near.get(10, 0));

        // Same blocker hit at t = 5
        let far = c.compute(&strip_with_blocker(40, 15), &light, 0.0, Quality::Full);
        assert!((far.get(10, 0) - (1.0 - 5.0 / 7.0)).abs() < 1e-5, "{}", far.get(10, 0));
    }

    #[test]
    fn test_clearance_radius_is_inclusive() {
        let c = ShadowMapComputer::new(ShadowParams::default());
        // Pixel x = 23 is exactly 3 px from the light and sees the blocker at t = 2
        let light = Light::point(0.5, 0.0, 0.5, 1.0);
        let s = c.compute(&strip_with_blocker(40, 21), &light, 0.0, Quality::Full);
        assert_eq!(s.get(23, 0), 0.0);
        // Just outside, the same blocker still shadows
        let s = c.compute(&strip_with_blocker(40, 22), &light, 0.0, Quality::Full);
        assert!(s.get(24, 0) > 0.0);
    }

    #[test]
    fn test_zero_direction_is_unshadowed() {
        let c = ShadowMapComputer::new(ShadowParams::default());
        let s = c.compute(&ramp_x(16, 16), &Light::directional(0.0, 0.0, 1.0), 1.0, Quality::Full);
        assert!(s.data.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_preview_close_to_full() {
        let c = ShadowMapComputer::new(ShadowParams::default());
        let depth = ramp_x(64, 16);
        let light = Light::directional(1.0, 0.0, 1.0);
        let full = c.compute(&depth, &light, 2.0, Quality::Full);
        let preview = c.compute(&depth, &light, 2.0, Quality::Preview);
        assert_eq!(full.dims(), preview.dims());
        // Interior pixels see the same occluders either way
        assert!((full.get(10, 8) - preview.get(10, 8)).abs() < 0.1);
    }
}
