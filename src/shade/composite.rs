// composite.rs - Final relit image from albedo, geometry and light buffers
//
// Light is applied as exposure stops (2^(light * 2)) rather than added, and
// highlights above 200 are compressed so bright lights roll off instead of
// clipping. Ambient * AO is a floor under the lit value. The function is pure: identical inputs give identical output.

use rayon::prelude::*;

use crate::buffer::{AoBuffer, MaterialBuffer, MaterialSample, NormalBuffer, PixelBuffer, ShadowBuffer, check_dims, dot3, normalize3};
use crate::error::RelightError;
use crate::scene::{Light, LightingParams, temperature_tint};

const DIFFUSE_WEIGHT: f32 = 0.4;
const SPECULAR_WEIGHT: f32 = 0.2;
const ATTENUATION_K: f32 = 2.0;
const EXPOSURE_STOPS_PER_UNIT: f32 = 2.0;
const EMISSIVE_STOPS: f32 = 1.0;
const SHADOW_DARKENING: f32 = 0.6;
const RIM_WEIGHT: f32 = 0.15;
const HIGHLIGHT_KNEE: f32 = 200.0;
const HIGHLIGHT_SLOPE: f32 = 0.3;
const VIEW: [f32; 3] = [0.0, 0.0, 1.0];

/// Shading used where no material map exists
const NEUTRAL_MATERIAL: MaterialSample = MaterialSample { roughness: 0.5, metallic: 0.0, subsurface: 0.0, emissive: 0.0 };

/// One light and its (optional) shadow buffer
#[derive(Clone, Copy, Debug)]
pub struct ShadedLight<'a> {
    pub light: &'a Light,
    pub shadow: Option<&'a ShadowBuffer>,
}

#[derive(Clone, Copy, Debug)]
pub struct CompositeInputs<'a> {
    pub albedo: &'a PixelBuffer,
    pub normals: &'a NormalBuffer,
    pub materials: Option<&'a MaterialBuffer>,
    pub ao: Option<&'a AoBuffer>,
    pub lights: &'a [ShadedLight<'a>],
}

/// Identity up to 200, then slope 0.3
#[inline]
pub fn compress_highlight(v: f32) -> f32 {
    if v <= HIGHLIGHT_KNEE {
        v
    } else {
        HIGHLIGHT_KNEE + (v - HIGHLIGHT_KNEE) * HIGHLIGHT_SLOPE
    }
}

/// Pull the color toward luminance 128 by `strength`, scaling all
/// channels by the same factor so hue is kept.
#[inline]
pub fn flat_profile(rgb: [f32; 3], strength: f32) -> [f32; 3] {
    let lum = 0.299 * rgb[0] + 0.587 * rgb[1] + 0.114 * rgb[2];
    let target = lum + (128.0 - lum) * strength.clamp(0.0, 1.0);
    let scale = target / lum.max(1e-3);
    [rgb[0] * scale, rgb[1] * scale, rgb[2] * scale]
}

pub fn composite(inputs: &CompositeInputs, params: &LightingParams) -> Result<PixelBuffer, RelightError> {
    let dims = inputs.albedo.dims();
    check_dims(dims, inputs.normals.dims())?;
    if let Some(m) = inputs.materials {
        check_dims(dims, m.dims())?;
    }
    if let Some(ao) = inputs.ao {
        check_dims(dims, ao.dims())?;
    }
    for sl in inputs.lights {
        if let Some(s) = sl.shadow {
            check_dims(dims, s.dims())?;
        }
    }

    let (w, h) = dims;
    let mut out = PixelBuffer::new(w, h);
    if w == 0 || h == 0 {
        return Ok(out);
    }

    let tint = temperature_tint(params.color_temperature);

    out.pixels.par_chunks_mut(w * 4).enumerate().for_each(|(y, row)| {
        for x in 0..w {
            let i = y * w + x;
            let src = &inputs.albedo.pixels[i * 4..i * 4 + 4];
            let mut albedo = [src[0] as f32, src[1] as f32, src[2] as f32];
            if params.flat_profile.enabled {
                albedo = flat_profile(albedo, params.flat_profile.strength);
            }
            let rgb = if inputs.lights.is_empty() {
                // Idle state: no per-light work at all
                albedo.map(|c| c * params.brightness)
            } else {
                let ao = inputs.ao.map_or(1.0, |a| a.data[i]);
                shade_pixel(inputs, params, &tint, albedo, ao, x, y)
            };

            let o = &mut row[x * 4..x * 4 + 4];
            for c in 0..3 {
                o[c] = rgb[c].clamp(0.0, 255.0).round() as u8;
            }
            o[3] = src[3];
        }
    });

    Ok(out)
}

fn shade_pixel(
    inputs: &CompositeInputs,
    params: &LightingParams,
    tint: &[f32; 3],
    albedo: [f32; 3],
    ao: f32,
    x: usize,
    y: usize,
) -> [f32; 3] {
    let (w, h) = inputs.albedo.dims();
    let i = y * w + x;
    let n = inputs.normals.data[i];
    let mat = inputs.materials.map_or(NEUTRAL_MATERIAL, |m| m.data[i]);

    let u = (x as f32 + 0.5) / w as f32;
    let v = (y as f32 + 0.5) / h as f32;

    let shininess = 48.0 - 16.0 * mat.roughness.clamp(0.0, 1.0);
    let spec_scale = 1.0 - 0.5 * mat.roughness.clamp(0.0, 1.0);
    let spec_tint: [f32; 3] = std::array::from_fn(|c| 1.0 + (albedo[c] / 255.0 - 1.0) * mat.metallic);

    let mut light_sum = [0.0f32; 3];
    let mut worst_shadow = 0.0f32;

    for sl in inputs.lights {
        let (l, attenuation) = match *sl.light {
            Light::Point { x: lx, y: ly, z: lz, .. } => {
                let (dx, dy) = (lx - u, ly - v);
                (normalize3([dx, dy, lz]), 1.0 / (1.0 + ATTENUATION_K * (dx * dx + dy * dy)))
            }
            Light::Directional { dir_x, dir_y, .. } => (normalize3([dir_x, dir_y, 0.5]), 1.0),
        };

        let n_dot_l = dot3(n, l);
        let diffuse = if mat.subsurface > 0.0 {
            ((n_dot_l + mat.subsurface) / (1.0 + mat.subsurface)).max(0.0)
        } else {
            n_dot_l.max(0.0)
        };

        let half = normalize3([l[0] + VIEW[0], l[1] + VIEW[1], l[2] + VIEW[2]]);
        let specular = if n_dot_l > 0.0 {
            dot3(n, half).max(0.0).powf(shininess) * spec_scale * SPECULAR_WEIGHT
        } else {
            0.0
        };

        let occlusion = sl.shadow.map_or(0.0, |s| s.data[i]);
        worst_shadow = worst_shadow.max(occlusion);
        let shadow = 1.0 - occlusion * params.shadow_strength;

        let energy = attenuation * sl.light.intensity() * shadow;
        let color = sl.light.color();
        for c in 0..3 {
            light_sum[c] += color[c] * tint[c] * energy * (diffuse * DIFFUSE_WEIGHT + specular * spec_tint[c]);
        }
    }

    let shadow_mul = 1.0 - worst_shadow * params.shadow_strength * SHADOW_DARKENING;
    let rim = if params.rim_light {
        (1.0 - dot3(n, VIEW).max(0.0)).powi(3) * RIM_WEIGHT * 255.0
    } else {
        0.0
    };

    std::array::from_fn(|c| {
        let exposure = (light_sum[c] * EXPOSURE_STOPS_PER_UNIT + mat.emissive * EMISSIVE_STOPS).exp2();
        let lit = compress_highlight(albedo[c] * shadow_mul * exposure);
        // Ambient is a floor under the lit value, not extra light
        lit.max(albedo[c] * params.ambient * ao) * params.brightness + rim
    })
}
