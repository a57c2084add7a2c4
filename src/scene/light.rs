// light.rs - User-placed virtual lights and global lighting parameters
//
// Light positions live in normalized [0, 1]^2 screen space, y pointing down.

use serde::{Deserialize, Serialize};

use crate::error::RelightError;

/// Stable identity of a light across moves, used as a cache key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LightId(pub u32);

/// Wire tag for light variants (0 = point, 1 = directional)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LightKind {
    Point,
    Directional,
}

impl TryFrom<u32> for LightKind {
    type Error = RelightError;

    fn try_from(kind: u32) -> Result<Self, Self::Error> {
        match kind {
            0 => Ok(LightKind::Point),
            1 => Ok(LightKind::Directional),
            other => Err(RelightError::InvalidLightType(other)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Light {
    /// Point light at (x, y) in screen space, z above the image plane
    Point { x: f32, y: f32, z: f32, color: [f32; 3], intensity: f32 },
    /// Infinitely distant light; (dir_x, dir_y) points from the surface toward the light
    Directional { dir_x: f32, dir_y: f32, color: [f32; 3], intensity: f32 },
}

impl Light {
    pub fn point(x: f32, y: f32, z: f32, intensity: f32) -> Self {
        Light::Point { x, y, z, color: [1.0, 1.0, 1.0], intensity }
    }

    pub fn directional(dir_x: f32, dir_y: f32, intensity: f32) -> Self {
        Light::Directional { dir_x, dir_y, color: [1.0, 1.0, 1.0], intensity }
    }

    /// Build a light from a wire tag. For points (a, b, c) = (x, y, z),
    /// for directional lights (a, b) = (dir_x, dir_y) and c is ignored.
    pub fn from_kind(kind: u32, a: f32, b: f32, c: f32, color: [f32; 3], intensity: f32) -> Result<Self, RelightError> {
        Ok(match LightKind::try_from(kind)? {
            LightKind::Point => Light::Point { x: a, y: b, z: c, color, intensity },
            LightKind::Directional => Light::Directional { dir_x: a, dir_y: b, color, intensity },
        })
    }

    pub fn kind(&self) -> LightKind {
        match self {
            Light::Point { .. } => LightKind::Point,
            Light::Directional { .. } => LightKind::Directional,
        }
    }

    pub fn color(&self) -> [f32; 3] {
        match *self {
            Light::Point { color, .. } | Light::Directional { color, .. } => color,
        }
    }

    pub fn intensity(&self) -> f32 {
        match *self {
            Light::Point { intensity, .. } | Light::Directional { intensity, .. } => intensity,
        }
    }

    /// Hash of the geometry that shapes this light's shadow.
    /// Color and intensity changes do not invalidate shadow buffers.
    pub fn position_hash(&self) -> u64 {
        let words: [u32; 4] = match *self {
            Light::Point { x, y, z, .. } => [0, x.to_bits(), y.to_bits(), z.to_bits()],
            Light::Directional { dir_x, dir_y, .. } => [1, dir_x.to_bits(), dir_y.to_bits(), 0],
        };
        // FNV-1a over the raw bits
        let mut h: u64 = 0xcbf2_9ce4_8422_2325;
        for w in words {
            for b in w.to_le_bytes() {
                h ^= b as u64;
                h = h.wrapping_mul(0x0100_0000_01b3);
            }
        }
        h
    }

    /// Move the light, keeping color and intensity. For directional
    /// lights (x, y) becomes the new direction and z is ignored.
    pub fn moved_to(&self, nx: f32, ny: f32, nz: f32) -> Self {
        match *self {
            Light::Point { color, intensity, .. } => Light::Point { x: nx, y: ny, z: nz, color, intensity },
            Light::Directional { color, intensity, .. } => {
                Light::Directional { dir_x: nx, dir_y: ny, color, intensity }
            }
        }
    }
}

/// Luminance-preserving flattening of the albedo before relighting.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlatProfile {
    pub enabled: bool,
    pub strength: f32,
}

impl Default for FlatProfile {
    fn default() -> Self {
        Self { enabled: false, strength: 0.5 }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightingParams {
    /// Ambient floor added under all lighting, scaled by AO
    pub ambient: f32,
    pub shadow_strength: f32,
    /// Base blur radius for shadow softening, in pixels
    pub shadow_softness: f32,
    pub brightness: f32,
    /// Kelvin; tints light colors, 6500 K is neutral
    pub color_temperature: f32,
    pub flat_profile: FlatProfile,
    /// Additive fresnel edge glow
    pub rim_light: bool,
}

impl Default for LightingParams {
    fn default() -> Self {
        Self {
            ambient: 0.2,
            shadow_strength: 0.6,
            shadow_softness: 2.0,
            brightness: 1.0,
            color_temperature: NEUTRAL_KELVIN,
            flat_profile: FlatProfile::default(),
            rim_light: false,
        }
    }
}

pub const NEUTRAL_KELVIN: f32 = 6500.0;

/// Kelvin to 8-bit-range RGB using the piecewise fit of blackbody color
/// (separate branches below and above 6600 K).
pub fn kelvin_to_rgb(kelvin: f32) -> [f32; 3] {
    let t = kelvin.clamp(1000.0, 40000.0) / 100.0;

    let r = if t <= 66.0 {
        255.0
    } else {
        329.698_73 * (t - 60.0).powf(-0.133_204_76)
    };

    let g = if t <= 66.0 {
        99.470_8 * t.ln() - 161.119_57
    } else {
        288.122_16 * (t - 60.0).powf(-0.075_514_85)
    };

    let b = if t > 66.0 {
        255.0
    } else if t <= 19.0 {
        0.0
    } else {
        138.517_73 * (t - 10.0).ln() - 305.044_8
    };

    [r.clamp(0.0, 255.0), g.clamp(0.0, 255.0), b.clamp(0.0, 255.0)]
}

/// Per-channel multiplier for a color temperature, exactly 1 at 6500 K
pub fn temperature_tint(kelvin: f32) -> [f32; 3] {
    let c = kelvin_to_rgb(kelvin);
    let n = kelvin_to_rgb(NEUTRAL_KELVIN);
    [c[0] / n[0].max(1.0), c[1] / n[1].max(1.0), c[2] / n[2].max(1.0)]
}
