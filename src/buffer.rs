// buffer.rs - Dense per-pixel buffers shared by every stage
//
// All buffers are row-major (index = y * width + x) and one frame's buffers
// share the same dimensions. Stages never mutate their inputs; each one
// returns a fresh buffer.

use crate::error::RelightError;

/// Interleaved RGBA8 color image.
#[derive(Clone, Debug, PartialEq)]
pub struct PixelBuffer {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<u8>,
}

impl PixelBuffer {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height, pixels: vec![0; width * height * 4] }
    }

    pub fn from_rgba(width: usize, height: usize, pixels: Vec<u8>) -> Result<Self, RelightError> {
        check_len(width * height * 4, pixels.len())?;
        Ok(Self { width, height, pixels })
    }

    /// Uniform color fill, handy for tests and placeholder albedo
    pub fn filled(width: usize, height: usize, rgba: [u8; 4]) -> Self {
        let mut pixels = Vec::with_capacity(width * height * 4);
        for _ in 0..width * height {
            pixels.extend_from_slice(&rgba);
        }
        Self { width, height, pixels }
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> [u8; 4] {
        let i = (y * self.width + x) * 4;
        [self.pixels[i], self.pixels[i + 1], self.pixels[i + 2], self.pixels[i + 3]]
    }

    pub fn dims(&self) -> (usize, usize) {
        (self.width, self.height)
    }
}

/// Single-channel depth, normalized to [0, 1], higher = farther.
#[derive(Clone, Debug, PartialEq)]
pub struct DepthBuffer {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
}

impl DepthBuffer {
    /// Wrap raw depth values. Values are clamped into [0, 1] and NaN becomes 1 (far).
    pub fn new(width: usize, height: usize, mut data: Vec<f32>) -> Result<Self, RelightError> {
        check_len(width * height, data.len())?;
        for d in &mut data {
            *d = if d.is_nan() { 1.0 } else { d.clamp(0.0, 1.0) };
        }
        Ok(Self { width, height, data })
    }

    pub fn filled(width: usize, height: usize, value: f32) -> Self {
        Self { width, height, data: vec![value.clamp(0.0, 1.0); width * height] }
    }

    /// Build from 8-bit gray values (0 = near, 255 = far)
    pub fn from_gray8(width: usize, height: usize, gray: &[u8]) -> Result<Self, RelightError> {
        check_len(width * height, gray.len())?;
        let data = gray.iter().map(|&g| g as f32 / 255.0).collect();
        Ok(Self { width, height, data })
    }

    /// Depth at (x, y) with edge replication for out-of-range coordinates
    #[inline(always)]
    pub fn at(&self, x: isize, y: isize) -> f32 {
        let cx = x.clamp(0, self.width as isize - 1) as usize;
        let cy = y.clamp(0, self.height as isize - 1) as usize;
        self.data[cy * self.width + cx]
    }

    pub fn dims(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn to_gray8(&self) -> Vec<u8> {
        self.data.iter().map(|&d| (d * 255.0).round().clamp(0.0, 255.0) as u8).collect()
    }
}

/// Per-pixel unit surface normals (x right, y down, z toward the viewer).
#[derive(Clone, Debug, PartialEq)]
pub struct NormalBuffer {
    pub width: usize,
    pub height: usize,
    pub data: Vec<[f32; 3]>,
}

impl NormalBuffer {
    /// Every pixel facing the camera
    pub fn flat(width: usize, height: usize) -> Self {
        Self { width, height, data: vec![[0.0, 0.0, 1.0]; width * height] }
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> [f32; 3] {
        self.data[y * self.width + x]
    }

    pub fn dims(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Pack into RGBA8 as (n * 0.5 + 0.5) * 255, alpha 255
    pub fn encode_rgba8(&self) -> PixelBuffer {
        let mut pixels = Vec::with_capacity(self.data.len() * 4);
        for n in &self.data {
            for c in n {
                pixels.push(((c * 0.5 + 0.5) * 255.0).round().clamp(0.0, 255.0) as u8);
            }
            pixels.push(255);
        }
        PixelBuffer { width: self.width, height: self.height, pixels }
    }

    /// Inverse of `encode_rgba8`, renormalizing away quantization error
    pub fn decode_rgba8(encoded: &PixelBuffer) -> Self {
        let data = encoded
            .pixels
            .chunks_exact(4)
            .map(|p| {
                let v = [
                    p[0] as f32 / 255.0 * 2.0 - 1.0,
                    p[1] as f32 / 255.0 * 2.0 - 1.0,
                    p[2] as f32 / 255.0 * 2.0 - 1.0,
                ];
                normalize3(v)
            })
            .collect();
        Self { width: encoded.width, height: encoded.height, data }
    }
}

/// Surface response channels for one pixel.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MaterialSample {
    pub roughness: f32,
    pub metallic: f32,
    pub subsurface: f32,
    pub emissive: f32,
}

/// Four material channels per pixel: roughness, metallic, subsurface, emissive.
#[derive(Clone, Debug, PartialEq)]
pub struct MaterialBuffer {
    pub width: usize,
    pub height: usize,
    pub data: Vec<MaterialSample>,
}

impl MaterialBuffer {
    pub fn filled(width: usize, height: usize, sample: MaterialSample) -> Self {
        Self { width, height, data: vec![sample; width * height] }
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> MaterialSample {
        self.data[y * self.width + x]
    }

    pub fn dims(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Debug view: roughness, metallic, subsurface, emissive in R, G, B, A
    pub fn to_rgba8(&self) -> PixelBuffer {
        let q = |v: f32| (v * 255.0).round().clamp(0.0, 255.0) as u8;
        let mut pixels = Vec::with_capacity(self.data.len() * 4);
        for m in &self.data {
            pixels.extend_from_slice(&[q(m.roughness), q(m.metallic), q(m.subsurface), q(m.emissive)]);
        }
        PixelBuffer { width: self.width, height: self.height, pixels }
    }
}

/// Single channel in [0, 1].
#[derive(Clone, Debug, PartialEq)]
pub struct ScalarBuffer {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
}

/// Ambient visibility: 1 = fully visible, 0 = fully occluded.
pub type AoBuffer = ScalarBuffer;

/// Shadow occlusion: 0 = unshadowed, 1 = fully shadowed.
pub type ShadowBuffer = ScalarBuffer;

impl ScalarBuffer {
    pub fn filled(width: usize, height: usize, value: f32) -> Self {
        Self { width, height, data: vec![value; width * height] }
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    pub fn dims(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn to_gray8(&self) -> Vec<u8> {
        self.data.iter().map(|&v| (v * 255.0).round().clamp(0.0, 255.0) as u8).collect()
    }
}

#[inline]
pub(crate) fn normalize3(v: [f32; 3]) -> [f32; 3] {
    let len = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt().max(1e-6);
    [v[0] / len, v[1] / len, v[2] / len]
}

#[inline]
pub(crate) fn dot3(a: [f32; 3], b: [f32; 3]) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn check_len(expected: usize, actual: usize) -> Result<(), RelightError> {
    if expected != actual {
        return Err(RelightError::DimensionMismatch { expected, actual });
    }
    Ok(())
}

/// Fail unless `actual` matches the frame dimensions `expected`
pub(crate) fn check_dims(expected: (usize, usize), actual: (usize, usize)) -> Result<(), RelightError> {
    if expected != actual {
        return Err(RelightError::FrameSizeMismatch { expected, actual });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_rejects_wrong_length() {
        let err = DepthBuffer::new(4, 4, vec![0.5; 15]).unwrap_err();
        assert!(matches!(err, RelightError::DimensionMismatch { expected: 16, actual: 15 }));
    }

    #[test]
    fn test_depth_clamps_and_replaces_nan() {
        let d = DepthBuffer::new(3, 1, vec![-0.5, f32::NAN, 2.0]).unwrap();
        assert_eq!(d.data, vec![0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_depth_edge_replication() {
        let d = DepthBuffer::new(2, 2, vec![0.1, 0.2, 0.3, 0.4]).unwrap();
        assert_eq!(d.at(-5, 0), 0.1);
        assert_eq!(d.at(9, 9), 0.4);
    }

    #[test]
    fn test_normal_encoding_of_flat_normal() {
        let n = NormalBuffer::flat(1, 1);
        let enc = n.encode_rgba8();
        assert_eq!(enc.pixels, vec![128, 128, 255, 255]);
        let dec = NormalBuffer::decode_rgba8(&enc);
        assert!((dec.data[0][2] - 1.0).abs() < 1e-2);
    }

    #[test]
    fn test_check_dims_catches_transposed_buffers() {
        assert!(check_dims((4, 2), (4, 2)).is_ok());
        assert!(check_dims((4, 2), (2, 4)).is_err());
    }
}
