// io.rs - Image files in and out
//
// Everything on disk is 8-bit PNG (or whatever `image` can decode on the
// way in). Depth maps are resampled to the photo's size when they differ.

use std::path::Path;

use image::{DynamicImage, GrayImage, RgbaImage, imageops::FilterType};
use ndarray::Array2;

use relight_engine::buffer::{DepthBuffer, PixelBuffer};
use relight_engine::geometry::Segment;

use crate::CliError;

pub fn load_image(path: &str) -> Result<PixelBuffer, CliError> {
    let img = image::open(path)?.to_rgba8();
    let (w, h) = img.dimensions();
    Ok(PixelBuffer::from_rgba(w as usize, h as usize, img.into_raw())?)
}

/// Load 8-bit depth, resized to (w, h). `invert` flips near/far for
/// estimators that write 1 = near (MiDaS-style inverse depth).
pub fn load_depth(path: &str, w: usize, h: usize, invert: bool) -> Result<DepthBuffer, CliError> {
    let mut gray = image::open(path)?.to_luma8();
    if gray.dimensions() != (w as u32, h as u32) {
        println!("    Resizing depth {}x{} -> {}x{}", gray.width(), gray.height(), w, h);
        gray = image::imageops::resize(&gray, w as u32, h as u32, FilterType::Triangle);
    }
    if invert {
        for p in gray.pixels_mut() {
            p.0[0] = 255 - p.0[0];
        }
    }
    Ok(DepthBuffer::from_gray8(w, h, gray.as_raw())?)
}

/// Grayscale mask at its own resolution; 255 = fully inside
pub fn load_mask(label: &str, class_id: u32, path: &str) -> Result<Segment, CliError> {
    let gray = image::open(path)?.to_luma8();
    let (w, h) = gray.dimensions();
    let alpha = gray.pixels().map(|p| p.0[0] as f32 / 255.0).collect();
    let mask = Array2::from_shape_vec((h as usize, w as usize), alpha)
        .map_err(|e| CliError::Usage(format!("mask {}: {}", path, e)))?;
    Ok(Segment::new(label, class_id, mask, 1.0))
}

pub fn save_rgba(dir: &Path, name: &str, buf: &PixelBuffer) -> Result<(), CliError> {
    let img = RgbaImage::from_raw(buf.width as u32, buf.height as u32, buf.pixels.clone())
        .ok_or_else(|| CliError::Encode(name.to_string()))?;
    DynamicImage::ImageRgba8(img).save(dir.join(name))?;
    Ok(())
}

pub fn save_gray(dir: &Path, name: &str, w: usize, h: usize, gray: Vec<u8>) -> Result<(), CliError> {
    let img = GrayImage::from_raw(w as u32, h as u32, gray).ok_or_else(|| CliError::Encode(name.to_string()))?;
    img.save(dir.join(name))?;
    Ok(())
}
