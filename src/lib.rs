use std::sync::Arc;

use wasm_bindgen::prelude::*;

pub mod buffer;
pub mod error;
pub mod geometry;
pub mod pipeline;
pub mod scene;
pub mod shade;
pub mod transform;

use buffer::{DepthBuffer, PixelBuffer};
use error::RelightError;
use geometry::{Segment, SegmentationResult};
use pipeline::{EngineConfig, Frame, RelightSession};
use scene::{Light, LightId, MaterialTable};
use shade::{Quality, ShadowSoftening};
use transform::resample_perspective;

// ============================================================================
// RELIGHTER - Depth-driven relighting of a single photo
// ============================================================================

#[wasm_bindgen]
pub struct Relighter {
    w: u32,
    h: u32,

    session: RelightSession,
    segments: Vec<Segment>,
    last: Option<Frame>,

    // Final RGBA8 output (may be resized by a perspective edit)
    out: Vec<u8>,
    out_w: u32,
    out_h: u32,
}

#[wasm_bindgen]
impl Relighter {
    #[wasm_bindgen(constructor)]
    pub fn new(w: u32, h: u32) -> Self {
        Self {
            w,
            h,
            session: RelightSession::new(Arc::new(MaterialTable::builtin()), EngineConfig::default()),
            segments: Vec::new(),
            last: None,
            out: vec![0; (w * h * 4) as usize],
            out_w: w,
            out_h: h,
        }
    }

    // ------------------------------------------------------------------------
    // Inputs
    // ------------------------------------------------------------------------

    /// RGBA8, `w * h * 4` bytes
    pub fn set_image(&mut self, rgba: &[u8]) -> Result<(), JsValue> {
        let img = PixelBuffer::from_rgba(self.w as usize, self.h as usize, rgba.to_vec()).map_err(js_err)?;
        self.session.set_image(img);
        Ok(())
    }

    /// Normalized depth, 0 = near, 1 = far
    pub fn set_depth(&mut self, depth: &[f32]) -> Result<(), JsValue> {
        let d = DepthBuffer::new(self.w as usize, self.h as usize, depth.to_vec()).map_err(js_err)?;
        self.session.set_depth(d);
        Ok(())
    }

    /// 8-bit grayscale depth, as estimators usually export it
    pub fn set_depth_u8(&mut self, gray: &[u8]) -> Result<(), JsValue> {
        let d = DepthBuffer::from_gray8(self.w as usize, self.h as usize, gray).map_err(js_err)?;
        self.session.set_depth(d);
        Ok(())
    }

    pub fn add_segment(
        &mut self,
        label: &str,
        class_id: u32,
        mask_w: u32,
        mask_h: u32,
        alpha: &[f32],
        confidence: f32,
    ) -> Result<(), JsValue> {
        let seg = Segment::from_alpha(label, class_id, mask_w as usize, mask_h as usize, alpha.to_vec(), confidence)
            .map_err(|e| js_err(e.into()))?;
        self.segments.push(seg);
        self.session.set_segmentation(Some(SegmentationResult::new(self.segments.clone())));
        Ok(())
    }

    pub fn clear_segments(&mut self) {
        self.segments.clear();
        self.session.set_segmentation(None);
    }

    /// Replace the material table with one parsed from JSON (must contain `_default`)
    pub fn set_materials_json(&mut self, json: &str) -> Result<(), JsValue> {
        let table = MaterialTable::from_json(json).map_err(js_err)?;
        self.session.set_material_table(Arc::new(table));
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Lights
    // ------------------------------------------------------------------------

    /// kind 0 = point (a, b, c = x, y, z), 1 = directional (a, b = dir_x, dir_y)
    #[allow(clippy::too_many_arguments)]
    pub fn add_light(
        &mut self,
        kind: u32,
        a: f32,
        b: f32,
        c: f32,
        r: f32,
        g: f32,
        bl: f32,
        intensity: f32,
    ) -> Result<u32, JsValue> {
        let light = Light::from_kind(kind, a, b, c, [r, g, bl], intensity).map_err(js_err)?;
        Ok(self.session.add_light(light).0)
    }

    pub fn move_light(&mut self, id: u32, x: f32, y: f32, z: f32) -> Result<(), JsValue> {
        self.session.move_light(LightId(id), x, y, z).map_err(js_err)
    }

    pub fn set_light_color(&mut self, id: u32, r: f32, g: f32, b: f32) -> Result<(), JsValue> {
        self.update_light(id, |light| match light {
            Light::Point { color, .. } | Light::Directional { color, .. } => *color = [r, g, b],
        })
    }

    pub fn set_light_intensity(&mut self, id: u32, value: f32) -> Result<(), JsValue> {
        self.update_light(id, |light| match light {
            Light::Point { intensity, .. } | Light::Directional { intensity, .. } => *intensity = value,
        })
    }

    pub fn remove_light(&mut self, id: u32) -> Result<(), JsValue> {
        self.session.remove_light(LightId(id)).map(|_| ()).map_err(js_err)
    }

    pub fn light_count(&self) -> usize {
        self.session.lights().count()
    }

    // ------------------------------------------------------------------------
    // Parameters
    // ------------------------------------------------------------------------

    pub fn set_ambient(&mut self, v: f32) {
        self.session.params_mut().ambient = v;
    }

    pub fn set_shadow_strength(&mut self, v: f32) {
        self.session.params_mut().shadow_strength = v;
    }

    pub fn set_shadow_softness(&mut self, v: f32) {
        self.session.params_mut().shadow_softness = v.max(0.0);
    }

    pub fn set_brightness(&mut self, v: f32) {
        self.session.params_mut().brightness = v;
    }

    pub fn set_color_temperature(&mut self, kelvin: f32) {
        self.session.params_mut().color_temperature = kelvin;
    }

    pub fn set_flat_profile(&mut self, enabled: bool, strength: f32) {
        let p = self.session.params_mut();
        p.flat_profile.enabled = enabled;
        p.flat_profile.strength = strength.clamp(0.0, 1.0);
    }

    pub fn set_rim_light(&mut self, enabled: bool) {
        self.session.params_mut().rim_light = enabled;
    }

    pub fn set_contact_hardening(&mut self, enabled: bool) {
        let mut config = *self.session.config();
        config.shadow.softening = if enabled { ShadowSoftening::ContactHardening } else { ShadowSoftening::Uniform };
        if config != *self.session.config() {
            self.session.set_config(config);
        }
    }

    /// Coarser, strided evaluation while the user is dragging
    pub fn set_preview(&mut self, preview: bool) {
        self.session.set_quality(if preview { Quality::Preview } else { Quality::Full });
    }

    // ------------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------------

    pub fn render(&mut self) -> Result<(), JsValue> {
        let frame = self.session.compute_frame().map_err(js_err)?;
        self.out.clear();
        self.out.extend_from_slice(&frame.image.pixels);
        self.out_w = self.w;
        self.out_h = self.h;
        self.last = Some(frame);
        Ok(())
    }

    /// Warp the current output by a row-major 3x3 NDC homography
    pub fn apply_perspective(&mut self, matrix: &[f32]) -> Result<(), JsValue> {
        let m: [f32; 9] = matrix
            .try_into()
            .map_err(|_| js_err(RelightError::DimensionMismatch { expected: 9, actual: matrix.len() }))?;
        let src = PixelBuffer::from_rgba(self.out_w as usize, self.out_h as usize, std::mem::take(&mut self.out))
            .map_err(js_err)?;
        let warped = resample_perspective(&src, m);
        self.out_w = warped.width as u32;
        self.out_h = warped.height as u32;
        self.out = warped.pixels;
        Ok(())
    }

    /// AO of the last render, 1 = fully visible
    pub fn ao_map(&self) -> Option<js_sys::Float32Array> {
        self.last.as_ref().map(|f| js_sys::Float32Array::from(f.ao.data.as_slice()))
    }

    /// Shadow occlusion of one light from the last render, 0 = unshadowed
    pub fn shadow_map(&self, id: u32) -> Option<js_sys::Float32Array> {
        let frame = self.last.as_ref()?;
        frame.shadows.get(&LightId(id)).map(|s| js_sys::Float32Array::from(s.data.as_slice()))
    }

    /// Refined depth of the last render
    pub fn depth_map(&self) -> Option<js_sys::Float32Array> {
        self.last.as_ref().map(|f| js_sys::Float32Array::from(f.refined_depth.data.as_slice()))
    }

    /// RGBA8-encoded normals of the last render
    pub fn normal_map(&self) -> Option<Vec<u8>> {
        self.last.as_ref().map(|f| f.normals.encode_rgba8().pixels)
    }

    pub fn fusion_error(&self) -> Option<String> {
        self.last.as_ref().and_then(|f| f.fusion_error.clone())
    }

    pub fn output_ptr(&self) -> *const u8 { self.out.as_ptr() }
    pub fn output_len(&self) -> usize { self.out.len() }
    pub fn output_width(&self) -> u32 { self.out_w }
    pub fn output_height(&self) -> u32 { self.out_h }
    pub fn width(&self) -> u32 { self.w }
    pub fn height(&self) -> u32 { self.h }
}

impl Relighter {
    fn update_light(&mut self, id: u32, f: impl FnOnce(&mut Light)) -> Result<(), JsValue> {
        let id = LightId(id);
        let mut light = *self.session.light(id).ok_or_else(|| js_err(RelightError::UnknownLight(id)))?;
        f(&mut light);
        self.session.set_light(id, light).map_err(js_err)
    }
}

fn js_err(e: RelightError) -> JsValue {
    JsValue::from_str(&e.to_string())
}
