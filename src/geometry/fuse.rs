// fuse.rs - Depth + semantic segmentation fusion
//
// Pipeline:
//   1. Rasterize masks into a per-pixel class map and material map
//   2. Hard depth overrides (classes with forceDepth)
//   3. Planar enforcement: blend planar classes toward their median depth
//   4. Edge-aware smoothing within each class
//   5. Normals from the smoothed depth, sharpened at class boundaries
//
// A malformed segmentation is reported to the caller, which falls back to
// depth-only normals. The fuser does not try to repair its input.

use std::collections::HashMap;
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::segmentation::SegmentationResult;
use crate::buffer::{DepthBuffer, MaterialBuffer, MaterialSample, NormalBuffer, normalize3};
use crate::error::SegmentationError;
use crate::scene::MaterialTable;

/// Pixels not covered by any segment
pub const NO_CLASS: u32 = u32::MAX;

/// Labels treated as flat architectural or ground surfaces
pub const PLANAR_LABELS: &[&str] = &["floor", "wall", "ceiling", "road", "sidewalk"];

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FuseParams {
    pub normal_strength: f32,
    pub smoothing_iterations: usize,
    /// Fraction of the way each planar pixel moves toward its class median
    pub planar_blend: f32,
    /// Planar classes with fewer member pixels are left alone
    pub min_planar_pixels: usize,
    /// Mask alpha at or above this marks membership
    pub mask_threshold: f32,
}

impl Default for FuseParams {
    fn default() -> Self {
        Self {
            normal_strength: 8.0,
            smoothing_iterations: 2,
            planar_blend: 0.7,
            min_planar_pixels: 100,
            mask_threshold: 0.5,
        }
    }
}

/// Dense per-pixel class ids (`NO_CLASS` where nothing was segmented)
#[derive(Clone, Debug, PartialEq)]
pub struct ClassMap {
    pub width: usize,
    pub height: usize,
    pub ids: Vec<u32>,
}

impl ClassMap {
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u32 {
        self.ids[y * self.width + x]
    }
}

/// Everything the fuser derives from one depth + segmentation pair
#[derive(Clone, Debug)]
pub struct FusedScene {
    pub refined_depth: DepthBuffer,
    pub normals: NormalBuffer,
    pub materials: MaterialBuffer,
    pub classes: ClassMap,
}

pub struct DepthSegmentationFuser {
    table: Arc<MaterialTable>,
    params: FuseParams,
}

impl DepthSegmentationFuser {
    pub fn new(table: Arc<MaterialTable>, params: FuseParams) -> Self {
        Self { table, params }
    }

    pub fn table(&self) -> &MaterialTable {
        &self.table
    }

    pub fn params(&self) -> &FuseParams {
        &self.params
    }

    pub fn fuse(&self, depth: &DepthBuffer, segmentation: &SegmentationResult) -> Result<FusedScene, SegmentationError> {
        segmentation.validate()?;
        let (w, h) = depth.dims();

        let (classes, materials, labels) = self.rasterize(w, h, segmentation);

        // class id -> forced depth, resolved through the label of the class
        let forced: HashMap<u32, f32> = labels
            .iter()
            .filter_map(|(&id, label)| self.table.get(label).force_depth.map(|d| (id, d.clamp(0.0, 1.0))))
            .collect();

        let mut refined = depth.data.clone();
        apply_forced(&mut refined, &classes.ids, &forced);

        let planarized = self.enforce_planes(&mut refined, &classes.ids, &labels);

        for _ in 0..self.params.smoothing_iterations {
            refined = smooth_within_classes(&refined, &classes, w, h);
        }
        // Smoothing only mixes same-class neighbors, but re-pin to keep overrides exact
        apply_forced(&mut refined, &classes.ids, &forced);

        let refined_depth = DepthBuffer { width: w, height: h, data: refined };
        let normals = boundary_sharpened_normals(&refined_depth, &classes, self.params.normal_strength);

        log::debug!(
            "fused {} segments into {}x{}: {} classes, {} forced, {} planarized",
            segmentation.segments.len(),
            w,
            h,
            labels.len(),
            forced.len(),
            planarized
        );

        Ok(FusedScene { refined_depth, normals, materials, classes })
    }

    /// Nearest-neighbor map every mask onto the w x h grid.
    /// Later segments overwrite earlier ones where they overlap.
    fn rasterize(
        &self,
        w: usize,
        h: usize,
        segmentation: &SegmentationResult,
    ) -> (ClassMap, MaterialBuffer, HashMap<u32, String>) {
        let default = self.table.default_material().sample();
        let mut ids = vec![NO_CLASS; w * h];
        let mut mats = vec![default; w * h];
        let mut labels = HashMap::new();
        let threshold = self.params.mask_threshold;

        if w == 0 || h == 0 {
            return (
                ClassMap { width: w, height: h, ids },
                MaterialBuffer { width: w, height: h, data: mats },
                labels,
            );
        }

        for seg in &segmentation.segments {
            labels.insert(seg.class_id, seg.label.clone());
            let sample: MaterialSample = self.table.get(&seg.label).sample();
            let (mw, mh) = seg.mask_dims();
            let sx = mw as f32 / w as f32;
            let sy = mh as f32 / h as f32;

            ids.par_chunks_mut(w)
                .zip(mats.par_chunks_mut(w))
                .enumerate()
                .for_each(|(y, (id_row, mat_row))| {
                    let my = (((y as f32 + 0.5) * sy) as usize).min(mh - 1);
                    for x in 0..w {
                        let mx = (((x as f32 + 0.5) * sx) as usize).min(mw - 1);
                        if seg.mask[[my, mx]] >= threshold {
                            id_row[x] = seg.class_id;
                            mat_row[x] = sample;
                        }
                    }
                });
        }

        (
            ClassMap { width: w, height: h, ids },
            MaterialBuffer { width: w, height: h, data: mats },
            labels,
        )
    }

    /// Blend each planar class toward its median depth. This approximates
    /// a plane fit; it does not fit a plane. Returns the number of classes touched.
    fn enforce_planes(&self, depth: &mut [f32], ids: &[u32], labels: &HashMap<u32, String>) -> usize {
        let blend = self.params.planar_blend;
        let mut touched = 0;

        for (&class, label) in labels {
            if !PLANAR_LABELS.contains(&label.to_ascii_lowercase().as_str()) {
                continue;
            }

            let members: Vec<usize> = (0..ids.len()).filter(|&i| ids[i] == class).collect();
            if members.len() < self.params.min_planar_pixels {
                log::trace!("skipping plane `{}`: {} pixels", label, members.len());
                continue;
            }

            let mut values: Vec<f32> = members.iter().map(|&i| depth[i]).collect();
            let mid = values.len() / 2;
            let (_, &mut median, _) = values.select_nth_unstable_by(mid, f32::total_cmp);

            for &i in &members {
                depth[i] += (median - depth[i]) * blend;
            }
            touched += 1;
        }

        touched
    }
}

fn apply_forced(depth: &mut [f32], ids: &[u32], forced: &HashMap<u32, f32>) {
    if forced.is_empty() {
        return;
    }
    for (d, id) in depth.iter_mut().zip(ids) {
        if let Some(&v) = forced.get(id) {
            *d = v;
        }
    }
}

/// One pass of 3x3 same-class averaging, blended 70/30 with the center
fn smooth_within_classes(src: &[f32], classes: &ClassMap, w: usize, h: usize) -> Vec<f32> {
    let mut out = vec![0.0f32; w * h];
    if w == 0 {
        return out;
    }

    out.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        for x in 0..w {
            let i = y * w + x;
            let class = classes.ids[i];
            let mut sum = 0.0f32;
            let mut count = 0u32;

            for dy in -1isize..=1 {
                for dx in -1isize..=1 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let nx = x as isize + dx;
                    let ny = y as isize + dy;
                    if nx < 0 || ny < 0 || nx >= w as isize || ny >= h as isize {
                        continue;
                    }
                    let j = ny as usize * w + nx as usize;
                    if classes.ids[j] == class {
                        sum += src[j];
                        count += 1;
                    }
                }
            }

            row[x] = if count > 0 {
                src[i] * 0.7 + (sum / count as f32) * 0.3
            } else {
                src[i]
            };
        }
    });

    out
}

/// Central-difference normals; an axis gradient doubles where the
/// neighbor on that axis belongs to another class.
fn boundary_sharpened_normals(depth: &DepthBuffer, classes: &ClassMap, strength: f32) -> NormalBuffer {
    let (w, h) = depth.dims();
    let mut data = vec![[0.0f32, 0.0, 1.0]; w * h];
    if w == 0 {
        return NormalBuffer { width: w, height: h, data };
    }

    data.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        let xi = |x: usize, y: usize| classes.ids[y * w + x];
        for (x, out) in row.iter_mut().enumerate() {
            let (xl, xr) = (x.saturating_sub(1), (x + 1).min(w - 1));
            let (yu, yd) = (y.saturating_sub(1), (y + 1).min(h - 1));
            let c = xi(x, y);

            let mut gx = (depth.data[y * w + xr] - depth.data[y * w + xl]) * strength;
            let mut gy = (depth.data[yd * w + x] - depth.data[yu * w + x]) * strength;

            if xi(xl, y) != c || xi(xr, y) != c {
                gx *= 2.0;
            }
            if xi(x, yu) != c || xi(x, yd) != c {
                gy *= 2.0;
            }

            *out = normalize3([-gx, -gy, 1.0]);
        }
    });

    NormalBuffer { width: w, height: h, data }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Segment;
    use crate::scene::Material;
    use ndarray::Array2;

    fn fuser() -> DepthSegmentationFuser {
        DepthSegmentationFuser::new(Arc::new(MaterialTable::builtin()), FuseParams::default())
    }

    /// Mask covering rows [y0, y1) at the given resolution
    fn band(label: &str, id: u32, mw: usize, mh: usize, y0: usize, y1: usize) -> Segment {
        let mask = Array2::from_shape_fn((mh, mw), |(r, _)| if r >= y0 && r < y1 { 1.0 } else { 0.0 });
        Segment::new(label, id, mask, 0.9)
    }

    fn noisy_depth(w: usize, h: usize) -> DepthBuffer {
        let data = (0..w * h).map(|i| 0.3 + ((i * 7919) % 97) as f32 / 500.0).collect();
        DepthBuffer::new(w, h, data).unwrap()
    }

    #[test]
    fn test_empty_segmentation_is_reported() {
        let err = fuser().fuse(&noisy_depth(8, 8), &SegmentationResult::default()).unwrap_err();
        assert!(matches!(err, SegmentationError::Empty));
    }

    #[test]
    fn test_forced_sky_depth_is_exact() {
        let depth = noisy_depth(32, 24);
        let seg = SegmentationResult::new(vec![band("sky", 2, 32, 24, 0, 8), band("person", 12, 32, 24, 8, 24)]);
        let fused = fuser().fuse(&depth, &seg).unwrap();

        for (i, &id) in fused.classes.ids.iter().enumerate() {
            if id == 2 {
                assert_eq!(fused.refined_depth.data[i], 1.0);
            }
        }
        assert!(fused.classes.ids.iter().any(|&id| id == 2));
    }

    #[test]
    fn test_mask_resolution_is_scaled() {
        // Half-resolution mask covering the top half
        let depth = DepthBuffer::filled(16, 16, 0.5);
        let seg = SegmentationResult::new(vec![band("wall", 1, 8, 8, 0, 4)]);
        let fused = fuser().fuse(&depth, &seg).unwrap();
        assert_eq!(fused.classes.get(0, 0), 1);
        assert_eq!(fused.classes.get(15, 7), 1);
        assert_eq!(fused.classes.get(0, 8), NO_CLASS);
    }

    #[test]
    fn test_later_segments_overwrite() {
        let depth = DepthBuffer::filled(8, 8, 0.5);
        let seg = SegmentationResult::new(vec![band("wall", 1, 8, 8, 0, 8), band("lamp", 7, 8, 8, 2, 4)]);
        let fused = fuser().fuse(&depth, &seg).unwrap();
        assert_eq!(fused.classes.get(3, 3), 7);
        assert_eq!(fused.materials.get(3, 3).emissive, 0.8);
        assert_eq!(fused.classes.get(3, 6), 1);
    }

    #[test]
    fn test_unsegmented_pixels_use_default_material() {
        let table = MaterialTable::new(Material::new(0.25, 0.0, 0.0, 0.0), []);
        let f = DepthSegmentationFuser::new(Arc::new(table), FuseParams::default());
        let seg = SegmentationResult::new(vec![band("wall", 1, 8, 8, 0, 2)]);
        let fused = f.fuse(&DepthBuffer::filled(8, 8, 0.5), &seg).unwrap();
        assert_eq!(fused.materials.get(0, 7).roughness, 0.25);
    }

    #[test]
    fn test_planar_class_pulled_toward_median() {
        let w = 16;
        let h = 16;
        let data: Vec<f32> = (0..w * h).map(|i| (i % w) as f32 / (w - 1) as f32).collect();
        let depth = DepthBuffer::new(w, h, data).unwrap();
        let seg = SegmentationResult::new(vec![band("floor", 3, w, h, 0, h)]);
        let params = FuseParams { smoothing_iterations: 0, ..FuseParams::default() };
        let fused = DepthSegmentationFuser::new(Arc::new(MaterialTable::builtin()), params)
            .fuse(&depth, &seg)
            .unwrap();

        let before = depth.data[w - 1] - depth.data[0];
        let after = fused.refined_depth.data[w - 1] - fused.refined_depth.data[0];
        assert!((after - before * 0.3).abs() < 1e-5);
    }

    #[test]
    fn test_small_planar_class_skipped() {
        let depth = noisy_depth(8, 8); // 64 pixels < 100
        let seg = SegmentationResult::new(vec![band("floor", 3, 8, 8, 0, 8)]);
        let params = FuseParams { smoothing_iterations: 0, ..FuseParams::default() };
        let fused = DepthSegmentationFuser::new(Arc::new(MaterialTable::builtin()), params)
            .fuse(&depth, &seg)
            .unwrap();
        assert_eq!(fused.refined_depth.data, depth.data);
    }

    #[test]
    fn test_smoothing_does_not_cross_classes() {
        let w = 8;
        let data: Vec<f32> = (0..w * w).map(|i| if (i / w) < 4 { 0.2 } else { 0.8 }).collect();
        let depth = DepthBuffer::new(w, w, data).unwrap();
        let seg = SegmentationResult::new(vec![band("person", 12, w, w, 0, 4), band("car", 20, w, w, 4, 8)]);
        let fused = fuser().fuse(&depth, &seg).unwrap();
        assert!((fused.refined_depth.data[3 * w + 3] - 0.2).abs() < 1e-6);
        assert!((fused.refined_depth.data[4 * w + 3] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_boundary_normals_sharpened() {
        let w = 8;
        let data: Vec<f32> = (0..w * w).map(|i| (i % w) as f32 * 0.01).collect();
        let depth = DepthBuffer::new(w, w, data).unwrap();
        let one = SegmentationResult::new(vec![band("person", 12, w, w, 0, 8)]);
        let mut left = band("person", 12, w, w, 0, 8);
        left.mask = Array2::from_shape_fn((w, w), |(_, c)| if c < 4 { 1.0 } else { 0.0 });
        let split = SegmentationResult::new(vec![left]);

        let params = FuseParams { smoothing_iterations: 0, ..FuseParams::default() };
        let f = DepthSegmentationFuser::new(Arc::new(MaterialTable::builtin()), params);
        let a = f.fuse(&depth, &one).unwrap().normals.get(3, 4);
        let b = f.fuse(&depth, &split).unwrap().normals.get(3, 4);
        assert!(b[0] < a[0], "boundary normal should lean harder: {a:?} vs {b:?}");
    }

    #[test]
    fn test_fused_normals_unit_length() {
        let depth = noisy_depth(24, 24);
        let seg = SegmentationResult::new(vec![band("wall", 1, 12, 12, 0, 6), band("floor", 3, 12, 12, 6, 12)]);
        let fused = fuser().fuse(&depth, &seg).unwrap();
        for n in &fused.normals.data {
            let len = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
            assert!((len - 1.0).abs() < 1e-3);
        }
    }
}
