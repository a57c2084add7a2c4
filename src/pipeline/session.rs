// session.rs - Cached, interactive relighting session
//
// Inputs are versioned: a new depth map, segmentation or material table
// bumps `depth_version`, which invalidates geometry, AO and every shadow.
// Moving a light only invalidates that light's shadow; changing color,
// intensity or any compositor parameter only re-runs the composite.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::{EngineConfig, Frame, FrameStats, Geometry, RenderQueue, RenderToken, derive_geometry, render_composite};
use crate::buffer::{AoBuffer, DepthBuffer, PixelBuffer, ShadowBuffer, check_dims};
use crate::error::RelightError;
use crate::geometry::{DepthSegmentationFuser, SegmentationResult};
use crate::scene::{Light, LightId, LightingParams, MaterialTable};
use crate::shade::{AmbientOcclusionComputer, Quality, ShadowMapComputer, ShadowSoftening};

/// Everything a cached shadow buffer was computed from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ShadowKey {
    pub position_hash: u64,
    pub depth_version: u64,
    pub quality: Quality,
    pub softness_bits: u32,
    pub softening: ShadowSoftening,
}

/// Last shadow buffer per light, with the key it was computed under
#[derive(Clone, Debug, Default)]
pub struct ShadowCache {
    entries: HashMap<LightId, (ShadowKey, Arc<ShadowBuffer>)>,
}

impl ShadowCache {
    /// Cached buffer for `id`, only if it was computed under `key`
    pub fn get(&self, id: LightId, key: &ShadowKey) -> Option<Arc<ShadowBuffer>> {
        match self.entries.get(&id) {
            Some((k, buf)) if k == key => Some(Arc::clone(buf)),
            _ => None,
        }
    }

    pub fn insert(&mut self, id: LightId, key: ShadowKey, buf: Arc<ShadowBuffer>) {
        self.entries.insert(id, (key, buf));
    }

    pub fn remove(&mut self, id: LightId) {
        self.entries.remove(&id);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct RelightSession {
    config: EngineConfig,
    params: LightingParams,
    table: Arc<MaterialTable>,
    fuser: DepthSegmentationFuser,

    albedo: Option<Arc<PixelBuffer>>,
    depth: Option<Arc<DepthBuffer>>,
    segmentation: Option<Arc<SegmentationResult>>,
    depth_version: u64,

    lights: BTreeMap<LightId, Light>,
    next_light: u32,

    geometry: Option<(u64, Geometry)>,
    ao: Option<((u64, Quality), Arc<AoBuffer>)>,
    shadows: ShadowCache,

    queue: RenderQueue,
}

impl RelightSession {
    pub fn new(table: Arc<MaterialTable>, config: EngineConfig) -> Self {
        Self {
            fuser: DepthSegmentationFuser::new(Arc::clone(&table), config.fuse),
            table,
            config,
            params: LightingParams::default(),
            albedo: None,
            depth: None,
            segmentation: None,
            depth_version: 0,
            lights: BTreeMap::new(),
            next_light: 1,
            geometry: None,
            ao: None,
            shadows: ShadowCache::default(),
            queue: RenderQueue::new(),
        }
    }

    // ------------------------------------------------------------------------
    // Inputs
    // ------------------------------------------------------------------------

    pub fn set_image(&mut self, albedo: PixelBuffer) {
        self.albedo = Some(Arc::new(albedo));
    }

    pub fn set_depth(&mut self, depth: DepthBuffer) {
        self.depth = Some(Arc::new(depth));
        self.bump_depth_version();
    }

    /// `None` clears segmentation and drops back to depth-only normals
    pub fn set_segmentation(&mut self, segmentation: Option<SegmentationResult>) {
        self.segmentation = segmentation.map(Arc::new);
        self.bump_depth_version();
    }

    /// forceDepth overrides change the refined depth, so this invalidates like new depth
    pub fn set_material_table(&mut self, table: Arc<MaterialTable>) {
        self.fuser = DepthSegmentationFuser::new(Arc::clone(&table), self.config.fuse);
        self.table = table;
        self.bump_depth_version();
    }

    pub fn set_config(&mut self, config: EngineConfig) {
        self.fuser = DepthSegmentationFuser::new(Arc::clone(&self.table), config.fuse);
        self.config = config;
        self.geometry = None;
        self.ao = None;
        self.shadows.clear();
    }

    pub fn set_params(&mut self, params: LightingParams) {
        self.params = params;
    }

    pub fn params(&self) -> &LightingParams {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut LightingParams {
        &mut self.params
    }

    pub fn set_quality(&mut self, quality: Quality) {
        self.config.quality = quality;
    }

    pub fn material_table(&self) -> &Arc<MaterialTable> {
        &self.table
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn depth_version(&self) -> u64 {
        self.depth_version
    }

    pub fn dims(&self) -> Option<(usize, usize)> {
        self.albedo.as_ref().map(|a| a.dims()).or_else(|| self.depth.as_ref().map(|d| d.dims()))
    }

    fn bump_depth_version(&mut self) {
        self.depth_version += 1;
    }

    // ------------------------------------------------------------------------
    // Lights
    // ------------------------------------------------------------------------

    pub fn add_light(&mut self, light: Light) -> LightId {
        let id = LightId(self.next_light);
        self.next_light += 1;
        self.lights.insert(id, light);
        id
    }

    /// Replace a light wholesale (color, intensity or position)
    pub fn set_light(&mut self, id: LightId, light: Light) -> Result<(), RelightError> {
        let slot = self.lights.get_mut(&id).ok_or(RelightError::UnknownLight(id))?;
        *slot = light;
        Ok(())
    }

    pub fn move_light(&mut self, id: LightId, x: f32, y: f32, z: f32) -> Result<(), RelightError> {
        let slot = self.lights.get_mut(&id).ok_or(RelightError::UnknownLight(id))?;
        *slot = slot.moved_to(x, y, z);
        Ok(())
    }

    pub fn remove_light(&mut self, id: LightId) -> Result<Light, RelightError> {
        let light = self.lights.remove(&id).ok_or(RelightError::UnknownLight(id))?;
        self.shadows.remove(id);
        Ok(light)
    }

    pub fn clear_lights(&mut self) {
        self.lights.clear();
        self.shadows.clear();
    }

    pub fn light(&self, id: LightId) -> Option<&Light> {
        self.lights.get(&id)
    }

    pub fn lights(&self) -> impl Iterator<Item = (LightId, &Light)> {
        self.lights.iter().map(|(id, l)| (*id, l))
    }

    // ------------------------------------------------------------------------
    // Cached intermediates
    // ------------------------------------------------------------------------

    pub fn shadow_cache(&self) -> &ShadowCache {
        &self.shadows
    }

    /// AO from the most recent frame, if any
    pub fn ao(&self) -> Option<&Arc<AoBuffer>> {
        self.ao.as_ref().map(|(_, buf)| buf)
    }

    pub fn geometry(&self) -> Option<&Geometry> {
        self.geometry.as_ref().map(|(_, g)| g)
    }

    // ------------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------------

    /// Queue handle for superseding in-flight renders from elsewhere
    pub fn render_queue(&self) -> RenderQueue {
        self.queue.clone()
    }

    pub fn compute_frame(&mut self) -> Result<Frame, RelightError> {
        let token = self.queue.next();
        self.compute_frame_with(&token)
    }

    /// Render under `token`. Returns `Superseded` at the first stage boundary
    /// after a newer token was issued; caches filled so far are kept.
    pub fn compute_frame_with(&mut self, token: &RenderToken) -> Result<Frame, RelightError> {
        let albedo = self.albedo.clone().ok_or(RelightError::NoImageAvailable)?;
        let depth = self.depth.clone().ok_or(RelightError::NoDepthAvailable)?;
        check_dims(albedo.dims(), depth.dims())?;
        ensure_current(token)?;

        let quality = self.config.quality;
        let mut stats = FrameStats::default();

        // Geometry
        let geometry = match &self.geometry {
            Some((version, g)) if *version == self.depth_version => g.clone(),
            _ => {
                let g = derive_geometry(&depth, self.segmentation.as_deref(), &self.fuser, self.config.normal_strength);
                self.geometry = Some((self.depth_version, g.clone()));
                stats.geometry_recomputed = true;
                g
            }
        };
        ensure_current(token)?;

        // AO
        let ao_key = (self.depth_version, quality);
        let ao = match &self.ao {
            Some((key, buf)) if *key == ao_key => Arc::clone(buf),
            _ => {
                let buf = Arc::new(AmbientOcclusionComputer::new(self.config.ao).compute(&geometry.depth, quality));
                self.ao = Some((ao_key, Arc::clone(&buf)));
                stats.ao_recomputed = true;
                buf
            }
        };
        ensure_current(token)?;

        // Shadows
        let shadow_computer = ShadowMapComputer::new(self.config.shadow);
        let softness = self.params.shadow_softness;
        let mut shadows = BTreeMap::new();
        for (&id, light) in &self.lights {
            let key = ShadowKey {
                position_hash: light.position_hash(),
                depth_version: self.depth_version,
                quality,
                softness_bits: softness.to_bits(),
                softening: self.config.shadow.softening,
            };
            let buf = match self.shadows.get(id, &key) {
                Some(buf) => {
                    stats.shadows_reused.push(id);
                    buf
                }
                None => {
                    let buf = Arc::new(shadow_computer.compute(&geometry.depth, light, softness, quality));
                    self.shadows.insert(id, key, Arc::clone(&buf));
                    stats.shadows_recomputed.push(id);
                    buf
                }
            };
            shadows.insert(id, buf);
            ensure_current(token)?;
        }

        // Composite
        let lights: Vec<(LightId, Light)> = self.lights.iter().map(|(id, l)| (*id, *l)).collect();
        let image = render_composite(&albedo, &geometry, &ao, &lights, &shadows, &self.params)?;
        ensure_current(token)?;

        log::debug!(
            "frame v{} {:?}: geometry {}, ao {}, shadows {} new / {} reused",
            self.depth_version,
            quality,
            if stats.geometry_recomputed { "recomputed" } else { "cached" },
            if stats.ao_recomputed { "recomputed" } else { "cached" },
            stats.shadows_recomputed.len(),
            stats.shadows_reused.len(),
        );

        Ok(Frame {
            image,
            refined_depth: geometry.depth,
            normals: geometry.normals,
            materials: geometry.materials,
            ao,
            shadows,
            fusion_error: geometry.fusion_error,
            stats,
        })
    }
}

#[inline]
fn ensure_current(token: &RenderToken) -> Result<(), RelightError> {
    if token.is_current() { Ok(()) } else { Err(RelightError::Superseded) }
}
