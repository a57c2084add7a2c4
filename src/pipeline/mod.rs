// pipeline/ - Stage wiring and scheduling
//
// depth + segmentation -> fuser -> {refined depth, normals, materials}
//                      -> {shadow buffers per light, AO} -> compositor
//
// `compute_frame` is the pure, cache-free path. `RelightSession` runs the
// same stages but memoizes the expensive ones across interactive edits.

mod cancel;
mod session;

pub use cancel::*;
pub use session::*;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::buffer::{AoBuffer, DepthBuffer, MaterialBuffer, NormalBuffer, PixelBuffer, ShadowBuffer, check_dims};
use crate::error::RelightError;
use crate::geometry::{DEFAULT_NORMAL_STRENGTH, DepthSegmentationFuser, FuseParams, SegmentationResult, generate_normals};
use crate::scene::{Light, LightId, LightingParams, MaterialTable};
use crate::shade::{
    AmbientOcclusionComputer, AoParams, CompositeInputs, Quality, ShadedLight, ShadowMapComputer, ShadowParams, composite,
};

/// Algorithm parameters that are not user-facing lighting controls
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub fuse: FuseParams,
    pub shadow: ShadowParams,
    pub ao: AoParams,
    pub quality: Quality,
    /// Strength for depth-only normals (no segmentation, or fusion failed)
    pub normal_strength: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fuse: FuseParams::default(),
            shadow: ShadowParams::default(),
            ao: AoParams::default(),
            quality: Quality::Full,
            normal_strength: DEFAULT_NORMAL_STRENGTH,
        }
    }
}

/// Depth-derived surface description shared by every later stage
#[derive(Clone, Debug)]
pub struct Geometry {
    pub depth: Arc<DepthBuffer>,
    pub normals: Arc<NormalBuffer>,
    /// None when no segmentation was fused
    pub materials: Option<Arc<MaterialBuffer>>,
    /// Why fusion was skipped, when segmentation was supplied but unusable
    pub fusion_error: Option<String>,
}

/// Fuse depth with segmentation, falling back to depth-only normals
/// (and no material map) when there is no segmentation or it is malformed.
pub fn derive_geometry(
    depth: &DepthBuffer,
    segmentation: Option<&SegmentationResult>,
    fuser: &DepthSegmentationFuser,
    normal_strength: f32,
) -> Geometry {
    let depth_only = |fusion_error: Option<String>| Geometry {
        depth: Arc::new(depth.clone()),
        normals: Arc::new(generate_normals(depth, normal_strength)),
        materials: None,
        fusion_error,
    };

    let Some(seg) = segmentation else {
        return depth_only(None);
    };

    match fuser.fuse(depth, seg) {
        Ok(fused) => Geometry {
            depth: Arc::new(fused.refined_depth),
            normals: Arc::new(fused.normals),
            materials: Some(Arc::new(fused.materials)),
            fusion_error: None,
        },
        Err(e) => {
            log::warn!("segmentation fusion failed, using depth-only normals: {}", e);
            depth_only(Some(e.to_string()))
        }
    }
}

/// Everything one pure compute pass needs
#[derive(Clone, Copy, Debug)]
pub struct FrameInputs<'a> {
    pub albedo: &'a PixelBuffer,
    pub depth: Option<&'a DepthBuffer>,
    pub segmentation: Option<&'a SegmentationResult>,
    pub lights: &'a [(LightId, Light)],
    pub params: &'a LightingParams,
    pub config: &'a EngineConfig,
    pub materials: &'a Arc<MaterialTable>,
}

/// Which stages actually ran for a frame
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub geometry_recomputed: bool,
    pub ao_recomputed: bool,
    pub shadows_recomputed: Vec<LightId>,
    pub shadows_reused: Vec<LightId>,
}

#[derive(Clone, Debug)]
pub struct Frame {
    pub image: PixelBuffer,
    pub refined_depth: Arc<DepthBuffer>,
    pub normals: Arc<NormalBuffer>,
    pub materials: Option<Arc<MaterialBuffer>>,
    pub ao: Arc<AoBuffer>,
    pub shadows: BTreeMap<LightId, Arc<ShadowBuffer>>,
    pub fusion_error: Option<String>,
    pub stats: FrameStats,
}

/// Run every stage from scratch. Deterministic and free of side effects.
pub fn compute_frame(inputs: &FrameInputs) -> Result<Frame, RelightError> {
    let depth = inputs.depth.ok_or(RelightError::NoDepthAvailable)?;
    check_dims(inputs.albedo.dims(), depth.dims())?;
    let config = inputs.config;

    let fuser = DepthSegmentationFuser::new(Arc::clone(inputs.materials), config.fuse);
    let geometry = derive_geometry(depth, inputs.segmentation, &fuser, config.normal_strength);

    let ao = Arc::new(AmbientOcclusionComputer::new(config.ao).compute(&geometry.depth, config.quality));

    let shadow_computer = ShadowMapComputer::new(config.shadow);
    let shadows: BTreeMap<LightId, Arc<ShadowBuffer>> = inputs
        .lights
        .iter()
        .map(|(id, light)| {
            let buf = shadow_computer.compute(&geometry.depth, light, inputs.params.shadow_softness, config.quality);
            (*id, Arc::new(buf))
        })
        .collect();

    let image = render_composite(inputs.albedo, &geometry, &ao, inputs.lights, &shadows, inputs.params)?;

    Ok(Frame {
        image,
        refined_depth: geometry.depth,
        normals: geometry.normals,
        materials: geometry.materials,
        ao,
        fusion_error: geometry.fusion_error,
        stats: FrameStats {
            geometry_recomputed: true,
            ao_recomputed: true,
            shadows_recomputed: shadows.keys().copied().collect(),
            shadows_reused: Vec::new(),
        },
        shadows,
    })
}

pub(crate) fn render_composite(
    albedo: &PixelBuffer,
    geometry: &Geometry,
    ao: &AoBuffer,
    lights: &[(LightId, Light)],
    shadows: &BTreeMap<LightId, Arc<ShadowBuffer>>,
    params: &LightingParams,
) -> Result<PixelBuffer, RelightError> {
    let shaded: Vec<ShadedLight> = lights
        .iter()
        .map(|(id, light)| ShadedLight { light, shadow: shadows.get(id).map(|s| s.as_ref()) })
        .collect();

    composite(
        &CompositeInputs {
            albedo,
            normals: &geometry.normals,
            materials: geometry.materials.as_deref(),
            ao: Some(ao),
            lights: &shaded,
        },
        params,
    )
}
