// relight - Relight a photo from its depth map
//
// Pipeline:
//   1. Load photo + depth (+ optional segmentation masks, material table)
//   2. Fuse depth with segmentation, or derive normals from depth alone
//   3. Shadow buffers per light, ambient occlusion
//   4. Composite and write relit.png plus debug maps
//
// Usage: cargo run --bin relight -- <image> --depth <png> [--mask label=png]...
//        [--materials table.json] [--config engine.json]
//        [--point x,y,z,intensity]... [--directional dx,dy,intensity]...
//        [--ambient f] [--shadow-strength f] [--softness f] [--brightness f]
//        [--temperature k] [--flat f] [--rim] [--contact-hardening]
//        [--invert-depth] [--preview] [--out dir]

mod io;

use std::path::PathBuf;
use std::sync::Arc;
use std::{env, fs, process};

use relight_engine::error::RelightError;
use relight_engine::geometry::SegmentationResult;
use relight_engine::pipeline::{EngineConfig, FrameInputs, compute_frame};
use relight_engine::scene::{Light, LightId, LightingParams, MaterialTable};
use relight_engine::shade::{Quality, ShadowSoftening};

const USAGE: &str = "<image> --depth <png> [--mask label=png]... [--materials json] [--config json] \
[--point x,y,z,i]... [--directional dx,dy,i]... [--ambient f] [--shadow-strength f] [--softness f] \
[--brightness f] [--temperature k] [--flat f] [--rim] [--contact-hardening] [--invert-depth] [--preview] [--out dir]";

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Could not encode {0}")]
    Encode(String),

    #[error(transparent)]
    Relight(#[from] RelightError),
}

struct Args {
    image: String,
    depth: Option<String>,
    masks: Vec<(String, String)>,
    materials: Option<String>,
    config: Option<String>,
    lights: Vec<Light>,
    params: LightingParams,
    contact_hardening: bool,
    invert_depth: bool,
    preview: bool,
    out: PathBuf,
}

fn main() {
    env_logger::init();

    let argv: Vec<String> = env::args().collect();
    if argv.len() < 2 {
        eprintln!("Usage: {} {}", argv[0], USAGE);
        process::exit(1);
    }

    if let Err(e) = parse_args(&argv[1..]).and_then(run) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn parse_args(argv: &[String]) -> Result<Args, CliError> {
    let mut args = Args {
        image: argv[0].clone(),
        depth: None,
        masks: Vec::new(),
        materials: None,
        config: None,
        lights: Vec::new(),
        params: LightingParams::default(),
        contact_hardening: false,
        invert_depth: false,
        preview: false,
        out: PathBuf::from("."),
    };

    let mut i = 1;
    while i < argv.len() {
        let flag = argv[i].as_str();
        let value = || argv.get(i + 1).cloned().ok_or_else(|| CliError::Usage(format!("{} needs a value", flag)));
        let mut step = 2;
        match flag {
            "--depth" => args.depth = Some(value()?),
            "--mask" => {
                let v = value()?;
                let (label, path) =
                    v.split_once('=').ok_or_else(|| CliError::Usage(format!("--mask expects label=path, got {}", v)))?;
                args.masks.push((label.to_string(), path.to_string()));
            }
            "--materials" => args.materials = Some(value()?),
            "--config" => args.config = Some(value()?),
            "--point" => {
                let v = floats(flag, &value()?, 4)?;
                args.lights.push(Light::point(v[0], v[1], v[2], v[3]));
            }
            "--directional" => {
                let v = floats(flag, &value()?, 3)?;
                args.lights.push(Light::directional(v[0], v[1], v[2]));
            }
            "--ambient" => args.params.ambient = float(flag, &value()?)?,
            "--shadow-strength" => args.params.shadow_strength = float(flag, &value()?)?,
            "--softness" => args.params.shadow_softness = float(flag, &value()?)?.max(0.0),
            "--brightness" => args.params.brightness = float(flag, &value()?)?,
            "--temperature" => args.params.color_temperature = float(flag, &value()?)?,
            "--flat" => {
                args.params.flat_profile.enabled = true;
                args.params.flat_profile.strength = float(flag, &value()?)?.clamp(0.0, 1.0);
            }
            "--out" => args.out = PathBuf::from(value()?),
            "--rim" => {
                args.params.rim_light = true;
                step = 1;
            }
            "--contact-hardening" => {
                args.contact_hardening = true;
                step = 1;
            }
            "--invert-depth" => {
                args.invert_depth = true;
                step = 1;
            }
            "--preview" => {
                args.preview = true;
                step = 1;
            }
            other => return Err(CliError::Usage(format!("unknown flag {}", other))),
        }
        i += step;
    }

    Ok(args)
}

fn float(flag: &str, s: &str) -> Result<f32, CliError> {
    s.trim().parse().map_err(|_| CliError::Usage(format!("{}: not a number: {}", flag, s)))
}

fn floats(flag: &str, s: &str, n: usize) -> Result<Vec<f32>, CliError> {
    let v = s.split(',').map(|p| float(flag, p)).collect::<Result<Vec<_>, _>>()?;
    if v.len() != n {
        return Err(CliError::Usage(format!("{} expects {} comma-separated values, got {}", flag, n, v.len())));
    }
    Ok(v)
}

fn run(args: Args) -> Result<(), CliError> {
    let depth_path = args.depth.as_deref().ok_or(RelightError::NoDepthAvailable)?;

    println!("Processing {}...", args.image);
    let albedo = io::load_image(&args.image)?;
    let (w, h) = albedo.dims();

    println!("  Loading depth...");
    let depth = io::load_depth(depth_path, w, h, args.invert_depth)?;

    let segmentation = if args.masks.is_empty() {
        None
    } else {
        println!("  Loading {} segmentation masks...", args.masks.len());
        let segments = args
            .masks
            .iter()
            .enumerate()
            .map(|(id, (label, path))| io::load_mask(label, id as u32, path))
            .collect::<Result<Vec<_>, _>>()?;
        Some(SegmentationResult::new(segments))
    };

    let table = match &args.materials {
        Some(path) => MaterialTable::from_json(&fs::read_to_string(path)?)?,
        None => MaterialTable::builtin(),
    };

    let mut config = match &args.config {
        Some(path) => serde_json::from_str::<EngineConfig>(&fs::read_to_string(path)?)?,
        None => EngineConfig::default(),
    };
    if args.contact_hardening {
        config.shadow.softening = ShadowSoftening::ContactHardening;
    }
    if args.preview {
        config.quality = Quality::Preview;
    }

    let lights: Vec<(LightId, Light)> =
        args.lights.iter().enumerate().map(|(i, l)| (LightId(i as u32 + 1), *l)).collect();

    println!("  Computing geometry, shadows ({} lights) and ambient occlusion...", lights.len());
    let frame = compute_frame(&FrameInputs {
        albedo: &albedo,
        depth: Some(&depth),
        segmentation: segmentation.as_ref(),
        lights: &lights,
        params: &args.params,
        config: &config,
        materials: &Arc::new(table),
    })?;
    if let Some(reason) = &frame.fusion_error {
        println!("    Segmentation unusable ({}), fell back to depth-only normals", reason);
    }

    println!("  Writing outputs to {}...", args.out.display());
    fs::create_dir_all(&args.out)?;
    io::save_rgba(&args.out, "relit.png", &frame.image)?;
    io::save_gray(&args.out, "depth.png", w, h, frame.refined_depth.to_gray8())?;
    io::save_rgba(&args.out, "normals.png", &frame.normals.encode_rgba8())?;
    io::save_gray(&args.out, "ao.png", w, h, frame.ao.to_gray8())?;
    if let Some(materials) = &frame.materials {
        io::save_rgba(&args.out, "materials.png", &materials.to_rgba8())?;
    }
    for (id, shadow) in &frame.shadows {
        io::save_gray(&args.out, &format!("shadow_{}.png", id.0), w, h, shadow.to_gray8())?;
    }

    println!("Done!");
    Ok(())
}
