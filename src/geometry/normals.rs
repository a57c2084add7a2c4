// normals.rs - Depth to surface normals
//
// Sobel 3x3 gradient (2 on the axis, 1 on the diagonals), edges replicate.
// normal = normalize(-gx * strength, -gy * strength, 1)

use rayon::prelude::*;

use crate::buffer::{DepthBuffer, NormalBuffer, normalize3};

pub const DEFAULT_NORMAL_STRENGTH: f32 = 4.0;

/// Compute unit normals from depth. Pure; no state between calls.
pub fn generate_normals(depth: &DepthBuffer, strength: f32) -> NormalBuffer {
    let (w, h) = depth.dims();
    let mut data = vec![[0.0f32, 0.0, 1.0]; w * h];
    if w == 0 || h == 0 {
        return NormalBuffer { width: w, height: h, data };
    }

    data.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        let y = y as isize;
        for (x, out) in row.iter_mut().enumerate() {
            let x = x as isize;
            let d = |dx: isize, dy: isize| depth.at(x + dx, y + dy);

            let gx = (d(1, -1) + 2.0 * d(1, 0) + d(1, 1)) - (d(-1, -1) + 2.0 * d(-1, 0) + d(-1, 1));
            let gy = (d(-1, 1) + 2.0 * d(0, 1) + d(1, 1)) - (d(-1, -1) + 2.0 * d(0, -1) + d(1, -1));

            *out = normalize3([-gx * strength, -gy * strength, 1.0]);
        }
    });

    NormalBuffer { width: w, height: h, data }
}
