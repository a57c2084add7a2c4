// geometry/ - Surface reconstruction from depth
//
// - Segmentation masks as delivered by the segmentation collaborator
// - Depth-only normals (Sobel)
// - Depth + segmentation fusion: refined depth, normals, materials

mod fuse;
mod normals;
mod segmentation;

pub use fuse::*;
pub use normals::*;
pub use segmentation::*;
