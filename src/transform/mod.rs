// transform/ - Geometric edits applied to the source image
//
// - Homography resampling (perspective correction, keystone)

mod perspective;

pub use perspective::*;
