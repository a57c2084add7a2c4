// scene/ - What the user configures
//
// - Virtual lights (point, directional) and global lighting parameters
// - Color temperature conversion
// - Semantic class to material lookup table

mod light;
mod material;

pub use light::*;
pub use material::*;
