//! Renderer data structures.
//!
//! - `mesh` holds GPU vertex data, textures and the transform of one model
//! - `gbuffer` is the offscreen position/normal/albedo/emission target
//! - `quad` is the lazily created full-screen quad of the lighting pass
//! - `scene` keeps actors in draw order
//! - `texture` has CPU image data and the device texture wrapper

pub mod gbuffer;
pub mod mesh;
pub mod quad;
pub mod scene;
pub mod texture;
