//! defer-ngin
//!
//! A small deferred-shading renderer. A geometry pass writes position,
//! normal, albedo + specular and emission of every mesh into an offscreen
//! G-buffer; a lighting pass then shades the G-buffer onto the visible target
//! with a full-screen quad.
//!
//! High-level modules
//! - `device`: the GPU seam, with a wgpu backend and a recording backend
//! - `context`: explicit binding state and the geometry pass capability
//! - `shader`: linked programs with cached uniform locations
//! - `data_structures`: meshes, the G-buffer, the screen quad and the scene
//! - `pipelines`: built-in geometry and lighting programs
//! - `render`: the two-pass render pipeline
//! - `resources`: OBJ, image and scene manifest loaders
//! - `capture`: render-to-file
//! - `flow`: window, event loop and frame clock
//!

pub mod capture;
pub mod config;
pub mod context;
pub mod data_structures;
pub mod device;
pub mod errors;
pub mod flow;
pub mod pipelines;
pub mod render;
pub mod resources;
pub mod shader;

pub use context::{GeometryPass, RenderContext};
pub use errors::{RenderError, RenderWarning};
pub use render::RenderPipeline;
