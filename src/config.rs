use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Renderer settings. Every field has a default, so a partial JSON object is
/// a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Background colour of both passes.
    pub clear_colour: [f32; 4],
    /// Vertical field of view in degrees.
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
    pub backface_culling: bool,
    /// Where render-to-file writes its PNG.
    pub capture_path: PathBuf,
    /// Root that relative asset paths are resolved against.
    pub asset_root: PathBuf,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            clear_colour: [0.04, 0.05, 0.07, 0.0],
            fov_y: 50.0,
            near: 0.2,
            far: 1000.0,
            backface_culling: true,
            capture_path: PathBuf::from("framebuffer_contents.png"),
            asset_root: PathBuf::from("assets"),
        }
    }
}
