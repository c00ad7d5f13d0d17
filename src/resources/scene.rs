//! JSON scene manifests.
//!
//! ```json
//! {
//!   "actors": [
//!     { "name": "water", "model": "models/water.obj", "shader": "water" },
//!     { "name": "sign", "model": "models/sign.obj",
//!       "diffuse": "textures/sign_diffuse.png",
//!       "emission": "textures/sign_emission.png",
//!       "translation": [0.0, 0.0, -10.0] },
//!     { "name": "cat", "model": "models/cat.obj", "enabled": false }
//!   ]
//! }
//! ```

use std::path::Path;

use anyhow::Context as _;
use cgmath::{Deg, Matrix4, Vector3};
use serde::{Deserialize, Serialize};

use crate::{
    context::RenderContext,
    data_structures::{mesh::MeshResource, scene::ShaderSlot},
    device::GraphicsDevice,
    errors::Result,
    pipelines::geometry::GeometryShader,
    render::RenderPipeline,
    resources::{
        load_string,
        mesh::{COLOR_SEED, load_mesh_obj},
        texture::load_image,
    },
};

/// Name the water shader is registered under.
pub const WATER_SHADER: &str = "water";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShaderKind {
    #[default]
    Default,
    Water,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorEntry {
    pub name: String,
    pub model: String,
    #[serde(default)]
    pub diffuse: Option<String>,
    #[serde(default)]
    pub emission: Option<String>,
    #[serde(default)]
    pub shader: ShaderKind,
    #[serde(default)]
    pub translation: [f32; 3],
    /// Euler angles in degrees, applied x then y then z.
    #[serde(default)]
    pub rotation: [f32; 3],
    #[serde(default = "unit_scale")]
    pub scale: f32,
    #[serde(default = "enabled")]
    pub enabled: bool,
}

fn unit_scale() -> f32 {
    1.0
}

fn enabled() -> bool {
    true
}

impl ActorEntry {
    pub fn transform(&self) -> Matrix4<f32> {
        Matrix4::from_translation(Vector3::from(self.translation))
            * Matrix4::from_angle_x(Deg(self.rotation[0]))
            * Matrix4::from_angle_y(Deg(self.rotation[1]))
            * Matrix4::from_angle_z(Deg(self.rotation[2]))
            * Matrix4::from_scale(self.scale)
    }

    pub fn shader_slot(&self) -> ShaderSlot {
        match self.shader {
            ShaderKind::Default => ShaderSlot::Default,
            ShaderKind::Water => ShaderSlot::Named(WATER_SHADER.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SceneManifest {
    pub actors: Vec<ActorEntry>,
}

impl SceneManifest {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub async fn load(root: &Path, file_name: &str) -> anyhow::Result<Self> {
        let text = load_string(root, file_name).await?;
        Self::from_json(&text).with_context(|| format!("parsing {file_name}"))
    }

    pub fn enabled_actors(&self) -> impl Iterator<Item = &ActorEntry> {
        self.actors.iter().filter(|a| a.enabled)
    }
}

/// Load every enabled actor of `manifest` into `pipeline`, in manifest order.
///
/// A model that cannot be loaded aborts population. Missing textures only
/// warn. Returns how many actors were added.
pub async fn populate<D: GraphicsDevice>(
    ctx: &mut RenderContext<D>,
    pipeline: &mut RenderPipeline,
    manifest: &SceneManifest,
    root: &Path,
) -> anyhow::Result<usize> {
    if manifest.enabled_actors().any(|a| a.shader == ShaderKind::Water) {
        let water = GeometryShader::water(ctx)?;
        pipeline.register_geometry_shader(ctx, WATER_SHADER, water)?;
    }

    let mut added = 0;
    for entry in manifest.enabled_actors() {
        let data = load_mesh_obj(root, &entry.model, COLOR_SEED)
            .await
            .with_context(|| format!("loading actor '{}'", entry.name))?;
        let mut mesh = MeshResource::from_data(ctx, &entry.name, &data)?;
        mesh.set_transform(entry.transform());

        if let Err(e) = apply_textures(ctx, &mut mesh, entry, root).await {
            mesh.release(ctx);
            return Err(e.into());
        }

        pipeline.add_actor_with_shader(ctx, &entry.name, mesh, entry.shader_slot())?;
        added += 1;
    }
    let skipped = manifest.actors.len() - added;
    log::info!("Scene populated with {} actors ({} disabled)", added, skipped);
    Ok(added)
}

async fn apply_textures<D: GraphicsDevice>(
    ctx: &mut RenderContext<D>,
    mesh: &mut MeshResource,
    entry: &ActorEntry,
    root: &Path,
) -> Result<()> {
    if let Some(path) = &entry.diffuse {
        let image = load_image(root, path).await;
        mesh.set_diffuse_texture(ctx, &image)?;
    }
    if let Some(path) = &entry.emission {
        let image = load_image(root, path).await;
        mesh.set_emission_texture(ctx, &image)?;
    }
    Ok(())
}
