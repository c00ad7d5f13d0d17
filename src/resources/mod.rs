//! Loading meshes, textures and scene manifests from disk.
//!
//! Every path is resolved relative to an asset root. The loaders are async so
//! a host can drive them on its tokio runtime.

use std::path::Path;

use anyhow::Context as _;

pub mod mesh;
pub mod scene;
pub mod texture;

pub async fn load_string(root: &Path, file_name: &str) -> anyhow::Result<String> {
    let path = root.join(file_name);
    tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("reading {}", path.display()))
}

pub async fn load_binary(root: &Path, file_name: &str) -> anyhow::Result<Vec<u8>> {
    let path = root.join(file_name);
    tokio::fs::read(&path)
        .await
        .with_context(|| format!("reading {}", path.display()))
}
