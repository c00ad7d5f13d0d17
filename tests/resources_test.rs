use std::path::{Path, PathBuf};

use defer_ngin::{
    data_structures::scene::ShaderSlot,
    resources::{
        mesh::{COLOR_SEED, load_mesh_obj},
        scene::{SceneManifest, WATER_SHADER, populate},
        texture::load_image,
    },
};

use crate::common::test_utils::{ready_pipeline, recording_context, render_one};
mod common;

fn manifest_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

fn fixtures() -> PathBuf {
    manifest_dir().join("tests").join("fixtures")
}

#[tokio::test]
async fn loads_triangle_fixture() {
    let data = load_mesh_obj(&fixtures(), "triangle.obj", COLOR_SEED)
        .await
        .unwrap();
    assert_eq!(data.vertex_count(), 3);
    assert_eq!(data.positions[1], [1.0, 0.0, 0.0]);
    assert_eq!(data.normals, vec![[0.0, 0.0, 1.0]; 3]);
    // v is flipped on load.
    assert_eq!(data.uvs[0], [0.0, 1.0]);
    assert_eq!(data.uvs[2], [0.0, 0.0]);
    assert_eq!(data.colors.len(), 3);
    assert!(data.colors.iter().flatten().all(|c| (0.0..1.0).contains(c)));
}

#[tokio::test]
async fn colours_are_stable_for_a_seed() {
    let a = load_mesh_obj(&fixtures(), "triangle.obj", 7).await.unwrap();
    let b = load_mesh_obj(&fixtures(), "triangle.obj", 7).await.unwrap();
    assert_eq!(a.colors, b.colors);
}

#[tokio::test]
async fn quads_are_triangulated() {
    let data = load_mesh_obj(&manifest_dir().join("assets"), "models/cube.obj", COLOR_SEED)
        .await
        .unwrap();
    assert_eq!(data.vertex_count(), 6 * 2 * 3);
}

#[tokio::test]
async fn missing_model_is_an_error() {
    let result = load_mesh_obj(&fixtures(), "nope.obj", COLOR_SEED).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn missing_texture_is_empty() {
    let image = load_image(&fixtures(), "nope.png").await;
    assert!(image.is_empty());
}

fn write_scene(root: &Path, manifest: &str) {
    std::fs::create_dir_all(root.join("models")).unwrap();
    std::fs::copy(fixtures().join("triangle.obj"), root.join("models/tri.obj")).unwrap();
    image::RgbaImage::from_pixel(2, 2, image::Rgba([200, 100, 50, 255]))
        .save(root.join("diffuse.png"))
        .unwrap();
    std::fs::write(root.join("scene.json"), manifest).unwrap();
}

#[tokio::test]
async fn populates_pipeline_from_manifest() {
    let dir = tempfile::tempdir().unwrap();
    write_scene(
        dir.path(),
        r#"{ "actors": [
            { "name": "sea", "model": "models/tri.obj", "shader": "water" },
            { "name": "sign", "model": "models/tri.obj",
              "diffuse": "diffuse.png", "emission": "missing.png",
              "translation": [0.0, 0.0, -4.0] },
            { "name": "cat", "model": "models/cat.obj", "enabled": false }
        ] }"#,
    );

    let mut ctx = recording_context(64, 64);
    let mut pipeline = ready_pipeline(&mut ctx, 64, 64);
    let manifest = SceneManifest::load(dir.path(), "scene.json").await.unwrap();
    let added = populate(&mut ctx, &mut pipeline, &manifest, dir.path())
        .await
        .unwrap();
    assert_eq!(added, 2);

    let actors = pipeline.scene().actors();
    assert_eq!(actors[0].name, "sea");
    assert_eq!(actors[0].shader, ShaderSlot::Named(WATER_SHADER.to_string()));
    assert_eq!(actors[1].name, "sign");
    assert!(actors[1].mesh.has_diffuse_texture());
    assert!(!actors[1].mesh.has_emission_texture());
    assert_eq!(actors[1].mesh.diffuse_texture().unwrap().size(), (2, 2));

    render_one(&mut ctx, &mut pipeline, 0.5);
    let fb = pipeline.gbuffer().framebuffer().unwrap();
    let geometry: Vec<_> = ctx
        .device()
        .draws()
        .filter(|d| d.target == defer_ngin::device::RenderTargetId::Framebuffer(fb))
        .cloned()
        .collect();
    assert_eq!(geometry.len(), 2);
    assert_ne!(geometry[0].program, geometry[1].program);
    pipeline.teardown(&mut ctx);
    assert_eq!(ctx.device().live_programs(), 0);
}

#[tokio::test]
async fn missing_model_aborts_population() {
    let dir = tempfile::tempdir().unwrap();
    write_scene(
        dir.path(),
        r#"{ "actors": [
            { "name": "tri", "model": "models/tri.obj" },
            { "name": "ghost", "model": "models/ghost.obj" }
        ] }"#,
    );

    let mut ctx = recording_context(64, 64);
    let mut pipeline = ready_pipeline(&mut ctx, 64, 64);
    let manifest = SceneManifest::load(dir.path(), "scene.json").await.unwrap();
    let result = populate(&mut ctx, &mut pipeline, &manifest, dir.path()).await;
    assert!(result.is_err());
    assert_eq!(pipeline.scene().len(), 1);
    pipeline.teardown(&mut ctx);
    assert_eq!(ctx.device().live_buffers(), 0);
}

#[tokio::test]
async fn shipped_scene_loads() {
    let root = manifest_dir().join("assets");
    let mut ctx = recording_context(320, 180);
    let mut pipeline = ready_pipeline(&mut ctx, 320, 180);
    let manifest = SceneManifest::load(&root, "scene.json").await.unwrap();
    let added = populate(&mut ctx, &mut pipeline, &manifest, &root).await.unwrap();
    assert_eq!(added, manifest.enabled_actors().count());
    assert!(pipeline.scene().find("lamp").unwrap().mesh.has_emission_texture());
    render_one(&mut ctx, &mut pipeline, 0.0);
    pipeline.teardown(&mut ctx);
}
