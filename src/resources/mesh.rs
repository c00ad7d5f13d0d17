use std::{
    io::{BufReader, Cursor},
    path::Path,
};

use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};

use crate::{data_structures::mesh::MeshData, resources::load_string};

/// Seed for the per-vertex colours, so a model looks the same every run.
pub const COLOR_SEED: u64 = 0x5EED;

/// Load every model of an OBJ file as one flat triangle list.
///
/// Faces are triangulated and de-indexed, `v` is flipped so texture rows run
/// top to bottom, and each vertex gets a random colour. Missing normals are
/// replaced by face normals. A file without geometry is an error; nothing is
/// made up in its place.
pub async fn load_mesh_obj(root: &Path, file_name: &str, seed: u64) -> anyhow::Result<MeshData> {
    let obj_text = load_string(root, file_name).await?;
    let mut obj_reader = BufReader::new(Cursor::new(obj_text));

    // Materials are not used; textures come from the scene manifest.
    let (models, _materials) = tobj::load_obj_buf_async(
        &mut obj_reader,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
        |_| async { Err(tobj::LoadError::OpenFileFailed) },
    )
    .await?;

    let mut data = MeshData::default();
    for model in &models {
        append_mesh(&mut data, &model.mesh);
    }
    if data.positions.is_empty() {
        anyhow::bail!("{file_name} contains no triangles");
    }

    let mut rng = StdRng::seed_from_u64(seed);
    data.colors = (0..data.positions.len())
        .map(|_| {
            [
                rng.random_range(0.0..1.0f32),
                rng.random_range(0.0..1.0f32),
                rng.random_range(0.0..1.0f32),
            ]
        })
        .collect();

    log::info!(
        "Loaded {} with {} models and {} vertices",
        file_name,
        models.len(),
        data.positions.len()
    );
    Ok(data)
}

fn append_mesh(data: &mut MeshData, mesh: &tobj::Mesh) {
    for triangle in mesh.indices.chunks_exact(3) {
        let corners = [triangle[0], triangle[1], triangle[2]].map(|i| i as usize);
        let positions = corners.map(|i| {
            [
                mesh.positions[3 * i],
                mesh.positions[3 * i + 1],
                mesh.positions[3 * i + 2],
            ]
        });
        let flat = face_normal(&positions);
        for (corner, position) in corners.into_iter().zip(positions) {
            data.positions.push(position);
            data.uvs.push(if mesh.texcoords.len() >= 2 * corner + 2 {
                [mesh.texcoords[2 * corner], 1.0 - mesh.texcoords[2 * corner + 1]]
            } else {
                [0.0, 0.0]
            });
            data.normals.push(if mesh.normals.len() >= 3 * corner + 3 {
                [
                    mesh.normals[3 * corner],
                    mesh.normals[3 * corner + 1],
                    mesh.normals[3 * corner + 2],
                ]
            } else {
                flat
            });
        }
    }
}

fn face_normal(p: &[[f32; 3]; 3]) -> [f32; 3] {
    use cgmath::{InnerSpace, Vector3};
    let a = Vector3::from(p[0]);
    let b = Vector3::from(p[1]);
    let c = Vector3::from(p[2]);
    let n = (b - a).cross(c - a);
    if n.magnitude2() > 0.0 {
        n.normalize().into()
    } else {
        [0.0, 0.0, 1.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn face_normal_follows_counter_clockwise_winding() {
        let n = face_normal(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
        assert_eq!(n, [0.0, 0.0, 1.0]);
    }

    #[test]
    fn degenerate_triangle_gets_a_unit_normal() {
        let n = face_normal(&[[1.0, 1.0, 1.0]; 3]);
        assert_eq!(n, [0.0, 0.0, 1.0]);
    }

    #[test]
    fn append_mesh_flips_v_and_fills_missing_normals() {
        let mesh = tobj::Mesh {
            positions: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            texcoords: vec![0.0, 0.0, 1.0, 0.25, 0.0, 1.0],
            indices: vec![0, 1, 2],
            ..Default::default()
        };
        let mut data = MeshData::default();
        append_mesh(&mut data, &mesh);
        assert_eq!(data.positions.len(), 3);
        assert_eq!(data.uvs, vec![[0.0, 1.0], [1.0, 0.75], [0.0, 0.0]]);
        assert!(data.normals.iter().all(|n| *n == [0.0, 0.0, 1.0]));
    }
}
