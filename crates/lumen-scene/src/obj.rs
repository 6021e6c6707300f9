//! Wavefront OBJ/MTL loading.
//!
//! Models are keyed `<file stem>.<object name>`, materials
//! `<file stem>.<material name>`; textures are keyed by their resolved
//! path. MTL PBR extension keys (`Pr`, `Pm`, `Ke`, `map_Pr`, `map_Pm`,
//! `map_Ke`) are read from the parser's unknown-parameter map.

use crate::error::Result;
use crate::material::{Material, TextureMap};
use crate::model::Model;
use crate::scene::Scene;
use crate::texture::Texture;
use crate::vertex::Vertex;
use glam::{Vec2, Vec3};
use std::path::Path;

/// Load an OBJ file (and its MTL library) into the scene.
///
/// Returns the names of the models that were added, in file order.
/// Textures referenced by the materials are decoded eagerly so the
/// resulting scene is a complete snapshot.
pub fn load_obj(path: impl AsRef<Path>, scene: &mut Scene) -> Result<Vec<String>> {
    let path = path.as_ref();
    let options = tobj::LoadOptions {
        triangulate: true,
        single_index: true,
        ..tobj::LoadOptions::default()
    };
    let (obj_models, obj_materials) = tobj::load_obj(path, &options)?;
    let obj_materials = obj_materials?;

    let stem = path
        .file_stem()
        .map_or_else(|| "model".to_owned(), |s| s.to_string_lossy().into_owned());
    let root = path.parent().unwrap_or_else(|| Path::new(""));

    let mut material_names = Vec::with_capacity(obj_materials.len());
    for (i, obj_material) in obj_materials.iter().enumerate() {
        let name = if obj_material.name.is_empty() {
            format!("{stem}.mat{i}")
        } else {
            format!("{stem}.{}", obj_material.name)
        };
        if !scene.materials.contains_key(&name) {
            let material = convert_material(root, obj_material);
            load_material_textures(scene, &material)?;
            scene.materials.insert(name.clone(), material);
        }
        material_names.push(name);
    }

    let mut loaded = Vec::with_capacity(obj_models.len());
    for obj_model in &obj_models {
        let mesh = &obj_model.mesh;
        let material = match mesh.material_id {
            Some(id) => material_names[id].clone(),
            None => default_material(scene, &stem),
        };
        let name = format!("{stem}.{}", obj_model.name);
        let model = Model::new(material, build_vertices(mesh), mesh.indices.clone());
        scene.models.insert(name.clone(), model);
        loaded.push(name);
    }

    tracing::info!(
        "loaded {} models and {} materials from {:?}",
        loaded.len(),
        material_names.len(),
        path
    );
    Ok(loaded)
}

fn load_material_textures(scene: &mut Scene, material: &Material) -> Result<()> {
    for texture_path in material.set_textures() {
        if !scene.textures.contains_key(texture_path) {
            let texture = Texture::load(texture_path)?;
            scene.textures.insert(texture_path.to_owned(), texture);
        }
    }
    Ok(())
}

fn convert_material(root: &Path, m: &tobj::Material) -> Material {
    let mut material = Material {
        diffuse: m.diffuse.map_or(Vec3::splat(0.8), Vec3::from),
        ambient: m.ambient.map_or(Vec3::ZERO, Vec3::from),
        emission: parse_vec3(m.unknown_param.get("Ke")).unwrap_or(Vec3::ZERO),
        roughness: parse_f32(m.unknown_param.get("Pr")).unwrap_or(1.0),
        metalness: parse_f32(m.unknown_param.get("Pm")).unwrap_or(0.0),
        textures: Default::default(),
    };

    let slots = [
        (TextureMap::Diffuse, m.diffuse_texture.as_deref()),
        (TextureMap::Normal, m.normal_texture.as_deref()),
        (
            TextureMap::Metallic,
            m.unknown_param.get("map_Pm").map(String::as_str),
        ),
        (
            TextureMap::Roughness,
            m.unknown_param.get("map_Pr").map(String::as_str),
        ),
        (TextureMap::Ambient, m.ambient_texture.as_deref()),
        (
            TextureMap::Emission,
            m.unknown_param.get("map_Ke").map(String::as_str),
        ),
    ];
    for (map, file) in slots {
        if let Some(file) = file {
            material.set_texture(map, root.join(file).to_string_lossy().into_owned());
        }
    }
    material
}

/// Name of the fallback material used by shapes without a `usemtl`,
/// inserting it into the scene on first use.
fn default_material(scene: &mut Scene, stem: &str) -> String {
    let name = format!("{stem}.default");
    scene
        .materials
        .entry(name.clone())
        .or_insert_with(|| Material {
            diffuse: Vec3::splat(0.8),
            roughness: 1.0,
            ..Material::default()
        });
    name
}

fn build_vertices(mesh: &tobj::Mesh) -> Vec<Vertex> {
    let count = mesh.positions.len() / 3;
    let mut vertices = Vec::with_capacity(count);
    for i in 0..count {
        let mut vertex = Vertex {
            position: Vec3::new(
                mesh.positions[3 * i],
                mesh.positions[3 * i + 1],
                mesh.positions[3 * i + 2],
            ),
            ..Vertex::default()
        };
        if !mesh.normals.is_empty() {
            vertex.normal = Vec3::new(
                mesh.normals[3 * i],
                mesh.normals[3 * i + 1],
                mesh.normals[3 * i + 2],
            );
        }
        if !mesh.texcoords.is_empty() {
            vertex.uv = Vec2::new(mesh.texcoords[2 * i], mesh.texcoords[2 * i + 1]);
        }
        vertices.push(vertex);
    }
    vertices
}

fn parse_f32(value: Option<&String>) -> Option<f32> {
    value?.trim().parse().ok()
}

fn parse_vec3(value: Option<&String>) -> Option<Vec3> {
    let mut parts = value?.split_whitespace();
    let x = parts.next()?.parse().ok()?;
    let y = parts.next()?.parse().ok()?;
    let z = parts.next()?.parse().ok()?;
    Some(Vec3::new(x, y, z))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const OBJ: &str = "\
mtllib tri.mtl
o tri
v 0 0 0
v 1 0 0
v 0 1 0
vn 0 0 1
vt 0 0
vt 1 0
vt 0 1
usemtl painted
f 1/1/1 2/2/1 3/3/1
";

    const MTL: &str = "\
newmtl painted
Kd 0.5 0.5 0.5
Pr 0.25
Pm 0.75
Ke 1 0 0
";

    #[test]
    fn loads_triangle_with_pbr_material() {
        let dir = std::env::temp_dir().join(format!("lumen-obj-test-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("tri.obj"), OBJ).unwrap();
        fs::write(dir.join("tri.mtl"), MTL).unwrap();

        let mut scene = Scene::new();
        let loaded = load_obj(dir.join("tri.obj"), &mut scene).unwrap();

        assert_eq!(loaded, ["tri.tri"]);
        let model = &scene.models["tri.tri"];
        assert_eq!(model.material, "tri.painted");
        assert_eq!(model.vertices.len(), 3);
        assert_eq!(model.indices.len(), 3);
        assert_eq!(model.vertices[1].position, Vec3::new(1.0, 0.0, 0.0));

        let material = &scene.materials["tri.painted"];
        assert_eq!(material.diffuse, Vec3::splat(0.5));
        assert_eq!(material.emission, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(material.roughness, 0.25);
        assert_eq!(material.metalness, 0.75);
        assert!(material.set_textures().next().is_none());

        fs::remove_dir_all(&dir).unwrap();
    }
}
