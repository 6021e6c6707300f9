//! Material uniform record and descriptor layout.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use lumen_gpu::{DescriptorSetLayout, DescriptorSetLayoutBuilder, Result};
use lumen_scene::{Material, TextureMap};
use std::sync::Arc;

/// Per-material uniform record, laid out byte-for-byte as the fragment
/// shader expects: three 16-byte-aligned vec3 fields, two scalars, padded
/// to a 16-byte multiple.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct MaterialUniform {
    /// Diffuse reflectance color.
    pub diffuse: Vec3,
    _pad0: f32,
    /// Ambient reflectance color.
    pub ambient: Vec3,
    _pad1: f32,
    /// Emitted color.
    pub emission: Vec3,
    /// Surface roughness.
    pub roughness: f32,
    /// Metalness.
    pub metalness: f32,
    _pad2: [f32; 3],
}

impl From<&Material> for MaterialUniform {
    fn from(material: &Material) -> Self {
        Self {
            diffuse: material.diffuse,
            ambient: material.ambient,
            emission: material.emission,
            roughness: material.roughness,
            metalness: material.metalness,
            ..Self::default()
        }
    }
}

/// Byte size of one material record.
pub const MATERIAL_UNIFORM_SIZE: vk::DeviceSize = std::mem::size_of::<MaterialUniform>() as u64;

/// The material descriptor set layout: one combined image/sampler slot per
/// texture-map kind (bindings 0..=5), then the uniform record (binding 6),
/// all read by the fragment stage.
pub fn descriptor_set_layout(device: &Arc<ash::Device>) -> Result<DescriptorSetLayout> {
    let mut builder = DescriptorSetLayoutBuilder::new();
    for map in TextureMap::ALL {
        builder = builder.sampled_image(map.slot() as u32, vk::ShaderStageFlags::FRAGMENT);
    }
    builder
        .uniform_buffer(TextureMap::COUNT as u32, vk::ShaderStageFlags::FRAGMENT)
        .build(device)
}

/// Pool sizes needed to allocate `count` material descriptor sets.
#[must_use]
pub fn descriptor_pool_sizes(count: u32) -> [vk::DescriptorPoolSize; 2] {
    [
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: count,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: count * TextureMap::COUNT as u32,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::offset_of;

    #[test]
    fn uniform_matches_the_shader_block_layout() {
        assert_eq!(std::mem::size_of::<MaterialUniform>(), 64);
        assert_eq!(offset_of!(MaterialUniform, diffuse), 0);
        assert_eq!(offset_of!(MaterialUniform, ambient), 16);
        assert_eq!(offset_of!(MaterialUniform, emission), 32);
        assert_eq!(offset_of!(MaterialUniform, roughness), 44);
        assert_eq!(offset_of!(MaterialUniform, metalness), 48);
    }

    #[test]
    fn uniform_copies_material_properties() {
        let mut material = Material {
            diffuse: Vec3::new(0.1, 0.2, 0.3),
            ambient: Vec3::new(0.4, 0.5, 0.6),
            emission: Vec3::new(0.7, 0.8, 0.9),
            roughness: 0.25,
            metalness: 0.5,
            ..Material::default()
        };
        material.set_texture(TextureMap::Diffuse, "unused.png");

        let uniform = MaterialUniform::from(&material);
        assert_eq!(uniform.diffuse, material.diffuse);
        assert_eq!(uniform.ambient, material.ambient);
        assert_eq!(uniform.emission, material.emission);
        assert_eq!(uniform.roughness, 0.25);
        assert_eq!(uniform.metalness, 0.5);
    }

    #[test]
    fn pool_sizes_cover_every_material_slot() {
        let sizes = descriptor_pool_sizes(3);
        assert_eq!(sizes[0].descriptor_count, 3);
        assert_eq!(sizes[1].descriptor_count, 18);
    }
}
