//! Resource packs: one batch of models resident in a single GPU memory
//! block.
//!
//! A pack build runs in seven steps: gather per-model offsets and
//! deduplicate materials/textures, create the three shared buffers, create
//! one image per texture plus the placeholder, plan every resource's offset
//! into one allocation, allocate and bind, upload all bytes through the
//! staging buffer, and build one descriptor set per material. A failure at
//! any step drops every sub-resource created so far; no partial pack ever
//! escapes.

use crate::error::{RenderError, Result};
use crate::material::{self, MaterialUniform, MATERIAL_UNIFORM_SIZE};
use ash::vk;
use lumen_gpu::{
    Buffer, DescriptorPool, DescriptorSetLayout, GpuContext, Image2D, ImageView2D, MemoryBlock,
    MemoryPlanner, MemoryResource, Sampler, StagingBuffer,
};
use lumen_scene::{Scene, TextureMap, Vertex};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

const VERTEX_SIZE: u64 = std::mem::size_of::<Vertex>() as u64;
const INDEX_SIZE: u64 = std::mem::size_of::<u32>() as u64;

/// RGBA bytes uploaded into the placeholder image.
const EMPTY_PIXEL: [u8; 4] = [0; 4];

/// Texture format for every uploaded image.
const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

/// Where one model's data lives inside the pack's shared buffers.
///
/// Offsets count vertices/indices, not bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct ModelOffset {
    vertex_offset: u64,
    index_offset: u64,
    index_count: u32,
    material_index: usize,
}

/// Everything about a batch that can be decided before touching the GPU:
/// per-model offsets, deduplicated material and texture lists, buffer
/// sizes, and the staging capacity the upload needs.
#[derive(Clone, Debug, PartialEq)]
struct BatchLayout {
    model_offsets: Vec<ModelOffset>,
    material_names: Vec<String>,
    texture_paths: Vec<String>,
    vertex_buffer_size: u64,
    index_buffer_size: u64,
    uniform_buffer_size: u64,
    staging_size: u64,
}

impl BatchLayout {
    /// Walk the batch in submission order, accumulating offsets and
    /// deduplicating materials (by name) and textures (by path) in
    /// first-reference order.
    ///
    /// Every model, material, and texture reference is resolved here, so a
    /// malformed batch fails before any GPU object exists.
    fn gather(batch: &[String], scene: &Scene) -> Result<Self> {
        let mut model_offsets = Vec::with_capacity(batch.len());
        let mut material_names = Vec::new();
        let mut seen_materials = HashSet::new();

        let mut vertex_offset = 0u64;
        let mut index_offset = 0u64;
        let mut staging_size = 0u64;

        for name in batch {
            let model = scene
                .models
                .get(name)
                .ok_or_else(|| RenderError::MissingModel(name.clone()))?;
            if !scene.materials.contains_key(&model.material) {
                return Err(RenderError::MissingMaterial {
                    model: name.clone(),
                    material: model.material.clone(),
                });
            }

            model_offsets.push(ModelOffset {
                vertex_offset,
                index_offset,
                index_count: model.indices.len() as u32,
                material_index: usize::MAX,
            });
            vertex_offset += model.vertices.len() as u64;
            index_offset += model.indices.len() as u64;

            staging_size = staging_size.max(model.vertex_bytes()).max(model.index_bytes());

            if seen_materials.insert(model.material.clone()) {
                material_names.push(model.material.clone());
            }
        }

        let mut texture_paths = Vec::new();
        let mut seen_textures = HashSet::new();
        for name in &material_names {
            let material = &scene.materials[name];
            for path in material.set_textures() {
                if !scene.textures.contains_key(path) {
                    return Err(RenderError::MissingTexture {
                        material: name.clone(),
                        path: path.to_owned(),
                    });
                }
                if seen_textures.insert(path.to_owned()) {
                    texture_paths.push(path.to_owned());
                }
            }
        }

        for path in &texture_paths {
            staging_size = staging_size.max(scene.textures[path].pixels().len() as u64);
        }

        let uniform_buffer_size = material_names.len() as u64 * MATERIAL_UNIFORM_SIZE;
        staging_size = staging_size
            .max(uniform_buffer_size)
            .max(EMPTY_PIXEL.len() as u64);

        let material_indices: HashMap<&str, usize> = material_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i))
            .collect();
        for (offsets, name) in model_offsets.iter_mut().zip(batch) {
            let material = &scene.models[name].material;
            offsets.material_index = material_indices[material.as_str()];
        }

        Ok(Self {
            model_offsets,
            material_names,
            texture_paths,
            vertex_buffer_size: vertex_offset * VERTEX_SIZE,
            index_buffer_size: index_offset * INDEX_SIZE,
            uniform_buffer_size,
            staging_size,
        })
    }

    /// Image count including the placeholder.
    fn image_count(&self) -> usize {
        self.texture_paths.len() + 1
    }
}

/// Resolve each texture-map slot of a material to an image index, falling
/// back to the placeholder for unset slots.
fn texture_slot_indices(
    material: &lumen_scene::Material,
    texture_indices: &HashMap<&str, usize>,
    placeholder: usize,
) -> [usize; TextureMap::COUNT] {
    let mut slots = [placeholder; TextureMap::COUNT];
    for map in TextureMap::ALL {
        if let Some(path) = material.texture(map) {
            slots[map.slot()] = texture_indices[path];
        }
    }
    slots
}

struct PackBuffers {
    vertex: Buffer,
    index: Buffer,
    uniform: Buffer,
}

/// One batch of GPU-resident geometry, textures, and material descriptors,
/// bound into a single exclusively-owned device memory allocation.
pub struct ResourcePack {
    descriptor_sets: Vec<vk::DescriptorSet>,
    // The sets above live until their pool is destroyed
    #[allow(dead_code)]
    descriptor_pool: DescriptorPool,
    // Bound into the descriptor sets; must outlive every draw
    #[allow(dead_code)]
    texture_views: Vec<ImageView2D>,
    texture_images: Vec<Image2D>,
    buffers: PackBuffers,
    memory: MemoryBlock,
    model_indices: HashMap<String, usize>,
    model_offsets: Vec<ModelOffset>,
}

impl ResourcePack {
    /// Build a pack for the named models.
    ///
    /// The scene snapshot is only read during this call; all referenced
    /// bytes are GPU-resident when it returns.
    pub fn build(
        gpu: &GpuContext,
        material_layout: &DescriptorSetLayout,
        sampler: &Sampler,
        batch: &[String],
        scene: &Scene,
    ) -> Result<Self> {
        let layout = BatchLayout::gather(batch, scene)?;
        tracing::info!(
            "building pack: {} models, {} materials, {} textures",
            batch.len(),
            layout.material_names.len(),
            layout.texture_paths.len()
        );

        let device = gpu.device();
        let queue_families =
            gpu.queue_family_indices(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER);

        let buffers = create_buffers(device, &layout, &queue_families)?;
        let texture_images = create_texture_images(device, &layout, scene, &queue_families)?;
        let memory = allocate_and_bind(gpu, &buffers, &texture_images)?;

        upload(gpu, &layout, batch, scene, &buffers, &texture_images)?;

        let mut texture_views = Vec::with_capacity(texture_images.len());
        for image in &texture_images {
            texture_views.push(ImageView2D::new(device, image, vk::ImageAspectFlags::COLOR)?);
        }

        let (descriptor_pool, descriptor_sets) = create_material_descriptors(
            device,
            material_layout,
            sampler,
            &layout,
            scene,
            &buffers.uniform,
            &texture_views,
        )?;

        let model_indices = batch
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();

        Ok(Self {
            descriptor_sets,
            descriptor_pool,
            texture_views,
            texture_images,
            buffers,
            memory,
            model_indices,
            model_offsets: layout.model_offsets,
        })
    }

    /// Index of a model inside this pack.
    #[must_use]
    pub fn model_index(&self, name: &str) -> Option<usize> {
        self.model_indices.get(name).copied()
    }

    /// Total size of the pack's memory block in bytes.
    #[must_use]
    pub fn memory_size(&self) -> vk::DeviceSize {
        self.memory.size()
    }

    /// Number of texture images, the placeholder included.
    #[must_use]
    pub fn texture_count(&self) -> usize {
        self.texture_images.len()
    }

    /// Number of material descriptor sets.
    #[must_use]
    pub fn material_count(&self) -> usize {
        self.descriptor_sets.len()
    }

    /// Bind the model's vertex/index ranges and its material's descriptor
    /// set, then issue the indexed draw.
    ///
    /// # Safety
    /// The command buffer must be recording inside the render pass, with a
    /// pipeline using `pipeline_layout` bound.
    pub(crate) unsafe fn draw(
        &self,
        device: &ash::Device,
        command: vk::CommandBuffer,
        model_index: usize,
        pipeline_layout: vk::PipelineLayout,
    ) {
        let offsets = &self.model_offsets[model_index];

        unsafe {
            device.cmd_bind_vertex_buffers(
                command,
                0,
                &[self.buffers.vertex.handle()],
                &[offsets.vertex_offset * VERTEX_SIZE],
            );
            device.cmd_bind_index_buffer(
                command,
                self.buffers.index.handle(),
                offsets.index_offset * INDEX_SIZE,
                vk::IndexType::UINT32,
            );
            device.cmd_bind_descriptor_sets(
                command,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline_layout,
                0,
                &[self.descriptor_sets[offsets.material_index]],
                &[],
            );
            device.cmd_draw_indexed(command, offsets.index_count, 1, 0, 0, 0);
        }
    }
}

fn create_buffers(
    device: &Arc<ash::Device>,
    layout: &BatchLayout,
    queue_families: &[u32],
) -> Result<PackBuffers> {
    let vertex = Buffer::new(
        device,
        layout.vertex_buffer_size,
        vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
        queue_families,
    )?;
    let index = Buffer::new(
        device,
        layout.index_buffer_size,
        vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
        queue_families,
    )?;
    let uniform = Buffer::new(
        device,
        layout.uniform_buffer_size,
        vk::BufferUsageFlags::UNIFORM_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
        queue_families,
    )?;
    Ok(PackBuffers {
        vertex,
        index,
        uniform,
    })
}

/// One image per unique texture, plus the 1x1 placeholder as the final
/// entry.
fn create_texture_images(
    device: &Arc<ash::Device>,
    layout: &BatchLayout,
    scene: &Scene,
    queue_families: &[u32],
) -> Result<Vec<Image2D>> {
    let usage = vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST;

    let mut images = Vec::with_capacity(layout.image_count());
    for path in &layout.texture_paths {
        let texture = &scene.textures[path];
        images.push(Image2D::new(
            device,
            texture.width(),
            texture.height(),
            TEXTURE_FORMAT,
            vk::ImageTiling::OPTIMAL,
            usage,
            queue_families,
        )?);
    }
    images.push(Image2D::new(
        device,
        1,
        1,
        TEXTURE_FORMAT,
        vk::ImageTiling::OPTIMAL,
        usage,
        queue_families,
    )?);
    Ok(images)
}

/// Plan one offset per resource, allocate a single device-local block
/// satisfying the combined type mask, and bind everything.
///
/// Texture requirements are walked in descending alignment order to reduce
/// internal padding.
fn allocate_and_bind(
    gpu: &GpuContext,
    buffers: &PackBuffers,
    images: &[Image2D],
) -> Result<MemoryBlock> {
    let mut planner = MemoryPlanner::new();

    let vertex_offset = planner.add(&buffers.vertex.memory_requirements());
    let index_offset = planner.add(&buffers.index.memory_requirements());
    let uniform_offset = planner.add(&buffers.uniform.memory_requirements());

    let mut image_requirements: Vec<(usize, vk::MemoryRequirements)> = images
        .iter()
        .map(MemoryResource::memory_requirements)
        .enumerate()
        .collect();
    image_requirements.sort_by(|a, b| b.1.alignment.cmp(&a.1.alignment));

    let image_offsets: Vec<(usize, vk::DeviceSize)> = image_requirements
        .iter()
        .map(|(index, requirements)| (*index, planner.add(requirements)))
        .collect();

    let memory_type = gpu.memory_type_index(
        planner.type_bits(),
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
    )?;
    let memory = MemoryBlock::allocate(gpu.device(), planner.total_size(), memory_type)?;

    unsafe {
        buffers.vertex.bind_memory(memory.handle(), vertex_offset)?;
        buffers.index.bind_memory(memory.handle(), index_offset)?;
        buffers.uniform.bind_memory(memory.handle(), uniform_offset)?;
        for (index, offset) in image_offsets {
            images[index].bind_memory(memory.handle(), offset)?;
        }
    }

    tracing::debug!(
        "pack memory block: {} bytes, type {}",
        planner.total_size(),
        memory_type
    );
    Ok(memory)
}

/// Copy every model, material record, and texture into place through one
/// bounded staging buffer.
fn upload(
    gpu: &GpuContext,
    layout: &BatchLayout,
    batch: &[String],
    scene: &Scene,
    buffers: &PackBuffers,
    images: &[Image2D],
) -> Result<()> {
    let staging = StagingBuffer::new(gpu, layout.staging_size)?;

    for (name, offsets) in batch.iter().zip(&layout.model_offsets) {
        let model = &scene.models[name];
        staging.copy_to_buffer(
            &buffers.index,
            offsets.index_offset * INDEX_SIZE,
            bytemuck::cast_slice(&model.indices),
        )?;
        staging.copy_to_buffer(
            &buffers.vertex,
            offsets.vertex_offset * VERTEX_SIZE,
            bytemuck::cast_slice(&model.vertices),
        )?;
    }

    let uniforms: Vec<MaterialUniform> = layout
        .material_names
        .iter()
        .map(|name| MaterialUniform::from(&scene.materials[name]))
        .collect();
    staging.copy_to_buffer(&buffers.uniform, 0, bytemuck::cast_slice(&uniforms))?;

    for (path, image) in layout.texture_paths.iter().zip(images) {
        staging.copy_to_image(image, scene.textures[path].pixels())?;
    }
    staging.copy_to_image(&images[layout.texture_paths.len()], &EMPTY_PIXEL)?;

    Ok(())
}

/// One descriptor set per material: six image slots (placeholder for unset
/// ones) and the material's uniform record range.
fn create_material_descriptors(
    device: &Arc<ash::Device>,
    material_layout: &DescriptorSetLayout,
    sampler: &Sampler,
    layout: &BatchLayout,
    scene: &Scene,
    uniform_buffer: &Buffer,
    views: &[ImageView2D],
) -> Result<(DescriptorPool, Vec<vk::DescriptorSet>)> {
    let material_count = layout.material_names.len();
    let pool_sizes = material::descriptor_pool_sizes(material_count as u32);
    let pool = DescriptorPool::new(device, material_count as u32, &pool_sizes)?;

    let set_layouts = vec![material_layout.handle(); material_count];
    let sets = pool.allocate(&set_layouts)?;

    let texture_indices: HashMap<&str, usize> = layout
        .texture_paths
        .iter()
        .enumerate()
        .map(|(i, path)| (path.as_str(), i))
        .collect();
    let placeholder = layout.texture_paths.len();

    for (i, name) in layout.material_names.iter().enumerate() {
        let material = &scene.materials[name];
        let slots = texture_slot_indices(material, &texture_indices, placeholder);

        let mut image_infos = [vk::DescriptorImageInfo::default(); TextureMap::COUNT];
        for (slot, &view_index) in slots.iter().enumerate() {
            image_infos[slot] = vk::DescriptorImageInfo::default()
                .sampler(sampler.handle())
                .image_view(views[view_index].handle())
                .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        }

        let buffer_info = vk::DescriptorBufferInfo::default()
            .buffer(uniform_buffer.handle())
            .offset(i as u64 * MATERIAL_UNIFORM_SIZE)
            .range(MATERIAL_UNIFORM_SIZE);

        let writes = [
            vk::WriteDescriptorSet::default()
                .dst_set(sets[i])
                .dst_binding(0)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .image_info(&image_infos),
            vk::WriteDescriptorSet::default()
                .dst_set(sets[i])
                .dst_binding(TextureMap::COUNT as u32)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .buffer_info(std::slice::from_ref(&buffer_info)),
        ];
        unsafe {
            device.update_descriptor_sets(&writes, &[]);
        }
    }

    Ok((pool, sets))
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use lumen_scene::{Material, Model, Texture};

    fn texture(width: u32, height: u32) -> Texture {
        Texture::from_rgba8(vec![0; (width * height * 4) as usize], width, height).unwrap()
    }

    fn quad(material: &str, vertex_count: usize) -> Model {
        let vertices = vec![Vertex::default(); vertex_count];
        let indices = (0..vertex_count as u32).collect();
        Model::new(material, vertices, indices)
    }

    /// One model, one material with two texture slots set.
    fn scene_one_material() -> Scene {
        let mut scene = Scene::new();
        scene.textures.insert("albedo.png".into(), texture(4, 4));
        scene.textures.insert("normal.png".into(), texture(2, 2));

        let mut m1 = Material {
            diffuse: Vec3::ONE,
            ..Material::default()
        };
        m1.set_texture(TextureMap::Diffuse, "albedo.png");
        m1.set_texture(TextureMap::Normal, "normal.png");
        scene.materials.insert("m1".into(), m1);

        scene.models.insert("a".into(), quad("m1", 4));
        scene.models.insert("b".into(), quad("m1", 6));
        scene
    }

    #[test]
    fn single_model_batch_layout() {
        let scene = scene_one_material();
        let layout = BatchLayout::gather(&["a".into()], &scene).unwrap();

        assert_eq!(layout.material_names, ["m1"]);
        // Two real textures plus the placeholder
        assert_eq!(layout.texture_paths.len(), 2);
        assert_eq!(layout.image_count(), 3);
        assert_eq!(layout.model_offsets[0].vertex_offset, 0);
        assert_eq!(layout.model_offsets[0].index_offset, 0);
        assert_eq!(layout.model_offsets[0].index_count, 4);
        assert_eq!(layout.vertex_buffer_size, 4 * VERTEX_SIZE);
        assert_eq!(layout.index_buffer_size, 4 * INDEX_SIZE);
    }

    #[test]
    fn shared_materials_are_deduplicated() {
        let scene = scene_one_material();
        let layout = BatchLayout::gather(&["a".into(), "b".into()], &scene).unwrap();

        assert_eq!(layout.material_names.len(), 1);
        assert_eq!(layout.model_offsets[0].material_index, 0);
        assert_eq!(layout.model_offsets[1].material_index, 0);
        // Exactly one uniform record
        assert_eq!(layout.uniform_buffer_size, MATERIAL_UNIFORM_SIZE);
        // Second model's offsets follow the first
        assert_eq!(layout.model_offsets[1].vertex_offset, 4);
        assert_eq!(layout.model_offsets[1].index_offset, 4);
    }

    #[test]
    fn empty_model_contributes_nothing() {
        let mut scene = scene_one_material();
        scene.models.insert("empty".into(), quad("m1", 0));

        let layout = BatchLayout::gather(&["empty".into(), "a".into()], &scene).unwrap();

        assert_eq!(layout.model_offsets[0].vertex_offset, 0);
        assert_eq!(layout.model_offsets[0].index_count, 0);
        // The following model starts where the empty one did
        assert_eq!(layout.model_offsets[1].vertex_offset, 0);
        assert_eq!(layout.model_offsets[1].index_offset, 0);
        assert_eq!(layout.vertex_buffer_size, 4 * VERTEX_SIZE);
    }

    #[test]
    fn missing_texture_fails_before_gpu_work() {
        let mut scene = scene_one_material();
        scene.textures.remove("normal.png");

        let result = BatchLayout::gather(&["a".into()], &scene);
        assert!(matches!(
            result,
            Err(RenderError::MissingTexture { material, path })
                if material == "m1" && path == "normal.png"
        ));
    }

    #[test]
    fn missing_model_and_material_are_reported() {
        let scene = scene_one_material();
        assert!(matches!(
            BatchLayout::gather(&["ghost".into()], &scene),
            Err(RenderError::MissingModel(name)) if name == "ghost"
        ));

        let mut scene = scene_one_material();
        scene.materials.remove("m1");
        assert!(matches!(
            BatchLayout::gather(&["a".into()], &scene),
            Err(RenderError::MissingMaterial { model, material })
                if model == "a" && material == "m1"
        ));
    }

    #[test]
    fn staging_size_covers_the_largest_transfer() {
        let scene = scene_one_material();
        let layout = BatchLayout::gather(&["a".into(), "b".into()], &scene).unwrap();

        // Largest single transfer: model b's vertices (6 * 32 bytes)
        assert_eq!(layout.staging_size, 6 * VERTEX_SIZE);
        assert!(layout.staging_size >= layout.uniform_buffer_size);
        assert!(layout.staging_size >= 4 * 4 * 4);
    }

    #[test]
    fn staging_size_has_a_placeholder_floor() {
        let layout = BatchLayout::gather(&[], &Scene::new()).unwrap();
        assert_eq!(layout.staging_size, EMPTY_PIXEL.len() as u64);
        assert_eq!(layout.image_count(), 1);
    }

    #[test]
    fn gathering_twice_is_deterministic() {
        let scene = scene_one_material();
        let batch: Vec<String> = vec!["b".into(), "a".into()];

        let first = BatchLayout::gather(&batch, &scene).unwrap();
        let second = BatchLayout::gather(&batch, &scene).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn unset_slots_resolve_to_the_placeholder() {
        let scene = scene_one_material();
        let layout = BatchLayout::gather(&["a".into()], &scene).unwrap();

        let texture_indices: HashMap<&str, usize> = layout
            .texture_paths
            .iter()
            .enumerate()
            .map(|(i, path)| (path.as_str(), i))
            .collect();
        let placeholder = layout.texture_paths.len();

        let slots =
            texture_slot_indices(&scene.materials["m1"], &texture_indices, placeholder);

        // Every slot resolves to a valid image index
        assert!(slots.iter().all(|&slot| slot < layout.image_count()));
        // Diffuse and normal point at real textures, the rest at the placeholder
        assert_ne!(slots[TextureMap::Diffuse.slot()], placeholder);
        assert_ne!(slots[TextureMap::Normal.slot()], placeholder);
        assert_eq!(slots[TextureMap::Metallic.slot()], placeholder);
        assert_eq!(slots[TextureMap::Roughness.slot()], placeholder);
        assert_eq!(slots[TextureMap::Ambient.slot()], placeholder);
        assert_eq!(slots[TextureMap::Emission.slot()], placeholder);
    }
}
