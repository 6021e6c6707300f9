//! GPU memory primitives.
//!
//! [`Buffer`] and [`Image2D`] are thin handles that know their own size and
//! memory requirements but carry no allocation policy: an allocator queries
//! them through [`MemoryResource`], plans offsets with [`MemoryPlanner`],
//! allocates one [`MemoryBlock`], and binds each resource at its offset.

use crate::error::Result;
use ash::vk;
use std::sync::Arc;

/// A resource that can be bound into a caller-supplied memory block.
///
/// This is the only surface through which buffers and images take part in
/// memory placement; the allocator decides offsets, the resource only
/// reports requirements and accepts a binding.
pub trait MemoryResource {
    /// Size, alignment, and memory-type compatibility of this resource.
    fn memory_requirements(&self) -> vk::MemoryRequirements;

    /// Bind this resource to `memory` at `offset`.
    ///
    /// # Safety
    /// The memory must satisfy the reported requirements, `offset` must be
    /// aligned accordingly, and the resource must not already be bound.
    unsafe fn bind_memory(&self, memory: vk::DeviceMemory, offset: vk::DeviceSize) -> Result<()>;
}

/// A GPU buffer handle plus its byte size.
pub struct Buffer {
    device: Arc<ash::Device>,
    buffer: vk::Buffer,
    size: vk::DeviceSize,
}

impl Buffer {
    /// Create an unbound buffer.
    ///
    /// Sharing mode is CONCURRENT when more than one distinct queue family
    /// will touch the buffer, EXCLUSIVE otherwise.
    pub fn new(
        device: &Arc<ash::Device>,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        queue_families: &[u32],
    ) -> Result<Self> {
        let sharing_mode = if queue_families.len() > 1 {
            vk::SharingMode::CONCURRENT
        } else {
            vk::SharingMode::EXCLUSIVE
        };

        let create_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(sharing_mode)
            .queue_family_indices(queue_families);

        let buffer = unsafe { device.create_buffer(&create_info, None)? };

        Ok(Self {
            device: device.clone(),
            buffer,
            size,
        })
    }

    /// Get the raw buffer handle.
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Buffer size in bytes.
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl MemoryResource for Buffer {
    fn memory_requirements(&self) -> vk::MemoryRequirements {
        unsafe { self.device.get_buffer_memory_requirements(self.buffer) }
    }

    unsafe fn bind_memory(&self, memory: vk::DeviceMemory, offset: vk::DeviceSize) -> Result<()> {
        unsafe {
            self.device.bind_buffer_memory(self.buffer, memory, offset)?;
        }
        Ok(())
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
        }
    }
}

/// Byte size of one texel for the formats the renderer uploads.
#[must_use]
pub fn texel_size(format: vk::Format) -> Option<vk::DeviceSize> {
    match format {
        vk::Format::R8G8B8A8_UNORM
        | vk::Format::R8G8B8A8_SRGB
        | vk::Format::B8G8R8A8_UNORM
        | vk::Format::B8G8R8A8_SRGB => Some(4),
        vk::Format::R8G8_UNORM => Some(2),
        vk::Format::R8_UNORM => Some(1),
        _ => None,
    }
}

/// A 2D GPU image handle plus its format and extent.
pub struct Image2D {
    device: Arc<ash::Device>,
    image: vk::Image,
    format: vk::Format,
    width: u32,
    height: u32,
}

impl Image2D {
    /// Create an unbound single-mip, single-layer 2D image.
    pub fn new(
        device: &Arc<ash::Device>,
        width: u32,
        height: u32,
        format: vk::Format,
        tiling: vk::ImageTiling,
        usage: vk::ImageUsageFlags,
        queue_families: &[u32],
    ) -> Result<Self> {
        let sharing_mode = if queue_families.len() > 1 {
            vk::SharingMode::CONCURRENT
        } else {
            vk::SharingMode::EXCLUSIVE
        };

        let create_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(tiling)
            .usage(usage)
            .sharing_mode(sharing_mode)
            .queue_family_indices(queue_families)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.create_image(&create_info, None)? };

        Ok(Self {
            device: device.clone(),
            image,
            format,
            width,
            height,
        })
    }

    /// Get the raw image handle.
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    /// Image format.
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Width in texels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in texels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Tightly packed pixel data size for this image, if the format's texel
    /// size is known.
    pub fn byte_size(&self) -> Option<vk::DeviceSize> {
        texel_size(self.format)
            .map(|texel| vk::DeviceSize::from(self.width) * vk::DeviceSize::from(self.height) * texel)
    }
}

impl MemoryResource for Image2D {
    fn memory_requirements(&self) -> vk::MemoryRequirements {
        unsafe { self.device.get_image_memory_requirements(self.image) }
    }

    unsafe fn bind_memory(&self, memory: vk::DeviceMemory, offset: vk::DeviceSize) -> Result<()> {
        unsafe {
            self.device.bind_image_memory(self.image, memory, offset)?;
        }
        Ok(())
    }
}

impl Drop for Image2D {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image(self.image, None);
        }
    }
}

/// A view over a whole [`Image2D`].
pub struct ImageView2D {
    device: Arc<ash::Device>,
    view: vk::ImageView,
}

impl ImageView2D {
    /// Create a view covering the image's single mip level and layer.
    pub fn new(
        device: &Arc<ash::Device>,
        image: &Image2D,
        aspect: vk::ImageAspectFlags,
    ) -> Result<Self> {
        Self::from_raw(device, image.handle(), image.format(), aspect)
    }

    /// Create a view over an image handle the caller does not own, such as
    /// a swapchain image.
    pub fn from_raw(
        device: &Arc<ash::Device>,
        image: vk::Image,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
    ) -> Result<Self> {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(aspect)
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            );

        let view = unsafe { device.create_image_view(&create_info, None)? };

        Ok(Self {
            device: device.clone(),
            view,
        })
    }

    /// Get the raw image view handle.
    pub fn handle(&self) -> vk::ImageView {
        self.view
    }
}

impl Drop for ImageView2D {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.view, None);
        }
    }
}

/// One device memory allocation, freed on drop.
pub struct MemoryBlock {
    device: Arc<ash::Device>,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
}

impl MemoryBlock {
    /// Allocate `size` bytes from the given memory type.
    pub fn allocate(
        device: &Arc<ash::Device>,
        size: vk::DeviceSize,
        memory_type_index: u32,
    ) -> Result<Self> {
        let allocate_info = vk::MemoryAllocateInfo::default()
            .allocation_size(size)
            .memory_type_index(memory_type_index);

        let memory = unsafe { device.allocate_memory(&allocate_info, None)? };

        Ok(Self {
            device: device.clone(),
            memory,
            size,
        })
    }

    /// Get the raw memory handle.
    pub fn handle(&self) -> vk::DeviceMemory {
        self.memory
    }

    /// Allocation size in bytes.
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl Drop for MemoryBlock {
    fn drop(&mut self) {
        unsafe {
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Round `value` up to the next multiple of `alignment`.
#[must_use]
pub const fn align_up(value: vk::DeviceSize, alignment: vk::DeviceSize) -> vk::DeviceSize {
    if alignment == 0 {
        value
    } else {
        value.div_ceil(alignment) * alignment
    }
}

/// Accumulates resource requirements into one allocation layout.
///
/// Each [`add`](Self::add) returns the offset at which the resource must be
/// bound; offsets respect each resource's alignment and never overlap.
/// The compatibility masks of all added resources are ANDed together, so
/// [`type_bits`](Self::type_bits) describes the memory types the whole
/// allocation may come from.
#[derive(Debug)]
pub struct MemoryPlanner {
    size: vk::DeviceSize,
    type_bits: u32,
}

impl MemoryPlanner {
    /// Create an empty plan.
    #[must_use]
    pub fn new() -> Self {
        Self {
            size: 0,
            type_bits: u32::MAX,
        }
    }

    /// Reserve space for one resource, returning its offset.
    pub fn add(&mut self, requirements: &vk::MemoryRequirements) -> vk::DeviceSize {
        let offset = align_up(self.size, requirements.alignment);
        self.size = offset + requirements.size;
        self.type_bits &= requirements.memory_type_bits;
        offset
    }

    /// Total allocation size so far.
    #[must_use]
    pub fn total_size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Combined memory-type compatibility mask.
    #[must_use]
    pub fn type_bits(&self) -> u32 {
        self.type_bits
    }
}

impl Default for MemoryPlanner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn requirements(size: u64, alignment: u64, type_bits: u32) -> vk::MemoryRequirements {
        vk::MemoryRequirements {
            size,
            alignment,
            memory_type_bits: type_bits,
        }
    }

    #[test]
    fn offsets_respect_alignment() {
        let mut planner = MemoryPlanner::new();
        let a = planner.add(&requirements(10, 4, u32::MAX));
        let b = planner.add(&requirements(3, 16, u32::MAX));
        let c = planner.add(&requirements(5, 1, u32::MAX));

        assert_eq!(a, 0);
        assert_eq!(b % 16, 0);
        assert_eq!(b, 16);
        assert_eq!(c, 19);
        assert_eq!(planner.total_size(), 24);
    }

    #[test]
    fn ranges_never_overlap() {
        let reqs = [
            requirements(13, 8, u32::MAX),
            requirements(1, 256, u32::MAX),
            requirements(300, 64, u32::MAX),
            requirements(7, 2, u32::MAX),
        ];

        let mut planner = MemoryPlanner::new();
        let ranges: Vec<(u64, u64)> = reqs
            .iter()
            .map(|r| {
                let offset = planner.add(r);
                (offset, offset + r.size)
            })
            .collect();

        for (i, a) in ranges.iter().enumerate() {
            assert_eq!(a.0 % reqs[i].alignment, 0);
            for b in &ranges[i + 1..] {
                assert!(a.1 <= b.0 || b.1 <= a.0, "ranges {a:?} and {b:?} overlap");
            }
        }
        assert_eq!(planner.total_size(), ranges.last().unwrap().1);
    }

    #[test]
    fn type_bits_are_combined() {
        let mut planner = MemoryPlanner::new();
        planner.add(&requirements(4, 4, 0b1110));
        planner.add(&requirements(4, 4, 0b0111));
        assert_eq!(planner.type_bits(), 0b0110);
    }

    #[test]
    fn align_up_rounds_to_multiples() {
        assert_eq!(align_up(0, 16), 0);
        assert_eq!(align_up(1, 16), 16);
        assert_eq!(align_up(16, 16), 16);
        assert_eq!(align_up(17, 16), 32);
        assert_eq!(align_up(5, 0), 5);
    }
}
