//! Bounded synchronous staging transfers.

use crate::command::CommandPool;
use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::memory::{Buffer, Image2D, MemoryBlock, MemoryResource};
use crate::sync;
use ash::vk;
use std::sync::Arc;

/// A fixed-capacity host-visible buffer used as the intermediary for every
/// CPU->GPU copy, plus the transfer command pool and fence that drive it.
///
/// Every copy is fully synchronous: the staging memory is reused for the
/// next transfer only after the fence proves the previous one completed, so
/// successive transfers never overlap.
pub struct StagingBuffer {
    device: Arc<ash::Device>,
    queue: vk::Queue,
    pool: CommandPool,
    buffer: Buffer,
    memory: MemoryBlock,
    fence: vk::Fence,
    capacity: vk::DeviceSize,
}

impl StagingBuffer {
    /// Create a staging buffer of the given capacity, backed by
    /// host-visible, host-coherent memory.
    pub fn new(gpu: &GpuContext, capacity: vk::DeviceSize) -> Result<Self> {
        let device = gpu.device().clone();
        let transfer_family = [gpu.info().queue_families.transfer];

        let buffer = Buffer::new(
            &device,
            capacity,
            vk::BufferUsageFlags::TRANSFER_SRC,
            &transfer_family,
        )?;
        let requirements = buffer.memory_requirements();
        let memory_type = gpu.memory_type_index(
            requirements.memory_type_bits,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        let memory = MemoryBlock::allocate(&device, requirements.size, memory_type)?;
        unsafe {
            buffer.bind_memory(memory.handle(), 0)?;
        }

        let pool = CommandPool::new(
            &device,
            transfer_family[0],
            vk::CommandPoolCreateFlags::TRANSIENT,
        )?;
        let fence = unsafe { sync::create_fence(&device, false)? };

        tracing::debug!("staging buffer ready, capacity {capacity} bytes");

        Ok(Self {
            device,
            queue: gpu.transfer_queue(),
            pool,
            buffer,
            memory,
            fence,
            capacity,
        })
    }

    /// Staging capacity in bytes.
    pub fn capacity(&self) -> vk::DeviceSize {
        self.capacity
    }

    /// Copy `bytes` into `dst` at `dst_offset`, blocking until the GPU copy
    /// completes.
    ///
    /// Fails before touching any device memory if the data exceeds the
    /// staging capacity or would run past the end of the destination.
    pub fn copy_to_buffer(
        &self,
        dst: &Buffer,
        dst_offset: vk::DeviceSize,
        bytes: &[u8],
    ) -> Result<()> {
        validate_buffer_copy(bytes.len() as u64, self.capacity, dst_offset, dst.size())?;
        if bytes.is_empty() {
            return Ok(());
        }

        self.write_staging(bytes)?;

        let region = vk::BufferCopy::default()
            .src_offset(0)
            .dst_offset(dst_offset)
            .size(bytes.len() as u64);

        self.submit_transfer(|device, command| unsafe {
            device.cmd_copy_buffer(command, self.buffer.handle(), dst.handle(), &[region]);
        })
    }

    /// Copy pixel data into `dst`, transitioning it UNDEFINED ->
    /// TRANSFER_DST_OPTIMAL before the copy and TRANSFER_DST_OPTIMAL ->
    /// SHADER_READ_ONLY_OPTIMAL after it. Blocks until the GPU completes.
    ///
    /// Fails before touching any device memory if the data exceeds the
    /// staging capacity or does not match the image's extent and format.
    pub fn copy_to_image(&self, dst: &Image2D, bytes: &[u8]) -> Result<()> {
        validate_image_copy(bytes.len() as u64, self.capacity, dst.byte_size())?;

        self.write_staging(bytes)?;

        let subresource_range = vk::ImageSubresourceRange::default()
            .aspect_mask(vk::ImageAspectFlags::COLOR)
            .base_mip_level(0)
            .level_count(1)
            .base_array_layer(0)
            .layer_count(1);

        let to_transfer_dst = vk::ImageMemoryBarrier::default()
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(dst.handle())
            .subresource_range(subresource_range)
            .old_layout(vk::ImageLayout::UNDEFINED)
            .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE);

        let to_shader_read = vk::ImageMemoryBarrier::default()
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(dst.handle())
            .subresource_range(subresource_range)
            .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .dst_access_mask(vk::AccessFlags::empty());

        let region = vk::BufferImageCopy::default()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(
                vk::ImageSubresourceLayers::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .mip_level(0)
                    .base_array_layer(0)
                    .layer_count(1),
            )
            .image_offset(vk::Offset3D::default())
            .image_extent(vk::Extent3D {
                width: dst.width(),
                height: dst.height(),
                depth: 1,
            });

        self.submit_transfer(|device, command| unsafe {
            device.cmd_pipeline_barrier(
                command,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::TRANSFER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[to_transfer_dst],
            );
            device.cmd_copy_buffer_to_image(
                command,
                self.buffer.handle(),
                dst.handle(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
            device.cmd_pipeline_barrier(
                command,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[to_shader_read],
            );
        })
    }

    /// Map the staging memory and copy `bytes` to its start.
    fn write_staging(&self, bytes: &[u8]) -> Result<()> {
        unsafe {
            let mapped = self.device.map_memory(
                self.memory.handle(),
                0,
                bytes.len() as u64,
                vk::MemoryMapFlags::empty(),
            )?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), mapped.cast::<u8>(), bytes.len());
            self.device.unmap_memory(self.memory.handle());
        }
        Ok(())
    }

    /// Record a one-shot transfer command, submit it, and block on the fence
    /// until it completes.
    fn submit_transfer<F>(&self, record: F) -> Result<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer),
    {
        let command = self.pool.allocate_command_buffer()?;

        unsafe {
            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            self.device.begin_command_buffer(command, &begin_info)?;
            record(&self.device, command);
            self.device.end_command_buffer(command)?;

            let commands = [command];
            let submit_info = vk::SubmitInfo::default().command_buffers(&commands);
            self.device.queue_submit(self.queue, &[submit_info], self.fence)?;

            sync::wait_for_fence(&self.device, self.fence, u64::MAX)?;
            sync::reset_fence(&self.device, self.fence)?;

            self.pool.free(&commands);
        }
        Ok(())
    }
}

impl Drop for StagingBuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.fence, None);
        }
    }
}

/// Check a buffer copy against the staging capacity and the destination
/// bounds.
fn validate_buffer_copy(
    len: u64,
    capacity: u64,
    dst_offset: u64,
    dst_size: u64,
) -> Result<()> {
    if len > capacity {
        return Err(GpuError::StagingOverflow {
            requested: len,
            capacity,
        });
    }
    if dst_offset + len > dst_size {
        return Err(GpuError::CopyOutOfBounds {
            offset: dst_offset,
            len,
            size: dst_size,
        });
    }
    Ok(())
}

/// Check an image upload against the staging capacity and the destination's
/// tightly packed pixel size.
fn validate_image_copy(len: u64, capacity: u64, expected: Option<u64>) -> Result<()> {
    if len > capacity {
        return Err(GpuError::StagingOverflow {
            requested: len,
            capacity,
        });
    }
    if let Some(expected) = expected {
        if len != expected {
            return Err(GpuError::ImageSizeMismatch {
                expected,
                actual: len,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_copy_is_rejected_before_any_device_work() {
        let result = validate_buffer_copy(1025, 1024, 0, 4096);
        assert!(matches!(
            result,
            Err(GpuError::StagingOverflow {
                requested: 1025,
                capacity: 1024
            })
        ));
    }

    #[test]
    fn copy_past_destination_end_is_rejected() {
        let result = validate_buffer_copy(512, 1024, 600, 1024);
        assert!(matches!(
            result,
            Err(GpuError::CopyOutOfBounds {
                offset: 600,
                len: 512,
                size: 1024
            })
        ));
    }

    #[test]
    fn copy_filling_destination_exactly_is_allowed() {
        assert!(validate_buffer_copy(1024, 1024, 0, 1024).is_ok());
        assert!(validate_buffer_copy(0, 1024, 1024, 1024).is_ok());
    }

    #[test]
    fn image_upload_must_match_pixel_size() {
        assert!(validate_image_copy(16, 64, Some(16)).is_ok());
        assert!(matches!(
            validate_image_copy(12, 64, Some(16)),
            Err(GpuError::ImageSizeMismatch {
                expected: 16,
                actual: 12
            })
        ));
        assert!(matches!(
            validate_image_copy(128, 64, Some(128)),
            Err(GpuError::StagingOverflow { .. })
        ));
    }
}
