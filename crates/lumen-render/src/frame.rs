//! Frame scheduling: the presentable image ring and its synchronization.

use crate::error::Result;
use ash::vk;
use lumen_gpu::error::GpuError;
use lumen_gpu::sync;
use lumen_gpu::{
    CommandPool, GpuContext, Image2D, ImageView2D, MemoryBlock, MemoryResource, RenderPass,
    SurfaceContext,
};
use std::sync::Arc;

/// Everything the orchestrator needs to record and submit one frame.
///
/// Created by [`FrameScheduler::acquire_image`], consumed by the submit and
/// present of the same frame; never persisted.
pub struct FrameState {
    pub(crate) image_index: u32,
    pub(crate) framebuffer: vk::Framebuffer,
    pub(crate) draw_ready: vk::Semaphore,
    pub(crate) draw_finished: vk::Semaphore,
    pub(crate) submit_fence: vk::Fence,
    pub(crate) command: vk::CommandBuffer,
}

/// The swapchain ring: `K` presentable images, each with its framebuffer,
/// reuse fence, semaphore pair, and command buffer, plus one shared depth
/// buffer. At most `K` frames are ever in flight; the fence wait in
/// [`acquire_image`](Self::acquire_image) is what keeps the CPU from
/// overwriting a command buffer or image the GPU is still reading.
pub struct FrameScheduler {
    device: Arc<ash::Device>,
    present_queue: vk::Queue,
    extent: vk::Extent2D,
    current_frame: usize,
    commands: Vec<vk::CommandBuffer>,
    // Owns every command buffer in `commands`
    #[allow(dead_code)]
    command_pool: CommandPool,
    sync: Vec<FrameSync>,
    framebuffers: Vec<Framebuffer>,
    // Attached to every framebuffer
    #[allow(dead_code)]
    depth: DepthBuffer,
    // Attached to the framebuffers; destroyed before the swapchain
    #[allow(dead_code)]
    image_views: Vec<ImageView2D>,
    swapchain: Swapchain,
}

impl FrameScheduler {
    /// Build the ring for the current surface state.
    pub fn new(
        gpu: &GpuContext,
        surface: &SurfaceContext,
        render_pass: &RenderPass,
    ) -> Result<Self> {
        let device = gpu.device().clone();

        let swapchain = Swapchain::new(gpu, surface)?;
        let images = unsafe {
            swapchain
                .loader
                .get_swapchain_images(swapchain.handle)
                .map_err(GpuError::from)?
        };
        tracing::info!(
            "swapchain: {} images, {}x{}",
            images.len(),
            swapchain.extent.width,
            swapchain.extent.height
        );

        let mut image_views = Vec::with_capacity(images.len());
        for &image in &images {
            image_views.push(ImageView2D::from_raw(
                &device,
                image,
                swapchain.format,
                vk::ImageAspectFlags::COLOR,
            )?);
        }

        let depth = DepthBuffer::new(gpu, swapchain.extent)?;

        let mut framebuffers = Vec::with_capacity(images.len());
        for view in &image_views {
            framebuffers.push(Framebuffer::new(
                &device,
                render_pass,
                &[depth.view.handle(), view.handle()],
                swapchain.extent,
            )?);
        }

        let mut frame_sync = Vec::with_capacity(images.len());
        for _ in 0..images.len() {
            frame_sync.push(FrameSync::new(&device)?);
        }

        let command_pool = CommandPool::new(
            &device,
            gpu.info().queue_families.graphics,
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        )?;
        let commands = command_pool.allocate_command_buffers(images.len() as u32)?;

        Ok(Self {
            device,
            present_queue: gpu.present_queue(),
            extent: swapchain.extent,
            current_frame: 0,
            commands,
            command_pool,
            sync: frame_sync,
            framebuffers,
            depth,
            image_views,
            swapchain,
        })
    }

    /// Number of images in the ring.
    #[must_use]
    pub fn image_count(&self) -> usize {
        self.sync.len()
    }

    /// Current cursor position.
    #[must_use]
    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    /// Swapchain extent.
    #[must_use]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Acquire the next presentable image.
    ///
    /// Uses the cursor slot's "ready" semaphore for the acquire, then
    /// blocks on the acquired image's fence until the GPU has finished all
    /// prior work that used the slot, and resets the fence.
    pub fn acquire_image(&mut self) -> Result<FrameState> {
        let draw_ready = self.sync[self.current_frame].draw_ready;
        let draw_finished = self.sync[self.current_frame].draw_finished;

        let (image_index, _suboptimal) = unsafe {
            self.swapchain
                .loader
                .acquire_next_image(
                    self.swapchain.handle,
                    u64::MAX,
                    draw_ready,
                    vk::Fence::null(),
                )
                .map_err(GpuError::from)?
        };

        let submit_fence = self.sync[image_index as usize].available;
        unsafe {
            sync::wait_for_fence(&self.device, submit_fence, u64::MAX)?;
            sync::reset_fence(&self.device, submit_fence)?;
        }

        Ok(FrameState {
            image_index,
            framebuffer: self.framebuffers[image_index as usize].framebuffer,
            draw_ready,
            draw_finished,
            submit_fence,
            command: self.commands[image_index as usize],
        })
    }

    /// Present the frame's image, gated on its "draw finished" semaphore,
    /// and advance the cursor.
    pub fn present_image(&mut self, state: &FrameState) -> Result<()> {
        let swapchains = [self.swapchain.handle];
        let image_indices = [state.image_index];
        let wait_semaphores = [state.draw_finished];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe {
            self.swapchain
                .loader
                .queue_present(self.present_queue, &present_info)
                .map_err(GpuError::from)?;
        }

        self.current_frame = advance_cursor(self.current_frame, self.image_count());
        Ok(())
    }
}

/// Next cursor position after a successful present.
const fn advance_cursor(current: usize, image_count: usize) -> usize {
    (current + 1) % image_count
}

/// Raw swapchain handle plus its loader, destroyed on drop.
struct Swapchain {
    loader: ash::khr::swapchain::Device,
    handle: vk::SwapchainKHR,
    format: vk::Format,
    extent: vk::Extent2D,
}

impl Swapchain {
    fn new(gpu: &GpuContext, surface: &SurfaceContext) -> Result<Self> {
        let caps = surface.capabilities(gpu)?;
        let surface_format = caps.surface_format();
        let present_mode = caps.present_mode();
        let extent = caps.extent();

        let mut min_image_count = caps.capabilities.min_image_count + 1;
        if caps.capabilities.max_image_count > 0 {
            min_image_count = min_image_count.min(caps.capabilities.max_image_count);
        }

        let families = [
            gpu.info().queue_families.graphics,
            gpu.info().queue_families.present,
        ];
        let (sharing_mode, family_indices): (vk::SharingMode, &[u32]) =
            if families[0] == families[1] {
                (vk::SharingMode::EXCLUSIVE, &families[..1])
            } else {
                (vk::SharingMode::CONCURRENT, &families)
            };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.surface())
            .min_image_count(min_image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(family_indices)
            .pre_transform(caps.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        let loader = surface.swapchain_loader().clone();
        let handle = unsafe {
            loader
                .create_swapchain(&create_info, None)
                .map_err(|e| GpuError::SwapchainCreation(e.to_string()))?
        };

        Ok(Self {
            loader,
            handle,
            format: surface_format.format,
            extent,
        })
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_swapchain(self.handle, None);
        }
    }
}

/// The depth buffer shared by every frame in the ring, with its own
/// dedicated memory block.
struct DepthBuffer {
    view: ImageView2D,
    _image: Image2D,
    _memory: MemoryBlock,
}

impl DepthBuffer {
    fn new(gpu: &GpuContext, extent: vk::Extent2D) -> Result<Self> {
        let device = gpu.device();
        let families = [gpu.info().queue_families.graphics];

        let image = Image2D::new(
            device,
            extent.width,
            extent.height,
            gpu.info().depth_format,
            vk::ImageTiling::OPTIMAL,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            &families,
        )?;
        let requirements = image.memory_requirements();
        let memory_type = gpu.memory_type_index(
            requirements.memory_type_bits,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        let memory = MemoryBlock::allocate(device, requirements.size, memory_type)?;
        unsafe {
            image.bind_memory(memory.handle(), 0)?;
        }
        let view = ImageView2D::new(device, &image, vk::ImageAspectFlags::DEPTH)?;

        Ok(Self {
            view,
            _image: image,
            _memory: memory,
        })
    }
}

/// A per-image framebuffer, destroyed on drop.
struct Framebuffer {
    device: Arc<ash::Device>,
    framebuffer: vk::Framebuffer,
}

impl Framebuffer {
    fn new(
        device: &Arc<ash::Device>,
        render_pass: &RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> Result<Self> {
        let create_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass.handle())
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe {
            device
                .create_framebuffer(&create_info, None)
                .map_err(GpuError::from)?
        };

        Ok(Self {
            device: device.clone(),
            framebuffer,
        })
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_framebuffer(self.framebuffer, None);
        }
    }
}

/// Per-image synchronization: the reuse fence (created signaled so the
/// first acquire does not block) and the acquire/submit semaphore pair.
struct FrameSync {
    device: Arc<ash::Device>,
    available: vk::Fence,
    draw_ready: vk::Semaphore,
    draw_finished: vk::Semaphore,
}

impl FrameSync {
    fn new(device: &Arc<ash::Device>) -> Result<Self> {
        unsafe {
            let available = sync::create_fence(device, true)?;
            let draw_ready = match sync::create_semaphore(device) {
                Ok(semaphore) => semaphore,
                Err(e) => {
                    device.destroy_fence(available, None);
                    return Err(e.into());
                }
            };
            let draw_finished = match sync::create_semaphore(device) {
                Ok(semaphore) => semaphore,
                Err(e) => {
                    device.destroy_semaphore(draw_ready, None);
                    device.destroy_fence(available, None);
                    return Err(e.into());
                }
            };

            Ok(Self {
                device: device.clone(),
                available,
                draw_ready,
                draw_finished,
            })
        }
    }
}

impl Drop for FrameSync {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.draw_finished, None);
            self.device.destroy_semaphore(self.draw_ready, None);
            self.device.destroy_fence(self.available, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_cycles_through_the_ring() {
        // Seven presents on a three-image ring: cursor after present i is i mod 3
        let mut cursor = 0;
        let mut positions = Vec::new();
        for _ in 0..7 {
            cursor = advance_cursor(cursor, 3);
            positions.push(cursor);
        }
        assert_eq!(positions, [1, 2, 0, 1, 2, 0, 1]);
    }
}
