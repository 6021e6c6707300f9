//! Presentation surface management and capability queries.

use crate::context::GpuContext;
use crate::error::Result;
use ash::vk;

/// Surface formats in preference order.
const PREFERRED_SURFACE_FORMATS: [vk::Format; 2] =
    [vk::Format::R8G8B8A8_UNORM, vk::Format::B8G8R8A8_UNORM];

/// Surface context for windowed rendering.
///
/// Owns the Vulkan surface and the extension loaders needed to query it and
/// to build swapchains against it. Must be dropped before the [`GpuContext`]
/// whose instance it was created from.
pub struct SurfaceContext {
    surface: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
    swapchain_loader: ash::khr::swapchain::Device,
}

impl SurfaceContext {
    pub(crate) fn new(
        surface: vk::SurfaceKHR,
        surface_loader: ash::khr::surface::Instance,
        swapchain_loader: ash::khr::swapchain::Device,
    ) -> Self {
        Self {
            surface,
            surface_loader,
            swapchain_loader,
        }
    }

    /// Get the raw surface handle.
    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    /// Get the swapchain extension loader.
    pub fn swapchain_loader(&self) -> &ash::khr::swapchain::Device {
        &self.swapchain_loader
    }

    /// Query current surface capabilities, formats, and present modes.
    pub fn capabilities(&self, gpu: &GpuContext) -> Result<SurfaceCapabilities> {
        unsafe {
            let capabilities = self
                .surface_loader
                .get_physical_device_surface_capabilities(gpu.physical_device(), self.surface)?;
            let formats = self
                .surface_loader
                .get_physical_device_surface_formats(gpu.physical_device(), self.surface)?;
            let present_modes = self
                .surface_loader
                .get_physical_device_surface_present_modes(gpu.physical_device(), self.surface)?;

            Ok(SurfaceCapabilities {
                capabilities,
                formats,
                present_modes,
            })
        }
    }
}

impl Drop for SurfaceContext {
    fn drop(&mut self) {
        unsafe {
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}

/// Surface capability query result.
pub struct SurfaceCapabilities {
    /// Raw surface capabilities.
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats.
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes.
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceCapabilities {
    /// The surface format the renderer will use.
    #[must_use]
    pub fn surface_format(&self) -> vk::SurfaceFormatKHR {
        select_surface_format(&self.formats)
    }

    /// The present mode the renderer will use.
    #[must_use]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        select_present_mode(&self.present_modes)
    }

    /// The swapchain extent the renderer will use.
    #[must_use]
    pub fn extent(&self) -> vk::Extent2D {
        clamp_extent(&self.capabilities)
    }
}

/// Select a surface format, preferring the UNORM formats the shaders were
/// written against.
#[must_use]
pub fn select_surface_format(available: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    for preferred in PREFERRED_SURFACE_FORMATS {
        if let Some(format) = available.iter().find(|f| f.format == preferred) {
            return *format;
        }
    }
    available[0]
}

/// Select a present mode: MAILBOX when offered, otherwise FIFO (always
/// supported).
#[must_use]
pub fn select_present_mode(available: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if available.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// The surface's current extent, clamped to its reported bounds.
#[must_use]
pub fn clamp_extent(capabilities: &vk::SurfaceCapabilitiesKHR) -> vk::Extent2D {
    vk::Extent2D {
        width: capabilities.current_extent.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: capabilities.current_extent.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn prefers_rgba_unorm() {
        let available = [
            format(vk::Format::B8G8R8A8_SRGB),
            format(vk::Format::B8G8R8A8_UNORM),
            format(vk::Format::R8G8B8A8_UNORM),
        ];
        assert_eq!(
            select_surface_format(&available).format,
            vk::Format::R8G8B8A8_UNORM
        );
    }

    #[test]
    fn falls_back_to_first_format() {
        let available = [format(vk::Format::R16G16B16A16_SFLOAT)];
        assert_eq!(
            select_surface_format(&available).format,
            vk::Format::R16G16B16A16_SFLOAT
        );
    }

    #[test]
    fn prefers_mailbox_present_mode() {
        let available = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(select_present_mode(&available), vk::PresentModeKHR::MAILBOX);
        assert_eq!(
            select_present_mode(&[vk::PresentModeKHR::FIFO]),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn clamps_extent_to_surface_bounds() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 5000,
                height: 100,
            },
            min_image_extent: vk::Extent2D {
                width: 200,
                height: 200,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        };
        let extent = clamp_extent(&capabilities);
        assert_eq!(extent.width, 4096);
        assert_eq!(extent.height, 200);
    }
}
