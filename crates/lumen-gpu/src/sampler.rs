//! Texture samplers.

use crate::context::GpuContext;
use crate::error::Result;
use ash::vk;
use std::sync::Arc;

/// A texture sampler, destroyed on drop.
///
/// One linear sampler is shared process-wide by every material descriptor;
/// materials never own samplers of their own.
pub struct Sampler {
    device: Arc<ash::Device>,
    sampler: vk::Sampler,
}

impl Sampler {
    /// Create the shared linear sampler: linear filtering, repeat
    /// addressing, anisotropy at the device maximum.
    pub fn linear(gpu: &GpuContext) -> Result<Self> {
        let create_info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(true)
            .max_anisotropy(gpu.info().limits.max_sampler_anisotropy)
            .compare_enable(false)
            .min_lod(0.0)
            .max_lod(0.0)
            .mip_lod_bias(0.0)
            .unnormalized_coordinates(false);

        let device = gpu.device().clone();
        let sampler = unsafe { device.create_sampler(&create_info, None)? };

        Ok(Self { device, sampler })
    }

    /// Get the raw sampler handle.
    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.sampler, None);
        }
    }
}
