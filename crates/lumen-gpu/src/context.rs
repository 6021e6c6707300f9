//! GPU context management: instance, device selection, queues.

use crate::error::{GpuError, Result};
use crate::instance::create_instance;
use crate::surface::SurfaceContext;
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::ffi::CStr;
use std::sync::Arc;

/// Queue family indices chosen for the device.
#[derive(Clone, Copy, Debug)]
pub struct QueueFamilies {
    /// Graphics-capable family.
    pub graphics: u32,
    /// Compute-capable family (may equal `graphics`).
    pub compute: u32,
    /// Transfer-capable family, preferring a dedicated one.
    pub transfer: u32,
    /// Family able to present to the target surface.
    pub present: u32,
}

/// Properties of the selected physical device.
#[derive(Clone, Copy)]
pub struct DeviceInfo {
    /// Memory heaps and types.
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Device limits (sampler anisotropy, alignments).
    pub limits: vk::PhysicalDeviceLimits,
    /// Depth attachment format supported by the device.
    pub depth_format: vk::Format,
    /// Chosen queue families.
    pub queue_families: QueueFamilies,
}

/// Main GPU context holding the Vulkan instance, device, and queues.
pub struct GpuContext {
    // Entry must be kept alive for the lifetime of the context
    #[allow(dead_code)]
    pub(crate) entry: ash::Entry,
    pub(crate) instance: ash::Instance,
    pub(crate) physical_device: vk::PhysicalDevice,
    pub(crate) device: Arc<ash::Device>,
    pub(crate) info: DeviceInfo,

    pub(crate) graphics_queue: vk::Queue,
    pub(crate) compute_queue: vk::Queue,
    pub(crate) transfer_queue: vk::Queue,
    pub(crate) present_queue: vk::Queue,
}

impl GpuContext {
    /// Get the Vulkan device handle.
    pub fn device(&self) -> &Arc<ash::Device> {
        &self.device
    }

    /// Get the physical device handle.
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Get the Vulkan instance handle.
    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    /// Get the selected device properties.
    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    /// Get the graphics queue.
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Get the compute queue.
    pub fn compute_queue(&self) -> vk::Queue {
        self.compute_queue
    }

    /// Get the transfer queue.
    pub fn transfer_queue(&self) -> vk::Queue {
        self.transfer_queue
    }

    /// Get the presentation queue.
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// Find a memory type index compatible with `type_bits` that carries all
    /// of the requested property flags.
    pub fn memory_type_index(
        &self,
        type_bits: u32,
        flags: vk::MemoryPropertyFlags,
    ) -> Result<u32> {
        find_memory_type(&self.info.memory_properties, type_bits, flags)
            .ok_or(GpuError::NoSuitableMemoryType { type_bits, flags })
    }

    /// Distinct queue family indices satisfying the given capability mask,
    /// in graphics -> compute -> transfer order.
    pub fn queue_family_indices(&self, capabilities: vk::QueueFlags) -> Vec<u32> {
        let families = &self.info.queue_families;
        let mut indices = Vec::with_capacity(3);
        let mut push = |family: u32| {
            if !indices.contains(&family) {
                indices.push(family);
            }
        };
        if capabilities.contains(vk::QueueFlags::GRAPHICS) {
            push(families.graphics);
        }
        if capabilities.contains(vk::QueueFlags::COMPUTE) {
            push(families.compute);
        }
        if capabilities.contains(vk::QueueFlags::TRANSFER) {
            push(families.transfer);
        }
        indices
    }

    /// Wait for the device to be idle.
    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device.device_wait_idle()?;
        }
        Ok(())
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}

/// Builder for creating a GPU context.
pub struct GpuContextBuilder {
    app_name: String,
    enable_validation: bool,
}

impl Default for GpuContextBuilder {
    fn default() -> Self {
        Self {
            app_name: "Lumen".to_owned(),
            enable_validation: cfg!(debug_assertions),
        }
    }
}

impl GpuContextBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    #[must_use]
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Enable or disable validation layers.
    #[must_use]
    pub fn validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    /// Build the GPU context and the surface context for the given window.
    ///
    /// Device selection requires the surface: the chosen device must be able
    /// to present to it.
    pub fn build<W>(self, window: &W) -> Result<(GpuContext, SurfaceContext)>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| GpuError::Other(format!("Failed to load Vulkan: {e}")))?;

        let display = window
            .display_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("No display handle: {e}")))?
            .as_raw();
        let window_handle = window
            .window_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("No window handle: {e}")))?
            .as_raw();

        let instance =
            unsafe { create_instance(&entry, &self.app_name, display, self.enable_validation)? };

        let surface = unsafe {
            ash_window::create_surface(&entry, &instance, display, window_handle, None)
                .map_err(|e| GpuError::SurfaceCreation(e.to_string()))?
        };
        let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);

        let (physical_device, info) =
            unsafe { select_physical_device(&instance, &surface_loader, surface)? };

        let (device, queues) = unsafe { create_device(&instance, physical_device, &info)? };
        let device = Arc::new(device);

        let swapchain_loader = ash::khr::swapchain::Device::new(&instance, &device);
        let surface_context = SurfaceContext::new(surface, surface_loader, swapchain_loader);

        Ok((
            GpuContext {
                entry,
                instance,
                physical_device,
                device,
                info,
                graphics_queue: queues.0,
                compute_queue: queues.1,
                transfer_queue: queues.2,
                present_queue: queues.3,
            },
            surface_context,
        ))
    }
}

/// Scan the memory types for one compatible with `type_bits` that has all
/// requested property flags.
pub fn find_memory_type(
    properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    flags: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..properties.memory_type_count).find(|&i| {
        type_bits & (1 << i) != 0
            && properties.memory_types[i as usize]
                .property_flags
                .contains(flags)
    })
}

/// Depth formats in preference order.
const PREFERRED_DEPTH_FORMATS: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Select the best suitable physical device for the surface.
///
/// # Safety
/// The instance, surface loader, and surface must be valid.
unsafe fn select_physical_device(
    instance: &ash::Instance,
    surface_loader: &ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
) -> Result<(vk::PhysicalDevice, DeviceInfo)> {
    let devices = unsafe { instance.enumerate_physical_devices()? };

    let mut best: Option<(vk::PhysicalDevice, DeviceInfo)> = None;
    let mut best_score = 0i64;

    for device in devices {
        let Some(info) = (unsafe { query_suitability(instance, surface_loader, surface, device) })
        else {
            continue;
        };
        let score = unsafe { score_physical_device(instance, device) };
        if best.is_none() || score > best_score {
            best_score = score;
            best = Some((device, info));
        }
    }

    let (device, info) = best.ok_or(GpuError::NoSuitableDevice)?;

    let properties = unsafe { instance.get_physical_device_properties(device) };
    let name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) };
    tracing::info!("Selected GPU: {}", name.to_string_lossy());

    Ok((device, info))
}

/// Check one device against every requirement, returning its info if it
/// qualifies.
unsafe fn query_suitability(
    instance: &ash::Instance,
    surface_loader: &ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
    device: vk::PhysicalDevice,
) -> Option<DeviceInfo> {
    // Required device extensions
    let extensions = unsafe {
        instance
            .enumerate_device_extension_properties(device)
            .ok()?
    };
    let has_swapchain = extensions.iter().any(|props| {
        let name = unsafe { CStr::from_ptr(props.extension_name.as_ptr()) };
        name == ash::khr::swapchain::NAME
    });
    if !has_swapchain {
        return None;
    }

    // Required features
    let features = unsafe { instance.get_physical_device_features(device) };
    if features.sampler_anisotropy != vk::TRUE {
        return None;
    }

    let queue_families = unsafe { find_queue_families(instance, surface_loader, surface, device)? };

    // The surface must offer at least one format and present mode
    let formats = unsafe {
        surface_loader
            .get_physical_device_surface_formats(device, surface)
            .ok()?
    };
    let present_modes = unsafe {
        surface_loader
            .get_physical_device_surface_present_modes(device, surface)
            .ok()?
    };
    if formats.is_empty() || present_modes.is_empty() {
        return None;
    }

    let depth_format = unsafe { find_depth_format(instance, device)? };

    let properties = unsafe { instance.get_physical_device_properties(device) };
    let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };

    Some(DeviceInfo {
        memory_properties,
        limits: properties.limits,
        depth_format,
        queue_families,
    })
}

/// Find graphics/compute/transfer/present queue families, preferring
/// dedicated compute and transfer families when available.
unsafe fn find_queue_families(
    instance: &ash::Instance,
    surface_loader: &ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
    device: vk::PhysicalDevice,
) -> Option<QueueFamilies> {
    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };

    let mut graphics = None;
    let mut compute = None;
    let mut transfer = None;
    let mut present = None;

    for (i, family) in families.iter().enumerate() {
        let i = i as u32;

        if graphics.is_none() && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            graphics = Some(i);
        }

        // Prefer a compute family without graphics
        if family.queue_flags.contains(vk::QueueFlags::COMPUTE)
            && !family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
        {
            compute = Some(i);
        }

        // Prefer a transfer family without graphics or compute
        if family.queue_flags.contains(vk::QueueFlags::TRANSFER)
            && !family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
            && !family.queue_flags.contains(vk::QueueFlags::COMPUTE)
        {
            transfer = Some(i);
        }

        let supports_present = unsafe {
            surface_loader
                .get_physical_device_surface_support(device, i, surface)
                .unwrap_or(false)
        };
        if present.is_none() && supports_present {
            present = Some(i);
        }
    }

    let graphics = graphics?;
    let present = present?;
    // Graphics families also support compute and transfer
    let compute = compute.unwrap_or(graphics);
    let transfer = transfer.unwrap_or(compute);

    Some(QueueFamilies {
        graphics,
        compute,
        transfer,
        present,
    })
}

/// First depth format with optimal-tiling depth attachment support.
unsafe fn find_depth_format(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
) -> Option<vk::Format> {
    PREFERRED_DEPTH_FORMATS.into_iter().find(|&format| {
        let props = unsafe { instance.get_physical_device_format_properties(device, format) };
        props
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
    })
}

/// Score a suitable device for selection.
unsafe fn score_physical_device(instance: &ash::Instance, device: vk::PhysicalDevice) -> i64 {
    let properties = unsafe { instance.get_physical_device_properties(device) };

    let mut score = match properties.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 50,
        _ => 0,
    };

    // Prefer more device-local memory, +1 per GiB
    let memory = unsafe { instance.get_physical_device_memory_properties(device) };
    let vram: u64 = memory
        .memory_heaps
        .iter()
        .take(memory.memory_heap_count as usize)
        .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
        .map(|heap| heap.size)
        .sum();
    score += (vram / (1024 * 1024 * 1024)) as i64;

    score
}

/// Create the logical device and retrieve one queue per chosen family.
///
/// # Safety
/// The instance and physical device must be valid.
unsafe fn create_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    info: &DeviceInfo,
) -> Result<(ash::Device, (vk::Queue, vk::Queue, vk::Queue, vk::Queue))> {
    let families = &info.queue_families;

    let mut unique_families = vec![families.graphics];
    for family in [families.compute, families.transfer, families.present] {
        if !unique_families.contains(&family) {
            unique_families.push(family);
        }
    }

    let queue_priority = 1.0_f32;
    let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
        .iter()
        .map(|&family| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family)
                .queue_priorities(std::slice::from_ref(&queue_priority))
        })
        .collect();

    let extension_names = [ash::khr::swapchain::NAME.as_ptr()];
    let features = vk::PhysicalDeviceFeatures::default().sampler_anisotropy(true);

    let device_create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extension_names)
        .enabled_features(&features);

    let device =
        unsafe { instance.create_device(physical_device, &device_create_info, None)? };

    let queues = unsafe {
        (
            device.get_device_queue(families.graphics, 0),
            device.get_device_queue(families.compute, 0),
            device.get_device_queue(families.transfer, 0),
            device.get_device_queue(families.present, 0),
        )
    };

    Ok((device, queues))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_properties(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut properties = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: flags.len() as u32,
            ..Default::default()
        };
        for (i, &property_flags) in flags.iter().enumerate() {
            properties.memory_types[i].property_flags = property_flags;
        }
        properties
    }

    #[test]
    fn finds_first_matching_memory_type() {
        let properties = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);

        assert_eq!(
            find_memory_type(&properties, 0b11, vk::MemoryPropertyFlags::DEVICE_LOCAL),
            Some(0)
        );
        assert_eq!(
            find_memory_type(
                &properties,
                0b11,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
            ),
            Some(1)
        );
    }

    #[test]
    fn respects_compatibility_bits() {
        let properties = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        ]);

        // Type 0 excluded by the mask, so type 1 must win
        assert_eq!(
            find_memory_type(&properties, 0b10, vk::MemoryPropertyFlags::DEVICE_LOCAL),
            Some(1)
        );
    }

    #[test]
    fn reports_exhaustion_when_nothing_matches() {
        let properties = memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);

        assert_eq!(
            find_memory_type(&properties, 0b1, vk::MemoryPropertyFlags::HOST_VISIBLE),
            None
        );
    }
}
