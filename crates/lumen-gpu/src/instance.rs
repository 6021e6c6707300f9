//! Vulkan instance creation.

use crate::error::{GpuError, Result};
use ash::vk;
use raw_window_handle::RawDisplayHandle;
use std::ffi::{c_char, CStr, CString};

/// Validation layers to enable in debug builds.
pub fn validation_layers() -> Vec<&'static CStr> {
    vec![c"VK_LAYER_KHRONOS_validation"]
}

/// Create a Vulkan instance with the extensions the presentation surface
/// requires for the given display.
///
/// # Safety
/// The entry must be a valid Vulkan entry point and the display handle must
/// outlive the call.
pub unsafe fn create_instance(
    entry: &ash::Entry,
    app_name: &str,
    display: RawDisplayHandle,
    enable_validation: bool,
) -> Result<ash::Instance> {
    let app_name = CString::new(app_name)
        .map_err(|e| GpuError::Other(format!("Invalid application name: {e}")))?;

    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .engine_name(c"Lumen")
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(vk::API_VERSION_1_2);

    // The surface provider dictates the platform extensions
    let extension_names: Vec<*const c_char> = {
        let mut names = ash_window::enumerate_required_extensions(display)?.to_vec();
        if cfg!(target_os = "macos") {
            names.push(ash::khr::portability_enumeration::NAME.as_ptr());
        }
        names
    };

    let layers = if enable_validation {
        unsafe { available_validation_layers(entry) }
    } else {
        vec![]
    };
    let layer_names: Vec<*const c_char> = layers.iter().map(|l| l.as_ptr()).collect();

    // Required for MoltenVK on macOS
    let create_flags = if cfg!(target_os = "macos") {
        vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR
    } else {
        vk::InstanceCreateFlags::empty()
    };

    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&extension_names)
        .enabled_layer_names(&layer_names)
        .flags(create_flags);

    let instance = unsafe { entry.create_instance(&create_info, None)? };
    Ok(instance)
}

/// Filter the requested validation layers down to those the driver offers.
unsafe fn available_validation_layers(entry: &ash::Entry) -> Vec<&'static CStr> {
    let properties = match unsafe { entry.enumerate_instance_layer_properties() } {
        Ok(properties) => properties,
        Err(e) => {
            tracing::warn!("Failed to enumerate instance layers: {e}");
            return vec![];
        }
    };

    validation_layers()
        .into_iter()
        .filter(|layer| {
            let found = properties.iter().any(|props| {
                let name = unsafe { CStr::from_ptr(props.layer_name.as_ptr()) };
                name == *layer
            });
            if !found {
                tracing::warn!("Validation layer {layer:?} not available");
            }
            found
        })
        .collect()
}
