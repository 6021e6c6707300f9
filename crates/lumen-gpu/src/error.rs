//! GPU error types.

use ash::vk;
use thiserror::Error;

/// GPU-related errors.
#[derive(Error, Debug)]
pub enum GpuError {
    /// Vulkan error.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// No suitable GPU found.
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// No memory type satisfies the combined requirements.
    #[error("No memory type matches bits {type_bits:#x} with flags {flags:?}")]
    NoSuitableMemoryType {
        /// Combined compatibility bitmask of every resource.
        type_bits: u32,
        /// Required memory property flags.
        flags: vk::MemoryPropertyFlags,
    },

    /// Surface creation failed.
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// Swapchain creation failed.
    #[error("Swapchain creation failed: {0}")]
    SwapchainCreation(String),

    /// Shader module creation failed.
    #[error("Shader compilation failed: {0}")]
    ShaderCompilation(String),

    /// Pipeline creation failed.
    #[error("Pipeline creation failed: {0}")]
    PipelineCreation(String),

    /// A transfer exceeds the staging buffer capacity.
    #[error("Transfer of {requested} bytes exceeds staging capacity of {capacity} bytes")]
    StagingOverflow {
        /// Requested transfer size.
        requested: u64,
        /// Fixed staging buffer capacity.
        capacity: u64,
    },

    /// A buffer copy would write past the end of the destination.
    #[error("Copy of {len} bytes at offset {offset} exceeds destination size {size}")]
    CopyOutOfBounds {
        /// Destination byte offset.
        offset: u64,
        /// Copy length.
        len: u64,
        /// Destination buffer size.
        size: u64,
    },

    /// Pixel data does not match the destination image extent and format.
    #[error("Image upload of {actual} bytes does not match image size {expected}")]
    ImageSizeMismatch {
        /// Bytes required by the image extent and format.
        expected: u64,
        /// Bytes provided.
        actual: u64,
    },

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;
