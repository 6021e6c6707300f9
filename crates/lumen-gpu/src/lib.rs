//! Vulkan abstraction layer for the Lumen renderer.
//!
//! This crate provides:
//! - Instance and device management with queue/memory-type lookup
//! - Surface and capability queries for windowed presentation
//! - Thin RAII wrappers over buffers, images, and device memory, plus the
//!   offset planner used to pack resources into one allocation
//! - A bounded synchronous staging buffer for CPU->GPU transfers
//! - Command pool, synchronization, sampler, render pass, pipeline, and
//!   descriptor helpers

pub mod command;
pub mod context;
pub mod descriptors;
pub mod error;
pub mod instance;
pub mod memory;
pub mod pipeline;
pub mod render_pass;
pub mod sampler;
pub mod staging;
pub mod surface;
pub mod sync;

pub use command::CommandPool;
pub use context::{DeviceInfo, GpuContext, GpuContextBuilder, QueueFamilies};
pub use descriptors::{DescriptorPool, DescriptorSetLayout, DescriptorSetLayoutBuilder};
pub use error::{GpuError, Result};
pub use memory::{Buffer, Image2D, ImageView2D, MemoryBlock, MemoryPlanner, MemoryResource};
pub use pipeline::{GraphicsPipeline, GraphicsPipelineDesc, PipelineLayout, ShaderStage};
pub use render_pass::RenderPass;
pub use sampler::Sampler;
pub use staging::StagingBuffer;
pub use surface::{SurfaceCapabilities, SurfaceContext};
