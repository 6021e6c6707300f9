//! Resource packing and frame orchestration for the Lumen renderer.
//!
//! This crate provides:
//! - [`ResourcePack`]: one batch of GPU-resident geometry, textures, and
//!   material descriptors sharing a single sub-allocated memory block
//! - [`FrameScheduler`]: the presentable image ring with per-slot
//!   synchronization
//! - [`RenderContext`]: the per-frame state machine that records and
//!   submits draw commands against packs

pub mod context;
pub mod error;
pub mod frame;
pub mod handles;
pub mod material;
pub mod pack;
pub mod vertex;

pub use context::RenderContext;
pub use error::{RenderError, Result};
pub use frame::{FrameScheduler, FrameState};
pub use handles::{ModelHandle, PipelineHandle};
pub use material::MaterialUniform;
pub use pack::ResourcePack;
