//! Renderer error types.

use ash::vk;
use lumen_gpu::GpuError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building resource packs or driving frames.
#[derive(Error, Debug)]
pub enum RenderError {
    /// GPU layer error.
    #[error(transparent)]
    Gpu(#[from] GpuError),

    /// File system error while loading shader bytecode.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A batch references a model absent from the scene snapshot.
    #[error("Model {0:?} not found in scene")]
    MissingModel(String),

    /// A model references a material absent from the scene snapshot.
    #[error("Model {model:?} references unknown material {material:?}")]
    MissingMaterial {
        /// Referencing model.
        model: String,
        /// Missing material name.
        material: String,
    },

    /// A material references a texture absent from the scene snapshot.
    #[error("Material {material:?} references unknown texture {path:?}")]
    MissingTexture {
        /// Referencing material.
        material: String,
        /// Missing texture path.
        path: String,
    },

    /// A pipeline directory lacks the required vertex and fragment stages.
    #[error("Shader directory {0:?} must contain vert.spv and frag.spv")]
    MissingShaderStages(PathBuf),

    /// A pipeline directory contains a file outside the naming convention.
    #[error("Unexpected file in shader directory: {0:?}")]
    UnexpectedShaderFile(PathBuf),

    /// `begin_frame` was called while a frame was already being recorded.
    #[error("A frame is already being recorded")]
    FrameAlreadyActive,

    /// A recording operation was called outside `begin_frame`/`end_frame`.
    #[error("No frame is being recorded")]
    NoActiveFrame,
}

impl From<vk::Result> for RenderError {
    fn from(result: vk::Result) -> Self {
        Self::Gpu(GpuError::from(result))
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, RenderError>;
