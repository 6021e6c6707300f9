//! Scene loading errors.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building a scene snapshot from asset files.
#[derive(Error, Debug)]
pub enum SceneError {
    /// File system error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// OBJ/MTL parsing failed.
    #[error("OBJ load error: {0}")]
    Obj(#[from] tobj::LoadError),

    /// Texture decoding failed.
    #[error("image decode error: {0}")]
    Image(#[from] image::ImageError),

    /// Decoded texture byte length does not match its extent.
    #[error("texture {path:?} holds {actual} bytes, expected {expected}")]
    TextureSize {
        /// Offending texture path.
        path: PathBuf,
        /// Expected byte length (`width * height * 4`).
        expected: usize,
        /// Actual byte length.
        actual: usize,
    },
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, SceneError>;
