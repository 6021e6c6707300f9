//! Decoded texture data.

use crate::error::{Result, SceneError};
use std::path::Path;

/// Decoded RGBA8 pixel data plus its extent.
#[derive(Clone, Debug)]
pub struct Texture {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
}

impl Texture {
    /// Wrap already-decoded RGBA8 pixels.
    ///
    /// Fails if the byte length does not match `width * height * 4`.
    pub fn from_rgba8(pixels: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(SceneError::TextureSize {
                path: Path::new("<memory>").to_path_buf(),
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            pixels,
            width,
            height,
        })
    }

    /// Decode an image file to RGBA8.
    ///
    /// Rows are flipped vertically so that texture coordinates follow the
    /// OBJ convention (origin at the bottom-left).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let decoded = image::open(path)?.flipv().to_rgba8();
        let (width, height) = decoded.dimensions();
        tracing::debug!("decoded texture {:?} ({}x{})", path, width, height);
        Ok(Self {
            pixels: decoded.into_raw(),
            width,
            height,
        })
    }

    /// Raw RGBA8 bytes, row-major.
    #[must_use]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Width in texels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in texels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rgba8_validates_length() {
        assert!(Texture::from_rgba8(vec![0; 16], 2, 2).is_ok());
        assert!(matches!(
            Texture::from_rgba8(vec![0; 15], 2, 2),
            Err(SceneError::TextureSize { expected: 16, actual: 15, .. })
        ));
    }
}
