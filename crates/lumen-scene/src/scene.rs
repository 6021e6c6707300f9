//! Scene snapshot container.

use crate::material::Material;
use crate::model::Model;
use crate::texture::Texture;
use std::collections::HashMap;

/// A read-only snapshot of everything the renderer can draw.
///
/// Models reference materials by name and materials reference textures by
/// path; all three live in these maps. The renderer never mutates a scene:
/// resource packs copy the referenced bytes to GPU memory at build time.
#[derive(Debug, Default)]
pub struct Scene {
    /// Drawable meshes by name.
    pub models: HashMap<String, Model>,
    /// Materials by name.
    pub materials: HashMap<String, Material>,
    /// Decoded textures by path.
    pub textures: HashMap<String, Texture>,
}

impl Scene {
    /// Create an empty scene.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}
