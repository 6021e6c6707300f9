//! Material descriptions.

use glam::Vec3;

/// The texture-map kinds a material can carry, in shader binding order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureMap {
    /// Base color map.
    Diffuse,
    /// Tangent-space normal map.
    Normal,
    /// Metalness map.
    Metallic,
    /// Roughness map.
    Roughness,
    /// Ambient occlusion map.
    Ambient,
    /// Emission map.
    Emission,
}

impl TextureMap {
    /// Number of texture-map kinds.
    pub const COUNT: usize = 6;

    /// All kinds in binding order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Diffuse,
        Self::Normal,
        Self::Metallic,
        Self::Roughness,
        Self::Ambient,
        Self::Emission,
    ];

    /// Shader binding slot of this map kind.
    #[must_use]
    pub const fn slot(self) -> usize {
        self as usize
    }
}

/// Surface properties plus up to one texture path per map kind.
///
/// Unset slots are `None`; the renderer substitutes a shared placeholder
/// image for them so shaders never need a presence flag.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Material {
    /// Diffuse reflectance color.
    pub diffuse: Vec3,
    /// Ambient reflectance color.
    pub ambient: Vec3,
    /// Emitted color.
    pub emission: Vec3,
    /// Surface roughness in `[0, 1]`.
    pub roughness: f32,
    /// Metalness in `[0, 1]`.
    pub metalness: f32,
    /// Texture path per map kind, indexed by [`TextureMap::slot`].
    pub textures: [Option<String>; TextureMap::COUNT],
}

impl Material {
    /// Texture path assigned to the given map kind, if any.
    #[must_use]
    pub fn texture(&self, map: TextureMap) -> Option<&str> {
        self.textures[map.slot()].as_deref()
    }

    /// Assign a texture path to the given map kind.
    pub fn set_texture(&mut self, map: TextureMap, path: impl Into<String>) {
        self.textures[map.slot()] = Some(path.into());
    }

    /// Iterate over the texture paths that are actually set.
    pub fn set_textures(&self) -> impl Iterator<Item = &str> {
        self.textures.iter().filter_map(Option::as_deref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_follow_binding_order() {
        for (i, map) in TextureMap::ALL.iter().enumerate() {
            assert_eq!(map.slot(), i);
        }
    }

    #[test]
    fn set_textures_skips_unset_slots() {
        let mut material = Material::default();
        material.set_texture(TextureMap::Diffuse, "albedo.png");
        material.set_texture(TextureMap::Emission, "glow.png");

        let set: Vec<_> = material.set_textures().collect();
        assert_eq!(set, ["albedo.png", "glow.png"]);
        assert_eq!(material.texture(TextureMap::Normal), None);
    }
}
