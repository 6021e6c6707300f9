//! Vertex data layout.

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

/// A single mesh vertex: position, normal, and texture coordinates,
/// tightly packed.
///
/// The byte layout is consumed as-is by the vertex shader, so the field
/// order and packing must not change.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Object-space position.
    pub position: Vec3,
    /// Object-space normal.
    pub normal: Vec3,
    /// Texture coordinates.
    pub uv: Vec2,
}

impl Vertex {
    /// Byte offset of the position attribute.
    pub const POSITION_OFFSET: u32 = 0;
    /// Byte offset of the normal attribute.
    pub const NORMAL_OFFSET: u32 = 12;
    /// Byte offset of the texture-coordinate attribute.
    pub const UV_OFFSET: u32 = 24;

    /// Size of one vertex in bytes.
    pub const STRIDE: u32 = std::mem::size_of::<Self>() as u32;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::offset_of;

    #[test]
    fn vertex_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<Vertex>(), 32);
        assert_eq!(offset_of!(Vertex, position), 0);
        assert_eq!(offset_of!(Vertex, normal), 12);
        assert_eq!(offset_of!(Vertex, uv), 24);
    }
}
