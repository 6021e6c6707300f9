//! Mesh data.

use crate::vertex::Vertex;

/// One drawable mesh: a vertex/index array pair plus the name of the
/// material it is rendered with.
#[derive(Clone, Debug, Default)]
pub struct Model {
    /// Name of the material in the owning [`crate::Scene`].
    pub material: String,
    /// Vertex array.
    pub vertices: Vec<Vertex>,
    /// Index array (`u32`, triangle list).
    pub indices: Vec<u32>,
}

impl Model {
    /// Create a model from its parts.
    #[must_use]
    pub fn new(material: impl Into<String>, vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self {
            material: material.into(),
            vertices,
            indices,
        }
    }

    /// Vertex data size in bytes.
    #[must_use]
    pub fn vertex_bytes(&self) -> u64 {
        (self.vertices.len() * std::mem::size_of::<Vertex>()) as u64
    }

    /// Index data size in bytes.
    #[must_use]
    pub fn index_bytes(&self) -> u64 {
        (self.indices.len() * std::mem::size_of::<u32>()) as u64
    }
}
