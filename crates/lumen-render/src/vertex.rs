//! Vertex input layout for the packed [`Vertex`] format.

use ash::vk;
use lumen_scene::Vertex;

/// Vertex buffer binding: one interleaved per-vertex stream.
#[must_use]
pub fn bindings() -> [vk::VertexInputBindingDescription; 1] {
    [vk::VertexInputBindingDescription::default()
        .binding(0)
        .stride(Vertex::STRIDE)
        .input_rate(vk::VertexInputRate::VERTEX)]
}

/// Vertex attributes: position, normal, uv.
#[must_use]
pub fn attributes() -> [vk::VertexInputAttributeDescription; 3] {
    [
        vk::VertexInputAttributeDescription::default()
            .location(0)
            .binding(0)
            .format(vk::Format::R32G32B32_SFLOAT)
            .offset(Vertex::POSITION_OFFSET),
        vk::VertexInputAttributeDescription::default()
            .location(1)
            .binding(0)
            .format(vk::Format::R32G32B32_SFLOAT)
            .offset(Vertex::NORMAL_OFFSET),
        vk::VertexInputAttributeDescription::default()
            .location(2)
            .binding(0)
            .format(vk::Format::R32G32_SFLOAT)
            .offset(Vertex::UV_OFFSET),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_cover_the_whole_stride() {
        let attrs = attributes();
        assert_eq!(attrs[0].offset, 0);
        assert_eq!(attrs[1].offset, 12);
        assert_eq!(attrs[2].offset, 24);
        assert_eq!(bindings()[0].stride, 32);
    }
}
