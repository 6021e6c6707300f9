//! CPU-side scene snapshot for the Lumen renderer.
//!
//! This crate provides:
//! - Plain-old-data scene types (vertices, models, materials, textures)
//! - OBJ/MTL loading via `tobj`
//! - Texture decoding via `image`
//!
//! A [`Scene`] is an immutable snapshot from the renderer's point of view:
//! resource packs read it during a build and copy every referenced byte to
//! GPU memory before the build returns.

pub mod error;
pub mod material;
pub mod model;
pub mod obj;
pub mod scene;
pub mod texture;
pub mod vertex;

pub use error::{Result, SceneError};
pub use material::{Material, TextureMap};
pub use model::Model;
pub use obj::load_obj;
pub use scene::Scene;
pub use texture::Texture;
pub use vertex::Vertex;
