//! Lumen demo viewer.
//!
//! Loads an OBJ scene and a SPIR-V pipeline directory, then renders the
//! models with a slow orbit animation.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p lumen-viewer -- <model.obj> <shader-dir>
//! ```
//!
//! The shader directory must contain `vert.spv` and `frag.spv` (plus any
//! optional `tesc.spv`, `tese.spv`, `geom.spv`).
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: log filter (e.g. info, debug, trace)

mod app;

use std::path::PathBuf;

use tracing_subscriber::EnvFilter;
use winit::event_loop::{ControlFlow, EventLoop};

use crate::app::ViewerApp;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let (Some(model), Some(shaders)) = (args.next(), args.next()) else {
        print_help();
        anyhow::bail!("expected a model path and a shader directory");
    };

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut viewer = ViewerApp::new(PathBuf::from(model), PathBuf::from(shaders));
    event_loop.run_app(&mut viewer)?;

    viewer.into_result()
}

fn print_help() {
    eprintln!(
        "Lumen demo viewer

USAGE:
    cargo run -p lumen-viewer -- <model.obj> <shader-dir>

ARGS:
    <model.obj>     Wavefront OBJ file to load (with its MTL library)
    <shader-dir>    Directory holding vert.spv and frag.spv

ENVIRONMENT VARIABLES:
    RUST_LOG        Log filter (e.g. info, debug, trace)"
    );
}
