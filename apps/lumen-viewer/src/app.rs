//! Viewer application: window lifecycle and the render loop.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use glam::{Mat4, Vec3};
use lumen_gpu::{GpuContext, GpuContextBuilder, SurfaceContext};
use lumen_render::{ModelHandle, PipelineHandle, RenderContext};
use lumen_scene::{load_obj, Scene};
use tracing::{error, info};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window, WindowId};

const TITLE: &str = "Lumen Viewer";
const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;

/// Degrees per second of model spin.
const ROTATION_SPEED: f32 = 15.0;

/// The winit application: initializes rendering on resume, draws on every
/// redraw, and treats any frame error as fatal.
pub struct ViewerApp {
    model_path: PathBuf,
    shader_dir: PathBuf,
    state: Option<ViewerState>,
    result: anyhow::Result<()>,
}

/// Live rendering state.
///
/// Field order matters for teardown: the render context waits for the
/// device and releases packs and pipelines, then the surface goes, then the
/// device and instance, and the window last.
struct ViewerState {
    context: RenderContext,
    // Dropped after the context; needs the instance alive
    #[allow(dead_code)]
    surface: SurfaceContext,
    // Owns the device and instance; dropped after everything GPU-side
    #[allow(dead_code)]
    gpu: GpuContext,
    window: Arc<Window>,
    handles: Vec<ModelHandle>,
    pipeline: PipelineHandle,
    camera: Mat4,
    start: Instant,
}

impl ViewerApp {
    /// Create the application with the scene it should present.
    pub fn new(model_path: PathBuf, shader_dir: PathBuf) -> Self {
        Self {
            model_path,
            shader_dir,
            state: None,
            result: Ok(()),
        }
    }

    /// The outcome of the run, once the event loop has returned.
    pub fn into_result(self) -> anyhow::Result<()> {
        self.result
    }

    fn create_state(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<ViewerState> {
        let attrs = Window::default_attributes()
            .with_title(TITLE)
            .with_inner_size(PhysicalSize::new(WIDTH, HEIGHT));
        let window = Arc::new(event_loop.create_window(attrs)?);

        let (gpu, surface) = GpuContextBuilder::new().app_name(TITLE).build(&*window)?;
        let mut context = RenderContext::new(&gpu, &surface)?;

        let mut scene = Scene::new();
        let batch = load_obj(&self.model_path, &mut scene)?;
        let handle_map = context.load_resources(&gpu, &batch, &scene)?;
        let handles = batch.iter().map(|name| handle_map[name]).collect();

        let pipeline = context.load_pipeline(&self.shader_dir)?;

        let size = window.inner_size();
        let aspect = size.width as f32 / size.height as f32;
        let view = Mat4::look_at_rh(Vec3::splat(30.0), Vec3::ZERO, Vec3::Z);
        let projection = Mat4::perspective_rh(60f32.to_radians(), aspect, 0.1, 100.0);

        Ok(ViewerState {
            context,
            surface,
            gpu,
            window,
            handles,
            pipeline,
            camera: projection * view,
            start: Instant::now(),
        })
    }
}

impl ApplicationHandler for ViewerApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        match self.create_state(event_loop) {
            Ok(state) => {
                info!("viewer ready, drawing {} models", state.handles.len());
                self.state = Some(state);
            }
            Err(e) => {
                error!("Failed to initialize: {e}");
                self.result = Err(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("close requested");
                self.state.take();
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => {
                if let Some(state) = &mut self.state {
                    // Per-frame errors are fatal: drop the state (waiting
                    // for the device) and leave the loop
                    if let Err(e) = state.render_frame() {
                        error!("Frame failed: {e}");
                        self.result = Err(e.into());
                        self.state.take();
                        event_loop.exit();
                        return;
                    }
                    state.window.request_redraw();
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.window.request_redraw();
        }
    }
}

impl ViewerState {
    fn render_frame(&mut self) -> lumen_render::Result<()> {
        let angle = self.start.elapsed().as_secs_f32() * ROTATION_SPEED.to_radians();
        let transform = Mat4::from_axis_angle(Vec3::Z, angle);

        self.context.begin_frame(&self.camera)?;
        self.context.bind_pipeline(self.pipeline)?;
        for &handle in &self.handles {
            self.context.draw(handle, &transform)?;
        }
        self.context.end_frame()
    }
}

