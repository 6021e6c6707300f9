//! Frame orchestration: the per-frame recording state machine.

use crate::error::{RenderError, Result};
use crate::frame::{FrameScheduler, FrameState};
use crate::handles::{ModelHandle, PipelineHandle};
use crate::material;
use crate::pack::ResourcePack;
use crate::vertex;
use ash::vk;
use glam::Mat4;
use lumen_gpu::{
    DescriptorSetLayout, GpuContext, GraphicsPipeline, GraphicsPipelineDesc, PipelineLayout,
    RenderPass, Sampler, ShaderStage, SurfaceContext,
};
use lumen_scene::Scene;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Byte size of one push-constant matrix.
const MATRIX_SIZE: u32 = std::mem::size_of::<Mat4>() as u32;

/// Sequences a frame: acquire -> record -> submit -> present.
///
/// Owns the process-wide resources shared read-only by every resource pack:
/// the render pass, the material descriptor layout, the pipeline layout
/// (camera matrix at push-constant offset 0, model matrix at offset 64,
/// both vertex-stage), and the linear sampler.
///
/// Frames are strictly sequential: [`begin_frame`](Self::begin_frame) must
/// not be called again before [`end_frame`](Self::end_frame) completes.
pub struct RenderContext {
    device: Arc<ash::Device>,
    graphics_queue: vk::Queue,
    frame: Option<FrameState>,
    packs: Vec<ResourcePack>,
    pipelines: Vec<GraphicsPipeline>,
    scheduler: FrameScheduler,
    pipeline_layout: PipelineLayout,
    material_layout: DescriptorSetLayout,
    sampler: Sampler,
    render_pass: RenderPass,
}

impl RenderContext {
    /// Create the render context for a surface.
    pub fn new(gpu: &GpuContext, surface: &SurfaceContext) -> Result<Self> {
        let device = gpu.device().clone();

        let color_format = surface.capabilities(gpu)?.surface_format().format;
        let render_pass = RenderPass::new(&device, gpu.info().depth_format, color_format)?;

        let sampler = Sampler::linear(gpu)?;
        let material_layout = material::descriptor_set_layout(&device)?;

        let push_constant_ranges = [vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::VERTEX)
            .offset(0)
            .size(2 * MATRIX_SIZE)];
        let pipeline_layout = PipelineLayout::new(
            &device,
            &[material_layout.handle()],
            &push_constant_ranges,
        )?;

        let scheduler = FrameScheduler::new(gpu, surface, &render_pass)?;

        Ok(Self {
            device,
            graphics_queue: gpu.graphics_queue(),
            frame: None,
            packs: Vec::new(),
            pipelines: Vec::new(),
            scheduler,
            pipeline_layout,
            material_layout,
            sampler,
            render_pass,
        })
    }

    /// Load a graphics pipeline from a directory of per-stage SPIR-V files.
    ///
    /// Files are discovered by the stage-keyword naming convention
    /// (`vert.spv`, `frag.spv`, `tesc.spv`, `tese.spv`, `geom.spv`); the
    /// vertex and fragment stages are required.
    pub fn load_pipeline(&mut self, dir: impl AsRef<Path>) -> Result<PipelineHandle> {
        let dir = dir.as_ref();
        let stages = load_shader_stages(dir)?;
        tracing::info!("loading pipeline from {:?} ({} stages)", dir, stages.len());

        let desc = GraphicsPipelineDesc {
            stages,
            vertex_bindings: vertex::bindings().to_vec(),
            vertex_attributes: vertex::attributes().to_vec(),
            extent: self.scheduler.extent(),
        };
        let pipeline = GraphicsPipeline::new(
            &self.device,
            &self.render_pass,
            &self.pipeline_layout,
            &desc,
        )?;

        self.pipelines.push(pipeline);
        Ok(PipelineHandle::new(self.pipelines.len() - 1))
    }

    /// Build a resource pack for the named models and hand back one handle
    /// per model.
    pub fn load_resources(
        &mut self,
        gpu: &GpuContext,
        batch: &[String],
        scene: &Scene,
    ) -> Result<HashMap<String, ModelHandle>> {
        let pack = ResourcePack::build(gpu, &self.material_layout, &self.sampler, batch, scene)?;
        self.packs.push(pack);

        let pack_index = self.packs.len() - 1;
        let pack = &self.packs[pack_index];

        let mut handles = HashMap::with_capacity(batch.len());
        for name in batch {
            if let Some(index) = pack.model_index(name) {
                handles.insert(name.clone(), ModelHandle::new(pack_index, index));
            }
        }
        Ok(handles)
    }

    /// Acquire a frame slot and start recording: begin the render pass with
    /// the fixed clear values and push the camera matrix.
    pub fn begin_frame(&mut self, camera: &Mat4) -> Result<()> {
        if self.frame.is_some() {
            return Err(RenderError::FrameAlreadyActive);
        }

        let state = self.scheduler.acquire_image()?;

        unsafe {
            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            self.device.begin_command_buffer(state.command, &begin_info)?;

            // Clear values match the render pass attachment order
            let clear_values = [
                vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue {
                        depth: 1.0,
                        stencil: 0,
                    },
                },
                vk::ClearValue {
                    color: vk::ClearColorValue {
                        float32: [0.2, 0.2, 0.2, 1.0],
                    },
                },
            ];
            let pass_info = vk::RenderPassBeginInfo::default()
                .render_pass(self.render_pass.handle())
                .framebuffer(state.framebuffer)
                .render_area(vk::Rect2D {
                    offset: vk::Offset2D::default(),
                    extent: self.scheduler.extent(),
                })
                .clear_values(&clear_values);
            self.device
                .cmd_begin_render_pass(state.command, &pass_info, vk::SubpassContents::INLINE);

            self.device.cmd_push_constants(
                state.command,
                self.pipeline_layout.handle(),
                vk::ShaderStageFlags::VERTEX,
                0,
                bytemuck::bytes_of(camera),
            );
        }

        self.frame = Some(state);
        Ok(())
    }

    /// Bind a graphics pipeline. Valid only while recording.
    pub fn bind_pipeline(&mut self, pipeline: PipelineHandle) -> Result<()> {
        let state = self.frame.as_ref().ok_or(RenderError::NoActiveFrame)?;
        unsafe {
            self.device.cmd_bind_pipeline(
                state.command,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipelines[pipeline.index()].handle(),
            );
        }
        Ok(())
    }

    /// Push the model transform and draw one model. Valid only while
    /// recording.
    pub fn draw(&mut self, model: ModelHandle, transform: &Mat4) -> Result<()> {
        let state = self.frame.as_ref().ok_or(RenderError::NoActiveFrame)?;
        unsafe {
            self.device.cmd_push_constants(
                state.command,
                self.pipeline_layout.handle(),
                vk::ShaderStageFlags::VERTEX,
                MATRIX_SIZE,
                bytemuck::bytes_of(transform),
            );
            self.packs[model.pack()].draw(
                &self.device,
                state.command,
                model.index(),
                self.pipeline_layout.handle(),
            );
        }
        Ok(())
    }

    /// Finish recording, submit gated on the frame's "ready" semaphore
    /// (signaling "draw finished" and the reuse fence), and present.
    pub fn end_frame(&mut self) -> Result<()> {
        let state = self.frame.take().ok_or(RenderError::NoActiveFrame)?;

        unsafe {
            self.device.cmd_end_render_pass(state.command);
            self.device.end_command_buffer(state.command)?;

            let commands = [state.command];
            let wait_semaphores = [state.draw_ready];
            let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
            let signal_semaphores = [state.draw_finished];

            let submit_info = vk::SubmitInfo::default()
                .command_buffers(&commands)
                .wait_semaphores(&wait_semaphores)
                .wait_dst_stage_mask(&wait_stages)
                .signal_semaphores(&signal_semaphores);

            self.device
                .queue_submit(self.graphics_queue, &[submit_info], state.submit_fence)?;
        }

        self.scheduler.present_image(&state)
    }
}

impl Drop for RenderContext {
    fn drop(&mut self) {
        // GPU work referencing packs and pipelines must finish before they
        // are destroyed
        unsafe {
            let _ = self.device.device_wait_idle();
        }
    }
}

/// Discover per-stage SPIR-V files in a pipeline directory.
fn load_shader_stages(dir: &Path) -> Result<Vec<(ShaderStage, Vec<u32>)>> {
    let mut paths: Vec<_> = fs::read_dir(dir)?
        .collect::<std::io::Result<Vec<_>>>()?
        .into_iter()
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    paths.sort();

    let mut stages = Vec::with_capacity(paths.len());
    for path in paths {
        if path.extension().and_then(OsStr::to_str) != Some("spv") {
            return Err(RenderError::UnexpectedShaderFile(path));
        }
        let stage = path
            .file_stem()
            .and_then(OsStr::to_str)
            .and_then(ShaderStage::from_stem)
            .ok_or_else(|| RenderError::UnexpectedShaderFile(path.clone()))?;

        let mut file = fs::File::open(&path)?;
        let words = ash::util::read_spv(&mut file)?;
        stages.push((stage, words));
    }

    let provided = |wanted: ShaderStage| stages.iter().any(|(stage, _)| *stage == wanted);
    if !provided(ShaderStage::Vertex) || !provided(ShaderStage::Fragment) {
        return Err(RenderError::MissingShaderStages(dir.to_path_buf()));
    }

    Ok(stages)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal valid input for `ash::util::read_spv`: the SPIR-V magic
    /// number followed by a few zero words.
    fn spv_bytes() -> Vec<u8> {
        let words: [u32; 5] = [0x0723_0203, 0, 0, 0, 0];
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    fn shader_dir(name: &str, files: &[&str]) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("lumen-shaders-{}-{name}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        for file in files {
            fs::write(dir.join(file), spv_bytes()).unwrap();
        }
        dir
    }

    #[test]
    fn discovers_stages_by_filename() {
        let dir = shader_dir("ok", &["vert.spv", "frag.spv", "geom.spv"]);
        let stages = load_shader_stages(&dir).unwrap();

        let kinds: Vec<ShaderStage> = stages.iter().map(|(stage, _)| *stage).collect();
        assert!(kinds.contains(&ShaderStage::Vertex));
        assert!(kinds.contains(&ShaderStage::Fragment));
        assert!(kinds.contains(&ShaderStage::Geometry));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn vertex_and_fragment_stages_are_required() {
        let dir = shader_dir("missing", &["vert.spv"]);
        assert!(matches!(
            load_shader_stages(&dir),
            Err(RenderError::MissingShaderStages(_))
        ));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn unexpected_files_are_rejected() {
        let dir = shader_dir("ext", &["vert.spv", "frag.glsl"]);
        assert!(matches!(
            load_shader_stages(&dir),
            Err(RenderError::UnexpectedShaderFile(_))
        ));
        fs::remove_dir_all(&dir).unwrap();

        let dir = shader_dir("stem", &["vert.spv", "frag.spv", "compute.spv"]);
        assert!(matches!(
            load_shader_stages(&dir),
            Err(RenderError::UnexpectedShaderFile(_))
        ));
        fs::remove_dir_all(&dir).unwrap();
    }
}
