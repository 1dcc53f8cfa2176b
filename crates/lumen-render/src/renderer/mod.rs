//! Frame and scene bracketing, draw submission and statistics.
//!
//! Every draw goes through [`Renderer::submit`]: it is recorded into its own
//! render pass and submitted immediately, so draws reach the GPU in call order.

mod state;
mod stats;

use std::rc::Rc;

use glam::{Mat4, Vec2};

use crate::color::Color;
use crate::device::{GpuContext, RenderTarget};
use crate::error::RendererError;
use crate::geometry::{model_transform, QuadGeometry, QUAD_TRIANGLES};
use crate::shader::{PipelineTarget, ShaderLibrary};
use crate::sprite::Sprite;
use crate::texture::Texture;

pub use state::RendererState;
pub use stats::RenderStats;

use state::Transition;

/// Renderer configuration.
#[derive(Debug, Copy, Clone)]
pub struct RendererConfig {
    /// Format of the targets handed to [`Renderer::clear`].
    pub color_format: wgpu::TextureFormat,

    /// Depth buffer format, used when `depth_test` is on.
    pub depth_format: Option<wgpu::TextureFormat>,

    pub depth_test: bool,

    /// Straight-alpha blending of every draw.
    pub blending: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            color_format: wgpu::TextureFormat::Bgra8UnormSrgb,
            depth_format: Some(wgpu::TextureFormat::Depth24Plus),
            depth_test: true,
            blending: true,
        }
    }
}

impl RendererConfig {
    /// Target every program drawn by this renderer must be linked against.
    pub fn pipeline_target(&self) -> PipelineTarget {
        PipelineTarget {
            color_format: self.color_format,
            depth_format: if self.depth_test { self.depth_format } else { None },
            blending: self.blending,
        }
    }
}

/// Resources created by [`Renderer::initialize`].
struct Resources {
    shaders: ShaderLibrary,
    /// Stands in for texture units with nothing bound.
    white: Texture,
    /// Full-region quad for `draw_quad` / `draw_textured_quad`.
    quad: Rc<QuadGeometry>,
}

#[derive(Clone)]
struct DepthBuffer {
    view: wgpu::TextureView,
    size: (u32, u32),
}

/// The frame's color target plus a depth buffer matching it.
struct Frame {
    target: RenderTarget,
    depth: Option<DepthBuffer>,
}

pub struct Renderer {
    ctx: Rc<GpuContext>,
    config: RendererConfig,
    state: RendererState,
    stats: RenderStats,

    resources: Option<Resources>,
    depth: Option<DepthBuffer>,
    frame: Option<Frame>,

    projection: Mat4,
    view: Mat4,
}

impl Renderer {
    pub fn new(ctx: Rc<GpuContext>, config: RendererConfig) -> Self {
        Self {
            ctx,
            config,
            state: RendererState::Uninitialized,
            stats: RenderStats::default(),
            resources: None,
            depth: None,
            frame: None,
            projection: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
        }
    }

    /// Prepares the renderer: logs the adapter, builds the built-in shaders,
    /// the fallback texture and the shared quad.
    pub fn initialize(&mut self) -> Result<(), RendererError> {
        if self.state.next(Transition::Initialize).is_none() {
            return Err(RendererError::InvalidState {
                state: self.state,
                operation: Transition::Initialize.name(),
            });
        }

        let info = self.ctx.adapter_info();
        log::info!("GPU: {} (vendor {:#06x}, {:?})", info.name, info.vendor, info.device_type);
        log::info!("driver: {} {}", info.driver, info.driver_info);
        log::info!("backend: {:?}", info.backend);

        let target = self.config.pipeline_target();
        let shaders = ShaderLibrary::new(&self.ctx, target)?;
        let white = Texture::from_rgba8(&self.ctx, "lumen white", 1, 1, &[255; 4])?;
        let quad = Rc::new(QuadGeometry::new(&self.ctx, "lumen unit quad"));

        self.resources = Some(Resources { shaders, white, quad });
        self.state = RendererState::Ready;
        log::info!(
            "renderer initialized (depth test {}, blending {})",
            if target.depth_format.is_some() { "on" } else { "off" },
            if target.blending { "on" } else { "off" },
        );
        Ok(())
    }

    /// Starts a frame on `target`: clears color and depth and resets the stats.
    ///
    /// A target the configured pipelines cannot render to is refused: the
    /// state, the stats and the current frame are left as they were.
    pub fn clear(&mut self, target: &RenderTarget, color: Color) {
        let Some(next) = self.state.next(Transition::Clear) else {
            log::warn!("cannot {} while renderer is {}", Transition::Clear.name(), self.state);
            return;
        };
        if target.format() != self.config.color_format {
            log::warn!(
                "clear skipped: target format {:?} differs from configured {:?}",
                target.format(),
                self.config.color_format
            );
            return;
        }
        let (width, height) = target.size();
        let max = self.ctx.device().limits().max_texture_dimension_2d;
        if width == 0 || height == 0 || width > max || height > max {
            log::warn!("clear skipped: target is {width}x{height}, the device allows 1..={max}");
            return;
        }

        let scope = self
            .ctx
            .device()
            .push_error_scope(wgpu::ErrorFilter::Validation);
        let depth = self.depth_buffer(target.size());
        let mut encoder = self
            .ctx
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("lumen clear encoder"),
            });

        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("lumen clear pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target.view(),
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(color.to_wgpu()),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: depth.as_ref().map(|depth| {
                    wgpu::RenderPassDepthStencilAttachment {
                        view: &depth.view,
                        depth_ops: Some(wgpu::Operations {
                            load: wgpu::LoadOp::Clear(1.0),
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: None,
                    }
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
        }

        self.ctx.queue().submit(std::iter::once(encoder.finish()));

        if let Some(err) = pollster::block_on(scope.pop()) {
            log::warn!("clear failed: {err}");
            return;
        }

        self.state = next;
        self.stats.reset();
        self.frame = Some(Frame {
            target: target.clone(),
            depth,
        });
    }

    /// Stores the camera for the draws of this scene.
    pub fn begin_scene(&mut self, projection: Mat4, view: Mat4) {
        if self.transition(Transition::BeginScene) {
            self.projection = projection;
            self.view = view;
        }
    }

    pub fn end_scene(&mut self) {
        if self.transition(Transition::EndScene) {
            log::trace!(
                "scene ended: {} draw calls, {} triangles",
                self.stats.draw_calls,
                self.stats.triangle_count
            );
        }
    }

    /// Draws `sprite` with its own texture, region, tint and shader.
    pub fn draw_sprite(&mut self, sprite: &Sprite, position: Vec2, size: Vec2, rotation: f32) {
        sprite.draw(self, position, size, rotation);
    }

    /// Draws a solid quad, rotated by `rotation` degrees around its center.
    pub fn draw_quad(&mut self, position: Vec2, size: Vec2, rotation: f32, color: Color) {
        let Some(resources) = &self.resources else {
            log::warn!("draw_quad: renderer is {}", self.state);
            return;
        };
        let program = Rc::clone(resources.shaders.flat());
        let quad = Rc::clone(&resources.quad);

        program.bind(&self.ctx);
        program.set_float4("u_Color", color.to_vec4());
        program.set_mat4("u_Model", model_transform(position, size, rotation));
        self.submit(&quad);
        program.unbind(&self.ctx);
    }

    /// Draws the whole of `texture` on a quad, multiplied by `tint` and
    /// rotated by `rotation` degrees around its center.
    pub fn draw_textured_quad(
        &mut self,
        position: Vec2,
        size: Vec2,
        rotation: f32,
        texture: &Texture,
        tint: Color,
    ) {
        let Some(resources) = &self.resources else {
            log::warn!("draw_textured_quad: renderer is {}", self.state);
            return;
        };
        let program = Rc::clone(resources.shaders.textured());
        let quad = Rc::clone(&resources.quad);

        program.bind(&self.ctx);
        texture.bind(&self.ctx, 0);
        program.set_float4("u_Color", tint.to_vec4());
        program.set_mat4("u_Model", model_transform(position, size, rotation));
        self.submit(&quad);
        texture.unbind(&self.ctx);
        program.unbind(&self.ctx);
    }

    /// Creates a sprite using the library's textured program.
    pub fn create_sprite(&self, texture: Rc<Texture>) -> Result<Sprite, RendererError> {
        let resources = self.resources.as_ref().ok_or(RendererError::InvalidState {
            state: self.state,
            operation: "create a sprite",
        })?;
        Ok(Sprite::new(
            &self.ctx,
            texture,
            Rc::clone(resources.shaders.textured()),
        ))
    }

    /// Releases every GPU resource the renderer owns.
    pub fn shutdown(&mut self) {
        if !self.transition(Transition::Shutdown) {
            return;
        }
        self.frame = None;
        self.depth = None;
        self.resources = None;
        self.ctx.reset_bindings();
        log::info!("renderer shut down");
    }

    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    pub fn state(&self) -> RendererState {
        self.state
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Shader library, once initialized.
    pub fn shaders(&self) -> Option<&ShaderLibrary> {
        self.resources.as_ref().map(|r| &r.shaders)
    }

    pub fn shaders_mut(&mut self) -> Option<&mut ShaderLibrary> {
        self.resources.as_mut().map(|r| &mut r.shaders)
    }

    pub fn context(&self) -> &Rc<GpuContext> {
        &self.ctx
    }

    /// Camera matrix applied to every draw (`projection * view`).
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }

    /// Draws `geometry` with the program and texture units bound on the
    /// context. This is the only place draws are counted.
    pub(crate) fn submit(&mut self, geometry: &QuadGeometry) -> bool {
        if !self.state.accepts_draws() {
            log::warn!("draw skipped: renderer is {}", self.state);
            return false;
        }
        let (Some(frame), Some(resources)) = (&self.frame, &self.resources) else {
            log::warn!("draw skipped: no frame target");
            return false;
        };
        let Some(program) = self.ctx.bound_program() else {
            log::warn!("draw skipped: no shader program bound");
            return false;
        };
        if program.target() != self.config.pipeline_target() {
            log::warn!(
                "draw skipped: shader program {} targets {:?}, renderer uses {:?}",
                program.label(),
                program.target(),
                self.config.pipeline_target()
            );
            return false;
        }
        if frame.target.format() != program.target().color_format {
            log::warn!(
                "draw skipped: shader program {} writes {:?}, frame target is {:?}",
                program.label(),
                program.target().color_format,
                frame.target.format()
            );
            return false;
        }
        if frame
            .depth
            .as_ref()
            .is_some_and(|depth| depth.size != frame.target.size())
        {
            log::warn!("draw skipped: depth buffer does not match the frame target");
            return false;
        }

        program.set(
            "u_ViewProjection",
            crate::shader::UniformValue::Mat4(self.projection * self.view),
        );
        program.flush(self.ctx.queue());
        let scope = self
            .ctx
            .device()
            .push_error_scope(wgpu::ErrorFilter::Validation);
        let textures = program.texture_bind_group(&self.ctx, resources.white.gpu());

        let mut encoder = self
            .ctx
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("lumen draw encoder"),
            });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("lumen draw pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: frame.target.view(),
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: frame.depth.as_ref().map(|depth| {
                    wgpu::RenderPassDepthStencilAttachment {
                        view: &depth.view,
                        depth_ops: Some(wgpu::Operations {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: None,
                    }
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            pass.set_pipeline(program.pipeline());
            pass.set_bind_group(0, program.uniform_bind_group(), &[]);
            if let Some(textures) = &textures {
                pass.set_bind_group(1, textures, &[]);
            }
            pass.set_vertex_buffer(0, geometry.vertex_buffer().slice(..));
            pass.set_index_buffer(geometry.index_buffer().slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..geometry.index_count(), 0, 0..1);
        }

        self.ctx.queue().submit(std::iter::once(encoder.finish()));

        if let Some(err) = pollster::block_on(scope.pop()) {
            log::warn!("draw with {} failed: {err}", program.label());
            return false;
        }
        self.stats.record(QUAD_TRIANGLES);
        true
    }

    /// Applies `transition`, warning and keeping the state if it is illegal.
    fn transition(&mut self, transition: Transition) -> bool {
        match self.state.next(transition) {
            Some(next) => {
                self.state = next;
                true
            }
            None => {
                log::warn!("cannot {} while renderer is {}", transition.name(), self.state);
                false
            }
        }
    }

    /// Depth buffer sized for `size`, recreated when the size changes.
    fn depth_buffer(&mut self, size: (u32, u32)) -> Option<DepthBuffer> {
        let format = self.config.pipeline_target().depth_format?;

        if self.depth.as_ref().is_none_or(|d| d.size != size) {
            let texture = self.ctx.device().create_texture(&wgpu::TextureDescriptor {
                label: Some("lumen depth buffer"),
                size: wgpu::Extent3d {
                    width: size.0,
                    height: size.1,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            log::debug!("depth buffer {}x{} created", size.0, size.1);
            self.depth = Some(DepthBuffer { view, size });
        }

        self.depth.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::test_support::gpu;

    const SIZE: u32 = 64;

    fn config() -> RendererConfig {
        RendererConfig {
            color_format: wgpu::TextureFormat::Rgba8UnormSrgb,
            ..RendererConfig::default()
        }
    }

    fn ready() -> Option<(Renderer, RenderTarget)> {
        let ctx = gpu()?;
        let target = RenderTarget::offscreen(&ctx, SIZE, SIZE, config().color_format);
        let mut renderer = Renderer::new(ctx, config());
        renderer.initialize().unwrap();
        Some((renderer, target))
    }

    // ── config ────────────────────────────────────────────────────────────

    #[test]
    fn depth_test_off_drops_depth_format() {
        let config = RendererConfig {
            depth_test: false,
            ..RendererConfig::default()
        };
        assert_eq!(config.pipeline_target().depth_format, None);
        assert_eq!(RendererConfig::default().pipeline_target(), PipelineTarget::default());
    }

    // ── lifecycle ─────────────────────────────────────────────────────────

    #[test]
    fn initialize_twice_is_an_error() {
        let Some((mut renderer, _)) = ready() else { return };
        assert_eq!(renderer.state(), RendererState::Ready);
        assert!(matches!(
            renderer.initialize(),
            Err(RendererError::InvalidState { state: RendererState::Ready, .. })
        ));
    }

    #[test]
    fn scene_calls_out_of_order_keep_state() {
        let Some((mut renderer, target)) = ready() else { return };
        renderer.end_scene();
        assert_eq!(renderer.state(), RendererState::Ready);

        renderer.clear(&target, Color::black());
        renderer.begin_scene(Mat4::IDENTITY, Mat4::IDENTITY);
        renderer.begin_scene(Mat4::ZERO, Mat4::ZERO);
        assert_eq!(renderer.state(), RendererState::Scene);
        assert_eq!(renderer.view_projection(), Mat4::IDENTITY);
        renderer.end_scene();
        assert_eq!(renderer.state(), RendererState::Frame);
    }

    #[test]
    fn target_with_another_format_is_refused() {
        let Some(ctx) = gpu() else { return };
        let mut renderer = Renderer::new(Rc::clone(&ctx), RendererConfig::default());
        renderer.initialize().unwrap();
        let rgba = RenderTarget::offscreen(&ctx, SIZE, SIZE, wgpu::TextureFormat::Rgba8UnormSrgb);
        let bgra = RenderTarget::offscreen(&ctx, SIZE, SIZE, wgpu::TextureFormat::Bgra8UnormSrgb);

        renderer.clear(&rgba, Color::black());
        assert_eq!(renderer.state(), RendererState::Ready);
        renderer.draw_quad(Vec2::ZERO, Vec2::ONE, 0.0, Color::white());
        assert_eq!(renderer.stats(), RenderStats::default());

        // Inside a frame, the refused target leaves frame and stats alone.
        renderer.clear(&bgra, Color::black());
        renderer.draw_quad(Vec2::ZERO, Vec2::ONE, 0.0, Color::white());
        renderer.clear(&rgba, Color::black());
        assert_eq!(renderer.state(), RendererState::Frame);
        assert_eq!(renderer.stats().draw_calls, 1);
        renderer.draw_quad(Vec2::ZERO, Vec2::ONE, 0.0, Color::white());
        assert_eq!(renderer.stats().draw_calls, 2);
    }

    #[test]
    fn depth_buffer_follows_the_target_size() {
        let Some((mut renderer, target)) = ready() else { return };
        let wide = RenderTarget::offscreen(renderer.context(), 2 * SIZE, SIZE, config().color_format);

        renderer.clear(&target, Color::black());
        renderer.clear(&wide, Color::black());
        assert_eq!(renderer.depth.as_ref().map(|d| d.size), Some(wide.size()));
        renderer.draw_quad(Vec2::ZERO, Vec2::ONE, 0.0, Color::white());
        assert_eq!(renderer.stats().draw_calls, 1);
    }

    // ── stats ─────────────────────────────────────────────────────────────

    #[test]
    fn clear_resets_stats() {
        let Some((mut renderer, target)) = ready() else { return };
        renderer.clear(&target, Color::black());
        renderer.draw_quad(Vec2::ZERO, Vec2::ONE, 0.0, Color::white());
        renderer.draw_quad(Vec2::ZERO, Vec2::ONE, 0.0, Color::white());
        assert_eq!(renderer.stats().draw_calls, 2);

        renderer.clear(&target, Color::black());
        assert_eq!(renderer.stats(), RenderStats::default());
    }

    #[test]
    fn one_quad_is_one_call_two_triangles() {
        let Some((mut renderer, target)) = ready() else { return };
        renderer.clear(&target, Color::new(0.0, 0.0, 0.0, 1.0));
        renderer.draw_quad(Vec2::ZERO, Vec2::ONE, 0.0, Color::new(1.0, 1.0, 1.0, 1.0));
        assert_eq!(
            renderer.stats(),
            RenderStats { draw_calls: 1, triangle_count: 2 }
        );
    }

    #[test]
    fn rotated_quad_counts_and_transforms_like_a_sprite() {
        let Some((mut renderer, target)) = ready() else { return };
        let (position, size, rotation) = (Vec2::new(10.0, 10.0), Vec2::splat(32.0), 45.0);
        let expected = model_transform(position, size, rotation);

        renderer.clear(&target, Color::black());
        renderer.draw_quad(position, size, rotation, Color::white());
        assert_eq!(renderer.stats(), RenderStats { draw_calls: 1, triangle_count: 2 });
        let flat = Rc::clone(renderer.shaders().unwrap().flat());
        assert_eq!(flat.staged_mat4("u_Model"), Some(expected));

        let texture = Texture::from_rgba8(renderer.context(), "t", 2, 2, &[255; 16]).unwrap();
        let sprite = renderer.create_sprite(Rc::new(texture)).unwrap();
        renderer.draw_sprite(&sprite, position, size, rotation);
        assert_eq!(renderer.stats(), RenderStats { draw_calls: 2, triangle_count: 4 });
        assert_eq!(sprite.shader().staged_mat4("u_Model"), Some(expected));

        renderer.draw_textured_quad(position, size, 90.0, sprite.texture(), Color::white());
        assert_eq!(
            sprite.shader().staged_mat4("u_Model"),
            Some(model_transform(position, size, 90.0))
        );
    }

    #[test]
    fn draws_without_a_frame_are_not_counted() {
        let Some((mut renderer, _)) = ready() else { return };
        renderer.draw_quad(Vec2::ZERO, Vec2::ONE, 0.0, Color::white());
        assert_eq!(renderer.stats(), RenderStats::default());
    }

    #[test]
    fn sprite_draws_go_through_the_renderer() {
        let Some((mut renderer, target)) = ready() else { return };
        let pixels = vec![255u8; 64 * 64 * 4];
        let texture = Texture::from_rgba8(renderer.context(), "sprite", 64, 64, &pixels).unwrap();
        let sprite = renderer.create_sprite(Rc::new(texture)).unwrap();

        renderer.clear(&target, Color::black());
        renderer.begin_scene(Mat4::orthographic_rh(0.0, 64.0, 0.0, 64.0, -1.0, 1.0), Mat4::IDENTITY);
        renderer.draw_sprite(&sprite, Vec2::new(10.0, 10.0), Vec2::new(32.0, 32.0), 45.0);
        sprite.draw(&mut renderer, Vec2::ZERO, Vec2::splat(8.0), 0.0);
        renderer.end_scene();

        assert_eq!(renderer.stats(), RenderStats { draw_calls: 2, triangle_count: 4 });
        // Sprite draws leave nothing bound.
        assert!(renderer.context().bound_program_id().is_none());
        assert!(renderer.context().bound_texture_id(0).is_none());
    }

    #[test]
    fn textured_quad_counts_like_any_draw() {
        let Some((mut renderer, target)) = ready() else { return };
        let texture = Texture::from_rgba8(renderer.context(), "t", 2, 2, &[128; 16]).unwrap();
        renderer.clear(&target, Color::transparent());
        renderer.draw_textured_quad(Vec2::ZERO, Vec2::ONE, 0.0, &texture, Color::white());
        assert_eq!(renderer.stats().triangle_count, 2);
    }

    #[test]
    fn program_with_other_target_is_skipped() {
        let Some((mut renderer, target)) = ready() else { return };
        let other = PipelineTarget {
            depth_format: None,
            ..renderer.config().pipeline_target()
        };
        let program = crate::shader::ShaderProgram::compile(
            renderer.context(),
            include_str!("../shader/shaders/flat.vert.wgsl"),
            include_str!("../shader/shaders/flat.frag.wgsl"),
            other,
        )
        .unwrap();
        let quad = QuadGeometry::new(renderer.context(), "test quad");

        renderer.clear(&target, Color::black());
        program.bind(renderer.context());
        assert!(!renderer.submit(&quad));
        assert_eq!(renderer.stats().draw_calls, 0);
    }

    #[test]
    fn shutdown_releases_and_rejects_draws() {
        let Some((mut renderer, target)) = ready() else { return };
        renderer.clear(&target, Color::black());
        renderer.shutdown();
        assert_eq!(renderer.state(), RendererState::ShutDown);
        assert!(renderer.shaders().is_none());

        renderer.draw_quad(Vec2::ZERO, Vec2::ONE, 0.0, Color::white());
        assert_eq!(renderer.stats().draw_calls, 0);
        assert!(renderer.initialize().is_err());
    }
}
