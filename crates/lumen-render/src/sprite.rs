use std::path::Path;
use std::rc::Rc;

use glam::Vec2;

use crate::color::Color;
use crate::device::GpuContext;
use crate::error::ResourceLoadError;
use crate::geometry::{model_transform, QuadGeometry};
use crate::renderer::Renderer;
use crate::shader::ShaderProgram;
use crate::texture::Texture;

/// A textured quad with its own texture region and tint.
///
/// The texture and program are shared; the quad buffers belong to the sprite.
pub struct Sprite {
    texture: Rc<Texture>,
    shader: Rc<ShaderProgram>,
    geometry: QuadGeometry,
    uv_min: Vec2,
    uv_max: Vec2,
    color: Color,
}

impl Sprite {
    pub fn new(ctx: &GpuContext, texture: Rc<Texture>, shader: Rc<ShaderProgram>) -> Self {
        let geometry = QuadGeometry::new(ctx, "lumen sprite quad");
        Self {
            texture,
            shader,
            geometry,
            uv_min: Vec2::ZERO,
            uv_max: Vec2::ONE,
            color: Color::white(),
        }
    }

    /// Loads `path` into a new texture and wraps it in a sprite.
    pub fn from_path(
        ctx: &GpuContext,
        path: impl AsRef<Path>,
        shader: Rc<ShaderProgram>,
    ) -> Result<Self, ResourceLoadError> {
        let texture = Texture::load(ctx, path)?;
        Ok(Self::new(ctx, Rc::new(texture), shader))
    }

    /// Restricts drawing to the normalized region `min..max` of the texture.
    pub fn set_texture_region(&mut self, min: Vec2, max: Vec2) {
        self.uv_min = min;
        self.uv_max = max;
    }

    pub fn texture_region(&self) -> (Vec2, Vec2) {
        (self.uv_min, self.uv_max)
    }

    pub fn set_color(&mut self, color: Color) {
        self.color = color;
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn texture(&self) -> &Rc<Texture> {
        &self.texture
    }

    pub fn shader(&self) -> &Rc<ShaderProgram> {
        &self.shader
    }

    /// Draws the sprite at `position` with `size`, rotated by `rotation`
    /// degrees around its center. Leaves the program and unit 0 unbound.
    pub fn draw(&self, renderer: &mut Renderer, position: Vec2, size: Vec2, rotation: f32) {
        let ctx = Rc::clone(renderer.context());

        self.geometry.upload(&ctx, self.uv_min, self.uv_max);

        self.shader.bind(&ctx);
        self.texture.bind(&ctx, 0);
        self.shader.set_float4("u_Color", self.color.to_vec4());
        self.shader
            .set_mat4("u_Model", model_transform(position, size, rotation));

        renderer.submit(&self.geometry);

        self.texture.unbind(&ctx);
        self.shader.unbind(&ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::test_support::gpu;
    use crate::device::RenderTarget;
    use crate::renderer::{RenderStats, RendererConfig};
    use crate::shader::PipelineTarget;

    fn sprite() -> Option<Sprite> {
        let ctx = gpu()?;
        let texture = Texture::from_rgba8(&ctx, "t", 64, 64, &vec![255; 64 * 64 * 4]).ok()?;
        let shader = ShaderProgram::compile(
            &ctx,
            include_str!("shader/shaders/sprite.vert.wgsl"),
            include_str!("shader/shaders/sprite.frag.wgsl"),
            PipelineTarget::default(),
        )
        .ok()?;
        Some(Sprite::new(&ctx, Rc::new(texture), Rc::new(shader)))
    }

    #[test]
    fn defaults_to_full_region_and_white() {
        let Some(sprite) = sprite() else { return };
        assert_eq!(sprite.texture_region(), (Vec2::ZERO, Vec2::ONE));
        assert_eq!(sprite.color(), Color::white());
        assert_eq!(sprite.texture().width(), 64);
    }

    #[test]
    fn region_and_color_are_stored() {
        let Some(mut sprite) = sprite() else { return };
        sprite.set_texture_region(Vec2::new(0.0, 0.5), Vec2::new(0.5, 1.0));
        sprite.set_color(Color::new(1.0, 0.0, 0.0, 0.5));
        assert_eq!(sprite.texture_region(), (Vec2::new(0.0, 0.5), Vec2::new(0.5, 1.0)));
        assert_eq!(sprite.color().a, 0.5);
    }

    #[test]
    fn each_draw_submits_the_current_region() {
        let Some(ctx) = gpu() else { return };
        let config = RendererConfig::default();
        let mut renderer = Renderer::new(Rc::clone(&ctx), config);
        renderer.initialize().unwrap();
        let target = RenderTarget::offscreen(&ctx, 32, 32, config.color_format);
        let texture = Texture::from_rgba8(&ctx, "atlas", 4, 4, &[255; 64]).unwrap();
        let mut sprite = renderer.create_sprite(Rc::new(texture)).unwrap();
        let uvs = |sprite: &Sprite| -> Vec<[f32; 2]> {
            sprite.geometry.vertices().iter().map(|v| v.tex_coord).collect()
        };

        renderer.clear(&target, Color::black());
        sprite.set_texture_region(Vec2::new(0.0, 0.5), Vec2::new(0.5, 1.0));
        // Nothing is uploaded until the sprite is drawn.
        assert_eq!(uvs(&sprite), vec![[0.0, 1.0], [1.0, 0.0], [0.0, 0.0], [1.0, 1.0]]);
        sprite.draw(&mut renderer, Vec2::ZERO, Vec2::splat(16.0), 0.0);
        assert_eq!(uvs(&sprite), vec![[0.0, 1.0], [0.5, 0.5], [0.0, 0.5], [0.5, 1.0]]);

        sprite.set_texture_region(Vec2::new(0.5, 0.0), Vec2::new(1.0, 0.5));
        renderer.draw_sprite(&sprite, Vec2::ZERO, Vec2::splat(16.0), 0.0);
        assert_eq!(uvs(&sprite), vec![[0.5, 0.5], [1.0, 0.0], [0.5, 0.0], [1.0, 0.5]]);
        assert_eq!(renderer.stats(), RenderStats { draw_calls: 2, triangle_count: 4 });
    }

    #[test]
    fn from_path_reports_missing_file() {
        let Some(ctx) = gpu() else { return };
        let Some(shader) = sprite().map(|s| Rc::clone(s.shader())) else { return };
        let err = Sprite::from_path(&ctx, "/nonexistent/sprite.png", shader).err();
        assert!(matches!(err, Some(ResourceLoadError::Io { .. })));
    }
}
