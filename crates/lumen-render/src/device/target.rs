use super::GpuContext;

/// Color target a frame is rendered into.
///
/// The windowing layer builds one per frame from its swapchain texture with
/// [`from_view`](Self::from_view). [`offscreen`](Self::offscreen) owns its own
/// texture, for headless rendering and tests.
#[derive(Debug, Clone)]
pub struct RenderTarget {
    view: wgpu::TextureView,
    format: wgpu::TextureFormat,
    width: u32,
    height: u32,

    /// Backing texture when the target owns it.
    texture: Option<wgpu::Texture>,
}

impl RenderTarget {
    pub fn from_view(
        view: wgpu::TextureView,
        format: wgpu::TextureFormat,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            view,
            format,
            width: width.max(1),
            height: height.max(1),
            texture: None,
        }
    }

    /// Allocates a texture usable as a color attachment and copy source.
    pub fn offscreen(
        ctx: &GpuContext,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
    ) -> Self {
        let width = width.max(1);
        let height = height.max(1);

        let texture = ctx.device().create_texture(&wgpu::TextureDescriptor {
            label: Some("lumen offscreen target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            view,
            format,
            width,
            height,
            texture: Some(texture),
        }
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    /// Size in physical pixels.
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Backing texture of an offscreen target.
    pub fn texture(&self) -> Option<&wgpu::Texture> {
        self.texture.as_ref()
    }
}
