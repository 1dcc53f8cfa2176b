//! Texture resources.
//!
//! Images are decoded to RGBA8 and stored bottom row first, so texture
//! coordinate `v = 0` addresses the bottom edge of the picture.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::device::{Bindable, GpuContext, ResourceId, MAX_TEXTURE_UNITS};
use crate::error::ResourceLoadError;

/// Pixels of an image file, ready for upload.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    /// Channel count of the source file (1 to 4). Pixels are always RGBA8.
    pub channels: u8,
    pub pixels: Vec<u8>,
}

/// Reads and decodes an image file without touching the GPU.
pub fn decode_image(path: impl AsRef<Path>) -> Result<DecodedImage, ResourceLoadError> {
    let path = path.as_ref();

    let image = image::open(path).map_err(|err| match err {
        image::ImageError::IoError(source) => ResourceLoadError::Io {
            path: path.to_path_buf(),
            source,
        },
        source => ResourceLoadError::Decode {
            path: path.to_path_buf(),
            source,
        },
    })?;

    if image.width() == 0 || image.height() == 0 {
        return Err(ResourceLoadError::Empty {
            path: path.to_path_buf(),
        });
    }

    let channels = image.color().channel_count();
    let rgba = image.flipv().into_rgba8();

    Ok(DecodedImage {
        width: rgba.width(),
        height: rgba.height(),
        channels,
        pixels: rgba.into_raw(),
    })
}

/// GPU side of a texture. Shared with the context's texture units.
pub(crate) struct TextureGpu {
    id: ResourceId,
    label: String,
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
}

impl Bindable for TextureGpu {
    fn resource_id(&self) -> ResourceId {
        self.id
    }
}

impl Drop for TextureGpu {
    fn drop(&mut self) {
        log::debug!("texture {} '{}' released", self.id, self.label);
    }
}

impl TextureGpu {
    fn upload(
        ctx: &GpuContext,
        label: &str,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> Result<Self, ResourceLoadError> {
        let device = ctx.device();
        let max = device.limits().max_texture_dimension_2d;
        if width > max || height > max {
            return Err(ResourceLoadError::TooLarge {
                path: PathBuf::from(label),
                width,
                height,
                max,
            });
        }

        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        ctx.queue().write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(label),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let id = ResourceId::next();
        log::debug!("texture {id} '{label}' uploaded ({width}x{height})");

        Ok(Self {
            id,
            label: label.to_string(),
            _texture: texture,
            view,
            sampler,
        })
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn sampler(&self) -> &wgpu::Sampler {
        &self.sampler
    }
}

/// An image resident on the GPU.
///
/// Dropping the texture releases it unless it is still bound to a texture
/// unit, in which case it is released once the unit is cleared.
pub struct Texture {
    gpu: Rc<TextureGpu>,
    path: Option<PathBuf>,
    width: u32,
    height: u32,
    channels: u8,
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.gpu.id)
            .field("path", &self.path)
            .field("size", &(self.width, self.height))
            .field("channels", &self.channels)
            .finish()
    }
}

impl Texture {
    /// Loads an image file into a new texture.
    pub fn load(ctx: &GpuContext, path: impl AsRef<Path>) -> Result<Self, ResourceLoadError> {
        let path = path.as_ref();
        let image = decode_image(path)?;
        let label = path.display().to_string();
        let gpu = TextureGpu::upload(ctx, &label, image.width, image.height, &image.pixels)
            .inspect_err(|err| log::warn!("{err}"))?;

        log::info!(
            "loaded texture '{label}' ({}x{}, {} channels)",
            image.width,
            image.height,
            image.channels
        );

        Ok(Self {
            gpu: Rc::new(gpu),
            path: Some(path.to_path_buf()),
            width: image.width,
            height: image.height,
            channels: image.channels,
        })
    }

    /// Creates a texture from tightly packed RGBA8 rows, bottom row first.
    ///
    /// Fails if either dimension is zero, if `pixels` does not hold exactly
    /// `width * height` texels, or if the size exceeds the device limit.
    pub fn from_rgba8(
        ctx: &GpuContext,
        label: &str,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> Result<Self, ResourceLoadError> {
        let checked = if width == 0 || height == 0 {
            Err(ResourceLoadError::Empty {
                path: PathBuf::from(label),
            })
        } else if pixels.len() != width as usize * height as usize * 4 {
            Err(ResourceLoadError::PixelData {
                path: PathBuf::from(label),
                width,
                height,
                len: pixels.len(),
            })
        } else {
            TextureGpu::upload(ctx, label, width, height, pixels)
        };
        let gpu = checked.inspect_err(|err| log::warn!("texture '{label}': {err}"))?;

        Ok(Self {
            gpu: Rc::new(gpu),
            path: None,
            width,
            height,
            channels: 4,
        })
    }

    /// Binds the texture to unit `slot` of `ctx`.
    pub fn bind(&self, ctx: &GpuContext, slot: u32) {
        if !ctx.bind_texture(slot, &self.gpu) {
            log::warn!(
                "texture {}: unit {slot} does not exist (max {})",
                self.gpu.id,
                MAX_TEXTURE_UNITS - 1
            );
        }
    }

    /// Clears every unit of `ctx` this texture is bound to.
    pub fn unbind(&self, ctx: &GpuContext) {
        ctx.unbind_texture(self.gpu.id);
    }

    pub fn id(&self) -> ResourceId {
        self.gpu.id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    /// Source file, for textures loaded from disk.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub(crate) fn gpu(&self) -> &Rc<TextureGpu> {
        &self.gpu
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::test_support::gpu;

    fn temp_png(name: &str, width: u32, height: u32) -> PathBuf {
        let path = std::env::temp_dir().join(format!("lumen-{}-{name}.png", std::process::id()));
        // Top row red, every other row blue.
        let img = image::RgbImage::from_fn(width, height, |_, y| {
            if y == 0 {
                image::Rgb([255, 0, 0])
            } else {
                image::Rgb([0, 0, 255])
            }
        });
        img.save(&path).unwrap();
        path
    }

    // ── decoding ──────────────────────────────────────────────────────────

    #[test]
    fn decode_reports_size_and_source_channels() {
        let path = temp_png("size", 3, 2);
        let image = decode_image(&path).unwrap();
        assert_eq!((image.width, image.height, image.channels), (3, 2, 3));
        assert_eq!(image.pixels.len(), 3 * 2 * 4);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn decode_stores_bottom_row_first() {
        let path = temp_png("flip", 1, 2);
        let image = decode_image(&path).unwrap();
        // Row 0 in memory is the file's bottom row (blue), row 1 its top (red).
        assert_eq!(&image.pixels[..4], &[0, 0, 255, 255]);
        assert_eq!(&image.pixels[4..], &[255, 0, 0, 255]);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = decode_image("/nonexistent/lumen/missing.png").unwrap_err();
        assert!(matches!(err, ResourceLoadError::Io { .. }), "{err}");
    }

    #[test]
    fn garbage_file_is_decode_error() {
        let path = std::env::temp_dir().join(format!("lumen-{}-garbage.png", std::process::id()));
        std::fs::write(&path, b"definitely not a png").unwrap();
        let err = decode_image(&path).unwrap_err();
        assert!(matches!(err, ResourceLoadError::Decode { .. }), "{err}");
        let _ = std::fs::remove_file(path);
    }

    // ── gpu ───────────────────────────────────────────────────────────────

    #[test]
    fn load_and_bind() {
        let Some(ctx) = gpu() else { return };
        let path = temp_png("bind", 4, 4);
        let texture = Texture::load(&ctx, &path).unwrap();
        assert_eq!((texture.width(), texture.height()), (4, 4));
        assert_eq!(texture.path(), Some(path.as_path()));

        texture.bind(&ctx, 2);
        assert_eq!(ctx.bound_texture_id(2), Some(texture.id()));
        texture.bind(&ctx, MAX_TEXTURE_UNITS as u32);
        texture.unbind(&ctx);
        assert_eq!(ctx.bound_texture_id(2), None);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn from_rgba8_checks_length() {
        let Some(ctx) = gpu() else { return };
        let err = Texture::from_rgba8(&ctx, "short", 2, 2, &[0; 8]).unwrap_err();
        assert!(matches!(err, ResourceLoadError::PixelData { len: 8, .. }), "{err}");
        let err = Texture::from_rgba8(&ctx, "none", 0, 4, &[]).unwrap_err();
        assert!(matches!(err, ResourceLoadError::Empty { .. }), "{err}");
        let white = Texture::from_rgba8(&ctx, "white", 1, 1, &[255; 4]).unwrap();
        assert_eq!(white.channels(), 4);
        assert!(white.path().is_none());
    }

    #[test]
    fn images_beyond_the_device_limit_are_refused() {
        let Some(ctx) = gpu() else { return };
        let max = ctx.device().limits().max_texture_dimension_2d;
        let width = max + 1;
        let pixels = vec![0; width as usize * 4];

        let err = Texture::from_rgba8(&ctx, "wide", width, 1, &pixels).unwrap_err();
        assert!(
            matches!(err, ResourceLoadError::TooLarge { width: w, height: 1, max: m, .. } if w == width && m == max),
            "{err}"
        );

        let tall = Texture::from_rgba8(&ctx, "tall", 1, width, &pixels);
        assert!(matches!(tall, Err(ResourceLoadError::TooLarge { .. })));
    }

    #[test]
    fn oversized_file_is_refused_on_load() {
        let Some(ctx) = gpu() else { return };
        let max = ctx.device().limits().max_texture_dimension_2d;
        let path = temp_png("wide", max + 1, 1);
        let err = Texture::load(&ctx, &path).unwrap_err();
        assert!(matches!(err, ResourceLoadError::TooLarge { .. }), "{err}");
        let _ = std::fs::remove_file(path);
    }
}
