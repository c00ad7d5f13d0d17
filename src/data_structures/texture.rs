//! CPU image data and device textures.
//!
//! [`ImageData`] is what loaders produce: tightly packed RGBA8 pixels. An empty
//! image (zero pixels) stands for "no texture" and is what a failed load falls
//! back to. [`Texture`] owns a device texture handle.

use crate::{
    context::RenderContext,
    device::{FilterMode, GraphicsDevice, TextureDescriptor, TextureFormat, TextureId, WrapMode},
    errors::{RenderError, Result},
};

/// Tightly packed RGBA8 pixels, row-major, top row first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageData {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl ImageData {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.pixels.is_empty()
    }

    /// Wrap raw RGBA8 pixels. The length must be `width * height * 4`.
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(RenderError::Validation(format!(
                "{}x{} RGBA image needs {} bytes, got {}",
                width,
                height,
                expected,
                pixels.len()
            )));
        }
        Ok(Self {
            pixels,
            width,
            height,
        })
    }

    /// A single-colour image, handy for placeholders and tests.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = rgba
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self {
            pixels,
            width,
            height,
        }
    }
}

impl From<image::RgbaImage> for ImageData {
    fn from(img: image::RgbaImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            pixels: img.into_raw(),
            width,
            height,
        }
    }
}

/// A device texture owned by a mesh.
#[derive(Debug)]
pub struct Texture {
    id: TextureId,
    width: u32,
    height: u32,
}

impl Texture {
    /// Colour textures sample with bilinear filtering and repeat.
    pub const COLOR_FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;

    /// Upload `image` as a new texture. `image` must not be empty.
    pub fn from_image<D: GraphicsDevice>(
        ctx: &mut RenderContext<D>,
        label: &str,
        image: &ImageData,
    ) -> Result<Self> {
        if image.is_empty() {
            return Err(RenderError::Validation(format!(
                "cannot upload empty image as '{label}'"
            )));
        }
        let device = ctx.device_mut();
        let id = device.create_texture(&TextureDescriptor {
            label: label.to_string(),
            width: image.width,
            height: image.height,
            format: Self::COLOR_FORMAT,
            filter: FilterMode::Linear,
            wrap: WrapMode::Repeat,
        })?;
        if let Err(e) = device.upload_texture(id, &image.pixels) {
            device.destroy_texture(id);
            return Err(e);
        }
        Ok(Self {
            id,
            width: image.width,
            height: image.height,
        })
    }

    pub fn id(&self) -> TextureId {
        self.id
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn release<D: GraphicsDevice>(self, ctx: &mut RenderContext<D>) {
        ctx.device_mut().destroy_texture(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_images_are_detected() {
        assert!(ImageData::empty().is_empty());
        assert!(ImageData::solid(0, 4, [255; 4]).is_empty());
        assert!(!ImageData::solid(2, 2, [255; 4]).is_empty());
    }

    #[test]
    fn from_rgba_checks_length() {
        assert!(ImageData::from_rgba(2, 2, vec![0; 16]).is_ok());
        let err = ImageData::from_rgba(2, 2, vec![0; 15]).unwrap_err();
        assert!(matches!(err, RenderError::Validation(_)));
    }

    #[test]
    fn solid_repeats_the_colour() {
        let img = ImageData::solid(3, 1, [1, 2, 3, 4]);
        assert_eq!(img.pixels, vec![1, 2, 3, 4, 1, 2, 3, 4, 1, 2, 3, 4]);
    }
}
