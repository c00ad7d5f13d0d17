use std::path::Path;

use crate::{data_structures::texture::ImageData, errors::RenderWarning, resources::load_binary};

/// Decode an image file to RGBA8.
///
/// A missing or undecodable file is not an error: it is reported as a
/// warning and yields an empty image, which meshes treat as "no texture".
pub async fn load_image(root: &Path, file_name: &str) -> ImageData {
    match try_load_image(root, file_name).await {
        Ok(image) => image,
        Err(e) => {
            RenderWarning::AssetMissing {
                path: file_name.to_string(),
                reason: format!("{e:#}"),
            }
            .emit();
            ImageData::empty()
        }
    }
}

async fn try_load_image(root: &Path, file_name: &str) -> anyhow::Result<ImageData> {
    let bytes = load_binary(root, file_name).await?;
    decode_image(&bytes)
}

/// Decode in-memory image bytes, format guessed from the content.
pub fn decode_image(bytes: &[u8]) -> anyhow::Result<ImageData> {
    let img = image::load_from_memory(bytes)?;
    Ok(img.to_rgba8().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_png_bytes() {
        let mut png = Vec::new();
        image::RgbaImage::from_pixel(2, 3, image::Rgba([10, 20, 30, 255]))
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let data = decode_image(&png).unwrap();
        assert_eq!((data.width, data.height), (2, 3));
        assert_eq!(&data.pixels[..4], &[10, 20, 30, 255]);
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(decode_image(b"not an image").is_err());
    }

    #[tokio::test]
    async fn missing_file_yields_empty_image() {
        let dir = tempfile::tempdir().unwrap();
        let image = load_image(dir.path(), "nope.png").await;
        assert!(image.is_empty());
    }
}
