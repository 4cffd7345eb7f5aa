use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{
    codecs::{jpeg::JpegEncoder, webp::WebPEncoder},
    imageops::FilterType,
    DynamicImage, GenericImageView, ImageFormat,
};
use std::io::Cursor;
use thiserror::Error;

pub const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;
pub const THUMBNAIL_MAX_DIMENSION: u32 = 200;
pub const THUMBNAIL_QUALITY: u8 = 60;
pub const ANALYSIS_MAX_DIMENSION: u32 = 800;
pub const ANALYSIS_QUALITY: u8 = 70;

#[derive(Debug, Error)]
pub enum ThumbnailError {
    #[error("image is too large ({size} bytes, max {max})")]
    TooLarge { size: usize, max: usize },
    #[error("unsupported media type: {0}")]
    NotAnImage(String),
    #[error("invalid base64 image data: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("could not decode image: {0}")]
    Decode(#[source] image::ImageError),
    #[error("could not encode image: {0}")]
    Encode(#[source] image::ImageError),
}

/// Turns raw image bytes into the encoded thumbnail string stored on an entry.
pub trait Thumbnailer {
    fn thumbnail(&self, image: &[u8]) -> Result<String, ThumbnailError>;
}

#[derive(Clone, Copy, Debug)]
pub struct ImageThumbnailer {
    pub max_dimension: u32,
    pub quality: u8,
}

impl Default for ImageThumbnailer {
    fn default() -> Self {
        Self {
            max_dimension: THUMBNAIL_MAX_DIMENSION,
            quality: THUMBNAIL_QUALITY,
        }
    }
}

impl Thumbnailer for ImageThumbnailer {
    fn thumbnail(&self, image: &[u8]) -> Result<String, ThumbnailError> {
        Ok(resize_and_encode(image, self.max_dimension, self.quality)?.to_data_url())
    }
}

#[derive(Clone, Debug)]
pub struct EncodedImage {
    pub mime_type: &'static str,
    pub bytes: Vec<u8>,
}

impl EncodedImage {
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }
}

/// Rejects anything that is not `image/*` or is larger than `max_bytes`.
pub fn validate_upload(size: usize, mime_type: &str, max_bytes: usize) -> Result<(), ThumbnailError> {
    if !mime_type.trim().to_ascii_lowercase().starts_with("image/") {
        return Err(ThumbnailError::NotAnImage(mime_type.to_string()));
    }
    if size > max_bytes {
        return Err(ThumbnailError::TooLarge {
            size,
            max: max_bytes,
        });
    }
    Ok(())
}

/// Accepts either a `data:<mime>;base64,<payload>` URL or bare base64.
/// Returns the MIME type when the input carried one.
pub fn decode_base64_image(input: &str) -> Result<(Option<String>, Vec<u8>), ThumbnailError> {
    let input = input.trim();
    if let Some(rest) = input.strip_prefix("data:") {
        if let Some((mime, payload)) = rest.split_once(";base64,") {
            return Ok((Some(mime.to_string()), STANDARD.decode(payload)?));
        }
    }
    Ok((None, STANDARD.decode(input)?))
}

/// Scales the longer side down to `max_dimension` (never up) and re-encodes.
/// PNG and WebP keep their format (WebP is written lossless, so `quality`
/// does not apply); everything else becomes JPEG at `quality` (1-100).
pub fn resize_and_encode(
    bytes: &[u8],
    max_dimension: u32,
    quality: u8,
) -> Result<EncodedImage, ThumbnailError> {
    let format = image::guess_format(bytes).map_err(ThumbnailError::Decode)?;
    let img = image::load_from_memory(bytes).map_err(ThumbnailError::Decode)?;

    let (width, height) = fit_within(img.dimensions(), max_dimension);
    let img = if (width, height) == img.dimensions() {
        img
    } else {
        img.resize_exact(width, height, FilterType::Triangle)
    };

    let mut out = Vec::new();
    if format == ImageFormat::Png {
        img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .map_err(ThumbnailError::Encode)?;
        return Ok(EncodedImage {
            mime_type: "image/png",
            bytes: out,
        });
    }

    if format == ImageFormat::WebP {
        DynamicImage::ImageRgba8(img.to_rgba8())
            .write_with_encoder(WebPEncoder::new_lossless(&mut out))
            .map_err(ThumbnailError::Encode)?;
        return Ok(EncodedImage {
            mime_type: "image/webp",
            bytes: out,
        });
    }

    let encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
    DynamicImage::ImageRgb8(img.to_rgb8())
        .write_with_encoder(encoder)
        .map_err(ThumbnailError::Encode)?;
    Ok(EncodedImage {
        mime_type: "image/jpeg",
        bytes: out,
    })
}

fn fit_within((width, height): (u32, u32), max_dimension: u32) -> (u32, u32) {
    let max = max_dimension.max(1);
    let scale = |side: u32, long: u32| ((f64::from(side) * f64::from(max) / f64::from(long)) as u32).max(1);
    if width > height {
        if width > max {
            return (max, scale(height, width));
        }
    } else if height > max {
        return (scale(width, height), max);
    }
    (width, height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn sample(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| image::Rgb([(x % 256) as u8, (y % 256) as u8, 128]));
        let mut out = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut out), format)
            .unwrap();
        out
    }

    fn decoded_dims(data_url: &str) -> (u32, u32) {
        let (_, bytes) = decode_base64_image(data_url).unwrap();
        image::load_from_memory(&bytes).unwrap().dimensions()
    }

    #[test]
    fn fit_within_keeps_aspect_and_never_upscales() {
        assert_eq!(fit_within((1000, 500), 200), (200, 100));
        assert_eq!(fit_within((300, 900), 200), (66, 200));
        assert_eq!(fit_within((800, 800), 200), (200, 200));
        assert_eq!(fit_within((120, 80), 200), (120, 80));
        assert_eq!(fit_within((4000, 3), 200), (200, 1));
    }

    #[test]
    fn png_thumbnail_stays_png_and_is_bounded() {
        let url = ImageThumbnailer::default()
            .thumbnail(&sample(1000, 500, ImageFormat::Png))
            .unwrap();
        assert!(url.starts_with("data:image/png;base64,"));
        assert_eq!(decoded_dims(&url), (200, 100));
    }

    #[test]
    fn jpeg_thumbnail_is_jpeg() {
        let url = ImageThumbnailer::default()
            .thumbnail(&sample(300, 900, ImageFormat::Jpeg))
            .unwrap();
        assert!(url.starts_with("data:image/jpeg;base64,"));
        assert_eq!(decoded_dims(&url), (66, 200));
    }

    #[test]
    fn webp_thumbnail_stays_webp() {
        let url = ImageThumbnailer::default()
            .thumbnail(&sample(400, 400, ImageFormat::WebP))
            .unwrap();
        assert!(url.starts_with("data:image/webp;base64,"));
        assert_eq!(decoded_dims(&url), (200, 200));
    }

    #[test]
    fn small_images_keep_their_size() {
        let encoded = resize_and_encode(&sample(64, 48, ImageFormat::Png), ANALYSIS_MAX_DIMENSION, ANALYSIS_QUALITY).unwrap();
        assert_eq!(encoded.mime_type, "image/png");
        assert_eq!(image::load_from_memory(&encoded.bytes).unwrap().dimensions(), (64, 48));
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let err = ImageThumbnailer::default().thumbnail(b"definitely not an image").unwrap_err();
        assert!(matches!(err, ThumbnailError::Decode(_)));
    }

    #[test]
    fn upload_validation() {
        assert!(validate_upload(1024, "image/jpeg", MAX_UPLOAD_BYTES).is_ok());
        assert!(validate_upload(MAX_UPLOAD_BYTES, "IMAGE/PNG", MAX_UPLOAD_BYTES).is_ok());
        assert!(matches!(
            validate_upload(MAX_UPLOAD_BYTES + 1, "image/png", MAX_UPLOAD_BYTES),
            Err(ThumbnailError::TooLarge { .. })
        ));
        assert!(matches!(
            validate_upload(10, "application/pdf", MAX_UPLOAD_BYTES),
            Err(ThumbnailError::NotAnImage(_))
        ));
    }

    #[test]
    fn base64_input_with_or_without_data_url() {
        let (mime, bytes) = decode_base64_image("data:image/webp;base64,AQID").unwrap();
        assert_eq!(mime.as_deref(), Some("image/webp"));
        assert_eq!(bytes, [1, 2, 3]);

        let (mime, bytes) = decode_base64_image("AQID").unwrap();
        assert_eq!(mime, None);
        assert_eq!(bytes, [1, 2, 3]);

        assert!(matches!(decode_base64_image("!!!"), Err(ThumbnailError::Base64(_))));
    }
}
