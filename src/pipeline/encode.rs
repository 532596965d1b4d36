//! Image encoding: `DynamicImage` → base64 PNG wrapped in `ImageData`.
//!
//! PNG keeps the digits in the statement tables crisp. JPEG ringing around
//! thin glyphs makes a 3 read like an 8, which is the worst possible error
//! in a balance sheet.

use crate::error::BilancioError;
use crate::pipeline::render::RenderedPage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a rasterised page as a base64 PNG ready for the model API.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded image → {} bytes base64", b64.len());

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

/// Encode every rendered page, keeping order.
///
/// A page that fails to encode fails the run: a missing page would silently
/// drop figures from the balance sheet.
pub fn encode_pages(pages: &[RenderedPage]) -> Result<Vec<ImageData>, BilancioError> {
    pages
        .iter()
        .map(|p| {
            encode_page(&p.image).map_err(|e| {
                BilancioError::Internal(format!(
                    "Image encoding failed for document {} page {}: {}",
                    p.document + 1,
                    p.page,
                    e
                ))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn page(document: usize, page: usize) -> RenderedPage {
        RenderedPage {
            document,
            page,
            image: DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([255, 255, 255, 255]))),
        }
    }

    #[test]
    fn encode_small_image() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let data = encode_page(&img).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert_eq!(&decoded[1..4], b"PNG");
    }

    #[test]
    fn encode_pages_keeps_count() {
        let pages = vec![page(0, 1), page(0, 2), page(1, 1)];
        let encoded = encode_pages(&pages).unwrap();
        assert_eq!(encoded.len(), 3);
    }
}
