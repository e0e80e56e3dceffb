//! # QR Codes
//!
//! Businesses print these next to the counter. Scanning one opens the public
//! fill page of the SPA, `<base>/<form id>`, which then loads the form through
//! `GET /api/feedback-forms/{id}`.
use std::io::Cursor;

use base64::{Engine, engine::general_purpose::STANDARD};
use image::{GrayImage, ImageFormat, Luma};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use qrcode::{Color, EcLevel, QrCode, types::QrError};
use thiserror::Error;

pub const QR_WIDTH: u32 = 320;
pub const QR_MARGIN: u32 = 2;

/// Characters left alone by a URI path component encoder.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

#[derive(Error, Debug)]
pub enum QrImageError {
    #[error("QR encoding failed: {0:?}")]
    Encode(QrError),

    #[error("PNG encoding failed: {0}")]
    Png(#[from] image::ImageError),
}

pub fn normalize_base_url(base_url: &str) -> &str {
    base_url.trim().trim_end_matches('/')
}

pub fn form_url(base_url: &str, form_id: &str) -> String {
    format!(
        "{}/{}",
        normalize_base_url(base_url),
        utf8_percent_encode(form_id, COMPONENT)
    )
}

/// Grayscale PNG, error correction M, `QR_MARGIN` light modules on each side,
/// scaled up to at least `QR_WIDTH` pixels.
pub fn render_png(data: &str) -> Result<Vec<u8>, QrImageError> {
    let code = QrCode::with_error_correction_level(data.as_bytes(), EcLevel::M)
        .map_err(QrImageError::Encode)?;

    let modules = code.width() as u32;
    let colors = code.to_colors();
    let span = modules + 2 * QR_MARGIN;
    let scale = QR_WIDTH.div_ceil(span).max(1);
    let size = span * scale;

    let image = GrayImage::from_fn(size, size, |x, y| {
        let (column, row) = (x / scale, y / scale);
        let inside = (QR_MARGIN..QR_MARGIN + modules).contains(&column)
            && (QR_MARGIN..QR_MARGIN + modules).contains(&row);

        let dark = inside && {
            let index = (row - QR_MARGIN) * modules + (column - QR_MARGIN);
            colors[index as usize] == Color::Dark
        };

        Luma([if dark { 0 } else { 255 }])
    });

    let mut png = Vec::new();
    image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;

    Ok(png)
}

pub fn png_data_url(png: &[u8]) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(png))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_url() {
        assert_eq!(
            form_url("https://frontend.example.com/forms/", "abc"),
            "https://frontend.example.com/forms/abc"
        );
        assert_eq!(
            form_url("  http://localhost:5173/feedback-forms/// ", "abc"),
            "http://localhost:5173/feedback-forms/abc"
        );
        assert_eq!(
            form_url("http://x.test", "a b/c?d"),
            "http://x.test/a%20b%2Fc%3Fd"
        );
        assert_eq!(form_url("http://x.test", "it's-(ok)"), "http://x.test/it's-(ok)");
    }

    #[test]
    fn test_render_png() {
        let data = "https://frontend.example.com/forms/abc";
        let png = render_png(data).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");

        let decoded = image::load_from_memory_with_format(&png, ImageFormat::Png)
            .unwrap()
            .to_luma8();
        assert!(decoded.width() >= QR_WIDTH);
        assert_eq!(decoded.width(), decoded.height());

        let modules = QrCode::with_error_correction_level(data, EcLevel::M)
            .unwrap()
            .width() as u32;
        let scale = decoded.width() / (modules + 2 * QR_MARGIN);

        // quiet margin, then the top-left finder pattern
        assert_eq!(decoded.get_pixel(0, 0).0, [255]);
        let corner = QR_MARGIN * scale;
        assert_eq!(decoded.get_pixel(corner, corner).0, [0]);
    }

    #[test]
    fn test_data_url() {
        let url = png_data_url(b"\x89PNG");
        assert!(url.starts_with("data:image/png;base64,"));
        assert_eq!(url, "data:image/png;base64,iVBORw==");
    }
}
