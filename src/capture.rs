//! Clipboard capture classification
//!
//! Turns a raw OS clipboard read into exactly one typed item, in priority
//! order file paths → image → text. Oversized text and undecodable images
//! are rejected outright — capture yields nothing rather than truncating or
//! storing partial data.

use std::io::Cursor;

use image::GenericImageView;
use url::Url;

use crate::interface::{ClipboardContent, RawCapture};
use crate::models::ClipboardItem;

/// Text payloads longer than this (in characters) are rejected.
pub(crate) const MAX_TEXT_CHARS: usize = 500;

/// Classify a raw clipboard read into a `ClipboardItem`.
/// Returns None for empty reads, oversized text and undecodable images.
pub fn classify(raw: RawCapture, source_app: Option<String>) -> Option<ClipboardItem> {
    let content = classify_content(raw)?;
    Some(ClipboardItem::new(content, source_app))
}

fn classify_content(raw: RawCapture) -> Option<ClipboardContent> {
    if !raw.file_paths.is_empty() {
        return Some(ClipboardContent::FileList {
            paths: raw.file_paths,
        });
    }

    if let Some(bytes) = raw.image_bytes {
        let (data, width, height) = reencode_png(&bytes)?;
        return Some(ClipboardContent::Image {
            data,
            width,
            height,
        });
    }

    let text = raw.text?;
    if text.trim().is_empty() {
        return None;
    }
    if text.chars().count() > MAX_TEXT_CHARS {
        tracing::debug!(chars = text.chars().count(), "capture rejected: text over cap");
        return None;
    }

    if is_url(&text) {
        Some(ClipboardContent::Url {
            value: text.trim().to_string(),
        })
    } else {
        Some(ClipboardContent::Text { value: text })
    }
}

/// A string is a URL only if it parses with both a scheme and a host.
/// Scheme-only strings like "mailto:x" or "foo:bar" stay plain text.
fn is_url(text: &str) -> bool {
    match Url::parse(text.trim()) {
        Ok(url) => url.has_host(),
        Err(_) => false,
    }
}

/// Re-encode arbitrary image bytes to PNG, the stable bitmap format stored
/// in the snapshot. Returns the encoded bytes plus pixel dimensions.
fn reencode_png(bytes: &[u8]) -> Option<(Vec<u8>, u32, u32)> {
    let decoded = match image::load_from_memory(bytes) {
        Ok(img) => img,
        Err(e) => {
            tracing::debug!(error = %e, "capture rejected: undecodable image");
            return None;
        }
    };
    let (width, height) = decoded.dimensions();

    let mut out = Vec::new();
    if let Err(e) = decoded.write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png) {
        tracing::debug!(error = %e, "capture rejected: png re-encode failed");
        return None;
    }
    Some((out, width, height))
}

/// Encode a small solid PNG for tests.
#[cfg(test)]
pub(crate) fn test_png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba([255, 0, 0, 255]));
    let mut out = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
        .unwrap();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::ItemKind;

    fn tiny_png() -> Vec<u8> {
        test_png(2, 2)
    }

    #[test]
    fn test_priority_files_over_image_over_text() {
        let raw = RawCapture {
            file_paths: vec!["/tmp/a.txt".to_string()],
            image_bytes: Some(tiny_png()),
            text: Some("hello".to_string()),
        };
        let item = classify(raw, None).unwrap();
        assert_eq!(item.kind(), ItemKind::FileList);

        let raw = RawCapture {
            file_paths: Vec::new(),
            image_bytes: Some(tiny_png()),
            text: Some("hello".to_string()),
        };
        let item = classify(raw, None).unwrap();
        assert_eq!(item.kind(), ItemKind::Image);
    }

    #[test]
    fn test_url_requires_scheme_and_host() {
        assert_eq!(
            classify(RawCapture::text("https://example.com/x"), None)
                .unwrap()
                .kind(),
            ItemKind::Url
        );
        // No scheme
        assert_eq!(
            classify(RawCapture::text("example.com"), None).unwrap().kind(),
            ItemKind::Text
        );
        // Scheme but no host
        assert_eq!(
            classify(RawCapture::text("mailto:user@example.com"), None)
                .unwrap()
                .kind(),
            ItemKind::Text
        );
        assert_eq!(
            classify(RawCapture::text("plain words"), None).unwrap().kind(),
            ItemKind::Text
        );
    }

    #[test]
    fn test_oversized_text_rejected_not_truncated() {
        let long = "a".repeat(MAX_TEXT_CHARS + 1);
        assert!(classify(RawCapture::text(long), None).is_none());

        let exact = "a".repeat(MAX_TEXT_CHARS);
        assert!(classify(RawCapture::text(exact), None).is_some());
    }

    #[test]
    fn test_empty_read_yields_nothing() {
        assert!(classify(RawCapture::default(), None).is_none());
        assert!(classify(RawCapture::text("   \n"), None).is_none());
    }

    #[test]
    fn test_undecodable_image_rejected() {
        let raw = RawCapture::image(vec![0xde, 0xad, 0xbe, 0xef]);
        assert!(classify(raw, None).is_none());
    }

    #[test]
    fn test_image_reencoded_with_dimensions() {
        let item = classify(RawCapture::image(tiny_png()), None).unwrap();
        match item.content {
            crate::interface::ClipboardContent::Image { ref data, width, height } => {
                assert_eq!((width, height), (2, 2));
                // PNG magic
                assert_eq!(&data[..4], &[0x89, b'P', b'N', b'G']);
            }
            _ => panic!("Expected Image content"),
        }
    }

    #[test]
    fn test_source_app_recorded() {
        let item = classify(RawCapture::text("hi"), Some("Safari".to_string())).unwrap();
        assert_eq!(item.source_app.as_deref(), Some("Safari"));
    }
}
