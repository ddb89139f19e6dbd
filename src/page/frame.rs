use std::io::Cursor;

use anyhow::{Context, Result};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use futures::future::BoxFuture;
use image::{DynamicImage, ImageFormat, imageops::FilterType};
use reqwest::Client;

/// Captured frames are downscaled before upload so a 4K stream does not
/// flood the classifier.
pub const MAX_FRAME_WIDTH: u32 = 640;

#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub image_b64: String,
    pub width: u32,
    pub height: u32,
}

/// Decodes a captured still, downscales it to at most `MAX_FRAME_WIDTH`
/// wide preserving aspect, and re-encodes it as base64 JPEG. A decode
/// failure is the tainted-stream analogue: the caller skips the element
/// for this tick with no state change.
pub fn downscale_encode(bytes: &[u8]) -> Result<EncodedFrame> {
    let decoded = image::load_from_memory(bytes).context("failed to decode captured frame")?;
    let decoded = if decoded.width() > MAX_FRAME_WIDTH {
        decoded.resize(MAX_FRAME_WIDTH, u32::MAX, FilterType::Triangle)
    } else {
        decoded
    };

    // The JPEG encoder rejects alpha channels.
    let rgb = DynamicImage::ImageRgb8(decoded.to_rgb8());
    let (width, height) = (rgb.width(), rgb.height());

    let mut buffer = Cursor::new(Vec::new());
    rgb.write_to(&mut buffer, ImageFormat::Jpeg)
        .context("failed to encode frame as JPEG")?;

    Ok(EncodedFrame {
        image_b64: STANDARD.encode(buffer.into_inner()),
        width,
        height,
    })
}

/// Source of raw still-frame bytes for a video element. The production
/// implementation fetches the element's poster image; tests hand back
/// canned bytes.
pub trait FrameFetcher: Send + Sync {
    fn fetch<'a>(&'a self, source: &'a str) -> BoxFuture<'a, Result<Option<Vec<u8>>>>;
}

pub struct HttpFrameFetcher {
    http: Client,
}

impl HttpFrameFetcher {
    pub fn new(http: Client) -> Self {
        Self { http }
    }
}

impl FrameFetcher for HttpFrameFetcher {
    fn fetch<'a>(&'a self, source: &'a str) -> BoxFuture<'a, Result<Option<Vec<u8>>>> {
        Box::pin(async move {
            let response = self
                .http
                .get(source)
                .send()
                .await
                .with_context(|| format!("failed to fetch frame source {source}"))?;
            if !response.status().is_success() {
                return Ok(None);
            }
            let bytes = response.bytes().await?;
            Ok(Some(bytes.to_vec()))
        })
    }
}
