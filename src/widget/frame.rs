// SPDX-License-Identifier: MPL-2.0

//! Camera image download and decoding.
//!
//! Images are fetched over HTTP, decoded with the `image` crate and scaled
//! down to fit the widget's maximum display resolution. Decoding runs on the
//! blocking pool so large snapshots don't stall other refreshes.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Result, WidgetError};

/// Decoded camera snapshot ready to bind into a widget.
///
/// Stores straight (non-premultiplied) RGBA pixel data.
#[derive(Clone, PartialEq, Eq)]
pub struct CameraFrame {
    /// RGBA pixel data (4 bytes per pixel)
    pub data: Vec<u8>,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
}

impl std::fmt::Debug for CameraFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("data_len", &self.data.len())
            .finish()
    }
}

/// Maximum display resolution of a widget image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageBounds {
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for ImageBounds {
    fn default() -> Self {
        Self {
            max_width: 1024,
            max_height: 600,
        }
    }
}

/// Fetches and decodes the image behind a display URL.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<CameraFrame>;
}

/// Decode `bytes` and scale the result down to fit within `bounds`.
///
/// Aspect ratio is preserved. Images already inside the bounds are not
/// upscaled.
pub fn decode_bounded(bytes: &[u8], bounds: ImageBounds) -> std::result::Result<CameraFrame, image::ImageError> {
    let img = image::load_from_memory(bytes)?;

    let img = if img.width() > bounds.max_width || img.height() > bounds.max_height {
        img.resize(bounds.max_width, bounds.max_height, image::imageops::FilterType::Lanczos3)
    } else {
        img
    };

    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(CameraFrame {
        data: rgba.into_raw(),
        width,
        height,
    })
}

/// [`ImageFetcher`] using plain HTTP GET requests.
pub struct HttpImageFetcher {
    client: reqwest::Client,
    bounds: ImageBounds,
}

impl HttpImageFetcher {
    pub fn new(bounds: ImageBounds, timeout: Duration) -> std::result::Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, bounds })
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<CameraFrame> {
        let fetch_error = |details: String| WidgetError::ImageFetch {
            url: url.to_string(),
            details,
        };

        let bytes = self
            .client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| fetch_error(e.to_string()))?
            .bytes()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        if bytes.is_empty() {
            return Err(fetch_error(String::from("empty response body")));
        }

        let bounds = self.bounds;
        let frame = tokio::task::spawn_blocking(move || decode_bounded(&bytes, bounds))
            .await
            .map_err(|e| fetch_error(format!("decoder task failed: {}", e)))?
            .map_err(|e| fetch_error(e.to_string()))?;

        log::debug!("Camera image decoded: {}x{}", frame.width, frame.height);
        Ok(frame)
    }
}
