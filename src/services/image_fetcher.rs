use async_trait::async_trait;
use image::{ImageError, ImageFormat, ImageReader};
use reqwest::{Client, StatusCode};
use std::io::Cursor;

use crate::config::FetcherConfig;

/// Bytes needed before an unknown signature is treated as "not an image".
const MIN_SNIFF_BYTES: usize = 16;

/// Retrieves an image's header and reduces it to a perimeter metric.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Returns `2 * (width + height)` of the image at `url`.
    async fn fetch(&self, url: &str) -> Result<u64, FetchError>;
}

/// `2 * (width + height)` in pixels.
pub fn perimeter(width: u32, height: u32) -> u64 {
    2 * (u64::from(width) + u64::from(height))
}

/// HTTP fetcher that streams the body only until the image header decodes.
pub struct HttpImageFetcher {
    http: Client,
    max_header_bytes: usize,
}

impl HttpImageFetcher {
    pub fn new(config: FetcherConfig) -> Result<Self, FetchError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(FetchError::Network)?;

        Ok(Self {
            http,
            max_header_bytes: config.max_header_bytes,
        })
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<u64, FetchError> {
        let mut response = self.http.get(url).send().await.map_err(FetchError::Network)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }

        let mut buf: Vec<u8> = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(FetchError::Network)? {
            buf.extend_from_slice(&chunk);

            match probe_header(&buf) {
                HeaderProbe::Decoded { format, width, height } => {
                    tracing::trace!(
                        url = %url,
                        format = ?format,
                        width,
                        height,
                        bytes_read = buf.len(),
                        "Decoded image header"
                    );
                    return Ok(perimeter(width, height));
                }
                HeaderProbe::Invalid(reason) => return Err(FetchError::DecodeFormat(reason)),
                HeaderProbe::Incomplete(_) if buf.len() >= self.max_header_bytes => {
                    return Err(FetchError::DecodeFormat(format!(
                        "no decodable image header within {} bytes",
                        self.max_header_bytes
                    )));
                }
                HeaderProbe::Incomplete(_) => {}
            }
        }

        // Body ended; whatever we have is all there is.
        match probe_header(&buf) {
            HeaderProbe::Decoded { width, height, .. } => Ok(perimeter(width, height)),
            HeaderProbe::Invalid(reason) | HeaderProbe::Incomplete(reason) => {
                Err(FetchError::DecodeFormat(reason))
            }
        }
    }
}

#[derive(Debug)]
pub(crate) enum HeaderProbe {
    Decoded {
        format: ImageFormat,
        width: u32,
        height: u32,
    },
    /// More bytes may still produce a header.
    Incomplete(String),
    /// The bytes can never become a supported image.
    Invalid(String),
}

/// Sniffs the format from `buf` and tries to read dimensions from it.
pub(crate) fn probe_header(buf: &[u8]) -> HeaderProbe {
    let reader = match ImageReader::new(Cursor::new(buf)).with_guessed_format() {
        Ok(reader) => reader,
        Err(e) => return HeaderProbe::Invalid(e.to_string()),
    };

    let Some(format) = reader.format() else {
        return if buf.len() < MIN_SNIFF_BYTES {
            HeaderProbe::Incomplete("image signature truncated".to_string())
        } else {
            HeaderProbe::Invalid("unrecognized image format".to_string())
        };
    };

    match reader.into_dimensions() {
        Ok((width, height)) => HeaderProbe::Decoded {
            format,
            width,
            height,
        },
        Err(ImageError::Unsupported(e)) => HeaderProbe::Invalid(e.to_string()),
        Err(e) => HeaderProbe::Incomplete(e.to_string()),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP {status} fetching {url}")]
    Status { url: String, status: StatusCode },

    #[error("Image decode failed: {0}")]
    DecodeFormat(String),

    #[error("Fetch task aborted: {0}")]
    Aborted(String),
}

impl FetchError {
    /// True for failures of the transfer itself rather than the payload.
    pub fn is_network(&self) -> bool {
        matches!(self, FetchError::Network(_) | FetchError::Status { .. })
    }
}
