use base64::Engine;
use image::DynamicImage;
use std::borrow::Cow;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Errors raised while turning an [`ImageSource`] into pixels
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("unsupported image source: {0}")]
    Unsupported(String),

    #[error("failed to read image file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed data URL: {0}")]
    DataUrl(String),

    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
}

/// Where a garment image comes from
///
/// The cache identity of a source is its [`key`](ImageSource::key): two
/// sources with the same key are assumed to hold the same pixels.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum ImageSource {
    /// Image file on disk
    File(PathBuf),
    /// Embedded `data:image/...;base64,...` URL
    DataUrl(String),
    /// Encoded bytes already in memory, identified by a caller-chosen key
    Memory { key: String, bytes: Arc<[u8]> },
}

impl ImageSource {
    /// Interpret a stored image location.
    ///
    /// `data:` URLs are embedded images, anything else is a file path.
    /// Remote URLs are rejected; fetching is the host application's job.
    pub fn parse(location: &str) -> Result<Self, SourceError> {
        let location = location.trim();
        if location.is_empty() {
            return Err(SourceError::Unsupported("empty image location".to_string()));
        }
        if location.starts_with("data:") {
            return Ok(Self::DataUrl(location.to_string()));
        }
        if location.starts_with("http://") || location.starts_with("https://") {
            return Err(SourceError::Unsupported(format!(
                "remote URLs must be fetched by the caller: {location}"
            )));
        }
        Ok(Self::File(PathBuf::from(location.trim_start_matches("file://"))))
    }

    /// Wrap encoded bytes held in memory
    pub fn memory(key: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self::Memory {
            key: key.into(),
            bytes: bytes.into(),
        }
    }

    /// Stable identity used for caching
    pub fn key(&self) -> String {
        match self {
            Self::File(path) => format!("file:{}", path.display()),
            Self::DataUrl(url) => url.clone(),
            Self::Memory { key, .. } => format!("mem:{key}"),
        }
    }

    /// Raw encoded bytes of the image
    pub fn bytes(&self) -> Result<Cow<'_, [u8]>, SourceError> {
        match self {
            Self::File(path) => Ok(Cow::Owned(std::fs::read(path)?)),
            Self::DataUrl(url) => decode_data_url(url).map(Cow::Owned),
            Self::Memory { bytes, .. } => Ok(Cow::Borrowed(bytes)),
        }
    }

    /// Decode into pixels, guessing the format from the content
    pub fn decode(&self) -> Result<DynamicImage, SourceError> {
        let _span = tracing::debug_span!("decode").entered();
        let bytes = self.bytes()?;
        Ok(image::load_from_memory(&bytes)?)
    }
}

impl fmt::Debug for ImageSource {
    // Data URLs and byte buffers are too large to print
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => f.debug_tuple("File").field(path).finish(),
            Self::DataUrl(url) => write!(f, "DataUrl({} bytes)", url.len()),
            Self::Memory { key, bytes } => f
                .debug_struct("Memory")
                .field("key", key)
                .field("len", &bytes.len())
                .finish(),
        }
    }
}

fn decode_data_url(url: &str) -> Result<Vec<u8>, SourceError> {
    let body = url.trim_start_matches("data:");
    let (metadata, data) = body
        .split_once(',')
        .ok_or_else(|| SourceError::DataUrl("missing comma".to_string()))?;

    if !metadata.ends_with(";base64") {
        return Err(SourceError::DataUrl(format!(
            "only base64 payloads are supported, got `{metadata}`"
        )));
    }

    base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| SourceError::DataUrl(format!("base64 decode error: {e}")))
}

/// Embed PNG bytes as a `data:` URL
pub fn png_data_url(png: &[u8]) -> String {
    format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(png)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::encode_png;
    use image::{Rgba, RgbaImage};

    #[test]
    fn parse_routes_locations() {
        assert!(matches!(
            ImageSource::parse("data:image/png;base64,AAAA").unwrap(),
            ImageSource::DataUrl(_)
        ));
        assert_eq!(
            ImageSource::parse("/tmp/shirt.png").unwrap(),
            ImageSource::File(PathBuf::from("/tmp/shirt.png"))
        );
        assert!(matches!(
            ImageSource::parse("https://cdn.example.com/a.png"),
            Err(SourceError::Unsupported(_))
        ));
        assert!(ImageSource::parse("   ").is_err());
    }

    #[test]
    fn data_url_decodes_to_same_pixels() {
        let img = RgbaImage::from_pixel(3, 2, Rgba([10, 20, 30, 255]));
        let png = encode_png(&img).unwrap();
        let source = ImageSource::parse(&png_data_url(&png)).unwrap();

        let decoded = source.decode().unwrap().to_rgba8();
        assert_eq!(decoded, img);
    }

    #[test]
    fn non_base64_data_url_is_rejected() {
        let source = ImageSource::DataUrl("data:text/plain,hello".to_string());
        assert!(matches!(source.bytes(), Err(SourceError::DataUrl(_))));
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let source = ImageSource::memory("junk", vec![1u8, 2, 3, 4]);
        assert!(matches!(source.decode(), Err(SourceError::Decode(_))));
    }

    #[test]
    fn keys_distinguish_source_kinds() {
        let file = ImageSource::File(PathBuf::from("a.png"));
        let mem = ImageSource::memory("a.png", vec![0u8]);
        assert_ne!(file.key(), mem.key());
    }
}
