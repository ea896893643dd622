//! Inline image attachments carried as `data:` URIs

use anyhow::{Context, Result, bail};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::fs;
use std::path::Path;

/// Largest image accepted as an attachment
pub const MAX_IMAGE_BYTES: u64 = 5 * 1024 * 1024;

/// MIME type and base64 payload split out of a `data:` URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri<'a> {
    pub mime_type: &'a str,
    pub data: &'a str,
}

impl<'a> DataUri<'a> {
    /// Split `data:image/png;base64,AAAA` into `image/png` and `AAAA`.
    ///
    /// The MIME type sits between the first `:` and the first `;`, the payload
    /// is everything after the first `,`.
    pub fn parse(uri: &'a str) -> Option<Self> {
        let colon = uri.find(':')?;
        let semi = uri.find(';')?;
        let comma = uri.find(',')?;
        if semi <= colon {
            return None;
        }
        Some(Self {
            mime_type: &uri[colon + 1..semi],
            data: &uri[comma + 1..],
        })
    }
}

pub fn to_data_uri(mime_type: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime_type, STANDARD.encode(bytes))
}

fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

/// Read an image file into a `data:` URI ready to attach to a message
pub fn load_image(path: &Path) -> Result<String> {
    let mime_type = match mime_for_path(path) {
        Some(mime) => mime,
        None => bail!("Unsupported image type: {}", path.display()),
    };

    let size = fs::metadata(path)
        .with_context(|| format!("Failed to read image {}", path.display()))?
        .len();
    if size > MAX_IMAGE_BYTES {
        bail!("Image too large (Max 5MB)");
    }

    let bytes = fs::read(path)
        .with_context(|| format!("Failed to read image {}", path.display()))?;
    Ok(to_data_uri(mime_type, &bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_png_data_uri() {
        let uri = DataUri::parse("data:image/png;base64,AAAA").unwrap();
        assert_eq!(uri.mime_type, "image/png");
        assert_eq!(uri.data, "AAAA");
    }

    #[test]
    fn rejects_uri_without_markers() {
        assert!(DataUri::parse("not a uri").is_none());
        assert!(DataUri::parse("data;image/png:base64,AAAA").is_none());
    }

    #[test]
    fn builds_base64_data_uri() {
        assert_eq!(to_data_uri("image/gif", b"hi"), "data:image/gif;base64,aGk=");
    }

    #[test]
    fn loads_small_image_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dot.PNG");
        fs::write(&path, [0x89, b'P', b'N', b'G']).unwrap();

        let uri = load_image(&path).unwrap();
        let parsed = DataUri::parse(&uri).unwrap();
        assert_eq!(parsed.mime_type, "image/png");
        assert_eq!(STANDARD.decode(parsed.data).unwrap(), vec![0x89, b'P', b'N', b'G']);
    }

    #[test]
    fn refuses_oversized_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.jpg");
        let file = fs::File::create(&path).unwrap();
        file.set_len(MAX_IMAGE_BYTES + 1).unwrap();

        let err = load_image(&path).unwrap_err();
        assert_eq!(err.to_string(), "Image too large (Max 5MB)");
    }

    #[test]
    fn refuses_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, "text").unwrap();
        assert!(load_image(&path).is_err());
    }
}
