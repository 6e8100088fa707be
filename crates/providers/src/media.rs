//! Media reference resolution.
//!
//! A media reference is one of three shapes, told apart by prefix only:
//!
//! | Prefix            | Handling                                         |
//! |-------------------|--------------------------------------------------|
//! | `http://`/`https://` | fetched with a bounded timeout                |
//! | `data:`           | split into MIME and payload, payload decoded     |
//! | anything else     | bare base64 under [`DEFAULT_MIME`]               |

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use futures::future::join_all;

/// MIME assumed for bare base64 payloads.
pub const DEFAULT_MIME: &str = "image/png";

/// Default timeout for fetching a single remote reference.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors from resolving a media reference.
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("Media reference is empty")]
    Empty,

    #[error("Malformed data URL: {0}")]
    InvalidDataUrl(String),

    #[error("Invalid base64 payload: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("Failed to fetch media: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("Media fetch returned HTTP {status} for {url}")]
    FetchStatus { status: u16, url: String },
}

/// Raw bytes of a resolved reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMedia {
    pub bytes: Vec<u8>,
    pub mime: String,
    /// File extension without the leading dot.
    pub extension: String,
}

impl ResolvedMedia {
    fn new(bytes: Vec<u8>, mime: String) -> Self {
        let extension = extension_for_mime(&mime).to_string();
        Self {
            bytes,
            mime,
            extension,
        }
    }

    /// Re-encode as unprefixed base64.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }
}

/// Outcome of [`MediaResolver::resolve_batch`], keyed by input index.
#[derive(Debug, Default)]
pub struct BatchResolution {
    pub resolved: Vec<(usize, ResolvedMedia)>,
    pub errors: Vec<(usize, MediaError)>,
}

impl BatchResolution {
    /// Human-readable summary of the failures, one per line.
    pub fn error_summary(&self) -> Option<String> {
        if self.errors.is_empty() {
            return None;
        }
        Some(
            self.errors
                .iter()
                .map(|(index, err)| format!("input {index}: {err}"))
                .collect::<Vec<_>>()
                .join("\n"),
        )
    }
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Turns media references into bytes. Cheap to clone.
#[derive(Clone)]
pub struct MediaResolver {
    client: reqwest::Client,
    timeout: Duration,
}

impl MediaResolver {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Resolve one reference into bytes, MIME type and extension.
    pub async fn resolve(&self, reference: &str) -> Result<ResolvedMedia, MediaError> {
        let reference = reference.trim();
        if is_remote(reference) {
            self.fetch(reference).await
        } else {
            decode_inline(reference)
        }
    }

    /// Resolve every reference concurrently. A failure only affects its own
    /// index.
    pub async fn resolve_batch<S: AsRef<str>>(&self, references: &[S]) -> BatchResolution {
        let results = join_all(references.iter().map(|r| self.resolve(r.as_ref()))).await;

        let mut batch = BatchResolution::default();
        for (index, result) in results.into_iter().enumerate() {
            match result {
                Ok(media) => batch.resolved.push((index, media)),
                Err(err) => {
                    tracing::warn!(index, error = %err, "Failed to resolve media reference");
                    batch.errors.push((index, err));
                }
            }
        }
        batch
    }

    /// Any reference shape as unprefixed base64. Remote references are
    /// downloaded.
    pub async fn raw_base64(&self, reference: &str) -> Result<String, MediaError> {
        let reference = reference.trim();
        if is_remote(reference) {
            return Ok(self.fetch(reference).await?.to_base64());
        }
        if reference.starts_with("data:") {
            let (_, payload) = split_data_url(reference)?;
            return Ok(payload.to_string());
        }
        if reference.is_empty() {
            return Err(MediaError::Empty);
        }
        Ok(reference.to_string())
    }

    async fn fetch(&self, url: &str) -> Result<ResolvedMedia, MediaError> {
        let response = self.client.get(url).timeout(self.timeout).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MediaError::FetchStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let header_mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_ascii_lowercase())
            .filter(|v| !v.is_empty() && v != "application/octet-stream");

        let bytes = response.bytes().await?.to_vec();
        if bytes.is_empty() {
            return Err(MediaError::Empty);
        }
        let mime = header_mime
            .or_else(|| sniff_mime(&bytes).map(str::to_string))
            .unwrap_or_else(|| DEFAULT_MIME.to_string());

        tracing::debug!(url, mime = %mime, size = bytes.len(), "Fetched media reference");
        Ok(ResolvedMedia::new(bytes, mime))
    }
}

// ---------------------------------------------------------------------------
// Pure helpers
// ---------------------------------------------------------------------------

fn is_remote(reference: &str) -> bool {
    reference.starts_with("http://") || reference.starts_with("https://")
}

/// Decode a data URL or bare base64 reference without touching the network.
pub fn decode_inline(reference: &str) -> Result<ResolvedMedia, MediaError> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Err(MediaError::Empty);
    }

    let (mime, payload) = if reference.starts_with("data:") {
        let (mime, payload) = split_data_url(reference)?;
        (mime.to_string(), payload)
    } else {
        (DEFAULT_MIME.to_string(), reference)
    };

    let bytes = STANDARD.decode(payload.trim())?;
    if bytes.is_empty() {
        return Err(MediaError::Empty);
    }
    Ok(ResolvedMedia::new(bytes, mime))
}

/// Split `data:<mime>;base64,<payload>` into its MIME type and payload.
fn split_data_url(url: &str) -> Result<(&str, &str), MediaError> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| MediaError::InvalidDataUrl("missing data: prefix".into()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| MediaError::InvalidDataUrl("missing ',' separator".into()))?;
    let mime = header
        .strip_suffix(";base64")
        .ok_or_else(|| MediaError::InvalidDataUrl("only base64 data URLs are supported".into()))?;
    let mime = if mime.is_empty() { DEFAULT_MIME } else { mime };
    Ok((mime, payload))
}

/// MIME type declared by a data URL, if `url` is one.
pub fn mime_of_data_url(url: &str) -> Option<&str> {
    split_data_url(url).ok().map(|(mime, _)| mime)
}

/// Encode bytes as `data:<mime>;base64,<payload>`.
pub fn to_data_url(bytes: &[u8], mime: &str) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

/// Bare base64 becomes a data URL under [`DEFAULT_MIME`]; URLs and data
/// URLs are returned unchanged. Nothing is decoded.
pub fn normalize_reference(reference: &str) -> String {
    let reference = reference.trim();
    if is_remote(reference) || reference.starts_with("data:") {
        reference.to_string()
    } else {
        format!("data:{DEFAULT_MIME};base64,{reference}")
    }
}

/// File extension (without dot) for a MIME type. Unknown types map to `bin`.
pub fn extension_for_mime(mime: &str) -> &'static str {
    match mime.trim().to_ascii_lowercase().as_str() {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/bmp" => "bmp",
        "image/tiff" => "tiff",
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "video/quicktime" => "mov",
        "audio/mpeg" => "mp3",
        "audio/wav" | "audio/x-wav" => "wav",
        _ => "bin",
    }
}

/// Detect a MIME type from magic bytes.
pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.len() >= 12 && &bytes[4..8] == b"ftyp" {
        return Some(if &bytes[8..10] == b"qt" {
            "video/quicktime"
        } else {
            "video/mp4"
        });
    }
    if bytes.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        return Some("video/webm");
    }
    image::guess_format(bytes).ok().map(|format| format.to_mime_type())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];

    fn resolver() -> MediaResolver {
        MediaResolver::new(reqwest::Client::new(), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn data_url_is_decoded_with_its_mime() {
        let media = resolver().resolve("data:image/png;base64,QUJD").await.unwrap();
        assert_eq!(media.bytes, b"ABC");
        assert_eq!(media.mime, "image/png");
        assert_eq!(media.extension, "png");
    }

    #[tokio::test]
    async fn bare_base64_uses_default_mime() {
        let media = resolver().resolve("QUJD").await.unwrap();
        assert_eq!(media.bytes, b"ABC");
        assert_eq!(media.mime, DEFAULT_MIME);
    }

    #[tokio::test]
    async fn batch_keeps_going_past_a_bad_item() {
        let batch = resolver()
            .resolve_batch(&["QUJD", "data:image/png,QUJD", "data:image/jpeg;base64,QUJD"])
            .await;

        let ok: Vec<usize> = batch.resolved.iter().map(|(i, _)| *i).collect();
        assert_eq!(ok, vec![0, 2]);
        assert_eq!(batch.errors.len(), 1);
        assert_eq!(batch.errors[0].0, 1);
        assert_matches!(batch.errors[0].1, MediaError::InvalidDataUrl(_));
        assert!(batch.error_summary().unwrap().starts_with("input 1:"));
    }

    #[tokio::test]
    async fn batch_reports_malformed_base64_at_its_index() {
        let batch = resolver()
            .resolve_batch(&["QUJD", "!!not-base64!!", "data:image/jpeg;base64,QUJD"])
            .await;

        assert_eq!(batch.resolved.len(), 2);
        assert_eq!(batch.resolved[0].1.bytes, b"ABC");
        assert_eq!(batch.resolved[1].1.mime, "image/jpeg");
        assert_eq!(batch.errors.len(), 1);
        assert_eq!(batch.errors[0].0, 1);
        assert_matches!(batch.errors[0].1, MediaError::InvalidBase64(_));
    }

    #[test]
    fn invalid_payloads_are_rejected() {
        assert_matches!(decode_inline("   "), Err(MediaError::Empty));
        assert_matches!(decode_inline("not base64!!"), Err(MediaError::InvalidBase64(_)));
        assert_matches!(decode_inline("data:image/png;base64"), Err(MediaError::InvalidDataUrl(_)));
    }

    #[tokio::test]
    async fn raw_base64_strips_data_url_prefix() {
        let r = resolver();
        assert_eq!(r.raw_base64("data:image/webp;base64,QUJD").await.unwrap(), "QUJD");
        assert_eq!(r.raw_base64(" QUJD ").await.unwrap(), "QUJD");
    }

    #[test]
    fn normalize_only_wraps_bare_base64() {
        assert_eq!(normalize_reference("QUJD"), "data:image/png;base64,QUJD");
        assert_eq!(normalize_reference("https://x/y.png"), "https://x/y.png");
        assert_eq!(
            normalize_reference("data:image/jpeg;base64,QUJD"),
            "data:image/jpeg;base64,QUJD"
        );
    }

    #[test]
    fn data_url_round_trip_helpers() {
        assert_eq!(to_data_url(b"ABC", "image/png"), "data:image/png;base64,QUJD");
        assert_eq!(mime_of_data_url("data:video/mp4;base64,AA=="), Some("video/mp4"));
        assert_eq!(mime_of_data_url("https://x/y.png"), None);
    }

    #[test]
    fn sniffing_recognises_images_and_video() {
        assert_eq!(sniff_mime(PNG_MAGIC), Some("image/png"));
        assert_eq!(sniff_mime(&[0xFF, 0xD8, 0xFF, 0xE0, 0, 0]), Some("image/jpeg"));
        assert_eq!(
            sniff_mime(b"\x00\x00\x00\x18ftypisom\x00\x00"),
            Some("video/mp4")
        );
        assert_eq!(sniff_mime(b"plain text"), None);
    }

    #[test]
    fn extensions_follow_mime() {
        assert_eq!(extension_for_mime("image/jpeg"), "jpg");
        assert_eq!(extension_for_mime("VIDEO/MP4"), "mp4");
        assert_eq!(extension_for_mime("application/x-unknown"), "bin");
    }
}
