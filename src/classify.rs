//! Link classification for raw catalog image links.
//!
//! [`classify`] is pure and total: any string, including empty input or
//! garbage, yields a [`ClassifiedLink`]. Unrecognized input is
//! [`LinkKind::Unknown`] and is passed through unchanged by the service.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use tracing::trace;
use url::Url;

/// Matches a path that already ends in a displayable image extension.
#[allow(clippy::expect_used)]
static IMAGE_EXTENSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\.(jpe?g|png|gif|webp)$").expect("image extension regex is valid") // Static pattern, safe to panic
});

/// Yandex Disk public-link hosts (`disk.yandex.ru`, `disk.360.yandex.ru`, `yadi.sk`, ...).
#[allow(clippy::expect_used)]
static DISK_HOST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:disk\.(?:360\.)?yandex\.[a-z]{2,3}(?:\.[a-z]{2})?|yadi\.sk)$")
        .expect("disk host regex is valid") // Static pattern, safe to panic
});

/// Imgur hash identifiers.
#[allow(clippy::expect_used)]
static IMGUR_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9]{5,10}$").expect("imgur id regex is valid") // Static pattern, safe to panic
});

/// Hosts whose URLs are already direct image downloads regardless of extension.
const DIRECT_DOWNLOAD_HOSTS: [&str; 1] = ["getfile.dokpub.com"];

/// External image hosting provider families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    /// Yandex Disk public folders and files (container family).
    YandexDisk,
    /// Imgur albums and images (album family).
    Imgur,
}

impl Provider {
    /// Stable provider name used for logging and rate-limiter keys.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::YandexDisk => "yandex-disk",
            Self::Imgur => "imgur",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Classification tag of a raw link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkKind {
    /// Already a direct image URL; no resolution work needed.
    DirectImage,
    /// Yandex Disk public folder (`/d/<id>`).
    DiskFolder,
    /// Yandex Disk public file (`/i/<id>` or `/client/disk/...`).
    DiskFile,
    /// Imgur album or gallery (`/a/<id>`, `/gallery/<id>`).
    ImgurAlbum,
    /// Imgur single image page or media link without an image extension.
    ImgurImage,
    /// Anything else, including empty and malformed input.
    Unknown,
}

impl LinkKind {
    /// Returns the provider whose resolver handles this kind, if any.
    #[must_use]
    pub fn provider(self) -> Option<Provider> {
        match self {
            Self::DiskFolder | Self::DiskFile => Some(Provider::YandexDisk),
            Self::ImgurAlbum | Self::ImgurImage => Some(Provider::Imgur),
            Self::DirectImage | Self::Unknown => None,
        }
    }

    /// Returns true if resolving this kind calls an external provider.
    #[must_use]
    pub fn requires_resolution(self) -> bool {
        self.provider().is_some()
    }
}

/// A raw link together with its deterministic classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedLink {
    /// Classification tag.
    pub kind: LinkKind,
    /// Trimmed link, with `https://` prepended when the scheme was missing.
    pub normalized: String,
    /// Provider identifier extracted from the path (Imgur hash, Disk key).
    pub identifier: Option<String>,
}

impl ClassifiedLink {
    fn new(kind: LinkKind, normalized: impl Into<String>, identifier: Option<String>) -> Self {
        Self {
            kind,
            normalized: normalized.into(),
            identifier,
        }
    }

    fn unknown(normalized: impl Into<String>) -> Self {
        Self::new(LinkKind::Unknown, normalized, None)
    }
}

/// Classifies a raw link. Never fails; unrecognized input is `Unknown`.
///
/// # Examples
///
/// ```
/// use linkproxy_core::classify::{LinkKind, classify};
///
/// assert_eq!(classify("https://site.example/img/abc.jpg").kind, LinkKind::DirectImage);
/// assert_eq!(classify("https://disk.yandex.ru/d/AbCd").kind, LinkKind::DiskFolder);
/// assert_eq!(classify("https://imgur.com/a/Xy12Z").kind, LinkKind::ImgurAlbum);
/// assert_eq!(classify("").kind, LinkKind::Unknown);
/// ```
#[must_use]
pub fn classify(raw: &str) -> ClassifiedLink {
    let normalized = normalize(raw);
    let Ok(url) = Url::parse(&normalized) else {
        trace!(raw, "unparseable link classified as unknown");
        return ClassifiedLink::unknown(normalized);
    };
    if !matches!(url.scheme(), "http" | "https") {
        return ClassifiedLink::unknown(normalized);
    }
    let Some(host) = url.host_str().map(canonical_host) else {
        return ClassifiedLink::unknown(normalized);
    };

    // An image extension wins over any provider pattern: nothing to resolve.
    if IMAGE_EXTENSION_RE.is_match(url.path()) || DIRECT_DOWNLOAD_HOSTS.contains(&host.as_str())
    {
        return ClassifiedLink::new(LinkKind::DirectImage, normalized, None);
    }

    let segments: Vec<&str> = url
        .path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();

    if DISK_HOST_RE.is_match(&host) {
        return classify_disk(normalized, &segments);
    }

    match host.as_str() {
        "imgur.com" | "m.imgur.com" => classify_imgur_page(normalized, &segments),
        "i.imgur.com" => classify_imgur_media(normalized, &segments),
        _ => ClassifiedLink::unknown(normalized),
    }
}

fn classify_disk(normalized: String, segments: &[&str]) -> ClassifiedLink {
    match segments {
        ["d", key, ..] => {
            let key = (*key).to_string();
            ClassifiedLink::new(LinkKind::DiskFolder, normalized, Some(key))
        }
        ["i", key, ..] => {
            let key = (*key).to_string();
            ClassifiedLink::new(LinkKind::DiskFile, normalized, Some(key))
        }
        ["client", "disk", rest @ ..] if !rest.is_empty() => {
            let key = rest.join("/");
            ClassifiedLink::new(LinkKind::DiskFile, normalized, Some(key))
        }
        _ => ClassifiedLink::unknown(normalized),
    }
}

fn classify_imgur_page(normalized: String, segments: &[&str]) -> ClassifiedLink {
    match segments {
        ["a" | "gallery", slug, ..] => match imgur_id_from_slug(slug) {
            Some(id) => ClassifiedLink::new(LinkKind::ImgurAlbum, normalized, Some(id)),
            None => ClassifiedLink::unknown(normalized),
        },
        [single] if IMGUR_ID_RE.is_match(single) => {
            let id = (*single).to_string();
            ClassifiedLink::new(LinkKind::ImgurImage, normalized, Some(id))
        }
        _ => ClassifiedLink::unknown(normalized),
    }
}

fn classify_imgur_media(normalized: String, segments: &[&str]) -> ClassifiedLink {
    let [file] = segments else {
        return ClassifiedLink::unknown(normalized);
    };
    let stem = file.split('.').next().unwrap_or_default();
    if IMGUR_ID_RE.is_match(stem) {
        let id = stem.to_string();
        ClassifiedLink::new(LinkKind::ImgurImage, normalized, Some(id))
    } else {
        ClassifiedLink::unknown(normalized)
    }
}

/// Gallery slugs look like `some-title-words-AbC12de`; the hash is the last part.
fn imgur_id_from_slug(slug: &str) -> Option<String> {
    let candidate = slug.rsplit('-').next().unwrap_or(slug);
    IMGUR_ID_RE
        .is_match(candidate)
        .then(|| candidate.to_string())
}

fn normalize(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.contains("://") || trimmed.starts_with('/') {
        return trimmed.to_string();
    }
    if looks_like_bare_host(trimmed) {
        format!("https://{trimmed}")
    } else {
        trimmed.to_string()
    }
}

fn looks_like_bare_host(value: &str) -> bool {
    let host = value.split('/').next().unwrap_or_default();
    !value.chars().any(char::is_whitespace)
        && host.contains('.')
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':'))
}

fn canonical_host(host: &str) -> String {
    host.trim()
        .trim_start_matches("www.")
        .trim_end_matches('.')
        .to_ascii_lowercase()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_direct_image_unchanged() {
        let link = classify("https://site.example/img/abc.jpg");
        assert_eq!(link.kind, LinkKind::DirectImage);
        assert_eq!(link.normalized, "https://site.example/img/abc.jpg");
    }

    #[test]
    fn test_classify_direct_image_extension_case_insensitive() {
        assert_eq!(
            classify("https://site.example/A.JPEG?w=200").kind,
            LinkKind::DirectImage
        );
        assert_eq!(
            classify("http://cdn.example/pic.webp").kind,
            LinkKind::DirectImage
        );
    }

    #[test]
    fn test_classify_extension_wins_over_provider_host() {
        assert_eq!(
            classify("https://i.imgur.com/AbC12de.png").kind,
            LinkKind::DirectImage
        );
        assert_eq!(
            classify("https://disk.yandex.ru/i/photo.jpg").kind,
            LinkKind::DirectImage
        );
    }

    #[test]
    fn test_classify_mirror_host_is_direct() {
        let link = classify("https://getfile.dokpub.com/yandex/get/https://disk.yandex.ru/i/abc");
        assert_eq!(link.kind, LinkKind::DirectImage);
    }

    #[test]
    fn test_classify_disk_folder() {
        let link = classify("https://disk.yandex.ru/d/Qw3rTy-folder");
        assert_eq!(link.kind, LinkKind::DiskFolder);
        assert_eq!(link.identifier.as_deref(), Some("Qw3rTy-folder"));
        assert_eq!(link.kind.provider(), Some(Provider::YandexDisk));
    }

    #[test]
    fn test_classify_disk_short_host_and_regional_domains() {
        assert_eq!(classify("https://yadi.sk/d/abc").kind, LinkKind::DiskFolder);
        assert_eq!(classify("https://disk.yandex.com/i/abc").kind, LinkKind::DiskFile);
        assert_eq!(
            classify("https://disk.yandex.com.tr/d/abc").kind,
            LinkKind::DiskFolder
        );
        assert_eq!(
            classify("https://disk.360.yandex.ru/i/abc").kind,
            LinkKind::DiskFile
        );
    }

    #[test]
    fn test_classify_disk_client_path_is_file() {
        let link = classify("https://disk.yandex.ru/client/disk/Photos/item");
        assert_eq!(link.kind, LinkKind::DiskFile);
        assert_eq!(link.identifier.as_deref(), Some("Photos/item"));
    }

    #[test]
    fn test_classify_disk_unrecognized_path_is_unknown() {
        assert_eq!(
            classify("https://disk.yandex.ru/notes").kind,
            LinkKind::Unknown
        );
    }

    #[test]
    fn test_classify_imgur_album_and_gallery() {
        let album = classify("https://imgur.com/a/Xy12Z");
        assert_eq!(album.kind, LinkKind::ImgurAlbum);
        assert_eq!(album.identifier.as_deref(), Some("Xy12Z"));

        let gallery = classify("https://imgur.com/gallery/my-cat-photos-Qw3Rt9z");
        assert_eq!(gallery.kind, LinkKind::ImgurAlbum);
        assert_eq!(gallery.identifier.as_deref(), Some("Qw3Rt9z"));
    }

    #[test]
    fn test_classify_imgur_image_page() {
        let link = classify("https://imgur.com/AbC12de");
        assert_eq!(link.kind, LinkKind::ImgurImage);
        assert_eq!(link.identifier.as_deref(), Some("AbC12de"));
        assert_eq!(link.kind.provider(), Some(Provider::Imgur));
    }

    #[test]
    fn test_classify_imgur_media_without_image_extension() {
        let link = classify("https://i.imgur.com/AbC12de.gifv");
        assert_eq!(link.kind, LinkKind::ImgurImage);
        assert_eq!(link.identifier.as_deref(), Some("AbC12de"));
    }

    #[test]
    fn test_classify_missing_scheme_is_normalized() {
        let link = classify("  disk.yandex.ru/d/abc  ");
        assert_eq!(link.kind, LinkKind::DiskFolder);
        assert_eq!(link.normalized, "https://disk.yandex.ru/d/abc");
    }

    #[test]
    fn test_classify_is_total_on_garbage() {
        for raw in [
            "",
            "   ",
            "not a url",
            "://",
            "ftp://example.com/a.jpg",
            "mailto:someone@example.com",
            "https://",
            "\u{0}\u{1f600}",
            "/relative/path",
            "https://imgur.com/",
            "https://imgur.com/a/",
        ] {
            let link = classify(raw);
            assert!(
                !link.kind.requires_resolution(),
                "garbage input {raw:?} must not require resolution"
            );
        }
    }

    #[test]
    fn test_classify_empty_is_unknown() {
        let link = classify("");
        assert_eq!(link.kind, LinkKind::Unknown);
        assert!(link.normalized.is_empty());
    }

    #[test]
    fn test_classify_is_deterministic() {
        let raw = "https://imgur.com/gallery/Qw3Rt9z";
        assert_eq!(classify(raw), classify(raw));
    }
}
