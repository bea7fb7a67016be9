//! Magnet URI and download-source validation helpers.
//!
//! Provides info-hash extraction (the deduplication key for magnet
//! submissions), source validation, and filename extraction for HTTP
//! sources.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::CoreError;

/// Matches `xt=urn:btih:<hash>` in a magnet URI (hex or base32).
fn info_hash_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[?&]xt=urn:btih:([a-zA-Z0-9]+)").expect("valid regex"))
}

/// Extract the BitTorrent info hash from a magnet URI.
///
/// Returns `None` for non-magnet strings or magnets without a
/// `urn:btih` exact topic. The hash is lowercased so it can be used
/// directly as a deduplication key.
pub fn extract_info_hash(magnet_uri: &str) -> Option<String> {
    if !magnet_uri.starts_with("magnet:") {
        return None;
    }
    info_hash_re()
        .captures(magnet_uri)
        .map(|c| c[1].to_ascii_lowercase())
}

/// Validate that a string is a magnet URI.
pub fn validate_magnet_uri(uri: &str) -> Result<(), CoreError> {
    if uri.starts_with("magnet:") {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "Not a magnet URI: '{uri}'"
        )))
    }
}

/// Validate that a download URL is non-empty and uses HTTP(S).
pub fn validate_http_url(url: &str) -> Result<(), CoreError> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation(
            "Download URL must not be empty".to_string(),
        ));
    }
    if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
        return Err(CoreError::Validation(format!(
            "Download URL must start with http:// or https://, got: '{trimmed}'"
        )));
    }
    Ok(())
}

/// Extract the `dn` (display name) parameter from a magnet URI.
///
/// The value is percent-decoded and `+` is treated as a space. Returns
/// `None` when the parameter is absent or decodes to an empty string.
pub fn extract_magnet_display_name(magnet_uri: &str) -> Option<String> {
    let query = magnet_uri.split_once('?')?.1;
    let raw = query
        .split('&')
        .find_map(|param| param.strip_prefix("dn="))?;

    // Decode into bytes first: multi-byte UTF-8 sequences arrive as
    // consecutive %XX escapes and must be reassembled before any char
    // conversion.
    let mut out = Vec::with_capacity(raw.len());
    let mut bytes = raw.bytes();
    while let Some(b) = bytes.next() {
        match b {
            b'+' => out.push(b' '),
            b'%' => {
                let hi = bytes.next();
                let lo = bytes.next();
                let decoded = match (hi, lo) {
                    (Some(hi), Some(lo)) => {
                        let hex = [hi, lo];
                        std::str::from_utf8(&hex)
                            .ok()
                            .and_then(|s| u8::from_str_radix(s, 16).ok())
                    }
                    _ => None,
                };
                match decoded {
                    Some(byte) => out.push(byte),
                    None => out.push(b'%'),
                }
            }
            other => out.push(other),
        }
    }

    let decoded = String::from_utf8_lossy(&out);
    let trimmed = decoded.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Extract a filename from a URL by taking the last path segment.
///
/// Strips query parameters and fragments. Falls back to `"download"` if
/// no meaningful segment is found.
pub fn extract_filename_from_url(url: &str) -> String {
    let clean = url.split('?').next().unwrap_or(url);
    let clean = clean.split('#').next().unwrap_or(clean);

    let path = if let Some(rest) = clean
        .strip_prefix("https://")
        .or_else(|| clean.strip_prefix("http://"))
    {
        rest.find('/').map(|i| &rest[i..]).unwrap_or("")
    } else {
        clean
    };

    path.rsplit('/')
        .find(|s| !s.is_empty())
        .unwrap_or("download")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_hex_info_hash() {
        let uri = "magnet:?xt=urn:btih:C12FE1C06BBA254A9DC9F519B335AA7C1367A88A&dn=example";
        assert_eq!(
            extract_info_hash(uri).as_deref(),
            Some("c12fe1c06bba254a9dc9f519b335aa7c1367a88a")
        );
    }

    #[test]
    fn extracts_hash_after_other_params() {
        let uri = "magnet:?dn=example&xt=urn:btih:abcdef0123456789abcd";
        assert_eq!(
            extract_info_hash(uri).as_deref(),
            Some("abcdef0123456789abcd")
        );
    }

    #[test]
    fn non_magnet_yields_none() {
        assert_eq!(extract_info_hash("https://example.com"), None);
        assert_eq!(extract_info_hash(""), None);
    }

    #[test]
    fn magnet_without_btih_yields_none() {
        assert_eq!(extract_info_hash("magnet:?dn=example"), None);
    }

    #[test]
    fn validates_magnet_prefix() {
        assert!(validate_magnet_uri("magnet:?xt=urn:btih:abc").is_ok());
        assert!(validate_magnet_uri("http://example.com").is_err());
    }

    #[test]
    fn validates_http_urls() {
        assert!(validate_http_url("https://example.com/file.iso").is_ok());
        assert!(validate_http_url("http://example.com/file").is_ok());
        assert!(validate_http_url("").is_err());
        assert!(validate_http_url("   ").is_err());
        assert!(validate_http_url("ftp://example.com/file").is_err());
    }

    #[test]
    fn extracts_display_name() {
        let uri = "magnet:?xt=urn:btih:abc&dn=Some.Release.2024";
        assert_eq!(
            extract_magnet_display_name(uri).as_deref(),
            Some("Some.Release.2024")
        );
    }

    #[test]
    fn display_name_is_percent_decoded() {
        let uri = "magnet:?dn=Some%20Release+%5B2024%5D&xt=urn:btih:abc";
        assert_eq!(
            extract_magnet_display_name(uri).as_deref(),
            Some("Some Release [2024]")
        );
    }

    #[test]
    fn display_name_reassembles_multibyte_utf8() {
        let uri = "magnet:?dn=Caf%C3%A9&xt=urn:btih:abc";
        assert_eq!(extract_magnet_display_name(uri).as_deref(), Some("Café"));

        let uri = "magnet:?dn=%E6%98%A0%E7%94%BB+%5B2024%5D&xt=urn:btih:abc";
        assert_eq!(
            extract_magnet_display_name(uri).as_deref(),
            Some("映画 [2024]")
        );
    }

    #[test]
    fn missing_or_empty_display_name_is_none() {
        assert_eq!(extract_magnet_display_name("magnet:?xt=urn:btih:abc"), None);
        assert_eq!(extract_magnet_display_name("magnet:?dn=&xt=urn:btih:abc"), None);
        assert_eq!(extract_magnet_display_name("not-a-magnet"), None);
    }

    #[test]
    fn extracts_simple_filename() {
        assert_eq!(
            extract_filename_from_url("https://example.com/isos/distro.iso"),
            "distro.iso"
        );
    }

    #[test]
    fn filename_strips_query_params() {
        assert_eq!(
            extract_filename_from_url("https://example.com/file.zip?token=abc"),
            "file.zip"
        );
    }

    #[test]
    fn empty_path_returns_default() {
        assert_eq!(extract_filename_from_url("https://example.com/"), "download");
    }
}
