//! Validation des identifiants de segments
//!
//! Un identifiant arrive tel quel de l'URL : il est vérifié avant tout
//! accès au disque.

use crate::error::HlsError;

/// Extensions de segments servies
pub const SEGMENT_EXTENSIONS: &[&str] = &["ts", "aac", "m4s"];

const MAX_SEGMENT_ID_LEN: usize = 128;

/// Accepte `segment_00042.ts`, refuse `../../etc/passwd`, `.hidden.ts`,
/// `a/b.ts` ou `index.m3u8`
pub fn validate_segment_id(segment: &str) -> Result<(), HlsError> {
    let invalid = || HlsError::InvalidSegment(segment.to_string());

    if segment.is_empty() || segment.len() > MAX_SEGMENT_ID_LEN {
        return Err(invalid());
    }
    if segment.starts_with('.') || segment.contains("..") {
        return Err(invalid());
    }
    if !segment
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(invalid());
    }

    match segment.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && SEGMENT_EXTENSIONS.contains(&ext) => Ok(()),
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_generated_names() {
        for ok in ["segment_00000.ts", "segment_12345.ts", "part-1.m4s", "a.aac"] {
            assert!(validate_segment_id(ok).is_ok(), "{ok} rejected");
        }
    }

    #[test]
    fn rejects_traversal_and_odd_names() {
        for bad in [
            "",
            "../../etc/passwd",
            "..",
            "segment..ts",
            ".hidden.ts",
            "a/b.ts",
            "a\\b.ts",
            "%2e%2e.ts",
            "index.m3u8",
            "segment_00000",
            ".ts",
            "seg ment.ts",
        ] {
            assert!(
                matches!(validate_segment_id(bad), Err(HlsError::InvalidSegment(_))),
                "{bad:?} accepted"
            );
        }
        assert!(validate_segment_id(&format!("{}.ts", "a".repeat(130))).is_err());
    }
}
