/// Content fingerprints of plain-text projections, used to flag annotations
/// whose document changed after they were made.
use sha2::{Digest as _, Sha256};

use crate::projection::Projection;
use crate::types::ContentHash;

/// Hash the projection's plain text.
///
/// Only the text takes part: re-formatting a document (bold, italics, new
/// paragraph boundaries that add no characters) keeps the fingerprint, while
/// any inserted, deleted, or changed character alters it.
pub fn fingerprint(projection: &Projection) -> ContentHash {
    return hash_text(projection.text());
}

/// SHA-256 of arbitrary text as lowercase hex.
fn hash_text(text: &str) -> ContentHash {
    let hash = Sha256::digest(text.as_bytes());
    return ContentHash(format!("{hash:x}"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::Fragment;

    fn fingerprint_of(markup: &str) -> ContentHash {
        return fingerprint(&Projection::build(&Fragment::parse(markup)));
    }

    #[test]
    fn formatting_does_not_change_fingerprint() {
        assert_eq!(
            fingerprint_of("<p>The quick brown fox</p>"),
            fingerprint_of("<p>The <b>quick</b> <i>brown</i> fox</p>"),
        );
    }

    #[test]
    fn text_edits_change_fingerprint() {
        assert_ne!(
            fingerprint_of("<p>The quick brown fox</p>"),
            fingerprint_of("<p>The quick brown fax</p>"),
        );
    }

    #[test]
    fn fingerprint_is_lowercase_hex() {
        let ContentHash(hex) = fingerprint_of("<p>abc</p>");
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }
}
