//! Impressões digitais para correspondência exata.

use sha2::{Digest, Sha256};

use crate::types::Input;

/// SHA-256 dos bytes brutos da entrada, em hexadecimal.
///
/// Sem normalização: `"a red cube"` e `"a red cube "` têm impressões
/// diferentes e só se encontram pela fase de similaridade.
pub fn fingerprint(input: &Input) -> String {
    fingerprint_bytes(input.raw_bytes())
}

pub fn fingerprint_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_stable_hex() {
        let fp = fingerprint(&Input::text("a red cube"));
        assert_eq!(fp.len(), 64);
        assert_eq!(fp, fingerprint(&Input::text("a red cube")));
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_fingerprint_known_value() {
        assert_eq!(
            fingerprint_bytes(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_text_and_image_with_same_bytes_share_fingerprint() {
        // Modalidades ficam em tabelas separadas, então isso nunca colide.
        let text = fingerprint(&Input::text("abc"));
        let image = fingerprint(&Input::image_bytes(b"abc".to_vec()));
        assert_eq!(text, image);
    }

    #[test]
    fn test_whitespace_matters() {
        assert_ne!(
            fingerprint(&Input::text("a red cube")),
            fingerprint(&Input::text("a red cube "))
        );
    }
}
