//! Random tokens for storage filenames and public lookup keys.
//!
//! Both kinds come from the thread-local CSPRNG and are rendered as
//! lowercase hex. Uniqueness against existing records is checked by the
//! caller; see `services::file_service`.

use rand::RngCore;
use std::path::Path;

/// Random bytes behind the prefix of every storage filename.
pub const STORAGE_TOKEN_BYTES: usize = 16;

/// Random bytes behind every lookup key. A lookup key is the only thing
/// standing between a public record and an anonymous reader.
pub const LOOKUP_KEY_BYTES: usize = 16;

/// How many candidates are tried before a collision is reported.
pub const MAX_NAME_ATTEMPTS: usize = 5;

pub fn random_hex(n_bytes: usize) -> String {
    let mut buf = vec![0u8; n_bytes];
    rand::rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

pub fn lookup_key() -> String {
    random_hex(LOOKUP_KEY_BYTES)
}

/// `<random-hex>_<sanitized original name>`
pub fn storage_name(original_name: &str) -> String {
    format!(
        "{}_{}",
        random_hex(STORAGE_TOKEN_BYTES),
        sanitize(original_name)
    )
}

/// Strip whitespace and neutralise anything that would split the name into
/// path segments.
pub fn sanitize(original_name: &str) -> String {
    original_name
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            other => other,
        })
        .collect()
}

/// `.` followed by the suffix after the last dot, or empty if there is none.
pub fn extension_of(name: &str) -> String {
    Path::new(name)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_hex_of_expected_length() {
        let key = lookup_key();
        assert_eq!(key.len(), LOOKUP_KEY_BYTES * 2);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(lookup_key(), lookup_key());
    }

    #[test]
    fn storage_name_prefixes_sanitized_name() {
        let name = storage_name("my notes.txt");
        let (prefix, rest) = name.split_once('_').unwrap();
        assert_eq!(prefix.len(), STORAGE_TOKEN_BYTES * 2);
        assert_eq!(rest, "mynotes.txt");
    }

    #[test]
    fn sanitize_removes_separators() {
        assert_eq!(sanitize("../etc/pass wd"), ".._etc_passwd");
        assert_eq!(sanitize("a\tb\nc"), "abc");
    }

    #[test]
    fn extension_uses_last_suffix() {
        assert_eq!(extension_of("notes.txt"), ".txt");
        assert_eq!(extension_of("archive.tar.gz"), ".gz");
        assert_eq!(extension_of("README"), "");
    }
}
