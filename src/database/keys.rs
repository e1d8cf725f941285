use sha2::{Digest, Sha256};

/// Length of a directory key in hex characters.
pub const DIR_KEY_LEN: usize = 64;

/// Derives the `dir_hash` key for a directory path.
///
/// SHA-256 over the raw UTF-8 bytes, lower-case hex. The path is hashed as
/// given: `/a/b` and `/a/b/` are different directories here.
pub fn derive_key(path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn known_digest() {
        assert_eq!(
            derive_key(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            derive_key("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn deterministic_and_fixed_length() {
        let long = "/deep".repeat(2_000);
        for path in ["/", "/home/user/Music", "C:\\Users\\x", long.as_str(), "/照片/2024"] {
            let key = derive_key(path);
            assert_eq!(key, derive_key(path));
            assert_eq!(key.len(), DIR_KEY_LEN);
            assert!(key.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        }
    }

    #[test]
    fn distinct_paths_get_distinct_keys() {
        let corpus: Vec<String> = (0..500)
            .map(|i| format!("/data/set_{}/dir_{}", i % 17, i))
            .chain(["/a/b".to_string(), "/a/b/".to_string(), "/A/b".to_string()])
            .collect();
        let keys: HashSet<String> = corpus.iter().map(|p| derive_key(p)).collect();
        assert_eq!(keys.len(), corpus.len());
    }
}
