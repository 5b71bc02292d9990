//! Request signing.
//!
//! The signature is the lowercase hex MD5 of every `key=value` pair, sorted by
//! key and concatenated without delimiters, followed by the secret. Sorting
//! makes it independent of the order parameters were added in.

use crate::params::ParameterSet;

/// Name of the parameter the signature travels under.
pub const SIGNATURE_KEY: &str = "sig";

/// The exact byte string that gets hashed for `params` and `secret`.
pub fn canonical_string(params: &ParameterSet, secret: &str) -> String {
    let mut buffer = String::new();
    for (key, value) in params.sorted() {
        buffer.push_str(key);
        buffer.push('=');
        buffer.push_str(value);
    }
    buffer.push_str(secret);
    buffer
}

pub fn sign(params: &ParameterSet, secret: &str) -> String {
    debug_assert!(
        !params.contains_key(SIGNATURE_KEY),
        "signature must not be part of the signed set"
    );
    format!("{:x}", md5::compute(canonical_string(params, secret).as_bytes()))
}

/// Check a signed parameter set, e.g. one received on a callback. The `sig`
/// entry itself is excluded from the recomputation.
pub fn verify(params: &ParameterSet, secret: &str) -> bool {
    let Some(expected) = params.get(SIGNATURE_KEY) else {
        return false;
    };
    let unsigned: ParameterSet = params
        .iter()
        .filter(|(k, _)| *k != SIGNATURE_KEY)
        .collect();
    sign(&unsigned, secret).eq_ignore_ascii_case(expected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(pairs: &[(&str, &str)]) -> ParameterSet {
        pairs.iter().copied().collect()
    }

    #[test]
    fn reference_case() {
        let params = set(&[("a", "1"), ("b", "2")]);
        assert_eq!(canonical_string(&params, "S"), "a=1b=2S");
        assert_eq!(sign(&params, "S"), "6e8568e2a055b40328249de76d11115e");
    }

    #[test]
    fn insertion_order_does_not_matter() {
        let forward = set(&[("method", "m"), ("api_key", "k"), ("v", "1.0"), ("uid", "7")]);
        let backward = set(&[("uid", "7"), ("v", "1.0"), ("api_key", "k"), ("method", "m")]);
        let shuffled = set(&[("api_key", "k"), ("uid", "7"), ("method", "m"), ("v", "1.0")]);
        let expected = sign(&forward, "secret");
        assert_eq!(sign(&backward, "secret"), expected);
        assert_eq!(sign(&shuffled, "secret"), expected);
    }

    #[test]
    fn any_change_changes_signature() {
        let base = sign(&set(&[("a", "1"), ("b", "2")]), "S");
        assert_ne!(sign(&set(&[("a", "1"), ("b", "3")]), "S"), base);
        assert_ne!(sign(&set(&[("a", "1"), ("b", "2")]), "T"), base);
        assert_ne!(sign(&set(&[("a", "1")]), "S"), base);
        assert_ne!(sign(&set(&[("a", "1"), ("b", "2"), ("c", "3")]), "S"), base);
    }

    #[test]
    fn output_is_lowercase_hex() {
        let sig = sign(&set(&[("x", "y")]), "S");
        assert_eq!(sig.len(), 32);
        assert!(sig.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn verify_accepts_own_signature() {
        let mut params = set(&[("a", "1"), ("b", "2")]);
        let sig = sign(&params, "S");
        params.insert(SIGNATURE_KEY, sig);
        assert!(verify(&params, "S"));
        assert!(!verify(&params, "T"));
    }

    #[test]
    fn verify_rejects_missing_signature() {
        assert!(!verify(&set(&[("a", "1")]), "S"));
    }
}
