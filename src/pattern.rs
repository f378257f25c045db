//! Glob matching and key validation
//!
//! Patterns use the same `*`/`?` semantics Redis applies to `SCAN MATCH`,
//! so a pattern behaves identically against the memory store and the remote
//! backend. `*` matches any run of characters (including empty), `?` matches
//! exactly one.

use crate::errors::{CacheError, ProviderResult};

/// Validate a logical cache key
///
/// Keys must be non-empty and free of glob metacharacters and whitespace,
/// so they can never collide with pattern syntax on the wire.
pub fn validate_key(key: &str) -> ProviderResult<()> {
    if key.is_empty() {
        return Err(CacheError::Validation("key must not be empty".to_string()));
    }
    if key.chars().any(|c| c == '*' || c == '?' || c.is_whitespace()) {
        return Err(CacheError::Validation(format!(
            "key '{key}' contains glob or whitespace characters"
        )));
    }
    Ok(())
}

/// Validate a clear/invalidate pattern
pub fn validate_pattern(pattern: &str) -> ProviderResult<()> {
    if pattern.is_empty() {
        return Err(CacheError::Validation(
            "pattern must not be empty".to_string(),
        ));
    }
    if pattern.chars().any(char::is_whitespace) {
        return Err(CacheError::Validation(format!(
            "pattern '{pattern}' contains whitespace"
        )));
    }
    Ok(())
}

/// Match `text` against a glob `pattern` (`*` and `?` wildcards)
///
/// Iterative two-pointer matcher with star backtracking; linear in the
/// common case and never recursive.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();

    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut star_ti = 0usize;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            star_ti = ti;
            pi += 1;
        } else if let Some(s) = star {
            // Re-expand the last star by one character
            pi = s + 1;
            star_ti += 1;
            ti = star_ti;
        } else {
            return false;
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}
