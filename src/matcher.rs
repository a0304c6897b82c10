//! Host name matching against rule patterns

/// Prefix marking a suffix-wildcard pattern
pub const WILDCARD_PREFIX: &str = "*.";

/// Check whether `host` matches `pattern`.
///
/// `*.example.com` matches any host ending in `example.com`, including
/// `example.com` itself. There is no label-boundary check, so
/// `badexample.com` matches as well. Any other pattern must equal the host
/// exactly. Comparison is case-sensitive.
pub fn matches(host: &str, pattern: &str) -> bool {
    match pattern.strip_prefix(WILDCARD_PREFIX) {
        Some(suffix) => host.ends_with(suffix),
        None => host == pattern,
    }
}
