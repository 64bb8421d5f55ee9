// crates/rollout-storage/src/proxy.rs
// ============================================================================
// Module: Link Proxy Rewrite
// Description: Rebases signed links onto a proxy origin.
// Purpose: Let devices reach storage through a gateway instead of the provider.
// Dependencies: url
// ============================================================================

//! ## Overview
//! [`rewrite_proxy_url`] swaps the scheme, host, and port of a signed link for
//! the proxy's, joins the proxy path in front of the link path, and merges
//! query parameters. Keys present on the proxy replace the link's values for
//! that key; every other link parameter (including the signature) survives.

// ============================================================================
// SECTION: Imports
// ============================================================================

use url::Url;

// ============================================================================
// SECTION: Rewrite
// ============================================================================

/// Rewrites `origin` onto `proxy`. Returns `origin` unchanged without a proxy.
#[must_use]
pub fn rewrite_proxy_url(origin: &Url, proxy: Option<&Url>) -> Url {
    let Some(proxy) = proxy else {
        return origin.clone();
    };
    let mut rewritten = proxy.clone();
    rewritten.set_path(&join_paths(proxy.path(), origin.path()));

    let proxy_pairs: Vec<(String, String)> = proxy.query_pairs().into_owned().collect();
    let mut merged: Vec<(String, String)> = origin
        .query_pairs()
        .into_owned()
        .filter(|(key, _)| !proxy_pairs.iter().any(|(proxy_key, _)| proxy_key == key))
        .collect();
    merged.extend(proxy_pairs);
    merged.sort_by(|left, right| left.0.cmp(&right.0));
    if merged.is_empty() {
        rewritten.set_query(None);
    } else {
        rewritten.query_pairs_mut().clear().extend_pairs(merged);
    }

    rewritten.set_fragment(origin.fragment());
    rewritten
}

/// Joins two URL paths with exactly one separator between them.
fn join_paths(base: &str, tail: &str) -> String {
    let base = base.trim_end_matches('/');
    let tail = tail.trim_start_matches('/');
    if tail.is_empty() { format!("{base}/") } else { format!("{base}/{tail}") }
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions are permitted."
    )]

    use super::*;

    fn url(raw: &str) -> Url {
        Url::parse(raw).unwrap()
    }

    #[test]
    fn missing_proxy_keeps_origin() {
        let origin = url("https://bucket.s3.amazonaws.com/a/b?X-Amz-Signature=abc");
        assert_eq!(rewrite_proxy_url(&origin, None), origin);
    }

    #[test]
    fn proxy_origin_and_path_prefix_replace_provider_host() {
        let origin = url("https://bucket.s3.amazonaws.com/tenant/art?X-Amz-Signature=abc#frag");
        let proxy = url("http://gateway.local:8080/storage/");
        let rewritten = rewrite_proxy_url(&origin, Some(&proxy));
        assert_eq!(rewritten.scheme(), "http");
        assert_eq!(rewritten.host_str(), Some("gateway.local"));
        assert_eq!(rewritten.port(), Some(8080));
        assert_eq!(rewritten.path(), "/storage/tenant/art");
        assert_eq!(rewritten.query(), Some("X-Amz-Signature=abc"));
        assert_eq!(rewritten.fragment(), Some("frag"));
    }

    #[test]
    fn proxy_query_keys_override_origin_keys() {
        let origin = url("https://acct.blob.core.windows.net/c/art?sig=s1&sv=2020-10-02&route=a");
        let proxy = url("https://gateway.local?route=b&token=t");
        let rewritten = rewrite_proxy_url(&origin, Some(&proxy));
        let pairs: Vec<(String, String)> = rewritten.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("route".to_string(), "b".to_string()),
                ("sig".to_string(), "s1".to_string()),
                ("sv".to_string(), "2020-10-02".to_string()),
                ("token".to_string(), "t".to_string()),
            ]
        );
        assert_eq!(rewritten.path(), "/c/art");
    }
}
