//! Common utility functions

use url::Url;

/// Mask sensitive data for logging
pub fn mask_sensitive(data: &str) -> String {
    if data.chars().count() <= 8 {
        "***".to_string()
    } else {
        let chars: Vec<char> = data.chars().collect();
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}***{}", head, tail)
    }
}

/// Mask the path and query of a webhook URL for logging.
///
/// Chat webhook URLs carry their credential in the path
/// (`/api/webhooks/<id>/<token>`), so only the origin is kept verbatim.
///
/// # Examples
///
/// ```
/// use atw_core::mask_url;
///
/// assert_eq!(mask_url("https://example.com"), "https://example.com");
/// assert_eq!(
///     mask_url("https://discord.com/api/webhooks/123/abcdefgh"),
///     "https://discord.com/api/***efgh"
/// );
/// assert_eq!(mask_url("not a url"), "***");
/// ```
pub fn mask_url(raw: &str) -> String {
    let Ok(parsed) = Url::parse(raw) else {
        return "***".to_string();
    };
    let origin = parsed.origin().ascii_serialization();
    let mut rest = parsed.path().trim_start_matches('/').to_string();
    if let Some(query) = parsed.query() {
        rest.push('?');
        rest.push_str(query);
    }
    if rest.is_empty() {
        origin
    } else {
        format!("{}/{}", origin, mask_sensitive(&rest))
    }
}
