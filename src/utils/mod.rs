//! Environment helpers and small shared utilities.

pub mod env;

pub use env::{flag_env_with_prefix, get_env_with_prefix, parse_env_with_prefix};

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Bytes from the operating system's CSPRNG.
pub fn secure_random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Generate a random URL-safe token (32 bytes of entropy).
pub fn generate_token() -> String {
    URL_SAFE_NO_PAD.encode(secure_random_bytes::<32>())
}

/// Hash a token for storage. Only hashes are persisted; raw tokens travel by email or URL.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Whether `url` is `base` itself or a path, query or fragment below it.
///
/// A bare prefix match would accept `https://app.example.com.evil.test`.
pub fn is_under_base_url(url: &str, base: &str) -> bool {
    let base = base.trim_end_matches('/');
    match url.strip_prefix(base) {
        Some(rest) => rest.is_empty() || rest.starts_with(['/', '?', '#']),
        None => false,
    }
}

/// Format an amount in minor units, e.g. `(125000, "usd")` -> `USD 1,250.00`.
pub fn format_money(amount_cents: i64, currency: &str) -> String {
    let negative = amount_cents < 0;
    let cents = amount_cents.unsigned_abs();
    let whole = (cents / 100).to_string();

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    format!(
        "{}{} {}.{:02}",
        if negative { "-" } else { "" },
        currency.to_uppercase(),
        grouped,
        cents % 100
    )
}

/// Escape text for inclusion in HTML element content or attribute values.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_under_base_url() {
        let base = "https://app.corpdesk.test/";
        assert!(is_under_base_url("https://app.corpdesk.test", base));
        assert!(is_under_base_url("https://app.corpdesk.test/billing", base));
        assert!(is_under_base_url("https://app.corpdesk.test?tab=plan", base));
        assert!(is_under_base_url("https://app.corpdesk.test#top", base));
        assert!(!is_under_base_url("https://app.corpdesk.test.evil.example/phish", base));
        assert!(!is_under_base_url("https://app.corpdesk.testing/", base));
        assert!(!is_under_base_url("https://app.corpdesk.test:8443/", base));
        assert!(!is_under_base_url("https://app.corpdesk.test@evil.example/", base));
        assert!(!is_under_base_url("http://app.corpdesk.test/billing", base));
    }

    #[test]
    fn test_token_hash_is_stable_and_distinct() {
        let token = generate_token();
        assert_eq!(token.len(), 43);
        assert_eq!(hash_token(&token), hash_token(&token));
        assert_ne!(hash_token(&token), token);
        assert_ne!(generate_token(), token);
    }

    #[test]
    fn test_format_money() {
        assert_eq!(format_money(125_000, "usd"), "USD 1,250.00");
        assert_eq!(format_money(5, "eur"), "EUR 0.05");
        assert_eq!(format_money(100_000_000, "usd"), "USD 1,000,000.00");
        assert_eq!(format_money(-2_550, "gbp"), "-GBP 25.50");
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & Jerry's</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; Jerry&#39;s&lt;/a&gt;"
        );
    }
}
