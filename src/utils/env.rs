/// Get environment variable with CORPDESK_ prefix, falling back to unprefixed version
///
/// Checks `CORPDESK_{key}` first, then `{key}`, so hosted platforms that
/// inject plain names (`PORT`, `DATABASE_URL`, `STRIPE_SECRET_KEY`) keep working.
pub fn get_env_with_prefix(key: &str) -> Option<String> {
    std::env::var(format!("CORPDESK_{}", key))
        .or_else(|_| std::env::var(key))
        .ok()
        .filter(|value| !value.trim().is_empty())
}

/// Parse a prefixed environment variable, ignoring values that fail to parse.
pub fn parse_env_with_prefix<T: std::str::FromStr>(key: &str) -> Option<T> {
    get_env_with_prefix(key).and_then(|value| value.trim().parse().ok())
}

/// Read a boolean flag. Accepts `true/false`, `1/0`, `yes/no`.
pub fn flag_env_with_prefix(key: &str) -> Option<bool> {
    get_env_with_prefix(key).map(|value| {
        matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
    })
}
