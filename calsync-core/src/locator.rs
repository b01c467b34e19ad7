//! Feed address normalization.

/// Legacy subscription schemes and the scheme they are fetched over.
const SCHEME_ALIASES: &[(&str, &str)] = &[("webcals://", "https://"), ("webcal://", "https://")];

/// Turn a configured feed address into a fetchable URL.
///
/// Calendar apps publish subscription links as `webcal://host/path`, which
/// no HTTP client understands; those are rewritten to `https://`. Anything
/// else is returned unchanged apart from surrounding whitespace.
pub fn normalize_feed_url(raw: &str) -> String {
    let trimmed = raw.trim();

    for (alias, scheme) in SCHEME_ALIASES {
        if let Some(prefix) = trimmed.get(..alias.len()) {
            if prefix.eq_ignore_ascii_case(alias) {
                return format!("{}{}", scheme, &trimmed[alias.len()..]);
            }
        }
    }

    trimmed.to_string()
}
