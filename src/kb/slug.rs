use std::collections::HashSet;

pub const FALLBACK_SLUG: &str = "article";

/// Lowercase ASCII letters and digits joined by single dashes.
pub fn slugify(title: &str) -> String {
    let slug = title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");

    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug
    }
}

/// `base` if free, otherwise the first of `base-2`, `base-3`, ... not in
/// `taken`.
pub fn unique_slug<S: AsRef<str>>(base: &str, taken: &[S]) -> String {
    let taken: HashSet<&str> = taken.iter().map(|s| s.as_ref()).collect();
    if !taken.contains(base) {
        return base.to_string();
    }
    (2u32..)
        .map(|n| format!("{base}-{n}"))
        .find(|candidate| !taken.contains(candidate.as_str()))
        .unwrap_or_else(|| format!("{base}-{}", uuid::Uuid::new_v4().simple()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Reset your VPN password"), "reset-your-vpn-password");
        assert_eq!(slugify("  Wi-Fi: 5GHz -- setup!! "), "wi-fi-5ghz-setup");
        assert_eq!(slugify("Ünïcode café"), "n-code-caf");
        assert_eq!(slugify("!!!"), FALLBACK_SLUG);
        assert_eq!(slugify(""), FALLBACK_SLUG);
    }

    #[test]
    fn test_unique_slug() {
        let none: [&str; 0] = [];
        assert_eq!(unique_slug("printer", &none), "printer");
        assert_eq!(unique_slug("printer", &["printer"]), "printer-2");
        assert_eq!(
            unique_slug("printer", &["printer", "printer-2", "printer-4"]),
            "printer-3"
        );
        assert_eq!(unique_slug("printer", &["printer-2"]), "printer");
    }
}
