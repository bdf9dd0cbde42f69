use heck::{ToKebabCase, ToSnakeCase};
use uuid::Uuid;

/// Namespace for ids derived from page text, so the same input always yields the same id.
const PAGEWRAP_NS_NAME: &str = "pagewrap.page-id";

/// URL-friendly form of a title: `"Getting Started"` -> `"getting-started"`.
pub fn slug(s: String) -> String {
    s.to_kebab_case()
}

/// Identifier-friendly form of a title, usable as an HTML fragment anchor.
pub fn anchor(s: String) -> String {
    s.to_snake_case()
}

/// Stable element id for a given text, or a fresh random id when called without one.
pub fn uid(val: Option<String>) -> String {
    let ns = Uuid::new_v5(&Uuid::NAMESPACE_URL, PAGEWRAP_NS_NAME.as_bytes());
    match val {
        Some(s) if !s.is_empty() => Uuid::new_v5(&ns, s.as_bytes()).to_string(),
        _ => Uuid::new_v4().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_and_anchor() {
        assert_eq!(slug("Release Notes 2024".to_string()), "release-notes-2024");
        assert_eq!(anchor("Release Notes".to_string()), "release_notes");
    }

    #[test]
    fn test_uid_is_stable_for_same_text() {
        let a = uid(Some("sidebar".to_string()));
        let b = uid(Some("sidebar".to_string()));
        assert_eq!(a, b);
        assert_ne!(a, uid(Some("footer".to_string())));
    }

    #[test]
    fn test_uid_random_without_text() {
        assert_ne!(uid(None), uid(Some(String::new())));
    }
}
