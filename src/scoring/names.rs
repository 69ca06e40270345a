//! Entrant name normalization.
//!
//! Predictions store what the participant picked from a menu ("VER",
//! "Red Bull"); the data provider reports codes or ids ("ver", "red_bull").
//! Both sides go through the same canonical form before any comparison.

/// Driver codes: uppercase, alphanumerics only.
pub fn canonical_driver(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_uppercase)
        .collect()
}

/// Constructor names and ids: lowercase, alphanumerics only.
pub fn canonical_constructor(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Missing or blank names never match anything, including each other.
pub(crate) fn same_entrant(a: Option<&str>, b: Option<&str>, canon: fn(&str) -> String) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => {
            let a = canon(a);
            !a.is_empty() && a == canon(b)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructor_spellings_collapse() {
        assert_eq!(canonical_constructor("Red Bull"), canonical_constructor("red_bull"));
        assert_eq!(canonical_constructor("Aston Martin"), "astonmartin");
        assert_ne!(canonical_constructor("Ferrari"), canonical_constructor("Haas F1 Team"));
    }

    #[test]
    fn test_driver_codes_case_insensitive() {
        assert_eq!(canonical_driver(" ver "), "VER");
        assert!(same_entrant(Some("nor"), Some("NOR"), canonical_driver));
    }

    #[test]
    fn test_missing_never_matches() {
        assert!(!same_entrant(None, None, canonical_driver));
        assert!(!same_entrant(Some("   "), Some(""), canonical_driver));
        assert!(!same_entrant(Some("VER"), None, canonical_driver));
    }
}
