//! Fuzzy metadata comparison helpers.
//!
//! Extracted size and flavor text comes from small shelf-tag fonts and is
//! noisy in both value and formatting, so every comparison here is lenient:
//! an unparseable or incomparable side never disqualifies a candidate.

use std::sync::OnceLock;

use regex::Regex;

/// Relative size tolerance: two sizes within 20% of each other (after unit
/// conversion) count as matching.
pub const SIZE_TOLERANCE: f64 = 0.20;

const BRAND_JARO_WINKLER_THRESHOLD: f64 = 0.90;
const FLAVOR_LEVENSHTEIN_THRESHOLD: f64 = 0.80;

/// Lowercases and strips punctuation, collapsing runs of whitespace.
#[must_use]
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_was_space = true;
    for c in text.to_lowercase().chars() {
        if c.is_alphanumeric() {
            out.push(c);
            last_was_space = false;
        } else if !last_was_space {
            out.push(' ');
            last_was_space = true;
        }
    }
    out.trim_end().to_string()
}

/// Normalized whitespace-split tokens.
#[must_use]
pub fn tokens(text: &str) -> Vec<String> {
    normalize(text)
        .split_whitespace()
        .map(ToOwned::to_owned)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum SizeKind {
    /// Canonical unit: millilitres.
    Volume,
    /// Canonical unit: grams.
    Mass,
    /// Unit-less pack counts.
    Count,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ParsedSize {
    kind: SizeKind,
    canonical: f64,
}

fn size_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(fl\s?oz|oz|ml|l|liter|litre|g|kg|lb|ct|count|pack|pk)\b")
            .expect("size regex is valid")
    })
}

fn parse_size_text(text: &str) -> Option<ParsedSize> {
    let captures = size_regex().captures(text)?;
    let value: f64 = captures.get(1)?.as_str().parse().ok()?;
    let unit = captures.get(2)?.as_str().to_lowercase().replace(' ', "");

    let (kind, canonical) = match unit.as_str() {
        // Shelf beverage convention: bare "oz" is fluid ounces.
        "oz" | "floz" => (SizeKind::Volume, value * 29.5735),
        "ml" => (SizeKind::Volume, value),
        "l" | "liter" | "litre" => (SizeKind::Volume, value * 1000.0),
        "g" => (SizeKind::Mass, value),
        "kg" => (SizeKind::Mass, value * 1000.0),
        "lb" => (SizeKind::Mass, value * 453.592),
        "ct" | "count" | "pack" | "pk" => (SizeKind::Count, value),
        _ => return None,
    };

    Some(ParsedSize { kind, canonical })
}

/// Compares two free-text size descriptors with ±20% tolerance after unit
/// conversion.
///
/// Returns `true` when either side is missing, unparseable, or measured in
/// an incomparable unit kind — extraction noise must not disqualify a
/// candidate on size grounds.
#[must_use]
pub fn sizes_compatible(a: Option<&str>, b: Option<&str>) -> bool {
    let (Some(a), Some(b)) = (a, b) else {
        return true;
    };
    let (Some(a), Some(b)) = (parse_size_text(a), parse_size_text(b)) else {
        return true;
    };
    if a.kind != b.kind {
        return true;
    }
    let larger = a.canonical.max(b.canonical);
    if larger <= 0.0 {
        return true;
    }
    (a.canonical - b.canonical).abs() / larger <= SIZE_TOLERANCE
}

/// Compares two brand strings tolerating minor spelling variation.
#[must_use]
pub fn brands_match(a: &str, b: &str) -> bool {
    let a = normalize(a);
    let b = normalize(b);
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a == b || strsim::jaro_winkler(&a, &b) >= BRAND_JARO_WINKLER_THRESHOLD
}

/// Compares two flavor strings semantically rather than as exact text:
/// normalized equality, prefix/substring containment ("Strawberry" ≈
/// "Straw"), or a close edit distance all count as matching.
#[must_use]
pub fn flavors_match(a: &str, b: &str) -> bool {
    let a = normalize(a);
    let b = normalize(b);
    if a.is_empty() || b.is_empty() {
        return false;
    }
    if a == b || a.contains(&b) || b.contains(&a) {
        return true;
    }
    strsim::normalized_levenshtein(&a, &b) >= FLAVOR_LEVENSHTEIN_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_punctuation_and_case() {
        assert_eq!(normalize("Coca-Cola, Classic!"), "coca cola classic");
        assert_eq!(normalize("  LaCroix  "), "lacroix");
    }

    #[test]
    fn parses_common_size_formats() {
        assert!(parse_size_text("12oz").is_some());
        assert!(parse_size_text("12 oz").is_some());
        assert!(parse_size_text("355 ml").is_some());
        assert!(parse_size_text("1.5 L").is_some());
        assert!(parse_size_text("16.9 fl oz").is_some());
        assert!(parse_size_text("no size here").is_none());
    }

    #[test]
    fn oz_and_ml_are_unit_equivalent() {
        // 12 fl oz ≈ 354.9 ml — well within tolerance of 355 ml.
        assert!(sizes_compatible(Some("12 oz"), Some("355 ml")));
    }

    #[test]
    fn ten_percent_difference_is_within_tolerance() {
        assert!(sizes_compatible(Some("12 oz"), Some("13.2 oz")));
    }

    #[test]
    fn twenty_five_percent_difference_is_rejected() {
        assert!(!sizes_compatible(Some("12 oz"), Some("16 oz")));
    }

    #[test]
    fn missing_or_unparseable_sizes_are_compatible() {
        assert!(sizes_compatible(None, Some("12 oz")));
        assert!(sizes_compatible(Some("family size"), Some("12 oz")));
        assert!(sizes_compatible(None, None));
    }

    #[test]
    fn incomparable_unit_kinds_are_compatible() {
        // A pack count against a volume cannot be judged either way.
        assert!(sizes_compatible(Some("6 pack"), Some("12 oz")));
    }

    #[test]
    fn brands_match_exact_and_near_spellings() {
        assert!(brands_match("LaCroix", "La Croix"));
        assert!(brands_match("Coca-Cola", "coca cola"));
        assert!(!brands_match("Pepsi", "Coca-Cola"));
        assert!(!brands_match("", "Pepsi"));
    }

    #[test]
    fn flavors_match_truncated_extraction() {
        assert!(flavors_match("Strawberry", "Straw"));
        assert!(flavors_match("Black Cherry", "black cherry"));
        assert!(!flavors_match("Lime", "Grapefruit"));
    }
}
