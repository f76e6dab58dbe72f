//! Name and symbol junk filter
//!
//! Cheap string checks that weed out throwaway launches before any RPC
//! is spent on them.

use regex::Regex;

/// Names and symbols that are junk on exact match (case-insensitive)
const JUNK_EXACT: &[&str] = &["test", "scam", "rug", "rugpull", "fake", "honeypot"];

/// Keyboard-mash prefixes
const JUNK_PREFIXES: &[&str] = &["asdf", "qwerty"];

lazy_static::lazy_static! {
    static ref REPETITION_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)^a{3,}$").expect("invalid repetition pattern"),
        Regex::new(r"(?i)^x{3,}$").expect("invalid repetition pattern"),
    ];
}

fn alnum_ratio(s: &str) -> f64 {
    let total = s.chars().count();
    if total == 0 {
        return 0.0;
    }
    let alnum = s.chars().filter(|c| c.is_alphanumeric()).count();
    alnum as f64 / total as f64
}

fn check_one(text: &str, what: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Some(format!("{} empty after trim", what));
    }

    let lower = trimmed.to_lowercase();
    if JUNK_EXACT.contains(&lower.as_str()) {
        return Some(format!("{} is junk word '{}'", what, lower));
    }
    for prefix in JUNK_PREFIXES {
        if lower.starts_with(prefix) {
            return Some(format!("{} starts with '{}'", what, prefix));
        }
    }
    for pattern in REPETITION_PATTERNS.iter() {
        if pattern.is_match(trimmed) {
            return Some(format!("{} is a repetition pattern", what));
        }
    }

    None
}

/// Check a token's name and symbol against the junk patterns.
/// Returns the first violation found.
pub fn junk_violation(name: Option<&str>, symbol: Option<&str>) -> Option<String> {
    if let Some(name) = name {
        if let Some(reason) = check_one(name, "name") {
            return Some(reason);
        }
        let trimmed = name.trim();
        if trimmed.chars().count() > 3 && alnum_ratio(trimmed) < 0.5 {
            return Some(format!(
                "name alphanumeric ratio {:.2} below 0.5",
                alnum_ratio(trimmed)
            ));
        }
    }

    if let Some(symbol) = symbol {
        if let Some(reason) = check_one(symbol, "symbol") {
            return Some(reason);
        }
    }

    None
}
