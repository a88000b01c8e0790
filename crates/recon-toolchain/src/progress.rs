//! Progress-line regex matching against the external toolchain's stdout/
//! stderr (spec.md §4.6): "image N of M", "pair I of J", "iteration X of Y".

use regex::Regex;

/// One pattern plus the normalized-fraction extractor over its captures.
pub struct ProgressPattern {
    regex: Regex,
}

impl ProgressPattern {
    fn new(pattern: &str) -> Self {
        Self { regex: Regex::new(pattern).expect("static progress pattern is valid regex") }
    }
}

/// The fixed set of progress patterns the driver checks, in order, against
/// each output line. The first match wins.
pub fn default_patterns() -> Vec<ProgressPattern> {
    vec![
        ProgressPattern::new(r"(?i)image\s+(\d+)\s*(?:/|of)\s*(\d+)"),
        ProgressPattern::new(r"(?i)pair\s+(\d+)\s*(?:/|of)\s*(\d+)"),
        ProgressPattern::new(r"(?i)iteration\s+(\d+)\s*(?:/|of)\s*(\d+)"),
    ]
}

/// Match `line` against `patterns`, returning the normalized `N/M` fraction
/// of the first pattern that matches.
pub fn extract_progress(patterns: &[ProgressPattern], line: &str) -> Option<f64> {
    for pattern in patterns {
        if let Some(caps) = pattern.regex.captures(line) {
            let n: f64 = caps.get(1)?.as_str().parse().ok()?;
            let m: f64 = caps.get(2)?.as_str().parse().ok()?;
            if m > 0.0 {
                return Some((n / m).clamp(0.0, 1.0));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_image_n_of_m() {
        let patterns = default_patterns();
        assert_eq!(extract_progress(&patterns, "Processing image 50 of 200"), Some(0.25));
    }

    #[test]
    fn matches_pair_and_iteration_variants() {
        let patterns = default_patterns();
        assert_eq!(extract_progress(&patterns, "pair 3/12"), Some(0.25));
        assert_eq!(extract_progress(&patterns, "iteration 9 of 9"), Some(1.0));
    }

    #[test]
    fn non_matching_line_returns_none() {
        let patterns = default_patterns();
        assert_eq!(extract_progress(&patterns, "Loading configuration..."), None);
    }
}
