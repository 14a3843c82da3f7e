//! Cleaning of OCR'd dropdown lines into account labels.

use once_cell::sync::Lazy;
use regex::Regex;

static SEPARATOR_ARTIFACTS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[|\\/]").expect("static artifact pattern"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static whitespace pattern"));

/// Turn one OCR line into an account label, or `None` if it is noise.
///
/// Lines shorter than `min_length`, lines starting with a non-alphanumeric
/// character and lines containing `...` are dropped. `|`, `\` and `/` are
/// stripped and whitespace runs collapse to `_`.
pub fn clean_line(line: &str, min_length: usize) -> Option<String> {
    let line = line.trim();
    if line.chars().count() < min_length {
        return None;
    }
    if !line.chars().next().is_some_and(char::is_alphanumeric) {
        return None;
    }
    if line.contains("...") {
        return None;
    }

    let stripped = SEPARATOR_ARTIFACTS.replace_all(line, "");
    let cleaned = WHITESPACE.replace_all(stripped.trim(), "_");
    if !cleaned.chars().any(char::is_alphanumeric) {
        return None;
    }
    Some(cleaned.into_owned())
}

/// Clean every line of an OCR text block, keeping order.
pub fn clean_lines<'a>(lines: impl IntoIterator<Item = &'a str>, min_length: usize) -> Vec<String> {
    lines
        .into_iter()
        .filter_map(|l| clean_line(l, min_length))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_plain_labels() {
        assert_eq!(clean_line("ACC_001", 3).as_deref(), Some("ACC_001"));
        assert_eq!(clean_line("  Main Account  ", 3).as_deref(), Some("Main_Account"));
    }

    #[test]
    fn test_drops_noise() {
        assert_eq!(clean_line("ab", 3), None);
        assert_eq!(clean_line("- header", 3), None);
        assert_eq!(clean_line("Account...", 3), None);
        assert_eq!(clean_line("", 3), None);
    }

    #[test]
    fn test_strips_artifacts() {
        assert_eq!(clean_line("IRA | 4421", 3).as_deref(), Some("IRA_4421"));
        assert_eq!(clean_line("Joint\\Acct/2", 3).as_deref(), Some("JointAcct2"));
    }

    #[test]
    fn test_clean_lines_preserves_order() {
        let text = "ZETA\nalpha\n..\nmid dle";
        assert_eq!(clean_lines(text.lines(), 3), vec!["ZETA", "alpha", "mid_dle"]);
    }

    #[test]
    fn test_cleaned_lines_are_valid_account_ids() {
        let text = "A |\n|||\nB \\ /\n  \t \n9\nx/y";
        let cleaned = clean_lines(text.lines(), 0);
        assert_eq!(cleaned, vec!["A", "B", "9", "xy"]);
        for line in &cleaned {
            assert!(deltamon_core::AccountId::new(line).is_ok(), "{line:?}");
        }
    }
}
