use crate::errors::{AppError, AppResult};
use once_cell::sync::Lazy;
use regex::Regex;

pub const MAX_TITLE_CHARS: usize = 120;
pub const MAX_NAME_CHARS: usize = 80;
pub const MAX_DESCRIPTION_CHARS: usize = 2_000;
pub const MAX_NOTES_CHARS: usize = 5_000;
pub const MAX_MESSAGE_CHARS: usize = 500;
pub const MAX_CATEGORIES: usize = 10;
pub const DEFAULT_GROUP_COLOR: &str = "#1f2937";

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));

static HEX_COLOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#[0-9A-Fa-f]{6}$").expect("valid color regex"));

/// Trims and bounds a required single-line field.
pub fn required_text(field: &str, value: &str, max_chars: usize) -> AppResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{} is required", field)));
    }
    if trimmed.chars().count() > max_chars {
        return Err(AppError::Validation(format!(
            "{} must be at most {} characters",
            field, max_chars
        )));
    }
    Ok(trimmed.to_string())
}

pub fn optional_text(field: &str, value: Option<&str>, max_chars: usize) -> AppResult<Option<String>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(trimmed) if trimmed.chars().count() > max_chars => Err(AppError::Validation(format!(
            "{} must be at most {} characters",
            field, max_chars
        ))),
        Some(trimmed) => Ok(Some(trimmed.to_string())),
    }
}

pub fn email(value: &str) -> AppResult<String> {
    let normalized = value.trim().to_lowercase();
    if !EMAIL_RE.is_match(&normalized) {
        return Err(AppError::Validation("Email address is not valid".to_string()));
    }
    Ok(normalized)
}

pub fn text_color(value: Option<&str>) -> AppResult<Option<String>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(color) if HEX_COLOR_RE.is_match(color) => Ok(Some(color.to_lowercase())),
        Some(color) => Err(AppError::Validation(format!(
            "Text color '{}' must be a #rrggbb hex value",
            color
        ))),
    }
}

pub fn categories(values: &[String]) -> AppResult<Vec<String>> {
    if values.len() > MAX_CATEGORIES {
        return Err(AppError::Validation(format!(
            "At most {} categories are allowed",
            MAX_CATEGORIES
        )));
    }
    let mut normalized: Vec<String> = Vec::with_capacity(values.len());
    for value in values {
        let category = required_text("Category", value, MAX_NAME_CHARS)?;
        if !normalized.iter().any(|existing| existing.eq_ignore_ascii_case(&category)) {
            normalized.push(category);
        }
    }
    Ok(normalized)
}

pub fn identifier(field: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{} is required", field)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{categories, email, optional_text, required_text, text_color};
    use crate::errors::AppError;

    #[test]
    fn required_text_trims_and_bounds() {
        assert_eq!(required_text("Title", "  Plan  ", 10).expect("valid"), "Plan");
        assert!(matches!(
            required_text("Title", "   ", 10),
            Err(AppError::Validation(_))
        ));
        assert!(required_text("Title", "abcdefghijk", 10).is_err());
        assert_eq!(optional_text("Notes", Some("  "), 10).expect("blank"), None);
    }

    #[test]
    fn emails_are_normalized() {
        assert_eq!(email(" Alice@Example.COM ").expect("valid"), "alice@example.com");
        assert!(email("not-an-email").is_err());
    }

    #[test]
    fn colors_must_be_hex() {
        assert_eq!(text_color(Some("#A1B2C3")).expect("valid"), Some("#a1b2c3".to_string()));
        assert!(text_color(Some("red")).is_err());
        assert_eq!(text_color(None).expect("none"), None);
    }

    #[test]
    fn categories_are_deduplicated() {
        let values = vec!["Eng".to_string(), "eng".to_string(), "Ops".to_string()];
        assert_eq!(categories(&values).expect("valid"), vec!["Eng", "Ops"]);
    }
}
