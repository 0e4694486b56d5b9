//! Validation helpers for DTOs.

use validator::ValidationError;

use crate::state::membership::MAX_TITLE_CHARS;

fn invalid(code: &'static str, message: String) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

/// Validates that a title is non-blank and fits once trimmed.
pub fn validate_title(title: &str) -> Result<(), ValidationError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(invalid("title_blank", "Title must not be empty".into()));
    }
    let length = trimmed.chars().count();
    if length > MAX_TITLE_CHARS {
        return Err(invalid(
            "title_length",
            format!("Title must be at most {MAX_TITLE_CHARS} characters (got {length})"),
        ));
    }
    Ok(())
}

/// Validates a language tag of the form `xx` or `xx-YY`.
///
/// # Examples
///
/// ```ignore
/// validate_language("en")    // Ok
/// validate_language("pt-BR") // Ok
/// validate_language("EN")    // Err - uppercase language
/// validate_language("english") // Err - not a tag
/// ```
pub fn validate_language(language: &str) -> Result<(), ValidationError> {
    let (primary, region) = match language.split_once('-') {
        Some((primary, region)) => (primary, Some(region)),
        None => (language, None),
    };

    let primary_ok = primary.len() == 2 && primary.chars().all(|c| c.is_ascii_lowercase());
    let region_ok = region.is_none_or(|r| r.len() == 2 && r.chars().all(|c| c.is_ascii_uppercase()));
    if primary_ok && region_ok {
        Ok(())
    } else {
        Err(invalid(
            "language_format",
            format!("Language must look like `en` or `en-US` (got `{language}`)"),
        ))
    }
}

/// Validates a region code: 2 to 5 uppercase ASCII letters such as `EU` or `NA`.
pub fn validate_region(region: &str) -> Result<(), ValidationError> {
    if (2..=5).contains(&region.len()) && region.chars().all(|c| c.is_ascii_uppercase()) {
        Ok(())
    } else {
        Err(invalid(
            "region_format",
            format!("Region must be 2 to 5 uppercase letters (got `{region}`)"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_title() {
        assert!(validate_title("Ranked duo").is_ok());
        assert!(validate_title("  padded  ").is_ok());
        assert!(validate_title(&"x".repeat(80)).is_ok());
        assert!(validate_title("").is_err());
        assert!(validate_title("   ").is_err());
        assert!(validate_title(&"x".repeat(81)).is_err());
    }

    #[test]
    fn test_validate_language() {
        assert!(validate_language("en").is_ok());
        assert!(validate_language("pt-BR").is_ok());
        assert!(validate_language("EN").is_err());
        assert!(validate_language("en-us").is_err());
        assert!(validate_language("eng").is_err());
        assert!(validate_language("en-").is_err());
        assert!(validate_language("").is_err());
    }

    #[test]
    fn test_validate_region() {
        assert!(validate_region("EU").is_ok());
        assert!(validate_region("SEA").is_ok());
        assert!(validate_region("E").is_err());
        assert!(validate_region("EUROPE").is_err());
        assert!(validate_region("eu").is_err());
    }
}
