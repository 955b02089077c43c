use crate::ValidationError;

const MAX_IDENTIFIER_LEN: usize = 128;

/// Check that a user/task/data identifier is safe to splice into paths and shell text.
///
/// Accepts `[A-Za-z0-9._@-]`, no leading `.`, no `..`.
pub fn validate_identifier(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::Empty(field));
    }
    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(ValidationError::TooLong {
            field,
            max: MAX_IDENTIFIER_LEN,
        });
    }
    if value.starts_with('.') || value.contains("..") {
        return Err(ValidationError::Traversal(field));
    }
    if let Some(ch) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '@')))
    {
        if ch == '/' || ch == '\\' {
            return Err(ValidationError::Traversal(field));
        }
        return Err(ValidationError::InvalidCharacter { field, ch });
    }
    Ok(())
}
