use crate::output::CliError;
use chrono::NaiveDate;
use snag_core::ErrorCode;

pub const MAX_TITLE_LEN: usize = 200;
pub const MAX_USERNAME_LEN: usize = 64;
pub const MAX_FILE_REF_LEN: usize = 1_024;
pub const MAX_COMMENT_BODY_CHARS: usize = 8_192;

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: &'static str,
    pub value: String,
    pub reason: String,
    pub suggestion: String,
}

impl ValidationError {
    pub fn new(
        field: &'static str,
        value: impl Into<String>,
        reason: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self {
            field,
            value: value.into(),
            reason: reason.into(),
            suggestion: suggestion.into(),
        }
    }

    pub fn to_cli_error(&self) -> CliError {
        CliError::coded(
            ErrorCode::InvalidInput,
            format!("invalid {} '{}': {}", self.field, self.value, self.reason),
        )
        .with_suggestion(self.suggestion.clone())
    }
}

pub fn validate_title(s: &str) -> Result<(), ValidationError> {
    if s.trim().is_empty() {
        return Err(ValidationError::new(
            "title",
            s,
            "must not be empty",
            "provide a non-empty title",
        ));
    }
    if s.chars().count() > MAX_TITLE_LEN {
        return Err(ValidationError::new(
            "title",
            s,
            format!("must be <= {MAX_TITLE_LEN} characters"),
            "shorten the title",
        ));
    }
    if s.chars().any(char::is_control) {
        return Err(ValidationError::new(
            "title",
            s,
            "must not contain control characters",
            "remove control characters from the title",
        ));
    }
    Ok(())
}

pub fn validate_username(s: &str) -> Result<(), ValidationError> {
    if s.is_empty() || s.len() > MAX_USERNAME_LEN {
        return Err(ValidationError::new(
            "username",
            s,
            format!("must be 1-{MAX_USERNAME_LEN} characters"),
            "use a short login name like 'mia'",
        ));
    }
    if !s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(ValidationError::new(
            "username",
            s,
            "may only contain letters, digits, '-', '_' or '.'",
            "use a short login name like 'mia'",
        ));
    }
    Ok(())
}

pub fn parse_date(field: &'static str, s: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|err| {
        ValidationError::new(field, s, err.to_string(), "use a calendar date like 2026-11-30")
    })
}

pub fn validate_file_ref(s: &str) -> Result<(), ValidationError> {
    if s.trim().is_empty() {
        return Err(ValidationError::new(
            "file",
            s,
            "must not be empty",
            "pass a path or URL to the stored file",
        ));
    }
    if s.len() > MAX_FILE_REF_LEN || s.chars().any(char::is_control) {
        return Err(ValidationError::new(
            "file",
            s,
            format!("must be <= {MAX_FILE_REF_LEN} bytes without control characters"),
            "pass a path or URL to the stored file",
        ));
    }
    Ok(())
}

pub fn validate_comment_body(s: &str) -> Result<(), ValidationError> {
    if s.trim().is_empty() {
        return Err(ValidationError::new(
            "comment",
            s,
            "must not be empty",
            "write something in the comment",
        ));
    }
    if s.chars().count() > MAX_COMMENT_BODY_CHARS {
        return Err(ValidationError::new(
            "comment",
            format!("{}...", s.chars().take(32).collect::<String>()),
            format!("must be <= {MAX_COMMENT_BODY_CHARS} characters"),
            "split the note into several comments",
        ));
    }
    Ok(())
}
