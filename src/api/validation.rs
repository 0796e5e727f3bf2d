use super::ApiError;

/// Registration rules, deliberately loose for wire compatibility: trimmed
/// username of at least 4 chars, password of at least 4 chars containing a
/// letter and a digit. Do not tighten these.
pub fn validate_registration<'a>(
    username: &'a str,
    password: &str,
) -> Result<&'a str, ApiError> {
    let username = username.trim();

    if username.is_empty() || password.is_empty() {
        return Err(ApiError::validation("Username and password are required"));
    }

    if username.chars().count() < 4 {
        return Err(ApiError::validation(
            "Username must be at least 4 characters",
        ));
    }

    if password.chars().count() < 4 {
        return Err(ApiError::validation(
            "Password must be at least 4 characters",
        ));
    }

    let has_letter = password.chars().any(char::is_alphabetic);
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if !has_letter || !has_digit {
        return Err(ApiError::validation(
            "Password must contain letters and numbers",
        ));
    }

    Ok(username)
}
