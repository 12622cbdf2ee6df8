use std::sync::OnceLock;

use regex::Regex;

use crate::UpcomingError;

// Same shape browsers accept for <input type="email">.
const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$";

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(EMAIL_PATTERN).expect("email pattern is valid"))
}

/// Basic format check run before a sign-in link is requested.
/// Returns the trimmed address on success.
pub fn validate_email(input: &str) -> Result<&str, UpcomingError> {
    let email = input.trim();
    if email.is_empty() {
        return Err(UpcomingError::InvalidInput("email is required".into()));
    }
    if !email_regex().is_match(email) {
        return Err(UpcomingError::InvalidInput(format!(
            "'{email}' is not a valid email address"
        )));
    }
    Ok(email)
}
