//! Username and password policy applied at signup.

use crate::hub::{HubError, HubResult};

pub const MIN_USERNAME_LEN: usize = 2;
pub const MAX_USERNAME_LEN: usize = 16;
pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 50;
pub const SPECIAL_CHARS: &str = "!@#$%^&*()_+";

pub fn username(username: &str) -> HubResult<()> {
    in_length_range("username", username, MIN_USERNAME_LEN, MAX_USERNAME_LEN)
}

pub fn password(password: &str) -> HubResult<()> {
    in_length_range("password", password, MIN_PASSWORD_LEN, MAX_PASSWORD_LEN)?;
    if !password.chars().any(char::is_lowercase) {
        return invalid("password must contain at least one lowercase character");
    }
    if !password.chars().any(char::is_uppercase) {
        return invalid("password must contain at least one uppercase character");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return invalid("password must contain at least one number");
    }
    if !password.chars().any(|c| SPECIAL_CHARS.contains(c)) {
        return invalid(&format!(
            "password must contain at least one special character ({SPECIAL_CHARS})"
        ));
    }
    Ok(())
}

fn in_length_range(field: &str, value: &str, min: usize, max: usize) -> HubResult<()> {
    let len = value.chars().count();
    if len < min {
        return invalid(&format!("{field} length is less than {min} characters"));
    }
    if len > max {
        return invalid(&format!("{field} length is over {max} characters"));
    }
    Ok(())
}

fn invalid(message: &str) -> HubResult<()> {
    Err(HubError::Validation(message.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(result: HubResult<()>) -> String {
        match result {
            Err(HubError::Validation(message)) => message,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn short_password_fails() {
        assert!(message(password("abc")).contains("less than 8"));
    }

    #[test]
    fn complete_password_passes() {
        assert!(password("Abcdef1!").is_ok());
    }

    #[test]
    fn each_character_class_is_required() {
        assert!(message(password("ABCDEF1!")).contains("lowercase"));
        assert!(message(password("abcdef1!")).contains("uppercase"));
        assert!(message(password("Abcdefg!")).contains("number"));
        assert!(message(password("Abcdefg1")).contains("special"));
    }

    #[test]
    fn long_password_fails() {
        let long = format!("Aa1!{}", "x".repeat(MAX_PASSWORD_LEN));
        assert!(message(password(&long)).contains("over 50"));
    }

    #[test]
    fn username_bounds() {
        assert!(username("a").is_err());
        assert!(username("al").is_ok());
        assert!(username(&"a".repeat(16)).is_ok());
        assert!(message(username(&"a".repeat(17))).starts_with("username"));
    }
}
