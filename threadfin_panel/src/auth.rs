use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LoginError {
    #[error("missing input: {}", .0.join(", "))]
    EmptyFields(Vec<String>),
    #[error("passwords do not match")]
    PasswordMismatch,
}

/// Checks a login or account form before it is submitted.
///
/// Every field must be filled in, and when a `confirm` field exists it must
/// equal `password`. Returns the submitted credentials keyed by field name.
pub fn validate_login(fields: &[(&str, &str)]) -> Result<BTreeMap<String, String>, LoginError> {
    let mut empty: Vec<String> = fields
        .iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(name, _)| name.to_string())
        .collect();
    if !empty.is_empty() {
        empty.sort();
        empty.dedup();
        return Err(LoginError::EmptyFields(empty));
    }

    let data: BTreeMap<String, String> = fields
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    if let Some(confirm) = data.get("confirm") {
        if data.get("password") != Some(confirm) {
            return Err(LoginError::PasswordMismatch);
        }
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_field_is_required() {
        let err = validate_login(&[("username", ""), ("password", "")]).unwrap_err();
        assert_eq!(
            err,
            LoginError::EmptyFields(vec!["password".to_string(), "username".to_string()])
        );
    }

    #[test]
    fn confirmation_must_match() {
        assert_eq!(
            validate_login(&[("username", "a"), ("password", "x"), ("confirm", "y")]),
            Err(LoginError::PasswordMismatch)
        );
        let ok = validate_login(&[("username", "a"), ("password", "x"), ("confirm", "x")]).unwrap();
        assert_eq!(ok.get("username").map(String::as_str), Some("a"));
    }
}
