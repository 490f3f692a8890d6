use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ApiError;

pub const VALIDATION_FAILED: &str = "参数校验失败";

/// Collects per-field messages, then fails the request all at once.
#[derive(Debug, Default)]
pub struct FieldErrors {
    errors: BTreeMap<String, Vec<String>>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.errors.entry(field.to_string()).or_default().push(message.into());
    }

    /// Record the error of a check, if any.
    pub fn check(&mut self, field: &str, result: Result<(), String>) {
        if let Err(message) = result {
            self.add(field, message);
        }
    }

    /// A required text field: absent (or blank) values get `missing`, present
    /// values go through `rule`. Returns the trimmed value when it passed.
    pub fn required(
        &mut self,
        field: &str,
        value: Option<&str>,
        missing: &str,
        rule: impl FnOnce(&str) -> Result<(), String>,
    ) -> Option<String> {
        match value.map(str::trim) {
            None | Some("") => {
                self.add(field, missing);
                None
            }
            Some(value) => match rule(value) {
                Ok(()) => Some(value.to_string()),
                Err(message) => {
                    self.add(field, message);
                    None
                }
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_result(self) -> Result<(), ApiError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::validation_error(VALIDATION_FAILED, self.errors))
        }
    }
}

/// Character length within `min..=max`.
pub fn length_between(value: &str, min: usize, max: usize, message: &str) -> Result<(), String> {
    let len = value.chars().count();
    match (min..=max).contains(&len) {
        true => Ok(()),
        false => Err(message.to_string()),
    }
}

/// School alias: 2-16 ASCII alphanumerics starting with a letter.
pub fn is_valid_alias(alias: &str) -> Result<(), String> {
    static RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"^[A-Za-z][A-Za-z0-9]{1,15}$").expect("alias pattern compiles")
    });
    match RE.is_match(alias) {
        true => Ok(()),
        false => Err("别名必须为英文缩写（2~16 位，字母开头，仅字母数字）".to_string()),
    }
}

/// Treat `None`, empty and all-whitespace strings alike.
pub fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
