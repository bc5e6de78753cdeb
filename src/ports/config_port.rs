//! Configuration access port trait.

use crate::domain::error::PropEvalError;

/// Sectioned key/value settings. Typed getters fall back to `default` when a
/// key is missing or does not parse.
pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    fn get_int(&self, section: &str, key: &str, default: i64) -> i64;
    fn get_double(&self, section: &str, key: &str, default: f64) -> f64;
    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool;

    /// Value of a key that must be present and non-blank.
    fn require_string(&self, section: &str, key: &str) -> Result<String, PropEvalError> {
        self.get_string(section, key)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| PropEvalError::ConfigMissing {
                section: section.to_string(),
                key: key.to_string(),
            })
    }

    /// `None` when the key is absent or blank; `NaN` when it is present but
    /// not a number, so validation can reject it.
    fn get_optional_double(&self, section: &str, key: &str) -> Option<f64>;
}
