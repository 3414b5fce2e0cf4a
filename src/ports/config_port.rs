//! Configuration access port trait.

use crate::domain::error::MultitraderError;

/// Typed getters return `Ok(None)` for a missing key and an error for a value
/// that is present but malformed.
pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    fn get_int(&self, section: &str, key: &str) -> Result<Option<i64>, MultitraderError>;
    fn get_double(&self, section: &str, key: &str) -> Result<Option<f64>, MultitraderError>;
    fn get_bool(&self, section: &str, key: &str) -> Result<Option<bool>, MultitraderError>;
    /// Keys of `section` in sorted order, empty when the section is absent.
    fn keys(&self, section: &str) -> Vec<String>;
}
