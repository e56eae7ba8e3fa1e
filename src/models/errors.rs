//! Errors from converting raw values into model enums

/// A raw value did not map onto an enum variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidEnum(pub String);

impl std::fmt::Display for InvalidEnum {
    /// Cleanly print an invalid enum error
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for InvalidEnum {}

impl From<InvalidEnum> for crate::Error {
    /// Surface an invalid enum as a validation error
    fn from(error: InvalidEnum) -> Self {
        crate::Error::Validation(error.0)
    }
}
