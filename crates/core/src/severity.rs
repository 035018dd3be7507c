use std::fmt;

use serde::{Deserialize, Serialize};

/// QA severity, totally ordered `Ok < Warning < Error`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Ok,
    Warning,
    Error,
}

impl Severity {
    /// Integer code stored alongside tables (0/1/2).
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Most severe of a set; `Ok` for an empty set.
    pub fn worst<I: IntoIterator<Item = Severity>>(iter: I) -> Severity {
        iter.into_iter().max().unwrap_or_default()
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Ok => write!(f, "ok"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering() {
        assert!(Severity::Ok < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
        assert_eq!(Severity::Error.code(), 2);
    }

    #[test]
    fn worst_of_empty_is_ok() {
        assert_eq!(Severity::worst(Vec::new()), Severity::Ok);
        assert_eq!(
            Severity::worst([Severity::Warning, Severity::Ok, Severity::Error]),
            Severity::Error
        );
    }
}
