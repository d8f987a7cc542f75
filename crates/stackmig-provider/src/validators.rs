//! Attribute validators
//!
//! Each check short-circuits on its first failure and reports through
//! [`ProviderError`], which the resource turns into an attribute-scoped
//! diagnostic.

use crate::error::{ProviderError, Result};
use crate::model::attr;
use regex::Regex;
use stackmig_archive::ArchiveError;
use stackmig_framework::Value;
use std::path::PathBuf;
use std::sync::LazyLock;

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9 _-]+$").unwrap_or_else(|e| panic!("identifier pattern: {e}"))
});

/// Length bounds (inclusive, in characters) for a handle attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentifierRule {
    pub attribute: &'static str,
    pub min: usize,
    pub max: usize,
}

pub const ORG_RULE: IdentifierRule = IdentifierRule {
    attribute: attr::ORG,
    min: 1,
    max: 40,
};

pub const PROJECT_RULE: IdentifierRule = IdentifierRule {
    attribute: attr::PROJECT,
    min: 3,
    max: 40,
};

pub const NAME_RULE: IdentifierRule = IdentifierRule {
    attribute: attr::NAME,
    min: 1,
    max: 90,
};

impl IdentifierRule {
    fn invalid(&self, message: impl Into<String>) -> ProviderError {
        ProviderError::InvalidConfig {
            attribute: self.attribute.to_string(),
            message: message.into(),
        }
    }

    pub fn check(&self, value: &Value<String>) -> Result<()> {
        let value = match value {
            Value::Known(v) => v,
            Value::Null => return Err(self.invalid("value must not be null")),
            Value::Unknown => return Err(self.invalid("value must be known at plan time")),
        };

        let len = value.chars().count();
        if len < self.min || len > self.max {
            return Err(self.invalid(format!(
                "length must be between {} and {} characters, got {}",
                self.min, self.max, len
            )));
        }

        if !IDENTIFIER.is_match(value) {
            return Err(self.invalid(format!(
                "'{}' may only contain letters, digits, spaces, '_' and '-'",
                value
            )));
        }

        Ok(())
    }
}

/// Validate `config_file_dir`: known, absolute, existing, a directory.
///
/// A relative path is an invalid configuration; a missing path or a
/// non-directory surfaces as the archive's invalid-path error.
pub fn check_config_dir(value: &Value<String>) -> Result<PathBuf> {
    let invalid = |message: &str| ProviderError::InvalidConfig {
        attribute: attr::CONFIG_FILE_DIR.to_string(),
        message: message.to_string(),
    };

    let path = match value {
        Value::Known(p) => p,
        Value::Null => return Err(invalid("value must not be null")),
        Value::Unknown => return Err(invalid("value must be known at plan time")),
    };

    match stackmig_archive::check_directory(path) {
        Ok(dir) => Ok(dir),
        Err(ArchiveError::NotAbsolute(p)) => Err(invalid(&format!(
            "path must be absolute, got '{}'",
            p.display()
        ))),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known(s: &str) -> Value<String> {
        Value::known(s)
    }

    fn rejected(rule: IdentifierRule, value: &Value<String>) -> bool {
        matches!(
            rule.check(value),
            Err(ProviderError::InvalidConfig { attribute, .. }) if attribute == rule.attribute
        )
    }

    #[test]
    fn test_org_length_bounds() {
        assert!(rejected(ORG_RULE, &known("")));
        assert!(rejected(ORG_RULE, &known(&"a".repeat(41))));
        assert!(ORG_RULE.check(&known("a")).is_ok());
        assert!(ORG_RULE.check(&known(&"a".repeat(40))).is_ok());
    }

    #[test]
    fn test_project_length_bounds() {
        assert!(rejected(PROJECT_RULE, &known("ab")));
        assert!(rejected(PROJECT_RULE, &known(&"a".repeat(41))));
        assert!(PROJECT_RULE.check(&known("abc")).is_ok());
        assert!(PROJECT_RULE.check(&known(&"a".repeat(40))).is_ok());
    }

    #[test]
    fn test_name_length_bounds() {
        assert!(rejected(NAME_RULE, &known("")));
        assert!(rejected(NAME_RULE, &known(&"a".repeat(91))));
        assert!(NAME_RULE.check(&known("a")).is_ok());
        assert!(NAME_RULE.check(&known(&"a".repeat(90))).is_ok());
    }

    #[test]
    fn test_identifier_charset() {
        assert!(NAME_RULE.check(&known("payments api_v2-eu")).is_ok());
        assert!(rejected(NAME_RULE, &known("payments/eu")));
        assert!(rejected(NAME_RULE, &known("payments.eu")));
    }

    #[test]
    fn test_null_and_unknown_rejected() {
        assert!(rejected(ORG_RULE, &Value::Null));
        assert!(rejected(ORG_RULE, &Value::Unknown));
    }

    #[test]
    fn test_config_dir_checks() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("main.tf");
        std::fs::write(&file, "# empty").unwrap();

        assert!(check_config_dir(&known(dir.path().to_str().unwrap())).is_ok());

        assert!(matches!(
            check_config_dir(&known("relative/cfg")),
            Err(ProviderError::InvalidConfig { .. })
        ));
        assert!(matches!(
            check_config_dir(&known(dir.path().join("missing").to_str().unwrap())),
            Err(ProviderError::Archive(e)) if e.is_invalid_path()
        ));
        assert!(matches!(
            check_config_dir(&known(file.to_str().unwrap())),
            Err(ProviderError::Archive(e)) if e.is_invalid_path()
        ));
        assert!(matches!(
            check_config_dir(&Value::Unknown),
            Err(ProviderError::InvalidConfig { .. })
        ));
    }
}
