use std::fmt;

/// Minimum and maximum length for a NEAR-style account id, per the contract's
/// own account id validation rules.
pub const ACCOUNT_ID_MIN_LEN: usize = 2;
pub const ACCOUNT_ID_MAX_LEN: usize = 64;

/// A validated NEAR-style account id: dot-separated labels of lowercase
/// alphanumerics and `-`/`_`, each label non-empty, no leading/trailing or
/// consecutive separators.
///
/// All public APIs accept either an `AccountId` or a raw `&str`/`String` and
/// normalize through [`AccountId::parse`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccountId(String);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccountIdError {
    TooShort { len: usize },
    TooLong { len: usize },
    EmptyLabel,
    InvalidCharacter { label: String },
    LeadingOrTrailingSeparator,
}

impl fmt::Display for AccountIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountIdError::TooShort { len } => {
                write!(f, "account id too short: {} chars (min {})", len, ACCOUNT_ID_MIN_LEN)
            }
            AccountIdError::TooLong { len } => {
                write!(f, "account id too long: {} chars (max {})", len, ACCOUNT_ID_MAX_LEN)
            }
            AccountIdError::EmptyLabel => write!(f, "account id has an empty label"),
            AccountIdError::InvalidCharacter { label } => {
                write!(f, "account id label '{}' has an invalid character", label)
            }
            AccountIdError::LeadingOrTrailingSeparator => {
                write!(f, "account id has a leading or trailing separator")
            }
        }
    }
}

impl std::error::Error for AccountIdError {}

impl AccountId {
    /// Validate and normalize (lowercase) a raw account id string. The raw
    /// string is lowercased first, then the normalized form is what gets
    /// validated — so `"Alice.Testnet"` is accepted and normalized to
    /// `"alice.testnet"` rather than rejected for its uppercase letters.
    pub fn parse(raw: &str) -> Result<Self, AccountIdError> {
        let normalized = raw.to_ascii_lowercase();
        let len = normalized.chars().count();
        if len < ACCOUNT_ID_MIN_LEN {
            return Err(AccountIdError::TooShort { len });
        }
        if len > ACCOUNT_ID_MAX_LEN {
            return Err(AccountIdError::TooLong { len });
        }
        if normalized.starts_with('.') || normalized.ends_with('.') {
            return Err(AccountIdError::LeadingOrTrailingSeparator);
        }

        for label in normalized.split('.') {
            if label.is_empty() {
                return Err(AccountIdError::EmptyLabel);
            }
            if label.starts_with('-')
                || label.starts_with('_')
                || label.ends_with('-')
                || label.ends_with('_')
            {
                return Err(AccountIdError::InvalidCharacter {
                    label: label.to_string(),
                });
            }
            if !label
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
            {
                return Err(AccountIdError::InvalidCharacter {
                    label: label.to_string(),
                });
            }
        }

        Ok(AccountId(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&str> for AccountId {
    type Error = AccountIdError;
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        AccountId::parse(value)
    }
}

impl TryFrom<String> for AccountId {
    type Error = AccountIdError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        AccountId::parse(&value)
    }
}

impl serde::Serialize for AccountId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for AccountId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        AccountId::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_ids() {
        assert!(AccountId::parse("alice.testnet").is_ok());
        assert!(AccountId::parse("bob-2.near").is_ok());
        assert!(AccountId::parse("a_b.c-d.testnet").is_ok());
    }

    #[test]
    fn normalizes_case() {
        let id = AccountId::parse("Alice.Testnet").unwrap();
        assert_eq!(id.as_str(), "alice.testnet");
    }

    #[test]
    fn rejects_too_short() {
        assert_eq!(AccountId::parse("a"), Err(AccountIdError::TooShort { len: 1 }));
    }

    #[test]
    fn rejects_too_long() {
        let raw = "a".repeat(65);
        assert_eq!(AccountId::parse(&raw), Err(AccountIdError::TooLong { len: 65 }));
    }

    #[test]
    fn rejects_leading_trailing_dot() {
        assert!(AccountId::parse(".alice").is_err());
        assert!(AccountId::parse("alice.").is_err());
    }

    #[test]
    fn rejects_empty_label() {
        assert_eq!(AccountId::parse("alice..near"), Err(AccountIdError::EmptyLabel));
    }

    #[test]
    fn rejects_separator_at_label_edge() {
        assert!(AccountId::parse("-alice.near").is_err());
        assert!(AccountId::parse("alice-.near").is_err());
    }

    #[test]
    fn rejects_invalid_characters() {
        assert!(AccountId::parse("alice!.near").is_err());
        assert!(AccountId::parse("ALICE SPACE.near").is_err());
    }
}
