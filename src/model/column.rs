use crate::Result;
use anyhow::bail;
use serde::{Deserialize, Serialize};

/// The columns every combined statement carries. These are also the only columns a worker may be
/// asked to edit.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum TransactionColumn {
    #[serde(rename = "Account Name")]
    AccountName,
    #[serde(rename = "Account Type")]
    AccountType,
    Date,
    Description,
    Amount,
    Category,
}

serde_plain::derive_display_from_serialize!(TransactionColumn);
serde_plain::derive_fromstr_from_deserialize!(TransactionColumn);

impl TransactionColumn {
    /// All columns, in the order they are laid out in a freshly imported table.
    pub const ALL: [TransactionColumn; 6] = [
        TransactionColumn::AccountName,
        TransactionColumn::AccountType,
        TransactionColumn::Date,
        TransactionColumn::Description,
        TransactionColumn::Amount,
        TransactionColumn::Category,
    ];

    /// Like `FromStr`, but tolerant of case and surrounding whitespace, which is what a person
    /// typing into the menu produces.
    pub fn from_header(header: impl AsRef<str>) -> Result<TransactionColumn> {
        let wanted = header.as_ref().trim();
        match Self::ALL
            .iter()
            .find(|col| col.to_string().eq_ignore_ascii_case(wanted))
        {
            Some(col) => Ok(*col),
            None => bail!(
                "Invalid transaction column name '{wanted}', expected one of: {}",
                Self::ALL
                    .iter()
                    .map(|c| c.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }

    /// Whether the column holds a number rather than text.
    pub fn is_numeric(&self) -> bool {
        matches!(self, TransactionColumn::Amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_display_uses_header_text() {
        assert_eq!(TransactionColumn::AccountName.to_string(), "Account Name");
        assert_eq!(TransactionColumn::Amount.to_string(), "Amount");
    }

    #[test]
    fn test_from_str_exact() {
        assert_eq!(
            TransactionColumn::from_str("Account Type").unwrap(),
            TransactionColumn::AccountType
        );
        assert!(TransactionColumn::from_str("account type").is_err());
    }

    #[test]
    fn test_from_header_is_lenient() {
        assert_eq!(
            TransactionColumn::from_header(" account type ").unwrap(),
            TransactionColumn::AccountType
        );
        let err = TransactionColumn::from_header("Memo").unwrap_err();
        assert!(err.to_string().contains("Invalid transaction column name 'Memo'"));
    }
}
