use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of the account that owns a transaction.
///
/// Ledger records usually only know the account name, remote records usually
/// carry both. Either half may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountRef {
    pub id: Option<String>,
    pub name: Option<String>,
}

impl AccountRef {
    pub fn new(id: Option<&str>, name: Option<&str>) -> Self {
        AccountRef {
            id: id.map(str::to_string),
            name: name.map(str::to_string),
        }
    }

    pub fn named(name: &str) -> Self {
        AccountRef::new(None, Some(name))
    }

    pub fn with_id(id: &str) -> Self {
        AccountRef::new(Some(id), None)
    }

    pub fn is_known(&self) -> bool {
        self.id.is_some() || self.name.is_some()
    }

    /// True only when both sides are known and provably different.
    ///
    /// Ids win when both sides have one; otherwise names are compared. Two
    /// references that share neither an id pair nor a name pair cannot be
    /// told apart and are never distinct.
    pub fn is_distinct_from(&self, other: &AccountRef) -> bool {
        match (&self.id, &other.id) {
            (Some(a), Some(b)) => a != b,
            _ => match (&self.name, &other.name) {
                (Some(a), Some(b)) => a != b,
                _ => false,
            },
        }
    }

    /// Case-insensitive substring test against the account name.
    pub fn name_contains(&self, needle: &str) -> bool {
        match &self.name {
            Some(name) => name.to_lowercase().contains(&needle.to_lowercase()),
            None => false,
        }
    }
}

impl fmt::Display for AccountRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.name, &self.id) {
            (Some(name), _) => write!(f, "{name}"),
            (None, Some(id)) => write!(f, "#{id}"),
            (None, None) => write!(f, "<unknown account>"),
        }
    }
}

/// Root classification of a ledger account name (`Assets:Bank:Checking`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountKind {
    Assets,
    Liabilities,
    Equity,
    Income,
    Expenses,
}

impl AccountKind {
    pub fn of(account_name: &str) -> Option<AccountKind> {
        let root = account_name.split(':').next().unwrap_or_default();
        match root {
            "Assets" => Some(AccountKind::Assets),
            "Liabilities" => Some(AccountKind::Liabilities),
            "Equity" => Some(AccountKind::Equity),
            "Income" => Some(AccountKind::Income),
            "Expenses" => Some(AccountKind::Expenses),
            _ => None,
        }
    }

    /// Where money actually sits: the legs a transfer moves between.
    pub fn is_balance_sheet(self) -> bool {
        matches!(self, AccountKind::Assets | AccountKind::Liabilities)
    }

    /// Category legs, which a confirmed transfer re-points.
    pub fn is_category(self) -> bool {
        matches!(self, AccountKind::Income | AccountKind::Expenses)
    }
}

impl fmt::Display for AccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountKind::Assets => write!(f, "Assets"),
            AccountKind::Liabilities => write!(f, "Liabilities"),
            AccountKind::Equity => write!(f, "Equity"),
            AccountKind::Income => write!(f, "Income"),
            AccountKind::Expenses => write!(f, "Expenses"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_by_id_when_both_have_ids() {
        let a = AccountRef::new(Some("1"), Some("Checking"));
        let b = AccountRef::new(Some("2"), Some("Checking"));
        assert!(a.is_distinct_from(&b));
        assert!(!a.is_distinct_from(&a.clone()));
    }

    #[test]
    fn falls_back_to_name_when_an_id_is_missing() {
        let a = AccountRef::new(Some("1"), Some("Assets:Checking"));
        let b = AccountRef::named("Assets:Savings");
        assert!(a.is_distinct_from(&b));

        let c = AccountRef::named("Assets:Checking");
        assert!(!a.is_distinct_from(&c));
    }

    #[test]
    fn unknown_accounts_are_never_distinct() {
        let a = AccountRef::default();
        let b = AccountRef::named("Assets:Savings");
        assert!(!a.is_distinct_from(&b));
        assert!(!b.is_distinct_from(&a));
        // id on one side, name on the other: nothing to compare
        assert!(!AccountRef::with_id("7").is_distinct_from(&b));
    }

    #[test]
    fn name_contains_is_case_insensitive() {
        let a = AccountRef::named("Assets:Wise:EUR");
        assert!(a.name_contains("wise"));
        assert!(!a.name_contains("revolut"));
        assert!(!AccountRef::with_id("1").name_contains("wise"));
    }

    #[test]
    fn account_kind_from_root_segment() {
        assert_eq!(AccountKind::of("Assets:Bank:Checking"), Some(AccountKind::Assets));
        assert_eq!(AccountKind::of("Expenses:Food"), Some(AccountKind::Expenses));
        assert_eq!(AccountKind::of("Income"), Some(AccountKind::Income));
        assert_eq!(AccountKind::of("Budget:Food"), None);
        assert!(AccountKind::Liabilities.is_balance_sheet());
        assert!(AccountKind::Income.is_category());
        assert!(!AccountKind::Equity.is_category());
    }

    #[test]
    fn display_prefers_name() {
        assert_eq!(AccountRef::new(Some("3"), Some("Checking")).to_string(), "Checking");
        assert_eq!(AccountRef::with_id("3").to_string(), "#3");
    }
}
