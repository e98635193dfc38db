use chrono::NaiveDate;
use pairwise_core::Amount;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// A metadata value as it appears after `key:` on an indented line.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    String(String),
    Number(Decimal),
    Bool(bool),
    Date(NaiveDate),
    /// Any other unquoted text, kept verbatim (`1200.00 USD`).
    Raw(String),
}

impl MetaValue {
    /// Ids made only of digits are written as bare numbers, anything else is
    /// quoted. Leading zeros force a string so the id survives a rewrite.
    pub fn from_id(id: &str) -> MetaValue {
        let numeric = !id.is_empty()
            && id.bytes().all(|b| b.is_ascii_digit())
            && (id == "0" || !id.starts_with('0'));
        match Decimal::from_str(id) {
            Ok(n) if numeric => MetaValue::Number(n),
            _ => MetaValue::String(id.to_string()),
        }
    }

    /// Unquoted textual content, whatever the variant.
    pub fn to_text(&self) -> String {
        match self {
            MetaValue::String(s) | MetaValue::Raw(s) => s.clone(),
            MetaValue::Number(n) => n.to_string(),
            MetaValue::Bool(true) => "TRUE".to_string(),
            MetaValue::Bool(false) => "FALSE".to_string(),
            MetaValue::Date(d) => d.format("%Y-%m-%d").to_string(),
        }
    }
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaValue::String(s) => write!(f, "{}", crate::format::quote(s)),
            other => write!(f, "{}", other.to_text()),
        }
    }
}

pub type Meta = BTreeMap<String, MetaValue>;

#[derive(Debug, Clone, PartialEq)]
pub struct Posting {
    pub account: String,
    pub amount: Option<Amount>,
}

impl Posting {
    pub fn new(account: &str, amount: Option<Amount>) -> Self {
        Posting {
            account: account.to_string(),
            amount,
        }
    }
}

/// Where an entry was read from. Line numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceLocation {
    pub file: PathBuf,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub date: NaiveDate,
    pub flag: String,
    pub payee: Option<String>,
    pub narration: String,
    pub tags: Vec<String>,
    pub links: Vec<String>,
    pub meta: Meta,
    pub postings: Vec<Posting>,
    pub source: Option<SourceLocation>,
}

impl Entry {
    pub fn new(date: NaiveDate, narration: &str) -> Self {
        Entry {
            date,
            flag: "*".to_string(),
            payee: None,
            narration: narration.to_string(),
            tags: Vec::new(),
            links: Vec::new(),
            meta: Meta::new(),
            postings: Vec::new(),
            source: None,
        }
    }

    pub fn id(&self) -> Option<String> {
        self.meta_text("id")
    }

    pub fn meta_text(&self, key: &str) -> Option<String> {
        self.meta.get(key).map(MetaValue::to_text)
    }

    pub fn set_meta(&mut self, key: &str, value: MetaValue) {
        self.meta.insert(key.to_string(), value);
    }

    pub fn source_file(&self) -> Option<&Path> {
        self.source.as_ref().map(|s| s.file.as_path())
    }

    /// Order within a regenerated file: date, then original line.
    pub fn sort_key(&self) -> (NaiveDate, usize) {
        let line = self.source.as_ref().map_or(usize::MAX, |s| s.line);
        (self.date, line)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OpenDirective {
    pub date: NaiveDate,
    pub account: String,
    pub currencies: Vec<String>,
    pub meta: Meta,
    pub source: Option<SourceLocation>,
}

/// A file that took part in loading a ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerFile {
    pub path: PathBuf,
    /// Opens, includes and other directives the formatter does not reproduce.
    pub foreign_directives: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ledger {
    pub root: PathBuf,
    pub entries: Vec<Entry>,
    pub opens: Vec<OpenDirective>,
    pub files: Vec<LedgerFile>,
}

impl Ledger {
    pub fn open_for(&self, account: &str) -> Option<&OpenDirective> {
        self.opens.iter().find(|o| o.account == account)
    }

    /// The `id` metadata on an account's `open` directive.
    pub fn account_id(&self, account: &str) -> Option<String> {
        self.open_for(account)
            .and_then(|o| o.meta.get("id"))
            .map(MetaValue::to_text)
    }

    pub fn file(&self, path: &Path) -> Option<&LedgerFile> {
        self.files.iter().find(|f| f.path == path)
    }
}
