//! Transactions as the remote budgeting service returns them.
//!
//! Only the fields the transfer engine needs are modelled. Ids and amounts
//! arrive either as JSON numbers or strings depending on the endpoint.

use serde::Deserialize;
use std::fmt;

use crate::account::AccountRef;
use crate::amount::parse_decimal;
use crate::error::CoreError;
use crate::transaction::{parse_date, Transaction};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RemoteId {
    Number(i64),
    Text(String),
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteId::Number(n) => write!(f, "{n}"),
            RemoteId::Text(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RemoteAmount {
    Text(String),
    Number(serde_json::Number),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RemoteCategory {
    Name(String),
    Object {
        #[serde(default)]
        id: Option<RemoteId>,
        #[serde(default)]
        name: Option<String>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteAccount {
    #[serde(default)]
    pub id: Option<RemoteId>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteTransaction {
    pub id: RemoteId,
    pub amount: RemoteAmount,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub payee: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub category: Option<RemoteCategory>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub transaction_account: Option<RemoteAccount>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Envelope {
    List(Vec<RemoteTransaction>),
    Wrapped { transactions: Vec<RemoteTransaction> },
}

impl RemoteTransaction {
    pub fn to_transaction(&self) -> Result<Transaction, CoreError> {
        let id = self.id.to_string();
        let raw_date = self
            .date
            .as_deref()
            .ok_or_else(|| CoreError::MissingDate(id.clone()))?;
        let date = parse_date(raw_date)?;
        let amount = match &self.amount {
            RemoteAmount::Text(s) => parse_decimal(s)?,
            RemoteAmount::Number(n) => parse_decimal(&n.to_string())?,
        };

        let account = match &self.transaction_account {
            Some(acct) => AccountRef {
                id: acct.id.as_ref().map(RemoteId::to_string),
                name: acct.name.clone(),
            },
            None => AccountRef::default(),
        };

        let category = match &self.category {
            Some(RemoteCategory::Name(name)) => Some(name.clone()),
            Some(RemoteCategory::Object { id, name }) => name
                .clone()
                .or_else(|| id.as_ref().map(RemoteId::to_string)),
            None => None,
        };

        let mut tx = Transaction::new(&id, amount, date, account);
        tx.currency_code = self
            .currency
            .as_deref()
            .map(str::to_uppercase)
            .unwrap_or_default();
        tx.payee = self.payee.clone();
        tx.note = self.notes.clone();
        tx.category = category;
        tx.tags = self.tags.clone();
        Ok(tx)
    }
}

/// Parses either a bare JSON array or a `{"transactions": [...]}` envelope.
/// The first record with a bad date or amount aborts the whole batch.
pub fn parse_remote_transactions(json: &str) -> Result<Vec<Transaction>, CoreError> {
    let records = match serde_json::from_str::<Envelope>(json)? {
        Envelope::List(records) => records,
        Envelope::Wrapped { transactions } => transactions,
    };
    records.iter().map(RemoteTransaction::to_transaction).collect()
}
