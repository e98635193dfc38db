//! Line-oriented reader for the ledger subset the formatter writes, plus
//! `open` directives and `include` lines.
//!
//! Anything else that starts at column zero (`option`, `balance`, `price`
//! and friends) is skipped together with its indented lines.

use chrono::NaiveDate;
use pairwise_core::{parse_date, Amount};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::entry::{Entry, Ledger, LedgerFile, Meta, MetaValue, OpenDirective, Posting, SourceLocation};
use crate::error::LedgerError;

/// Everything read from a single file.
#[derive(Debug, Default)]
pub struct ParsedFile {
    pub entries: Vec<Entry>,
    pub opens: Vec<OpenDirective>,
    pub includes: Vec<String>,
    pub foreign_directives: usize,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Quoted(String),
    Bare(String),
}

enum Block {
    None,
    Txn(Entry),
    Open(OpenDirective),
    Skip,
}

struct Reader<'a> {
    file: &'a Path,
    parsed: ParsedFile,
    block: Block,
}

impl Reader<'_> {
    fn error(&self, line: usize, message: impl Into<String>) -> LedgerError {
        LedgerError::Parse {
            file: self.file.to_path_buf(),
            line,
            message: message.into(),
        }
    }

    fn flush(&mut self) {
        match std::mem::replace(&mut self.block, Block::None) {
            Block::Txn(entry) => self.parsed.entries.push(entry),
            Block::Open(open) => self.parsed.opens.push(open),
            Block::None | Block::Skip => {}
        }
    }

    fn top_level(&mut self, lineno: usize, line: &str) -> Result<(), LedgerError> {
        let tokens = tokenize(line).map_err(|m| self.error(lineno, m))?;
        let Some(Token::Bare(first)) = tokens.first() else {
            return Err(self.error(lineno, "expected a date or directive"));
        };

        if first == "include" {
            match tokens.get(1) {
                Some(Token::Quoted(path)) => self.parsed.includes.push(path.clone()),
                _ => return Err(self.error(lineno, "include needs a quoted path")),
            }
            self.parsed.foreign_directives += 1;
            return Ok(());
        }
        if !first.starts_with(|c: char| c.is_ascii_digit()) {
            // option, plugin, pushtag and the like
            self.parsed.foreign_directives += 1;
            self.block = Block::Skip;
            return Ok(());
        }

        let date = parse_date(first).map_err(|e| self.error(lineno, e.to_string()))?;
        let source = Some(SourceLocation {
            file: self.file.to_path_buf(),
            line: lineno,
        });
        let directive = match tokens.get(1) {
            Some(Token::Bare(d)) => d.as_str(),
            _ => return Err(self.error(lineno, "missing directive after date")),
        };

        self.block = match directive {
            "*" | "!" | "txn" => {
                let mut entry = self.transaction_header(lineno, date, directive, &tokens[2..])?;
                entry.source = source;
                Block::Txn(entry)
            }
            "open" => {
                let Some(Token::Bare(account)) = tokens.get(2) else {
                    return Err(self.error(lineno, "open needs an account"));
                };
                let currencies = tokens[3..]
                    .iter()
                    .filter_map(|t| match t {
                        Token::Bare(s) => Some(s),
                        Token::Quoted(_) => None,
                    })
                    .flat_map(|s| s.split(','))
                    .filter(|c| !c.is_empty())
                    .map(str::to_string)
                    .collect();
                self.parsed.foreign_directives += 1;
                Block::Open(OpenDirective {
                    date,
                    account: account.clone(),
                    currencies,
                    meta: Meta::new(),
                    source,
                })
            }
            _ => {
                self.parsed.foreign_directives += 1;
                Block::Skip
            }
        };
        Ok(())
    }

    fn transaction_header(
        &self,
        lineno: usize,
        date: NaiveDate,
        flag: &str,
        rest: &[Token],
    ) -> Result<Entry, LedgerError> {
        let strings: Vec<&String> = rest
            .iter()
            .take_while(|t| matches!(t, Token::Quoted(_)))
            .filter_map(|t| match t {
                Token::Quoted(s) => Some(s),
                Token::Bare(_) => None,
            })
            .collect();
        let (payee, narration) = match strings.as_slice() {
            [] => (None, String::new()),
            [narration] => (None, (*narration).clone()),
            [payee, narration] => (Some((*payee).clone()), (*narration).clone()),
            _ => return Err(self.error(lineno, "too many strings in transaction header")),
        };

        let mut entry = Entry::new(date, &narration);
        entry.flag = if flag == "txn" { "*".to_string() } else { flag.to_string() };
        // the formatter writes "" for a missing payee
        entry.payee = payee.filter(|p| !p.is_empty());

        for token in &rest[strings.len()..] {
            match token {
                Token::Bare(t) if t.starts_with('#') && t.len() > 1 => entry.tags.push(t[1..].to_string()),
                Token::Bare(t) if t.starts_with('^') && t.len() > 1 => entry.links.push(t[1..].to_string()),
                other => {
                    return Err(self.error(lineno, format!("unexpected token in header: {other:?}")))
                }
            }
        }
        Ok(entry)
    }

    fn indented(&mut self, lineno: usize, text: &str) -> Result<(), LedgerError> {
        let file = self.file;
        let error = |message: String| LedgerError::Parse {
            file: file.to_path_buf(),
            line: lineno,
            message,
        };

        if let Some((key, raw)) = split_meta(text) {
            let value = parse_meta_value(raw).map_err(error)?;
            let meta = match &mut self.block {
                Block::Txn(entry) if entry.postings.is_empty() => &mut entry.meta,
                Block::Txn(_) => return Err(error("posting metadata is not supported".into())),
                Block::Open(open) => &mut open.meta,
                Block::Skip => return Ok(()),
                Block::None => return Err(error("metadata outside of a directive".into())),
            };
            meta.insert(key.to_string(), value);
            return Ok(());
        }

        match &mut self.block {
            Block::Txn(entry) => entry.postings.push(parse_posting(text).map_err(error)?),
            Block::Skip => {}
            Block::Open(_) => return Err(error("open directives have no postings".into())),
            Block::None => return Err(error("indented line outside of a directive".into())),
        }
        Ok(())
    }
}

/// Parses the content of one ledger file. `file` is only used for
/// provenance and error messages.
pub fn parse_str(content: &str, file: &Path) -> Result<ParsedFile, LedgerError> {
    let mut reader = Reader {
        file,
        parsed: ParsedFile::default(),
        block: Block::None,
    };

    for (idx, raw_line) in content.lines().enumerate() {
        let lineno = idx + 1;
        let line = raw_line.trim_end_matches('\r');
        let trimmed = line.trim();

        if trimmed.is_empty() {
            reader.flush();
            continue;
        }
        if trimmed.starts_with(';') {
            continue;
        }

        if line.starts_with(char::is_whitespace) {
            reader.indented(lineno, trimmed)?;
        } else {
            reader.flush();
            reader.top_level(lineno, line)?;
        }
    }
    reader.flush();
    Ok(reader.parsed)
}

/// Loads `root` and every file it includes, depth first, each file once.
pub fn load_ledger(root: &Path) -> Result<Ledger, LedgerError> {
    let mut ledger = Ledger {
        root: root.to_path_buf(),
        ..Ledger::default()
    };
    let mut seen = HashSet::new();
    load_file(root, &mut ledger, &mut seen)?;
    tracing::info!(
        "Loaded {} entries and {} accounts from {} file(s)",
        ledger.entries.len(),
        ledger.opens.len(),
        ledger.files.len()
    );
    Ok(ledger)
}

fn load_file(path: &Path, ledger: &mut Ledger, seen: &mut HashSet<PathBuf>) -> Result<(), LedgerError> {
    let key = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    if !seen.insert(key) {
        tracing::debug!("Skipping already loaded {}", path.display());
        return Ok(());
    }

    let content = std::fs::read_to_string(path).map_err(|e| LedgerError::io(path, e))?;
    let parsed = parse_str(&content, path)?;
    tracing::debug!(
        "Parsed {}: {} entries, {} includes",
        path.display(),
        parsed.entries.len(),
        parsed.includes.len()
    );

    ledger.files.push(LedgerFile {
        path: path.to_path_buf(),
        foreign_directives: parsed.foreign_directives,
    });
    ledger.entries.extend(parsed.entries);
    ledger.opens.extend(parsed.opens);

    let base = path.parent().unwrap_or_else(|| Path::new(""));
    for include in parsed.includes {
        if include.contains(['*', '?', '[']) {
            tracing::warn!("Glob includes are not supported, skipping {include}");
            continue;
        }
        load_file(&base.join(include), ledger, seen)?;
    }
    Ok(())
}

fn tokenize(line: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == ';' {
            break;
        }
        if c == '"' {
            chars.next();
            let mut value = String::new();
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '\\' => match chars.next() {
                        Some(escaped) => value.push(escaped),
                        None => break,
                    },
                    '"' => {
                        closed = true;
                        break;
                    }
                    _ => value.push(c),
                }
            }
            if !closed {
                return Err("unterminated string".to_string());
            }
            tokens.push(Token::Quoted(value));
        } else {
            let mut value = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                value.push(c);
                chars.next();
            }
            tokens.push(Token::Bare(value));
        }
    }
    Ok(tokens)
}

/// `key: value` where the key starts lowercase. Account names start
/// uppercase, which keeps postings from matching.
fn split_meta(text: &str) -> Option<(&str, &str)> {
    let (key, value) = text.split_once(':')?;
    let mut chars = key.chars();
    let leads_lowercase = chars.next().is_some_and(|c| c.is_ascii_lowercase());
    let key_ok = chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    let separated = value.is_empty() || value.starts_with(char::is_whitespace);
    (leads_lowercase && key_ok && separated).then_some((key, value.trim()))
}

fn parse_meta_value(raw: &str) -> Result<MetaValue, String> {
    if raw.starts_with('"') {
        return match tokenize(raw)?.as_slice() {
            [Token::Quoted(s)] => Ok(MetaValue::String(s.clone())),
            _ => Err(format!("malformed string value: {raw}")),
        };
    }
    // strip a trailing comment
    let raw = raw.split(';').next().unwrap_or_default().trim();
    match raw {
        "TRUE" => return Ok(MetaValue::Bool(true)),
        "FALSE" => return Ok(MetaValue::Bool(false)),
        _ => {}
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(MetaValue::Date(date));
    }
    // only keep numbers whose rendering matches the source text
    match Decimal::from_str(raw) {
        Ok(n) if n.to_string() == raw => Ok(MetaValue::Number(n)),
        _ => Ok(MetaValue::Raw(raw.to_string())),
    }
}

fn parse_posting(text: &str) -> Result<Posting, String> {
    let tokens = tokenize(text)?;
    let mut bare = tokens.iter().map(|t| match t {
        Token::Bare(s) => Ok(s.as_str()),
        Token::Quoted(_) => Err(format!("unexpected string in posting: {text}")),
    });
    let mut account = bare.next().transpose()?.ok_or("empty posting")?;
    if account == "!" || account == "*" {
        account = bare.next().transpose()?.ok_or("posting flag without account")?;
    }
    let rest: Vec<&str> = bare.collect::<Result<_, _>>()?;
    let amount = match rest.as_slice() {
        [] => None,
        [number, currency] => Some(
            format!("{number} {currency}")
                .parse::<Amount>()
                .map_err(|e| e.to_string())?,
        ),
        _ => return Err(format!("unsupported posting syntax: {text}")),
    };
    Ok(Posting::new(account, amount))
}
