//! The fund list shown on the dashboard, read from the local ledger export.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

/// One fund as listed in `funds.csv`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundSummary {
    pub code: String,
    pub name: String,
    pub appropriated_cents: i64,
}

impl FundSummary {
    /// `1234567` cents → `12,345.67`.
    pub fn appropriated_display(&self) -> String {
        let negative = self.appropriated_cents < 0;
        let cents = self.appropriated_cents.unsigned_abs();
        let whole = (cents / 100).to_string();
        let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
        for (i, ch) in whole.chars().enumerate() {
            if i > 0 && (whole.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(ch);
        }
        format!("{}{grouped}.{:02}", if negative { "-" } else { "" }, cents % 100)
    }
}

/// In-memory copy of the fund ledger, primed during startup.
#[derive(Debug)]
pub struct FundCache {
    ledger: PathBuf,
    funds: RwLock<Vec<FundSummary>>,
    primed: AtomicBool,
}

impl FundCache {
    pub fn new(ledger: impl Into<PathBuf>) -> Self {
        Self {
            ledger: ledger.into(),
            funds: RwLock::new(Vec::new()),
            primed: AtomicBool::new(false),
        }
    }

    /// Reload from disk. A missing ledger yields an empty cache.
    pub async fn prime(&self) -> Result<usize, String> {
        let funds = match tokio::fs::read_to_string(&self.ledger).await {
            Ok(text) => parse_ledger(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(ledger = %self.ledger.display(), "no fund ledger yet");
                Vec::new()
            }
            Err(e) => return Err(format!("{}: {e}", self.ledger.display())),
        };
        let count = funds.len();
        *self.funds.write().unwrap_or_else(PoisonError::into_inner) = funds;
        self.primed.store(true, Ordering::SeqCst);
        tracing::debug!(count, "fund cache primed");
        Ok(count)
    }

    pub fn is_primed(&self) -> bool {
        self.primed.load(Ordering::SeqCst)
    }

    pub fn funds(&self) -> Vec<FundSummary> {
        self.funds
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Parse `code,name,appropriated` lines. Blank lines, `#` comments and a
/// leading `code,...` header are ignored.
pub fn parse_ledger(text: &str) -> Result<Vec<FundSummary>, String> {
    let mut funds = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if funds.is_empty() && line.to_ascii_lowercase().starts_with("code,") {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        let [code, name, amount] = fields.as_slice() else {
            return Err(format!(
                "funds.csv line {}: expected 3 fields, found {}",
                number + 1,
                fields.len()
            ));
        };
        if code.is_empty() {
            return Err(format!("funds.csv line {}: empty fund code", number + 1));
        }
        let appropriated_cents = parse_cents(amount)
            .ok_or_else(|| format!("funds.csv line {}: bad amount '{amount}'", number + 1))?;
        funds.push(FundSummary {
            code: code.to_string(),
            name: name.to_string(),
            appropriated_cents,
        });
    }
    Ok(funds)
}

/// `"1250.5"` → `125050`. At most two decimals.
fn parse_cents(amount: &str) -> Option<i64> {
    let (negative, digits) = match amount.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, amount),
    };
    let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
    if whole.is_empty() || fraction.len() > 2 {
        return None;
    }
    if !whole.bytes().chain(fraction.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }
    let whole: i64 = whole.parse().ok()?;
    let fraction: i64 = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<i64>().ok()? * 10,
        _ => fraction.parse().ok()?,
    };
    let cents = whole.checked_mul(100)?.checked_add(fraction)?;
    Some(if negative { -cents } else { cents })
}
