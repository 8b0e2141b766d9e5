//! Holdings and cost-basis bookkeeping.

use std::collections::HashMap;

use crate::error::{LedgerError, LedgerResult};
use crate::types::{PortfolioState, Position};
use crate::utils::sanitize_symbol;

/// Per-ticker market value and their sum.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Valuation {
    pub per_ticker: Vec<(String, f64)>,
    pub total: f64,
}

impl Valuation {
    pub fn value_of(&self, ticker: &str) -> f64 {
        self.per_ticker
            .iter()
            .find(|(t, _)| t == ticker)
            .map(|(_, v)| *v)
            .unwrap_or(0.0)
    }
}

pub fn price_of(prices: &HashMap<String, f64>, ticker: &str) -> f64 {
    prices.get(ticker).copied().unwrap_or(0.0)
}

fn checked_ticker(ticker: &str) -> LedgerResult<String> {
    let t = sanitize_symbol(ticker);
    if t.is_empty() {
        return Err(LedgerError::Validation("ticker must not be empty".into()));
    }
    Ok(t)
}

impl PortfolioState {
    /// Weighted-average add. Creates the position on first purchase.
    pub fn add_purchase(&mut self, ticker: &str, shares: f64, price: f64) -> LedgerResult<()> {
        let sym = checked_ticker(ticker)?;
        if !(shares > 0.0) || !(price > 0.0) {
            return Err(LedgerError::Validation(format!(
                "purchase of {sym} needs positive shares and price (got {shares} @ {price})"
            )));
        }
        match self.position_mut(&sym) {
            Some(p) => {
                let total_cost = p.shares * p.cost_basis + shares * price;
                p.shares += shares;
                p.cost_basis = total_cost / p.shares;
            }
            None => {
                let mut p = Position::empty(sym, 0.0);
                p.shares = shares;
                p.cost_basis = price;
                self.positions.push(p);
            }
        }
        Ok(())
    }

    /// Reduce holdings. Returns the average cost the shares were carried at.
    pub fn sell(&mut self, ticker: &str, shares: f64) -> LedgerResult<f64> {
        let sym = checked_ticker(ticker)?;
        let held = self.position(&sym).map(|p| p.shares).unwrap_or(0.0);
        if !(shares > 0.0) || shares > held {
            return Err(LedgerError::InsufficientShares {
                ticker: sym,
                requested: shares,
                held,
            });
        }
        let p = self
            .position_mut(&sym)
            .ok_or_else(|| LedgerError::Validation(format!("unknown ticker {sym}")))?;
        let avg_cost = p.cost_basis;
        p.shares -= shares;
        // Float residue from fractional sells counts as fully closed.
        if p.shares <= 1e-9 {
            p.shares = 0.0;
            p.cost_basis = 0.0;
        }
        Ok(avg_cost)
    }

    pub fn set_contracts(&mut self, ticker: &str, weekly: u32, owned: u32) -> LedgerResult<()> {
        let sym = checked_ticker(ticker)?;
        let p = self
            .position_mut(&sym)
            .ok_or_else(|| LedgerError::Validation(format!("unknown ticker {sym}")))?;
        p.weekly_contracts = weekly;
        p.contracts_sold = owned;
        Ok(())
    }

    pub fn add_ticker(&mut self, ticker: &str, target_pct: f64) -> LedgerResult<()> {
        let sym = checked_ticker(ticker)?;
        if self.position(&sym).is_some() {
            return Err(LedgerError::Validation(format!("ticker {sym} already exists")));
        }
        if !(target_pct >= 0.0) {
            return Err(LedgerError::Validation(format!(
                "target percentage for {sym} must be non-negative"
            )));
        }
        self.positions.push(Position::empty(sym, target_pct));
        Ok(())
    }

    /// Missing prices count as zero value.
    pub fn valuation(&self, prices: &HashMap<String, f64>) -> Valuation {
        let per_ticker: Vec<(String, f64)> = self
            .positions
            .iter()
            .map(|p| (p.ticker.clone(), p.shares * price_of(prices, &p.ticker)))
            .collect();
        let total = per_ticker.iter().map(|(_, v)| v).sum();
        Valuation { per_ticker, total }
    }
}
