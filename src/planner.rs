//! Target normalisation, deviation and rebalance/strike suggestions.
//!
//! Strike suggestions are a fixed OTM markup per instrument, not an
//! options-pricing model. Leveraged and volatile tickers get a wider offset.

use std::collections::HashMap;

use crate::error::{LedgerError, LedgerResult};
use crate::ledger::price_of;
use crate::types::{PortfolioState, Position};
use crate::utils::round_to;

/// Holdings-table OTM offset and the delta it roughly corresponds to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OtmProfile {
    pub pct: f64,
    pub delta: &'static str,
}

/// Substring rules, first match wins.
const HOLDINGS_OTM: &[(&[&str], OtmProfile)] = &[
    (&["SOXL", "TQQQ"], OtmProfile { pct: 0.14, delta: "~30Δ" }),
    (&["URA"], OtmProfile { pct: 0.12, delta: "~28–32Δ" }),
    (&["SLV", "COPX"], OtmProfile { pct: 0.085, delta: "~30Δ" }),
    (&["IAU", "UPRO"], OtmProfile { pct: 0.065, delta: "~30–35Δ" }),
];

const DEFAULT_OTM: OtmProfile = OtmProfile { pct: 0.10, delta: "~30Δ" };

pub fn otm_profile(ticker: &str) -> OtmProfile {
    HOLDINGS_OTM
        .iter()
        .find(|(needles, _)| needles.iter().any(|n| ticker.contains(n)))
        .map(|(_, p)| *p)
        .unwrap_or(DEFAULT_OTM)
}

/// OTM offset used when selling the weekly call.
pub fn weekly_call_otm(ticker: &str) -> f64 {
    if ticker.contains("SOXL") {
        0.12
    } else if ticker.contains("TQQQ") {
        0.09
    } else {
        0.07
    }
}

pub fn suggested_strike(ticker: &str, current_price: f64) -> f64 {
    round_to(current_price * (1.0 + otm_profile(ticker).pct), 2)
}

pub fn weekly_call_strike(ticker: &str, current_price: f64) -> f64 {
    round_to(current_price * (1.0 + weekly_call_otm(ticker)), 2)
}

/// Rescale targets to sum to 1. Returns false (and leaves them alone) when the sum is not positive.
pub fn normalize_targets(positions: &mut [Position]) -> bool {
    let sum: f64 = positions.iter().map(|p| p.target_pct).sum();
    if !(sum > 0.0) {
        return false;
    }
    for p in positions.iter_mut() {
        p.target_pct /= sum;
    }
    true
}

/// Dollar gap to target; positive means underweight.
pub fn deviation(position: &Position, total_value: f64, prices: &HashMap<String, f64>) -> f64 {
    total_value * position.target_pct - position.shares * price_of(prices, &position.ticker)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reinvestment {
    pub ticker: String,
    pub price: f64,
    pub shares: f64,
    pub premium: f64,
}

/// Put the whole premium into the most underweight ticker.
pub fn suggest_reinvestment(
    state: &PortfolioState,
    premium: f64,
    prices: &HashMap<String, f64>,
) -> LedgerResult<Reinvestment> {
    if !(premium > 0.0) {
        return Err(LedgerError::Validation(format!(
            "premium to reinvest must be positive (got {premium})"
        )));
    }
    let total = state.valuation(prices).total;

    // Strictly greater only, so the first declared ticker keeps a tie.
    let mut best: Option<(&Position, f64)> = None;
    for p in &state.positions {
        let dev = deviation(p, total, prices);
        match best {
            Some((_, b)) if dev <= b => {}
            _ => best = Some((p, dev)),
        }
    }
    let (pos, _) =
        best.ok_or_else(|| LedgerError::Validation("portfolio has no tickers".into()))?;

    let price = price_of(prices, &pos.ticker);
    if !(price > 0.0) {
        return Err(LedgerError::NoPriceAvailable(pos.ticker.clone()));
    }
    Ok(Reinvestment {
        ticker: pos.ticker.clone(),
        price,
        shares: premium / price,
        premium,
    })
}
