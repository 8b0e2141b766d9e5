//! Covered-call wheel: sold option positions and their one-way lifecycle.
//!
//! A trade starts `open` and ends `assigned` (explicit confirmation) or
//! `expired` (expiry sweep). Terminal trades never transition again.

use chrono::NaiveDate;
use tracing::info;

use crate::error::{LedgerError, LedgerResult};
use crate::history;
use crate::types::{HistoryEntry, OptionKind, OptionTrade, PortfolioState, TradeStatus};
use crate::utils::sanitize_symbol;

/// Shares per standard equity option contract.
pub const CONTRACT_MULTIPLIER: f64 = 100.0;

#[derive(Debug, Clone, PartialEq)]
pub struct CallSale {
    pub ticker: String,
    pub contracts: u32,
    pub premium_per_contract: f64,
    pub strike: f64,
    pub expiry: NaiveDate,
}

pub fn total_premium(contracts: u32, premium_per_contract: f64) -> f64 {
    contracts as f64 * premium_per_contract * CONTRACT_MULTIPLIER
}

/// At least one contract and a positive premium per contract.
pub fn check_order(contracts: u32, premium_per_contract: f64) -> LedgerResult<()> {
    if contracts == 0 || !(premium_per_contract > 0.0) {
        return Err(LedgerError::InvalidOrderParameters(format!(
            "need at least 1 contract and a positive premium (got {contracts} @ {})",
            premium_per_contract
        )));
    }
    Ok(())
}

/// Record a call sale. `gross_value`/`margin_debt` stamp the history entry.
pub fn sell_calls(
    state: &mut PortfolioState,
    sale: &CallSale,
    today: NaiveDate,
    gross_value: f64,
    margin_debt: f64,
) -> LedgerResult<f64> {
    let sym = sanitize_symbol(&sale.ticker);
    check_order(sale.contracts, sale.premium_per_contract)?;
    if !(sale.strike > 0.0) {
        return Err(LedgerError::InvalidOrderParameters(format!(
            "strike must be positive (got {})",
            sale.strike
        )));
    }
    let pos = state
        .position_mut(&sym)
        .ok_or_else(|| LedgerError::Validation(format!("unknown ticker {sym}")))?;
    pos.weekly_contracts = sale.contracts;

    let premium = total_premium(sale.contracts, sale.premium_per_contract);
    history::append(
        state,
        HistoryEntry::new(today, gross_value, margin_debt)
            .with_premium(premium)
            .with_note(format!("Sold {} {} calls", sale.contracts, sym)),
    );
    state.option_trades.push(OptionTrade {
        ticker: sym,
        kind: OptionKind::Call,
        strike: sale.strike,
        expiry: sale.expiry,
        contracts: sale.contracts,
        premium_per_contract: sale.premium_per_contract,
        status: TradeStatus::Open,
    });
    Ok(premium)
}

fn advance(state: &mut PortfolioState, index: usize, to: TradeStatus) -> LedgerResult<()> {
    let trade = state
        .option_trades
        .get_mut(index)
        .ok_or_else(|| LedgerError::Validation(format!("no option trade #{index}")))?;
    if trade.status.is_terminal() {
        return Err(LedgerError::InvalidTransition {
            index,
            status: trade.status.to_string(),
        });
    }
    trade.status = to;
    Ok(())
}

/// Explicit assignment confirmation: open -> assigned.
pub fn mark_assigned(state: &mut PortfolioState, index: usize) -> LedgerResult<()> {
    advance(state, index, TradeStatus::Assigned)
}

/// Move every open trade whose expiry is before `today` to expired.
pub fn sweep_expired(state: &mut PortfolioState, today: NaiveDate) -> Vec<usize> {
    let stale: Vec<usize> = state
        .option_trades
        .iter()
        .enumerate()
        .filter(|(_, t)| t.status == TradeStatus::Open && t.expiry < today)
        .map(|(i, _)| i)
        .collect();
    for &i in &stale {
        let t = &mut state.option_trades[i];
        t.status = TradeStatus::Expired;
        info!(trade = i, ticker = %t.ticker, expiry = %t.expiry, "Option trade expired unassigned");
    }
    stale
}

pub fn open_trades(state: &PortfolioState) -> Vec<(usize, &OptionTrade)> {
    state
        .option_trades
        .iter()
        .enumerate()
        .filter(|(_, t)| t.status == TradeStatus::Open)
        .collect()
}
