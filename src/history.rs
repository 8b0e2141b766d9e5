//! Append-only history log and the rolling metrics derived from it.

use chrono::NaiveDate;

use crate::types::{HistoryEntry, PortfolioState};

pub const DEFAULT_PREMIUM_WINDOW: usize = 4;
pub const DEFAULT_EQUITY_GOAL: f64 = 1_000_000.0;

/// Entries are only ever pushed; insertion order is the canonical order.
pub fn append(state: &mut PortfolioState, entry: HistoryEntry) {
    state.history.push(entry);
}

pub fn net_equity(gross_value: f64, margin_debt: f64) -> f64 {
    gross_value - margin_debt
}

pub fn net_profit(entry: &HistoryEntry, initial_capital: f64) -> f64 {
    entry.portfolio_value - entry.margin_debt - initial_capital
}

/// Premium summed over the trailing `window` entries ending at each index.
pub fn rolling_premium_series(history: &[HistoryEntry], window: usize) -> Vec<f64> {
    let window = window.max(1);
    (0..history.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            history[start..=i].iter().map(|h| h.premium).sum()
        })
        .collect()
}

/// Rolling premium at the latest entry, 0 for an empty log.
pub fn rolling_premium(history: &[HistoryEntry], window: usize) -> f64 {
    rolling_premium_series(history, window)
        .last()
        .copied()
        .unwrap_or(0.0)
}

pub fn progress_to_goal(net_equity: f64, goal: f64) -> f64 {
    if !(goal > 0.0) {
        return 0.0;
    }
    (net_equity / goal * 100.0).max(0.0)
}

pub fn total_capital_added(state: &PortfolioState) -> f64 {
    state.initial_capital + state.capital_additions.iter().map(|a| a.amount).sum::<f64>()
}

#[derive(Debug, Clone, PartialEq)]
pub struct GrowthPoint {
    pub date: NaiveDate,
    pub gross: f64,
    pub net: f64,
}

pub fn growth_series(state: &PortfolioState) -> Vec<GrowthPoint> {
    state
        .history
        .iter()
        .map(|h| GrowthPoint {
            date: h.date,
            gross: h.portfolio_value,
            net: net_profit(h, state.initial_capital),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(n: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, n).unwrap()
    }

    fn with_premiums(ps: &[f64]) -> Vec<HistoryEntry> {
        ps.iter()
            .enumerate()
            .map(|(i, p)| HistoryEntry::new(day(i as u32 + 1), 0.0, 0.0).with_premium(*p))
            .collect()
    }

    #[test]
    fn rolling_premium_fills_then_slides() {
        let h = with_premiums(&[1.0, 2.0, 4.0, 8.0, 16.0]);
        let s = rolling_premium_series(&h, 4);
        assert_eq!(s, vec![1.0, 3.0, 7.0, 15.0, 30.0]);
        assert_eq!(rolling_premium(&h, 4), 2.0 + 4.0 + 8.0 + 16.0);
        assert_eq!(rolling_premium(&h[..1], 4), 1.0);
        assert_eq!(rolling_premium(&[], 4), 0.0);
    }

    #[test]
    fn rolling_premium_uses_insertion_not_calendar_order() {
        let mut h = with_premiums(&[5.0, 7.0, 9.0]);
        h[2].date = day(1);
        assert_eq!(rolling_premium(&h, 2), 16.0);
    }

    #[test]
    fn equity_profit_and_progress() {
        assert_eq!(net_equity(120_000.0, 20_000.0), 100_000.0);
        let e = HistoryEntry::new(day(1), 120_000.0, 20_000.0);
        assert_eq!(net_profit(&e, 81_000.0), 19_000.0);
        assert_eq!(progress_to_goal(250_000.0, DEFAULT_EQUITY_GOAL), 25.0);
        assert_eq!(progress_to_goal(-5.0, DEFAULT_EQUITY_GOAL), 0.0);
        assert_eq!(progress_to_goal(5.0, 0.0), 0.0);
    }

    #[test]
    fn append_only_grows_the_log() {
        let mut st = PortfolioState::default();
        append(&mut st, HistoryEntry::new(day(2), 10.0, 0.0));
        append(&mut st, HistoryEntry::new(day(1), 20.0, 0.0).with_note("later"));
        assert_eq!(st.history.len(), 2);
        assert_eq!(st.history[0].portfolio_value, 10.0);
        assert_eq!(st.history[1].note.as_deref(), Some("later"));
    }

    #[test]
    fn growth_series_nets_initial_capital() {
        let mut st = PortfolioState {
            initial_capital: 1_000.0,
            ..PortfolioState::default()
        };
        append(&mut st, HistoryEntry::new(day(1), 1_500.0, 100.0));
        let g = growth_series(&st);
        assert_eq!(g[0].gross, 1_500.0);
        assert_eq!(g[0].net, 400.0);
        st.capital_additions.push(crate::types::CapitalAddition {
            date: day(2),
            amount: 250.0,
        });
        assert_eq!(total_capital_added(&st), 1_250.0);
    }
}
