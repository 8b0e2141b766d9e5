//! Dashboard metrics and the holdings table.

use std::fmt;

use crate::config::GoalsCfg;
use crate::history::{self, GrowthPoint};
use crate::planner::{otm_profile, suggested_strike};
use crate::prices::PriceBook;
use crate::types::PortfolioState;

#[derive(Debug, Clone, PartialEq)]
pub struct Dashboard {
    pub gross_value: f64,
    pub margin: f64,
    pub net_equity: f64,
    pub capital_added: f64,
    pub profit: f64,
    pub progress_pct: f64,
    pub equity_goal: f64,
    pub monthly_premium: f64,
    pub premium_target: f64,
    /// Tickers valued at 0 for lack of a quote.
    pub unpriced: Vec<String>,
}

impl Dashboard {
    pub fn build(state: &PortfolioState, book: &PriceBook, goals: &GoalsCfg) -> Self {
        let gross_value = state.valuation(&book.prices).total;
        let margin = state.current_margin();
        let net_equity = history::net_equity(gross_value, margin);
        let capital_added = history::total_capital_added(state);
        Self {
            gross_value,
            margin,
            net_equity,
            capital_added,
            profit: net_equity - capital_added,
            progress_pct: history::progress_to_goal(net_equity, goals.net_equity_goal),
            equity_goal: goals.net_equity_goal,
            monthly_premium: history::rolling_premium(&state.history, goals.premium_window),
            premium_target: goals.monthly_premium_target,
            unpriced: book.missing.clone(),
        }
    }
}

impl fmt::Display for Dashboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Gross Portfolio     ${:.2}", self.gross_value)?;
        writeln!(f, "Current Margin      ${:.2}", self.margin)?;
        writeln!(f, "Net Equity          ${:.2} ({:+.2})", self.net_equity, self.profit)?;
        writeln!(f, "Total Capital Added ${:.2}", self.capital_added)?;
        writeln!(
            f,
            "Progress to ${:.0}  {:.2}%",
            self.equity_goal, self.progress_pct
        )?;
        write!(
            f,
            "Monthly Premium Estimate: ${:.2} (Target: ${:.0})",
            self.monthly_premium, self.premium_target
        )?;
        if !self.unpriced.is_empty() {
            write!(
                f,
                "\nWARNING: no price for {}; values are partial",
                self.unpriced.join(", ")
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HoldingRow {
    pub ticker: String,
    pub shares: f64,
    pub cost_basis: f64,
    pub price: f64,
    pub current_value: f64,
    pub current_pct: f64,
    pub target_pct: f64,
    /// Dollar and percent P&L; only when something was paid for the shares.
    pub profit: Option<(f64, f64)>,
    pub suggested_strike: Option<f64>,
    pub delta: &'static str,
    pub weekly_contracts: u32,
    pub contracts_sold: u32,
}

/// Rows sorted by ticker. Percentages are of gross value (x100).
pub fn holdings_table(state: &PortfolioState, book: &PriceBook) -> Vec<HoldingRow> {
    let gross = state.valuation(&book.prices).total;
    let denom = if gross > 0.0 { gross } else { 1.0 };
    let mut rows: Vec<HoldingRow> = state
        .positions
        .iter()
        .map(|p| {
            let price = book.price(&p.ticker);
            let current_value = p.shares * price;
            let paid = p.purchase_value();
            let profit = (paid > 0.0).then(|| {
                let dollars = current_value - paid;
                (dollars, dollars / paid * 100.0)
            });
            HoldingRow {
                ticker: p.ticker.clone(),
                shares: p.shares,
                cost_basis: p.cost_basis,
                price,
                current_value,
                current_pct: current_value / denom * 100.0,
                target_pct: p.target_pct * 100.0,
                profit,
                suggested_strike: (price > 0.0).then(|| suggested_strike(&p.ticker, price)),
                delta: otm_profile(&p.ticker).delta,
                weekly_contracts: p.weekly_contracts,
                contracts_sold: p.contracts_sold,
            }
        })
        .collect();
    rows.sort_by(|a, b| a.ticker.cmp(&b.ticker));
    rows
}

impl fmt::Display for HoldingRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dash = || "-".to_string();
        let basis = if self.cost_basis > 0.0 {
            format!("${:.2}", self.cost_basis)
        } else {
            dash()
        };
        let (pl, pl_pct) = match self.profit {
            Some((d, p)) => (format!("${d:.2}"), format!("{p:+.2}%")),
            None => (dash(), dash()),
        };
        let strike = self
            .suggested_strike
            .map(|s| format!("${s}"))
            .unwrap_or_else(dash);
        write!(
            f,
            "{:<6} {:>12.4} {:>10} {:>14} {:>7.2}% {:>6.1}% {:>12} {:>8} {:>10} {:<8} {}/{}",
            self.ticker,
            self.shares,
            basis,
            format!("${:.2}", self.current_value),
            self.current_pct,
            self.target_pct,
            pl,
            pl_pct,
            strike,
            self.delta,
            self.weekly_contracts,
            self.contracts_sold,
        )
    }
}

pub fn render_holdings(rows: &[HoldingRow]) -> String {
    let mut out = format!(
        "{:<6} {:>12} {:>10} {:>14} {:>8} {:>7} {:>12} {:>8} {:>10} {:<8} {}",
        "Ticker", "Shares", "Basis", "Value", "Cur %", "Tgt %", "Profit $", "Profit %", "Strike",
        "Delta", "Wk/Own"
    );
    for r in rows {
        out.push('\n');
        out.push_str(&r.to_string());
    }
    out
}

pub fn render_growth(points: &[GrowthPoint]) -> String {
    points
        .iter()
        .map(|g| format!("{}  gross ${:.2}  net ${:.2}", g.date, g.gross, g.net))
        .collect::<Vec<_>>()
        .join("\n")
}
