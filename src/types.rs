//! Core domain types for positions, history, capital and option trades.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

/// One instrument's holding record. `ticker` is the map key on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub ticker: String,
    pub shares: f64,
    /// Share-weighted average purchase price; 0 whenever `shares` is 0.
    pub cost_basis: f64,
    /// Desired fraction of total portfolio value.
    pub target_pct: f64,
    /// Cumulative contracts owned.
    pub contracts_sold: u32,
    /// Contracts sold in the current week.
    pub weekly_contracts: u32,
}

impl Position {
    pub fn empty(ticker: impl Into<String>, target_pct: f64) -> Self {
        Self {
            ticker: ticker.into(),
            shares: 0.0,
            cost_basis: 0.0,
            target_pct,
            contracts_sold: 0,
            weekly_contracts: 0,
        }
    }

    pub fn purchase_value(&self) -> f64 {
        self.shares * self.cost_basis
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CapitalAddition {
    pub date: NaiveDate,
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub date: NaiveDate,
    #[serde(default)]
    pub portfolio_value: f64,
    #[serde(default)]
    pub margin_debt: f64,
    #[serde(default)]
    pub premium: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl HistoryEntry {
    pub fn new(date: NaiveDate, portfolio_value: f64, margin_debt: f64) -> Self {
        Self {
            date,
            portfolio_value,
            margin_debt,
            premium: 0.0,
            note: None,
        }
    }

    pub fn with_premium(mut self, premium: f64) -> Self {
        self.premium = premium;
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OptionKind {
    Call,
    Put,
}

impl fmt::Display for OptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionKind::Call => f.write_str("call"),
            OptionKind::Put => f.write_str("put"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Open,
    Assigned,
    Expired,
}

impl TradeStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TradeStatus::Open)
    }
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeStatus::Open => f.write_str("open"),
            TradeStatus::Assigned => f.write_str("assigned"),
            TradeStatus::Expired => f.write_str("expired"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OptionTrade {
    pub ticker: String,
    #[serde(rename = "type")]
    pub kind: OptionKind,
    pub strike: f64,
    pub expiry: NaiveDate,
    pub contracts: u32,
    /// Premium per contract (per share quote, before the x100 multiplier).
    #[serde(rename = "premium")]
    pub premium_per_contract: f64,
    pub status: TradeStatus,
}

/// Aggregate root persisted in every snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PortfolioState {
    /// Declaration order is significant (rebalance tie-break).
    #[serde(rename = "etfs", default, with = "etf_map")]
    pub positions: Vec<Position>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub initial_capital: f64,
    #[serde(default)]
    pub capital_additions: Vec<CapitalAddition>,
    #[serde(default)]
    pub option_trades: Vec<OptionTrade>,
}

impl PortfolioState {
    /// Fresh state holding zero-share rows for each seeded target.
    pub fn seeded<'a>(targets: impl IntoIterator<Item = (&'a str, f64)>) -> Self {
        Self {
            positions: targets
                .into_iter()
                .map(|(t, pct)| Position::empty(t, pct))
                .collect(),
            ..Self::default()
        }
    }

    pub fn position(&self, ticker: &str) -> Option<&Position> {
        self.positions
            .iter()
            .find(|p| p.ticker.eq_ignore_ascii_case(ticker))
    }

    pub fn position_mut(&mut self, ticker: &str) -> Option<&mut Position> {
        self.positions
            .iter_mut()
            .find(|p| p.ticker.eq_ignore_ascii_case(ticker))
    }

    pub fn tickers(&self) -> Vec<String> {
        self.positions.iter().map(|p| p.ticker.clone()).collect()
    }

    /// Margin debt of the latest history entry.
    pub fn current_margin(&self) -> f64 {
        self.history.last().map(|h| h.margin_debt).unwrap_or(0.0)
    }
}

/// (De)serialises the ordered position list as `{ <ticker>: {..} }`.
mod etf_map {
    use super::Position;
    use serde::de::{MapAccess, Visitor};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::fmt;

    #[derive(Serialize, Deserialize)]
    struct Row {
        #[serde(default)]
        shares: f64,
        #[serde(default)]
        cost_basis: f64,
        #[serde(default)]
        target_pct: f64,
        #[serde(default)]
        contracts_sold: u32,
        #[serde(default)]
        weekly_contracts: u32,
    }

    pub fn serialize<S: Serializer>(positions: &[Position], s: S) -> Result<S::Ok, S::Error> {
        s.collect_map(positions.iter().map(|p| {
            (
                &p.ticker,
                Row {
                    shares: p.shares,
                    cost_basis: p.cost_basis,
                    target_pct: p.target_pct,
                    contracts_sold: p.contracts_sold,
                    weekly_contracts: p.weekly_contracts,
                },
            )
        }))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Position>, D::Error> {
        struct RowsVisitor;

        impl<'de> Visitor<'de> for RowsVisitor {
            type Value = Vec<Position>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of ticker to position")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut out = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((ticker, row)) = map.next_entry::<String, Row>()? {
                    out.push(Position {
                        ticker,
                        shares: row.shares,
                        cost_basis: row.cost_basis,
                        target_pct: row.target_pct,
                        contracts_sold: row.contracts_sold,
                        weekly_contracts: row.weekly_contracts,
                    });
                }
                Ok(out)
            }
        }

        d.deserialize_map(RowsVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_json_keeps_ticker_order_and_schema() {
        let mut st = PortfolioState::seeded([("SOXL", 0.3), ("SLV", 0.25), ("AAA", 0.1)]);
        st.positions[1].shares = 4.0;
        st.positions[1].cost_basis = 21.5;
        let v = serde_json::to_value(&st).unwrap();
        assert_eq!(v["etfs"]["SLV"]["shares"], 4.0);
        assert_eq!(v["etfs"]["SLV"]["weekly_contracts"], 0);
        assert!(v["history"].as_array().unwrap().is_empty());

        let s = serde_json::to_string(&st).unwrap();
        let back: PortfolioState = serde_json::from_str(&s).unwrap();
        assert_eq!(back.tickers(), vec!["SOXL", "SLV", "AAA"]);
        assert_eq!(back, st);
    }

    #[test]
    fn loads_loosely_typed_legacy_records() {
        // Sell-call history rows were written without value/margin fields.
        let raw = r#"{
            "etfs": {"TQQQ": {"shares": 10, "cost_basis": 50, "target_pct": 0.16}},
            "history": [{"date": "2025-01-03", "premium": 300, "note": "Sold 2 TQQQ calls"}],
            "option_trades": [{"ticker": "TQQQ", "type": "call", "strike": 61.2,
                "expiry": "2025-01-10", "contracts": 2, "premium": 1.5, "status": "open"}]
        }"#;
        let st: PortfolioState = serde_json::from_str(raw).unwrap();
        let p = st.position("tqqq").unwrap();
        assert_eq!(p.contracts_sold, 0);
        assert_eq!(st.history[0].portfolio_value, 0.0);
        assert_eq!(st.history[0].premium, 300.0);
        assert_eq!(st.initial_capital, 0.0);
        assert_eq!(st.option_trades[0].status, TradeStatus::Open);
        assert_eq!(st.option_trades[0].kind, OptionKind::Call);
    }

    #[test]
    fn current_margin_reads_latest_entry() {
        let mut st = PortfolioState::default();
        assert_eq!(st.current_margin(), 0.0);
        let d = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
        st.history.push(HistoryEntry::new(d, 100.0, 25.0));
        st.history.push(HistoryEntry::new(d, 100.0, 40.0));
        assert_eq!(st.current_margin(), 40.0);
    }
}
