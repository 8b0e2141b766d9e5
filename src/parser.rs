//! Parse console commands.
//!
//! Ledger: `BUY 10 SOXL @ 31.2`, `SELL 5 SOXL`, `ADD NVDA [0.02|2%]`,
//! `CONTRACTS SOXL 2 6`, `MARGIN 1500`, `CAPITAL 2000 [2025-03-01]`,
//! `INITIAL 50000`, `PREMIUM 320`.
//! Wheel: `STC 2 SOXL [35C 10/24] @ 1.25`, `ASSIGNED 3`, `SWEEP`, `TRADES`.
//! Planning: `SUGGEST 500`, `EXEC 500`, `NORMALIZE`.
//! Reports: `STATUS`, `HOLDINGS`, `GROWTH`, `VERSIONS [n]`, `RESTORE <id>`, `REFRESH`, `HELP`.

use chrono::NaiveDate;
use regex::Regex;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Buy { ticker: String, shares: f64, price: f64 },
    Sell { ticker: String, shares: f64 },
    AddTicker { ticker: String, target_pct: Option<f64> },
    Contracts { ticker: String, weekly: u32, owned: u32 },
    Margin(f64),
    Capital { amount: f64, date: Option<NaiveDate> },
    Initial(f64),
    Premium(f64),
    SellCalls {
        ticker: String,
        contracts: u32,
        premium_per_contract: f64,
        strike: Option<f64>,
        /// Raw "MM/DD" or "YYYY-MM-DD"; resolved against today by the caller.
        expiry: Option<String>,
    },
    Assigned(usize),
    Sweep,
    Trades,
    Suggest(f64),
    Exec(f64),
    Normalize,
    Status,
    Holdings,
    Growth,
    Versions(Option<usize>),
    Restore(String),
    Refresh,
    Help,
}

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap()
}

const NUM: &str = r"(\d+(?:\.\d+)?)";
const SYM: &str = r"([A-Z]{1,6})";
const ISO_DATE: &str = r"\d{4}-\d{2}-\d{2}";

pub fn parse_command(text: &str) -> Option<Command> {
    // Normalize whitespace
    let t = text.trim();

    // Bare keywords first.
    match t.to_ascii_uppercase().as_str() {
        "SWEEP" => return Some(Command::Sweep),
        "TRADES" => return Some(Command::Trades),
        "NORMALIZE" => return Some(Command::Normalize),
        "STATUS" => return Some(Command::Status),
        "HOLDINGS" => return Some(Command::Holdings),
        "GROWTH" => return Some(Command::Growth),
        "REFRESH" => return Some(Command::Refresh),
        "HELP" | "?" => return Some(Command::Help),
        _ => {}
    }

    // "BUY 10 SOXL @ 31.2"
    if let Some(c) = re(&format!(r"(?i)^BUY\s+{NUM}\s+{SYM}\s+@\s*{NUM}$")).captures(t) {
        return Some(Command::Buy {
            shares: c[1].parse().ok()?,
            ticker: c[2].to_uppercase(),
            price: c[3].parse().ok()?,
        });
    }

    // "SELL 5 SOXL"
    if let Some(c) = re(&format!(r"(?i)^SELL\s+{NUM}\s+{SYM}$")).captures(t) {
        return Some(Command::Sell {
            shares: c[1].parse().ok()?,
            ticker: c[2].to_uppercase(),
        });
    }

    // "ADD NVDA", "ADD NVDA 0.02", "ADD NVDA 2%"
    if let Some(c) = re(&format!(r"(?i)^ADD\s+{SYM}(?:\s+{NUM}(%)?)?$")).captures(t) {
        let target_pct = match c.get(2) {
            Some(m) => {
                let v: f64 = m.as_str().parse().ok()?;
                Some(if c.get(3).is_some() { v / 100.0 } else { v })
            }
            None => None,
        };
        return Some(Command::AddTicker {
            ticker: c[1].to_uppercase(),
            target_pct,
        });
    }

    // "CONTRACTS SOXL 2 6" (weekly, owned)
    if let Some(c) = re(&format!(r"(?i)^CONTRACTS\s+{SYM}\s+(\d+)\s+(\d+)$")).captures(t) {
        return Some(Command::Contracts {
            ticker: c[1].to_uppercase(),
            weekly: c[2].parse().ok()?,
            owned: c[3].parse().ok()?,
        });
    }

    if let Some(c) = re(&format!(r"(?i)^MARGIN\s+{NUM}$")).captures(t) {
        return Some(Command::Margin(c[1].parse().ok()?));
    }

    // "CAPITAL 2000" or "CAPITAL 2000 2025-03-01"
    let re_capital = re(&format!(r"(?i)^CAPITAL\s+{NUM}(?:\s+({ISO_DATE}))?$"));
    if let Some(c) = re_capital.captures(t) {
        let date = match c.get(2) {
            Some(m) => Some(NaiveDate::parse_from_str(m.as_str(), "%Y-%m-%d").ok()?),
            None => None,
        };
        return Some(Command::Capital {
            amount: c[1].parse().ok()?,
            date,
        });
    }

    if let Some(c) = re(&format!(r"(?i)^INITIAL\s+{NUM}$")).captures(t) {
        return Some(Command::Initial(c[1].parse().ok()?));
    }

    if let Some(c) = re(&format!(r"(?i)^PREMIUM\s+{NUM}$")).captures(t) {
        return Some(Command::Premium(c[1].parse().ok()?));
    }

    // Calls with strike/expiry: "STC 2 SOXL 35C 10/24 @ 1.25"
    let re_stc = re(&format!(
        r"(?i)^STC\s+(\d+)\s+{SYM}\s+{NUM}\s*C\s+(\d{{2}}/\d{{2}}|{ISO_DATE})\s+@\s*{NUM}$"
    ));
    if let Some(c) = re_stc.captures(t) {
        return Some(Command::SellCalls {
            contracts: c[1].parse().ok()?,
            ticker: c[2].to_uppercase(),
            strike: Some(c[3].parse().ok()?),
            expiry: Some(c[4].to_string()),
            premium_per_contract: c[5].parse().ok()?,
        });
    }

    // Calls at the suggested strike, next Friday: "STC 2 SOXL @ 1.25"
    if let Some(c) = re(&format!(r"(?i)^STC\s+(\d+)\s+{SYM}\s+@\s*{NUM}$")).captures(t) {
        return Some(Command::SellCalls {
            contracts: c[1].parse().ok()?,
            ticker: c[2].to_uppercase(),
            strike: None,
            expiry: None,
            premium_per_contract: c[3].parse().ok()?,
        });
    }

    if let Some(c) = re(r"(?i)^ASSIGNED\s+#?(\d+)$").captures(t) {
        return Some(Command::Assigned(c[1].parse().ok()?));
    }

    if let Some(c) = re(&format!(r"(?i)^SUGGEST\s+{NUM}$")).captures(t) {
        return Some(Command::Suggest(c[1].parse().ok()?));
    }

    if let Some(c) = re(&format!(r"(?i)^EXEC\s+{NUM}$")).captures(t) {
        return Some(Command::Exec(c[1].parse().ok()?));
    }

    if let Some(c) = re(r"(?i)^VERSIONS(?:\s+(\d+))?$").captures(t) {
        let limit = match c.get(1) {
            Some(m) => Some(m.as_str().parse().ok()?),
            None => None,
        };
        return Some(Command::Versions(limit));
    }

    if let Some(c) = re(r"(?i)^RESTORE\s+(\S+)$").captures(t) {
        return Some(Command::Restore(c[1].to_string()));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn must_parse(s: &str) -> Command {
        parse_command(s).unwrap_or_else(|| panic!("should parse: {s}"))
    }

    // ---------- Ledger ----------

    #[test]
    fn buy_and_sell_uppercase_ticker() {
        assert_eq!(
            must_parse("buy 10 soxl @ 31.25"),
            Command::Buy { ticker: "SOXL".into(), shares: 10.0, price: 31.25 }
        );
        assert_eq!(
            must_parse("BUY 0.5 TQQQ @60"),
            Command::Buy { ticker: "TQQQ".into(), shares: 0.5, price: 60.0 }
        );
        assert_eq!(
            must_parse("  SELL 2.5 slv  "),
            Command::Sell { ticker: "SLV".into(), shares: 2.5 }
        );
    }

    #[test]
    fn add_ticker_pct_forms() {
        assert_eq!(
            must_parse("ADD nvda"),
            Command::AddTicker { ticker: "NVDA".into(), target_pct: None }
        );
        assert_eq!(
            must_parse("ADD NVDA 0.02"),
            Command::AddTicker { ticker: "NVDA".into(), target_pct: Some(0.02) }
        );
        assert_eq!(
            must_parse("ADD NVDA 5%"),
            Command::AddTicker { ticker: "NVDA".into(), target_pct: Some(0.05) }
        );
    }

    #[test]
    fn money_commands() {
        assert_eq!(must_parse("margin 1500.5"), Command::Margin(1500.5));
        assert_eq!(must_parse("INITIAL 50000"), Command::Initial(50_000.0));
        assert_eq!(must_parse("PREMIUM 320"), Command::Premium(320.0));
        assert_eq!(
            must_parse("CAPITAL 2000 2025-03-01"),
            Command::Capital { amount: 2000.0, date: NaiveDate::from_ymd_opt(2025, 3, 1) }
        );
        assert_eq!(must_parse("CAPITAL 2000"), Command::Capital { amount: 2000.0, date: None });
        assert_eq!(
            must_parse("CONTRACTS soxl 2 6"),
            Command::Contracts { ticker: "SOXL".into(), weekly: 2, owned: 6 }
        );
    }

    // ---------- Wheel ----------

    #[test]
    fn stc_with_strike_and_expiry() {
        assert_eq!(
            must_parse("STC 2 SOXL 35c 10/24 @ 1.25"),
            Command::SellCalls {
                ticker: "SOXL".into(),
                contracts: 2,
                premium_per_contract: 1.25,
                strike: Some(35.0),
                expiry: Some("10/24".into()),
            }
        );
        let Command::SellCalls { expiry, .. } = must_parse("stc 1 tqqq 72.5C 2025-10-24 @ 0.9")
        else {
            panic!("expected SellCalls")
        };
        assert_eq!(expiry.as_deref(), Some("2025-10-24"));
    }

    #[test]
    fn stc_defaults_strike_and_expiry() {
        assert_eq!(
            must_parse("STC 3 URA @ 0.80"),
            Command::SellCalls {
                ticker: "URA".into(),
                contracts: 3,
                premium_per_contract: 0.8,
                strike: None,
                expiry: None,
            }
        );
    }

    #[test]
    fn puts_are_not_sold_here() {
        assert!(parse_command("STC 2 SOXL 35P 10/24 @ 1.25").is_none());
    }

    #[test]
    fn trade_maintenance() {
        assert_eq!(must_parse("ASSIGNED #3"), Command::Assigned(3));
        assert_eq!(must_parse("assigned 0"), Command::Assigned(0));
        assert_eq!(must_parse("sweep"), Command::Sweep);
        assert_eq!(must_parse("Trades"), Command::Trades);
    }

    // ---------- Planning / reports ----------

    #[test]
    fn planning_and_reports() {
        assert_eq!(must_parse("SUGGEST 500"), Command::Suggest(500.0));
        assert_eq!(must_parse("exec 500"), Command::Exec(500.0));
        assert_eq!(must_parse("normalize"), Command::Normalize);
        assert_eq!(must_parse("status"), Command::Status);
        assert_eq!(must_parse("VERSIONS"), Command::Versions(None));
        assert_eq!(must_parse("VERSIONS 5"), Command::Versions(Some(5)));
        assert_eq!(
            must_parse("RESTORE 2025-01-08_101500-000003"),
            Command::Restore("2025-01-08_101500-000003".into())
        );
    }

    // ---------- Negative / edge cases ----------

    #[test]
    fn random_text_should_fail() {
        assert!(parse_command("hello world").is_none());
        assert!(parse_command("buy apple now").is_none());
        assert!(parse_command("").is_none());
    }

    #[test]
    fn bad_numbers_or_format_should_fail() {
        assert!(parse_command("BUY 10 SOXL @ x").is_none());
        assert!(parse_command("BUY 10 SOXL 31.2").is_none()); // missing '@'
        assert!(parse_command("SELL -5 SOXL").is_none());
        assert!(parse_command("CAPITAL 100 2025-13-01").is_none());
        assert!(parse_command("BUY 1 ABCDEFG @ 1").is_none()); // 7 letters
    }
}
