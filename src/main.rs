//! Entry point. Wires config -> prices/broker -> snapshot store -> Portfolio,
//! then runs one command from the arguments or a line console on stdin.

mod broker;
mod config;
mod error;
mod history;
mod ledger;
mod parser;
mod planner;
mod portfolio;
mod prices;
mod report;
mod store;
mod types;
mod utils;
mod wheel;

use anyhow::{bail, Context};
use chrono::Local;
use dotenvy::dotenv;
use std::{env, rc::Rc, time::Duration};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use crate::broker::{PaperBroker, WbCtx};
use crate::config::AppConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::parser::{parse_command, Command};
use crate::portfolio::Portfolio;
use crate::prices::{PriceCache, PriceProvider, StaticPrices};
use crate::store::{FileStore, VersionedStore};
use crate::types::PortfolioState;
use crate::utils::{expiry_from_str, is_valid_user};

const HELP: &str = "\
BUY <qty> <T> @ <px>          record a purchase
SELL <qty> <T>                record a sale
ADD <T> [pct|pct%]            track a new ticker
CONTRACTS <T> <weekly> <own>  set contract counts
INITIAL <amt>                 set initial capital (once)
CAPITAL <amt> [YYYY-MM-DD]    record a capital addition
MARGIN <amt>                  record current margin debt
PREMIUM <amt>                 record premium income
STC <n> <T> [<K>C <exp>] @ <p> sell covered calls
ASSIGNED <idx>                mark an option trade assigned
SWEEP                         expire stale option trades
TRADES                        list open option trades
SUGGEST <amt> / EXEC <amt>    plan / execute premium reinvestment
NORMALIZE                     rescale targets to 100%
STATUS | HOLDINGS | GROWTH    reports
VERSIONS [n] | RESTORE <id>   snapshot history
REFRESH                       drop cached quotes
QUIT";

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    // Load config
    let cfg_path = env::var("WHEEL_LEDGER_CONFIG").unwrap_or_else(|_| "config.yaml".into());
    let cfg = AppConfig::load(&cfg_path)?;

    let mut args: Vec<String> = env::args().skip(1).collect();
    let user = take_user_flag(&mut args)?
        .or_else(|| env::var("WHEEL_LEDGER_USER").ok())
        .unwrap_or_else(|| "default".into());
    if !is_valid_user(&user) {
        bail!("invalid user {user:?}: use letters, digits, '-' or '_'");
    }

    // Quotes (and optional paper orders) from Webull, else the manual price list
    let (provider, broker): (Rc<dyn PriceProvider>, Option<Rc<dyn PaperBroker>>) =
        if cfg.broker.enabled {
            let wb_user = env::var("WEBULL_USERNAME").context("WEBULL_USERNAME not set")?;
            let wb_pass = env::var("WEBULL_PASSWORD").context("WEBULL_PASSWORD not set")?;
            let wb_pin = env::var("WEBULL_TRADING_PIN").ok(); // live only
            let wb = Rc::new(
                WbCtx::login(
                    &wb_user,
                    &wb_pass,
                    cfg.broker.region,
                    &cfg.broker.mode,
                    wb_pin.as_deref(),
                )
                .await?,
            );
            info!("Webull mode: {}", if wb.is_live { "live" } else { "paper" });
            let quotes: Rc<dyn PriceProvider> = wb.clone();
            let orders: Rc<dyn PaperBroker> = wb;
            (quotes, Some(orders))
        } else {
            info!(quotes = cfg.prices.manual.len(), "Broker disabled; using manual prices");
            let quotes: Rc<dyn PriceProvider> =
                Rc::new(StaticPrices::new(cfg.prices.manual.clone()));
            (quotes, None)
        };

    let fresh = PortfolioState::seeded(
        cfg.targets
            .initial
            .iter()
            .map(|t| (t.ticker.as_str(), t.pct)),
    );
    let store = FileStore::open(&cfg.data_root()?, &user, fresh)?;
    if !store.has_snapshots() {
        info!(dir = %store.dir().display(), "New portfolio namespace");
    }
    let prices = PriceCache::new(provider, Duration::from_secs(cfg.prices.cache_ttl_sec));
    let mut pf = Portfolio::open(&user, store, prices, broker, &cfg)?;
    info!(user = pf.user(), "Ledger ready");

    if !args.is_empty() {
        run_line(&mut pf, &args.join(" ")).await;
        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
            break;
        }
        run_line(&mut pf, line).await;
    }
    Ok(())
}

/// `--user <name>` or `--user=<name>`, removed from `args`.
fn take_user_flag(args: &mut Vec<String>) -> anyhow::Result<Option<String>> {
    let Some(i) = args
        .iter()
        .position(|a| a == "--user" || a.starts_with("--user="))
    else {
        return Ok(None);
    };
    let flag = args.remove(i);
    if let Some(v) = flag.strip_prefix("--user=") {
        return Ok(Some(v.to_string()));
    }
    if i >= args.len() {
        bail!("--user needs a value");
    }
    Ok(Some(args.remove(i)))
}

async fn run_line<S: VersionedStore>(pf: &mut Portfolio<S>, line: &str) {
    let Some(cmd) = parse_command(line) else {
        println!("Unrecognised command: {line} (try HELP)");
        return;
    };
    match execute(pf, cmd).await {
        Ok(out) => println!("{out}"),
        Err(e) => {
            error!(command = line, error = %e, "Command failed");
            println!("Error: {e}");
        }
    }
}

async fn execute<S: VersionedStore>(pf: &mut Portfolio<S>, cmd: Command) -> LedgerResult<String> {
    Ok(match cmd {
        Command::Buy { ticker, shares, price } => {
            let id = pf.buy(&ticker, shares, price).await?;
            format!("Bought {shares} {ticker} @ ${price:.2} [{id}]")
        }
        Command::Sell { ticker, shares } => {
            let id = pf.sell(&ticker, shares).await?;
            let note = pf
                .state()
                .history
                .last()
                .and_then(|h| h.note.clone())
                .unwrap_or_default();
            format!("{note} [{id}]")
        }
        Command::AddTicker { ticker, target_pct } => {
            let id = pf.add_ticker(&ticker, target_pct)?;
            format!("Tracking {ticker} [{id}]")
        }
        Command::Contracts { ticker, weekly, owned } => {
            let id = pf.set_contracts(&ticker, weekly, owned)?;
            format!("{ticker}: {weekly} weekly / {owned} owned [{id}]")
        }
        Command::Margin(amount) => {
            let id = pf.update_margin(amount).await?;
            format!("Margin debt now ${amount:.2} [{id}]")
        }
        Command::Capital { amount, date } => {
            let id = pf.add_capital(amount, date).await?;
            format!("Added ${amount:.2} capital [{id}]")
        }
        Command::Initial(amount) => {
            let id = pf.set_initial_capital(amount).await?;
            format!("Initial capital ${amount:.2} [{id}]")
        }
        Command::Premium(amount) => {
            let id = pf.record_premium(amount).await?;
            format!("Recorded ${amount:.2} premium [{id}]")
        }
        Command::SellCalls {
            ticker,
            contracts,
            premium_per_contract,
            strike,
            expiry,
        } => {
            let today = Local::now().date_naive();
            let expiry = match expiry {
                Some(raw) => Some(expiry_from_str(&raw, today).ok_or_else(|| {
                    LedgerError::InvalidOrderParameters(format!(
                        "bad expiry {raw:?}"
                    ))
                })?),
                None => None,
            };
            let (premium, id) = pf
                .sell_calls(&ticker, contracts, premium_per_contract, strike, expiry)
                .await?;
            let t = pf.state().option_trades.last();
            match t {
                Some(t) => format!(
                    "Sold {contracts} {ticker} {}C {} for ${premium:.2} [{id}]",
                    t.strike, t.expiry
                ),
                None => format!("Sold {contracts} {ticker} calls for ${premium:.2} [{id}]"),
            }
        }
        Command::Assigned(index) => {
            let id = pf.mark_assigned(index)?;
            format!("Trade #{index} assigned [{id}]")
        }
        Command::Sweep => {
            let expired = pf.sweep_expired()?;
            format!("Expired {} trade(s)", expired.len())
        }
        Command::Trades => {
            let rows: Vec<String> = pf
                .open_trades()
                .into_iter()
                .map(|(i, t)| {
                    format!(
                        "#{i:<3} {:<6} {} {} {} x{} @ ${:.2}",
                        t.ticker, t.expiry, t.strike, t.kind, t.contracts, t.premium_per_contract
                    )
                })
                .collect();
            if rows.is_empty() {
                "No open option trades".into()
            } else {
                rows.join("\n")
            }
        }
        Command::Suggest(premium) => {
            let r = pf.suggest_reinvestment(premium).await?;
            format!(
                "Reinvest ${:.2} -> {:.4} {} @ ${:.2}",
                r.premium, r.shares, r.ticker, r.price
            )
        }
        Command::Exec(premium) => {
            let out = pf.execute_reinvestment(premium).await?;
            let how = match out.order_id {
                Some(id) => format!("order {id}"),
                None => "recorded manually".into(),
            };
            format!(
                "Bought {:.4} {} @ ${:.2} ({how})",
                out.plan.shares, out.plan.ticker, out.plan.price
            )
        }
        Command::Normalize => match pf.normalize_targets()? {
            Some(id) => format!("Targets normalised [{id}]"),
            None => "Targets sum to zero; nothing to normalise".into(),
        },
        Command::Status => pf.dashboard().await.to_string(),
        Command::Holdings => report::render_holdings(&pf.holdings().await),
        Command::Growth => report::render_growth(&pf.growth()),
        Command::Versions(limit) => pf
            .versions(limit)?
            .into_iter()
            .map(|v| match v.note {
                Some(n) => format!("{}  {n}", v.id),
                None => v.id.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Command::Restore(version) => {
            let id = pf.restore(&version)?;
            format!("Restored {version} as [{id}]")
        }
        Command::Refresh => {
            pf.refresh_prices();
            "Price cache cleared".into()
        }
        Command::Help => HELP.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(xs: &[&str]) -> Vec<String> {
        xs.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn user_flag_forms() {
        let mut a = args(&["--user", "bob", "STATUS"]);
        assert_eq!(take_user_flag(&mut a).unwrap().as_deref(), Some("bob"));
        assert_eq!(a, args(&["STATUS"]));

        let mut a = args(&["BUY", "1", "SLV", "@", "30", "--user=amy"]);
        assert_eq!(take_user_flag(&mut a).unwrap().as_deref(), Some("amy"));
        assert_eq!(a.len(), 5);

        let mut a = args(&["STATUS"]);
        assert_eq!(take_user_flag(&mut a).unwrap(), None);

        assert!(take_user_flag(&mut args(&["--user"])).is_err());
    }
}
