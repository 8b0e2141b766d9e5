//! Per-user session context. Every operation is a read-modify-persist cycle:
//! the change is applied to a copy of the state, a history entry is appended
//! where the action moves money, the copy is persisted as a new snapshot, and
//! only then does it replace the in-memory state. A failed step leaves both
//! memory and disk as they were.

use chrono::{Local, NaiveDate};
use std::rc::Rc;
use tracing::{info, warn};

use crate::broker::PaperBroker;
use crate::config::{AppConfig, GoalsCfg, TargetsCfg};
use crate::error::{LedgerError, LedgerResult};
use crate::history::{self, GrowthPoint};
use crate::ledger::Valuation;
use crate::planner::{self, Reinvestment};
use crate::prices::{PriceBook, PriceCache};
use crate::report::{self, Dashboard, HoldingRow};
use crate::store::{SnapshotId, VersionedStore};
use crate::types::{CapitalAddition, HistoryEntry, OptionTrade, PortfolioState, Side};
use crate::utils::{next_weekly_expiry, sanitize_symbol};
use crate::wheel::{self, CallSale};

const NOTE_PREVIEW_CHARS: usize = 40;

#[derive(Debug, Clone, PartialEq)]
pub struct VersionInfo {
    pub id: SnapshotId,
    /// Note of that snapshot's latest history entry, shortened.
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReinvestOutcome {
    pub plan: Reinvestment,
    /// Broker order id when the paper order went through.
    pub order_id: Option<String>,
}

pub struct Portfolio<S: VersionedStore> {
    user: String,
    store: S,
    state: PortfolioState,
    prices: PriceCache,
    broker: Option<Rc<dyn PaperBroker>>,
    goals: GoalsCfg,
    targets: TargetsCfg,
    list_limit: usize,
    clock: fn() -> NaiveDate,
}

fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

impl<S: VersionedStore> Portfolio<S> {
    /// Load the latest state, expire stale option trades and write the
    /// session's baseline snapshot before any mutation.
    pub fn open(
        user: &str,
        store: S,
        prices: PriceCache,
        broker: Option<Rc<dyn PaperBroker>>,
        cfg: &AppConfig,
    ) -> LedgerResult<Self> {
        Self::open_with_clock(user, store, prices, broker, cfg, local_today)
    }

    pub fn open_with_clock(
        user: &str,
        mut store: S,
        prices: PriceCache,
        broker: Option<Rc<dyn PaperBroker>>,
        cfg: &AppConfig,
        clock: fn() -> NaiveDate,
    ) -> LedgerResult<Self> {
        let mut state = store.latest()?;
        let expired = wheel::sweep_expired(&mut state, clock());
        let baseline = store.persist(&state)?;
        info!(
            user,
            snapshot = %baseline,
            tickers = state.positions.len(),
            expired = expired.len(),
            "Session opened"
        );
        Ok(Self {
            user: user.to_string(),
            store,
            state,
            prices,
            broker,
            goals: cfg.goals.clone(),
            targets: cfg.targets.clone(),
            list_limit: cfg.storage.list_limit,
            clock,
        })
    }

    pub fn state(&self) -> &PortfolioState {
        &self.state
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    fn today(&self) -> NaiveDate {
        (self.clock)()
    }

    fn commit(&mut self, next: PortfolioState) -> LedgerResult<SnapshotId> {
        let id = self.store.persist(&next)?;
        self.state = next;
        Ok(id)
    }

    async fn quotes_for(&mut self, state: &PortfolioState) -> PriceBook {
        self.prices.quotes(&state.tickers()).await
    }

    pub async fn quotes(&mut self) -> PriceBook {
        let tickers = self.state.tickers();
        self.prices.quotes(&tickers).await
    }

    pub async fn valuation(&mut self) -> (Valuation, PriceBook) {
        let book = self.quotes().await;
        (self.state.valuation(&book.prices), book)
    }

    /// History row stamped with `next`'s gross value and the current margin.
    async fn entry_for(&mut self, next: &PortfolioState) -> HistoryEntry {
        let book = self.quotes_for(next).await;
        HistoryEntry::new(
            self.today(),
            next.valuation(&book.prices).total,
            next.current_margin(),
        )
    }

    pub async fn buy(&mut self, ticker: &str, shares: f64, price: f64) -> LedgerResult<SnapshotId> {
        let mut next = self.state.clone();
        next.add_purchase(ticker, shares, price)?;
        let entry = self.entry_for(&next).await;
        history::append(&mut next, entry);
        let id = self.commit(next)?;
        info!(ticker = %sanitize_symbol(ticker), shares, price, snapshot = %id, "Buy recorded");
        Ok(id)
    }

    /// Full sells reset the basis; the realised P&L at average cost goes into the note.
    pub async fn sell(&mut self, ticker: &str, shares: f64) -> LedgerResult<SnapshotId> {
        let sym = sanitize_symbol(ticker);
        let mut next = self.state.clone();
        let avg_cost = next.sell(&sym, shares)?;
        let book = self.quotes_for(&next).await;
        let mut entry = HistoryEntry::new(
            self.today(),
            next.valuation(&book.prices).total,
            next.current_margin(),
        );
        let price = book.price(&sym);
        if price > 0.0 {
            let realized = (price - avg_cost) * shares;
            entry = entry.with_note(format!(
                "Sold {shares:.4} {sym}, realized ${realized:.2} vs avg cost"
            ));
        } else {
            entry = entry.with_note(format!("Sold {shares:.4} {sym}"));
        }
        history::append(&mut next, entry);
        let id = self.commit(next)?;
        info!(ticker = %sym, shares, snapshot = %id, "Sell recorded");
        Ok(id)
    }

    /// `target_pct` defaults to the configured allocation, else the new-ticker default.
    pub fn add_ticker(
        &mut self,
        ticker: &str,
        target_pct: Option<f64>,
    ) -> LedgerResult<SnapshotId> {
        let pct = target_pct.unwrap_or_else(|| self.targets.pct_for(ticker));
        let mut next = self.state.clone();
        next.add_ticker(ticker, pct)?;
        self.commit(next)
    }

    /// Returns `None` when there was nothing to normalise.
    pub fn normalize_targets(&mut self) -> LedgerResult<Option<SnapshotId>> {
        let mut next = self.state.clone();
        if !planner::normalize_targets(&mut next.positions) {
            return Ok(None);
        }
        self.commit(next).map(Some)
    }

    pub fn set_contracts(
        &mut self,
        ticker: &str,
        weekly: u32,
        owned: u32,
    ) -> LedgerResult<SnapshotId> {
        let mut next = self.state.clone();
        next.set_contracts(ticker, weekly, owned)?;
        self.commit(next)
    }

    pub async fn set_initial_capital(&mut self, amount: f64) -> LedgerResult<SnapshotId> {
        if !(amount > 0.0) {
            return Err(LedgerError::Validation("initial capital must be positive".into()));
        }
        if self.state.initial_capital > 0.0 {
            return Err(LedgerError::Validation(format!(
                "initial capital already set to {:.2}",
                self.state.initial_capital
            )));
        }
        let mut next = self.state.clone();
        next.initial_capital = amount;
        let entry = self.entry_for(&next).await.with_note("Initial capital set");
        history::append(&mut next, entry);
        self.commit(next)
    }

    pub async fn add_capital(
        &mut self,
        amount: f64,
        date: Option<NaiveDate>,
    ) -> LedgerResult<SnapshotId> {
        if !(amount > 0.0) {
            return Err(LedgerError::Validation("capital addition must be positive".into()));
        }
        let mut next = self.state.clone();
        next.capital_additions.push(CapitalAddition {
            date: date.unwrap_or_else(|| self.today()),
            amount,
        });
        let entry = self.entry_for(&next).await;
        history::append(&mut next, entry);
        self.commit(next)
    }

    pub async fn update_margin(&mut self, margin_debt: f64) -> LedgerResult<SnapshotId> {
        if !(margin_debt >= 0.0) {
            return Err(LedgerError::Validation("margin debt must be non-negative".into()));
        }
        let mut next = self.state.clone();
        let mut entry = self.entry_for(&next).await;
        entry.margin_debt = margin_debt;
        history::append(&mut next, entry);
        self.commit(next)
    }

    pub async fn record_premium(&mut self, amount: f64) -> LedgerResult<SnapshotId> {
        if !(amount > 0.0) {
            return Err(LedgerError::Validation("premium must be positive".into()));
        }
        let mut next = self.state.clone();
        let entry = self.entry_for(&next).await.with_premium(amount);
        history::append(&mut next, entry);
        self.commit(next)
    }

    /// Sell weekly calls. Strike defaults to the OTM heuristic on the current
    /// quote; expiry defaults to next Friday.
    pub async fn sell_calls(
        &mut self,
        ticker: &str,
        contracts: u32,
        premium_per_contract: f64,
        strike: Option<f64>,
        expiry: Option<NaiveDate>,
    ) -> LedgerResult<(f64, SnapshotId)> {
        let sym = sanitize_symbol(ticker);
        wheel::check_order(contracts, premium_per_contract)?;
        let (valuation, book) = self.valuation().await;
        let strike = match strike {
            Some(s) => s,
            None => {
                let px = book.price(&sym);
                if !(px > 0.0) {
                    return Err(LedgerError::NoPriceAvailable(sym));
                }
                planner::weekly_call_strike(&sym, px)
            }
        };
        let today = self.today();
        let sale = CallSale {
            ticker: sym.clone(),
            contracts,
            premium_per_contract,
            strike,
            expiry: expiry.unwrap_or_else(|| next_weekly_expiry(today)),
        };
        let mut next = self.state.clone();
        let margin = next.current_margin();
        let premium = wheel::sell_calls(&mut next, &sale, today, valuation.total, margin)?;
        let id = self.commit(next)?;
        info!(ticker = %sym, contracts, strike, premium, snapshot = %id, "Calls sold");
        Ok((premium, id))
    }

    pub fn mark_assigned(&mut self, index: usize) -> LedgerResult<SnapshotId> {
        let mut next = self.state.clone();
        wheel::mark_assigned(&mut next, index)?;
        self.commit(next)
    }

    pub fn sweep_expired(&mut self) -> LedgerResult<Vec<usize>> {
        let mut next = self.state.clone();
        let expired = wheel::sweep_expired(&mut next, self.today());
        if !expired.is_empty() {
            self.commit(next)?;
        }
        Ok(expired)
    }

    pub async fn suggest_reinvestment(&mut self, premium: f64) -> LedgerResult<Reinvestment> {
        let book = self.quotes().await;
        planner::suggest_reinvestment(&self.state, premium, &book.prices)
    }

    /// Buy the suggestion through the paper broker when one is configured.
    /// The purchase is recorded at the quoted price whether or not the order went through.
    pub async fn execute_reinvestment(&mut self, premium: f64) -> LedgerResult<ReinvestOutcome> {
        let plan = self.suggest_reinvestment(premium).await?;
        let order_id = match &self.broker {
            Some(b) => match b.submit_market_order(&plan.ticker, plan.shares, Side::Buy).await {
                Ok(id) => {
                    info!(ticker = %plan.ticker, order = %id, "Paper order submitted");
                    Some(id)
                }
                Err(e) => {
                    warn!(
                        ticker = %plan.ticker,
                        error = %e,
                        "Paper order failed; recording manually"
                    );
                    None
                }
            },
            None => None,
        };

        if let Err(e) = self.record_reinvestment(&plan).await {
            if let Some(id) = &order_id {
                warn!(
                    order = %id,
                    ticker = %plan.ticker,
                    shares = plan.shares,
                    price = plan.price,
                    error = %e,
                    "Paper order placed but not recorded; record it by hand"
                );
            }
            return Err(e);
        }
        Ok(ReinvestOutcome { plan, order_id })
    }

    async fn record_reinvestment(&mut self, plan: &Reinvestment) -> LedgerResult<SnapshotId> {
        let mut next = self.state.clone();
        next.add_purchase(&plan.ticker, plan.shares, plan.price)?;
        let entry = self.entry_for(&next).await.with_note(format!(
            "Reinvested ${:.2} premium into {}",
            plan.premium, plan.ticker
        ));
        history::append(&mut next, entry);
        self.commit(next)
    }

    pub fn versions(&self, limit: Option<usize>) -> LedgerResult<Vec<VersionInfo>> {
        let ids = self.store.list(limit.unwrap_or(self.list_limit))?;
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            // An unreadable snapshot still lists, just without its note.
            let note = self
                .store
                .get(&id)
                .ok()
                .and_then(|st| st.history.last().and_then(|h| h.note.clone()))
                .map(|n| n.chars().take(NOTE_PREVIEW_CHARS).collect());
            out.push(VersionInfo { id, note });
        }
        Ok(out)
    }

    pub fn restore(&mut self, version: &str) -> LedgerResult<SnapshotId> {
        let id: SnapshotId = version.parse()?;
        let (new_id, state) = self.store.restore(&id)?;
        self.state = state;
        Ok(new_id)
    }

    pub async fn dashboard(&mut self) -> Dashboard {
        let book = self.quotes().await;
        Dashboard::build(&self.state, &book, &self.goals)
    }

    pub async fn holdings(&mut self) -> Vec<HoldingRow> {
        let book = self.quotes().await;
        report::holdings_table(&self.state, &book)
    }

    pub fn growth(&self) -> Vec<GrowthPoint> {
        history::growth_series(&self.state)
    }

    pub fn open_trades(&self) -> Vec<(usize, &OptionTrade)> {
        wheel::open_trades(&self.state)
    }

    /// Drop cached quotes so the next read goes to the provider.
    pub fn refresh_prices(&mut self) {
        self.prices.invalidate();
    }
}
