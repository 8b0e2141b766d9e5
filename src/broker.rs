//! Webull session used as the live quote feed and the paper order sink.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{info, warn};
use webull_unofficial::{
    error::WebullError,
    models::{OrderAction, TimeInForce},
    WebullClient,
};

use crate::error::{LedgerError, LedgerResult};
use crate::prices::PriceProvider;
use crate::types::Side;

/// Order submission; on error or absence the caller records the trade by hand.
#[async_trait(?Send)]
pub trait PaperBroker {
    /// Returns the broker's order id.
    async fn submit_market_order(&self, ticker: &str, qty: f64, side: Side) -> LedgerResult<String>;
}

pub struct WbCtx {
    client: WebullClient,
    pub is_live: bool,
}

impl WbCtx {
    /// Password login; when the account answers with an MFA challenge the code
    /// is read from the terminal and the login retried. Live mode also
    /// unlocks trading with the PIN.
    pub async fn login(
        username: &str,
        password: &str,
        region: Option<i32>,
        mode: &str,
        trading_pin: Option<&str>,
    ) -> Result<Self> {
        let is_live = mode == "live";
        let mut client = if is_live {
            WebullClient::new_live(region).context("create live client")?
        } else {
            WebullClient::new_paper(region).context("create paper client")?
        };
        info!(user = %mask_user(username), mode, ?region, "Webull login");

        match client.login_with().username(username).password(password).await {
            Ok(_) => {}
            // Some accounts report a plain auth failure instead of MfaRequired.
            Err(WebullError::MfaRequired) | Err(WebullError::AuthenticationError(_)) => {
                warn!("Webull asked for a verification code");
                let code = prompt_line("Webull verification code: ").await?;
                client
                    .login_with()
                    .username(username)
                    .password(password)
                    .mfa(code.as_str())
                    .await
                    .context("webull login with verification code")?;
            }
            Err(e) => return Err(e).context("webull login"),
        }

        if is_live {
            let pin = trading_pin.context("WEBULL_TRADING_PIN is required in live mode")?;
            client.get_trade_token(pin).await.context("unlock live trading")?;
        }
        info!(live = is_live, "Webull session ready");
        Ok(Self { client, is_live })
    }

    async fn ticker_id(&self, symbol: &str) -> Result<i64> {
        let found = self.client.find_ticker(symbol).await?;
        found
            .first()
            .map(|t| t.ticker_id)
            .with_context(|| format!("no Webull instrument for {symbol}"))
    }

    /// Bid/ask midpoint when both sides are quoted, else the last close.
    async fn last_price(&self, symbol: &str) -> Result<f64> {
        let id = self.ticker_id(symbol).await?;
        let q = self.client.get_quotes(&id.to_string()).await?;
        Ok(match (q.bid, q.ask) {
            (Some(bid), Some(ask)) if bid > 0.0 && ask > 0.0 => (bid + ask) / 2.0,
            _ => q.close,
        })
    }
}

#[async_trait(?Send)]
impl PriceProvider for WbCtx {
    /// A ticker whose quote fails is left out; only a total failure is an error.
    async fn get_prices(&self, tickers: &[String]) -> LedgerResult<HashMap<String, f64>> {
        let mut out = HashMap::with_capacity(tickers.len());
        for t in tickers {
            match self.last_price(t).await {
                Ok(p) => {
                    out.insert(t.clone(), p);
                }
                Err(e) => warn!(ticker = %t, error = format!("{e:#}"), "Webull quote failed"),
            }
        }
        if out.is_empty() && !tickers.is_empty() {
            return Err(LedgerError::ExternalService(format!(
                "no Webull quotes for {} ticker(s)",
                tickers.len()
            )));
        }
        Ok(out)
    }
}

#[async_trait(?Send)]
impl PaperBroker for WbCtx {
    async fn submit_market_order(
        &self,
        ticker: &str,
        qty: f64,
        side: Side,
    ) -> LedgerResult<String> {
        let action = match side {
            Side::Buy => OrderAction::Buy,
            Side::Sell => OrderAction::Sell,
        };
        let placed = async {
            let id = self.ticker_id(ticker).await?;
            let order_id = self
                .client
                .place_market_order_with()
                .ticker_id(id)
                .quantity(qty)
                .action(action)
                .time_in_force(TimeInForce::GoodTillCancel)
                .await?;
            Ok::<_, anyhow::Error>(order_id)
        };
        placed
            .await
            .map_err(|e| LedgerError::ExternalService(format!("{e:#}")))
    }
}

/// Read one non-empty line from the terminal without blocking the runtime.
async fn prompt_line(prompt: &str) -> Result<String> {
    use std::io::{self, Write};
    let prompt = prompt.to_string();
    tokio::task::spawn_blocking(move || -> Result<String> {
        print!("{prompt}");
        io::stdout().flush()?;
        let mut buf = String::new();
        io::stdin().read_line(&mut buf)?;
        let s = buf.trim().to_string();
        if s.is_empty() {
            return Err(anyhow!("empty input"));
        }
        Ok(s)
    })
    .await
    .map_err(|e| anyhow!("prompt task failed: {e}"))?
}

/// First two characters, rest masked (for logs only).
fn mask_user(u: &str) -> String {
    let head: String = u.chars().take(2).collect();
    format!("{head:*<2}****")
}
