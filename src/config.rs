//! Load and validate runtime configuration.

use anyhow::{ensure, Context};
use directories::ProjectDirs;
use serde::Deserialize;
use std::collections::HashMap;
use std::{fs, path::Path, path::PathBuf};

use crate::history::{DEFAULT_EQUITY_GOAL, DEFAULT_PREMIUM_WINDOW};

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageCfg {
    /// Defaults to the platform data directory.
    pub root: Option<PathBuf>,
    /// Versions shown by the version listing.
    pub list_limit: usize,
}

impl Default for StorageCfg {
    fn default() -> Self {
        Self {
            root: None,
            list_limit: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PricesCfg {
    pub cache_ttl_sec: u64,
    /// Fixed quotes used when the broker feed is off.
    pub manual: HashMap<String, f64>,
}

impl Default for PricesCfg {
    fn default() -> Self {
        Self {
            cache_ttl_sec: 300,
            manual: HashMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BrokerCfg {
    pub enabled: bool,
    pub mode: String, // "paper" or "live"
    pub region: Option<i32>,
}

impl Default for BrokerCfg {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: "paper".into(),
            region: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GoalsCfg {
    pub net_equity_goal: f64,
    pub monthly_premium_target: f64,
    pub premium_window: usize,
}

impl Default for GoalsCfg {
    fn default() -> Self {
        Self {
            net_equity_goal: DEFAULT_EQUITY_GOAL,
            monthly_premium_target: 100_000.0,
            premium_window: DEFAULT_PREMIUM_WINDOW,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct TargetCfg {
    pub ticker: String,
    pub pct: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TargetsCfg {
    /// Seeded into a brand-new portfolio, in this order.
    pub initial: Vec<TargetCfg>,
    /// Target given to a ticker added without an explicit percentage.
    pub new_ticker_pct: f64,
}

impl Default for TargetsCfg {
    fn default() -> Self {
        let initial = [
            ("SOXL", 0.30),
            ("SLV", 0.25),
            ("TQQQ", 0.16),
            ("URA", 0.10),
            ("IAU", 0.06),
            ("COPX", 0.06),
            ("UPRO", 0.06),
            ("UAMY", 0.01),
        ]
        .into_iter()
        .map(|(t, pct)| TargetCfg {
            ticker: t.into(),
            pct,
        })
        .collect();
        Self {
            initial,
            new_ticker_pct: 0.005,
        }
    }
}

impl TargetsCfg {
    /// Configured percentage for a known ticker, else the new-ticker default.
    pub fn pct_for(&self, ticker: &str) -> f64 {
        self.initial
            .iter()
            .find(|t| t.ticker.eq_ignore_ascii_case(ticker))
            .map(|t| t.pct)
            .unwrap_or(self.new_ticker_pct)
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageCfg,
    pub prices: PricesCfg,
    pub broker: BrokerCfg,
    pub goals: GoalsCfg,
    pub targets: TargetsCfg,
}

impl AppConfig {
    /// A missing file yields the defaults; a malformed one is an error.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let s = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        Self::from_yaml(&s).with_context(|| format!("parse {}", path.display()))
    }

    pub fn from_yaml(s: &str) -> anyhow::Result<Self> {
        let cfg: Self = serde_yaml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            matches!(self.broker.mode.as_str(), "paper" | "live"),
            "broker.mode must be \"paper\" or \"live\", got {:?}",
            self.broker.mode
        );
        ensure!(self.goals.premium_window > 0, "goals.premium_window must be > 0");
        ensure!(self.storage.list_limit > 0, "storage.list_limit must be > 0");
        ensure!(
            self.targets.initial.iter().all(|t| t.pct >= 0.0)
                && self.targets.new_ticker_pct >= 0.0,
            "target percentages must be non-negative"
        );
        Ok(())
    }

    pub fn data_root(&self) -> anyhow::Result<PathBuf> {
        if let Some(root) = &self.storage.root {
            return Ok(root.clone());
        }
        let dirs = ProjectDirs::from("", "", "wheel-ledger")
            .context("no home directory to place portfolio data in")?;
        Ok(dirs.data_dir().to_path_buf())
    }
}
