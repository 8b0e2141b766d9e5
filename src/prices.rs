//! Price lookup behind a TTL cache.
//!
//! Lookups never fail past this module: a provider error degrades to a
//! book where every requested ticker is missing (priced at 0), and the
//! caller sees `is_partial()`.

use async_trait::async_trait;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::LedgerResult;
use crate::utils::sanitize_symbol;

/// Runs on the current-thread runtime, so futures need not be `Send`.
#[async_trait(?Send)]
pub trait PriceProvider {
    /// May omit tickers or return 0 for them.
    async fn get_prices(&self, tickers: &[String]) -> LedgerResult<HashMap<String, f64>>;
}

/// Fixed quotes from configuration; used when no live feed is configured.
#[derive(Debug, Clone, Default)]
pub struct StaticPrices {
    prices: HashMap<String, f64>,
}

impl StaticPrices {
    pub fn new(prices: HashMap<String, f64>) -> Self {
        Self {
            prices: prices
                .into_iter()
                .map(|(t, p)| (sanitize_symbol(&t), p))
                .collect(),
        }
    }
}

#[async_trait(?Send)]
impl PriceProvider for StaticPrices {
    async fn get_prices(&self, tickers: &[String]) -> LedgerResult<HashMap<String, f64>> {
        Ok(tickers
            .iter()
            .filter_map(|t| self.prices.get(t).map(|p| (t.clone(), *p)))
            .collect())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceBook {
    pub prices: HashMap<String, f64>,
    /// Requested tickers without a usable quote.
    pub missing: Vec<String>,
}

impl PriceBook {
    pub fn price(&self, ticker: &str) -> f64 {
        self.prices.get(ticker).copied().unwrap_or(0.0)
    }

    pub fn is_partial(&self) -> bool {
        !self.missing.is_empty()
    }

    fn from_quotes(tickers: &[String], raw: HashMap<String, f64>) -> Self {
        let mut book = PriceBook::default();
        for t in tickers {
            match raw.get(t) {
                Some(p) if p.is_finite() && *p > 0.0 => {
                    book.prices.insert(t.clone(), *p);
                }
                _ => book.missing.push(t.clone()),
            }
        }
        book
    }

    fn unknown(tickers: &[String]) -> Self {
        PriceBook {
            prices: HashMap::new(),
            missing: tickers.to_vec(),
        }
    }
}

/// Caches one book per requested ticker set for `ttl`.
pub struct PriceCache {
    provider: Rc<dyn PriceProvider>,
    ttl: Duration,
    entries: HashMap<Vec<String>, (Instant, PriceBook)>,
}

impl PriceCache {
    pub fn new(provider: Rc<dyn PriceProvider>, ttl: Duration) -> Self {
        Self {
            provider,
            ttl,
            entries: HashMap::new(),
        }
    }

    pub async fn quotes(&mut self, tickers: &[String]) -> PriceBook {
        let mut key: Vec<String> = tickers.iter().map(|t| sanitize_symbol(t)).collect();
        key.sort();
        key.dedup();

        if let Some((at, book)) = self.entries.get(&key) {
            if at.elapsed() < self.ttl {
                debug!(tickers = key.len(), "Price cache hit");
                return book.clone();
            }
        }

        match self.provider.get_prices(&key).await {
            Ok(raw) => {
                let book = PriceBook::from_quotes(&key, raw);
                if book.is_partial() {
                    warn!(missing = ?book.missing, "Partial quotes; missing prices count as 0");
                }
                self.entries.insert(key, (Instant::now(), book.clone()));
                book
            }
            Err(e) => {
                // Not cached: the next valuation asks the provider again.
                warn!(error = %e, "Price lookup failed; valuing at 0");
                PriceBook::unknown(&key)
            }
        }
    }

    pub fn invalidate(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LedgerError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait(?Send)]
    impl PriceProvider for Counting {
        async fn get_prices(&self, tickers: &[String]) -> LedgerResult<HashMap<String, f64>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(LedgerError::ExternalService("feed down".into()));
            }
            Ok(tickers
                .iter()
                .filter(|t| t.as_str() != "DEAD")
                .map(|t| (t.clone(), 10.0))
                .collect())
        }
    }

    fn counting(fail: bool) -> Rc<Counting> {
        Rc::new(Counting {
            calls: AtomicUsize::new(0),
            fail,
        })
    }

    fn tickers(ts: &[&str]) -> Vec<String> {
        ts.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn repeated_lookups_within_ttl_hit_cache() {
        let p = counting(false);
        let mut cache = PriceCache::new(p.clone(), Duration::from_secs(300));
        let a = cache.quotes(&tickers(&["SLV", "TQQQ"])).await;
        let b = cache.quotes(&tickers(&["tqqq", "SLV"])).await;
        assert_eq!(a, b);
        assert_eq!(p.calls.load(Ordering::SeqCst), 1);

        cache.quotes(&tickers(&["SLV"])).await;
        assert_eq!(p.calls.load(Ordering::SeqCst), 2);

        cache.invalidate();
        cache.quotes(&tickers(&["SLV"])).await;
        assert_eq!(p.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn expired_entries_are_refetched() {
        let p = counting(false);
        let mut cache = PriceCache::new(p.clone(), Duration::ZERO);
        cache.quotes(&tickers(&["SLV"])).await;
        cache.quotes(&tickers(&["SLV"])).await;
        assert_eq!(p.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn provider_failure_degrades_to_zero_prices() {
        let p = counting(true);
        let mut cache = PriceCache::new(p.clone(), Duration::from_secs(300));
        let book = cache.quotes(&tickers(&["SLV", "URA"])).await;
        assert!(book.is_partial());
        assert_eq!(book.price("SLV"), 0.0);
        assert_eq!(book.missing, tickers(&["SLV", "URA"]));
        cache.quotes(&tickers(&["SLV", "URA"])).await;
        assert_eq!(p.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn missing_tickers_are_flagged() {
        let mut cache = PriceCache::new(counting(false), Duration::from_secs(300));
        let book = cache.quotes(&tickers(&["DEAD", "IAU"])).await;
        assert_eq!(book.price("IAU"), 10.0);
        assert_eq!(book.missing, tickers(&["DEAD"]));
    }

    #[tokio::test]
    async fn static_prices_ignore_case_in_config() {
        let sp = StaticPrices::new(HashMap::from([("soxl".to_string(), 31.0)]));
        let got = sp.get_prices(&tickers(&["SOXL", "SLV"])).await.unwrap();
        assert_eq!(got.get("SOXL"), Some(&31.0));
        assert!(!got.contains_key("SLV"));
    }
}
