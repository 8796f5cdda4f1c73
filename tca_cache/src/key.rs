//! Deterministic cache key strings.
//!
//! Format: `<store>_<ticker>_<period_start>_<period_end>_<kind>_<offset_ms>[_comp]`
//! with RFC-3339 UTC millisecond timestamps. `store` and `ticker` are
//! percent-escaped for `%`, `_` and `#` so the separator stays unambiguous and
//! `#` stays free for chunk suffixes (`<key>#0`, `<key>#1`, ..., `<key>#meta`).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tca_engine::{models::TradeOrderKind, tz::to_rfc3339_millis};

/// What a cached entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataKind {
    Market,
    Trades(TradeOrderKind),
}

impl DataKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            DataKind::Market => "market",
            DataKind::Trades(k) => k.as_str(),
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub store: String,
    pub ticker: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub kind: DataKind,
    pub offset_ms: i64,
    pub compressed: bool,
}

impl CacheKey {
    pub fn new(
        store: impl Into<String>,
        ticker: impl Into<String>,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        kind: DataKind,
        offset_ms: i64,
    ) -> Self {
        Self {
            store: store.into(),
            ticker: ticker.into(),
            period_start,
            period_end,
            kind,
            offset_ms,
            compressed: false,
        }
    }

    pub fn with_compressed(mut self, compressed: bool) -> Self {
        self.compressed = compressed;
        self
    }

    /// The key string.
    pub fn encode(&self) -> String {
        let mut s = format!(
            "{}_{}_{}_{}_{}_{}",
            escape(&self.store),
            escape(&self.ticker),
            to_rfc3339_millis(self.period_start),
            to_rfc3339_millis(self.period_end),
            self.kind,
            self.offset_ms
        );
        if self.compressed {
            s.push_str("_comp");
        }
        s
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// `make_key(store, ticker, start, finish, kind, offset_ms)` for uncompressed entries.
pub fn make_key(
    store: &str,
    ticker: &str,
    start: DateTime<Utc>,
    finish: DateTime<Utc>,
    kind: DataKind,
    offset_ms: i64,
) -> String {
    CacheKey::new(store, ticker, start, finish, kind, offset_ms).encode()
}

/// Storage key of the `index`-th chunk under `base`.
pub fn chunk_key(base: &str, index: usize) -> String {
    format!("{base}#{index}")
}

/// Prefix shared by the manifest and every chunk under `base`. Components
/// escape `#`, so no other entry's keys start with it.
pub fn entry_prefix(base: &str) -> String {
    format!("{base}#")
}

/// Storage key of the manifest under `base`.
pub fn meta_key(base: &str) -> String {
    format!("{base}#meta")
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' => out.push_str("%25"),
            '_' => out.push_str("%5F"),
            '#' => out.push_str("%23"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn jan() -> (DateTime<Utc>, DateTime<Utc>) {
        (
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn renders_documented_format() {
        let (s, e) = jan();
        let k = CacheKey::new("ncfx", "EURUSD", s, e, DataKind::Market, 0).with_compressed(true);
        assert_eq!(
            k.encode(),
            "ncfx_EURUSD_2024-01-01T00:00:00.000Z_2024-02-01T00:00:00.000Z_market_0_comp"
        );
        assert_eq!(chunk_key(&k.encode(), 2), format!("{k}#2"));
    }

    #[test]
    fn underscores_in_free_text_cannot_collide() {
        let (s, e) = jan();
        let a = make_key("a_b", "c", s, e, DataKind::Market, 0);
        let b = make_key("a", "b_c", s, e, DataKind::Market, 0);
        assert_ne!(a, b);
        assert!(!make_key("x#y", "z", s, e, DataKind::Market, 0).contains('#'));
    }

    #[test]
    fn each_field_changes_the_key() {
        let (s, e) = jan();
        let base = make_key("db", "EURUSD", s, e, DataKind::Market, 0);
        let one_ms = chrono::Duration::milliseconds(1);
        let variants = [
            make_key("db2", "EURUSD", s, e, DataKind::Market, 0),
            make_key("db", "GBPUSD", s, e, DataKind::Market, 0),
            make_key("db", "EURUSD", s + one_ms, e, DataKind::Market, 0),
            make_key("db", "EURUSD", s, e + one_ms, DataKind::Market, 0),
            make_key("db", "EURUSD", s, e, DataKind::Trades(TradeOrderKind::Trade), 0),
            make_key("db", "EURUSD", s, e, DataKind::Market, 250),
        ];
        for v in variants {
            assert_ne!(v, base);
        }
    }

    proptest! {
        #[test]
        fn keys_are_deterministic(store in "[a-z_#%]{1,8}", ticker in "[A-Z_]{1,8}", off in -5_000i64..5_000) {
            let (s, e) = jan();
            let a = make_key(&store, &ticker, s, e, DataKind::Market, off);
            let b = make_key(&store, &ticker, s, e, DataKind::Market, off);
            prop_assert_eq!(a, b);
        }

        #[test]
        fn distinct_tickers_give_distinct_keys(t1 in "[A-Z_%]{1,6}", t2 in "[A-Z_%]{1,6}") {
            prop_assume!(t1 != t2);
            let (s, e) = jan();
            prop_assert_ne!(
                make_key("db", &t1, s, e, DataKind::Market, 0),
                make_key("db", &t2, s, e, DataKind::Market, 0)
            );
        }
    }
}
