use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of asset classes the rest of the core is allowed to branch
/// on. Any input outside this set must be normalized before it reaches
/// here — see [`AssetClass::normalize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetClass {
    Crypto,
    Forex,
    Equity,
}

impl AssetClass {
    /// Map a raw, possibly free-form tag to a canonical asset class.
    /// Unknown input defaults to `Crypto` with a logged warning — it must
    /// never propagate the raw string further into the system.
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "crypto" | "cryptocurrency" | "digital_asset" | "coin" => AssetClass::Crypto,
            "forex" | "fx" | "currency" => AssetClass::Forex,
            "equity" | "equities" | "stock" | "stocks" | "share" => AssetClass::Equity,
            other => {
                tracing::warn!(raw = other, "unrecognized asset class, defaulting to crypto");
                AssetClass::Crypto
            }
        }
    }
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetClass::Crypto => write!(f, "crypto"),
            AssetClass::Forex => write!(f, "forex"),
            AssetClass::Equity => write!(f, "equity"),
        }
    }
}

/// A canonical instrument identifier: uppercase, separators stripped.
/// Construction is the only place normalization happens; once built, the
/// wrapped string is already canonical.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instrument {
    symbol: String,
    pub asset_class: AssetClass,
}

impl Instrument {
    pub fn new(raw: &str, raw_asset_class: &str) -> Self {
        Self {
            symbol: canonicalize(raw),
            asset_class: AssetClass::normalize(raw_asset_class),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol)
    }
}

/// Uppercase and strip separators. Idempotent and total: `canon(canon(x))
/// == canon(x)` for every input, including the empty string.
pub fn canonicalize(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_uppercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_strips_separators_and_cases() {
        assert_eq!(canonicalize("BTC/USD"), "BTCUSD");
        assert_eq!(canonicalize("btc-usd"), "BTCUSD");
        assert_eq!(canonicalize("BTCUSD"), "BTCUSD");
    }

    #[test]
    fn canonicalize_is_idempotent() {
        let once = canonicalize("btc/usd");
        let twice = canonicalize(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn asset_class_normalizes_known_variants() {
        assert_eq!(AssetClass::normalize("STOCK"), AssetClass::Equity);
        assert_eq!(AssetClass::normalize("fx"), AssetClass::Forex);
    }

    #[test]
    fn asset_class_defaults_unknown_to_crypto() {
        assert_eq!(AssetClass::normalize("bogus"), AssetClass::Crypto);
    }

    #[test]
    fn asset_class_normalize_is_idempotent() {
        let a = AssetClass::normalize("equities");
        let b = AssetClass::normalize(&a.to_string());
        assert_eq!(a, b);
    }
}
