//! Two-level cap resolution: key override first, then fetcher default.

use rl_schemas::{Fetcher, FetcherKey};

/// A resolved per-window cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cap {
    Unlimited,
    Limit(i64),
}

impl Cap {
    /// Would `used + requested` stay within this cap?
    pub fn admits(&self, used: i64, requested: i64) -> bool {
        match self {
            Cap::Unlimited => true,
            Cap::Limit(cap) => used.saturating_add(requested) <= *cap,
        }
    }

    /// Storage/wire representation: `0` means unlimited.
    pub fn as_i64(&self) -> i64 {
        match self {
            Cap::Unlimited => 0,
            Cap::Limit(n) => *n,
        }
    }
}

/// Resolve one cap.
///
/// A key override that is present and `> 0` wins; zero or unset means "use
/// the fetcher default". A resolved value `<= 0` is unlimited.
pub fn resolve_cap(key_override: Option<i64>, fetcher_default: i64) -> Cap {
    let resolved = match key_override {
        Some(v) if v > 0 => v,
        _ => fetcher_default,
    };
    if resolved <= 0 {
        Cap::Unlimited
    } else {
        Cap::Limit(resolved)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveCaps {
    pub per_minute: Cap,
    pub daily: Cap,
}

impl EffectiveCaps {
    pub fn unlimited() -> Self {
        Self {
            per_minute: Cap::Unlimited,
            daily: Cap::Unlimited,
        }
    }

    pub fn resolve(key: &FetcherKey, fetcher: &Fetcher) -> Self {
        Self {
            per_minute: resolve_cap(key.per_minute_cap_items, fetcher.per_minute_cap_items),
            daily: resolve_cap(key.daily_cap_items, fetcher.daily_cap_items),
        }
    }
}
