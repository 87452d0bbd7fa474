use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::error::RateLimitError;
use crate::error::Result;
use crate::window::RateWindow;

/// Independently rate limited class of outbound request
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    /// Public market data (candles, tickers, orderbooks, trades)
    Quotation,
    /// Authenticated endpoints without a dedicated group
    ExchangeDefault,
    /// Order placement and single-order cancellation
    ExchangeOrder,
    /// Bulk cancellation of open orders
    ExchangeCancelAll,
    /// WebSocket connection and subscription requests
    Socket,
}

impl Category {
    /// Every category, in table order
    pub const ALL: [Category; 5] =
        [Category::Quotation, Category::ExchangeDefault, Category::ExchangeOrder, Category::ExchangeCancelAll, Category::Socket];

    /// Dense index into per-category tables
    #[inline(always)]
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Category::Quotation => "QUOTATION",
            Category::ExchangeDefault => "EXCHANGE_DEFAULT",
            Category::ExchangeOrder => "EXCHANGE_ORDER",
            Category::ExchangeCancelAll => "EXCHANGE_CANCEL_ALL",
            Category::Socket => "SOCKET",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the remote side counts a quota against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MeasurementUnit {
    /// Shared by every client behind the same source address
    Ip,
    /// Shared by every key of the same account
    Account,
}

/// Quota set for one category
///
/// The first window is the primary window: cold-start caps and minimum
/// inter-request intervals derive from it.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryRule {
    windows: Vec<RateWindow>,
    unit: MeasurementUnit,
}

impl CategoryRule {
    pub fn new(windows: Vec<RateWindow>, unit: MeasurementUnit) -> Result<Self> {
        if windows.is_empty() {
            return Err(RateLimitError::InvalidConfig("a category rule needs at least one window".to_string()));
        }
        Ok(Self { windows, unit })
    }

    pub fn windows(&self) -> &[RateWindow] {
        &self.windows
    }

    pub fn unit(&self) -> MeasurementUnit {
        self.unit
    }

    pub fn primary(&self) -> &RateWindow {
        // Non-empty by construction
        &self.windows[0]
    }
}
