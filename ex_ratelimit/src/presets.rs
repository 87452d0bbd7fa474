//! Built-in quota table and endpoint map for the exchange API
//!
//! The exchange publishes per-group limits rather than per-endpoint weights:
//! - **QUOTATION**: market data, counted per source IP
//! - **EXCHANGE_DEFAULT**: authenticated reads, counted per account
//! - **EXCHANGE_ORDER**: order placement and single cancels, per account
//! - **EXCHANGE_CANCEL_ALL**: bulk cancel, per account
//! - **SOCKET**: WebSocket connects and subscriptions, per source IP
//!
//! These are the defaults of [`LimiterConfig`](crate::config::LimiterConfig);
//! a configuration file replaces them wholesale.

use crate::category::Category;
use crate::category::MeasurementUnit;
use crate::config::CategoryConfig;
use crate::config::WindowConfig;
use crate::resolver::ResolverRule;

/// Category for endpoints no rule matches
pub const DEFAULT_CATEGORY: Category = Category::ExchangeDefault;

fn windows(limits: &[(u32, f64)]) -> Vec<WindowConfig> {
    limits.iter().map(|&(max_requests, window_seconds)| WindowConfig { max_requests, window_seconds }).collect()
}

/// Quotas per category, primary (shortest) window first
pub fn category_configs() -> Vec<CategoryConfig> {
    vec![
        // 10 per second, 600 per minute
        CategoryConfig { category: Category::Quotation, unit: MeasurementUnit::Ip, windows: windows(&[(10, 1.0), (600, 60.0)]) },
        // 30 per second, 900 per minute
        CategoryConfig { category: Category::ExchangeDefault, unit: MeasurementUnit::Account, windows: windows(&[(30, 1.0), (900, 60.0)]) },
        // 8 per second, 200 per minute
        CategoryConfig { category: Category::ExchangeOrder, unit: MeasurementUnit::Account, windows: windows(&[(8, 1.0), (200, 60.0)]) },
        // 1 per 2 seconds
        CategoryConfig { category: Category::ExchangeCancelAll, unit: MeasurementUnit::Account, windows: windows(&[(1, 2.0)]) },
        // 5 per second, 100 per minute
        CategoryConfig { category: Category::Socket, unit: MeasurementUnit::Ip, windows: windows(&[(5, 1.0), (100, 60.0)]) },
    ]
}

/// Endpoint map; method-bound rules take priority over path-only rules
pub fn resolver_rules() -> Vec<ResolverRule> {
    vec![
        ResolverRule::with_method("/v1/orders/open", "DELETE", Category::ExchangeCancelAll),
        ResolverRule::with_method("/v1/orders", "POST", Category::ExchangeOrder),
        ResolverRule::with_method("/v1/order", "DELETE", Category::ExchangeOrder),
        ResolverRule::new("/v1/market", Category::Quotation),
        ResolverRule::new("/v1/candles", Category::Quotation),
        ResolverRule::new("/v1/trades", Category::Quotation),
        ResolverRule::new("/v1/ticker", Category::Quotation),
        ResolverRule::new("/v1/orderbook", Category::Quotation),
        ResolverRule::new("/websocket", Category::Socket),
        ResolverRule::new("/v1", Category::ExchangeDefault),
    ]
}
