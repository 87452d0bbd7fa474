/// Default location of the limiter configuration
pub const DEFAULT_CONFIG_PATH: &str = "config/limits.toml";
pub const DEFAULT_ENDPOINT: &str = "/v1/market/all";
pub const DEFAULT_METHOD: &str = "GET";
pub const DEFAULT_BURST_SIZE: usize = 20;

/// Arguments of the `ex_burst` binary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BurstArgs {
    pub config_path: String,
    pub endpoint: String,
    pub method: String,
    pub burst_size: usize,
}

/// Parses `[config-path] [endpoint-path] [method] [burst-size]`, each falling back to its default
///
/// `args` excludes the program name. The method is upper-cased; an unparsable
/// burst size keeps the default.
pub fn parse_burst_args<I>(args: I) -> BurstArgs
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();

    let config_path = args.next().unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let endpoint = args.next().unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
    let method = args.next().map_or_else(|| DEFAULT_METHOD.to_string(), |m| m.to_uppercase());
    let burst_size = match args.next() {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid burst size {raw:?}, using {DEFAULT_BURST_SIZE}");
            DEFAULT_BURST_SIZE
        }),
        None => DEFAULT_BURST_SIZE,
    };

    BurstArgs { config_path, endpoint, method, burst_size }
}

/// Parses the process arguments
pub fn burst_args() -> BurstArgs {
    parse_burst_args(std::env::args().skip(1))
}
