use std::sync::Arc;
use std::time::Instant;

use ex_app::cli;
use ex_app::config_loader;
use ex_app::shutdown_handler;
use ex_ratelimit::RateLimitError;
use ex_ratelimit::RateLimiterCoordinator;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing::warn;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Keep guard alive for the whole run so the file writer flushes
    let _guard = ex_app::tracing_setup::init("ex_burst", Some("./logs"), tracing::Level::INFO);

    let args = cli::burst_args();
    info!("Burst of {} x {} {} using {}", args.burst_size, args.method, args.endpoint, args.config_path);

    let config = config_loader::load_limiter_config_or_default(&args.config_path);
    let coordinator = Arc::new(RateLimiterCoordinator::new(config)?);

    let token = CancellationToken::new();
    shutdown_handler::setup(token.clone())?;

    let category = coordinator.resolve(&args.endpoint, &args.method);
    info!("{} {} resolves to {category}", args.method, args.endpoint);

    let start = Instant::now();
    let mut handles = Vec::with_capacity(args.burst_size);
    for id in 0..args.burst_size {
        let coordinator = Arc::clone(&coordinator);
        let token = token.clone();
        let endpoint = args.endpoint.clone();
        let method = args.method.clone();
        handles.push(tokio::spawn(async move {
            let result = coordinator.acquire_endpoint(&endpoint, &method, &token).await;
            (id, result, start.elapsed())
        }));
    }

    let (mut admitted, mut exceeded, mut cancelled) = (0usize, 0usize, 0usize);
    for handle in handles {
        let (id, result, elapsed) = handle.await?;
        match result {
            Ok(category) => {
                admitted += 1;
                info!("request {id:>3} admitted for {category} at +{:.3}s", elapsed.as_secs_f64());
            }
            Err(RateLimitError::Cancelled { .. }) => cancelled += 1,
            Err(err) => {
                exceeded += 1;
                warn!("request {id:>3} gave up at +{:.3}s: {err}", elapsed.as_secs_f64());
            }
        }
    }

    info!("Done in {:.3}s: {admitted} admitted, {exceeded} exceeded, {cancelled} cancelled", start.elapsed().as_secs_f64());
    println!("{}", serde_json::to_string_pretty(&coordinator.status())?);

    Ok(())
}
