use color_eyre::Section;
use color_eyre::eyre::{Result, WrapErr};
use homework_bot::config::Config;
use homework_bot::poller::HomeworkPoller;
use tracing::info;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;

    // A missing .env is fine, the variables may come from the real environment.
    dotenv::dotenv().ok();
    let config = Config::load()
        .wrap_err("Failed to read configuration from the environment")
        .with_suggestion(|| "Check RETRY_PERIOD, REQUEST_TIMEOUT and the boolean flags")?;

    let _guard = homework_bot::logging::init(&config.log_dir)?;

    let poller = HomeworkPoller::from_config(&config, chrono::Utc::now().timestamp())?;

    info!("📊 Config loaded:");
    info!("  - Endpoint: {}", config.practicum_endpoint);
    info!("  - Retry period: {}s", config.retry_period);
    info!("  - Request timeout: {}s", config.request_timeout);
    info!("  - Notify unchanged: {}", config.notify_unchanged);
    info!("  - Advance timestamp: {}", config.advance_timestamp);
    info!("  - Report failures: {}", config.report_failures);

    poller.run().await;

    Ok(())
}
