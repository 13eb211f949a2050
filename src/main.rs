/// Civic Reporter - citizen incident reporting backend
use civic_reporter::{config::ServerConfig, context::AppContext, error::ApiResult, metrics, server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> ApiResult<()> {
    // Load configuration first so the log format can follow it
    let config = ServerConfig::from_env()?;

    init_tracing(&config.logging.format);

    print_banner(&config.service.version);

    // Uptime and API usage are measured from here
    lazy_static::initialize(&metrics::STARTED_AT);

    let ctx = AppContext::new(config).await?;

    // Missing placeholders only degrade the image fallback
    ctx.image_store.check_default_images().await?;

    server::serve(ctx).await?;

    Ok(())
}

fn init_tracing(format: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "civic_reporter=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(filter);
    if format.eq_ignore_ascii_case("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn print_banner(version: &str) {
    println!(
        r#"
   _____ _       _        ____                       __
  / ___/(_)   __(_)____  / __ \___  ____  ____  ____/ /____  _____
 / /   / / | / / / ___/ / /_/ / _ \/ __ \/ __ \/ __/ __/ _ \/ ___/
/ /___/ /| |/ / / /__  / _, _/  __/ /_/ / /_/ / / / /_/  __/ /
\____/_/ |___/_/\___/ /_/ |_|\___/ .___/\____/_/  \__/\___/_/
                                /_/
        Incident Reporting API v{}
        "#,
        version
    );
}
