use crate::Result;

/// Initialize logging/tracing for the bot.
///
/// Call once from the binary. Default: info for our crates, warn for noisy
/// dependencies; override with `RUST_LOG`.
pub fn init(service_name: &str) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "info,hyper=warn,reqwest=warn,mmb=info,mmb_core=info,{service_name}=info"
        ))
    });

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .init();

    Ok(())
}
