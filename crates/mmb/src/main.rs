use std::sync::Arc;

use mmb_core::{
    config::Config,
    store::{Database, Pool, UserDirectory},
};
use mmb_nim::{NimClient, NimConfig};

#[tokio::main]
async fn main() -> Result<(), mmb_core::Error> {
    mmb_core::logging::init("mmb")?;

    let cfg = Arc::new(Config::load()?);

    let pool = Pool::open(&cfg.db_path, cfg.db_pool_size)?;
    let db = Database::new(pool)?;
    let users = Arc::new(UserDirectory::new(db, cfg.plan_limits()));
    tracing::info!(path = %cfg.db_path.display(), pool_size = cfg.db_pool_size, "storage ready");

    let nim = Arc::new(NimClient::new(NimConfig {
        base_url: cfg.nim_base_url.clone(),
        api_keys: cfg.nim_api_keys.clone(),
        timeout: cfg.request_timeout,
        max_completion_tokens: cfg.max_completion_tokens,
    })?);

    mmb_telegram::router::run_polling(cfg, users, nim)
        .await
        .map_err(|e| mmb_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
