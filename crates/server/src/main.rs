use light_idp::api::start_webserver;
use light_idp::config::load_config_or_panic;
use light_idp::directory::{MemoryDirectory, UserDirectory, sync::spawn_directory_sync};
use light_idp::oidc::codes::spawn_purge_task;
use light_idp::{build_state, load_signing_keys};
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn initialize_standard_tracing() {
    let default_directives = "light_idp=info,tower_http=info";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    let registry = tracing_subscriber::registry().with(env_filter);
    let layer = fmt::layer().with_target(true).with_level(true);

    registry.with(layer).init();
}

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;

    // -------- Tracing Initialization --------
    initialize_standard_tracing();

    // Load config
    let config = load_config_or_panic();

    let keys = load_signing_keys(&config)?;
    let directory: Arc<dyn UserDirectory> = Arc::new(MemoryDirectory::new());
    let state = build_state(&config, keys, directory.clone())?;

    // Expired codes are also rejected at redemption; this only bounds memory
    spawn_purge_task(state.codes.clone());

    match config.ldap.clone() {
        Some(ldap) => {
            tracing::info!(
                url = %ldap.url,
                interval_secs = ?ldap.sync_interval_secs,
                "LDAP directory sync enabled"
            );
            spawn_directory_sync(ldap, directory);
        }
        None => tracing::info!("No LDAP source configured, users appear on first token issuance"),
    }

    start_webserver(state, &config).await?;
    Ok(())
}
