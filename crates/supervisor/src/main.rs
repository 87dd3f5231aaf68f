use std::sync::Arc;
use supervisor::config::Settings;
use supervisor::http::{self, AppState};
use supervisor::pool::VmPool;
use supervisor::registrar::CaddyRegistrar;
use supervisor::store::FilesystemProgramStore;
use supervisor::vm::VmHandle;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let settings = Arc::new(Settings::load()?);
    tracing::info!(bind_address = %settings.bind_address, "starting supervisor");

    let pool_settings = settings.clone();
    let pool = Arc::new(VmPool::new(
        settings.start_id_index,
        move |id, vm_hash, enable_networking| {
            VmHandle::new(id, vm_hash, enable_networking, pool_settings.clone())
        },
    ));

    let registrar = Arc::new(CaddyRegistrar::new(
        settings.proxy_admin_url.clone(),
        settings.proxy_domain.clone(),
    ));
    let programs = Arc::new(FilesystemProgramStore::new(
        settings.program_store_dir.clone(),
    ));

    let reuse_timeout = std::time::Duration::from_secs(settings.reuse_timeout_secs);
    let state: Arc<AppState<VmHandle>> = Arc::new(AppState {
        pool,
        registrar,
        programs,
        reuse_timeout,
    });
    let app = http::router(state);

    let listener = tokio::net::TcpListener::bind(settings.bind_address).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
