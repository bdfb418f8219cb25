use anyhow::Result;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("faceclockd starting");

    let config = config::Config::from_env();
    let engine = engine::spawn_engine(&config)?;

    let _conn = zbus::connection::Builder::session()?
        .name("org.freedesktop.Faceclock1")?
        .serve_at(
            "/org/freedesktop/Faceclock1",
            dbus_interface::KioskService { engine },
        )?
        .build()
        .await?;

    tracing::info!("faceclockd ready");

    // Keep running until signaled
    tokio::signal::ctrl_c().await?;
    tracing::info!("faceclockd shutting down");

    Ok(())
}
