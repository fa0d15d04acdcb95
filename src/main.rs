use toolplug::{build_app, config::Config, demo, logging, AppState};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let config = Config::from_env()?;
    let server = demo::demo_server(&config)?;

    let bind_socket = config.bind_socket()?;
    let versions = server.version_ids();
    let state = AppState::new(server);
    let app = build_app(state);
    let listener = tokio::net::TcpListener::bind(bind_socket).await?;

    info!(
        bind_addr = %config.bind_addr,
        bind_port = config.bind_port,
        plug_id = %config.plug_id,
        versions = ?versions,
        "server starting"
    );

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
