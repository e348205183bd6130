use std::{net::SocketAddr, sync::Arc, time::Duration};

use plexcast::{
    backend::{MediaBackend, OrphanTracker, PlexBackend},
    common::{
        banner::{BannerInfo, print_banner},
        logger,
        types::AnyResult,
    },
    configs::Config,
    playback::{Collaborators, ManagerSettings, ResumeStore, SessionManager},
    resolver::YtDlpResolver,
    server::AppState,
    stream::RelayTransport,
    transcode::FfmpegSupervisor,
    transport,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

#[tokio::main]
async fn main() -> AnyResult<()> {
    let config = Config::load()?;
    logger::init(&config.logging);
    print_banner(&BannerInfo::default(), &config);

    let resume = Arc::new(ResumeStore::from_days(
        &config.storage.resume_path,
        config.storage.resume_ttl_days,
        config.storage.min_resume_ms,
    ));
    info!("Loaded {} resume point(s)", resume.len());

    let backend: Arc<dyn MediaBackend> = Arc::new(PlexBackend::new(&config.plex)?);
    let orphans = Arc::new(OrphanTracker::open(&config.storage.orphan_path));
    orphans.recover(backend.as_ref()).await;

    let manager = SessionManager::new(
        Collaborators {
            backend,
            resolver: Arc::new(YtDlpResolver::new(&config.resolver)),
            transcoder: Arc::new(FfmpegSupervisor::new(&config.transcoder)),
            transport: Arc::new(RelayTransport::new(&config.relay)),
        },
        resume,
        orphans,
        ManagerSettings {
            stream: config.stream.clone(),
            kill_grace: Duration::from_millis(config.transcoder.kill_grace_ms),
        },
    );

    let address: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let state = Arc::new(AppState::new(manager.clone(), config));

    let app = transport::http_server::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(address).await?;
    info!("Plexcast listening on {}", address);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
    }

    info!("Stopping {} active session(s)", manager.active_count());
    manager.stop_all().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
