use booky::db::Database;
use booky::handler::AppState;
use booky::uploads;
use booky::{
    app,
    config::{Cli, Config, default_config_dir, default_config_path},
};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let args = Cli::parse();

    // With --config the database lives next to the config file, otherwise
    // both live in ~/.booky/
    let (config_path, data_dir) = match args.config_path {
        Some(path) => {
            let path = std::path::PathBuf::from(path);
            let dir = path
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| std::path::PathBuf::from("."));
            (path, dir)
        }
        None => (default_config_path(), default_config_dir()),
    };

    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        eprintln!("failed to create data directory {:?}: {}", data_dir, e);
        std::process::exit(1);
    }

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    tracing::info!("booky.svc starting");

    let mut cfg = Config::new(&config_path.to_string_lossy()).unwrap_or_else(|e| {
        tracing::error!(error = %e, path = ?config_path, "failed to load config file");
        std::process::exit(1);
    });
    if let Some(port) = args.port {
        cfg.app.set_port(port);
    }

    let db = Database::new(&cfg, &data_dir).await.unwrap_or_else(|e| {
        tracing::error!(error = %booky::unpack_error(e.as_ref()), "failed to setup database");
        std::process::exit(1);
    });

    if let Err(e) = std::fs::create_dir_all(&cfg.uploads.store_dir) {
        tracing::error!(error = %e, store_dir = %cfg.uploads.store_dir, "failed to create upload store");
        std::process::exit(1);
    }

    let address = format!("0.0.0.0:{}", cfg.app.get_port());
    let cancellation_token = CancellationToken::new();

    let state = AppState::new(db, cfg);
    let checksum_worker = uploads::spawn_checksum_worker(
        state.db.clone(),
        state.storage.clone(),
        &state.cfg.uploads,
        cancellation_token.clone(),
    );

    let listener = tokio::net::TcpListener::bind(&address).await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to setup tcp listener");
        std::process::exit(1);
    });

    tracing::info!("booky.svc running on {}", &address);
    tokio::select! {
        result = axum::serve(listener, app(state)) => {
            if let Err(err) = result {
                tracing::error!(error = %err, "server stopped unexpectedly");
                std::process::exit(1);
            }
        }
        _ = signal::ctrl_c() => {
            tracing::info!("ctrl+c signal received, preparing to shutdown");
        }
    }

    cancellation_token.cancel();

    if let Err(e) = checksum_worker.await {
        tracing::warn!(error = %e, "checksum worker did not stop cleanly");
    }
    tracing::info!("booky.svc going off, graceful shutdown complete");
}
