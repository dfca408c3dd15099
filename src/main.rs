use domain::notification::{NotificationInjector, NotificationRules};
use domain::stopwatch::{LogTimingSink, Stopwatch};
use log::{error, info, warn};
use service::config::{Config, RustEnv};
use service::logging::Logger;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use web::AppState;

#[tokio::main]
async fn main() {
    let config = Config::new();
    Logger::init_logger(&config as &Config);

    if config.notification_target_element_id.trim().is_empty() {
        error!("notification_target_element_id must not be empty");
        std::process::exit(1);
    }
    if config.notification_period_start > config.notification_period_end {
        warn!(
            "Notification period starts after it ends ({} > {}); it will never be shown",
            config.notification_period_start, config.notification_period_end
        );
    }

    let injector = Arc::new(NotificationInjector::new(NotificationRules::from_config(
        &config,
    )));
    // Timing spans are a development aid; outside development nothing is
    // measured or reported.
    let stopwatch = match config.runtime_env() {
        RustEnv::Development => Stopwatch::new(Arc::new(LogTimingSink)),
        RustEnv::Production | RustEnv::Staging => Stopwatch::disabled(),
    };

    let app_state = AppState::new(injector, stopwatch);
    let router = web::router::define_routes(app_state, &config);

    let interface = config.interface.as_deref().unwrap_or("127.0.0.1");
    let address = format!("{}:{}", interface, config.port);
    let listener = match TcpListener::bind(&address).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {address}: {e}");
            std::process::exit(1);
        }
    };

    info!(
        "Server starting on http://{address} [{}]",
        config.runtime_env()
    );

    // Peer addresses feed the client IP rule, so the router is served with
    // connection info attached to every request.
    let server = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal());

    if let Err(e) = server.await {
        error!("Server error: {e}");
        std::process::exit(1);
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C signal handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
