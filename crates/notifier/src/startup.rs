use crate::{
    api::routes::{add_watch, delete_identifier, get_balance, get_balances, get_watches, health},
    config::Settings,
    domain::{ScanSettings, SnapshotStore, WatchContext, WatchRegistry},
    infra::{
        db::{DBConnection, DatabasePoolConfig},
        explorer::{BalanceSource, ExplorerClient},
        file_utils::create_folder,
        webhook::{DiscordWebhook, Notify},
    },
};

// Mock explorer only available with e2e-testing feature or debug builds
#[cfg(any(feature = "e2e-testing", debug_assertions))]
use crate::infra::explorer_mock::MockExplorer;
use anyhow::anyhow;
use axum::{
    body::Body,
    extract::{connect_info::IntoMakeServiceWithConnectInfo, ConnectInfo, Request},
    http::{Extensions, HeaderValue},
    middleware::{self, AddExtension, Next},
    response::IntoResponse,
    routing::{delete, get, post},
    serve::Serve,
    Router,
};
use hyper::{
    header::{ACCEPT, CONTENT_TYPE},
    Method,
};
use log::{error, info, warn};
use reqwest_middleware::{
    reqwest::{self, Client, Url},
    ClientBuilder, ClientWithMiddleware, Middleware,
};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use std::{net::SocketAddr, str::FromStr};
use std::{sync::Arc, time::Duration};
use tokio::signal::unix::{signal, SignalKind};
use tokio::{net::TcpListener, select};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tower_http::cors::{AllowOrigin, CorsLayer};

pub struct Application {
    server: Serve<
        TcpListener,
        IntoMakeServiceWithConnectInfo<Router, SocketAddr>,
        AddExtension<Router, ConnectInfo<SocketAddr>>,
    >,
    cancellation_token: CancellationToken,
    background_tasks: TaskTracker,
}

impl Application {
    pub async fn build(config: Settings) -> Result<Self, anyhow::Error> {
        let address = format!(
            "{}:{}",
            config.api_settings.domain, config.api_settings.port
        );
        let listener = SocketAddr::from_str(&address)?;
        let (app_state, background_tasks, cancellation_token) = build_app(config.clone()).await?;
        let server = build_server(listener, app_state, config.api_settings.origins).await?;
        Ok(Self {
            server,
            cancellation_token,
            background_tasks,
        })
    }

    pub async fn run_until_stopped(self) -> Result<(), anyhow::Error> {
        info!("Starting server...");
        match self.server.with_graceful_shutdown(shutdown_signal()).await {
            Ok(_) => {
                info!("Server shutdown initiated");
                self.cancellation_token.cancel();

                let timeout = tokio::time::sleep(Duration::from_secs(10));
                select! {
                    _ = self.background_tasks.wait() => {
                        info!("Watchers stopped gracefully");
                    }
                    _ = timeout => {
                        warn!("Watchers timed out during shutdown");
                    }
                }

                info!("Shutdown complete");
                Ok(())
            }
            Err(e) => {
                error!("Server shutdown error: {}", e);
                self.cancellation_token.cancel();

                let _ =
                    tokio::time::timeout(Duration::from_secs(5), self.background_tasks.wait())
                        .await;

                Err(anyhow!("Error during server shutdown: {}", e))
            }
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<WatchRegistry>,
    pub store: SnapshotStore,
}

pub async fn build_app(
    config: Settings,
) -> Result<(AppState, TaskTracker, CancellationToken), anyhow::Error> {
    // Create explorer client (real or mock based on config)
    #[cfg(any(feature = "e2e-testing", debug_assertions))]
    let source: Arc<dyn BalanceSource> = if config.explorer_settings.mock_enabled {
        info!("Mock explorer configured");
        Arc::new(MockExplorer::new())
    } else {
        build_explorer(&config)?
    };

    #[cfg(not(any(feature = "e2e-testing", debug_assertions)))]
    let source: Arc<dyn BalanceSource> = {
        if config.explorer_settings.mock_enabled {
            return Err(anyhow!(
                "Mock explorer requires e2e-testing feature or debug build"
            ));
        }
        build_explorer(&config)?
    };

    let webhook_url = Url::parse(&config.notification_settings.discord_webhook)
        .map_err(|e| anyhow!("Failed to parse discord webhook url: {}", e))?;
    // deliveries are never retried
    let notifier: Arc<dyn Notify> =
        Arc::new(DiscordWebhook::new(build_reqwest_client(0), webhook_url));
    info!("Discord webhook configured");

    create_folder(&config.db_settings.data_folder.clone());

    let pool_config: DatabasePoolConfig = config.db_settings.clone().into();
    let snapshot_db = DBConnection::new(&config.db_settings.data_folder, "snapshots", pool_config)
        .await
        .map_err(|e| anyhow!("Error setting up snapshot db: {}", e))?;
    let store = SnapshotStore::new(snapshot_db);

    let watch_settings = &config.watch_settings;
    let context = WatchContext::new(
        store.clone(),
        source,
        notifier,
        ScanSettings::new(
            watch_settings.lookahead,
            watch_settings.page_size,
            watch_settings.max_pages,
            watch_settings.check_all_pubkey_types,
        ),
        watch_settings.currency,
        Duration::from_secs(watch_settings.sleep_interval_secs),
    );

    let tracker = TaskTracker::new();
    let cancel_token = CancellationToken::new();
    let registry = Arc::new(WatchRegistry::new(
        context,
        cancel_token.clone(),
        tracker.clone(),
    ));

    registry
        .restore()
        .await
        .map_err(|e| anyhow!("Error restoring watches: {}", e))?;
    let seeds = watch_settings
        .seeds()
        .map_err(|e| anyhow!("Invalid seed_watches: {}", e))?;
    let seeded = registry.seed(&seeds).await;
    info!("Watch registry configured, {} seed watches added", seeded);

    // Watchers started later through the api are still tracked after close
    tracker.close();

    let app_state = AppState { registry, store };
    Ok((app_state, tracker, cancel_token))
}

fn build_explorer(config: &Settings) -> Result<Arc<dyn BalanceSource>, anyhow::Error> {
    let explorer_url = Url::parse(&config.explorer_settings.base_url)
        .map_err(|e| anyhow!("Failed to parse explorer url: {}", e))?;
    let explorer = ExplorerClient::new(
        build_reqwest_client(config.explorer_settings.max_retries),
        &explorer_url,
        Duration::from_secs(config.explorer_settings.timeout_secs),
    );
    info!("Explorer client configured for {}", explorer_url);
    Ok(Arc::new(explorer))
}

pub async fn build_server(
    socket_addr: SocketAddr,
    app_state: AppState,
    origins: Vec<String>,
) -> Result<
    Serve<
        TcpListener,
        IntoMakeServiceWithConnectInfo<Router, SocketAddr>,
        AddExtension<Router, ConnectInfo<SocketAddr>>,
    >,
    anyhow::Error,
> {
    let listener = TcpListener::bind(socket_addr).await?;

    info!("Setting up service");
    let app = app(app_state, origins);
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    );
    info!(
        "Service running @: http://{}:{}",
        socket_addr.ip(),
        socket_addr.port()
    );
    Ok(server)
}

pub fn app(app_state: AppState, origins: Vec<String>) -> Router {
    let origins: Vec<HeaderValue> = origins
        .into_iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([ACCEPT, CONTENT_TYPE])
        .allow_origin(AllowOrigin::list(origins));

    let watch_endpoints = Router::new()
        .route("/watch", post(add_watch))
        .route("/watches", get(get_watches))
        .route("/balance", post(get_balance))
        .route("/balances", get(get_balances))
        .route("/identifier", delete(delete_identifier));

    Router::new()
        .route("/api/v1/health_check", get(health))
        .nest("/api/v1", watch_endpoints)
        .layer(middleware::from_fn(log_request))
        .with_state(Arc::new(app_state))
        .layer(cors)
}

async fn log_request(request: Request<Body>, next: Next) -> impl IntoResponse {
    let now = time::OffsetDateTime::now_utc();
    let path = request
        .uri()
        .path_and_query()
        .map(|p| p.as_str())
        .unwrap_or_default()
        .to_string();
    info!(target: "http_request","new request, {} {}", request.method().as_str(), path);

    let response = next.run(request).await;
    let response_time = time::OffsetDateTime::now_utc() - now;
    info!(target: "http_response", "response, code: {}, time: {}", response.status().as_str(), response_time);

    response
}

pub fn build_reqwest_client(max_retries: u32) -> ClientWithMiddleware {
    let retry_policy = ExponentialBackoff::builder().build_with_max_retries(max_retries);
    ClientBuilder::new(Client::new())
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .with(LoggingMiddleware)
        .build()
}

struct LoggingMiddleware;

#[async_trait::async_trait]
impl Middleware for LoggingMiddleware {
    async fn handle(
        &self,
        req: reqwest::Request,
        extensions: &mut Extensions,
        next: reqwest_middleware::Next<'_>,
    ) -> reqwest_middleware::Result<reqwest::Response> {
        let method = req.method().clone();
        let url = req.url().clone();

        info!("Making {} request to: {}", method, url);

        let result = next.run(req, extensions).await;

        match &result {
            Ok(response) => {
                info!("{} {} -> Status: {}", method, url, response.status());
            }
            Err(error) => {
                warn!("{} {} -> Error: {:?}", method, url, error);
            }
        }

        result
    }
}

async fn shutdown_signal() {
    let mut sigint = signal(SignalKind::interrupt()).expect("Failed to install SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");

    select! {
        _ = sigint.recv() => info!("Received SIGINT signal"),
        _ = sigterm.recv() => info!("Received SIGTERM signal"),
    }
}
