use crate::config::{FeeConfig, StoreBackend};
use crate::handlers;
use crate::middleware::{TenantContext, SCHOOL_ID_HEADER, USER_ID_HEADER};
use crate::services::{AcademicYearResolver, FeeService, FeeStore, InMemoryStore, MongoDb, Scope};
use crate::workers::{requeue_unfinished, DueSweeper, WorkerOrchestrator};
use axum::{
    http::{header, HeaderName, Method},
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    metrics_middleware, request_id_middleware, security_headers_middleware, REQUEST_ID_HEADER,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

#[derive(Clone)]
pub struct AppState {
    pub fees: FeeService,
    pub academic_years: AcademicYearResolver,
    pub store: Arc<dyn FeeStore>,
}

impl AppState {
    /// Resolves the school's active academic year for a tenant request.
    pub async fn scope(&self, tenant: &TenantContext) -> Result<Scope, AppError> {
        let year = self.academic_years.resolve(&tenant.school_id).await?;
        Ok(Scope::new(
            tenant.school_id.clone(),
            tenant.user_id.clone(),
            year,
        ))
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics))
        .route(
            "/fee-types",
            post(handlers::fee_types::create_fee_type).get(handlers::fee_types::list_fee_types),
        )
        .route(
            "/fee-schedules",
            post(handlers::schedules::create_fee_schedule)
                .get(handlers::schedules::list_fee_schedules),
        )
        .route(
            "/fee-schedules/:id",
            get(handlers::schedules::get_fee_schedule)
                .patch(handlers::schedules::update_fee_schedule),
        )
        .route(
            "/fee-structures",
            post(handlers::structures::create_fee_structure)
                .get(handlers::structures::list_fee_structures),
        )
        .route(
            "/fee-structures/:id",
            get(handlers::structures::get_fee_structure)
                .patch(handlers::structures::update_fee_structure),
        )
        .route(
            "/fee-structures/:id/materialize",
            post(handlers::structures::retry_materialization),
        )
        .route(
            "/fee-structures/:id/audit",
            post(handlers::structures::audit_structure),
        )
        .route(
            "/discounts",
            post(handlers::discounts::create_discount_category)
                .get(handlers::discounts::list_discount_categories),
        )
        .route(
            "/discounts/:id",
            get(handlers::discounts::get_discount_category)
                .put(handlers::discounts::update_discount),
        )
        .route(
            "/discounts/:id/apply",
            post(handlers::discounts::apply_discount),
        )
        .route(
            "/discounts/:id/approve",
            post(handlers::discounts::approve_discount),
        )
        .route(
            "/installments",
            get(handlers::installments::list_installments),
        )
        .route(
            "/installments/sweep",
            post(handlers::installments::sweep_due_installments),
        )
        .route(
            "/installments/:id",
            get(handlers::installments::get_installment)
                .patch(handlers::installments::update_installment_amount),
        )
        .route("/payments", post(handlers::payments::record_payment))
        .route("/receipts", get(handlers::payments::list_receipts))
        .route("/receipts/:id", get(handlers::payments::get_receipt))
        .route(
            "/receipts/:id/cancel",
            post(handlers::payments::cancel_receipt),
        )
        .route("/donors", post(handlers::payments::create_donor))
        .route("/donors/:id", get(handlers::payments::get_donor))
        .route("/reports/dues", get(handlers::reports::dues_report))
        .route(
            "/reports/collections",
            get(handlers::reports::collection_summary),
        )
        .with_state(state)
        .layer(from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(
            CorsLayer::new()
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::PATCH,
                    Method::OPTIONS,
                ])
                .allow_headers([
                    header::CONTENT_TYPE,
                    HeaderName::from_static(SCHOOL_ID_HEADER),
                    HeaderName::from_static(USER_ID_HEADER),
                    HeaderName::from_static(REQUEST_ID_HEADER),
                ]),
        )
}

async fn connect_store(config: &FeeConfig) -> Result<Arc<dyn FeeStore>, AppError> {
    match config.store.backend {
        StoreBackend::Mongo => {
            let uri = config.store.mongodb_uri.as_deref().ok_or_else(|| {
                AppError::ConfigError(anyhow::anyhow!("MONGODB_URI is required for the mongo backend"))
            })?;
            let db = MongoDb::connect(uri, &config.store.mongodb_database)
                .await
                .map_err(|e| {
                    tracing::error!("Failed to connect to MongoDB: {}", e);
                    e
                })?;
            db.initialize_indexes().await.map_err(|e| {
                tracing::error!("Failed to initialize database indexes: {}", e);
                e
            })?;
            Ok(Arc::new(db))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; data is lost on restart");
            Ok(Arc::new(InMemoryStore::new()))
        }
    }
}

pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
    state: AppState,
    shutdown_tokens: Vec<CancellationToken>,
}

impl Application {
    pub async fn build(config: FeeConfig) -> Result<Self, AppError> {
        let store = connect_store(&config).await?;

        let (orchestrator, queue) = WorkerOrchestrator::new(config.worker.clone(), store.clone());
        let mut shutdown_tokens = vec![orchestrator.shutdown_token()];
        orchestrator.start();

        let requeued = requeue_unfinished(store.as_ref(), &queue).await?;
        tracing::info!(requeued, "Materialization recovery finished");

        let fees = FeeService::new(store.clone(), queue);
        let academic_years = AcademicYearResolver::new(
            store.clone(),
            Duration::from_secs(config.academic_year_cache_ttl_secs),
        );

        let sweeper = DueSweeper::new(fees.clone(), config.sweeper.clone());
        shutdown_tokens.push(sweeper.shutdown_token());
        sweeper.start();

        let state = AppState {
            fees,
            academic_years,
            store,
        };
        let router = build_router(state.clone());

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        Ok(Self {
            port,
            listener,
            router,
            state,
            shutdown_tokens,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Serves until `shutdown` resolves, then stops the background workers.
    pub async fn run_until_stopped<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        tracing::info!(port = self.port, "Listening");
        let result = axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await;

        for token in &self.shutdown_tokens {
            token.cancel();
        }
        result
    }
}
