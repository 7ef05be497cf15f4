use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use axum_prometheus::PrometheusMetricLayer;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use tracing::info;

use upkeep::config::AppConfig;
use upkeep::error::AppError;
use upkeep::telemetry;
use upkeep::workflows::maintenance::{
    maintenance_router, AssignmentPolicy, MaintenanceService, MaintenanceServiceError,
    MemoryNotifications, MemoryProperties, MemoryRequests, MemoryWorkers, Property, PropertyId,
    PropertyRepository, RequestIntake, RequestStatusView, Role, Specialization, StaticDirectory,
    TenantId, Worker, WorkerId, WorkerRepository,
};

type AppService = MaintenanceService<
    MemoryProperties,
    MemoryWorkers,
    MemoryRequests,
    StaticDirectory,
    MemoryNotifications,
>;

#[derive(Clone)]
struct AppState {
    readiness: Arc<AtomicBool>,
    metrics: PrometheusHandle,
}

#[derive(Parser, Debug)]
#[command(
    name = "Upkeep Maintenance Desk",
    about = "Run the maintenance request service or walk a dispatch scenario from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Walk a request through intake, assignment, and completion
    Demo,
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run_cli().await {
        eprintln!("application error: {err}");
        std::process::exit(1);
    }
}

async fn run_cli() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => run_server(args).await,
        Command::Demo => run_demo(),
    }
}

/// Seed the in-memory store with a small portfolio so the service and the
/// demo have something to dispatch against.
fn build_service(policy: AssignmentPolicy) -> (Arc<AppService>, Arc<MemoryWorkers>) {
    let properties = Arc::new(MemoryProperties::default());
    let workers = Arc::new(MemoryWorkers::default());
    let requests = Arc::new(MemoryRequests::default());
    let directory = Arc::new(StaticDirectory::default());
    let notifications = Arc::new(MemoryNotifications::default());

    let property_id = PropertyId("prop-001".to_string());
    let mut property = Property::new(
        property_id.clone(),
        "MAPLE",
        "14 Maple Court",
        "Des Moines",
    );
    property.register_tenant(TenantId("t-ana".to_string()), "ana@example.com");
    property.register_tenant(TenantId("t-ben".to_string()), "ben@example.com");
    let _ = properties.add(property);

    let _ = workers.add(Worker::register(
        WorkerId("w-plumb".to_string()),
        "plumber@example.com",
        Specialization::Plumbing,
    ));
    let _ = workers.add(Worker::register(
        WorkerId("w-volt".to_string()),
        "electrician@example.com",
        Specialization::Electrical,
    ));
    let _ = workers.add(Worker::register(
        WorkerId("w-handy".to_string()),
        "handy@example.com",
        Specialization::General,
    ));

    directory.grant_property_role("t-ana", property_id.clone(), Role::Tenant);
    directory.grant_property_role("t-ben", property_id.clone(), Role::Tenant);
    directory.grant_property_role("mgr-dana", property_id, Role::Manager);
    directory.grant_global_role("mgr-dana", Role::Manager);
    directory.grant_global_role("w-plumb", Role::Worker);
    directory.grant_global_role("w-volt", Role::Worker);
    directory.grant_global_role("w-handy", Role::Worker);
    directory.grant_global_role("system", Role::System);

    let service = Arc::new(MaintenanceService::new(
        properties,
        workers.clone(),
        requests,
        directory,
        notifications,
        policy,
    ));
    (service, workers)
}

async fn run_server(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (service, _workers) = build_service(config.assignment);

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let state = AppState {
        readiness: readiness_flag.clone(),
        metrics: prometheus_handle,
    };

    let app = Router::new()
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .with_state(state)
        .merge(maintenance_router(service))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "maintenance desk ready");

    axum::serve(listener, app).await?;
    Ok(())
}

async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn readiness_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

fn print_step(view: &RequestStatusView) {
    println!(
        "  -> request {} | status {} | trade {} | worker {}",
        view.request_id,
        view.status,
        view.required_specialization,
        view.assigned_worker
            .as_ref()
            .map(|worker| worker.0.as_str())
            .unwrap_or("-"),
    );
}

fn print_rejection(label: &str, error: MaintenanceServiceError) {
    println!("  !! {label}: {error}");
}

fn run_demo() -> Result<(), AppError> {
    let (service, workers) = build_service(AssignmentPolicy::default());
    let property = PropertyId("prop-001".to_string());
    let now = Utc::now();

    println!("Maintenance dispatch demo");
    println!("\n[1] Ana reports a leaking kitchen tap");
    let request = service.submit_request(
        "t-ana",
        &property,
        RequestIntake {
            tenant_id: TenantId("t-ana".to_string()),
            description: "The kitchen tap is leaking under the sink".to_string(),
            category_hint: None,
            urgency: Some("urgent".to_string()),
        },
        now,
    )?;
    print_step(&request.status_view());

    println!("\n[2] Assignment before review is refused");
    match service.assign_worker("mgr-dana", &request.id, &WorkerId("w-plumb".to_string()), now) {
        Ok(_) => println!("  unexpected: assignment succeeded"),
        Err(error) => print_rejection("refused", error),
    }

    println!("\n[3] Dana moves the request into review");
    print_step(&service.start_review("mgr-dana", &request.id, now)?);

    println!("\n[4] The electrician cannot take a plumbing job");
    match service.assign_worker("mgr-dana", &request.id, &WorkerId("w-volt".to_string()), now) {
        Ok(_) => println!("  unexpected: assignment succeeded"),
        Err(error) => print_rejection("refused", error),
    }

    println!("\n[5] The plumber is assigned and does the work");
    print_step(&service.assign_worker(
        "mgr-dana",
        &request.id,
        &WorkerId("w-plumb".to_string()),
        now,
    )?);
    print_step(&service.start_work("w-plumb", &request.id, now)?);
    print_step(&service.complete("w-plumb", &request.id, now)?);

    println!("\n[6] Completed requests are immutable");
    match service.start_review("mgr-dana", &request.id, now) {
        Ok(_) => println!("  unexpected: transition succeeded"),
        Err(error) => print_rejection("refused", error),
    }

    println!("\n[7] No carpenter on staff: the general worker covers the door repair");
    let door = service.submit_request(
        "t-ben",
        &property,
        RequestIntake {
            tenant_id: TenantId("t-ben".to_string()),
            description: "Bedroom door is hanging off its hinges".to_string(),
            category_hint: None,
            urgency: None,
        },
        now,
    )?;
    print_step(&door.status_view());
    service.start_review("mgr-dana", &door.id, now)?;
    print_step(&service.assign_best_worker("mgr-dana", &door.id, now)?);

    println!("\n[8] Declining an assigned request releases its worker");
    let light = service.submit_request(
        "t-ana",
        &property,
        RequestIntake {
            tenant_id: TenantId("t-ana".to_string()),
            description: "Hallway light fixture keeps flickering".to_string(),
            category_hint: None,
            urgency: None,
        },
        now,
    )?;
    service.start_review("mgr-dana", &light.id, now)?;
    service.assign_worker("mgr-dana", &light.id, &WorkerId("w-volt".to_string()), now)?;
    print_step(&service.decline("mgr-dana", &light.id, now)?);
    if let Ok(Some(electrician)) = workers.get(&WorkerId("w-volt".to_string())) {
        println!(
            "  electrician load after decline: {} active, available: {}",
            electrician.active_assignments(),
            electrician.is_available(),
        );
    }

    Ok(())
}
