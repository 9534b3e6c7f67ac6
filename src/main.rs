use clap::Parser;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use licensor::config::Config;
use licensor::db::{AppState, create_pool, init_db, queries};
use licensor::events::{EventSink, spawn_event_writer};
use licensor::handlers;
use licensor::licensing;
use licensor::models::{ActivationLimits, CreateApiKey, CreateBrand, CreateLicense, LicenseType};

#[derive(Parser, Debug)]
#[command(name = "licensor")]
#[command(about = "Multi-brand license entitlement and activation server")]
struct Cli {
    /// Seed the database with dev data (brand, API key, license)
    #[arg(long)]
    seed: bool,

    /// Run one expiry sweep pass and exit
    #[arg(long)]
    sweep_expired: bool,

    /// Physically purge soft-deleted rows older than the retention window
    /// and exit
    #[arg(long)]
    purge_deleted: bool,

    /// Retention window in days (for --purge-deleted)
    #[arg(long, requires = "purge_deleted", default_value_t = 30)]
    retention_days: i64,

    /// Generate an API key for a brand and exit. Requires --brand.
    #[arg(long)]
    generate_api_key: bool,

    /// Brand slug (for --generate-api-key)
    #[arg(long, requires = "generate_api_key")]
    brand: Option<String>,

    /// Key name (for --generate-api-key)
    #[arg(long, requires = "generate_api_key", default_value = "cli")]
    key_name: Option<String>,
}

/// One-shot expiry sweep for cron-style scheduling. Domain events are
/// flushed inline before exit.
fn run_sweep_once(state: &AppState) -> Result<(), String> {
    let conn = state.db.get().map_err(|e| e.to_string())?;
    let (sink, mut rx) = EventSink::channel();

    let (licenses, keys) =
        licensing::sweep_expired(&conn, &sink).map_err(|e| e.to_string())?;
    drop(sink);

    while let Ok(event) = rx.try_recv() {
        if let Err(e) = queries::insert_license_event(&conn, &event) {
            tracing::warn!("Failed to write sweep event: {}", e);
        }
    }

    println!("Expired {} license(s), {} license key(s)", licenses, keys);
    Ok(())
}

fn run_generate_api_key(state: &AppState, slug: &str, name: &str) -> Result<(), String> {
    let conn = state.db.get().map_err(|e| e.to_string())?;
    let brand = queries::get_brand_by_slug(&conn, slug)
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("Brand not found: {}", slug))?;

    let input = CreateApiKey {
        name: name.to_string(),
        permissions: None,
        expires_in_days: None,
    };
    let (key, plaintext) = queries::create_api_key(&conn, &brand.id, &input)
        .map_err(|e| e.to_string())?;

    println!("Brand:   {} ({})", brand.name, brand.id);
    println!("Key id:  {}", key.id);
    println!("API key: {}", plaintext);
    println!();
    println!("Store this key now - it cannot be retrieved again.");
    Ok(())
}

/// Dev-mode fixtures: a brand, a full-access API key, and one license.
fn seed_dev_data(state: &AppState) {
    let conn = state.db.get().expect("Failed to get db connection for seed");

    if let Ok(Some(_)) = queries::get_brand_by_slug(&conn, "acme") {
        tracing::info!("Seed brand already exists, skipping seed");
        return;
    }

    let brand = queries::create_brand(
        &conn,
        &CreateBrand {
            name: "Acme Software".to_string(),
            slug: "acme".to_string(),
            description: Some("Seeded dev brand".to_string()),
            contact_email: Some("dev@acme.test".to_string()),
            website: None,
        },
    )
    .expect("Failed to seed brand");

    let (_, api_key) = queries::create_api_key(
        &conn,
        &brand.id,
        &CreateApiKey {
            name: "dev".to_string(),
            permissions: None,
            expires_in_days: None,
        },
    )
    .expect("Failed to seed API key");

    drop(conn);
    let mut conn = state.db.get().expect("Failed to get db connection for seed");
    let limits = serde_json::from_value::<ActivationLimits>(serde_json::json!({
        "site_url": 3,
        "machine_id": 1,
    }))
    .expect("seed limits are valid");

    let provisioned = licensing::provision_license(
        &mut conn,
        &state.master_key,
        &state.events,
        &brand.id,
        &CreateLicense {
            customer_email: "customer@example.com".to_string(),
            customer_name: "Example Customer".to_string(),
            product_name: "Widget Pro".to_string(),
            product_slug: "widget-pro".to_string(),
            product_sku: None,
            license_type: LicenseType::Subscription,
            max_activations_per_instance: limits,
            expires_at: Some(chrono::Utc::now().timestamp() + 365 * 86400),
            metadata: None,
        },
    )
    .expect("Failed to seed license");

    tracing::info!("Seeded dev data:");
    tracing::info!("  brand:       acme ({})", brand.id);
    tracing::info!("  api key:     {}", api_key);
    tracing::info!(
        "  license key: {}",
        provisioned.license_key.as_deref().unwrap_or("(reused)")
    );
    tracing::info!("  license:     {}", provisioned.license.id);
}

/// Periodic expiry sweep. The engine never expires anything itself; this
/// task is the scheduled collaborator that does.
fn spawn_expiry_sweep(state: AppState, interval_secs: u64) {
    tokio::spawn(async move {
        let interval = Duration::from_secs(interval_secs);

        loop {
            tokio::time::sleep(interval).await;

            match state.db.get() {
                Ok(conn) => {
                    if let Err(e) = licensing::sweep_expired(&conn, &state.events) {
                        tracing::warn!("Expiry sweep failed: {}", e);
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to get db connection for expiry sweep: {}", e);
                }
            }
        }
    });

    tracing::info!(
        "Expiry sweep task started (runs every {} seconds)",
        interval_secs
    );
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "licensor=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }

    let db_pool = create_pool(&config.database_path).expect("Failed to create database pool");
    {
        let conn = db_pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize database");
    }

    let (events, events_rx) = EventSink::channel();
    let state = AppState {
        db: db_pool,
        master_key: config.master_key.clone(),
        events,
    };

    // One-shot CLI commands run against the initialized store and exit.
    if cli.sweep_expired {
        if let Err(e) = run_sweep_once(&state) {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
        return;
    }

    if cli.purge_deleted {
        let conn = state.db.get().expect("Failed to get db connection for purge");
        match queries::purge_soft_deleted(&conn, cli.retention_days) {
            Ok(result) => {
                println!(
                    "Purged {} row(s): {} brand(s), {} api key(s), {} license key(s), {} license(s)",
                    result.total(),
                    result.brands,
                    result.api_keys,
                    result.license_keys,
                    result.licenses
                );
            }
            Err(e) => {
                eprintln!("ERROR: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    if cli.generate_api_key {
        let slug = cli.brand.as_deref().expect("--generate-api-key requires --brand");
        let name = cli.key_name.as_deref().unwrap_or("cli");
        if let Err(e) = run_generate_api_key(&state, slug, name) {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
        return;
    }

    // Audit subscriber: drains the event sink into license_events.
    spawn_event_writer(state.db.clone(), events_rx);

    if cli.seed {
        if !config.dev_mode {
            tracing::warn!("--seed flag ignored: not in dev mode (set LICENSOR_ENV=dev)");
        } else {
            seed_dev_data(&state);
        }
    }

    if config.sweep_interval_secs > 0 {
        spawn_expiry_sweep(state.clone(), config.sweep_interval_secs);
    }

    let app = handlers::app(state, Some(config.rate_limit)).layer(TraceLayer::new_for_http());

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Licensor server listening on {}", addr);

    // into_make_service_with_connect_info enables IP-based rate limiting
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Failed to start server");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
