use actix_cors::Cors;
use actix_web::{middleware::{Compress, DefaultHeaders}, web, App, HttpServer};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

use campus::auth::Sessions;
use campus::config::Settings;
use campus::openapi::ApiDoc;
use campus::rate_limit::LoginThrottle;
use campus::repo::Store;
use campus::storage::FsDocumentStore;
use campus::{config, seed, AppState};

#[cfg(feature = "postgres-store")]
async fn postgres_store(settings: &Settings) -> anyhow::Result<Option<Arc<dyn Store>>> {
    use sqlx::postgres::PgPoolOptions;
    let Some(db_url) = settings.database_url.as_deref() else { return Ok(None) };
    let pool = PgPoolOptions::new().max_connections(5).connect(db_url).await?;
    let store = campus::repo::pg::PgStore::new(pool);
    store.ensure_schema().await?;
    info!("Using Postgres store backend");
    Ok(Some(Arc::new(store)))
}

#[cfg(not(feature = "postgres-store"))]
async fn postgres_store(_settings: &Settings) -> anyhow::Result<Option<Arc<dyn Store>>> {
    Ok(None)
}

#[cfg(feature = "inmem-store")]
fn inmem_store(settings: &Settings) -> anyhow::Result<Arc<dyn Store>> {
    info!("Using in-memory store backend (snapshot in '{}')", settings.data_dir.display());
    Ok(Arc::new(campus::repo::inmem::InMemStore::open(&settings.data_dir)?))
}

#[cfg(not(feature = "inmem-store"))]
fn inmem_store(_settings: &Settings) -> anyhow::Result<Arc<dyn Store>> {
    Err(anyhow::anyhow!("no store backend available: set DATABASE_URL with the postgres-store feature"))
}

async fn build_store(settings: &Settings) -> anyhow::Result<Arc<dyn Store>> {
    if let Some(store) = postgres_store(settings).await? {
        return Ok(store);
    }
    inmem_store(settings)
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load .env automatically only in debug builds to reduce manual setup overhead.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    // Structured logging initialisation
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let settings = Settings::from_env()?;
    info!("Bootstrapping campus portal");
    info!("Frontend URL: {}", settings.frontend_url);

    let store = build_store(&settings).await?;
    if seed::seed_defaults(store.as_ref(), &settings).await? {
        info!("First run: default data seeded");
    }

    let state = AppState {
        store,
        documents: Arc::new(FsDocumentStore::new(settings.data_dir.join("documents"))),
        sessions: Sessions::new(&settings.jwt_secret, settings.session_ttl_days, settings.cookie_secure),
        throttle: LoginThrottle::new(settings.login_limit, settings.login_window),
    };
    let openapi = ApiDoc::openapi();
    let frontend_url = settings.frontend_url.clone();

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            // during local dev allow the Vite default port
            .allowed_origin("http://localhost:5173")
            .allowed_origin("http://127.0.0.1:5173")
            .allowed_origin(&frontend_url)
            .allow_any_header()
            .allowed_methods(["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(
                DefaultHeaders::new()
                    .add(("X-Content-Type-Options", "nosniff"))
                    .add(("X-Frame-Options", "DENY"))
                    .add(("Referrer-Policy", "no-referrer")),
            )
            .wrap(cors)
            .app_data(web::Data::new(state.clone()))
            .configure(config)
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
    })
    .bind(&settings.bind_addr)?;

    info!("Listening on http://{}", settings.bind_addr);
    server.run().await?;
    Ok(())
}
