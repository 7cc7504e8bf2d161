use anyhow::Context;
use nihongo_api::{
    config::Config,
    create_router,
    services::{
        email_service::{spawn_email_worker, transport_for, Notifier, EMAIL_QUEUE_CAPACITY},
        AppState,
    },
};
use opentelemetry_sdk::trace::SdkTracerProvider;
use std::{net::SocketAddr, sync::Arc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Export spans only when a collector is configured
    let tracer_provider = init_telemetry()?;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "nihongo_api=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer());
    match &tracer_provider {
        Some(provider) => {
            use opentelemetry::trace::TracerProvider as _;
            registry
                .with(tracing_opentelemetry::layer().with_tracer(provider.tracer("nihongo-api")))
                .init();
        }
        None => registry.init(),
    }

    tracing::info!("Starting NihongoWOW API");

    let config = Config::load().context("Failed to load configuration")?;
    tracing::info!(
        "Configuration loaded for environment: {:?}",
        std::env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string())
    );

    let mongo_client = mongodb::Client::with_uri_str(&config.mongo_uri)
        .await
        .context("Failed to connect to MongoDB")?;
    tracing::info!("MongoDB client created");

    let redis_client = config
        .redis_uri
        .as_deref()
        .map(redis::Client::open)
        .transpose()
        .context("Failed to create Redis client")?;

    let (notifier, email_rx) = Notifier::channel(EMAIL_QUEUE_CAPACITY);
    let _email_worker = spawn_email_worker(email_rx, transport_for(&config)?);

    let bind_addr = config.bind_addr.clone();
    let app_state = Arc::new(
        AppState::new(config, mongo_client, redis_client, notifier)
            .await
            .context("Failed to initialize application state")?,
    );

    let app = create_router(app_state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    if let Some(provider) = tracer_provider {
        tracing::info!("Shutting down OpenTelemetry");
        if let Err(e) = provider.shutdown() {
            eprintln!("Failed to shut down tracer provider: {}", e);
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

fn init_telemetry() -> anyhow::Result<Option<SdkTracerProvider>> {
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::Resource;

    let Ok(otlp_endpoint) = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") else {
        return Ok(None);
    };

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(otlp_endpoint)
        .build()
        .context("Failed to create OTLP exporter")?;

    let resource = Resource::builder_empty()
        .with_service_name("nihongo-api")
        .with_attributes(vec![KeyValue::new(
            "service.version",
            env!("CARGO_PKG_VERSION"),
        )])
        .build();

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(resource)
        .build();

    opentelemetry::global::set_tracer_provider(provider.clone());

    Ok(Some(provider))
}
