use anyhow::Context;
use cinema_api::{app, AppState, AuthConfig};
use cinema_booking::{BookingEngine, Collaborators, Settings};
use cinema_core::events::EventBus;
use cinema_store::app_config::Config;
use cinema_store::memory::InMemoryEventBus;
use cinema_store::{
    DbClient, KafkaEventBus, RedisClient, StoreAuditRepository, StoreBookingRepository, StoreScreeningRepository,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cinema_api=debug,cinema_booking=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting cinema API on port {}", config.server.port);

    let redis = RedisClient::new(&config.redis.url)
        .await
        .context("Failed to connect to Redis")?;

    let db = DbClient::new(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    let bus: Arc<dyn EventBus> = match &config.kafka {
        Some(kafka) => {
            tracing::info!("Publishing booking events to Kafka topic {}", kafka.topic);
            Arc::new(
                KafkaEventBus::new(&kafka.brokers, &kafka.topic, &kafka.group_id)
                    .context("Failed to create Kafka producer")?,
            )
        }
        None => {
            tracing::info!("No Kafka configured, using in-process event bus");
            Arc::new(InMemoryEventBus::default())
        }
    };

    let rules = &config.booking;
    let settings = Settings {
        lock_ttl: rules.lock_ttl(),
        sweep_interval: rules.sweep_interval(),
        store_timeout: rules.store_timeout(),
        hub_queue_capacity: rules.hub_queue_capacity,
        subscriber_queue_capacity: rules.subscriber_queue_capacity,
    };

    let engine = BookingEngine::start(
        Collaborators {
            screenings: Arc::new(StoreScreeningRepository::new(db.pool.clone())),
            bookings: Arc::new(StoreBookingRepository::new(db.pool.clone())),
            locks: Arc::new(redis),
            audit: Arc::new(StoreAuditRepository::new(db.pool.clone())),
            bus,
        },
        &settings,
    );

    let (stop, shutdown) = watch::channel(false);
    let notifier_task = engine
        .notifier
        .start(shutdown.clone())
        .await
        .context("Failed to subscribe to booking events")?;
    let sweeper_task = tokio::spawn(engine.sweeper.run(shutdown));

    let app_state = AppState {
        bookings: engine.service,
        hub: engine.hub,
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
        },
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(app_state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await?;

    stop.send(true)?;
    notifier_task.await?;
    sweeper_task.await?;
    Ok(())
}
