use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tournament_tally::{
    config::Config,
    router,
    stats::{
        BucketStore, EventLedger, InMemoryBucketStore, InMemoryEventLedger, PostgresBucketStore,
        PostgresEventLedger, StatsService,
    },
    tournament::{InMemoryTournamentRepository, PostgresTournamentRepository, TournamentLookup},
    AppState, Tournament,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tournament_tally=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    info!(
        participant_keys = ?config.participant_resolution,
        period = ?config.period,
        offset = %config.period_offset,
        dedupe_events = config.dedupe_events,
        "Starting tournament tally service"
    );

    let tournaments: Arc<dyn TournamentLookup>;
    let buckets: Arc<dyn BucketStore>;
    let ledger: Arc<dyn EventLedger>;
    match &config.database_url {
        Some(database_url) => {
            let pool = sqlx::PgPool::connect(database_url).await?;
            let tournament_repo = PostgresTournamentRepository::new(pool.clone());
            let bucket_store = PostgresBucketStore::new(pool.clone());
            let event_ledger = PostgresEventLedger::new(pool);
            tournament_repo.ensure_schema().await?;
            bucket_store.ensure_schema().await?;
            event_ledger.ensure_schema().await?;
            info!("Using PostgreSQL stores");

            tournaments = Arc::new(tournament_repo);
            buckets = Arc::new(bucket_store);
            ledger = Arc::new(event_ledger);
        }
        None => {
            let seeded = match &config.tournaments_file {
                Some(path) => {
                    let raw = tokio::fs::read_to_string(path).await?;
                    serde_json::from_str::<Vec<Tournament>>(&raw)?
                }
                None => Vec::new(),
            };
            info!(
                tournament_count = seeded.len(),
                "DATABASE_URL not set; using in-memory stores"
            );

            tournaments = Arc::new(InMemoryTournamentRepository::with_tournaments(seeded));
            buckets = Arc::new(InMemoryBucketStore::new());
            ledger = Arc::new(InMemoryEventLedger::new());
        }
    }

    let mut builder = StatsService::builder(tournaments, buckets)
        .with_period_keyer(config.period_keyer())
        .with_participant_resolution(config.participant_resolution)
        .with_max_retries(config.merge_max_retries)
        .with_backoff(config.merge_backoff);
    if config.dedupe_events {
        builder = builder.with_ledger(ledger);
    }

    let app = router(AppState::new(Arc::new(builder.build())));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Server running on http://{}", config.bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
