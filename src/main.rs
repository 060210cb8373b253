use std::{process, sync::Arc};

use apalis::prelude::{Monitor, WorkerBuilder, WorkerFactoryFn};
use apalis_cron::CronStream;
use murmur::{
    application::{
        clock::{Clock, SystemClock},
        error::{AppError, ErrorReport},
        jobs::{
            CacheJobContext, PURGE_CACHE_WORKER, SYNC_CACHE_WORKER, process_purge_cache_job,
            process_sync_cache_job, purge_cache_schedule, sync_cache_schedule,
        },
        purge::PurgeService,
        repos::{CommentsWriteRepo, DurableAdminRepo, UsersWriteRepo},
        seed::{SeedPlan, SeedService},
        sync::SyncService,
    },
    cache::{
        CacheConfig, CacheLifecycle, CommentRepository, HotStore, MemoryHotStore, UserRepository,
    },
    config,
    infra::{db::PostgresRepositories, error::InfraError, telemetry},
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_error::SpanTrace;
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    let report = ErrorReport::from_error("murmur::main", error);
    if dispatcher::has_been_set() {
        let span_trace = SpanTrace::capture();
        error!(error = %report.render(), %span_trace, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %report.render(), "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(args) => run_serve(settings, *args).await,
        config::Command::Seed(_) => run_seed(settings).await,
        config::Command::Migrate(_) => run_migrate(settings).await,
    }
}

/// Everything built on top of one hot store and one durable store.
struct Engine {
    store: Arc<dyn HotStore>,
    durable: Arc<PostgresRepositories>,
    clock: Arc<dyn Clock>,
    cache_config: CacheConfig,
    sync: Arc<SyncService>,
    purge: Arc<PurgeService>,
}

impl Engine {
    fn build(settings: &config::Settings, durable: Arc<PostgresRepositories>) -> Self {
        let store: Arc<dyn HotStore> = Arc::new(MemoryHotStore::new());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let cache_config = CacheConfig::from(&settings.cache);

        let users = Arc::new(
            UserRepository::new(store.clone(), clock.clone(), &cache_config)
                .with_fallback_fetcher(durable.clone()),
        );
        let comments = Arc::new(
            CommentRepository::new(store.clone(), clock.clone(), &cache_config)
                .with_fallback_fetcher(durable.clone()),
        );

        let user_writer: Arc<dyn UsersWriteRepo> = durable.clone();
        let comment_writer: Arc<dyn CommentsWriteRepo> = durable.clone();
        let sync = SyncService::new(
            users.clone(),
            comments.clone(),
            user_writer,
            comment_writer,
            clock.clone(),
        )
        .with_concurrency(settings.jobs.sync_concurrency.get() as usize);

        let lifecycles: Vec<Arc<dyn CacheLifecycle>> = vec![
            comments as Arc<dyn CacheLifecycle>,
            users as Arc<dyn CacheLifecycle>,
        ];
        let purge = PurgeService::new(lifecycles, clock.clone());

        Self {
            store,
            durable,
            clock,
            cache_config,
            sync: Arc::new(sync),
            purge: Arc::new(purge),
        }
    }

    async fn seed(&self, settings: &config::SeedSettings) -> Result<(), AppError> {
        let admin: Arc<dyn DurableAdminRepo> = self.durable.clone();
        let seeder = SeedService::new(
            self.store.clone(),
            admin,
            self.clock.clone(),
            self.cache_config.clone(),
        );
        let report = seeder
            .run(SeedPlan {
                number_users: settings.number_users,
                number_comments: settings.number_comments,
            })
            .await?;
        info!(
            target = "murmur::seed",
            users = report.user_ids.len(),
            comments = report.comment_ids.len(),
            "Seeded hot store"
        );
        Ok(())
    }
}

async fn run_serve(settings: config::Settings, args: config::ServeArgs) -> Result<(), AppError> {
    let durable = init_repositories(&settings).await?;
    let engine = Engine::build(&settings, durable);

    if args.seed {
        engine.seed(&settings.seed).await?;
    }

    let context = CacheJobContext {
        sync: engine.sync.clone(),
        purge: engine.purge.clone(),
        sync_minutes: engine.cache_config.sync_minutes,
        purge_minutes: engine.cache_config.purge_minutes,
    };

    let sync_worker = WorkerBuilder::new(SYNC_CACHE_WORKER)
        .data(context.clone())
        .backend(CronStream::new(sync_cache_schedule(
            &settings.jobs.sync_schedule,
        )?))
        .build_fn(process_sync_cache_job);
    let purge_worker = WorkerBuilder::new(PURGE_CACHE_WORKER)
        .data(context)
        .backend(CronStream::new(purge_cache_schedule(
            &settings.jobs.purge_schedule,
        )?))
        .build_fn(process_purge_cache_job);

    info!(
        target = "murmur::serve",
        sync_schedule = %settings.jobs.sync_schedule,
        purge_schedule = %settings.jobs.purge_schedule,
        "Starting cache workers"
    );

    Monitor::new()
        .register(sync_worker)
        .register(purge_worker)
        .run_with_signal(tokio::signal::ctrl_c())
        .await
        .map_err(|err| AppError::unexpected(format!("job monitor stopped: {err}")))?;

    info!(target = "murmur::serve", "Cache workers stopped");
    Ok(())
}

async fn run_seed(settings: config::Settings) -> Result<(), AppError> {
    let durable = init_repositories(&settings).await?;
    let engine = Engine::build(&settings, durable);

    engine.seed(&settings.seed).await?;
    let report = engine.sync.run(engine.cache_config.sync_minutes).await?;
    info!(
        target = "murmur::seed",
        users = report.users.upserted,
        comments = report.comments.upserted,
        failures = report.failures(),
        "Synced seeded records"
    );
    Ok(())
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    init_repositories(&settings).await?;
    info!(target = "murmur::migrate", "Migrations applied");
    Ok(())
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    let repositories = PostgresRepositories::new(pool);
    repositories
        .health_check()
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(Arc::new(repositories))
}
