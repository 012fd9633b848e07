//! Command implementations.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::StreamExt;
use tracing::{debug, info, warn};

use lectern_core::api::ApiClient;
use lectern_core::cache::CacheManager;
use lectern_core::config::Config;
use lectern_core::network::{ConnectivityMonitor, ConnectivityProbe, HttpProbe};
use lectern_core::repository::{
    last_sync_key, synced_key, ContentRepository, GlossaryRepository, OfflinePolicy, QuizRepository, SYNC_CATEGORIES,
};
use lectern_core::store::{ContentStore, JsonDatabase};
use lectern_core::sync::{JobScheduler, SyncCoordinator, SyncError};
use lectern_core::utils::{format_age, format_timestamp};

/// Everything a command needs, wired from the config.
pub struct Services {
    pub config: Config,
    pub cache_dir: PathBuf,
    pub cache: CacheManager,
    pub store: Arc<JsonDatabase>,
    pub connectivity: ConnectivityMonitor,
    pub probe: Arc<HttpProbe>,
    pub content: ContentRepository,
    pub glossary: GlossaryRepository,
    pub quizzes: QuizRepository,
    pub coordinator: SyncCoordinator,
    pub scheduler: JobScheduler,
}

impl Services {
    pub async fn build(config: Config, cache_dir: PathBuf) -> Result<Self> {
        let cache = CacheManager::open(&cache_dir)
            .with_context(|| format!("Failed to open cache in {}", cache_dir.display()))?;
        let store = Arc::new(
            JsonDatabase::open(&cache_dir)
                .await
                .with_context(|| format!("Failed to open database in {}", cache_dir.display()))?,
        );
        let remote = Arc::new(ApiClient::new(config.api_base_url.clone())?);

        // One probe up front so the first decisions see the real network state.
        let probe = Arc::new(HttpProbe::new(config.probe_url.clone())?);
        let connectivity = ConnectivityMonitor::new(probe.probe().await.is_usable());

        let policy = OfflinePolicy::new(cache.clone(), connectivity.clone());
        let content = ContentRepository::new(store.clone(), remote.clone(), policy.clone())
            .with_download_all_content(config.download_all_content);
        let glossary = GlossaryRepository::new(store.clone(), remote.clone(), policy.clone());
        let quizzes = QuizRepository::new(store.clone(), remote, policy);

        let scheduler = JobScheduler::new(connectivity.clone());
        let coordinator = SyncCoordinator::new(
            content.clone(),
            glossary.clone(),
            quizzes.clone(),
            connectivity.clone(),
            scheduler.clone(),
        )
        .with_auto_sync(config.auto_sync);

        Ok(Self {
            config,
            cache_dir,
            cache,
            store,
            connectivity,
            probe,
            content,
            glossary,
            quizzes,
            coordinator,
            scheduler,
        })
    }
}

/// One full sync, then exit.
pub async fn sync(services: &Services) -> Result<()> {
    match services.coordinator.run_sync().await {
        Ok(report) => {
            for category in &report.synced {
                println!("  {:<10} synced", category);
            }
            for (category, error) in &report.failed {
                println!("  {:<10} failed: {}", category, error);
            }
            if !report.is_complete() {
                anyhow::bail!("{} of {} categories failed", report.failed.len(), SYNC_CATEGORIES.len());
            }
            Ok(())
        }
        Err(SyncError::Offline) => {
            println!("Offline - nothing synced, cached data is unchanged.");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Stay resident: probe connectivity, sync periodically and on reconnect.
pub async fn run(services: &Services) -> Result<()> {
    let probe: Arc<dyn ConnectivityProbe> = services.probe.clone();
    let prober = services
        .connectivity
        .spawn_probe(probe, services.config.probe_interval());

    if services.config.auto_sync {
        services.coordinator.initialize();
    } else {
        info!("Auto-sync disabled; run `lectern sync` to update");
    }
    let watcher = services.coordinator.watch_connectivity();

    warm_up(services).await;

    let mut states = services.coordinator.observe_state();
    let state_logger = tokio::spawn(async move {
        while let Some(state) = states.next().await {
            info!(state = %state, "Sync state");
        }
    });

    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
    info!("Shutting down");

    services.scheduler.shutdown();
    watcher.abort();
    prober.abort();
    state_logger.abort();
    Ok(())
}

/// Open the browsing datasets the way a reader starting the app would, so
/// stale ones refresh in the background under their configured max age.
async fn warm_up(services: &Services) {
    let ages = services.config.max_age;

    let chapters = services.content.chapters(ages.chapters()).next().await.unwrap_or_default();
    for chapter in &chapters {
        let sections = services.content.sections(chapter.id, ages.sections()).next().await;
        debug!(chapter = chapter.id, sections = sections.as_ref().map_or(0, Vec::len), "Sections available");
    }
    let terms = services.glossary.terms(ages.terms()).next().await.unwrap_or_default();
    let quizzes = services.quizzes.quizzes(ages.quizzes()).next().await.unwrap_or_default();
    info!(
        chapters = chapters.len(),
        terms = terms.len(),
        quizzes = quizzes.len(),
        "Content available offline"
    );
}

/// Write the effective config to its standard location.
pub fn write_config(config: &Config) -> Result<()> {
    let path = config.save()?;
    println!("Wrote {}", path.display());
    Ok(())
}

/// `"fresh"` or `"stale"` for the dataset cached under `key`.
async fn freshness(cache: &CacheManager, key: &str, max_age: Duration) -> &'static str {
    if cache.is_stale(key, max_age).await {
        "stale"
    } else {
        "fresh"
    }
}

/// Print connectivity, last sync per category and stored record counts.
pub async fn status(services: &Services) -> Result<()> {
    let now = chrono::Utc::now().timestamp_millis();
    let online = services.connectivity.is_available();

    println!("Network:   {}", if online { "online" } else { "offline" });
    println!("API:       {}", services.config.api_base_url);
    println!("Data dir:  {}", services.cache_dir.display());
    println!();

    for category in SYNC_CATEGORIES {
        let synced: bool = services.cache.get(&synced_key(category), false).await;
        let last: Option<i64> = services.cache.get(&last_sync_key(category), None).await;
        let line = match (synced, last) {
            (true, Some(ts)) => format!("{} ({})", format_age(now - ts), format_timestamp(ts)),
            _ => "never synced".to_string(),
        };
        println!("  {:<10} {}", category, line);
    }
    println!();

    let store = services.store.as_ref();
    let ages = services.config.max_age;
    let cache = &services.cache;
    let chapters = store.watch_chapters().next().await.unwrap_or_default();
    let terms = store.watch_terms().next().await.unwrap_or_default().len();
    let quizzes = store.watch_quizzes().next().await.unwrap_or_default().len();
    println!("Stored:    {} chapters, {} terms, {} quizzes", chapters.len(), terms, quizzes);

    let mut stale_sections = 0;
    for chapter in &chapters {
        if cache.is_stale(&CacheManager::generate_key("sections", &[&chapter.id]), ages.sections()).await {
            stale_sections += 1;
        }
    }
    println!(
        "Freshness: chapters {}, terms {}, quizzes {}, sections stale in {} of {} chapters",
        freshness(cache, "chapters", ages.chapters()).await,
        freshness(cache, "terms", ages.terms()).await,
        freshness(cache, "quizzes", ages.quizzes()).await,
        stale_sections,
        chapters.len()
    );
    Ok(())
}

/// Cancel background sync and drop all cached data.
pub async fn clear(services: &Services) -> Result<()> {
    services.coordinator.cancel_sync();
    services.cache.clear().await;
    if let Err(e) = services.store.clear().await {
        warn!(error = %e, "Failed to delete database");
        return Err(e).context("Failed to clear database");
    }
    println!("Cleared cached data in {}", services.cache_dir.display());
    Ok(())
}
