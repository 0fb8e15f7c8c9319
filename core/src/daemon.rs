use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use downstream::{HttpTransport, NotifyService, RefreshService, WebhookTransport};
use models::{UserData, WatchChannel};
use remote::{DriveApi, DriveNameCache, HttpDriveApi, TokenStore};
use settings::ConfigStore;
use syncer::{trigger_queue, ChangeProcessor, TaskStatsStore, TreeBuilder, TriggerHandle, TriggerQueue};
use tokio_util::sync::CancellationToken;
use tree::ShadowTree;
use utilities::{FileSystem, HistoryLog, RealFileSystem};

/// The remote grants 7-day push channels; re-register a day early.
const WATCH_EXPIRATION: Duration = Duration::from_secs(7 * 24 * 60 * 60);
const WATCH_RENEWAL_INTERVAL: Duration = Duration::from_secs(6 * 24 * 60 * 60);

/// Boot wiring for the whole pipeline. The HTTP dashboard, OAuth flow and
/// webhook listener are external collaborators: they receive the
/// [`TriggerHandle`] and call [`TriggerHandle::notify`] on every push
/// notification, cron tick, or manual refresh.
pub struct Daemon {
    userdata: UserData,
    force_rebuild: bool,
    fs: Arc<dyn FileSystem>,
    store: Arc<ConfigStore>,
    trigger: TriggerHandle,
    queue: TriggerQueue,
}

impl Daemon {
    pub fn new(userdata: UserData, force_rebuild: bool) -> Result<Self> {
        let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem::new());
        fs.create_dir_all(&userdata.config_dir())
            .context("cannot create config directory")?;
        fs.create_dir_all(&userdata.data_dir())
            .context("cannot create data directory")?;

        let store = Arc::new(ConfigStore::load(fs.clone(), userdata.config_file())?);
        let cfg = store.snapshot();

        let log_dir = if cfg.advanced.log_dir.is_empty() {
            userdata.system_log_dir()
        } else {
            PathBuf::from(&cfg.advanced.log_dir).join("system")
        };
        utilities::init_logging(&log_dir, cfg.advanced.log_save_enabled)?;

        let (trigger, queue) = trigger_queue();
        Ok(Daemon {
            userdata,
            force_rebuild,
            fs,
            store,
            trigger,
            queue,
        })
    }

    /// Producer handle for the external webhook/cron/dashboard glue.
    pub fn trigger_handle(&self) -> TriggerHandle {
        self.trigger.clone()
    }

    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let cfg = self.store.snapshot();
        tracing::info!("cloudshadow starting...");
        if cfg.google.target_drive_ids.is_empty() {
            tracing::warn!(
                "no target roots configured; the daemon is idle until targets are added"
            );
        }

        let names = Arc::new(DriveNameCache::new(cfg.google.personal_drive_name.clone()));
        let tree = Arc::new(ShadowTree::new(names.clone()));
        let transport: Arc<dyn WebhookTransport> = Arc::new(HttpTransport::new()?);
        let refresh = Arc::new(RefreshService::new(self.store.clone(), transport.clone()));
        let notify = Arc::new(NotifyService::new(self.store.clone(), transport));
        let tokens = TokenStore::new(self.fs.clone(), self.userdata.start_token_file());
        let history_dir = if cfg.advanced.log_dir.is_empty() {
            self.userdata.history_log_dir()
        } else {
            PathBuf::from(&cfg.advanced.log_dir).join("history")
        };
        let history = HistoryLog::new(self.fs.clone(), history_dir, cfg.advanced.log_save_enabled);
        let stats = Arc::new(TaskStatsStore::load(
            self.fs.clone(),
            self.userdata.task_stats_file(),
        ));

        let api: Arc<dyn DriveApi> = match HttpDriveApi::from_token_file(
            self.fs.as_ref(),
            &self.userdata.oauth_token_file(),
            cfg.google.rate_limit_qps,
        ) {
            Ok(api) => Arc::new(api),
            Err(e) => {
                // Without authorization the change loop stays quiescent:
                // no tree build, no subscription. The operator authorizes
                // through the dashboard and restarts.
                tracing::warn!("remote client not initialized, please re-authorize: {e:#}");
                cancel.cancelled().await;
                return Ok(());
            }
        };

        let builder = TreeBuilder::new(
            self.store.clone(),
            api.clone(),
            tree.clone(),
            names.clone(),
            self.fs.clone(),
            self.userdata.tree_cache_file(),
        );
        tracing::info!("preloading file tree...");
        builder.build(self.force_rebuild).await;
        tracing::info!("preload complete (nodes: {})", tree.len());

        if let Err(e) = tokens.ensure(api.as_ref()).await {
            tracing::error!("failed to acquire resume token: {e:#}");
        }

        if let Some(token) = tokens.load() {
            register_watch(api.as_ref(), &self.store, &token).await;
        }
        spawn_watch_renewal(
            api.clone(),
            self.store.clone(),
            tokens.clone(),
            cancel.clone(),
        );

        let processor = Arc::new(ChangeProcessor::new(
            self.store.clone(),
            api,
            tree,
            names,
            tokens,
            refresh,
            notify,
            history,
            stats,
        ));

        // Catch up on anything that changed while the daemon was down.
        self.trigger.notify();

        processor.run(self.queue, cancel).await;
        Ok(())
    }
}

/// Register the change-feed push channel pointing at the public webhook
/// address.
async fn register_watch(api: &dyn DriveApi, store: &ConfigStore, page_token: &str) {
    let cfg = store.snapshot();
    if cfg.server.public_url.is_empty() {
        tracing::warn!("public_url not configured, skipping webhook registration");
        return;
    }
    let address = format!(
        "{}/{}",
        cfg.server.public_url.trim_end_matches('/'),
        cfg.server.webhook_path.trim_start_matches('/')
    );
    let expiration_ms =
        (utilities::unix_seconds() + WATCH_EXPIRATION.as_secs() as i64) * 1000;
    let channel = WatchChannel {
        id: uuid::Uuid::new_v4().to_string(),
        address: address.clone(),
        expiration_ms,
    };
    match api.watch_changes(page_token, &channel).await {
        Ok(()) => tracing::info!("webhook registered: {address}"),
        Err(e) => tracing::error!("failed to register webhook: {e:#}"),
    }
}

fn spawn_watch_renewal(
    api: Arc<dyn DriveApi>,
    store: Arc<ConfigStore>,
    tokens: TokenStore,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(WATCH_RENEWAL_INTERVAL);
        ticker.tick().await; // immediate first tick is the boot registration
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Some(token) = tokens.load() {
                        tracing::info!("renewing webhook subscription...");
                        register_watch(api.as_ref(), &store, &token).await;
                    }
                }
            }
        }
    });
}
