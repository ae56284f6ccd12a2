//! CLI route: single route table and run context.

use crate::cli::output::{
    format_changesets_json, format_changesets_text, format_entry, format_roots,
    format_sync_report,
};
use crate::cli::parse::Commands;
use crate::config::{ConfigLoader, StrataConfig};
use crate::content::{ContentSource, DiskContentProvider};
use crate::error::{StorageError, SyncError};
use crate::event::EventBus;
use crate::filter::{GlobPathFilter, PathFilter};
use crate::reconcile::Reconciler;
use crate::roots::ContentRootRegistry;
use crate::service::SyncService;
use crate::snapshot::DiskSnapshot;
use crate::store::persistence::SledVersionedTree;
use crate::store::VersionedTree;
use crate::tree::path::VPath;
use crate::watch::WatchDaemon;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Runtime context for CLI execution: workspace, config and the wired-up service.
pub struct RunContext {
    workspace_root: PathBuf,
    config: StrataConfig,
    store: Arc<SledVersionedTree>,
    bus: Arc<EventBus>,
    snapshot: DiskSnapshot,
    service: SyncService,
}

impl RunContext {
    /// Create run context from workspace root and optional config path.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, SyncError> {
        let workspace_root = dunce::canonicalize(&workspace_root).map_err(|e| {
            SyncError::ConfigError(format!(
                "Workspace {} is not accessible: {}",
                workspace_root.display(),
                e
            ))
        })?;

        let config = if let Some(ref cfg_path) = config_path {
            ConfigLoader::load_from_file(cfg_path)?
        } else {
            ConfigLoader::load(&workspace_root)?
        };
        config.validate().map_err(|errors| {
            SyncError::ConfigError(
                errors
                    .iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("; "),
            )
        })?;

        let store_path = config.storage.resolve_store_path(&workspace_root);
        std::fs::create_dir_all(&store_path).map_err(StorageError::IoError)?;
        let store = Arc::new(SledVersionedTree::new(&store_path)?);

        let filter: Arc<dyn PathFilter> = Arc::new(GlobPathFilter::from_config(&config.filter)?);
        let roots = Arc::new(ContentRootRegistry::new(config.effective_roots()));
        let content = Arc::new(ContentSource::with_provider(Arc::new(
            DiskContentProvider::new(workspace_root.clone()),
        )));
        let reconciler = Arc::new(Reconciler::with_tracked_properties(
            store.clone(),
            filter.clone(),
            roots.clone(),
            content,
            config.properties.tracked.iter().cloned(),
        ));
        let snapshot = DiskSnapshot::new(workspace_root.clone(), filter).without_content();
        let bus = Arc::new(EventBus::new());
        let service = SyncService::new(
            reconciler,
            roots,
            bus.clone(),
            Arc::new(snapshot.clone()),
        );

        Ok(Self {
            workspace_root,
            config,
            store,
            bus,
            snapshot,
            service,
        })
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn tree(&self) -> &Arc<SledVersionedTree> {
        &self.store
    }

    /// Execute a CLI command via the single route table.
    pub fn execute(&self, command: &Commands) -> Result<String, SyncError> {
        match command {
            Commands::Sync => self.handle_sync(),
            Commands::Watch { batch_window_ms } => self.handle_watch(*batch_window_ms),
            Commands::Show { path } => self.handle_show(path),
            Commands::Log { path, format } => self.handle_log(path, format),
            Commands::Roots => Ok(format_roots(&self.service.roots().roots())),
        }
    }

    fn handle_sync(&self) -> Result<String, SyncError> {
        let report = self.service.synchronize()?;
        self.store.flush()?;
        Ok(format_sync_report(
            self.service.roots().outermost_roots().len(),
            &report,
        ))
    }

    fn handle_watch(&self, batch_window_ms: Option<u64>) -> Result<String, SyncError> {
        let mut watch_config = self.config.watch.for_workspace(self.workspace_root.clone());
        if let Some(window) = batch_window_ms {
            watch_config.batch_window_ms = window;
        }

        let report = self.service.start()?;
        info!(
            created = report.created,
            updated = report.updated,
            deleted = report.deleted,
            "Initial synchronization complete"
        );

        let daemon = WatchDaemon::new(self.bus.clone(), self.snapshot.clone(), watch_config);
        let result = daemon.start();
        self.service.shutdown();
        self.store.flush()?;
        result?;
        Ok("Watch daemon stopped".to_string())
    }

    fn handle_show(&self, path: &str) -> Result<String, SyncError> {
        let path = self.resolve_path(path)?;
        match self.store.find_entry(&path)? {
            Some(entry) => Ok(format_entry(&entry)),
            None => Err(SyncError::PathNotTracked(path)),
        }
    }

    fn handle_log(&self, path: &str, format: &str) -> Result<String, SyncError> {
        let path = self.resolve_path(path)?;
        let records = self.store.changesets_for(&path)?;
        if records.is_empty() && !path.is_root() && !self.store.has_entry(&path)? {
            return Err(SyncError::PathNotTracked(path));
        }
        match format {
            "json" => format_changesets_json(&records),
            "text" => Ok(format_changesets_text(&records)),
            other => Err(SyncError::ConfigError(format!(
                "Invalid format: {} (must be 'text' or 'json')",
                other
            ))),
        }
    }

    /// Accepts workspace-relative paths and absolute paths inside the workspace.
    fn resolve_path(&self, path: &str) -> Result<VPath, SyncError> {
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            return Ok(VPath::from_fs(&self.workspace_root, candidate)?);
        }
        Ok(VPath::new(path))
    }
}
