//! Extension environment: detection, activation and runtime lifecycle.
//!
//! # Responsibility
//! - Persist detected catalogs as the available set.
//! - Toggle membership of the persisted active set.
//! - Start active extensions on load and shut them down in start order.
//!
//! # Invariants
//! - `detect` replaces the available set; it never merges.
//! - `activate` only admits names present in the available set.
//! - `load` starts extensions in activation order.
//! - Active entries missing from the available set are skipped on `load`,
//!   never pruned.
//! - Services are handed to the registrar once per `load`, aggregated across
//!   every started extension.
//! - Runtime state is process-local and rebuilt on every boot.
//!
//! # Concurrency
//! Activation is a read-modify-write over the whole active set. Callers must
//! serialize `activate`/`deactivate`/`load`; concurrent writers lose updates.

use crate::config::{ConfigError, RegistryConfig};
use crate::extension::files::{FileAccess, LocalFileAccess};
use crate::extension::finder::{Catalog, DetectError, Finder};
use crate::extension::hooks::{
    lifecycle_event, BootstrapHook, CollaboratorError, EventSink, LogEventSink,
    LogServiceRegistrar, NoopBootstrapHook, ServiceRegistrar, EVENT_DONE, EVENT_STARTED,
};
use crate::extension::manifest::{ConfigMap, ExtensionDescriptor};
use crate::store::{
    connect_state_store, load_active_set, load_catalog, save_active_set, save_catalog, ActiveSet,
    StateStore, StoreError,
};
use log::{debug, error, info};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Bootstrap script looked up at `<extension>/src/<entry>`.
pub const BOOTSTRAP_ENTRY: &str = "orchestra.sh";
/// Config key whose string entries join the pending service list.
pub const SERVICE_CONFIG_KEY: &str = "service";

pub type EnvResult<T> = Result<T, EnvironmentError>;

/// Host collaborators used during startup and shutdown.
#[derive(Clone)]
pub struct Collaborators {
    pub bootstrap: Arc<dyn BootstrapHook>,
    pub events: Arc<dyn EventSink>,
    pub services: Arc<dyn ServiceRegistrar>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            bootstrap: Arc::new(NoopBootstrapHook),
            events: Arc::new(LogEventSink),
            services: Arc::new(LogServiceRegistrar),
        }
    }
}

/// Extensions started in this process, in start order.
#[derive(Debug, Default)]
struct RuntimeRegistry {
    entries: Vec<ExtensionDescriptor>,
}

impl RuntimeRegistry {
    /// Records one started extension; restarting keeps its original slot.
    fn insert(&mut self, descriptor: ExtensionDescriptor) {
        match self
            .entries
            .iter_mut()
            .find(|entry| entry.name == descriptor.name)
        {
            Some(slot) => *slot = descriptor,
            None => self.entries.push(descriptor),
        }
    }

    fn get(&self, name: &str) -> Option<&ExtensionDescriptor> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    fn drain(&mut self) -> Vec<ExtensionDescriptor> {
        std::mem::take(&mut self.entries)
    }
}

/// State machine driving extensions from discovery to shutdown.
pub struct Environment {
    finder: Finder,
    store: Box<dyn StateStore>,
    files: Arc<dyn FileAccess>,
    collaborators: Collaborators,
    bootstrap_entry: String,
    runtime: RuntimeRegistry,
    pending_services: Vec<String>,
}

impl Environment {
    pub fn new(
        finder: Finder,
        store: Box<dyn StateStore>,
        files: Arc<dyn FileAccess>,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            finder,
            store,
            files,
            collaborators,
            bootstrap_entry: BOOTSTRAP_ENTRY.to_string(),
            runtime: RuntimeRegistry::default(),
            pending_services: vec![],
        }
    }

    /// Builds an environment over the local filesystem from configuration.
    ///
    /// An unreachable durable store silently degrades to an in-memory one.
    pub fn from_config(config: &RegistryConfig, collaborators: Collaborators) -> EnvResult<Self> {
        config.validate()?;

        let files: Arc<dyn FileAccess> = Arc::new(LocalFileAccess::new());
        let mut finder = Finder::new(files.clone(), &config.app_path, &config.base_path)
            .with_manifest_filename(config.manifest_filename.as_str());
        for path in &config.extra_paths {
            finder.add_path(path.as_str());
        }

        let store = connect_state_store(config.store_path.as_deref());
        Ok(Self::new(finder, store, files, collaborators)
            .with_bootstrap_entry(config.bootstrap_entry.as_str()))
    }

    pub fn with_bootstrap_entry(mut self, entry: impl Into<String>) -> Self {
        self.bootstrap_entry = entry.into();
        self
    }

    pub fn finder(&self) -> &Finder {
        &self.finder
    }

    pub fn finder_mut(&mut self) -> &mut Finder {
        &mut self.finder
    }

    pub fn store(&self) -> &dyn StateStore {
        self.store.as_ref()
    }

    /// Runs discovery and persists the result as the available set.
    pub fn detect(&self) -> EnvResult<Catalog> {
        let catalog = self.finder.detect()?;
        save_catalog(self.store(), &catalog)?;
        Ok(catalog)
    }

    /// Copies an available extension's config into the active set.
    ///
    /// Returns `false`, leaving the active set untouched, when `name` is not
    /// available.
    pub fn activate(&self, name: &str) -> EnvResult<bool> {
        let availables = load_catalog(self.store())?;
        let Some(descriptor) = availables.get(name) else {
            debug!("event=extension_activate module=environment status=skip name={name}");
            return Ok(false);
        };

        let mut actives = load_active_set(self.store())?;
        actives.insert(name.to_string(), descriptor.config.clone());
        save_active_set(self.store(), &actives)?;

        info!("event=extension_activate module=environment status=ok name={name}");
        Ok(true)
    }

    /// Removes `name` from the active set. Returns whether it was active.
    pub fn deactivate(&self, name: &str) -> EnvResult<bool> {
        let mut actives = load_active_set(self.store())?;
        let was_active = actives.remove(name).is_some();
        save_active_set(self.store(), &actives)?;

        info!(
            "event=extension_deactivate module=environment status=ok name={} was_active={}",
            name, was_active
        );
        Ok(was_active)
    }

    pub fn is_available(&self, name: &str) -> EnvResult<bool> {
        Ok(load_catalog(self.store())?.contains_key(name))
    }

    pub fn is_active(&self, name: &str) -> EnvResult<bool> {
        Ok(load_active_set(self.store())?.contains_key(name))
    }

    /// Returns the persisted available set.
    pub fn available(&self) -> EnvResult<Catalog> {
        Ok(load_catalog(self.store())?)
    }

    /// Returns the persisted active set.
    pub fn active(&self) -> EnvResult<ActiveSet> {
        Ok(load_active_set(self.store())?)
    }

    /// Starts one extension in this process.
    ///
    /// A blank `name` is ignored. The bootstrap script runs when present; once
    /// it succeeds the descriptor's services join the pending list and a
    /// started event is published.
    pub fn start(&mut self, name: &str, mut descriptor: ExtensionDescriptor) -> EnvResult<()> {
        if name.trim().is_empty() {
            return Ok(());
        }
        descriptor.name = name.to_string();

        let script = bootstrap_script(&descriptor.path, &self.bootstrap_entry);
        if self.files.is_file(&script) {
            self.collaborators.bootstrap.run(&descriptor, &script)?;
        }

        self.pending_services
            .extend(descriptor.provides.iter().cloned());
        self.pending_services
            .extend(config_services(&descriptor.config));

        let event = lifecycle_event(EVENT_STARTED, name);
        self.runtime.insert(descriptor.clone());
        self.collaborators.events.publish(&event, &descriptor)?;

        info!("event=extension_start module=environment status=ok name={name}");
        Ok(())
    }

    /// Starts every active extension that is still available, in activation
    /// order, then registers the aggregated services once. Returns how many
    /// extensions started.
    ///
    /// On failure the pending services are discarded, so a retried `load`
    /// registers each service once.
    pub fn load(&mut self) -> EnvResult<usize> {
        let started = match self.start_actives() {
            Ok(started) => started,
            Err(err) => {
                let dropped = std::mem::take(&mut self.pending_services);
                error!(
                    "event=extension_load module=environment status=error dropped_services={} error={}",
                    dropped.len(),
                    err
                );
                return Err(err);
            }
        };

        let services = std::mem::take(&mut self.pending_services);
        self.collaborators.services.register_services(&services)?;

        info!(
            "event=extension_load module=environment status=ok started={} services={}",
            started,
            services.len()
        );
        Ok(started)
    }

    fn start_actives(&mut self) -> EnvResult<usize> {
        let availables = load_catalog(self.store())?;
        let actives = load_active_set(self.store())?;

        let mut started = 0;
        for (name, config) in actives {
            let Some(descriptor) = availables.get(name.as_str()) else {
                debug!("event=extension_load module=environment status=skip reason=stale name={name}");
                continue;
            };

            let mut descriptor = descriptor.clone();
            merge_config(&mut descriptor.config, config);
            self.start(name.as_str(), descriptor)?;
            started += 1;
        }
        Ok(started)
    }

    /// Publishes a done event per started extension in start order, then
    /// forgets all runtime state.
    pub fn shutdown(&mut self) -> EnvResult<()> {
        let entries = self.runtime.drain();
        let count = entries.len();
        for descriptor in &entries {
            let event = lifecycle_event(EVENT_DONE, descriptor.name.as_str());
            self.collaborators.events.publish(&event, descriptor)?;
        }

        info!("event=extension_shutdown module=environment status=ok count={count}");
        Ok(())
    }

    pub fn started(&self, name: &str) -> bool {
        self.runtime.get(name).is_some()
    }

    /// Names of started extensions in start order.
    pub fn started_names(&self) -> Vec<&str> {
        self.runtime
            .entries
            .iter()
            .map(|entry| entry.name.as_str())
            .collect()
    }

    /// Services collected by `start` and not yet handed to the registrar.
    pub fn pending_services(&self) -> &[String] {
        &self.pending_services
    }

    /// Reads `key` (dot-separated for nested objects) from a started
    /// extension's merged config.
    pub fn option(&self, name: &str, key: &str, default: Value) -> Value {
        self.option_with(name, key, || default)
    }

    /// Like [`Environment::option`], producing the default lazily.
    pub fn option_with(&self, name: &str, key: &str, default: impl FnOnce() -> Value) -> Value {
        self.runtime
            .get(name)
            .and_then(|descriptor| lookup_dotted(&descriptor.config, key))
            .cloned()
            .unwrap_or_else(default)
    }
}

/// Overlays `overrides` on `base`; override values win per top-level key.
fn merge_config(base: &mut ConfigMap, overrides: ConfigMap) {
    for (key, value) in overrides {
        base.insert(key, value);
    }
}

fn config_services(config: &ConfigMap) -> Vec<String> {
    match config.get(SERVICE_CONFIG_KEY) {
        Some(Value::String(service)) => vec![service.clone()],
        Some(Value::Array(services)) => services
            .iter()
            .filter_map(|service| service.as_str().map(str::to_string))
            .collect(),
        _ => vec![],
    }
}

fn lookup_dotted<'a>(config: &'a ConfigMap, key: &str) -> Option<&'a Value> {
    if let Some(value) = config.get(key) {
        return Some(value);
    }

    let mut segments = key.split('.');
    let mut current = config.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Environment operation errors.
#[derive(Debug)]
pub enum EnvironmentError {
    Config(ConfigError),
    Detect(DetectError),
    Store(StoreError),
    Collaborator(CollaboratorError),
}

impl Display for EnvironmentError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(err) => write!(f, "{err}"),
            Self::Detect(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
            Self::Collaborator(err) => write!(f, "{err}"),
        }
    }
}

impl Error for EnvironmentError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Detect(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::Collaborator(err) => Some(err),
        }
    }
}

impl From<ConfigError> for EnvironmentError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<DetectError> for EnvironmentError {
    fn from(value: DetectError) -> Self {
        Self::Detect(value)
    }
}

impl From<StoreError> for EnvironmentError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<CollaboratorError> for EnvironmentError {
    fn from(value: CollaboratorError) -> Self {
        Self::Collaborator(value)
    }
}

/// Resolves the bootstrap script location for one extension directory.
pub fn bootstrap_script(extension_dir: &Path, entry: &str) -> PathBuf {
    extension_dir.join("src").join(entry)
}
