//! Extension registry core.
//!
//! Discovers extensions from manifest files, records which are available and
//! active in a durable store, and drives their start/shutdown lifecycle.

pub mod config;
pub mod db;
pub mod extension;
pub mod logging;
pub mod store;

pub use config::{ConfigError, RegistryConfig};
pub use extension::environment::{
    Collaborators, EnvResult, Environment, EnvironmentError, BOOTSTRAP_ENTRY,
};
pub use extension::files::{FileAccess, LocalFileAccess};
pub use extension::finder::{Catalog, DetectError, DetectResult, Finder, RESERVED_NAMES};
pub use extension::hooks::{
    BootstrapHook, CollaboratorError, EventSink, LogEventSink, LogServiceRegistrar,
    NoopBootstrapHook, ServiceRegistrar, ShellBootstrapHook, EVENT_DONE, EVENT_STARTED,
};
pub use extension::manifest::{
    parse_manifest, ConfigMap, ExtensionDescriptor, ExtensionMetadata, ManifestDocument,
    ManifestError, ManifestResult, ANY_VERSION, APP_EXTENSION_NAME, MANIFEST_FILENAME,
};
pub use logging::{default_log_level, init_logging, logging_status};
pub use store::{
    connect_state_store, ActiveSet, MemoryStateStore, SqliteStateStore, StateStore, StoreError,
    StoreResult, ACTIVE_KEY, AVAILABLE_KEY,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
