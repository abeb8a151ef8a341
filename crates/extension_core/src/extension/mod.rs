//! Extension discovery and lifecycle.
//!
//! `manifest` decodes one manifest, `finder` walks search paths into a
//! catalog, and `environment` drives activation and the start/shutdown
//! lifecycle against the persisted state store.

pub mod environment;
pub mod files;
pub mod finder;
pub mod hooks;
pub mod manifest;
