//! Composition engine for Mosaic.
//!
//! The [`Composer`] groups fragments by id, orders derived fragments by their
//! dependencies, and folds every group into a single [`EnvironmentDescriptor`]
//! or an aggregated [`ComposeError`]. The [`Engine`] wraps it with module
//! loading and lock files, and [`handoff`] passes the result to external
//! package resolvers and language activators.
//!
//! [`EnvironmentDescriptor`]: mosaic_schema::EnvironmentDescriptor

pub mod compose;
pub mod config;
pub mod consumer;
pub mod engine;
pub mod eval;
pub mod mock;

pub use compose::{ComposeError, Composer, MergeCause, MergeError};
pub use config::{default_config_path, ComposeConfig, Parallelism};
pub use consumer::{
    enabled_languages, handoff, package_names, select_activator, select_resolver,
    ConsumerError, EnvironmentPatch, HandoffFailure, HandoffReport, LanguageActivator,
    PackageHandle, PackageResolver,
};
pub use engine::{ComposeOptions, ComposeResult, Engine, ModuleSource};
pub use eval::DependencyGraph;
pub use mock::{MockActivator, MockResolver};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("module error: {0}")]
    Module(#[from] mosaic_schema::ModuleError),
    #[error("unknown module: {0}")]
    UnknownModule(String),
    #[error("composition failed: {0}")]
    Compose(#[from] ComposeError),
    #[error("lock error: {0}")]
    Lock(#[from] mosaic_schema::LockError),
    #[error("config error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
