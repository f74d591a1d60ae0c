use crate::compose::Composer;
use crate::config::ComposeConfig;
use crate::CoreError;
use mosaic_schema::{
    get_builtin, parse_module_file, DescriptorIdentity, DescriptorLock, EnvironmentDescriptor,
    Fragment, FragmentId, Module, Priority, PriorityBounds,
};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Where a module comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleSource {
    File(PathBuf),
    Builtin(String),
}

impl fmt::Display for ModuleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleSource::File(path) => write!(f, "{}", path.display()),
            ModuleSource::Builtin(name) => write!(f, "builtin:{name}"),
        }
    }
}

/// Result of a successful composition.
#[derive(Debug, Clone)]
pub struct ComposeResult {
    pub descriptor: EnvironmentDescriptor,
    pub identity: DescriptorIdentity,
    pub lock: DescriptorLock,
}

#[derive(Debug, Clone, Default)]
pub struct ComposeOptions {
    /// Lock file to verify against (`locked`) or write to (`write_lock`).
    pub lock_path: Option<PathBuf>,
    /// Fail if the composed descriptor differs from the lock file.
    pub locked: bool,
    pub write_lock: bool,
}

/// Loads modules, composes them, and manages lock files.
pub struct Engine {
    composer: Composer,
}

impl Engine {
    pub fn new(config: ComposeConfig) -> Self {
        Self {
            composer: Composer::new(config),
        }
    }

    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    /// Load every module in order.
    ///
    /// Declared priorities are not range-checked here; the composer checks
    /// them against the configured bounds so that every offending id is
    /// reported together.
    pub fn load_modules(&self, sources: &[ModuleSource]) -> Result<Vec<Module>, CoreError> {
        let parse_bounds = PriorityBounds::new(Priority::new(0), Priority::new(u32::MAX));
        sources
            .iter()
            .map(|source| -> Result<Module, CoreError> {
                debug!("loading module {source}");
                match source {
                    ModuleSource::File(path) => Ok(parse_module_file(path, &parse_bounds)?),
                    ModuleSource::Builtin(name) => {
                        let builtin = get_builtin(name)
                            .ok_or_else(|| CoreError::UnknownModule(name.clone()))?;
                        Ok(builtin.load(&parse_bounds)?)
                    }
                }
            })
            .collect()
    }

    pub fn load_fragments(&self, sources: &[ModuleSource]) -> Result<Vec<Fragment>, CoreError> {
        Ok(self
            .load_modules(sources)?
            .into_iter()
            .flat_map(|m| m.fragments)
            .collect())
    }

    pub fn compose(&self, sources: &[ModuleSource]) -> Result<ComposeResult, CoreError> {
        self.compose_with_options(sources, &ComposeOptions::default())
    }

    pub fn compose_with_options(
        &self,
        sources: &[ModuleSource],
        options: &ComposeOptions,
    ) -> Result<ComposeResult, CoreError> {
        info!("composing {} module(s)", sources.len());
        let fragments = self.load_fragments(sources)?;
        let descriptor = self.composer.compose(fragments)?;
        let lock = DescriptorLock::from_descriptor(&descriptor)?;
        let identity = lock.verify_integrity()?;

        if let Some(path) = &options.lock_path {
            if options.locked {
                self.verify_lock(&descriptor, path)?;
            }
            if options.write_lock {
                lock.write_to_file(path)?;
                info!("wrote lock file {}", path.display());
            }
        }

        info!("composed descriptor {}", identity.short_digest);
        Ok(ComposeResult {
            descriptor,
            identity,
            lock,
        })
    }

    /// Check an existing lock file against a freshly composed descriptor.
    pub fn verify_lock(
        &self,
        descriptor: &EnvironmentDescriptor,
        lock_path: &Path,
    ) -> Result<DescriptorIdentity, CoreError> {
        let lock = DescriptorLock::read_from_file(lock_path)?;
        let identity = lock.verify_integrity()?;
        lock.verify_descriptor(descriptor)?;
        debug!("lock file {} matches", lock_path.display());
        Ok(identity)
    }

    pub fn evaluation_order(
        &self,
        sources: &[ModuleSource],
    ) -> Result<Vec<Vec<FragmentId>>, CoreError> {
        let fragments = self.load_fragments(sources)?;
        Ok(self.composer.evaluation_order(&fragments)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosaic_schema::{LockError, Value};

    fn write_module(dir: &Path, name: &str, body: &str) -> ModuleSource {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        ModuleSource::File(path)
    }

    #[test]
    fn composes_files_and_builtins() {
        let dir = tempfile::tempdir().unwrap();
        let local = write_module(
            dir.path(),
            "local.toml",
            r#"
module_version = 1
name = "local"

[[fragment]]
id = "packages"
set = ["git"]
"#,
        );

        let engine = Engine::new(ComposeConfig::default());
        let result = engine
            .compose(&[ModuleSource::Builtin("media".to_owned()), local])
            .unwrap();
        assert_eq!(
            result.descriptor.get("packages"),
            Some(&Value::string_set(["ffmpeg", "git"]))
        );
        assert_eq!(result.identity, result.descriptor.identity().unwrap());
    }

    #[test]
    fn unknown_builtin_is_an_error() {
        let engine = Engine::new(ComposeConfig::default());
        let err = engine
            .compose(&[ModuleSource::Builtin("nope".to_owned())])
            .unwrap_err();
        assert!(matches!(err, CoreError::UnknownModule(ref n) if n == "nope"));
    }

    #[test]
    fn write_then_verify_lock() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("mosaic.lock");
        let sources = [ModuleSource::Builtin("shell".to_owned())];
        let engine = Engine::new(ComposeConfig::default());

        let written = engine
            .compose_with_options(
                &sources,
                &ComposeOptions {
                    lock_path: Some(lock_path.clone()),
                    write_lock: true,
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(lock_path.exists());

        let verified = engine
            .compose_with_options(
                &sources,
                &ComposeOptions {
                    lock_path: Some(lock_path.clone()),
                    locked: true,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(written.identity, verified.identity);

        let drifted = engine.compose_with_options(
            &[ModuleSource::Builtin("media".to_owned())],
            &ComposeOptions {
                lock_path: Some(lock_path),
                locked: true,
                ..Default::default()
            },
        );
        assert!(matches!(
            drifted,
            Err(CoreError::Lock(LockError::Drift(_)))
        ));
    }

    #[test]
    fn module_source_display() {
        assert_eq!(
            ModuleSource::Builtin("rust".to_owned()).to_string(),
            "builtin:rust"
        );
        assert_eq!(
            ModuleSource::File(PathBuf::from("a/b.toml")).to_string(),
            "a/b.toml"
        );
    }
}
