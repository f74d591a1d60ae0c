//! Handing a composed descriptor to external collaborators.
//!
//! Mosaic never installs packages or activates toolchains itself. A
//! [`PackageResolver`] turns the `packages` entries into handles and a
//! [`LanguageActivator`] turns each enabled `languages.<name>` namespace into
//! an environment patch.

use mosaic_schema::{EnvironmentDescriptor, FragmentId, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ConsumerError {
    #[error("package '{0}' not found")]
    UnknownPackage(String),
    #[error("language '{0}' is not supported by {1}")]
    UnsupportedLanguage(String, String),
    #[error("entry '{id}' is not a string collection: {value}")]
    InvalidPackages { id: String, value: String },
    #[error("consumer unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PackageHandle {
    pub name: String,
    pub locator: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentPatch {
    pub language: String,
    pub variables: BTreeMap<String, String>,
    pub path_entries: Vec<String>,
}

pub trait PackageResolver: Send + Sync {
    fn name(&self) -> &str;

    /// Resolve package names to handles. Names arrive sorted and deduplicated.
    fn resolve(&self, packages: &[String]) -> Result<Vec<PackageHandle>, ConsumerError>;
}

pub trait LanguageActivator: Send + Sync {
    fn name(&self) -> &str;

    /// Produce the environment changes for an enabled language. `options`
    /// holds the other entries of its namespace keyed relative to it, e.g.
    /// `channel` for `languages.rust.channel`.
    fn activate(
        &self,
        language: &str,
        options: &BTreeMap<String, Value>,
    ) -> Result<EnvironmentPatch, ConsumerError>;
}

pub fn select_resolver(name: &str) -> Result<Box<dyn PackageResolver>, ConsumerError> {
    match name {
        "mock" => Ok(Box::new(crate::mock::MockResolver::new())),
        other => Err(ConsumerError::Unavailable(other.to_owned())),
    }
}

pub fn select_activator(name: &str) -> Result<Box<dyn LanguageActivator>, ConsumerError> {
    match name {
        "mock" => Ok(Box::new(crate::mock::MockActivator::new())),
        other => Err(ConsumerError::Unavailable(other.to_owned())),
    }
}

/// A consumer failure, attributed to the descriptor entry that caused it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffFailure {
    pub id: String,
    pub error: ConsumerError,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffReport {
    pub packages: Vec<PackageHandle>,
    pub patches: Vec<EnvironmentPatch>,
    pub failures: Vec<HandoffFailure>,
}

impl HandoffReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Sorted, deduplicated package names from one `packages` entry.
pub fn package_names(id: &FragmentId, value: &Value) -> Result<Vec<String>, ConsumerError> {
    let items = value
        .string_items()
        .ok_or_else(|| ConsumerError::InvalidPackages {
            id: id.to_string(),
            value: value.to_string(),
        })?;
    let names: BTreeSet<String> = items.into_iter().map(str::to_owned).collect();
    Ok(names.into_iter().collect())
}

/// Languages whose `languages.<name>.enable` entry is true, with the rest of
/// their namespace as options.
pub fn enabled_languages(
    descriptor: &EnvironmentDescriptor,
) -> BTreeMap<String, BTreeMap<String, Value>> {
    let mut languages = BTreeMap::new();
    for (id, value) in descriptor.within("languages") {
        let segments: Vec<&str> = id.segments().collect();
        if let ["languages", name, "enable"] = segments.as_slice() {
            if value.is_true() {
                languages.insert((*name).to_owned(), BTreeMap::new());
            }
        }
    }

    for (id, value) in descriptor.within("languages") {
        let segments: Vec<&str> = id.segments().collect();
        let [_, name, rest @ ..] = segments.as_slice() else {
            continue;
        };
        if rest.is_empty() || rest == ["enable"] {
            continue;
        }
        if let Some(options) = languages.get_mut(*name) {
            options.insert(rest.join("."), value.clone());
        }
    }
    languages
}

/// Pass a composed descriptor to the consumers: the resolver once per
/// `packages` entry, the activator once per enabled language. Failures are
/// collected rather than stopping the handoff.
pub fn handoff(
    descriptor: &EnvironmentDescriptor,
    resolver: &dyn PackageResolver,
    activator: &dyn LanguageActivator,
) -> HandoffReport {
    let mut report = HandoffReport::default();

    for (id, value) in descriptor.within("packages") {
        let resolved = package_names(id, value).and_then(|names| resolver.resolve(&names));
        match resolved {
            Ok(handles) => report.packages.extend(handles),
            Err(error) => {
                warn!(resolver = resolver.name(), %id, "package resolution failed: {error}");
                report.failures.push(HandoffFailure {
                    id: id.to_string(),
                    error,
                });
            }
        }
    }

    for (language, options) in enabled_languages(descriptor) {
        match activator.activate(&language, &options) {
            Ok(patch) => report.patches.push(patch),
            Err(error) => {
                warn!(activator = activator.name(), %language, "activation failed: {error}");
                report.failures.push(HandoffFailure {
                    id: format!("languages.{language}.enable"),
                    error,
                });
            }
        }
    }

    info!(
        packages = report.packages.len(),
        languages = report.patches.len(),
        failures = report.failures.len(),
        "handoff complete"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(entries: &[(&str, Value)]) -> EnvironmentDescriptor {
        entries
            .iter()
            .map(|(id, v)| (FragmentId::parse(id).unwrap(), v.clone()))
            .collect()
    }

    #[test]
    fn package_names_are_sorted_and_deduplicated() {
        let id = FragmentId::parse("packages.extra").unwrap();
        let names = package_names(&id, &Value::string_list(["jq", "git", "jq"])).unwrap();
        assert_eq!(names, ["git", "jq"]);
    }

    #[test]
    fn non_string_packages_are_rejected() {
        let id = FragmentId::parse("packages").unwrap();
        assert!(matches!(
            package_names(&id, &Value::str("git")),
            Err(ConsumerError::InvalidPackages { .. })
        ));
    }

    #[test]
    fn resolver_runs_once_per_packages_entry() {
        let d = descriptor(&[
            ("packages", Value::string_set(["git", "ffmpeg"])),
            ("packages.extra", Value::string_list(["jq"])),
            ("packagesx", Value::string_set(["ignored"])),
            ("shell", Value::str("zsh")),
        ]);
        let resolver = crate::mock::MockResolver::new();
        let report = handoff(&d, &resolver, &crate::mock::MockActivator::new());

        assert_eq!(resolver.calls(), 2);
        let names: Vec<&str> = report.packages.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["ffmpeg", "git", "jq"]);
        assert!(report.patches.is_empty());
        assert!(report.is_complete());
    }

    #[test]
    fn failures_name_the_entry() {
        let d = descriptor(&[
            ("packages", Value::str("git")),
            ("languages.go.enable", Value::flag(true)),
        ]);
        let report = handoff(
            &d,
            &crate::mock::MockResolver::new(),
            &crate::mock::MockActivator::supporting(["rust"]),
        );
        let ids: Vec<&str> = report.failures.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, ["packages", "languages.go.enable"]);
    }

    #[test]
    fn only_enabled_languages_with_options() {
        let d = descriptor(&[
            ("languages.rust.enable", Value::flag(true)),
            ("languages.rust.channel", Value::str("stable")),
            ("languages.rust.toolchain.profile", Value::str("minimal")),
            ("languages.go.enable", Value::flag(false)),
            ("languages.go.version", Value::str("1.22")),
            ("languages.zig.version", Value::str("0.13")),
        ]);
        let langs = enabled_languages(&d);
        assert_eq!(langs.keys().collect::<Vec<_>>(), ["rust"]);
        let rust = &langs["rust"];
        assert_eq!(rust["channel"], Value::str("stable"));
        assert_eq!(rust["toolchain.profile"], Value::str("minimal"));
        assert_eq!(rust.len(), 2);
    }

    #[test]
    fn select_consumers() {
        assert!(select_resolver("mock").is_ok());
        assert!(select_activator("mock").is_ok());
        assert!(select_resolver("apt").is_err());
        assert!(select_activator("asdf").is_err());
    }
}
