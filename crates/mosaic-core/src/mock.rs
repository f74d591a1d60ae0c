use crate::consumer::{
    ConsumerError, EnvironmentPatch, LanguageActivator, PackageHandle, PackageResolver,
};
use mosaic_schema::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Resolver that hands out `mock://` locators.
///
/// With no known set every name resolves; otherwise only known names do.
#[derive(Debug, Default)]
pub struct MockResolver {
    known: Option<BTreeSet<String>>,
    calls: AtomicUsize,
}

impl MockResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_known<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known: Some(names.into_iter().map(Into::into).collect()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PackageResolver for MockResolver {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn resolve(&self, packages: &[String]) -> Result<Vec<PackageHandle>, ConsumerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        packages
            .iter()
            .map(|name| match &self.known {
                Some(known) if !known.contains(name) => {
                    Err(ConsumerError::UnknownPackage(name.clone()))
                }
                _ => Ok(PackageHandle {
                    name: name.clone(),
                    locator: format!("mock://{name}"),
                }),
            })
            .collect()
    }
}

/// Activator that exports every scalar option as `<LANG>_<OPTION>` and adds
/// `/mock/<lang>/bin` to the path.
#[derive(Debug, Default)]
pub struct MockActivator {
    supported: Option<BTreeSet<String>>,
}

impl MockActivator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn supporting<I, S>(languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            supported: Some(languages.into_iter().map(Into::into).collect()),
        }
    }
}

impl LanguageActivator for MockActivator {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn activate(
        &self,
        language: &str,
        options: &BTreeMap<String, Value>,
    ) -> Result<EnvironmentPatch, ConsumerError> {
        if let Some(supported) = &self.supported {
            if !supported.contains(language) {
                return Err(ConsumerError::UnsupportedLanguage(
                    language.to_owned(),
                    self.name().to_owned(),
                ));
            }
        }

        let prefix = language.to_uppercase().replace('-', "_");
        let variables = options
            .iter()
            .filter_map(|(key, value)| {
                let scalar = value.as_scalar()?;
                let key = key.to_uppercase().replace(['.', '-'], "_");
                Some((format!("{prefix}_{key}"), scalar.to_string()))
            })
            .collect();

        Ok(EnvironmentPatch {
            language: language.to_owned(),
            variables,
            path_entries: vec![format!("/mock/{language}/bin")],
        })
    }
}
