use crate::fragment::{
    Body, Fragment, FragmentError, FragmentId, Origin, Priority, PriorityBounds, Thunk,
};
use crate::value::{EnablePolicy, Scalar, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("failed to read module file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse module: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("unsupported module_version: {0}, expected 1")]
    UnsupportedVersion(u32),
    #[error("fragment #{index}: {source}")]
    Fragment {
        index: usize,
        #[source]
        source: FragmentError,
    },
    #[error("fragment '{id}' declares no value (expected one of: scalar, list, set, enable, mapping, from)")]
    MissingValue { id: String },
    #[error("fragment '{id}' declares more than one value: {keys}")]
    ConflictingValueKeys { id: String, keys: String },
    #[error("fragment '{id}' uses 'from' together with '{other}'")]
    ReferenceWithValue { id: String, other: &'static str },
    #[error("fragment '{id}' contains an unsupported {kind} value")]
    UnsupportedValue { id: String, kind: &'static str },
}

/// A module file as written on disk.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ModuleFile {
    pub module_version: u32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "fragment")]
    pub fragments: Vec<FragmentDecl>,
}

/// One `[[fragment]]` table.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FragmentDecl {
    pub id: String,
    #[serde(default)]
    pub priority: Option<u32>,
    #[serde(default)]
    pub policy: Option<EnablePolicy>,
    #[serde(default)]
    pub scalar: Option<toml::Value>,
    #[serde(default)]
    pub list: Option<Vec<toml::Value>>,
    #[serde(default)]
    pub set: Option<Vec<toml::Value>>,
    #[serde(default)]
    pub enable: Option<bool>,
    #[serde(default)]
    pub mapping: Option<toml::Table>,
    #[serde(default)]
    pub when: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
}

/// A loaded module: its name and validated fragments in declaration order.
#[derive(Debug, Clone)]
pub struct Module {
    pub name: String,
    pub fragments: Vec<Fragment>,
}

impl ModuleFile {
    /// Validate every declaration and build fragments.
    ///
    /// `source` labels origins when the module has no `name`.
    pub fn into_module(self, source: &str, bounds: &PriorityBounds) -> Result<Module, ModuleError> {
        if self.module_version != 1 {
            return Err(ModuleError::UnsupportedVersion(self.module_version));
        }
        let name = self
            .name
            .map(|n| n.trim().to_owned())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| source.to_owned());

        let mut fragments = Vec::with_capacity(self.fragments.len());
        for (index, decl) in self.fragments.into_iter().enumerate() {
            let origin = Origin::new(name.clone(), index as u32);
            fragments.push(decl.into_fragment(index, origin, bounds)?);
        }
        Ok(Module { name, fragments })
    }
}

impl FragmentDecl {
    fn into_fragment(
        self,
        index: usize,
        origin: Origin,
        bounds: &PriorityBounds,
    ) -> Result<Fragment, ModuleError> {
        let body = self.body(index)?;
        let mut builder = Fragment::builder(self.id, body).origin(origin);
        if let Some(priority) = self.priority {
            builder = builder.priority(Priority::new(priority));
        }
        if let Some(policy) = self.policy {
            builder = builder.policy(policy);
        }
        builder
            .build(bounds)
            .map_err(|source| ModuleError::Fragment { index, source })
    }

    fn body(&self, index: usize) -> Result<Body, ModuleError> {
        let as_id = |raw: &str| {
            FragmentId::parse(raw).map_err(|source| ModuleError::Fragment { index, source })
        };

        if let Some(target) = &self.from {
            if let Some(other) = self.declared_keys().first().copied() {
                return Err(ModuleError::ReferenceWithValue {
                    id: self.id.clone(),
                    other,
                });
            }
            if self.when.is_some() {
                return Err(ModuleError::ReferenceWithValue {
                    id: self.id.clone(),
                    other: "when",
                });
            }
            return Ok(Body::Derived(Thunk::Ref(as_id(target)?)));
        }

        let value = self.value()?;
        match &self.when {
            Some(flag) => Ok(Body::Derived(Thunk::When {
                flag: as_id(flag)?,
                then: value,
            })),
            None => Ok(Body::Literal(value)),
        }
    }

    fn declared_keys(&self) -> Vec<&'static str> {
        let mut keys = Vec::new();
        if self.scalar.is_some() {
            keys.push("scalar");
        }
        if self.list.is_some() {
            keys.push("list");
        }
        if self.set.is_some() {
            keys.push("set");
        }
        if self.enable.is_some() {
            keys.push("enable");
        }
        if self.mapping.is_some() {
            keys.push("mapping");
        }
        keys
    }

    fn value(&self) -> Result<Value, ModuleError> {
        let keys = self.declared_keys();
        if keys.len() > 1 {
            return Err(ModuleError::ConflictingValueKeys {
                id: self.id.clone(),
                keys: keys.join(", "),
            });
        }

        let id = self.id.as_str();
        if let Some(scalar) = &self.scalar {
            return match convert(id, scalar)? {
                v @ Value::Scalar(_) => Ok(v),
                _ => Err(ModuleError::UnsupportedValue {
                    id: id.to_owned(),
                    kind: "non-scalar",
                }),
            };
        }
        if let Some(items) = &self.list {
            return items
                .iter()
                .map(|item| convert(id, item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List);
        }
        if let Some(items) = &self.set {
            return items
                .iter()
                .map(|item| convert(id, item))
                .collect::<Result<BTreeSet<_>, _>>()
                .map(Value::Set);
        }
        if let Some(enabled) = self.enable {
            return Ok(Value::EnableFlag(enabled));
        }
        if let Some(table) = &self.mapping {
            return convert_table(id, table);
        }
        Err(ModuleError::MissingValue {
            id: self.id.clone(),
        })
    }
}

fn convert(id: &str, raw: &toml::Value) -> Result<Value, ModuleError> {
    match raw {
        toml::Value::String(s) => Ok(Value::Scalar(Scalar::Str(s.clone()))),
        toml::Value::Integer(i) => Ok(Value::Scalar(Scalar::Int(*i))),
        toml::Value::Boolean(b) => Ok(Value::Scalar(Scalar::Bool(*b))),
        toml::Value::Array(items) => items
            .iter()
            .map(|item| convert(id, item))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        toml::Value::Table(table) => convert_table(id, table),
        toml::Value::Float(_) => Err(ModuleError::UnsupportedValue {
            id: id.to_owned(),
            kind: "float",
        }),
        toml::Value::Datetime(_) => Err(ModuleError::UnsupportedValue {
            id: id.to_owned(),
            kind: "datetime",
        }),
    }
}

fn convert_table(id: &str, table: &toml::Table) -> Result<Value, ModuleError> {
    let mut entries = BTreeMap::new();
    for (key, raw) in table {
        entries.insert(key.clone(), convert(id, raw)?);
    }
    Ok(Value::Mapping(entries))
}

pub fn parse_module_str(
    input: &str,
    source: &str,
    bounds: &PriorityBounds,
) -> Result<Module, ModuleError> {
    let file: ModuleFile = toml::from_str(input)?;
    file.into_module(source, bounds)
}

pub fn parse_module_file(
    path: impl AsRef<Path>,
    bounds: &PriorityBounds,
) -> Result<Module, ModuleError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;
    parse_module_str(&content, &path.display().to_string(), bounds)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Result<Module, ModuleError> {
        parse_module_str(input, "test.toml", &PriorityBounds::default())
    }

    #[test]
    fn parses_full_module() {
        let input = r#"
module_version = 1
name = "media"

[[fragment]]
id = "packages"
set = ["ffmpeg", "git", "ffmpeg"]

[[fragment]]
id = "languages.rust.enable"
enable = true
priority = 10
policy = "exclusive"

[[fragment]]
id = "packages"
when = "languages.rust.enable"
set = ["cargo"]

[[fragment]]
id = "env"
mapping = { EDITOR = "vi", jobs = 4, paths = ["/bin", "/usr/bin"] }

[[fragment]]
id = "shell.login"
from = "shell"
"#;
        let module = parse(input).expect("should parse");
        assert_eq!(module.name, "media");
        assert_eq!(module.fragments.len(), 5);

        let packages = &module.fragments[0];
        assert_eq!(packages.id().as_str(), "packages");
        match packages.body() {
            Body::Literal(v) => assert_eq!(*v, Value::string_set(["ffmpeg", "git"])),
            Body::Derived(_) => panic!("expected literal"),
        }

        let flag = &module.fragments[1];
        assert_eq!(flag.priority(), Priority::new(10));
        assert_eq!(flag.policy(), EnablePolicy::Exclusive);
        assert_eq!(flag.origin(), &Origin::new("media", 1));

        assert!(matches!(
            module.fragments[2].body(),
            Body::Derived(Thunk::When { .. })
        ));
        assert_eq!(
            module.fragments[2].dependencies()[0].as_str(),
            "languages.rust.enable"
        );

        match module.fragments[3].body() {
            Body::Literal(Value::Mapping(entries)) => {
                assert_eq!(entries["jobs"], Value::int(4));
                assert_eq!(entries["paths"], Value::string_list(["/bin", "/usr/bin"]));
            }
            other => panic!("expected mapping, got {other:?}"),
        }

        assert!(matches!(
            module.fragments[4].body(),
            Body::Derived(Thunk::Ref(_))
        ));
    }

    #[test]
    fn unnamed_module_uses_source_label() {
        let module = parse("module_version = 1\n").unwrap();
        assert_eq!(module.name, "test.toml");
        assert!(module.fragments.is_empty());
    }

    #[test]
    fn rejects_unsupported_version() {
        let err = parse("module_version = 2\n").unwrap_err();
        assert!(matches!(err, ModuleError::UnsupportedVersion(2)));
    }

    #[test]
    fn rejects_unknown_fields() {
        let input = r#"
module_version = 1
[[fragment]]
id = "shell"
scalar = "zsh"
override = true
"#;
        assert!(matches!(parse(input), Err(ModuleError::ParseToml(_))));
    }

    #[test]
    fn rejects_missing_and_duplicate_value_keys() {
        let missing = r#"
module_version = 1
[[fragment]]
id = "shell"
"#;
        assert!(matches!(parse(missing), Err(ModuleError::MissingValue { .. })));

        let twice = r#"
module_version = 1
[[fragment]]
id = "shell"
scalar = "zsh"
list = ["bash"]
"#;
        assert!(matches!(
            parse(twice),
            Err(ModuleError::ConflictingValueKeys { .. })
        ));

        let reference = r#"
module_version = 1
[[fragment]]
id = "shell"
from = "login"
scalar = "zsh"
"#;
        assert!(matches!(
            parse(reference),
            Err(ModuleError::ReferenceWithValue { .. })
        ));
    }

    #[test]
    fn rejects_floats_anywhere() {
        let input = r#"
module_version = 1
[[fragment]]
id = "limits"
mapping = { ratio = 0.5 }
"#;
        assert!(matches!(
            parse(input),
            Err(ModuleError::UnsupportedValue { kind: "float", .. })
        ));
    }

    #[test]
    fn rejects_invalid_ids_and_priorities() {
        let bad_id = r#"
module_version = 1
[[fragment]]
id = "not valid"
scalar = "x"
"#;
        assert!(matches!(
            parse(bad_id),
            Err(ModuleError::Fragment { index: 0, .. })
        ));

        let bad_priority = r#"
module_version = 1
[[fragment]]
id = "shell"
scalar = "zsh"
priority = 99999
"#;
        assert!(matches!(
            parse(bad_priority),
            Err(ModuleError::Fragment {
                source: FragmentError::PriorityOutOfBounds { .. },
                ..
            })
        ));
    }

    #[test]
    fn scalar_key_rejects_arrays() {
        let input = r#"
module_version = 1
[[fragment]]
id = "shell"
scalar = ["zsh"]
"#;
        assert!(matches!(
            parse(input),
            Err(ModuleError::UnsupportedValue { .. })
        ));
    }

    #[test]
    fn reads_module_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rust.toml");
        std::fs::write(
            &path,
            "module_version = 1\n[[fragment]]\nid = \"languages.rust.enable\"\nenable = true\n",
        )
        .unwrap();
        let module = parse_module_file(&path, &PriorityBounds::default()).unwrap();
        assert_eq!(module.fragments.len(), 1);
        assert_eq!(module.name, path.display().to_string());
    }
}
