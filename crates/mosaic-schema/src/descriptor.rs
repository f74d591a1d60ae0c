use crate::fragment::{Body, Fragment, FragmentError, FragmentId, Origin, Priority, PriorityBounds};
use crate::types::{DescriptorDigest, ShortDigest, ValueDigest};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The merged result of one composition run: every resolved id and its value.
///
/// Entries are kept sorted by id, so the canonical JSON form is byte-identical
/// for equal descriptors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvironmentDescriptor {
    entries: BTreeMap<FragmentId, Value>,
}

/// Content identity of a descriptor.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DescriptorIdentity {
    pub digest: DescriptorDigest,
    pub short_digest: ShortDigest,
}

impl EnvironmentDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&Value> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FragmentId, &Value)> {
        self.entries.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &FragmentId> {
        self.entries.keys()
    }

    /// Entries whose id is `namespace` or lies below it.
    pub fn within<'a>(
        &'a self,
        namespace: &'a str,
    ) -> impl Iterator<Item = (&'a FragmentId, &'a Value)> + 'a {
        self.entries
            .iter()
            .filter(move |(id, _)| id.is_within(namespace))
    }

    pub fn canonical_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Untagged JSON object keyed by id, for display.
    pub fn to_plain_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.entries
                .iter()
                .map(|(id, v)| (id.to_string(), v.to_plain_json()))
                .collect(),
        )
    }

    /// Blake3 digest of each entry's canonical value.
    pub fn entry_digests(&self) -> Result<BTreeMap<String, ValueDigest>, serde_json::Error> {
        self.entries
            .iter()
            .map(|(id, value)| {
                let json = serde_json::to_string(value)?;
                let digest = blake3::hash(json.as_bytes()).to_hex().to_string();
                Ok::<_, serde_json::Error>((id.to_string(), ValueDigest::new(digest)))
            })
            .collect()
    }

    pub fn identity(&self) -> Result<DescriptorIdentity, serde_json::Error> {
        Ok(identity_from_entry_digests(&self.entry_digests()?))
    }

    /// Turn every entry back into a literal fragment at `priority`.
    ///
    /// Composing the result yields this descriptor again.
    pub fn to_fragments(&self, priority: Priority) -> Result<Vec<Fragment>, FragmentError> {
        let bounds = PriorityBounds::new(priority, priority);
        self.entries
            .iter()
            .enumerate()
            .map(|(position, (id, value))| {
                Fragment::builder(id.as_str(), Body::Literal(value.clone()))
                    .priority(priority)
                    .origin(Origin::new("<descriptor>", position as u32))
                    .build(&bounds)
            })
            .collect()
    }
}

impl FromIterator<(FragmentId, Value)> for EnvironmentDescriptor {
    fn from_iter<T: IntoIterator<Item = (FragmentId, Value)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl crate::fragment::Lookup for EnvironmentDescriptor {
    fn lookup(&self, id: &str) -> Option<&Value> {
        self.get(id)
    }
}

/// Hash per-entry digests in id order. Lock files recompute the same
/// identity from their stored digests alone.
pub(crate) fn identity_from_entry_digests(
    digests: &BTreeMap<String, ValueDigest>,
) -> DescriptorIdentity {
    let mut hasher = blake3::Hasher::new();
    for (id, digest) in digests {
        hasher.update(format!("entry:{id}={digest}\n").as_bytes());
    }

    let hex = hasher.finalize().to_hex().to_string();
    let short = hex[..12].to_owned();

    DescriptorIdentity {
        digest: DescriptorDigest::new(hex),
        short_digest: ShortDigest::new(short),
    }
}
