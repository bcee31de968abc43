//! Per-body-type sets of field names to mask, and their descriptor string encoding.
//!
//! A descriptor packs a whole registry into one header or config value:
//! `type:field1,field2;type2:field3`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};
use tracing::debug;

use crate::{
    error::DescriptorError,
    masking::{BodyType, MaskingRule},
};

const ENTRY_SEPARATOR: char = ';';
const TYPE_SEPARATOR: char = ':';
const FIELD_SEPARATOR: char = ',';

/// Mapping from [`BodyType`] to the field names masked in bodies of that type.
///
/// Field names are case-sensitive and deduplicated. Built once from configuration (or from a
/// per-request override) and only read afterwards. The masking rule of each body type is
/// compiled as its fields are inserted, so lookups never build a pattern.
#[derive(Debug, Clone, Default)]
pub struct MaskRegistry {
    entries: BTreeMap<BodyType, BTreeSet<String>>,
    rules: BTreeMap<BodyType, MaskingRule>,
}

impl PartialEq for MaskRegistry {
    fn eq(&self, other: &Self) -> bool {
        // Rules are derived from the entries
        self.entries == other.entries
    }
}

impl Eq for MaskRegistry {}

impl MaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with<I, S>(mut self, body_type: impl Into<BodyType>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert(body_type, fields);
        self
    }

    /// Add fields for a body type, merging with any already present.
    pub fn insert<I, S>(&mut self, body_type: impl Into<BodyType>, fields: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let body_type = body_type.into();
        let set = self.entries.entry(body_type.clone()).or_default();
        set.extend(
            fields
                .into_iter()
                .map(Into::into)
                .filter(|field| !field.is_empty()),
        );

        let rule = if set.is_empty() {
            None
        } else {
            MaskingRule::for_body_type(&body_type, set.iter().cloned())
        };
        match rule {
            Some(rule) => {
                self.rules.insert(body_type, rule);
            }
            None => {
                self.rules.remove(&body_type);
            }
        }
    }

    pub fn fields(&self, body_type: &BodyType) -> Option<&BTreeSet<String>> {
        self.entries.get(body_type)
    }

    /// The masking rule for a body type, if the type has both a grammar and fields.
    pub fn rule(&self, body_type: &BodyType) -> Option<&MaskingRule> {
        self.rules.get(body_type)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Parse a descriptor, dropping entries that are not exactly `type:fields`.
    ///
    /// ```rust
    /// use inlet::{masking::BodyType, registry::MaskRegistry};
    ///
    /// let registry = MaskRegistry::parse("json:password;malformedentry;form:secret");
    /// assert_eq!(registry.len(), 2);
    /// assert!(registry.fields(&BodyType::form()).unwrap().contains("secret"));
    /// ```
    pub fn parse(descriptor: &str) -> Self {
        let mut registry = Self::new();
        for entry in entries(descriptor) {
            match split_entry(entry) {
                Some((body_type, fields)) => registry.insert(body_type, split_fields(fields)),
                None => debug!(entry = %entry, "Dropping malformed mask descriptor entry"),
            }
        }
        registry
    }

    /// Parse a descriptor, failing on the first malformed entry.
    pub fn parse_strict(descriptor: &str) -> Result<Self, DescriptorError> {
        let mut registry = Self::new();
        for entry in entries(descriptor) {
            let (body_type, fields) =
                split_entry(entry).ok_or_else(|| DescriptorError::MalformedEntry {
                    entry: entry.to_owned(),
                })?;
            if body_type.is_empty() {
                return Err(DescriptorError::EmptyBodyType {
                    entry: entry.to_owned(),
                });
            }
            registry.insert(body_type, split_fields(fields));
        }
        Ok(registry)
    }

    /// Encode as a descriptor string.
    pub fn serialize(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for MaskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (body_type, fields)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, "{ENTRY_SEPARATOR}")?;
            }
            write!(f, "{body_type}{TYPE_SEPARATOR}")?;
            for (j, field) in fields.iter().enumerate() {
                if j > 0 {
                    write!(f, "{FIELD_SEPARATOR}")?;
                }
                f.write_str(field)?;
            }
        }
        Ok(())
    }
}

fn entries(descriptor: &str) -> impl Iterator<Item = &str> {
    descriptor
        .split(ENTRY_SEPARATOR)
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
}

fn split_entry(entry: &str) -> Option<(&str, &str)> {
    let mut parts = entry.split(TYPE_SEPARATOR);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(body_type), Some(fields), None) => Some((body_type.trim(), fields)),
        _ => None,
    }
}

fn split_fields(fields: &str) -> impl Iterator<Item = &str> {
    fields
        .split(FIELD_SEPARATOR)
        .map(str::trim)
        .filter(|field| !field.is_empty())
}

/// Accepted config shapes: a descriptor string, or a table of lists.
#[derive(Deserialize)]
#[serde(untagged)]
enum RegistryRepr {
    Descriptor(String),
    Table(BTreeMap<String, Vec<String>>),
}

impl<'de> Deserialize<'de> for MaskRegistry {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match RegistryRepr::deserialize(deserializer)? {
            RegistryRepr::Descriptor(descriptor) => Self::parse(&descriptor),
            RegistryRepr::Table(table) => {
                table
                    .into_iter()
                    .fold(Self::new(), |registry, (body_type, fields)| {
                        registry.with(body_type, fields)
                    })
            }
        })
    }
}

impl Serialize for MaskRegistry {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MaskRegistry {
        MaskRegistry::new()
            .with("json", ["password", "token"])
            .with("form", ["secret"])
    }

    #[test]
    fn test_serialize_has_no_trailing_characters() {
        assert_eq!(sample().serialize(), "form:secret;json:password,token");
    }

    #[test]
    fn test_round_trip() {
        let registry = sample();
        assert_eq!(MaskRegistry::parse(&registry.serialize()), registry);
    }

    #[test]
    fn test_malformed_entry_dropped() {
        let registry = MaskRegistry::parse("json:password;malformedentry;form:secret");
        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.fields(&BodyType::json()).unwrap(),
            &BTreeSet::from(["password".to_string()])
        );
        assert_eq!(
            registry.fields(&BodyType::form()).unwrap(),
            &BTreeSet::from(["secret".to_string()])
        );
    }

    #[test]
    fn test_entry_with_extra_colon_dropped() {
        let registry = MaskRegistry::parse("json:a:b;form:c");
        assert_eq!(registry.len(), 1);
        assert!(registry.fields(&BodyType::json()).is_none());
    }

    #[test]
    fn test_duplicates_collapse_and_types_merge() {
        let registry = MaskRegistry::parse("json:a,b,a;json:c, b ;");
        assert_eq!(
            registry.fields(&BodyType::json()).unwrap(),
            &BTreeSet::from(["a".to_string(), "b".to_string(), "c".to_string()])
        );
    }

    #[test]
    fn test_field_names_are_case_sensitive() {
        let registry = MaskRegistry::parse("json:Password,password");
        assert_eq!(registry.fields(&BodyType::json()).unwrap().len(), 2);
    }

    #[test]
    fn test_parse_strict_rejects_malformed_entry() {
        let err = MaskRegistry::parse_strict("json:password;malformedentry").unwrap_err();
        assert_eq!(
            err,
            DescriptorError::MalformedEntry {
                entry: "malformedentry".to_string()
            }
        );
        assert!(matches!(
            MaskRegistry::parse_strict(":password"),
            Err(DescriptorError::EmptyBodyType { .. })
        ));
        assert_eq!(
            MaskRegistry::parse_strict("json:password;form:secret").unwrap(),
            MaskRegistry::parse("json:password;form:secret")
        );
    }

    #[test]
    fn test_empty_descriptor() {
        assert!(MaskRegistry::parse("").is_empty());
        assert_eq!(MaskRegistry::new().serialize(), "");
    }

    #[test]
    fn test_rule_lookup() {
        let registry = sample().with("xml", ["secret"]).with("form2", Vec::<String>::new());
        assert!(registry.rule(&BodyType::json()).is_some());
        assert!(registry.rule(&BodyType::new("xml")).is_none());
        assert!(registry.rule(&BodyType::new("form2")).is_none());
        assert!(registry.rule(&BodyType::new("missing")).is_none());
    }

    #[test]
    fn test_rule_follows_merged_fields() {
        let mut registry = MaskRegistry::parse("json:password");
        registry.insert("json", ["token"]);

        let rule = registry.rule(&BodyType::json()).unwrap();
        assert_eq!(rule.fields(), ["password", "token"]);
        assert_eq!(
            rule.mask(Some(r#"{"password":"p","token":"t"}"#)),
            r#"{"password":"<MASKED>","token":"<MASKED>"}"#
        );
    }

    #[derive(Deserialize)]
    struct Holder {
        keys: MaskRegistry,
    }

    #[test]
    fn test_deserialize_from_descriptor_and_table() {
        let from_descriptor: Holder =
            toml::from_str(r#"keys = "json:password,token;form:secret""#).unwrap();
        let from_table: Holder = toml::from_str(
            r#"
            [keys]
            json = ["password", "token"]
            form = ["secret"]
            "#,
        )
        .unwrap();
        assert_eq!(from_descriptor.keys, sample());
        assert_eq!(from_table.keys, sample());
    }
}
