//! Configuration snapshot, schema and the single-writer store.
//!
//! # Responsibilities
//! - Hold the compiled-in schema (known keys, their types and defaults)
//! - Publish immutable snapshots through an atomic pointer swap
//! - Merge partial documents key by key and report what changed
//!
//! # Design Decisions
//! - Readers load an `Arc<ConfigSnapshot>` without locking
//! - Merges are serialized by a writer lock and published in one swap
//! - Unknown keys are ignored unless the policy says otherwise

use arc_swap::ArcSwap;
use serde::Serialize;
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

/// Key of the flag that gates the user listing by default.
pub const FEATURE_X_ENABLED: &str = "featureXEnabled";

/// Key of the upstream API URL setting.
pub const API_URL: &str = "apiUrl";

/// A scalar configuration value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Number(Number),
    String(String),
}

/// The type of a [`ConfigValue`], used for schema checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Bool,
    Number,
    String,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Bool => write!(f, "bool"),
            ValueKind::Number => write!(f, "number"),
            ValueKind::String => write!(f, "string"),
        }
    }
}

impl ConfigValue {
    /// Convert a JSON value, rejecting null, arrays and objects.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(ConfigValue::Bool(*b)),
            Value::Number(n) => Some(ConfigValue::Number(n.clone())),
            Value::String(s) => Some(ConfigValue::String(s.clone())),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            ConfigValue::Bool(_) => ValueKind::Bool,
            ConfigValue::Number(_) => ValueKind::Number,
            ConfigValue::String(_) => ValueKind::String,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Bool(b) => write!(f, "{}", b),
            ConfigValue::Number(n) => write!(f, "{}", n),
            ConfigValue::String(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        ConfigValue::Bool(value)
    }
}

impl From<i32> for ConfigValue {
    fn from(value: i32) -> Self {
        ConfigValue::Number(Number::from(value))
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        ConfigValue::Number(Number::from(value))
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::String(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        ConfigValue::String(value)
    }
}

/// Known configuration keys with their default values.
///
/// The default's type is the key's declared type: an upstream value of a
/// different type is never adopted.
#[derive(Debug, Clone)]
pub struct ConfigSchema {
    defaults: BTreeMap<String, ConfigValue>,
}

impl ConfigSchema {
    /// An empty schema. Mostly useful with [`ConfigSchema::with_key`].
    pub fn empty() -> Self {
        Self {
            defaults: BTreeMap::new(),
        }
    }

    /// Declare a key with its default value.
    pub fn with_key(mut self, key: impl Into<String>, default: impl Into<ConfigValue>) -> Self {
        self.defaults.insert(key.into(), default.into());
        self
    }

    pub fn kind_of(&self, key: &str) -> Option<ValueKind> {
        self.defaults.get(key).map(ConfigValue::kind)
    }

    pub fn defaults(&self) -> &BTreeMap<String, ConfigValue> {
        &self.defaults
    }
}

impl Default for ConfigSchema {
    fn default() -> Self {
        Self::empty()
            .with_key(FEATURE_X_ENABLED, false)
            .with_key(API_URL, "https://api.example.com")
    }
}

/// What to do with keys the schema does not declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownKeyPolicy {
    #[default]
    Ignore,
    Adopt,
}

/// A point-in-time view of the configuration. Never mutated once published.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigSnapshot {
    values: BTreeMap<String, ConfigValue>,
    revision: u64,
    #[serde(skip)]
    updated_at: Option<SystemTime>,
}

impl ConfigSnapshot {
    /// Snapshot holding only the schema defaults, at revision 0.
    pub fn from_schema(schema: &ConfigSchema) -> Self {
        Self {
            values: schema.defaults.clone(),
            revision: 0,
            updated_at: None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.values.get(key)
    }

    /// Whether a boolean flag is on. Missing or non-boolean keys count as off.
    pub fn is_enabled(&self, key: &str) -> bool {
        self.values
            .get(key)
            .and_then(ConfigValue::as_bool)
            .unwrap_or(false)
    }

    pub fn values(&self) -> &BTreeMap<String, ConfigValue> {
        &self.values
    }

    /// Number of merges that changed at least one value.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// When the last changing merge was published, if any.
    pub fn updated_at(&self) -> Option<SystemTime> {
        self.updated_at
    }

    /// Apply `doc` on top of this snapshot, returning the candidate values
    /// and a report. Keys absent from `doc` are carried over untouched.
    fn merge(
        &self,
        doc: &Map<String, Value>,
        schema: &ConfigSchema,
        policy: UnknownKeyPolicy,
    ) -> (BTreeMap<String, ConfigValue>, MergeReport) {
        let mut values = self.values.clone();
        let mut report = MergeReport::default();

        for (key, raw) in doc {
            let Some(value) = ConfigValue::from_json(raw) else {
                report.ignored.push(IgnoredKey {
                    key: key.clone(),
                    reason: IgnoreReason::NotScalar,
                });
                continue;
            };

            match schema.kind_of(key) {
                Some(expected) if expected != value.kind() => {
                    report.ignored.push(IgnoredKey {
                        key: key.clone(),
                        reason: IgnoreReason::TypeMismatch {
                            expected,
                            found: value.kind(),
                        },
                    });
                    continue;
                }
                None if policy == UnknownKeyPolicy::Ignore => {
                    report.ignored.push(IgnoredKey {
                        key: key.clone(),
                        reason: IgnoreReason::Unknown,
                    });
                    continue;
                }
                _ => {}
            }

            let old = values.insert(key.clone(), value.clone());
            if old.as_ref() != Some(&value) {
                report.changes.push(ConfigChange {
                    key: key.clone(),
                    old,
                    new: value,
                });
            }
        }

        (values, report)
    }
}

/// A single key whose value changed during a merge.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigChange {
    pub key: String,
    pub old: Option<ConfigValue>,
    pub new: ConfigValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IgnoreReason {
    Unknown,
    NotScalar,
    TypeMismatch { expected: ValueKind, found: ValueKind },
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IgnoreReason::Unknown => write!(f, "unknown key"),
            IgnoreReason::NotScalar => write!(f, "value is not a scalar"),
            IgnoreReason::TypeMismatch { expected, found } => {
                write!(f, "expected {}, found {}", expected, found)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IgnoredKey {
    pub key: String,
    pub reason: IgnoreReason,
}

/// Outcome of applying one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeReport {
    pub changes: Vec<ConfigChange>,
    pub ignored: Vec<IgnoredKey>,
}

/// The writable side of the configuration. Owned by the synchronizer.
pub struct ConfigStore {
    current: Arc<ArcSwap<ConfigSnapshot>>,
    schema: ConfigSchema,
    policy: UnknownKeyPolicy,
    write_lock: Mutex<()>,
}

impl ConfigStore {
    pub fn new(schema: ConfigSchema, policy: UnknownKeyPolicy) -> Self {
        let initial = ConfigSnapshot::from_schema(&schema);
        Self {
            current: Arc::new(ArcSwap::from_pointee(initial)),
            schema,
            policy,
            write_lock: Mutex::new(()),
        }
    }

    /// A read-only view onto this store.
    pub fn handle(&self) -> ConfigHandle {
        ConfigHandle {
            current: self.current.clone(),
        }
    }

    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        self.current.load_full()
    }

    pub fn schema(&self) -> &ConfigSchema {
        &self.schema
    }

    /// Merge `doc` and publish the result in a single swap.
    ///
    /// A merge that changes nothing publishes nothing and keeps the revision.
    pub fn merge(&self, doc: &Map<String, Value>) -> MergeReport {
        // The guard protects no data, so a poisoned lock is still usable.
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let current = self.current.load_full();
        let (values, report) = current.merge(doc, &self.schema, self.policy);

        if !report.changes.is_empty() {
            self.current.store(Arc::new(ConfigSnapshot {
                values,
                revision: current.revision + 1,
                updated_at: Some(SystemTime::now()),
            }));
        }

        report
    }
}

/// Cheap, cloneable, read-only access to the live configuration.
#[derive(Clone)]
pub struct ConfigHandle {
    current: Arc<ArcSwap<ConfigSnapshot>>,
}

impl ConfigHandle {
    /// The current snapshot. Holding it pins that version, later merges
    /// publish new snapshots without touching this one.
    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        self.current.load_full()
    }

    pub fn get(&self, key: &str) -> Option<ConfigValue> {
        self.current.load().get(key).cloned()
    }

    pub fn is_enabled(&self, key: &str) -> bool {
        self.current.load().is_enabled(key)
    }

    pub fn revision(&self) -> u64 {
        self.current.load().revision()
    }
}
