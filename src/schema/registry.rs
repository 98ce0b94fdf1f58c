//! Config schema registry
//!
//! One typed table per (task type, stage type) pair: local field name,
//! default value, wire key and wire conversion. This is the single
//! source of truth for both default-config derivation and the
//! local/wire field-name mapping.

use crate::core::task::{StageType, TaskType};
use serde_json::Value;
use std::collections::BTreeMap;

/// A stage configuration in either local or wire form
pub type ConfigMap = BTreeMap<String, Value>;

/// Default value for a schema field
#[derive(Debug, Clone, Copy)]
pub enum FieldDefault {
    Str(&'static str),
    Bool(bool),
}

impl FieldDefault {
    fn to_value(self) -> Value {
        match self {
            FieldDefault::Str(s) => Value::String(s.to_string()),
            FieldDefault::Bool(b) => Value::Bool(b),
        }
    }
}

/// How a local value is rewritten into its wire form
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireConvert {
    /// Value carried over unchanged
    Verbatim,
    /// Architecture prefixed as `linux/<arch>`
    Platform,
    /// Port carried as an integer
    Port,
    /// Boolean carried as `yes`/`no`
    Ingress,
    /// CPU cores scaled to millicores (`2` -> `2000m`)
    CpuMillicores,
    /// Memory GiB scaled to MiB (`4` -> `4096Mi`)
    MemoryMib,
}

/// One field of a stage schema
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    /// Human-readable local field name
    pub local: &'static str,

    /// Fixed uppercase key expected by the remote store; `None` for
    /// local-only fields that are never synchronized
    pub wire: Option<&'static str>,

    pub default: FieldDefault,

    pub convert: WireConvert,
}

impl FieldSpec {
    const fn plain(local: &'static str, wire: &'static str, default: &'static str) -> Self {
        Self {
            local,
            wire: Some(wire),
            default: FieldDefault::Str(default),
            convert: WireConvert::Verbatim,
        }
    }

    const fn local_only(local: &'static str, default: &'static str) -> Self {
        Self {
            local,
            wire: None,
            default: FieldDefault::Str(default),
            convert: WireConvert::Verbatim,
        }
    }

    const fn converted(
        local: &'static str,
        wire: &'static str,
        default: FieldDefault,
        convert: WireConvert,
    ) -> Self {
        Self {
            local,
            wire: Some(wire),
            default,
            convert,
        }
    }

    /// Local value for this field, falling back to the default when the
    /// stored value is absent or an empty string.
    fn local_or_default(&self, config: &ConfigMap) -> Value {
        match config.get(self.local) {
            Some(Value::String(s)) if s.is_empty() => self.default.to_value(),
            Some(v) if !v.is_null() => v.clone(),
            _ => self.default.to_value(),
        }
    }

    fn to_wire_value(&self, config: &ConfigMap) -> Value {
        let local = self.local_or_default(config);
        match self.convert {
            WireConvert::Verbatim => local,
            WireConvert::Platform => {
                let arch = as_string(&local);
                Value::String(format!("linux/{arch}"))
            }
            WireConvert::Port => Value::from(parse_int(&local).unwrap_or(80)),
            WireConvert::Ingress => {
                let on = matches!(&local, Value::Bool(true))
                    || matches!(&local, Value::String(s) if s == "true" || s == "yes");
                Value::String(if on { "yes" } else { "no" }.to_string())
            }
            WireConvert::CpuMillicores => match parse_int(&local) {
                Some(n) => Value::String(format!("{}m", n * 1000)),
                None => Value::String("1000m".to_string()),
            },
            WireConvert::MemoryMib => match parse_int(&local) {
                Some(n) => Value::String(format!("{}Mi", n * 1024)),
                None => Value::String("1024Mi".to_string()),
            },
        }
    }

    /// Reverse a wire value into local form. Used when re-deriving a
    /// local config from data the remote store returns.
    fn to_local_value(&self, wire: &Value) -> Value {
        match self.convert {
            WireConvert::Verbatim => wire.clone(),
            WireConvert::Platform => {
                let s = as_string(wire);
                Value::String(s.strip_prefix("linux/").unwrap_or(&s).to_string())
            }
            WireConvert::Port => match parse_int(wire) {
                Some(n) => Value::String(n.to_string()),
                None => self.default.to_value(),
            },
            WireConvert::Ingress => Value::Bool(as_string(wire) == "yes"),
            WireConvert::CpuMillicores => match as_string(wire).strip_suffix('m').and_then(|s| s.parse::<i64>().ok()) {
                Some(n) => Value::String((n / 1000).to_string()),
                None => self.default.to_value(),
            },
            WireConvert::MemoryMib => match as_string(wire).strip_suffix("Mi").and_then(|s| s.parse::<i64>().ok()) {
                Some(n) => Value::String((n / 1024).to_string()),
                None => self.default.to_value(),
            },
        }
    }
}

fn as_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_int(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

const MAVEN_COMPILE: &[FieldSpec] = &[
    FieldSpec::local_only("mavenVersion", "3.8.1"),
    FieldSpec::plain("jdkVersion", "JDKVERSION", "8"),
    FieldSpec::plain("codePath", "CODEPATH", ""),
    FieldSpec::plain("artifactPath", "TARGETDIR", "target"),
    FieldSpec::plain("artifactFormat", "BUILDFORMAT", "jar"),
    FieldSpec::plain(
        "buildCommand",
        "BUILDCMD",
        "mvn clean package -Dmaven.test.skip=true -U",
    ),
];

const NPM_COMPILE: &[FieldSpec] = &[
    FieldSpec::plain("nodeVersion", "NODEVERSION", "14.18"),
    FieldSpec::plain("pnpmVersion", "PNPMVERSION", "7.33.7"),
    FieldSpec::plain("codePath", "CODEPATH", ""),
    FieldSpec::plain("distPath", "NPMDIR", "dist"),
    FieldSpec::plain("buildCommand", "BUILDCMD", "pnpm run build"),
];

const BUILD: &[FieldSpec] = &[
    FieldSpec::plain("repository", "HARBORNAME", "devops"),
    FieldSpec::plain("dockerfilePath", "BUILDDIR", "."),
    FieldSpec::converted(
        "architecture",
        "PLATFORM",
        FieldDefault::Str("amd64"),
        WireConvert::Platform,
    ),
    FieldSpec::plain("serviceName", "SERVICENAME", "$CI_PROJECT_NAME"),
];

const DEPLOY: &[FieldSpec] = &[
    FieldSpec::plain("namespace", "NAMESPACE", "app-dev"),
    FieldSpec::plain("serviceName", "SERVICENAME", "$CI_PROJECT_NAME"),
    FieldSpec::converted("port", "CTPORT", FieldDefault::Str("80"), WireConvert::Port),
    FieldSpec::plain("cluster", "K8S", "K8S_cmdicncf_jkyw"),
    FieldSpec::converted(
        "enableIngress",
        "INGRESS",
        FieldDefault::Bool(true),
        WireConvert::Ingress,
    ),
    FieldSpec::converted(
        "cpu",
        "LIMITSCPU",
        FieldDefault::Str("1"),
        WireConvert::CpuMillicores,
    ),
    FieldSpec::converted(
        "memory",
        "LIMITSMEM",
        FieldDefault::Str("1"),
        WireConvert::MemoryMib,
    ),
];

/// Schema table for a (task type, stage type) pair.
///
/// Unlisted pairs have no schema: callers get `None` and must treat it
/// as "nothing to synchronize", not as an error.
pub fn schema_for(task: TaskType, stage: StageType) -> Option<&'static [FieldSpec]> {
    match (task, stage) {
        (TaskType::Maven, StageType::Compile) => Some(MAVEN_COMPILE),
        (TaskType::Npm, StageType::Compile) => Some(NPM_COMPILE),
        (_, StageType::Build) => Some(BUILD),
        (_, StageType::Deploy) => Some(DEPLOY),
        (TaskType::Scan, StageType::Compile) => None,
    }
}

/// Default local-form config; empty for unmapped pairs.
pub fn default_config(task: TaskType, stage: StageType) -> ConfigMap {
    let Some(fields) = schema_for(task, stage) else {
        return ConfigMap::new();
    };
    fields
        .iter()
        .map(|f| (f.local.to_string(), f.default.to_value()))
        .collect()
}

/// Map a local-form config into wire form.
///
/// Returns `None` when the pair has no schema.
pub fn to_wire(task: TaskType, stage: StageType, config: &ConfigMap) -> Option<ConfigMap> {
    let fields = schema_for(task, stage)?;
    Some(
        fields
            .iter()
            .filter_map(|f| f.wire.map(|key| (key.to_string(), f.to_wire_value(config))))
            .collect(),
    )
}

/// Re-derive a local-form config from wire-form data.
///
/// Only wire-mapped fields can be recovered; local-only fields come
/// back with their defaults. Returns `None` when the pair has no schema.
pub fn from_wire(task: TaskType, stage: StageType, wire: &ConfigMap) -> Option<ConfigMap> {
    let fields = schema_for(task, stage)?;
    Some(
        fields
            .iter()
            .map(|f| {
                let value = match f.wire.and_then(|key| wire.get(key)) {
                    Some(v) => f.to_local_value(v),
                    None => f.default.to_value(),
                };
                (f.local.to_string(), value)
            })
            .collect(),
    )
}

/// Whether a stored config uses wire-form keys for this pair.
pub fn looks_like_wire(task: TaskType, stage: StageType, config: &ConfigMap) -> bool {
    schema_for(task, stage)
        .map(|fields| {
            fields
                .iter()
                .filter_map(|f| f.wire)
                .any(|key| config.contains_key(key))
        })
        .unwrap_or(false)
}
