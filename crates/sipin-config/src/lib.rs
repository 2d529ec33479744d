//! sipin-config
//!
//! Layered YAML configuration for the SIP ingest state updater.
//!
//! - `load_layered_yaml*` merges documents (later overrides earlier), rejects
//!   secret-looking literals, and yields canonical JSON plus its SHA-256.
//! - [`AppConfig::from_json`] validates the merged document into typed
//!   sections. Clients are constructed only from an `AppConfig`.
//! - [`report_unused_keys`] flags config leaves no section reads.
//! - [`secrets`] resolves credentials from env vars named in the config.

pub mod secrets;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;

/// Known secret-like prefixes. If any leaf string value in the effective
/// config starts with one of these, loading aborts with CONFIG_SECRET_DETECTED.
const SECRET_PREFIXES: &[&str] = &[
    "sk-",         // OpenAI style
    "AKIA",        // AWS access key ID
    "-----BEGIN",  // PEM private keys
    "ghp_",        // GitHub PAT
    "glpat-",      // GitLab PAT
    "xoxb-",       // Slack bot token
    "postgres://", // connection URLs embed credentials
    "postgresql://",
];

// ---------------------------------------------------------------------------
// Typed sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbConfig {
    /// Ingest table, `table` or `schema.table`.
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Env var NAME holding the Postgres URL.
    #[serde(default = "default_db_url_env")]
    pub url_env: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaHavenKeysEnv {
    #[serde(default = "default_mh_client_id_env")]
    pub client_id: String,
    #[serde(default = "default_mh_client_secret_env")]
    pub client_secret: String,
    #[serde(default = "default_mh_username_env")]
    pub username: String,
    #[serde(default = "default_mh_password_env")]
    pub password: String,
}

impl Default for MediaHavenKeysEnv {
    fn default() -> Self {
        Self {
            client_id: default_mh_client_id_env(),
            client_secret: default_mh_client_secret_env(),
            username: default_mh_username_env(),
            password: default_mh_password_env(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaHavenConfig {
    /// Base URL, e.g. `https://archief.example.org`.
    pub url: String,
    /// Records requested per search page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default)]
    pub keys_env: MediaHavenKeysEnv,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollerConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            table: default_table(),
            max_connections: default_max_connections(),
            url_env: default_db_url_env(),
        }
    }
}

fn default_table() -> String {
    "sipin_sips".to_string()
}
fn default_max_connections() -> u32 {
    4
}
fn default_db_url_env() -> String {
    "SIPIN_DATABASE_URL".to_string()
}
fn default_mh_client_id_env() -> String {
    "MEDIAHAVEN_CLIENT_ID".to_string()
}
fn default_mh_client_secret_env() -> String {
    "MEDIAHAVEN_CLIENT_SECRET".to_string()
}
fn default_mh_username_env() -> String {
    "MEDIAHAVEN_USERNAME".to_string()
}
fn default_mh_password_env() -> String {
    "MEDIAHAVEN_PASSWORD".to_string()
}
fn default_page_size() -> u32 {
    100
}
fn default_interval_secs() -> u64 {
    3600
}
fn default_true() -> bool {
    true
}
fn default_bind() -> String {
    "127.0.0.1:8090".to_string()
}

/// Validated application config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub db: DbConfig,
    pub mediahaven: MediaHavenConfig,
    #[serde(default)]
    pub poller: PollerConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

impl AppConfig {
    /// Deserialize and validate the merged config document.
    pub fn from_json(config_json: &Value) -> Result<Self> {
        if config_json.pointer("/mediahaven").is_none() {
            bail!("CONFIG_INVALID: no mediahaven section in app config");
        }
        let cfg: AppConfig = serde_json::from_value(config_json.clone())
            .context("CONFIG_INVALID: config does not match the expected shape")?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        let url = self.mediahaven.url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            bail!(
                "CONFIG_INVALID: /mediahaven/url must be an http(s) URL, got '{}'",
                url
            );
        }
        if !(1..=1000).contains(&self.mediahaven.page_size) {
            bail!(
                "CONFIG_INVALID: /mediahaven/page_size must be in 1..=1000, got {}",
                self.mediahaven.page_size
            );
        }
        if self.poller.interval_secs == 0 {
            bail!("CONFIG_INVALID: /poller/interval_secs must be > 0");
        }
        if self.db.max_connections == 0 {
            bail!("CONFIG_INVALID: /db/max_connections must be > 0");
        }
        if self.db.table.trim().is_empty() {
            bail!("CONFIG_INVALID: /db/table must not be empty");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Unused-key guard
// ---------------------------------------------------------------------------

/// JSON-pointer prefixes read by [`AppConfig`]. Any leaf outside them is unused.
pub const CONSUMED_POINTERS: &[&str] = &[
    "/db/table",
    "/db/max_connections",
    "/db/url_env",
    "/mediahaven/url",
    "/mediahaven/page_size",
    "/mediahaven/keys_env",
    "/poller/interval_secs",
    "/poller/enabled",
    "/http/bind",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnusedKeyReport {
    /// Minimal set of unused leaf pointers (sorted)
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeyReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

/// Produce an unused-key report.
/// If `policy == Fail`, returns an error when unused keys exist.
pub fn report_unused_keys(config_json: &Value, policy: UnusedKeyPolicy) -> Result<UnusedKeyReport> {
    let consumed: BTreeSet<&str> = CONSUMED_POINTERS.iter().copied().collect();

    let mut leaves: Vec<String> = Vec::new();
    collect_leaf_pointers(config_json, "", &mut leaves);

    let mut unused: Vec<String> = leaves
        .into_iter()
        .filter(|lp| !consumed.iter().any(|cp| is_prefix_pointer(cp, lp)))
        .collect();
    unused.sort();
    unused.dedup();

    let report = UnusedKeyReport {
        unused_leaf_pointers: unused,
    };

    if policy == UnusedKeyPolicy::Fail && !report.is_clean() {
        bail!(
            "CONFIG_UNUSED_KEYS: {} unused config leaf key(s) detected. First few: {:?}",
            report.unused_leaf_pointers.len(),
            report.unused_leaf_pointers.iter().take(12).collect::<Vec<_>>()
        );
    }

    Ok(report)
}

/// Return true if `prefix` is a JSON-pointer prefix of `leaf`.
/// "/a/b" consumes "/a/b/c" but NOT "/a/bc".
fn is_prefix_pointer(prefix: &str, leaf: &str) -> bool {
    if leaf == prefix {
        return true;
    }
    leaf.strip_prefix(prefix)
        .map(|rest| rest.starts_with('/'))
        .unwrap_or(false)
}

fn collect_leaf_pointers(v: &Value, prefix: &str, out: &mut Vec<String>) {
    match v {
        Value::Object(map) => {
            for (k, vv) in map.iter() {
                let next = format!("{}/{}", prefix, escape_pointer_token(k));
                collect_leaf_pointers(vv, &next, out);
            }
        }
        Value::Array(arr) => {
            for (i, vv) in arr.iter().enumerate() {
                let next = format!("{}/{}", prefix, i);
                collect_leaf_pointers(vv, &next, out);
            }
        }
        _ => {
            let p = if prefix.is_empty() {
                "/".to_string()
            } else {
                prefix.to_string()
            };
            out.push(p);
        }
    }
}

fn escape_pointer_token(s: &str) -> String {
    s.replace('~', "~0").replace('/', "~1")
}

// ---------------------------------------------------------------------------
// Layered loading
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

impl LoadedConfig {
    pub fn app_config(&self) -> Result<AppConfig> {
        AppConfig::from_json(&self.config_json)
    }
}

pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut docs: Vec<String> = Vec::new();
    for p in paths {
        let raw =
            fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}"))?;
        docs.push(raw);
    }

    let doc_refs: Vec<&str> = docs.iter().map(|s| s.as_str()).collect();
    load_layered_yaml_from_strings(&doc_refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    // Earlier docs are base, later docs override.
    let mut merged = serde_json::json!({});
    for raw in yaml_docs {
        let v_yaml: serde_yaml::Value = serde_yaml::from_str(raw).context("invalid yaml")?;
        let v_json = serde_json::to_value(v_yaml).context("yaml->json conversion failed")?;
        merged = deep_merge(merged, v_json);
    }

    enforce_no_secret_literals(&merged)?;

    let canonical_json = canonicalize_json(&merged)?;
    let config_hash = sha256_hex(canonical_json.as_bytes());
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

fn deep_merge(a: Value, b: Value) -> Value {
    match (a, b) {
        (Value::Object(mut a_map), Value::Object(b_map)) => {
            for (k, b_val) in b_map {
                let a_val = a_map.remove(&k).unwrap_or(Value::Null);
                a_map.insert(k, deep_merge(a_val, b_val));
            }
            Value::Object(a_map)
        }
        (_, b_other) => b_other,
    }
}

/// Serialize with keys sorted at every level so the hash does not depend on
/// the order keys appear in the YAML sources.
fn canonicalize_json(v: &Value) -> Result<String> {
    fn sorted(v: &Value) -> Value {
        match v {
            Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                let mut out = serde_json::Map::new();
                for k in keys {
                    out.insert(k.clone(), sorted(&map[k]));
                }
                Value::Object(out)
            }
            Value::Array(arr) => Value::Array(arr.iter().map(sorted).collect()),
            other => other.clone(),
        }
    }
    serde_json::to_string(&sorted(v)).context("canonical json serialize failed")
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn enforce_no_secret_literals(v: &Value) -> Result<()> {
    let mut leaves = Vec::new();
    collect_leaf_pointers(v, "", &mut leaves);

    for ptr in leaves {
        if let Some(s) = v.pointer(&ptr).and_then(Value::as_str) {
            if looks_like_secret(s) {
                bail!("CONFIG_SECRET_DETECTED leaf={} value=REDACTED", ptr);
            }
        }
    }
    Ok(())
}

fn looks_like_secret(s: &str) -> bool {
    let t = s.trim();
    if t.len() < 8 {
        return false;
    }
    SECRET_PREFIXES.iter().any(|p| t.starts_with(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = r#"
mediahaven:
  url: "https://archief.example.org"
"#;

    #[test]
    fn defaults_fill_every_optional_section() {
        let cfg = load_layered_yaml_from_strings(&[BASE])
            .unwrap()
            .app_config()
            .unwrap();
        assert_eq!(cfg.db.table, "sipin_sips");
        assert_eq!(cfg.db.max_connections, 4);
        assert_eq!(cfg.db.url_env, "SIPIN_DATABASE_URL");
        assert_eq!(cfg.mediahaven.page_size, 100);
        assert_eq!(cfg.mediahaven.keys_env.password, "MEDIAHAVEN_PASSWORD");
        assert_eq!(cfg.poller.interval_secs, 3600);
        assert!(cfg.poller.enabled);
        assert_eq!(cfg.http.bind, "127.0.0.1:8090");
    }

    #[test]
    fn later_layer_overrides_earlier() {
        let overlay = "poller:\n  interval_secs: 60\ndb:\n  table: ingest.sips\n";
        let cfg = load_layered_yaml_from_strings(&[BASE, overlay])
            .unwrap()
            .app_config()
            .unwrap();
        assert_eq!(cfg.poller.interval_secs, 60);
        assert_eq!(cfg.db.table, "ingest.sips");
        assert_eq!(cfg.mediahaven.url, "https://archief.example.org");
    }

    #[test]
    fn missing_mediahaven_section_is_rejected() {
        let loaded = load_layered_yaml_from_strings(&["poller:\n  interval_secs: 5\n"]).unwrap();
        let err = loaded.app_config().unwrap_err().to_string();
        assert!(err.contains("no mediahaven section"), "{err}");
    }

    #[test]
    fn zero_interval_is_rejected() {
        let overlay = "poller:\n  interval_secs: 0\n";
        let loaded = load_layered_yaml_from_strings(&[BASE, overlay]).unwrap();
        assert!(loaded.app_config().is_err());
    }

    #[test]
    fn non_http_url_is_rejected() {
        let loaded = load_layered_yaml_from_strings(&["mediahaven:\n  url: ftp://x\n"]).unwrap();
        let err = loaded.app_config().unwrap_err().to_string();
        assert!(err.contains("/mediahaven/url"), "{err}");
    }

    #[test]
    fn secret_literal_is_rejected_without_echoing_it() {
        let doc = "db:\n  url_env: \"postgres://u:hunter2@db/sip\"\n";
        let err = load_layered_yaml_from_strings(&[doc]).unwrap_err().to_string();
        assert!(err.contains("CONFIG_SECRET_DETECTED"));
        assert!(err.contains("/db/url_env"));
        assert!(!err.contains("hunter2"));
    }

    #[test]
    fn hash_is_independent_of_key_order() {
        let a = "poller:\n  enabled: true\n  interval_secs: 10\n";
        let b = "poller:\n  interval_secs: 10\n  enabled: true\n";
        let ha = load_layered_yaml_from_strings(&[a]).unwrap().config_hash;
        let hb = load_layered_yaml_from_strings(&[b]).unwrap().config_hash;
        assert_eq!(ha, hb);
        assert_eq!(ha.len(), 64);
    }

    #[test]
    fn prefix_pointer_respects_segment_boundary() {
        assert!(is_prefix_pointer("/mediahaven/keys_env", "/mediahaven/keys_env/password"));
        assert!(is_prefix_pointer("/http/bind", "/http/bind"));
        assert!(!is_prefix_pointer("/http/bind", "/http/binder"));
    }
}
