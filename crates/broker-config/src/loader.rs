use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::schema::Config;

/// Ordered list of config file locations searched from lowest to highest
/// priority; later files override earlier ones. Mirrors the search-path
/// shape used elsewhere in this style of workspace, adapted to a single
/// TOML file per location instead of YAML.
fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    paths.push(PathBuf::from("/etc/brokerd/config.toml"));

    if let Some(cfg) = dirs::config_dir() {
        paths.push(cfg.join("brokerd/config.toml"));
    }

    paths.push(PathBuf::from(".brokerd.toml"));
    paths.push(PathBuf::from("brokerd.toml"));

    paths
}

/// Loads configuration: struct defaults, merged with any config files found
/// on [`config_search_paths`] (each later file's tables win over earlier
/// ones), merged with an explicit `--config` path if given, then overridden
/// field-by-field by `BROKERD_*` environment variables.
pub fn load(explicit_path: Option<&Path>) -> anyhow::Result<Config> {
    let mut merged = toml::Value::Table(toml::Table::new());

    for path in config_search_paths() {
        if path.is_file() {
            tracing::debug!(path = %path.display(), "loading config layer");
            merge_file(&mut merged, &path)?;
        }
    }

    if let Some(path) = explicit_path {
        tracing::debug!(path = %path.display(), "loading explicit config");
        merge_file(&mut merged, path)?;
    }

    let mut config: Config = merged.try_into().unwrap_or_default();
    apply_env_overrides(&mut config);
    Ok(config)
}

fn merge_file(dst: &mut toml::Value, path: &Path) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let layer: toml::Value = toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    merge_toml(dst, layer);
    Ok(())
}

/// Deep-merge `src` into `dst`; `src` wins on scalar conflicts.
fn merge_toml(dst: &mut toml::Value, src: toml::Value) {
    match (dst, src) {
        (toml::Value::Table(d), toml::Value::Table(s)) => {
            for (k, v) in s {
                let entry = d.entry(k).or_insert(toml::Value::Table(toml::Table::new()));
                merge_toml(entry, v);
            }
        }
        (dst, src) => *dst = src,
    }
}

fn apply_env_overrides(config: &mut Config) {
    if let Some(v) = env_var("MODEL") {
        config.model = v;
    }
    if let Some(v) = env_var("ENDPOINT") {
        config.endpoint = v;
    }
    if let Some(v) = env_var("API_KEY") {
        config.api_key = Some(v);
    }
    apply_parsed("MAX_TOKENS", |v| config.max_tokens = Some(v));
    apply_parsed("TEMPERATURE", |v| config.temperature = v);
    apply_parsed("TOKEN_BUDGET", |v| config.token_budget = Some(v));
    apply_parsed("CONTEXT_MAX_TOKENS", |v| config.context_max_tokens = v);
    apply_parsed("RESERVED_FOR_RESPONSE", |v| config.reserved_for_response = v);
    apply_parsed("RECENT_MESSAGES", |v| config.recent_messages = v);
    apply_parsed("SUMMARIZE_AFTER", |v| config.summarize_after = v);
    apply_parsed("MAX_RAG_TOKENS", |v| config.max_rag_tokens = v);
    apply_parsed("MAX_RAG_CHUNKS", |v| config.max_rag_chunks = v);
    if let Some(v) = env_var("SESSION_DB_PATH") {
        config.session_db_path = v;
    }
    if let Some(v) = env_var("INDEX_DB_PATH") {
        config.index_db_path = v;
    }
    if let Some(v) = env_var("LOG_LEVEL") {
        config.log_level = v;
    }
}

fn env_var(suffix: &str) -> Option<String> {
    std::env::var(format!("BROKERD_{suffix}")).ok()
}

/// Parses a numeric env var override, warning and leaving the field
/// untouched if the value doesn't parse — malformed overrides should not
/// be allowed to crash startup.
fn apply_parsed<T: std::str::FromStr>(suffix: &str, apply: impl FnOnce(T)) {
    let Some(raw) = env_var(suffix) else { return };
    match raw.parse::<T>() {
        Ok(value) => apply(value),
        Err(_) => tracing::warn!(var = %format!("BROKERD_{suffix}"), value = %raw, "ignoring malformed env override"),
    }
}
