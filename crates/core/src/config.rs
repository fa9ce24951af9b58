use std::env;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u16(profile: &str, key: &str, default: u16) -> u16 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub postgres: PostgresConfig,
    pub engine: EngineConfig,
    pub notify: NotifyConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `HEATWATCH_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("HEATWATCH_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            postgres: PostgresConfig::from_env_profiled(p),
            engine: EngineConfig::from_env_profiled(p),
            notify: NotifyConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  postgres:    host={}, db={}", self.postgres.host, self.postgres.database);
        tracing::info!(
            "  engine:      interval={}s, telemetry_batch={}",
            self.engine.interval_secs,
            self.engine.telemetry_batch_size
        );
        tracing::info!(
            "  notify:      webhook={}",
            if self.notify.webhook_url.is_some() { "configured" } else { "(none)" }
        );
    }
}

// ── PostgreSQL ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ssl_mode: String,
    pub max_connections: u32,
}

impl PostgresConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "PG_HOST", "localhost"),
            port: profiled_env_u16(p, "PG_PORT", 5432),
            database: profiled_env_or(p, "PG_DATABASE", "heatwatch"),
            username: profiled_env_opt(p, "PG_USERNAME"),
            password: profiled_env_opt(p, "PG_PASSWORD"),
            ssl_mode: profiled_env_or(p, "PG_SSL_MODE", "prefer"),
            max_connections: profiled_env_u32(p, "PG_MAX_CONNECTIONS", 10),
        }
    }

    pub fn connection_string(&self) -> String {
        let user = self.username.as_deref().unwrap_or("postgres");
        let pass = self.password.as_deref().unwrap_or("");
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            user, pass, self.host, self.port, self.database, self.ssl_mode
        )
    }

    pub fn is_configured(&self) -> bool {
        self.username.is_some()
    }
}

// ── Evaluation engine ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Seconds between evaluation cycles when run as a worker.
    pub interval_secs: u64,
    /// Maximum device ids per latest-telemetry query.
    pub telemetry_batch_size: usize,
}

impl EngineConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            interval_secs: profiled_env_u64(p, "ENGINE_INTERVAL_SECS", 60).max(1),
            telemetry_batch_size: profiled_env_u32(p, "ENGINE_TELEMETRY_BATCH_SIZE", 200).max(1)
                as usize,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            telemetry_batch_size: 200,
        }
    }
}

// ── Notifications ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    pub webhook_url: Option<String>,
    pub webhook_method: Option<String>,
    pub subject_template: Option<String>,
    pub body_template: Option<String>,
}

impl NotifyConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            webhook_url: profiled_env_opt(p, "NOTIFY_WEBHOOK_URL"),
            webhook_method: profiled_env_opt(p, "NOTIFY_WEBHOOK_METHOD"),
            subject_template: profiled_env_opt(p, "NOTIFY_SUBJECT_TEMPLATE"),
            body_template: profiled_env_opt(p, "NOTIFY_BODY_TEMPLATE"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiled_key_takes_precedence() {
        std::env::set_var("HWTEST_PG_HOST", "db.prod.internal");
        std::env::set_var("PG_DATABASE", "heatwatch_default_test");
        let cfg = Config::for_profile("hwtest");
        assert_eq!(cfg.profile, "HWTEST");
        assert_eq!(cfg.postgres.host, "db.prod.internal");
        assert_eq!(cfg.postgres.database, "heatwatch_default_test");
        std::env::remove_var("HWTEST_PG_HOST");
        std::env::remove_var("PG_DATABASE");
    }

    #[test]
    fn engine_values_are_clamped() {
        std::env::set_var("HWCLAMP_ENGINE_INTERVAL_SECS", "0");
        std::env::set_var("HWCLAMP_ENGINE_TELEMETRY_BATCH_SIZE", "0");
        let cfg = Config::for_profile("HWCLAMP");
        assert_eq!(cfg.engine.interval_secs, 1);
        assert_eq!(cfg.engine.telemetry_batch_size, 1);
        std::env::remove_var("HWCLAMP_ENGINE_INTERVAL_SECS");
        std::env::remove_var("HWCLAMP_ENGINE_TELEMETRY_BATCH_SIZE");
    }

    #[test]
    fn connection_string_defaults_user() {
        let pg = PostgresConfig {
            host: "localhost".to_string(),
            port: 5432,
            database: "heatwatch".to_string(),
            username: None,
            password: None,
            ssl_mode: "prefer".to_string(),
            max_connections: 5,
        };
        assert_eq!(
            pg.connection_string(),
            "postgres://postgres:@localhost:5432/heatwatch?sslmode=prefer"
        );
        assert!(!pg.is_configured());
    }
}
