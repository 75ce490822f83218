//! Explicit configuration structs, replacing the ad-hoc config objects the
//! distilled spec describes (spec.md §9 Design Notes). Defaults match spec.md
//! §6 "Environment" and the Open Questions resolved in DESIGN.md. Env var
//! prefix is `KPRIV_`, the way the teacher's daemon reads `MM_*`/CLI flags —
//! loading from the process environment happens in the `daemon`/`cli`
//! binaries, these structs themselves are plain data.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeRatePolicy {
    Low,
    Normal,
    High,
}

/// §4.2 Mixer Engine / §9: per-round policy for the multi-hop session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Delay between intermediate confirmation and payout. Open Question in
    /// spec.md §9 resolved in DESIGN.md: default 120s, documented range
    /// [60s, 600s].
    pub intermediate_delay_ms: u64,
    pub fee_rate_policy: FeeRatePolicy,
    /// Chain mass limit, spec.md §4.4.4.
    pub mass_limit: u64,
    /// Fixed CoinJoin round size, spec.md §1/§4.4.2.
    pub participant_count: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            intermediate_delay_ms: 120_000,
            fee_rate_policy: FeeRatePolicy::Normal,
            mass_limit: 100_000,
            participant_count: 10,
        }
    }
}

/// §4.6 `create_coinjoin` parameters, explicit rather than an ad-hoc object.
#[derive(Debug, Clone)]
pub struct CoinJoinConfig {
    pub amount_sompi: u64,
    pub destination: String,
}

/// §4.1 Chain Adapter connection policy.
#[derive(Debug, Clone)]
pub struct ChainAdapterConfig {
    pub node_url: String,
    /// Retry schedule per spec.md §4.1/§5: 1s, 2s, 4s, 8s, 16s, five attempts,
    /// 30s cumulative budget.
    pub reconnect_backoff: Vec<Duration>,
    pub max_retries: usize,
}

impl Default for ChainAdapterConfig {
    fn default() -> Self {
        ChainAdapterConfig {
            node_url: "ws://127.0.0.1:17110".to_string(),
            reconnect_backoff: vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8),
                Duration::from_secs(16),
            ],
            max_retries: 5,
        }
    }
}

/// §4.5 Coordinator Bridge wire policy.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub port: u16,
    pub path: String,
    pub round_idle_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            port: 8080,
            path: "/ws/coinjoin".to_string(),
            round_idle_timeout: Duration::from_secs(600),
        }
    }
}

/// §6 Persisted session format / database path.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub path: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        DbConfig {
            path: "kaspa_privacy.db".to_string(),
        }
    }
}

/// Reads `KPRIV_{suffix}` from the environment, falling back to `default`.
pub fn env_or<T: std::str::FromStr>(suffix: &str, default: T) -> T {
    std::env::var(format!("KPRIV_{suffix}"))
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

pub fn env_or_string(suffix: &str, default: &str) -> String {
    std::env::var(format!("KPRIV_{suffix}")).unwrap_or_else(|_| default.to_string())
}
