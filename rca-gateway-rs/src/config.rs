// rca-gateway-rs/src/config.rs

use std::net::SocketAddr;

use config_rs::{env_bool, env_opt, env_or, get_bind_address, get_formatted_service_name};
use tracing::warn;

pub const SERVICE_KEY: &str = "RCA_GATEWAY";
pub const DEFAULT_PORT: u16 = 8090;
pub const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024;

/// Process-level settings for the HTTP front end.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub service_name: String,
    pub bind_addr: SocketAddr,
    pub max_body_bytes: usize,
    /// Emit logs as JSON lines instead of human-readable text.
    pub json_logs: bool,
    /// Serve Prometheus metrics on this address when set.
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            service_name: get_formatted_service_name(SERVICE_KEY),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            json_logs: false,
            metrics_addr: None,
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        let json_logs = env_opt("RCA_LOG_FORMAT")
            .map(|f| f.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let metrics_addr = env_opt("RCA_METRICS_ADDR").and_then(|raw| match raw.parse() {
            Ok(addr) => Some(addr),
            Err(_) => {
                warn!(value = %raw, "ignoring invalid RCA_METRICS_ADDR");
                None
            }
        });

        Self {
            bind_addr: get_bind_address(SERVICE_KEY, DEFAULT_PORT),
            max_body_bytes: env_or("RCA_MAX_BODY_BYTES", DEFAULT_MAX_BODY_BYTES),
            json_logs: json_logs || env_bool("RCA_LOG_JSON", false),
            metrics_addr,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.service_name, "rca-gateway");
        assert_eq!(config.bind_addr.port(), 8090);
        assert_eq!(config.max_body_bytes, 65_536);
        assert!(config.metrics_addr.is_none());
    }
}
