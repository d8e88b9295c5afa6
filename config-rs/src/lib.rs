//! config-rs/lib.rs
//! Shared configuration utilities for the RCA services.
//! Provides `.env` loading, typed environment lookups and port/address management.

use std::env;
use std::fmt::Display;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Once;

static DOTENV: Once = Once::new();

/// Load variables from a `.env` file in the working directory, once per process.
///
/// A missing file is not an error; variables already present in the
/// environment are never overwritten.
pub fn load_dotenv() {
    DOTENV.call_once(|| match dotenv::dotenv() {
        Ok(path) => log::debug!("Loaded environment from {}", path.display()),
        Err(_) => log::debug!("No .env file found, using process environment only"),
    });
}

/// Read and parse an environment variable, falling back to `default`.
///
/// Unset variables silently take the default; set but unparsable values are
/// logged and also take the default.
pub fn env_or<T>(name: &str, default: T) -> T
where
    T: FromStr + Display,
{
    match env::var(name) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                log::warn!("Invalid value {:?} in {}, using default {}", raw, name, default);
                default
            }
        },
        Err(_) => default,
    }
}

/// Read an optional string variable; empty values count as unset.
pub fn env_opt(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Read a boolean flag. Accepts "1", "true", "yes", "on" (case-insensitive)
/// as true and "0", "false", "no", "off" as false.
pub fn env_bool(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(val) => match val.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            other => {
                log::warn!("Invalid boolean {:?} in {}, using default {}", other, name, default);
                default
            }
        },
        Err(_) => default,
    }
}

/// Get service port from environment variables with proper fallback
///
/// # Arguments
/// * `service_name` - The name of the service (e.g., "RCA_GATEWAY")
/// * `default_port` - The default port to use if not specified in environment
pub fn get_service_port(service_name: &str, default_port: u16) -> u16 {
    let var_name = format!("{}_SERVICE_PORT", service_name.to_uppercase());
    env_or(&var_name, default_port)
}

/// Create a SocketAddr for binding a service
///
/// `<SERVICE>_SERVICE_ADDR` overrides everything and may be given either as
/// `host:port` or as `http://host:port`. Otherwise the service binds on all
/// interfaces at the port resolved by [`get_service_port`].
pub fn get_bind_address(service_name: &str, default_port: u16) -> SocketAddr {
    let var_name = format!("{}_SERVICE_ADDR", service_name.to_uppercase());

    if let Ok(addr_str) = env::var(&var_name) {
        let trimmed = addr_str
            .strip_prefix("http://")
            .or_else(|| addr_str.strip_prefix("https://"))
            .unwrap_or(&addr_str);
        match trimmed.trim_end_matches('/').parse::<SocketAddr>() {
            Ok(addr) => return addr,
            Err(_) => log::warn!("Invalid address format in {}, using default", var_name),
        }
    }

    let port = get_service_port(service_name, default_port);
    SocketAddr::from(([0, 0, 0, 0], port))
}

/// Get client connection address for connecting to a service
///
/// # Arguments
/// * `service_name` - The name of the service
/// * `default_port` - The default port to use if not specified in environment
/// * `host` - Optional host to use if not specified in environment (default: "localhost")
pub fn get_client_address(service_name: &str, default_port: u16, host: Option<&str>) -> String {
    let addr_var_name = format!("{}_SERVICE_ADDR", service_name.to_uppercase());

    if let Ok(addr) = env::var(&addr_var_name) {
        return addr;
    }

    let port = get_service_port(service_name, default_port);
    let host = host.unwrap_or("localhost");
    format!("http://{}:{}", host, port)
}

/// Get service name for logging and monitoring
pub fn get_formatted_service_name(service_name: &str) -> String {
    match service_name {
        "RCA_GATEWAY" => "rca-gateway".to_string(),
        "LOG_STORE" => "log-store".to_string(),
        "METRICS_STORE" => "metrics-store".to_string(),
        "LLM" => "reasoning-service".to_string(),
        _ => format!("{}-service", service_name.to_lowercase().replace('_', "-")),
    }
}
