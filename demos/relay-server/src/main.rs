//! Standalone clipboard relay server.
//!
//! Configured from the environment:
//!
//! | Variable                       | Default          |
//! |--------------------------------|------------------|
//! | `CLIPBRIDGE_ADDR`              | `0.0.0.0:8080`   |
//! | `CLIPBRIDGE_ROOM_TTL_SECS`     | `86400`          |
//! | `CLIPBRIDGE_SWEEP_SECS`        | `300`            |
//! | `CLIPBRIDGE_MAX_MEMBERS`       | unlimited        |
//! | `CLIPBRIDGE_MAX_PAYLOAD_BYTES` | `262144`         |
//! | `RUST_LOG`                     | `clipbridge=info,relay_server=info` |

use std::error::Error;
use std::str::FromStr;
use std::time::Duration;

use clipbridge::prelude::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_ADDR: &str = "0.0.0.0:8080";

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clipbridge=info,relay_server=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let lookup = |name: &str| std::env::var(name).ok();
    let addr = lookup("CLIPBRIDGE_ADDR").unwrap_or_else(|| DEFAULT_ADDR.to_string());
    let config = relay_config_from(lookup)?;

    tracing::info!(
        %addr,
        ttl_secs = config.room_ttl.as_secs(),
        sweep_secs = config.sweep_interval.as_secs(),
        max_members = ?config.max_members,
        max_payload_bytes = config.max_payload_bytes,
        "starting clipboard relay"
    );

    let server = ClipbridgeServer::builder()
        .bind(&addr)
        .relay_config(config)
        .build()
        .await?;

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
        })
        .await?;

    tracing::info!("relay stopped");
    Ok(())
}

/// Builds a `RelayConfig` from environment-style lookups. Unset variables
/// keep their defaults; malformed ones are an error.
fn relay_config_from(
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<RelayConfig, Box<dyn Error>> {
    let mut config = RelayConfig::default();

    if let Some(secs) = parse_var::<u64>(&lookup, "CLIPBRIDGE_ROOM_TTL_SECS")? {
        config.room_ttl = Duration::from_secs(secs);
    }
    if let Some(secs) = parse_var::<u64>(&lookup, "CLIPBRIDGE_SWEEP_SECS")? {
        config.sweep_interval = Duration::from_secs(secs);
    }
    if let Some(max) = parse_var::<usize>(&lookup, "CLIPBRIDGE_MAX_MEMBERS")? {
        config.max_members = Some(max);
    }
    if let Some(bytes) = parse_var::<usize>(&lookup, "CLIPBRIDGE_MAX_PAYLOAD_BYTES")? {
        config.max_payload_bytes = bytes;
    }

    Ok(config)
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>, Box<dyn Error>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| format!("{name}={raw:?}: {e}").into()),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_in(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_unset_vars_keep_defaults() {
        let config = relay_config_from(lookup_in(&[])).unwrap();
        assert_eq!(config, RelayConfig::default());
    }

    #[test]
    fn test_vars_override_defaults() {
        let config = relay_config_from(lookup_in(&[
            ("CLIPBRIDGE_ROOM_TTL_SECS", "60"),
            ("CLIPBRIDGE_SWEEP_SECS", " 5 "),
            ("CLIPBRIDGE_MAX_MEMBERS", "4"),
            ("CLIPBRIDGE_MAX_PAYLOAD_BYTES", "1024"),
        ]))
        .unwrap();
        assert_eq!(config.room_ttl, Duration::from_secs(60));
        assert_eq!(config.sweep_interval, Duration::from_secs(5));
        assert_eq!(config.max_members, Some(4));
        assert_eq!(config.max_payload_bytes, 1024);
    }

    #[test]
    fn test_malformed_var_is_error() {
        let err = relay_config_from(lookup_in(&[("CLIPBRIDGE_SWEEP_SECS", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("CLIPBRIDGE_SWEEP_SECS"));
    }

    #[tokio::test]
    async fn test_relay_starts_on_random_port() {
        let server = ClipbridgeServer::builder()
            .bind("127.0.0.1:0")
            .relay_config(relay_config_from(lookup_in(&[])).unwrap())
            .build()
            .await
            .expect("server should build");
        assert_ne!(server.local_addr().unwrap().port(), 0);
        server.relay().shutdown().await;
    }
}
