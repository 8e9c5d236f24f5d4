//! Probe configuration and report types.

use std::net::SocketAddr;
use std::time::Duration;

use serde::Serialize;

/// Host the probe targets by default.
pub const DEFAULT_HOST: &str = "web.whatsapp.com";

pub const DEFAULT_DNS_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_TCP_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_HTTPS_TIMEOUT: Duration = Duration::from_secs(8);

/// What to probe and how long each check may take.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub host: String,
    pub url: String,
    pub tcp_port: u16,
    /// Connect here instead of resolving `host` for the TCP check.
    pub tcp_addr: Option<SocketAddr>,
    pub dns_timeout: Duration,
    pub tcp_timeout: Duration,
    pub https_timeout: Duration,
}

impl ProbeConfig {
    /// Defaults aimed at `host`, with the HTTPS check on its root URL.
    pub fn for_host(host: impl Into<String>) -> Self {
        let host = host.into();
        Self {
            url: format!("https://{host}"),
            host,
            tcp_port: 443,
            tcp_addr: None,
            dns_timeout: DEFAULT_DNS_TIMEOUT,
            tcp_timeout: DEFAULT_TCP_TIMEOUT,
            https_timeout: DEFAULT_HTTPS_TIMEOUT,
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self::for_host(DEFAULT_HOST)
    }
}

/// One address returned by the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedAddress {
    pub address: String,
    /// 4 or 6.
    pub family: u8,
}

/// Outcome of a single check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addresses: Option<Vec<ResolvedAddress>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub ms: u64,
}

impl CheckResult {
    pub fn success(ms: u64) -> Self {
        Self {
            ok: true,
            addresses: None,
            status_code: None,
            error: None,
            ms,
        }
    }

    pub fn failure(error: impl Into<String>, ms: u64) -> Self {
        Self {
            ok: false,
            addresses: None,
            status_code: None,
            error: Some(error.into()),
            ms,
        }
    }
}

/// Combined result of a probe run.
#[derive(Debug, Clone, Serialize)]
pub struct NetReport {
    pub target: String,
    /// RFC 3339, UTC, millisecond precision.
    pub timestamp: String,
    pub dns: CheckResult,
    pub https: CheckResult,
    #[serde(rename = "tcp443")]
    pub tcp: CheckResult,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_config_targets_service() {
        let config = ProbeConfig::default();
        assert_eq!(config.host, "web.whatsapp.com");
        assert_eq!(config.url, "https://web.whatsapp.com");
        assert_eq!(config.tcp_port, 443);
        assert_eq!(config.https_timeout, Duration::from_secs(8));
    }

    #[test]
    fn report_wire_shape() {
        let report = NetReport {
            target: "web.whatsapp.com".into(),
            timestamp: "2026-01-01T00:00:00.000Z".into(),
            dns: CheckResult {
                addresses: Some(vec![ResolvedAddress {
                    address: "157.240.0.53".into(),
                    family: 4,
                }]),
                ..CheckResult::success(12)
            },
            https: CheckResult {
                status_code: Some(200),
                ..CheckResult::success(140)
            },
            tcp: CheckResult::failure("timeout", 5000),
        };

        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            json!({
                "target": "web.whatsapp.com",
                "timestamp": "2026-01-01T00:00:00.000Z",
                "dns": {
                    "ok": true,
                    "addresses": [{"address": "157.240.0.53", "family": 4}],
                    "ms": 12
                },
                "https": {"ok": true, "statusCode": 200, "ms": 140},
                "tcp443": {"ok": false, "error": "timeout", "ms": 5000}
            })
        );
    }
}
