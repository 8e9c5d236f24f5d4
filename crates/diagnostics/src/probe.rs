//! Concurrent DNS, TCP and HTTPS checks.

use std::future::Future;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use chrono::{SecondsFormat, Utc};
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::types::{CheckResult, NetReport, ProbeConfig, ResolvedAddress};

const TIMEOUT_ERROR: &str = "timeout";

/// Runs reachability checks described by a [`ProbeConfig`].
pub struct DiagnosticsProbe {
    config: ProbeConfig,
    client: reqwest::Client,
}

impl DiagnosticsProbe {
    pub fn new(config: ProbeConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Runs all checks concurrently. Each is bounded by its own timeout.
    pub async fn run(&self) -> NetReport {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let (dns, tcp, https) = tokio::join!(self.check_dns(), self.check_tcp(), self.check_https());

        info!(
            target_host = %self.config.host,
            dns_ok = dns.ok,
            tcp_ok = tcp.ok,
            https_ok = https.ok,
            "network test finished"
        );

        NetReport {
            target: self.config.host.clone(),
            timestamp,
            dns,
            https,
            tcp,
        }
    }

    async fn check_dns(&self) -> CheckResult {
        let lookup = tokio::net::lookup_host((self.config.host.as_str(), 0));
        timed(self.config.dns_timeout, lookup, |addrs, ms| {
            let mut addresses: Vec<ResolvedAddress> = Vec::new();
            for addr in addrs {
                let resolved = resolved(addr.ip());
                if !addresses.contains(&resolved) {
                    addresses.push(resolved);
                }
            }
            CheckResult {
                addresses: Some(addresses),
                ..CheckResult::success(ms)
            }
        })
        .await
    }

    async fn check_tcp(&self) -> CheckResult {
        let connect = async {
            match self.config.tcp_addr {
                Some(addr) => TcpStream::connect(addr).await,
                None => TcpStream::connect((self.config.host.as_str(), self.config.tcp_port)).await,
            }
        };
        timed(self.config.tcp_timeout, connect, |_stream, ms| {
            CheckResult::success(ms)
        })
        .await
    }

    async fn check_https(&self) -> CheckResult {
        let request = self.client.get(&self.config.url).send();
        timed(self.config.https_timeout, request, |response, ms| {
            CheckResult {
                status_code: Some(response.status().as_u16()),
                ..CheckResult::success(ms)
            }
        })
        .await
    }
}

fn resolved(ip: IpAddr) -> ResolvedAddress {
    ResolvedAddress {
        address: ip.to_string(),
        family: if ip.is_ipv4() { 4 } else { 6 },
    }
}

/// Awaits `check` under `limit`, measuring elapsed milliseconds. The future
/// is dropped on timeout, tearing down whatever it had open.
async fn timed<T, E, F>(
    limit: Duration,
    check: F,
    on_ok: impl FnOnce(T, u64) -> CheckResult,
) -> CheckResult
where
    F: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let start = Instant::now();
    let outcome = tokio::time::timeout(limit, check).await;
    let ms = start.elapsed().as_millis() as u64;

    match outcome {
        Ok(Ok(value)) => on_ok(value, ms),
        Ok(Err(e)) => {
            debug!(error = %e, ms, "check failed");
            CheckResult::failure(e.to_string(), ms)
        }
        Err(_) => {
            debug!(ms, "check timed out");
            CheckResult::failure(TIMEOUT_ERROR, ms)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Minimal HTTP server answering every request with 204.
    async fn http_stub() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    if matches!(socket.read(&mut buf).await, Ok(n) if n > 0) {
                        let _ = socket
                            .write_all(b"HTTP/1.1 204 No Content\r\nConnection: close\r\n\r\n")
                            .await;
                    }
                });
            }
        });
        port
    }

    fn local_config(port: u16) -> ProbeConfig {
        ProbeConfig {
            url: format!("http://127.0.0.1:{port}/"),
            tcp_port: port,
            ..ProbeConfig::for_host("127.0.0.1")
        }
    }

    #[tokio::test]
    async fn reachable_host_passes_every_check() {
        let port = http_stub().await;
        let probe = DiagnosticsProbe::new(local_config(port)).unwrap();
        let report = probe.run().await;

        assert_eq!(report.target, "127.0.0.1");
        assert!(report.dns.ok, "{:?}", report.dns);
        assert_eq!(
            report.dns.addresses,
            Some(vec![ResolvedAddress {
                address: "127.0.0.1".into(),
                family: 4
            }])
        );
        assert!(report.tcp.ok, "{:?}", report.tcp);
        assert!(report.https.ok, "{:?}", report.https);
        assert_eq!(report.https.status_code, Some(204));
        assert!(chrono::DateTime::parse_from_rfc3339(&report.timestamp).is_ok());
    }

    #[tokio::test]
    async fn unresolvable_host_fails_without_error() {
        let config = ProbeConfig {
            dns_timeout: Duration::from_secs(2),
            tcp_timeout: Duration::from_secs(2),
            https_timeout: Duration::from_secs(2),
            ..ProbeConfig::for_host("chatlink-probe.invalid")
        };
        let report = DiagnosticsProbe::new(config).unwrap().run().await;

        assert!(!report.dns.ok);
        assert!(report.dns.error.is_some());
        assert!(report.dns.addresses.is_none());
        assert!(!report.tcp.ok);
        assert!(!report.https.ok);
        assert!(report.https.status_code.is_none());
    }

    #[tokio::test]
    async fn dns_failure_is_isolated_from_other_checks() {
        let port = http_stub().await;
        let config = ProbeConfig {
            url: format!("http://127.0.0.1:{port}/"),
            tcp_addr: Some(([127, 0, 0, 1], port).into()),
            dns_timeout: Duration::from_secs(2),
            ..ProbeConfig::for_host("chatlink-probe.invalid")
        };
        let report = DiagnosticsProbe::new(config).unwrap().run().await;

        assert_eq!(report.target, "chatlink-probe.invalid");
        assert!(!report.dns.ok);
        assert!(report.dns.error.is_some());
        assert!(report.tcp.ok, "{:?}", report.tcp);
        assert!(report.https.ok, "{:?}", report.https);
        assert_eq!(report.https.status_code, Some(204));
    }

    #[tokio::test]
    async fn silent_server_is_bounded_by_timeout() {
        // Accepts connections (via the backlog) but never answers.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let config = ProbeConfig {
            https_timeout: Duration::from_millis(300),
            ..local_config(port)
        };
        let started = Instant::now();
        let report = DiagnosticsProbe::new(config).unwrap().run().await;

        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(report.tcp.ok);
        assert!(!report.https.ok);
        assert_eq!(report.https.error.as_deref(), Some("timeout"));
        assert!(report.https.ms >= 300);
        drop(listener);
    }

    /// A listener whose accept queue is full. New SYNs are dropped, so
    /// connects hang instead of failing.
    #[cfg(target_os = "linux")]
    async fn saturated_listener() -> (TcpListener, Vec<TcpStream>, std::net::SocketAddr) {
        let socket = tokio::net::TcpSocket::new_v4().unwrap();
        socket.bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let listener = socket.listen(0).unwrap();
        let addr = listener.local_addr().unwrap();

        let mut held = Vec::new();
        for _ in 0..16 {
            match tokio::time::timeout(Duration::from_millis(200), TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => held.push(stream),
                _ => break,
            }
        }
        (listener, held, addr)
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn failing_checks_finish_within_largest_timeout() {
        let (listener, held, addr) = saturated_listener().await;

        let limit = Duration::from_millis(300);
        let config = ProbeConfig {
            url: format!("http://{addr}/"),
            tcp_addr: Some(addr),
            dns_timeout: limit,
            tcp_timeout: limit,
            https_timeout: limit,
            ..ProbeConfig::for_host("127.0.0.1")
        };
        let started = Instant::now();
        let report = DiagnosticsProbe::new(config).unwrap().run().await;
        let elapsed = started.elapsed();

        assert!(elapsed < limit + Duration::from_millis(700), "{elapsed:?}");
        assert!(report.dns.ok);
        assert!(!report.tcp.ok);
        assert_eq!(report.tcp.error.as_deref(), Some("timeout"));
        assert!(report.tcp.ms >= 300);
        assert!(!report.https.ok);
        assert_eq!(report.https.error.as_deref(), Some("timeout"));
        assert!(report.https.ms >= 300);

        drop(held);
        drop(listener);
    }

    #[tokio::test]
    async fn refused_port_reports_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let report = DiagnosticsProbe::new(local_config(port)).unwrap().run().await;
        assert!(report.dns.ok);
        assert!(!report.tcp.ok);
        assert_ne!(report.tcp.error.as_deref(), Some("timeout"));
        assert!(!report.https.ok);
    }
}
