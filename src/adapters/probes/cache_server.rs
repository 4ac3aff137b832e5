//! Cache Server Probe - RESP PING over TCP
//!
//! Opens a TCP connection, sends an inline-array `PING` command and
//! expects the simple-string reply `+PONG`.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::instrument;

use super::{PING_CHECK, timed_check};
use crate::config::ProbeConfig;
use crate::domain::{Report, RequestContext, Unit};
use crate::ports::BackendProbe;

const PING_COMMAND: &[u8] = b"*1\r\n$4\r\nPING\r\n";
const PONG_REPLY: &str = "+PONG";
/// Longest reply line read before giving up.
const MAX_REPLY_BYTES: u64 = 512;

/// Probe for the RESP cache server.
pub struct CacheServerProbe {
  address: Option<String>,
  timeout: Duration,
}

impl CacheServerProbe {
  pub fn new(config: &ProbeConfig, timeout: Duration) -> Self {
    Self {
      address: config.enabled.then(|| config.target.clone()),
      timeout,
    }
  }
}

async fn ping(address: &str) -> Result<()> {
  let mut stream = TcpStream::connect(address)
    .await
    .with_context(|| format!("connect {address}"))?;

  stream
    .write_all(PING_COMMAND)
    .await
    .context("Failed to send PING")?;

  // the reply may span several segments
  let mut reply = String::new();
  BufReader::new(stream.take(MAX_REPLY_BYTES))
    .read_line(&mut reply)
    .await
    .context("Failed to read PING reply")?;

  let line = reply.trim_end();
  if line != PONG_REPLY {
    bail!("unexpected reply to PING: {line:?}");
  }
  Ok(())
}

#[async_trait]
impl BackendProbe for CacheServerProbe {
  fn unit(&self) -> Unit {
    Unit::Cache
  }

  #[instrument(skip_all, fields(unit = "cache"))]
  async fn health_checks(&self, ctx: &RequestContext) -> Vec<Report> {
    let Some(address) = &self.address else {
      return vec![Report::deactivated(PING_CHECK)];
    };

    vec![timed_check(PING_CHECK, self.timeout, ctx, ping(address)).await]
  }
}

#[cfg(test)]
mod tests {
  use tokio::net::TcpListener;

  use super::*;
  use crate::domain::HealthStatus;

  /// Fake server answering every connection with `reply`.
  async fn fake_server(reply: &'static [u8]) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
      loop {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 64];
        let n = socket.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], PING_COMMAND);
        socket.write_all(reply).await.unwrap();
      }
    });
    addr
  }

  fn probe(address: String, timeout: Duration) -> CacheServerProbe {
    CacheServerProbe::new(
      &ProbeConfig {
        enabled: true,
        target: address,
        ..ProbeConfig::default()
      },
      timeout,
    )
  }

  #[tokio::test]
  async fn test_pong_is_ok() {
    let addr = fake_server(b"+PONG\r\n").await;

    let reports = probe(addr, Duration::from_secs(2))
      .health_checks(&RequestContext::new("t"))
      .await;

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].status, HealthStatus::Ok);
  }

  #[tokio::test]
  async fn test_pong_split_across_writes_is_ok() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
      let (mut socket, _) = listener.accept().await.unwrap();
      let mut buf = [0u8; 64];
      socket.read(&mut buf).await.unwrap();
      socket.write_all(b"+PO").await.unwrap();
      socket.flush().await.unwrap();
      tokio::time::sleep(Duration::from_millis(20)).await;
      socket.write_all(b"NG\r\n").await.unwrap();
    });

    let reports = probe(addr, Duration::from_secs(2))
      .health_checks(&RequestContext::new("t"))
      .await;

    assert_eq!(reports[0].status, HealthStatus::Ok);
  }

  #[tokio::test]
  async fn test_error_reply_is_ko() {
    let addr = fake_server(b"-NOAUTH Authentication required.\r\n").await;

    let reports = probe(addr, Duration::from_secs(2))
      .health_checks(&RequestContext::new("t"))
      .await;

    assert_eq!(reports[0].status, HealthStatus::Ko);
    assert!(reports[0].error.as_deref().unwrap().contains("NOAUTH"));
  }

  #[tokio::test]
  async fn test_silent_server_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
      let (_socket, _) = listener.accept().await.unwrap();
      std::future::pending::<()>().await;
    });

    let reports = probe(addr, Duration::from_millis(50))
      .health_checks(&RequestContext::new("t"))
      .await;

    assert_eq!(reports[0].status, HealthStatus::Ko);
    assert_eq!(reports[0].error.as_deref(), Some("timed out after 50ms"));
  }

  #[tokio::test]
  async fn test_disabled_probe_is_deactivated() {
    let probe = CacheServerProbe::new(&ProbeConfig::default(), Duration::from_secs(1));

    let reports = probe.health_checks(&RequestContext::new("t")).await;
    assert_eq!(reports, vec![Report::deactivated("ping")]);
  }
}
