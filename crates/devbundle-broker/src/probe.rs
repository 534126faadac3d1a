//! Readiness probe for the worker port.

use crate::error::BrokerError;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::trace;

/// Poll `127.0.0.1:port` until a TCP connection succeeds or `timeout` elapses.
pub async fn wait_for_port(port: u16, timeout: Duration, interval: Duration) -> Result<(), BrokerError> {
    let started = Instant::now();
    let deadline = started + timeout;
    loop {
        if is_listening(port).await {
            trace!(port, elapsed_ms = started.elapsed().as_millis() as u64, "worker port ready");
            return Ok(());
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(BrokerError::NotReady {
                port,
                waited_ms: timeout.as_millis() as u64,
            });
        }
        tokio::time::sleep(interval.min(deadline - now)).await;
    }
}

/// Single connection attempt.
pub async fn is_listening(port: u16) -> bool {
    TcpStream::connect(("127.0.0.1", port)).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unused_port() -> u16 {
        let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_ready_immediately() {
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        wait_for_port(port, Duration::from_secs(1), Duration::from_millis(10))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_ready_after_late_bind() {
        let port = unused_port();
        let binder = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await.unwrap();
            tokio::time::sleep(Duration::from_secs(2)).await;
            drop(listener);
        });
        wait_for_port(port, Duration::from_secs(2), Duration::from_millis(20))
            .await
            .unwrap();
        binder.abort();
    }

    #[tokio::test]
    async fn test_timeout() {
        let port = unused_port();
        let err = wait_for_port(port, Duration::from_millis(100), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::NotReady { waited_ms: 100, .. }));
    }
}
