use std::sync::Arc;

use quotron_resilience::{
    HealthRegistry, HealthReport, HealthStore, HeartbeatLoop, HeartbeatSupervisor,
    InMemoryHealthStore, ResilientProxy,
};
use quotron_storage_sqlite::{db, SqliteHealthStore, StorageError};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;
use crate::upstream::HttpUpstream;

pub fn init_tracing() {
    let log_format = std::env::var("QUOTRON_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}

/// Everything the daemon runs, built once at start-up.
pub struct Monitor {
    pub health: Arc<HealthRegistry>,
    pub proxies: Vec<Arc<ResilientProxy>>,
    supervisor: HeartbeatSupervisor,
}

impl Monitor {
    /// Stop every heartbeat and log the last known health of each source.
    pub async fn shutdown(self) -> Vec<HealthReport> {
        self.supervisor.shutdown().await;

        let reports = self.health.list().await;
        for report in &reports {
            tracing::info!(
                "{}: status={} errors={} last_check={}{}",
                report.key(),
                report.status,
                report.error_count,
                report.last_check.to_rfc3339(),
                report
                    .error_message
                    .as_deref()
                    .map(|message| format!(" error=\"{}\"", message))
                    .unwrap_or_default()
            );
        }
        reports
    }
}

fn open_sqlite_store(db_path: &str) -> Result<SqliteHealthStore, StorageError> {
    let db_path = db::init(db_path)?;
    let pool = db::create_pool(&db_path)?;
    db::run_migrations(&pool)?;
    let writer = db::spawn_writer((*pool).clone())?;
    Ok(SqliteHealthStore::new(pool, writer))
}

/// Opens the SQLite health store, or an in-memory one if that fails.
pub fn open_health_store(db_path: &str) -> Arc<dyn HealthStore> {
    match open_sqlite_store(db_path) {
        Ok(store) => {
            tracing::info!("Persisting health reports to {}", db_path);
            Arc::new(store)
        }
        Err(e) => {
            tracing::warn!(
                "Cannot open health database at {} ({}); keeping health in memory",
                db_path,
                e
            );
            Arc::new(InMemoryHealthStore::new())
        }
    }
}

/// Build one proxy per upstream and start their heartbeats.
pub async fn build_monitor(config: &Config) -> anyhow::Result<Monitor> {
    let health = Arc::new(HealthRegistry::new(open_health_store(&config.db_path)));

    let mut proxies = Vec::with_capacity(config.upstreams.len());
    for upstream_config in &config.upstreams {
        let upstream = HttpUpstream::new(upstream_config.clone(), &config.source_type)?;
        let proxy = ResilientProxy::from_config(
            Arc::new(upstream),
            &config.resilience,
            health.clone(),
        )?;
        proxies.push(Arc::new(proxy));
    }

    let mut supervisor = HeartbeatSupervisor::new();
    for proxy in &proxies {
        let heartbeat = HeartbeatLoop::new(proxy.clone(), config.resilience.heartbeat.clone());
        supervisor.start(Arc::new(heartbeat));
    }
    tracing::info!("Started {} heartbeat loop(s)", supervisor.len());

    Ok(Monitor {
        health,
        proxies,
        supervisor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UpstreamConfig;
    use quotron_resilience::{HealthKey, HealthStatus, HealthUpdate, ResilienceConfig};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// A local upstream answering every request with the same quote.
    async fn quote_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let body = r#"{"symbol":"AAPL","price":189.5}"#;
                    let mut buf = vec![0u8; 4096];
                    let _ = socket.read(&mut buf).await;
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    socket.shutdown().await.ok();
                });
            }
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_unopenable_database_falls_back_to_memory() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let db_path = blocker.join("health.db");

        let store = open_health_store(db_path.to_str().unwrap());
        let registry = HealthRegistry::new(store);
        registry
            .report(HealthUpdate::healthy(
                HealthKey::new("api-scraper", "yfinance_proxy"),
                12,
            ))
            .await
            .unwrap();

        assert_eq!(registry.list().await.len(), 1);
    }

    #[tokio::test]
    async fn test_monitor_records_heartbeats_in_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("health.db");
        let base_url = quote_server().await;

        let config = Config {
            db_path: db_path.to_str().unwrap().to_string(),
            source_type: "api-scraper".to_string(),
            resilience: ResilienceConfig::default(),
            upstreams: vec![UpstreamConfig {
                name: "yfinance_proxy".to_string(),
                base_url,
                path: "/quote/{key}".to_string(),
                canary_key: "AAPL".to_string(),
                detail: Some("Yahoo Finance Proxy".to_string()),
                ttl_secs: None,
                timeout_secs: Some(5),
            }],
        };

        let monitor = build_monitor(&config).await.unwrap();
        assert_eq!(monitor.proxies.len(), 1);

        // The first tick runs immediately.
        let key = HealthKey::new("api-scraper", "yfinance_proxy");
        let mut recorded = None;
        for _ in 0..100 {
            recorded = monitor.health.get(&key).await;
            if recorded.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        let recorded = recorded.unwrap();
        assert_eq!(recorded.status, HealthStatus::Healthy);
        assert_eq!(recorded.source_detail, "Yahoo Finance Proxy");

        let reports = monitor.shutdown().await;
        assert_eq!(reports.len(), 1);

        // The row survived in the database file.
        let reopened = open_health_store(db_path.to_str().unwrap());
        let row = reopened.get(&key).await.unwrap().unwrap();
        assert_eq!(row.status, HealthStatus::Healthy);
        assert!(row.response_time_ms.is_some());
    }
}
