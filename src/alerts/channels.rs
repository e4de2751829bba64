//! Alert delivery channels.
//!
//! Each channel carries its own minimum priority and fails independently:
//! an error on one channel never affects delivery on the others.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::models::{Alert, Priority};

#[async_trait]
pub trait AlertChannel: Send + Sync {
    fn name(&self) -> &'static str;
    fn min_priority(&self) -> Priority;
    async fn deliver(&self, alert: &Alert) -> Result<()>;
}

/// Prints alerts to the process log.
pub struct ConsoleChannel {
    min_priority: Priority,
}

impl ConsoleChannel {
    pub fn new(min_priority: Priority) -> Self {
        Self { min_priority }
    }
}

#[async_trait]
impl AlertChannel for ConsoleChannel {
    fn name(&self) -> &'static str {
        "console"
    }

    fn min_priority(&self) -> Priority {
        self.min_priority
    }

    async fn deliver(&self, alert: &Alert) -> Result<()> {
        info!(
            priority = alert.priority.as_str(),
            source = alert.source.as_str(),
            "🔔 {}: {}",
            alert.title,
            alert.body
        );
        Ok(())
    }
}

/// Appends one JSON line per alert. Writes are serialized behind a mutex so
/// concurrent deliveries cannot interleave lines.
pub struct FileChannel {
    path: PathBuf,
    min_priority: Priority,
    write_lock: Mutex<()>,
}

impl FileChannel {
    pub fn new(path: impl Into<PathBuf>, min_priority: Priority) -> Self {
        Self {
            path: path.into(),
            min_priority,
            write_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl AlertChannel for FileChannel {
    fn name(&self) -> &'static str {
        "file"
    }

    fn min_priority(&self) -> Priority {
        self.min_priority
    }

    async fn deliver(&self, alert: &Alert) -> Result<()> {
        let line = serde_json::to_string(alert).context("serialize alert")?;
        let _guard = self.write_lock.lock();
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open alert file {}", self.path.display()))?;
        writeln!(file, "{line}").context("append alert line")?;
        Ok(())
    }
}

/// At-most-once POST per alert with a small bounded retry budget for
/// transient transport errors. A non-2xx response is not retried.
pub struct WebhookChannel {
    client: reqwest::Client,
    url: String,
    min_priority: Priority,
    max_attempts: u32,
}

impl WebhookChannel {
    pub fn new(url: &str, min_priority: Priority) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .context("build webhook client")?;
        Ok(Self {
            client,
            url: url.to_string(),
            min_priority,
            max_attempts: 3,
        })
    }
}

#[async_trait]
impl AlertChannel for WebhookChannel {
    fn name(&self) -> &'static str {
        "webhook"
    }

    fn min_priority(&self) -> Priority {
        self.min_priority
    }

    async fn deliver(&self, alert: &Alert) -> Result<()> {
        let mut backoff = Duration::from_millis(200);
        for attempt in 1..=self.max_attempts {
            match self.client.post(&self.url).json(alert).send().await {
                Ok(response) if response.status().is_success() => return Ok(()),
                Ok(response) => {
                    // Delivered but rejected: retrying would risk duplicates.
                    bail!("webhook rejected alert: {}", response.status());
                }
                Err(e) => {
                    warn!(
                        attempt,
                        error = %e,
                        "webhook POST failed"
                    );
                    if attempt < self.max_attempts {
                        tokio::time::sleep(backoff).await;
                        backoff *= 2;
                    } else {
                        return Err(e).context("webhook POST exhausted retries");
                    }
                }
            }
        }
        unreachable!("retry loop always returns")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AlertSource;

    fn alert(title: &str) -> Alert {
        Alert {
            id: "a1".to_string(),
            timestamp_ms: 0,
            priority: Priority::High,
            title: title.to_string(),
            body: "body".to_string(),
            source: AlertSource::Signal,
            metadata: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn file_channel_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alerts.jsonl");
        let channel = FileChannel::new(&path, Priority::Low);

        channel.deliver(&alert("first")).await.unwrap();
        channel.deliver(&alert("second")).await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: Alert = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed.title, "first");
    }
}
