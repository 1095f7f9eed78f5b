//! Persisting tracing events in the telemetry store
//!
//! [`StoreLogLayer`] turns every event it sees into a [`LogEntry`] and hands it
//! to a writer task over a bounded channel. The layer never blocks: when the
//! channel is full the entry is dropped. Events from the store itself and
//! from sqlx are not forwarded, otherwise every insert would log another one.

use std::fmt::{self, Write as _};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::storage::{LogEntry, LogLevel, StorageBackend};

/// Default capacity of the channel between layer and writer
pub const LOG_CHANNEL_CAPACITY: usize = 1024;

const SKIPPED_TARGETS: [&str; 2] = ["fleet_monitoring::storage", "sqlx"];

pub struct StoreLogLayer {
    entries: mpsc::Sender<LogEntry>,
}

impl StoreLogLayer {
    pub fn new(entries: mpsc::Sender<LogEntry>) -> Self {
        Self { entries }
    }

    /// Layer plus the receiving end for [`spawn_log_writer`]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<LogEntry>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

fn is_skipped(target: &str) -> bool {
    SKIPPED_TARGETS
        .iter()
        .any(|skipped| target.starts_with(skipped))
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

impl<S: Subscriber> Layer<S> for StoreLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if is_skipped(meta.target()) {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let entry = LogEntry {
            id: None,
            timestamp: Utc::now(),
            level: LogLevel::from(*meta.level()),
            message: visitor.message + &visitor.fields,
            file: meta.file().unwrap_or("unknown").to_string(),
            line: meta.line().unwrap_or(0),
        };

        // full or closed channel: drop the entry
        let _ = self.entries.try_send(entry);
    }
}

/// Append received entries until every sender is gone
pub fn spawn_log_writer(
    store: Arc<dyn StorageBackend>,
    mut entries: mpsc::Receiver<LogEntry>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(entry) = entries.recv().await {
            if let Err(e) = store.append_log(&entry).await {
                // eprintln, a tracing event would come straight back here
                eprintln!("failed to persist log entry: {e}");
            }
        }
    })
}
