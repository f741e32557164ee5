//! Replay a log of client writes against a seeded in-memory store.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use storyline_engine::DispatchReport;
use storyline_handlers::{build_engine, HandlerDeps, TriggerStats};
use storyline_store::{Batch, MemoryStore, Store, StorePath};
use tracing::{info, warn};

/// One line of the event log. `null` (or a missing value) removes the path.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClientWrite {
    pub path: StorePath,
    #[serde(default)]
    pub value: Value,
}

/// Parse a JSON-lines log. Blank lines and `#` comments are skipped.
pub fn parse_events(raw: &str) -> Result<Vec<ClientWrite>> {
    raw.lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(n, line)| {
            serde_json::from_str(line).with_context(|| format!("Invalid event on line {}", n + 1))
        })
        .collect()
}

pub fn load_snapshot(path: &Path) -> Result<Value> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot: {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse snapshot: {}", path.display()))
}

pub fn load_events(path: &Path) -> Result<Vec<ClientWrite>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read event log: {}", path.display()))?;
    parse_events(&raw)
}

/// Totals across a replay.
#[derive(Debug, Default)]
pub struct ReplaySummary {
    pub writes: usize,
    pub report: DispatchReport,
    pub stats: TriggerStats,
}

/// Apply each write in order and settle the engine after each one.
///
/// Handler failures are reported and the replay continues; only a rejected
/// client write stops it.
pub async fn replay(
    store: Arc<MemoryStore>,
    deps: &HandlerDeps,
    writes: Vec<ClientWrite>,
) -> Result<ReplaySummary> {
    let engine = build_engine(store.clone(), &deps.config)?;
    let mut summary = ReplaySummary::default();

    for write in writes {
        let mut batch = Batch::new();
        let value = (!write.value.is_null()).then_some(write.value);
        batch.put(write.path.clone(), value);
        store
            .batch_write(batch)
            .await
            .with_context(|| format!("Client write rejected: {}", write.path))?;
        summary.writes += 1;

        let report = engine.settle(&mut summary.stats, deps).await;
        for failure in &report.failures {
            warn!(path = %failure.path, error = %failure.error, "Handler failed during replay");
        }
        summary.report.merge(report);
    }

    info!(
        writes = summary.writes,
        rounds = summary.report.rounds,
        handled = summary.report.handled,
        failures = summary.report.failures.len(),
        "Replay finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use storyline_common::{paths, UserId};
    use storyline_handlers::{NoopChannel, Trigger};
    use storyline_store::StoreExt;

    use super::*;

    #[test]
    fn parses_lines_and_skips_comments() {
        let log = r#"
# seed a follow
{"path": "social/followers/bob/amy", "value": true}

{"path": "social/followers/bob/amy", "value": null}
{"path": "social/blocked/amy/bob"}
"#;
        let writes = parse_events(log).unwrap();
        assert_eq!(writes.len(), 3);
        assert_eq!(writes[0].path, StorePath::parse("social/followers/bob/amy"));
        assert_eq!(writes[0].value, json!(true));
        assert!(writes[1].value.is_null());
        assert!(writes[2].value.is_null());
    }

    #[test]
    fn bad_line_reports_its_number() {
        let err = parse_events("{\"path\": \"a\", \"value\": 1}\nnot json").unwrap_err();
        assert!(err.to_string().contains("line 2"), "{err}");
    }

    #[test]
    fn snapshot_file_is_loaded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, br#"{"users": {"profile": {}}}"#).unwrap();
        assert_eq!(load_snapshot(file.path()).unwrap(), json!({"users": {"profile": {}}}));
    }

    #[tokio::test]
    async fn replay_settles_after_each_write() {
        let store = Arc::new(MemoryStore::new());
        let deps = HandlerDeps::builder()
            .store(store.clone())
            .push(Arc::new(NoopChannel))
            .build();
        let writes = parse_events(
            "{\"path\": \"social/followers/bob/amy\", \"value\": true}\n\
             {\"path\": \"social/followers/bob/amy\", \"value\": null}",
        )
        .unwrap();

        let summary = replay(store.clone(), &deps, writes).await.unwrap();

        assert_eq!(summary.writes, 2);
        assert!(summary.report.is_clean());
        assert_eq!(summary.stats.count(Trigger::FollowEdge), 2);
        let count = store.get(&paths::follower_count(&UserId::from("bob"))).await.unwrap();
        assert_eq!(count, Some(0));
    }
}
