use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::engine::{Engine, EngineError};

/// Compact once `threshold` appends have accumulated. Returns whether it ran.
pub async fn compact_if_needed(engine: &Engine, threshold: u64) -> Result<bool, EngineError> {
    let appends = engine.wal_appends_since_compact().await;
    if appends < threshold {
        return Ok(false);
    }
    engine.compact_wal().await?;
    info!("compacted WAL after {appends} appends");
    Ok(true)
}

/// Background task that keeps the WAL from growing without bound.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(30));
    loop {
        interval.tick().await;
        if let Err(e) = compact_if_needed(&engine, threshold).await {
            warn!("WAL compaction failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::model::Span;
    use crate::wal::Wal;
    use std::path::PathBuf;
    use ulid::Ulid;

    const H: i64 = 3_600_000;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("classbook_test_compactor");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn compacts_only_past_threshold() {
        let path = test_wal_path("threshold.wal");
        let engine = Engine::new(path.clone(), Arc::new(ManualClock::new(0))).unwrap();

        let room = engine.create_resource("c-1".into(), 10).await.unwrap();
        let who = Ulid::new();
        for i in 0..3 {
            let b = engine
                .place(room.id, who, Span::try_new(i * 2 * H, i * 2 * H + H).unwrap())
                .await
                .unwrap();
            engine
                .cancel(b.id, crate::model::Actor::Requester(who))
                .await
                .unwrap();
        }
        // 1 create + 3 places + 3 cancels
        assert!(!compact_if_needed(&engine, 100).await.unwrap());
        assert!(compact_if_needed(&engine, 7).await.unwrap());
        assert_eq!(engine.wal_appends_since_compact().await, 0);

        let replayed = Wal::replay(&path).unwrap();
        assert_eq!(replayed.len(), 7); // history of denials is preserved
    }
}
