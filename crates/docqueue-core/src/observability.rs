//! Observability - キューの状態ビュー

use serde::Serialize;

/// Depth of the queue under one payload filter.
///
/// The three numbers come from separate count queries, so under concurrent
/// traffic `running + waiting` may differ from `total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    /// Claimed (including stuck ones not yet swept).
    pub running: u64,
    /// Not claimed; includes messages whose `earliestGet` is still ahead.
    pub waiting: u64,
    pub total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_serialize_as_flat_object() {
        let counts = QueueCounts {
            running: 1,
            waiting: 2,
            total: 3,
        };
        assert_eq!(
            serde_json::to_value(counts).unwrap(),
            serde_json::json!({"running": 1, "waiting": 2, "total": 3})
        );
    }
}
