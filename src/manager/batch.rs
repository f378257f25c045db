//! Write-batching queue
//!
//! When batching is enabled, `set`/`delete` calls append to this FIFO queue
//! instead of executing immediately. The queue and its flush timer are one
//! critical section: the manager drains the queue under the lock and
//! executes the drained operations outside it, so appends that race a flush
//! are neither lost nor duplicated - they land in the next flush.
//!
//! Batching smooths throughput; it is not a transaction. Operations execute
//! strictly in enqueue order, each succeeding or failing independently, with
//! no rollback and no cross-key atomicity.

use crate::types::{BatchOpKind, BatchOperation, ProviderKind};
use serde::Serialize;
use std::collections::VecDeque;
use tokio::task::JoinHandle;

/// What caused a flush
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    /// Queue length reached `batch_size`
    Size,
    /// `batch_timeout` elapsed since the first queued operation
    Timer,
    /// Explicit `execute_batch()` call or shutdown drain
    Manual,
}

/// FIFO queue plus the timer armed on its first entry
pub struct BatchQueue {
    pub ops: VecDeque<BatchOperation>,
    pub timer: Option<JoinHandle<()>>,
}

impl BatchQueue {
    pub fn new() -> Self {
        Self {
            ops: VecDeque::new(),
            timer: None,
        }
    }
}

impl Default for BatchQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of one operation within a flush
#[derive(Debug, Clone, Serialize)]
pub struct BatchOpResult {
    pub op: BatchOpKind,
    pub key: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary of one flush
#[derive(Debug, Clone, Serialize)]
pub struct BatchExecutionReport {
    pub executed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub provider: Option<ProviderKind>,
    pub results: Vec<BatchOpResult>,
}

impl BatchExecutionReport {
    pub fn empty() -> Self {
        Self {
            executed: 0,
            succeeded: 0,
            failed: 0,
            provider: None,
            results: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_queue_preserves_fifo_order() {
        let mut queue = BatchQueue::new();
        queue
            .ops
            .push_back(BatchOperation::set("a".into(), json!(1), None, None));
        queue.ops.push_back(BatchOperation::delete("b".into()));
        queue
            .ops
            .push_back(BatchOperation::set("c".into(), json!(3), Some(30), None));

        let keys: Vec<&str> = queue.ops.iter().map(|op| op.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
        assert_eq!(queue.ops[0].op, BatchOpKind::Set);
        assert_eq!(queue.ops[1].op, BatchOpKind::Delete);
    }

    #[test]
    fn test_empty_report() {
        let report = BatchExecutionReport::empty();
        assert_eq!(report.executed, 0);
        assert!(report.provider.is_none());
        assert!(report.results.is_empty());
    }
}
