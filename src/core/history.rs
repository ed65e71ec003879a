use std::collections::VecDeque;

use parking_lot::Mutex;
use tracing::debug;

use crate::models::result::ExecutionReport;

/// Finished reports, newest last. Holds at most `capacity`; the oldest is
/// evicted first.
#[derive(Debug)]
pub struct ExecutionHistory {
    capacity: usize,
    records: Mutex<VecDeque<ExecutionReport>>,
}

impl ExecutionHistory {
    pub fn new(capacity: usize) -> Self {
        ExecutionHistory {
            capacity,
            records: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    /// A report reusing an execution id replaces the earlier one.
    pub fn record(&self, report: ExecutionReport) {
        if self.capacity == 0 {
            return;
        }
        let mut records = self.records.lock();
        records.retain(|r| r.execution_id != report.execution_id);
        while records.len() >= self.capacity {
            if let Some(evicted) = records.pop_front() {
                debug!(execution_id = %evicted.execution_id, "evicted from history");
            }
        }
        records.push_back(report);
    }

    pub fn get(&self, execution_id: &str) -> Option<ExecutionReport> {
        self.records
            .lock()
            .iter()
            .find(|r| r.execution_id == execution_id)
            .cloned()
    }

    /// One page of reports, newest first, plus the total matching count.
    /// `page` starts at 1.
    pub fn list(&self, test_case_id: Option<&str>, page: usize, page_size: usize) -> (Vec<ExecutionReport>, usize) {
        let records = self.records.lock();
        let matching: Vec<&ExecutionReport> = records
            .iter()
            .rev()
            .filter(|r| match test_case_id {
                Some(id) => r.test_case_id.as_deref() == Some(id),
                None => true,
            })
            .collect();
        let total = matching.len();
        let skip = page.saturating_sub(1).saturating_mul(page_size);
        let data = matching.into_iter().skip(skip).take(page_size).cloned().collect();
        (data, total)
    }
}
