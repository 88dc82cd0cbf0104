use crate::output::{OutputSink, PageRecord, SinkResult};
use async_trait::async_trait;
use std::sync::Mutex;

/// Keeps page records in memory
///
/// For embedding the crawler in another program that consumes the records
/// itself once the job is done.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<PageRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies out the records received so far
    pub fn records(&self) -> Vec<PageRecord> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl OutputSink for MemorySink {
    async fn accept(&self, record: &PageRecord) -> SinkResult<()> {
        match self.records.lock() {
            Ok(mut records) => records.push(record.clone()),
            Err(poisoned) => poisoned.into_inner().push(record.clone()),
        }
        Ok(())
    }
}
