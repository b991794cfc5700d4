//! Keeps only the records whose natural key is not stored yet.

use crate::error::Result;
use crate::extract::{Column, ExtractedColumns, ExtractedRecord};
use crate::observer::{Event, Observer};
use crate::store::KeyLookup;
use std::sync::Arc;

/// Records judged new, in input order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    pub records: Vec<ExtractedRecord>,
}

impl WriteBatch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

pub struct NewRecordClassifier {
    observer: Arc<dyn Observer>,
}

impl NewRecordClassifier {
    pub fn new(observer: Arc<dyn Observer>) -> Self {
        Self { observer }
    }

    /// Walks the rows in order and keeps each one whose `mp4_url` matches no
    /// stored row. One lookup is issued per keyed row; a row without
    /// `mp4_url` matches nothing and is kept without a lookup.
    ///
    /// `lookup` is consumed, so its connection is released exactly once when
    /// this returns, on success and on error. Rows past the shortest column
    /// are reported and skipped; store errors propagate.
    pub async fn classify<L: KeyLookup>(
        &self,
        columns: &ExtractedColumns,
        mut lookup: L,
    ) -> Result<WriteBatch> {
        let mut batch = WriteBatch::default();

        if columns.is_empty() {
            self.observer.event(&Event::NothingToClassify);
            return Ok(batch);
        }

        let rows = columns.rows();
        let longest = Column::ALL.iter().map(|c| columns.len(*c)).max().unwrap_or(0);
        for column in columns.ragged_columns() {
            let reason = format!(
                "column {} has {} entries, expected {}; rows from {} on are skipped",
                column.name(),
                columns.len(column),
                longest,
                rows
            );
            self.observer.event(&Event::MalformedRow { row: rows, reason });
        }

        for i in 0..rows {
            let Some(record) = columns.row(i) else {
                continue;
            };
            let Some(mp4_url) = record.mp4_url.clone() else {
                self.observer.event(&Event::KeylessRecord { row: i });
                batch.records.push(record);
                continue;
            };

            let stored = lookup.find_by_mp4_url(&mp4_url).await?;
            if stored.iter().any(|r| r.mp4_url.as_deref() == Some(mp4_url.as_str())) {
                self.observer.event(&Event::DuplicateSkipped { mp4_url });
            } else {
                self.observer.event(&Event::NewRecord { mp4_url });
                batch.records.push(record);
            }
        }

        Ok(batch)
    }
}
