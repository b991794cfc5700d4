//! Flattening of catalog payloads into fixed, row-aligned columns.
//!
//! A missing or falsy field becomes `None`, never an empty string, and never
//! drops its row.

use crate::error::{Error, Result};
use crate::fetcher::Payload;
use crate::observer::{Event, Observer};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// A loosely typed catalog value (ids and prices come as numbers or text).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    /// Converts a JSON value, treating null, `0`, `""`, `false` and
    /// containers as absent.
    fn from_json(value: Option<&Value>) -> Option<Self> {
        match value? {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    (i != 0).then_some(Scalar::Int(i))
                } else {
                    n.as_f64().filter(|f| *f != 0.0).map(Scalar::Float)
                }
            }
            Value::String(s) if !s.is_empty() => Some(Scalar::Text(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Float(x) => write!(f, "{}", x),
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

/// Column set of an extracted record, in its fixed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Mp4Url,
    WebmUrl,
    CategoryId,
    CategoryName,
    Price,
    Currency,
    Name,
}

impl Column {
    pub const ALL: [Column; 7] = [
        Column::Mp4Url,
        Column::WebmUrl,
        Column::CategoryId,
        Column::CategoryName,
        Column::Price,
        Column::Currency,
        Column::Name,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Column::Mp4Url => "mp4_url",
            Column::WebmUrl => "webm_url",
            Column::CategoryId => "category_id",
            Column::CategoryName => "category_name",
            Column::Price => "price",
            Column::Currency => "currency",
            Column::Name => "name",
        }
    }
}

/// One flattened catalog item. `mp4_url` is the natural key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedRecord {
    pub mp4_url: Option<String>,
    pub webm_url: Option<String>,
    pub category_id: Option<Scalar>,
    pub category_name: Option<String>,
    pub price: Option<Scalar>,
    pub currency: Option<String>,
    pub name: Option<String>,
}

impl ExtractedRecord {
    fn from_item(item: &Value) -> Self {
        let previews = item.get("previews");
        let media_url = |variant: &str| {
            text(
                previews
                    .and_then(|p| p.get(variant))
                    .and_then(|v| v.get("url")),
            )
        };
        // Only the first category is kept.
        let category = item
            .get("categories")
            .and_then(Value::as_array)
            .and_then(|c| c.first());

        Self {
            mp4_url: media_url("mp4"),
            webm_url: media_url("webm"),
            category_id: Scalar::from_json(category.and_then(|c| c.get("id"))),
            category_name: text(category.and_then(|c| c.get("name"))),
            price: Scalar::from_json(item.get("price")),
            currency: text(item.get("currency")),
            name: text(item.get("name")),
        }
    }
}

/// Text column value. Non-zero numbers are kept in their textual form.
fn text(value: Option<&Value>) -> Option<String> {
    Scalar::from_json(value).map(|s| match s {
        Scalar::Text(s) => s,
        other => other.to_string(),
    })
}

/// Row-aligned columns: index `i` of every vector describes the same item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedColumns {
    pub mp4_url: Vec<Option<String>>,
    pub webm_url: Vec<Option<String>>,
    pub category_id: Vec<Option<Scalar>>,
    pub category_name: Vec<Option<String>>,
    pub price: Vec<Option<Scalar>>,
    pub currency: Vec<Option<String>>,
    pub name: Vec<Option<String>>,
}

impl ExtractedColumns {
    pub fn push(&mut self, record: ExtractedRecord) {
        self.mp4_url.push(record.mp4_url);
        self.webm_url.push(record.webm_url);
        self.category_id.push(record.category_id);
        self.category_name.push(record.category_name);
        self.price.push(record.price);
        self.currency.push(record.currency);
        self.name.push(record.name);
    }

    pub fn len(&self, column: Column) -> usize {
        match column {
            Column::Mp4Url => self.mp4_url.len(),
            Column::WebmUrl => self.webm_url.len(),
            Column::CategoryId => self.category_id.len(),
            Column::CategoryName => self.category_name.len(),
            Column::Price => self.price.len(),
            Column::Currency => self.currency.len(),
            Column::Name => self.name.len(),
        }
    }

    /// Number of complete rows, i.e. the length of the shortest column.
    pub fn rows(&self) -> usize {
        Column::ALL
            .iter()
            .map(|c| self.len(*c))
            .min()
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        Column::ALL.iter().all(|c| self.len(*c) == 0)
    }

    /// Columns whose length differs from the longest one.
    pub fn ragged_columns(&self) -> Vec<Column> {
        let longest = Column::ALL.iter().map(|c| self.len(*c)).max().unwrap_or(0);
        Column::ALL
            .into_iter()
            .filter(|c| self.len(*c) != longest)
            .collect()
    }

    /// Reassembles row `i`, or `None` if any column is too short.
    pub fn row(&self, i: usize) -> Option<ExtractedRecord> {
        Some(ExtractedRecord {
            mp4_url: self.mp4_url.get(i)?.clone(),
            webm_url: self.webm_url.get(i)?.clone(),
            category_id: self.category_id.get(i)?.clone(),
            category_name: self.category_name.get(i)?.clone(),
            price: self.price.get(i)?.clone(),
            currency: self.currency.get(i)?.clone(),
            name: self.name.get(i)?.clone(),
        })
    }

    /// Fails when every media URL, mp4 and webm alike, is absent.
    pub fn ensure_usable(&self) -> Result<()> {
        let any_url = self
            .mp4_url
            .iter()
            .chain(self.webm_url.iter())
            .any(Option::is_some);
        if any_url {
            Ok(())
        } else {
            Err(Error::ExtractionEmpty)
        }
    }
}

/// Where extraction stopped because a page had no items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EarlyStop {
    pub page: u32,
    pub skipped_payloads: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub columns: ExtractedColumns,
    pub stopped_early: Option<EarlyStop>,
}

pub struct RecordExtractor {
    observer: Arc<dyn Observer>,
}

impl RecordExtractor {
    pub fn new(observer: Arc<dyn Observer>) -> Self {
        Self { observer }
    }

    /// Flattens `payloads` in the order given.
    ///
    /// The first payload whose `data` list is missing or empty ends
    /// extraction: later pages are assumed empty too. The stop is reported in
    /// [`Extraction::stopped_early`] and as an [`Event::EmptyPageStop`].
    pub fn extract(&self, payloads: &[Payload]) -> Extraction {
        let mut columns = ExtractedColumns::default();
        let mut stopped_early = None;

        for (i, payload) in payloads.iter().enumerate() {
            let items = match payload.body.get("data").and_then(Value::as_array) {
                Some(items) if !items.is_empty() => items,
                _ => {
                    let stop = EarlyStop {
                        page: payload.page,
                        skipped_payloads: payloads.len() - i - 1,
                    };
                    self.observer.event(&Event::EmptyPageStop {
                        page: stop.page,
                        skipped_payloads: stop.skipped_payloads,
                    });
                    stopped_early = Some(stop);
                    break;
                }
            };

            for item in items {
                columns.push(ExtractedRecord::from_item(item));
            }
        }

        self.observer.event(&Event::Extracted {
            mp4_urls: columns.mp4_url.iter().flatten().count(),
            webm_urls: columns.webm_url.iter().flatten().count(),
        });

        Extraction {
            columns,
            stopped_early,
        }
    }
}
