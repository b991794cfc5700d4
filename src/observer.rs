//! Injected observability.
//!
//! Components report what happens to them through an [`Observer`] handed in at
//! construction instead of writing to a process-wide logger. [`LogObserver`]
//! forwards everything to the `log` facade.

use crate::proxy::{ProxyAddress, ValidationOutcome};
use log::{debug, error, info, warn, Level};
use std::time::Duration;

/// Something worth reporting that is not itself a failure of the run.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    ProbeFinished {
        index: usize,
        proxy: ProxyAddress,
        outcome: ValidationOutcome,
    },
    RateLimited {
        index: usize,
        proxy: ProxyAddress,
        cooldown: Duration,
    },
    ProxyErrorBackoff {
        index: usize,
        proxy: ProxyAddress,
        error: String,
        delay: Duration,
    },
    PageFetched {
        page: u32,
        proxy: Option<ProxyAddress>,
    },
    PageFailed {
        page: u32,
        proxy: Option<ProxyAddress>,
        reason: String,
    },
    /// Extraction stopped at an empty page; later payloads were not read.
    EmptyPageStop { page: u32, skipped_payloads: usize },
    Extracted { mp4_urls: usize, webm_urls: usize },
    NewRecord { mp4_url: String },
    /// A row without `mp4_url`; nothing stored can share its key, so it is kept.
    KeylessRecord { row: usize },
    DuplicateSkipped { mp4_url: String },
    MalformedRow { row: usize, reason: String },
    StageFinished { stage: &'static str, elapsed: Duration },
    /// Validation could not start, e.g. because no checker URL is configured.
    ValidationAborted { reason: String },
    /// The classifier was handed no rows.
    NothingToClassify,
}

impl Event {
    pub fn level(&self) -> Level {
        match self {
            Event::ProbeFinished { outcome, .. } => match outcome {
                ValidationOutcome::Working => Level::Info,
                ValidationOutcome::RateLimited | ValidationOutcome::TimedOut => Level::Warn,
                ValidationOutcome::Failed(_) => Level::Debug,
            },
            Event::RateLimited { .. } | Event::EmptyPageStop { .. } => Level::Warn,
            Event::MalformedRow { .. } => Level::Warn,
            Event::ProxyErrorBackoff { .. }
            | Event::PageFailed { .. }
            | Event::ValidationAborted { .. }
            | Event::NothingToClassify => Level::Error,
            Event::PageFetched { .. } | Event::KeylessRecord { .. } => Level::Debug,
            Event::Extracted { .. }
            | Event::NewRecord { .. }
            | Event::DuplicateSkipped { .. }
            | Event::StageFinished { .. } => Level::Info,
        }
    }
}

pub trait Observer: Send + Sync {
    fn event(&self, event: &Event);
}

/// Forwards events to `log` under the `harvestrs` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl Observer for LogObserver {
    fn event(&self, event: &Event) {
        match event {
            Event::ProbeFinished {
                index,
                proxy,
                outcome,
            } => match event.level() {
                Level::Info => info!("Proxy {}: {} {}", index, proxy, outcome),
                Level::Warn => warn!("Proxy {}: {} {}", index, proxy, outcome),
                _ => debug!("Proxy {}: {} {}", index, proxy, outcome),
            },
            Event::RateLimited {
                index,
                proxy,
                cooldown,
            } => warn!(
                "Proxy {}: {} too many requests, retrying in {:?}",
                index, proxy, cooldown
            ),
            Event::ProxyErrorBackoff {
                index,
                proxy,
                error,
                delay,
            } => error!(
                "Proxy {}: {} error {}, retrying in {:?}",
                index, proxy, error, delay
            ),
            Event::PageFetched { page, proxy } => match proxy {
                Some(p) => debug!("page {} fetched via {}", page, p),
                None => debug!("page {} fetched directly", page),
            },
            Event::PageFailed {
                page,
                proxy,
                reason,
            } => match proxy {
                Some(p) => error!("page {} failed via {}: {}", page, p, reason),
                None => error!("page {} failed: {}", page, reason),
            },
            Event::EmptyPageStop {
                page,
                skipped_payloads,
            } => warn!(
                "page {} has no items, stopping extraction ({} later payloads skipped)",
                page, skipped_payloads
            ),
            Event::Extracted {
                mp4_urls,
                webm_urls,
            } => info!(
                "Number of mp4 urls: {} and webm urls: {}",
                mp4_urls, webm_urls
            ),
            Event::NewRecord { mp4_url } => info!("New URL found: {}", mp4_url),
            Event::KeylessRecord { row } => debug!("row {} has no mp4_url, kept as new", row),
            Event::DuplicateSkipped { mp4_url } => {
                info!("Skipping... URL already exists in the database: {}", mp4_url)
            }
            Event::MalformedRow { row, reason } => warn!("row {} skipped: {}", row, reason),
            Event::StageFinished { stage, elapsed } => {
                info!("*** Total time to {}: {:?} ***", stage, elapsed)
            }
            Event::ValidationAborted { reason } => error!("proxy validation aborted: {}", reason),
            Event::NothingToClassify => error!("The records to classify cannot be empty"),
        }
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl Observer for NoopObserver {
    fn event(&self, _event: &Event) {}
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Keeps every event for later assertions.
    #[derive(Default)]
    pub struct RecordingObserver {
        events: Mutex<Vec<Event>>,
    }

    impl RecordingObserver {
        pub fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }
    }

    impl Observer for RecordingObserver {
        fn event(&self, event: &Event) {
            self.events.lock().unwrap().push(event.clone());
        }
    }
}
