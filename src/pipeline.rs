//! One end-to-end harvesting run.

use crate::classifier::{NewRecordClassifier, WriteBatch};
use crate::configuration::{ProxySourceKind, Settings};
use crate::error::{Error, Result};
use crate::extract::{EarlyStop, RecordExtractor};
use crate::fetcher::PagedFetcher;
use crate::observer::{Event, Observer};
use crate::provider::CandidateSource;
use crate::providers::file::ProxyFile;
use crate::providers::freeproxy_world::FreeProxyWorld;
use crate::providers::proxyscrape::ProxyScrape;
use crate::providers::write_proxy_list;
use crate::proxy::ProxyAddress;
use crate::store::MotionStore;
use crate::transport::Transport;
use crate::verification::ProxyValidator;
use log::info;
use rand::seq::SliceRandom;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

const FREEPROXY_WORLD_PAGES: u32 = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub working_proxies: usize,
    pub pages: usize,
    pub rows: usize,
    pub new_records: usize,
    pub stopped_early: Option<EarlyStop>,
}

pub struct Pipeline {
    settings: Settings,
    transport: Arc<dyn Transport>,
    observer: Arc<dyn Observer>,
}

impl Pipeline {
    pub fn new(settings: Settings, transport: Arc<dyn Transport>, observer: Arc<dyn Observer>) -> Self {
        Self {
            settings,
            transport,
            observer,
        }
    }

    /// Validates proxies (when enabled), fetches the page range, extracts
    /// records, keeps the new ones and stores them.
    pub async fn run(&self) -> Result<RunReport> {
        self.settings.validate()?;
        let total = Instant::now();

        let proxies = if self.settings.proxy.enabled {
            let started = Instant::now();
            let proxies = self.working_proxies().await?;
            self.stage_finished("test proxies", started);
            proxies
        } else {
            Vec::new()
        };

        let catalog = &self.settings.catalog;
        let started = Instant::now();
        let fetcher = PagedFetcher::new(
            catalog.endpoint(),
            self.transport.clone(),
            self.observer.clone(),
            catalog.fetcher_config(),
        );
        let mut payloads = fetcher
            .fetch_range(catalog.start_page, catalog.end_page, &proxies)
            .await?;
        if payloads.is_empty() {
            return Err(unreachable_range(catalog.start_page, catalog.end_page));
        }
        self.stage_finished("fetch", started);

        let started = Instant::now();
        // Pages complete in any order; extraction expects page order.
        payloads.sort_by_key(|p| p.page);
        let extraction = RecordExtractor::new(self.observer.clone()).extract(&payloads);
        extraction.columns.ensure_usable()?;
        self.stage_finished("scrape", started);
        self.stage_finished("fetch and scrape pages", total);

        let started = Instant::now();
        let store = MotionStore::open(&self.settings.store.database_path, &self.settings.store.table).await?;
        let batch = self.classify(&store, &extraction.columns).await;
        let batch = match batch {
            Ok(batch) => batch,
            Err(e) => {
                store.close().await;
                return Err(e);
            }
        };
        self.stage_finished("check new items", started);

        if batch.is_empty() {
            store.close().await;
            return Err(Error::EmptyBatch);
        }

        let saved = store.insert_batch(&batch.records).await;
        store.close().await;
        saved?;

        Ok(RunReport {
            working_proxies: proxies.len(),
            pages: payloads.len(),
            rows: extraction.columns.rows(),
            new_records: batch.len(),
            stopped_early: extraction.stopped_early,
        })
    }

    async fn classify(
        &self,
        store: &MotionStore,
        columns: &crate::extract::ExtractedColumns,
    ) -> Result<WriteBatch> {
        let session = store.session().await?;
        NewRecordClassifier::new(self.observer.clone())
            .classify(columns, session)
            .await
    }

    /// Samples candidates from the configured source and validates them.
    pub async fn working_proxies(&self) -> Result<Vec<ProxyAddress>> {
        let mut source = self.candidate_source()?;
        let mut candidates = source.list().await?;
        {
            let mut rng = rand::thread_rng();
            candidates.shuffle(&mut rng);
        }
        candidates.truncate(self.settings.proxy.sample_size);
        info!("testing {} proxies from {}", candidates.len(), source.name());

        // An aborted validation is reported by the validator itself.
        let working = self
            .validator()
            .validate(&candidates, &self.settings.proxy.checker_urls)
            .await
            .unwrap_or_default();
        if working.is_empty() {
            return Err(Error::NoWorkingProxies);
        }
        info!("{} of {} proxies working", working.len(), candidates.len());
        Ok(working)
    }

    /// Fetches candidates from `source`, validates them and writes the
    /// working ones to `output` as a proxy list file.
    pub async fn refresh_proxy_list(
        &self,
        source: &mut dyn CandidateSource,
        output: &Path,
    ) -> Result<usize> {
        let candidates = source.list().await?;
        info!("checking {} proxies from {}", candidates.len(), source.name());

        let working = self
            .validator()
            .validate(&candidates, &self.settings.proxy.checker_urls)
            .await?;
        write_proxy_list(output, &working).await?;
        info!("Total available proxies for scraping: {}", working.len());
        Ok(working.len())
    }

    fn validator(&self) -> ProxyValidator {
        ProxyValidator::new(
            self.transport.clone(),
            self.observer.clone(),
            self.settings.proxy.validator_config(),
        )
    }

    fn candidate_source(&self) -> Result<Box<dyn CandidateSource>> {
        let proxy = &self.settings.proxy;
        Ok(match proxy.source {
            ProxySourceKind::File => {
                let path = proxy.list_path.clone().ok_or_else(|| {
                    Error::config("proxy list path is required", "proxy.list_path")
                })?;
                Box::new(ProxyFile::new(path, proxy.sample_size))
            }
            ProxySourceKind::Proxyscrape => {
                Box::new(ProxyScrape::new(self.transport.clone(), proxy.sample_size))
            }
            ProxySourceKind::FreeproxyWorld => {
                Box::new(FreeProxyWorld::new(self.transport.clone(), FREEPROXY_WORLD_PAGES))
            }
        })
    }

    fn stage_finished(&self, stage: &'static str, started: Instant) {
        self.observer.event(&Event::StageFinished {
            stage,
            elapsed: started.elapsed(),
        });
    }
}

/// Gap for a range where no page arrived.
fn unreachable_range(start: u32, end: u32) -> Error {
    let requested = u64::from(end) - u64::from(start) + 1;
    Error::FetchGap {
        requested: usize::try_from(requested).unwrap_or(usize::MAX),
        received: 0,
        missing: (start..=end).collect(),
    }
}
