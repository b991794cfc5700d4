//! Concurrent proxy liveness checks.

use crate::error::{Error, Result, TransportError};
use crate::observer::{Event, Observer};
use crate::proxy::{ProxyAddress, ValidationOutcome};
use crate::transport::{Transport, TransportRequest};
use futures::stream::{self, StreamExt};
use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Wall-clock budget for one probe, proxy-error retries included.
    pub probe_timeout: Duration,
    /// Wait after a 429 before probing the same candidate again.
    pub rate_limit_cooldown: Duration,
    /// `None` keeps retrying rate-limited candidates forever.
    pub max_rate_limit_retries: Option<u32>,
    /// First backoff after a proxy-level transport error; doubles each time.
    pub initial_backoff: Duration,
    /// Random pause after a working verdict, drawn from `pacing.0..=pacing.1`.
    pub pacing: (Duration, Duration),
    pub max_concurrent_probes: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(30),
            rate_limit_cooldown: Duration::from_secs(60),
            max_rate_limit_retries: None,
            initial_backoff: Duration::from_secs(1),
            pacing: (Duration::from_millis(500), Duration::from_secs(5)),
            max_concurrent_probes: 100,
        }
    }
}

pub struct ProxyValidator {
    transport: Arc<dyn Transport>,
    observer: Arc<dyn Observer>,
    config: ValidatorConfig,
}

impl ProxyValidator {
    pub fn new(
        transport: Arc<dyn Transport>,
        observer: Arc<dyn Observer>,
        config: ValidatorConfig,
    ) -> Self {
        Self {
            transport,
            observer,
            config,
        }
    }

    /// Probes every candidate concurrently and returns the working ones.
    ///
    /// Order of the result follows completion, not input. An empty
    /// `check_urls` fails with [`Error::Config`] before any request is made;
    /// callers treat that as "no working proxies".
    pub async fn validate(
        &self,
        candidates: &[ProxyAddress],
        check_urls: &[String],
    ) -> Result<Vec<ProxyAddress>> {
        if check_urls.is_empty() {
            self.observer.event(&Event::ValidationAborted {
                reason: "no URL provided for proxy checking".to_string(),
            });
            return Err(Error::config(
                "no URL provided for proxy checking",
                "proxy.checker_urls",
            ));
        }

        let working = stream::iter(candidates.iter().enumerate())
            .map(|(index, proxy)| async move {
                let outcome = self.probe(index, proxy, check_urls).await;
                self.observer.event(&Event::ProbeFinished {
                    index,
                    proxy: proxy.clone(),
                    outcome: outcome.clone(),
                });
                outcome.is_working().then(|| proxy.clone())
            })
            .buffer_unordered(self.config.max_concurrent_probes.max(1))
            .filter_map(|proxy| async move { proxy })
            .collect::<Vec<_>>()
            .await;

        Ok(working)
    }

    /// Probes one candidate until it reaches a terminal outcome.
    ///
    /// A 429 is retried against a freshly drawn check URL after the cooldown;
    /// this loop replaces unbounded recursion.
    pub async fn probe(
        &self,
        index: usize,
        proxy: &ProxyAddress,
        check_urls: &[String],
    ) -> ValidationOutcome {
        let mut rate_limited = 0u32;

        loop {
            let url = match pick(check_urls) {
                Some(url) => url,
                None => return ValidationOutcome::Failed("no check URL".to_string()),
            };

            let attempt = self.attempt(index, proxy, url);
            let status = match tokio::time::timeout(self.config.probe_timeout, attempt).await {
                Ok(Ok(status)) => status,
                Ok(Err(TransportError::Timeout)) | Err(_) => return ValidationOutcome::TimedOut,
                Ok(Err(e)) => return ValidationOutcome::Failed(e.to_string()),
            };

            match status {
                200 => {
                    tokio::time::sleep(self.pacing_delay()).await;
                    return ValidationOutcome::Working;
                }
                429 => {
                    if let Some(max) = self.config.max_rate_limit_retries {
                        if rate_limited >= max {
                            return ValidationOutcome::RateLimited;
                        }
                    }
                    rate_limited += 1;
                    self.observer.event(&Event::RateLimited {
                        index,
                        proxy: proxy.clone(),
                        cooldown: self.config.rate_limit_cooldown,
                    });
                    tokio::time::sleep(self.config.rate_limit_cooldown).await;
                }
                504 => {
                    return ValidationOutcome::Failed(format!("gateway timeout - URL: {}", url))
                }
                other => {
                    return ValidationOutcome::Failed(format!("status {} - URL: {}", other, url))
                }
            }
        }
    }

    /// One request against `url`, retrying proxy-level errors with
    /// exponential backoff.
    async fn attempt(
        &self,
        index: usize,
        proxy: &ProxyAddress,
        url: &str,
    ) -> std::result::Result<u16, TransportError> {
        let request = TransportRequest::new(url, self.config.probe_timeout)
            .via(Some(proxy.clone()))
            .verify_tls(false);
        let mut delay = self.config.initial_backoff;

        loop {
            match self.transport.get(&request).await {
                Ok(resp) => return Ok(resp.status),
                Err(TransportError::Proxy(e)) => {
                    self.observer.event(&Event::ProxyErrorBackoff {
                        index,
                        proxy: proxy.clone(),
                        error: e,
                        delay,
                    });
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn pacing_delay(&self) -> Duration {
        let (min, max) = self.config.pacing;
        if max <= min {
            return min;
        }
        let secs = rand::thread_rng().gen_range(min.as_secs_f64()..=max.as_secs_f64());
        Duration::from_secs_f64(secs)
    }
}

fn pick(urls: &[String]) -> Option<&str> {
    urls.choose(&mut rand::thread_rng()).map(String::as_str)
}
