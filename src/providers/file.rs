use crate::error::{Error, Result};
use crate::provider::CandidateSource;
use crate::proxy::ProxyAddress;
use async_trait::async_trait;
use log::{info, warn};
use rand::seq::SliceRandom;
use std::path::PathBuf;

/// Random sample of proxies from a delimited `host:port` list file.
///
/// Only the first comma separated field of each line is used. A header line
/// without a port is skipped; any other unparsable line is a configuration
/// error, as is a missing or empty file.
pub struct ProxyFile {
    path: PathBuf,
    sample_size: usize,
}

impl ProxyFile {
    pub fn new(path: impl Into<PathBuf>, sample_size: usize) -> Self {
        Self {
            path: path.into(),
            sample_size,
        }
    }

    async fn read_all(&self) -> Result<Vec<ProxyAddress>> {
        let body = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            Error::config(
                format!("cannot read proxy list {}: {}", self.path.display(), e),
                "proxy.list_path",
            )
        })?;

        let mut proxies = Vec::new();
        for (lineno, line) in body.lines().enumerate() {
            let field = line.split(',').next().unwrap_or("").trim();
            if field.is_empty() {
                continue;
            }

            match ProxyAddress::parse(field) {
                Some(proxy) => proxies.push(proxy),
                None if lineno == 0 && !field.contains(':') => continue,
                None => {
                    return Err(Error::config(
                        format!(
                            "malformed proxy entry {:?} at {}:{}",
                            field,
                            self.path.display(),
                            lineno + 1
                        ),
                        "proxy.list_path",
                    ))
                }
            }
        }

        if proxies.is_empty() {
            return Err(Error::config(
                format!("proxy list {} is empty", self.path.display()),
                "proxy.list_path",
            ));
        }
        Ok(proxies)
    }
}

#[async_trait]
impl CandidateSource for ProxyFile {
    async fn list(&mut self) -> Result<Vec<ProxyAddress>> {
        let all = self.read_all().await?;
        if all.len() < self.sample_size {
            warn!(
                "proxy list {} holds {} entries, fewer than the requested sample of {}",
                self.path.display(),
                all.len(),
                self.sample_size
            );
        }

        let sample: Vec<ProxyAddress> = {
            let mut rng = rand::thread_rng();
            all.choose_multiple(&mut rng, self.sample_size)
                .cloned()
                .collect()
        };
        info!("{} sampled {} of {} proxies", self.name(), sample.len(), all.len());
        Ok(sample)
    }

    fn name(&self) -> &'static str {
        "proxy list file"
    }
}
