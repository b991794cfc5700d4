use crate::error::Result;
use crate::proxy::ProxyAddress;
use async_trait::async_trait;

/// Supplies candidate proxies for validation.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    async fn list(&mut self) -> Result<Vec<ProxyAddress>>;
    fn name(&self) -> &'static str;
}
