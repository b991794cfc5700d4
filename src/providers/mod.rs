pub mod file;
pub mod freeproxy_world;
pub mod proxyscrape;

use crate::error::Result;
use crate::proxy::ProxyAddress;
use std::path::Path;

/// Writes one `host:port` per line, readable by [`file::ProxyFile`].
pub async fn write_proxy_list(path: &Path, proxies: &[ProxyAddress]) -> Result<()> {
    let mut body = String::new();
    for proxy in proxies {
        body.push_str(proxy.host_port());
        body.push('\n');
    }
    tokio::fs::write(path, body).await?;
    Ok(())
}
