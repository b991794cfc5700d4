pub mod classifier;
pub mod configuration;
pub mod error;
pub mod extract;
pub mod fetcher;
pub mod observer;
pub mod pipeline;
pub mod provider;
pub mod providers;
pub mod proxy;
pub mod store;
pub mod transport;
pub mod verification;

pub use configuration::Settings;
pub use error::{Error, Result, TransportError};
pub use observer::{Event, LogObserver, NoopObserver, Observer};
pub use pipeline::{Pipeline, RunReport};
pub use proxy::{ProxyAddress, ValidationOutcome};
pub use transport::{ReqwestTransport, Transport};
