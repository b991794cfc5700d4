use std::fmt;

/// A proxy connection string such as `http://10.0.0.1:8080`.
///
/// The value is never rewritten after it has been read from a source, so a
/// working proxy handed back by the validator is the same string that went in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProxyAddress(String);

impl ProxyAddress {
    /// Wraps `addr`, prepending `http://` when no scheme is present.
    pub fn parse(addr: &str) -> Option<Self> {
        let addr = addr.trim();
        let rest = match addr.split_once("://") {
            Some((scheme, rest)) if !scheme.is_empty() => rest,
            Some(_) => return None,
            None => addr,
        };

        let (host, port) = rest.rsplit_once(':')?;
        if host.is_empty() || port.parse::<u16>().is_err() {
            return None;
        }

        if addr.contains("://") {
            Some(Self(addr.to_string()))
        } else {
            Some(Self(format!("http://{}", addr)))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `host:port` without the scheme.
    pub fn host_port(&self) -> &str {
        match self.0.split_once("://") {
            Some((_, rest)) => rest,
            None => &self.0,
        }
    }
}

impl fmt::Display for ProxyAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of probing one candidate. Only `Working` survives validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Working,
    RateLimited,
    TimedOut,
    Failed(String),
}

impl ValidationOutcome {
    pub fn is_working(&self) -> bool {
        matches!(self, ValidationOutcome::Working)
    }
}

impl fmt::Display for ValidationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationOutcome::Working => write!(f, "WORKING"),
            ValidationOutcome::RateLimited => write!(f, "RATE LIMITED"),
            ValidationOutcome::TimedOut => write!(f, "TIMED OUT"),
            ValidationOutcome::Failed(reason) => write!(f, "FAILED ({})", reason),
        }
    }
}
