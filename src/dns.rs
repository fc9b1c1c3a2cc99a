//! DNS-based service discovery (RFC 6764): SRV records locate the server, TXT records its context path

use async_trait::async_trait;
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::TokioAsyncResolver;

use crate::error::{DavError, Result};

/// A single SRV record
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SrvRecord {
    /// Host name, without its trailing dot
    pub target: String,
    pub port: u16,
    pub priority: u16,
    pub weight: u16,
}

/// Something that can look SRV and TXT records up.
///
/// Lookups have no timeout of their own: callers bound the whole operation instead.
/// A name that has no records is an `Ok` with an empty list.
#[async_trait]
pub trait DnsServiceResolver: Send + Sync {
    async fn lookup_srv(&self, name: &str) -> Result<Vec<SrvRecord>>;
    /// Every TXT record, its character-strings joined together
    async fn lookup_txt(&self, name: &str) -> Result<Vec<String>>;
}

/// Pick the record to use: lowest priority first, then highest weight.
///
/// A record whose target is `.` means the service is explicitly not provided.
pub fn select_srv(records: &[SrvRecord]) -> Option<&SrvRecord> {
    let best = records.iter()
        .min_by(|a, b| a.priority.cmp(&b.priority).then(b.weight.cmp(&a.weight)))?;
    if best.target.is_empty() || best.target == "." {
        log::debug!("SRV record explicitly states the service is not available");
        return None;
    }
    Some(best)
}

/// Extract the `path=` values of TXT records, in record order
pub fn txt_paths(records: &[String]) -> Vec<String> {
    records.iter()
        .flat_map(|record| record.split_whitespace())
        .filter_map(|pair| pair.strip_prefix("path="))
        .filter(|path| path.starts_with('/'))
        .map(|path| path.to_string())
        .collect()
}

/// A resolver that uses the system DNS configuration
pub struct HickoryResolver {
    resolver: TokioAsyncResolver,
}

impl HickoryResolver {
    pub fn from_system_conf() -> Result<Self> {
        let resolver = TokioAsyncResolver::tokio_from_system_conf()
            .map_err(|err| DavError::Network(format!("unable to read the system DNS configuration: {}", err)))?;
        Ok(Self { resolver })
    }
}

fn map_resolve_error<T>(name: &str, err: ResolveError) -> Result<Vec<T>> {
    match err.kind() {
        ResolveErrorKind::NoRecordsFound { .. } => {
            log::debug!("No DNS record for {}", name);
            Ok(Vec::new())
        },
        _ => Err(DavError::Network(format!("DNS lookup of {} failed: {}", name, err))),
    }
}

#[async_trait]
impl DnsServiceResolver for HickoryResolver {
    async fn lookup_srv(&self, name: &str) -> Result<Vec<SrvRecord>> {
        let lookup = match self.resolver.srv_lookup(name).await {
            Ok(lookup) => lookup,
            Err(err) => return map_resolve_error(name, err),
        };

        Ok(lookup.iter()
            .map(|srv| SrvRecord {
                target: srv.target().to_utf8().trim_end_matches('.').to_string(),
                port: srv.port(),
                priority: srv.priority(),
                weight: srv.weight(),
            })
            .collect())
    }

    async fn lookup_txt(&self, name: &str) -> Result<Vec<String>> {
        let lookup = match self.resolver.txt_lookup(name).await {
            Ok(lookup) => lookup,
            Err(err) => return map_resolve_error(name, err),
        };

        Ok(lookup.iter()
            .map(|txt| {
                txt.txt_data().iter()
                    .map(|data| String::from_utf8_lossy(data).into_owned())
                    .collect::<String>()
            })
            .collect())
    }
}
