// # Hickory TXT Resolver
//
// Looks up ownership markers over DNS for the asg-dns reconciler.
//
// ## Behavior
//
// - Names are queried fully qualified, so search domains never apply
// - A name with no TXT records (including NXDOMAIN) resolves to an empty
//   list, which the ownership tracker reads as "no marker"
// - Every other lookup failure is returned as an error
// - Multi-string TXT records are joined back into one value
//
// Markers are written with a 60 second TTL, so a marker created moments ago
// may still be negatively cached by the upstream resolver. The reconciler
// tolerates that as `OwnershipNotFound`.

use asg_dns_core::traits::TxtResolver;
use asg_dns_core::{Error, Result};
use async_trait::async_trait;
use hickory_resolver::config::ResolverConfig;
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::{ResolveError, Resolver};
use std::sync::Arc;
use tracing::debug;

/// TXT resolver backed by hickory-resolver
#[derive(Clone)]
pub struct HickoryTxtResolver {
    resolver: Arc<Resolver<TokioConnectionProvider>>,
}

impl HickoryTxtResolver {
    /// Create a resolver from the system configuration (`/etc/resolv.conf`)
    pub fn from_system_conf() -> Result<Self> {
        let resolver = Resolver::builder_tokio()
            .map_err(|e| Error::config(format!("reading system resolver config: {}", e)))?
            .build();

        Ok(Self {
            resolver: Arc::new(resolver),
        })
    }

    /// Create a resolver using explicit upstream servers
    pub fn with_config(config: ResolverConfig) -> Self {
        let resolver =
            Resolver::builder_with_config(config, TokioConnectionProvider::default()).build();

        Self {
            resolver: Arc::new(resolver),
        }
    }
}

/// Absolute form of `name`
fn fqdn(name: &str) -> String {
    format!("{}.", name.trim_end_matches('.'))
}

fn lookup_error(name: &str, err: ResolveError) -> Error {
    Error::Other(format!("TXT lookup for {} failed: {}", name, err))
}

#[async_trait]
impl TxtResolver for HickoryTxtResolver {
    async fn resolve_txt(&self, name: &str) -> Result<Vec<String>> {
        let query = fqdn(name);

        let lookup = match self.resolver.txt_lookup(query.as_str()).await {
            Ok(lookup) => lookup,
            Err(e) if e.is_no_records_found() => {
                debug!("No TXT records at {}", query);
                return Ok(Vec::new());
            }
            Err(e) => return Err(lookup_error(name, e)),
        };

        let values: Vec<String> = lookup
            .iter()
            .map(|txt| {
                txt.txt_data()
                    .iter()
                    .map(|chunk| String::from_utf8_lossy(chunk))
                    .collect::<String>()
            })
            .collect();

        debug!("Resolved {} TXT value(s) at {}", values.len(), query);
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fqdn() {
        assert_eq!(fqdn("i-1.eu-west-1.example.com"), "i-1.eu-west-1.example.com.");
        assert_eq!(fqdn("i-1.eu-west-1.example.com."), "i-1.eu-west-1.example.com.");
    }

    #[tokio::test]
    async fn test_with_config_builds_without_network() {
        let resolver = HickoryTxtResolver::with_config(ResolverConfig::default());
        let _shared = resolver.clone();
    }
}
