//! Metric collection over the management protocol
//!
//! The collector queries a fixed set of named attributes from a device
//! that already answered the reachability probe. Collection is explicitly
//! not all-or-nothing: each attribute is queried (and retried)
//! independently, and the result contains exactly the attributes that
//! succeeded. A device whose agent rejects every query simply yields an
//! empty mapping - the caller derives `Warning` from that.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, trace, warn};

use crate::Device;
use crate::error::QueryError;
use crate::snmp::{AttributeClient, ProtocolFactory};

/// Pause between attempts for one attribute
const RETRY_DELAY: Duration = Duration::from_millis(250);

/// Collects management-protocol attributes from reachable devices
pub struct MetricCollector {
    factory: Arc<dyn ProtocolFactory>,

    /// Attribute name -> protocol-specific query key
    attributes: BTreeMap<String, String>,

    /// Per-attempt timeout
    query_timeout: Duration,

    /// Extra attempts per attribute after the first one
    retries: usize,
}

impl MetricCollector {
    pub fn new(
        factory: Arc<dyn ProtocolFactory>,
        attributes: BTreeMap<String, String>,
        query_timeout: Duration,
        retries: usize,
    ) -> Self {
        Self {
            factory,
            attributes,
            query_timeout,
            retries,
        }
    }

    /// Query every configured attribute once, returning the partial
    /// mapping of attributes that answered.
    ///
    /// Must only be called after a successful reachability probe with
    /// collection enabled; querying an unreachable device is wasted work
    /// and a source of hangs.
    #[instrument(skip_all, fields(device = %device.display_name()))]
    pub async fn collect(&self, device: &Device) -> HashMap<String, String> {
        let client = match self.factory.open(device, self.query_timeout).await {
            Ok(client) => client,
            Err(e) => {
                warn!("could not open protocol session: {e}");
                return HashMap::new();
            }
        };

        let mut collected = HashMap::new();

        for (name, key) in &self.attributes {
            if let Some(value) = self.query_with_retry(client.as_ref(), name, key).await {
                collected.insert(name.clone(), value);
            }
        }

        debug!(
            "collected {}/{} attributes",
            collected.len(),
            self.attributes.len()
        );

        collected
    }

    /// Query one attribute, retrying independently of the others.
    ///
    /// Failures are absorbed here; they only reduce the result mapping.
    async fn query_with_retry(
        &self,
        client: &dyn AttributeClient,
        name: &str,
        key: &str,
    ) -> Option<String> {
        let attempts = self.retries + 1;

        for attempt in 1..=attempts {
            let result = tokio::time::timeout(self.query_timeout, client.query(key))
                .await
                .unwrap_or(Err(QueryError::Timeout));

            match result {
                Ok(value) => {
                    trace!("{name}: {value}");
                    return Some(value);
                }
                Err(e) => {
                    debug!("{name}: attempt {attempt}/{attempts} failed: {e}");
                }
            }

            if attempt < attempts {
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }

        debug!("{name}: giving up after {attempts} attempts");
        None
    }
}
