//! Cluster-wide broker bookkeeping.
//!
//! A [`BrokerSet`] resolves the bootstrap list, learns the cluster's broker
//! map from metadata, and hands out connections by broker id: cached for
//! coordination traffic, dedicated for partition fetchers.

use std::collections::HashMap;
use std::sync::Mutex as StdMutex;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use lodbrok_common::{Error, Result};
use lodbrok_protocol::metadata_types::MetadataResponse;

use crate::broker::Broker;

/// The set of brokers reachable in one cluster.
pub struct BrokerSet {
    client_id: String,
    connect_timeout: Duration,
    timeout: Duration,
    /// The first reachable bootstrap broker; answers metadata and
    /// coordinator lookups.
    bootstrap: Arc<Broker>,
    /// node id -> host:port, learned from metadata responses.
    addresses: StdMutex<HashMap<i32, String>>,
    /// Cached connections by broker id; exclusively owned here for their
    /// lifetime and closed on shutdown.
    cache: Mutex<HashMap<i32, Arc<Broker>>>,
}

impl BrokerSet {
    /// Try the comma-separated bootstrap list in order; the first broker
    /// that accepts a connection seeds the cluster map.
    pub async fn connect(
        bootstrap_servers: &str,
        client_id: &str,
        connect_timeout: Duration,
        timeout: Duration,
    ) -> Result<BrokerSet> {
        let mut last_error = None;
        for address in bootstrap_servers.split(',').map(str::trim) {
            if address.is_empty() {
                continue;
            }
            match Broker::connect(address, client_id, -1, connect_timeout, timeout).await {
                Ok(broker) => {
                    let set = BrokerSet {
                        client_id: client_id.to_string(),
                        connect_timeout,
                        timeout,
                        bootstrap: Arc::new(broker),
                        addresses: StdMutex::new(HashMap::new()),
                        cache: Mutex::new(HashMap::new()),
                    };
                    let metadata = set.bootstrap.metadata(&[]).await?;
                    set.record_brokers(&metadata);
                    info!(
                        bootstrap = address,
                        brokers = metadata.brokers.len(),
                        "cluster metadata bootstrapped"
                    );
                    return Ok(set);
                }
                Err(error) => {
                    warn!(address, %error, "bootstrap broker unreachable");
                    last_error = Some(error);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| Error::Configuration("empty bootstrap server list".into())))
    }

    fn record_brokers(&self, metadata: &MetadataResponse) {
        let mut addresses = self.addresses.lock().expect("address map poisoned");
        for broker in &metadata.brokers {
            addresses.insert(broker.node_id, format!("{}:{}", broker.host, broker.port));
        }
    }

    fn address_of(&self, node_id: i32) -> Result<String> {
        self.addresses
            .lock()
            .expect("address map poisoned")
            .get(&node_id)
            .cloned()
            .ok_or_else(|| Error::Network(format!("no known address for broker {}", node_id)))
    }

    /// The brokers known so far, as (node id, host:port) pairs.
    pub fn known_brokers(&self) -> Vec<(i32, String)> {
        let addresses = self.addresses.lock().expect("address map poisoned");
        let mut brokers: Vec<_> = addresses
            .iter()
            .map(|(node_id, address)| (*node_id, address.clone()))
            .collect();
        brokers.sort_unstable_by_key(|(node_id, _)| *node_id);
        brokers
    }

    /// Topic metadata via the bootstrap broker; refreshes the broker map
    /// as a side effect.
    pub async fn metadata(&self, topics: &[String]) -> Result<MetadataResponse> {
        let metadata = self.bootstrap.metadata(topics).await?;
        self.record_brokers(&metadata);
        Ok(metadata)
    }

    /// The cached connection for `node_id`, created on first use.
    pub async fn get_broker(&self, node_id: i32) -> Result<Arc<Broker>> {
        let mut cache = self.cache.lock().await;
        if let Some(broker) = cache.get(&node_id) {
            return Ok(broker.clone());
        }

        let address = self.address_of(node_id)?;
        let broker = Arc::new(
            Broker::connect(
                &address,
                &self.client_id,
                node_id,
                self.connect_timeout,
                self.timeout,
            )
            .await?,
        );
        debug!(node_id, address = broker.address(), "broker connection cached");
        cache.insert(node_id, broker.clone());
        Ok(broker)
    }

    /// A dedicated, uncached connection for `node_id`. Partition fetchers
    /// use these so they never share a connection with anything else; the
    /// caller owns the connection and closes it.
    pub async fn open_broker(&self, node_id: i32) -> Result<Broker> {
        let address = self.address_of(node_id)?;
        Broker::connect(
            &address,
            &self.client_id,
            node_id,
            self.connect_timeout,
            self.timeout,
        )
        .await
    }

    /// Who coordinates `group_id`? Returns the (cached) connection to that
    /// broker.
    pub async fn find_coordinator(&self, group_id: &str) -> Result<Arc<Broker>> {
        let response = self.bootstrap.find_coordinator(group_id).await?;
        let coordinator = response.coordinator;
        debug!(
            group = group_id,
            node_id = coordinator.node_id,
            host = %coordinator.host,
            "group coordinator located"
        );
        {
            let mut addresses = self.addresses.lock().expect("address map poisoned");
            addresses.insert(
                coordinator.node_id,
                format!("{}:{}", coordinator.host, coordinator.port),
            );
        }
        self.get_broker(coordinator.node_id).await
    }

    /// Close the bootstrap connection and every cached broker.
    pub async fn close(&self) {
        self.bootstrap.close();
        for (_, broker) in self.cache.lock().await.drain() {
            broker.close();
        }
    }
}
