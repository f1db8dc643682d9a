//! Service advertisement seam.
//!
//! The gateway announces itself through a [`ServiceAdvertiser`] when service
//! discovery is enabled. No concrete advertiser ships with the crate; hosts
//! plug in mDNS or whatever their network uses.

use std::collections::BTreeMap;

use async_trait::async_trait;

/// Service type the gateway advertises under.
pub const SERVICE_TYPE: &str = "zwave-js-server";

/// Advertisement failures.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// The advertiser refused or failed to publish the service.
    #[error("service advertisement failed: {0}")]
    Publish(String),
}

/// What gets advertised.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceInfo {
    /// Instance name (the controller's home id).
    pub name: String,
    /// Service type.
    pub service_type: String,
    /// Listening port.
    pub port: u16,
    /// TXT record entries.
    pub txt: BTreeMap<String, String>,
}

impl ServiceInfo {
    /// Describe a gateway for controller `home_id` listening on `port`.
    pub fn for_gateway(home_id: Option<u32>, port: u16) -> Self {
        let name = home_id.map_or_else(|| "unknown".to_string(), |id| id.to_string());
        let mut txt = BTreeMap::new();
        let _ = txt.insert("serverVersion".to_string(), crate::SERVER_VERSION.to_string());
        if let Some(id) = home_id {
            let _ = txt.insert("homeId".to_string(), id.to_string());
        }
        Self {
            name,
            service_type: SERVICE_TYPE.to_string(),
            port,
            txt,
        }
    }
}

/// Publishes a service on the network.
#[async_trait]
pub trait ServiceAdvertiser: Send + Sync {
    /// Start advertising `info`.
    async fn advertise(&self, info: ServiceInfo) -> Result<Box<dyn Advertisement>, DiscoveryError>;
}

/// A live advertisement.
#[async_trait]
pub trait Advertisement: Send + Sync {
    /// Withdraw the advertisement.
    async fn stop(self: Box<Self>);
}
