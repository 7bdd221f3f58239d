//! Local-network discovery of the sync host.
//!
//! The host advertises one fixed service instance over DNS-SD; devices
//! browse for it with a bounded wait. Browsing and advertising sit behind
//! traits so the race between a match and the timeout can be exercised
//! without a multicast network.

use futures::channel::mpsc;
use futures::stream::{BoxStream, StreamExt};
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo, UnregisterStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

use lanvault_common::{Error, Result};

/// Instance name the host advertises under.
pub const SERVICE_INSTANCE: &str = "LanVault-Sync";

/// DNS-SD service type of the host.
pub const SERVICE_TYPE: &str = "_http._tcp.local.";

/// TXT key/value identifying a LanVault host.
pub const TXT_SERVICE_KEY: &str = "service";
pub const TXT_SERVICE_VALUE: &str = "vault-sync";

/// TXT key carrying the host version.
pub const TXT_VERSION_KEY: &str = "version";

/// How long `discover` waits by default.
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_millis(5000);

/// How long withdrawing waits for the goodbye packets to go out.
const GOODBYE_TIMEOUT: Duration = Duration::from_secs(1);

/// A resolved service seen while browsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRecord {
    pub instance: String,
    pub host_name: String,
    pub addresses: Vec<IpAddr>,
    pub port: u16,
    pub txt: HashMap<String, String>,
}

/// What a host publishes about itself.
#[derive(Debug, Clone)]
pub struct Announcement {
    pub instance: String,
    pub port: u16,
    pub txt: HashMap<String, String>,
    /// Addresses to publish. Empty means every local interface.
    pub addresses: Vec<IpAddr>,
}

impl Announcement {
    /// The standard LanVault host announcement.
    pub fn sync_host(port: u16, version: &str) -> Self {
        let mut txt = HashMap::new();
        txt.insert(TXT_SERVICE_KEY.to_string(), TXT_SERVICE_VALUE.to_string());
        txt.insert(TXT_VERSION_KEY.to_string(), version.to_string());
        Self {
            instance: SERVICE_INSTANCE.to_string(),
            port,
            txt,
            addresses: Vec::new(),
        }
    }
}

/// Address of a discovered host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostInfo {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub url: String,
}

impl HostInfo {
    /// Build from a record, preferring an IPv4 address over IPv6 and
    /// falling back to the advertised host name.
    pub fn from_record(record: &ServiceRecord) -> Self {
        let address = record
            .addresses
            .iter()
            .find(|a| a.is_ipv4())
            .or_else(|| record.addresses.first());

        let (host, url_host) = match address {
            Some(IpAddr::V6(v6)) => (v6.to_string(), format!("[{}]", v6)),
            Some(ip) => (ip.to_string(), ip.to_string()),
            None => {
                let name = record.host_name.trim_end_matches('.').to_string();
                (name.clone(), name)
            }
        };

        Self {
            name: record.instance.clone(),
            url: format!("http://{}:{}", url_host, record.port),
            host,
            port: record.port,
        }
    }
}

type StopFn = Box<dyn FnOnce() + Send>;

/// An active browse. The underlying listener is released exactly once,
/// either by `stop` or on drop.
pub struct BrowseSession {
    records: BoxStream<'static, ServiceRecord>,
    stop: Option<StopFn>,
}

impl BrowseSession {
    pub fn new(records: BoxStream<'static, ServiceRecord>, stop: impl FnOnce() + Send + 'static) -> Self {
        Self {
            records,
            stop: Some(Box::new(stop)),
        }
    }

    /// Next resolved service, or `None` once the browse has ended.
    pub async fn next(&mut self) -> Option<ServiceRecord> {
        if self.stop.is_none() {
            return None;
        }
        self.records.next().await
    }

    /// Release the listener. Further calls do nothing.
    pub fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            stop();
        }
    }
}

impl Drop for BrowseSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// A published service. Withdrawn when dropped.
pub struct Advertisement {
    withdraw: Option<StopFn>,
}

impl Advertisement {
    pub fn new(withdraw: impl FnOnce() + Send + 'static) -> Self {
        Self {
            withdraw: Some(Box::new(withdraw)),
        }
    }

    /// Withdraw the service now.
    pub fn withdraw(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(withdraw) = self.withdraw.take() {
            withdraw();
        }
    }
}

impl Drop for Advertisement {
    fn drop(&mut self) {
        self.release();
    }
}

/// Source of service records for a service type.
pub trait ServiceBrowser: Send + Sync {
    fn browse(&self, service_type: &str) -> Result<BrowseSession>;
}

/// Publisher of service records.
pub trait ServiceAdvertiser: Send + Sync {
    fn advertise(&self, announcement: &Announcement) -> Result<Advertisement>;
}

/// Wait up to `timeout` for the LanVault host to answer.
///
/// Resolves with the first matching host, or `None` once the timeout has
/// elapsed. A browse that ends early still waits out the full timeout, so
/// `None` never comes back sooner. The browse is stopped before returning
/// on either path.
pub async fn discover(browser: &dyn ServiceBrowser, timeout: Duration) -> Result<Option<HostInfo>> {
    let mut session = browser.browse(SERVICE_TYPE)?;
    debug!(timeout_ms = timeout.as_millis() as u64, "Browsing for sync host");

    let matched = tokio::time::timeout(timeout, async {
        while let Some(record) = session.next().await {
            if record.instance == SERVICE_INSTANCE {
                return HostInfo::from_record(&record);
            }
            debug!(instance = %record.instance, "Ignoring unrelated service");
        }
        futures::future::pending::<HostInfo>().await
    })
    .await;

    session.stop();

    match matched {
        Ok(host) => {
            info!(url = %host.url, "Sync host discovered");
            Ok(Some(host))
        }
        Err(_) => {
            debug!("No sync host answered before the timeout");
            Ok(None)
        }
    }
}

/// Browser backed by multicast DNS.
pub struct MdnsBrowser {
    daemon: ServiceDaemon,
}

impl MdnsBrowser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            daemon: new_daemon()?,
        })
    }
}

impl ServiceBrowser for MdnsBrowser {
    fn browse(&self, service_type: &str) -> Result<BrowseSession> {
        let receiver = self
            .daemon
            .browse(service_type)
            .map_err(|e| Error::Discovery(format!("Failed to start browse: {}", e)))?;

        let suffix = format!(".{}", service_type);
        let records = futures::stream::unfold(receiver, move |rx| {
            let suffix = suffix.clone();
            async move {
                loop {
                    match rx.recv_async().await {
                        Ok(ServiceEvent::ServiceResolved(info)) => {
                            return Some((record_from_info(&info, &suffix), rx));
                        }
                        Ok(_) => continue,
                        Err(_) => return None,
                    }
                }
            }
        })
        .boxed();

        let daemon = self.daemon.clone();
        let service_type = service_type.to_string();
        Ok(BrowseSession::new(records, move || {
            if let Err(e) = daemon.stop_browse(&service_type) {
                debug!(error = %e, "Stopping browse failed");
            }
        }))
    }
}

/// Advertiser backed by multicast DNS.
pub struct MdnsAdvertiser {
    daemon: ServiceDaemon,
}

impl MdnsAdvertiser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            daemon: new_daemon()?,
        })
    }
}

impl ServiceAdvertiser for MdnsAdvertiser {
    fn advertise(&self, announcement: &Announcement) -> Result<Advertisement> {
        let host_name = format!("{}.local.", announcement.instance.to_lowercase());
        let service = ServiceInfo::new(
            SERVICE_TYPE,
            &announcement.instance,
            &host_name,
            &announcement.addresses[..],
            announcement.port,
            announcement.txt.clone(),
        )
        .map_err(|e| Error::Discovery(format!("Invalid service record: {}", e)))?;
        let service = if announcement.addresses.is_empty() {
            service.enable_addr_auto()
        } else {
            service
        };

        let fullname = service.get_fullname().to_string();
        self.daemon
            .register(service)
            .map_err(|e| Error::Discovery(format!("Failed to advertise: {}", e)))?;
        info!(instance = %announcement.instance, port = announcement.port, "Advertising sync host");

        let daemon = self.daemon.clone();
        Ok(Advertisement::new(move || match daemon.unregister(&fullname) {
            Ok(status) => {
                goodbye_sent(status.recv_timeout(GOODBYE_TIMEOUT));
            }
            Err(e) => warn!(error = %e, "Failed to withdraw advertisement"),
        }))
    }
}

/// Log how a withdrawal ended. True once the daemon confirmed it.
fn goodbye_sent<E: Display>(status: std::result::Result<UnregisterStatus, E>) -> bool {
    match status {
        Ok(UnregisterStatus::OK) => {
            debug!("Advertisement withdrawn");
            true
        }
        Ok(UnregisterStatus::NotFound) => {
            debug!("Advertisement was already gone");
            false
        }
        Err(e) => {
            warn!(error = %e, "No confirmation that the advertisement was withdrawn");
            false
        }
    }
}

fn new_daemon() -> Result<ServiceDaemon> {
    ServiceDaemon::new().map_err(|e| Error::Discovery(format!("Failed to start mDNS: {}", e)))
}

fn record_from_info(info: &ServiceInfo, suffix: &str) -> ServiceRecord {
    let fullname = info.get_fullname();
    let instance = fullname.strip_suffix(suffix).unwrap_or(fullname).to_string();
    let txt = info
        .get_properties()
        .iter()
        .map(|p| (p.key().to_string(), p.val_str().to_string()))
        .collect();

    ServiceRecord {
        instance,
        host_name: info.get_hostname().to_string(),
        addresses: info.get_addresses().iter().copied().collect(),
        port: info.get_port(),
        txt,
    }
}

#[derive(Default)]
struct NetworkState {
    services: HashMap<String, ServiceRecord>,
    browsers: HashMap<u64, mpsc::UnboundedSender<ServiceRecord>>,
    next_browser: u64,
    stops: usize,
}

/// In-process network implementing both browsing and advertising.
///
/// Clones share one network, so a test can advertise on one handle and
/// browse on another.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Browses still holding a listener.
    pub fn active_browses(&self) -> usize {
        self.state.lock().map(|s| s.browsers.len()).unwrap_or(0)
    }

    /// Total number of browse releases so far.
    pub fn stop_count(&self) -> usize {
        self.state.lock().map(|s| s.stops).unwrap_or(0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, NetworkState>> {
        self.state
            .lock()
            .map_err(|_| Error::Discovery("Network state lock poisoned".to_string()))
    }
}

impl ServiceBrowser for MemoryNetwork {
    fn browse(&self, _service_type: &str) -> Result<BrowseSession> {
        let (tx, rx) = mpsc::unbounded();
        let id = {
            let mut state = self.lock()?;
            for record in state.services.values() {
                let _ = tx.unbounded_send(record.clone());
            }
            let id = state.next_browser;
            state.next_browser += 1;
            state.browsers.insert(id, tx);
            id
        };

        let state = self.state.clone();
        Ok(BrowseSession::new(rx.boxed(), move || {
            if let Ok(mut state) = state.lock() {
                state.browsers.remove(&id);
                state.stops += 1;
            }
        }))
    }
}

impl ServiceAdvertiser for MemoryNetwork {
    fn advertise(&self, announcement: &Announcement) -> Result<Advertisement> {
        let record = ServiceRecord {
            instance: announcement.instance.clone(),
            host_name: "localhost.".to_string(),
            addresses: announcement.addresses.clone(),
            port: announcement.port,
            txt: announcement.txt.clone(),
        };

        {
            let mut state = self.lock()?;
            for tx in state.browsers.values() {
                let _ = tx.unbounded_send(record.clone());
            }
            state.services.insert(record.instance.clone(), record);
        }

        let state = self.state.clone();
        let instance = announcement.instance.clone();
        Ok(Advertisement::new(move || {
            if let Ok(mut state) = state.lock() {
                state.services.remove(&instance);
            }
        }))
    }
}
