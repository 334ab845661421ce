//! Out-of-band reverse DNS for connection records
//!
//! Lookups are fire-and-forget on the blocking pool. There is no
//! cancellation: a record dropped from the connection list while its lookup
//! is still running just receives the hostname and is then freed.

use anyhow::{Context, Result};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::runtime::Handle;

use crate::address_filter::should_resolve;
use crate::process::ConnectionRecord;

/// Resolves a remote address to a hostname
pub trait HostnameResolver: Send + Sync {
    /// Start resolving `record.remote_addr`; must return immediately
    fn resolve(&self, record: Arc<ConnectionRecord>);
}

/// Resolve via the system resolver (`getnameinfo`)
pub struct DnsLookupResolver {
    handle: Handle,
}

impl DnsLookupResolver {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Resolver bound to the runtime the caller is running on
    pub fn current() -> Result<Self> {
        let handle = Handle::try_current().context("Hostname resolution needs a tokio runtime")?;
        Ok(Self::new(handle))
    }
}

impl HostnameResolver for DnsLookupResolver {
    fn resolve(&self, record: Arc<ConnectionRecord>) {
        self.handle.spawn_blocking(move || {
            let addr = record.remote_addr;
            match lookup(&addr) {
                Some(host) => {
                    log::debug!("Resolved {} -> {}", addr, host);
                    record.set_remote_hostname(host);
                }
                None => log::trace!("No hostname for {}", addr),
            }
        });
    }
}

/// Reverse lookup, `None` on failure or when the answer is just the address again
fn lookup(addr: &IpAddr) -> Option<String> {
    let host = dns_lookup::lookup_addr(addr).ok()?;
    (host != addr.to_string()).then_some(host)
}

/// Hand a new record to the resolver unless its address is local
///
/// Returns whether a lookup was started.
pub fn resolve_if_public(resolver: &dyn HostnameResolver, record: &Arc<ConnectionRecord>) -> bool {
    if !should_resolve(&record.remote_addr) || record.remote_hostname().is_some() {
        return false;
    }
    resolver.resolve(Arc::clone(record));
    true
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::backends::process::TcpState;
    use std::sync::Mutex;

    /// Records every address handed to it without doing any lookups
    #[derive(Default)]
    pub(crate) struct RecordingResolver {
        pub requested: Mutex<Vec<Arc<ConnectionRecord>>>,
    }

    impl RecordingResolver {
        pub(crate) fn addresses(&self) -> Vec<String> {
            self.requested
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.remote_addr.to_string())
                .collect()
        }
    }

    impl HostnameResolver for RecordingResolver {
        fn resolve(&self, record: Arc<ConnectionRecord>) {
            self.requested.lock().unwrap().push(record);
        }
    }

    fn record(addr: &str) -> Arc<ConnectionRecord> {
        Arc::new(ConnectionRecord::new(addr.parse().unwrap(), 443, 50000, TcpState::Established))
    }

    #[test]
    fn test_only_public_addresses_are_resolved() {
        let resolver = RecordingResolver::default();

        assert!(resolve_if_public(&resolver, &record("8.8.8.8")));
        assert!(!resolve_if_public(&resolver, &record("192.168.1.5")));
        assert!(!resolve_if_public(&resolver, &record("127.0.0.1")));

        assert_eq!(resolver.addresses(), ["8.8.8.8"]);
    }

    #[test]
    fn test_already_resolved_is_skipped() {
        let resolver = RecordingResolver::default();
        let rec = record("8.8.4.4");
        rec.set_remote_hostname("dns.google".to_string());

        assert!(!resolve_if_public(&resolver, &rec));
        assert!(resolver.addresses().is_empty());
    }

    #[tokio::test]
    async fn test_late_resolution_after_drop_is_harmless() {
        // Resolver that finishes only after the caller has dropped its copy
        struct SlowResolver {
            done: tokio::sync::mpsc::UnboundedSender<bool>,
        }

        impl HostnameResolver for SlowResolver {
            fn resolve(&self, record: Arc<ConnectionRecord>) {
                let done = self.done.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                    let stored = record.set_remote_hostname("late.example".to_string());
                    let _ = done.send(stored);
                });
            }
        }

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let resolver = SlowResolver { done: tx };

        let rec = record("8.8.8.8");
        assert!(resolve_if_public(&resolver, &rec));
        drop(rec);

        assert_eq!(rx.recv().await, Some(true));
    }
}
