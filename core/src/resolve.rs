//! Host name resolution performed inside the connect deadline.
//!
//! Resolution is asynchronous so an unresponsive resolver is cut off by
//! `connect_timeout` like any other connect step. [`SystemResolver`] runs
//! `getaddrinfo` on the runtime's blocking pool; callers can substitute their
//! own [`Resolve`] implementation through [`crate::SecureClient::dns_resolver`].

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;

/// Addresses produced by a resolver. Ports are replaced by the URL's port.
pub type Addrs = Box<dyn Iterator<Item = SocketAddr> + Send>;

/// Future returned by [`Resolve::resolve`].
pub type Resolving = Pin<Box<dyn Future<Output = io::Result<Addrs>> + Send>>;

/// Turns a host name or IP literal into socket addresses.
pub trait Resolve: Send + Sync {
    fn resolve(&self, host: &str) -> Resolving;
}

/// Resolver backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl Resolve for SystemResolver {
    fn resolve(&self, host: &str) -> Resolving {
        let host = host.to_string();
        Box::pin(async move {
            let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host.as_str(), 0))
                .await?
                .collect();
            Ok::<Addrs, io::Error>(Box::new(addrs.into_iter()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ip_literals_resolve_without_lookup() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let addrs: Vec<SocketAddr> = runtime
            .block_on(SystemResolver.resolve("127.0.0.1"))
            .unwrap()
            .collect();
        assert_eq!(addrs.len(), 1);
        assert!(addrs[0].ip().is_loopback());
    }
}
