//! Server assembly.
//!
//! The builder collects, in any order: listening ports with credentials,
//! typed services, the generic endpoint with its fan, and sync-over-async
//! sugar registrations. `build_and_start` consumes it and returns a
//! running [`Server`].

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};

use transport::{Credentials, MethodSchema, Router};

use crate::context::ServerContext;
use crate::dispatch::{BoundPort, Server};
use crate::fan::Fan;
use crate::handler::ErasedHandler;
use crate::service::{MethodDef, ServiceDef};

/// Errors detected while assembling a server.
#[derive(Debug)]
pub enum BuildError {
    /// Two registrations claimed the same method path.
    DuplicateMethod(String),
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::DuplicateMethod(path) => {
                write!(f, "method registered twice: {path}")
            }
        }
    }
}

impl std::error::Error for BuildError {}

/// Collects services, ports, and the generic endpoint for one server.
pub struct Builder {
    methods: Vec<MethodDef>,
    fan: Option<Arc<Fan>>,
    ports: Vec<(String, Credentials)>,
}

impl Builder {
    pub(crate) fn new() -> Self {
        Self {
            methods: Vec::new(),
            fan: None,
            ports: Vec::new(),
        }
    }

    /// Record a listening address. The loopback transport assigns the
    /// selected port, readable from [`Server::bound_ports`]; credentials
    /// are carried for the transport to terminate.
    pub fn add_listening_port(mut self, addr: impl Into<String>, credentials: Credentials) -> Self {
        self.ports.push((addr.into(), credentials));
        self
    }

    /// Register a typed service, harvesting one handler descriptor per
    /// method slot.
    pub fn register_service(mut self, service: ServiceDef) -> Self {
        self.methods.extend(service.release());
        self
    }

    /// Register the generic catch-all endpoint, subscribed to `fan`.
    pub fn register_generic(mut self, fan: Arc<Fan>) -> Self {
        self.fan = Some(fan);
        self
    }

    /// Sync-over-async sugar: register a single infallible unary method
    /// from its schema, without spelling out a service descriptor.
    pub fn add_unary<M, F>(mut self, f: F) -> Self
    where
        M: MethodSchema,
        F: Fn(&M::Request) -> M::Response + Send + Sync + 'static,
    {
        let (service, method) = split_path(M::path());
        let def = ServiceDef::new(service).unary(
            method,
            move |_ctx: &mut ServerContext, req: M::Request| Ok(f(&req)),
        );
        self.methods.extend(def.release());
        self
    }

    /// Build the router, prime the state machines, and start the
    /// dispatcher thread.
    pub fn build_and_start(self) -> Result<Server, BuildError> {
        let mut paths = Vec::with_capacity(self.methods.len());
        for m in &self.methods {
            if paths.contains(&m.path) {
                return Err(BuildError::DuplicateMethod(m.path.clone()));
            }
            paths.push(m.path.clone());
        }

        let router = Router::new(&paths, self.fan.is_some());
        let bindings = self
            .methods
            .into_iter()
            .enumerate()
            .map(|(idx, m)| (router.method_slot(idx), m.handler))
            .collect::<Vec<(_, Option<Arc<dyn ErasedHandler>>)>>();

        let ports = self.ports.into_iter().map(|(addr, _creds)| bind(addr)).collect();

        tracing::info!(methods = paths.len(), generic = self.fan.is_some(), "server starting");
        Ok(Server::start(router, bindings, self.fan, ports))
    }
}

/// Assign a port for an address request. `:0` draws from a process-wide
/// counter, standing in for the transport's ephemeral allocation.
fn bind(addr: String) -> BoundPort {
    static NEXT_EPHEMERAL: AtomicU16 = AtomicU16::new(50051);
    let requested = addr
        .rsplit(':')
        .next()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(0);
    let port = if requested == 0 {
        NEXT_EPHEMERAL.fetch_add(1, Ordering::Relaxed)
    } else {
        requested
    };
    BoundPort { addr, port }
}

fn split_path(path: &str) -> (&str, &str) {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    trimmed.split_once('/').unwrap_or((trimmed, ""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_path() {
        assert_eq!(
            split_path("/unstructured.Test/Process"),
            ("unstructured.Test", "Process")
        );
    }

    #[test]
    fn test_bind_assigns_ephemeral_ports() {
        let a = bind("0.0.0.0:0".to_string());
        let b = bind("0.0.0.0:0".to_string());
        assert_ne!(a.port, 0);
        assert_ne!(a.port, b.port);
        assert_eq!(bind("127.0.0.1:9090".to_string()).port, 9090);
    }
}
