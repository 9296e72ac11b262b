use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::DeploymentConfig;

/// Network port.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Port(u16);

impl Port {
    pub fn new(value: u16) -> Self {
        Self(value)
    }

    pub fn value(self) -> u16 {
        self.0
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// How traffic reaches an entrypoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Router {
    Http,
    Tcp,
    Udp,
}

impl Router {
    pub fn as_str(self) -> &'static str {
        match self {
            Router::Http => "http",
            Router::Tcp => "tcp",
            Router::Udp => "udp",
        }
    }
}

/// Unique name of an entrypoint, `{qualified service name}-{port}-{router}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntrypointName(String);

impl EntrypointName {
    fn build(qualified_name: &str, port: Port, router: Router) -> Self {
        Self(format!("{qualified_name}-{port}-{}", router.as_str()))
    }

    /// Transport protocol: everything but udp goes over tcp.
    pub fn protocol(&self) -> &'static str {
        if self.0.ends_with(Router::Udp.as_str()) {
            "udp"
        } else {
            "tcp"
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntrypointName {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for EntrypointName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Port exposed by a service.
///
/// Custom entrypoints need a port on the target, managed ones go through the
/// default web route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entrypoint {
    name: EntrypointName,
    is_custom: bool,
    router: Router,
    subdomain: Option<String>,
    port: Port,
}

impl Entrypoint {
    pub fn name(&self) -> &EntrypointName {
        &self.name
    }

    pub fn is_custom(&self) -> bool {
        self.is_custom
    }

    pub fn router(&self) -> Router {
        self.router
    }

    pub fn subdomain(&self) -> Option<&str> {
        self.subdomain.as_deref()
    }

    pub fn port(&self) -> Port {
        self.port
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HttpEntrypointOptions {
    /// Routed through the target default web entrypoint.
    pub managed: bool,
    /// Use the app subdomain as is instead of prefixing it with the service name.
    pub use_default_subdomain: bool,
}

/// Service deployed by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    name: String,
    qualified_name: String,
    image: String,
    entrypoints: Vec<Entrypoint>,
}

impl Service {
    pub(crate) fn new(name: String, qualified_name: String, image: String) -> Self {
        Self {
            name,
            qualified_name,
            image,
            entrypoints: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn entrypoints(&self) -> &[Entrypoint] {
        &self.entrypoints
    }

    /// Add an HTTP entrypoint. Every HTTP entrypoint of a service shares the
    /// subdomain of the first one.
    pub fn add_http_entrypoint(
        &mut self,
        conf: &DeploymentConfig,
        port: u16,
        options: HttpEntrypointOptions,
    ) -> Entrypoint {
        let port = Port::new(port);

        if let Some(existing) = self.find(Router::Http, port) {
            return existing.clone();
        }

        let subdomain = self
            .entrypoints
            .iter()
            .find_map(|e| e.subdomain.clone())
            .unwrap_or_else(|| conf.sub_domain(&self.name, options.use_default_subdomain));

        self.push(Entrypoint {
            name: EntrypointName::build(&self.qualified_name, port, Router::Http),
            is_custom: !options.managed,
            router: Router::Http,
            subdomain: Some(subdomain),
            port,
        })
    }

    pub fn add_tcp_entrypoint(&mut self, port: u16) -> Entrypoint {
        self.add_custom_entrypoint(Router::Tcp, Port::new(port))
    }

    pub fn add_udp_entrypoint(&mut self, port: u16) -> Entrypoint {
        self.add_custom_entrypoint(Router::Udp, Port::new(port))
    }

    fn add_custom_entrypoint(&mut self, router: Router, port: Port) -> Entrypoint {
        if let Some(existing) = self.find(router, port) {
            return existing.clone();
        }

        self.push(Entrypoint {
            name: EntrypointName::build(&self.qualified_name, port, router),
            is_custom: true,
            router,
            subdomain: None,
            port,
        })
    }

    fn find(&self, router: Router, port: Port) -> Option<&Entrypoint> {
        self.entrypoints
            .iter()
            .find(|e| e.router == router && e.port == port)
    }

    fn push(&mut self, entrypoint: Entrypoint) -> Entrypoint {
        self.entrypoints.push(entrypoint.clone());
        entrypoint
    }
}

/// Services produced by a deployment, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Services(Vec<Service>);

impl Services {
    pub fn new(services: Vec<Service>) -> Self {
        Self(services)
    }

    pub fn push(&mut self, service: Service) {
        self.0.push(service);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Service> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn entrypoints(&self) -> impl Iterator<Item = &Entrypoint> {
        self.0.iter().flat_map(|s| s.entrypoints.iter())
    }

    /// Entrypoints the target must allocate a port for.
    pub fn custom_entrypoints(&self) -> impl Iterator<Item = &Entrypoint> {
        self.entrypoints().filter(|e| e.is_custom)
    }
}

impl FromIterator<Service> for Services {
    fn from_iter<I: IntoIterator<Item = Service>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
