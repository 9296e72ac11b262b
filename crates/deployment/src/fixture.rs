//! Builders shared by the unit tests of this crate.

use dockyard_core::{AggregateRoot, UserId};
use dockyard_core::aggregate::drain;

use crate::app::App;
use crate::config::DeploymentConfig;
use crate::deployment::Deployment;
use crate::entrypoints::TargetEntrypointsAssigned;
use crate::environment::{Environment, EnvironmentConfig};
use crate::ids::DeploymentNumber;
use crate::provider::ProviderConfig;
use crate::requirement::{
    EnvironmentConfigRequirement, ProviderConfigRequirement, TargetUrlRequirement,
};
use crate::service::{HttpEntrypointOptions, Port, Services};
use crate::source::SourceData;
use crate::target::Target;
use crate::url::Url;

pub fn user() -> UserId {
    UserId::from("some-user")
}

pub fn url(raw: &str) -> Url {
    Url::parse(raw).unwrap()
}

/// Configuring target with an url, events drained.
pub fn target() -> Target {
    target_with(Some("http://docker.localhost"), ProviderConfig::default())
}

pub fn target_with(raw_url: Option<&str>, provider: ProviderConfig) -> Target {
    let mut target = Target::new(
        "my-target",
        raw_url.map(|raw| TargetUrlRequirement::new(url(raw), true)),
        ProviderConfigRequirement::new(provider, true),
        user(),
    )
    .unwrap();
    drain(&mut target);
    target
}

pub fn ready_target() -> Target {
    let mut target = target();
    let version = target.current_version();
    target
        .configured(version, &TargetEntrypointsAssigned::new(), None)
        .unwrap();
    drain(&mut target);
    target
}

/// App named `my-app` deployed on `target` for both environments.
pub fn app_on(target: &Target) -> App {
    let mut app = App::new(
        "my-app".parse().unwrap(),
        EnvironmentConfigRequirement::new(EnvironmentConfig::new(target.id().clone()), true, true),
        EnvironmentConfigRequirement::new(EnvironmentConfig::new(target.id().clone()), true, true),
        user(),
    )
    .unwrap();
    drain(&mut app);
    app
}

pub fn deployment(app: &App, environment: Environment) -> Deployment {
    let mut deployment = app
        .new_deployment(
            DeploymentNumber::FIRST,
            SourceData::Raw("services: {}".into()),
            environment,
            user(),
        )
        .unwrap();
    drain(&mut deployment);
    deployment
}

/// An `app` service with a managed and a custom http entrypoint, and a `db`
/// service exposing postgres over tcp.
pub fn services(config: &DeploymentConfig) -> Services {
    let mut app = config.new_service("app", "");
    app.add_http_entrypoint(
        config,
        80,
        HttpEntrypointOptions {
            managed: true,
            use_default_subdomain: true,
        },
    );
    app.add_http_entrypoint(
        config,
        8080,
        HttpEntrypointOptions {
            managed: false,
            use_default_subdomain: false,
        },
    );

    let mut db = config.new_service("db", "postgres:14-alpine");
    db.add_tcp_entrypoint(5432);

    Services::new(vec![app, db])
}

/// Assign incrementing ports, from `start`, to every entrypoint waiting for one.
pub fn assign_all(target: &Target, start: u16) -> TargetEntrypointsAssigned {
    let mut assigned = TargetEntrypointsAssigned::new();

    for (port, key) in (start..).zip(target.custom_entrypoints().unassigned()) {
        assigned.set(key.app.clone(), key.environment, key.name.clone(), Port::new(port));
    }

    assigned
}
