use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::environment::Environment;
use crate::ids::AppId;
use crate::service::{Entrypoint, EntrypointName, Port};

/// Identifies a custom entrypoint on a target.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntrypointKey {
    pub app: AppId,
    pub environment: Environment,
    pub name: EntrypointName,
}

impl EntrypointKey {
    pub fn new(app: AppId, environment: Environment, name: EntrypointName) -> Self {
        Self {
            app,
            environment,
            name,
        }
    }

    fn belongs_to(&self, app: &AppId, environment: Option<Environment>) -> bool {
        &self.app == app && environment.is_none_or(|env| env == self.environment)
    }
}

/// Persisted form of a single [`TargetEntrypoints`] entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetEntrypointEntry {
    pub app: AppId,
    pub environment: Environment,
    pub name: EntrypointName,
    pub port: Option<Port>,
}

/// Custom entrypoints a target must expose, with the port assigned by the
/// provider once known.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<TargetEntrypointEntry>", into = "Vec<TargetEntrypointEntry>")]
pub struct TargetEntrypoints(BTreeMap<EntrypointKey, Option<Port>>);

impl TargetEntrypoints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the (app, environment) entrypoints match `entrypoints`. Assigned ports of
    /// entrypoints still wanted are kept. Returns true if anything changed.
    pub fn merge<'a>(
        &mut self,
        app: &AppId,
        environment: Environment,
        entrypoints: impl IntoIterator<Item = &'a Entrypoint>,
    ) -> bool {
        let desired: BTreeSet<&EntrypointName> =
            entrypoints.into_iter().map(Entrypoint::name).collect();
        let before = self.0.len();

        self.0
            .retain(|key, _| !key.belongs_to(app, Some(environment)) || desired.contains(&key.name));

        let mut changed = before != self.0.len();

        for name in desired {
            let key = EntrypointKey::new(app.clone(), environment, name.clone());

            if !self.0.contains_key(&key) {
                self.0.insert(key, None);
                changed = true;
            }
        }

        changed
    }

    /// Remove entrypoints of an app for the given environments, or all of them
    /// when `environments` is empty.
    pub fn remove(&mut self, app: &AppId, environments: &[Environment]) -> bool {
        let before = self.0.len();

        if environments.is_empty() {
            self.0.retain(|key, _| !key.belongs_to(app, None));
        } else {
            self.0.retain(|key, _| {
                !environments
                    .iter()
                    .any(|env| key.belongs_to(app, Some(*env)))
            });
        }

        before != self.0.len()
    }

    /// Fill unassigned entrypoints with ports reported by a provider. Unknown
    /// entrypoints are ignored. Returns true if anything changed.
    pub fn assign(&mut self, assigned: &TargetEntrypointsAssigned) -> bool {
        let mut changed = false;

        for (key, port) in assigned.iter() {
            match self.0.get_mut(key) {
                Some(slot) if slot.is_none() => {
                    *slot = Some(*port);
                    changed = true;
                }
                _ => {}
            }
        }

        changed
    }

    pub fn get(&self, key: &EntrypointKey) -> Option<Option<Port>> {
        self.0.get(key).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntrypointKey, Option<Port>)> {
        self.0.iter().map(|(key, port)| (key, *port))
    }

    /// Entrypoints still waiting for a port.
    pub fn unassigned(&self) -> impl Iterator<Item = &EntrypointKey> {
        self.0
            .iter()
            .filter(|(_, port)| port.is_none())
            .map(|(key, _)| key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<TargetEntrypointEntry>> for TargetEntrypoints {
    fn from(entries: Vec<TargetEntrypointEntry>) -> Self {
        Self(
            entries
                .into_iter()
                .map(|e| (EntrypointKey::new(e.app, e.environment, e.name), e.port))
                .collect(),
        )
    }
}

impl From<TargetEntrypoints> for Vec<TargetEntrypointEntry> {
    fn from(entrypoints: TargetEntrypoints) -> Self {
        entrypoints
            .0
            .into_iter()
            .map(|(key, port)| TargetEntrypointEntry {
                app: key.app,
                environment: key.environment,
                name: key.name,
                port,
            })
            .collect()
    }
}

/// Ports assigned by a provider while configuring a target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetEntrypointsAssigned(BTreeMap<EntrypointKey, Port>);

impl TargetEntrypointsAssigned {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(
        &mut self,
        app: AppId,
        environment: Environment,
        name: EntrypointName,
        port: Port,
    ) {
        self.0
            .insert(EntrypointKey::new(app, environment, name), port);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntrypointKey, &Port)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeploymentConfig;
    use crate::service::Service;

    fn services(app: &AppId, environment: Environment, tcp_ports: &[u16]) -> Vec<Entrypoint> {
        let conf = DeploymentConfig::new(
            app.clone(),
            "my-app".parse().unwrap(),
            environment,
            "target".into(),
            None,
        );
        let mut service: Service = conf.new_service("db", "postgres");

        tcp_ports
            .iter()
            .map(|port| service.add_tcp_entrypoint(*port))
            .collect()
    }

    #[test]
    fn merge_adds_unassigned_entries_once() {
        let app = AppId::from("app");
        let desired = services(&app, Environment::Production, &[5432, 6379]);
        let mut entrypoints = TargetEntrypoints::new();

        assert!(entrypoints.merge(&app, Environment::Production, &desired));
        assert!(!entrypoints.merge(&app, Environment::Production, &desired));

        assert_eq!(entrypoints.len(), 2);
        assert_eq!(entrypoints.unassigned().count(), 2);
    }

    #[test]
    fn merge_keeps_assigned_ports_and_drops_unwanted_names() {
        let app = AppId::from("app");
        let desired = services(&app, Environment::Production, &[5432, 6379]);
        let mut entrypoints = TargetEntrypoints::new();
        entrypoints.merge(&app, Environment::Production, &desired);

        let mut assigned = TargetEntrypointsAssigned::new();
        assigned.set(
            app.clone(),
            Environment::Production,
            desired[0].name().clone(),
            Port::new(8081),
        );
        assert!(entrypoints.assign(&assigned));

        assert!(entrypoints.merge(&app, Environment::Production, &desired[..1]));

        let key = EntrypointKey::new(app, Environment::Production, desired[0].name().clone());
        assert_eq!(entrypoints.len(), 1);
        assert_eq!(entrypoints.get(&key), Some(Some(Port::new(8081))));
    }

    #[test]
    fn merge_only_touches_the_given_environment() {
        let app = AppId::from("app");
        let production = services(&app, Environment::Production, &[5432]);
        let staging = services(&app, Environment::Staging, &[5432]);
        let mut entrypoints = TargetEntrypoints::new();
        entrypoints.merge(&app, Environment::Production, &production);
        entrypoints.merge(&app, Environment::Staging, &staging);

        assert!(entrypoints.merge(&app, Environment::Staging, &[]));

        assert_eq!(entrypoints.len(), 1);
    }

    #[test]
    fn assign_ignores_unknown_and_already_assigned_entries() {
        let app = AppId::from("app");
        let desired = services(&app, Environment::Production, &[5432]);
        let mut entrypoints = TargetEntrypoints::new();
        entrypoints.merge(&app, Environment::Production, &desired);

        let mut assigned = TargetEntrypointsAssigned::new();
        assigned.set(app.clone(), Environment::Production, "unknown".into(), Port::new(1));
        assert!(!entrypoints.assign(&assigned));

        assigned.set(
            app.clone(),
            Environment::Production,
            desired[0].name().clone(),
            Port::new(8081),
        );
        assert!(entrypoints.assign(&assigned));
        assert!(!entrypoints.assign(&assigned));
        assert_eq!(entrypoints.len(), 1);
    }

    #[test]
    fn remove_clears_environments_or_the_whole_app() {
        let app = AppId::from("app");
        let other = AppId::from("other");
        let mut entrypoints = TargetEntrypoints::new();
        entrypoints.merge(&app, Environment::Production, &services(&app, Environment::Production, &[1]));
        entrypoints.merge(&app, Environment::Staging, &services(&app, Environment::Staging, &[1]));
        entrypoints.merge(&other, Environment::Production, &services(&other, Environment::Production, &[1]));

        assert!(entrypoints.remove(&app, &[Environment::Staging]));
        assert_eq!(entrypoints.len(), 2);

        assert!(entrypoints.remove(&app, &[]));
        assert!(!entrypoints.remove(&app, &[]));
        assert_eq!(entrypoints.len(), 1);
    }

    #[test]
    fn serializes_as_a_flat_list() {
        let app = AppId::from("app");
        let mut entrypoints = TargetEntrypoints::new();
        entrypoints.merge(&app, Environment::Production, &services(&app, Environment::Production, &[5432]));

        let json = serde_json::to_value(&entrypoints).unwrap();

        assert_eq!(json[0]["app"], "app");
        assert_eq!(json[0]["environment"], "production");
        assert_eq!(json[0]["port"], serde_json::Value::Null);
        assert_eq!(serde_json::from_value::<TargetEntrypoints>(json).unwrap(), entrypoints);
    }
}
