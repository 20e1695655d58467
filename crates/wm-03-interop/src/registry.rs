//! # Method Registry
//!
//! Per-peer registry of local methods (with handlers) and the mirror of
//! every remote instance's announced methods. All mutation goes through
//! the registry's own methods; the projection functions are pure views
//! and stay consistent with the backing lists at all times.

use crate::domain::{InteropError, MethodDefinition, MethodHandler};
use shared_types::{Instance, InstanceId};
use std::collections::HashMap;

/// A locally registered method.
pub(crate) struct LocalMethod {
    pub def: MethodDefinition,
    pub handler: MethodHandler,
    pub seq: u64,
}

/// A mirrored remote method.
pub(crate) struct RemoteMethod {
    pub def: MethodDefinition,
    pub seq: u64,
}

/// Everything known about one remote instance.
pub(crate) struct RemoteEntry {
    pub instance: Instance,
    pub methods: Vec<RemoteMethod>,
}

/// One invocation candidate, local or mirrored.
#[derive(Clone)]
pub(crate) struct Candidate {
    pub owner: Instance,
    pub def: MethodDefinition,
    pub seq: u64,
    pub is_local: bool,
}

/// The per-peer method registry.
pub(crate) struct MethodRegistry {
    next_seq: u64,
    local: Vec<LocalMethod>,
    remote: HashMap<InstanceId, RemoteEntry>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self {
            next_seq: 0,
            local: Vec::new(),
            remote: HashMap::new(),
        }
    }

    fn bump(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Add a local method; duplicate names per instance are an error.
    pub fn add_local(
        &mut self,
        def: MethodDefinition,
        handler: MethodHandler,
    ) -> Result<(), InteropError> {
        if self.local.iter().any(|m| m.def.name == def.name) {
            return Err(InteropError::DuplicateMethod { method: def.name });
        }
        let seq = self.bump();
        self.local.push(LocalMethod { def, handler, seq });
        Ok(())
    }

    /// Remove a local method, returning its definition.
    pub fn remove_local(&mut self, name: &str) -> Option<MethodDefinition> {
        let index = self.local.iter().position(|m| m.def.name == name)?;
        Some(self.local.remove(index).def)
    }

    /// Handler of a local method.
    pub fn local_handler(&self, name: &str) -> Option<MethodHandler> {
        self.local
            .iter()
            .find(|m| m.def.name == name)
            .map(|m| m.handler.clone())
    }

    /// Every local definition, in registration order.
    pub fn local_defs(&self) -> Vec<MethodDefinition> {
        self.local.iter().map(|m| m.def.clone()).collect()
    }

    /// Replace everything known about a remote instance.
    pub fn set_remote_snapshot(&mut self, instance: Instance, defs: Vec<MethodDefinition>) {
        let methods = defs
            .into_iter()
            .map(|def| {
                let seq = self.bump();
                RemoteMethod { def, seq }
            })
            .collect();
        self.remote
            .insert(instance.instance_id, RemoteEntry { instance, methods });
    }

    /// Mirror one newly announced remote method.
    pub fn add_remote(&mut self, instance: Instance, def: MethodDefinition) {
        let seq = self.bump();
        let entry = self
            .remote
            .entry(instance.instance_id)
            .or_insert_with(|| RemoteEntry {
                instance,
                methods: Vec::new(),
            });
        entry.methods.retain(|m| m.def.name != def.name);
        entry.methods.push(RemoteMethod { def, seq });
    }

    /// Drop one mirrored remote method.
    pub fn remove_remote(&mut self, instance_id: &InstanceId, name: &str) {
        if let Some(entry) = self.remote.get_mut(instance_id) {
            entry.methods.retain(|m| m.def.name != name);
        }
    }

    /// Forget a remote instance entirely (disconnect).
    pub fn drop_instance_by_window(&mut self, window_id: &str) -> Option<RemoteEntry> {
        let id = self
            .remote
            .values()
            .find(|entry| entry.instance.window_id == window_id)
            .map(|entry| entry.instance.instance_id)?;
        self.remote.remove(&id)
    }

    /// Invocation candidates for `name`, ordered by registration sequence.
    pub fn candidates(&self, name: &str, own: &Instance) -> Vec<Candidate> {
        let mut candidates: Vec<Candidate> = self
            .local
            .iter()
            .filter(|m| m.def.name == name)
            .map(|m| Candidate {
                owner: own.clone(),
                def: m.def.clone(),
                seq: m.seq,
                is_local: true,
            })
            .collect();

        for entry in self.remote.values() {
            for method in entry.methods.iter().filter(|m| m.def.name == name) {
                candidates.push(Candidate {
                    owner: entry.instance.clone(),
                    def: method.def.clone(),
                    seq: method.seq,
                    is_local: false,
                });
            }
        }

        candidates.sort_by_key(|c| c.seq);
        candidates
    }

    /// Every method owned by `instance_id`, local or mirrored.
    pub fn methods_for_instance(&self, instance_id: &InstanceId, own: &Instance) -> Vec<MethodDefinition> {
        if instance_id == &own.instance_id {
            return self.local_defs();
        }
        self.remote
            .get(instance_id)
            .map(|entry| entry.methods.iter().map(|m| m.def.clone()).collect())
            .unwrap_or_default()
    }

    /// The streaming subset of an instance's methods.
    pub fn streams_for_instance(&self, instance_id: &InstanceId, own: &Instance) -> Vec<MethodDefinition> {
        self.methods_for_instance(instance_id, own)
            .into_iter()
            .filter(|def| def.supports_streaming)
            .collect()
    }

    /// Every known instance (own first, then remote).
    pub fn instances(&self, own: &Instance) -> Vec<Instance> {
        let mut all = vec![own.clone()];
        all.extend(self.remote.values().map(|entry| entry.instance.clone()));
        all
    }

    /// Every method on the bus with its owner.
    pub fn all_methods(&self, own: &Instance) -> Vec<(Instance, MethodDefinition)> {
        let mut all: Vec<(Instance, MethodDefinition)> = self
            .local
            .iter()
            .map(|m| (own.clone(), m.def.clone()))
            .collect();
        for entry in self.remote.values() {
            for method in &entry.methods {
                all.push((entry.instance.clone(), method.def.clone()));
            }
        }
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn noop_handler() -> MethodHandler {
        Arc::new(|_, _| Box::pin(async { Ok(json!(null)) }))
    }

    fn instance(app: &str) -> Instance {
        Instance {
            application_name: app.into(),
            instance_id: InstanceId::new(),
            window_id: format!("wnd-{app}"),
            pid: 1,
            machine: "localhost".into(),
            environment: "local".into(),
            is_local: true,
            user: None,
            region: None,
        }
    }

    #[test]
    fn test_duplicate_local_registration_rejected() {
        let mut registry = MethodRegistry::new();
        registry
            .add_local(MethodDefinition::new("Ping"), noop_handler())
            .unwrap();

        let err = registry
            .add_local(MethodDefinition::new("Ping"), noop_handler())
            .unwrap_err();
        assert!(matches!(err, InteropError::DuplicateMethod { .. }));
    }

    #[test]
    fn test_candidates_ordered_by_registration() {
        let own = instance("own");
        let peer = instance("peer");
        let mut registry = MethodRegistry::new();

        registry
            .add_local(MethodDefinition::new("Ping"), noop_handler())
            .unwrap();
        registry.add_remote(peer.clone(), MethodDefinition::new("Ping"));

        let candidates = registry.candidates("Ping", &own);
        assert_eq!(candidates.len(), 2);
        assert!(candidates[0].is_local);
        assert_eq!(candidates[1].owner.instance_id, peer.instance_id);
        assert!(candidates[0].seq < candidates[1].seq);
    }

    #[test]
    fn test_projection_consistency() {
        let own = instance("own");
        let mut registry = MethodRegistry::new();

        registry
            .add_local(MethodDefinition::new("Ping"), noop_handler())
            .unwrap();
        registry
            .add_local(MethodDefinition::new("Feed").streaming(), noop_handler())
            .unwrap();
        registry
            .add_local(MethodDefinition::new("Prices").streaming(), noop_handler())
            .unwrap();

        let methods = registry.methods_for_instance(&own.instance_id, &own);
        let streams = registry.streams_for_instance(&own.instance_id, &own);

        assert_eq!(methods.len(), 3);
        assert_eq!(
            streams.len(),
            methods.iter().filter(|d| d.supports_streaming).count()
        );
    }

    #[test]
    fn test_snapshot_replaces_not_merges() {
        let own = instance("own");
        let peer = instance("peer");
        let mut registry = MethodRegistry::new();

        registry.set_remote_snapshot(peer.clone(), vec![MethodDefinition::new("Old")]);
        registry.set_remote_snapshot(peer.clone(), vec![MethodDefinition::new("New")]);

        let methods = registry.methods_for_instance(&peer.instance_id, &own);
        assert_eq!(methods.len(), 1);
        assert_eq!(methods[0].name, "New");
    }

    #[test]
    fn test_drop_instance_by_window() {
        let own = instance("own");
        let peer = instance("peer");
        let mut registry = MethodRegistry::new();

        registry.set_remote_snapshot(peer.clone(), vec![MethodDefinition::new("Ping")]);
        assert_eq!(registry.candidates("Ping", &own).len(), 1);

        registry.drop_instance_by_window(&peer.window_id);
        assert!(registry.candidates("Ping", &own).is_empty());
        assert_eq!(registry.instances(&own).len(), 1);
    }
}
