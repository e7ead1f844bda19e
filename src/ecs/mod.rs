//! Entity-component-system core.
//!
//! Entities are opaque string ids, components live in per-kind stores, and
//! systems are plain data records registered at startup. Parameter binding
//! is explicit: each system declares the component kinds and world variables
//! it needs, and registration fails fast on anything unresolved. Systems run
//! in registration order, single-threaded; the qualifying entity set is
//! recomputed fresh for every system on every tick.

use hashbrown::{HashMap, HashSet};
use smallvec::SmallVec;

use crate::game::actions::Actions;
use crate::game::catalog::UnitCatalog;
use crate::game::components::{Component, ComponentKind};
use crate::game::player::PlayerRegistry;

/// Opaque entity handle. String-typed so it travels through JSON unchanged.
pub type EntityId = String;

/// A bundle of components handed to entity creation and snapshots.
pub type ComponentBundle = SmallVec<[Component; 8]>;

/// Startup-time contract violations. These are configuration mistakes, not
/// runtime conditions, and are surfaced immediately rather than retried.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("component store for {0:?} is not registered")]
    UnknownComponent(ComponentKind),
    #[error("world variable {0:?} is not registered")]
    UnknownVariable(VarKey),
    #[error("world variable {0:?} is already registered")]
    DuplicateVariable(VarKey),
    #[error("entity id {0:?} is already in use")]
    DuplicateEntity(EntityId),
}

/// Keys for process-wide values injectable into systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarKey {
    Players,
    Actions,
    Catalog,
}

/// Process-wide values owned by the simulation session.
pub enum WorldVar {
    Players(PlayerRegistry),
    Actions(Actions),
    Catalog(UnitCatalog),
}

impl WorldVar {
    pub fn key(&self) -> VarKey {
        match self {
            WorldVar::Players(_) => VarKey::Players,
            WorldVar::Actions(_) => VarKey::Actions,
            WorldVar::Catalog(_) => VarKey::Catalog,
        }
    }
}

/// Registered world variables, passed to every system alongside the ECS.
#[derive(Default)]
pub struct WorldVars {
    slots: HashMap<VarKey, WorldVar>,
}

impl WorldVars {
    pub fn contains(&self, key: VarKey) -> bool {
        self.slots.contains_key(&key)
    }

    pub fn players(&self) -> Option<&PlayerRegistry> {
        match self.slots.get(&VarKey::Players) {
            Some(WorldVar::Players(p)) => Some(p),
            _ => None,
        }
    }

    pub fn players_mut(&mut self) -> Option<&mut PlayerRegistry> {
        match self.slots.get_mut(&VarKey::Players) {
            Some(WorldVar::Players(p)) => Some(p),
            _ => None,
        }
    }

    pub fn actions(&self) -> Option<&Actions> {
        match self.slots.get(&VarKey::Actions) {
            Some(WorldVar::Actions(a)) => Some(a),
            _ => None,
        }
    }

    pub fn catalog(&self) -> Option<&UnitCatalog> {
        match self.slots.get(&VarKey::Catalog) {
            Some(WorldVar::Catalog(c)) => Some(c),
            _ => None,
        }
    }
}

/// System function: gets the world, the registered variables, and the entity
/// currently being processed. Component access goes through the ECS handle
/// so systems can also create and remove entities mid-tick.
pub type SystemFn = fn(&mut Ecs, &mut WorldVars, &EntityId);

/// A registered system: explicit data, no introspection.
#[derive(Clone, Copy)]
pub struct System {
    pub name: &'static str,
    /// The entity must hold all of these for the system to run on it.
    pub required: &'static [ComponentKind],
    /// World variables the function reaches for; validated at registration.
    pub vars: &'static [VarKey],
    pub run: SystemFn,
}

type CreateHook = Box<dyn FnMut(&EntityId, &[Component]) + Send>;
type RemoveHook = Box<dyn FnMut(&EntityId) + Send>;

/// The world: entity identity, component storage, and the system schedule.
#[derive(Default)]
pub struct Ecs {
    stores: HashMap<ComponentKind, HashMap<EntityId, Component>>,
    /// Live entities in creation order.
    live: Vec<EntityId>,
    live_set: HashSet<EntityId>,
    systems: Vec<System>,
    vars: WorldVars,
    next_id: u64,
    tick: u64,
    on_create: Option<CreateHook>,
    on_remove: Option<RemoveHook>,
}

impl Ecs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an empty store for a component kind. Must precede any
    /// `create_entity` that uses the kind.
    pub fn init_component(&mut self, kind: ComponentKind) {
        self.stores.entry(kind).or_default();
    }

    /// Register every component kind. Convenient for full worlds.
    pub fn init_all_components(&mut self) {
        for kind in ComponentKind::ALL {
            self.init_component(*kind);
        }
    }

    /// Register a process-wide value for injection into systems.
    pub fn add_variable(&mut self, var: WorldVar) -> Result<(), ConfigError> {
        let key = var.key();
        if self.vars.contains(key) {
            return Err(ConfigError::DuplicateVariable(key));
        }
        self.vars.slots.insert(key, var);
        Ok(())
    }

    /// Register a system. Every declared component kind and variable must
    /// already be registered; anything unresolved is a startup error.
    pub fn init_system(&mut self, system: System) -> Result<(), ConfigError> {
        for kind in system.required {
            if !self.stores.contains_key(kind) {
                return Err(ConfigError::UnknownComponent(*kind));
            }
        }
        for key in system.vars {
            if !self.vars.contains(*key) {
                return Err(ConfigError::UnknownVariable(*key));
            }
        }
        self.systems.push(system);
        Ok(())
    }

    /// Hook invoked with (id, components) after every entity creation.
    pub fn set_create_hook(&mut self, hook: CreateHook) {
        self.on_create = Some(hook);
    }

    /// Hook invoked with the id after every entity removal.
    pub fn set_remove_hook(&mut self, hook: RemoveHook) {
        self.on_remove = Some(hook);
    }

    /// Allocate a fresh entity id and store its components.
    pub fn create_entity(&mut self, components: ComponentBundle) -> Result<EntityId, ConfigError> {
        let id = format!("e{}", self.next_id);
        self.next_id += 1;
        self.insert_entity(id.clone(), components)?;
        Ok(id)
    }

    /// Create an entity under a caller-supplied id. This is how clients
    /// mirror server-assigned ids; reusing a live id is a contract violation.
    pub fn create_entity_with_id(
        &mut self,
        id: EntityId,
        components: ComponentBundle,
    ) -> Result<(), ConfigError> {
        if self.live_set.contains(&id) {
            return Err(ConfigError::DuplicateEntity(id));
        }
        self.insert_entity(id, components)
    }

    fn insert_entity(&mut self, id: EntityId, components: ComponentBundle) -> Result<(), ConfigError> {
        for component in &components {
            let kind = component.kind();
            if !self.stores.contains_key(&kind) {
                return Err(ConfigError::UnknownComponent(kind));
            }
        }
        for component in &components {
            if let Some(store) = self.stores.get_mut(&component.kind()) {
                store.insert(id.clone(), component.clone());
            }
        }
        self.live.push(id.clone());
        self.live_set.insert(id.clone());

        if let Some(mut hook) = self.on_create.take() {
            hook(&id, &components);
            self.on_create = Some(hook);
        }
        Ok(())
    }

    /// Remove an entity from every store and the live set. Idempotent: a
    /// second removal of the same id is a no-op and fires no hook.
    pub fn remove_entity(&mut self, id: &EntityId) {
        if !self.live_set.remove(id) {
            return;
        }
        self.live.retain(|e| e != id);
        for store in self.stores.values_mut() {
            store.remove(id);
        }
        if let Some(mut hook) = self.on_remove.take() {
            hook(id);
            self.on_remove = Some(hook);
        }
    }

    pub fn is_alive(&self, id: &EntityId) -> bool {
        self.live_set.contains(id)
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Entities present in every listed store, in creation order. An empty
    /// list yields all live entities. Recomputed by fresh intersection each
    /// call — no incremental index to keep consistent under churn.
    pub fn entities_with(&self, kinds: &[ComponentKind]) -> Vec<EntityId> {
        self.live
            .iter()
            .filter(|id| {
                kinds.iter().all(|kind| {
                    self.stores
                        .get(kind)
                        .is_some_and(|store| store.contains_key(*id))
                })
            })
            .cloned()
            .collect()
    }

    pub fn get(&self, id: &EntityId, kind: ComponentKind) -> Option<&Component> {
        self.stores.get(&kind)?.get(id)
    }

    pub fn get_mut(&mut self, id: &EntityId, kind: ComponentKind) -> Option<&mut Component> {
        self.stores.get_mut(&kind)?.get_mut(id)
    }

    /// Insert or overwrite a single component on a live entity. Used by the
    /// client mirror to apply authoritative deltas. Returns false if the
    /// entity is gone or the store was never registered.
    pub fn put(&mut self, id: &EntityId, component: Component) -> bool {
        if !self.live_set.contains(id) {
            return false;
        }
        match self.stores.get_mut(&component.kind()) {
            Some(store) => {
                store.insert(id.clone(), component);
                true
            }
            None => false,
        }
    }

    /// Remove a single component from an entity without removing the entity.
    pub fn take(&mut self, id: &EntityId, kind: ComponentKind) -> Option<Component> {
        self.stores.get_mut(&kind)?.remove(id)
    }

    /// Run a closure with the world variables split out, so callers outside
    /// the tick (action handlers, session setup) can mutate both at once.
    pub fn with_vars<R>(&mut self, f: impl FnOnce(&mut Ecs, &mut WorldVars) -> R) -> R {
        let mut vars = std::mem::take(&mut self.vars);
        let result = f(self, &mut vars);
        self.vars = vars;
        result
    }

    /// Two-component lookup; absence of either is total failure.
    pub fn get_pair(
        &self,
        id: &EntityId,
        a: ComponentKind,
        b: ComponentKind,
    ) -> Option<(&Component, &Component)> {
        Some((self.get(id, a)?, self.get(id, b)?))
    }

    /// Full component snapshot for an entity, in kind-declaration order.
    pub fn snapshot(&self, id: &EntityId) -> ComponentBundle {
        ComponentKind::ALL
            .iter()
            .filter_map(|kind| self.get(id, *kind).cloned())
            .collect()
    }

    /// Run every registered system once per qualifying entity.
    ///
    /// The qualifying set is snapshotted per system; entities removed by an
    /// earlier invocation in the same pass are skipped via a liveness check.
    pub fn update(&mut self) {
        let systems = std::mem::take(&mut self.systems);
        let mut vars = std::mem::take(&mut self.vars);
        for system in &systems {
            let ids = self.entities_with(system.required);
            for id in ids {
                if !self.is_alive(&id) {
                    continue;
                }
                (system.run)(self, &mut vars, &id);
            }
        }
        self.vars = vars;
        self.systems = systems;
        self.tick += 1;
    }
}
