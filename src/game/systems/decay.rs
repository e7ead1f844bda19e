//! Lifetime expiry for transient entities (projectiles, corpses).

use crate::ecs::{Ecs, EntityId, System, WorldVars};
use crate::game::components::{Component, ComponentKind};

pub const DECAY: System = System {
    name: "decay",
    required: &[ComponentKind::Decay],
    vars: &[],
    run: decay,
};

fn decay(ecs: &mut Ecs, _vars: &mut WorldVars, id: &EntityId) {
    let expired = match ecs
        .get_mut(id, ComponentKind::Decay)
        .and_then(Component::as_decay_mut)
    {
        Some(d) if d.ticks_left > 1 => {
            d.ticks_left -= 1;
            false
        }
        Some(_) => true,
        None => false,
    };
    if expired {
        ecs.remove_entity(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::components::Decay;
    use smallvec::smallvec;

    #[test]
    fn test_entity_removed_when_lifetime_ends() {
        let mut ecs = Ecs::new();
        ecs.init_all_components();
        ecs.init_system(DECAY).unwrap();
        let id = ecs
            .create_entity(smallvec![Decay { ticks_left: 3 }.into()])
            .unwrap();

        ecs.update();
        ecs.update();
        assert!(ecs.is_alive(&id));
        ecs.update();
        assert!(!ecs.is_alive(&id));
    }
}
