//! Economy systems: unit production, resource gathering, construction.

use rand::Rng;
use tracing::warn;

use crate::ecs::{Ecs, EntityId, System, VarKey, WorldVars};
use crate::game::components::{ChaseGoal, Component, ComponentKind, Gatherer, ResourceKind};
use crate::game::constants::{combat, world};
use crate::net::protocol::ServerCommand;
use crate::util::vec2::Vec2;

/// Drains production queues and spawns finished units below the producer.
pub const PRODUCTION: System = System {
    name: "production",
    required: &[
        ComponentKind::Position,
        ComponentKind::Production,
        ComponentKind::Owner,
    ],
    vars: &[VarKey::Catalog],
    run: production,
};

/// Worker loop: walk to a node, extract, haul the load to a friendly depot.
pub const GATHER: System = System {
    name: "gather",
    required: &[
        ComponentKind::Position,
        ComponentKind::Gatherer,
        ComponentKind::Chase,
        ComponentKind::Owner,
    ],
    vars: &[VarKey::Players, VarKey::Actions],
    run: gather,
};

/// Advances construction sites and swaps in the finished building.
pub const CONSTRUCTION: System = System {
    name: "construction",
    required: &[
        ComponentKind::Position,
        ComponentKind::Construction,
        ComponentKind::Owner,
    ],
    vars: &[VarKey::Catalog],
    run: construction,
};

fn production(ecs: &mut Ecs, vars: &mut WorldVars, id: &EntityId) {
    let finished = match ecs
        .get_mut(id, ComponentKind::Production)
        .and_then(Component::as_production_mut)
    {
        Some(p) => {
            if p.queue.is_empty() {
                // Pinned while idle so a fresh order always waits the full
                // delay.
                p.timer = p.delay;
                return;
            }
            if p.timer > 0 {
                p.timer -= 1;
            }
            if p.timer == 0 {
                p.timer = p.delay;
                p.queue.pop_front()
            } else {
                None
            }
        }
        None => None,
    };
    let Some(unit) = finished else {
        return;
    };

    let (Some(pos), Some(team)) = (position_of(ecs, id), team_of(ecs, id)) else {
        return;
    };
    let mut rng = rand::thread_rng();
    let jitter = Vec2::new(
        rng.gen_range(-world::SPAWN_JITTER..=world::SPAWN_JITTER),
        rng.gen_range(-world::SPAWN_JITTER..=world::SPAWN_JITTER),
    );
    let spawn_pos = pos + Vec2::new(0.0, world::SPAWN_OFFSET) + jitter;

    let Some(bundle) = vars
        .catalog()
        .and_then(|c| c.spawn(&unit, Some(team), spawn_pos))
    else {
        warn!("production queue held unknown unit {unit:?}");
        return;
    };
    if let Err(e) = ecs.create_entity(bundle) {
        warn!("failed to spawn produced unit {unit}: {e}");
    }
}

fn gather(ecs: &mut Ecs, vars: &mut WorldVars, id: &EntityId) {
    let Some(state) = ecs
        .get(id, ComponentKind::Gatherer)
        .and_then(Component::as_gatherer)
        .copied()
    else {
        return;
    };
    let (Some(my_pos), Some(team)) = (position_of(ecs, id), team_of(ecs, id)) else {
        return;
    };

    if state.returning {
        deliver(ecs, vars, id, my_pos, team, state.carrying, state.carried);
    } else {
        harvest(ecs, id, my_pos, &state);
    }
}

fn harvest(ecs: &mut Ecs, id: &EntityId, my_pos: Vec2, state: &Gatherer) {
    let Some((node, node_pos, reach)) = nearest_node(ecs, my_pos, state.carrying) else {
        // Nothing left to gather; haul whatever is on board home.
        if let Some(g) = gatherer_mut(ecs, id) {
            if g.carried > 0.0 {
                g.returning = true;
            }
        }
        return;
    };

    if my_pos.distance_to(node_pos) > reach {
        steer(ecs, id, ChaseGoal::Entity(node));
        return;
    }

    let Some(node_state) = ecs
        .get_mut(&node, ComponentKind::ResourceNode)
        .and_then(Component::as_resource_node_mut)
    else {
        return;
    };
    let room = (state.capacity - state.carried).max(0.0);
    let amount = state.rate.min(node_state.remaining).min(room);
    node_state.remaining -= amount;
    let kind = node_state.kind;
    let depleted = node_state.remaining <= 0.0;
    if depleted {
        ecs.remove_entity(&node);
    }

    let Some(g) = gatherer_mut(ecs, id) else {
        return;
    };
    g.carried += amount;
    g.carrying = Some(kind);
    if g.carried >= g.capacity || depleted {
        g.returning = true;
    }
    clear_goal(ecs, id);
}

fn deliver(
    ecs: &mut Ecs,
    vars: &mut WorldVars,
    id: &EntityId,
    my_pos: Vec2,
    team: u8,
    carrying: Option<ResourceKind>,
    carried: f32,
) {
    let Some((depot, depot_pos, reach)) = nearest_depot(ecs, my_pos, team) else {
        return;
    };
    if my_pos.distance_to(depot_pos) > reach {
        steer(ecs, id, ChaseGoal::Entity(depot));
        return;
    }

    if let (Some(kind), Some(players)) = (carrying, vars.players_mut()) {
        if let Some(player) = players.get_mut(team) {
            player.wallet.deposit(kind, carried);
            let wallet = player.wallet;
            let conn = players.conn_for_team(team);
            if let (Some(conn), Some(actions)) = (conn, vars.actions()) {
                actions.send(conn, ServerCommand::ResourceInfo { team, wallet });
            }
        }
    }

    if let Some(g) = gatherer_mut(ecs, id) {
        g.carried = 0.0;
        g.carrying = None;
        g.returning = false;
    }
    clear_goal(ecs, id);
}

/// Nearest live node, restricted to the carried kind once a load is mixed-in.
fn nearest_node(
    ecs: &Ecs,
    from: Vec2,
    carrying: Option<ResourceKind>,
) -> Option<(EntityId, Vec2, f32)> {
    let mut best: Option<(EntityId, Vec2, f32, f32)> = None;
    for id in ecs.entities_with(&[ComponentKind::Position, ComponentKind::ResourceNode]) {
        let Some(node) = ecs
            .get(&id, ComponentKind::ResourceNode)
            .and_then(Component::as_resource_node)
        else {
            continue;
        };
        if node.remaining <= 0.0 {
            continue;
        }
        if carrying.is_some_and(|kind| kind != node.kind) {
            continue;
        }
        let Some(pos) = position_of(ecs, &id) else {
            continue;
        };
        let dist_sq = from.distance_sq_to(pos);
        if best.as_ref().map_or(true, |(_, _, _, d)| dist_sq < *d) {
            best = Some((id.clone(), pos, reach_of(ecs, &id), dist_sq));
        }
    }
    best.map(|(id, pos, reach, _)| (id, pos, reach))
}

fn nearest_depot(ecs: &Ecs, from: Vec2, team: u8) -> Option<(EntityId, Vec2, f32)> {
    let mut best: Option<(EntityId, Vec2, f32, f32)> = None;
    for id in ecs.entities_with(&[
        ComponentKind::Position,
        ComponentKind::Depot,
        ComponentKind::Owner,
    ]) {
        if team_of(ecs, &id) != Some(team) {
            continue;
        }
        let Some(pos) = position_of(ecs, &id) else {
            continue;
        };
        let dist_sq = from.distance_sq_to(pos);
        if best.as_ref().map_or(true, |(_, _, _, d)| dist_sq < *d) {
            best = Some((id.clone(), pos, reach_of(ecs, &id), dist_sq));
        }
    }
    best.map(|(id, pos, reach, _)| (id, pos, reach))
}

/// Working range against an entity: base reach plus its collider half-extent,
/// since collision resolution keeps workers outside the footprint.
fn reach_of(ecs: &Ecs, id: &EntityId) -> f32 {
    let half = ecs
        .get(id, ComponentKind::Collider)
        .and_then(Component::as_collider)
        .map(|c| c.width.max(c.height) / 2.0)
        .unwrap_or(0.0);
    combat::REACH + half
}

fn construction(ecs: &mut Ecs, vars: &mut WorldVars, id: &EntityId) {
    let done = match ecs
        .get_mut(id, ComponentKind::Construction)
        .and_then(Component::as_construction_mut)
    {
        Some(c) => {
            c.progress += 1;
            c.progress >= c.required
        }
        None => false,
    };
    if !done {
        return;
    }

    let builds = ecs
        .get(id, ComponentKind::Construction)
        .and_then(Component::as_construction)
        .map(|c| c.builds.clone());
    let (Some(builds), Some(pos), Some(team)) =
        (builds, position_of(ecs, id), team_of(ecs, id))
    else {
        return;
    };

    ecs.remove_entity(id);
    let Some(bundle) = vars
        .catalog()
        .and_then(|c| c.spawn(&builds, Some(team), pos))
    else {
        warn!("construction site for unknown building {builds:?}");
        return;
    };
    if let Err(e) = ecs.create_entity(bundle) {
        warn!("failed to finish construction of {builds}: {e}");
    }
}

fn gatherer_mut<'a>(ecs: &'a mut Ecs, id: &EntityId) -> Option<&'a mut Gatherer> {
    ecs.get_mut(id, ComponentKind::Gatherer)
        .and_then(Component::as_gatherer_mut)
}

fn steer(ecs: &mut Ecs, id: &EntityId, goal: ChaseGoal) {
    if let Some(chase) = ecs
        .get_mut(id, ComponentKind::Chase)
        .and_then(Component::as_chase_mut)
    {
        if chase.goal.as_ref() != Some(&goal) {
            chase.goal = Some(goal);
        }
    }
}

fn clear_goal(ecs: &mut Ecs, id: &EntityId) {
    if let Some(chase) = ecs
        .get_mut(id, ComponentKind::Chase)
        .and_then(Component::as_chase_mut)
    {
        chase.goal = None;
    }
}

fn position_of(ecs: &Ecs, id: &EntityId) -> Option<Vec2> {
    ecs.get(id, ComponentKind::Position)
        .and_then(Component::as_position)
        .map(|p| p.pos)
}

fn team_of(ecs: &Ecs, id: &EntityId) -> Option<u8> {
    ecs.get(id, ComponentKind::Owner)
        .and_then(Component::as_owner)
        .map(|o| o.team)
}
