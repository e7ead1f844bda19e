//! Movement systems: raw velocity, goal chasing, and the position broadcast.

use crate::ecs::{Ecs, EntityId, System, VarKey, WorldVars};
use crate::game::components::{ChaseGoal, Component, ComponentKind};
use crate::net::protocol::ServerCommand;
use crate::util::vec2::{shortest_arc_deg, wrap_deg, Vec2};

/// Applies the per-tick displacement of free-flying entities (projectiles).
pub const VELOCITY: System = System {
    name: "velocity",
    required: &[ComponentKind::Position, ComponentKind::Velocity],
    vars: &[],
    run: velocity,
};

/// Turns and moves chasing entities toward their goal.
pub const CHASE: System = System {
    name: "chase",
    required: &[ComponentKind::Position, ComponentKind::Chase],
    vars: &[],
    run: chase,
};

/// Broadcasts position deltas for entities that moved this tick.
pub const SYNC_POSITIONS: System = System {
    name: "sync_positions",
    required: &[ComponentKind::Position],
    vars: &[VarKey::Actions],
    run: sync_positions,
};

fn velocity(ecs: &mut Ecs, _vars: &mut WorldVars, id: &EntityId) {
    let Some(delta) = ecs
        .get(id, ComponentKind::Velocity)
        .and_then(Component::as_velocity)
        .map(|v| v.delta)
    else {
        return;
    };
    if let Some(position) = ecs
        .get_mut(id, ComponentKind::Position)
        .and_then(Component::as_position_mut)
    {
        position.pos += delta;
        if delta.length_sq() > 0.0 {
            position.heading = wrap_deg(delta.heading_deg());
        }
    }
}

fn chase(ecs: &mut Ecs, _vars: &mut WorldVars, id: &EntityId) {
    let Some(state) = ecs
        .get(id, ComponentKind::Chase)
        .and_then(Component::as_chase)
        .cloned()
    else {
        return;
    };
    let Some(goal) = state.goal.clone() else {
        return;
    };
    let Some(current) = ecs
        .get(id, ComponentKind::Position)
        .and_then(Component::as_position)
        .copied()
    else {
        return;
    };

    // Entity goals are resolved by id every tick; a vanished target clears
    // the goal instead of chasing a stale position.
    let target = match &goal {
        ChaseGoal::Point(p) => Some(*p),
        ChaseGoal::Entity(other) => {
            if !ecs.is_alive(other) {
                clear_goal(ecs, id);
                return;
            }
            ecs.get(other, ComponentKind::Position)
                .and_then(Component::as_position)
                .map(|p| p.pos)
        }
    };
    let Some(target) = target else {
        return;
    };

    let distance = current.pos.distance_to(target);
    if distance <= state.arrive_distance {
        // Point goals are done on arrival. Entity goals persist so combat
        // and gathering keep a live target reference.
        if matches!(goal, ChaseGoal::Point(_)) {
            clear_goal(ecs, id);
        }
        return;
    }

    let desired = (target - current.pos).heading_deg();
    let arc = shortest_arc_deg(current.heading, desired);
    let turn = arc.clamp(-state.turn_speed, state.turn_speed);
    let heading = wrap_deg(current.heading + turn);
    let step = state.speed.min(distance);
    let next = current.pos + Vec2::from_heading(heading) * step;

    if let Some(position) = ecs
        .get_mut(id, ComponentKind::Position)
        .and_then(Component::as_position_mut)
    {
        position.heading = heading;
        position.pos = next;
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

fn sync_positions(ecs: &mut Ecs, vars: &mut WorldVars, id: &EntityId) {
    let moving = ecs
        .get(id, ComponentKind::Velocity)
        .and_then(Component::as_velocity)
        .is_some_and(|v| v.delta.length_sq() > 0.0)
        || ecs
            .get(id, ComponentKind::Chase)
            .and_then(Component::as_chase)
            .is_some_and(|c| c.goal.is_some());
    if !moving {
        return;
    }
    let Some(position) = ecs
        .get(id, ComponentKind::Position)
        .and_then(Component::as_position)
        .copied()
    else {
        return;
    };
    if let Some(actions) = vars.actions() {
        actions.broadcast(ServerCommand::Update {
            id: id.clone(),
            position,
        });
    }
}
