//! Obstacle resolution: mobile units get pushed out of fixed footprints.

use crate::ecs::{Ecs, EntityId, System, WorldVars};
use crate::game::components::{Component, ComponentKind};
use crate::game::constants::collision;
use crate::util::vec2::{shortest_arc_deg, Vec2};

/// Pushes non-fixed colliders out of overlapping fixed ones.
pub const RESOLVE: System = System {
    name: "resolve_collisions",
    required: &[ComponentKind::Position, ComponentKind::Collider],
    vars: &[],
    run: resolve,
};

fn resolve(ecs: &mut Ecs, _vars: &mut WorldVars, id: &EntityId) {
    let Some(my_box) = ecs
        .get(id, ComponentKind::Collider)
        .and_then(Component::as_collider)
        .copied()
    else {
        return;
    };
    if my_box.fixed {
        return;
    }
    let Some(me) = ecs
        .get(id, ComponentKind::Position)
        .and_then(Component::as_position)
        .copied()
    else {
        return;
    };

    let mut push = Vec2::ZERO;
    for other in ecs.entities_with(&[ComponentKind::Position, ComponentKind::Collider]) {
        if other == *id {
            continue;
        }
        let Some((pos, collider)) =
            ecs.get_pair(&other, ComponentKind::Position, ComponentKind::Collider)
        else {
            continue;
        };
        let (Some(other_pos), Some(other_box)) = (pos.as_position(), collider.as_collider()) else {
            continue;
        };
        if !other_box.fixed || !my_box.overlaps(me.pos, other_box, other_pos.pos) {
            continue;
        }

        let away = (me.pos - other_pos.pos).normalize();
        // Overlap dead ahead of the obstacle's facing deflects sideways so
        // units slide around it instead of stalling against the front face.
        let arc = shortest_arc_deg(other_pos.heading, away.heading_deg());
        if arc.abs() <= collision::FACING_TOLERANCE_DEG {
            let side = if arc >= 0.0 { 90.0 } else { -90.0 };
            push += Vec2::from_heading(other_pos.heading + side) * collision::PUSH_STEP;
        } else {
            push += away * collision::PUSH_STEP;
        }
    }

    if push.length_sq() == 0.0 {
        return;
    }
    if let Some(position) = ecs
        .get_mut(id, ComponentKind::Position)
        .and_then(Component::as_position_mut)
    {
        position.pos += push;
    }
}
