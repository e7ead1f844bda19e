//! Simulation systems, run in a fixed order each tick.

pub mod collision;
pub mod combat;
pub mod decay;
pub mod economy;
pub mod movement;

use crate::ecs::System;

/// The full server schedule, in execution order: move, resolve, fight,
/// work, clean up, then broadcast the tick's positions.
pub fn schedule() -> Vec<System> {
    vec![
        movement::VELOCITY,
        movement::CHASE,
        collision::RESOLVE,
        combat::ENEMY_FINDER,
        combat::ATTACK,
        combat::CONTACT_DAMAGE,
        economy::GATHER,
        economy::PRODUCTION,
        economy::CONSTRUCTION,
        combat::DEATH,
        decay::DECAY,
        movement::SYNC_POSITIONS,
    ]
}
