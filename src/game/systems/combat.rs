//! Combat systems: target acquisition, attacks, projectile impact, death.

use tracing::warn;

use crate::ecs::{Ecs, EntityId, System, VarKey, WorldVars};
use crate::game::components::{ChaseGoal, Component, ComponentKind};
use crate::net::protocol::ServerCommand;
use crate::util::vec2::Vec2;

/// Periodic nearest-enemy scan; feeds the chase component of idle units.
pub const ENEMY_FINDER: System = System {
    name: "enemy_finder",
    required: &[
        ComponentKind::Position,
        ComponentKind::EnemyFinder,
        ComponentKind::Chase,
        ComponentKind::Owner,
    ],
    vars: &[VarKey::Actions],
    run: enemy_finder,
};

/// Strikes or shoots at the current chase target once in range.
pub const ATTACK: System = System {
    name: "attack",
    required: &[
        ComponentKind::Position,
        ComponentKind::Attack,
        ComponentKind::Chase,
        ComponentKind::Owner,
    ],
    vars: &[VarKey::Catalog, VarKey::Actions],
    run: attack,
};

/// Applies projectile damage on bounding-box overlap.
pub const CONTACT_DAMAGE: System = System {
    name: "contact_damage",
    required: &[
        ComponentKind::Position,
        ComponentKind::ContactDamage,
        ComponentKind::Collider,
        ComponentKind::Owner,
    ],
    vars: &[VarKey::Actions],
    run: contact_damage,
};

/// Removes entities whose health reached zero.
pub const DEATH: System = System {
    name: "death",
    required: &[ComponentKind::Health],
    vars: &[VarKey::Actions],
    run: death,
};

fn enemy_finder(ecs: &mut Ecs, vars: &mut WorldVars, id: &EntityId) {
    let ready = match ecs
        .get_mut(id, ComponentKind::EnemyFinder)
        .and_then(Component::as_enemy_finder_mut)
    {
        Some(finder) => {
            if finder.timer > 0 {
                finder.timer -= 1;
                false
            } else {
                finder.timer = finder.cooldown;
                true
            }
        }
        None => false,
    };
    if !ready {
        return;
    }
    // Scans never override an existing order or engagement.
    let idle = ecs
        .get(id, ComponentKind::Chase)
        .and_then(Component::as_chase)
        .is_some_and(|c| c.goal.is_none());
    if !idle {
        return;
    }

    let (Some(my_pos), Some(my_team), Some(radius)) = (
        position_of(ecs, id),
        team_of(ecs, id),
        ecs.get(id, ComponentKind::EnemyFinder)
            .and_then(Component::as_enemy_finder)
            .map(|f| f.radius),
    ) else {
        return;
    };

    let mut nearest: Option<(EntityId, f32)> = None;
    for other in ecs.entities_with(&[
        ComponentKind::Position,
        ComponentKind::Health,
        ComponentKind::Owner,
    ]) {
        if other == *id || team_of(ecs, &other) == Some(my_team) {
            continue;
        }
        let Some(other_pos) = position_of(ecs, &other) else {
            continue;
        };
        let dist_sq = my_pos.distance_sq_to(other_pos);
        if dist_sq > radius * radius {
            continue;
        }
        if nearest.as_ref().map_or(true, |(_, best)| dist_sq < *best) {
            nearest = Some((other, dist_sq));
        }
    }

    let Some((target, _)) = nearest else {
        return;
    };
    let goal = Some(ChaseGoal::Entity(target));
    if let Some(chase) = ecs
        .get_mut(id, ComponentKind::Chase)
        .and_then(Component::as_chase_mut)
    {
        chase.goal = goal.clone();
    }
    if let Some(actions) = vars.actions() {
        actions.broadcast(ServerCommand::TargetChange {
            id: id.clone(),
            goal,
        });
    }
}

fn attack(ecs: &mut Ecs, vars: &mut WorldVars, id: &EntityId) {
    let target = match ecs
        .get(id, ComponentKind::Chase)
        .and_then(Component::as_chase)
        .and_then(|c| c.goal.as_ref())
    {
        Some(ChaseGoal::Entity(target)) => target.clone(),
        _ => return,
    };
    if !ecs.is_alive(&target) {
        return;
    }
    let (Some(my_pos), Some(target_pos)) = (position_of(ecs, id), position_of(ecs, &target)) else {
        return;
    };
    let Some(range) = ecs
        .get(id, ComponentKind::Attack)
        .and_then(Component::as_attack)
        .map(|a| a.range)
    else {
        return;
    };
    // Range is measured to the target's footprint, not its center, so
    // buildings with a wide collider can still be struck in melee.
    let target_half = ecs
        .get(&target, ComponentKind::Collider)
        .and_then(Component::as_collider)
        .map(|c| c.width.max(c.height) / 2.0)
        .unwrap_or(0.0);
    if my_pos.distance_to(target_pos) > range + target_half {
        return;
    }

    // The cooldown only counts down while the target stays in range, so the
    // first strike of an engagement lands a full cooldown after contact.
    let fires = match ecs
        .get_mut(id, ComponentKind::Attack)
        .and_then(Component::as_attack_mut)
    {
        Some(a) => {
            if a.timer > 0 {
                a.timer -= 1;
            }
            if a.timer == 0 {
                a.timer = a.cooldown;
                true
            } else {
                false
            }
        }
        None => false,
    };
    if !fires {
        return;
    }

    let Some(stats) = ecs
        .get(id, ComponentKind::Attack)
        .and_then(Component::as_attack)
        .cloned()
    else {
        return;
    };
    match stats.projectile {
        Some(name) => launch_projectile(ecs, vars, id, &name, my_pos, target_pos),
        None => strike(ecs, vars, &target, target_pos, stats.damage),
    }
}

fn launch_projectile(
    ecs: &mut Ecs,
    vars: &mut WorldVars,
    shooter: &EntityId,
    name: &str,
    from: Vec2,
    at: Vec2,
) {
    let team = team_of(ecs, shooter);
    let Some(mut bundle) = vars.catalog().and_then(|c| c.spawn(name, team, from)) else {
        warn!("attack references unknown projectile {name:?}");
        return;
    };
    // Catalog projectiles fly along +x; aim the bundle before spawning.
    let dir = (at - from).normalize();
    for component in bundle.iter_mut() {
        match component {
            Component::Velocity(v) => v.delta = dir * v.delta.length(),
            Component::Position(p) => p.heading = dir.heading_deg(),
            _ => {}
        }
    }
    if let Err(e) = ecs.create_entity(bundle) {
        warn!("failed to spawn projectile {name}: {e}");
        return;
    }
    if let Some(actions) = vars.actions() {
        actions.broadcast(ServerCommand::Sound {
            name: "shoot".to_string(),
            pos: Some(from),
        });
    }
}

fn strike(ecs: &mut Ecs, vars: &mut WorldVars, target: &EntityId, at: Vec2, damage: f32) {
    let Some(health) = ecs
        .get_mut(target, ComponentKind::Health)
        .and_then(Component::as_health_mut)
    else {
        return;
    };
    health.hp -= damage;
    let health = *health;
    if let Some(actions) = vars.actions() {
        actions.broadcast(ServerCommand::ComponentInfo {
            id: target.clone(),
            component: health.into(),
        });
        actions.broadcast(ServerCommand::Sound {
            name: "strike".to_string(),
            pos: Some(at),
        });
    }
}

fn contact_damage(ecs: &mut Ecs, vars: &mut WorldVars, id: &EntityId) {
    let ready = match ecs
        .get_mut(id, ComponentKind::ContactDamage)
        .and_then(Component::as_contact_damage_mut)
    {
        Some(cd) => {
            if cd.timer > 0 {
                cd.timer -= 1;
                false
            } else {
                cd.timer = cd.period;
                true
            }
        }
        None => false,
    };
    if !ready {
        return;
    }

    let (Some(my_pos), Some(my_team)) = (position_of(ecs, id), team_of(ecs, id)) else {
        return;
    };
    let (Some(my_box), Some(cd)) = (
        ecs.get(id, ComponentKind::Collider)
            .and_then(Component::as_collider)
            .copied(),
        ecs.get(id, ComponentKind::ContactDamage)
            .and_then(Component::as_contact_damage)
            .copied(),
    ) else {
        return;
    };

    for other in ecs.entities_with(&[
        ComponentKind::Position,
        ComponentKind::Health,
        ComponentKind::Collider,
        ComponentKind::Owner,
    ]) {
        if other == *id || team_of(ecs, &other) == Some(my_team) {
            continue;
        }
        let (Some(other_pos), Some(other_box)) = (
            position_of(ecs, &other),
            ecs.get(&other, ComponentKind::Collider)
                .and_then(Component::as_collider)
                .copied(),
        ) else {
            continue;
        };
        if !my_box.overlaps(my_pos, &other_box, other_pos) {
            continue;
        }
        strike(ecs, vars, &other, other_pos, cd.damage);
        if cd.remove_on_contact {
            ecs.remove_entity(id);
        }
        break;
    }
}

fn death(ecs: &mut Ecs, vars: &mut WorldVars, id: &EntityId) {
    let dead = ecs
        .get(id, ComponentKind::Health)
        .and_then(Component::as_health)
        .is_some_and(|h| h.hp <= 0.0);
    if !dead {
        return;
    }
    let pos = position_of(ecs, id);
    if let Some(actions) = vars.actions() {
        actions.broadcast(ServerCommand::Sound {
            name: "death".to_string(),
            pos,
        });
    }
    ecs.remove_entity(id);
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::WorldVar;
    use crate::game::actions::Actions;
    use crate::game::catalog::UnitCatalog;
    use crate::game::components::{
        Attack, Chase, Collider, ContactDamage, EnemyFinder, Health, Owner, Position,
    };
    use crate::net::protocol::Outgoing;
    use smallvec::smallvec;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn world(systems: &[System]) -> (Ecs, UnboundedReceiver<Outgoing>) {
        let (actions, rx) = Actions::capture();
        let mut ecs = Ecs::new();
        ecs.init_all_components();
        ecs.add_variable(WorldVar::Actions(actions)).unwrap();
        ecs.add_variable(WorldVar::Catalog(UnitCatalog::standard()))
            .unwrap();
        for system in systems {
            ecs.init_system(*system).unwrap();
        }
        (ecs, rx)
    }

    fn knight_attack() -> Attack {
        Attack {
            range: 14.0,
            damage: 10.0,
            cooldown: 30,
            timer: 30,
            projectile: None,
        }
    }

    fn fighter(ecs: &mut Ecs, team: u8, at: Vec2, goal: Option<ChaseGoal>) -> EntityId {
        ecs.create_entity(smallvec![
            Position::at(at).into(),
            Owner { team }.into(),
            Health::full(120.0).into(),
            Chase {
                goal,
                speed: 0.0,
                turn_speed: 10.0,
                arrive_distance: 5.0,
            }
            .into(),
            knight_attack().into(),
        ])
        .unwrap()
    }

    fn hp_of(ecs: &Ecs, id: &EntityId) -> f32 {
        ecs.get(id, ComponentKind::Health)
            .and_then(Component::as_health)
            .map(|h| h.hp)
            .unwrap_or(0.0)
    }

    fn health_infos(rx: &mut UnboundedReceiver<Outgoing>) -> usize {
        let mut count = 0;
        while let Ok(msg) = rx.try_recv() {
            if let ServerCommand::ComponentInfo { component, .. } = msg.cmd {
                if component.kind() == ComponentKind::Health {
                    count += 1;
                }
            }
        }
        count
    }

    #[test]
    fn test_melee_strikes_once_per_cooldown() {
        let (mut ecs, mut rx) = world(&[ATTACK]);
        let victim = fighter(&mut ecs, 1, Vec2::new(10.0, 0.0), None);
        let _attacker = fighter(
            &mut ecs,
            0,
            Vec2::ZERO,
            Some(ChaseGoal::Entity(victim.clone())),
        );

        for _ in 0..29 {
            ecs.update();
        }
        assert_eq!(health_infos(&mut rx), 0);
        assert_eq!(hp_of(&ecs, &victim), 120.0);

        // The 30th in-range tick lands exactly one strike.
        ecs.update();
        assert_eq!(health_infos(&mut rx), 1);
        assert_eq!(hp_of(&ecs, &victim), 110.0);

        for _ in 0..30 {
            ecs.update();
        }
        assert_eq!(health_infos(&mut rx), 1);
        assert_eq!(hp_of(&ecs, &victim), 100.0);
    }

    #[test]
    fn test_cooldown_waits_while_out_of_range() {
        let (mut ecs, mut rx) = world(&[ATTACK]);
        let victim = fighter(&mut ecs, 1, Vec2::new(100.0, 0.0), None);
        let _attacker = fighter(
            &mut ecs,
            0,
            Vec2::ZERO,
            Some(ChaseGoal::Entity(victim.clone())),
        );

        for _ in 0..100 {
            ecs.update();
        }
        assert_eq!(health_infos(&mut rx), 0);
        assert_eq!(hp_of(&ecs, &victim), 120.0);
    }

    #[test]
    fn test_ranged_attack_launches_aimed_projectile() {
        let (mut ecs, _rx) = world(&[ATTACK]);
        let victim = fighter(&mut ecs, 1, Vec2::new(0.0, 100.0), None);
        let archer = ecs
            .create_entity(smallvec![
                Position::at(Vec2::ZERO).into(),
                Owner { team: 0 }.into(),
                Chase {
                    goal: Some(ChaseGoal::Entity(victim)),
                    speed: 0.0,
                    turn_speed: 10.0,
                    arrive_distance: 5.0,
                }
                .into(),
                Attack {
                    range: 140.0,
                    damage: 0.0,
                    cooldown: 45,
                    timer: 1,
                    projectile: Some("arrow".to_string()),
                }
                .into(),
            ])
            .unwrap();

        ecs.update();

        let arrows = ecs.entities_with(&[ComponentKind::ContactDamage]);
        assert_eq!(arrows.len(), 1);
        let delta = ecs
            .get(&arrows[0], ComponentKind::Velocity)
            .and_then(Component::as_velocity)
            .map(|v| v.delta)
            .unwrap();
        assert!(delta.y > 0.0 && delta.x.abs() < 1e-3);
        assert!(ecs.is_alive(&archer));
    }

    #[test]
    fn test_enemy_finder_targets_nearest_enemy() {
        let (mut ecs, _rx) = world(&[ENEMY_FINDER]);
        let near = fighter(&mut ecs, 1, Vec2::new(50.0, 0.0), None);
        let _far = fighter(&mut ecs, 1, Vec2::new(120.0, 0.0), None);
        let _friend = fighter(&mut ecs, 0, Vec2::new(10.0, 0.0), None);
        let scout = ecs
            .create_entity(smallvec![
                Position::at(Vec2::ZERO).into(),
                Owner { team: 0 }.into(),
                Chase {
                    goal: None,
                    speed: 2.0,
                    turn_speed: 10.0,
                    arrive_distance: 5.0,
                }
                .into(),
                EnemyFinder {
                    radius: 180.0,
                    cooldown: 15,
                    timer: 0,
                }
                .into(),
            ])
            .unwrap();

        ecs.update();

        let goal = ecs
            .get(&scout, ComponentKind::Chase)
            .and_then(Component::as_chase)
            .and_then(|c| c.goal.clone());
        assert_eq!(goal, Some(ChaseGoal::Entity(near)));
    }

    #[test]
    fn test_enemy_finder_keeps_existing_goal() {
        let (mut ecs, _rx) = world(&[ENEMY_FINDER]);
        let _enemy = fighter(&mut ecs, 1, Vec2::new(50.0, 0.0), None);
        let ordered = Vec2::new(-200.0, 0.0);
        let scout = ecs
            .create_entity(smallvec![
                Position::at(Vec2::ZERO).into(),
                Owner { team: 0 }.into(),
                Chase {
                    goal: Some(ChaseGoal::Point(ordered)),
                    speed: 2.0,
                    turn_speed: 10.0,
                    arrive_distance: 5.0,
                }
                .into(),
                EnemyFinder {
                    radius: 180.0,
                    cooldown: 15,
                    timer: 0,
                }
                .into(),
            ])
            .unwrap();

        ecs.update();

        let goal = ecs
            .get(&scout, ComponentKind::Chase)
            .and_then(Component::as_chase)
            .and_then(|c| c.goal.clone());
        assert_eq!(goal, Some(ChaseGoal::Point(ordered)));
    }

    #[test]
    fn test_arrow_hits_and_vanishes() {
        let (mut ecs, mut rx) = world(&[CONTACT_DAMAGE]);
        let victim = ecs
            .create_entity(smallvec![
                Position::at(Vec2::ZERO).into(),
                Owner { team: 1 }.into(),
                Health::full(40.0).into(),
                Collider {
                    width: 12.0,
                    height: 12.0,
                    fixed: false,
                }
                .into(),
            ])
            .unwrap();
        let arrow = ecs
            .create_entity(smallvec![
                Position::at(Vec2::new(2.0, 0.0)).into(),
                Owner { team: 0 }.into(),
                Collider {
                    width: 4.0,
                    height: 4.0,
                    fixed: false,
                }
                .into(),
                ContactDamage {
                    damage: 10.0,
                    period: 2,
                    timer: 0,
                    remove_on_contact: true,
                }
                .into(),
            ])
            .unwrap();

        ecs.update();

        assert_eq!(hp_of(&ecs, &victim), 30.0);
        assert!(!ecs.is_alive(&arrow));
        assert_eq!(health_infos(&mut rx), 1);
    }

    #[test]
    fn test_bolt_keeps_flying_after_hit() {
        let (mut ecs, _rx) = world(&[CONTACT_DAMAGE]);
        let _victim = ecs
            .create_entity(smallvec![
                Position::at(Vec2::ZERO).into(),
                Owner { team: 1 }.into(),
                Health::full(120.0).into(),
                Collider {
                    width: 12.0,
                    height: 12.0,
                    fixed: false,
                }
                .into(),
            ])
            .unwrap();
        let bolt = ecs
            .create_entity(smallvec![
                Position::at(Vec2::new(2.0, 0.0)).into(),
                Owner { team: 0 }.into(),
                Collider {
                    width: 6.0,
                    height: 6.0,
                    fixed: false,
                }
                .into(),
                ContactDamage {
                    damage: 25.0,
                    period: 2,
                    timer: 0,
                    remove_on_contact: false,
                }
                .into(),
            ])
            .unwrap();

        ecs.update();

        assert!(ecs.is_alive(&bolt));
    }

    #[test]
    fn test_death_removes_drained_entities() {
        let (mut ecs, _rx) = world(&[DEATH]);
        let dead = ecs
            .create_entity(smallvec![
                Position::at(Vec2::ZERO).into(),
                Health { hp: 0.0, max: 40.0 }.into(),
            ])
            .unwrap();
        let alive = ecs
            .create_entity(smallvec![Health::full(40.0).into()])
            .unwrap();

        ecs.update();

        assert!(!ecs.is_alive(&dead));
        assert!(ecs.is_alive(&alive));
    }
}
