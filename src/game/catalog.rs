//! Unit catalog: the explicit factory for every spawnable entity.
//!
//! The catalog is plain data owned by the session — unit names map to a cost
//! and a component-bundle constructor. Production, placement, and level
//! setup all spawn through it.

use hashbrown::HashMap;
use smallvec::smallvec;

use crate::ecs::ComponentBundle;
use crate::game::components::{
    Attack, Chase, Collider, Construction, ContactDamage, Decay, Depot, EnemyFinder, Gatherer,
    Health, Owner, Position, Production, ResourceKind, ResourceNode, Sprite, Velocity,
};
use crate::game::constants::{combat, gather, movement};
use crate::game::player::{Cost, TeamId};
use crate::util::vec2::Vec2;

type MakeFn = fn(Option<TeamId>, Vec2) -> ComponentBundle;

/// One catalog entry.
pub struct UnitSpec {
    pub cost: Cost,
    /// Ticks of construction for placeable buildings.
    pub build_time: u32,
    /// True for buildings players may place directly.
    pub placeable: bool,
    make: MakeFn,
}

pub struct UnitCatalog {
    specs: HashMap<&'static str, UnitSpec>,
}

impl UnitCatalog {
    pub fn get(&self, name: &str) -> Option<&UnitSpec> {
        self.specs.get(name)
    }

    /// Build the component bundle for a unit, or None for unknown names.
    pub fn spawn(&self, name: &str, owner: Option<TeamId>, pos: Vec2) -> Option<ComponentBundle> {
        self.specs.get(name).map(|spec| (spec.make)(owner, pos))
    }

    /// Bundle for an under-construction placeholder of a placeable building.
    pub fn construction_site(
        &self,
        building: &str,
        owner: TeamId,
        pos: Vec2,
    ) -> Option<ComponentBundle> {
        let spec = self.specs.get(building)?;
        if !spec.placeable {
            return None;
        }
        Some(smallvec![
            Position::at(pos).into(),
            Owner { team: owner }.into(),
            Health::full(60.0).into(),
            Collider {
                width: 40.0,
                height: 40.0,
                fixed: true,
            }
            .into(),
            Sprite {
                name: "construction".to_string(),
            }
            .into(),
            Construction {
                progress: 0,
                required: spec.build_time,
                builds: building.to_string(),
            }
            .into(),
        ])
    }

    /// The standard unit set.
    pub fn standard() -> Self {
        let mut specs: HashMap<&'static str, UnitSpec> = HashMap::new();

        specs.insert(
            "fortress",
            UnitSpec {
                cost: Cost::default(),
                build_time: 0,
                placeable: false,
                make: make_fortress,
            },
        );
        specs.insert(
            "barracks",
            UnitSpec {
                cost: Cost {
                    money: 80.0,
                    wood: 120.0,
                    meat: 0.0,
                },
                build_time: 300,
                placeable: true,
                make: make_barracks,
            },
        );
        specs.insert(
            "watchtower",
            UnitSpec {
                cost: Cost {
                    money: 50.0,
                    wood: 80.0,
                    meat: 0.0,
                },
                build_time: 240,
                placeable: true,
                make: make_watchtower,
            },
        );
        specs.insert(
            "worker",
            UnitSpec {
                cost: Cost {
                    money: 30.0,
                    wood: 0.0,
                    meat: 10.0,
                },
                build_time: 0,
                placeable: false,
                make: make_worker,
            },
        );
        specs.insert(
            "knight",
            UnitSpec {
                cost: Cost {
                    money: 60.0,
                    wood: 0.0,
                    meat: 20.0,
                },
                build_time: 0,
                placeable: false,
                make: make_knight,
            },
        );
        specs.insert(
            "archer",
            UnitSpec {
                cost: Cost {
                    money: 45.0,
                    wood: 25.0,
                    meat: 10.0,
                },
                build_time: 0,
                placeable: false,
                make: make_archer,
            },
        );
        specs.insert(
            "arrow",
            UnitSpec {
                cost: Cost::default(),
                build_time: 0,
                placeable: false,
                make: make_arrow,
            },
        );
        specs.insert(
            "bolt",
            UnitSpec {
                cost: Cost::default(),
                build_time: 0,
                placeable: false,
                make: make_bolt,
            },
        );
        specs.insert(
            "tree",
            UnitSpec {
                cost: Cost::default(),
                build_time: 0,
                placeable: false,
                make: make_tree,
            },
        );
        specs.insert(
            "gold_mine",
            UnitSpec {
                cost: Cost::default(),
                build_time: 0,
                placeable: false,
                make: make_gold_mine,
            },
        );
        specs.insert(
            "boar",
            UnitSpec {
                cost: Cost::default(),
                build_time: 0,
                placeable: false,
                make: make_boar,
            },
        );

        Self { specs }
    }
}

fn sprite(name: &str) -> Sprite {
    Sprite {
        name: name.to_string(),
    }
}

fn owner_of(team: Option<TeamId>) -> Owner {
    Owner {
        team: team.unwrap_or(u8::MAX),
    }
}

fn make_fortress(team: Option<TeamId>, pos: Vec2) -> ComponentBundle {
    smallvec![
        Position::at(pos).into(),
        owner_of(team).into(),
        Health::full(1000.0).into(),
        Collider {
            width: 64.0,
            height: 64.0,
            fixed: true,
        }
        .into(),
        Depot::default().into(),
        Production::new(150).into(),
        sprite("fortress").into(),
    ]
}

fn make_barracks(team: Option<TeamId>, pos: Vec2) -> ComponentBundle {
    smallvec![
        Position::at(pos).into(),
        owner_of(team).into(),
        Health::full(400.0).into(),
        Collider {
            width: 48.0,
            height: 48.0,
            fixed: true,
        }
        .into(),
        Production::new(120).into(),
        sprite("barracks").into(),
    ]
}

fn make_watchtower(team: Option<TeamId>, pos: Vec2) -> ComponentBundle {
    smallvec![
        Position::at(pos).into(),
        owner_of(team).into(),
        Health::full(250.0).into(),
        Collider {
            width: 32.0,
            height: 32.0,
            fixed: true,
        }
        .into(),
        // Immobile, but holds a chase target so the attack system can aim.
        Chase::idle(0.0, 360.0, movement::ARRIVE_DISTANCE).into(),
        EnemyFinder {
            radius: 220.0,
            cooldown: combat::SCAN_COOLDOWN,
            timer: 0,
        }
        .into(),
        Attack {
            range: 200.0,
            damage: 0.0,
            cooldown: 60,
            timer: 60,
            projectile: Some("bolt".to_string()),
        }
        .into(),
        sprite("watchtower").into(),
    ]
}

fn make_worker(team: Option<TeamId>, pos: Vec2) -> ComponentBundle {
    smallvec![
        Position::at(pos).into(),
        owner_of(team).into(),
        Health::full(40.0).into(),
        Collider {
            width: 12.0,
            height: 12.0,
            fixed: false,
        }
        .into(),
        Chase::idle(
            movement::UNIT_SPEED,
            movement::TURN_SPEED,
            movement::ARRIVE_DISTANCE
        )
        .into(),
        Gatherer::new(gather::CAPACITY, gather::RATE).into(),
        sprite("worker").into(),
    ]
}

fn make_knight(team: Option<TeamId>, pos: Vec2) -> ComponentBundle {
    smallvec![
        Position::at(pos).into(),
        owner_of(team).into(),
        Health::full(120.0).into(),
        Collider {
            width: 14.0,
            height: 14.0,
            fixed: false,
        }
        .into(),
        Chase::idle(
            movement::UNIT_SPEED,
            movement::TURN_SPEED,
            movement::ARRIVE_DISTANCE
        )
        .into(),
        EnemyFinder {
            radius: combat::AGGRO_RADIUS,
            cooldown: combat::SCAN_COOLDOWN,
            timer: 0,
        }
        .into(),
        Attack {
            range: 14.0,
            damage: 10.0,
            cooldown: 30,
            timer: 30,
            projectile: None,
        }
        .into(),
        sprite("knight").into(),
    ]
}

fn make_archer(team: Option<TeamId>, pos: Vec2) -> ComponentBundle {
    smallvec![
        Position::at(pos).into(),
        owner_of(team).into(),
        Health::full(70.0).into(),
        Collider {
            width: 12.0,
            height: 12.0,
            fixed: false,
        }
        .into(),
        Chase::idle(
            movement::UNIT_SPEED,
            movement::TURN_SPEED,
            movement::ARRIVE_DISTANCE
        )
        .into(),
        EnemyFinder {
            radius: combat::AGGRO_RADIUS,
            cooldown: combat::SCAN_COOLDOWN,
            timer: 0,
        }
        .into(),
        Attack {
            range: 140.0,
            damage: 0.0,
            cooldown: 45,
            timer: 45,
            projectile: Some("arrow".to_string()),
        }
        .into(),
        sprite("archer").into(),
    ]
}

fn make_arrow(team: Option<TeamId>, pos: Vec2) -> ComponentBundle {
    smallvec![
        Position::at(pos).into(),
        owner_of(team).into(),
        Velocity {
            delta: Vec2::new(combat::PROJECTILE_SPEED, 0.0),
        }
        .into(),
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
        Decay {
            ticks_left: combat::PROJECTILE_LIFETIME,
        }
        .into(),
        sprite("arrow").into(),
    ]
}

fn make_bolt(team: Option<TeamId>, pos: Vec2) -> ComponentBundle {
    smallvec![
        Position::at(pos).into(),
        owner_of(team).into(),
        Velocity {
            delta: Vec2::new(combat::PROJECTILE_SPEED * 1.5, 0.0),
        }
        .into(),
        Collider {
            width: 6.0,
            height: 6.0,
            fixed: false,
        }
        .into(),
        // Bolts punch through: they hit on overlap but keep flying.
        ContactDamage {
            damage: 25.0,
            period: 2,
            timer: 0,
            remove_on_contact: false,
        }
        .into(),
        Decay {
            ticks_left: combat::PROJECTILE_LIFETIME,
        }
        .into(),
        sprite("bolt").into(),
    ]
}

fn make_tree(_team: Option<TeamId>, pos: Vec2) -> ComponentBundle {
    smallvec![
        Position::at(pos).into(),
        ResourceNode {
            kind: ResourceKind::Wood,
            remaining: 200.0,
        }
        .into(),
        Collider {
            width: 24.0,
            height: 24.0,
            fixed: true,
        }
        .into(),
        sprite("tree").into(),
    ]
}

fn make_gold_mine(_team: Option<TeamId>, pos: Vec2) -> ComponentBundle {
    smallvec![
        Position::at(pos).into(),
        ResourceNode {
            kind: ResourceKind::Money,
            remaining: 500.0,
        }
        .into(),
        Collider {
            width: 40.0,
            height: 40.0,
            fixed: true,
        }
        .into(),
        sprite("gold_mine").into(),
    ]
}

fn make_boar(_team: Option<TeamId>, pos: Vec2) -> ComponentBundle {
    smallvec![
        Position::at(pos).into(),
        ResourceNode {
            kind: ResourceKind::Meat,
            remaining: 100.0,
        }
        .into(),
        Collider {
            width: 16.0,
            height: 16.0,
            fixed: true,
        }
        .into(),
        sprite("boar").into(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::components::ComponentKind;

    #[test]
    fn test_spawn_known_unit() {
        let catalog = UnitCatalog::standard();
        let bundle = catalog.spawn("knight", Some(1), Vec2::new(10.0, 20.0)).unwrap();

        let owner = bundle
            .iter()
            .find_map(|c| c.as_owner())
            .expect("knight has an owner");
        assert_eq!(owner.team, 1);
        assert!(bundle.iter().any(|c| c.kind() == ComponentKind::Attack));
    }

    #[test]
    fn test_spawn_unknown_unit() {
        let catalog = UnitCatalog::standard();
        assert!(catalog.spawn("dragon", None, Vec2::ZERO).is_none());
    }

    #[test]
    fn test_construction_site_only_for_placeable() {
        let catalog = UnitCatalog::standard();
        assert!(catalog.construction_site("barracks", 0, Vec2::ZERO).is_some());
        assert!(catalog.construction_site("knight", 0, Vec2::ZERO).is_none());
    }

    #[test]
    fn test_resource_nodes_are_neutral() {
        let catalog = UnitCatalog::standard();
        let bundle = catalog.spawn("tree", None, Vec2::ZERO).unwrap();
        assert!(bundle.iter().all(|c| c.kind() != ComponentKind::Owner));
        assert!(bundle.iter().all(|c| c.kind() != ComponentKind::Health));
    }
}
