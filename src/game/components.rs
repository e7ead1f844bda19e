//! Component definitions.
//!
//! Components are pure data with no behavior; every entity is composed of a
//! subset of these records. The `Component` enum is the closed set of kinds
//! that can travel over the wire — receivers match on the serialized `kind`
//! tag to pick the decode path.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::ecs::EntityId;
use crate::util::vec2::Vec2;

/// Resource kinds a player can hold and a node can yield.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Money,
    Wood,
    Meat,
}

/// World position plus facing in degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub pos: Vec2,
    /// Heading in degrees, [0, 360).
    pub heading: f32,
}

impl Position {
    pub fn at(pos: Vec2) -> Self {
        Self { pos, heading: 0.0 }
    }
}

/// Per-tick displacement, applied unconditionally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    pub delta: Vec2,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Health {
    pub hp: f32,
    pub max: f32,
}

impl Health {
    pub fn full(max: f32) -> Self {
        Self { hp: max, max }
    }
}

/// Owning player's team id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub team: u8,
}

/// What a chasing entity is currently moving toward.
///
/// Entity goals are id-indirect only; the position is resolved by lookup
/// every tick and the goal is cleared when the target entity is gone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChaseGoal {
    Point(Vec2),
    Entity(EntityId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chase {
    pub goal: Option<ChaseGoal>,
    /// Movement speed in world units per tick.
    pub speed: f32,
    /// Maximum turn per tick, degrees.
    pub turn_speed: f32,
    /// Goal is considered reached within this distance.
    pub arrive_distance: f32,
}

impl Chase {
    pub fn idle(speed: f32, turn_speed: f32, arrive_distance: f32) -> Self {
        Self {
            goal: None,
            speed,
            turn_speed,
            arrive_distance,
        }
    }
}

/// Remaining lifetime in ticks; the decay system removes the entity at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decay {
    pub ticks_left: u32,
}

/// Attack on the current chase target once it is in range.
///
/// `projectile: Some(name)` spawns that unit from the catalog instead of
/// applying damage directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attack {
    pub range: f32,
    pub damage: f32,
    /// Ticks between attacks.
    pub cooldown: u32,
    /// Ticks until the next attack is allowed.
    pub timer: u32,
    pub projectile: Option<String>,
}

/// Damage applied on bounding-rectangle overlap with opposing entities.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContactDamage {
    pub damage: f32,
    /// Overlap is tested every this many ticks.
    pub period: u32,
    pub timer: u32,
    /// Arrows vanish on the first hit; siege bolts keep flying.
    pub remove_on_contact: bool,
}

/// Periodic nearest-enemy scan that feeds the chase component.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnemyFinder {
    /// Enemies beyond this radius are ignored.
    pub radius: f32,
    /// Ticks between scans; keeps the all-entity scan off the hot path.
    pub cooldown: u32,
    pub timer: u32,
}

/// Worker state for the gather loop: find node, extract, haul to a depot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Gatherer {
    pub capacity: f32,
    pub carried: f32,
    pub carrying: Option<ResourceKind>,
    /// Units extracted per tick while at a node.
    pub rate: f32,
    /// True while hauling to a depot (full load or node depleted).
    pub returning: bool,
}

impl Gatherer {
    pub fn new(capacity: f32, rate: f32) -> Self {
        Self {
            capacity,
            carried: 0.0,
            carrying: None,
            rate,
            returning: false,
        }
    }
}

/// A harvestable map feature (tree, herd, gold pile).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceNode {
    pub kind: ResourceKind,
    pub remaining: f32,
}

/// Accepts deposits from friendly gatherers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Depot {}

/// FIFO production queue on a building.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Production {
    pub queue: VecDeque<String>,
    /// Ticks from an item reaching the queue head to the unit spawning.
    pub delay: u32,
    pub timer: u32,
}

impl Production {
    pub fn new(delay: u32) -> Self {
        Self {
            queue: VecDeque::new(),
            delay,
            timer: delay,
        }
    }
}

/// An under-construction placeholder; swapped for the finished building
/// once progress reaches the threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Construction {
    pub progress: u32,
    pub required: u32,
    /// Catalog name of the building that replaces the placeholder.
    pub builds: String,
}

/// Axis-aligned bounding box for overlap tests and obstacle resolution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Collider {
    pub width: f32,
    pub height: f32,
    /// Fixed colliders never get pushed; units are pushed out of them.
    pub fixed: bool,
}

impl Collider {
    /// Overlap test between two centered bounding rectangles.
    pub fn overlaps(&self, at: Vec2, other: &Collider, other_at: Vec2) -> bool {
        (at.x - other_at.x).abs() * 2.0 < self.width + other.width
            && (at.y - other_at.y).abs() * 2.0 < self.height + other.height
    }
}

/// Texture name for the renderer; carried so CREATE snapshots are drawable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sprite {
    pub name: String,
}

macro_rules! components {
    ($( $variant:ident($ty:ty) => $as_ref:ident, $as_mut:ident; )+) => {
        /// Closed set of component kinds.
        ///
        /// Serialized internally tagged so a CREATE snapshot carries the
        /// kind name alongside the fields.
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        #[serde(tag = "kind", rename_all = "snake_case")]
        pub enum Component {
            $( $variant($ty), )+
        }

        /// Discriminant-only view of [`Component`], used as the store key.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum ComponentKind {
            $( $variant, )+
        }

        impl ComponentKind {
            pub const ALL: &'static [ComponentKind] = &[ $( ComponentKind::$variant, )+ ];
        }

        impl Component {
            pub fn kind(&self) -> ComponentKind {
                match self {
                    $( Component::$variant(_) => ComponentKind::$variant, )+
                }
            }

            $(
                pub fn $as_ref(&self) -> Option<&$ty> {
                    match self {
                        Component::$variant(v) => Some(v),
                        _ => None,
                    }
                }

                pub fn $as_mut(&mut self) -> Option<&mut $ty> {
                    match self {
                        Component::$variant(v) => Some(v),
                        _ => None,
                    }
                }
            )+
        }

        $(
            impl From<$ty> for Component {
                fn from(value: $ty) -> Self {
                    Component::$variant(value)
                }
            }
        )+
    };
}

components! {
    Position(Position) => as_position, as_position_mut;
    Velocity(Velocity) => as_velocity, as_velocity_mut;
    Health(Health) => as_health, as_health_mut;
    Owner(Owner) => as_owner, as_owner_mut;
    Chase(Chase) => as_chase, as_chase_mut;
    Decay(Decay) => as_decay, as_decay_mut;
    Attack(Attack) => as_attack, as_attack_mut;
    ContactDamage(ContactDamage) => as_contact_damage, as_contact_damage_mut;
    EnemyFinder(EnemyFinder) => as_enemy_finder, as_enemy_finder_mut;
    Gatherer(Gatherer) => as_gatherer, as_gatherer_mut;
    ResourceNode(ResourceNode) => as_resource_node, as_resource_node_mut;
    Depot(Depot) => as_depot, as_depot_mut;
    Production(Production) => as_production, as_production_mut;
    Construction(Construction) => as_construction, as_construction_mut;
    Collider(Collider) => as_collider, as_collider_mut;
    Sprite(Sprite) => as_sprite, as_sprite_mut;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_variant() {
        let c: Component = Position::at(Vec2::new(1.0, 2.0)).into();
        assert_eq!(c.kind(), ComponentKind::Position);
        assert!(c.as_position().is_some());
        assert!(c.as_health().is_none());
    }

    #[test]
    fn test_serde_tagging() {
        let c: Component = Health::full(75.0).into();
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["kind"], "health");
        assert_eq!(json["hp"], 75.0);

        let back: Component = serde_json::from_value(json).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn test_marker_component_roundtrip() {
        let c: Component = Depot::default().into();
        let json = serde_json::to_string(&c).unwrap();
        let back: Component = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind(), ComponentKind::Depot);
    }

    #[test]
    fn test_collider_overlap() {
        let a = Collider {
            width: 10.0,
            height: 10.0,
            fixed: false,
        };
        let b = Collider {
            width: 4.0,
            height: 4.0,
            fixed: true,
        };
        assert!(a.overlaps(Vec2::ZERO, &b, Vec2::new(6.0, 0.0)));
        assert!(!a.overlaps(Vec2::ZERO, &b, Vec2::new(8.0, 0.0)));
    }

    #[test]
    fn test_chase_goal_entity_is_id_only() {
        let c = Chase {
            goal: Some(ChaseGoal::Entity("e4".to_string())),
            speed: 2.0,
            turn_speed: 10.0,
            arrive_distance: 5.0,
        };
        let json = serde_json::to_string(&Component::from(c.clone())).unwrap();
        let back: Component = serde_json::from_str(&json).unwrap();
        assert_eq!(back.as_chase(), Some(&c));
    }
}
