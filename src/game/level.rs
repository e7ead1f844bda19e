//! World setup and match-level bookkeeping: building the ECS, seating
//! players, and calling the match outcome.

use rand::Rng;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::ecs::{ComponentBundle, ConfigError, Ecs, EntityId, WorldVar};
use crate::game::actions::Actions;
use crate::game::catalog::UnitCatalog;
use crate::game::components::{Component, ComponentKind};
use crate::game::constants::world;
use crate::game::player::{PlayerRegistry, PlayerState, TeamId};
use crate::game::systems;
use crate::net::protocol::{ConnId, ServerCommand};
use crate::util::vec2::Vec2;

/// Assemble the authoritative world: stores, variables, hooks, schedule.
pub fn build_world(config: &ServerConfig, actions: Actions) -> Result<Ecs, ConfigError> {
    let mut ecs = Ecs::new();
    ecs.init_all_components();

    let players = PlayerRegistry::new(config.starting_wallet(), config.max_players);
    ecs.add_variable(WorldVar::Players(players))?;
    ecs.add_variable(WorldVar::Actions(actions.clone()))?;
    ecs.add_variable(WorldVar::Catalog(UnitCatalog::standard()))?;

    // Entity lifecycle mirrors to every client through the hooks; CREATE is
    // the only way an entity appears remotely, DEAD the only way it leaves.
    let on_create = actions.clone();
    ecs.set_create_hook(Box::new(move |id, components| {
        on_create.broadcast(ServerCommand::Create {
            id: id.clone(),
            components: components.iter().cloned().collect(),
        });
    }));
    let on_remove = actions;
    ecs.set_remove_hook(Box::new(move |id| {
        on_remove.broadcast(ServerCommand::Dead { id: id.clone() });
    }));

    for system in systems::schedule() {
        ecs.init_system(system)?;
    }
    Ok(ecs)
}

/// Scatter neutral resource nodes across the map, away from the edges.
pub fn scatter_resources(ecs: &mut Ecs, config: &ServerConfig) {
    let mut rng = rand::thread_rng();
    for kind in ["tree", "gold_mine", "boar"] {
        for _ in 0..world::NODES_PER_KIND {
            let pos = Vec2::new(
                rng.gen_range(world::EDGE_MARGIN..config.world_width - world::EDGE_MARGIN),
                rng.gen_range(world::EDGE_MARGIN..config.world_height - world::EDGE_MARGIN),
            );
            spawn(ecs, kind, None, pos);
        }
    }
}

/// Seat a new connection: snapshot the world to it, found its base, and
/// announce the updated roster. Returns None when the match is full.
pub fn join(ecs: &mut Ecs, config: &ServerConfig, conn: ConnId) -> Option<TeamId> {
    let team = ecs.with_vars(|_, vars| vars.players_mut().and_then(|p| p.join(conn)))?;
    info!("connection {conn} joined as team {team}");

    // Existing world first, so the client can resolve every id that later
    // messages reference.
    for id in ecs.entities_with(&[]) {
        let snapshot = ecs.snapshot(&id);
        send(ecs, conn, ServerCommand::Create { id, components: snapshot });
    }

    let base = base_position(config, team);
    spawn(ecs, "fortress", Some(team), base);
    spawn(ecs, "worker", Some(team), base + Vec2::new(-world::SPAWN_OFFSET, world::SPAWN_OFFSET));
    spawn(ecs, "worker", Some(team), base + Vec2::new(world::SPAWN_OFFSET, world::SPAWN_OFFSET));

    ecs.with_vars(|_, vars| {
        let Some(players) = vars.players() else {
            return;
        };
        let roster = players.roster();
        if let Some(actions) = vars.actions() {
            actions.send(
                conn,
                ServerCommand::Start {
                    team,
                    players: roster.clone(),
                },
            );
            actions.broadcast(ServerCommand::Players { players: roster });
        }
    });
    Some(team)
}

/// A dropped connection forfeits: the seat becomes a spectator slot and the
/// roster change is announced.
pub fn handle_disconnect(ecs: &mut Ecs, conn: ConnId) {
    ecs.with_vars(|_, vars| {
        let Some(team) = vars.players_mut().and_then(|p| p.disconnect(conn)) else {
            return;
        };
        info!("team {team} disconnected");
        let Some(players) = vars.players() else {
            return;
        };
        let roster = players.roster();
        if let Some(actions) = vars.actions() {
            actions.broadcast(ServerCommand::Disconnect { team });
            actions.broadcast(ServerCommand::Players { players: roster });
        }
    });
}

/// Defeat any battling team without a fortress; once one team stands alone,
/// crown it. Only meaningful after a second player has ever joined.
pub fn check_outcome(ecs: &mut Ecs) {
    let standing: Vec<TeamId> = ecs
        .entities_with(&[ComponentKind::Depot, ComponentKind::Owner])
        .iter()
        .filter_map(|id| {
            ecs.get(id, ComponentKind::Owner)
                .and_then(Component::as_owner)
                .map(|o| o.team)
        })
        .collect();

    ecs.with_vars(|_, vars| {
        // Resolve state changes first; the mutable registry borrow must end
        // before anything is queued for sending.
        let mut defeated: Vec<Option<ConnId>> = Vec::new();
        let mut crowned: Option<Option<ConnId>> = None;
        let roster = {
            let Some(players) = vars.players_mut() else {
                return;
            };
            if players.count() < 2 {
                return;
            }
            for team in players.battling() {
                if standing.contains(&team) {
                    continue;
                }
                debug!("team {team} lost its fortress");
                players.set_state(team, PlayerState::Defeated);
                defeated.push(players.conn_for_team(team));
            }
            let battling = players.battling();
            if battling.len() == 1 {
                let winner = battling[0];
                players.set_state(winner, PlayerState::Winner);
                info!("team {winner} wins the match");
                crowned = Some(players.conn_for_team(winner));
            }
            if defeated.is_empty() && crowned.is_none() {
                return;
            }
            players.roster()
        };

        let Some(actions) = vars.actions() else {
            return;
        };
        for conn in defeated.into_iter().flatten() {
            actions.send(conn, ServerCommand::Defeat);
        }
        if let Some(Some(conn)) = crowned {
            actions.send(conn, ServerCommand::Victory);
        }
        actions.broadcast(ServerCommand::Players { players: roster });
    });
}

/// Base positions ring the map center, one slot per seat.
fn base_position(config: &ServerConfig, team: TeamId) -> Vec2 {
    let center = Vec2::new(config.world_width / 2.0, config.world_height / 2.0);
    let radius = (config.world_width.min(config.world_height) / 2.0) - world::EDGE_MARGIN * 2.0;
    let angle = 360.0 * team as f32 / config.max_players as f32;
    center + Vec2::from_heading(angle) * radius
}

fn spawn(ecs: &mut Ecs, unit: &str, team: Option<TeamId>, pos: Vec2) -> Option<EntityId> {
    let bundle: Option<ComponentBundle> =
        ecs.with_vars(|_, vars| vars.catalog().and_then(|c| c.spawn(unit, team, pos)));
    let Some(bundle) = bundle else {
        warn!("cannot spawn unknown unit {unit:?}");
        return None;
    };
    match ecs.create_entity(bundle) {
        Ok(id) => Some(id),
        Err(e) => {
            warn!("failed to spawn {unit}: {e}");
            None
        }
    }
}

fn send(ecs: &mut Ecs, conn: ConnId, cmd: ServerCommand) {
    ecs.with_vars(|_, vars| {
        if let Some(actions) = vars.actions() {
            actions.send(conn, cmd);
        }
    });
}
