//! Server action layer: the outbound sender systems inject, and the handler
//! that turns inbound client commands into ECS mutations.
//!
//! Gameplay rejections (insufficient resources, blocked ground, acting on a
//! foreign or dead entity) never mutate state; the issuer gets a popup
//! notice and the reason is logged.

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::ecs::{Ecs, WorldVars};
use crate::game::components::{ChaseGoal, Collider, Component, ComponentKind};
use crate::net::protocol::{ClientCommand, ConnId, Outgoing, Recipient, ServerCommand};
use crate::util::vec2::Vec2;

/// Clonable handle onto the outbound queue. Messages are staged here and
/// drained by the writer task; the simulation never blocks on the network.
#[derive(Clone)]
pub struct Actions {
    tx: mpsc::UnboundedSender<Outgoing>,
}

impl Actions {
    pub fn new(tx: mpsc::UnboundedSender<Outgoing>) -> Self {
        Self { tx }
    }

    /// Sender plus a capture side, for tests and headless sessions.
    pub fn capture() -> (Self, mpsc::UnboundedReceiver<Outgoing>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn broadcast(&self, cmd: ServerCommand) {
        self.queue(Recipient::All, cmd);
    }

    pub fn send(&self, conn: ConnId, cmd: ServerCommand) {
        self.queue(Recipient::One(conn), cmd);
    }

    fn queue(&self, to: Recipient, cmd: ServerCommand) {
        if self.tx.send(Outgoing { to, cmd }).is_err() {
            debug!("outbound queue closed, dropping message");
        }
    }
}

/// Apply one inbound client command to the world.
pub fn handle_command(ecs: &mut Ecs, conn: ConnId, cmd: ClientCommand) {
    ecs.with_vars(|ecs, vars| {
        let Some(team) = vars.players().and_then(|p| p.team_for_conn(conn)) else {
            warn!("command from unregistered connection {conn}");
            return;
        };
        match cmd {
            ClientCommand::Nick { name } => set_nick(vars, conn, team, name),
            ClientCommand::PlaceUnit { building, pos } => {
                place_unit(ecs, vars, conn, team, &building, pos)
            }
            ClientCommand::SetTargetMove { ids, pos } => {
                set_target_move(ecs, vars, team, &ids, pos)
            }
            ClientCommand::ProduceUnit { producer, unit } => {
                produce_unit(ecs, vars, conn, team, &producer, &unit)
            }
        }
    });
}

fn set_nick(vars: &mut WorldVars, _conn: ConnId, team: u8, name: String) {
    let Some(players) = vars.players_mut() else {
        return;
    };
    if let Some(player) = players.get_mut(team) {
        debug!("team {team} is now known as {name:?}");
        player.nick = name;
    }
    let roster = players.roster();
    if let Some(actions) = vars.actions() {
        actions.broadcast(ServerCommand::Players { players: roster });
    }
}

fn place_unit(
    ecs: &mut Ecs,
    vars: &mut WorldVars,
    conn: ConnId,
    team: u8,
    building: &str,
    pos: Vec2,
) {
    let Some(catalog) = vars.catalog() else {
        return;
    };
    let spec = match catalog.get(building) {
        Some(spec) if spec.placeable => spec,
        _ => {
            warn!("team {team} tried to place unknown building {building:?}");
            return;
        }
    };
    let cost = spec.cost;

    if ground_blocked(ecs, pos) {
        debug!("placement of {building} at {pos:?} rejected: blocked");
        reject(vars, conn, team, pos, "ground is blocked");
        return;
    }

    let charged = vars
        .players_mut()
        .and_then(|p| p.get_mut(team))
        .is_some_and(|player| player.wallet.charge(&cost));
    if !charged {
        debug!("placement of {building} by team {team} rejected: cannot afford");
        reject(vars, conn, team, pos, "not enough resources");
        return;
    }
    send_wallet(vars, conn, team);

    let Some(catalog) = vars.catalog() else {
        return;
    };
    if let Some(site) = catalog.construction_site(building, team, pos) {
        if let Err(e) = ecs.create_entity(site) {
            warn!("failed to create construction site: {e}");
        }
    }
}

/// True when a fixed-collider footprint at `pos` would overlap anything.
fn ground_blocked(ecs: &Ecs, pos: Vec2) -> bool {
    let site = Collider {
        width: 40.0,
        height: 40.0,
        fixed: true,
    };
    ecs.entities_with(&[ComponentKind::Position, ComponentKind::Collider])
        .iter()
        .any(|other| {
            let Some((p, c)) = ecs.get_pair(other, ComponentKind::Position, ComponentKind::Collider)
            else {
                return false;
            };
            match (p.as_position(), c.as_collider()) {
                (Some(p), Some(c)) => site.overlaps(pos, c, p.pos),
                _ => false,
            }
        })
}

fn set_target_move(ecs: &mut Ecs, vars: &mut WorldVars, team: u8, ids: &[String], pos: Vec2) {
    for id in ids {
        if !ecs.is_alive(id) {
            debug!("move order for dead entity {id}");
            continue;
        }
        let owned = ecs
            .get(id, ComponentKind::Owner)
            .and_then(Component::as_owner)
            .is_some_and(|o| o.team == team);
        if !owned {
            debug!("team {team} tried to move foreign entity {id}");
            continue;
        }
        let Some(chase) = ecs
            .get_mut(id, ComponentKind::Chase)
            .and_then(Component::as_chase_mut)
        else {
            continue;
        };
        let goal = Some(ChaseGoal::Point(pos));
        chase.goal = goal.clone();
        if let Some(actions) = vars.actions() {
            actions.broadcast(ServerCommand::TargetChange {
                id: id.clone(),
                goal,
            });
        }
    }
}

fn produce_unit(
    ecs: &mut Ecs,
    vars: &mut WorldVars,
    conn: ConnId,
    team: u8,
    producer: &String,
    unit: &str,
) {
    let producer_pos = ecs
        .get(producer, ComponentKind::Position)
        .and_then(Component::as_position)
        .map(|p| p.pos);
    let Some(pos) = producer_pos else {
        debug!("produce order on unknown entity {producer}");
        return;
    };
    let owned = ecs
        .get(producer, ComponentKind::Owner)
        .and_then(Component::as_owner)
        .is_some_and(|o| o.team == team);
    if !owned || ecs.get(producer, ComponentKind::Production).is_none() {
        debug!("team {team} cannot produce at {producer}");
        return;
    }

    let cost = match vars.catalog().and_then(|c| c.get(unit)) {
        Some(spec) if !spec.placeable => spec.cost,
        _ => {
            warn!("team {team} requested unknown unit {unit:?}");
            return;
        }
    };
    let charged = vars
        .players_mut()
        .and_then(|p| p.get_mut(team))
        .is_some_and(|player| player.wallet.charge(&cost));
    if !charged {
        debug!("production of {unit} by team {team} rejected: cannot afford");
        reject(vars, conn, team, pos, "not enough resources");
        return;
    }
    send_wallet(vars, conn, team);

    if let Some(production) = ecs
        .get_mut(producer, ComponentKind::Production)
        .and_then(Component::as_production_mut)
    {
        production.queue.push_back(unit.to_string());
    }
}

fn reject(vars: &WorldVars, conn: ConnId, team: u8, pos: Vec2, text: &str) {
    let color = vars
        .players()
        .and_then(|p| p.get(team))
        .map(|p| p.color)
        .unwrap_or([255, 255, 255]);
    if let Some(actions) = vars.actions() {
        actions.send(
            conn,
            ServerCommand::Popup {
                text: text.to_string(),
                pos,
                color,
            },
        );
    }
}

fn send_wallet(vars: &WorldVars, conn: ConnId, team: u8) {
    let Some(wallet) = vars.players().and_then(|p| p.get(team)).map(|p| p.wallet) else {
        return;
    };
    if let Some(actions) = vars.actions() {
        actions.send(conn, ServerCommand::ResourceInfo { team, wallet });
    }
}
