//! Client-side world mirror.
//!
//! The client keeps its own ECS, reconstructed purely from server messages:
//! CREATE is the only way an entity appears, DEAD the only way one leaves.
//! Between authoritative updates the mirror runs the movement systems
//! locally, so entities keep gliding instead of teleporting tick to tick.

use tokio::sync::mpsc;
use tracing::debug;

use crate::ecs::{ConfigError, Ecs, EntityId};
use crate::game::components::{Component, ComponentKind};
use crate::game::player::{PlayerInfo, PlayerState, TeamId, Wallet};
use crate::game::systems::movement;
use crate::net::protocol::{ClientCommand, ServerCommand};
use crate::util::vec2::Vec2;

/// How the match ended, from this client's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Victory,
    Defeat,
}

/// A sound cue to play, optionally positioned in the world.
#[derive(Debug, Clone, PartialEq)]
pub struct SoundCue {
    pub name: String,
    pub pos: Option<Vec2>,
}

/// A popup notice to display.
#[derive(Debug, Clone, PartialEq)]
pub struct PopupNotice {
    pub text: String,
    pub pos: Vec2,
    pub color: [u8; 3],
}

pub struct ClientWorld {
    ecs: Ecs,
    team: Option<TeamId>,
    roster: Vec<PlayerInfo>,
    wallet: Option<Wallet>,
    outcome: Option<Outcome>,
    sounds: Vec<SoundCue>,
    popups: Vec<PopupNotice>,
}

impl ClientWorld {
    pub fn new() -> Result<Self, ConfigError> {
        let mut ecs = Ecs::new();
        ecs.init_all_components();
        // Prediction only: everything else is applied from server messages.
        ecs.init_system(movement::VELOCITY)?;
        ecs.init_system(movement::CHASE)?;
        Ok(Self {
            ecs,
            team: None,
            roster: Vec::new(),
            wallet: None,
            outcome: None,
            sounds: Vec::new(),
            popups: Vec::new(),
        })
    }

    /// Apply one authoritative message.
    pub fn apply(&mut self, cmd: ServerCommand) {
        match cmd {
            ServerCommand::Create { id, components } => {
                // A broadcast create can race the join snapshot and arrive
                // twice; the first copy wins, later UPDATEs reconcile.
                if let Err(e) = self.ecs.create_entity_with_id(id, components) {
                    debug!("duplicate create ignored: {e}");
                }
            }
            ServerCommand::Update { id, position } => {
                if !self.ecs.put(&id, position.into()) {
                    debug!("position update for unknown entity {id}");
                }
            }
            ServerCommand::ComponentInfo { id, component } => {
                if !self.ecs.put(&id, component) {
                    debug!("component update for unknown entity {id}");
                }
            }
            ServerCommand::TargetChange { id, goal } => {
                if let Some(chase) = self
                    .ecs
                    .get_mut(&id, ComponentKind::Chase)
                    .and_then(Component::as_chase_mut)
                {
                    chase.goal = goal;
                }
            }
            ServerCommand::Dead { id } => self.ecs.remove_entity(&id),
            ServerCommand::ResourceInfo { team, wallet } => {
                if self.team == Some(team) {
                    self.wallet = Some(wallet);
                }
            }
            ServerCommand::Start { team, players } => {
                self.team = Some(team);
                self.roster = players;
            }
            ServerCommand::Players { players } => self.roster = players,
            ServerCommand::Disconnect { team } => {
                if let Some(entry) = self.roster.iter_mut().find(|p| p.team == team) {
                    entry.state = PlayerState::Defeated;
                }
            }
            ServerCommand::Defeat => self.outcome = Some(Outcome::Defeat),
            ServerCommand::Victory => self.outcome = Some(Outcome::Victory),
            ServerCommand::Sound { name, pos } => self.sounds.push(SoundCue { name, pos }),
            ServerCommand::Popup { text, pos, color } => {
                self.popups.push(PopupNotice { text, pos, color })
            }
        }
    }

    /// Advance local prediction one frame.
    pub fn tick(&mut self) {
        self.ecs.update();
    }

    pub fn ecs(&self) -> &Ecs {
        &self.ecs
    }

    pub fn team(&self) -> Option<TeamId> {
        self.team
    }

    pub fn roster(&self) -> &[PlayerInfo] {
        &self.roster
    }

    pub fn wallet(&self) -> Option<Wallet> {
        self.wallet
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    pub fn drain_sounds(&mut self) -> Vec<SoundCue> {
        std::mem::take(&mut self.sounds)
    }

    pub fn drain_popups(&mut self) -> Vec<PopupNotice> {
        std::mem::take(&mut self.popups)
    }
}

/// Builds outbound commands and hands them to the transport writer.
#[derive(Clone)]
pub struct ClientActions {
    tx: mpsc::UnboundedSender<ClientCommand>,
}

impl ClientActions {
    pub fn new(tx: mpsc::UnboundedSender<ClientCommand>) -> Self {
        Self { tx }
    }

    pub fn nick(&self, name: impl Into<String>) {
        self.send(ClientCommand::Nick { name: name.into() });
    }

    pub fn place_unit(&self, building: impl Into<String>, pos: Vec2) {
        self.send(ClientCommand::PlaceUnit {
            building: building.into(),
            pos,
        });
    }

    pub fn set_target_move(&self, ids: Vec<EntityId>, pos: Vec2) {
        self.send(ClientCommand::SetTargetMove { ids, pos });
    }

    pub fn produce_unit(&self, producer: EntityId, unit: impl Into<String>) {
        self.send(ClientCommand::ProduceUnit {
            producer,
            unit: unit.into(),
        });
    }

    fn send(&self, cmd: ClientCommand) {
        if self.tx.send(cmd).is_err() {
            debug!("connection closed, command dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::game::actions::Actions;
    use crate::game::components::Position;
    use crate::game::level;
    use crate::net::protocol::{ConnId, Recipient};

    /// Drive a real server world and feed everything addressed to one
    /// connection into a mirror, the way the wire would.
    fn mirrored_join(conn: ConnId) -> (Ecs, ClientWorld) {
        let (actions, mut rx) = Actions::capture();
        let config = ServerConfig::default();
        let mut server = level::build_world(&config, actions).unwrap();
        level::join(&mut server, &config, conn).unwrap();

        let mut client = ClientWorld::new().unwrap();
        while let Ok(msg) = rx.try_recv() {
            match msg.to {
                Recipient::All => client.apply(msg.cmd),
                Recipient::One(c) if c == conn => client.apply(msg.cmd),
                Recipient::One(_) => {}
            }
        }
        (server, client)
    }

    #[test]
    fn test_create_snapshots_reconstruct_the_world() {
        let (server, client) = mirrored_join(9);

        let server_ids = server.entities_with(&[]);
        assert_eq!(server_ids.len(), 3);
        for id in server_ids {
            assert!(client.ecs().is_alive(&id));
            let server_pos = server
                .get(&id, ComponentKind::Position)
                .and_then(Component::as_position)
                .copied();
            let client_pos = client
                .ecs()
                .get(&id, ComponentKind::Position)
                .and_then(Component::as_position)
                .copied();
            assert_eq!(server_pos, client_pos);
        }
        assert_eq!(client.team(), Some(0));
        assert_eq!(client.roster().len(), 1);
    }

    #[test]
    fn test_duplicate_create_keeps_first_copy() {
        let (server, mut client) = mirrored_join(9);
        let id = server.entities_with(&[ComponentKind::Gatherer])[0].clone();
        let original = client
            .ecs()
            .get(&id, ComponentKind::Position)
            .and_then(Component::as_position)
            .copied();

        // A broadcast create racing the snapshot replays the same entity
        // at a different position; the mirror must keep the first copy.
        let mut replay = server.snapshot(&id);
        for c in replay.iter_mut() {
            if let Component::Position(p) = c {
                p.pos = Vec2::new(999.0, 999.0);
            }
        }
        client.apply(ServerCommand::Create {
            id: id.clone(),
            components: replay,
        });

        assert!(client.ecs().is_alive(&id));
        let mirrored = client
            .ecs()
            .get(&id, ComponentKind::Position)
            .and_then(Component::as_position)
            .copied();
        assert_eq!(mirrored, original);
    }

    #[test]
    fn test_dead_is_the_only_removal_path() {
        let (server, mut client) = mirrored_join(9);
        let id = server.entities_with(&[ComponentKind::Gatherer])[0].clone();

        client.apply(ServerCommand::Dead { id: id.clone() });
        assert!(!client.ecs().is_alive(&id));

        // A second DEAD for the same id is a no-op.
        client.apply(ServerCommand::Dead { id });
    }

    #[test]
    fn test_updates_overwrite_position() {
        let (server, mut client) = mirrored_join(9);
        let id = server.entities_with(&[ComponentKind::Gatherer])[0].clone();

        let moved = Position {
            pos: Vec2::new(77.0, 11.0),
            heading: 45.0,
        };
        client.apply(ServerCommand::Update {
            id: id.clone(),
            position: moved,
        });

        let mirrored = client
            .ecs()
            .get(&id, ComponentKind::Position)
            .and_then(Component::as_position)
            .copied();
        assert_eq!(mirrored, Some(moved));
    }

    #[test]
    fn test_wallet_ignores_other_teams() {
        let (_server, mut client) = mirrored_join(9);
        let wallet = Wallet {
            money: 5.0,
            wood: 5.0,
            meat: 5.0,
            meat_capacity: 100.0,
        };

        client.apply(ServerCommand::ResourceInfo { team: 3, wallet });
        assert!(client.wallet().is_none());

        client.apply(ServerCommand::ResourceInfo { team: 0, wallet });
        assert_eq!(client.wallet().map(|w| w.money), Some(5.0));
    }

    #[test]
    fn test_cues_are_drained() {
        let (_server, mut client) = mirrored_join(9);
        client.apply(ServerCommand::Sound {
            name: "strike".to_string(),
            pos: None,
        });
        client.apply(ServerCommand::Popup {
            text: "not enough resources".to_string(),
            pos: Vec2::ZERO,
            color: [255, 0, 0],
        });

        assert_eq!(client.drain_sounds().len(), 1);
        assert_eq!(client.drain_sounds().len(), 0);
        assert_eq!(client.drain_popups().len(), 1);
    }

    #[test]
    fn test_outcome_latches() {
        let (_server, mut client) = mirrored_join(9);
        assert_eq!(client.outcome(), None);
        client.apply(ServerCommand::Victory);
        assert_eq!(client.outcome(), Some(Outcome::Victory));
    }

    #[test]
    fn test_client_actions_build_commands() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let actions = ClientActions::new(tx);

        actions.nick("ada");
        actions.set_target_move(vec!["e4".to_string()], Vec2::new(50.0, 60.0));

        assert_eq!(
            rx.try_recv().unwrap(),
            ClientCommand::Nick {
                name: "ada".to_string()
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            ClientCommand::SetTargetMove {
                ids: vec!["e4".to_string()],
                pos: Vec2::new(50.0, 60.0),
            }
        );
    }
}
