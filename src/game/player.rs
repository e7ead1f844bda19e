//! Player records and the server-side registry.
//!
//! The server owns the authoritative registry; clients hold read-only
//! mirrored rosters received via START/PLAYERS messages.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::game::components::ResourceKind;
use crate::net::protocol::ConnId;

/// Team identifier, assigned at join time.
pub type TeamId = u8;

/// Display colors handed out in join order.
pub const TEAM_COLORS: &[[u8; 3]] = &[
    [220, 60, 60],
    [60, 110, 220],
    [60, 180, 80],
    [220, 180, 50],
    [170, 80, 200],
    [80, 190, 190],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerState {
    /// In the fight.
    Battling,
    /// Fortress lost; stays connected as a spectator.
    Defeated,
    Winner,
}

/// Resource wallet. Meat is capped by `meat_capacity`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub money: f32,
    pub wood: f32,
    pub meat: f32,
    pub meat_capacity: f32,
}

impl Wallet {
    pub fn deposit(&mut self, kind: ResourceKind, amount: f32) {
        match kind {
            ResourceKind::Money => self.money += amount,
            ResourceKind::Wood => self.wood += amount,
            ResourceKind::Meat => self.meat = (self.meat + amount).min(self.meat_capacity),
        }
    }

    pub fn can_afford(&self, cost: &Cost) -> bool {
        self.money >= cost.money && self.wood >= cost.wood && self.meat >= cost.meat
    }

    /// Deduct a cost. Returns false (and leaves the wallet untouched) when
    /// the player cannot afford it.
    pub fn charge(&mut self, cost: &Cost) -> bool {
        if !self.can_afford(cost) {
            return false;
        }
        self.money -= cost.money;
        self.wood -= cost.wood;
        self.meat -= cost.meat;
        true
    }
}

/// Price of a unit or building.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Cost {
    pub money: f32,
    pub wood: f32,
    pub meat: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub team: TeamId,
    pub color: [u8; 3],
    pub nick: String,
    pub wallet: Wallet,
    pub state: PlayerState,
}

/// Roster entry as mirrored to clients: visible attributes only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub team: TeamId,
    pub color: [u8; 3],
    pub nick: String,
    pub state: PlayerState,
}

impl From<&Player> for PlayerInfo {
    fn from(p: &Player) -> Self {
        Self {
            team: p.team,
            color: p.color,
            nick: p.nick.clone(),
            state: p.state,
        }
    }
}

/// Server-side player registry, keyed by team and by connection.
pub struct PlayerRegistry {
    players: HashMap<TeamId, Player>,
    by_conn: HashMap<ConnId, TeamId>,
    starting_wallet: Wallet,
    max_players: usize,
    next_team: TeamId,
}

impl PlayerRegistry {
    pub fn new(starting_wallet: Wallet, max_players: usize) -> Self {
        Self {
            players: HashMap::new(),
            by_conn: HashMap::new(),
            starting_wallet,
            max_players,
            next_team: 0,
        }
    }

    /// Register a newly connected player. Returns None when full.
    pub fn join(&mut self, conn: ConnId) -> Option<TeamId> {
        if self.players.len() >= self.max_players {
            return None;
        }
        let team = self.next_team;
        self.next_team += 1;
        let color = TEAM_COLORS[team as usize % TEAM_COLORS.len()];
        self.players.insert(
            team,
            Player {
                team,
                color,
                nick: format!("player-{team}"),
                wallet: self.starting_wallet,
                state: PlayerState::Battling,
            },
        );
        self.by_conn.insert(conn, team);
        Some(team)
    }

    pub fn team_for_conn(&self, conn: ConnId) -> Option<TeamId> {
        self.by_conn.get(&conn).copied()
    }

    pub fn conn_for_team(&self, team: TeamId) -> Option<ConnId> {
        self.by_conn
            .iter()
            .find(|(_, t)| **t == team)
            .map(|(c, _)| *c)
    }

    pub fn get(&self, team: TeamId) -> Option<&Player> {
        self.players.get(&team)
    }

    pub fn get_mut(&mut self, team: TeamId) -> Option<&mut Player> {
        self.players.get_mut(&team)
    }

    /// Drop the connection mapping; the player record stays for the roster.
    pub fn disconnect(&mut self, conn: ConnId) -> Option<TeamId> {
        let team = self.by_conn.remove(&conn)?;
        if let Some(player) = self.players.get_mut(&team) {
            player.state = PlayerState::Defeated;
        }
        Some(team)
    }

    pub fn set_state(&mut self, team: TeamId, state: PlayerState) {
        if let Some(player) = self.players.get_mut(&team) {
            player.state = state;
        }
    }

    pub fn battling(&self) -> Vec<TeamId> {
        let mut teams: Vec<TeamId> = self
            .players
            .values()
            .filter(|p| p.state == PlayerState::Battling)
            .map(|p| p.team)
            .collect();
        teams.sort_unstable();
        teams
    }

    pub fn count(&self) -> usize {
        self.players.len()
    }

    pub fn roster(&self) -> Vec<PlayerInfo> {
        let mut roster: Vec<PlayerInfo> = self.players.values().map(PlayerInfo::from).collect();
        roster.sort_unstable_by_key(|p| p.team);
        roster
    }
}
