use std::net::{IpAddr, Ipv4Addr};

use crate::game::constants::sim;
use crate::game::player::Wallet;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub bind_address: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Simulation ticks per second
    pub tick_rate: u32,
    /// World width in world units
    pub world_width: f32,
    /// World height in world units
    pub world_height: f32,
    /// Maximum concurrent players
    pub max_players: usize,
    /// Starting money per player
    pub starting_money: f32,
    /// Starting wood per player
    pub starting_wood: f32,
    /// Starting meat per player
    pub starting_meat: f32,
    /// Meat storage cap per player
    pub meat_capacity: f32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 4433,
            tick_rate: sim::TICK_RATE,
            world_width: 2000.0,
            world_height: 2000.0,
            max_players: 6,
            starting_money: 150.0,
            starting_wood: 100.0,
            starting_meat: 40.0,
            meat_capacity: 200.0,
        }
    }
}

impl ServerConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("BIND_ADDRESS") {
            if let Ok(parsed) = addr.parse() {
                config.bind_address = parsed;
            } else {
                tracing::warn!("Invalid BIND_ADDRESS '{}', using default", addr);
            }
        }

        if let Ok(port) = std::env::var("PORT") {
            if let Ok(parsed) = port.parse::<u16>() {
                if parsed > 0 {
                    config.port = parsed;
                } else {
                    tracing::warn!("PORT must be > 0, using default");
                }
            } else {
                tracing::warn!("Invalid PORT '{}', using default", port);
            }
        }

        if let Ok(rate) = std::env::var("TICK_RATE") {
            if let Ok(parsed) = rate.parse::<u32>() {
                if (1..=120).contains(&parsed) {
                    config.tick_rate = parsed;
                } else {
                    tracing::warn!("TICK_RATE must be 1-120, using default");
                }
            } else {
                tracing::warn!("Invalid TICK_RATE '{}', using default", rate);
            }
        }

        if let Ok(max_players) = std::env::var("MAX_PLAYERS") {
            if let Ok(parsed) = max_players.parse::<usize>() {
                if (1..=16).contains(&parsed) {
                    config.max_players = parsed;
                } else {
                    tracing::warn!("MAX_PLAYERS must be 1-16, using default");
                }
            } else {
                tracing::warn!("Invalid MAX_PLAYERS '{}', using default", max_players);
            }
        }

        if let Ok(size) = std::env::var("WORLD_SIZE") {
            if let Ok(parsed) = size.parse::<f32>() {
                if parsed >= 500.0 {
                    config.world_width = parsed;
                    config.world_height = parsed;
                } else {
                    tracing::warn!("WORLD_SIZE must be >= 500, using default");
                }
            } else {
                tracing::warn!("Invalid WORLD_SIZE '{}', using default", size);
            }
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("Port cannot be 0".to_string());
        }
        if self.tick_rate == 0 {
            return Err("tick_rate must be at least 1".to_string());
        }
        if self.max_players == 0 {
            return Err("max_players must be at least 1".to_string());
        }
        if self.world_width < 500.0 || self.world_height < 500.0 {
            return Err("world must be at least 500x500".to_string());
        }
        if self.meat_capacity < self.starting_meat {
            return Err("meat_capacity cannot be below starting_meat".to_string());
        }
        Ok(())
    }

    /// Wallet handed to every player on join.
    pub fn starting_wallet(&self) -> Wallet {
        Wallet {
            money: self.starting_money,
            wood: self.starting_wood,
            meat: self.starting_meat,
            meat_capacity: self.meat_capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 4433);
        assert_eq!(config.tick_rate, sim::TICK_RATE);
        assert_eq!(config.max_players, 6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_starting_wallet() {
        let config = ServerConfig::default();
        let wallet = config.starting_wallet();
        assert_eq!(wallet.money, config.starting_money);
        assert!(wallet.meat <= wallet.meat_capacity);
    }

    #[test]
    fn test_validate_rejects_bad_world() {
        let config = ServerConfig {
            world_width: 100.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
