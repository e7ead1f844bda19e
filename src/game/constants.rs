//! Gameplay tuning constants, grouped by concern.

/// Simulation timing
pub mod sim {
    /// Authoritative ticks per second.
    pub const TICK_RATE: u32 = 30;
    /// Tick duration in milliseconds
    pub const TICK_DURATION_MS: u64 = 1000 / TICK_RATE as u64;
}

/// Unit movement
pub mod movement {
    /// Default movement speed, world units per tick.
    pub const UNIT_SPEED: f32 = 2.0;
    /// Default turn rate, degrees per tick.
    pub const TURN_SPEED: f32 = 10.0;
    /// A chase goal counts as reached inside this distance.
    pub const ARRIVE_DISTANCE: f32 = 5.0;
}

/// Combat tuning
pub mod combat {
    /// Enemy scan radius for aggressive units.
    pub const AGGRO_RADIUS: f32 = 180.0;
    /// Ticks between nearest-enemy scans; keeps the full scan rate-limited.
    pub const SCAN_COOLDOWN: u32 = 15;
    /// A unit can strike or harvest within this range of its target.
    pub const REACH: f32 = 8.0;
    /// Projectile flight speed, world units per tick.
    pub const PROJECTILE_SPEED: f32 = 6.0;
    /// Projectile lifetime in ticks.
    pub const PROJECTILE_LIFETIME: u32 = 90;
}

/// Resource gathering
pub mod gather {
    /// Worker carry capacity.
    pub const CAPACITY: f32 = 50.0;
    /// Units extracted per tick at a node.
    pub const RATE: f32 = 5.0;
}

/// Collision resolution
pub mod collision {
    /// Push step applied per tick while overlapping a fixed collider.
    pub const PUSH_STEP: f32 = 3.0;
    /// Units inside this arc of a fixed collider's facing get deflected
    /// sideways instead of pushed straight back head-on.
    pub const FACING_TOLERANCE_DEG: f32 = 30.0;
}

/// World layout
pub mod world {
    /// Offset below a producer where new units appear.
    pub const SPAWN_OFFSET: f32 = 40.0;
    /// Random jitter applied to spawn positions.
    pub const SPAWN_JITTER: f32 = 12.0;
    /// Resource nodes scattered per kind at level setup.
    pub const NODES_PER_KIND: usize = 6;
    /// Margin kept free of scatter along world edges.
    pub const EDGE_MARGIN: f32 = 60.0;
}
