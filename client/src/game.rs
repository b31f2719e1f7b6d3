//! Local simulation of the player's tank and its shots.

use log::{debug, warn};
use shared::protocol::Team;
use shared::{
    allocate_slot, EntityRef, GameTime, GameVars, Obstacle, ObstacleGrid, PlayerId, Shot,
    ShotSlot, ShotTable, Sprite, Tank, Vector2,
};

/// Distance from the tank centre to the muzzle.
const MUZZLE_OFFSET: f32 = 4.0;

const WALL_THICKNESS: f32 = 2.0;

pub struct ClientGame {
    tank: Tank,
    shots: ShotTable,
    arena: ObstacleGrid,
    vars: GameVars,
}

impl ClientGame {
    pub fn new(player: PlayerId, team: Team, arena: ObstacleGrid, vars: GameVars) -> Self {
        Self {
            tank: Tank::new(player, team, Vector2::ZERO, 0.0),
            shots: ShotTable::new(),
            arena,
            vars,
        }
    }

    /// A square arena of side `size` centred on the origin, bounded by four walls.
    pub fn walled_arena(size: f32) -> ObstacleGrid {
        let half = size / 2.0;
        let offset = half + WALL_THICKNESS / 2.0;
        let span = size + WALL_THICKNESS * 2.0;

        ObstacleGrid::from_obstacles(
            ObstacleGrid::DEFAULT_CELL_SIZE,
            [
                Obstacle::new(Vector2::new(0.0, -offset), Vector2::new(span, WALL_THICKNESS), 0.0),
                Obstacle::new(Vector2::new(0.0, offset), Vector2::new(span, WALL_THICKNESS), 0.0),
                Obstacle::new(Vector2::new(-offset, 0.0), Vector2::new(WALL_THICKNESS, span), 0.0),
                Obstacle::new(Vector2::new(offset, 0.0), Vector2::new(WALL_THICKNESS, span), 0.0),
            ],
        )
    }

    pub fn tank(&self) -> &Tank {
        &self.tank
    }

    pub fn tank_mut(&mut self) -> &mut Tank {
        &mut self.tank
    }

    pub fn shots(&self) -> &ShotTable {
        &self.shots
    }

    pub fn arena(&self) -> &ObstacleGrid {
        &self.arena
    }

    /// Fires from the tank's muzzle. `ShotSlot::Dummy` means every slot is
    /// still reloading and no shot was created.
    pub fn fire(&mut self) -> ShotSlot {
        let slot = allocate_slot(&self.shots);
        match slot {
            ShotSlot::Slot(index) => {
                let forward = Vector2::from_angle(self.tank.rotation - std::f32::consts::FRAC_PI_2);
                let muzzle = self.tank.position + forward * MUZZLE_OFFSET;
                let shot = Shot::new(
                    index,
                    self.tank.owner,
                    muzzle,
                    self.tank.rotation,
                    self.tank.velocity,
                    &self.vars,
                );
                if let Err(e) = self.shots.insert(shot) {
                    warn!("fire failed: {}", e);
                    return ShotSlot::Dummy;
                }
                debug!("fired shot {}", index);
            }
            ShotSlot::Dummy => debug!("fire denied, all shots reloading"),
        }
        slot
    }

    /// Runs one simulation tick and frees the slots of finished shots.
    pub fn update(&mut self, time: &GameTime) -> Vec<u8> {
        self.tank.position += self.tank.velocity * time.elapsed.as_secs_f32();

        for shot in self.shots.iter_mut() {
            shot.update(time, &self.arena);
        }
        self.shots.reclaim()
    }

    /// Draw data for the frame: arena walls, the tank, then every visible shot.
    pub fn sprites(&self) -> Vec<Sprite> {
        let team = self.tank.team;

        self.arena
            .obstacles()
            .iter()
            .map(EntityRef::Box)
            .chain(std::iter::once(EntityRef::Tank(&self.tank)))
            .chain(self.shots.iter().map(|shot| EntityRef::Shot(shot, team)))
            .filter_map(|entity| entity.sprite())
            .collect()
    }
}
