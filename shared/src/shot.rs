//! Shot lifecycle: slot allocation, the per-tick state machine and its physics step.

use crate::collision::{find_nearest_collision, Obb, ObstacleGrid};
use crate::math::{Aabb, Vector2};
use crate::protocol::MAX_SHOTS;
use log::debug;
use serde::{Deserialize, Serialize};
use std::f32::consts::FRAC_PI_2;
use std::time::Duration;
use thiserror::Error;

/// Rendered and collided size of a shot, in world units.
pub const SHOT_SIZE: Vector2 = Vector2::new(2.0, 2.0);

/// Tunable game variables that shape shots.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GameVars {
    /// World units per second.
    pub shot_speed: f32,
    /// Distance after which a shot ends.
    pub shot_range: f32,
    /// Lifetime of a shot; also the reload time of its slot.
    pub reload_time: Duration,
}

impl Default for GameVars {
    fn default() -> Self {
        Self {
            shot_speed: 100.0,
            shot_range: 350.0,
            reload_time: Duration::from_millis(3500),
        }
    }
}

/// Clock handed to every update: total time since start and time since the previous tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GameTime {
    pub total: Duration,
    pub elapsed: Duration,
}

impl GameTime {
    pub fn new(total: Duration, elapsed: Duration) -> Self {
        Self { total, elapsed }
    }

    /// Advances the clock by `step`.
    pub fn advance(&self, step: Duration) -> GameTime {
        GameTime {
            total: self.total + step,
            elapsed: step,
        }
    }
}

/// Lookup key of the player owning a shot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShotState {
    /// Final state; the slot may be reused.
    None,
    /// Just created.
    Starting,
    /// Moving and collidable.
    Active,
    /// Hit something or ran out of range.
    Ending,
    /// Stopped, waiting out its reload time.
    Ended,
}

/// Slot identity of a shot within its owner's table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShotSlot {
    Slot(u8),
    /// No slot available; the fire request is denied.
    Dummy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ShotError {
    #[error("shot slot {0} is outside the table")]
    SlotOutOfRange(u8),
}

/// Creation-time data, fixed for the shot's whole life.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShotInfo {
    pub slot: u8,
    pub owner: PlayerId,
    pub initial_position: Vector2,
    /// Velocity of the firing tank; recorded, not added to the shot.
    pub initial_velocity: Vector2,
    pub rotation: f32,
    pub max_range: f32,
    pub max_ttl: Duration,
}

/// State that changes from tick to tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShotMotion {
    pub state: ShotState,
    pub position: Vector2,
    pub velocity: Vector2,
    /// Stamped on the first update.
    pub initial_time: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Shot {
    info: ShotInfo,
    motion: ShotMotion,
}

impl Shot {
    pub fn new(
        slot: u8,
        owner: PlayerId,
        position: Vector2,
        rotation: f32,
        initial_velocity: Vector2,
        vars: &GameVars,
    ) -> Self {
        // rotation 0 faces up
        let velocity = Vector2::from_angle(rotation - FRAC_PI_2) * vars.shot_speed;

        Self {
            info: ShotInfo {
                slot,
                owner,
                initial_position: position,
                initial_velocity,
                rotation,
                max_range: vars.shot_range,
                max_ttl: vars.reload_time,
            },
            motion: ShotMotion {
                state: ShotState::Starting,
                position,
                velocity,
                initial_time: None,
            },
        }
    }

    pub fn info(&self) -> &ShotInfo {
        &self.info
    }

    pub fn slot(&self) -> u8 {
        self.info.slot
    }

    pub fn owner(&self) -> PlayerId {
        self.info.owner
    }

    pub fn state(&self) -> ShotState {
        self.motion.state
    }

    pub fn position(&self) -> Vector2 {
        self.motion.position
    }

    pub fn velocity(&self) -> Vector2 {
        self.motion.velocity
    }

    pub fn initial_time(&self) -> Option<Duration> {
        self.motion.initial_time
    }

    pub fn shape(&self) -> Obb {
        Obb::new(self.motion.position, SHOT_SIZE, self.info.rotation)
    }

    /// Stops the shot and moves it to `Ending`. No effect once `Ended` or `None`.
    pub fn end(&mut self) {
        if matches!(self.motion.state, ShotState::Ended | ShotState::None) {
            return;
        }
        self.motion.velocity = Vector2::ZERO;
        self.motion.state = ShotState::Ending;
    }

    /// Region covered by the shot between now and the end of this tick.
    fn swept_bounds(&self, dt: f32) -> Aabb {
        let here = self.shape().bounds();
        here.union(&here.translate(self.motion.velocity * dt))
    }

    /// Advances the shot by one tick and returns its new state.
    pub fn update(&mut self, time: &GameTime, world: &ObstacleGrid) -> ShotState {
        let initial_time = *self.motion.initial_time.get_or_insert(time.total);

        match self.motion.state {
            ShotState::Starting => self.motion.state = ShotState::Active,
            ShotState::Ending => self.motion.state = ShotState::Ended,
            _ => {}
        }

        // reload complete, overrides everything above
        if time.total.saturating_sub(initial_time) >= self.info.max_ttl {
            if self.motion.state != ShotState::None {
                debug!(
                    "putting shot {} in state none, initial time: {:?}, max ttl: {:?}, total time: {:?}",
                    self.info.slot, initial_time, self.info.max_ttl, time.total
                );
            }
            self.motion.state = ShotState::None;
        }

        if matches!(self.motion.state, ShotState::Ended | ShotState::None) {
            return self.motion.state;
        }

        let dt = time.elapsed.as_secs_f32();

        let candidates = world.potential_intersects(&self.swept_bounds(dt));
        if let Some(hit) = find_nearest_collision(&self.shape(), candidates) {
            self.motion.position += hit.pushback * hit.overlap;
            self.end();
        }

        self.motion.position += self.motion.velocity * dt;

        if self.motion.position.distance(self.info.initial_position) >= self.info.max_range {
            self.end();
        }

        self.motion.state
    }
}

/// Fixed-capacity table of one player's shots, indexed by slot.
#[derive(Debug, Clone, Default)]
pub struct ShotTable {
    slots: [Option<Shot>; MAX_SHOTS as usize],
}

impl ShotTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_occupied(&self, slot: u8) -> bool {
        self.slots
            .get(slot as usize)
            .map_or(false, |entry| entry.is_some())
    }

    pub fn get(&self, slot: u8) -> Option<&Shot> {
        self.slots.get(slot as usize)?.as_ref()
    }

    /// Places `shot` at its own slot, returning whatever it displaced.
    /// A shot whose slot is outside `[0, MAX_SHOTS)` is refused and the table is left as is.
    pub fn insert(&mut self, shot: Shot) -> Result<Option<Shot>, ShotError> {
        let slot = shot.slot();
        let entry = self
            .slots
            .get_mut(slot as usize)
            .ok_or(ShotError::SlotOutOfRange(slot))?;
        Ok(entry.replace(shot))
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|entry| entry.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &Shot> {
        self.slots.iter().flatten()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Shot> {
        self.slots.iter_mut().flatten()
    }

    /// Frees every slot whose shot has reached `None`, returning the freed slots.
    pub fn reclaim(&mut self) -> Vec<u8> {
        let mut freed = Vec::new();
        for entry in self.slots.iter_mut() {
            if let Some(shot) = entry {
                if shot.state() == ShotState::None {
                    freed.push(shot.slot());
                    *entry = None;
                }
            }
        }
        freed
    }
}

/// Lowest slot in `[0, MAX_SHOTS)` not present in `occupied`, or `Dummy` when all are taken.
pub fn allocate_slot(occupied: &ShotTable) -> ShotSlot {
    (0..MAX_SHOTS)
        .find(|slot| !occupied.is_occupied(*slot))
        .map_or(ShotSlot::Dummy, ShotSlot::Slot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::Obstacle;
    use assert_approx_eq::assert_approx_eq;
    use std::f32::consts::PI;

    const TICK: Duration = Duration::from_millis(10);

    fn vars() -> GameVars {
        GameVars {
            shot_speed: 100.0,
            shot_range: 1000.0,
            reload_time: Duration::from_secs(1),
        }
    }

    fn shot_at(slot: u8, position: Vector2, rotation: f32, vars: &GameVars) -> Shot {
        Shot::new(slot, PlayerId(1), position, rotation, Vector2::ZERO, vars)
    }

    fn table_with(pattern: u32) -> ShotTable {
        let mut table = ShotTable::new();
        for slot in 0..MAX_SHOTS {
            if pattern & (1 << slot) != 0 {
                table.insert(shot_at(slot, Vector2::ZERO, 0.0, &vars())).unwrap();
            }
        }
        table
    }

    #[test]
    fn test_allocate_slot_every_occupancy_pattern() {
        let full = (1u32 << MAX_SHOTS) - 1;
        for pattern in 0..=full {
            let table = table_with(pattern);
            let expected = (0..MAX_SHOTS).find(|slot| pattern & (1 << slot) == 0);

            match (allocate_slot(&table), expected) {
                (ShotSlot::Slot(got), Some(want)) => assert_eq!(got, want, "pattern {:b}", pattern),
                (ShotSlot::Dummy, None) => assert_eq!(pattern, full),
                (got, want) => panic!("pattern {:b}: got {:?}, want {:?}", pattern, got, want),
            }
        }
    }

    #[test]
    fn test_allocate_slot_ignores_insertion_order() {
        let mut table = ShotTable::new();
        table.insert(shot_at(3, Vector2::ZERO, 0.0, &vars())).unwrap();
        table.insert(shot_at(0, Vector2::ZERO, 0.0, &vars())).unwrap();
        table.insert(shot_at(1, Vector2::ZERO, 0.0, &vars())).unwrap();
        assert_eq!(allocate_slot(&table), ShotSlot::Slot(2));
    }

    #[test]
    fn test_insert_out_of_range_slot_refused() {
        let mut table = table_with(0b1);

        let stray = shot_at(MAX_SHOTS, Vector2::ZERO, 0.0, &vars());
        assert_eq!(
            table.insert(stray).unwrap_err(),
            ShotError::SlotOutOfRange(MAX_SHOTS)
        );
        assert!(table.insert(shot_at(255, Vector2::ZERO, 0.0, &vars())).is_err());
        assert_eq!(table.len(), 1);

        // Replacing an occupied slot hands back the old shot
        let displaced = table.insert(shot_at(0, Vector2::ZERO, 0.0, &vars())).unwrap();
        assert!(displaced.is_some());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_initial_velocity_faces_up() {
        let shot = shot_at(0, Vector2::ZERO, 0.0, &vars());
        assert_eq!(shot.state(), ShotState::Starting);
        assert_approx_eq!(shot.velocity().x, 0.0, 1e-4);
        assert_approx_eq!(shot.velocity().y, -100.0, 1e-4);

        let right = shot_at(0, Vector2::ZERO, PI / 2.0, &vars());
        assert_approx_eq!(right.velocity().x, 100.0, 1e-4);
        assert_approx_eq!(right.velocity().y, 0.0, 1e-4);
    }

    #[test]
    fn test_free_flight_sequence() {
        let world = ObstacleGrid::default();
        let mut shot = shot_at(0, Vector2::ZERO, 0.0, &vars());
        let mut time = GameTime::new(Duration::from_secs(5), TICK);

        assert_eq!(shot.update(&time, &world), ShotState::Active);
        assert_eq!(shot.initial_time(), Some(Duration::from_secs(5)));

        for _ in 0..50 {
            time = time.advance(TICK);
            assert_eq!(shot.update(&time, &world), ShotState::Active);
        }

        // 51 ticks of 10ms at 100 units/s straight up.
        assert_approx_eq!(shot.position().y, -51.0, 1e-3);
        assert_approx_eq!(shot.position().x, 0.0, 1e-3);
    }

    #[test]
    fn test_ttl_expiry_to_none_and_stays_none() {
        let world = ObstacleGrid::default();
        let mut shot = shot_at(0, Vector2::ZERO, 0.0, &vars());
        let start = GameTime::new(Duration::from_secs(2), TICK);

        shot.update(&start, &world);
        let before = shot.position();

        let expired = GameTime::new(start.total + Duration::from_secs(1), TICK);
        assert_eq!(shot.update(&expired, &world), ShotState::None);
        // no physics once expired
        assert_eq!(shot.position(), before);

        let later = expired.advance(TICK);
        assert_eq!(shot.update(&later, &world), ShotState::None);
    }

    #[test]
    fn test_zero_ttl_expires_on_creation_tick() {
        let world = ObstacleGrid::default();
        let instant = GameVars {
            reload_time: Duration::ZERO,
            ..vars()
        };
        let mut shot = shot_at(0, Vector2::ZERO, 0.0, &instant);
        let time = GameTime::new(Duration::from_secs(1), TICK);
        assert_eq!(shot.update(&time, &world), ShotState::None);
    }

    #[test]
    fn test_range_limit_ends_then_ended_then_none() {
        let world = ObstacleGrid::default();
        let short = GameVars {
            shot_range: 4.5,
            ..vars()
        };
        let mut shot = shot_at(0, Vector2::ZERO, 0.0, &short);
        let mut time = GameTime::new(Duration::from_secs(1), TICK);

        let mut states = vec![shot.update(&time, &world)];
        for _ in 0..10 {
            time = time.advance(TICK);
            states.push(shot.update(&time, &world));
        }

        // 1 unit per tick; the fifth tick crosses 4.5 units.
        assert_eq!(states[0..4], [ShotState::Active; 4]);
        assert_eq!(states[4], ShotState::Ending);
        assert_eq!(shot.velocity(), Vector2::ZERO);
        assert!(states[5..].iter().all(|s| *s == ShotState::Ended));

        let stopped = shot.position();
        time = time.advance(TICK);
        shot.update(&time, &world);
        assert_eq!(shot.position(), stopped);

        // Expiry counts from the original initial time.
        let expired = GameTime::new(Duration::from_secs(2), TICK);
        assert_eq!(shot.update(&expired, &world), ShotState::None);
    }

    #[test]
    fn test_collision_resolves_and_stops() {
        // Wall spans y in [-25, -15]; shot travels up from the origin.
        let wall = Obstacle::new(Vector2::new(0.0, -20.0), Vector2::new(40.0, 10.0), 0.0);
        let world = ObstacleGrid::from_obstacles(10.0, [wall]);
        let mut shot = shot_at(0, Vector2::ZERO, 0.0, &vars());
        let mut time = GameTime::new(Duration::from_secs(1), Duration::from_millis(50));

        let mut state = shot.update(&time, &world);
        let mut ticks = 0;
        while state == ShotState::Active && ticks < 100 {
            time = time.advance(Duration::from_millis(50));
            state = shot.update(&time, &world);
            ticks += 1;
        }

        assert_eq!(state, ShotState::Ending);
        assert_eq!(shot.velocity(), Vector2::ZERO);

        let residual = shot.shape().penetration(&wall.shape).map_or(0.0, |(d, _)| d);
        assert!(residual < 1e-4, "still penetrating by {}", residual);
        assert_approx_eq!(shot.position().y, -14.0, 1e-3);

        time = time.advance(Duration::from_millis(50));
        assert_eq!(shot.update(&time, &world), ShotState::Ended);
    }

    #[test]
    fn test_collision_and_expiry_same_tick_resolves_to_none() {
        let wall = Obstacle::new(Vector2::new(0.0, 0.0), Vector2::new(10.0, 10.0), 0.0);
        let world = ObstacleGrid::from_obstacles(10.0, [wall]);
        let mut shot = shot_at(0, Vector2::new(0.0, 4.0), 0.0, &vars());

        let start = GameTime::new(Duration::from_secs(1), TICK);
        assert_eq!(shot.update(&start, &world), ShotState::Ending);

        let expired = GameTime::new(Duration::from_secs(2), TICK);
        assert_eq!(shot.update(&expired, &world), ShotState::None);
    }

    #[test]
    fn test_overlap_on_expiry_tick_goes_straight_to_none() {
        let open = ObstacleGrid::default();
        let mut shot = shot_at(0, Vector2::ZERO, 0.0, &vars());

        let start = GameTime::new(Duration::from_secs(1), TICK);
        assert_eq!(shot.update(&start, &open), ShotState::Active);
        let position = shot.position();
        let velocity = shot.velocity();
        assert_ne!(velocity, Vector2::ZERO);

        // A wall now covering the shot would push it back on any other tick
        let wall = Obstacle::new(position, Vector2::new(50.0, 50.0), 0.0);
        let walled = ObstacleGrid::from_obstacles(10.0, [wall]);

        let expired = GameTime::new(Duration::from_secs(2), TICK);
        assert_eq!(shot.update(&expired, &walled), ShotState::None);
        assert_eq!(shot.position(), position);
        assert_eq!(shot.velocity(), velocity);
    }

    #[test]
    fn test_end_is_idempotent_and_ignored_when_finished() {
        let world = ObstacleGrid::default();
        let mut shot = shot_at(0, Vector2::ZERO, 0.0, &vars());
        shot.end();
        shot.end();
        assert_eq!(shot.state(), ShotState::Ending);

        let time = GameTime::new(Duration::from_secs(1), TICK);
        assert_eq!(shot.update(&time, &world), ShotState::Ended);
        shot.end();
        assert_eq!(shot.state(), ShotState::Ended);
    }

    #[test]
    fn test_reclaim_frees_only_finished_shots() {
        let world = ObstacleGrid::default();
        let mut table = ShotTable::new();
        table.insert(shot_at(0, Vector2::ZERO, 0.0, &vars())).unwrap();
        table.insert(shot_at(1, Vector2::ZERO, 0.0, &vars())).unwrap();

        let time = GameTime::new(Duration::from_secs(1), TICK);
        table.iter_mut().for_each(|shot| {
            shot.update(&time, &world);
        });

        // Only slot 1 gets the expiring tick.
        let expired = GameTime::new(Duration::from_secs(3), TICK);
        if let Some(shot) = table.slots[1].as_mut() {
            shot.update(&expired, &world);
        }

        assert_eq!(table.reclaim(), vec![1]);
        assert_eq!(table.len(), 1);
        assert!(table.is_occupied(0));
        assert_eq!(allocate_slot(&table), ShotSlot::Slot(1));
    }
}
