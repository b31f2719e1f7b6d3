use crate::collision::Obstacle;
use crate::math::Vector2;
use crate::protocol::Team;
use crate::shot::{PlayerId, Shot, ShotState, SHOT_SIZE};

pub const TANK_SIZE: Vector2 = Vector2::new(4.86, 6.0);

const BOX_COLOR: [u8; 4] = [255, 255, 255, 255];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Box,
    Tank,
    Shot,
}

/// What a renderer needs to draw one entity for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sprite {
    pub kind: EntityKind,
    pub position: Vector2,
    pub size: Vector2,
    pub rotation: f32,
    pub color: [u8; 4],
}

/// A player's tank.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tank {
    pub owner: PlayerId,
    pub team: Team,
    pub position: Vector2,
    pub rotation: f32,
    pub velocity: Vector2,
}

impl Tank {
    pub fn new(owner: PlayerId, team: Team, position: Vector2, rotation: f32) -> Self {
        Self {
            owner,
            team,
            position,
            rotation,
            velocity: Vector2::ZERO,
        }
    }
}

/// Borrowed view over any drawable entity.
#[derive(Debug, Clone, Copy)]
pub enum EntityRef<'a> {
    Box(&'a Obstacle),
    Tank(&'a Tank),
    Shot(&'a Shot, Team),
}

impl EntityRef<'_> {
    /// Draw data for this frame, or `None` when there is nothing to show.
    pub fn sprite(&self) -> Option<Sprite> {
        match *self {
            EntityRef::Box(obstacle) => Some(Sprite {
                kind: EntityKind::Box,
                position: obstacle.shape.position,
                size: obstacle.shape.size,
                rotation: obstacle.shape.rotation,
                color: BOX_COLOR,
            }),
            EntityRef::Tank(tank) => Some(Sprite {
                kind: EntityKind::Tank,
                position: tank.position,
                size: TANK_SIZE,
                rotation: tank.rotation,
                color: tank.team.color(),
            }),
            EntityRef::Shot(shot, team) => match shot.state() {
                ShotState::Ended | ShotState::None => None,
                _ => Some(Sprite {
                    kind: EntityKind::Shot,
                    position: shot.position(),
                    size: SHOT_SIZE,
                    rotation: shot.info().rotation,
                    color: team.color(),
                }),
            },
        }
    }
}
