use crate::{
    config::{PhysicsConfig, ViewportConfig},
    registry::{EmoteInstance, InstanceId},
};

/// Frame length the per-frame velocities are expressed in.
pub const REFERENCE_FRAME_MS: f32 = 1_000.0 / 60.0;
/// Upper bound on a single step so a stalled loop cannot tunnel through walls.
pub const MAX_STEP_FRAMES: f32 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl From<ViewportConfig> for Viewport {
    fn from(config: ViewportConfig) -> Self {
        Self {
            width: config.width,
            height: config.height,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Regime {
    /// Straight-line fall, retired once below the viewport.
    Falling,
    /// Gravity plus damped reflection off all four edges.
    Bounded,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Kinematics {
    pub velocity: Vec2,
    /// Degrees; fixed at spawn.
    pub rotation: f32,
    pub regime: Regime,
}

/// Converts wall-clock time between two render ticks into reference frames.
pub fn frames_between(elapsed_ms: f32) -> f32 {
    (elapsed_ms / REFERENCE_FRAME_MS).clamp(0.0, MAX_STEP_FRAMES)
}

#[derive(Debug, Clone)]
pub struct PhysicsSimulator {
    gravity: f32,
    damping: f32,
    rest_threshold: f32,
}

impl PhysicsSimulator {
    pub fn new(config: &PhysicsConfig) -> Self {
        Self {
            gravity: config.gravity,
            damping: config.bounce_damping,
            rest_threshold: config.rest_threshold,
        }
    }

    /// Advances every instance carrying kinematics by `dt` reference frames.
    /// Returns the visible falling instances that dropped below the viewport.
    pub fn step<'a>(
        &self,
        instances: impl IntoIterator<Item = &'a mut EmoteInstance>,
        viewport: Viewport,
        dt: f32,
    ) -> Vec<InstanceId> {
        let mut fallen = Vec::new();
        for instance in instances {
            let size = instance.size;
            let is_visible = instance.is_visible();
            let Some(kinematics) = instance.kinematics.as_mut() else {
                continue;
            };
            match kinematics.regime {
                Regime::Falling => {
                    instance.position.x += kinematics.velocity.x * dt;
                    instance.position.y += kinematics.velocity.y * dt;
                    if is_visible && instance.position.y > viewport.height {
                        fallen.push(instance.id);
                    }
                }
                Regime::Bounded => {
                    kinematics.velocity.y += self.gravity * dt;
                    instance.position.x += kinematics.velocity.x * dt;
                    instance.position.y += kinematics.velocity.y * dt;
                    self.bounce(&mut instance.position, &mut kinematics.velocity, size, viewport);
                }
            }
        }
        fallen
    }

    fn bounce(&self, position: &mut Vec2, velocity: &mut Vec2, size: f32, viewport: Viewport) {
        let max_x = (viewport.width - size).max(0.0);
        let max_y = (viewport.height - size).max(0.0);

        if position.x > max_x {
            position.x = max_x;
            velocity.x = -velocity.x.abs() * self.damping;
        }
        if position.x < 0.0 {
            position.x = 0.0;
            velocity.x = velocity.x.abs() * self.damping;
        }
        if position.y > max_y {
            position.y = max_y;
            velocity.y = -velocity.y.abs() * self.damping;
            self.settle(velocity);
        }
        if position.y < 0.0 {
            position.y = 0.0;
            velocity.y = velocity.y.abs() * self.damping;
            self.settle(velocity);
        }
    }

    fn settle(&self, velocity: &mut Vec2) {
        if velocity.y.abs() < self.rest_threshold {
            velocity.y = 0.0;
        }
    }
}
