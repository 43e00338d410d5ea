//! Mobility providers: how a node's position evolves.
//!
//! The engine asks each mobile node's [`MobilityProvider`] for its next
//! position once per tick, during the write phase. Providers are called
//! serially in node-id order, so a stateful provider sees a deterministic
//! call sequence.
//!
//! Reference providers cover the built-in configuration keys:
//!
//! | Key | Provider |
//! |-----|----------|
//! | `STATIC` | [`Stationary`] |
//! | `LINEAR_X` | [`LinearDrift`] along +x at 5 m/s |
//! | `RANDOM` | [`RandomWalk`] at 5 m/s |

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::id::NodeId;
use crate::position::Position;

/// Speed of the built-in moving providers, in metres per second.
pub const DEFAULT_SPEED: f64 = 5.0;

/// Inputs available to a mobility provider for one step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MobilityContext {
    /// The node being moved.
    pub node: NodeId,
    /// Ticks elapsed since the start of the run.
    pub elapsed_ticks: u64,
    /// Seconds per tick.
    pub step_value: f64,
}

/// Computes a node's next position.
pub trait MobilityProvider: Send {
    /// Position after one more tick, given the current one.
    fn next_position(&mut self, ctx: &MobilityContext, current: Position) -> Position;
}

impl<F> MobilityProvider for F
where
    F: FnMut(&MobilityContext, Position) -> Position + Send,
{
    fn next_position(&mut self, ctx: &MobilityContext, current: Position) -> Position {
        self(ctx, current)
    }
}

/// Never moves.
#[derive(Clone, Copy, Debug, Default)]
pub struct Stationary;

impl MobilityProvider for Stationary {
    fn next_position(&mut self, _ctx: &MobilityContext, current: Position) -> Position {
        current
    }
}

/// Constant velocity, in metres per second.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinearDrift {
    /// Velocity along x.
    pub vx: f64,
    /// Velocity along y.
    pub vy: f64,
    /// Velocity along z.
    pub vz: f64,
}

impl LinearDrift {
    /// Drift along +x at `speed` m/s.
    pub fn along_x(speed: f64) -> Self {
        Self {
            vx: speed,
            vy: 0.0,
            vz: 0.0,
        }
    }
}

impl MobilityProvider for LinearDrift {
    fn next_position(&mut self, ctx: &MobilityContext, current: Position) -> Position {
        let dt = ctx.step_value;
        current.offset(self.vx * dt, self.vy * dt, self.vz * dt)
    }
}

/// Gaussian random walk in the horizontal plane. Altitude is kept.
///
/// Each step draws from a ChaCha8 stream seeded with
/// `seed ^ node ^ elapsed_ticks`, so a walk is reproducible regardless of
/// how many other providers ran before it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RandomWalk {
    /// Standard deviation of displacement per second, in metres.
    pub speed: f64,
    /// Seed mixed into every step.
    pub seed: u64,
}

impl RandomWalk {
    /// A walk at `speed` m/s seeded with `seed`.
    pub fn new(speed: f64, seed: u64) -> Self {
        Self { speed, seed }
    }

    /// Standard normal sample via Box-Muller.
    fn standard_normal(rng: &mut ChaCha8Rng) -> f64 {
        let u1: f64 = rng.random::<f64>().max(1e-300);
        let u2: f64 = rng.random();
        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }
}

impl MobilityProvider for RandomWalk {
    fn next_position(&mut self, ctx: &MobilityContext, current: Position) -> Position {
        let mut rng = ChaCha8Rng::seed_from_u64(
            self.seed ^ (u64::from(ctx.node.0) << 32) ^ ctx.elapsed_ticks,
        );
        let per_tick = self.speed * ctx.step_value;
        let dx = per_tick * Self::standard_normal(&mut rng);
        let dy = per_tick * Self::standard_normal(&mut rng);
        current.offset(dx, dy, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(tick: u64, step: f64) -> MobilityContext {
        MobilityContext {
            node: NodeId(3),
            elapsed_ticks: tick,
            step_value: step,
        }
    }

    #[test]
    fn stationary_keeps_position() {
        let p = Position::new(1.0, 2.0, 3.0);
        assert_eq!(Stationary.next_position(&ctx(1, 1.0), p), p);
    }

    #[test]
    fn linear_drift_scales_with_step() {
        let mut m = LinearDrift::along_x(DEFAULT_SPEED);
        let p = m.next_position(&ctx(1, 0.5), Position::default());
        assert_eq!(p, Position::new(2.5, 0.0, 0.0));
    }

    #[test]
    fn random_walk_is_reproducible() {
        let start = Position::new(100.0, 100.0, 50.0);
        let mut a = RandomWalk::new(DEFAULT_SPEED, 7);
        let mut b = RandomWalk::new(DEFAULT_SPEED, 7);
        let pa = a.next_position(&ctx(12, 1.0), start);
        let pb = b.next_position(&ctx(12, 1.0), start);
        assert_eq!(pa, pb);
        assert_eq!(pa.z, 50.0);
        assert!(pa.is_finite());
    }

    #[test]
    fn random_walk_varies_over_ticks() {
        let start = Position::default();
        let mut m = RandomWalk::new(DEFAULT_SPEED, 7);
        let p1 = m.next_position(&ctx(1, 1.0), start);
        let p2 = m.next_position(&ctx(2, 1.0), start);
        assert_ne!(p1, p2);
    }

    #[test]
    fn closures_are_providers() {
        let mut up = |_: &MobilityContext, p: Position| p.offset(0.0, 0.0, 1.0);
        let p = up.next_position(&ctx(1, 1.0), Position::default());
        assert_eq!(p.z, 1.0);
    }
}
