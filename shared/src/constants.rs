//! World-level and per-body defaults.
//!
//! Every optional field of an inbound request falls back to one of these.
//! They are shared by the worker (which applies them) and the client (which
//! documents them to callers), so both sides agree on what "absent" means.

/// Gravity applied when `init` does not specify one (m/s^2, Y up).
pub const DEFAULT_GRAVITY: [f32; 3] = [0.0, -9.81, 0.0];

/// Fixed simulation step in seconds.
pub const DEFAULT_STEP_SIZE: f32 = 1.0 / 60.0;

/// Upper bound on catch-up sub-steps when `timeSinceLastCalled` is given.
///
/// Leftover accumulated time beyond this many steps is discarded rather than
/// carried over, so one slow frame cannot snowball into many slow frames.
pub const DEFAULT_MAX_SUB_STEPS: u32 = 10;

/// Whether bodies may fall asleep when `init` does not say.
pub const DEFAULT_ALLOW_SLEEP: bool = false;

/// Solver iterations per step.
pub const DEFAULT_SOLVER_ITERATIONS: u32 = 5;

/// Convergence tolerance, mapped onto the engine's allowed linear error.
pub const DEFAULT_TOLERANCE: f32 = 0.001;

/// Sort axis for sweep-and-prune (0 = X, 1 = Y, 2 = Z).
pub const DEFAULT_AXIS_INDEX: u8 = 0;

/// Friction of the world's default contact material.
pub const DEFAULT_FRICTION: f32 = 0.3;

/// Restitution of the world's default contact material.
pub const DEFAULT_RESTITUTION: f32 = 0.0;

pub const DEFAULT_LINEAR_DAMPING: f32 = 0.01;
pub const DEFAULT_ANGULAR_DAMPING: f32 = 0.01;

/// Linear speed (m/s) below which a body starts counting towards sleep.
pub const DEFAULT_SLEEP_SPEED_LIMIT: f32 = 0.1;

/// Seconds a body must stay under the speed limit before it sleeps.
pub const DEFAULT_SLEEP_TIME_LIMIT: f32 = 1.0;

/// Collision group every body belongs to unless told otherwise.
pub const DEFAULT_COLLISION_GROUP: u32 = 1;

/// Collision mask accepting every group.
pub const DEFAULT_COLLISION_MASK: u32 = u32::MAX;

/// Radius of the ball standing in for a particle shape (meters).
pub const PARTICLE_RADIUS: f32 = 1.0e-3;

/// Radial segments used to approximate a tapered cylinder.
pub const DEFAULT_CYLINDER_SEGMENTS: u32 = 8;

/// Maximum force a constraint may apply when none is given.
pub const DEFAULT_CONSTRAINT_MAX_FORCE: f32 = 1.0e6;

pub const DEFAULT_SPRING_REST_LENGTH: f32 = 1.0;
pub const DEFAULT_SPRING_STIFFNESS: f32 = 100.0;
pub const DEFAULT_SPRING_DAMPING: f32 = 1.0;

/// Separator between a base identity and its instance index (`base/index`).
pub const INSTANCE_SEPARATOR: char = '/';

/// Damping factor used when driving a hinge motor at a target velocity.
///
/// The engine's velocity motor is a spring on velocity error; a large factor
/// makes it track the commanded speed closely, bounded by the max force.
pub const MOTOR_DAMPING: f32 = 10.0;
