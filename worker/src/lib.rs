pub mod body;
pub mod constraint;
pub mod error;
pub mod events;
pub mod host;
pub mod material;
pub mod physics;
pub mod ray;
mod reducers;
pub mod settings;
pub mod shape;
pub mod spring;
mod step;
pub mod subscription;
mod tag;
pub mod vehicle;
pub mod world;

pub use host::{WorkerHandle, spawn};
pub use physics::PhysicsWorker;
pub use settings::{UnknownIdentityPolicy, WorkerSettings};
