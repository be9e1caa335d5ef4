pub mod binding;
pub mod handlers;

pub use binding::{ClientError, PhysicsClient};
pub use handlers::EventHandlers;
