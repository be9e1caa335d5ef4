pub mod codec;
pub mod constants;
pub mod error;
pub mod identity;
pub mod protocol;
pub mod rotation;
pub mod shape;

pub use error::{ErrorKind, IdentityKind, ProtocolError};
pub use identity::{base_id, instance_id, instance_ids, split_instance_id};
pub use protocol::{
    BodyProps, BodyType, CollideEvent, ConstraintKind, ConstraintProps, ContactInfo,
    ContactMaterialProps, ContactPairEvent, Event, Frame, GroupMask, InitProps, MaterialRef,
    Observation, ObservedValue, RayHitEvent, RayMode, RayProps, Request, SpringProps, StepProps,
    SubscribeProps, SubscriptionTarget, VehicleProps, WheelInfoProps, WorkerMessage,
};
pub use rotation::{Quat, Vec3};
pub use shape::{ShapeDesc, ShapeType};
