//! Domain layer: entities, value objects, pure state transitions and the
//! ports the application layer talks to.

pub mod audit;
pub mod booking;
pub mod events;
pub mod identity;
pub mod money;
pub mod payment;
pub mod ports;
pub mod settlement;
