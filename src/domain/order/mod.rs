// ============================================================================
// Order Domain
// ============================================================================
//
// Everything the rest of the service knows about an order:
// - Value objects (OrderItem, OrderStatus, id normalization)
// - The Order entity
// - The OrderError taxonomy shared by every layer
//
// ============================================================================

pub mod value_objects;
pub mod entity;
pub mod errors;

pub use value_objects::*;
pub use entity::*;
pub use errors::*;
