// ============================================================================
// Persistence
// ============================================================================
//
// - repository  - the OrderRepository contract and partition addressing
// - mongo       - general document store backend (MongoDB API)
// - cosmos      - partitioned document store backend (Cosmos DB NoSQL API)
// - factory     - (backend, auth) decision table producing a connected repository
//
// ============================================================================

mod cosmos;
mod factory;
mod mongo;
mod repository;

#[cfg(test)]
mod conformance;

pub use factory::connect_repository;
pub use repository::OrderRepository;

#[cfg(test)]
pub use repository::MockOrderRepository;
