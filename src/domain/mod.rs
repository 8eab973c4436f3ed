// ============================================================================
// Domain Layer
// ============================================================================
//
// The order model shared by persistence, ingestion and the HTTP boundary.
// Nothing here performs I/O.
//
// ============================================================================

pub mod order;
