//! Alert Persistence
//!
//! In-memory implementation of the alert store boundary. The durable
//! document store is an external collaborator; this repository carries
//! the same contract (create / get / filtered list / atomic status
//! update / counts) for the process itself and for tests.

mod repository;

pub use repository::InMemoryAlertStore;
