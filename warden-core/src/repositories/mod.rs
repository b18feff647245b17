pub mod memory;

pub use memory::{InMemoryRouteRoleRepository, InMemoryUserRepository};
