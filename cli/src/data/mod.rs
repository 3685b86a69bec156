pub mod node_store;

pub use node_store::{NodeStore, StoreError};
