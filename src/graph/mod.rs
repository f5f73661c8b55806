pub mod memory;
pub mod neo4j;
pub mod store;
pub mod wrapper;

pub use memory::MemoryGraph;
pub use neo4j::Neo4jGraph;
pub use store::{AddressTag, GraphHealth, GraphStatistics, GraphStore};
pub use wrapper::GraphWrapper;
