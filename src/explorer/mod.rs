pub mod client;
pub mod model;

pub use client::{CachedExplorer, EsploraClient, ExplorerApi};
pub use model::{AddressPage, Outspend, Prevout, Transaction, Vin, Vout};
