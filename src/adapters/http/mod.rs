//! HTTP adapters for external collaborators.

pub mod anomaly_store;
pub mod dispensas;
pub mod transparency;

pub use anomaly_store::RestAnomalyStore;
pub use dispensas::DispensaApiClient;
pub use transparency::TransparencyApiClient;
