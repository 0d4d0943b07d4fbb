//! Ports (trait interfaces) between the engine core and its collaborators.

pub mod agent;
pub mod anomaly_store;
pub mod transparency;

pub use agent::{Agent, Reflection, Reflective};
pub use anomaly_store::{AnomalyFilter, AnomalyStore, NewAnomaly, StoredInvestigation};
pub use transparency::{DispensaSource, TransparencyClient};
