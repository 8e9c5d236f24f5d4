//! Network reachability probe for the messaging service.
//!
//! Runs DNS, TCP and HTTPS checks against the service host and reports
//! each outcome as data. The probe never fails as a whole.

pub mod probe;
pub mod types;

pub use probe::DiagnosticsProbe;
pub use types::{CheckResult, NetReport, ProbeConfig, ResolvedAddress};
