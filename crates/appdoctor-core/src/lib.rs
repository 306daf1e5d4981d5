//! appdoctor core library
//!
//! Diagnostic engine for Laravel-style PHP applications: check modules,
//! findings, custom checks, alert dispatchers and exporters.

pub mod alerts;
pub mod app;
pub mod checks;
pub mod config;
pub mod custom;
pub mod doctor;
pub mod error;
pub mod export;
pub mod finding;
pub mod probes;
pub mod telemetry;

pub use app::{AppLayout, AppSnapshot, EnvSnapshot, Platform};
pub use checks::{CheckContext, CheckModule};
pub use config::{ConfigOverrides, DoctorConfig, DoctorSettings};
pub use custom::{CustomCheck, CustomCheckRegistry, CustomFinding};
pub use doctor::Doctor;
pub use error::{DoctorError, Result};
pub use export::{ExportFormat, Report};
pub use finding::{Finding, Findings, Level, Summary};
pub use probes::Collaborators;
pub use telemetry::init_tracing;
