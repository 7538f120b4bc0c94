//! Error taxonomy. Subsystem enums with named fields, wrapped by a top-level
//! [`AgentError`]. Nothing here is ever escalated to process-fatal — the
//! delivery engine logs and degrades.

mod delivery_error;
mod diagnostic_error;

pub use delivery_error::DeliveryError;
pub use diagnostic_error::DiagnosticError;

/// Top-level error for the Pulse agent.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error(transparent)]
    Diagnostic(#[from] DiagnosticError),
}

pub type AgentResult<T> = Result<T, AgentError>;
