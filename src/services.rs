pub mod lifecycle;
pub mod payment_orchestrator;
pub mod reconciler;
pub mod worker;
