//! Intent handlers for the OKR copilot: one handler per entity type, each a
//! thin permission-check-then-CRUD wrapper around the external boundary,
//! plus the risk-report handler driving the analysis pipeline.

pub mod key_results;
pub mod members;
pub mod objectives;
pub mod risk_report;
pub mod sessions;
pub mod support;
pub mod teams;
pub mod work_items;

use okr_copilot_core::analysis::AnalysisOrchestrator;
use okr_copilot_core::boundary::{EntityGateway, PermissionChecker};
use okr_copilot_core::dispatch::IntentHandler;
use std::sync::Arc;

/// Builds the full handler set wired against the given boundaries. The
/// returned list feeds `HandlerRegistry::build` once at startup.
pub fn standard_handlers(
    gateway: Arc<dyn EntityGateway>,
    permissions: Arc<dyn PermissionChecker>,
    analysis: Arc<AnalysisOrchestrator>,
) -> Vec<Arc<dyn IntentHandler>> {
    vec![
        Arc::new(teams::TeamHandler::new(gateway.clone(), permissions.clone())),
        Arc::new(members::MemberHandler::new(gateway.clone(), permissions.clone())),
        Arc::new(sessions::OkrSessionHandler::new(gateway.clone(), permissions.clone())),
        Arc::new(objectives::ObjectiveHandler::new(gateway.clone(), permissions.clone())),
        Arc::new(key_results::KeyResultHandler::new(gateway.clone(), permissions.clone())),
        Arc::new(work_items::WorkItemHandler::new(gateway.clone(), permissions.clone())),
        Arc::new(risk_report::RiskReportHandler::new(gateway, permissions, analysis)),
    ]
}
