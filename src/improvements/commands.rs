use crate::{
    db::models::Improvement,
    improvements::PlanOutcome,
    store::ImprovementStore,
};

use crate::AppState;

pub async fn plan_improvements(state: &AppState) -> Result<PlanOutcome, String> {
    state.agenda.plan_now().await.map_err(|e| e.to_string())
}

pub async fn list_improvements(state: &AppState) -> Result<Vec<Improvement>, String> {
    state
        .db
        .active_improvements(state.agenda.owner_id())
        .await
        .map_err(|e| e.to_string())
}
