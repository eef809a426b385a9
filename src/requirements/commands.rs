use crate::{
    db::models::{Appointment, Requirement},
    requirements::{MirrorOutcome, RequirementEdit},
    store::AppointmentStore,
};

use crate::AppState;

/// Builds the new checklist from edited texts. An entry keeps its checked
/// state only when the text at the same index is unchanged.
pub fn carry_checked(previous: &[Requirement], texts: Vec<String>) -> Vec<Requirement> {
    texts
        .into_iter()
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .enumerate()
        .map(|(index, text)| {
            let checked = previous
                .get(index)
                .is_some_and(|old| old.checked && old.text.trim() == text);
            Requirement { text, checked }
        })
        .collect()
}

pub async fn get_appointment(state: &AppState, appointment_id: String) -> Result<Appointment, String> {
    state
        .db
        .get_appointment(&appointment_id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("Appointment {appointment_id} not found"))
}

pub async fn set_requirement_checked(
    state: &AppState,
    appointment_id: String,
    index: usize,
    checked: bool,
) -> Result<MirrorOutcome, String> {
    state
        .agenda
        .set_requirement(&appointment_id, index, checked)
        .await
        .map_err(|e| e.to_string())
}

pub async fn set_requirement_list(
    state: &AppState,
    appointment_id: String,
    texts: Vec<String>,
) -> Result<RequirementEdit, String> {
    let appointment = get_appointment(state, appointment_id.clone()).await?;
    let requirements = carry_checked(&appointment.requirements, texts);
    state
        .agenda
        .replace_requirements(&appointment_id, requirements)
        .await
        .map_err(|e| e.to_string())
}
