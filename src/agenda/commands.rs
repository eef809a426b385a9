use crate::{
    agenda::{ActivityEdit, AgendaController, AgendaSnapshot, DropPreview, DropTarget, Slot},
    requirements::TaskToggle,
};

use crate::AppState;

fn controller_from_state(state: &AppState) -> AgendaController {
    state.agenda.clone()
}

pub async fn get_agenda(state: &AppState) -> Result<AgendaSnapshot, String> {
    let controller = controller_from_state(state);
    Ok(controller.current().await)
}

pub async fn refresh_agenda(state: &AppState) -> Result<AgendaSnapshot, String> {
    let controller = controller_from_state(state);
    Ok(controller.refresh().await)
}

pub async fn attach_agenda(state: &AppState) -> Result<(), String> {
    let controller = controller_from_state(state);
    controller.attach().await;
    Ok(())
}

pub async fn detach_agenda(state: &AppState) -> Result<(), String> {
    let controller = controller_from_state(state);
    controller.detach().await.map_err(|e| e.to_string())
}

pub async fn start_drag(state: &AppState, activity_id: String) -> Result<(), String> {
    let controller = controller_from_state(state);
    controller
        .drag_start(&activity_id)
        .await
        .map_err(|e| e.to_string())
}

pub async fn drag_over(state: &AppState, target: DropTarget) -> Result<DropPreview, String> {
    let controller = controller_from_state(state);
    controller.drag_over(&target).await.map_err(|e| e.to_string())
}

pub async fn drop_activity(state: &AppState, target: DropTarget) -> Result<Slot, String> {
    let controller = controller_from_state(state);
    controller.drop_at(&target).await.map_err(|e| e.to_string())
}

pub async fn end_drag(state: &AppState) -> Result<(), String> {
    let controller = controller_from_state(state);
    controller.drag_end().await;
    Ok(())
}

pub async fn toggle_activity(state: &AppState, activity_id: String) -> Result<TaskToggle, String> {
    let controller = controller_from_state(state);
    controller.toggle(&activity_id).await.map_err(|e| e.to_string())
}

pub async fn edit_activity(
    state: &AppState,
    activity_id: String,
    edit: ActivityEdit,
) -> Result<(), String> {
    let controller = controller_from_state(state);
    controller
        .edit(&activity_id, &edit)
        .await
        .map_err(|e| e.to_string())
}

pub async fn delete_activity(
    state: &AppState,
    activity_id: String,
    routine: bool,
) -> Result<(), String> {
    let controller = controller_from_state(state);
    controller
        .delete(&activity_id, routine)
        .await
        .map_err(|e| e.to_string())
}
