use std::convert::Infallible;

use axum::{
    Json, Router,
    extract::{FromRef, Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post, put},
};
use futures::stream::{self, Stream};
use uuid::Uuid;

use crate::{
    dto::picking::{CellList, OpenSessionRequest, PickConfirmation, SelectCellRequest, SessionView},
    error::AppResult,
    middleware::auth::{AuthConfig, AuthUser, ensure_operator},
    response::{ApiResponse, Meta},
    services::picking::TaskSnapshot,
    state::PickingState,
};

pub fn router<S>() -> Router<S>
where
    PickingState: FromRef<S>,
    AuthConfig: FromRef<S>,
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/cells", get(list_cells))
        .route("/sessions", post(open_session))
        .route("/sessions/{id}", get(get_session).delete(close_session))
        .route("/sessions/{id}/cell", put(select_cell).delete(deselect_cell))
        .route("/sessions/{id}/events", get(session_events))
        .route("/sessions/{id}/picks/{item_id}", post(confirm_pick))
}

fn view(session_id: Uuid, snapshot: TaskSnapshot) -> SessionView {
    SessionView {
        session_id,
        snapshot,
    }
}

#[utoipa::path(
    get,
    path = "/api/picking/cells",
    responses(
        (status = 200, description = "Selectable picking cells", body = ApiResponse<CellList>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
    ),
    security(("bearer_auth" = [])),
    tag = "Picking"
)]
pub async fn list_cells(
    State(picking): State<PickingState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<CellList>>> {
    ensure_operator(&user)?;
    let items = picking.store.cells().await?;
    let meta = Meta::whole(items.len());
    Ok(Json(ApiResponse::success("Cells", CellList { items }, Some(meta))))
}

#[utoipa::path(
    post,
    path = "/api/picking/sessions",
    request_body = OpenSessionRequest,
    responses(
        (status = 200, description = "Session opened", body = ApiResponse<SessionView>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
    ),
    security(("bearer_auth" = [])),
    tag = "Picking"
)]
pub async fn open_session(
    State(picking): State<PickingState>,
    user: AuthUser,
    Json(payload): Json<OpenSessionRequest>,
) -> AppResult<Json<ApiResponse<SessionView>>> {
    ensure_operator(&user)?;
    let session = picking.sessions.open(
        user.user_id,
        picking.store.clone(),
        picking.feed.clone(),
        picking.notice_ttl,
    );

    if let Some(cell) = payload.cell.as_deref() {
        if let Err(err) = session.select_cell(cell).await {
            let _ = picking.sessions.close(session.id(), &user);
            return Err(err);
        }
    }

    tracing::debug!(session = %session.id(), user_id = %user.user_id, "terminal attached");
    Ok(Json(ApiResponse::success(
        "Session opened",
        view(session.id(), session.snapshot()),
        Some(Meta::empty()),
    )))
}

#[utoipa::path(
    get,
    path = "/api/picking/sessions/{id}",
    params(("id" = Uuid, Path, description = "Session ID")),
    responses(
        (status = 200, description = "Current task snapshot", body = ApiResponse<SessionView>),
        (status = 403, description = "Session belongs to another operator"),
        (status = 404, description = "Unknown session"),
    ),
    security(("bearer_auth" = [])),
    tag = "Picking"
)]
pub async fn get_session(
    State(picking): State<PickingState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<SessionView>>> {
    ensure_operator(&user)?;
    let session = picking.sessions.get(id, &user)?;
    Ok(Json(ApiResponse::success(
        "Session",
        view(id, session.snapshot()),
        Some(Meta::empty()),
    )))
}

#[utoipa::path(
    put,
    path = "/api/picking/sessions/{id}/cell",
    params(("id" = Uuid, Path, description = "Session ID")),
    request_body = SelectCellRequest,
    responses(
        (status = 200, description = "Cell selected and tasks loaded", body = ApiResponse<SessionView>),
        (status = 400, description = "Empty cell or closed session"),
        (status = 403, description = "Session belongs to another operator"),
        (status = 404, description = "Unknown session"),
    ),
    security(("bearer_auth" = [])),
    tag = "Picking"
)]
pub async fn select_cell(
    State(picking): State<PickingState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<SelectCellRequest>,
) -> AppResult<Json<ApiResponse<SessionView>>> {
    ensure_operator(&user)?;
    let session = picking.sessions.get(id, &user)?;
    let outcome = session.select_cell(&payload.cell).await?;
    tracing::debug!(session = %id, ?outcome, "cell switch finished");
    Ok(Json(ApiResponse::success(
        "Cell selected",
        view(id, session.snapshot()),
        Some(Meta::empty()),
    )))
}

#[utoipa::path(
    delete,
    path = "/api/picking/sessions/{id}/cell",
    params(("id" = Uuid, Path, description = "Session ID")),
    responses(
        (status = 200, description = "Cell deselected", body = ApiResponse<SessionView>),
        (status = 403, description = "Session belongs to another operator"),
        (status = 404, description = "Unknown session"),
    ),
    security(("bearer_auth" = [])),
    tag = "Picking"
)]
pub async fn deselect_cell(
    State(picking): State<PickingState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<SessionView>>> {
    ensure_operator(&user)?;
    let session = picking.sessions.get(id, &user)?;
    session.deselect();
    Ok(Json(ApiResponse::success(
        "Cell deselected",
        view(id, session.snapshot()),
        Some(Meta::empty()),
    )))
}

/// One `snapshot` event on connect and one per change, until the session
/// closes.
#[utoipa::path(
    get,
    path = "/api/picking/sessions/{id}/events",
    params(("id" = Uuid, Path, description = "Session ID")),
    responses(
        (status = 200, description = "Server-sent snapshot stream", content_type = "text/event-stream", body = TaskSnapshot),
        (status = 403, description = "Session belongs to another operator"),
        (status = 404, description = "Unknown session"),
    ),
    security(("bearer_auth" = [])),
    tag = "Picking"
)]
pub async fn session_events(
    State(picking): State<PickingState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    ensure_operator(&user)?;
    let session = picking.sessions.get(id, &user)?;
    let receiver = session.subscribe();
    let shutdown = session.shutdown_token();
    drop(session);

    let events = stream::unfold(
        (receiver, shutdown, true),
        |(mut receiver, shutdown, first)| async move {
            if !first {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => return None,
                    changed = receiver.changed() => {
                        if changed.is_err() {
                            return None;
                        }
                    }
                }
            }
            let snapshot = receiver.borrow_and_update().clone();
            let event = Event::default()
                .event("snapshot")
                .id(snapshot.version.to_string())
                .json_data(&snapshot)
                .unwrap_or_else(|err| {
                    tracing::warn!(error = %err, "snapshot could not be encoded");
                    Event::default().event("error")
                });
            Some((Ok::<_, Infallible>(event), (receiver, shutdown, false)))
        },
    );

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

#[utoipa::path(
    post,
    path = "/api/picking/sessions/{id}/picks/{item_id}",
    params(
        ("id" = Uuid, Path, description = "Session ID"),
        ("item_id" = Uuid, Path, description = "Order item ID"),
    ),
    responses(
        (status = 200, description = "Pick recorded", body = ApiResponse<PickConfirmation>),
        (status = 400, description = "No cell selected or session closed"),
        (status = 403, description = "Session belongs to another operator"),
        (status = 404, description = "Unknown session or task not visible in it"),
        (status = 500, description = "Write failed; the task was restored"),
    ),
    security(("bearer_auth" = [])),
    tag = "Picking"
)]
pub async fn confirm_pick(
    State(picking): State<PickingState>,
    user: AuthUser,
    Path((id, item_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<ApiResponse<PickConfirmation>>> {
    ensure_operator(&user)?;
    let session = picking.sessions.get(id, &user)?;
    let picked = session.confirm_pick(item_id).await?;
    Ok(Json(ApiResponse::success(
        "Pick recorded",
        PickConfirmation {
            session_id: id,
            picked,
        },
        Some(Meta::empty()),
    )))
}

#[utoipa::path(
    delete,
    path = "/api/picking/sessions/{id}",
    params(("id" = Uuid, Path, description = "Session ID")),
    responses(
        (status = 200, description = "Session closed", body = ApiResponse<SessionView>),
        (status = 403, description = "Session belongs to another operator"),
        (status = 404, description = "Unknown session"),
    ),
    security(("bearer_auth" = [])),
    tag = "Picking"
)]
pub async fn close_session(
    State(picking): State<PickingState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<SessionView>>> {
    ensure_operator(&user)?;
    let session = picking.sessions.get(id, &user)?;
    picking.sessions.close(id, &user)?;
    Ok(Json(ApiResponse::success(
        "Session closed",
        view(id, session.snapshot()),
        Some(Meta::empty()),
    )))
}
