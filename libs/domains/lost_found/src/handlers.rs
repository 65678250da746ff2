use axum::{
    Extension, Json, Router,
    extract::{Path, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use axum_helpers::{
    AppError, JwtAuth, JwtClaims, UuidPath, ValidatedJson,
    errors::responses::{
        BadRequestUuidResponse, BadRequestValidationResponse, ConflictResponse, ForbiddenResponse,
        InternalServerErrorResponse, NotFoundResponse, UnauthorizedResponse,
        UnprocessableEntityResponse,
    },
    jwt_auth_middleware,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

use crate::admin::{AdminContext, AdminService};
use crate::consistency::{ConsistencyIssue, ConsistencyReport, IssueKind};
use crate::error::LifecycleResult;
use crate::models::{
    AdminPrincipal, Category, CreateItem, GrantAdmin, Item, ItemFilter, ItemStatus, Principal,
};
use crate::notifications::{Notification, NotificationCenter, Severity};
use crate::repository::{AdminRepository, ItemRepository};
use crate::service::{LifecycleEngine, RepairOutcome, StatusChange, TransitionMenu};
use crate::snapshot::{ItemSnapshot, Outcome, View};
use crate::stats::ItemStats;

/// OpenAPI documentation for the Lost & Found API
#[derive(OpenApi)]
#[openapi(
    paths(
        list_items,
        item_stats,
        report_item,
        me,
        list_notifications,
        dismiss_notification,
        admin_list_items,
        admin_item_stats,
        approve_item,
        delete_item,
        change_status,
        transition_menu,
        link_candidates,
        link_item,
        unlink_item,
        check_consistency,
        repair_consistency,
        list_admins,
        grant_admin,
        revoke_admin,
    ),
    components(
        schemas(
            Item,
            Category,
            ItemStatus,
            CreateItem,
            ItemFilter,
            ItemStats,
            ItemListResponse,
            ItemSnapshot,
            View,
            Outcome,
            StatusChange,
            ChangeStatus,
            TransitionMenu,
            LinkRequest,
            ConsistencyReport,
            ConsistencyIssue,
            IssueKind,
            RepairOutcome,
            AdminPrincipal,
            GrantAdmin,
            Principal,
            MeResponse,
            Notification,
            Severity,
        ),
        responses(
            NotFoundResponse,
            BadRequestValidationResponse,
            BadRequestUuidResponse,
            UnauthorizedResponse,
            ForbiddenResponse,
            ConflictResponse,
            UnprocessableEntityResponse,
            InternalServerErrorResponse
        )
    ),
    tags(
        (name = "Items", description = "Public browsing and reporting of lost and found items"),
        (name = "Account", description = "Signed-in user and notifications"),
        (name = "Admin", description = "Approval, status, linking and admin management (admins only)")
    )
)]
pub struct ApiDoc;

/// Shared state of the Lost & Found routes
pub struct LostFoundState<R: ItemRepository, A: AdminRepository> {
    pub engine: LifecycleEngine<R>,
    pub admins: AdminService<A>,
    pub notifications: NotificationCenter,
}

impl<R: ItemRepository, A: AdminRepository> LostFoundState<R, A> {
    pub fn new(engine: LifecycleEngine<R>, admins: AdminService<A>) -> Self {
        Self {
            engine,
            admins,
            notifications: NotificationCenter::new(),
        }
    }

    /// Tell the acting admin how an operation went.
    fn publish<T>(&self, ctx: &AdminContext, action: &str, result: LifecycleResult<T>) -> LifecycleResult<T> {
        match &result {
            Ok(_) => {
                self.notifications
                    .show(ctx.email(), action, format!("{action}: done"), Severity::Success);
            }
            Err(e) => {
                self.notifications
                    .show(ctx.email(), format!("{action} failed"), e.to_string(), Severity::Error);
            }
        }
        result
    }
}

type SharedState<R, A> = Arc<LostFoundState<R, A>>;

/// Build the router. Every route is relative to where the caller nests it.
pub fn router<R, A>(state: LostFoundState<R, A>, auth: JwtAuth) -> Router
where
    R: ItemRepository + 'static,
    A: AdminRepository + 'static,
{
    let shared = Arc::new(state);
    let authenticated = middleware::from_fn_with_state(auth, jwt_auth_middleware);
    let admin_only = middleware::from_fn_with_state(Arc::clone(&shared), require_admin::<R, A>);

    let account = Router::new()
        .route("/me", get(me::<R, A>))
        .route("/notifications", get(list_notifications::<R, A>))
        .route("/notifications/{id}", delete(dismiss_notification::<R, A>))
        .route_layer(authenticated.clone());

    let admin = Router::new()
        .route("/items", get(admin_list_items::<R, A>))
        .route("/items/stats", get(admin_item_stats::<R, A>))
        .route("/items/{id}", delete(delete_item::<R, A>))
        .route("/items/{id}/approve", post(approve_item::<R, A>))
        .route("/items/{id}/status", put(change_status::<R, A>))
        .route("/items/{id}/transitions", get(transition_menu::<R, A>))
        .route("/items/{id}/candidates", get(link_candidates::<R, A>))
        .route("/items/{id}/link", post(link_item::<R, A>))
        .route("/items/{id}/unlink", post(unlink_item::<R, A>))
        .route("/consistency", get(check_consistency::<R, A>))
        .route("/consistency/repair", post(repair_consistency::<R, A>))
        .route("/admins", get(list_admins::<R, A>).post(grant_admin::<R, A>))
        .route("/admins/{email}", delete(revoke_admin::<R, A>))
        .route_layer(admin_only)
        .route_layer(authenticated.clone());

    Router::new()
        .route(
            "/items",
            get(list_items::<R, A>).merge(post(report_item::<R, A>).route_layer(authenticated)),
        )
        .route("/items/stats", get(item_stats::<R, A>))
        .merge(account)
        .nest("/admin", admin)
        .with_state(shared)
}

/// Turns JWT claims into an [`AdminContext`] or rejects with 403.
async fn require_admin<R, A>(
    State(state): State<SharedState<R, A>>,
    Extension(claims): Extension<JwtClaims>,
    mut request: Request,
    next: Next,
) -> Response
where
    R: ItemRepository + 'static,
    A: AdminRepository + 'static,
{
    let principal = Principal::from(&claims);
    match state.admins.authorize(&principal).await {
        Ok(ctx) => {
            request.extensions_mut().insert(ctx);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Items plus statistics of the whole view
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ItemListResponse {
    pub items: Vec<Item>,
    pub stats: ItemStats,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MeResponse {
    pub principal: Principal,
    pub is_admin: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ChangeStatus {
    pub status: ItemStatus,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LinkRequest {
    /// Approved, unlinked found item
    pub found_id: Uuid,
}

/// Browse approved items
#[utoipa::path(
    get,
    path = "/items",
    tag = "Items",
    params(ItemFilter),
    responses(
        (status = 200, description = "Approved items with public statistics", body = ItemListResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn list_items<R: ItemRepository, A: AdminRepository>(
    State(state): State<SharedState<R, A>>,
    Query(filter): Query<ItemFilter>,
) -> LifecycleResult<Json<ItemListResponse>> {
    let snapshot = state.engine.snapshot(View::Public).await?;
    Ok(Json(ItemListResponse {
        items: snapshot.filter(&filter),
        stats: snapshot.stats(),
    }))
}

/// Public statistics
#[utoipa::path(
    get,
    path = "/items/stats",
    tag = "Items",
    responses(
        (status = 200, description = "Statistics over approved items", body = ItemStats),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn item_stats<R: ItemRepository, A: AdminRepository>(
    State(state): State<SharedState<R, A>>,
) -> LifecycleResult<Json<ItemStats>> {
    let snapshot = state.engine.snapshot(View::Public).await?;
    Ok(Json(snapshot.stats()))
}

/// Report a lost or found item (requires sign-in)
#[utoipa::path(
    post,
    path = "/items",
    tag = "Items",
    request_body = CreateItem,
    responses(
        (status = 201, description = "Item submitted for approval", body = Item),
        (status = 400, response = BadRequestValidationResponse),
        (status = 401, response = UnauthorizedResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn report_item<R: ItemRepository, A: AdminRepository>(
    State(state): State<SharedState<R, A>>,
    Extension(claims): Extension<JwtClaims>,
    ValidatedJson(input): ValidatedJson<CreateItem>,
) -> LifecycleResult<impl IntoResponse> {
    let item = state
        .engine
        .report_item(&Principal::from(&claims), input)
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// Signed-in principal and admin flag
#[utoipa::path(
    get,
    path = "/me",
    tag = "Account",
    responses(
        (status = 200, description = "Current principal", body = MeResponse),
        (status = 401, response = UnauthorizedResponse)
    )
)]
async fn me<R: ItemRepository, A: AdminRepository>(
    State(state): State<SharedState<R, A>>,
    Extension(claims): Extension<JwtClaims>,
) -> Json<MeResponse> {
    let principal = Principal::from(&claims);
    let is_admin = state.admins.is_admin(&principal.email).await;
    Json(MeResponse {
        principal,
        is_admin,
    })
}

/// Pending notifications of the signed-in user
#[utoipa::path(
    get,
    path = "/notifications",
    tag = "Account",
    responses(
        (status = 200, description = "Notifications, oldest first", body = Vec<Notification>),
        (status = 401, response = UnauthorizedResponse)
    )
)]
async fn list_notifications<R: ItemRepository, A: AdminRepository>(
    State(state): State<SharedState<R, A>>,
    Extension(claims): Extension<JwtClaims>,
) -> Json<Vec<Notification>> {
    let principal = Principal::from(&claims);
    Json(state.notifications.list(&principal.email))
}

/// Dismiss a notification before it closes by itself
#[utoipa::path(
    delete,
    path = "/notifications/{id}",
    tag = "Account",
    params(
        ("id" = Uuid, Path, description = "Notification ID")
    ),
    responses(
        (status = 204, description = "Notification dismissed"),
        (status = 400, response = BadRequestUuidResponse),
        (status = 401, response = UnauthorizedResponse),
        (status = 404, response = NotFoundResponse)
    )
)]
async fn dismiss_notification<R: ItemRepository, A: AdminRepository>(
    State(state): State<SharedState<R, A>>,
    Extension(claims): Extension<JwtClaims>,
    UuidPath(id): UuidPath,
) -> Result<StatusCode, AppError> {
    let principal = Principal::from(&claims);
    if state.notifications.dismiss(&principal.email, id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("Notification not found: {}", id)))
    }
}

/// All items, filtered for an admin dashboard tab
#[utoipa::path(
    get,
    path = "/admin/items",
    tag = "Admin",
    params(ItemFilter),
    responses(
        (status = 200, description = "Items with statistics over all items", body = ItemListResponse),
        (status = 401, response = UnauthorizedResponse),
        (status = 403, response = ForbiddenResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn admin_list_items<R: ItemRepository, A: AdminRepository>(
    State(state): State<SharedState<R, A>>,
    Extension(_ctx): Extension<AdminContext>,
    Query(filter): Query<ItemFilter>,
) -> LifecycleResult<Json<ItemListResponse>> {
    let snapshot = state.engine.snapshot(View::Admin).await?;
    Ok(Json(ItemListResponse {
        items: snapshot.filter(&filter),
        stats: snapshot.stats(),
    }))
}

/// Statistics over all items
#[utoipa::path(
    get,
    path = "/admin/items/stats",
    tag = "Admin",
    responses(
        (status = 200, description = "Statistics over all items", body = ItemStats),
        (status = 401, response = UnauthorizedResponse),
        (status = 403, response = ForbiddenResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn admin_item_stats<R: ItemRepository, A: AdminRepository>(
    State(state): State<SharedState<R, A>>,
    Extension(_ctx): Extension<AdminContext>,
) -> LifecycleResult<Json<ItemStats>> {
    let snapshot = state.engine.snapshot(View::Admin).await?;
    Ok(Json(snapshot.stats()))
}

/// Approve a pending item
#[utoipa::path(
    post,
    path = "/admin/items/{id}/approve",
    tag = "Admin",
    params(
        ("id" = Uuid, Path, description = "Item ID")
    ),
    responses(
        (status = 200, description = "Item approved", body = Outcome),
        (status = 400, response = BadRequestUuidResponse),
        (status = 403, response = ForbiddenResponse),
        (status = 404, response = NotFoundResponse),
        (status = 409, response = ConflictResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn approve_item<R: ItemRepository, A: AdminRepository>(
    State(state): State<SharedState<R, A>>,
    Extension(ctx): Extension<AdminContext>,
    UuidPath(id): UuidPath,
) -> LifecycleResult<Json<Outcome>> {
    let snapshot = state.engine.snapshot(View::Admin).await?;
    let result = state.engine.approve(&ctx, &snapshot, id).await;
    Ok(Json(state.publish(&ctx, "Approve item", result)?))
}

/// Delete an item; a linked counterpart is unlinked first
#[utoipa::path(
    delete,
    path = "/admin/items/{id}",
    tag = "Admin",
    params(
        ("id" = Uuid, Path, description = "Item ID")
    ),
    responses(
        (status = 200, description = "Item deleted (or already absent)", body = Outcome),
        (status = 400, response = BadRequestUuidResponse),
        (status = 403, response = ForbiddenResponse),
        (status = 409, response = ConflictResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn delete_item<R: ItemRepository, A: AdminRepository>(
    State(state): State<SharedState<R, A>>,
    Extension(ctx): Extension<AdminContext>,
    UuidPath(id): UuidPath,
) -> LifecycleResult<Json<Outcome>> {
    let snapshot = state.engine.snapshot(View::Admin).await?;
    let result = state.engine.delete(&ctx, &snapshot, id).await;
    Ok(Json(state.publish(&ctx, "Delete item", result)?))
}

/// Request a status change
///
/// `lost -> returned` answers with the link candidates instead of writing.
#[utoipa::path(
    put,
    path = "/admin/items/{id}/status",
    tag = "Admin",
    params(
        ("id" = Uuid, Path, description = "Item ID")
    ),
    request_body = ChangeStatus,
    responses(
        (status = 200, description = "Status applied or counterpart required", body = StatusChange),
        (status = 400, response = BadRequestUuidResponse),
        (status = 403, response = ForbiddenResponse),
        (status = 404, response = NotFoundResponse),
        (status = 409, response = ConflictResponse),
        (status = 422, response = UnprocessableEntityResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn change_status<R: ItemRepository, A: AdminRepository>(
    State(state): State<SharedState<R, A>>,
    Extension(ctx): Extension<AdminContext>,
    UuidPath(id): UuidPath,
    Json(input): Json<ChangeStatus>,
) -> LifecycleResult<Json<StatusChange>> {
    let snapshot = state.engine.snapshot(View::Admin).await?;
    let result = state
        .engine
        .change_status(&ctx, &snapshot, id, input.status)
        .await;
    Ok(Json(state.publish(&ctx, "Change status", result)?))
}

/// Status edits offered for an item
#[utoipa::path(
    get,
    path = "/admin/items/{id}/transitions",
    tag = "Admin",
    params(
        ("id" = Uuid, Path, description = "Item ID")
    ),
    responses(
        (status = 200, description = "Offered transitions", body = TransitionMenu),
        (status = 403, response = ForbiddenResponse),
        (status = 404, response = NotFoundResponse)
    )
)]
async fn transition_menu<R: ItemRepository, A: AdminRepository>(
    State(state): State<SharedState<R, A>>,
    Extension(_ctx): Extension<AdminContext>,
    UuidPath(id): UuidPath,
) -> LifecycleResult<Json<TransitionMenu>> {
    let snapshot = state.engine.snapshot(View::Admin).await?;
    Ok(Json(state.engine.transition_menu(&snapshot, id)?))
}

/// Found items that may be linked to a lost item
#[utoipa::path(
    get,
    path = "/admin/items/{id}/candidates",
    tag = "Admin",
    params(
        ("id" = Uuid, Path, description = "Lost item ID")
    ),
    responses(
        (status = 200, description = "Eligible found items", body = Vec<Item>),
        (status = 403, response = ForbiddenResponse),
        (status = 404, response = NotFoundResponse),
        (status = 409, response = ConflictResponse)
    )
)]
async fn link_candidates<R: ItemRepository, A: AdminRepository>(
    State(state): State<SharedState<R, A>>,
    Extension(_ctx): Extension<AdminContext>,
    UuidPath(id): UuidPath,
) -> LifecycleResult<Json<Vec<Item>>> {
    let snapshot = state.engine.snapshot(View::Admin).await?;
    Ok(Json(state.engine.candidates(&snapshot, id)?))
}

/// Link a lost item with a found item, marking both returned
#[utoipa::path(
    post,
    path = "/admin/items/{id}/link",
    tag = "Admin",
    params(
        ("id" = Uuid, Path, description = "Lost item ID")
    ),
    request_body = LinkRequest,
    responses(
        (status = 200, description = "Items linked", body = Outcome),
        (status = 403, response = ForbiddenResponse),
        (status = 404, response = NotFoundResponse),
        (status = 409, response = ConflictResponse),
        (status = 422, response = UnprocessableEntityResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn link_item<R: ItemRepository, A: AdminRepository>(
    State(state): State<SharedState<R, A>>,
    Extension(ctx): Extension<AdminContext>,
    UuidPath(id): UuidPath,
    Json(input): Json<LinkRequest>,
) -> LifecycleResult<Json<Outcome>> {
    let snapshot = state.engine.snapshot(View::Admin).await?;
    let result = state.engine.link(&ctx, &snapshot, id, input.found_id).await;
    Ok(Json(state.publish(&ctx, "Link items", result)?))
}

/// Undo a link from either side
#[utoipa::path(
    post,
    path = "/admin/items/{id}/unlink",
    tag = "Admin",
    params(
        ("id" = Uuid, Path, description = "ID of either linked item")
    ),
    responses(
        (status = 200, description = "Items unlinked", body = Outcome),
        (status = 403, response = ForbiddenResponse),
        (status = 404, response = NotFoundResponse),
        (status = 409, response = ConflictResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn unlink_item<R: ItemRepository, A: AdminRepository>(
    State(state): State<SharedState<R, A>>,
    Extension(ctx): Extension<AdminContext>,
    UuidPath(id): UuidPath,
) -> LifecycleResult<Json<Outcome>> {
    let snapshot = state.engine.snapshot(View::Admin).await?;
    let result = state.engine.unlink(&ctx, &snapshot, id).await;
    Ok(Json(state.publish(&ctx, "Unlink items", result)?))
}

/// Report link inconsistencies
#[utoipa::path(
    get,
    path = "/admin/consistency",
    tag = "Admin",
    responses(
        (status = 200, description = "Consistency report", body = ConsistencyReport),
        (status = 403, response = ForbiddenResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn check_consistency<R: ItemRepository, A: AdminRepository>(
    State(state): State<SharedState<R, A>>,
    Extension(_ctx): Extension<AdminContext>,
) -> LifecycleResult<Json<ConsistencyReport>> {
    let snapshot = state.engine.snapshot(View::Admin).await?;
    Ok(Json(state.engine.check_consistency(&snapshot)?))
}

/// Roll inconsistent items back to their unlinked state
#[utoipa::path(
    post,
    path = "/admin/consistency/repair",
    tag = "Admin",
    responses(
        (status = 200, description = "Repair result", body = RepairOutcome),
        (status = 403, response = ForbiddenResponse),
        (status = 409, response = ConflictResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn repair_consistency<R: ItemRepository, A: AdminRepository>(
    State(state): State<SharedState<R, A>>,
    Extension(ctx): Extension<AdminContext>,
) -> LifecycleResult<Json<RepairOutcome>> {
    let snapshot = state.engine.snapshot(View::Admin).await?;
    let result = state.engine.repair_consistency(&ctx, &snapshot).await;
    Ok(Json(state.publish(&ctx, "Repair links", result)?))
}

/// Admin records, newest grant first
#[utoipa::path(
    get,
    path = "/admin/admins",
    tag = "Admin",
    responses(
        (status = 200, description = "Admins", body = Vec<AdminPrincipal>),
        (status = 403, response = ForbiddenResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn list_admins<R: ItemRepository, A: AdminRepository>(
    State(state): State<SharedState<R, A>>,
    Extension(_ctx): Extension<AdminContext>,
) -> LifecycleResult<Json<Vec<AdminPrincipal>>> {
    Ok(Json(state.admins.list().await?))
}

/// Grant admin privileges to an email
#[utoipa::path(
    post,
    path = "/admin/admins",
    tag = "Admin",
    request_body = GrantAdmin,
    responses(
        (status = 201, description = "Admin granted", body = AdminPrincipal),
        (status = 400, response = BadRequestValidationResponse),
        (status = 403, response = ForbiddenResponse),
        (status = 409, response = ConflictResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn grant_admin<R: ItemRepository, A: AdminRepository>(
    State(state): State<SharedState<R, A>>,
    Extension(ctx): Extension<AdminContext>,
    ValidatedJson(input): ValidatedJson<GrantAdmin>,
) -> LifecycleResult<impl IntoResponse> {
    let result = state.admins.grant(&ctx, &input.email).await;
    let admin = state.publish(&ctx, "Grant admin", result)?;
    Ok((StatusCode::CREATED, Json(admin)))
}

/// Revoke another admin's privileges
#[utoipa::path(
    delete,
    path = "/admin/admins/{email}",
    tag = "Admin",
    params(
        ("email" = String, Path, description = "Admin email")
    ),
    responses(
        (status = 204, description = "Admin revoked"),
        (status = 403, response = ForbiddenResponse),
        (status = 404, response = NotFoundResponse),
        (status = 409, response = ConflictResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn revoke_admin<R: ItemRepository, A: AdminRepository>(
    State(state): State<SharedState<R, A>>,
    Extension(ctx): Extension<AdminContext>,
    Path(email): Path<String>,
) -> LifecycleResult<StatusCode> {
    let result = state.admins.revoke(&ctx, &email).await;
    state.publish(&ctx, "Revoke admin", result)?;
    Ok(StatusCode::NO_CONTENT)
}
