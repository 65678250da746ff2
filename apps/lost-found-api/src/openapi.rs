//! OpenAPI documentation configuration

use utoipa::OpenApi;

/// Combined OpenAPI documentation for all APIs
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Lost & Found API",
        version = "0.1.0",
        description = "School lost and found: reporting, approval, status changes and linking of lost and found items",
        license(name = "MIT")
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development server")
    ),
    nest(
        (path = "/api", api = domain_lost_found::ApiDoc)
    ),
    tags(
        (name = "Items", description = "Public browsing and reporting"),
        (name = "Account", description = "Signed-in user and notifications"),
        (name = "Admin", description = "Moderation, linking and admin management")
    )
)]
pub struct ApiDoc;
