//! OpenAPI documentation for the file routes, served as JSON at `/openapi.json` and rendered
//! with Scalar at `/docs`.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::api;
use crate::errors::ErrorBody;

/// Bearer token scheme referenced by every file route.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "BearerAuth".to_string(),
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .description(Some(
                            "Only enforced when `auth.enabled` is set. Send the configured token in the `Authorization` header:\n\n\
                            ```\nAuthorization: Bearer YOUR_TOKEN\n```",
                        ))
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "filecdn",
        description = "Store, list, fetch and delete files by name on top of a blob storage backend."
    ),
    paths(
        api::handlers::home::home,
        api::handlers::files::upload_file,
        api::handlers::files::download_file,
        api::handlers::files::list_files,
        api::handlers::files::delete_file,
    ),
    components(schemas(
        api::models::files::UploadForm,
        api::models::files::UploadResponse,
        api::models::files::MessageResponse,
        api::models::files::FileListResponse,
        api::models::files::FileListing,
        api::models::files::Paging,
        ErrorBody,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "files", description = "Upload, download, list and delete stored files"),
        (name = "home", description = "Landing page"),
    )
)]
pub struct ApiDoc;
