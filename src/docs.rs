use crate::modules::media::dto::{MediaResponse, SubmitVideoResponse, VideoStatusResponse};
use crate::modules::media::model::{EncodingStatus, MediaType};
use crate::workers::encoding_queue::QueueSnapshot;
use utoipa::Modify;
use utoipa::OpenApi;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::modules::media::handler::upload_video_hls,
        crate::modules::media::handler::upload_video,
        crate::modules::media::handler::get_video_status,
        crate::modules::media::handler::get_queue,
    ),
    components(
        schemas(
            SubmitVideoResponse,
            MediaResponse,
            VideoStatusResponse,
            QueueSnapshot,
            EncodingStatus,
            MediaType,
        )
    ),
    tags(
        (name = "Media", description = "Video upload, HLS encoding and status")
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
