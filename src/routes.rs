use crate::{
    chat::{
        chat_dto::{
            ConversationResponse, CreateConversationRequest, MessageResponse, Pagination,
            ParticipantResponse, SendMessageRequest, SenderInfo, UnreadCountResponse,
        },
        chat_handlers,
        chat_models::{Attachment, LastMessage, MessageType, ParticipantRole},
    },
    middleware::{admin_middleware, auth_middleware},
    state::AppState,
    stats::{
        stats_dto::TimelineResponse,
        stats_handlers,
        stats_models::{BucketCount, Collection, OverviewStats, Period, StatusCount},
    },
};
use axum::http::{
    header::{AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use axum::{
    middleware,
    routing::{delete, get},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::chat::chat_handlers::create_conversation,
        crate::chat::chat_handlers::get_conversations,
        crate::chat::chat_handlers::get_messages,
        crate::chat::chat_handlers::send_message,
        crate::chat::chat_handlers::close_conversation,
        crate::chat::chat_handlers::delete_message,
        crate::chat::chat_handlers::get_unread_count,
        crate::chat::chat_handlers::admin_get_conversations,
        crate::stats::stats_handlers::get_overview,
        crate::stats::stats_handlers::get_timeline,
        crate::websocket::handler::ws_handler,
    ),
    components(
        schemas(
            CreateConversationRequest,
            SendMessageRequest,
            ConversationResponse,
            ParticipantResponse,
            ParticipantRole,
            LastMessage,
            MessageResponse,
            SenderInfo,
            MessageType,
            Attachment,
            UnreadCountResponse,
            Pagination,
            OverviewStats,
            StatusCount,
            TimelineResponse,
            BucketCount,
            Collection,
            Period,
        )
    ),
    tags(
        (name = "chat", description = "Patient/doctor messaging endpoints"),
        (name = "admin", description = "Moderation and reporting endpoints"),
        (name = "realtime", description = "WebSocket push channel")
    ),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::Http::new(
                        utoipa::openapi::security::HttpAuthScheme::Bearer,
                    ),
                ),
            )
        }
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) if origin != "*" => Some(value),
            _ => {
                tracing::warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true)
}

pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.allowed_origins);

    let chat_routes = Router::new()
        .route(
            "/conversations",
            get(chat_handlers::get_conversations).post(chat_handlers::create_conversation),
        )
        .route("/conversations/:id", delete(chat_handlers::close_conversation))
        .route(
            "/conversations/:id/messages",
            get(chat_handlers::get_messages).post(chat_handlers::send_message),
        )
        .route("/messages/:id", delete(chat_handlers::delete_message))
        .route("/unread-count", get(chat_handlers::get_unread_count))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let admin_routes = Router::new()
        .route("/conversations", get(chat_handlers::admin_get_conversations))
        .route("/stats/overview", get(stats_handlers::get_overview))
        .route("/stats/timeline", get(stats_handlers::get_timeline))
        .route_layer(middleware::from_fn(admin_middleware))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let ws_routes = Router::new()
        .route("/ws", get(crate::websocket::ws_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let api_routes = Router::new()
        .nest("/chat", chat_routes)
        .nest("/admin", admin_routes)
        .merge(ws_routes);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
