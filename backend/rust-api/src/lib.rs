use axum::{
    extract::Request,
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, post, put, MethodRouter},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod quiz;
pub mod services;
pub mod stores;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use services::AppState;

use middlewares::rate_limit::{self, RateLimitRule};

type SharedState = Arc<AppState>;

/// CSP middleware adds Content-Security-Policy header to all responses
async fn csp_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
    );
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    response
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-requested-with"),
        ])
}

pub fn create_router(app_state: SharedState) -> Router {
    let cors = cors_layer(&app_state.config.cors_origins);

    Router::new()
        // Public endpoints (no auth required)
        .route("/health", get(handlers::health_check))
        // Metrics endpoint with Basic Auth protection
        .route(
            "/metrics",
            get(handlers::metrics_handler).layer(middleware::from_fn_with_state(
                app_state.clone(),
                handlers::metrics_auth_middleware,
            )),
        )
        .nest("/api/auth", auth_routes(&app_state))
        .nest("/api/quiz", quiz_routes(&app_state))
        .nest("/api/kana", kana_routes(&app_state))
        .nest("/api/vocabulary", vocabulary_routes(&app_state))
        .nest("/api/scores", require_auth(score_routes(), &app_state))
        .nest("/api/user", require_auth(preference_routes(), &app_state))
        .nest("/api/admin", admin_routes(&app_state))
        .with_state(app_state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn(
                    middlewares::metrics::metrics_middleware,
                ))
                .layer(middleware::from_fn(
                    middlewares::trace::trace_context_middleware,
                ))
                .layer(CompressionLayer::new())
                .layer(cors)
                .layer(middleware::from_fn(csp_middleware)),
        )
}

fn rate_limited(
    router: Router<SharedState>,
    state: &SharedState,
    rule: RateLimitRule,
) -> Router<SharedState> {
    router.route_layer(middleware::from_fn_with_state(
        (state.clone(), rule),
        rate_limit::rate_limit_middleware,
    ))
}

fn require_auth(router: Router<SharedState>, state: &SharedState) -> Router<SharedState> {
    router.route_layer(middleware::from_fn_with_state(
        state.clone(),
        middlewares::auth::auth_middleware,
    ))
}

/// JWT plus admin flag, for single methods on otherwise public paths.
fn admin_only(route: MethodRouter<SharedState>, state: &SharedState) -> MethodRouter<SharedState> {
    route
        .route_layer(middleware::from_fn(
            middlewares::auth::admin_guard_middleware,
        ))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            middlewares::auth::auth_middleware,
        ))
}

fn auth_routes(state: &SharedState) -> Router<SharedState> {
    let limited = |path: &str, route: MethodRouter<SharedState>, rule| {
        rate_limited(Router::new().route(path, route), state, rule)
    };

    let public_routes = limited("/register", post(handlers::auth::register), rate_limit::REGISTER)
        .merge(limited("/login", post(handlers::auth::login), rate_limit::LOGIN))
        .merge(limited(
            "/verify-mfa",
            post(handlers::auth::verify_mfa),
            rate_limit::MFA_VERIFY,
        ))
        .merge(limited(
            "/resend-mfa",
            post(handlers::auth::resend_mfa),
            rate_limit::MFA_RESEND,
        ))
        .merge(limited(
            "/confirm-email",
            post(handlers::auth::confirm_email),
            rate_limit::CONFIRM_EMAIL,
        ))
        .merge(limited(
            "/resend-verification",
            post(handlers::auth::resend_verification),
            rate_limit::RESEND_VERIFICATION,
        ));

    let protected_routes = require_auth(Router::new().route("/me", get(handlers::auth::me)), state);

    public_routes.merge(protected_routes)
}

fn quiz_routes(state: &SharedState) -> Router<SharedState> {
    let gameplay = Router::new()
        .route("/random", get(handlers::quiz::random_question))
        .route("/options", get(handlers::quiz::options))
        .route("/check", post(handlers::quiz::check));

    rate_limited(gameplay, state, rate_limit::QUIZ)
        .merge(rate_limited(
            Router::new().route("/hint", post(handlers::quiz::hint)),
            state,
            rate_limit::HINT,
        ))
        .merge(rate_limited(
            Router::new().route("/tts", post(handlers::quiz::tts)),
            state,
            rate_limit::TTS,
        ))
}

fn kana_routes(state: &SharedState) -> Router<SharedState> {
    let kana = Router::new()
        .route("/", get(handlers::kana::list))
        .route("/random", get(handlers::kana::random));
    rate_limited(kana, state, rate_limit::QUIZ)
}

fn vocabulary_routes(state: &SharedState) -> Router<SharedState> {
    Router::new()
        .route(
            "/",
            get(handlers::vocabulary::list)
                .merge(admin_only(post(handlers::vocabulary::create), state)),
        )
        .route("/tags", get(handlers::vocabulary::tags))
        .route("/random", get(handlers::vocabulary::random))
        .route(
            "/{id}",
            get(handlers::vocabulary::get).merge(admin_only(
                put(handlers::vocabulary::update).delete(handlers::vocabulary::delete),
                state,
            )),
        )
}

fn score_routes() -> Router<SharedState> {
    Router::new()
        .route("/update", post(handlers::scores::update))
        .route("/today", get(handlers::scores::today))
        .route("/me", get(handlers::scores::history))
        .route("/best", get(handlers::scores::best))
}

fn preference_routes() -> Router<SharedState> {
    Router::new().route(
        "/preferences",
        get(handlers::preferences::get_preferences).put(handlers::preferences::update_preferences),
    )
}

fn admin_routes(state: &SharedState) -> Router<SharedState> {
    Router::new()
        // User management
        .route("/users", get(handlers::admin::list_users))
        .route("/users/{id}", delete(handlers::admin::delete_user))
        .route(
            "/users/{id}/resend-verification",
            post(handlers::admin::resend_user_verification),
        )
        // Invitations
        .route(
            "/invitations",
            get(handlers::admin::list_invitations).post(handlers::admin::create_invitation),
        )
        .route(
            "/invitations/{id}",
            delete(handlers::admin::delete_invitation),
        )
        .route(
            "/invitations/{id}/resend",
            post(handlers::admin::resend_invitation),
        )
        // AI caches
        .route("/cache/stats", get(handlers::admin::cache_stats))
        .route(
            "/cache/hints",
            get(handlers::admin::list_hints).delete(handlers::admin::clear_hints),
        )
        .route(
            "/cache/hints/{id}",
            put(handlers::admin::update_hint).delete(handlers::admin::delete_hint),
        )
        .route(
            "/cache/tts",
            get(handlers::admin::list_tts).delete(handlers::admin::clear_tts),
        )
        .route("/cache/tts/{id}", delete(handlers::admin::delete_tts))
        .route("/cache/tts/{id}/audio", get(handlers::admin::tts_audio))
        .route_layer(middleware::from_fn(
            middlewares::auth::admin_guard_middleware,
        ))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            middlewares::auth::auth_middleware,
        ))
}
