use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::{
    server::AppState,
    transport::{
        middleware::{add_response_headers, check_auth},
        routes::{info, player, resume},
        websocket_server::websocket_handler,
    },
};

const API_V1: &str = "/v1";

pub fn router(state: Arc<AppState>) -> Router {
    let v1_routes = Router::new()
        .route("/info", get(info::get_info))
        .route("/players", get(player::get_players))
        .route(
            "/players/{destination}",
            get(player::get_player)
                .post(player::start_player)
                .patch(player::update_player)
                .delete(player::destroy_player),
        )
        .route("/players/{destination}/skip", post(player::skip_player))
        .route("/players/{destination}/forward", post(player::forward_player))
        .route("/players/{destination}/rewind", post(player::rewind_player))
        .route(
            "/resume/{media_id}",
            get(resume::get_resume).delete(resume::clear_resume),
        )
        .route("/websocket", get(websocket_handler));

    Router::new()
        .nest(API_V1, v1_routes)
        .layer(middleware::from_fn_with_state(state.clone(), check_auth))
        .layer(middleware::from_fn(add_response_headers))
        .with_state(state)
}
