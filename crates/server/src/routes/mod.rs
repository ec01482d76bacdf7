use axum::Router;

use crate::state::AppState;

pub mod assessments;
pub mod attempts;
pub mod disputes;
pub mod domains;
pub mod groups;
pub mod health;
pub mod jobs;
pub mod results;
pub mod skills;
pub mod sources;
pub mod users;

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .merge(health::router())
        .merge(users::router())
        .merge(groups::router())
        .merge(domains::router())
        .merge(skills::router())
        .merge(sources::router())
        .merge(assessments::router())
        .merge(attempts::router())
        .merge(results::router())
        .merge(disputes::router())
        .merge(jobs::router());

    Router::new().nest("/api", api).with_state(state)
}
