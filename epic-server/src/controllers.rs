//! Page and upload handlers

use axum_extra::extract::cookie::{Cookie, CookieJar};
use epic::prelude::*;
use epic::UploadSummary;
use epic_http::axum::extract::multipart::MultipartRejection;
use serde_json::json;

/// Cookie counting visits to the home page.
pub const VISITS_COOKIE: &str = "epic_visits";

pub async fn home(
    State(state): State<EpicState>,
    jar: CookieJar,
) -> Result<(CookieJar, Html<String>), HttpError> {
    let visits = jar
        .get(VISITS_COOKIE)
        .and_then(|cookie| cookie.value().parse::<u64>().ok())
        .unwrap_or(0)
        + 1;

    let html = state.render(
        "index",
        json!({
            "title": "Home Page",
            "description": "This is the main homepage created by Epic framework.",
            "visits": visits,
        }),
    )?;

    let cookie = Cookie::build((VISITS_COOKIE, visits.to_string()))
        .path("/")
        .http_only(true)
        .build();
    Ok((jar.add(cookie), html))
}

pub async fn page(State(state): State<EpicState>) -> Result<Html<String>, HttpError> {
    state.render(
        "page",
        json!({
            "title": "Sample Page",
            "description": "This is a sample page created by Epic framework.",
            "layout": "page",
        }),
    )
}

pub async fn post(State(state): State<EpicState>) -> Result<Html<String>, HttpError> {
    state.render(
        "post",
        json!({
            "title": "Sample Post",
            "description": "This is a single post created by Epic framework.",
            "layout": "page",
        }),
    )
}

/// Store every uploaded file and answer with what was saved.
pub async fn upload(
    State(state): State<EpicState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadSummary>, HttpError> {
    let multipart = multipart.map_err(|rejection| HttpError::bad_request(rejection.body_text()))?;
    let summary = store_uploads(state.upload_dir(), multipart).await?;
    Ok(Json(summary))
}
