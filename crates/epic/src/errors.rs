//! HTTP errors and the terminal error handler
//!
//! Handlers fail by returning an [`HttpError`]. Its response carries the
//! error as an extension; the error middleware installed by `load_routes`
//! picks it up and hands it to the application's [`ErrorRenderer`].
//! Plain-text failures produced elsewhere (extractor rejections, timeouts,
//! caught panics) are turned into an [`HttpError`] on the way out.

use crate::state::{EpicState, RuntimeMode};
use crate::view::ViewError;
use axum::{
    body::to_bytes,
    extract::{Request, State},
    http::{header, Method, StatusCode, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::{json, Value};
use std::any::Any;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Largest failure body read back into an [`HttpError`] message.
const MAX_ERROR_BODY: usize = 16 * 1024;

/// View rendered by [`render_error_view`].
pub const ERROR_VIEW: &str = "error";

/// A request-time failure with an HTTP status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct HttpError {
    pub status: StatusCode,
    pub message: String,
    /// Extra diagnostic text, shown outside production only
    pub detail: Option<String>,
}

impl HttpError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            detail: None,
        }
    }

    /// Error whose message is the status's reason phrase.
    pub fn from_status(status: StatusCode) -> Self {
        Self::new(status, status.canonical_reason().unwrap_or("Unknown Error"))
    }

    pub fn not_found() -> Self {
        Self::from_status(StatusCode::NOT_FOUND)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn to_json(&self) -> Value {
        let mut value = json!({
            "status": self.status.as_u16(),
            "message": self.message,
        });
        if let Some(detail) = &self.detail {
            value["detail"] = Value::String(detail.clone());
        }
        value
    }
}

impl From<ViewError> for HttpError {
    fn from(err: ViewError) -> Self {
        let detail = std::error::Error::source(&err).map(ToString::to_string);
        let error = HttpError::internal(err.to_string());
        match detail {
            Some(detail) => error.with_detail(detail),
            None => error,
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.message.clone()).into_response();
        response.extensions_mut().insert(Arc::new(self));
        response
    }
}

/// Request details handed to the error renderer.
#[derive(Clone)]
pub struct ErrorContext {
    pub state: EpicState,
    pub method: Method,
    pub uri: Uri,
}

/// Turns an [`HttpError`] into the response sent to the client.
pub type ErrorRenderer = Arc<dyn Fn(&HttpError, &ErrorContext) -> Response + Send + Sync>;

/// Wrap a function as an [`ErrorRenderer`].
pub fn error_renderer<F>(render: F) -> ErrorRenderer
where
    F: Fn(&HttpError, &ErrorContext) -> Response + Send + Sync + 'static,
{
    Arc::new(render)
}

/// `{ message, error, title }` for the error view. `error` is empty in
/// production.
pub fn error_view_data(err: &HttpError, mode: RuntimeMode) -> Value {
    let error = if mode.is_production() {
        json!({})
    } else {
        err.to_json()
    };
    json!({
        "message": err.message,
        "error": error,
        "title": err.message,
    })
}

/// Default renderer: the theme's `error` view with the error's status.
pub fn render_error_view(err: &HttpError, ctx: &ErrorContext) -> Response {
    render_error_view_with(err, ctx, Value::Null)
}

/// Like [`render_error_view`], with `extra` merged over the view data
/// (`title`, `layout`, ...).
pub fn render_error_view_with(err: &HttpError, ctx: &ErrorContext, extra: Value) -> Response {
    let mut data = error_view_data(err, ctx.state.mode());
    if let (Value::Object(data), Value::Object(extra)) = (&mut data, extra) {
        data.extend(extra);
    }

    match ctx.state.render(ERROR_VIEW, data) {
        Ok(html) => (err.status, html).into_response(),
        Err(render_err) => {
            error!(
                "Failed to render error view for {} {}: {}",
                ctx.method, ctx.uri, render_err
            );
            (err.status, err.message.clone()).into_response()
        }
    }
}

/// 404 for anything no route or static file answered.
pub async fn not_found() -> HttpError {
    HttpError::not_found()
}

/// Routes every failed response through the installed renderer.
pub(crate) async fn error_middleware(
    State(state): State<EpicState>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    let response = next.run(request).await;

    let Some(renderer) = state.error_renderer().cloned() else {
        return response;
    };
    let carried = response.extensions().get::<Arc<HttpError>>().cloned();
    let err = match carried {
        Some(err) => err,
        None if is_unhandled_failure(&response) => Arc::new(error_from_response(response).await),
        None => return response,
    };

    if err.status.is_server_error() {
        warn!("{} {} failed: {}", method, uri, err);
    } else {
        debug!("{} {} -> {}", method, uri, err.status);
    }

    let ctx = ErrorContext { state, method, uri };
    renderer(&err, &ctx)
}

/// A 4xx/5xx with an empty or plain-text body. Responses a handler built
/// deliberately (HTML, JSON) are passed through.
fn is_unhandled_failure(response: &Response) -> bool {
    let status = response.status();
    if !status.is_client_error() && !status.is_server_error() {
        return false;
    }
    match response.headers().get(header::CONTENT_TYPE) {
        None => true,
        Some(value) => value
            .to_str()
            .map(|v| v.starts_with("text/plain"))
            .unwrap_or(false),
    }
}

/// The response's text becomes the message; an empty body falls back to
/// the status's reason phrase.
async fn error_from_response(response: Response) -> HttpError {
    let status = response.status();
    let message = match to_bytes(response.into_body(), MAX_ERROR_BODY).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).trim().to_string(),
        Err(e) => {
            debug!("Discarding unreadable error body: {}", e);
            String::new()
        }
    };

    if message.is_empty() {
        HttpError::from_status(status)
    } else {
        HttpError::new(status, message)
    }
}

/// Response for a panicking handler: a 500 carrying the panic message as
/// detail, rendered like any other [`HttpError`].
pub(crate) fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else {
        "unknown panic payload".to_string()
    };
    error!("Request handler panicked: {}", detail);

    HttpError::from_status(StatusCode::INTERNAL_SERVER_ERROR)
        .with_detail(detail)
        .into_response()
}
