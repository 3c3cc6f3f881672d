use axum::response::Html;

/// GET /
/// The single page: picker, preview, analyze button and feedback area.
pub async fn index_handler() -> Html<&'static str> {
    Html(include_str!("../../static/index.html"))
}
