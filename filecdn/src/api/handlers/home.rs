use axum::response::Html;

const LANDING_PAGE: &str = r#"<html>
  <head>
    <title>filecdn</title>
    <style>
      body {
        font-family: Arial, sans-serif;
        text-align: center;
      }
      h1 {
        color: #2F80ED;
      }
      p {
        font-size: 20px;
      }
    </style>
  </head>
  <body>
    <h1>Welcome!</h1>
    <p>This is a small file CDN: upload, download, list and delete files by name.</p>
    <p>Check out the docs to get started.</p>
    <a href="/docs">Documentation</a>
  </body>
</html>
"#;

/// Static landing page pointing at the interactive API docs.
#[utoipa::path(
    get,
    path = "/",
    tag = "home",
    summary = "Landing page",
    responses((status = 200, description = "HTML landing page", content_type = "text/html", body = String))
)]
pub async fn home() -> Html<&'static str> {
    Html(LANDING_PAGE)
}
