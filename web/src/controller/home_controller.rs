use axum::response::Html;

/// GET the demo landing page
///
/// The page ships with an empty placeholder element; eligible requests see
/// it filled with the notification message by the response middleware.
pub async fn index() -> Html<&'static str> {
    Html(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <title>Demo Home</title>
</head>
<body>
  <h1>Demo Home</h1>
  <p>Welcome to the dynamic notification demo.</p>
  <div id="dynamic_notification"></div>
  <p>Head over to the <a href="/about">about page</a> to read more.</p>
</body>
</html>
"#,
    )
}

/// GET the about page
///
/// Carries the same placeholder element as the landing page, but `/about`
/// is an excluded path, so the element always stays empty here.
pub async fn about() -> Html<&'static str> {
    Html(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <title>About</title>
</head>
<body>
  <h1>About</h1>
  <p>This demo decorates finished responses with a notification message,
  depending on who is asking, from where, and when.</p>
  <div id="dynamic_notification"></div>
</body>
</html>
"#,
    )
}
