//! HTML for the chat page.
//!
//! Message bubbles are plain string templates with a `{{MSG}}` placeholder.
//! History is rendered by parity: even positions are user bubbles, odd
//! positions are bot bubbles. Message text is HTML-escaped before it is
//! substituted.

use crate::models::Turn;

pub const PAGE_TITLE: &str = "Chat with multiple PDFs";
pub const PAGE_ICON: &str = "📚";

/// Placeholder replaced by the escaped message text.
pub const MSG_PLACEHOLDER: &str = "{{MSG}}";

pub const CSS: &str = r#"<style>
body { font-family: sans-serif; margin: 0; display: flex; min-height: 100vh; }
.sidebar { width: 18rem; padding: 1.5rem; background: #f0f2f6; }
.main { flex: 1; padding: 1.5rem 3rem; max-width: 48rem; }
.status { padding: .75rem 1rem; border-radius: .5rem; margin: 1rem 0; }
.status.ok { background: #d4edda; color: #155724; }
.status.err { background: #f8d7da; color: #721c24; }
.chat-message { padding: 1.5rem; border-radius: .5rem; margin-bottom: 1rem; display: flex; }
.chat-message.user { background-color: #2b313e; }
.chat-message.bot { background-color: #475063; }
.chat-message .avatar { width: 15%; font-size: 2.5rem; text-align: center; }
.chat-message .message { width: 85%; padding: 0 1.5rem; color: #fff; white-space: pre-wrap; }
</style>"#;

pub const USER_TEMPLATE: &str = r#"<div class="chat-message user">
    <div class="avatar">🧑</div>
    <div class="message">{{MSG}}</div>
</div>"#;

pub const BOT_TEMPLATE: &str = r#"<div class="chat-message bot">
    <div class="avatar">🤖</div>
    <div class="message">{{MSG}}</div>
</div>"#;

/// Status line shown under the upload form.
pub enum Status<'a> {
    None,
    Processed,
    Failed(&'a str),
}

fn bubble(template: &str, message: &str) -> String {
    template.replace(MSG_PLACEHOLDER, &html_escape::encode_text(message))
}

/// Renders every turn as a chat bubble, alternating user and bot by position.
pub fn render_history(turns: &[Turn]) -> String {
    turns
        .iter()
        .enumerate()
        .map(|(i, turn)| {
            let template = if i % 2 == 0 { USER_TEMPLATE } else { BOT_TEMPLATE };
            bubble(template, &turn.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Renders the full chat page.
pub fn render_page(history: Option<&[Turn]>, status: Status<'_>) -> String {
    let status_html = match status {
        Status::None => String::new(),
        Status::Processed => r#"<div class="status ok">Processing Complete!</div>"#.to_string(),
        Status::Failed(message) => format!(
            r#"<div class="status err">{}</div>"#,
            html_escape::encode_text(message)
        ),
    };
    let history_html = history.map(render_history).unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{title}</title>
<link rel="icon" href="data:image/svg+xml,<svg xmlns=%22http://www.w3.org/2000/svg%22 viewBox=%220 0 100 100%22><text y=%22.9em%22 font-size=%2290%22>{icon}</text></svg>">
{css}
</head>
<body>
<aside class="sidebar">
<h3>Your documents</h3>
<form action="/process" method="post" enctype="multipart/form-data">
<label for="pdfs">Upload your PDFs here and click on 'Process'</label>
<input id="pdfs" type="file" name="pdfs" accept="application/pdf" multiple>
<button type="submit">Process</button>
</form>
{status}
</aside>
<main class="main">
<h1>{title}</h1>
<form action="/ask" method="post">
<label for="question">Ask a question about your documents:</label>
<input id="question" type="text" name="question" autofocus>
</form>
{history}
</main>
</body>
</html>
"#,
        title = PAGE_TITLE,
        icon = PAGE_ICON,
        css = CSS,
        status = status_html,
        history = history_html,
    )
}
