//! Document rendering and factory notification collaborators.

pub mod notifier;
pub mod renderer;

pub use notifier::{
    HttpMailNotifier, IDEMPOTENCY_HEADER, InMemoryNotifier, LoggingNotifier, Notifier,
    OrderMessage,
};
pub use renderer::{DocumentRenderer, FileDocumentRenderer, InMemoryDocumentRenderer, render_html};

/// Escapes text for inclusion in HTML element content or attribute values.
pub(crate) fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
