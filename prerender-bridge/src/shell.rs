// Static shell served when prerendering is skipped or fails

use crate::HttpResponse;
use std::path::PathBuf;
use tracing::warn;

/// Minimal document used when the shell file cannot be read
pub const BUILTIN_SHELL: &str = "<!doctype html>\n<html>\n<head><meta charset=\"utf-8\"><base href=\"/\"></head>\n<body><app-root></app-root></body>\n</html>\n";

/// The client-rendering shell document
#[derive(Debug, Clone)]
pub enum StaticShell {
    /// Read from disk on every response so rebuilt shells are picked up
    File(PathBuf),
    Inline(String),
}

impl StaticShell {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    pub fn inline(html: impl Into<String>) -> Self {
        Self::Inline(html.into())
    }

    pub async fn html(&self) -> String {
        match self {
            Self::Inline(html) => html.clone(),
            Self::File(path) => match tokio::fs::read_to_string(path).await {
                Ok(html) => html,
                Err(e) => {
                    warn!(path = %path.display(), "shell file unreadable, using built-in shell: {}", e);
                    BUILTIN_SHELL.to_string()
                }
            },
        }
    }

    /// 200 response carrying the shell, never cached by the browser
    pub async fn response(&self) -> HttpResponse {
        HttpResponse::html(200, self.html().await).with_header("Cache-Control", "no-cache")
    }
}

impl Default for StaticShell {
    fn default() -> Self {
        Self::Inline(BUILTIN_SHELL.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_shell() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.html");
        std::fs::write(&path, "<app-root>loading</app-root>").unwrap();

        let response = StaticShell::file(&path).response().await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body_text(), "<app-root>loading</app-root>");
        assert_eq!(response.header("cache-control"), Some("no-cache"));
    }

    #[tokio::test]
    async fn test_missing_file_uses_builtin_shell() {
        let shell = StaticShell::file("/nonexistent/index.html");
        let response = shell.response().await;
        assert_eq!(response.status, 200);
        assert!(response.body_text().contains("<app-root>"));
    }

    #[tokio::test]
    async fn test_inline_shell() {
        assert_eq!(StaticShell::inline("<p>shell</p>").html().await, "<p>shell</p>");
    }
}
