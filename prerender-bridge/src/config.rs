// Configuration for the prerendering bridge

use crate::matcher::{ExclusionRuleSet, ServerRoute, UrlMatcher};
use crate::worker::WorkerCommand;
use prerender_config::{ConfigValidator, Validate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Prerendering options, the `[prerender]` table of the host config
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrerenderConfig {
    /// SPA source folder; dev process working directory
    pub source_path: PathBuf,

    /// Built browser assets served as static files
    pub static_root: PathBuf,

    /// Shell document inside `static_root`
    pub shell_file: String,

    /// Paths never prerendered (first match wins)
    pub exclude_urls: Vec<String>,

    pub server_routes: Vec<ServerRoute>,

    /// Build/watch command run in development
    pub dev_command: Option<String>,

    /// Patterns recognising the dev server ready line
    pub cli_regexes: Vec<String>,

    /// Poll this URL for readiness instead of scraping console output
    pub ready_probe_url: Option<String>,

    /// Extra environment for the dev process
    pub dev_env: HashMap<String, String>,

    pub startup_timeout_secs: u64,

    pub render_timeout_ms: u64,

    /// Production render module, relative to `source_path` unless absolute
    pub boot_module_path: Option<PathBuf>,

    pub node_path: PathBuf,

    /// Replaces the Node.js bootstrap: program and arguments of a custom
    /// render worker speaking the same line protocol
    pub worker_command: Vec<String>,

    pub dev_cache_capacity: usize,
}

impl Default for PrerenderConfig {
    fn default() -> Self {
        Self {
            source_path: PathBuf::from("ClientApp"),
            static_root: PathBuf::from("ClientApp/dist/browser"),
            shell_file: "index.html".to_string(),
            exclude_urls: vec!["/sockjs-node".to_string()],
            server_routes: vec![ServerRoute::catch_all()],
            dev_command: Some("npm run build:ssr".to_string()),
            cli_regexes: vec![r"Local\:\s+(?<openbrowser>https?\:\/\/(.+))".to_string()],
            ready_probe_url: None,
            dev_env: HashMap::new(),
            startup_timeout_secs: 120,
            render_timeout_ms: 5000,
            boot_module_path: Some(PathBuf::from("dist/server/main.mjs")),
            node_path: PathBuf::from("node"),
            worker_command: Vec::new(),
            dev_cache_capacity: 256,
        }
    }
}

impl PrerenderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_path = path.into();
        self
    }

    pub fn with_static_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.static_root = path.into();
        self
    }

    pub fn with_dev_command(mut self, command: impl Into<String>) -> Self {
        self.dev_command = Some(command.into());
        self
    }

    pub fn with_boot_module(mut self, path: impl Into<PathBuf>) -> Self {
        self.boot_module_path = Some(path.into());
        self
    }

    pub fn with_node_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.node_path = path.into();
        self
    }

    /// Replace the exclusion list
    pub fn with_exclusions<S: Into<String>>(mut self, urls: impl IntoIterator<Item = S>) -> Self {
        self.exclude_urls = urls.into_iter().map(Into::into).collect();
        self
    }

    pub fn exclude_url(mut self, url: impl Into<String>) -> Self {
        self.exclude_urls.push(url.into());
        self
    }

    pub fn with_worker_command<S: Into<String>>(
        mut self,
        command: impl IntoIterator<Item = S>,
    ) -> Self {
        self.worker_command = command.into_iter().map(Into::into).collect();
        self
    }

    /// Command that starts the production render worker
    pub fn worker(&self) -> WorkerCommand {
        match self.worker_command.split_first() {
            Some((program, args)) => WorkerCommand {
                program: PathBuf::from(program),
                args: args.to_vec(),
            },
            None => WorkerCommand::node(&self.node_path),
        }
    }

    pub fn with_render_timeout(mut self, timeout: Duration) -> Self {
        self.render_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout_secs = timeout.as_secs();
        self
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_millis(self.render_timeout_ms)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    /// Full path of the shell document
    pub fn shell_path(&self) -> PathBuf {
        self.static_root.join(&self.shell_file)
    }

    /// Compile exclusions and server routes
    pub fn matcher(&self) -> crate::Result<UrlMatcher> {
        UrlMatcher::new(ExclusionRuleSet::new(&self.exclude_urls)?, &self.server_routes)
    }
}

impl Validate for PrerenderConfig {
    fn validate(&self) -> prerender_config::Result<()> {
        ConfigValidator::not_empty(&self.shell_file, "prerender.shell_file")?;
        ConfigValidator::rooted_paths(&self.exclude_urls, "prerender.exclude_urls")?;
        ConfigValidator::in_range(self.render_timeout_ms, 1, 600_000, "prerender.render_timeout_ms")?;
        ConfigValidator::in_range(
            self.startup_timeout_secs,
            1,
            3600,
            "prerender.startup_timeout_secs",
        )?;
        ConfigValidator::in_range(self.dev_cache_capacity, 1, 1_000_000, "prerender.dev_cache_capacity")?;
        if let Some(url) = &self.ready_probe_url {
            ConfigValidator::is_url(url, "prerender.ready_probe_url")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PrerenderConfig::default();
        assert_eq!(config.exclude_urls, vec!["/sockjs-node"]);
        assert_eq!(config.render_timeout(), Duration::from_secs(5));
        assert_eq!(config.shell_path(), PathBuf::from("ClientApp/dist/browser/index.html"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = PrerenderConfig::new()
            .with_exclusions(["/api"])
            .exclude_url("/health")
            .with_render_timeout(Duration::from_millis(250))
            .with_node_path("/usr/local/bin/node");

        assert_eq!(config.exclude_urls, vec!["/api", "/health"]);
        assert_eq!(config.render_timeout_ms, 250);
        assert_eq!(config.node_path, PathBuf::from("/usr/local/bin/node"));
    }

    #[test]
    fn test_partial_section_keeps_defaults() {
        let config: PrerenderConfig = from_json(r#"{"render_timeout_ms": 8000}"#);
        assert_eq!(config.render_timeout_ms, 8000);
        assert_eq!(config.dev_cache_capacity, 256);
        assert_eq!(config.server_routes, vec![ServerRoute::catch_all()]);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let config = PrerenderConfig::new().with_exclusions(["api"]);
        assert!(config.validate().is_err());

        let mut config = PrerenderConfig::new();
        config.render_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = PrerenderConfig::new();
        config.ready_probe_url = Some("localhost:4200".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_worker_command() {
        let config = PrerenderConfig::default();
        assert_eq!(config.worker().program, PathBuf::from("node"));

        let config = config.with_worker_command(["bun", "run", "worker.ts"]);
        let command = config.worker();
        assert_eq!(command.program, PathBuf::from("bun"));
        assert_eq!(command.args, vec!["run", "worker.ts"]);
    }

    #[test]
    fn test_matcher_from_config() {
        let matcher = PrerenderConfig::default().matcher().unwrap();
        assert!(!matcher.should_prerender("/sockjs-node/info"));
        assert!(matcher.should_prerender("/about"));
    }

    fn from_json(json: &str) -> PrerenderConfig {
        serde_json::from_str(json).unwrap()
    }
}
