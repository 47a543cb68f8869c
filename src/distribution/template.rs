// Vhost fragment rendering
// Pure text rendering of the per-project reverse-proxy config

use minijinja::{context, Environment, UndefinedBehavior};
use std::path::Path;

/// Template shipped with the binary, used when no override is configured
pub const DEFAULT_VHOST_TEMPLATE: &str = include_str!("../../templates/vhost.conf.j2");

/// Remote locations a vhost fragment may reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VhostPaths {
    pub certificate_path: String,
    pub key_path: String,
}

pub struct VhostTemplate {
    env: Environment<'static>,
    source: String,
}

impl VhostTemplate {
    /// Parse a template; it has to reference `server_names`
    pub fn from_source(source: impl Into<String>) -> anyhow::Result<Self> {
        let source = source.into();

        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);
        env.template_from_str(&source)?;

        if !source.contains("server_names") {
            anyhow::bail!("vhost template never references server_names");
        }

        Ok(Self { env, source })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read vhost template {}: {}", path.display(), e))?;
        Self::from_source(source)
    }

    pub fn builtin() -> anyhow::Result<Self> {
        Self::from_source(DEFAULT_VHOST_TEMPLATE)
    }

    /// Render the fragment for one project; `server_names` is the space-joined domain list
    pub fn render(&self, project_id: &str, domains: &[String], paths: &VhostPaths) -> Result<String, minijinja::Error> {
        self.env.render_str(
            &self.source,
            context! {
                project_id => project_id,
                server_names => domains.join(" "),
                domains => domains,
                certificate_path => &paths.certificate_path,
                key_path => &paths.key_path,
            },
        )
    }
}
