// ACME account and directory settings
// Resolves the configured directory alias into a URL

use serde::{Deserialize, Serialize};

pub const LETS_ENCRYPT_PRODUCTION: &str = "https://acme-v02.api.letsencrypt.org/directory";
pub const LETS_ENCRYPT_STAGING: &str = "https://acme-staging-v02.api.letsencrypt.org/directory";

/// ACME directory: a Let's Encrypt alias or an explicit URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AcmeDirectory {
    Production,
    Staging,
    Custom(String),
}

impl From<String> for AcmeDirectory {
    fn from(value: String) -> Self {
        match value.as_str() {
            "production" => AcmeDirectory::Production,
            "staging" => AcmeDirectory::Staging,
            _ => AcmeDirectory::Custom(value),
        }
    }
}

impl From<AcmeDirectory> for String {
    fn from(value: AcmeDirectory) -> Self {
        match value {
            AcmeDirectory::Production => "production".to_string(),
            AcmeDirectory::Staging => "staging".to_string(),
            AcmeDirectory::Custom(url) => url,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcmeSettings {
    /// Contact address registered with each account
    #[serde(default)]
    pub email: Option<String>,

    #[serde(default = "default_directory")]
    pub directory: AcmeDirectory,
}

fn default_directory() -> AcmeDirectory {
    AcmeDirectory::Production
}

impl Default for AcmeSettings {
    fn default() -> Self {
        Self {
            email: None,
            directory: default_directory(),
        }
    }
}

impl AcmeSettings {
    pub fn directory_url(&self) -> anyhow::Result<String> {
        match &self.directory {
            AcmeDirectory::Production => Ok(LETS_ENCRYPT_PRODUCTION.to_string()),
            AcmeDirectory::Staging => Ok(LETS_ENCRYPT_STAGING.to_string()),
            AcmeDirectory::Custom(url) if url.starts_with("https://") || url.starts_with("http://") => {
                Ok(url.clone())
            }
            AcmeDirectory::Custom(other) => {
                anyhow::bail!("acme.directory must be production, staging or a URL, got [{}]", other)
            }
        }
    }
}
