//! Configuration for crflow
//!
//! Stored in .crflow/config.toml

use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// crflow configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Change request ID prefix (e.g., "CR")
    pub id_prefix: String,

    /// Approval workflow settings
    pub workflow: WorkflowConfig,

    /// Attachment limits
    pub attachments: AttachmentConfig,

    /// List pagination
    pub list: ListConfig,

    /// Display settings
    pub display: DisplayConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            id_prefix: "CR".to_string(),
            workflow: WorkflowConfig::default(),
            attachments: AttachmentConfig::default(),
            list: ListConfig::default(),
            display: DisplayConfig::default(),
        }
    }
}

/// Where a request goes when the owner resubmits after a VP revision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResubmitRouting {
    /// Every resubmission starts over at the division manager
    #[default]
    RestartAtManager,
    /// A VP revision goes straight back to the VPs
    ReturnToVp,
}

impl std::fmt::Display for ResubmitRouting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResubmitRouting::RestartAtManager => write!(f, "restart_at_manager"),
            ResubmitRouting::ReturnToVp => write!(f, "return_to_vp"),
        }
    }
}

/// Approval workflow configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub resubmit_routing: ResubmitRouting,

    /// Minimum characters of notes on reject / request revision
    pub min_decision_notes: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            resubmit_routing: ResubmitRouting::default(),
            min_decision_notes: 50,
        }
    }
}

/// Attachment configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachmentConfig {
    /// Maximum attachments per change request
    pub max_per_cr: usize,

    /// Maximum size of one attachment, in bytes
    pub max_file_size: u64,

    /// Accepted MIME types
    pub allowed_mime_types: Vec<String>,
}

impl Default for AttachmentConfig {
    fn default() -> Self {
        Self {
            max_per_cr: 5,
            max_file_size: 10 * 1024 * 1024,
            allowed_mime_types: [
                "application/pdf",
                "application/msword",
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
                "application/vnd.ms-excel",
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
                "image/jpeg",
                "image/png",
                "image/gif",
                "text/plain",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

impl AttachmentConfig {
    pub fn allows(&self, mime_type: &str) -> bool {
        let mime_type = mime_type.trim();
        self.allowed_mime_types
            .iter()
            .any(|m| m.eq_ignore_ascii_case(mime_type))
    }
}

/// List pagination configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListConfig {
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Default for ListConfig {
    fn default() -> Self {
        Self {
            default_limit: 20,
            max_limit: 100,
        }
    }
}

/// Display configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Use colors in output
    pub colors: bool,

    /// Date format for display
    pub date_format: String,

    /// Maximum title length before truncation
    pub max_title_length: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            colors: true,
            date_format: "%Y-%m-%d %H:%M".to_string(),
            max_title_length: 60,
        }
    }
}

impl DisplayConfig {
    /// `date_format` must be a strftime string chrono can render
    fn validate(&self) -> crate::Result<()> {
        if StrftimeItems::new(&self.date_format).any(|item| matches!(item, Item::Error)) {
            return Err(crate::Error::Config(format!(
                "display.date_format {:?} is not a valid strftime format",
                self.date_format
            )));
        }
        Ok(())
    }
}

impl Config {
    /// Prefix used for new identifiers
    pub fn prefix(&self) -> &str {
        if self.id_prefix.trim().is_empty() {
            "CR"
        } else {
            self.id_prefix.trim()
        }
    }

    /// Load config from a TOML file
    pub fn load(path: &Path) -> crate::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))?;
        config.display.validate()?;
        Ok(config)
    }

    /// Generate a default config file with comments
    pub fn default_with_comments() -> String {
        r#"# crflow configuration

# Change request ID prefix; IDs look like CR-2026-10-000001
id_prefix = "CR"

[workflow]
# Where a resubmission after a VP revision goes:
#   restart_at_manager - back to the division manager (default)
#   return_to_vp       - straight back to the VPs
resubmit_routing = "restart_at_manager"

# Minimum characters of notes when rejecting or requesting a revision
min_decision_notes = 50

[attachments]
# Maximum attachments per change request
max_per_cr = 5

# Maximum size of one attachment, in bytes (10 MiB)
max_file_size = 10485760

# Accepted MIME types
allowed_mime_types = [
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "image/jpeg",
    "image/png",
    "image/gif",
    "text/plain",
]

[list]
# Page size when none is given
default_limit = 20

# Largest accepted page size
max_limit = 100

[display]
# Use colors in output
colors = true

# Date format for display (strftime format)
date_format = "%Y-%m-%d %H:%M"

# Maximum title length before truncation
max_title_length = 60
"#
        .to_string()
    }
}
