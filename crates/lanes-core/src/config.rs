use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::env;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use crate::service::RouteContext;
use crate::sort_key::{DEFAULT_OFFSET, SortKeyAllocator};
use crate::view::{GroupBy, Layout, OrderBy, ViewState};

/// Project settings from `.lanes/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub ordering: OrderingConfig,
    #[serde(default)]
    pub view: ViewConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

impl ProjectConfig {
    #[must_use]
    pub const fn allocator(&self) -> SortKeyAllocator {
        SortKeyAllocator::new(self.ordering.offset)
    }

    #[must_use]
    pub fn view_state(&self) -> ViewState {
        ViewState::new(self.view.layout, self.view.group_by, self.view.order_by)
    }

    /// Route from the `[api]` table; incomplete when either id is missing.
    #[must_use]
    pub fn route(&self) -> RouteContext {
        RouteContext {
            workspace_slug: self.api.workspace_slug.clone(),
            project_id: self.api.project_id.clone(),
            ..RouteContext::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderingConfig {
    /// Gap left before the first or after the last issue of a bucket.
    #[serde(default = "default_offset")]
    pub offset: f64,
}

impl Default for OrderingConfig {
    fn default() -> Self {
        Self {
            offset: default_offset(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewConfig {
    #[serde(default = "default_group_by")]
    pub group_by: GroupBy,
    #[serde(default)]
    pub order_by: OrderBy,
    #[serde(default = "default_layout")]
    pub layout: Layout,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            group_by: default_group_by(),
            order_by: OrderBy::default(),
            layout: default_layout(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub workspace_slug: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
}

/// Per-user settings from `<config dir>/lanes/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserConfig {
    #[serde(default)]
    pub output: Option<String>,
    /// API token sent to the REST backend. `LANES_TOKEN` takes precedence.
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub project: ProjectConfig,
    pub user: UserConfig,
    pub resolved_output: String,
}

/// Load `.lanes/config.toml` under `project_root`, or defaults when absent.
///
/// # Errors
///
/// Fails when the file cannot be read or parsed, or when `ordering.offset`
/// is not a positive finite number.
pub fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
    let path = project_config_path(project_root);
    if !path.exists() {
        return Ok(ProjectConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let config = toml::from_str::<ProjectConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    let offset = config.ordering.offset;
    if !offset.is_finite() || offset <= 0.0 {
        bail!(
            "{}: ordering.offset must be a positive number, got {offset}",
            path.display()
        );
    }
    Ok(config)
}

#[must_use]
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(".lanes/config.toml")
}

/// Load the user config, or defaults when there is none.
///
/// # Errors
///
/// Fails when the file exists but cannot be read or parsed.
pub fn load_user_config() -> Result<UserConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(UserConfig::default());
    };
    load_user_config_from(&config_dir.join("lanes/config.toml"))
}

fn load_user_config_from(path: &Path) -> Result<UserConfig> {
    if !path.exists() {
        return Ok(UserConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<UserConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Merge project and user config and settle the output mode.
///
/// # Errors
///
/// Propagates config loading failures.
pub fn resolve_config(project_root: &Path, cli_json: bool) -> Result<EffectiveConfig> {
    let project = load_project_config(project_root)?;
    let user = load_user_config()?;

    let env_format = env::var("FORMAT").ok();
    let resolved_output = resolve_output(cli_json, user.output.as_deref(), env_format.as_deref());

    Ok(EffectiveConfig {
        project,
        user,
        resolved_output,
    })
}

/// `--json` beats `FORMAT`, which beats the user config, which beats TTY
/// detection.
#[must_use]
pub fn resolve_output(cli_json: bool, user_output: Option<&str>, env_format: Option<&str>) -> String {
    fn normalize_output_mode(raw: &str) -> Option<&'static str> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pretty" | "human" => Some("pretty"),
            "text" | "plain" => Some("text"),
            "json" => Some("json"),
            _ => None,
        }
    }

    if cli_json {
        return "json".to_string();
    }

    if let Some(mode) = env_format.and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if let Some(mode) = user_output.and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if std::io::stdout().is_terminal() {
        "pretty".to_string()
    } else {
        "text".to_string()
    }
}

const fn default_offset() -> f64 {
    DEFAULT_OFFSET
}

const fn default_group_by() -> GroupBy {
    GroupBy::State
}

const fn default_layout() -> Layout {
    Layout::Kanban
}
