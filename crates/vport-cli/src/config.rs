// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use vport_core::ViewPortOptions;
use vport_store::FILTER_ACTION;
use vport_tui::UiOptions;

const CONFIG_VERSION: i64 = 1;
const DEFAULT_INITIAL_MAILBOX: &str = "INBOX";
const DEFAULT_LOG_LEVEL: &str = "warn";
const DEFAULT_SORT: &str = "date";
/// Terminal lines kept for the preview pane; the library default is sized for
/// pixel layouts.
const DEFAULT_PREVIEW_RESERVE: usize = 6;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    pub version: i64,
    #[serde(default)]
    pub storage: Storage,
    #[serde(default)]
    pub viewport: Viewport,
    #[serde(default)]
    pub ui: Ui,
    #[serde(default)]
    pub log: Log,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Storage {
    pub db_path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Viewport {
    pub row_template: Option<String>,
    pub empty_text: Option<String>,
    pub error_text: Option<String>,
    pub buffer_pages: Option<f64>,
    pub limit_factor: Option<f64>,
    pub wait: Option<String>,
    pub fetch_collision_limit: Option<u32>,
    pub lookbehind_ratio: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Ui {
    pub initial_mailbox: Option<String>,
    pub preview: Option<bool>,
    pub preview_reserve: Option<usize>,
    pub sort: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Log {
    pub dir: Option<String>,
    pub level: Option<String>,
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = env::var_os("VPORT_CONFIG_PATH") {
            return Ok(PathBuf::from(path));
        }

        let config_root = dirs::config_dir().ok_or_else(|| {
            anyhow!("cannot resolve config directory; set VPORT_CONFIG_PATH to the config file")
        })?;

        let app_dir = config_root.join(vport_store::APP_NAME);
        fs::create_dir_all(&app_dir)
            .with_context(|| format!("create config directory {}", app_dir.display()))?;
        Ok(app_dir.join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self {
                version: CONFIG_VERSION,
                ..Self::default()
            });
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        let value: toml::Value = toml::from_str(&raw)
            .with_context(|| format!("parse TOML config {}", path.display()))?;

        let version = value
            .get("version")
            .and_then(toml::Value::as_integer)
            .ok_or_else(|| {
                anyhow!(
                    "config file {} has no version; add `version = 1` at the top",
                    path.display()
                )
            })?;
        if version != CONFIG_VERSION {
            bail!(
                "unsupported config version {} in {}; expected version = 1",
                version,
                path.display()
            );
        }

        let config: Config = value
            .try_into()
            .with_context(|| format!("decode config {}", path.display()))?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if let Some(db_path) = &self.storage.db_path {
            vport_store::validate_db_path(db_path)?;
        }
        if let Some(wait) = &self.viewport.wait {
            parse_duration(wait)
                .with_context(|| format!("viewport.wait in {}", path.display()))?;
        }
        if let Some(mailbox) = &self.ui.initial_mailbox
            && mailbox.trim().is_empty()
        {
            bail!("ui.initial_mailbox in {} must not be empty", path.display());
        }
        self.viewport_options()?
            .validate()
            .with_context(|| format!("invalid [viewport] config in {}", path.display()))
    }

    pub fn db_path(&self) -> Result<PathBuf> {
        match &self.storage.db_path {
            Some(path) => Ok(PathBuf::from(path)),
            None => vport_store::default_db_path(),
        }
    }

    pub fn viewport_options(&self) -> Result<ViewPortOptions> {
        let defaults = ViewPortOptions::default();
        let viewport = &self.viewport;
        Ok(ViewPortOptions {
            row_template: viewport
                .row_template
                .clone()
                .unwrap_or(defaults.row_template),
            empty_text: viewport
                .empty_text
                .clone()
                .or_else(|| Some("No messages".to_owned())),
            error_text: viewport
                .error_text
                .clone()
                .or_else(|| Some("Could not load messages".to_owned())),
            buffer_pages: viewport.buffer_pages.unwrap_or(defaults.buffer_pages),
            limit_factor: viewport.limit_factor.unwrap_or(defaults.limit_factor),
            viewport_wait: viewport.wait.as_deref().map(parse_duration).transpose()?,
            split_pane: self.ui.preview.unwrap_or(true),
            split_pane_reserve: self.ui.preview_reserve.unwrap_or(DEFAULT_PREVIEW_RESERVE),
            fetch_collision_limit: viewport
                .fetch_collision_limit
                .unwrap_or(defaults.fetch_collision_limit),
            lookbehind_ratio: viewport
                .lookbehind_ratio
                .unwrap_or(defaults.lookbehind_ratio),
            ..defaults
        })
    }

    pub fn ui_options(&self) -> Result<UiOptions> {
        Ok(UiOptions {
            viewport: self.viewport_options()?,
            initial_mailbox: self
                .ui
                .initial_mailbox
                .clone()
                .unwrap_or_else(|| DEFAULT_INITIAL_MAILBOX.to_owned()),
            filter_action: FILTER_ACTION.to_owned(),
            list_params: BTreeMap::from([(
                "sortby".to_owned(),
                self.ui.sort.clone().unwrap_or_else(|| DEFAULT_SORT.to_owned()),
            )]),
        })
    }

    pub fn log_level(&self) -> &str {
        self.log.level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    /// Directory for the rolling log file; defaults next to the config file.
    pub fn log_dir(&self, config_path: &Path) -> PathBuf {
        match &self.log.dir {
            Some(dir) => PathBuf::from(dir),
            None => config_path
                .parent()
                .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
                .join("logs"),
        }
    }

    pub fn example_config(path: &Path) -> String {
        format!(
            "# vport config\n# Place this file at: {}\n\nversion = 1\n\n[storage]\n# Optional. Default is platform data dir (for example ~/.local/share/vport/vport.db)\n# db_path = \"/absolute/path/to/vport.db\"\n\n[viewport]\nrow_template = \"#{{from}}  #{{subject}}\"\nempty_text = \"No messages\"\nerror_text = \"Could not load messages\"\nbuffer_pages = 5\nlimit_factor = 35\n# wait = \"10s\"\nfetch_collision_limit = 4\nlookbehind_ratio = 0.4\n\n[ui]\ninitial_mailbox = \"{DEFAULT_INITIAL_MAILBOX}\"\npreview = true\npreview_reserve = {DEFAULT_PREVIEW_RESERVE}\nsort = \"{DEFAULT_SORT}\"\n\n[log]\n# dir = \"/absolute/path/to/logs\"\nlevel = \"{DEFAULT_LOG_LEVEL}\"\n",
            path.display(),
        )
    }
}

fn parse_duration(raw: &str) -> Result<Duration> {
    let parsed = if let Some(value) = raw.strip_suffix("ms") {
        let millis: u64 = value
            .parse()
            .with_context(|| format!("invalid duration {raw:?}"))?;
        Duration::from_millis(millis)
    } else if let Some(value) = raw.strip_suffix('s') {
        let secs: u64 = value
            .parse()
            .with_context(|| format!("invalid duration {raw:?}"))?;
        Duration::from_secs(secs)
    } else {
        bail!("invalid duration {raw:?}; use <N>ms or <N>s (for example 500ms or 10s)")
    };
    if parsed.is_zero() {
        bail!("duration {raw:?} must be positive");
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::{Config, parse_duration};
    use anyhow::Result;
    use std::path::{Path, PathBuf};
    use std::sync::{Mutex, OnceLock};
    use std::time::Duration;

    fn write_config(content: &str) -> Result<(tempfile::TempDir, PathBuf)> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("config.toml");
        std::fs::write(&path, content)?;
        Ok((temp, path))
    }

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        match ENV_LOCK.get_or_init(|| Mutex::new(())).lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    #[test]
    fn missing_config_uses_defaults() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let config = Config::load(&temp.path().join("missing.toml"))?;
        assert_eq!(config.version, 1);
        assert_eq!(config.log_level(), "warn");

        let ui = config.ui_options()?;
        assert_eq!(ui.initial_mailbox, "INBOX");
        assert_eq!(ui.filter_action, "filterMessages");
        assert_eq!(ui.list_params.get("sortby").map(String::as_str), Some("date"));
        assert!(ui.viewport.split_pane);
        assert_eq!(ui.viewport.split_pane_reserve, 6);
        assert_eq!(ui.viewport.empty_text.as_deref(), Some("No messages"));
        assert_eq!(ui.viewport.viewport_wait, None);
        Ok(())
    }

    #[test]
    fn unversioned_config_is_rejected_with_actionable_message() -> Result<()> {
        let (_temp, path) = write_config("[ui]\ninitial_mailbox = \"Sent\"\n")?;
        let error = Config::load(&path).expect_err("unversioned config should fail");
        assert!(error.to_string().contains("version = 1"));
        Ok(())
    }

    #[test]
    fn unsupported_config_version_is_rejected() -> Result<()> {
        let (_temp, path) = write_config("version = 2\n")?;
        let error = Config::load(&path).expect_err("v2 config should fail");
        assert!(error.to_string().contains("unsupported config version 2"));
        Ok(())
    }

    #[test]
    fn malformed_config_returns_parse_error() -> Result<()> {
        let (_temp, path) = write_config("{{not toml")?;
        let error = Config::load(&path).expect_err("malformed config should fail");
        assert!(error.to_string().contains("parse TOML config"));
        Ok(())
    }

    #[test]
    fn viewport_section_overrides_options() -> Result<()> {
        let (_temp, path) = write_config(
            "version = 1\n[viewport]\nrow_template = \"#{subject}\"\nbuffer_pages = 3\nlimit_factor = 20\nwait = \"750ms\"\nfetch_collision_limit = 2\n[ui]\ninitial_mailbox = \"Sent\"\npreview = false\nsort = \"from\"\n",
        )?;
        let config = Config::load(&path)?;
        let ui = config.ui_options()?;
        assert_eq!(ui.initial_mailbox, "Sent");
        assert_eq!(ui.list_params.get("sortby").map(String::as_str), Some("from"));
        assert_eq!(ui.viewport.row_template, "#{subject}");
        assert_eq!(ui.viewport.buffer_pages, 3.0);
        assert_eq!(ui.viewport.limit_factor, 20.0);
        assert_eq!(ui.viewport.viewport_wait, Some(Duration::from_millis(750)));
        assert_eq!(ui.viewport.fetch_collision_limit, 2);
        assert!(!ui.viewport.split_pane);
        Ok(())
    }

    #[test]
    fn invalid_viewport_values_are_rejected() -> Result<()> {
        let (_temp, path) = write_config("version = 1\n[viewport]\nbuffer_pages = 0\n")?;
        let error = Config::load(&path).expect_err("zero buffer pages should fail");
        assert!(format!("{error:#}").contains("invalid [viewport] config"));

        let (_temp, path) = write_config("version = 1\n[viewport]\nrow_template = \"#{from\"\n")?;
        assert!(Config::load(&path).is_err());

        let (_temp, path) = write_config("version = 1\n[viewport]\nwait = \"soon\"\n")?;
        let error = Config::load(&path).expect_err("bad wait should fail");
        assert!(format!("{error:#}").contains("viewport.wait"));
        Ok(())
    }

    #[test]
    fn blank_initial_mailbox_is_rejected() -> Result<()> {
        let (_temp, path) = write_config("version = 1\n[ui]\ninitial_mailbox = \"  \"\n")?;
        let error = Config::load(&path).expect_err("blank mailbox should fail");
        assert!(error.to_string().contains("must not be empty"));
        Ok(())
    }

    #[test]
    fn db_path_rejects_uri_style_storage_value() -> Result<()> {
        let (_temp, path) =
            write_config("version = 1\n[storage]\ndb_path = \"https://evil.example/vport.db\"\n")?;
        let error = Config::load(&path).expect_err("URI db_path should fail validation");
        assert!(error.to_string().contains("looks like a URI"));
        Ok(())
    }

    #[test]
    fn db_path_prefers_storage_config_over_env_override() -> Result<()> {
        let _guard = env_lock();
        let (_temp, path) =
            write_config("version = 1\n[storage]\ndb_path = \"/explicit/from-config.db\"\n")?;
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::set_var("VPORT_DB_PATH", "/from/env.db");
        }
        let config = Config::load(&path)?;
        // SAFETY: test cleanup for process-local env mutation.
        unsafe {
            std::env::remove_var("VPORT_DB_PATH");
        }
        assert_eq!(config.db_path()?, PathBuf::from("/explicit/from-config.db"));
        Ok(())
    }

    #[test]
    fn default_path_honors_env_override() -> Result<()> {
        let _guard = env_lock();
        let temp = tempfile::tempdir()?;
        let override_path = temp.path().join("custom-config.toml");
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::set_var("VPORT_CONFIG_PATH", &override_path);
        }
        let resolved = Config::default_path()?;
        // SAFETY: test cleanup for process-local env mutation.
        unsafe {
            std::env::remove_var("VPORT_CONFIG_PATH");
        }
        assert_eq!(resolved, override_path);
        Ok(())
    }

    #[test]
    fn log_dir_defaults_next_to_config() -> Result<()> {
        let (_temp, path) = write_config("version = 1\n[log]\nlevel = \"debug\"\n")?;
        let config = Config::load(&path)?;
        assert_eq!(config.log_level(), "debug");
        assert_eq!(
            config.log_dir(Path::new("/home/someone/.config/vport/config.toml")),
            PathBuf::from("/home/someone/.config/vport/logs")
        );
        Ok(())
    }

    #[test]
    fn durations_parse_milliseconds_and_seconds() -> Result<()> {
        assert_eq!(parse_duration("500ms")?, Duration::from_millis(500));
        assert_eq!(parse_duration("10s")?, Duration::from_secs(10));
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("3m").is_err());
        Ok(())
    }

    #[test]
    fn example_config_round_trips_through_load() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("config.toml");
        let example = Config::example_config(&path);
        assert!(example.contains("[viewport]"));
        assert!(example.contains("[log]"));
        std::fs::write(&path, &example)?;
        let config = Config::load(&path)?;
        assert_eq!(config.viewport_options()?.row_template, "#{from}  #{subject}");
        Ok(())
    }
}
