//! Persisted order of the dashboard panels.

use std::io;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::warn;

pub const DEFAULT_PANEL_ORDER: [&str; 2] = ["server", "localxpose"];

/// Keeps known panel ids in their first-seen order and appends any default
/// panel that is missing.
pub fn normalize_panel_order<'a>(order: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut cleaned: Vec<String> = Vec::new();
    for item in order {
        if DEFAULT_PANEL_ORDER.contains(&item) && !cleaned.iter().any(|c| c == item) {
            cleaned.push(item.to_string());
        }
    }
    for default in DEFAULT_PANEL_ORDER {
        if !cleaned.iter().any(|c| c == default) {
            cleaned.push(default.to_string());
        }
    }
    cleaned
}

pub fn default_panel_order() -> Vec<String> {
    DEFAULT_PANEL_ORDER.iter().map(|s| s.to_string()).collect()
}

/// JSON file holding the saved order.
#[derive(Debug)]
pub struct PanelStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl PanelStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the saved order, or the default when the file is missing or
    /// unreadable.
    pub async fn load(&self) -> Vec<String> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return default_panel_order(),
            Err(e) => {
                warn!("Failed to read {}: {}", self.path.display(), e);
                return default_panel_order();
            }
        };

        match serde_json::from_slice::<serde_json::Value>(&data) {
            Ok(serde_json::Value::Array(items)) => {
                normalize_panel_order(items.iter().filter_map(|v| v.as_str()))
            }
            Ok(_) => default_panel_order(),
            Err(e) => {
                warn!("Ignoring malformed {}: {}", self.path.display(), e);
                default_panel_order()
            }
        }
    }

    pub async fn save(&self, order: &[String]) -> io::Result<()> {
        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let data = serde_json::to_vec(order)?;
        tokio::fs::write(&self.path, data).await
    }
}
