//! 工具安装状态缓存
//!
//! 不自动过期：调用方在需要最新状态前显式调用 `refresh` 或 `invalidate`。

use crate::error::Result;
use crate::package_manager::PackageManager;
use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

#[derive(Debug, Default)]
pub struct ToolStatusCache {
    status: RwLock<HashMap<String, bool>>,
}

impl ToolStatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 用一次 `list_installed` 批量刷新 `tools` 的安装状态
    pub fn refresh(&self, manager: &dyn PackageManager, tools: &[String]) -> Result<()> {
        let installed: HashSet<String> = manager
            .list_installed()?
            .into_iter()
            .map(|p| p.name)
            .collect();
        let fresh: HashMap<String, bool> = tools
            .iter()
            .map(|t| (t.clone(), installed.contains(t)))
            .collect();

        let mut status = self.status.write().unwrap_or_else(PoisonError::into_inner);
        *status = fresh;
        Ok(())
    }

    /// 未缓存时返回 `None`
    pub fn is_installed(&self, tool: &str) -> Option<bool> {
        self.status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(tool)
            .copied()
    }

    pub fn set(&self, tool: &str, installed: bool) {
        self.status
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(tool.to_string(), installed);
    }

    pub fn invalidate(&self) {
        self.status
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn installed_tools(&self) -> Vec<String> {
        let status = self.status.read().unwrap_or_else(PoisonError::into_inner);
        let mut tools: Vec<String> = status
            .iter()
            .filter(|(_, installed)| **installed)
            .map(|(name, _)| name.clone())
            .collect();
        tools.sort();
        tools
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package_manager::testutil::fake_bin;
    use crate::package_manager::{ArchTool, Pacman};

    #[test]
    fn refresh_uses_one_batch_listing() {
        let dir = tempfile::tempdir().unwrap();
        let bin = fake_bin(
            dir.path(),
            "pacman",
            r#"
case "$1 $2" in
  "-Q ") printf 'git 2.41-1\ncurl 8.5.0-1\ntmux 3.4-1\n' ;;
  "-Q curl") echo "curl 8.5.0-1" ;;
  *) exit 1 ;;
esac
"#,
        );
        let pm = Pacman::with_binary(ArchTool::Pacman, bin);
        let cache = ToolStatusCache::new();
        assert_eq!(cache.is_installed("git"), None);

        let tools: Vec<String> = ["git", "curl", "neovim"].iter().map(|s| s.to_string()).collect();
        cache.refresh(&pm, &tools).unwrap();
        assert_eq!(cache.is_installed("git"), Some(true));
        assert_eq!(cache.is_installed("neovim"), Some(false));
        assert_eq!(cache.is_installed("tmux"), None);
        assert_eq!(cache.installed_tools(), vec!["curl", "git"]);

        // 仅作为依赖安装的 curl 与单包查询一致
        assert_eq!(cache.is_installed("curl"), Some(pm.is_installed("curl")));

        cache.set("neovim", true);
        assert_eq!(cache.is_installed("neovim"), Some(true));

        cache.invalidate();
        assert_eq!(cache.is_installed("git"), None);
    }
}
