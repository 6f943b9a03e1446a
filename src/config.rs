use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// AUR helper 优先级，靠前者优先
    pub aur_helpers: Vec<String>,
    /// dotfiles 关心的工具集合，`check_dotfiles_updates` 只报告这些包
    pub tracked_tools: Vec<String>,
    /// 流式输出 channel 容量
    pub output_buffer: usize,
    /// 取消时 SIGTERM 与 SIGKILL 之间的等待时间（毫秒）
    pub kill_grace_ms: u64,
    /// 修改类操作的提权程序
    pub sudo_command: String,
}

impl Default for Config {
    fn default() -> Self {
        let tracked_tools = [
            "git", "neovim", "tmux", "zsh", "fish", "starship", "fzf", "ripgrep", "fd", "bat",
            "eza", "zoxide", "lazygit", "htop", "btop", "jq", "curl", "wget", "stow",
        ];
        Self {
            aur_helpers: vec!["paru".to_string(), "yay".to_string()],
            tracked_tools: tracked_tools.iter().map(|s| s.to_string()).collect(),
            output_buffer: 256,
            kill_grace_ms: 3000,
            sudo_command: "sudo".to_string(),
        }
    }
}

impl Config {
    pub fn default_path() -> PathBuf {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(".config/dotpkg/config.toml")
    }

    pub fn load_or_default() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// 文件不存在时返回默认配置
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }
}
