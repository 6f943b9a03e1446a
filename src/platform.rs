//! 平台检测
//!
//! 只读探测：目标系统 + 根目录下的标志文件。不识别时返回 `Platform::Unknown`，不报错。

use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    MacOS,
    Arch,
    Debian,
    /// Raspberry Pi OS，基于 Debian，同时带有 /etc/debian_version
    RaspberryPi,
    Unknown,
}

impl Platform {
    pub fn name(self) -> &'static str {
        match self {
            Platform::MacOS => "macos",
            Platform::Arch => "arch",
            Platform::Debian => "debian",
            Platform::RaspberryPi => "raspberrypi",
            Platform::Unknown => "unknown",
        }
    }

    pub fn is_debian_family(self) -> bool {
        matches!(self, Platform::Debian | Platform::RaspberryPi)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 探测输入：目标系统、文件系统根目录、可执行文件搜索路径
#[derive(Debug, Clone)]
pub struct Probe {
    pub os: String,
    pub root: PathBuf,
    /// `None` 时使用进程的 PATH
    pub search_path: Option<OsString>,
}

impl Probe {
    pub fn host() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            root: PathBuf::from("/"),
            search_path: None,
        }
    }

    /// 以 `root` 为根目录的 Linux 探测，可执行文件只在 `root/usr/bin` 中查找
    pub fn rooted(root: &Path) -> Self {
        Self {
            os: "linux".to_string(),
            root: root.to_path_buf(),
            search_path: Some(root.join("usr/bin").into_os_string()),
        }
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel.trim_start_matches('/'))
    }

    fn exists(&self, rel: &str) -> bool {
        self.path(rel).exists()
    }

    fn read(&self, rel: &str) -> Option<String> {
        fs::read_to_string(self.path(rel)).ok()
    }

    /// 在搜索路径中解析可执行文件
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        let found = match &self.search_path {
            Some(paths) => which::which_in(name, Some(paths), &self.root),
            None => which::which(name),
        };
        found.ok()
    }
}

/// 检测顺序有意义：开发板标志先于通用发行版标志检查，
/// 因为 Raspberry Pi OS 同样带有 /etc/debian_version。
pub fn detect(probe: &Probe) -> Platform {
    if probe.os == "macos" {
        return Platform::MacOS;
    }
    if probe.os != "linux" {
        return Platform::Unknown;
    }
    if is_raspberry_pi(probe) {
        return Platform::RaspberryPi;
    }
    if probe.exists("/etc/arch-release") {
        return Platform::Arch;
    }
    if probe.exists("/etc/debian_version") {
        return Platform::Debian;
    }
    probe
        .read("/etc/os-release")
        .map(|content| from_os_release(&content))
        .unwrap_or(Platform::Unknown)
}

fn is_raspberry_pi(probe: &Probe) -> bool {
    if probe.exists("/etc/rpi-issue") {
        return true;
    }
    probe
        .read("/proc/device-tree/model")
        .map(|model| model.contains("Raspberry Pi"))
        .unwrap_or(false)
}

/// 标志文件缺失时回退到 os-release 的 ID / ID_LIKE
fn from_os_release(content: &str) -> Platform {
    let mut id = String::new();
    let mut id_like = String::new();
    for line in content.lines() {
        if let Some(val) = line.strip_prefix("ID=") {
            id = val.trim_matches('"').to_string();
        } else if let Some(val) = line.strip_prefix("ID_LIKE=") {
            id_like = val.trim_matches('"').to_string();
        }
    }

    let family = |word: &str| id == word || id_like.split_whitespace().any(|w| w == word);
    if family("arch") {
        Platform::Arch
    } else if family("debian") || family("ubuntu") {
        Platform::Debian
    } else {
        Platform::Unknown
    }
}
