//! 主机上下文：平台与包管理器的一次性检测缓存
//!
//! 缓存由 `OnceLock` 守护：第一个调用者执行探测，并发的其他调用者阻塞等待，
//! 之后所有调用直接读取结果。`all_managers` 不缓存，每次重新探测。

use crate::config::Config;
use crate::error::Result;
use crate::package_manager::{
    check_updates_across, filter_tracked, Apt, ArchTool, Brew, Package, PackageManager, Pacman,
    StreamOptions,
};
use crate::platform::{self, Platform, Probe};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

pub struct HostContext {
    probe: Probe,
    config: Config,
    platform: OnceLock<Platform>,
    manager: OnceLock<Option<Arc<dyn PackageManager>>>,
}

impl HostContext {
    pub fn new(config: Config) -> Self {
        Self::with_probe(config, Probe::host())
    }

    pub fn with_probe(config: Config, probe: Probe) -> Self {
        Self {
            probe,
            config,
            platform: OnceLock::new(),
            manager: OnceLock::new(),
        }
    }

    /// 进程级默认上下文，配置读取失败时使用默认配置
    pub fn global() -> &'static HostContext {
        static GLOBAL: OnceLock<HostContext> = OnceLock::new();
        GLOBAL.get_or_init(|| {
            let config = Config::load_or_default().unwrap_or_else(|e| {
                log::warn!("读取配置失败，使用默认配置: {}", e);
                Config::default()
            });
            HostContext::new(config)
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn probe(&self) -> &Probe {
        &self.probe
    }

    pub fn detect_platform(&self) -> Platform {
        *self.platform.get_or_init(|| {
            let platform = platform::detect(&self.probe);
            log::debug!("检测到平台: {}", platform);
            platform
        })
    }

    /// 当前平台的首选包管理器；平台未知或底层工具缺失时为 `None`
    pub fn detect_manager(&self) -> Option<Arc<dyn PackageManager>> {
        self.manager
            .get_or_init(|| {
                let selected = self.select_manager(self.detect_platform());
                match &selected {
                    Some(pm) => log::debug!("选用包管理器: {}", pm.name()),
                    None => log::warn!("平台 {} 没有可用的包管理器", self.detect_platform()),
                }
                selected
            })
            .clone()
    }

    /// 主机上所有可用的包管理器（每次调用都重新探测）。
    ///
    /// Arch 系只返回一个：首个可用的 AUR helper，否则 pacman，
    /// 避免同一套数据库被查询两次。
    pub fn all_managers(&self) -> Vec<Arc<dyn PackageManager>> {
        let mut managers: Vec<Arc<dyn PackageManager>> = Vec::new();
        if let Some(brew) = self.brew() {
            managers.push(Arc::new(brew));
        }
        if let Some(arch) = self.arch_manager() {
            managers.push(Arc::new(arch));
        }
        if let Some(apt) = self.apt() {
            managers.push(Arc::new(apt));
        }
        managers.retain(|m| m.is_available());
        managers
    }

    /// 汇总所有管理器的过期包
    pub fn check_all_updates(&self) -> Result<Vec<Package>> {
        check_updates_across(&self.all_managers())
    }

    /// 只保留配置中 `tracked_tools` 列出的过期包
    pub fn check_dotfiles_updates(&self) -> Result<Vec<Package>> {
        let all = self.check_all_updates()?;
        Ok(filter_tracked(all, &self.config.tracked_tools))
    }

    fn select_manager(&self, platform: Platform) -> Option<Arc<dyn PackageManager>> {
        match platform {
            Platform::MacOS => self.brew().map(|m| Arc::new(m) as Arc<dyn PackageManager>),
            Platform::Arch => self
                .arch_manager()
                .map(|m| Arc::new(m) as Arc<dyn PackageManager>),
            p if p.is_debian_family() => {
                self.apt().map(|m| Arc::new(m) as Arc<dyn PackageManager>)
            }
            _ => None,
        }
    }

    fn stream_options(&self) -> StreamOptions {
        StreamOptions::from(&self.config)
    }

    fn brew(&self) -> Option<Brew> {
        self.probe
            .resolve(Brew::NAME)
            .map(|bin| Brew::with_binary(bin).with_options(self.stream_options()))
    }

    /// AUR helper 只有在可执行文件确实存在时才优先，否则静默回退到 pacman
    fn arch_manager(&self) -> Option<Pacman> {
        let helpers = self
            .config
            .aur_helpers
            .iter()
            .filter_map(|name| ArchTool::from_name(name).filter(|t| t.is_aur_helper()));
        for tool in helpers {
            if let Some(bin) = self.probe.resolve(tool.name()) {
                return Some(self.pacman(tool, bin));
            }
        }
        self.probe
            .resolve(ArchTool::Pacman.name())
            .map(|bin| self.pacman(ArchTool::Pacman, bin))
    }

    fn pacman(&self, tool: ArchTool, bin: PathBuf) -> Pacman {
        Pacman::with_binary(tool, bin)
            .with_sudo(&self.config.sudo_command)
            .with_options(self.stream_options())
    }

    fn apt(&self) -> Option<Apt> {
        self.probe
            .resolve("apt-get")
            .map(|bin| {
                Apt::with_binary(bin)
                    .with_sudo(&self.config.sudo_command)
                    .with_options(self.stream_options())
            })
    }
}

/// 进程级平台检测
pub fn detect_platform() -> Platform {
    HostContext::global().detect_platform()
}

/// 进程级包管理器选择
pub fn detect_manager() -> Option<Arc<dyn PackageManager>> {
    HostContext::global().detect_manager()
}

pub fn all_managers() -> Vec<Arc<dyn PackageManager>> {
    HostContext::global().all_managers()
}

pub fn check_all_updates() -> Result<Vec<Package>> {
    HostContext::global().check_all_updates()
}

pub fn check_dotfiles_updates() -> Result<Vec<Package>> {
    HostContext::global().check_dotfiles_updates()
}
