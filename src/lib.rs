//! dotpkg — 原生包管理器抽象与流式命令执行
//!
//! - [`platform`]：平台检测
//! - [`context`]：平台 / 包管理器的一次性缓存与跨管理器查询
//! - [`package_manager`]：统一的 `PackageManager` 接口、三种后端和流式执行
//! - [`tool_cache`]：工具安装状态缓存

pub mod config;
pub mod context;
pub mod error;
pub mod package_manager;
pub mod platform;
pub mod tool_cache;

pub use config::Config;
pub use context::{
    all_managers, check_all_updates, check_dotfiles_updates, detect_manager, detect_platform,
    HostContext,
};
pub use error::{PkgError, Result};
pub use package_manager::{OutputLine, Package, PackageManager, StreamingCmd};
pub use platform::{Platform, Probe};
pub use tool_cache::ToolStatusCache;
