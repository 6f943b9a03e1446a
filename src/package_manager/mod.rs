//! 包管理器模块 — 对 brew / pacman (paru / yay) / apt 的统一封装

pub mod aggregate;
pub mod apt;
pub mod brew;
pub mod exec;
pub mod pacman;
pub mod parser;
pub mod streaming;
pub mod types;

// 重新导出常用类型和函数
pub use aggregate::{check_updates_across, filter_tracked, merge_outdated};
pub use apt::Apt;
pub use brew::Brew;
pub use pacman::{ArchTool, Pacman};
pub use streaming::{
    run_steps, run_streaming, run_streaming_sudo, run_streaming_with, Step, StreamOptions,
    StreamingCmd,
};
pub use types::{CommandOutput, OutputLine, Package};

use crate::error::{PkgError, Result};
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// 所有后端都要满足的操作集合
///
/// 只读查询（search / list / check-outdated）的非零退出作为错误返回；
/// 修改类操作同样直接返回错误，不做重试。
pub trait PackageManager: Send + Sync {
    /// 管理器名，同时作为 `Package::manager` 的标签
    fn name(&self) -> &str;

    /// 底层可执行文件存在且可执行
    fn is_available(&self) -> bool;

    fn install(&self, packages: &[String]) -> Result<()>;

    fn uninstall(&self, packages: &[String]) -> Result<()>;

    fn is_installed(&self, package: &str) -> bool;

    /// 已安装包的版本
    fn version(&self, package: &str) -> Result<String>;

    fn check_outdated(&self) -> Result<Vec<Package>>;

    fn update(&self, packages: &[String]) -> Result<()>;

    fn update_all(&self) -> Result<()>;

    fn search(&self, query: &str) -> Result<Vec<Package>>;

    /// 已安装包列表，版本来自一次批量查询
    fn list_installed(&self) -> Result<Vec<Package>>;

    /// 修改类操作是否需要提权
    fn needs_sudo(&self) -> bool;

    fn install_streaming(
        &self,
        ctx: &CancellationToken,
        packages: &[String],
    ) -> Result<StreamingCmd>;

    fn update_streaming(
        &self,
        ctx: &CancellationToken,
        packages: &[String],
    ) -> Result<StreamingCmd>;

    fn update_all_streaming(&self, ctx: &CancellationToken) -> Result<StreamingCmd>;
}

/// 拒绝空列表和以 `-` 开头的包名
pub(crate) fn validate_packages(packages: &[String]) -> Result<()> {
    if packages.is_empty() {
        return Err(PkgError::EmptyPackageList);
    }
    if let Some(bad) = packages
        .iter()
        .find(|p| p.trim().is_empty() || p.starts_with('-'))
    {
        return Err(PkgError::InvalidPackageName(bad.clone()));
    }
    Ok(())
}

/// `base` 参数后追加包名
pub(crate) fn with_packages(base: &[&str], packages: &[String]) -> Vec<String> {
    let mut args: Vec<String> = base.iter().map(|s| s.to_string()).collect();
    args.extend(packages.iter().cloned());
    args
}

pub(crate) fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        path.metadata()
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        path.is_file()
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};

    /// 在 `dir` 下写入一个可执行的 sh 脚本
    pub fn fake_bin(dir: &Path, name: &str, script: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }
}
