//! Arch 后端：pacman 以及 paru / yay 等 AUR helper
//!
//! helper 以普通用户运行，内部按需提权；直接调用 pacman 时修改类操作需要 sudo。

use super::exec::{capture, run_checked, SUDO};
use super::parser::{
    parse_installed_versions, parse_pacman_outdated, parse_pacman_search, parse_version_map,
};
use super::streaming::{run_streaming_sudo, run_streaming_with, StreamOptions, StreamingCmd};
use super::{is_executable, validate_packages, with_packages, Package, PackageManager};
use crate::error::{PkgError, Result};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// pacman `-Qu` / `-Ss` 无结果时的退出码
const PACMAN_NO_RESULT: &[i32] = &[1];
/// checkupdates 无可用更新时的退出码
const CHECKUPDATES_NO_RESULT: &[i32] = &[2];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchTool {
    Pacman,
    Paru,
    Yay,
}

impl ArchTool {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "pacman" => Some(ArchTool::Pacman),
            "paru" => Some(ArchTool::Paru),
            "yay" => Some(ArchTool::Yay),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ArchTool::Pacman => "pacman",
            ArchTool::Paru => "paru",
            ArchTool::Yay => "yay",
        }
    }

    pub fn is_aur_helper(self) -> bool {
        !matches!(self, ArchTool::Pacman)
    }
}

#[derive(Debug, Clone)]
pub struct Pacman {
    tool: ArchTool,
    bin: PathBuf,
    sudo: PathBuf,
    opts: StreamOptions,
}

impl Pacman {
    pub fn with_binary(tool: ArchTool, bin: impl Into<PathBuf>) -> Self {
        Self {
            tool,
            bin: bin.into(),
            sudo: PathBuf::from(SUDO),
            opts: StreamOptions::default(),
        }
    }

    /// 只对直接调用 pacman 生效；AUR helper 自行提权
    pub fn with_sudo(mut self, sudo: impl Into<PathBuf>) -> Self {
        self.sudo = sudo.into();
        self
    }

    pub fn with_options(mut self, opts: StreamOptions) -> Self {
        self.opts = opts;
        self
    }

    pub fn tool(&self) -> ArchTool {
        self.tool
    }

    pub fn binary(&self) -> &Path {
        &self.bin
    }

    /// 与 pacman 同目录的 checkupdates（pacman-contrib），不会改动正在使用的同步数据库
    fn checkupdates(&self) -> Option<PathBuf> {
        if self.tool.is_aur_helper() {
            return None;
        }
        let path = self.bin.with_file_name("checkupdates");
        is_executable(&path).then_some(path)
    }

    fn elevation(&self) -> Option<&Path> {
        self.needs_sudo().then_some(self.sudo.as_path())
    }

    fn run(&self, args: &[String]) -> Result<()> {
        run_checked(&self.bin, args, self.elevation()).map(|_| ())
    }

    fn stream(&self, ctx: &CancellationToken, args: &[String]) -> Result<StreamingCmd> {
        match self.elevation() {
            Some(sudo) => run_streaming_sudo(ctx, self.opts, sudo, &self.bin, args),
            None => run_streaming_with(ctx, self.opts, &self.bin, args),
        }
    }
}

impl PackageManager for Pacman {
    fn name(&self) -> &str {
        self.tool.name()
    }

    fn is_available(&self) -> bool {
        is_executable(&self.bin)
    }

    fn install(&self, packages: &[String]) -> Result<()> {
        validate_packages(packages)?;
        self.run(&with_packages(&["-S", "--needed", "--noconfirm"], packages))
    }

    fn uninstall(&self, packages: &[String]) -> Result<()> {
        validate_packages(packages)?;
        self.run(&with_packages(&["-Rns", "--noconfirm"], packages))
    }

    fn is_installed(&self, package: &str) -> bool {
        capture(&self.bin, &["-Q", package])
            .map(|o| o.success())
            .unwrap_or(false)
    }

    fn version(&self, package: &str) -> Result<String> {
        let stdout = capture(&self.bin, &["-Q", package])?.checked()?;
        parse_version_map(&stdout)
            .remove(package)
            .ok_or_else(|| PkgError::command(&[self.name(), "-Q", package], None, &stdout))
    }

    fn check_outdated(&self) -> Result<Vec<Package>> {
        let stdout = match self.checkupdates() {
            Some(path) => capture(&path, &[] as &[&str])?.checked_allow_empty(CHECKUPDATES_NO_RESULT)?,
            None => capture(&self.bin, &["-Qu"])?.checked_allow_empty(PACMAN_NO_RESULT)?,
        };
        Ok(parse_pacman_outdated(&stdout, self.name()))
    }

    fn update(&self, packages: &[String]) -> Result<()> {
        validate_packages(packages)?;
        self.run(&with_packages(&["-S", "--noconfirm"], packages))
    }

    fn update_all(&self) -> Result<()> {
        self.run(&with_packages(&["-Syu", "--noconfirm"], &[]))
    }

    fn search(&self, query: &str) -> Result<Vec<Package>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let stdout = capture(&self.bin, &["-Ss", query])?.checked_allow_empty(PACMAN_NO_RESULT)?;
        Ok(parse_pacman_search(&stdout, self.name()))
    }

    /// `-Q` 包含作为依赖安装的包
    fn list_installed(&self) -> Result<Vec<Package>> {
        let stdout = capture(&self.bin, &["-Q"])?.checked()?;
        Ok(parse_installed_versions(&stdout, self.name()))
    }

    fn needs_sudo(&self) -> bool {
        !self.tool.is_aur_helper()
    }

    fn install_streaming(
        &self,
        ctx: &CancellationToken,
        packages: &[String],
    ) -> Result<StreamingCmd> {
        validate_packages(packages)?;
        self.stream(ctx, &with_packages(&["-S", "--needed", "--noconfirm"], packages))
    }

    fn update_streaming(
        &self,
        ctx: &CancellationToken,
        packages: &[String],
    ) -> Result<StreamingCmd> {
        validate_packages(packages)?;
        self.stream(ctx, &with_packages(&["-S", "--noconfirm"], packages))
    }

    fn update_all_streaming(&self, ctx: &CancellationToken) -> Result<StreamingCmd> {
        self.stream(ctx, &with_packages(&["-Syu", "--noconfirm"], &[]))
    }
}
