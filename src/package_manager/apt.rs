//! Debian 后端：apt-get 负责修改操作，查询走同目录下的 apt / dpkg-query

use super::exec::{capture, run_checked, SUDO};
use super::parser::{parse_apt_search, parse_apt_upgradable, parse_dpkg_installed};
use super::streaming::{run_steps, run_streaming_sudo, Step, StreamOptions, StreamingCmd};
use super::{is_executable, validate_packages, with_packages, Package, PackageManager};
use crate::error::{PkgError, Result};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

const REFRESH_STEP: &str = "apt-get update";
const UPGRADE_STEP: &str = "apt-get upgrade";

#[derive(Debug, Clone)]
pub struct Apt {
    bin: PathBuf,
    sudo: PathBuf,
    opts: StreamOptions,
}

impl Apt {
    pub const NAME: &'static str = "apt";

    /// `bin` 指向 apt-get
    pub fn with_binary(bin: impl Into<PathBuf>) -> Self {
        Self {
            bin: bin.into(),
            sudo: PathBuf::from(SUDO),
            opts: StreamOptions::default(),
        }
    }

    pub fn with_sudo(mut self, sudo: impl Into<PathBuf>) -> Self {
        self.sudo = sudo.into();
        self
    }

    pub fn with_options(mut self, opts: StreamOptions) -> Self {
        self.opts = opts;
        self
    }

    pub fn binary(&self) -> &Path {
        &self.bin
    }

    fn sibling(&self, name: &str) -> PathBuf {
        self.bin.with_file_name(name)
    }

    fn run(&self, args: &[String]) -> Result<()> {
        run_checked(&self.bin, args, Some(&self.sudo)).map(|_| ())
    }

    fn refresh_args() -> Vec<String> {
        vec!["update".to_string()]
    }

    fn upgrade_args() -> Vec<String> {
        vec!["upgrade".to_string(), "-y".to_string()]
    }
}

impl PackageManager for Apt {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn is_available(&self) -> bool {
        is_executable(&self.bin)
    }

    fn install(&self, packages: &[String]) -> Result<()> {
        validate_packages(packages)?;
        self.run(&with_packages(&["install", "-y"], packages))
    }

    fn uninstall(&self, packages: &[String]) -> Result<()> {
        validate_packages(packages)?;
        self.run(&with_packages(&["remove", "-y"], packages))
    }

    fn is_installed(&self, package: &str) -> bool {
        capture(&self.sibling("dpkg-query"), &["-W", "-f=${Status}", package])
            .map(|o| o.success() && o.stdout.contains("install ok installed"))
            .unwrap_or(false)
    }

    fn version(&self, package: &str) -> Result<String> {
        let stdout =
            capture(&self.sibling("dpkg-query"), &["-W", "-f=${Version}", package])?.checked()?;
        Ok(stdout.trim().to_string())
    }

    fn check_outdated(&self) -> Result<Vec<Package>> {
        let stdout = capture(&self.sibling("apt"), &["list", "--upgradable"])?.checked()?;
        Ok(parse_apt_upgradable(&stdout, Self::NAME))
    }

    fn update(&self, packages: &[String]) -> Result<()> {
        validate_packages(packages)?;
        self.run(&with_packages(&["install", "--only-upgrade", "-y"], packages))
    }

    /// 先刷新索引再升级；刷新失败时不会执行升级
    fn update_all(&self) -> Result<()> {
        self.run(&Self::refresh_args()).map_err(|e| PkgError::Step {
            step: REFRESH_STEP.to_string(),
            source: Box::new(e),
        })?;
        self.run(&Self::upgrade_args()).map_err(|e| PkgError::Step {
            step: UPGRADE_STEP.to_string(),
            source: Box::new(e),
        })
    }

    fn search(&self, query: &str) -> Result<Vec<Package>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let stdout = capture(&self.sibling("apt"), &["search", query])?.checked()?;
        Ok(parse_apt_search(&stdout, Self::NAME))
    }

    /// 一次 dpkg-query 列出全部包，按 `${Status}` 过滤掉已删除只剩配置的条目
    fn list_installed(&self) -> Result<Vec<Package>> {
        let stdout = capture(
            &self.sibling("dpkg-query"),
            &["-W", "-f=${Package}\t${Version}\t${Status}\n"],
        )?
        .checked()?;
        Ok(parse_dpkg_installed(&stdout, Self::NAME))
    }

    fn needs_sudo(&self) -> bool {
        true
    }

    fn install_streaming(
        &self,
        ctx: &CancellationToken,
        packages: &[String],
    ) -> Result<StreamingCmd> {
        validate_packages(packages)?;
        run_streaming_sudo(
            ctx,
            self.opts,
            &self.sudo,
            &self.bin,
            &with_packages(&["install", "-y"], packages),
        )
    }

    fn update_streaming(
        &self,
        ctx: &CancellationToken,
        packages: &[String],
    ) -> Result<StreamingCmd> {
        validate_packages(packages)?;
        run_streaming_sudo(
            ctx,
            self.opts,
            &self.sudo,
            &self.bin,
            &with_packages(&["install", "--only-upgrade", "-y"], packages),
        )
    }

    fn update_all_streaming(&self, ctx: &CancellationToken) -> Result<StreamingCmd> {
        let steps = vec![
            Step::sudo(REFRESH_STEP, &self.sudo, &self.bin, &Self::refresh_args()),
            Step::sudo(UPGRADE_STEP, &self.sudo, &self.bin, &Self::upgrade_args()),
        ];
        run_steps(ctx, self.opts, steps)
    }
}
