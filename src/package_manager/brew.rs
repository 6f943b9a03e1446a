//! Homebrew 后端

use super::exec::{capture, run_checked};
use super::parser::{
    parse_brew_outdated, parse_brew_search, parse_installed_versions, parse_version_map,
};
use super::streaming::{run_streaming_with, StreamOptions, StreamingCmd};
use super::{is_executable, validate_packages, with_packages, Package, PackageManager};
use crate::error::{PkgError, Result};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// brew 以普通用户运行，不需要 sudo
#[derive(Debug, Clone)]
pub struct Brew {
    bin: PathBuf,
    opts: StreamOptions,
}

impl Brew {
    pub const NAME: &'static str = "brew";

    pub fn with_binary(bin: impl Into<PathBuf>) -> Self {
        Self {
            bin: bin.into(),
            opts: StreamOptions::default(),
        }
    }

    pub fn with_options(mut self, opts: StreamOptions) -> Self {
        self.opts = opts;
        self
    }

    pub fn binary(&self) -> &Path {
        &self.bin
    }

    fn run(&self, args: &[String]) -> Result<()> {
        run_checked(&self.bin, args, None).map(|_| ())
    }
}

impl PackageManager for Brew {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn is_available(&self) -> bool {
        is_executable(&self.bin)
    }

    fn install(&self, packages: &[String]) -> Result<()> {
        validate_packages(packages)?;
        self.run(&with_packages(&["install"], packages))
    }

    fn uninstall(&self, packages: &[String]) -> Result<()> {
        validate_packages(packages)?;
        self.run(&with_packages(&["uninstall"], packages))
    }

    fn is_installed(&self, package: &str) -> bool {
        capture(&self.bin, &["list", "--versions", package])
            .map(|o| o.success() && !o.stdout.trim().is_empty())
            .unwrap_or(false)
    }

    fn version(&self, package: &str) -> Result<String> {
        let stdout = capture(&self.bin, &["list", "--versions", package])?.checked()?;
        parse_version_map(&stdout)
            .remove(package)
            .ok_or_else(|| PkgError::command(&["brew", "list", "--versions", package], None, "未安装"))
    }

    fn check_outdated(&self) -> Result<Vec<Package>> {
        let stdout = capture(&self.bin, &["outdated", "--verbose"])?.checked()?;
        Ok(parse_brew_outdated(&stdout, Self::NAME))
    }

    fn update(&self, packages: &[String]) -> Result<()> {
        validate_packages(packages)?;
        self.run(&with_packages(&["upgrade"], packages))
    }

    fn update_all(&self) -> Result<()> {
        self.run(&["upgrade".to_string()])
    }

    fn search(&self, query: &str) -> Result<Vec<Package>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let stdout = capture(&self.bin, &["search", "--desc", query])?.checked()?;
        Ok(parse_brew_search(&stdout, Self::NAME))
    }

    fn list_installed(&self) -> Result<Vec<Package>> {
        let stdout = capture(&self.bin, &["list", "--formula", "--versions"])?.checked()?;
        Ok(parse_installed_versions(&stdout, Self::NAME))
    }

    fn needs_sudo(&self) -> bool {
        false
    }

    fn install_streaming(
        &self,
        ctx: &CancellationToken,
        packages: &[String],
    ) -> Result<StreamingCmd> {
        validate_packages(packages)?;
        run_streaming_with(ctx, self.opts, &self.bin, &with_packages(&["install"], packages))
    }

    fn update_streaming(
        &self,
        ctx: &CancellationToken,
        packages: &[String],
    ) -> Result<StreamingCmd> {
        validate_packages(packages)?;
        run_streaming_with(ctx, self.opts, &self.bin, &with_packages(&["upgrade"], packages))
    }

    fn update_all_streaming(&self, ctx: &CancellationToken) -> Result<StreamingCmd> {
        run_streaming_with(ctx, self.opts, &self.bin, &["upgrade"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package_manager::testutil::fake_bin;
    use crate::package_manager::OutputLine;

    const FAKE_BREW: &str = r#"
case "$1 $2" in
  "outdated --verbose")
    echo "git (2.40.0) < 2.41.0"
    echo "node (20.1.0, 20.2.0) < 21.0.0"
    echo "not a brew line"
    ;;
  "list --formula")
    printf 'git 2.40.0\nnode 20.1.0 20.2.0\njq 1.7.1\n'
    ;;
  "list --versions")
    [ "$3" = "jq" ] && echo "jq 1.7.1" && exit 0
    exit 1
    ;;
  "search --desc")
    printf '==> Formulae\nripgrep: Search tool like grep\n'
    ;;
  "install "*)
    echo "==> Installing $2"
    ;;
  *)
    echo "unexpected: $*" >&2
    exit 1
    ;;
esac
"#;

    fn brew() -> (tempfile::TempDir, Brew) {
        let dir = tempfile::tempdir().unwrap();
        let bin = fake_bin(dir.path(), "brew", FAKE_BREW);
        (dir, Brew::with_binary(bin))
    }

    #[test]
    fn reports_unprivileged_and_available() {
        let (_dir, brew) = brew();
        assert!(brew.is_available());
        assert!(!brew.needs_sudo());
        assert!(!Brew::with_binary("/nonexistent/brew").is_available());
    }

    #[test]
    fn outdated_parsed_from_verbose_output() {
        let (_dir, brew) = brew();
        let pkgs = brew.check_outdated().unwrap();
        assert_eq!(pkgs.len(), 2);
        assert_eq!(pkgs[0].name, "git");
        assert_eq!(pkgs[0].manager, "brew");
        assert_eq!(pkgs[1].version, "20.2.0");
    }

    #[test]
    fn installed_list_uses_batch_versions() {
        let (_dir, brew) = brew();
        let pkgs = brew.list_installed().unwrap();
        let versions: Vec<_> = pkgs.iter().map(|p| (p.name.as_str(), p.version.as_str())).collect();
        assert_eq!(
            versions,
            vec![("git", "2.40.0"), ("node", "20.2.0"), ("jq", "1.7.1")]
        );
    }

    #[test]
    fn single_package_queries() {
        let (_dir, brew) = brew();
        assert!(brew.is_installed("jq"));
        assert!(!brew.is_installed("git-lfs"));
        assert_eq!(brew.version("jq").unwrap(), "1.7.1");
        assert!(brew.version("git-lfs").is_err());
    }

    #[test]
    fn search_keeps_descriptions() {
        let (_dir, brew) = brew();
        let pkgs = brew.search("grep").unwrap();
        assert_eq!(pkgs.len(), 1);
        assert_eq!(pkgs[0].description.as_deref(), Some("Search tool like grep"));
        assert!(brew.search("  ").unwrap().is_empty());
    }

    #[test]
    fn failing_mutation_surfaces_error() {
        let (_dir, brew) = brew();
        assert!(matches!(
            brew.uninstall(&["git".into()]),
            Err(PkgError::Command { code: Some(1), .. })
        ));
    }

    #[tokio::test]
    async fn streaming_install_emits_output() {
        let (_dir, brew) = brew();
        let ctx = CancellationToken::new();
        let mut cmd = brew.install_streaming(&ctx, &["ripgrep".into()]).unwrap();
        assert_eq!(
            cmd.next_line().await,
            Some(OutputLine::Stdout("==> Installing ripgrep".into()))
        );
        cmd.wait().await.unwrap();
    }
}
