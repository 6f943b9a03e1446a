//! 输出解析函数
//!
//! 所有解析都是逐行容错的：不符合预期格式的行直接跳过，
//! 底层工具输出残缺时只会得到更少的结果，不会报错。

use super::types::{OutputLine, Package};
use std::collections::HashMap;

/// 清理终端输出中的 ANSI 转义序列和特殊字符
pub fn clean_terminal_output(input: &str) -> String {
    let mut result = String::new();
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\x1b' => {
                if chars.peek() == Some(&'[') {
                    chars.next();
                    while let Some(&next) = chars.peek() {
                        chars.next();
                        if next.is_ascii_alphabetic() {
                            break;
                        }
                    }
                }
            }
            '\r' => {
                if chars.peek() != Some(&'\n') && !result.ends_with('\n') {
                    result.push('\n');
                }
            }
            c if c.is_control() && c != '\n' && c != '\t' => {}
            _ => result.push(c),
        }
    }

    let mut cleaned_lines = Vec::new();
    let mut prev_empty = false;
    for line in result.lines() {
        let is_empty = line.trim().is_empty();
        if is_empty && prev_empty {
            continue;
        }
        cleaned_lines.push(line);
        prev_empty = is_empty;
    }

    cleaned_lines.join("\n")
}

// ========== 流切分 ==========

/// 把一个输出流的原始字节切分为行。
///
/// `\n` 结尾的行按来源发送为 `Stdout` / `Stderr`；
/// 单独的 `\r`（进度条就地刷新）无论来自哪个流都作为 `Progress` 发送；
/// `\r\n` 视为普通换行。空行丢弃。
#[derive(Debug)]
pub struct LineSplitter {
    stderr: bool,
    buf: Vec<u8>,
    pending_cr: bool,
}

impl LineSplitter {
    pub fn new(stderr: bool) -> Self {
        Self {
            stderr,
            buf: Vec::new(),
            pending_cr: false,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<OutputLine> {
        let mut out = Vec::new();
        for &b in chunk {
            if self.pending_cr {
                self.pending_cr = false;
                if b == b'\n' {
                    self.emit(false, &mut out);
                    continue;
                }
                self.emit(true, &mut out);
            }
            match b {
                b'\n' => self.emit(false, &mut out),
                b'\r' => self.pending_cr = true,
                _ => self.buf.push(b),
            }
        }
        out
    }

    /// 流结束时取出残留的半行
    pub fn finish(&mut self) -> Option<OutputLine> {
        let mut out = Vec::new();
        let progress = std::mem::take(&mut self.pending_cr);
        self.emit(progress, &mut out);
        out.pop()
    }

    fn emit(&mut self, progress: bool, out: &mut Vec<OutputLine>) {
        if self.buf.is_empty() {
            return;
        }
        let raw = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        let cleaned = clean_terminal_output(&raw);
        let cleaned = cleaned.trim_end();
        if cleaned.trim().is_empty() {
            return;
        }
        let text = cleaned.to_string();
        out.push(if progress {
            OutputLine::Progress(text)
        } else if self.stderr {
            OutputLine::Stderr(text)
        } else {
            OutputLine::Stdout(text)
        });
    }
}

// ========== 通用 ==========

/// 一次性批量查询得到的 name → version 表。
///
/// 每行第一个字段是包名，最后一个字段是版本；
/// 兼容 `pacman -Q`（`name ver`）、`dpkg-query -W`（`name\tver`）
/// 和 `brew list --versions`（`name v1 v2`，取最新的 v2）。
pub fn parse_version_map(output: &str) -> HashMap<String, String> {
    parse_installed_versions(output, "")
        .into_iter()
        .map(|p| (p.name, p.version))
        .collect()
}

/// 与 [`parse_version_map`] 同样的行格式，按输出顺序生成已安装列表
pub fn parse_installed_versions(output: &str, manager: &str) -> Vec<Package> {
    output
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            match parts.as_slice() {
                [name, .., version] => Some(Package::new(*name, *version, manager)),
                _ => None,
            }
        })
        .collect()
}

// ========== Arch ==========

/// 解析 `pacman -Qu` / `checkupdates` / `paru -Qu` 的输出：
/// `name old -> new`，行尾可能带 `[ignored]`
pub fn parse_pacman_outdated(output: &str, manager: &str) -> Vec<Package> {
    output
        .lines()
        .filter_map(|line| parse_pacman_outdated_line(line, manager))
        .collect()
}

pub fn parse_pacman_outdated_line(line: &str, manager: &str) -> Option<Package> {
    let cleaned = clean_terminal_output(line);
    let parts: Vec<&str> = cleaned.split_whitespace().collect();
    if parts.len() < 4 || parts[2] != "->" {
        return None;
    }
    Some(Package::outdated(parts[0], parts[1], parts[3], manager))
}

/// 解析 `pacman -Ss` / `paru -Ss` 的搜索输出：
///
/// ```text
/// extra/git 2.43.0-1 [installed]
///     the fast distributed version control system
/// ```
pub fn parse_pacman_search(output: &str, manager: &str) -> Vec<Package> {
    parse_indented_search(output, manager, |header| {
        let (_repo, rest) = header.split_once('/')?;
        let mut parts = rest.split_whitespace();
        let name = parts.next()?;
        let version = parts.next().unwrap_or("");
        Some((name.to_string(), version.to_string()))
    })
}

// ========== Debian ==========

/// 解析 `dpkg-query -W -f='${Package}\t${Version}\t${Status}\n'`。
///
/// 只保留状态为 `* ok installed` 的条目；`deinstall ok config-files`
/// 之类已删除但残留配置的包不算已安装。
pub fn parse_dpkg_installed(output: &str, manager: &str) -> Vec<Package> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split('\t');
            let name = fields.next()?.trim();
            let version = fields.next()?.trim();
            let status = fields.next()?.trim();
            let installed = status.ends_with("ok installed");
            (installed && !name.is_empty()).then(|| Package::new(name, version, manager))
        })
        .collect()
}

/// 解析 `apt list --upgradable`：
/// `name/source 2.0.0 amd64 [upgradable from: 1.0.0]`
pub fn parse_apt_upgradable(output: &str, manager: &str) -> Vec<Package> {
    output
        .lines()
        .filter_map(|line| parse_apt_upgradable_line(line, manager))
        .collect()
}

pub fn parse_apt_upgradable_line(line: &str, manager: &str) -> Option<Package> {
    let cleaned = clean_terminal_output(line);
    let parts: Vec<&str> = cleaned.split_whitespace().collect();
    if parts.len() < 6 || parts[3] != "[upgradable" || parts[4] != "from:" {
        return None;
    }
    let (name, _source) = parts[0].split_once('/')?;
    let current = parts[5].trim_end_matches(']');
    if name.is_empty() || current.is_empty() {
        return None;
    }
    Some(Package::outdated(name, current, parts[1], manager))
}

/// 解析 `apt search` 的输出：
///
/// ```text
/// ripgrep/jammy 13.0.0-2 amd64
///   Recursively searches directories for a regex pattern
/// ```
pub fn parse_apt_search(output: &str, manager: &str) -> Vec<Package> {
    parse_indented_search(output, manager, |header| {
        let (name, rest) = header.split_once('/')?;
        let version = rest.split_whitespace().nth(1).unwrap_or("");
        Some((name.to_string(), version.to_string()))
    })
}

// ========== Homebrew ==========

/// 解析 `brew outdated --verbose`：
///
/// ```text
/// git (2.40.0) < 2.41.0
/// node (20.1.0, 20.2.0) < 21.0.0
/// firefox (120.0) != 121.0
/// ```
///
/// `!=` 是 brew 无法比较版本号时的写法，它仍把该条目列为可升级，`brew upgrade`
/// 也会处理它，因此同样记为过期。
pub fn parse_brew_outdated(output: &str, manager: &str) -> Vec<Package> {
    output
        .lines()
        .filter_map(|line| parse_brew_outdated_line(line, manager))
        .collect()
}

pub fn parse_brew_outdated_line(line: &str, manager: &str) -> Option<Package> {
    let cleaned = clean_terminal_output(line);
    let (name, rest) = cleaned.trim().split_once(" (")?;
    let (installed, tail) = rest.split_once(')')?;
    let parts: Vec<&str> = tail.split_whitespace().collect();
    if parts.len() != 2 || !matches!(parts[0], "<" | "!=") {
        return None;
    }
    let current = installed.split(',').map(str::trim).last()?;
    if name.is_empty() || current.is_empty() {
        return None;
    }
    Some(Package::outdated(name, current, parts[1], manager))
}

/// 解析 `brew search --desc`：`name: description`，跳过 `==>` 分组标题
pub fn parse_brew_search(output: &str, manager: &str) -> Vec<Package> {
    let mut results = Vec::new();
    for line in output.lines() {
        let cleaned = clean_terminal_output(line);
        let trimmed = cleaned.trim();
        if trimmed.is_empty() || trimmed.starts_with("==>") {
            continue;
        }
        let (name, desc) = match trimmed.split_once(": ") {
            Some((n, d)) => (n.trim(), d.trim()),
            None => (trimmed.trim_end_matches(':'), ""),
        };
        if name.is_empty() || name.contains(' ') {
            continue;
        }
        results.push(Package::new(name, "", manager).with_description(desc));
    }
    results
}

/// 标题行后跟缩进描述行的搜索格式。
///
/// 缩进行归属于最近一个标题行；标题与描述之间的空行不会打断关联。
/// 无法识别的非缩进行会结束当前记录，避免后续缩进行被错配。
fn parse_indented_search<F>(output: &str, manager: &str, parse_header: F) -> Vec<Package>
where
    F: Fn(&str) -> Option<(String, String)>,
{
    let mut results: Vec<Package> = Vec::new();
    let mut current: Option<usize> = None;

    for line in output.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let cleaned = clean_terminal_output(line);
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(idx) = current {
                let pkg = &mut results[idx];
                let text = cleaned.trim();
                let desc = match pkg.description.take() {
                    Some(mut d) => {
                        d.push(' ');
                        d.push_str(text);
                        d
                    }
                    None => text.to_string(),
                };
                pkg.description = Some(desc);
            }
            continue;
        }
        current = match parse_header(cleaned.trim()) {
            Some((name, version)) if !name.is_empty() => {
                results.push(Package::new(name, version, manager));
                Some(results.len() - 1)
            }
            _ => None,
        };
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_ansi_sequences() {
        assert_eq!(clean_terminal_output("\x1b[1;32mgit\x1b[0m 2.43"), "git 2.43");
    }

    #[test]
    fn pacman_outdated_line() {
        let p = parse_pacman_outdated_line("pkgname oldver -> newver", "pacman").unwrap();
        assert_eq!(p.name, "pkgname");
        assert_eq!(p.version, "oldver");
        assert_eq!(p.latest_version, "newver");
        assert!(p.outdated);
    }

    #[test]
    fn pacman_outdated_ignored_suffix() {
        let p = parse_pacman_outdated_line("linux 6.6.1-1 -> 6.6.2-1 [ignored]", "paru").unwrap();
        assert_eq!(p.latest_version, "6.6.2-1");
        assert_eq!(p.manager, "paru");
    }

    #[test]
    fn pacman_outdated_skips_malformed() {
        let out = "git 2.40 -> 2.41\nbroken line\n\nfoo 1 2 3\n:: Synchronizing\n";
        let pkgs = parse_pacman_outdated(out, "pacman");
        assert_eq!(pkgs.len(), 1);
        assert_eq!(pkgs[0].name, "git");
    }

    #[test]
    fn apt_upgradable_line() {
        let p = parse_apt_upgradable_line(
            "pkgname/source 2.0.0 amd64 [upgradable from: 1.0.0]",
            "apt",
        )
        .unwrap();
        assert_eq!(p.name, "pkgname");
        assert_eq!(p.version, "1.0.0");
        assert_eq!(p.latest_version, "2.0.0");
        assert!(p.outdated);
    }

    #[test]
    fn apt_upgradable_skips_listing_header() {
        let out = "Listing... Done\n\
                   curl/jammy-updates 7.81.0-1ubuntu1.15 amd64 [upgradable from: 7.81.0-1ubuntu1.14]\n\
                   half/line 1.0\n";
        let pkgs = parse_apt_upgradable(out, "apt");
        assert_eq!(pkgs.len(), 1);
        assert_eq!(pkgs[0].name, "curl");
        assert_eq!(pkgs[0].version, "7.81.0-1ubuntu1.14");
    }

    #[test]
    fn brew_outdated_formats() {
        let out = "git (2.40.0) < 2.41.0\n\
                   node (20.1.0, 20.2.0) < 21.0.0\n\
                   firefox (120.0) != 121.0\n\
                   garbage\n\
                   jq (1.6)\n";
        let pkgs = parse_brew_outdated(out, "brew");
        assert_eq!(pkgs.len(), 3);
        assert_eq!(pkgs[1].name, "node");
        assert_eq!(pkgs[1].version, "20.2.0");
        assert_eq!(pkgs[1].latest_version, "21.0.0");
        assert_eq!(pkgs[2].latest_version, "121.0");
        // `!=` 行与 `<` 行一样以 brew 的可升级列表为准
        assert!(pkgs.iter().all(|p| p.outdated));
    }

    #[test]
    fn pacman_search_with_descriptions() {
        let out = "extra/git 2.43.0-1 [installed]\n    the fast distributed version control system\n\
                   extra/git-lfs 3.4.0-1\n\n    Git extension for versioning large files\n\
                   aur/git-nodesc 1.0-1\n";
        let pkgs = parse_pacman_search(out, "pacman");
        assert_eq!(pkgs.len(), 3);
        assert_eq!(pkgs[0].name, "git");
        assert_eq!(pkgs[0].version, "2.43.0-1");
        assert_eq!(
            pkgs[0].description.as_deref(),
            Some("the fast distributed version control system")
        );
        assert_eq!(
            pkgs[1].description.as_deref(),
            Some("Git extension for versioning large files")
        );
        assert_eq!(pkgs[2].description, None);
    }

    #[test]
    fn apt_search_ignores_preamble() {
        let out = "Sorting...\nFull Text Search...\n\
                   ripgrep/jammy 13.0.0-2 amd64\n  Recursively searches directories for a regex pattern\n\n\
                   fd-find/jammy 8.3.1-1 amd64\n  Simple, fast and user-friendly alternative to find\n";
        let pkgs = parse_apt_search(out, "apt");
        assert_eq!(pkgs.len(), 2);
        assert_eq!(pkgs[0].name, "ripgrep");
        assert_eq!(pkgs[0].version, "13.0.0-2");
        assert_eq!(pkgs[1].name, "fd-find");
        assert!(pkgs[1].description.as_deref().unwrap().starts_with("Simple"));
    }

    #[test]
    fn brew_search_descriptions() {
        let out = "==> Formulae\nripgrep: Search tool like grep\nrg\n\n==> Casks\n";
        let pkgs = parse_brew_search(out, "brew");
        assert_eq!(pkgs.len(), 2);
        assert_eq!(pkgs[0].description.as_deref(), Some("Search tool like grep"));
        assert_eq!(pkgs[1].name, "rg");
    }

    #[test]
    fn installed_list_keeps_order_and_skips_bad_lines() {
        let pkgs = parse_installed_versions("git 2.43.0-1\nbad\nlibcurl 8.5.0-1\n", "pacman");
        let names: Vec<_> = pkgs.iter().map(|p| (p.name.as_str(), p.version.as_str())).collect();
        assert_eq!(names, vec![("git", "2.43.0-1"), ("libcurl", "8.5.0-1")]);
        assert!(pkgs.iter().all(|p| p.manager == "pacman"));
    }

    #[test]
    fn dpkg_status_filters_removed_packages() {
        let out = "curl\t7.81.0-1\tinstall ok installed\n\
                   libc6\t2.35-0ubuntu3\thold ok installed\n\
                   vim\t2:8.2\tdeinstall ok config-files\n\
                   truncated\n";
        let pkgs = parse_dpkg_installed(out, "apt");
        let names: Vec<_> = pkgs.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["curl", "libc6"]);
        assert_eq!(pkgs[1].version, "2.35-0ubuntu3");
    }

    #[test]
    fn brew_version_map_takes_newest() {
        let versions = parse_version_map("node 20.1.0 20.2.0\njq\t1.7\n");
        assert_eq!(versions["node"], "20.2.0");
        assert_eq!(versions["jq"], "1.7");
    }

    #[test]
    fn splitter_handles_progress_and_crlf() {
        let mut s = LineSplitter::new(false);
        let mut lines = s.push(b"downloading 10%\rdownloading 50%\rdone\r\n");
        lines.extend(s.push(b"partial"));
        lines.extend(s.finish());
        assert_eq!(
            lines,
            vec![
                OutputLine::Progress("downloading 10%".into()),
                OutputLine::Progress("downloading 50%".into()),
                OutputLine::Stdout("done".into()),
                OutputLine::Stdout("partial".into()),
            ]
        );
    }

    #[test]
    fn splitter_joins_across_chunks() {
        let mut s = LineSplitter::new(true);
        let mut lines = s.push(b"warn");
        lines.extend(s.push(b"ing: x\r"));
        lines.extend(s.push(b"\n\n\n"));
        assert_eq!(lines, vec![OutputLine::Stderr("warning: x".into())]);
        assert_eq!(s.finish(), None);
    }
}
