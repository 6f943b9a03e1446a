//! PackageManager 相关数据类型定义

use crate::error::{PkgError, Result};

/// 统一的包记录，每次查询都重新构造
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Package {
    pub name: String,
    /// 当前安装版本，未知或未安装时为空
    pub version: String,
    /// 最新可用版本，未检查时为空
    pub latest_version: String,
    pub outdated: bool,
    /// 产生该记录的包管理器名，用于把后续操作路由回同一个管理器
    pub manager: String,
    pub description: Option<String>,
}

impl Package {
    pub fn new(name: impl Into<String>, version: impl Into<String>, manager: &str) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            manager: manager.to_string(),
            ..Default::default()
        }
    }

    /// 构造一条过期记录。`latest` 为空或与当前版本相同时不会标记为过期。
    ///
    /// 不比较版本大小：调用方只传入工具自身报告为可升级的条目，
    /// 各发行版的版本号规则交给工具判断。
    pub fn outdated(
        name: impl Into<String>,
        current: impl Into<String>,
        latest: impl Into<String>,
        manager: &str,
    ) -> Self {
        let version = current.into();
        let latest_version = latest.into();
        let outdated = !latest_version.is_empty() && latest_version != version;
        Self {
            name: name.into(),
            version,
            latest_version,
            outdated,
            manager: manager.to_string(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        let description = description.into();
        self.description = if description.is_empty() {
            None
        } else {
            Some(description)
        };
        self
    }
}

/// 流式输出中的一行
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLine {
    Stdout(String),
    Stderr(String),
    /// 以 `\r` 就地刷新的进度行（下载进度条等）
    Progress(String),
}

impl OutputLine {
    pub fn text(&self) -> &str {
        match self {
            OutputLine::Stdout(s) | OutputLine::Stderr(s) | OutputLine::Progress(s) => s,
        }
    }

    pub fn is_progress(&self) -> bool {
        matches!(self, OutputLine::Progress(_))
    }
}

/// 阻塞执行的命令输出结果
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub argv: Vec<String>,
    pub stdout: String,
    pub stderr: String,
    pub code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// 非零退出转为 `PkgError::Command`，否则返回 stdout
    pub fn checked(self) -> Result<String> {
        if self.success() {
            Ok(self.stdout)
        } else {
            Err(PkgError::command(&self.argv, self.code, &self.stderr))
        }
    }

    /// 部分工具用非零退出码表示“没有结果”（如 `pacman -Ss` 无匹配时返回 1），
    /// 此时输出为空，按空结果处理。
    pub fn checked_allow_empty(self, no_result_codes: &[i32]) -> Result<String> {
        let quiet = self.stdout.trim().is_empty() && self.stderr.trim().is_empty();
        match self.code {
            Some(c) if c != 0 && quiet && no_result_codes.contains(&c) => Ok(String::new()),
            _ => self.checked(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(code: i32, stdout: &str, stderr: &str) -> CommandOutput {
        CommandOutput {
            argv: vec!["pacman".into(), "-Qu".into()],
            stdout: stdout.into(),
            stderr: stderr.into(),
            code: Some(code),
        }
    }

    #[test]
    fn outdated_requires_latest() {
        let p = Package::outdated("git", "2.40", "", "pacman");
        assert!(!p.outdated);
        let p = Package::outdated("git", "2.40", "2.40", "pacman");
        assert!(!p.outdated);
        let p = Package::outdated("git", "2.40", "2.41", "pacman");
        assert!(p.outdated);
        assert_eq!(p.manager, "pacman");
    }

    #[test]
    fn empty_description_is_none() {
        let p = Package::new("git", "1", "brew").with_description("");
        assert_eq!(p.description, None);
    }

    #[test]
    fn no_result_exit_code_is_empty_output() {
        assert_eq!(output(1, "", "").checked_allow_empty(&[1]).unwrap(), "");
    }

    #[test]
    fn real_failure_still_errors() {
        let err = output(1, "", "error: failed to lock database")
            .checked_allow_empty(&[1])
            .unwrap_err();
        match err {
            PkgError::Command { command, code, stderr } => {
                assert_eq!(command, "pacman -Qu");
                assert_eq!(code, Some(1));
                assert!(stderr.contains("lock"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
