//! 错误类型

use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PkgError>;

#[derive(Debug, Error)]
pub enum PkgError {
    /// 进程无法启动（找不到可执行文件、权限不足等）
    #[error("无法启动 `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// 进程以非零状态退出
    #[error("`{command}` 执行失败 (exit={code:?}): {stderr}")]
    Command {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    /// 组合操作中的某一步失败，后续步骤不会执行
    #[error("步骤 `{step}` 失败: {source}")]
    Step {
        step: String,
        #[source]
        source: Box<PkgError>,
    },

    #[error("未指定任何包")]
    EmptyPackageList,

    /// 包名以 `-` 开头会被底层工具当作选项解析
    #[error("非法包名: `{0}`")]
    InvalidPackageName(String),

    #[error("操作已取消")]
    Cancelled,

    #[error("没有可用的包管理器")]
    NoManagers,

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("配置文件解析失败: {0}")]
    Config(#[from] toml::de::Error),
}

impl PkgError {
    /// 由 argv 和退出信息构造 `Command` 错误
    pub(crate) fn command<S: AsRef<str>>(argv: &[S], code: Option<i32>, stderr: &str) -> Self {
        let command = argv
            .iter()
            .map(|s| s.as_ref())
            .collect::<Vec<_>>()
            .join(" ");
        PkgError::Command {
            command,
            code,
            stderr: stderr.trim().to_string(),
        }
    }
}
