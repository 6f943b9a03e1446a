//! 阻塞式命令执行
//!
//! 参数始终以独立的 argv 传递，不拼接 shell 字符串。

use super::types::CommandOutput;
use crate::error::{PkgError, Result};
use std::ffi::OsString;
use std::path::Path;

/// 默认提权程序
pub const SUDO: &str = "sudo";

/// 运行命令直到退出，stdin 断开，捕获 stdout / stderr
pub fn capture<S: AsRef<str>>(program: &Path, args: &[S]) -> Result<CommandOutput> {
    let argv = argv_of(program, args);
    run_argv(program.as_os_str().to_owned(), argv)
}

/// 与 [`capture`] 相同，但以 `sudo program args...` 的形式执行
pub fn capture_sudo<S: AsRef<str>>(
    sudo: &Path,
    program: &Path,
    args: &[S],
) -> Result<CommandOutput> {
    let argv = sudo_argv(sudo, program, args);
    run_argv(sudo.as_os_str().to_owned(), argv)
}

/// `sudo` 为 `Some` 时经由该程序提权执行，并检查退出码
pub fn run_checked<S: AsRef<str>>(
    program: &Path,
    args: &[S],
    sudo: Option<&Path>,
) -> Result<String> {
    let output = match sudo {
        Some(sudo) => capture_sudo(sudo, program, args)?,
        None => capture(program, args)?,
    };
    output.checked()
}

pub(crate) fn argv_of<S: AsRef<str>>(program: &Path, args: &[S]) -> Vec<String> {
    let mut argv = Vec::with_capacity(args.len() + 1);
    argv.push(program.to_string_lossy().into_owned());
    argv.extend(args.iter().map(|a| a.as_ref().to_string()));
    argv
}

pub(crate) fn sudo_argv<S: AsRef<str>>(sudo: &Path, program: &Path, args: &[S]) -> Vec<String> {
    let mut argv = vec![sudo.to_string_lossy().into_owned()];
    argv.extend(argv_of(program, args));
    argv
}

fn run_argv(program: OsString, argv: Vec<String>) -> Result<CommandOutput> {
    log::debug!("exec: {}", argv.join(" "));
    let output = duct::cmd(program, &argv[1..])
        .stdin_null()
        .stdout_capture()
        .stderr_capture()
        .unchecked()
        .run()
        .map_err(|source| PkgError::Spawn {
            program: argv[0].clone(),
            source,
        })?;

    Ok(CommandOutput {
        argv,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        code: output.status.code(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_both_streams_and_exit_code() {
        let out = capture(Path::new("/bin/sh"), &["-c", "echo out; echo err >&2; exit 3"]).unwrap();
        assert_eq!(out.stdout.trim(), "out");
        assert_eq!(out.stderr.trim(), "err");
        assert_eq!(out.code, Some(3));
        assert!(out.checked().is_err());
    }

    #[test]
    fn arguments_are_not_shell_interpolated() {
        let out = capture(Path::new("/bin/echo"), &["$HOME; rm -rf /"]).unwrap();
        assert_eq!(out.stdout.trim(), "$HOME; rm -rf /");
    }

    #[test]
    fn missing_binary_is_spawn_error() {
        let err = capture(Path::new("/nonexistent/dotpkg-bin"), &["x"]).unwrap_err();
        assert!(matches!(err, PkgError::Spawn { .. }));
    }

    #[test]
    fn sudo_prefix_is_separate_argument() {
        let argv = sudo_argv(
            Path::new(SUDO),
            Path::new("/usr/bin/apt-get"),
            &["install", "-y", "git"],
        );
        assert_eq!(argv, vec!["sudo", "/usr/bin/apt-get", "install", "-y", "git"]);
    }

    #[test]
    fn elevation_program_is_replaceable() {
        let out = run_checked(
            Path::new("/bin/echo"),
            &["hello"],
            Some(Path::new("/usr/bin/env")),
        )
        .unwrap();
        assert_eq!(out.trim(), "hello");
    }
}
