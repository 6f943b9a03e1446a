//! 流式命令执行（install / update / update-all）
//!
//! 每个进程由两个读取任务分别排空 stdout 和 stderr，写入同一个有界 channel；
//! 监督任务在两个读取任务结束后关闭输出 channel，再回收进程并发布退出结果。
//! 同一个流内的行序保持不变，两个流之间只保证大致有序。

use super::exec::{argv_of, sudo_argv};
use super::parser::LineSplitter;
use super::types::OutputLine;
use crate::config::Config;
use crate::error::{PkgError, Result};
use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// 流式执行参数
#[derive(Debug, Clone, Copy)]
pub struct StreamOptions {
    /// 输出 channel 容量
    pub buffer: usize,
    /// 取消时先向进程组发 SIGTERM，超过该时间仍未退出则 SIGKILL
    pub kill_grace: Duration,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            buffer: 256,
            kill_grace: Duration::from_secs(3),
        }
    }
}

impl From<&Config> for StreamOptions {
    fn from(config: &Config) -> Self {
        Self {
            buffer: config.output_buffer.max(1),
            kill_grace: Duration::from_millis(config.kill_grace_ms),
        }
    }
}

/// 一个正在运行的外部进程
///
/// - 输出 channel 在两个读取任务都结束后关闭，且只关闭一次
/// - 完成信号在进程被回收后发布，`Ok(())` 表示退出码为 0
/// - `cancel()` 终止整个进程组，并解除所有等待中的 channel 操作
#[derive(Debug)]
pub struct StreamingCmd {
    output: mpsc::Receiver<OutputLine>,
    done: oneshot::Receiver<Result<()>>,
    cancel: CancellationToken,
}

impl StreamingCmd {
    /// 下一行输出；channel 关闭后返回 `None`
    pub async fn next_line(&mut self) -> Option<OutputLine> {
        self.output.recv().await
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// 可在其他任务中持有的取消句柄
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 等待进程结束。
    ///
    /// 未读完的输出会被丢弃，读取任务继续排空管道，不会因为没人读取而阻塞。
    /// 被取消时返回 `PkgError::Cancelled`。
    pub async fn wait(self) -> Result<()> {
        drop(self.output);
        match self.done.await {
            Ok(result) => result,
            Err(_) => Err(PkgError::Cancelled),
        }
    }

    /// 拆分为输出 channel、完成信号和取消句柄
    pub fn into_parts(
        self,
    ) -> (
        mpsc::Receiver<OutputLine>,
        oneshot::Receiver<Result<()>>,
        CancellationToken,
    ) {
        (self.output, self.done, self.cancel)
    }
}

/// 组合操作中的一步
#[derive(Debug, Clone)]
pub struct Step {
    pub label: String,
    pub argv: Vec<String>,
}

impl Step {
    pub fn new<S: AsRef<str>>(label: &str, program: &Path, args: &[S]) -> Self {
        Self {
            label: label.to_string(),
            argv: argv_of(program, args),
        }
    }

    /// 经由 `sudo` 指定的提权程序执行
    pub fn sudo<S: AsRef<str>>(label: &str, sudo: &Path, program: &Path, args: &[S]) -> Self {
        Self {
            label: label.to_string(),
            argv: sudo_argv(sudo, program, args),
        }
    }
}

/// 以默认参数流式运行 `program args...`
pub fn run_streaming<S: AsRef<str>>(
    ctx: &CancellationToken,
    program: &Path,
    args: &[S],
) -> Result<StreamingCmd> {
    spawn_streaming(ctx, StreamOptions::default(), argv_of(program, args))
}

pub fn run_streaming_with<S: AsRef<str>>(
    ctx: &CancellationToken,
    opts: StreamOptions,
    program: &Path,
    args: &[S],
) -> Result<StreamingCmd> {
    spawn_streaming(ctx, opts, argv_of(program, args))
}

/// 以 `sudo program args...` 的形式流式运行，参数逐个传递，不经过 shell
pub fn run_streaming_sudo<S: AsRef<str>>(
    ctx: &CancellationToken,
    opts: StreamOptions,
    sudo: &Path,
    program: &Path,
    args: &[S],
) -> Result<StreamingCmd> {
    spawn_streaming(ctx, opts, sudo_argv(sudo, program, args))
}

/// 顺序执行多个步骤，共用一个输出 channel。
///
/// 前一步完全结束且成功后才启动下一步；失败时后续步骤不会执行，
/// 错误以 `PkgError::Step` 标明失败的步骤。
pub fn run_steps(
    ctx: &CancellationToken,
    opts: StreamOptions,
    steps: Vec<Step>,
) -> Result<StreamingCmd> {
    let handle = runtime()?;
    let cancel = ctx.child_token();
    let (tx, rx) = mpsc::channel(opts.buffer.max(1));
    let (done_tx, done_rx) = oneshot::channel();

    let token = cancel.clone();
    handle.spawn(async move {
        let result = drive_steps(steps, opts, tx, token).await;
        let _ = done_tx.send(result);
    });

    Ok(StreamingCmd {
        output: rx,
        done: done_rx,
        cancel,
    })
}

async fn drive_steps(
    steps: Vec<Step>,
    opts: StreamOptions,
    tx: mpsc::Sender<OutputLine>,
    cancel: CancellationToken,
) -> Result<()> {
    for step in steps {
        if cancel.is_cancelled() {
            return Err(PkgError::Cancelled);
        }
        log::info!("开始步骤: {}", step.label);
        let mut inner = spawn_streaming(&cancel, opts, step.argv).map_err(|e| PkgError::Step {
            step: step.label.clone(),
            source: Box::new(e),
        })?;

        while let Some(line) = inner.next_line().await {
            if !forward(&tx, line, &cancel).await {
                break;
            }
        }

        match inner.wait().await {
            Ok(()) => {}
            Err(PkgError::Cancelled) => return Err(PkgError::Cancelled),
            Err(e) => {
                log::warn!("步骤 {} 失败: {}", step.label, e);
                return Err(PkgError::Step {
                    step: step.label,
                    source: Box::new(e),
                });
            }
        }
    }
    Ok(())
}

fn runtime() -> Result<tokio::runtime::Handle> {
    tokio::runtime::Handle::try_current()
        .map_err(|e| PkgError::Io(io::Error::new(io::ErrorKind::Other, e)))
}

fn spawn_streaming(
    ctx: &CancellationToken,
    opts: StreamOptions,
    argv: Vec<String>,
) -> Result<StreamingCmd> {
    let handle = runtime()?;
    let Some((program, args)) = argv.split_first() else {
        return Err(PkgError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            "命令不能为空",
        )));
    };

    log::debug!("stream: {}", argv.join(" "));

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    unsafe {
        cmd.pre_exec(|| {
            // 独立进程组，取消时可以一并终止 sudo 及其子进程
            libc::setpgid(0, 0);
            Ok(())
        });
    }

    let mut child = {
        let _guard = handle.enter();
        cmd.spawn().map_err(|source| PkgError::Spawn {
            program: program.clone(),
            source,
        })?
    };

    let cancel = ctx.child_token();
    let (tx, rx) = mpsc::channel(opts.buffer.max(1));
    let (done_tx, done_rx) = oneshot::channel();

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let out_task = handle.spawn(pump(stdout, false, tx.clone(), cancel.clone()));
    let err_task = handle.spawn(pump(stderr, true, tx, cancel.clone()));

    handle.spawn(supervise(
        child,
        argv,
        (out_task, err_task),
        opts.kill_grace,
        cancel.clone(),
        done_tx,
    ));

    Ok(StreamingCmd {
        output: rx,
        done: done_rx,
        cancel,
    })
}

/// 把一个流读成行发送到 channel，返回该流最后一条普通行
async fn pump<R>(
    reader: Option<R>,
    stderr: bool,
    tx: mpsc::Sender<OutputLine>,
    cancel: CancellationToken,
) -> Option<String>
where
    R: AsyncRead + Unpin,
{
    let mut reader = reader?;
    let mut splitter = LineSplitter::new(stderr);
    let mut buf = [0u8; 4096];
    let mut last = None;

    loop {
        let n = tokio::select! {
            _ = cancel.cancelled() => return last,
            r = reader.read(&mut buf) => match r {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    log::debug!("读取输出失败: {}", e);
                    break;
                }
            },
        };
        for line in splitter.push(&buf[..n]) {
            if !line.is_progress() {
                last = Some(line.text().to_string());
            }
            if !forward(&tx, line, &cancel).await {
                return last;
            }
        }
    }

    if let Some(line) = splitter.finish() {
        if !line.is_progress() {
            last = Some(line.text().to_string());
        }
        forward(&tx, line, &cancel).await;
    }
    last
}

/// 发送一行；接收端已关闭时静默丢弃，取消时返回 false
async fn forward(tx: &mpsc::Sender<OutputLine>, line: OutputLine, cancel: &CancellationToken) -> bool {
    if tx.is_closed() {
        return true;
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tx.send(line) => true,
    }
}

async fn supervise(
    mut child: Child,
    argv: Vec<String>,
    readers: (JoinHandle<Option<String>>, JoinHandle<Option<String>>),
    grace: Duration,
    cancel: CancellationToken,
    done_tx: oneshot::Sender<Result<()>>,
) {
    let (out_task, err_task) = readers;
    let drained = async {
        let (_, err) = tokio::join!(out_task, err_task);
        err.ok().flatten()
    };
    tokio::pin!(drained);

    let mut killed = false;
    let last_stderr = tokio::select! {
        last = &mut drained => last,
        _ = cancel.cancelled() => {
            terminate(&mut child, grace).await;
            killed = true;
            drained.await
        }
    };
    // 两个读取任务都已结束，全部 Sender 释放，输出 channel 此时关闭

    let status = if killed {
        child.wait().await
    } else {
        tokio::select! {
            s = child.wait() => s,
            _ = cancel.cancelled() => {
                terminate(&mut child, grace).await;
                killed = true;
                child.wait().await
            }
        }
    };

    let result = match status {
        _ if killed => Err(PkgError::Cancelled),
        Ok(s) if s.success() => Ok(()),
        Ok(s) => Err(PkgError::command(
            &argv,
            s.code(),
            last_stderr.as_deref().unwrap_or(""),
        )),
        Err(e) => Err(PkgError::Io(e)),
    };
    let _ = done_tx.send(result);
}

/// SIGTERM 整个进程组，超时后 SIGKILL
async fn terminate(child: &mut Child, grace: Duration) {
    if let Some(pid) = child.id() {
        log::info!("终止进程组 {}", pid);
        signal_group(pid, libc::SIGTERM);
        if tokio::time::timeout(grace, child.wait()).await.is_ok() {
            return;
        }
        log::warn!("进程组 {} 未响应 SIGTERM，发送 SIGKILL", pid);
        signal_group(pid, libc::SIGKILL);
    }
    let _ = child.start_kill();
}

fn signal_group(pid: u32, sig: libc::c_int) {
    unsafe {
        libc::kill(-(pid as i32), sig);
    }
}
