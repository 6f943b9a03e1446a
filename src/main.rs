use anyhow::{anyhow, Result};
use dotpkg::{Config, HostContext, OutputLine, Package};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let config = Config::load_or_default()?;
    let ctx = HostContext::new(config);
    let command = std::env::args().nth(1).unwrap_or_else(|| "outdated".to_string());

    match command.as_str() {
        "outdated" => print_packages(&ctx.check_dotfiles_updates()?),
        "all" => print_packages(&ctx.check_all_updates()?),
        "update-all" => update_all(&ctx).await?,
        other => {
            eprintln!("未知命令: {}", other);
            eprintln!("用法: dotpkg [outdated|all|update-all]");
            std::process::exit(2);
        }
    }

    Ok(())
}

fn print_packages(packages: &[Package]) {
    if packages.is_empty() {
        println!("所有包都是最新的");
        return;
    }
    for p in packages {
        println!("{:<24} {} -> {}  ({})", p.name, p.version, p.latest_version, p.manager);
    }
}

/// 通过当前平台的包管理器流式更新全部包，Ctrl+C 取消
async fn update_all(ctx: &HostContext) -> Result<()> {
    let pm = ctx
        .detect_manager()
        .ok_or_else(|| anyhow!("平台 {} 没有可用的包管理器", ctx.detect_platform()))?;
    println!("使用 {} 更新全部包...", pm.name());

    let cancel = CancellationToken::new();
    let mut cmd = pm.update_all_streaming(&cancel)?;

    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    while let Some(line) = cmd.next_line().await {
        match line {
            OutputLine::Stdout(s) => println!("{}", s),
            OutputLine::Stderr(s) => eprintln!("⚠ {}", s),
            OutputLine::Progress(s) => eprint!("\r{}", s),
        }
    }

    cmd.wait().await?;
    println!("更新完成");
    Ok(())
}
