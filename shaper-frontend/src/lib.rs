pub mod cli;
pub mod errors;
pub mod loader;

use shaper_config::AppConfig;
use tracing::info;

use cli::CliOptions;
use errors::FrontendError;

/// 执行一次命令行会话：打印报告，导出后输出目标路径。
pub fn run_cli(options: &CliOptions, config: &AppConfig) -> Result<(), FrontendError> {
    info!(json = options.json, commands = options.commands.len(), "启动 CLI 前端");
    let outcome = cli::run(options, config)?;
    println!("{}", outcome.report);
    if let Some(path) = &outcome.export_path {
        println!("已导出: {}", path.display());
    }
    Ok(())
}
