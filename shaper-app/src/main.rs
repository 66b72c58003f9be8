use std::path::PathBuf;

use shaper_config::{AppConfig, ConfigError};
use shaper_core::units::{DecimalSeparator, DisplayUnit};
use shaper_frontend::cli::CliOptions;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

const USAGE: &str = "用法: shaper [--config PATH] [--unit mm|in] [--separator .|,] [--command \"CMD ARGS\"]... [--json] [INPUT [OUTPUT]]";

fn main() {
    let mut args = std::env::args().skip(1);
    let mut config_override: Option<PathBuf> = None;
    let mut options = CliOptions::default();
    let mut positional: Vec<PathBuf> = Vec::new();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let Some(path) = args.next() else {
                    eprintln!("`--config` 需要提供配置文件路径");
                    std::process::exit(1);
                };
                config_override = Some(PathBuf::from(path));
            }
            "--unit" => {
                let parsed = args.next().map(|raw| raw.parse::<DisplayUnit>());
                let Some(Ok(unit)) = parsed else {
                    eprintln!("`--unit` 只接受 mm 或 in");
                    std::process::exit(1);
                };
                options.unit = Some(unit);
            }
            "--separator" => {
                let parsed = args.next().map(|raw| raw.parse::<DecimalSeparator>());
                let Some(Ok(separator)) = parsed else {
                    eprintln!("`--separator` 只接受 . 或 ,");
                    std::process::exit(1);
                };
                options.separator = Some(separator);
            }
            "--command" => {
                let Some(command) = args.next() else {
                    eprintln!("`--command` 需要提供命令文本");
                    std::process::exit(1);
                };
                options.commands.push(command);
            }
            "--json" => options.json = true,
            "--help" | "-h" => {
                println!("{USAGE}");
                return;
            }
            other if other.starts_with("--") => {
                eprintln!("未知参数：{other}");
                eprintln!("{USAGE}");
                std::process::exit(1);
            }
            other => positional.push(PathBuf::from(other)),
        }
    }

    if positional.len() > 2 {
        eprintln!("{USAGE}");
        std::process::exit(1);
    }
    let mut positional = positional.into_iter();
    options.input = positional.next();
    options.output = positional.next();

    let (config, config_error) = match load_configuration(config_override) {
        Ok(config) => (config, None),
        Err(err) => (AppConfig::default(), Some(err)),
    };
    init_logging(&config);
    if let Some(err) = &config_error {
        report_config_error(err);
    }
    info!("启动 Shaper 属性编辑器");

    if let Err(err) = shaper_frontend::run_cli(&options, &config) {
        error!(error = %err, "执行 CLI 会话失败");
        std::process::exit(1);
    }
}

/// 显式路径优先，否则自动发现；失败由调用方在日志初始化后报告。
fn load_configuration(override_path: Option<PathBuf>) -> Result<AppConfig, ConfigError> {
    match override_path {
        Some(path) => AppConfig::from_file(path),
        None => AppConfig::discover(),
    }
}

fn report_config_error(err: &ConfigError) {
    match err {
        ConfigError::Io { path, .. } | ConfigError::Parse { path, .. } => {
            warn!(path = %path.display(), error = %err, "加载配置失败，使用内建默认值");
        }
        ConfigError::Context { .. } => {
            warn!(error = %err, "加载配置失败，使用内建默认值");
        }
    }
}

fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_new(config.logging.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if subscriber.try_init().is_err() {
        // 已初始化，忽略
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_override_path_is_an_io_error() {
        let path = std::env::temp_dir().join("shaper-app-missing-config.toml");
        let err = load_configuration(Some(path.clone())).unwrap_err();
        assert!(matches!(err, ConfigError::Io { path: ref failed, .. } if *failed == path));
    }
}
