use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use shaper_core::units::{DecimalSeparator, DisplayUnit, UnitPolicy, UnitSystem};
use thiserror::Error;

/// 应用配置的根结构。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub units: UnitConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

impl AppConfig {
    /// 从显式路径加载配置。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 自动发现配置文件：优先读取环境变量 `SHAPER_CONFIG`，否则寻找 `./config/default.toml`。
    /// 若文件缺失，则返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os("SHAPER_CONFIG") {
            return Self::from_file(PathBuf::from(path));
        }

        let default_path = env::current_dir()
            .map(|dir| dir.join("config").join("default.toml"))
            .map_err(|source| ConfigError::Context {
                message: "获取当前工作目录失败".to_string(),
                source,
            })?;

        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            Ok(Self::default())
        }
    }
}

/// 日志配置，支持设置默认等级。
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

/// 启动时的展示单位、小数分隔符，以及载入文档时是否按探测结果切换单位。
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct UnitConfig {
    #[serde(default)]
    pub default_unit: DisplayUnit,
    #[serde(default)]
    pub decimal_separator: DecimalSeparator,
    #[serde(default)]
    pub policy: UnitPolicy,
}

impl UnitConfig {
    pub fn unit_system(&self) -> UnitSystem {
        UnitSystem::new(self.default_unit, self.decimal_separator)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    /// 未指定输出路径时追加到输入文件名主干之后。
    #[serde(default = "ExportConfig::default_file_suffix")]
    pub file_suffix: String,
}

impl ExportConfig {
    fn default_file_suffix() -> String {
        "-shaper".to_string()
    }

    /// `panel.svg` → `panel-shaper.svg`，输出与输入位于同一目录。
    pub fn derive_output_path(&self, input: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "drawing".to_string());
        input.with_file_name(format!("{stem}{}.svg", self.file_suffix))
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            file_suffix: Self::default_file_suffix(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path:?} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
}
