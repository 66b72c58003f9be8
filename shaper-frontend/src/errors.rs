use shaper_engine::errors::EngineError;
use shaper_io::IoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrontendError {
    #[error(transparent)]
    Io(#[from] IoError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("生成 JSON 报告失败: {0}")]
    Json(#[from] serde_json::Error),
}
