use std::env;
use std::path::{Path, PathBuf};

use shaper_core::document::Document;
use shaper_core::units::{UnitPolicy, UnitSystem};
use shaper_engine::model::{LoadObserver, MasterModel};
use shaper_io::{DocumentLoader, SvgFacade};
use tracing::{debug, info, warn};

use crate::errors::FrontendError;

/// 环境变量中指定的示例文件，未给出输入路径时使用。
pub const SAMPLE_ENV: &str = "SHAPER_CLI_SAMPLE_SVG";

/// 内置示例图纸，英寸单位，含一组已标注的参数。
pub const DEMO_SVG: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="no"?>
<svg xmlns="http://www.w3.org/2000/svg" xmlns:shaper="http://www.shapertools.com/namespaces/shaper" width="6in" height="4in" viewBox="0 0 6 4">
  <rect x="0.5" y="0.5" width="5" height="3" shaper:cutType="outside" shaper:cutDepth="0.75in" shaper:toolDia="0.25in"/>
  <circle cx="2" cy="2" r="0.5" shaper:cutType="pocket" shaper:cutDepth="0.25in"/>
  <path d="M 3.5 1.5 L 5 1.5 L 5 2.5 Z"/>
  <text x="1" y="3.8">demo</text>
</svg>
"#;

/// 文档来源，便于前端呈现加载信息。
#[derive(Debug, Clone)]
pub enum DocumentSource {
    File(PathBuf),
    Demo,
}

impl DocumentSource {
    pub fn path(&self) -> Option<&Path> {
        match self {
            DocumentSource::File(path) => Some(path),
            DocumentSource::Demo => None,
        }
    }
}

/// 统一封装加载后的模型与来源。
#[derive(Debug)]
pub struct LoadedDocument {
    pub model: MasterModel,
    pub source: DocumentSource,
}

/// 把载入事件写入日志的观察者。
#[derive(Debug, Default)]
pub struct LoggingObserver;

impl LoadObserver for LoggingObserver {
    fn loaded(&mut self, document: &Document, canonical_text: &str, file_name: &str) {
        info!(
            file_name,
            drawables = document.drawables().count(),
            canonical_bytes = canonical_text.len(),
            "文档已就绪"
        );
    }
}

/// 加载显式路径；未给出时尝试 `SHAPER_CLI_SAMPLE_SVG`，失败则回退到内置示例。
/// 显式路径加载失败直接返回错误。
pub fn load_document(
    input: Option<&Path>,
    units: UnitSystem,
    policy: UnitPolicy,
) -> Result<LoadedDocument, FrontendError> {
    let mut model = MasterModel::with_units(units, policy);
    model.subscribe(Box::new(LoggingObserver));
    let loader = SvgFacade::new();

    if let Some(path) = input {
        let source = loader.load(path)?;
        model.load(&source.text, &source.file_name)?;
        return Ok(LoadedDocument {
            model,
            source: DocumentSource::File(path.to_path_buf()),
        });
    }

    if let Some(path) = env::var_os(SAMPLE_ENV) {
        let path = PathBuf::from(path);
        let loaded = loader
            .load(&path)
            .map_err(FrontendError::from)
            .and_then(|source| {
                model
                    .load(&source.text, &source.file_name)
                    .map(|_| ())
                    .map_err(FrontendError::from)
            });
        match loaded {
            Ok(()) => {
                return Ok(LoadedDocument {
                    model,
                    source: DocumentSource::File(path),
                });
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "加载示例 SVG 失败，回退到内置示例");
            }
        }
    }

    debug!("使用内置示例图纸");
    model.load(DEMO_SVG, "demo.svg")?;
    Ok(LoadedDocument {
        model,
        source: DocumentSource::Demo,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use shaper_core::attributes::MeasureAttr;
    use shaper_core::units::DisplayUnit;
    use std::fs;

    #[test]
    fn demo_drawing_is_seeded_in_inches() {
        let mut model = MasterModel::new();
        model.load(DEMO_SVG, "demo.svg").expect("demo parses");
        assert_eq!(model.unit_system().unit, DisplayUnit::In);
        assert_eq!(model.drawable_ids().len(), 3);
        assert_eq!(model.store().len(), 2);
        let rect = model.drawable_ids()[0].clone();
        assert_eq!(model.get(&rect).measurement(MeasureAttr::ToolDia), Some(24.0));
    }

    #[test]
    fn explicit_path_is_loaded() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("part.svg");
        fs::write(&path, "<svg><line x1=\"0\" y1=\"0\" x2=\"1\" y2=\"1\"/></svg>").expect("write svg");

        let loaded = load_document(Some(&path), UnitSystem::default(), UnitPolicy::Preserve)
            .expect("load part");
        assert_eq!(loaded.source.path(), Some(path.as_path()));
        assert_eq!(loaded.model.file_name(), Some("part.svg"));
        assert_eq!(loaded.model.drawable_ids().len(), 1);
    }

    #[test]
    fn missing_explicit_path_is_an_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let err = load_document(
            Some(&dir.path().join("absent.svg")),
            UnitSystem::default(),
            UnitPolicy::Detect,
        )
        .unwrap_err();
        assert!(matches!(err, FrontendError::Io(_)));
    }
}
