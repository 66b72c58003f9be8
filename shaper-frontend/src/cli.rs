use std::fmt::Write as _;
use std::path::PathBuf;

use serde::Serialize;
use shaper_config::AppConfig;
use shaper_core::attributes::{AttributeSummary, MeasureAttr, ValueRange};
use shaper_core::units::{DecimalSeparator, DisplayUnit, UnitPolicy};
use shaper_engine::command::{CommandBus, CommandContext, CommandRequest};
use shaper_engine::model::MasterModel;
use shaper_io::SvgFacade;
use tracing::{info, warn};

use crate::errors::FrontendError;
use crate::loader::{DocumentSource, load_document};

/// 命令行一次运行的参数。
#[derive(Debug, Clone, Default)]
pub struct CliOptions {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    /// 覆盖配置中的展示单位；给出时载入后不再按探测结果切换。
    pub unit: Option<DisplayUnit>,
    pub separator: Option<DecimalSeparator>,
    pub commands: Vec<String>,
    pub json: bool,
}

/// 一次运行的结果。
#[derive(Debug)]
pub struct RunOutcome {
    pub source: DocumentSource,
    pub report: String,
    pub export_path: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct ElementRow {
    id: String,
    kind: String,
    cut_depth: Option<String>,
    cut_offset: Option<String>,
    tool_dia: Option<String>,
    cut_type: Option<String>,
}

#[derive(Debug, Serialize)]
struct ModelReport {
    file_name: Option<String>,
    unit: String,
    decimal_separator: String,
    detected_unit: Option<String>,
    elements: Vec<ElementRow>,
    summary: AttributeSummary,
}

/// 载入文档、依次执行命令、生成报告并导出。
pub fn run(options: &CliOptions, config: &AppConfig) -> Result<RunOutcome, FrontendError> {
    let mut units = config.units.unit_system();
    let mut policy = config.units.policy;
    if let Some(unit) = options.unit {
        units.unit = unit;
        policy = UnitPolicy::Preserve;
    }
    if let Some(separator) = options.separator {
        units.decimal_separator = separator;
    }

    let loaded = load_document(options.input.as_deref(), units, policy)?;
    let mut model = loaded.model;
    let source = loaded.source;
    match &source {
        DocumentSource::File(path) => info!(path = %path.display(), "已从文件加载文档"),
        DocumentSource::Demo => info!("已加载内置示例图纸"),
    }

    let bus = CommandBus::new();
    let mut context = CommandContext { model: &mut model };
    for line in &options.commands {
        if let Err(err) = dispatch_cli_command(&bus, line, &mut context) {
            warn!(command = line.as_str(), "CLI 命令执行失败: {err}");
        }
    }

    let report = if options.json {
        render_json(&model)?
    } else {
        render_text(&model)
    };

    let export_path = options.output.clone().or_else(|| {
        source
            .path()
            .map(|input| config.export.derive_output_path(input))
    });
    let export_path = match export_path {
        Some(path) if model.document().is_some() => {
            model.write_export(&SvgFacade::new(), &path)?;
            Some(path)
        }
        Some(_) => {
            info!("模型已清空，跳过导出");
            None
        }
        None => None,
    };

    Ok(RunOutcome {
        source,
        report,
        export_path,
    })
}

fn dispatch_cli_command(
    bus: &CommandBus,
    line: &str,
    context: &mut CommandContext<'_>,
) -> Result<(), String> {
    let Some(request) = CommandRequest::parse(line) else {
        return Err("空命令".to_string());
    };
    let response = bus.dispatch(&request, context);
    if response.success {
        if let Some(message) = response.message {
            println!("[命令] {message}");
        }
        Ok(())
    } else {
        Err(response.message.unwrap_or_else(|| "未知错误".to_string()))
    }
}

fn element_rows(model: &MasterModel) -> Vec<ElementRow> {
    let Some(document) = model.document() else {
        return Vec::new();
    };
    document
        .drawables()
        .filter_map(|element| {
            let id = element.identity()?;
            let record = model.get(id);
            Some(ElementRow {
                id: id.to_string(),
                kind: element.local_name().to_string(),
                cut_depth: model.display_value(id, MeasureAttr::CutDepth),
                cut_offset: model.display_value(id, MeasureAttr::CutOffset),
                tool_dia: model.display_value(id, MeasureAttr::ToolDia),
                cut_type: record.cut_type().map(str::to_string),
            })
        })
        .collect()
}

/// 每个可绘制元素一行，最后附上汇总。
pub fn render_text(model: &MasterModel) -> String {
    let units = model.unit_system();
    let mut out = String::new();
    let _ = writeln!(
        out,
        "文件: {}  单位: {}  小数分隔符: `{}`",
        model.file_name().unwrap_or("<无>"),
        units.unit,
        units.decimal_separator.as_char()
    );
    let _ = writeln!(
        out,
        "{:<12} {:<9} {:>10} {:>10} {:>10}  {}",
        "id", "kind", "cutDepth", "cutOffset", "toolDia", "cutType"
    );
    for row in element_rows(model) {
        let _ = writeln!(
            out,
            "{:<12} {:<9} {:>10} {:>10} {:>10}  {}",
            row.id,
            row.kind,
            row.cut_depth.as_deref().unwrap_or("-"),
            row.cut_offset.as_deref().unwrap_or("-"),
            row.tool_dia.as_deref().unwrap_or("-"),
            row.cut_type.as_deref().unwrap_or("-"),
        );
    }

    let summary = model.summary();
    let cut_types: Vec<&str> = summary.cut_types.iter().map(String::as_str).collect();
    let _ = writeln!(out, "已标注元素: {}", summary.record_count);
    let _ = writeln!(out, "切割类型: [{}]", cut_types.join(", "));
    let _ = writeln!(out, "切割深度: {}", describe_range(summary.cut_depth_mm, model));
    let _ = writeln!(out, "切割偏移: {}", describe_range(summary.cut_offset_mm, model));
    let _ = writeln!(out, "刀具直径: [{}] mm", summary.tool_diameters_mm.join(", "));
    out
}

pub fn render_json(model: &MasterModel) -> Result<String, FrontendError> {
    let units = model.unit_system();
    let report = ModelReport {
        file_name: model.file_name().map(str::to_string),
        unit: units.unit.to_string(),
        decimal_separator: units.decimal_separator.as_char().to_string(),
        detected_unit: model.detected_unit().map(|unit| unit.to_string()),
        elements: element_rows(model),
        summary: model.summary(),
    };
    Ok(serde_json::to_string_pretty(&report)?)
}

fn describe_range(range: Option<ValueRange>, model: &MasterModel) -> String {
    let units = model.unit_system();
    match range {
        Some(range) => format!("{} ~ {} mm", units.format(range.min), units.format(range.max)),
        None => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const PART: &str = r#"<svg xmlns:shaper="http://www.shapertools.com/namespaces/shaper" width="40mm" height="20mm"><rect width="10" height="10" shaper:cutDepth="3mm"/><circle r="4"/></svg>"#;

    fn write_part(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("part.svg");
        fs::write(&path, PART).expect("write part");
        path
    }

    #[test]
    fn run_exports_next_to_input() {
        let dir = tempfile::tempdir().expect("temp dir");
        let input = write_part(&dir);
        let options = CliOptions {
            input: Some(input.clone()),
            ..CliOptions::default()
        };

        let outcome = run(&options, &AppConfig::default()).expect("run");
        let export_path = outcome.export_path.expect("export path");
        assert_eq!(export_path, dir.path().join("part-shaper.svg"));
        let exported = fs::read_to_string(&export_path).expect("read export");
        assert!(exported.contains(r#"shaper:cutDepth="3.0mm""#));
        assert!(!exported.contains("data-shaper-id"));
        assert!(outcome.report.contains("cutDepth"));
        assert!(outcome.report.contains("3.0mm"));
    }

    #[test]
    fn commands_apply_before_export() {
        let dir = tempfile::tempdir().expect("temp dir");
        let input = write_part(&dir);
        let output = dir.path().join("out.svg");

        let mut model = MasterModel::new();
        model.load(PART, "part.svg").expect("load for ids");
        // 先写回带身份标识的规范文本，命令才能引用已知标识。
        fs::write(&input, model.canonical_text().expect("canonical")).expect("rewrite input");
        let circle = model.drawable_ids()[1].to_string();

        let options = CliOptions {
            input: Some(input),
            output: Some(output.clone()),
            unit: Some(DisplayUnit::In),
            separator: Some(DecimalSeparator::Comma),
            commands: vec![
                format!("set_measurement {circle} toolDia 0,125"),
                format!("set_cut_type {circle} inside"),
                "unknown_command".to_string(),
            ],
            json: false,
        };
        let outcome = run(&options, &AppConfig::default()).expect("run");
        assert_eq!(outcome.export_path.as_deref(), Some(output.as_path()));

        let exported = fs::read_to_string(&output).expect("read export");
        assert!(exported.contains(r#"shaper:toolDia="0.125in""#));
        assert!(exported.contains(r#"shaper:cutType="inside""#));
        assert!(outcome.report.contains("0,125in"));
        assert!(outcome.report.contains("单位: in"));
    }

    #[test]
    fn json_report_lists_elements_and_summary() {
        let mut model = MasterModel::new();
        model.load(PART, "part.svg").expect("load");
        let report = render_json(&model).expect("json");
        let value: serde_json::Value = serde_json::from_str(&report).expect("valid json");

        assert_eq!(value["file_name"], "part.svg");
        assert_eq!(value["unit"], "mm");
        assert_eq!(value["elements"].as_array().map(Vec::len), Some(2));
        assert_eq!(value["elements"][0]["kind"], "rect");
        assert_eq!(value["elements"][0]["cut_depth"], "3.0mm");
        assert!(value["elements"][1]["cut_depth"].is_null());
        assert_eq!(value["summary"]["record_count"], 1);
    }

    #[test]
    fn clear_command_skips_export() {
        let dir = tempfile::tempdir().expect("temp dir");
        let input = write_part(&dir);
        let options = CliOptions {
            input: Some(input),
            commands: vec!["clear".to_string()],
            ..CliOptions::default()
        };
        let outcome = run(&options, &AppConfig::default()).expect("run");
        assert!(outcome.export_path.is_none());
        assert!(!dir.path().join("part-shaper.svg").exists());
    }
}
