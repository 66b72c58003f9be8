use std::path::PathBuf;

use shaper_core::document::{NamespaceScope, Node};
use shaper_io::{
    DocumentLoader, DocumentSaver, IoError, SerializeOptions, SvgFacade, parse_document,
    serialize, serialize_export,
};

fn fixture(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests/data");
    path.push(name);
    path
}

#[test]
fn load_annotated_panel() {
    let source = SvgFacade::new()
        .load(&fixture("annotated_panel.svg"))
        .expect("读取 SVG 失败");
    assert_eq!(source.file_name, "annotated_panel.svg");

    let document = parse_document(&source.text).expect("解析 SVG 失败");
    assert_eq!(document.drawables().count(), 3);
    assert!(matches!(document.prolog.first(), Some(Node::Declaration(_))));

    let rect = document
        .drawables()
        .find(|element| element.local_name() == "rect")
        .expect("未找到 rect");
    assert_eq!(rect.attribute("shaper:cutDepth").as_deref(), Some("10mm"));
    assert_eq!(rect.attribute("shaper:toolDia").as_deref(), Some("3.175mm"));
}

#[test]
fn canonical_serialization_is_lossless() {
    let text = std::fs::read_to_string(fixture("annotated_panel.svg")).expect("读取 SVG 失败");
    let document = parse_document(&text).expect("解析 SVG 失败");
    let output = serialize(&document, SerializeOptions::default()).expect("序列化失败");
    assert_eq!(output, text);
}

#[test]
fn prefixed_namespace_is_resolved() {
    let text = std::fs::read_to_string(fixture("prefixed_namespace.svg")).expect("读取 SVG 失败");
    let document = parse_document(&text).expect("解析 SVG 失败");

    let mut found = Vec::new();
    document
        .root
        .walk_scoped(&mut NamespaceScope::default(), &mut |element, scope| {
            for attribute in &element.attributes {
                if scope.is_shaper_attribute(attribute) {
                    found.push((element.local_name().to_string(), attribute.local_name().to_string()));
                }
            }
        });
    assert_eq!(found, vec![("line".to_string(), "cutDepth".to_string())]);
}

#[test]
fn broken_file_reports_parse_error() {
    let text = std::fs::read_to_string(fixture("broken.svg")).expect("读取 SVG 失败");
    match parse_document(&text) {
        Err(IoError::Parse { position, .. }) => assert!(position > 0),
        other => panic!("expected parse error, got {other:?}"),
    }
}

#[test]
fn missing_file_reports_read_error() {
    let err = SvgFacade::new()
        .load(&fixture("does_not_exist.svg"))
        .expect_err("文件不存在时应失败");
    assert!(matches!(err, IoError::ReadError { .. }));
}

#[test]
fn saver_writes_export_text() {
    let text = std::fs::read_to_string(fixture("annotated_panel.svg")).expect("读取 SVG 失败");
    let exported = serialize_export(parse_document(&text).expect("解析 SVG 失败")).expect("导出失败");
    assert_eq!(exported.matches("xmlns:shaper=").count(), 1);

    let dir = tempfile::tempdir().expect("create temp dir");
    let target = dir.path().join("panel-shaper.svg");
    SvgFacade::new().save(&exported, &target).expect("写出失败");
    assert_eq!(std::fs::read_to_string(&target).expect("read back"), exported);
}
