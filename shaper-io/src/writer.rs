use std::borrow::Cow;

use quick_xml::Writer;
use quick_xml::events::attributes::Attribute as XmlAttribute;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesPI, BytesStart, BytesText, Event};
use quick_xml::name::QName;
use shaper_core::document::{
    Attribute, Document, Element, IDENTITY_ATTRIBUTE, Node, SHAPER_NAMESPACE,
};

use crate::IoError;

#[derive(Debug, Clone, Copy, Default)]
pub struct SerializeOptions {
    /// 输出身份标记属性（仅用于规范文本）。
    pub include_identity: bool,
}

impl SerializeOptions {
    pub fn canonical() -> Self {
        Self {
            include_identity: true,
        }
    }
}

/// 原样序列化整棵树。
pub fn serialize(document: &Document, options: SerializeOptions) -> Result<String, IoError> {
    let mut writer = Writer::new(Vec::new());
    for node in &document.prolog {
        write_node(&mut writer, node, options)?;
    }
    write_element(&mut writer, &document.root, options)?;
    for node in &document.epilog {
        write_node(&mut writer, node, options)?;
    }
    String::from_utf8(writer.into_inner()).map_err(|err| IoError::Serialize(err.to_string()))
}

/// 导出用序列化：剥离身份标记与所有指向 Shaper 命名空间的声明；
/// 只要树中用到导出前缀，命名空间恰好在根元素上声明一次。
/// 绑定到其他命名空间的同名前缀原样保留，此时改用 [`Document::export_prefix`] 选出的空闲前缀。
pub fn serialize_export(mut document: Document) -> Result<String, IoError> {
    let prefix = document.export_prefix();
    let shaper_declaration = format!("xmlns:{prefix}");
    document.for_each_element_mut(|element| {
        element.clear_identity();
        element
            .attributes
            .retain(|attr| !attr.declares_shaper_namespace());
    });
    if document.uses_prefix(&prefix) {
        let root = &mut document.root;
        let position = root
            .attributes
            .iter()
            .rposition(|attr| attr.name == "xmlns" || attr.declared_prefix().is_some())
            .map(|idx| idx + 1)
            .unwrap_or(0);
        root.attributes.insert(
            position,
            Attribute::new(shaper_declaration, SHAPER_NAMESPACE),
        );
    }
    serialize(&document, SerializeOptions::default())
}

fn write_element(
    writer: &mut Writer<Vec<u8>>,
    element: &Element,
    options: SerializeOptions,
) -> Result<(), IoError> {
    let mut start = BytesStart::new(element.name.as_str());
    if options.include_identity {
        if let Some(id) = element.identity() {
            start.push_attribute(raw_attribute(IDENTITY_ATTRIBUTE, id.as_str()));
        }
    }
    for attribute in &element.attributes {
        start.push_attribute(raw_attribute(&attribute.name, attribute.raw_value()));
    }

    if element.children.is_empty() {
        return emit(writer, Event::Empty(start));
    }
    emit(writer, Event::Start(start))?;
    for child in &element.children {
        write_node(writer, child, options)?;
    }
    emit(writer, Event::End(BytesEnd::new(element.name.as_str())))
}

fn write_node(
    writer: &mut Writer<Vec<u8>>,
    node: &Node,
    options: SerializeOptions,
) -> Result<(), IoError> {
    match node {
        Node::Element(element) => write_element(writer, element, options),
        Node::Text(raw) => emit(writer, Event::Text(BytesText::from_escaped(raw.as_str()))),
        Node::CData(raw) => emit(writer, Event::CData(BytesCData::new(raw.as_str()))),
        Node::Comment(raw) => emit(writer, Event::Comment(BytesText::from_escaped(raw.as_str()))),
        Node::ProcessingInstruction(raw) => emit(writer, Event::PI(BytesPI::new(raw.as_str()))),
        Node::Declaration(raw) => emit(
            writer,
            Event::Decl(BytesDecl::from_start(BytesStart::from_content(raw.as_str(), 3))),
        ),
        Node::DocType(raw) => emit(writer, Event::DocType(BytesText::from_escaped(raw.as_str()))),
    }
}

/// 取值已是转义形式，直接写出，避免二次转义。
fn raw_attribute<'a>(name: &'a str, raw_value: &'a str) -> XmlAttribute<'a> {
    XmlAttribute {
        key: QName(name.as_bytes()),
        value: Cow::Borrowed(raw_value.as_bytes()),
    }
}

fn emit(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), IoError> {
    writer
        .write_event(event)
        .map_err(|err| IoError::Serialize(err.to_string()))
}
