mod writer;

use std::fs;
use std::path::{Path, PathBuf};

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use thiserror::Error;
use tracing::{debug, trace};
use shaper_core::document::{
    Attribute, Document, Element, ElementId, IDENTITY_ATTRIBUTE, Node,
};

pub use writer::{SerializeOptions, serialize, serialize_export};

#[derive(Debug, Error)]
pub enum IoError {
    #[error("malformed XML at byte {position}: {message}")]
    Parse { message: String, position: u64 },
    #[error("failed to read file {path:?}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write file {path:?}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize document: {0}")]
    Serialize(String),
}

/// 读取到的原始文件内容。
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub text: String,
    pub file_name: String,
}

/// 文件读取协作者：产出 `(text, file_name)`。
pub trait DocumentLoader {
    fn load(&self, path: &Path) -> Result<SourceFile, IoError>;
}

/// 文件保存协作者：接收导出文本。
pub trait DocumentSaver {
    fn save(&self, text: &str, path: &Path) -> Result<(), IoError>;
}

pub struct SvgFacade;

impl SvgFacade {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SvgFacade {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentLoader for SvgFacade {
    fn load(&self, path: &Path) -> Result<SourceFile, IoError> {
        let text = fs::read_to_string(path).map_err(|source| IoError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        debug!(path = %path.display(), bytes = text.len(), "已读取 SVG 文件");
        Ok(SourceFile { text, file_name })
    }
}

impl DocumentSaver for SvgFacade {
    fn save(&self, text: &str, path: &Path) -> Result<(), IoError> {
        fs::write(path, text).map_err(|source| IoError::WriteError {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), bytes = text.len(), "已写出 SVG 文件");
        Ok(())
    }
}

/// 解析 XML 文本。失败时不会产出任何部分文档。
pub fn parse_document(text: &str) -> Result<Document, IoError> {
    XmlParser::new(text).parse()
}

struct XmlParser<'a> {
    reader: Reader<&'a [u8]>,
}

/// 解析过程中的节点栈；根元素闭合前的节点进入 `prolog`，之后进入 `epilog`。
#[derive(Default)]
struct TreeBuilder {
    stack: Vec<Element>,
    root: Option<Element>,
    prolog: Vec<Node>,
    epilog: Vec<Node>,
}

impl TreeBuilder {
    fn attach(&mut self, node: Node) -> Result<(), String> {
        if let Some(parent) = self.stack.last_mut() {
            parent.children.push(node);
            return Ok(());
        }
        match node {
            Node::Element(element) => {
                if self.root.is_some() {
                    return Err(format!("second root element <{}>", element.name));
                }
                self.root = Some(element);
                Ok(())
            }
            Node::Text(text) if text.trim().is_empty() => {
                self.outside_root().push(Node::Text(text));
                Ok(())
            }
            Node::Text(_) | Node::CData(_) => Err("text content outside the root element".to_string()),
            other => {
                self.outside_root().push(other);
                Ok(())
            }
        }
    }

    /// 连续的文本与实体引用合并为一个文本节点。
    fn append_text(&mut self, raw: &str) -> Result<(), String> {
        if let Some(parent) = self.stack.last_mut() {
            push_text(&mut parent.children, raw);
            return Ok(());
        }
        if !raw.trim().is_empty() {
            return Err("text content outside the root element".to_string());
        }
        push_text(self.outside_root(), raw);
        Ok(())
    }

    fn outside_root(&mut self) -> &mut Vec<Node> {
        if self.root.is_none() {
            &mut self.prolog
        } else {
            &mut self.epilog
        }
    }

    fn finish(self) -> Result<Document, String> {
        if let Some(open) = self.stack.last() {
            return Err(format!("unclosed element <{}>", open.name));
        }
        let root = self.root.ok_or_else(|| "document has no root element".to_string())?;
        Ok(Document {
            prolog: self.prolog,
            root,
            epilog: self.epilog,
        })
    }
}

impl<'a> XmlParser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            reader: Reader::from_str(source),
        }
    }

    fn parse(mut self) -> Result<Document, IoError> {
        let mut builder = TreeBuilder::default();
        loop {
            let event = match self.reader.read_event() {
                Ok(event) => event,
                Err(err) => {
                    return Err(IoError::Parse {
                        message: err.to_string(),
                        position: self.reader.error_position() as u64,
                    });
                }
            };
            let step = match event {
                Event::Start(start) => self.open_element(&start).map(|element| {
                    builder.stack.push(element);
                }),
                Event::Empty(start) => self
                    .open_element(&start)
                    .and_then(|element| builder.attach(Node::Element(element))),
                Event::End(_) => match builder.stack.pop() {
                    Some(element) => builder.attach(Node::Element(element)),
                    None => Err("unexpected closing tag".to_string()),
                },
                Event::Text(text) => utf8(&text).and_then(|raw| builder.append_text(&raw)),
                Event::GeneralRef(reference) => {
                    utf8(&reference).and_then(|name| builder.append_text(&format!("&{name};")))
                }
                Event::CData(data) => utf8(&data).and_then(|raw| builder.attach(Node::CData(raw))),
                Event::Comment(comment) => {
                    utf8(&comment).and_then(|raw| builder.attach(Node::Comment(raw)))
                }
                Event::Decl(decl) => {
                    utf8(&decl).and_then(|raw| builder.attach(Node::Declaration(raw)))
                }
                Event::PI(pi) => {
                    utf8(&pi).and_then(|raw| builder.attach(Node::ProcessingInstruction(raw)))
                }
                Event::DocType(doctype) => {
                    utf8(&doctype).and_then(|raw| builder.attach(Node::DocType(raw)))
                }
                Event::Eof => break,
            };
            step.map_err(|message| self.malformed(message))?;
        }
        let document = builder.finish().map_err(|message| self.malformed(message))?;
        trace!(elements = document.elements().count(), "XML 解析完成");
        Ok(document)
    }

    /// 读取标签名与属性；身份标记属性提升为元素字段。
    fn open_element(&self, start: &BytesStart<'_>) -> Result<Element, String> {
        let mut element = Element::new(utf8(start.name().as_ref())?);
        for attribute in start.attributes() {
            let attribute = attribute.map_err(|err| err.to_string())?;
            let name = utf8(attribute.key.as_ref())?;
            let raw = utf8(&attribute.value)?;
            if name == IDENTITY_ATTRIBUTE {
                element.set_identity(ElementId::new(raw));
            } else {
                element.attributes.push(Attribute::from_raw(name, raw));
            }
        }
        Ok(element)
    }

    fn malformed(&self, message: String) -> IoError {
        IoError::Parse {
            message,
            position: self.reader.buffer_position() as u64,
        }
    }
}

fn push_text(siblings: &mut Vec<Node>, raw: &str) {
    match siblings.last_mut() {
        Some(Node::Text(existing)) => existing.push_str(raw),
        _ => siblings.push(Node::Text(raw.to_string())),
    }
}

fn utf8(bytes: &[u8]) -> Result<String, String> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|err| format!("invalid UTF-8: {err}"))
}
