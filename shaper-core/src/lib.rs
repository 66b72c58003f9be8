pub mod attributes;
pub mod units;

pub mod document {
    use std::borrow::Cow;
    use std::fmt;

    use quick_xml::escape::{escape, unescape};
    use serde::{Deserialize, Serialize};

    /// Shaper 制造参数所在的 XML 命名空间。
    pub const SHAPER_NAMESPACE: &str = "http://www.shapertools.com/namespaces/shaper";
    pub const SHAPER_PREFIX: &str = "shaper";
    /// 身份标记属性，仅出现在规范文本中，导出时必须剥离。
    pub const IDENTITY_ATTRIBUTE: &str = "data-shaper-id";

    /// 可绘制元素（按本地名匹配，忽略前缀）。
    pub const DRAWABLE_KINDS: [&str; 7] = [
        "path", "rect", "circle", "ellipse", "line", "polyline", "polygon",
    ];

    #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    pub struct ElementId(String);

    impl ElementId {
        #[inline]
        pub fn new(raw: impl Into<String>) -> Self {
            Self(raw.into())
        }

        #[inline]
        pub fn as_str(&self) -> &str {
            &self.0
        }
    }

    impl fmt::Display for ElementId {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(&self.0)
        }
    }

    /// XML 属性。取值以转义后的原始形式保存，未知实体引用得以原样回写。
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Attribute {
        pub name: String,
        raw_value: String,
    }

    impl Attribute {
        pub fn new(name: impl Into<String>, value: &str) -> Self {
            Self {
                name: name.into(),
                raw_value: escape(value).into_owned(),
            }
        }

        #[inline]
        pub fn from_raw(name: impl Into<String>, raw_value: impl Into<String>) -> Self {
            Self {
                name: name.into(),
                raw_value: raw_value.into(),
            }
        }

        #[inline]
        pub fn raw_value(&self) -> &str {
            &self.raw_value
        }

        /// 反转义后的取值；含有无法识别的实体时退回原始文本。
        pub fn value(&self) -> Cow<'_, str> {
            unescape(&self.raw_value).unwrap_or(Cow::Borrowed(self.raw_value.as_str()))
        }

        #[inline]
        pub fn prefix(&self) -> Option<&str> {
            split_qualified(&self.name).0
        }

        #[inline]
        pub fn local_name(&self) -> &str {
            split_qualified(&self.name).1
        }

        /// 形如 `xmlns:prefix` 的命名空间声明，返回声明的前缀。
        pub fn declared_prefix(&self) -> Option<&str> {
            self.name.strip_prefix("xmlns:")
        }

        /// 是否为把某个前缀绑定到 Shaper 命名空间的声明。
        pub fn declares_shaper_namespace(&self) -> bool {
            self.declared_prefix().is_some() && self.value() == SHAPER_NAMESPACE
        }
    }

    fn split_qualified(name: &str) -> (Option<&str>, &str) {
        match name.split_once(':') {
            Some((prefix, local)) => (Some(prefix), local),
            None => (None, name),
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum Node {
        Element(Element),
        /// 原始（已转义）文本。
        Text(String),
        CData(String),
        Comment(String),
        ProcessingInstruction(String),
        Declaration(String),
        DocType(String),
    }

    #[derive(Debug, Clone, PartialEq)]
    pub struct Element {
        pub name: String,
        pub attributes: Vec<Attribute>,
        pub children: Vec<Node>,
        identity: Option<ElementId>,
    }

    impl Element {
        pub fn new(name: impl Into<String>) -> Self {
            Self {
                name: name.into(),
                attributes: Vec::new(),
                children: Vec::new(),
                identity: None,
            }
        }

        #[inline]
        pub fn local_name(&self) -> &str {
            split_qualified(&self.name).1
        }

        #[inline]
        pub fn is_drawable(&self) -> bool {
            DRAWABLE_KINDS.contains(&self.local_name())
        }

        #[inline]
        pub fn identity(&self) -> Option<&ElementId> {
            self.identity.as_ref()
        }

        #[inline]
        pub fn set_identity(&mut self, id: ElementId) {
            self.identity = Some(id);
        }

        #[inline]
        pub fn clear_identity(&mut self) -> Option<ElementId> {
            self.identity.take()
        }

        pub fn attribute_entry(&self, name: &str) -> Option<&Attribute> {
            self.attributes.iter().find(|attr| attr.name == name)
        }

        pub fn attribute(&self, name: &str) -> Option<Cow<'_, str>> {
            self.attribute_entry(name).map(Attribute::value)
        }

        /// 设置属性值（自动转义）；已存在时原位替换，保持属性顺序。
        pub fn set_attribute(&mut self, name: &str, value: &str) {
            let attribute = Attribute::new(name, value);
            match self.attributes.iter_mut().find(|attr| attr.name == name) {
                Some(slot) => *slot = attribute,
                None => self.attributes.push(attribute),
            }
        }

        pub fn remove_attribute(&mut self, name: &str) -> bool {
            let before = self.attributes.len();
            self.attributes.retain(|attr| attr.name != name);
            before != self.attributes.len()
        }

        pub fn push_element(&mut self, element: Element) {
            self.children.push(Node::Element(element));
        }

        pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
            self.children.iter().filter_map(|node| match node {
                Node::Element(element) => Some(element),
                _ => None,
            })
        }

        /// 深度优先前序遍历，包含自身。
        pub fn descendants(&self) -> Descendants<'_> {
            Descendants { stack: vec![self] }
        }

        pub fn for_each_mut<F: FnMut(&mut Element)>(&mut self, f: &mut F) {
            f(self);
            for child in &mut self.children {
                if let Node::Element(element) = child {
                    element.for_each_mut(f);
                }
            }
        }

        /// 带命名空间作用域的遍历；回调看到的作用域已包含当前元素自身的声明。
        pub fn walk_scoped<F: FnMut(&Element, &NamespaceScope)>(
            &self,
            scope: &mut NamespaceScope,
            f: &mut F,
        ) {
            let mark = scope.enter(self);
            f(self, scope);
            for child in self.child_elements() {
                child.walk_scoped(scope, f);
            }
            scope.leave(mark);
        }

        pub fn walk_scoped_mut<F: FnMut(&mut Element, &NamespaceScope)>(
            &mut self,
            scope: &mut NamespaceScope,
            f: &mut F,
        ) {
            let mark = scope.enter(self);
            f(self, scope);
            for child in &mut self.children {
                if let Node::Element(element) = child {
                    element.walk_scoped_mut(scope, f);
                }
            }
            scope.leave(mark);
        }
    }

    pub struct Descendants<'a> {
        stack: Vec<&'a Element>,
    }

    impl<'a> Iterator for Descendants<'a> {
        type Item = &'a Element;

        fn next(&mut self) -> Option<Self::Item> {
            let element = self.stack.pop()?;
            for child in element.children.iter().rev() {
                if let Node::Element(child) = child {
                    self.stack.push(child);
                }
            }
            Some(element)
        }
    }

    /// 遍历过程中处于作用域内的 `xmlns:prefix` 绑定。
    #[derive(Debug, Clone, Default)]
    pub struct NamespaceScope {
        bindings: Vec<(String, String)>,
    }

    impl NamespaceScope {
        fn enter(&mut self, element: &Element) -> usize {
            let mark = self.bindings.len();
            for attribute in &element.attributes {
                if let Some(prefix) = attribute.declared_prefix() {
                    self.bindings
                        .push((prefix.to_string(), attribute.value().into_owned()));
                }
            }
            mark
        }

        fn leave(&mut self, mark: usize) {
            self.bindings.truncate(mark);
        }

        pub fn resolve(&self, prefix: &str) -> Option<&str> {
            self.bindings
                .iter()
                .rev()
                .find(|(bound, _)| bound == prefix)
                .map(|(_, uri)| uri.as_str())
        }

        /// 属性前缀解析到 Shaper 命名空间，或前缀为未声明的 `shaper`。
        pub fn is_shaper_attribute(&self, attribute: &Attribute) -> bool {
            match attribute.prefix() {
                Some("xmlns") | None => false,
                Some(prefix) => match self.resolve(prefix) {
                    Some(uri) => uri == SHAPER_NAMESPACE,
                    None => prefix == SHAPER_PREFIX,
                },
            }
        }
    }

    /// 完整的 XML 文档：根元素之前与之后的节点分别保存在 `prolog`、`epilog`。
    #[derive(Debug, Clone, PartialEq)]
    pub struct Document {
        pub prolog: Vec<Node>,
        pub root: Element,
        pub epilog: Vec<Node>,
    }

    impl Document {
        pub fn new(root: Element) -> Self {
            Self {
                prolog: Vec::new(),
                root,
                epilog: Vec::new(),
            }
        }

        #[inline]
        pub fn elements(&self) -> Descendants<'_> {
            self.root.descendants()
        }

        pub fn drawables(&self) -> impl Iterator<Item = &Element> {
            self.elements().filter(|element| element.is_drawable())
        }

        pub fn element_by_id(&self, id: &ElementId) -> Option<&Element> {
            self.elements()
                .find(|element| element.identity() == Some(id))
        }

        #[inline]
        pub fn contains_id(&self, id: &ElementId) -> bool {
            self.element_by_id(id).is_some()
        }

        /// 文档顺序下的全部身份标识。
        pub fn identities(&self) -> Vec<ElementId> {
            self.elements()
                .filter_map(|element| element.identity().cloned())
                .collect()
        }

        pub fn for_each_element_mut<F: FnMut(&mut Element)>(&mut self, mut f: F) {
            self.root.for_each_mut(&mut f);
        }

        /// 树中是否有元素名或属性名使用了给定前缀。
        pub fn uses_prefix(&self, prefix: &str) -> bool {
            self.elements().any(|element| {
                split_qualified(&element.name).0 == Some(prefix)
                    || element
                        .attributes
                        .iter()
                        .any(|attr| attr.prefix() == Some(prefix))
            })
        }

        /// 导出时 Shaper 命名空间使用的前缀：优先 `shaper`，
        /// 若该前缀在树中任何位置绑定到其他命名空间，则依次尝试 `shaper1`、`shaper2` ……
        pub fn export_prefix(&self) -> String {
            let foreign: Vec<&str> = self
                .elements()
                .flat_map(|element| element.attributes.iter())
                .filter(|attr| !attr.declares_shaper_namespace())
                .filter_map(Attribute::declared_prefix)
                .collect();
            let mut candidate = SHAPER_PREFIX.to_string();
            let mut suffix = 0u32;
            while foreign.contains(&candidate.as_str()) {
                suffix += 1;
                candidate = format!("{SHAPER_PREFIX}{suffix}");
            }
            candidate
        }
    }

}

pub mod identity {
    use std::collections::HashSet;

    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use crate::document::{Document, ElementId};

    const TOKEN_LEN: usize = 10;
    const ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    /// 一次分配的统计结果。
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct AssignReport {
        /// 已有且唯一、原样保留的标识数。
        pub retained: usize,
        /// 新分配的标识数。
        pub assigned: usize,
        /// 与前文重复而重新分配的标识数。
        pub reissued: usize,
        /// 从非可绘制元素上移除的标识数。
        pub stripped: usize,
    }

    impl AssignReport {
        #[inline]
        pub fn changed(&self) -> bool {
            self.assigned > 0 || self.reissued > 0 || self.stripped > 0
        }
    }

    /// 为可绘制元素分配稳定的 base-36 身份标识。
    #[derive(Debug)]
    pub struct IdentityAssigner {
        rng: StdRng,
    }

    impl IdentityAssigner {
        pub fn new() -> Self {
            Self {
                rng: StdRng::from_entropy(),
            }
        }

        /// 固定种子，便于测试复现。
        pub fn with_seed(seed: u64) -> Self {
            Self {
                rng: StdRng::seed_from_u64(seed),
            }
        }

        /// 为缺少标识的可绘制元素生成新标识，已有标识不会被重新生成。
        /// 只有可绘制元素携带标识，其余元素上导入的标识被移除。
        /// 重复的标识保留文档顺序中的第一个，其余重新分配。重复调用不会改变任何内容。
        pub fn assign(&mut self, document: &mut Document) -> AssignReport {
            let mut report = AssignReport::default();
            document.for_each_element_mut(|element| {
                if !element.is_drawable() && element.clear_identity().is_some() {
                    report.stripped += 1;
                }
            });

            let mut reserved: HashSet<ElementId> = document.identities().into_iter().collect();
            let mut seen: HashSet<ElementId> = HashSet::new();

            document.for_each_element_mut(|element| {
                if !element.is_drawable() {
                    return;
                }
                match element.identity().cloned() {
                    Some(id) if seen.insert(id.clone()) => report.retained += 1,
                    Some(_) => {
                        let fresh = self.fresh_token(&mut reserved);
                        seen.insert(fresh.clone());
                        element.set_identity(fresh);
                        report.reissued += 1;
                    }
                    None => {
                        let fresh = self.fresh_token(&mut reserved);
                        seen.insert(fresh.clone());
                        element.set_identity(fresh);
                        report.assigned += 1;
                    }
                }
            });

            report
        }

        fn fresh_token(&mut self, reserved: &mut HashSet<ElementId>) -> ElementId {
            loop {
                let token: String = (0..TOKEN_LEN)
                    .map(|_| ALPHABET[self.rng.gen_range(0..ALPHABET.len())] as char)
                    .collect();
                let id = ElementId::new(token);
                if reserved.insert(id.clone()) {
                    return id;
                }
            }
        }
    }

    impl Default for IdentityAssigner {
        fn default() -> Self {
            Self::new()
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::document::Element;

        fn drawing(count: usize) -> Document {
            let mut root = Element::new("svg");
            let mut group = Element::new("g");
            for _ in 0..count {
                group.push_element(Element::new("path"));
            }
            root.push_element(group);
            root.push_element(Element::new("text"));
            Document::new(root)
        }

        #[test]
        fn assigns_only_drawables() {
            let mut document = drawing(3);
            let report = IdentityAssigner::with_seed(7).assign(&mut document);
            assert_eq!(report.assigned, 3);
            for element in document.elements() {
                assert_eq!(element.identity().is_some(), element.is_drawable());
            }
            let token = document.identities()[0].as_str().to_string();
            assert_eq!(token.len(), TOKEN_LEN);
            assert!(token.bytes().all(|b| ALPHABET.contains(&b)));
        }

        #[test]
        fn assign_is_idempotent() {
            let mut document = drawing(5);
            let mut assigner = IdentityAssigner::with_seed(1);
            assigner.assign(&mut document);
            let first = document.identities();
            let report = assigner.assign(&mut document);
            assert!(!report.changed());
            assert_eq!(report.retained, 5);
            assert_eq!(document.identities(), first);
        }

        #[test]
        fn duplicated_identity_is_reissued() {
            let mut document = drawing(2);
            let shared = ElementId::new("dup");
            document.for_each_element_mut(|element| {
                if element.is_drawable() {
                    element.set_identity(shared.clone());
                }
            });
            let report = IdentityAssigner::with_seed(3).assign(&mut document);
            assert_eq!(report.retained, 1);
            assert_eq!(report.reissued, 1);
            let ids = document.identities();
            assert_eq!(ids[0], shared);
            assert_ne!(ids[1], shared);
        }

        #[test]
        fn identity_on_non_drawable_is_removed() {
            let mut root = Element::new("svg");
            let mut group = Element::new("g");
            group.set_identity(ElementId::new("aaa"));
            let mut rect = Element::new("rect");
            rect.set_identity(ElementId::new("aaa"));
            group.push_element(rect);
            root.push_element(group);
            let mut document = Document::new(root);

            let report = IdentityAssigner::with_seed(9).assign(&mut document);
            assert_eq!(report.stripped, 1);
            assert_eq!(report.retained, 1);
            assert_eq!(document.identities(), vec![ElementId::new("aaa")]);
            let tagged = document.element_by_id(&ElementId::new("aaa")).expect("rect tagged");
            assert_eq!(tagged.name, "rect");
        }

        #[test]
        fn identities_are_unique_for_large_documents() {
            let mut document = drawing(10_000);
            IdentityAssigner::with_seed(42).assign(&mut document);
            let ids = document.identities();
            let unique: HashSet<_> = ids.iter().collect();
            assert_eq!(ids.len(), 10_000);
            assert_eq!(unique.len(), ids.len());
        }
    }
}
