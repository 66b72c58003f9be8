pub mod command;

pub mod errors {
    use shaper_io::IoError;
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum EngineError {
        #[error("no document is loaded")]
        NoDocument,
        #[error("element with id {0} not found")]
        ElementNotFound(String),
        #[error(transparent)]
        Io(#[from] IoError),
    }
}

pub mod model {
    use std::fmt;
    use std::path::Path;

    use shaper_core::attributes::{
        AttributeRecord, AttributeStore, AttributeSummary, CUT_TYPE_LOCAL_NAME, MeasureAttr,
        WriteOutcome, is_managed_local_name,
    };
    use shaper_core::document::{Attribute, Document, ElementId, NamespaceScope};
    use shaper_core::identity::IdentityAssigner;
    use shaper_core::units::{
        DecimalSeparator, DisplayUnit, Unit, UnitPolicy, UnitSystem, detect_units,
    };
    use shaper_io::{
        DocumentSaver, SerializeOptions, parse_document, serialize, serialize_export,
    };
    use tracing::{debug, info};

    use crate::errors::EngineError;

    /// 载入成功后的通知，是核心唯一对外提供的回调。
    pub trait LoadObserver {
        fn loaded(&mut self, document: &Document, canonical_text: &str, file_name: &str);
    }

    /// 模型生命周期：`Empty → Loaded → Edited`，`clear` 回到 `Empty`。
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum ModelState {
        Empty,
        Loaded,
        Edited,
    }

    /// 主模型：持有规范文档树与属性存储，是导出的唯一数据源。
    pub struct MasterModel {
        document: Option<Document>,
        file_name: Option<String>,
        store: AttributeStore,
        units: UnitSystem,
        policy: UnitPolicy,
        detected_unit: Option<Unit>,
        state: ModelState,
        assigner: IdentityAssigner,
        observers: Vec<Box<dyn LoadObserver>>,
    }

    impl MasterModel {
        pub fn new() -> Self {
            Self::with_units(UnitSystem::default(), UnitPolicy::default())
        }

        pub fn with_units(units: UnitSystem, policy: UnitPolicy) -> Self {
            Self {
                document: None,
                file_name: None,
                store: AttributeStore::new(),
                units,
                policy,
                detected_unit: None,
                state: ModelState::Empty,
                assigner: IdentityAssigner::new(),
                observers: Vec::new(),
            }
        }

        /// 替换身份分配器，测试中用于固定随机种子。
        pub fn with_assigner(mut self, assigner: IdentityAssigner) -> Self {
            self.assigner = assigner;
            self
        }

        pub fn subscribe(&mut self, observer: Box<dyn LoadObserver>) {
            self.observers.push(observer);
        }

        /// 解析并安装新文档。解析先于任何状态丢弃：失败时旧文档、存储与状态保持不变。
        pub fn load(&mut self, raw_text: &str, file_name: &str) -> Result<&Document, EngineError> {
            let mut document = parse_document(raw_text)?;
            let report = self.assigner.assign(&mut document);

            let detected = detect_units(&document);
            let mut units = self.units;
            if self.policy == UnitPolicy::Detect {
                units.unit = DisplayUnit::from_detected(detected);
            }

            let store = seed_store(&document, &units);
            let canonical = serialize(&document, SerializeOptions::canonical())?;

            info!(
                file_name,
                drawables = report.retained + report.assigned + report.reissued,
                assigned = report.assigned,
                reissued = report.reissued,
                stripped = report.stripped,
                seeded = store.len(),
                detected = %detected,
                unit = %units.unit,
                "已载入文档"
            );

            self.units = units;
            self.store = store;
            self.detected_unit = Some(detected);
            self.file_name = Some(file_name.to_string());
            self.state = ModelState::Loaded;
            let document = self.document.insert(document);

            for observer in &mut self.observers {
                observer.loaded(document, &canonical, file_name);
            }
            Ok(document)
        }

        /// 丢弃文档与全部属性记录。
        pub fn clear(&mut self) {
            self.document = None;
            self.file_name = None;
            self.detected_unit = None;
            self.store.clear();
            self.state = ModelState::Empty;
            debug!("模型已清空");
        }

        #[inline]
        pub fn state(&self) -> ModelState {
            self.state
        }

        #[inline]
        pub fn document(&self) -> Option<&Document> {
            self.document.as_ref()
        }

        #[inline]
        pub fn file_name(&self) -> Option<&str> {
            self.file_name.as_deref()
        }

        #[inline]
        pub fn detected_unit(&self) -> Option<Unit> {
            self.detected_unit
        }

        #[inline]
        pub fn unit_system(&self) -> UnitSystem {
            self.units
        }

        /// 切换展示单位，不修改任何已存储的数值。
        pub fn set_unit(&mut self, unit: DisplayUnit) {
            self.units.unit = unit;
        }

        pub fn set_decimal_separator(&mut self, separator: DecimalSeparator) {
            self.units.decimal_separator = separator;
        }

        #[inline]
        pub fn store(&self) -> &AttributeStore {
            &self.store
        }

        /// 文档顺序下所有带身份标识的元素。
        pub fn drawable_ids(&self) -> Vec<ElementId> {
            self.document
                .as_ref()
                .map(Document::identities)
                .unwrap_or_default()
        }

        pub fn get(&self, id: &ElementId) -> AttributeRecord {
            self.store.get(id)
        }

        pub fn display_value(&self, id: &ElementId, attr: MeasureAttr) -> Option<String> {
            self.store.display_value(id, attr, &self.units)
        }

        pub fn summary(&self) -> AttributeSummary {
            self.store.summary(&self.units)
        }

        pub fn set_measurement(
            &mut self,
            id: &ElementId,
            attr: MeasureAttr,
            text: &str,
        ) -> Result<WriteOutcome, EngineError> {
            self.ensure_element(id)?;
            let outcome = self.store.set_measurement(id, attr, text, &self.units);
            debug!(id = %id, attr = %attr, text, ?outcome, "写入测量值");
            if outcome != WriteOutcome::Ignored {
                self.state = ModelState::Edited;
            }
            Ok(outcome)
        }

        pub fn set_cut_type(&mut self, id: &ElementId, text: &str) -> Result<bool, EngineError> {
            self.ensure_element(id)?;
            let stored = self.store.set_cut_type(id, text);
            debug!(id = %id, text, stored, "写入切割类型");
            self.state = ModelState::Edited;
            Ok(stored)
        }

        /// 按当前文档结构重新序列化。属性存储中的修改只在导出时写回。
        pub fn canonical_text(&self) -> Result<String, EngineError> {
            let document = self.document.as_ref().ok_or(EngineError::NoDocument)?;
            Ok(serialize(document, SerializeOptions::canonical())?)
        }

        /// 生成一次性的导出快照：遍历规范树一次，把属性存储写回为命名空间属性。
        /// 带标识元素上由存储管理的四个属性以存储为准，其余 Shaper 属性保留并统一前缀。
        /// 实时文档不受影响。
        pub fn clone_for_export(&self) -> Result<Document, EngineError> {
            let document = self.document.as_ref().ok_or(EngineError::NoDocument)?;
            let store = &self.store;
            let units = &self.units;
            let prefix = document.export_prefix();
            let mut export = document.clone();

            export
                .root
                .walk_scoped_mut(&mut NamespaceScope::default(), &mut |element, scope| {
                    let tagged = element.identity().cloned();
                    let mut attributes = Vec::with_capacity(element.attributes.len());
                    for attribute in element.attributes.drain(..) {
                        if attribute.declares_shaper_namespace() {
                            continue;
                        }
                        if !scope.is_shaper_attribute(&attribute) {
                            attributes.push(attribute);
                            continue;
                        }
                        if tagged.is_some() && is_managed_local_name(attribute.local_name()) {
                            continue;
                        }
                        attributes.push(Attribute::from_raw(
                            format!("{prefix}:{}", attribute.local_name()),
                            attribute.raw_value(),
                        ));
                    }
                    element.attributes = attributes;

                    if let Some(record) = tagged.as_ref().and_then(|id| store.record(id)) {
                        for attr in MeasureAttr::ALL {
                            if let Some(px) = record.measurement(attr) {
                                element.set_attribute(
                                    &format!("{prefix}:{}", attr.local_name()),
                                    &units.export_value(px),
                                );
                            }
                        }
                        if let Some(cut_type) = record.cut_type() {
                            element.set_attribute(
                                &format!("{prefix}:{CUT_TYPE_LOCAL_NAME}"),
                                cut_type,
                            );
                        }
                    }
                    element.clear_identity();
                });

            Ok(export)
        }

        pub fn export(&self) -> Result<String, EngineError> {
            let text = serialize_export(self.clone_for_export()?)?;
            debug!(bytes = text.len(), unit = %self.units.unit, "已生成导出文本");
            Ok(text)
        }

        /// 导出并交给文件保存协作者。
        pub fn write_export(
            &self,
            saver: &dyn DocumentSaver,
            path: &Path,
        ) -> Result<String, EngineError> {
            let text = self.export()?;
            saver.save(&text, path)?;
            info!(path = %path.display(), "已导出带 Shaper 属性的文件");
            Ok(text)
        }

        fn ensure_element(&self, id: &ElementId) -> Result<(), EngineError> {
            let document = self.document.as_ref().ok_or(EngineError::NoDocument)?;
            if document.contains_id(id) {
                Ok(())
            } else {
                Err(EngineError::ElementNotFound(id.to_string()))
            }
        }
    }

    /// 从已有的命名空间属性播种存储。未带后缀的数值按当前展示单位解释。
    fn seed_store(document: &Document, units: &UnitSystem) -> AttributeStore {
        let mut store = AttributeStore::new();
        document
            .root
            .walk_scoped(&mut NamespaceScope::default(), &mut |element, scope| {
                let Some(id) = element.identity() else {
                    return;
                };
                for attribute in &element.attributes {
                    if !scope.is_shaper_attribute(attribute) {
                        continue;
                    }
                    let value = attribute.value();
                    let local = attribute.local_name();
                    if local == CUT_TYPE_LOCAL_NAME {
                        store.set_cut_type(id, &value);
                    } else if let Some(attr) = MeasureAttr::from_name(local) {
                        store.set_measurement(id, attr, &value, units);
                    }
                }
            });
        store
    }

    impl Default for MasterModel {
        fn default() -> Self {
            Self::new()
        }
    }

    impl fmt::Debug for MasterModel {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("MasterModel")
                .field("file_name", &self.file_name)
                .field("state", &self.state)
                .field("units", &self.units)
                .field("policy", &self.policy)
                .field("records", &self.store.len())
                .field("observers", &self.observers.len())
                .finish_non_exhaustive()
        }
    }

}
