//! 以身份标识为键的制造参数存储。测量值统一以像素保存。

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::document::ElementId;
use crate::units::{Unit, UnitSystem, convert, is_empty_value};

pub const CUT_TYPE_KEY: &str = "shaper:cutType";
pub const CUT_TYPE_LOCAL_NAME: &str = "cutType";
/// 该取值等同于未设置切割类型。
pub const CUT_TYPE_NONE: &str = "none";

/// 测量类属性。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MeasureAttr {
    CutDepth,
    CutOffset,
    ToolDia,
}

impl MeasureAttr {
    pub const ALL: [MeasureAttr; 3] = [
        MeasureAttr::CutDepth,
        MeasureAttr::CutOffset,
        MeasureAttr::ToolDia,
    ];

    /// 存储使用的键，例如 `"shaper:cutDepth"`。
    pub fn key(self) -> &'static str {
        match self {
            MeasureAttr::CutDepth => "shaper:cutDepth",
            MeasureAttr::CutOffset => "shaper:cutOffset",
            MeasureAttr::ToolDia => "shaper:toolDia",
        }
    }

    pub fn local_name(self) -> &'static str {
        match self {
            MeasureAttr::CutDepth => "cutDepth",
            MeasureAttr::CutOffset => "cutOffset",
            MeasureAttr::ToolDia => "toolDia",
        }
    }

    /// 同时接受本地名与带前缀的键。
    pub fn from_name(name: &str) -> Option<Self> {
        let local = name.strip_prefix("shaper:").unwrap_or(name);
        MeasureAttr::ALL
            .into_iter()
            .find(|attr| attr.local_name() == local)
    }
}

impl fmt::Display for MeasureAttr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.local_name())
    }
}

impl FromStr for MeasureAttr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MeasureAttr::from_name(s.trim()).ok_or_else(|| format!("unknown measurement `{s}`"))
    }
}

/// 本地名是否为存储管理的属性（三个测量值与切割类型）。
pub fn is_managed_local_name(local_name: &str) -> bool {
    local_name == CUT_TYPE_LOCAL_NAME
        || MeasureAttr::ALL
            .into_iter()
            .any(|attr| attr.local_name() == local_name)
}

/// 单个元素的制造参数。缺少某个键表示“未设置”，而不是零。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeRecord {
    measurements: BTreeMap<MeasureAttr, f64>,
    cut_type: Option<String>,
}

impl AttributeRecord {
    #[inline]
    pub fn measurement(&self, attr: MeasureAttr) -> Option<f64> {
        self.measurements.get(&attr).copied()
    }

    #[inline]
    pub fn cut_type(&self) -> Option<&str> {
        self.cut_type.as_deref()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        if key == CUT_TYPE_KEY {
            return self.cut_type.is_some();
        }
        MeasureAttr::ALL
            .into_iter()
            .any(|attr| attr.key() == key && self.measurements.contains_key(&attr))
    }

    /// 已设置的键，测量值在前、切割类型在后。
    pub fn keys(&self) -> Vec<&'static str> {
        let mut keys: Vec<&'static str> = self.measurements.keys().map(|attr| attr.key()).collect();
        if self.cut_type.is_some() {
            keys.push(CUT_TYPE_KEY);
        }
        keys
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty() && self.cut_type.is_none()
    }
}

/// 一次测量写入的结果。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WriteOutcome {
    /// 已保存的像素值。
    Stored(f64),
    /// 取值为空，键已删除。
    Cleared,
    /// 无法解析，未做任何修改。
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    fn include(range: &mut Option<ValueRange>, value: f64) {
        match range {
            Some(existing) => {
                existing.min = existing.min.min(value);
                existing.max = existing.max.max(value);
            }
            None => {
                *range = Some(ValueRange {
                    min: value,
                    max: value,
                })
            }
        }
    }
}

/// 全部记录的汇总，长度值均为毫米。
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AttributeSummary {
    pub record_count: usize,
    pub cut_types: BTreeSet<String>,
    pub cut_depth_mm: Option<ValueRange>,
    pub cut_offset_mm: Option<ValueRange>,
    /// 去重后的刀具直径，按数值升序，已按当前小数分隔符格式化。
    pub tool_diameters_mm: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AttributeStore {
    records: HashMap<ElementId, AttributeRecord>,
}

impl AttributeStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[inline]
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// 返回记录的副本；不存在时返回空记录，且不会创建持久记录。
    pub fn get(&self, id: &ElementId) -> AttributeRecord {
        self.records.get(id).cloned().unwrap_or_default()
    }

    #[inline]
    pub fn record(&self, id: &ElementId) -> Option<&AttributeRecord> {
        self.records.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ElementId, &AttributeRecord)> {
        self.records.iter()
    }

    /// 按当前展示单位解析输入并以像素保存；空值删除键，无法解析的输入被忽略。
    pub fn set_measurement(
        &mut self,
        id: &ElementId,
        attr: MeasureAttr,
        text: &str,
        units: &UnitSystem,
    ) -> WriteOutcome {
        if is_empty_value(text) {
            self.remove_measurement(id, attr);
            return WriteOutcome::Cleared;
        }
        let Some(value) = units.parse(text, None) else {
            return WriteOutcome::Ignored;
        };
        if !value.is_finite() {
            return WriteOutcome::Ignored;
        }
        if is_empty_value(&units.format(value)) {
            self.remove_measurement(id, attr);
            return WriteOutcome::Cleared;
        }
        let px = convert(value, units.unit.into(), Unit::Px);
        self.records
            .entry(id.clone())
            .or_default()
            .measurements
            .insert(attr, px);
        WriteOutcome::Stored(px)
    }

    /// 直接写入像素值；零值视为空。
    pub fn set_measurement_px(&mut self, id: &ElementId, attr: MeasureAttr, px: f64) -> WriteOutcome {
        if !px.is_finite() {
            return WriteOutcome::Ignored;
        }
        if px == 0.0 {
            self.remove_measurement(id, attr);
            return WriteOutcome::Cleared;
        }
        self.records
            .entry(id.clone())
            .or_default()
            .measurements
            .insert(attr, px);
        WriteOutcome::Stored(px)
    }

    /// 保存修剪后的切割类型；空串或 `none` 删除该键。返回是否保存。
    pub fn set_cut_type(&mut self, id: &ElementId, text: &str) -> bool {
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed == CUT_TYPE_NONE {
            if let Some(record) = self.records.get_mut(id) {
                record.cut_type = None;
            }
            self.prune(id);
            return false;
        }
        self.records.entry(id.clone()).or_default().cut_type = Some(trimmed.to_string());
        true
    }

    pub fn remove_measurement(&mut self, id: &ElementId, attr: MeasureAttr) -> bool {
        let removed = self
            .records
            .get_mut(id)
            .map(|record| record.measurements.remove(&attr).is_some())
            .unwrap_or(false);
        self.prune(id);
        removed
    }

    /// 当前展示单位下的取值，例如 `"10,0mm"`。
    pub fn display_value(
        &self,
        id: &ElementId,
        attr: MeasureAttr,
        units: &UnitSystem,
    ) -> Option<String> {
        self.record(id)
            .and_then(|record| record.measurement(attr))
            .map(|px| units.display(px))
    }

    pub fn summary(&self, units: &UnitSystem) -> AttributeSummary {
        let mut summary = AttributeSummary {
            record_count: self.records.len(),
            ..AttributeSummary::default()
        };
        let mut diameters: Vec<f64> = Vec::new();

        for record in self.records.values() {
            if let Some(cut_type) = record.cut_type() {
                summary.cut_types.insert(cut_type.to_string());
            }
            if let Some(px) = record.measurement(MeasureAttr::CutDepth) {
                ValueRange::include(&mut summary.cut_depth_mm, convert(px, Unit::Px, Unit::Mm));
            }
            if let Some(px) = record.measurement(MeasureAttr::CutOffset) {
                ValueRange::include(&mut summary.cut_offset_mm, convert(px, Unit::Px, Unit::Mm));
            }
            if let Some(px) = record.measurement(MeasureAttr::ToolDia) {
                diameters.push(convert(px, Unit::Px, Unit::Mm));
            }
        }

        diameters.sort_by(|a, b| a.total_cmp(b));
        for diameter in diameters {
            let formatted = units.format(diameter);
            if summary.tool_diameters_mm.last() != Some(&formatted) {
                summary.tool_diameters_mm.push(formatted);
            }
        }
        summary
    }

    fn prune(&mut self, id: &ElementId) {
        if self.records.get(id).is_some_and(AttributeRecord::is_empty) {
            self.records.remove(id);
        }
    }
}
