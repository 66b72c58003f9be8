//! 单位换算与本地化数值解析/格式化。
//!
//! 所有换算都以像素为中间单位：96 px/in，25.4 mm/in。
//! 展示状态（单位与小数分隔符）通过 [`UnitSystem`] 显式传入，不存在全局单例。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::document::Document;

pub const PX_PER_INCH: f64 = 96.0;
pub const MM_PER_INCH: f64 = 25.4;

/// 参与单位探测的属性集合。
pub const UNIT_SOURCE_ATTRIBUTES: [&str; 14] = [
    "viewBox", "width", "height", "x", "y", "x1", "y1", "x2", "y2", "cx", "cy", "r", "rx", "ry",
];

/// 可换算的长度单位。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    Px,
    Mm,
    In,
}

impl Unit {
    #[inline]
    pub fn suffix(self) -> &'static str {
        match self {
            Unit::Px => "px",
            Unit::Mm => "mm",
            Unit::In => "in",
        }
    }

    /// 按后缀识别单位，大小写不敏感；未知后缀返回 `None`。
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        if suffix.eq_ignore_ascii_case("px") {
            Some(Unit::Px)
        } else if suffix.eq_ignore_ascii_case("mm") {
            Some(Unit::Mm)
        } else if suffix.eq_ignore_ascii_case("in") {
            Some(Unit::In)
        } else {
            None
        }
    }

    #[inline]
    fn per_inch(self) -> f64 {
        match self {
            Unit::Px => PX_PER_INCH,
            Unit::Mm => MM_PER_INCH,
            Unit::In => 1.0,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownUnit(pub String);

impl fmt::Display for UnknownUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown unit `{}`", self.0)
    }
}

impl std::error::Error for UnknownUnit {}

impl FromStr for Unit {
    type Err = UnknownUnit;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Unit::from_suffix(s.trim()).ok_or_else(|| UnknownUnit(s.to_string()))
    }
}

/// 面向用户的展示单位，只允许毫米或英寸。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayUnit {
    #[default]
    Mm,
    In,
}

impl DisplayUnit {
    #[inline]
    pub fn suffix(self) -> &'static str {
        Unit::from(self).suffix()
    }

    /// 探测结果映射为展示单位；像素没有对应的展示形式，退化为毫米。
    pub fn from_detected(unit: Unit) -> Self {
        match unit {
            Unit::In => DisplayUnit::In,
            Unit::Mm | Unit::Px => DisplayUnit::Mm,
        }
    }
}

impl From<DisplayUnit> for Unit {
    fn from(value: DisplayUnit) -> Self {
        match value {
            DisplayUnit::Mm => Unit::Mm,
            DisplayUnit::In => Unit::In,
        }
    }
}

impl FromStr for DisplayUnit {
    type Err = UnknownUnit;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<Unit>()? {
            Unit::Mm => Ok(DisplayUnit::Mm),
            Unit::In => Ok(DisplayUnit::In),
            Unit::Px => Err(UnknownUnit(s.to_string())),
        }
    }
}

impl fmt::Display for DisplayUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DecimalSeparator {
    #[default]
    #[serde(rename = ".", alias = "dot")]
    Dot,
    #[serde(rename = ",", alias = "comma")]
    Comma,
}

impl DecimalSeparator {
    #[inline]
    pub fn as_char(self) -> char {
        match self {
            DecimalSeparator::Dot => '.',
            DecimalSeparator::Comma => ',',
        }
    }
}

impl FromStr for DecimalSeparator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "." | "dot" => Ok(DecimalSeparator::Dot),
            "," | "comma" => Ok(DecimalSeparator::Comma),
            other => Err(format!("unknown decimal separator `{other}`")),
        }
    }
}

/// 载入文档时探测到的单位是否覆盖当前展示单位。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitPolicy {
    #[default]
    Detect,
    Preserve,
}

/// 展示状态：单位与小数分隔符。只影响展示，从不改变已存储的数值。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UnitSystem {
    pub unit: DisplayUnit,
    pub decimal_separator: DecimalSeparator,
}

impl UnitSystem {
    #[inline]
    pub fn new(unit: DisplayUnit, decimal_separator: DecimalSeparator) -> Self {
        Self {
            unit,
            decimal_separator,
        }
    }

    /// 解析用户输入。带单位后缀且与目标单位不同时自动换算；
    /// 未给出目标单位时以当前展示单位为准。无法解析时返回 `None`。
    pub fn parse(&self, text: &str, target: Option<Unit>) -> Option<f64> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        let target = target.unwrap_or(self.unit.into());
        let (number, suffix) = split_unit_suffix(trimmed);
        let value = parse_number(number)?;
        match suffix {
            None => Some(value),
            Some(suffix) => {
                let unit = Unit::from_suffix(suffix)?;
                Some(convert(value, unit, target))
            }
        }
    }

    /// 按展示单位解析并换算到像素。
    pub fn parse_to_px(&self, text: &str) -> Option<f64> {
        let value = self.parse(text, None)?;
        Some(convert(value, self.unit.into(), Unit::Px))
    }

    /// 保留三位小数，去掉多余的零但至少保留一位，替换为当前小数分隔符。
    pub fn format(&self, value: f64) -> String {
        self.localize(format_decimal(value))
    }

    /// 角度归一化到 `[0, 360)` 并保留一位小数。
    pub fn format_angle(&self, value: f64) -> String {
        let normalized = value.rem_euclid(360.0);
        let mut text = format!("{normalized:.1}");
        if text == "360.0" || text == "-0.0" {
            text = "0.0".to_string();
        }
        self.localize(text)
    }

    /// 像素值换算为展示单位并附带后缀，例如 `"12,5mm"`。
    pub fn display(&self, px: f64) -> String {
        let unit: Unit = self.unit.into();
        format!("{}{}", self.format(convert(px, Unit::Px, unit)), unit.suffix())
    }

    /// 写入文件的取值：与 [`display`](Self::display) 相同，但始终使用 `.`。
    pub fn export_value(&self, px: f64) -> String {
        let unit: Unit = self.unit.into();
        format!(
            "{}{}",
            format_decimal(convert(px, Unit::Px, unit)),
            unit.suffix()
        )
    }

    fn localize(&self, text: String) -> String {
        match self.decimal_separator {
            DecimalSeparator::Dot => text,
            DecimalSeparator::Comma => text.replace('.', ","),
        }
    }
}

/// 单位换算，以像素为中间单位。
#[inline]
pub fn convert(value: f64, from: Unit, to: Unit) -> f64 {
    if from == to {
        return value;
    }
    let px = value / from.per_inch() * PX_PER_INCH;
    px / PX_PER_INCH * to.per_inch()
}

/// 以字符串给出单位的换算；任一单位未知时原样返回。
pub fn convert_named(value: f64, from: &str, to: &str) -> f64 {
    match (from.parse::<Unit>(), to.parse::<Unit>()) {
        (Ok(from), Ok(to)) => convert(value, from, to),
        _ => value,
    }
}

/// 空值判定：修剪后为 `""`、`"0"`、`"0.0"` 或 `"0,0"`。
pub fn is_empty_value(text: &str) -> bool {
    matches!(text.trim(), "" | "0" | "0.0" | "0,0")
}

/// 拆分末尾的字母后缀，数字与后缀之间允许空白。
fn split_unit_suffix(text: &str) -> (&str, Option<&str>) {
    let number_end = text
        .char_indices()
        .rev()
        .find(|(_, ch)| !ch.is_ascii_alphabetic())
        .map(|(idx, ch)| idx + ch.len_utf8())
        .unwrap_or(0);
    if number_end == text.len() {
        (text, None)
    } else {
        (text[..number_end].trim_end(), Some(&text[number_end..]))
    }
}

/// 同时出现 `.` 与 `,` 时，靠后的那个是小数分隔符，另一个视为千位分隔符；
/// 只出现一种且重复出现时视为千位分隔符。
fn parse_number(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    let (sign, body) = match raw.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, raw.strip_prefix('+').unwrap_or(raw)),
    };
    if body.is_empty()
        || !body
            .chars()
            .all(|ch| ch.is_ascii_digit() || ch == '.' || ch == ',')
    {
        return None;
    }

    let decimal = match (body.rfind('.'), body.rfind(',')) {
        (Some(dot), Some(comma)) => Some(if dot > comma { '.' } else { ',' }),
        (Some(_), None) => lone_separator(body, '.'),
        (None, Some(_)) => lone_separator(body, ','),
        (None, None) => None,
    };

    let mut normalized = String::with_capacity(body.len());
    for ch in body.chars() {
        if ch.is_ascii_digit() {
            normalized.push(ch);
        } else if Some(ch) == decimal {
            normalized.push('.');
        }
    }
    if !normalized.chars().any(|ch| ch.is_ascii_digit()) {
        return None;
    }
    normalized.parse::<f64>().ok().map(|value| sign * value)
}

fn lone_separator(body: &str, separator: char) -> Option<char> {
    if body.matches(separator).count() > 1 {
        None
    } else {
        Some(separator)
    }
}

fn format_decimal(value: f64) -> String {
    let mut text = format!("{value:.3}");
    while text.ends_with('0') && !text.ends_with(".0") {
        text.pop();
    }
    if text == "-0.0" {
        text = "0.0".to_string();
    }
    text
}

/// 单位标记计数。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnitCounts {
    pub mm: usize,
    pub inch: usize,
    pub px: usize,
}

impl UnitCounts {
    /// 统计一个属性值中作为独立单词出现的 `mm`、`in`、`px`。
    pub fn scan(&mut self, value: &str) {
        for token in value
            .split(|ch: char| !ch.is_ascii_alphabetic())
            .filter(|token| !token.is_empty())
        {
            match token {
                "mm" => self.mm += 1,
                "in" => self.inch += 1,
                "px" => self.px += 1,
                _ => {}
            }
        }
    }

    /// 计数最高者胜出；并列或全为零时取毫米。
    pub fn dominant(&self) -> Unit {
        let candidates = [(Unit::Mm, self.mm), (Unit::In, self.inch), (Unit::Px, self.px)];
        let max = candidates.iter().map(|(_, count)| *count).max().unwrap_or(0);
        if max == 0 {
            return Unit::Mm;
        }
        let mut winners = candidates.iter().filter(|(_, count)| *count == max);
        match (winners.next(), winners.next()) {
            (Some((unit, _)), None) => *unit,
            _ => Unit::Mm,
        }
    }
}

/// 扫描整棵树上的尺寸相关属性，推断源文件使用的单位。
pub fn detect_units(document: &Document) -> Unit {
    let mut counts = UnitCounts::default();
    for element in document.elements() {
        for name in UNIT_SOURCE_ATTRIBUTES {
            if let Some(value) = element.attribute(name) {
                counts.scan(&value);
            }
        }
    }
    counts.dominant()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Element;
    use proptest::prelude::*;

    fn comma_mm() -> UnitSystem {
        UnitSystem::new(DisplayUnit::Mm, DecimalSeparator::Comma)
    }

    #[test]
    fn convert_uses_pixel_constants() {
        assert!((convert(1.0, Unit::In, Unit::Px) - 96.0).abs() < 1e-12);
        assert!((convert(25.4, Unit::Mm, Unit::In) - 1.0).abs() < 1e-12);
        assert!((convert(10.0, Unit::Mm, Unit::Px) - 37.795_275_590_551).abs() < 1e-9);
        assert!((convert(12.0, Unit::Px, Unit::Mm) - 3.175).abs() < 1e-12);
    }

    #[test]
    fn convert_named_leaves_unknown_units_alone() {
        assert_eq!(convert_named(42.0, "furlong", "mm"), 42.0);
        assert_eq!(convert_named(42.0, "mm", "pt"), 42.0);
        assert!((convert_named(1.0, "in", "MM") - 25.4).abs() < 1e-12);
    }

    #[test]
    fn parse_handles_locale_separators() {
        let units = comma_mm();
        assert_eq!(units.parse("12,5mm", None), Some(12.5));
        assert_eq!(units.parse("1.234,56mm", None), Some(1234.56));
        assert_eq!(units.parse("1,234.56", None), Some(1234.56));
        assert_eq!(units.parse("1,234,567", None), Some(1_234_567.0));
        assert_eq!(units.parse("  7.5 mm ", None), Some(7.5));
        assert_eq!(units.parse("-0,25", None), Some(-0.25));
    }

    #[test]
    fn parse_converts_foreign_suffix() {
        let units = UnitSystem::default();
        let value = units.parse("1in", None).expect("parse inch");
        assert!((value - 25.4).abs() < 1e-9);
        let px = units.parse("10mm", Some(Unit::Px)).expect("parse to px");
        assert!((px - 37.795_275_590_551).abs() < 1e-9);
        assert_eq!(units.parse("10MM", None), Some(10.0));
    }

    #[test]
    fn parse_rejects_garbage() {
        let units = UnitSystem::default();
        assert_eq!(units.parse("", None), None);
        assert_eq!(units.parse("abc", None), None);
        assert_eq!(units.parse("12furlongs", None), None);
        assert_eq!(units.parse("1.2.3", None), Some(123.0));
        assert_eq!(units.parse("1,2.3.4", None), None);
        assert_eq!(units.parse("mm", None), None);
        assert_eq!(units.parse("inf", None), None);
    }

    #[test]
    fn format_trims_zeros_and_localizes() {
        let dot = UnitSystem::default();
        assert_eq!(dot.format(10.0), "10.0");
        assert_eq!(dot.format(3.175), "3.175");
        assert_eq!(dot.format(12.5), "12.5");
        assert_eq!(dot.format(1.23456), "1.235");
        assert_eq!(dot.format(-0.0001), "0.0");
        assert_eq!(comma_mm().format(12.5), "12,5");
    }

    #[test]
    fn format_angle_normalizes() {
        let units = comma_mm();
        assert_eq!(units.format_angle(-90.0), "270,0");
        assert_eq!(units.format_angle(720.26), "0,3");
        assert_eq!(units.format_angle(359.99), "0,0");
        assert_eq!(UnitSystem::default().format_angle(45.0), "45.0");
    }

    #[test]
    fn display_and_export_values() {
        let units = comma_mm();
        let px = convert(12.5, Unit::Mm, Unit::Px);
        assert_eq!(units.display(px), "12,5mm");
        assert_eq!(units.export_value(px), "12.5mm");
        let inch = UnitSystem::new(DisplayUnit::In, DecimalSeparator::Dot);
        assert_eq!(inch.display(96.0), "1.0in");
    }

    #[test]
    fn empty_value_rule() {
        for text in ["", "  ", "0", "0.0", " 0,0 "] {
            assert!(is_empty_value(text), "{text:?} should be empty");
        }
        for text in ["0.00", "5", "0mm"] {
            assert!(!is_empty_value(text), "{text:?} should not be empty");
        }
    }

    #[test]
    fn unit_counts_match_whole_words_only() {
        let mut counts = UnitCounts::default();
        counts.scan("100mm");
        counts.scan("0 0 210 297");
        counts.scan("min");
        counts.scan("5 in");
        assert_eq!(counts, UnitCounts { mm: 1, inch: 1, px: 0 });
        assert_eq!(counts.dominant(), Unit::Mm);

        counts.scan("3in");
        assert_eq!(counts.dominant(), Unit::In);
        assert_eq!(UnitCounts::default().dominant(), Unit::Mm);
    }

    #[test]
    fn detect_units_scans_geometry_attributes() {
        let mut root = Element::new("svg");
        root.set_attribute("width", "8.5in");
        root.set_attribute("height", "11in");
        let mut rect = Element::new("rect");
        rect.set_attribute("x", "10mm");
        rect.set_attribute("stroke", "1mm");
        root.push_element(rect);
        let document = Document::new(root);
        assert_eq!(detect_units(&document), Unit::In);
        assert_eq!(DisplayUnit::from_detected(Unit::Px), DisplayUnit::Mm);
    }

    proptest! {
        #[test]
        fn convert_round_trips_through_pixels(value in 0.0f64..10_000.0, inch in any::<bool>()) {
            let unit = if inch { Unit::In } else { Unit::Mm };
            let back = convert(convert(value, unit, Unit::Px), Unit::Px, unit);
            prop_assert!((back - value).abs() < 1e-9);
        }
    }
}
