use std::collections::HashMap;

use shaper_core::attributes::{MeasureAttr, WriteOutcome};
use shaper_core::document::ElementId;
use shaper_core::units::{DecimalSeparator, DisplayUnit};

use crate::model::MasterModel;

#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub name: String,
    pub args: Vec<String>,
}

impl CommandRequest {
    /// 按空白切分一行命令文本，首个词为命令名。
    pub fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let name = words.next()?.to_string();
        Some(Self {
            name,
            args: words.map(str::to_string).collect(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct CommandResponse {
    pub success: bool,
    pub message: Option<String>,
}

impl CommandResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

pub trait CommandHandler: Send + Sync {
    fn name(&self) -> &'static str;
    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse;
}

pub struct CommandContext<'a> {
    pub model: &'a mut MasterModel,
}

pub struct CommandBus {
    handlers: HashMap<&'static str, Box<dyn CommandHandler>>,
}

impl CommandBus {
    pub fn new() -> Self {
        let mut bus = Self {
            handlers: HashMap::new(),
        };
        bus.register(SetMeasurementCommand);
        bus.register(SetCutTypeCommand);
        bus.register(SetUnitCommand);
        bus.register(SetSeparatorCommand);
        bus.register(SummaryCommand);
        bus.register(ClearCommand);
        bus
    }

    pub fn register<H: CommandHandler + 'static>(&mut self, handler: H) {
        self.handlers.insert(handler.name(), Box::new(handler));
    }

    pub fn dispatch(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        if let Some(handler) = self.handlers.get(request.name.as_str()) {
            handler.execute(request, context)
        } else {
            CommandResponse::err(format!("未知命令: {}", request.name))
        }
    }

    /// 命令名按字母序排列。
    pub fn available_commands(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for CommandBus {
    fn default() -> Self {
        Self::new()
    }
}

/// `set_measurement <id> <cutDepth|cutOffset|toolDia> [value]`，省略取值表示清除。
struct SetMeasurementCommand;

impl CommandHandler for SetMeasurementCommand {
    fn name(&self) -> &'static str {
        "set_measurement"
    }

    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        let [id, attr, rest @ ..] = request.args.as_slice() else {
            return CommandResponse::err("用法: set_measurement <id> <属性> [取值]");
        };
        let attr = match attr.parse::<MeasureAttr>() {
            Ok(attr) => attr,
            Err(err) => return CommandResponse::err(err),
        };
        let id = ElementId::new(id.as_str());
        let value = rest.join(" ");
        match context.model.set_measurement(&id, attr, &value) {
            Ok(WriteOutcome::Stored(_)) => {
                let shown = context.model.display_value(&id, attr).unwrap_or_default();
                CommandResponse::ok(format!("{id} {attr} = {shown}"))
            }
            Ok(WriteOutcome::Cleared) => CommandResponse::ok(format!("{id} {attr} 已清除")),
            Ok(WriteOutcome::Ignored) => {
                CommandResponse::err(format!("无法解析取值 `{value}`，保持原值"))
            }
            Err(err) => CommandResponse::err(err.to_string()),
        }
    }
}

struct SetCutTypeCommand;

impl CommandHandler for SetCutTypeCommand {
    fn name(&self) -> &'static str {
        "set_cut_type"
    }

    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        let [id, rest @ ..] = request.args.as_slice() else {
            return CommandResponse::err("用法: set_cut_type <id> [类型]");
        };
        let id = ElementId::new(id.as_str());
        match context.model.set_cut_type(&id, &rest.join(" ")) {
            Ok(true) => {
                let cut_type = context.model.get(&id).cut_type().unwrap_or_default().to_string();
                CommandResponse::ok(format!("{id} cutType = {cut_type}"))
            }
            Ok(false) => CommandResponse::ok(format!("{id} cutType 已清除")),
            Err(err) => CommandResponse::err(err.to_string()),
        }
    }
}

struct SetUnitCommand;

impl CommandHandler for SetUnitCommand {
    fn name(&self) -> &'static str {
        "set_unit"
    }

    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        let Some(raw) = request.args.first() else {
            return CommandResponse::err("用法: set_unit <mm|in>");
        };
        match raw.parse::<DisplayUnit>() {
            Ok(unit) => {
                context.model.set_unit(unit);
                CommandResponse::ok(format!("展示单位已切换为 {unit}"))
            }
            Err(err) => CommandResponse::err(err.to_string()),
        }
    }
}

struct SetSeparatorCommand;

impl CommandHandler for SetSeparatorCommand {
    fn name(&self) -> &'static str {
        "set_separator"
    }

    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        let Some(raw) = request.args.first() else {
            return CommandResponse::err("用法: set_separator <.|,>");
        };
        match raw.parse::<DecimalSeparator>() {
            Ok(separator) => {
                context.model.set_decimal_separator(separator);
                CommandResponse::ok(format!("小数分隔符已切换为 `{}`", separator.as_char()))
            }
            Err(err) => CommandResponse::err(err.to_string()),
        }
    }
}

struct SummaryCommand;

impl CommandHandler for SummaryCommand {
    fn name(&self) -> &'static str {
        "summary"
    }

    fn execute(
        &self,
        _request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        let summary = context.model.summary();
        let cut_types: Vec<&str> = summary.cut_types.iter().map(String::as_str).collect();
        CommandResponse::ok(format!(
            "记录 {} 条；切割类型 [{}]；刀具直径 [{}] mm",
            summary.record_count,
            cut_types.join(", "),
            summary.tool_diameters_mm.join(", ")
        ))
    }
}

struct ClearCommand;

impl CommandHandler for ClearCommand {
    fn name(&self) -> &'static str {
        "clear"
    }

    fn execute(
        &self,
        _request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        context.model.clear();
        CommandResponse::ok("文档与属性已清空")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelState;
    use shaper_core::identity::IdentityAssigner;

    const DRAWING: &str = r#"<svg width="20mm" height="20mm"><rect width="5" height="5"/></svg>"#;

    fn request(line: &str) -> CommandRequest {
        CommandRequest::parse(line).expect("non-empty command")
    }

    fn loaded_model() -> (MasterModel, String) {
        let mut model = MasterModel::new().with_assigner(IdentityAssigner::with_seed(5));
        model.load(DRAWING, "drawing.svg").expect("load drawing");
        let id = model.drawable_ids()[0].to_string();
        (model, id)
    }

    #[test]
    fn measurement_and_cut_type_commands_update_model() {
        let (mut model, id) = loaded_model();
        let bus = CommandBus::new();
        let mut context = CommandContext { model: &mut model };

        let response = bus.dispatch(&request(&format!("set_measurement {id} cutDepth 0,25in")), &mut context);
        assert!(response.success, "{:?}", response.message);
        assert_eq!(response.message.as_deref(), Some(format!("{id} cutDepth = 6.35mm").as_str()));

        let response = bus.dispatch(&request(&format!("set_cut_type {id} pocket")), &mut context);
        assert!(response.success);

        let response = bus.dispatch(&request("summary"), &mut context);
        assert!(response.message.unwrap_or_default().contains("pocket"));
        assert_eq!(context.model.state(), ModelState::Edited);
    }

    #[test]
    fn measurement_without_value_clears() {
        let (mut model, id) = loaded_model();
        let bus = CommandBus::new();
        let mut context = CommandContext { model: &mut model };
        bus.dispatch(&request(&format!("set_measurement {id} toolDia 6")), &mut context);
        let response = bus.dispatch(&request(&format!("set_measurement {id} toolDia")), &mut context);
        assert!(response.success);
        assert!(context.model.store().is_empty());
    }

    #[test]
    fn invalid_requests_are_reported() {
        let (mut model, id) = loaded_model();
        let bus = CommandBus::new();
        let mut context = CommandContext { model: &mut model };

        for line in [
            "set_measurement".to_string(),
            format!("set_measurement {id} depth 3"),
            format!("set_measurement {id} cutDepth deep"),
            "set_measurement missing cutDepth 3".to_string(),
            "set_unit cm".to_string(),
            "set_separator ;".to_string(),
            "rotate".to_string(),
        ] {
            let response = bus.dispatch(&request(&line), &mut context);
            assert!(!response.success, "{line}");
        }
        assert!(context.model.store().is_empty());
    }

    #[test]
    fn unit_and_separator_commands_change_display() {
        let (mut model, id) = loaded_model();
        let bus = CommandBus::new();
        let mut context = CommandContext { model: &mut model };
        bus.dispatch(&request(&format!("set_measurement {id} cutOffset 25.4")), &mut context);
        assert!(bus.dispatch(&request("set_unit in"), &mut context).success);
        assert!(bus.dispatch(&request("set_separator ,"), &mut context).success);
        let shown = context
            .model
            .display_value(&ElementId::new(id.as_str()), MeasureAttr::CutOffset);
        assert_eq!(shown.as_deref(), Some("1,0in"));
    }

    #[test]
    fn clear_command_empties_model() {
        let (mut model, _) = loaded_model();
        let bus = CommandBus::new();
        let mut context = CommandContext { model: &mut model };
        assert!(bus.dispatch(&request("clear"), &mut context).success);
        assert_eq!(context.model.state(), ModelState::Empty);
        assert_eq!(
            bus.available_commands(),
            ["clear", "set_cut_type", "set_measurement", "set_separator", "set_unit", "summary"]
        );
    }
}
