//! Strict Plan contract and its validator.
//!
//! A Plan is the versioned, host-scoped list of document mutations the WPS
//! frontend executes. Validation is strict: the input must already have been
//! through [`crate::plan::normalize`], otherwise camelCase keys or wrapped
//! `params` objects are reported as errors rather than repaired here.

use std::collections::HashSet;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::utils::sanitize::{is_valid_id, MAX_ID_LEN};

/// The one supported contract version.
pub const PLAN_SCHEMA_VERSION: &str = "ah32.plan.v1";

/// Maximum nesting accepted for `upsert_block` children.
pub const MAX_ACTION_DEPTH: usize = 2;

/// Every operation tag the executor understands.
pub const KNOWN_OPS: &[&str] = &[
    "insert_text",
    "insert_after_text",
    "insert_before_text",
    "upsert_block",
    "delete_block",
    "set_selection",
    "insert_table",
    "insert_chart_from_selection",
    "insert_word_art",
    "set_cell_formula",
    "set_number_format",
    "set_conditional_format",
    "set_data_validation",
    "sort_range",
    "filter_range",
    "create_pivot_table",
    "set_slide_background",
    "set_slide_text_style",
    "set_slide_theme",
    "set_slide_layout",
    "set_shape_style",
    "set_table_style",
    "set_text_style",
    "answer_mode_apply",
];

const SPREADSHEET_OPS: &[&str] = &[
    "set_cell_formula",
    "set_number_format",
    "set_conditional_format",
    "set_data_validation",
    "sort_range",
    "filter_range",
    "create_pivot_table",
];

const SLIDE_OPS: &[&str] = &[
    "set_slide_background",
    "set_slide_text_style",
    "set_slide_theme",
    "set_slide_layout",
    "set_shape_style",
];

/// WPS host application a request (and its Plan) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum HostApp {
    /// Writer (word processor)
    Wps,
    /// Spreadsheets
    Et,
    /// Presentation
    Wpp,
}

impl HostApp {
    pub fn as_str(&self) -> &'static str {
        match self {
            HostApp::Wps => "wps",
            HostApp::Et => "et",
            HostApp::Wpp => "wpp",
        }
    }

    /// Parse a host name, accepting the common aliases the frontend and
    /// models use (`word`, `excel`, `ppt`, ...).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "wps" | "writer" | "word" | "doc" | "docx" => Some(HostApp::Wps),
            "et" | "excel" | "spreadsheet" | "sheet" | "xls" | "xlsx" => Some(HostApp::Et),
            "wpp" | "ppt" | "pptx" | "powerpoint" | "presentation" | "slides" => {
                Some(HostApp::Wpp)
            }
            _ => None,
        }
    }

    /// Human label used in prompts.
    pub fn label(&self) -> &'static str {
        match self {
            HostApp::Wps => "WPS Writer (document)",
            HostApp::Et => "WPS Spreadsheets (ET)",
            HostApp::Wpp => "WPS Presentation (WPP)",
        }
    }
}

impl fmt::Display for HostApp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an `upsert_block` is placed on first insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BlockAnchor {
    #[default]
    Cursor,
    End,
}

impl BlockAnchor {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockAnchor::Cursor => "cursor",
            BlockAnchor::End => "end",
        }
    }
}

/// Target of a `set_selection` action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SelectionAnchor {
    Start,
    End,
    Text,
    Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// One before/after pair applied by `answer_mode_apply`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Replacement {
    pub before: String,
    pub after: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// One value field of a pivot table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PivotValue {
    pub field: String,
    #[serde(default = "default_summary")]
    pub summary: String,
}

fn default_summary() -> String {
    "sum".to_string()
}

fn default_true() -> bool {
    true
}

/// A validated Plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Plan {
    pub schema_version: String,
    pub host_app: HostApp,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub meta: Map<String, Value>,
    pub actions: Vec<Action>,
}

impl Plan {
    /// Iterate over top-level and nested actions, depth first.
    pub fn walk(&self) -> Vec<&Action> {
        fn visit<'a>(actions: &'a [Action], out: &mut Vec<&'a Action>) {
            for action in actions {
                out.push(action);
                if let ActionKind::UpsertBlock { actions, .. } = &action.kind {
                    visit(actions, out);
                }
            }
        }
        let mut out = Vec::new();
        visit(&self.actions, &mut out);
        out
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// One document mutation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Action {
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(flatten)]
    pub kind: ActionKind,
}

impl Action {
    pub fn op(&self) -> &'static str {
        self.kind.op()
    }
}

/// Operation payloads, discriminated by `op`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ActionKind {
    InsertText {
        text: String,
        #[serde(default)]
        new_paragraph_before: bool,
        #[serde(default)]
        new_paragraph_after: bool,
    },
    InsertAfterText {
        anchor_text: String,
        text: String,
        #[serde(default)]
        new_paragraph_before: bool,
        #[serde(default)]
        new_paragraph_after: bool,
    },
    InsertBeforeText {
        anchor_text: String,
        text: String,
        #[serde(default)]
        new_paragraph_before: bool,
        #[serde(default)]
        new_paragraph_after: bool,
    },
    UpsertBlock {
        block_id: String,
        #[serde(default)]
        anchor: BlockAnchor,
        #[serde(default = "default_true")]
        freeze_cursor: bool,
        actions: Vec<Action>,
    },
    DeleteBlock {
        block_id: String,
    },
    SetSelection {
        anchor: SelectionAnchor,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        block_id: Option<String>,
    },
    InsertTable {
        rows: u32,
        cols: u32,
        #[serde(default)]
        header: bool,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        data: Vec<Vec<String>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        style_name: Option<String>,
    },
    InsertChartFromSelection {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        chart_type: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        chart_title: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source_range: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sheet_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        has_legend: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        legend_position: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        width: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        height: Option<f64>,
    },
    InsertWordArt {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        preset: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        font_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        font_size: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bold: Option<bool>,
    },
    SetCellFormula {
        cell: String,
        formula: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sheet_name: Option<String>,
    },
    SetNumberFormat {
        range: String,
        number_format: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sheet_name: Option<String>,
    },
    SetConditionalFormat {
        range: String,
        rule_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        operator: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        formula1: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        formula2: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fill_color: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        font_color: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sheet_name: Option<String>,
    },
    SetDataValidation {
        range: String,
        validation_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        operator: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        formula1: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        formula2: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        allow_blank: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input_message: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_message: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sheet_name: Option<String>,
    },
    SortRange {
        range: String,
        key: String,
        #[serde(default)]
        order: SortOrder,
        #[serde(default)]
        has_header: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sheet_name: Option<String>,
    },
    FilterRange {
        range: String,
        field: u32,
        criteria1: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        operator: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        criteria2: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sheet_name: Option<String>,
    },
    CreatePivotTable {
        source_range: String,
        destination: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        rows: Vec<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        columns: Vec<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        values: Vec<PivotValue>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        table_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sheet_name: Option<String>,
    },
    SetSlideBackground {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        slide_index: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        color: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image_url: Option<String>,
        #[serde(default)]
        apply_to_all: bool,
    },
    SetSlideTextStyle {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        slide_index: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        font_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        font_size: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        color: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bold: Option<bool>,
        #[serde(default)]
        apply_to_all: bool,
    },
    SetSlideTheme {
        theme_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        slide_index: Option<u32>,
        #[serde(default)]
        apply_to_all: bool,
    },
    SetSlideLayout {
        layout: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        slide_index: Option<u32>,
    },
    SetShapeStyle {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        slide_index: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        shape_index: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        shape_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fill_color: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        line_color: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        line_width: Option<f64>,
    },
    SetTableStyle {
        style_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        table_index: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        slide_index: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        banded_rows: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        header_row: Option<bool>,
    },
    SetTextStyle {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        block_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        font_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        font_size: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        color: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bold: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        italic: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        underline: Option<bool>,
    },
    AnswerModeApply {
        block_id: String,
        replacements: Vec<Replacement>,
        #[serde(default)]
        strict: bool,
    },
}

impl ActionKind {
    pub fn op(&self) -> &'static str {
        match self {
            ActionKind::InsertText { .. } => "insert_text",
            ActionKind::InsertAfterText { .. } => "insert_after_text",
            ActionKind::InsertBeforeText { .. } => "insert_before_text",
            ActionKind::UpsertBlock { .. } => "upsert_block",
            ActionKind::DeleteBlock { .. } => "delete_block",
            ActionKind::SetSelection { .. } => "set_selection",
            ActionKind::InsertTable { .. } => "insert_table",
            ActionKind::InsertChartFromSelection { .. } => "insert_chart_from_selection",
            ActionKind::InsertWordArt { .. } => "insert_word_art",
            ActionKind::SetCellFormula { .. } => "set_cell_formula",
            ActionKind::SetNumberFormat { .. } => "set_number_format",
            ActionKind::SetConditionalFormat { .. } => "set_conditional_format",
            ActionKind::SetDataValidation { .. } => "set_data_validation",
            ActionKind::SortRange { .. } => "sort_range",
            ActionKind::FilterRange { .. } => "filter_range",
            ActionKind::CreatePivotTable { .. } => "create_pivot_table",
            ActionKind::SetSlideBackground { .. } => "set_slide_background",
            ActionKind::SetSlideTextStyle { .. } => "set_slide_text_style",
            ActionKind::SetSlideTheme { .. } => "set_slide_theme",
            ActionKind::SetSlideLayout { .. } => "set_slide_layout",
            ActionKind::SetShapeStyle { .. } => "set_shape_style",
            ActionKind::SetTableStyle { .. } => "set_table_style",
            ActionKind::SetTextStyle { .. } => "set_text_style",
            ActionKind::AnswerModeApply { .. } => "answer_mode_apply",
        }
    }
}

/// Hosts an operation may run on. `None` means every host.
pub fn required_host(op: &str) -> Option<HostApp> {
    if SPREADSHEET_OPS.contains(&op) {
        Some(HostApp::Et)
    } else if SLIDE_OPS.contains(&op) {
        Some(HostApp::Wpp)
    } else {
        None
    }
}

/// One validation failure, qualified by a JSON path (`actions[1].block_id`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub path: String,
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Every field error found in one validation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanValidationError {
    pub errors: Vec<FieldError>,
}

impl fmt::Display for PlanValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        write!(
            f,
            "Plan validation failed ({} error(s)): {}",
            self.errors.len(),
            joined
        )
    }
}

impl std::error::Error for PlanValidationError {}

impl PlanValidationError {
    pub fn single(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            errors: vec![FieldError {
                path: path.into(),
                message: message.into(),
            }],
        }
    }

    /// True if any error reports an unknown operation.
    pub fn has_unknown_op(&self) -> bool {
        self.errors
            .iter()
            .any(|e| e.message.starts_with("unknown operation"))
    }
}

struct Collector {
    errors: Vec<FieldError>,
}

impl Collector {
    fn push(&mut self, path: &str, message: impl Into<String>) {
        self.errors.push(FieldError {
            path: path.to_string(),
            message: message.into(),
        });
    }
}

/// Validate a normalized Plan payload.
///
/// Returns the typed Plan on success, or every field-qualified error found.
pub fn validate_plan(raw: &Value) -> Result<Plan, PlanValidationError> {
    let mut c = Collector { errors: Vec::new() };

    let Some(obj) = raw.as_object() else {
        return Err(PlanValidationError::single("$", "plan must be a JSON object"));
    };

    match obj.get("schema_version") {
        Some(Value::String(v)) if v == PLAN_SCHEMA_VERSION => {}
        Some(Value::String(v)) => c.push(
            "schema_version",
            format!(
                "unsupported schema_version '{}', expected '{}'",
                v, PLAN_SCHEMA_VERSION
            ),
        ),
        Some(_) => c.push("schema_version", "must be a string"),
        None => c.push("schema_version", "missing field"),
    }

    let host = match obj.get("host_app") {
        Some(Value::String(h)) => match serde_json::from_value::<HostApp>(Value::String(h.clone()))
        {
            Ok(host) => Some(host),
            Err(_) => {
                c.push(
                    "host_app",
                    format!("unsupported host_app '{}', expected one of wps, et, wpp", h),
                );
                None
            }
        },
        Some(_) => {
            c.push("host_app", "must be a string");
            None
        }
        None => {
            c.push("host_app", "missing field");
            None
        }
    };

    if let Some(meta) = obj.get("meta") {
        if !meta.is_object() {
            c.push("meta", "must be an object");
        }
    }

    match obj.get("actions") {
        Some(Value::Array(actions)) => {
            if actions.is_empty() {
                c.push("actions", "must contain at least one action");
            }
            for (i, action) in actions.iter().enumerate() {
                validate_action(action, &format!("actions[{}]", i), 1, host, &mut c);
            }
            warn_duplicate_ids(actions);
        }
        Some(_) => c.push("actions", "must be an array"),
        None => c.push("actions", "missing field"),
    }

    if !c.errors.is_empty() {
        return Err(PlanValidationError { errors: c.errors });
    }

    serde_json::from_value::<Plan>(raw.clone())
        .map_err(|e| PlanValidationError::single("$", e.to_string()))
}

fn validate_action(
    raw: &Value,
    path: &str,
    depth: usize,
    host: Option<HostApp>,
    c: &mut Collector,
) {
    let Some(obj) = raw.as_object() else {
        c.push(path, "action must be an object");
        return;
    };

    match obj.get("id") {
        Some(Value::String(id)) if is_valid_id(id) => {}
        Some(Value::String(id)) => c.push(
            &format!("{}.id", path),
            format!(
                "invalid id '{}': must match [a-zA-Z0-9_-:.] and be 1-{} chars",
                id, MAX_ID_LEN
            ),
        ),
        Some(_) => c.push(&format!("{}.id", path), "must be a string"),
        None => c.push(&format!("{}.id", path), "missing field"),
    }

    let op = match obj.get("op") {
        Some(Value::String(op)) => op.as_str(),
        Some(_) => {
            c.push(&format!("{}.op", path), "must be a string");
            return;
        }
        None => {
            c.push(&format!("{}.op", path), "missing field");
            return;
        }
    };

    if !KNOWN_OPS.contains(&op) {
        c.push(&format!("{}.op", path), format!("unknown operation '{}'", op));
        return;
    }

    if let (Some(required), Some(host)) = (required_host(op), host) {
        if required != host {
            c.push(
                &format!("{}.op", path),
                format!(
                    "operation '{}' requires host_app '{}' but plan targets '{}'",
                    op, required, host
                ),
            );
        }
    }

    let before = c.errors.len();

    if op == "upsert_block" {
        if depth >= MAX_ACTION_DEPTH {
            c.push(path, "upsert_block cannot be nested inside another upsert_block");
            return;
        }
        validate_block_id(obj.get("block_id"), &format!("{}.block_id", path), c);
        match obj.get("actions") {
            Some(Value::Array(children)) => {
                if children.is_empty() {
                    c.push(
                        &format!("{}.actions", path),
                        "upsert_block must contain at least one action",
                    );
                }
                for (i, child) in children.iter().enumerate() {
                    validate_action(
                        child,
                        &format!("{}.actions[{}]", path, i),
                        depth + 1,
                        host,
                        c,
                    );
                }
            }
            Some(_) => c.push(&format!("{}.actions", path), "must be an array"),
            None => c.push(&format!("{}.actions", path), "missing field"),
        }
    }

    if c.errors.len() > before {
        return;
    }

    match serde_json::from_value::<Action>(raw.clone()) {
        Ok(action) => check_semantics(&action, path, c),
        Err(e) => {
            let message = e.to_string();
            let field_path = missing_field(&message)
                .map(|f| format!("{}.{}", path, f))
                .unwrap_or_else(|| path.to_string());
            c.push(&field_path, message);
        }
    }
}

fn validate_block_id(value: Option<&Value>, path: &str, c: &mut Collector) {
    match value {
        Some(Value::String(id)) if is_valid_id(id) => {}
        Some(Value::String(id)) => c.push(path, format!("invalid block_id '{}'", id)),
        Some(_) => c.push(path, "must be a string"),
        None => c.push(path, "missing field"),
    }
}

fn check_semantics(action: &Action, path: &str, c: &mut Collector) {
    match &action.kind {
        ActionKind::DeleteBlock { block_id } | ActionKind::AnswerModeApply { block_id, .. }
            if !is_valid_id(block_id) =>
        {
            c.push(
                &format!("{}.block_id", path),
                format!("invalid block_id '{}'", block_id),
            );
        }
        ActionKind::InsertTable { rows, cols, .. } => {
            if *rows == 0 {
                c.push(&format!("{}.rows", path), "must be at least 1");
            }
            if *cols == 0 {
                c.push(&format!("{}.cols", path), "must be at least 1");
            }
        }
        ActionKind::SetSelection {
            anchor,
            text,
            block_id,
        } => match anchor {
            SelectionAnchor::Text if text.as_deref().map_or(true, str::is_empty) => {
                c.push(&format!("{}.text", path), "required when anchor is 'text'");
            }
            SelectionAnchor::Block if block_id.as_deref().map_or(true, |b| !is_valid_id(b)) => {
                c.push(
                    &format!("{}.block_id", path),
                    "a valid block_id is required when anchor is 'block'",
                );
            }
            _ => {}
        },
        ActionKind::InsertAfterText { anchor_text, .. }
        | ActionKind::InsertBeforeText { anchor_text, .. }
            if anchor_text.trim().is_empty() =>
        {
            c.push(&format!("{}.anchor_text", path), "must not be empty");
        }
        _ => {}
    }

    if let ActionKind::AnswerModeApply { replacements, .. } = &action.kind {
        if replacements.is_empty() {
            c.push(
                &format!("{}.replacements", path),
                "must contain at least one replacement",
            );
        }
        for (i, r) in replacements.iter().enumerate() {
            if r.before.is_empty() {
                c.push(
                    &format!("{}.replacements[{}].before", path, i),
                    "must not be empty",
                );
            }
        }
    }
}

/// Extract the field name from serde's "missing field `x`" message.
fn missing_field(message: &str) -> Option<&str> {
    let rest = message.strip_prefix("missing field `")?;
    rest.split('`').next()
}

fn warn_duplicate_ids(actions: &[Value]) {
    let mut seen = HashSet::new();
    for id in actions
        .iter()
        .filter_map(|a| a.get("id").and_then(Value::as_str))
    {
        if !seen.insert(id) {
            tracing::warn!(id, "Plan contains duplicate action id");
        }
    }
}

/// JSON schema of the Plan contract, served to frontends and prompts.
pub fn plan_json_schema() -> Value {
    serde_json::to_value(schemars::schema_for!(Plan)).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn minimal(host: &str, actions: Value) -> Value {
        json!({
            "schema_version": PLAN_SCHEMA_VERSION,
            "host_app": host,
            "actions": actions,
        })
    }

    #[test]
    fn test_valid_upsert_plan() {
        let raw = minimal(
            "wps",
            json!([{
                "id": "step_1",
                "title": "Write summary",
                "op": "upsert_block",
                "block_id": "ah32_summary",
                "anchor": "end",
                "actions": [{"id": "t1", "op": "insert_text", "text": "hello"}]
            }]),
        );
        let plan = validate_plan(&raw).expect("plan should validate");
        assert_eq!(plan.host_app, HostApp::Wps);
        assert_eq!(plan.actions.len(), 1);
        match &plan.actions[0].kind {
            ActionKind::UpsertBlock {
                block_id,
                anchor,
                freeze_cursor,
                actions,
            } => {
                assert_eq!(block_id, "ah32_summary");
                assert_eq!(*anchor, BlockAnchor::End);
                assert!(*freeze_cursor);
                assert_eq!(actions[0].op(), "insert_text");
            }
            other => panic!("unexpected kind {:?}", other),
        }
        assert_eq!(plan.walk().len(), 2);
    }

    #[test]
    fn test_wrong_schema_version_rejected() {
        let mut raw = minimal("wps", json!([{"id": "a", "op": "insert_text", "text": "x"}]));
        raw["schema_version"] = json!("v0");
        let err = validate_plan(&raw).unwrap_err();
        assert_eq!(err.errors[0].path, "schema_version");
    }

    #[test]
    fn test_unknown_host_rejected() {
        let raw = minimal("word", json!([{"id": "a", "op": "insert_text", "text": "x"}]));
        let err = validate_plan(&raw).unwrap_err();
        assert_eq!(err.errors[0].path, "host_app");
    }

    #[test]
    fn test_unknown_op_reported() {
        let raw = minimal("wps", json!([{"id": "a", "op": "frobnicate"}]));
        let err = validate_plan(&raw).unwrap_err();
        assert!(err.has_unknown_op());
        assert_eq!(err.errors[0].path, "actions[0].op");
    }

    #[test]
    fn test_errors_are_collected_with_paths() {
        let raw = json!({
            "schema_version": PLAN_SCHEMA_VERSION,
            "host_app": "wps",
            "meta": "oops",
            "actions": [
                {"id": "bad id", "op": "insert_text", "text": "x"},
                {"id": "ok", "op": "insert_text"}
            ]
        });
        let err = validate_plan(&raw).unwrap_err();
        let paths: Vec<&str> = err.errors.iter().map(|e| e.path.as_str()).collect();
        assert!(paths.contains(&"meta"));
        assert!(paths.contains(&"actions[0].id"));
        assert!(paths.contains(&"actions[1].text"));
    }

    #[test]
    fn test_nested_upsert_rejected() {
        let raw = minimal(
            "wps",
            json!([{
                "id": "outer", "op": "upsert_block", "block_id": "b1",
                "actions": [{
                    "id": "inner", "op": "upsert_block", "block_id": "b2",
                    "actions": [{"id": "t", "op": "insert_text", "text": "x"}]
                }]
            }]),
        );
        let err = validate_plan(&raw).unwrap_err();
        assert_eq!(err.errors[0].path, "actions[0].actions[0]");
    }

    #[test]
    fn test_spreadsheet_op_requires_et() {
        let action = json!([{"id": "f", "op": "set_cell_formula", "cell": "A1", "formula": "=1"}]);
        assert!(validate_plan(&minimal("et", action.clone())).is_ok());
        let err = validate_plan(&minimal("wps", action)).unwrap_err();
        assert!(err.errors[0].message.contains("requires host_app 'et'"));
    }

    #[test]
    fn test_empty_actions_rejected() {
        let err = validate_plan(&minimal("wpp", json!([]))).unwrap_err();
        assert_eq!(err.errors[0].path, "actions");
    }

    #[test]
    fn test_semantic_checks() {
        let raw = minimal(
            "wps",
            json!([
                {"id": "t", "op": "insert_table", "rows": 0, "cols": 2},
                {"id": "s", "op": "set_selection", "anchor": "text"},
                {"id": "r", "op": "answer_mode_apply", "block_id": "b", "replacements": []}
            ]),
        );
        let err = validate_plan(&raw).unwrap_err();
        let paths: Vec<&str> = err.errors.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["actions[0].rows", "actions[1].text", "actions[2].replacements"]
        );
    }

    #[test]
    fn test_plan_serializes_back_to_same_shape() {
        let raw = minimal(
            "et",
            json!([{"id": "sort", "title": "Sort", "op": "sort_range", "range": "A1:C9", "key": "B", "order": "desc", "has_header": true}]),
        );
        let plan = validate_plan(&raw).unwrap();
        assert_eq!(plan.to_value(), raw);
    }

    #[test]
    fn test_host_aliases() {
        assert_eq!(HostApp::from_name("Excel"), Some(HostApp::Et));
        assert_eq!(HostApp::from_name("ppt"), Some(HostApp::Wpp));
        assert_eq!(HostApp::from_name("word"), Some(HostApp::Wps));
        assert_eq!(HostApp::from_name("notepad"), None);
    }

    #[test]
    fn test_json_schema_mentions_ops() {
        let schema = plan_json_schema().to_string();
        assert!(schema.contains("upsert_block"));
        assert!(schema.contains("answer_mode_apply"));
    }
}
