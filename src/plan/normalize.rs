//! Best-effort reshaping of model-produced Plan JSON.
//!
//! Models mix camelCase and snake_case, wrap arguments in `params`, and invent
//! operation spellings. Everything here is a pure `Value -> Value` transform
//! that never fails; anything it cannot make sense of is left for
//! [`crate::plan::schema::validate_plan`] to reject with a precise error.
//!
//! Normalizing an already normalized payload is a no-op.

use serde_json::{Map, Value};

use crate::plan::schema::{HostApp, KNOWN_OPS, PLAN_SCHEMA_VERSION};
use crate::utils::sanitize::safe_id;

/// Recursion bound for nested `upsert_block` children.
const MAX_NORMALIZE_DEPTH: usize = 3;

/// Keys accepted in place of `op`.
const TAG_KEYS: &[&str] = &["op", "operation", "type", "action"];

/// Wrapper objects whose contents are merged into the action.
const WRAPPER_KEYS: &[&str] = &["params", "parameters"];

/// camelCase spellings seen in model output.
const KEY_RENAMES: &[(&str, &str)] = &[
    ("blockId", "block_id"),
    ("newParagraphBefore", "new_paragraph_before"),
    ("newParagraphAfter", "new_paragraph_after"),
    ("anchorText", "anchor_text"),
    ("freezeCursor", "freeze_cursor"),
    ("chartType", "chart_type"),
    ("chartTitle", "chart_title"),
    ("sourceRange", "source_range"),
    ("dataRange", "source_range"),
    ("sheetName", "sheet_name"),
    ("hasLegend", "has_legend"),
    ("legendPosition", "legend_position"),
    ("fontName", "font_name"),
    ("fontSize", "font_size"),
    ("fontColor", "font_color"),
    ("numberFormat", "number_format"),
    ("ruleType", "rule_type"),
    ("fillColor", "fill_color"),
    ("validationType", "validation_type"),
    ("allowBlank", "allow_blank"),
    ("inputMessage", "input_message"),
    ("errorMessage", "error_message"),
    ("hasHeader", "has_header"),
    ("sortKey", "key"),
    ("tableName", "table_name"),
    ("rowFields", "rows"),
    ("columnFields", "columns"),
    ("valueFields", "values"),
    ("slideIndex", "slide_index"),
    ("imageUrl", "image_url"),
    ("applyToAll", "apply_to_all"),
    ("themeName", "theme_name"),
    ("shapeIndex", "shape_index"),
    ("shapeName", "shape_name"),
    ("lineColor", "line_color"),
    ("lineWidth", "line_width"),
    ("styleName", "style_name"),
    ("tableIndex", "table_index"),
    ("bandedRows", "banded_rows"),
    ("headerRow", "header_row"),
    ("rowCount", "rows"),
    ("colCount", "cols"),
    ("columnCount", "cols"),
    ("wordPreset", "preset"),
];

/// Alternative operation names, keyed by their snake_case form.
const OP_ALIASES: &[(&str, &str)] = &[
    ("insert", "insert_text"),
    ("write", "insert_text"),
    ("write_text", "insert_text"),
    ("append_text", "insert_text"),
    ("insert_after", "insert_after_text"),
    ("insert_before", "insert_before_text"),
    ("upsert", "upsert_block"),
    ("block", "upsert_block"),
    ("replace_block", "upsert_block"),
    ("write_block", "upsert_block"),
    ("remove_block", "delete_block"),
    ("select", "set_selection"),
    ("select_text", "set_selection"),
    ("table", "insert_table"),
    ("add_table", "insert_table"),
    ("create_table", "insert_table"),
    ("chart", "insert_chart_from_selection"),
    ("insert_chart", "insert_chart_from_selection"),
    ("create_chart", "insert_chart_from_selection"),
    ("add_chart", "insert_chart_from_selection"),
    ("wordart", "insert_word_art"),
    ("word_art", "insert_word_art"),
    ("insert_wordart", "insert_word_art"),
    ("formula", "set_cell_formula"),
    ("set_formula", "set_cell_formula"),
    ("number_format", "set_number_format"),
    ("conditional_format", "set_conditional_format"),
    ("add_conditional_format", "set_conditional_format"),
    ("data_validation", "set_data_validation"),
    ("add_data_validation", "set_data_validation"),
    ("sort", "sort_range"),
    ("filter", "filter_range"),
    ("autofilter", "filter_range"),
    ("auto_filter", "filter_range"),
    ("pivot", "create_pivot_table"),
    ("pivot_table", "create_pivot_table"),
    ("insert_pivot_table", "create_pivot_table"),
    ("slide_background", "set_slide_background"),
    ("set_background", "set_slide_background"),
    ("slide_text_style", "set_slide_text_style"),
    ("slide_theme", "set_slide_theme"),
    ("apply_theme", "set_slide_theme"),
    ("slide_layout", "set_slide_layout"),
    ("shape_style", "set_shape_style"),
    ("table_style", "set_table_style"),
    ("text_style", "set_text_style"),
    ("set_font", "set_text_style"),
    ("format_text", "set_text_style"),
    ("answer_mode", "answer_mode_apply"),
    ("apply_replacements", "answer_mode_apply"),
];

const ANCHOR_VALUES: &[(&str, &str)] = &[
    ("bottom", "end"),
    ("append", "end"),
    ("tail", "end"),
    ("document_end", "end"),
    ("doc_end", "end"),
    ("current", "cursor"),
    ("caret", "cursor"),
    ("here", "cursor"),
    ("selection", "cursor"),
];

const SELECTION_VALUES: &[(&str, &str)] = &[
    ("begin", "start"),
    ("beginning", "start"),
    ("top", "start"),
    ("document_start", "start"),
    ("bottom", "end"),
    ("document_end", "end"),
    ("anchor_text", "text"),
    ("block_id", "block"),
];

const ORDER_VALUES: &[(&str, &str)] = &[
    ("ascending", "asc"),
    ("descending", "desc"),
    ("up", "asc"),
    ("down", "desc"),
];

#[derive(Debug, Clone, Copy)]
enum FieldKind {
    Str,
    Bool,
    Int,
    Num,
    Id,
    Enum(&'static [(&'static str, &'static str)]),
    StrList,
    Table,
    Replacements,
    PivotValues,
}

#[derive(Debug, Clone, Copy)]
struct Field {
    name: &'static str,
    kind: FieldKind,
    aliases: &'static [&'static str],
}

const fn f(name: &'static str, kind: FieldKind) -> Field {
    Field {
        name,
        kind,
        aliases: &[],
    }
}

const fn fa(name: &'static str, kind: FieldKind, aliases: &'static [&'static str]) -> Field {
    Field {
        name,
        kind,
        aliases,
    }
}

use FieldKind::*;

const PARAGRAPH_FLAGS: [Field; 2] = [
    f("new_paragraph_before", Bool),
    f("new_paragraph_after", Bool),
];

fn op_fields(op: &str) -> Option<Vec<Field>> {
    let fields = match op {
        "insert_text" => {
            let mut v = vec![fa("text", Str, &["content"])];
            v.extend(PARAGRAPH_FLAGS);
            v
        }
        "insert_after_text" => {
            let mut v = vec![
                fa("anchor_text", Str, &["anchor", "after", "target_text"]),
                fa("text", Str, &["content"]),
            ];
            v.extend(PARAGRAPH_FLAGS);
            v
        }
        "insert_before_text" => {
            let mut v = vec![
                fa("anchor_text", Str, &["anchor", "before", "target_text"]),
                fa("text", Str, &["content"]),
            ];
            v.extend(PARAGRAPH_FLAGS);
            v
        }
        "upsert_block" => vec![
            fa("anchor", Enum(ANCHOR_VALUES), &["position"]),
            f("freeze_cursor", Bool),
        ],
        "delete_block" => vec![f("block_id", Id)],
        "set_selection" => vec![
            fa("anchor", Enum(SELECTION_VALUES), &["target"]),
            f("text", Str),
            f("block_id", Id),
        ],
        "insert_table" => vec![
            f("rows", Int),
            fa("cols", Int, &["columns"]),
            fa("header", Bool, &["has_header"]),
            fa("data", Table, &["cells", "values"]),
            fa("style_name", Str, &["style"]),
        ],
        "insert_chart_from_selection" => vec![
            fa("chart_type", Str, &["chart"]),
            f("chart_title", Str),
            fa("source_range", Str, &["range"]),
            f("sheet_name", Str),
            fa("has_legend", Bool, &["legend"]),
            f("legend_position", Str),
            f("width", Num),
            f("height", Num),
        ],
        "insert_word_art" => vec![
            fa("text", Str, &["content"]),
            f("preset", Int),
            f("font_name", Str),
            f("font_size", Num),
            f("bold", Bool),
        ],
        "set_cell_formula" => vec![
            fa("cell", Str, &["range", "address", "target"]),
            fa("formula", Str, &["value"]),
            f("sheet_name", Str),
        ],
        "set_number_format" => vec![
            fa("range", Str, &["cell", "address"]),
            fa("number_format", Str, &["format"]),
            f("sheet_name", Str),
        ],
        "set_conditional_format" => vec![
            f("range", Str),
            fa("rule_type", Str, &["rule"]),
            f("operator", Str),
            fa("formula1", Str, &["formula", "value"]),
            f("formula2", Str),
            fa("fill_color", Str, &["color", "background_color"]),
            f("font_color", Str),
            f("sheet_name", Str),
        ],
        "set_data_validation" => vec![
            f("range", Str),
            fa("validation_type", Str, &["rule_type"]),
            f("operator", Str),
            fa("formula1", Str, &["source", "formula"]),
            f("formula2", Str),
            f("allow_blank", Bool),
            f("input_message", Str),
            f("error_message", Str),
            f("sheet_name", Str),
        ],
        "sort_range" => vec![
            f("range", Str),
            fa("key", Str, &["column", "by"]),
            fa("order", Enum(ORDER_VALUES), &["direction"]),
            fa("has_header", Bool, &["header"]),
            f("sheet_name", Str),
        ],
        "filter_range" => vec![
            f("range", Str),
            fa("field", Int, &["column_index", "column"]),
            fa("criteria1", Str, &["criteria", "value"]),
            f("operator", Str),
            f("criteria2", Str),
            f("sheet_name", Str),
        ],
        "create_pivot_table" => vec![
            fa("source_range", Str, &["range", "source"]),
            fa("destination", Str, &["target", "target_range"]),
            f("rows", StrList),
            fa("columns", StrList, &["cols"]),
            f("values", PivotValues),
            f("table_name", Str),
            f("sheet_name", Str),
        ],
        "set_slide_background" => vec![
            fa("slide_index", Int, &["slide"]),
            fa("color", Str, &["background_color", "fill_color"]),
            fa("image_url", Str, &["image"]),
            f("apply_to_all", Bool),
        ],
        "set_slide_text_style" => vec![
            fa("slide_index", Int, &["slide"]),
            f("font_name", Str),
            f("font_size", Num),
            fa("color", Str, &["font_color"]),
            f("bold", Bool),
            f("apply_to_all", Bool),
        ],
        "set_slide_theme" => vec![
            fa("theme_name", Str, &["theme"]),
            fa("slide_index", Int, &["slide"]),
            f("apply_to_all", Bool),
        ],
        "set_slide_layout" => vec![
            fa("layout", Str, &["layout_name"]),
            fa("slide_index", Int, &["slide"]),
        ],
        "set_shape_style" => vec![
            fa("slide_index", Int, &["slide"]),
            f("shape_index", Int),
            f("shape_name", Str),
            fa("fill_color", Str, &["color"]),
            f("line_color", Str),
            f("line_width", Num),
        ],
        "set_table_style" => vec![
            fa("style_name", Str, &["style"]),
            f("table_index", Int),
            fa("slide_index", Int, &["slide"]),
            f("banded_rows", Bool),
            f("header_row", Bool),
        ],
        "set_text_style" => vec![
            f("block_id", Id),
            f("font_name", Str),
            f("font_size", Num),
            fa("color", Str, &["font_color"]),
            f("bold", Bool),
            f("italic", Bool),
            f("underline", Bool),
        ],
        "answer_mode_apply" => vec![
            f("block_id", Id),
            fa("replacements", Replacements, &["changes", "edits"]),
            f("strict", Bool),
        ],
        _ => return None,
    };
    Some(fields)
}

/// Normalize a Plan-like payload into the strict Plan skeleton.
///
/// `host_hint` fills a missing `host_app`; a present one is never overwritten.
pub fn normalize_plan_payload(raw: &Value, host_hint: Option<HostApp>) -> Value {
    let mut current = raw.clone();

    // Unwrap JSON-in-a-string and `{"plan": ...}` envelopes.
    for _ in 0..3 {
        let next = match &current {
            Value::String(s) => serde_json::from_str::<Value>(s.trim())
                .ok()
                .filter(|parsed| parsed.is_object() || parsed.is_array()),
            Value::Object(obj) if !obj.contains_key("actions") => obj
                .get("plan")
                .filter(|p| p.is_object() || p.is_array() || p.is_string())
                .cloned(),
            _ => None,
        };
        match next {
            Some(inner) => current = inner,
            None => break,
        }
    }

    let obj = match current {
        Value::Array(actions) => {
            let mut m = Map::new();
            m.insert("actions".to_string(), Value::Array(actions));
            m
        }
        Value::Object(obj) if looks_like_action(&obj) => {
            let mut m = Map::new();
            m.insert("actions".to_string(), Value::Array(vec![Value::Object(obj)]));
            m
        }
        Value::Object(obj) => obj,
        _ => Map::new(),
    };
    let obj = rename_keys(
        obj,
        &[
            ("schemaVersion", "schema_version"),
            ("hostApp", "host_app"),
            ("host", "host_app"),
            ("steps", "actions"),
        ],
    );

    let mut out = Map::new();

    let schema_version = match obj.get("schema_version") {
        None | Some(Value::Null) => Value::from(PLAN_SCHEMA_VERSION),
        Some(Value::String(v)) => Value::from(v.trim()),
        Some(other) => other.clone(),
    };
    out.insert("schema_version".to_string(), schema_version);

    match obj.get("host_app") {
        Some(Value::String(h)) => {
            let canonical = HostApp::from_name(h)
                .map(|host| host.as_str().to_string())
                .unwrap_or_else(|| h.trim().to_string());
            out.insert("host_app".to_string(), Value::from(canonical));
        }
        None | Some(Value::Null) => {
            if let Some(host) = host_hint {
                out.insert("host_app".to_string(), Value::from(host.as_str()));
            }
        }
        Some(other) => {
            out.insert("host_app".to_string(), other.clone());
        }
    }

    match obj.get("meta") {
        Some(Value::Null) => {
            out.insert("meta".to_string(), Value::Object(Map::new()));
        }
        Some(meta) => {
            out.insert("meta".to_string(), meta.clone());
        }
        None => {}
    }

    let actions = match obj.get("actions") {
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, a)| normalize_action_at(a, &format!("step_{}", i + 1), 1))
            .collect(),
        Some(single @ Value::Object(_)) => vec![normalize_action_at(single, "step_1", 1)],
        _ => Vec::new(),
    };
    out.insert("actions".to_string(), Value::Array(actions));

    Value::Object(out)
}

/// Normalize a single action object.
pub fn normalize_action(raw: &Value) -> Value {
    normalize_action_at(raw, "step_1", 1)
}

fn looks_like_action(obj: &Map<String, Value>) -> bool {
    let plan_keys = ["schema_version", "schemaVersion", "host_app", "hostApp"];
    if plan_keys.iter().any(|k| obj.contains_key(*k)) {
        return false;
    }
    TAG_KEYS
        .iter()
        .any(|k| obj.get(*k).is_some_and(Value::is_string))
}

fn normalize_action_at(raw: &Value, default_id: &str, depth: usize) -> Value {
    let Value::Object(obj) = raw else {
        let mut skeleton = Map::new();
        skeleton.insert("id".to_string(), Value::from(safe_id(default_id, "step")));
        return Value::Object(skeleton);
    };

    let merged = merge_wrappers(obj);
    let mut src = rename_keys(merged, KEY_RENAMES);

    let mut out = Map::new();

    let id = match src.get("id") {
        Some(Value::String(s)) => safe_id(s, "step"),
        Some(Value::Number(n)) => safe_id(&n.to_string(), "step"),
        _ => safe_id(default_id, "step"),
    };
    out.insert("id".to_string(), Value::from(id.clone()));

    if let Some(title) = src.get("title").and_then(coerce_str) {
        out.insert("title".to_string(), title);
    }

    let Some(op) = extract_op(&src) else {
        return Value::Object(out);
    };
    out.insert("op".to_string(), Value::from(op.clone()));

    let Some(fields) = op_fields(&op) else {
        return Value::Object(out);
    };

    if op == "upsert_block" {
        let block_id = match src.get("block_id") {
            Some(Value::String(s)) => safe_id(s, "block"),
            Some(Value::Number(n)) => safe_id(&n.to_string(), "block"),
            _ => id.clone(),
        };
        out.insert("block_id".to_string(), Value::from(block_id));
        let children = normalize_children(&mut src, &id, depth);
        out.insert("actions".to_string(), children);
    }

    for field in &fields {
        let value = std::iter::once(field.name)
            .chain(field.aliases.iter().copied())
            .filter_map(|key| src.get(key))
            .find(|v| !v.is_null());
        if let Some(coerced) = value.and_then(|v| coerce(v, field.kind)) {
            out.insert(field.name.to_string(), coerced);
        }
    }

    Value::Object(out)
}

fn normalize_children(src: &mut Map<String, Value>, parent_id: &str, depth: usize) -> Value {
    let children: Vec<Value> = match src.remove("actions") {
        Some(Value::Array(items)) if !items.is_empty() => items,
        Some(single @ Value::Object(_)) => vec![single],
        _ => Vec::new(),
    };

    if depth >= MAX_NORMALIZE_DEPTH {
        return Value::Array(children);
    }

    let children = if children.is_empty() {
        // Flat shape: `{"op": "upsert_block", "content": "..."}`.
        match ["content", "text"]
            .iter()
            .filter_map(|k| src.get(*k))
            .find_map(coerce_str)
        {
            Some(text) => {
                let mut child = Map::new();
                child.insert("op".to_string(), Value::from("insert_text"));
                child.insert("text".to_string(), text);
                vec![Value::Object(child)]
            }
            None => Vec::new(),
        }
    } else {
        children
    };

    Value::Array(
        children
            .iter()
            .enumerate()
            .map(|(i, c)| normalize_action_at(c, &format!("{}_{}", parent_id, i + 1), depth + 1))
            .collect(),
    )
}

fn merge_wrappers(obj: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = Map::new();
    for key in WRAPPER_KEYS {
        if let Some(Value::Object(inner)) = obj.get(*key) {
            for (k, v) in inner {
                merged.insert(k.clone(), v.clone());
            }
        }
    }
    for (k, v) in obj {
        if WRAPPER_KEYS.contains(&k.as_str()) {
            continue;
        }
        merged.insert(k.clone(), v.clone());
    }
    merged
}

/// Apply a rename table. An already-present target key wins over its alias.
fn rename_keys(obj: Map<String, Value>, table: &[(&str, &str)]) -> Map<String, Value> {
    let mut out = Map::new();
    let mut renamed = Vec::new();
    for (k, v) in obj {
        match table.iter().find(|(from, _)| *from == k) {
            Some((_, to)) => renamed.push((to.to_string(), v)),
            None => {
                out.insert(k, v);
            }
        }
    }
    for (k, v) in renamed {
        out.entry(k).or_insert(v);
    }
    out
}

fn extract_op(src: &Map<String, Value>) -> Option<String> {
    let raw = TAG_KEYS
        .iter()
        .find_map(|k| src.get(*k).and_then(Value::as_str))?;
    Some(canonical_op(raw))
}

/// Map an operation spelling onto a known op, or return it trimmed.
pub fn canonical_op(raw: &str) -> String {
    let trimmed = raw.trim();
    if KNOWN_OPS.contains(&trimmed) {
        return trimmed.to_string();
    }
    let snake = to_snake_case(trimmed);
    if KNOWN_OPS.contains(&snake.as_str()) {
        return snake;
    }
    if let Some((_, op)) = OP_ALIASES.iter().find(|(alias, _)| *alias == snake) {
        return op.to_string();
    }
    trimmed.to_string()
}

fn to_snake_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    for c in s.chars() {
        if c.is_ascii_uppercase() {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else if c == '-' || c == ' ' {
            if !out.ends_with('_') {
                out.push('_');
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn coerce(value: &Value, kind: FieldKind) -> Option<Value> {
    match kind {
        Str => coerce_str(value),
        Bool => coerce_bool(value),
        Int => coerce_int(value),
        Num => coerce_num(value),
        Id => match value {
            Value::String(s) => Some(Value::from(safe_id(s, "block"))),
            Value::Number(n) => Some(Value::from(safe_id(&n.to_string(), "block"))),
            _ => None,
        },
        Enum(table) => {
            let s = value.as_str()?.trim().to_ascii_lowercase();
            let mapped = table
                .iter()
                .find(|(alias, _)| *alias == s)
                .map(|(_, v)| v.to_string())
                .unwrap_or(s);
            Some(Value::from(mapped))
        }
        StrList => match value {
            Value::Array(items) => Some(Value::Array(
                items.iter().filter_map(coerce_str).collect(),
            )),
            other => coerce_str(other).map(|s| Value::Array(vec![s])),
        },
        Table => coerce_table(value),
        Replacements => coerce_replacements(value),
        PivotValues => coerce_pivot_values(value),
    }
}

fn coerce_str(value: &Value) -> Option<Value> {
    match value {
        Value::String(_) => Some(value.clone()),
        Value::Number(n) => Some(Value::from(n.to_string())),
        Value::Bool(b) => Some(Value::from(b.to_string())),
        _ => None,
    }
}

fn coerce_bool(value: &Value) -> Option<Value> {
    match value {
        Value::Bool(_) => Some(value.clone()),
        Value::Number(n) => n.as_f64().map(|f| Value::from(f != 0.0)),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" | "1" | "on" | "是" => Some(Value::from(true)),
            "false" | "no" | "n" | "0" | "off" | "否" => Some(Value::from(false)),
            _ => None,
        },
        _ => None,
    }
}

fn coerce_int(value: &Value) -> Option<Value> {
    match value {
        Value::Number(n) => {
            if n.is_u64() || n.is_i64() {
                Some(value.clone())
            } else {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.is_finite())
                    .map(|f| Value::from(f as i64))
            }
        }
        Value::String(s) => s.trim().parse::<i64>().ok().map(Value::from),
        _ => None,
    }
}

fn coerce_num(value: &Value) -> Option<Value> {
    match value {
        Value::Number(_) => Some(value.clone()),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number),
        _ => None,
    }
}

fn coerce_table(value: &Value) -> Option<Value> {
    let Value::Array(rows) = value else {
        return None;
    };
    let cell = |v: &Value| coerce_str(v).unwrap_or_else(|| Value::from(""));
    if !rows.is_empty() && rows.iter().all(|r| !r.is_array()) {
        return Some(Value::Array(vec![Value::Array(
            rows.iter().map(cell).collect(),
        )]));
    }
    Some(Value::Array(
        rows.iter()
            .filter_map(Value::as_array)
            .map(|r| Value::Array(r.iter().map(cell).collect()))
            .collect(),
    ))
}

fn first_str(obj: &Map<String, Value>, keys: &[&str]) -> Option<Value> {
    keys.iter().filter_map(|k| obj.get(*k)).find_map(coerce_str)
}

fn coerce_replacements(value: &Value) -> Option<Value> {
    let items = match value {
        Value::Array(items) => items.clone(),
        Value::Object(_) => vec![value.clone()],
        _ => return None,
    };
    let out = items
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|item| {
            let before = first_str(item, &["before", "old", "from", "original", "find"])?;
            let after = first_str(item, &["after", "new", "to", "replacement", "replace"])
                .unwrap_or_else(|| Value::from(""));
            let mut m = Map::new();
            m.insert("before".to_string(), before);
            m.insert("after".to_string(), after);
            if let Some(reason) = first_str(item, &["reason", "note"]) {
                m.insert("reason".to_string(), reason);
            }
            Some(Value::Object(m))
        })
        .collect();
    Some(Value::Array(out))
}

fn coerce_pivot_values(value: &Value) -> Option<Value> {
    let items = match value {
        Value::Array(items) => items.clone(),
        other => vec![other.clone()],
    };
    let out: Vec<Value> = items
        .iter()
        .filter_map(|item| match item {
            Value::String(_) => {
                let mut m = Map::new();
                m.insert("field".to_string(), item.clone());
                Some(Value::Object(m))
            }
            Value::Object(obj) => {
                let field = first_str(obj, &["field", "name", "column"])?;
                let mut m = Map::new();
                m.insert("field".to_string(), field);
                if let Some(summary) = ["summary", "function", "agg"]
                    .iter()
                    .filter_map(|k| obj.get(*k).and_then(Value::as_str))
                    .next()
                {
                    m.insert(
                        "summary".to_string(),
                        Value::from(summary.trim().to_ascii_lowercase()),
                    );
                }
                Some(Value::Object(m))
            }
            _ => None,
        })
        .collect();
    Some(Value::Array(out))
}
