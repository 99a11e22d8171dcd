//! Dynamic Form Engine.
//!
//! Builds editable rows for a provider purely from its `ProviderTypeSchema`
//! and turns committed input back into typed JSON values. There is no
//! per-type code here; kinds alone decide behaviour.

use serde_json::Value;

use crate::catalog::{normalize_tags, Provider};
use crate::schema::{FieldKind, FieldSchema, ProviderTypeSchema, SchemaSet};

const SECRET_MASK: &str = "••••••••";
const SECRET_REVEAL_CHARS: usize = 4;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextInput {
    pub value: String,
    pub cursor: usize,
}

impl TextInput {
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        let cursor = value.chars().count();
        Self { value, cursor }
    }

    pub fn set(&mut self, value: impl Into<String>) {
        self.value = value.into();
        self.cursor = self.value.chars().count();
    }

    pub fn is_blank(&self) -> bool {
        self.value.trim().is_empty()
    }

    fn byte_index(line: &str, col: usize) -> usize {
        line.char_indices()
            .nth(col)
            .map(|(i, _)| i)
            .unwrap_or(line.len())
    }

    pub fn move_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn move_right(&mut self) {
        let len = self.value.chars().count();
        self.cursor = (self.cursor + 1).min(len);
    }

    pub fn move_home(&mut self) {
        self.cursor = 0;
    }

    pub fn move_end(&mut self) {
        self.cursor = self.value.chars().count();
    }

    pub fn insert_char(&mut self, c: char) -> bool {
        if c.is_control() {
            return false;
        }
        let idx = Self::byte_index(&self.value, self.cursor);
        self.value.insert(idx, c);
        self.cursor += 1;
        true
    }

    pub fn backspace(&mut self) -> bool {
        if self.cursor == 0 || self.value.is_empty() {
            return false;
        }
        let start = Self::byte_index(&self.value, self.cursor.saturating_sub(1));
        let end = Self::byte_index(&self.value, self.cursor);
        self.value.replace_range(start..end, "");
        self.cursor = self.cursor.saturating_sub(1);
        true
    }

    pub fn delete(&mut self) -> bool {
        let len = self.value.chars().count();
        if self.value.is_empty() || self.cursor >= len {
            return false;
        }
        let start = Self::byte_index(&self.value, self.cursor);
        let end = Self::byte_index(&self.value, self.cursor + 1);
        self.value.replace_range(start..end, "");
        true
    }
}

/// Masks a secret. With `reveal`, only the trailing four characters show,
/// and only when the secret is longer than that.
pub fn mask_secret(value: &str, reveal: bool) -> String {
    if value.is_empty() {
        return String::new();
    }
    let count = value.chars().count();
    if !reveal || count <= SECRET_REVEAL_CHARS {
        return SECRET_MASK.to_string();
    }
    let tail: String = value.chars().skip(count - SECRET_REVEAL_CHARS).collect();
    format!("{SECRET_MASK}{tail}")
}

/// Rendered value of one field. Secrets never come back in clear.
pub fn display_value(field: &FieldSchema, provider: &Provider, reveal: bool) -> String {
    let Some(raw) = provider.config_display(&field.name) else {
        return String::new();
    };
    if field.kind == FieldKind::Secret {
        mask_secret(&raw, reveal)
    } else {
        raw
    }
}

/// Schema used to edit `provider`: the authority's entry for its type, or a
/// plain-text stand-in built from whatever keys the provider already has.
pub fn schema_for(provider: &Provider, schemas: Option<&SchemaSet>) -> ProviderTypeSchema {
    schemas
        .and_then(|s| s.get(&provider.provider_type))
        .cloned()
        .unwrap_or_else(|| {
            ProviderTypeSchema::from_config_keys(&provider.provider_type, provider.config.keys())
        })
}

#[derive(Debug, Clone, PartialEq)]
pub enum RowTarget {
    Name,
    Field(FieldSchema),
    Tags,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormRow {
    pub target: RowTarget,
    pub label: String,
    pub value: String,
    pub missing_required: bool,
    pub help: Option<String>,
}

impl FormRow {
    pub fn kind_label(&self) -> &'static str {
        match &self.target {
            RowTarget::Name => "name",
            RowTarget::Tags => "tags",
            RowTarget::Field(field) => field.kind.as_str(),
        }
    }
}

/// Rows in display order: name, the schema's fields as declared, tags.
pub fn form_rows(provider: &Provider, schema: &ProviderTypeSchema, reveal: bool) -> Vec<FormRow> {
    let mut rows = Vec::with_capacity(schema.fields.len() + 2);
    rows.push(FormRow {
        target: RowTarget::Name,
        label: "name".to_string(),
        value: provider.name.clone(),
        missing_required: false,
        help: None,
    });
    for field in &schema.fields {
        let value = display_value(field, provider, reveal);
        rows.push(FormRow {
            label: field.name.clone(),
            missing_required: field.required && value.is_empty(),
            help: field.help.clone(),
            value,
            target: RowTarget::Field(field.clone()),
        });
    }
    rows.push(FormRow {
        target: RowTarget::Tags,
        label: "tags".to_string(),
        value: provider.tags.join(", "),
        missing_required: false,
        help: None,
    });
    rows
}

/// Converts committed text for `field` into a JSON value.
///
/// A value that does not fit the declared kind is kept as a string and a
/// warning is returned alongside; conversion never refuses input.
pub fn convert_input(field: &FieldSchema, raw: &str) -> (Value, Option<String>) {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return (Value::String(String::new()), None);
    }
    let mismatch = |expected: &str| {
        (
            Value::String(trimmed.to_string()),
            Some(format!("{} should be {expected}; kept as text", field.name)),
        )
    };
    match field.kind {
        FieldKind::Integer => match trimmed.parse::<i64>() {
            Ok(n) => (Value::from(n), None),
            Err(_) => mismatch("an integer"),
        },
        FieldKind::Float => match trimmed.parse::<f64>() {
            Ok(n) => serde_json::Number::from_f64(n)
                .map(|num| (Value::Number(num), None))
                .unwrap_or_else(|| mismatch("a finite number")),
            Err(_) => mismatch("a number"),
        },
        FieldKind::Boolean => match trimmed.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => (Value::Bool(true), None),
            "false" | "no" | "off" | "0" => (Value::Bool(false), None),
            _ => mismatch("true or false"),
        },
        FieldKind::Enum => {
            if field.options.iter().any(|o| o == trimmed) {
                (Value::String(trimmed.to_string()), None)
            } else {
                mismatch(&format!("one of {}", field.options.join(", ")))
            }
        }
        FieldKind::String => (Value::String(trimmed.to_string()), None),
        // Secrets keep surrounding whitespace out but are otherwise verbatim.
        FieldKind::Secret => (Value::String(trimmed.to_string()), None),
    }
}

/// In-place text edit of one row, holding a buffered draft.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldEdit {
    pub provider_id: String,
    pub row: usize,
    pub target: RowTarget,
    pub draft: TextInput,
    pub prior: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Commit {
    Rename { id: String, name: String },
    Field { id: String, field: String, value: Value, warning: Option<String> },
    Tags { id: String, tags: Vec<String> },
}

impl FieldEdit {
    /// Starts editing `row`, seeding the draft with the unmasked current value.
    pub fn begin(provider: &Provider, row: usize, target: RowTarget) -> Self {
        let prior = match &target {
            RowTarget::Name => provider.name.clone(),
            RowTarget::Field(field) => provider.config_display(&field.name).unwrap_or_default(),
            RowTarget::Tags => provider.tags.join(", "),
        };
        Self {
            provider_id: provider.id.clone(),
            row,
            target,
            draft: TextInput::new(prior.clone()),
            prior,
        }
    }

    pub fn is_secret(&self) -> bool {
        matches!(&self.target, RowTarget::Field(f) if f.kind == FieldKind::Secret)
    }

    pub fn is_changed(&self) -> bool {
        self.draft.value != self.prior
    }

    pub fn commit(&self) -> Commit {
        match &self.target {
            RowTarget::Name => Commit::Rename {
                id: self.provider_id.clone(),
                name: self.draft.value.clone(),
            },
            RowTarget::Field(field) => {
                let (value, warning) = convert_input(field, &self.draft.value);
                Commit::Field {
                    id: self.provider_id.clone(),
                    field: field.name.clone(),
                    value,
                    warning,
                }
            }
            RowTarget::Tags => Commit::Tags {
                id: self.provider_id.clone(),
                tags: parse_tags(&self.draft.value),
            },
        }
    }
}

pub fn parse_tags(raw: &str) -> Vec<String> {
    normalize_tags(raw.split(','))
}

/// Selection overlay state for enum and boolean fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Dropdown {
    pub provider_id: String,
    pub row: usize,
    pub field: FieldSchema,
    pub choices: Vec<String>,
    pub cursor: usize,
}

impl Dropdown {
    pub fn begin(provider: &Provider, row: usize, field: FieldSchema) -> Self {
        let choices = field.choices();
        let current = provider.config_display(&field.name);
        let cursor = current
            .and_then(|cur| choices.iter().position(|c| *c == cur))
            .unwrap_or(0);
        Self {
            provider_id: provider.id.clone(),
            row,
            field,
            choices,
            cursor,
        }
    }

    pub fn move_up(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn move_down(&mut self) {
        if !self.choices.is_empty() {
            self.cursor = (self.cursor + 1).min(self.choices.len() - 1);
        }
    }

    pub fn commit(&self) -> Option<Commit> {
        let choice = self.choices.get(self.cursor)?;
        let (value, warning) = convert_input(&self.field, choice);
        Some(Commit::Field {
            id: self.provider_id.clone(),
            field: self.field.name.clone(),
            value,
            warning,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field(name: &str, kind: FieldKind) -> FieldSchema {
        let mut f = FieldSchema::text(name);
        f.kind = kind;
        f
    }

    fn openai_schema() -> ProviderTypeSchema {
        let mut key = field("api_key", FieldKind::Secret);
        key.required = true;
        let mut mode = field("mode", FieldKind::Enum);
        mode.options = vec!["chat".into(), "responses".into()];
        ProviderTypeSchema {
            type_name: "openai".into(),
            fields: vec![key, field("base_url", FieldKind::String), mode],
        }
    }

    #[test]
    fn text_input_handles_multibyte_editing() {
        let mut input = TextInput::new("héllo");
        input.move_home();
        input.move_right();
        assert!(input.delete());
        assert_eq!(input.value, "hllo");
        input.insert_char('é');
        assert_eq!(input.value, "héllo");
        input.move_end();
        assert!(input.backspace());
        assert_eq!(input.value, "héll");
        assert!(!input.insert_char('\n'));
    }

    #[test]
    fn secrets_are_masked_and_reveal_only_the_tail() {
        assert_eq!(mask_secret("", false), "");
        assert_eq!(mask_secret("sk-abcdef123456", false), SECRET_MASK);
        let revealed = mask_secret("sk-abcdef123456", true);
        assert!(revealed.ends_with("3456"));
        assert!(!revealed.contains("sk-abcdef"));
        // too short to show any tail without exposing all of it
        assert_eq!(mask_secret("abcd", true), SECRET_MASK);
    }

    #[test]
    fn rows_follow_schema_order_between_name_and_tags() {
        let mut provider = Provider::new("p1", "OpenAI", "openai");
        provider.config.insert("api_key".into(), json!("sk-secret-value"));
        provider.tags = vec!["fast".into()];

        let rows = form_rows(&provider, &openai_schema(), false);
        let labels: Vec<&str> = rows.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["name", "api_key", "base_url", "mode", "tags"]);
        assert_eq!(rows[1].value, SECRET_MASK);
        assert!(!rows[1].missing_required);
        assert_eq!(rows[4].value, "fast");
    }

    #[test]
    fn missing_required_field_is_flagged() {
        let provider = Provider::new("p1", "OpenAI", "openai");
        let rows = form_rows(&provider, &openai_schema(), false);
        assert!(rows[1].missing_required);
    }

    #[test]
    fn unknown_type_falls_back_to_config_keys() {
        let mut provider = Provider::new("p1", "X", "future-type");
        provider.config.insert("endpoint".into(), json!("http://x"));
        let schema = schema_for(&provider, None);
        assert_eq!(schema.fields.len(), 1);
        assert_eq!(schema.fields[0].kind, FieldKind::String);
    }

    #[test]
    fn convert_input_types_values_by_kind() {
        assert_eq!(
            convert_input(&field("port", FieldKind::Integer), " 1234 "),
            (json!(1234), None)
        );
        assert_eq!(
            convert_input(&field("temp", FieldKind::Float), "0.5"),
            (json!(0.5), None)
        );
        assert_eq!(
            convert_input(&field("stream", FieldKind::Boolean), "yes"),
            (json!(true), None)
        );
        let (value, warning) = convert_input(&field("port", FieldKind::Integer), "abc");
        assert_eq!(value, json!("abc"));
        assert!(warning.is_some_and(|w| w.contains("integer")));
    }

    #[test]
    fn field_edit_commits_typed_value() {
        let mut provider = Provider::new("p1", "Ollama", "ollama");
        provider.config.insert("port".into(), json!(11434));
        let mut edit = FieldEdit::begin(&provider, 2, RowTarget::Field(field("port", FieldKind::Integer)));
        assert_eq!(edit.prior, "11434");
        edit.draft.set("8080");
        assert!(edit.is_changed());
        assert_eq!(
            edit.commit(),
            Commit::Field {
                id: "p1".into(),
                field: "port".into(),
                value: json!(8080),
                warning: None
            }
        );
    }

    #[test]
    fn tag_edit_parses_comma_list() {
        let mut provider = Provider::new("p1", "A", "local");
        provider.tags = vec!["fast".into()];
        let mut edit = FieldEdit::begin(&provider, 3, RowTarget::Tags);
        assert_eq!(edit.prior, "fast");
        edit.draft.set("fast, coding,,  small ");
        assert_eq!(
            edit.commit(),
            Commit::Tags {
                id: "p1".into(),
                tags: vec!["fast".into(), "coding".into(), "small".into()]
            }
        );
    }

    #[test]
    fn dropdown_starts_on_current_value_and_clamps() {
        let mut provider = Provider::new("p1", "OpenAI", "openai");
        provider.config.insert("mode".into(), json!("responses"));
        let schema = openai_schema();
        let mode = schema.field("mode").cloned().expect("mode field");
        let mut dd = Dropdown::begin(&provider, 3, mode);
        assert_eq!(dd.cursor, 1);
        dd.move_down();
        assert_eq!(dd.cursor, 1);
        dd.move_up();
        dd.move_up();
        assert_eq!(dd.cursor, 0);
        assert!(matches!(
            dd.commit(),
            Some(Commit::Field { value, .. }) if value == json!("chat")
        ));
    }
}
