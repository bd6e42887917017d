//! Static tool catalog: parameter shapes, categories, and validation.
//!
//! The [`SchemaRegistry`] is built once at startup and never mutated. Every
//! inbound call is validated against its [`ToolSpec`] before any repository
//! access happens, so a malformed call can never leave partial side effects.
//! The registry also exports the JSON function-calling catalog consumed by
//! the model client.

use serde_json::{Map, Value, json};

use crate::entity::{EntityKind, parse_when};
use crate::error::SchemaError;

// ─────────────────────────────────────────────────────────────────────────
// Parameter shapes
// ─────────────────────────────────────────────────────────────────────────

/// JSON primitive a parameter value must carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    pub fn as_label(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }

    fn matches(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }
}

/// Name of a JSON value's type, for error messages.
fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Extra syntax check applied after the type check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueCheck {
    /// String must not be blank.
    NonEmpty,
    /// String must parse as RFC 3339 or a bare `YYYY-MM-DD` date.
    When,
    /// Array elements must all be known entity-kind labels.
    KindList,
    /// Array elements must all be non-blank strings.
    StringList,
}

/// Which entity kind an identifier parameter points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefTarget {
    /// The kind is fixed by the tool itself.
    Fixed(EntityKind),
    /// The kind is named by a sibling parameter (e.g. `entityType`).
    FromParam(String),
}

/// Marks a parameter as an entity identifier the dispatcher must resolve
/// before execution begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefSpec {
    pub target: RefTarget,
    /// When the parameter is absent, resolve from the conversation's last
    /// mention of the target kind instead of skipping resolution. Used for
    /// subject positions ("update it"), never for optional associations.
    pub context_fallback: bool,
}

/// Declared shape of one tool parameter.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: String,
    pub description: String,
    pub param_type: ParamType,
    pub required: bool,
    pub enum_values: Option<Vec<&'static str>>,
    pub check: Option<ValueCheck>,
    pub resolves: Option<RefSpec>,
}

impl ParamSpec {
    pub fn required(name: impl Into<String>, ty: ParamType, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            param_type: ty,
            required: true,
            enum_values: None,
            check: None,
            resolves: None,
        }
    }

    pub fn optional(name: impl Into<String>, ty: ParamType, description: impl Into<String>) -> Self {
        Self {
            required: false,
            ..Self::required(name, ty, description)
        }
    }

    /// Restrict to a closed value set (compared case-insensitively).
    pub fn one_of(mut self, values: &'static [&'static str]) -> Self {
        self.enum_values = Some(values.to_vec());
        self
    }

    pub fn with_check(mut self, check: ValueCheck) -> Self {
        self.check = Some(check);
        self
    }

    /// Identifier of an associated record; resolved when present.
    pub fn resolving(mut self, target: RefTarget) -> Self {
        self.resolves = Some(RefSpec {
            target,
            context_fallback: false,
        });
        self
    }

    /// Identifier of the record the tool acts on; absent means "the one we
    /// were just talking about".
    pub fn subject(mut self, target: RefTarget) -> Self {
        self.resolves = Some(RefSpec {
            target,
            context_fallback: true,
        });
        self
    }

    /// JSON-schema-like property fragment for the catalog export.
    fn to_property(&self) -> Value {
        let mut prop = Map::new();
        prop.insert("type".into(), json!(self.param_type.as_label()));
        prop.insert("description".into(), json!(self.description));
        if let Some(values) = &self.enum_values {
            prop.insert("enum".into(), json!(values));
        }
        if self.param_type == ParamType::Array {
            prop.insert("items".into(), json!({"type": "string"}));
        }
        Value::Object(prop)
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Tool specs
// ─────────────────────────────────────────────────────────────────────────

/// Behavioral class of a tool; drives dispatcher policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolCategory {
    /// Structured filtered retrieval, no text matching.
    Listing,
    /// Free-text substring retrieval.
    Search,
    Create,
    Mutate,
    /// Removes data. Always surfaces reversibility in its payload.
    Destructive,
}

impl ToolCategory {
    pub fn as_label(&self) -> &'static str {
        match self {
            Self::Listing => "listing",
            Self::Search => "search",
            Self::Create => "create",
            Self::Mutate => "mutate",
            Self::Destructive => "destructive",
        }
    }

    /// Whether the engine demands an explicit confirmation marker in the
    /// result payload (enforced here, not by prompt-text convention).
    pub fn requires_confirmation(&self) -> bool {
        matches!(self, Self::Destructive)
    }

    /// Read-only categories are safe to retry once on transport failure.
    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::Listing | Self::Search)
    }
}

impl std::fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Complete declaration of one callable tool.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub category: ToolCategory,
    pub params: Vec<ParamSpec>,
}

impl ToolSpec {
    pub fn new(
        name: impl Into<String>,
        category: ToolCategory,
        description: impl Into<String>,
        params: Vec<ParamSpec>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            category,
            params,
        }
    }

    /// Check `params` against this spec.
    ///
    /// `null` counts as absent, for both required and optional parameters.
    /// Unknown extra parameters are ignored; the model ecosystem adds fields
    /// freely and strictness there only manufactures failures.
    pub fn validate(&self, params: &Map<String, Value>) -> Result<(), SchemaError> {
        for spec in &self.params {
            let value = match params.get(&spec.name) {
                None | Some(Value::Null) => {
                    if spec.required {
                        return Err(SchemaError::MissingParameter {
                            tool: self.name.clone(),
                            param: spec.name.clone(),
                        });
                    }
                    continue;
                }
                Some(v) => v,
            };

            if !spec.param_type.matches(value) {
                return Err(SchemaError::WrongType {
                    tool: self.name.clone(),
                    param: spec.name.clone(),
                    expected: spec.param_type.as_label(),
                    actual: json_type_name(value),
                });
            }

            if let (Some(allowed), Some(raw)) = (&spec.enum_values, value.as_str()) {
                if !allowed.iter().any(|a| a.eq_ignore_ascii_case(raw)) {
                    return Err(SchemaError::InvalidEnumValue {
                        tool: self.name.clone(),
                        param: spec.name.clone(),
                        value: raw.to_string(),
                        allowed: allowed.join(", "),
                    });
                }
            }

            if let Some(check) = spec.check {
                self.apply_check(spec, check, value)?;
            }
        }
        Ok(())
    }

    fn apply_check(
        &self,
        spec: &ParamSpec,
        check: ValueCheck,
        value: &Value,
    ) -> Result<(), SchemaError> {
        let invalid = |message: String| SchemaError::InvalidValue {
            tool: self.name.clone(),
            param: spec.name.clone(),
            message,
        };
        match check {
            ValueCheck::NonEmpty => {
                if value.as_str().is_some_and(|s| s.trim().is_empty()) {
                    return Err(invalid("must not be empty".into()));
                }
            }
            ValueCheck::When => {
                if let Some(raw) = value.as_str() {
                    if parse_when(raw).is_none() {
                        return Err(invalid(format!(
                            "`{raw}` is not an RFC 3339 timestamp or YYYY-MM-DD date"
                        )));
                    }
                }
            }
            ValueCheck::KindList => {
                for element in value.as_array().into_iter().flatten() {
                    let Some(label) = element.as_str() else {
                        return Err(invalid("elements must be strings".into()));
                    };
                    if EntityKind::from_label(label).is_none() {
                        return Err(invalid(format!(
                            "`{label}` is not one of task, event, note, project"
                        )));
                    }
                }
            }
            ValueCheck::StringList => {
                for element in value.as_array().into_iter().flatten() {
                    if !element.as_str().is_some_and(|s| !s.trim().is_empty()) {
                        return Err(invalid("elements must be non-empty strings".into()));
                    }
                }
            }
        }
        Ok(())
    }

    /// Parameters the dispatcher must resolve into entity references.
    pub fn ref_params(&self) -> impl Iterator<Item = &ParamSpec> {
        self.params.iter().filter(|p| p.resolves.is_some())
    }

    /// `{name, description, parameters}` in the JSON-schema-like shape the
    /// model client expects.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for param in &self.params {
            properties.insert(param.name.clone(), param.to_property());
            if param.required {
                required.push(param.name.clone());
            }
        }
        json!({
            "name": self.name,
            "description": self.description,
            "parameters": {
                "type": "object",
                "properties": properties,
                "required": required,
            },
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────────────────────────────────

const PRIORITIES: &[&str] = &["low", "medium", "high", "urgent"];
const STATUSES: &[&str] = &["todo", "in_progress", "done"];
const KINDS: &[&str] = &["task", "event", "note", "project"];
const SORT_FIELDS: &[&str] = &["updatedAt", "createdAt", "title", "dueDate"];
const SORT_ORDERS: &[&str] = &["asc", "desc"];
const METRICS: &[&str] = &[
    "overdue_tasks",
    "tasks_due_today",
    "tasks_completed_today",
    "tasks_by_priority",
    "tasks_by_status",
    "upcoming_events",
    "entity_counts",
];

/// The fixed catalog of callable tools.
///
/// Built once at process start; `lookup` is the only read path.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    tools: Vec<ToolSpec>,
}

impl SchemaRegistry {
    /// The nine built-in tools.
    pub fn builtin() -> Self {
        let project_ref = || {
            ParamSpec::optional(
                "project",
                ParamType::String,
                "Project this belongs to, by name or id",
            )
            .resolving(RefTarget::Fixed(EntityKind::Project))
        };

        let tools = vec![
            ToolSpec::new(
                "create_task",
                ToolCategory::Create,
                "Create a new task for the user",
                vec![
                    ParamSpec::required("title", ParamType::String, "Short title of the task")
                        .with_check(ValueCheck::NonEmpty),
                    ParamSpec::optional("description", ParamType::String, "Longer free-form detail"),
                    ParamSpec::optional("priority", ParamType::String, "Task priority")
                        .one_of(PRIORITIES),
                    ParamSpec::optional("status", ParamType::String, "Initial workflow status")
                        .one_of(STATUSES),
                    ParamSpec::optional(
                        "dueDate",
                        ParamType::String,
                        "Due date, RFC 3339 or YYYY-MM-DD",
                    )
                    .with_check(ValueCheck::When),
                    project_ref(),
                ],
            ),
            ToolSpec::new(
                "create_event",
                ToolCategory::Create,
                "Create a calendar event",
                vec![
                    ParamSpec::required("title", ParamType::String, "Short title of the event")
                        .with_check(ValueCheck::NonEmpty),
                    ParamSpec::required(
                        "startTime",
                        ParamType::String,
                        "Start, RFC 3339 or YYYY-MM-DD",
                    )
                    .with_check(ValueCheck::When),
                    ParamSpec::optional("endTime", ParamType::String, "End, RFC 3339 or YYYY-MM-DD")
                        .with_check(ValueCheck::When),
                    ParamSpec::optional("location", ParamType::String, "Where the event happens"),
                    ParamSpec::optional("description", ParamType::String, "Longer free-form detail"),
                    project_ref(),
                ],
            ),
            ToolSpec::new(
                "create_note",
                ToolCategory::Create,
                "Capture a note",
                vec![
                    ParamSpec::required("title", ParamType::String, "Short title of the note")
                        .with_check(ValueCheck::NonEmpty),
                    ParamSpec::optional("content", ParamType::String, "Body text of the note"),
                    project_ref(),
                ],
            ),
            ToolSpec::new(
                "create_project",
                ToolCategory::Create,
                "Create a project to group related work",
                vec![
                    ParamSpec::required("name", ParamType::String, "Name of the project")
                        .with_check(ValueCheck::NonEmpty),
                    ParamSpec::optional("description", ParamType::String, "What the project is for"),
                ],
            ),
            ToolSpec::new(
                "query_entities",
                ToolCategory::Listing,
                "List entities with structured filters; use for 'all', 'latest', or filtered views without a keyword",
                vec![
                    ParamSpec::optional(
                        "entityKinds",
                        ParamType::Array,
                        "Kinds to include (task, event, note, project); all four when omitted",
                    )
                    .with_check(ValueCheck::KindList),
                    ParamSpec::optional(
                        "filters",
                        ParamType::Object,
                        "Equality filters: status, priority, project, dueBefore, dueAfter",
                    ),
                    ParamSpec::optional("sortBy", ParamType::String, "Sort field")
                        .one_of(SORT_FIELDS),
                    ParamSpec::optional("sortOrder", ParamType::String, "Sort direction")
                        .one_of(SORT_ORDERS),
                    ParamSpec::optional(
                        "limit",
                        ParamType::Number,
                        "Max results per kind (default 10, max 50)",
                    ),
                ],
            ),
            ToolSpec::new(
                "search_entities",
                ToolCategory::Search,
                "Find entities whose text contains a keyword; use only when the user supplied one",
                vec![
                    ParamSpec::required("queryText", ParamType::String, "Keyword to look for")
                        .with_check(ValueCheck::NonEmpty),
                    ParamSpec::optional(
                        "entityKinds",
                        ParamType::Array,
                        "Kinds to include; all four when omitted",
                    )
                    .with_check(ValueCheck::KindList),
                    ParamSpec::optional(
                        "filters",
                        ParamType::Object,
                        "Equality filters: status, priority, project, dueBefore, dueAfter",
                    ),
                    ParamSpec::optional(
                        "limit",
                        ParamType::Number,
                        "Max results per kind (default 10, max 50)",
                    ),
                ],
            ),
            ToolSpec::new(
                "update_task",
                ToolCategory::Mutate,
                "Change fields of an existing task, or of several at once",
                vec![
                    ParamSpec::optional(
                        "id",
                        ParamType::String,
                        "Task to change: id, title, or a pronoun for the last task discussed; may be omitted to mean the latter",
                    )
                    .subject(RefTarget::Fixed(EntityKind::Task)),
                    ParamSpec::optional(
                        "ids",
                        ParamType::Array,
                        "Several tasks to change together (ids or titles)",
                    )
                    .with_check(ValueCheck::StringList)
                    .resolving(RefTarget::Fixed(EntityKind::Task)),
                    ParamSpec::optional("title", ParamType::String, "New title")
                        .with_check(ValueCheck::NonEmpty),
                    ParamSpec::optional("description", ParamType::String, "New description"),
                    ParamSpec::optional("status", ParamType::String, "New workflow status")
                        .one_of(STATUSES),
                    ParamSpec::optional("priority", ParamType::String, "New priority")
                        .one_of(PRIORITIES),
                    ParamSpec::optional(
                        "dueDate",
                        ParamType::String,
                        "New due date, RFC 3339 or YYYY-MM-DD",
                    )
                    .with_check(ValueCheck::When),
                    project_ref(),
                ],
            ),
            ToolSpec::new(
                "delete_entity",
                ToolCategory::Destructive,
                "Move an entity to trash (reversible)",
                vec![
                    ParamSpec::required("entityType", ParamType::String, "Kind of the entity")
                        .one_of(KINDS),
                    ParamSpec::optional(
                        "id",
                        ParamType::String,
                        "Entity to delete: id, title, or a pronoun for the last one discussed",
                    )
                    .subject(RefTarget::FromParam("entityType".into())),
                    ParamSpec::optional(
                        "confirmed",
                        ParamType::Boolean,
                        "Set when the user has explicitly confirmed the deletion",
                    ),
                ],
            ),
            ToolSpec::new(
                "get_statistics",
                ToolCategory::Listing,
                "Aggregate numbers over the user's data",
                vec![
                    ParamSpec::required("metric", ParamType::String, "Which aggregate to compute")
                        .one_of(METRICS),
                    project_ref(),
                ],
            ),
        ];

        Self { tools }
    }

    /// Find a tool by name.
    pub fn lookup(&self, name: &str) -> Result<&ToolSpec, SchemaError> {
        self.tools
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| SchemaError::UnknownTool {
                name: name.to_string(),
            })
    }

    /// Registered tool names, in catalog order.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    /// The function-calling catalog handed to the model client.
    pub fn catalog_json(&self) -> Value {
        Value::Array(self.tools.iter().map(ToolSpec::to_json_schema).collect())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn builtin_registers_all_nine_tools() {
        let registry = SchemaRegistry::builtin();
        assert_eq!(registry.len(), 9);
        for name in [
            "create_task",
            "create_event",
            "create_note",
            "create_project",
            "query_entities",
            "search_entities",
            "update_task",
            "delete_entity",
            "get_statistics",
        ] {
            assert!(registry.lookup(name).is_ok(), "missing {name}");
        }
    }

    #[test]
    fn lookup_unknown_tool_fails() {
        let registry = SchemaRegistry::builtin();
        let err = registry.lookup("create_widget").unwrap_err();
        assert!(matches!(err, SchemaError::UnknownTool { .. }));
    }

    #[test]
    fn missing_required_parameter_is_caught() {
        let registry = SchemaRegistry::builtin();
        let spec = registry.lookup("create_task").unwrap();
        let err = spec.validate(&params(json!({}))).unwrap_err();
        assert!(matches!(
            err,
            SchemaError::MissingParameter { ref param, .. } if param == "title"
        ));
    }

    #[test]
    fn null_counts_as_absent() {
        let registry = SchemaRegistry::builtin();
        let spec = registry.lookup("create_task").unwrap();
        let err = spec.validate(&params(json!({"title": null}))).unwrap_err();
        assert!(matches!(err, SchemaError::MissingParameter { .. }));
    }

    #[test]
    fn wrong_json_type_is_caught() {
        let registry = SchemaRegistry::builtin();
        let spec = registry.lookup("create_task").unwrap();
        let err = spec.validate(&params(json!({"title": 42}))).unwrap_err();
        assert!(matches!(
            err,
            SchemaError::WrongType { expected: "string", actual: "number", .. }
        ));
    }

    #[test]
    fn enum_values_are_case_insensitive() {
        let registry = SchemaRegistry::builtin();
        let spec = registry.lookup("create_task").unwrap();
        spec.validate(&params(json!({"title": "x", "priority": "High"})))
            .unwrap();
        let err = spec
            .validate(&params(json!({"title": "x", "priority": "sky-high"})))
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidEnumValue { .. }));
    }

    #[test]
    fn unknown_parameters_are_ignored() {
        let registry = SchemaRegistry::builtin();
        let spec = registry.lookup("create_note").unwrap();
        spec.validate(&params(json!({"title": "x", "color": "blue"})))
            .unwrap();
    }

    #[test]
    fn date_syntax_is_checked_before_dispatch() {
        let registry = SchemaRegistry::builtin();
        let spec = registry.lookup("create_task").unwrap();
        spec.validate(&params(json!({"title": "x", "dueDate": "2026-09-01"})))
            .unwrap();
        let err = spec
            .validate(&params(json!({"title": "x", "dueDate": "next tuesday"})))
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidValue { .. }));
    }

    #[test]
    fn entity_kind_lists_are_checked() {
        let registry = SchemaRegistry::builtin();
        let spec = registry.lookup("query_entities").unwrap();
        spec.validate(&params(json!({"entityKinds": ["task", "Notes"]})))
            .unwrap();
        let err = spec
            .validate(&params(json!({"entityKinds": ["task", "reminder"]})))
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidValue { .. }));
    }

    #[test]
    fn empty_title_is_rejected() {
        let registry = SchemaRegistry::builtin();
        let spec = registry.lookup("create_task").unwrap();
        let err = spec.validate(&params(json!({"title": "   "}))).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidValue { .. }));
    }

    #[test]
    fn only_delete_requires_confirmation() {
        let registry = SchemaRegistry::builtin();
        for name in registry.names() {
            let spec = registry.lookup(name).unwrap();
            assert_eq!(
                spec.category.requires_confirmation(),
                name == "delete_entity",
                "{name}"
            );
        }
    }

    #[test]
    fn subject_params_fall_back_to_context() {
        let registry = SchemaRegistry::builtin();
        let update = registry.lookup("update_task").unwrap();
        let id = update.params.iter().find(|p| p.name == "id").unwrap();
        assert!(id.resolves.as_ref().unwrap().context_fallback);
        let ids = update.params.iter().find(|p| p.name == "ids").unwrap();
        assert!(!ids.resolves.as_ref().unwrap().context_fallback);
    }

    #[test]
    fn catalog_export_shape() {
        let registry = SchemaRegistry::builtin();
        let catalog = registry.catalog_json();
        let tools = catalog.as_array().unwrap();
        assert_eq!(tools.len(), 9);
        let create_task = &tools[0];
        assert_eq!(create_task["name"], "create_task");
        assert_eq!(create_task["parameters"]["type"], "object");
        assert_eq!(
            create_task["parameters"]["required"],
            json!(["title"]),
        );
        assert_eq!(
            create_task["parameters"]["properties"]["priority"]["enum"],
            json!(["low", "medium", "high", "urgent"]),
        );
    }
}
