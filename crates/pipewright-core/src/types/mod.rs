use pipewright_kit::types::types::Value;
use strum::Display;

/// Declared type of an input value. Closed set: adding a member is a
/// compile-time checked change everywhere the orchestrator matches on it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum DataType {
    #[default]
    String,
    SecureString,
    Int,
    Bool,
    Authorization,
}

impl DataType {
    pub fn is_secure(&self) -> bool {
        matches!(self, DataType::SecureString | DataType::Authorization)
    }
}

/// Presentation hint for an input. The engine never paints widgets; it only
/// cares whether a mode prompts a human and whether it is a choice control.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum InputMode {
    /// Computed silently, never surfaced to the operator.
    #[default]
    Hidden,
    TextBox,
    PasswordBox,
    SingleSelect,
    MultiCheckbox,
    RadioButtons,
    AzureSubscriptionPicker,
    TenantPicker,
    AadTokenPicker,
}

impl InputMode {
    pub fn requires_prompt(&self) -> bool {
        !matches!(self, InputMode::Hidden)
    }

    /// Choice controls expose a candidate list and the operator picks one;
    /// single-answer controls take the scalar (or only item) directly.
    pub fn is_choice(&self) -> bool {
        matches!(
            self,
            InputMode::SingleSelect
                | InputMode::MultiCheckbox
                | InputMode::RadioButtons
                | InputMode::AzureSubscriptionPicker
                | InputMode::TenantPicker
        )
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PossibleValue {
    pub display_value: String,
    pub value: Value,
}

/// Local constraints checked once a value is obtained. Failures are reported
/// to the host, never silently corrected.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StaticValidation {
    #[serde(default)]
    pub min_length: Option<usize>,
    #[serde(default)]
    pub max_length: Option<usize>,
    /// Anchored automatically: the whole value must match.
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Remote boolean check: the named data source is evaluated with the
/// candidate value bound under `inputs.<id>`; a scalar `true` passes.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DynamicValidation {
    pub data_source_id: String,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Immutable definition of one configurable pipeline parameter, loaded from
/// the pipeline template manifest.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InputDescriptor {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub data_type: DataType,
    #[serde(default)]
    pub input_mode: InputMode,
    #[serde(default)]
    pub default_value_expression: Option<String>,
    /// Reference into the data source expression grammar: a source id, or
    /// `left INTERSECT right`. Mutually exclusive with `possibleValues`.
    #[serde(default)]
    pub data_source_id: Option<String>,
    #[serde(default)]
    pub possible_values: Vec<PossibleValue>,
    #[serde(default)]
    pub visible_rule: Option<String>,
    #[serde(default)]
    pub is_required: bool,
    /// UI layout grouping, passed through untouched.
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub static_validation: Option<StaticValidation>,
    #[serde(default)]
    pub dynamic_validations: Vec<DynamicValidation>,
}

impl InputDescriptor {
    pub fn new(id: &str) -> InputDescriptor {
        InputDescriptor {
            id: id.to_string(),
            name: None,
            data_type: DataType::default(),
            input_mode: InputMode::default(),
            default_value_expression: None,
            data_source_id: None,
            possible_values: vec![],
            visible_rule: None,
            is_required: false,
            group_id: None,
            static_validation: None,
            dynamic_validations: vec![],
        }
    }

    pub fn with_mode(mut self, mode: InputMode) -> Self {
        self.input_mode = mode;
        self
    }

    pub fn with_default(mut self, expression: &str) -> Self {
        self.default_value_expression = Some(expression.to_string());
        self
    }

    pub fn with_data_source(mut self, expression: &str) -> Self {
        self.data_source_id = Some(expression.to_string());
        self
    }

    pub fn with_visible_rule(mut self, rule: &str) -> Self {
        self.visible_rule = Some(rule.to_string());
        self
    }
}

/// Remote, templated HTTP lookup used to populate an input's value or its
/// selectable choices.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceDefinition {
    pub id: String,
    pub endpoint_url_template: String,
    /// HTTP method name; GET when absent.
    #[serde(default)]
    pub http_method: Option<String>,
    #[serde(default)]
    pub request_body_template: Option<String>,
    /// jq-style selector applied to the raw response.
    #[serde(default)]
    pub result_selector: Option<String>,
    /// Per-item projection template; must render to a JSON object with
    /// `DisplayValue`, `Value` and optional `Group` fields.
    #[serde(default)]
    pub result_template: Option<String>,
}

impl DataSourceDefinition {
    pub fn new(id: &str, endpoint_url_template: &str) -> DataSourceDefinition {
        DataSourceDefinition {
            id: id.to_string(),
            endpoint_url_template: endpoint_url_template.to_string(),
            http_method: None,
            request_body_template: None,
            result_selector: None,
            result_template: None,
        }
    }

    pub fn with_selector(mut self, selector: &str) -> Self {
        self.result_selector = Some(selector.to_string());
        self
    }

    pub fn with_result_template(mut self, template: &str) -> Self {
        self.result_template = Some(template.to_string());
        self
    }
}

/// Per-input state machine: `Unresolved -> VisibilityKnown -> ValueKnown`,
/// or `Failed`. Records are created fresh for each resolution pass.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputState {
    #[default]
    Unresolved,
    VisibilityKnown,
    ValueKnown,
    /// Reserved for hosts that keep per-input records after a recoverable
    /// validation failure. The engine aborts the whole pass on any error
    /// and never stores this state itself.
    Failed,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ResolvedInput {
    pub visible: bool,
    pub value: Option<Value>,
    pub state: InputState,
}

impl ResolvedInput {
    pub fn is_value_known(&self) -> bool {
        matches!(self.state, InputState::ValueKnown)
    }
}
