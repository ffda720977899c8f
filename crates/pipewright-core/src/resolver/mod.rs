//! The resolution orchestrator: owns the per-input state machine, orders
//! inputs topologically over their dependency graph, and drives template
//! rendering, data source evaluation, visibility rules, prompting and
//! validation per input.
//!
//! Failure semantics: a cycle, unknown reference, remote failure or
//! cancellation aborts the whole pass; no partial parameter map is ever
//! returned. Inputs are frequently interdependent (a resource id feeding a
//! connection name), so partial success is not a safe state.

mod graph;

pub use graph::InputGraphContext;

use pipewright_kit::cancellation::CancellationToken;
use pipewright_kit::indexmap::IndexMap;
use pipewright_kit::transport::DataSourceTransport;
use pipewright_kit::types::frontend::{
    InputPrompter, PickOptionRequest, PromptRequest, PromptRequestType, ProvideValueRequest,
    ReviewValueRequest, SelectableItem,
};
use pipewright_kit::types::stores::ValueStore;
use pipewright_kit::types::types::Value;
use pipewright_kit::uuid::Uuid;
use regex::Regex;

use crate::datasource::expression::{self as ds_expression, DataSourceExpression};
use crate::datasource::DataSourceEvaluator;
use crate::errors::{ReferenceKind, ResolutionError};
use crate::templates::{self, RenderContext};
use crate::types::{
    DataSourceDefinition, InputDescriptor, InputState, ResolvedInput, StaticValidation,
};
use crate::visibility::{self, PredicateOperand, VisibilityRule};

/// Host-supplied ambient state for one resolution pass. Explicit by design:
/// there is no process-global client or credential state.
#[derive(Clone, Debug, Default)]
pub struct ResolutionContext {
    pub system: ValueStore,
    pub client: ValueStore,
    pub variables: ValueStore,
    pub assets: ValueStore,
    pub secrets: ValueStore,
    /// Values already known before the pass (e.g. from repository analysis).
    pub presets: IndexMap<String, Value>,
    pub cancellation: CancellationToken,
}

impl ResolutionContext {
    pub fn new() -> ResolutionContext {
        ResolutionContext {
            system: ValueStore::new("system"),
            client: ValueStore::new("client"),
            variables: ValueStore::new("variables"),
            assets: ValueStore::new("assets"),
            secrets: ValueStore::new("secrets"),
            presets: IndexMap::new(),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_system(mut self, system: ValueStore) -> Self {
        self.system = system;
        self
    }

    pub fn with_client(mut self, client: ValueStore) -> Self {
        self.client = client;
        self
    }

    pub fn with_preset(mut self, input_id: &str, value: Value) -> Self {
        self.presets.insert(input_id.to_string(), value);
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }
}

/// Where an input's final value came from; surfaced in the pass report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueOrigin {
    Preset,
    DataSource,
    DefaultExpression,
    Prompt,
    Hidden,
    Absent,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InputOutcome {
    pub state: InputState,
    pub visible: bool,
    pub origin: ValueOrigin,
}

/// Per-pass accounting for host logging: final state per input, plus how
/// much remote traffic the pass generated vs served from cache.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResolutionReport {
    pub pass_id: Uuid,
    pub outcomes: IndexMap<String, InputOutcome>,
    pub remote_calls: usize,
    pub cache_hits: usize,
}

#[derive(Clone, Debug)]
pub struct ResolutionOutcome {
    /// Final parameter map, declaration order, invisible inputs omitted.
    pub parameters: IndexMap<String, Value>,
    pub report: ResolutionReport,
}

/// Pre-pass compilation of one descriptor: parsed rule and data source
/// expression, plus the flattened set of input ids it depends on.
struct InputPlan {
    rule: Option<VisibilityRule>,
    data_source: Option<DataSourceExpression>,
    dependencies: Vec<String>,
}

pub struct InputResolver<'a> {
    descriptors: IndexMap<String, InputDescriptor>,
    sources: IndexMap<String, DataSourceDefinition>,
    transport: &'a dyn DataSourceTransport,
    prompter: &'a dyn InputPrompter,
}

impl<'a> InputResolver<'a> {
    pub fn new(
        descriptors: Vec<InputDescriptor>,
        sources: Vec<DataSourceDefinition>,
        transport: &'a dyn DataSourceTransport,
        prompter: &'a dyn InputPrompter,
    ) -> Result<InputResolver<'a>, ResolutionError> {
        let mut descriptor_map = IndexMap::new();
        for descriptor in descriptors {
            if descriptor_map.insert(descriptor.id.clone(), descriptor.clone()).is_some() {
                return Err(ResolutionError::DuplicateId {
                    kind: ReferenceKind::Input,
                    id: descriptor.id,
                });
            }
        }
        let mut source_map = IndexMap::new();
        for source in sources {
            if source_map.insert(source.id.clone(), source.clone()).is_some() {
                return Err(ResolutionError::DuplicateId {
                    kind: ReferenceKind::DataSource,
                    id: source.id,
                });
            }
        }
        Ok(InputResolver {
            descriptors: descriptor_map,
            sources: source_map,
            transport,
            prompter,
        })
    }

    /// Resolves every input to its final value, in dependency order.
    pub async fn resolve_all(
        &self,
        ctx: &ResolutionContext,
    ) -> Result<ResolutionOutcome, ResolutionError> {
        // All configuration errors (parse failures, unknown references,
        // cycles) surface here, before any remote call is made.
        let plans = self.build_plans()?;
        let order = self.sorted_order(&plans)?;

        let mut records: IndexMap<String, ResolvedInput> = self
            .descriptors
            .keys()
            .map(|id| (id.clone(), ResolvedInput::default()))
            .collect();
        let mut outcomes: IndexMap<String, InputOutcome> = IndexMap::new();
        let mut render_ctx = RenderContext::new()
            .with_system(ctx.system.clone())
            .with_client(ctx.client.clone())
            .with_variables(ctx.variables.clone())
            .with_assets(ctx.assets.clone())
            .with_secrets(ctx.secrets.clone());
        let mut evaluator = DataSourceEvaluator::new(&self.sources, self.transport);

        for input_id in order.iter() {
            if ctx.cancellation.is_cancelled() {
                return Err(ResolutionError::Cancelled);
            }
            let descriptor = self
                .descriptors
                .get(input_id)
                .ok_or_else(|| internal_missing_descriptor(input_id))?;
            let plan = plans.get(input_id).ok_or_else(|| internal_missing_descriptor(input_id))?;

            let visible = match &plan.rule {
                Some(rule) => rule.evaluate(|id| operand_for(&records, id)),
                None => true,
            };
            let mut record = ResolvedInput {
                visible,
                value: None,
                state: InputState::VisibilityKnown,
            };

            if !visible {
                // Hidden inputs contribute no value and cost no remote calls.
                record.state = InputState::ValueKnown;
                records.insert(input_id.clone(), record);
                outcomes.insert(
                    input_id.clone(),
                    InputOutcome {
                        state: InputState::ValueKnown,
                        visible: false,
                        origin: ValueOrigin::Hidden,
                    },
                );
                continue;
            }

            let (value, origin) = self
                .compute_value(descriptor, plan, ctx, &render_ctx, &mut evaluator)
                .await?;

            let value = self
                .validate(descriptor, value, ctx, &render_ctx, &mut evaluator)
                .await?;

            if value.is_none() && descriptor.is_required {
                return Err(ResolutionError::Validation {
                    input_id: input_id.clone(),
                    message: "input is required but no value could be resolved".to_string(),
                });
            }

            if let Some(value) = &value {
                render_ctx.inputs.insert(input_id, value.clone());
            }
            record.value = value;
            record.state = InputState::ValueKnown;
            records.insert(input_id.clone(), record);
            outcomes.insert(
                input_id.clone(),
                InputOutcome { state: InputState::ValueKnown, visible: true, origin },
            );
        }

        // Declaration order, not resolution order, for the final map.
        let mut parameters = IndexMap::new();
        for (input_id, record) in self
            .descriptors
            .keys()
            .filter_map(|id| records.get(id).map(|record| (id, record)))
        {
            if record.visible {
                if let Some(value) = &record.value {
                    parameters.insert(input_id.clone(), value.clone());
                }
            }
        }

        let report = ResolutionReport {
            pass_id: Uuid::new_v4(),
            outcomes,
            remote_calls: evaluator.remote_calls(),
            cache_hits: evaluator.cache_hits(),
        };
        Ok(ResolutionOutcome { parameters, report })
    }

    /// Parses every rule, expression and template up front and flattens each
    /// descriptor's dependencies. Order of checks matters: parse errors and
    /// unknown references must surface before any resolution work begins.
    fn build_plans(&self) -> Result<IndexMap<String, InputPlan>, ResolutionError> {
        let mut plans = IndexMap::new();
        for (input_id, descriptor) in self.descriptors.iter() {
            let mut dependencies: Vec<String> = vec![];
            let track = |ids: Vec<String>, dependencies: &mut Vec<String>| {
                for id in ids {
                    if id != *input_id && !dependencies.contains(&id) {
                        dependencies.push(id);
                    }
                }
            };

            if let Some(expression) = &descriptor.default_value_expression {
                let refs = templates::collect_template_references(expression).map_err(|e| {
                    ResolutionError::MalformedTemplate {
                        template: expression.clone(),
                        reason: e.message,
                    }
                })?;
                track(refs.inputs, &mut dependencies);
            }

            let rule = match &descriptor.visible_rule {
                Some(rule) => {
                    let parsed = visibility::parse_rule(rule)?;
                    track(
                        parsed.referenced_inputs().iter().map(|s| s.to_string()).collect(),
                        &mut dependencies,
                    );
                    Some(parsed)
                }
                None => None,
            };

            let data_source = match &descriptor.data_source_id {
                Some(expression) => {
                    if !descriptor.possible_values.is_empty() {
                        return Err(ResolutionError::ConflictingValueSources {
                            input_id: input_id.clone(),
                        });
                    }
                    let parsed = ds_expression::parse(expression, &self.sources)?;
                    for source_id in parsed.referenced_sources() {
                        track(self.source_input_references(source_id)?, &mut dependencies);
                    }
                    Some(parsed)
                }
                None => None,
            };

            for validation in descriptor.dynamic_validations.iter() {
                if !self.sources.contains_key(&validation.data_source_id) {
                    return Err(ResolutionError::UnknownReference {
                        referenced_by: input_id.clone(),
                        kind: ReferenceKind::DataSource,
                        reference: validation.data_source_id.clone(),
                    });
                }
                track(
                    self.source_input_references(&validation.data_source_id)?,
                    &mut dependencies,
                );
            }

            if let Some(validation) = &descriptor.static_validation {
                if let Some(pattern) = &validation.pattern {
                    if Regex::new(pattern).is_err() {
                        return Err(ResolutionError::InvalidValidationPattern {
                            input_id: input_id.clone(),
                            pattern: pattern.clone(),
                        });
                    }
                }
            }

            for dependency in dependencies.iter() {
                if !self.descriptors.contains_key(dependency) {
                    return Err(ResolutionError::UnknownReference {
                        referenced_by: input_id.clone(),
                        kind: ReferenceKind::Input,
                        reference: dependency.clone(),
                    });
                }
            }

            plans.insert(input_id.clone(), InputPlan { rule, data_source, dependencies });
        }
        Ok(plans)
    }

    /// Inputs referenced by a data source's templates, i.e. the inputs that
    /// must be resolved before the source can be called.
    fn source_input_references(&self, source_id: &str) -> Result<Vec<String>, ResolutionError> {
        let Some(definition) = self.sources.get(source_id) else {
            return Ok(vec![]);
        };
        let mut references = vec![];
        let mut templates_to_scan = vec![definition.endpoint_url_template.as_str()];
        if let Some(body) = &definition.request_body_template {
            templates_to_scan.push(body);
        }
        if let Some(result) = &definition.result_template {
            templates_to_scan.push(result);
        }
        for template in templates_to_scan {
            let refs = templates::collect_template_references(template).map_err(|e| {
                ResolutionError::MalformedTemplate {
                    template: template.to_string(),
                    reason: e.message,
                }
            })?;
            for id in refs.inputs {
                if !references.contains(&id) {
                    references.push(id);
                }
            }
        }
        Ok(references)
    }

    fn sorted_order(
        &self,
        plans: &IndexMap<String, InputPlan>,
    ) -> Result<Vec<String>, ResolutionError> {
        let mut graph = InputGraphContext::new();
        for input_id in self.descriptors.keys() {
            graph.index_input(input_id);
        }
        for (input_id, plan) in plans.iter() {
            for dependency in plan.dependencies.iter() {
                graph.add_dependency(input_id, dependency)?;
            }
        }
        Ok(graph.sorted_inputs())
    }

    async fn compute_value(
        &self,
        descriptor: &InputDescriptor,
        plan: &InputPlan,
        ctx: &ResolutionContext,
        render_ctx: &RenderContext,
        evaluator: &mut DataSourceEvaluator<'_>,
    ) -> Result<(Option<Value>, ValueOrigin), ResolutionError> {
        if let Some(preset) = ctx.presets.get(&descriptor.id) {
            return Ok((Some(preset.clone()), ValueOrigin::Preset));
        }

        if let Some(expression) = &plan.data_source {
            if ctx.cancellation.is_cancelled() {
                return Err(ResolutionError::Cancelled);
            }
            let result = evaluator.evaluate_expression(expression, render_ctx).await?;
            if descriptor.input_mode.is_choice() {
                let items = result.into_items();
                let value = self
                    .prompt(ctx, descriptor, PromptRequestType::PickOption(PickOptionRequest { items }))
                    .await?;
                return Ok((Some(value), ValueOrigin::Prompt));
            }
            return match result.into_single_value() {
                Some(value) => Ok((Some(value), ValueOrigin::DataSource)),
                // No data for a required scalar consumer is a remote-shape
                // problem, not something a re-prompt can fix.
                None if descriptor.is_required => Err(ResolutionError::RemoteData {
                    source_id: expression.referenced_sources().join(" INTERSECT "),
                    diagnostic: pipewright_kit::diagnosed_error!(
                        "data source returned no data for required input '{}'",
                        descriptor.id
                    ),
                }),
                None => Ok((None, ValueOrigin::Absent)),
            };
        }

        if !descriptor.possible_values.is_empty() && descriptor.input_mode.is_choice() {
            let items: Vec<SelectableItem> = descriptor
                .possible_values
                .iter()
                .map(|pv| SelectableItem::new(&pv.display_value, pv.value.clone()))
                .collect();
            let value = self
                .prompt(ctx, descriptor, PromptRequestType::PickOption(PickOptionRequest { items }))
                .await?;
            return Ok((Some(value), ValueOrigin::Prompt));
        }

        if let Some(expression) = &descriptor.default_value_expression {
            let rendered = templates::render(expression, render_ctx).map_err(|e| {
                ResolutionError::MalformedTemplate {
                    template: expression.clone(),
                    reason: e.message,
                }
            })?;
            let proposed = Value::string(rendered);
            if descriptor.input_mode.requires_prompt() {
                let value = self
                    .prompt(
                        ctx,
                        descriptor,
                        PromptRequestType::ReviewValue(ReviewValueRequest { proposed }),
                    )
                    .await?;
                return Ok((Some(value), ValueOrigin::Prompt));
            }
            return Ok((Some(proposed), ValueOrigin::DefaultExpression));
        }

        if descriptor.input_mode.requires_prompt() {
            let value = self
                .prompt(
                    ctx,
                    descriptor,
                    PromptRequestType::ProvideValue(ProvideValueRequest {
                        proposed: None,
                        secure: descriptor.data_type.is_secure(),
                    }),
                )
                .await?;
            return Ok((Some(value), ValueOrigin::Prompt));
        }

        Ok((None, ValueOrigin::Absent))
    }

    /// Static then dynamic validation. A failing promptable input gets one
    /// re-prompt before the failure surfaces; silent inputs fail directly.
    async fn validate(
        &self,
        descriptor: &InputDescriptor,
        value: Option<Value>,
        ctx: &ResolutionContext,
        render_ctx: &RenderContext,
        evaluator: &mut DataSourceEvaluator<'_>,
    ) -> Result<Option<Value>, ResolutionError> {
        let Some(value) = value else {
            return Ok(None);
        };
        match self.check_validations(descriptor, &value, ctx, render_ctx, evaluator).await {
            Ok(()) => Ok(Some(value)),
            Err(error) => {
                if !(error.is_recoverable() && descriptor.input_mode.requires_prompt()) {
                    return Err(error);
                }
                let retried = self
                    .prompt(
                        ctx,
                        descriptor,
                        PromptRequestType::ProvideValue(ProvideValueRequest {
                            proposed: Some(value),
                            secure: descriptor.data_type.is_secure(),
                        }),
                    )
                    .await?;
                self.check_validations(descriptor, &retried, ctx, render_ctx, evaluator).await?;
                Ok(Some(retried))
            }
        }
    }

    async fn check_validations(
        &self,
        descriptor: &InputDescriptor,
        value: &Value,
        ctx: &ResolutionContext,
        render_ctx: &RenderContext,
        evaluator: &mut DataSourceEvaluator<'_>,
    ) -> Result<(), ResolutionError> {
        if let Some(validation) = &descriptor.static_validation {
            check_static_validation(&descriptor.id, validation, value)?;
        }
        for validation in descriptor.dynamic_validations.iter() {
            if ctx.cancellation.is_cancelled() {
                return Err(ResolutionError::Cancelled);
            }
            let definition = self.sources.get(&validation.data_source_id).ok_or_else(|| {
                ResolutionError::UnknownReference {
                    referenced_by: descriptor.id.clone(),
                    kind: ReferenceKind::DataSource,
                    reference: validation.data_source_id.clone(),
                }
            })?;
            // The candidate value is bound under the input's own id for the
            // duration of the check.
            let mut check_ctx = render_ctx.clone();
            check_ctx.inputs.insert(&descriptor.id, value.clone());
            let result = evaluator.evaluate_definition(definition, &check_ctx).await?;
            let passed = result
                .into_single_value()
                .map(|v| v.encode_to_string().eq_ignore_ascii_case("true"))
                .unwrap_or(false);
            if !passed {
                return Err(ResolutionError::Validation {
                    input_id: descriptor.id.clone(),
                    message: validation
                        .error_message
                        .clone()
                        .unwrap_or_else(|| "dynamic validation failed".to_string()),
                });
            }
        }
        Ok(())
    }

    async fn prompt(
        &self,
        ctx: &ResolutionContext,
        descriptor: &InputDescriptor,
        request_type: PromptRequestType,
    ) -> Result<Value, ResolutionError> {
        if ctx.cancellation.is_cancelled() {
            return Err(ResolutionError::Cancelled);
        }
        let request = PromptRequest {
            input_id: descriptor.id.clone(),
            title: descriptor.name.clone(),
            request_type,
        };
        self.prompter.prompt(request).await.map_err(|diagnostic| ResolutionError::Prompt {
            input_id: descriptor.id.clone(),
            diagnostic,
        })
    }
}

fn operand_for(
    records: &IndexMap<String, ResolvedInput>,
    input_id: &str,
) -> Option<PredicateOperand> {
    let record = records.get(input_id)?;
    if !record.is_value_known() || !record.visible {
        return Some(PredicateOperand::Hidden);
    }
    match &record.value {
        Some(value) => Some(PredicateOperand::Visible(value.clone())),
        None => Some(PredicateOperand::Hidden),
    }
}

fn check_static_validation(
    input_id: &str,
    validation: &StaticValidation,
    value: &Value,
) -> Result<(), ResolutionError> {
    let text = value.encode_to_string();
    let fail = |default_message: String| ResolutionError::Validation {
        input_id: input_id.to_string(),
        message: validation.error_message.clone().unwrap_or(default_message),
    };
    if let Some(min) = validation.min_length {
        if text.chars().count() < min {
            return Err(fail(format!("value must be at least {} characters", min)));
        }
    }
    if let Some(max) = validation.max_length {
        if text.chars().count() > max {
            return Err(fail(format!("value must be at most {} characters", max)));
        }
    }
    if let Some(pattern) = &validation.pattern {
        let regex = Regex::new(&format!("^(?:{})$", pattern)).map_err(|_| {
            ResolutionError::InvalidValidationPattern {
                input_id: input_id.to_string(),
                pattern: pattern.clone(),
            }
        })?;
        if !regex.is_match(&text) {
            return Err(fail(format!("value does not match pattern '{}'", pattern)));
        }
    }
    Ok(())
}

fn internal_missing_descriptor(input_id: &str) -> ResolutionError {
    ResolutionError::UnknownReference {
        referenced_by: "resolution pass".to_string(),
        kind: ReferenceKind::Input,
        reference: input_id.to_string(),
    }
}
