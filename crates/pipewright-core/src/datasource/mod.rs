//! Remote data source evaluation: render URL and body templates against the
//! resolved inputs, perform one HTTP call through the host transport, then
//! map the response into a scalar or a selectable item list.

pub mod expression;
mod selector;

use std::collections::HashMap;

use pipewright_kit::indexmap::IndexMap;
use pipewright_kit::reqwest::Method;
use pipewright_kit::transport::{response_cache_key, DataSourceTransport, TransportRequest};
use pipewright_kit::types::frontend::SelectableItem;
use pipewright_kit::types::stores::ValueStore;
use pipewright_kit::types::types::Value;
use serde_json::Value as JsonValue;

use crate::errors::{ReferenceKind, ResolutionError};
use crate::templates::{self, RenderContext};
use crate::types::DataSourceDefinition;

use expression::DataSourceExpression;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DataSourceResult {
    Scalar(Value),
    List(Vec<SelectableItem>),
    /// The selector yielded `null` or an empty string: no data, not an error.
    Empty,
}

impl DataSourceResult {
    /// Collapses the result into a candidate list for choice controls.
    pub fn into_items(self) -> Vec<SelectableItem> {
        match self {
            DataSourceResult::List(items) => items,
            DataSourceResult::Scalar(value) => {
                vec![SelectableItem::new(&value.encode_to_string(), value)]
            }
            DataSourceResult::Empty => vec![],
        }
    }

    /// Collapses the result into a single value for single-answer controls:
    /// the scalar, or the only item of a list.
    pub fn into_single_value(self) -> Option<Value> {
        match self {
            DataSourceResult::Scalar(value) => Some(value),
            DataSourceResult::List(items) => items.into_iter().next().map(|item| item.value),
            DataSourceResult::Empty => None,
        }
    }
}

/// Shape the `resultTemplate` of a data source must render to, per item.
#[derive(Debug, Deserialize)]
struct ProjectedItem {
    #[serde(rename = "DisplayValue")]
    display_value: String,
    #[serde(rename = "Value")]
    value: JsonValue,
    #[serde(rename = "Group")]
    #[serde(default)]
    group: Option<String>,
}

/// Evaluates data sources for one resolution pass, caching GET responses by
/// normalized URL. The cache is discarded with the evaluator; resolved
/// values never leak across passes.
pub struct DataSourceEvaluator<'a> {
    sources: &'a IndexMap<String, DataSourceDefinition>,
    transport: &'a dyn DataSourceTransport,
    response_cache: HashMap<String, JsonValue>,
    remote_calls: usize,
    cache_hits: usize,
}

impl<'a> DataSourceEvaluator<'a> {
    pub fn new(
        sources: &'a IndexMap<String, DataSourceDefinition>,
        transport: &'a dyn DataSourceTransport,
    ) -> DataSourceEvaluator<'a> {
        DataSourceEvaluator {
            sources,
            transport,
            response_cache: HashMap::new(),
            remote_calls: 0,
            cache_hits: 0,
        }
    }

    pub fn remote_calls(&self) -> usize {
        self.remote_calls
    }

    pub fn cache_hits(&self) -> usize {
        self.cache_hits
    }

    /// Evaluates a parsed data source expression. Both sides of a binary
    /// expression are evaluated; each may have distinct remote effects, so
    /// there is no short-circuiting.
    pub async fn evaluate_expression(
        &mut self,
        expression: &DataSourceExpression,
        ctx: &RenderContext,
    ) -> Result<DataSourceResult, ResolutionError> {
        match expression {
            DataSourceExpression::Source(id) => self.evaluate_source(id, ctx).await,
            DataSourceExpression::Binary { operator, left, right } => {
                let left = Box::pin(self.evaluate_expression(left, ctx)).await?;
                let right = Box::pin(self.evaluate_expression(right, ctx)).await?;
                Ok(expression::combine(*operator, left, right))
            }
        }
    }

    async fn evaluate_source(
        &mut self,
        source_id: &str,
        ctx: &RenderContext,
    ) -> Result<DataSourceResult, ResolutionError> {
        let definition =
            self.sources.get(source_id).ok_or_else(|| ResolutionError::UnknownReference {
                referenced_by: source_id.to_string(),
                kind: ReferenceKind::DataSource,
                reference: source_id.to_string(),
            })?;
        self.evaluate_definition(definition, ctx).await
    }

    pub async fn evaluate_definition(
        &mut self,
        definition: &DataSourceDefinition,
        ctx: &RenderContext,
    ) -> Result<DataSourceResult, ResolutionError> {
        let url = render_template(&definition.endpoint_url_template, ctx)?;
        let method = match &definition.http_method {
            None => Method::GET,
            Some(name) => Method::try_from(name.as_str()).map_err(|_| {
                ResolutionError::InvalidHttpMethod {
                    source_id: definition.id.clone(),
                    method: name.clone(),
                }
            })?,
        };
        let mut request = TransportRequest::get(&url).with_method(method);
        if request.writes_body() {
            if let Some(body_template) = &definition.request_body_template {
                let rendered = render_template(body_template, ctx)?;
                if !rendered.trim().is_empty() {
                    let body = serde_json::from_str::<JsonValue>(&rendered).map_err(|e| {
                        ResolutionError::MalformedTemplate {
                            template: body_template.clone(),
                            reason: format!("rendered request body is not valid json: {}", e),
                        }
                    })?;
                    request = request.with_body(body);
                }
            }
        }

        let response = self.fetch(&definition.id, request).await?;

        let selected = match &definition.result_selector {
            Some(selector) => selector::select(selector, &response).map_err(|diagnostic| {
                ResolutionError::RemoteData { source_id: definition.id.clone(), diagnostic }
            })?,
            None => response.clone(),
        };

        if selected.is_null() || selected.as_str().map(|s| s.is_empty()).unwrap_or(false) {
            return Ok(DataSourceResult::Empty);
        }

        match selected {
            JsonValue::Array(elements) => {
                let mut items = vec![];
                for element in elements.iter() {
                    items.push(self.project_item(definition, element, ctx)?);
                }
                Ok(DataSourceResult::List(items))
            }
            scalar => match &definition.result_template {
                Some(template) => {
                    let locals = locals_from_json(&response);
                    let rendered =
                        render_template(template, &ctx.clone().with_locals(locals))?;
                    Ok(DataSourceResult::Scalar(Value::string(rendered)))
                }
                None => Ok(DataSourceResult::Scalar(Value::from_json(&scalar))),
            },
        }
    }

    fn project_item(
        &self,
        definition: &DataSourceDefinition,
        element: &JsonValue,
        ctx: &RenderContext,
    ) -> Result<SelectableItem, ResolutionError> {
        let Some(template) = &definition.result_template else {
            // No projection: the element is both display and value.
            let value = Value::from_json(element);
            let label = match element {
                JsonValue::String(s) => s.clone(),
                other => other.to_string(),
            };
            return Ok(SelectableItem::new(&label, value));
        };
        let locals = locals_from_json(element);
        let rendered = render_template(template, &ctx.clone().with_locals(locals))?;
        let projected = serde_json::from_str::<ProjectedItem>(&rendered).map_err(|e| {
            ResolutionError::RemoteData {
                source_id: definition.id.clone(),
                diagnostic: pipewright_kit::diagnosed_error!(
                    "result template did not render to a {{DisplayValue, Value, Group?}} object: {}",
                    e
                ),
            }
        })?;
        let mut item =
            SelectableItem::new(&projected.display_value, Value::from_json(&projected.value));
        if let Some(group) = projected.group {
            item = item.with_group(&group);
        }
        Ok(item)
    }

    async fn fetch(
        &mut self,
        source_id: &str,
        request: TransportRequest,
    ) -> Result<JsonValue, ResolutionError> {
        let cacheable = request.method == Method::GET;
        let cache_key = response_cache_key(&request.url);
        if cacheable {
            if let Some(cached) = self.response_cache.get(&cache_key) {
                self.cache_hits += 1;
                return Ok(cached.clone());
            }
        }
        self.remote_calls += 1;
        let response = self.transport.execute(request).await.map_err(|diagnostic| {
            ResolutionError::RemoteData { source_id: source_id.to_string(), diagnostic }
        })?;
        if cacheable {
            self.response_cache.insert(cache_key, response.clone());
        }
        Ok(response)
    }
}

fn render_template(template: &str, ctx: &RenderContext) -> Result<String, ResolutionError> {
    templates::render(template, ctx).map_err(|diagnostic| ResolutionError::MalformedTemplate {
        template: template.to_string(),
        reason: diagnostic.message,
    })
}

/// Projects a JSON object's fields into a bare-identifier store, so a result
/// template can reference `{{{name}}}` or `{{{properties.loginServer}}}`
/// alongside the regular namespaces.
fn locals_from_json(value: &JsonValue) -> ValueStore {
    let mut locals = ValueStore::new("locals");
    if let JsonValue::Object(fields) = value {
        for (key, field) in fields.iter() {
            locals.insert(key, Value::from_json(field));
        }
    }
    locals
}
