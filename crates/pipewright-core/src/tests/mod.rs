//! End to end resolution passes over small manifests, driven by a scripted
//! transport and prompter.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use pipewright_kit::futures::future::BoxFuture;
use pipewright_kit::transport::{DataSourceTransport, TransportRequest};
use pipewright_kit::types::diagnostics::Diagnostic;
use pipewright_kit::types::frontend::{InputPrompter, PromptRequest, PromptRequestType};
use pipewright_kit::types::types::Value;
use serde_json::{json, Value as JsonValue};

use crate::manifest::TemplateManifest;
use crate::resolver::{InputResolver, ResolutionContext, ValueOrigin};
use crate::types::{DataSourceDefinition, InputDescriptor, InputMode, StaticValidation};
use crate::ResolutionError;

/// Transport answering from a url -> response table, recording every call.
struct MockTransport {
    responses: HashMap<String, JsonValue>,
    calls: Mutex<Vec<String>>,
}

impl MockTransport {
    fn new() -> MockTransport {
        MockTransport { responses: HashMap::new(), calls: Mutex::new(vec![]) }
    }

    fn with_response(mut self, url: &str, body: JsonValue) -> Self {
        self.responses.insert(url.to_string(), body);
        self
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl DataSourceTransport for MockTransport {
    fn execute(&self, request: TransportRequest) -> BoxFuture<'_, Result<JsonValue, Diagnostic>> {
        self.calls.lock().unwrap().push(request.url.clone());
        let response = self.responses.get(&request.url).cloned().ok_or_else(|| {
            Diagnostic::error(format!("no scripted response for '{}'", request.url))
        });
        Box::pin(async move { response })
    }
}

/// Prompter consuming a queue of scripted answers; when the queue is empty
/// it accepts whatever the request proposes (first option, proposed value).
struct ScriptedPrompter {
    answers: Mutex<VecDeque<Value>>,
    requests: Mutex<Vec<PromptRequest>>,
}

impl ScriptedPrompter {
    fn new(answers: Vec<Value>) -> ScriptedPrompter {
        ScriptedPrompter {
            answers: Mutex::new(answers.into_iter().collect()),
            requests: Mutex::new(vec![]),
        }
    }

    fn silent() -> ScriptedPrompter {
        ScriptedPrompter::new(vec![])
    }

    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn requests(&self) -> Vec<PromptRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl InputPrompter for ScriptedPrompter {
    fn prompt(&self, request: PromptRequest) -> BoxFuture<'_, Result<Value, Diagnostic>> {
        let scripted = self.answers.lock().unwrap().pop_front();
        let answer = match scripted {
            Some(value) => Ok(value),
            None => match &request.request_type {
                PromptRequestType::ReviewValue(review) => Ok(review.proposed.clone()),
                PromptRequestType::PickOption(pick) => pick
                    .items
                    .first()
                    .map(|item| item.value.clone())
                    .ok_or_else(|| Diagnostic::error("no options to pick from")),
                PromptRequestType::ProvideValue(provide) => provide
                    .proposed
                    .clone()
                    .ok_or_else(|| Diagnostic::error("no scripted answer for this prompt")),
            },
        };
        self.requests.lock().unwrap().push(request);
        Box::pin(async move { answer })
    }
}

fn load(fixture: &str) -> TemplateManifest {
    TemplateManifest::from_json_str(fixture).unwrap()
}

#[tokio::test]
async fn choice_input_prompts_with_projected_items_from_the_data_source() {
    let manifest = load(include_str!("fixtures/region_pick.json"));
    let transport = MockTransport::new().with_response(
        "https://management.example.test/locations?api-version=2021-01-01",
        json!({ "value": [
            { "name": "eastus", "displayName": "East US" },
            { "name": "westus", "displayName": "West US" }
        ]}),
    );
    let prompter = ScriptedPrompter::new(vec![Value::string("westus".into())]);
    let resolver = manifest.resolver(&transport, &prompter).unwrap();

    let outcome = resolver.resolve_all(&ResolutionContext::new()).await.unwrap();

    assert_eq!(outcome.parameters.get("region"), Some(&Value::string("westus".into())));
    assert_eq!(transport.call_count(), 1);
    let requests = prompter.requests();
    assert_eq!(requests.len(), 1);
    let PromptRequestType::PickOption(pick) = &requests[0].request_type else {
        panic!("expected a pick-option prompt");
    };
    assert_eq!(pick.items.len(), 2);
    assert_eq!(pick.items[1].label, "West US");
    assert_eq!(outcome.report.outcomes.get("region").unwrap().origin, ValueOrigin::Prompt);
}

#[tokio::test]
async fn default_expressions_resolve_in_dependency_order_not_declaration_order() {
    // `name` is declared before the `suffix` it references.
    let manifest = load(include_str!("fixtures/default_chain.json"));
    let transport = MockTransport::new();
    let prompter = ScriptedPrompter::silent();
    let resolver = manifest.resolver(&transport, &prompter).unwrap();

    let outcome = resolver.resolve_all(&ResolutionContext::new()).await.unwrap();

    assert_eq!(outcome.parameters.get("name"), Some(&Value::string("app-42".into())));
    assert_eq!(outcome.parameters.get("suffix"), Some(&Value::string("42".into())));
    // Final map keeps declaration order regardless of resolution order.
    let ids: Vec<&String> = outcome.parameters.keys().collect();
    assert_eq!(ids, vec!["name", "suffix"]);
    assert_eq!(transport.call_count(), 0);
    assert_eq!(prompter.request_count(), 0);
}

#[tokio::test]
async fn hidden_input_skips_its_data_source_and_is_omitted_from_the_map() {
    let manifest = load(include_str!("fixtures/custom_domain.json"));
    let transport = MockTransport::new();
    let prompter = ScriptedPrompter::silent();
    let resolver = manifest.resolver(&transport, &prompter).unwrap();

    let outcome = resolver.resolve_all(&ResolutionContext::new()).await.unwrap();

    assert!(outcome.parameters.contains_key("useCustomDomain"));
    assert!(!outcome.parameters.contains_key("customDomainName"));
    assert_eq!(transport.call_count(), 0);
    assert_eq!(prompter.request_count(), 0);
    let hidden = outcome.report.outcomes.get("customDomainName").unwrap();
    assert!(!hidden.visible);
    assert_eq!(hidden.origin, ValueOrigin::Hidden);
}

#[tokio::test]
async fn dependency_cycle_aborts_before_any_remote_call() {
    let descriptors = vec![
        InputDescriptor::new("a").with_default("{{{inputs.b}}}"),
        InputDescriptor::new("b").with_default("{{{inputs.a}}}"),
    ];
    let sources = vec![DataSourceDefinition::new("src", "https://example.test/x")];
    let transport = MockTransport::new();
    let prompter = ScriptedPrompter::silent();
    let resolver = InputResolver::new(descriptors, sources, &transport, &prompter).unwrap();

    let err = resolver.resolve_all(&ResolutionContext::new()).await.unwrap_err();

    assert!(matches!(err, ResolutionError::Cycle { .. }));
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn unknown_input_reference_is_a_configuration_error() {
    let descriptors = vec![InputDescriptor::new("a").with_default("{{{inputs.ghost}}}")];
    let transport = MockTransport::new();
    let prompter = ScriptedPrompter::silent();
    let resolver = InputResolver::new(descriptors, vec![], &transport, &prompter).unwrap();

    let err = resolver.resolve_all(&ResolutionContext::new()).await.unwrap_err();

    let ResolutionError::UnknownReference { referenced_by, reference, .. } = err else {
        panic!("expected an unknown reference error");
    };
    assert_eq!(referenced_by, "a");
    assert_eq!(reference, "ghost");
}

#[tokio::test]
async fn same_lookup_with_different_api_versions_is_fetched_once() {
    let descriptors = vec![
        InputDescriptor::new("first").with_data_source("older"),
        InputDescriptor::new("second").with_data_source("newer"),
    ];
    let sources = vec![
        DataSourceDefinition::new("older", "https://example.test/locations?api-version=1.0")
            .with_selector(".value"),
        DataSourceDefinition::new("newer", "https://example.test/locations?api-version=6.0")
            .with_selector(".value"),
    ];
    let body = json!({ "value": ["eastus", "westus"] });
    let transport = MockTransport::new()
        .with_response("https://example.test/locations?api-version=1.0", body.clone())
        .with_response("https://example.test/locations?api-version=6.0", body);
    let prompter = ScriptedPrompter::silent();
    let resolver = InputResolver::new(descriptors, sources, &transport, &prompter).unwrap();

    let outcome = resolver.resolve_all(&ResolutionContext::new()).await.unwrap();

    assert_eq!(transport.call_count(), 1);
    assert_eq!(outcome.report.remote_calls, 1);
    assert_eq!(outcome.report.cache_hits, 1);
    assert_eq!(outcome.parameters.get("second"), Some(&Value::string("eastus".into())));
}

#[tokio::test]
async fn intersect_expression_fetches_both_sources_and_keeps_matches() {
    let descriptors = vec![InputDescriptor::new("registry")
        .with_mode(InputMode::SingleSelect)
        .with_data_source("acrListSrc INTERSECT aksAcrListSrc")];
    let sources = vec![
        DataSourceDefinition::new("acrListSrc", "https://example.test/acrs")
            .with_selector(".value"),
        DataSourceDefinition::new("aksAcrListSrc", "https://example.test/attached")
            .with_selector(".value"),
    ];
    let transport = MockTransport::new()
        .with_response("https://example.test/acrs", json!({ "value": ["acr1", "acr2"] }))
        .with_response("https://example.test/attached", json!({ "value": ["ACR1"] }));
    let prompter = ScriptedPrompter::silent();
    let resolver = InputResolver::new(descriptors, sources, &transport, &prompter).unwrap();

    let outcome = resolver.resolve_all(&ResolutionContext::new()).await.unwrap();

    // Both sides are fetched; the intersection matches case-insensitively.
    assert_eq!(transport.call_count(), 2);
    let requests = prompter.requests();
    let PromptRequestType::PickOption(pick) = &requests[0].request_type else {
        panic!("expected a pick-option prompt");
    };
    assert_eq!(pick.items.len(), 1);
    assert_eq!(outcome.parameters.get("registry"), Some(&Value::string("acr1".into())));
}

#[tokio::test]
async fn intersect_with_an_empty_side_offers_no_candidates() {
    let descriptors = vec![InputDescriptor::new("registry")
        .with_data_source("acrListSrc INTERSECT aksAcrListSrc")];
    let sources = vec![
        DataSourceDefinition::new("acrListSrc", "https://example.test/acrs")
            .with_selector(".value"),
        DataSourceDefinition::new("aksAcrListSrc", "https://example.test/attached")
            .with_selector(".value"),
    ];
    let transport = MockTransport::new()
        .with_response("https://example.test/acrs", json!({ "value": ["acr1", "acr2"] }))
        .with_response("https://example.test/attached", json!({}));
    let prompter = ScriptedPrompter::silent();
    let resolver = InputResolver::new(descriptors, sources, &transport, &prompter).unwrap();

    let outcome = resolver.resolve_all(&ResolutionContext::new()).await.unwrap();

    // The attached-registry lookup found nothing, so nothing is offered,
    // even though the left side had candidates.
    assert_eq!(transport.call_count(), 2);
    assert!(!outcome.parameters.contains_key("registry"));
    assert_eq!(outcome.report.outcomes.get("registry").unwrap().origin, ValueOrigin::Absent);
}

#[tokio::test]
async fn empty_data_for_a_required_scalar_input_is_a_remote_data_error() {
    let mut descriptor = InputDescriptor::new("registry").with_data_source("registries");
    descriptor.is_required = true;
    let sources = vec![DataSourceDefinition::new("registries", "https://example.test/registries")
        .with_selector(".value")];
    let transport =
        MockTransport::new().with_response("https://example.test/registries", json!({}));
    let prompter = ScriptedPrompter::silent();
    let resolver = InputResolver::new(vec![descriptor], sources, &transport, &prompter).unwrap();

    let err = resolver.resolve_all(&ResolutionContext::new()).await.unwrap_err();

    let ResolutionError::RemoteData { source_id, .. } = err else {
        panic!("expected a remote data error, got {:?}", err);
    };
    assert_eq!(source_id, "registries");
    assert_eq!(prompter.request_count(), 0);
}

#[tokio::test]
async fn preset_value_wins_over_the_data_source() {
    let descriptors = vec![InputDescriptor::new("registry").with_data_source("registries")];
    let sources =
        vec![DataSourceDefinition::new("registries", "https://example.test/registries")];
    let transport = MockTransport::new();
    let prompter = ScriptedPrompter::silent();
    let resolver = InputResolver::new(descriptors, sources, &transport, &prompter).unwrap();
    let ctx = ResolutionContext::new().with_preset("registry", Value::string("myacr".into()));

    let outcome = resolver.resolve_all(&ctx).await.unwrap();

    assert_eq!(outcome.parameters.get("registry"), Some(&Value::string("myacr".into())));
    assert_eq!(transport.call_count(), 0);
    assert_eq!(outcome.report.outcomes.get("registry").unwrap().origin, ValueOrigin::Preset);
}

#[tokio::test]
async fn required_input_without_a_value_fails_validation() {
    let mut descriptor = InputDescriptor::new("mandatory");
    descriptor.is_required = true;
    let transport = MockTransport::new();
    let prompter = ScriptedPrompter::silent();
    let resolver = InputResolver::new(vec![descriptor], vec![], &transport, &prompter).unwrap();

    let err = resolver.resolve_all(&ResolutionContext::new()).await.unwrap_err();

    assert!(matches!(err, ResolutionError::Validation { .. }));
    assert!(err.is_recoverable());
}

#[tokio::test]
async fn failing_validation_on_a_promptable_input_reprompts_once() {
    let mut descriptor = InputDescriptor::new("appName").with_mode(InputMode::TextBox);
    descriptor.static_validation = Some(StaticValidation {
        min_length: Some(5),
        max_length: None,
        pattern: None,
        error_message: Some("name is too short".to_string()),
    });
    let transport = MockTransport::new();
    let prompter =
        ScriptedPrompter::new(vec![Value::string("ab".into()), Value::string("abcdef".into())]);
    let resolver = InputResolver::new(vec![descriptor], vec![], &transport, &prompter).unwrap();

    let outcome = resolver.resolve_all(&ResolutionContext::new()).await.unwrap();

    assert_eq!(outcome.parameters.get("appName"), Some(&Value::string("abcdef".into())));
    assert_eq!(prompter.request_count(), 2);
    let requests = prompter.requests();
    let PromptRequestType::ProvideValue(retry) = &requests[1].request_type else {
        panic!("expected a provide-value reprompt");
    };
    assert_eq!(retry.proposed, Some(Value::string("ab".into())));
}

#[tokio::test]
async fn failing_validation_on_a_silent_input_aborts_the_pass() {
    let mut descriptor = InputDescriptor::new("port").with_default("8080x");
    descriptor.static_validation = Some(StaticValidation {
        min_length: None,
        max_length: None,
        pattern: Some("[0-9]+".to_string()),
        error_message: None,
    });
    let transport = MockTransport::new();
    let prompter = ScriptedPrompter::silent();
    let resolver = InputResolver::new(vec![descriptor], vec![], &transport, &prompter).unwrap();

    let err = resolver.resolve_all(&ResolutionContext::new()).await.unwrap_err();

    assert!(matches!(err, ResolutionError::Validation { .. }));
    assert_eq!(prompter.request_count(), 0);
}

#[tokio::test]
async fn declaring_both_possible_values_and_a_data_source_is_rejected() {
    let mut descriptor =
        InputDescriptor::new("region").with_mode(InputMode::SingleSelect).with_data_source("src");
    descriptor.possible_values = vec![crate::types::PossibleValue {
        display_value: "East US".to_string(),
        value: Value::string("eastus".into()),
    }];
    let sources = vec![DataSourceDefinition::new("src", "https://example.test/x")];
    let transport = MockTransport::new();
    let prompter = ScriptedPrompter::silent();
    let resolver = InputResolver::new(vec![descriptor], sources, &transport, &prompter).unwrap();

    let err = resolver.resolve_all(&ResolutionContext::new()).await.unwrap_err();

    assert!(matches!(err, ResolutionError::ConflictingValueSources { .. }));
}

#[tokio::test]
async fn cancelled_pass_stops_before_resolving_anything() {
    let descriptors = vec![InputDescriptor::new("region").with_data_source("regions")];
    let sources = vec![DataSourceDefinition::new("regions", "https://example.test/regions")];
    let transport = MockTransport::new();
    let prompter = ScriptedPrompter::silent();
    let resolver = InputResolver::new(descriptors, sources, &transport, &prompter).unwrap();
    let ctx = ResolutionContext::new();
    ctx.cancellation.cancel();

    let err = resolver.resolve_all(&ctx).await.unwrap_err();

    assert!(matches!(err, ResolutionError::Cancelled));
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn duplicate_input_ids_are_rejected_at_construction() {
    let descriptors = vec![InputDescriptor::new("a"), InputDescriptor::new("a")];
    let transport = MockTransport::new();
    let prompter = ScriptedPrompter::silent();

    let Err(err) = InputResolver::new(descriptors, vec![], &transport, &prompter) else {
        panic!("expected duplicate input ids to be rejected");
    };

    assert!(matches!(err, ResolutionError::DuplicateId { .. }));
}
