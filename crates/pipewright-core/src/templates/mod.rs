//! Mustache-style template rendering over the namespaced resolution context,
//! plus dependency extraction for the orchestrator's graph.
//!
//! `{{x}}` interpolates HTML-escaped, `{{{x}}}` interpolates raw. Values
//! destined for non-HTML consumers (URLs, YAML, JSON bodies) must use the
//! raw form; the distinction is load-bearing. Unknown identifiers render as
//! an empty string so optional template fragments can reference data that is
//! not available yet.

mod helpers;
mod parser;

pub use parser::{HelperKind, TemplateToken};

use pipewright_kit::types::diagnostics::Diagnostic;
use pipewright_kit::types::stores::ValueStore;
use pipewright_kit::types::types::Value;

/// Typed lookup context for one render: one [ValueStore] per namespace, plus
/// a bare-identifier store (`locals`) used when projecting data source
/// response elements.
#[derive(Clone, Debug)]
pub struct RenderContext {
    pub inputs: ValueStore,
    pub variables: ValueStore,
    pub assets: ValueStore,
    pub secrets: ValueStore,
    pub system: ValueStore,
    pub client: ValueStore,
    pub locals: ValueStore,
}

impl RenderContext {
    pub fn new() -> RenderContext {
        RenderContext {
            inputs: ValueStore::new("inputs"),
            variables: ValueStore::new("variables"),
            assets: ValueStore::new("assets"),
            secrets: ValueStore::new("secrets"),
            system: ValueStore::new("system"),
            client: ValueStore::new("client"),
            locals: ValueStore::new("locals"),
        }
    }

    pub fn with_inputs(mut self, inputs: ValueStore) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_variables(mut self, variables: ValueStore) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_assets(mut self, assets: ValueStore) -> Self {
        self.assets = assets;
        self
    }

    pub fn with_secrets(mut self, secrets: ValueStore) -> Self {
        self.secrets = secrets;
        self
    }

    pub fn with_system(mut self, system: ValueStore) -> Self {
        self.system = system;
        self
    }

    pub fn with_client(mut self, client: ValueStore) -> Self {
        self.client = client;
        self
    }

    pub fn with_locals(mut self, locals: ValueStore) -> Self {
        self.locals = locals;
        self
    }

    /// Resolves a dotted path. The first segment selects a namespace; paths
    /// with no namespace prefix resolve against `locals`, drilling into
    /// object values segment by segment.
    pub fn lookup(&self, path: &str) -> Option<Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let (store, key) = match first {
            "inputs" => (&self.inputs, segments.next()?),
            "variables" => (&self.variables, segments.next()?),
            "assets" => (&self.assets, segments.next()?),
            "secrets" => (&self.secrets, segments.next()?),
            "system" => (&self.system, segments.next()?),
            "client" => (&self.client, segments.next()?),
            _ => (&self.locals, first),
        };
        let mut value = store.get_value(key)?.clone();
        for segment in segments {
            let next = value.as_object()?.get(segment)?.clone();
            value = next;
        }
        Some(value)
    }
}

impl Default for RenderContext {
    fn default() -> Self {
        RenderContext::new()
    }
}

/// Renders a template against the context. Fails only on malformed template
/// syntax; missing identifiers are leniency, not errors.
pub fn render(template: &str, ctx: &RenderContext) -> Result<String, Diagnostic> {
    let tokens = parser::parse(template)?;
    Ok(render_tokens(&tokens, ctx))
}

fn render_tokens(tokens: &[TemplateToken], ctx: &RenderContext) -> String {
    let mut out = String::new();
    for token in tokens.iter() {
        match token {
            TemplateToken::Text(text) => out.push_str(text),
            TemplateToken::Variable { path, raw } => {
                let rendered =
                    ctx.lookup(path).map(|v| v.encode_to_string()).unwrap_or_default();
                if *raw {
                    out.push_str(&rendered);
                } else {
                    out.push_str(&html_escape(&rendered));
                }
            }
            TemplateToken::Section { helper, block } => {
                let rendered_block = render_tokens(block, ctx);
                out.push_str(&helpers::apply(*helper, &rendered_block));
            }
        }
    }
    out
}

fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Identifiers referenced by a template, partitioned by namespace. Feeds the
/// orchestrator's dependency graph and the unknown-reference checks.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TemplateReferences {
    pub inputs: Vec<String>,
    pub system: Vec<String>,
    pub client: Vec<String>,
}

impl TemplateReferences {
    fn record(&mut self, path: &str) {
        let mut segments = path.split('.');
        let (Some(namespace), Some(identifier)) = (segments.next(), segments.next()) else {
            return;
        };
        let identifier = identifier
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
            .collect::<String>();
        if identifier.is_empty() {
            return;
        }
        let bucket = match namespace {
            "inputs" => &mut self.inputs,
            "system" => &mut self.system,
            "client" => &mut self.client,
            _ => return,
        };
        if !bucket.contains(&identifier) {
            bucket.push(identifier);
        }
    }
}

/// Scans a template for `{{ns.identifier}}` and `{{{ns.identifier}}}` forms.
/// Both brace forms count identically; only rendering escapes differently.
pub fn collect_template_references(template: &str) -> Result<TemplateReferences, Diagnostic> {
    let tokens = parser::parse(template)?;
    let mut references = TemplateReferences::default();
    collect_from_tokens(&tokens, &mut references);
    Ok(references)
}

fn collect_from_tokens(tokens: &[TemplateToken], references: &mut TemplateReferences) {
    for token in tokens.iter() {
        match token {
            TemplateToken::Text(_) => {}
            TemplateToken::Variable { path, .. } => references.record(path),
            TemplateToken::Section { block, .. } => collect_from_tokens(block, references),
        }
    }
}
