//! Pipeline template manifest: the JSON document declaring a template's
//! inputs and data sources, deserialized into the typed descriptors the
//! resolver consumes.

use pipewright_kit::transport::DataSourceTransport;
use pipewright_kit::types::diagnostics::Diagnostic;
use pipewright_kit::types::frontend::InputPrompter;
use regex::Regex;

use crate::resolver::InputResolver;
use crate::types::{DataSourceDefinition, InputDescriptor};

lazy_static! {
    static ref IDENTIFIER_RE: Regex = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]*$")
        .expect("identifier regex is valid");
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TemplateManifest {
    #[serde(default)]
    pub inputs: Vec<InputDescriptor>,
    #[serde(default)]
    pub data_sources: Vec<DataSourceDefinition>,
}

impl TemplateManifest {
    /// Parses a manifest document and checks every declared identifier.
    /// Reference checking across inputs and sources happens later, in the
    /// resolver's plan-building step.
    pub fn from_json_str(raw: &str) -> Result<TemplateManifest, Diagnostic> {
        let manifest: TemplateManifest = serde_json::from_str(raw)
            .map_err(|e| Diagnostic::error(format!("unable to parse manifest: {}", e)))?;
        for input in manifest.inputs.iter() {
            check_identifier("input", &input.id)?;
        }
        for source in manifest.data_sources.iter() {
            check_identifier("data source", &source.id)?;
        }
        Ok(manifest)
    }

    pub fn resolver<'a>(
        self,
        transport: &'a dyn DataSourceTransport,
        prompter: &'a dyn InputPrompter,
    ) -> Result<InputResolver<'a>, Diagnostic> {
        InputResolver::new(self.inputs, self.data_sources, transport, prompter)
            .map_err(Diagnostic::from)
    }
}

fn check_identifier(kind: &str, id: &str) -> Result<(), Diagnostic> {
    if IDENTIFIER_RE.is_match(id) {
        return Ok(());
    }
    Err(Diagnostic::error(format!("'{}' is not a valid {} id", id, kind))
        .with_suggestion("ids must start with a letter or digit and use only [A-Za-z0-9_-]"))
}
