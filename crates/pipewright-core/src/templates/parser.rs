use std::str::FromStr;

use pipewright_kit::types::diagnostics::Diagnostic;
use strum::{Display, EnumString};

/// The six section helpers of the template language. Closed set: templates
/// naming any other section fail to parse.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumString, Display)]
pub enum HelperKind {
    #[strum(serialize = "if")]
    If,
    #[strum(serialize = "toLower")]
    ToLower,
    #[strum(serialize = "sanitizeString")]
    SanitizeString,
    #[strum(serialize = "substring")]
    Substring,
    #[strum(serialize = "parseAzureResourceId")]
    ParseAzureResourceId,
    #[strum(serialize = "tinyguid")]
    TinyGuid,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TemplateToken {
    Text(String),
    /// `{{path}}` (escaped) or `{{{path}}}` (raw). Both forms are identical
    /// for dependency extraction; only the rendering differs.
    Variable { path: String, raw: bool },
    /// `{{#helper}}block{{/helper}}`; the block renders first, then the
    /// helper is applied to the rendered text.
    Section { helper: HelperKind, block: Vec<TemplateToken> },
}

pub fn parse(template: &str) -> Result<Vec<TemplateToken>, Diagnostic> {
    let mut cursor = Cursor { template, pos: 0 };
    parse_block(&mut cursor, None)
}

struct Cursor<'a> {
    template: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn rest(&self) -> &'a str {
        &self.template[self.pos..]
    }
}

fn parse_block(
    cursor: &mut Cursor,
    open_section: Option<HelperKind>,
) -> Result<Vec<TemplateToken>, Diagnostic> {
    let mut tokens = vec![];
    loop {
        let rest = cursor.rest();
        let Some(open) = rest.find("{{") else {
            if let Some(helper) = open_section {
                return Err(unclosed_section(cursor.template, helper));
            }
            if !rest.is_empty() {
                tokens.push(TemplateToken::Text(rest.to_string()));
            }
            cursor.pos = cursor.template.len();
            return Ok(tokens);
        };
        if open > 0 {
            tokens.push(TemplateToken::Text(rest[..open].to_string()));
        }
        cursor.pos += open;

        if cursor.rest().starts_with("{{{") {
            let inner_start = cursor.pos + 3;
            let Some(close) = cursor.template[inner_start..].find("}}}") else {
                return Err(Diagnostic::error_from_string(format!(
                    "unterminated '{{{{{{' tag in template '{}'",
                    cursor.template
                )));
            };
            let path = cursor.template[inner_start..inner_start + close].trim().to_string();
            tokens.push(TemplateToken::Variable { path, raw: true });
            cursor.pos = inner_start + close + 3;
            continue;
        }

        let inner_start = cursor.pos + 2;
        let Some(close) = cursor.template[inner_start..].find("}}") else {
            return Err(Diagnostic::error_from_string(format!(
                "unterminated '{{{{' tag in template '{}'",
                cursor.template
            )));
        };
        let inner = cursor.template[inner_start..inner_start + close].trim();
        cursor.pos = inner_start + close + 2;

        if let Some(name) = inner.strip_prefix('#') {
            let helper = HelperKind::from_str(name.trim()).map_err(|_| {
                Diagnostic::error_from_string(format!(
                    "unknown template helper '{}' in template '{}'",
                    name.trim(),
                    cursor.template
                ))
            })?;
            let block = parse_block(cursor, Some(helper))?;
            tokens.push(TemplateToken::Section { helper, block });
        } else if let Some(name) = inner.strip_prefix('/') {
            let closing = HelperKind::from_str(name.trim()).ok();
            match open_section {
                Some(helper) if closing == Some(helper) => return Ok(tokens),
                _ => {
                    return Err(Diagnostic::error_from_string(format!(
                        "unexpected closing tag '{{{{/{}}}}}' in template '{}'",
                        name.trim(),
                        cursor.template
                    )))
                }
            }
        } else {
            tokens.push(TemplateToken::Variable { path: inner.to_string(), raw: false });
        }
    }
}

fn unclosed_section(template: &str, helper: HelperKind) -> Diagnostic {
    Diagnostic::error_from_string(format!(
        "section '{{{{#{}}}}}' is never closed in template '{}'",
        helper, template
    ))
}
