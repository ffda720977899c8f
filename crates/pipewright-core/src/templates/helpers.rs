use pipewright_kit::rand::{self, Rng};

use super::parser::HelperKind;

/// Applies a section helper to its already-rendered block text. Helpers are
/// lenient: malformed arguments yield an empty string rather than an error,
/// matching the renderer's treatment of unknown identifiers.
pub fn apply(helper: HelperKind, rendered_block: &str) -> String {
    match helper {
        HelperKind::If => {
            let args = split_arguments(rendered_block);
            if args.len() < 2 {
                return String::new();
            }
            // Only the exact lowercase literal "true" satisfies the
            // condition; this is an external contract with existing
            // templates.
            if args[0] == "true" {
                args[1].clone()
            } else {
                args.get(2).cloned().unwrap_or_default()
            }
        }
        HelperKind::ToLower => rendered_block.to_lowercase(),
        HelperKind::SanitizeString => {
            rendered_block.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
        }
        HelperKind::Substring => {
            let args = split_arguments(rendered_block);
            let (Some(text), Some(from), Some(len)) = (args.first(), args.get(1), args.get(2))
            else {
                return String::new();
            };
            let (Ok(from), Ok(len)) = (from.parse::<usize>(), len.parse::<usize>()) else {
                return String::new();
            };
            text.chars().skip(from).take(len).collect()
        }
        HelperKind::ParseAzureResourceId => {
            let args = split_arguments(rendered_block);
            let (Some(resource_id), Some(index)) = (args.first(), args.get(1)) else {
                return String::new();
            };
            let Ok(index) = index.parse::<usize>() else {
                return String::new();
            };
            resource_id.split('/').nth(index).unwrap_or_default().to_string()
        }
        HelperKind::TinyGuid => tinyguid(),
    }
}

/// 4 random hex characters for disambiguating generated resource names.
/// Deliberately NOT memoized: two references in one resolution pass yield
/// two different values.
pub fn tinyguid() -> String {
    const HEX: &[u8] = b"0123456789abcdef";
    let mut rng = rand::thread_rng();
    (0..4).map(|_| HEX[rng.gen_range(0..HEX.len())] as char).collect()
}

/// Splits helper arguments on whitespace; quoted segments (single or double)
/// keep their inner whitespace, quotes stripped.
fn split_arguments(text: &str) -> Vec<String> {
    let mut args = vec![];
    let mut current = String::new();
    let mut quote: Option<char> = None;
    for c in text.chars() {
        match quote {
            Some(q) => {
                if c == q {
                    args.push(std::mem::take(&mut current));
                    quote = None;
                } else {
                    current.push(c);
                }
            }
            None => {
                if c == '\'' || c == '"' {
                    quote = Some(c);
                } else if c.is_whitespace() {
                    if !current.is_empty() {
                        args.push(std::mem::take(&mut current));
                    }
                } else {
                    current.push(c);
                }
            }
        }
    }
    if !current.is_empty() {
        args.push(current);
    }
    args
}
