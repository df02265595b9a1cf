//! Display names for members.
//!
//! Names are rendered from a template containing `{surname}` and
//! `{forename}` placeholders (`{{` and `}}` produce literal braces). The
//! template comes from the [`keys::NAME_FORMAT`] configuration key.
//! Rendering never fails: a broken template falls back to
//! [`DEFAULT_NAME_FORMAT`].

use crate::config::{keys, Config};
use crate::MemberInfo;

/// Template used when none is configured or the configured one is broken
pub const DEFAULT_NAME_FORMAT: &str = "{surname},{forename}";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NameFormatError {
    #[error("unknown placeholder '{{{0}}}'")]
    UnknownPlaceholder(String),

    #[error("unbalanced brace at position {0}")]
    UnbalancedBrace(usize),
}

/// Render a name with the given template.
pub fn format_name(
    template: &str,
    surname: &str,
    forename: &str,
) -> std::result::Result<String, NameFormatError> {
    let mut out = String::with_capacity(template.len() + surname.len() + forename.len());
    let mut chars = template.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        match c {
            '{' if matches!(chars.peek(), Some((_, '{'))) => {
                chars.next();
                out.push('{');
            }
            '{' => {
                let mut placeholder = String::new();
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    placeholder.push(c);
                }
                if !closed {
                    return Err(NameFormatError::UnbalancedBrace(pos));
                }
                match placeholder.trim() {
                    "surname" => out.push_str(surname),
                    "forename" => out.push_str(forename),
                    _ => return Err(NameFormatError::UnknownPlaceholder(placeholder)),
                }
            }
            '}' if matches!(chars.peek(), Some((_, '}'))) => {
                chars.next();
                out.push('}');
            }
            '}' => return Err(NameFormatError::UnbalancedBrace(pos)),
            c => out.push(c),
        }
    }

    Ok(out)
}

/// Render a display name, falling back to the default template on error.
///
/// A member without a forename is shown by surname alone.
pub fn display_name(template: &str, surname: &str, forename: &str) -> String {
    if forename.is_empty() {
        return surname.to_string();
    }
    match format_name(template, surname, forename) {
        Ok(name) => name,
        Err(e) => {
            tracing::debug!("Name format '{}' rejected: {}. Using default.", template, e);
            format!("{},{}", surname, forename)
        }
    }
}

impl MemberInfo {
    /// Display name using [`DEFAULT_NAME_FORMAT`]
    pub fn name(&self) -> String {
        display_name(DEFAULT_NAME_FORMAT, &self.surname, &self.forename)
    }

    /// Display name using the template configured in `config`
    pub fn name_with(&self, config: &Config) -> String {
        let template = config.get_or(keys::NAME_FORMAT, DEFAULT_NAME_FORMAT);
        display_name(&template, &self.surname, &self.forename)
    }
}
