//! `%(key)s` interpolation against a scope.
//!
//! Supported conversions: `s` (display), `r` (quoted), `d`/`i` (integer).
//! `%%` is a literal percent. A `%` not followed by `(` or `%` is copied
//! through unchanged.

use super::types::{Scope, Value};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum TemplateError {
    InvalidFormat(String),
    UnknownKey { key: String, available: Vec<String> },
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateError::InvalidFormat(detail) => {
                write!(f, "Expression has invalid format: {}", detail)
            }
            TemplateError::UnknownKey { key, available } => {
                let quoted: Vec<String> = available
                    .iter()
                    .map(|k| Value::str(k.as_str()).repr())
                    .collect();
                write!(
                    f,
                    "No key {} for format, available keys are: [{}]",
                    Value::str(key.as_str()).repr(),
                    quoted.join(", ")
                )
            }
        }
    }
}

/// Render `template`, substituting every `%(key)X` from `scope`.
pub fn render(template: &str, scope: &Scope) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        if let Some(tail) = after.strip_prefix('%') {
            out.push('%');
            rest = tail;
            continue;
        }
        let Some(tail) = after.strip_prefix('(') else {
            out.push('%');
            rest = after;
            continue;
        };
        let close = tail
            .find(')')
            .ok_or_else(|| TemplateError::InvalidFormat(format!("unclosed key in {:?}", template)))?;
        let key = &tail[..close];
        let mut chars = tail[close + 1..].chars();
        let conversion = chars.next().ok_or_else(|| {
            TemplateError::InvalidFormat(format!("missing conversion after %({})", key))
        })?;
        let value = scope.get(key).ok_or_else(|| unknown_key(key, scope))?;
        out.push_str(&convert(key, value, conversion)?);
        rest = chars.as_str();
    }
    out.push_str(rest);
    Ok(out)
}

fn convert(key: &str, value: &Value, conversion: char) -> Result<String, TemplateError> {
    match conversion {
        's' => Ok(value.to_string()),
        'r' => Ok(value.repr()),
        'd' | 'i' => match value {
            Value::Int(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(i64::from(*b).to_string()),
            other => Err(TemplateError::InvalidFormat(format!(
                "%({}){} needs a number, got a {}",
                key,
                conversion,
                other.kind()
            ))),
        },
        other => Err(TemplateError::InvalidFormat(format!(
            "unsupported conversion '{}' for key {:?}",
            other, key
        ))),
    }
}

fn unknown_key(key: &str, scope: &Scope) -> TemplateError {
    let mut available: Vec<String> = scope.keys().cloned().collect();
    available.sort();
    TemplateError::UnknownKey {
        key: key.to_string(),
        available,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> Scope {
        let mut s = Scope::new();
        s.insert("name".to_string(), Value::str("world"));
        s.insert("count".to_string(), Value::Int(3));
        s.insert("dry_run".to_string(), Value::Bool(false));
        s
    }

    #[test]
    fn test_template_basic_substitution() {
        assert_eq!(
            render("hello %(name)s x%(count)d", &scope()).unwrap(),
            "hello world x3"
        );
        assert_eq!(render("%(name)r", &scope()).unwrap(), "'world'");
        assert_eq!(render("%(dry_run)s", &scope()).unwrap(), "False");
    }

    #[test]
    fn test_template_percent_handling() {
        assert_eq!(render("100%% done", &scope()).unwrap(), "100% done");
        assert_eq!(render("50% off", &scope()).unwrap(), "50% off");
        assert_eq!(render("trailing %", &scope()).unwrap(), "trailing %");
        assert_eq!(render("no markers", &scope()).unwrap(), "no markers");
    }

    #[test]
    fn test_template_unknown_key_lists_sorted() {
        let err = render("%(missing)s", &scope()).unwrap_err();
        assert_eq!(
            err,
            TemplateError::UnknownKey {
                key: "missing".to_string(),
                available: vec![
                    "count".to_string(),
                    "dry_run".to_string(),
                    "name".to_string()
                ],
            }
        );
        assert_eq!(
            err.to_string(),
            "No key 'missing' for format, available keys are: ['count', 'dry_run', 'name']"
        );
    }

    #[test]
    fn test_template_invalid_formats() {
        assert!(matches!(
            render("%(name", &scope()),
            Err(TemplateError::InvalidFormat(_))
        ));
        assert!(matches!(
            render("%(name)", &scope()),
            Err(TemplateError::InvalidFormat(_))
        ));
        assert!(matches!(
            render("%(name)q", &scope()),
            Err(TemplateError::InvalidFormat(_))
        ));
        assert!(matches!(
            render("%(name)d", &scope()),
            Err(TemplateError::InvalidFormat(_))
        ));
        assert!(render("%(name", &scope())
            .unwrap_err()
            .to_string()
            .starts_with("Expression has invalid format"));
    }

    #[test]
    fn test_template_list_value() {
        let mut s = Scope::new();
        s.insert(
            "files".to_string(),
            Value::Seq(vec![Value::str("a.c"), Value::str("b.c")]),
        );
        assert_eq!(render("%(files)s", &s).unwrap(), "['a.c', 'b.c']");
    }
}
