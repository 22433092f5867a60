//! Label-selector well-formedness checks.
//!
//! Syntax only: key/value charset and length rules plus requirement
//! operator arity. Matching semantics stay with the selector library that
//! evaluates these selectors against live objects.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;

const MAX_NAME_LEN: usize = 63;
const MAX_VALUE_LEN: usize = 63;
const MAX_PREFIX_LEN: usize = 253;

/// True when the selector carries neither match labels nor match
/// expressions, i.e. it could never select anything on purpose.
pub fn is_empty(sel: &LabelSelector) -> bool {
    sel.match_labels.as_ref().map_or(true, |m| m.is_empty())
        && sel.match_expressions.as_ref().map_or(true, |e| e.is_empty())
}

/// Validate the whole selector syntactically; the first violation is
/// returned as a human-readable message.
pub fn validate(sel: &LabelSelector) -> Result<(), String> {
    if let Some(labels) = &sel.match_labels {
        for (key, value) in labels {
            validate_key(key).map_err(|e| format!("key {key:?}: {e}"))?;
            validate_value(value).map_err(|e| format!("value {value:?} for key {key:?}: {e}"))?;
        }
    }
    if let Some(exprs) = &sel.match_expressions {
        for req in exprs {
            validate_key(&req.key).map_err(|e| format!("key {:?}: {e}", req.key))?;
            let arity = req.values.as_ref().map_or(0, Vec::len);
            match req.operator.as_str() {
                "In" | "NotIn" => {
                    if arity == 0 {
                        return Err(format!(
                            "operator {:?} requires at least one value",
                            req.operator
                        ));
                    }
                }
                "Exists" | "DoesNotExist" => {
                    if arity != 0 {
                        return Err(format!("operator {:?} does not take values", req.operator));
                    }
                }
                other => return Err(format!("{other:?} is not a valid selector operator")),
            }
            for value in req.values.iter().flatten() {
                validate_value(value)
                    .map_err(|e| format!("value {value:?} for key {:?}: {e}", req.key))?;
            }
        }
    }
    Ok(())
}

/// Label keys are qualified names: an optional DNS-1123 subdomain prefix,
/// a single `/`, and a 63-char name part.
fn validate_key(key: &str) -> Result<(), String> {
    let (prefix, name) = match key.split_once('/') {
        Some((p, n)) => (Some(p), n),
        None => (None, key),
    };
    if name.contains('/') {
        return Err("at most one \"/\" is allowed".to_string());
    }
    if let Some(prefix) = prefix {
        if !is_dns1123_subdomain(prefix) {
            return Err("prefix part must be a DNS-1123 subdomain".to_string());
        }
    }
    if name.is_empty() {
        return Err("name part must be non-empty".to_string());
    }
    if name.len() > MAX_NAME_LEN {
        return Err(format!("name part must be at most {MAX_NAME_LEN} characters"));
    }
    if !is_label_body(name) {
        return Err(
            "name part must consist of alphanumerics, '-', '_' or '.', starting and ending \
             with an alphanumeric"
                .to_string(),
        );
    }
    Ok(())
}

/// Label values may be empty; non-empty values follow the same charset
/// rule as key name parts.
fn validate_value(value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Ok(());
    }
    if value.len() > MAX_VALUE_LEN {
        return Err(format!("must be at most {MAX_VALUE_LEN} characters"));
    }
    if !is_label_body(value) {
        return Err(
            "must consist of alphanumerics, '-', '_' or '.', starting and ending with an \
             alphanumeric"
                .to_string(),
        );
    }
    Ok(())
}

fn is_label_body(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.first().is_some_and(|b| b.is_ascii_alphanumeric())
        && bytes.last().is_some_and(|b| b.is_ascii_alphanumeric())
        && bytes
            .iter()
            .all(|&b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}

fn is_dns1123_subdomain(s: &str) -> bool {
    if s.is_empty() || s.len() > MAX_PREFIX_LEN {
        return false;
    }
    s.split('.').all(|label| {
        let bytes = label.as_bytes();
        !bytes.is_empty()
            && bytes.len() <= MAX_NAME_LEN
            && bytes.first().is_some_and(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
            && bytes.last().is_some_and(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
            && bytes
                .iter()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
    })
}
