//! Tag attribute parameters
//!
//! `data-*` attributes of a host tag become typed positional parameters
//! for the init hook and values for content URL placeholders.

use std::collections::BTreeMap;
use std::ops::Range;

use sdc_dom::ElementData;

use crate::value::Value;

/// Data key that never reaches parameter lists
pub const RESERVED_DATA_KEY: &str = "_controller_";

const JSON_MODEL_PREFIX: &str = "SDC_JSON_MODEL=";
const UNDEFINED: &str = "undefined";

/// `user-id` -> `userId`
pub fn camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper = false;
    for c in key.chars() {
        if c == '-' {
            upper = true;
        } else if upper && c.is_ascii_lowercase() {
            out.push(c.to_ascii_uppercase());
            upper = false;
        } else {
            if upper {
                out.push('-');
                upper = false;
            }
            out.push(c);
        }
    }
    if upper {
        out.push('-');
    }
    out
}

/// `MainView` -> `main-view`
pub fn kebab_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('-');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// The `data-*` attributes of an element keyed by camel-cased name
pub fn data_map(elem: &ElementData) -> BTreeMap<String, String> {
    elem.data_attrs()
        .map(|(key, value)| (camel_case(key), value.to_string()))
        .collect()
}

fn is_int(raw: &str) -> bool {
    let digits = raw.strip_prefix('-').unwrap_or(raw);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

fn is_float(raw: &str) -> bool {
    let digits = raw.strip_prefix('-').unwrap_or(raw);
    match digits.split_once('.') {
        Some((whole, frac)) => {
            !whole.is_empty()
                && !frac.is_empty()
                && whole.bytes().all(|b| b.is_ascii_digit())
                && frac.bytes().all(|b| b.is_ascii_digit())
        }
        None => digits.len() >= 2 && digits.bytes().all(|b| b.is_ascii_digit()),
    }
}

fn unquote(raw: &str) -> Option<&str> {
    let quote = raw.chars().next().filter(|c| *c == '\'' || *c == '"')?;
    let inner = raw.strip_prefix(quote)?.strip_suffix(quote)?;
    (!inner.contains(quote)).then_some(inner)
}

/// Coerce a raw attribute string into a typed value
pub fn coerce(raw: &str) -> Value {
    match raw {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        UNDEFINED => return Value::Undefined,
        _ if raw.eq_ignore_ascii_case("null") || raw.eq_ignore_ascii_case("none") => return Value::Null,
        _ => {}
    }
    if is_int(raw) {
        if let Ok(n) = raw.parse::<i64>() {
            return Value::Int(n);
        }
    }
    if is_int(raw) || is_float(raw) {
        if let Ok(n) = raw.parse::<f64>() {
            return Value::Float(n);
        }
    }
    if let Some(inner) = unquote(raw) {
        return Value::Str(inner.to_string());
    }
    Value::Str(raw.to_string())
}

/// Coerce, letting a property of the parent component named by the raw
/// string take precedence
pub fn coerce_with(raw: &str, lookup: Option<&dyn Fn(&str) -> Option<Value>>) -> Value {
    lookup
        .and_then(|lookup| lookup(raw))
        .unwrap_or_else(|| coerce(raw))
}

/// Expand `SDC_JSON_MODEL=[{"pk": .., "fields": {..}}]` into an object of
/// the fields plus `id` and `pk`
pub fn parse_json_model(raw: &str) -> Option<Value> {
    let body = raw.strip_prefix(JSON_MODEL_PREFIX)?;
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    let record = match json {
        serde_json::Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
        other @ serde_json::Value::Object(_) => other,
        _ => return None,
    };
    let pk = record.get("pk").cloned().map(Value::from).unwrap_or(Value::Undefined);
    let mut object = match record.get("fields").cloned().map(Value::from) {
        Some(Value::Object(fields)) => fields,
        _ => BTreeMap::new(),
    };
    object.insert("id".to_string(), pk.clone());
    object.insert("pk".to_string(), pk);
    Some(Value::Object(object))
}

/// Resolved parameter list: one value per declared name, then the
/// aggregate of unclaimed attributes
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Params {
    names: Vec<String>,
    values: Vec<Value>,
}

impl Params {
    /// Bind the element's data attributes to `names`
    pub fn resolve(
        elem: Option<&ElementData>,
        names: &[String],
        lookup: Option<&dyn Fn(&str) -> Option<Value>>,
    ) -> Self {
        let data = elem.map(data_map).unwrap_or_default();
        let mut values: Vec<Value> = names
            .iter()
            .map(|name| {
                let raw = data.get(name).map(String::as_str).unwrap_or(UNDEFINED);
                coerce_with(raw, lookup)
            })
            .collect();

        let rest = data
            .iter()
            .filter(|(key, _)| key.as_str() != RESERVED_DATA_KEY && !names.contains(key))
            .map(|(key, raw)| {
                let value = parse_json_model(raw).unwrap_or_else(|| coerce(raw));
                (key.clone(), value)
            })
            .collect();
        values.push(Value::Object(rest));

        Self {
            names: names.to_vec(),
            values,
        }
    }

    /// Value bound to a declared name
    pub fn get(&self, name: &str) -> Option<&Value> {
        let index = self.names.iter().position(|n| n == name)?;
        self.values.get(index)
    }

    /// Value at a position (the aggregate is last)
    pub fn positional(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// All values, aggregate included
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Declared values only
    pub fn declared(&self) -> &[Value] {
        &self.values[..self.names.len()]
    }

    /// Attributes not claimed by a declared name
    pub fn rest(&self) -> &BTreeMap<String, Value> {
        static EMPTY: BTreeMap<String, Value> = BTreeMap::new();
        self.values.last().and_then(Value::as_object).unwrap_or(&EMPTY)
    }
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Locate `%(name)x` tokens, `x` being one word character
fn scan_placeholders(url: &str) -> Vec<(Range<usize>, &str)> {
    let mut found = Vec::new();
    let mut cursor = 0;
    while let Some(offset) = url[cursor..].find("%(") {
        let start = cursor + offset;
        let name_start = start + 2;
        let Some(close) = url[name_start..].find(')').map(|i| name_start + i) else {
            break;
        };
        let suffix = url[close + 1..].chars().next();
        match suffix {
            Some(c) if close > name_start && is_word_char(c) => {
                let end = close + 1 + c.len_utf8();
                found.push((start..end, &url[name_start..close]));
                cursor = end;
            }
            _ => cursor = name_start,
        }
    }
    found
}

/// Placeholder names in order of first appearance
pub fn url_placeholders(url: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for (_, name) in scan_placeholders(url) {
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Replace every placeholder of `names[i]` with `values[i]`
pub fn substitute_url(url: &str, names: &[String], values: &[Value]) -> String {
    let mut out = String::with_capacity(url.len());
    let mut last = 0;
    for (range, name) in scan_placeholders(url) {
        let Some(value) = names.iter().position(|n| n == name).and_then(|i| values.get(i)) else {
            continue;
        };
        out.push_str(&url[last..range.start]);
        out.push_str(&value.to_string());
        last = range.end;
    }
    out.push_str(&url[last..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_scalars() {
        assert_eq!(coerce("true"), Value::Bool(true));
        assert_eq!(coerce("false"), Value::Bool(false));
        assert_eq!(coerce("undefined"), Value::Undefined);
        assert_eq!(coerce("None"), Value::Null);
        assert_eq!(coerce("NULL"), Value::Null);
        assert_eq!(coerce("Null"), Value::Null);
        assert_eq!(coerce("-42"), Value::Int(-42));
        assert_eq!(coerce("3.25"), Value::Float(3.25));
        assert_eq!(coerce("1."), Value::Str("1.".into()));
        assert_eq!(coerce("'quoted'"), Value::Str("quoted".into()));
        assert_eq!(coerce("\"dq\""), Value::Str("dq".into()));
        assert_eq!(coerce("'a'b'"), Value::Str("'a'b'".into()));
        assert_eq!(coerce("hello"), Value::Str("hello".into()));
    }

    #[test]
    fn test_parent_property_wins() {
        let lookup = |name: &str| (name == "items").then(|| Value::Int(5));
        assert_eq!(coerce_with("items", Some(&lookup)), Value::Int(5));
        assert_eq!(coerce_with("7", Some(&lookup)), Value::Int(7));
    }

    #[test]
    fn test_camel_and_kebab_case() {
        assert_eq!(camel_case("user-id"), "userId");
        assert_eq!(camel_case("plain"), "plain");
        assert_eq!(kebab_case("MainViewController"), "main-view-controller");
    }

    #[test]
    fn test_resolve_params() {
        let mut elem = ElementData::new("my-tag");
        elem.set_attr("data-user-id", "4");
        elem.set_attr("data-title", "'Hi'");
        elem.set_attr("data-extra", "none");
        elem.set_attr("data-_controller_", "x");

        let names = vec!["userId".to_string(), "title".to_string(), "missing".to_string()];
        let params = Params::resolve(Some(&elem), &names, None);
        assert_eq!(params.get("userId"), Some(&Value::Int(4)));
        assert_eq!(params.get("title"), Some(&Value::Str("Hi".into())));
        assert_eq!(params.get("missing"), Some(&Value::Undefined));
        assert_eq!(params.values().len(), 4);
        assert_eq!(params.rest().len(), 1);
        assert_eq!(params.rest().get("extra"), Some(&Value::Null));
    }

    #[test]
    fn test_json_model() {
        let raw = r#"SDC_JSON_MODEL=[{"pk": 3, "fields": {"name": "n"}}]"#;
        let value = parse_json_model(raw).unwrap();
        assert_eq!(value.get("name"), Some(&Value::Str("n".into())));
        assert_eq!(value.get("id"), Some(&Value::Int(3)));
        assert_eq!(value.get("pk"), Some(&Value::Int(3)));
        assert!(parse_json_model("plain").is_none());
    }

    #[test]
    fn test_url_placeholders() {
        let url = "/view/%(id)s/page/%(page)i/%(id)s";
        assert_eq!(url_placeholders(url), vec!["id", "page"]);
        let resolved = substitute_url(
            url,
            &["id".into(), "page".into()],
            &[Value::Int(7), Value::Str("2".into())],
        );
        assert_eq!(resolved, "/view/7/page/2/7");
        assert!(url_placeholders("/plain/%(open").is_empty());
        assert!(url_placeholders("/x/%(id)").is_empty());
    }
}
