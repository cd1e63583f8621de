//! Parsing JSON values against a schema.
//!
//! Absent input (a missing object key) is modelled as `None` all the way
//! down, which is what lets optional, default and catch wrappers behave
//! differently for "missing" and "null".

use serde_json::{Map, Value};

use crate::error::{Issue, IssueCode, ParseError};
use crate::schema::{ObjectSchema, Schema, SchemaDef, UnknownKeys};
use crate::types::{child_path, json_type_name};

type Parsed = Result<Option<Value>, Vec<Issue>>;

impl Schema {
    /// Parse `input`, returning the validated (and stripped) value.
    ///
    /// # Errors
    ///
    /// Returns `ParseError` with every issue found in the input.
    pub fn parse(&self, input: &Value) -> Result<Value, ParseError> {
        parse_node(self, Some(input), "")
            .map(|value| value.unwrap_or(Value::Null))
            .map_err(|issues| ParseError { issues })
    }

    /// True when `input` parses without issues.
    pub fn is_valid(&self, input: &Value) -> bool {
        parse_node(self, Some(input), "").is_ok()
    }
}

fn parse_node(schema: &Schema, input: Option<&Value>, path: &str) -> Parsed {
    let def = schema.def();
    match &*def {
        SchemaDef::Optional(inner) => match input {
            None => Ok(None),
            Some(_) => parse_node(inner, input, path),
        },
        SchemaDef::Nullable(inner) => match input {
            Some(Value::Null) => Ok(Some(Value::Null)),
            _ => parse_node(inner, input, path),
        },
        SchemaDef::Default(inner, fallback) => match input {
            None => Ok(Some(fallback.clone())),
            Some(_) => parse_node(inner, input, path),
        },
        SchemaDef::Catch(inner, fallback) => {
            parse_node(inner, input, path).or_else(|_| Ok(Some(fallback.clone())))
        }
        SchemaDef::Lazy(_) => match schema.concrete_target() {
            Some(target) => parse_node(&target, input, path),
            // A lazy chain that loops back on itself matches nothing.
            None => parse_node(&Schema::never(), input, path),
        },
        SchemaDef::Unknown => Ok(input.cloned()),
        SchemaDef::Union(options) => parse_union(options, input, path),
        SchemaDef::Intersection(left, right) => parse_intersection(left, right, input, path),
        other => match input {
            Some(value) => parse_present(other, value, path),
            None => Err(vec![invalid_type(path, expected_name(other), "undefined")]),
        },
    }
}

fn parse_present(def: &SchemaDef, value: &Value, path: &str) -> Parsed {
    match def {
        SchemaDef::Boolean if value.is_boolean() => Ok(Some(value.clone())),
        SchemaDef::String if value.is_string() => Ok(Some(value.clone())),
        SchemaDef::Number if value.is_number() => Ok(Some(value.clone())),
        SchemaDef::Date => parse_date(value, path),
        SchemaDef::Literal(expected) => {
            if value == expected {
                Ok(Some(value.clone()))
            } else {
                Err(vec![Issue::new(
                    path,
                    IssueCode::InvalidLiteral,
                    format!("expected literal {}, received {}", expected, value),
                )])
            }
        }
        SchemaDef::Custom(custom) => {
            if custom.check(value) {
                Ok(Some(value.clone()))
            } else {
                Err(vec![Issue::new(
                    path,
                    IssueCode::Custom,
                    format!("value does not satisfy {}", custom.name()),
                )])
            }
        }
        SchemaDef::Object(object) => parse_object(object, value, path),
        SchemaDef::Tuple(items) => parse_tuple(items, value, path),
        SchemaDef::Array(element) => parse_array(element, value, path),
        SchemaDef::Record(key, item) => parse_record(key, item, value, path),
        other => Err(vec![invalid_type(
            path,
            expected_name(other),
            json_type_name(value),
        )]),
    }
}

fn parse_date(value: &Value, path: &str) -> Parsed {
    let Some(text) = value.as_str() else {
        return Err(vec![invalid_type(path, "date", json_type_name(value))]);
    };
    match chrono::DateTime::parse_from_rfc3339(text) {
        Ok(_) => Ok(Some(value.clone())),
        Err(e) => Err(vec![Issue::new(
            path,
            IssueCode::InvalidDate,
            format!("invalid date \"{}\": {}", text, e),
        )]),
    }
}

fn parse_object(object: &ObjectSchema, value: &Value, path: &str) -> Parsed {
    let Value::Object(map) = value else {
        return Err(vec![invalid_type(path, "object", json_type_name(value))]);
    };

    let mut output = Map::new();
    let mut issues = Vec::new();

    for (key, field) in object.shape() {
        match parse_node(field, map.get(key), &child_path(path, key)) {
            Ok(Some(parsed)) => {
                output.insert(key.clone(), parsed);
            }
            Ok(None) => {}
            Err(mut field_issues) => issues.append(&mut field_issues),
        }
    }

    let unknown: Vec<&String> = map
        .keys()
        .filter(|key| !object.shape().contains_key(*key))
        .collect();

    match object.unknown_keys() {
        UnknownKeys::Strip => {}
        UnknownKeys::Strict => {
            if !unknown.is_empty() {
                let names: Vec<String> = unknown.iter().map(|k| format!("\"{}\"", k)).collect();
                issues.push(Issue::new(
                    path,
                    IssueCode::UnrecognizedKeys,
                    format!("unrecognized key(s) in object: {}", names.join(", ")),
                ));
            }
        }
        UnknownKeys::Passthrough => {
            for key in unknown {
                output.insert(key.clone(), map[key].clone());
            }
        }
    }

    if issues.is_empty() {
        Ok(Some(Value::Object(output)))
    } else {
        Err(issues)
    }
}

/// First matching alternative wins.
fn parse_union(options: &[Schema], input: Option<&Value>, path: &str) -> Parsed {
    let mut union_errors = Vec::with_capacity(options.len());
    for option in options {
        match parse_node(option, input, path) {
            Ok(parsed) => return Ok(parsed),
            Err(issues) => union_errors.push(issues),
        }
    }

    let mut issue = Issue::new(
        path,
        IssueCode::InvalidUnion,
        format!("no union alternative matched ({} tried)", options.len()),
    );
    issue.union_errors = union_errors;
    Err(vec![issue])
}

fn parse_intersection(left: &Schema, right: &Schema, input: Option<&Value>, path: &str) -> Parsed {
    let (left, right) = match (
        parse_node(left, input, path),
        parse_node(right, input, path),
    ) {
        (Ok(left), Ok(right)) => (left, right),
        (Err(mut left), Err(mut right)) => {
            left.append(&mut right);
            return Err(left);
        }
        (Err(issues), _) | (_, Err(issues)) => return Err(issues),
    };

    match (left, right) {
        (Some(Value::Object(mut left)), Some(Value::Object(right))) => {
            left.extend(right);
            Ok(Some(Value::Object(left)))
        }
        (left, right) if left == right => Ok(left),
        _ => Err(vec![Issue::new(
            path,
            IssueCode::InvalidIntersectionTypes,
            "intersection results could not be merged",
        )]),
    }
}

fn parse_tuple(items: &[Schema], value: &Value, path: &str) -> Parsed {
    let Value::Array(values) = value else {
        return Err(vec![invalid_type(path, "tuple", json_type_name(value))]);
    };
    if values.len() > items.len() {
        return Err(vec![Issue::new(
            path,
            IssueCode::TooBig,
            format!(
                "expected at most {} item(s), received {}",
                items.len(),
                values.len()
            ),
        )]);
    }

    let mut output = Vec::with_capacity(values.len());
    let mut issues = Vec::new();
    for (i, item) in items.iter().enumerate() {
        let item_path = child_path(path, &i.to_string());
        match parse_node(item, values.get(i), &item_path) {
            Ok(Some(parsed)) => output.push(parsed),
            Ok(None) if i < values.len() => output.push(Value::Null),
            Ok(None) => {}
            Err(mut item_issues) => issues.append(&mut item_issues),
        }
    }

    if issues.is_empty() {
        Ok(Some(Value::Array(output)))
    } else {
        Err(issues)
    }
}

fn parse_array(element: &Schema, value: &Value, path: &str) -> Parsed {
    let Value::Array(values) = value else {
        return Err(vec![invalid_type(path, "array", json_type_name(value))]);
    };

    let mut output = Vec::with_capacity(values.len());
    let mut issues = Vec::new();
    for (i, item) in values.iter().enumerate() {
        match parse_node(element, Some(item), &child_path(path, &i.to_string())) {
            Ok(parsed) => output.push(parsed.unwrap_or(Value::Null)),
            Err(mut item_issues) => issues.append(&mut item_issues),
        }
    }

    if issues.is_empty() {
        Ok(Some(Value::Array(output)))
    } else {
        Err(issues)
    }
}

fn parse_record(key: &Schema, item: &Schema, value: &Value, path: &str) -> Parsed {
    let Value::Object(map) = value else {
        return Err(vec![invalid_type(path, "record", json_type_name(value))]);
    };

    let mut output = Map::new();
    let mut issues = Vec::new();
    for (name, entry) in map {
        let entry_path = child_path(path, name);
        if let Err(mut key_issues) = parse_node(key, Some(&Value::String(name.clone())), &entry_path)
        {
            issues.append(&mut key_issues);
            continue;
        }
        match parse_node(item, Some(entry), &entry_path) {
            Ok(Some(parsed)) => {
                output.insert(name.clone(), parsed);
            }
            Ok(None) => {}
            Err(mut entry_issues) => issues.append(&mut entry_issues),
        }
    }

    if issues.is_empty() {
        Ok(Some(Value::Object(output)))
    } else {
        Err(issues)
    }
}

fn invalid_type(path: &str, expected: &str, received: &str) -> Issue {
    Issue::new(
        path,
        IssueCode::InvalidType,
        format!("expected {}, received {}", expected, received),
    )
}

fn expected_name(def: &SchemaDef) -> &str {
    match def {
        SchemaDef::Custom(custom) => custom.name(),
        other => other.kind().as_str(),
    }
}
