//! Schema-driven property transcoding
//!
//! Entries store property values in a raw, schema-aligned form; applications
//! work with a parsed key/value form. [`parsed_to_raw`] validates parsed
//! input against a template or group schema and produces raw values,
//! recursing through group pointers. [`raw_to_parsed`] builds the dual view.
//!
//! Validation fails fast: the first offending property aborts the whole
//! conversion with [`Error::Validation`] carrying a dotted `level` path.

use crate::error::{Error, Result};
use crate::types::{
    Group, JsonMap, Prop, PropType, PropValue, PropValueData, PropValueGroupData,
    PropValueGroupItem,
};
use serde_json::{json, Value};
use std::collections::HashMap;

/// Group lookup table keyed by group id
pub fn group_index(groups: &[Group]) -> HashMap<&str, &Group> {
    groups.iter().map(|g| (g.id.as_str(), g)).collect()
}

/// Convert parsed key/value properties into raw schema-aligned values
///
/// `old_values` supplies previous raw values for optional keys absent from
/// `parsed`; `level` is the dotted path prefix used in validation errors.
/// Parsed keys not present in the schema are dropped.
pub fn parsed_to_raw(
    parsed: &JsonMap,
    schema: &[Prop],
    old_values: &[PropValue],
    groups: &HashMap<&str, &Group>,
    level: &str,
) -> Result<Vec<PropValue>> {
    let mut props = Vec::with_capacity(schema.len());
    for prop in schema {
        let Some(value) = parsed.get(&prop.name) else {
            if prop.required {
                return Err(Error::validation(
                    level,
                    format!("Missing value for required property \"{}\"", prop.name),
                ));
            }
            let data = match old_values.iter().find(|v| v.id == prop.id) {
                Some(old) => old.data.clone(),
                None => empty_state(prop)?,
            };
            props.push(PropValue {
                id: prop.id.clone(),
                data,
            });
            continue;
        };
        let path = format!("{}.{}", level, prop.name);
        let data = match prop.kind {
            PropType::Boolean | PropType::Number | PropType::String => {
                scalar_values(prop, value, &path)?
            }
            PropType::Enumeration => enum_values(prop, value, &path)?,
            PropType::Date => date_values(prop, value, &path)?,
            PropType::EntryPointer => entry_pointer_values(prop, value, &path)?,
            PropType::GroupPointer => {
                group_pointer_values(prop, value, old_values, groups, level)?
            }
            PropType::Media => media_values(prop, value, &path)?,
            PropType::RichText => rich_text_values(prop, value, &path)?,
        };
        props.push(PropValue {
            id: prop.id.clone(),
            data,
        });
    }
    Ok(props)
}

/// Convert raw schema-aligned values back into the parsed key/value form
///
/// Scalar one-element arrays unwrap; group pointers recurse; empty-state
/// values leave their key absent.
pub fn raw_to_parsed(
    values: &[PropValue],
    schema: &[Prop],
    groups: &HashMap<&str, &Group>,
    level: &str,
) -> Result<JsonMap> {
    let mut parsed = JsonMap::new();
    for prop in schema {
        let Some(value) = values.iter().find(|v| v.id == prop.id) else {
            continue;
        };
        let path = format!("{}.{}", level, prop.name);
        match (&value.data, prop.kind) {
            (PropValueData::Group(group_data), PropType::GroupPointer) => {
                let group = groups.get(group_data.group_id.as_str()).ok_or_else(|| {
                    Error::validation(
                        &path,
                        format!("group with ID \"{}\" does not exist", group_data.group_id),
                    )
                })?;
                let mut items = Vec::with_capacity(group_data.items.len());
                for (j, item) in group_data.items.iter().enumerate() {
                    items.push(Value::Object(raw_to_parsed(
                        &item.props,
                        &group.props,
                        groups,
                        &format!("{}.{}.{}", level, j, prop.name),
                    )?));
                }
                if items.is_empty() {
                    continue;
                }
                let rendered = if prop.array {
                    Value::Array(items)
                } else {
                    items.swap_remove(0)
                };
                parsed.insert(prop.name.clone(), rendered);
            }
            (PropValueData::Items(items), _) => {
                if items.is_empty() {
                    continue;
                }
                let rendered: Vec<Value> =
                    items.iter().map(|item| unwire_item(prop, item)).collect();
                let rendered = if prop.array {
                    Value::Array(rendered)
                } else {
                    rendered.into_iter().next().unwrap_or(Value::Null)
                };
                parsed.insert(prop.name.clone(), rendered);
            }
            (PropValueData::Group(_), _) => {
                return Err(Error::validation(
                    &path,
                    "group value stored for a non-group property",
                ));
            }
        }
    }
    Ok(parsed)
}

fn unwire_item(prop: &Prop, item: &Value) -> Value {
    match prop.kind {
        PropType::EntryPointer => {
            let eid = item.get("eid").cloned().unwrap_or(Value::Null);
            let tid = item.get("tid").cloned().unwrap_or(Value::Null);
            json!({ "entryId": eid, "templateId": tid })
        }
        PropType::Media => {
            let mut out = JsonMap::new();
            if let Some(id) = item.get("_id") {
                out.insert("mediaId".to_string(), id.clone());
            }
            if let Some(alt) = item.get("alt_text") {
                if !alt.is_null() {
                    out.insert("altText".to_string(), alt.clone());
                }
            }
            if let Some(caption) = item.get("caption") {
                if !caption.is_null() {
                    out.insert("caption".to_string(), caption.clone());
                }
            }
            Value::Object(out)
        }
        _ => item.clone(),
    }
}

fn empty_state(prop: &Prop) -> Result<PropValueData> {
    if prop.kind == PropType::GroupPointer {
        let pointer = prop.data.prop_group_pointer.as_ref().ok_or_else(|| {
            Error::validation(
                &prop.name,
                "property of type group pointer is missing data object",
            )
        })?;
        return Ok(PropValueData::Group(PropValueGroupData {
            group_id: pointer.group_id.clone(),
            items: vec![],
        }));
    }
    Ok(PropValueData::Items(vec![]))
}

fn js_type_name(kind: PropType) -> &'static str {
    match kind {
        PropType::Boolean => "boolean",
        PropType::Number => "number",
        _ => "string",
    }
}

fn matches_js_type(kind: PropType, value: &Value) -> bool {
    match kind {
        PropType::Boolean => value.is_boolean(),
        PropType::Number => value.is_number(),
        _ => value.is_string(),
    }
}

fn as_array<'a>(value: &'a Value, path: &str, of: &str) -> Result<&'a Vec<Value>> {
    value
        .as_array()
        .ok_or_else(|| Error::validation(path, format!("must be an array of {}", of)))
}

fn scalar_values(prop: &Prop, value: &Value, path: &str) -> Result<PropValueData> {
    let js_type = js_type_name(prop.kind);
    if prop.array {
        let items = as_array(value, path, js_type)?;
        if let Some(idx) = items.iter().position(|e| !matches_js_type(prop.kind, e)) {
            return Err(Error::validation(
                path,
                format!("item at index \"{}\" is not {}", idx, js_type),
            ));
        }
        return Ok(PropValueData::Items(items.clone()));
    }
    if !matches_js_type(prop.kind, value) {
        return Err(Error::validation(path, format!("must be a {}", js_type)));
    }
    Ok(PropValueData::Items(vec![value.clone()]))
}

fn enum_values(prop: &Prop, value: &Value, path: &str) -> Result<PropValueData> {
    let prop_enum = prop.data.prop_enum.as_ref().ok_or_else(|| {
        Error::validation(path, "failed to find enumeration information for this property")
    })?;
    let check_member = |item: &str, item_path: &str| -> Result<()> {
        if !prop_enum.items.iter().any(|e| e == item) {
            return Err(Error::validation(
                item_path,
                format!(
                    "item value \"{}\" is not allowed. Allowed values: {}",
                    item,
                    prop_enum.items.join(", ")
                ),
            ));
        }
        Ok(())
    };
    if prop.array {
        let items = as_array(value, path, "string")?;
        for (j, item) in items.iter().enumerate() {
            let item = item.as_str().ok_or_else(|| {
                Error::validation(path, format!("item at index \"{}\" is not string", j))
            })?;
            check_member(item, &format!("{}.{}", path, j))?;
        }
        return Ok(PropValueData::Items(items.clone()));
    }
    let item = value
        .as_str()
        .ok_or_else(|| Error::validation(path, "must be a string"))?;
    check_member(item, path)?;
    Ok(PropValueData::Items(vec![value.clone()]))
}

fn is_date_object(value: &Value) -> bool {
    value.get("timestamp").map(Value::is_number) == Some(true)
        && value.get("timezoneOffset").map(Value::is_number) == Some(true)
}

fn date_values(prop: &Prop, value: &Value, path: &str) -> Result<PropValueData> {
    let shape = "{timestamp: number, timezoneOffset: number}";
    if prop.array {
        let items = as_array(value, path, "objects")?;
        for (j, item) in items.iter().enumerate() {
            if !item.is_object() {
                return Err(Error::validation(
                    path,
                    format!("item at index \"{}\" is not object", j),
                ));
            }
            if !is_date_object(item) {
                return Err(Error::validation(
                    format!("{}.{}", path, j),
                    format!("item value \"{}\" is not allowed. It must be formated: {}", item, shape),
                ));
            }
        }
        return Ok(PropValueData::Items(items.clone()));
    }
    if !value.is_object() {
        return Err(Error::validation(path, "must be an object"));
    }
    if !is_date_object(value) {
        return Err(Error::validation(
            path,
            format!("value \"{}\" is not allowed. It must be formated: {}", value, shape),
        ));
    }
    Ok(PropValueData::Items(vec![value.clone()]))
}

fn entry_pointer_raw(value: &Value, path: &str) -> Result<Value> {
    let entry_id = value.get("entryId").and_then(Value::as_str);
    let template_id = value.get("templateId").and_then(Value::as_str);
    match (entry_id, template_id) {
        (Some(eid), Some(tid)) => Ok(json!({ "eid": eid, "tid": tid })),
        _ => Err(Error::validation(
            path,
            format!(
                "item value \"{}\" is not allowed. It must be formated: {{entryId: string, templateId: string}}",
                value
            ),
        )),
    }
}

fn entry_pointer_values(prop: &Prop, value: &Value, path: &str) -> Result<PropValueData> {
    if prop.array {
        let items = as_array(value, path, "objects")?;
        let mut data = Vec::with_capacity(items.len());
        for (j, item) in items.iter().enumerate() {
            if !item.is_object() {
                return Err(Error::validation(
                    path,
                    format!("item at index \"{}\" is not object", j),
                ));
            }
            data.push(entry_pointer_raw(item, &format!("{}.{}", path, j))?);
        }
        return Ok(PropValueData::Items(data));
    }
    if !value.is_object() {
        return Err(Error::validation(path, "must be an object"));
    }
    Ok(PropValueData::Items(vec![entry_pointer_raw(value, path)?]))
}

fn media_raw(value: &Value, path: &str) -> Result<Value> {
    let media_id = value
        .get("mediaId")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            Error::validation(path, "object is missing required property \"mediaId\"")
        })?;
    let mut out = JsonMap::new();
    out.insert("_id".to_string(), Value::String(media_id.to_string()));
    if let Some(alt) = value.get("altText") {
        out.insert("alt_text".to_string(), alt.clone());
    }
    if let Some(caption) = value.get("caption") {
        out.insert("caption".to_string(), caption.clone());
    }
    Ok(Value::Object(out))
}

fn media_values(prop: &Prop, value: &Value, path: &str) -> Result<PropValueData> {
    if prop.array {
        let items = as_array(value, path, "object")?;
        let mut data = Vec::with_capacity(items.len());
        for (j, item) in items.iter().enumerate() {
            if !item.is_object() {
                return Err(Error::validation(
                    path,
                    format!("item at index \"{}\" is not object", j),
                ));
            }
            data.push(media_raw(item, &format!("{}.{}", path, j))?);
        }
        return Ok(PropValueData::Items(data));
    }
    if !value.is_object() {
        return Err(Error::validation(path, "must be an object"));
    }
    Ok(PropValueData::Items(vec![media_raw(value, path)?]))
}

fn has_nodes_array(value: &Value) -> bool {
    value.get("nodes").map(Value::is_array) == Some(true)
}

fn rich_text_values(prop: &Prop, value: &Value, path: &str) -> Result<PropValueData> {
    let missing = "object is missing required property \"nodes\" of type object array";
    if prop.array {
        let items = as_array(value, path, "object")?;
        for (j, item) in items.iter().enumerate() {
            if !item.is_object() {
                return Err(Error::validation(
                    path,
                    format!("item at index \"{}\" is not object", j),
                ));
            }
            if !has_nodes_array(item) {
                return Err(Error::validation(format!("{}.{}", path, j), missing));
            }
        }
        return Ok(PropValueData::Items(items.clone()));
    }
    if !value.is_object() {
        return Err(Error::validation(path, "must be an object"));
    }
    if !has_nodes_array(value) {
        return Err(Error::validation(path, missing));
    }
    Ok(PropValueData::Items(vec![value.clone()]))
}

fn group_pointer_values(
    prop: &Prop,
    value: &Value,
    old_values: &[PropValue],
    groups: &HashMap<&str, &Group>,
    level: &str,
) -> Result<PropValueData> {
    let path = format!("{}.{}", level, prop.name);
    let pointer = prop.data.prop_group_pointer.as_ref().ok_or_else(|| {
        Error::validation(&path, "failed to find group pointer information for this property")
    })?;
    let group = groups.get(pointer.group_id.as_str()).ok_or_else(|| {
        Error::validation(
            &path,
            format!("group with ID \"{}\" does not exist", pointer.group_id),
        )
    })?;
    let empty = vec![];
    let old_items = old_values
        .iter()
        .find(|v| v.id == prop.id)
        .and_then(|v| match &v.data {
            PropValueData::Group(g) => Some(&g.items),
            PropValueData::Items(_) => None,
        })
        .unwrap_or(&empty);
    let old_props_at = |j: usize| -> &[PropValue] {
        old_items.get(j).map(|i| i.props.as_slice()).unwrap_or(&[])
    };
    if prop.array {
        let items = as_array(value, &path, "objects")?;
        let mut group_items = Vec::with_capacity(items.len());
        for (j, item) in items.iter().enumerate() {
            let item = item.as_object().ok_or_else(|| {
                Error::validation(&path, format!("item at index \"{}\" is not object", j))
            })?;
            group_items.push(PropValueGroupItem {
                props: parsed_to_raw(
                    item,
                    &group.props,
                    old_props_at(j),
                    groups,
                    &format!("{}.{}.{}", level, j, prop.name),
                )?,
            });
        }
        return Ok(PropValueData::Group(PropValueGroupData {
            group_id: pointer.group_id.clone(),
            items: group_items,
        }));
    }
    let item = value
        .as_object()
        .ok_or_else(|| Error::validation(&path, "must be an object"))?;
    Ok(PropValueData::Group(PropValueGroupData {
        group_id: group.id.clone(),
        items: vec![PropValueGroupItem {
            props: parsed_to_raw(item, &group.props, old_props_at(0), groups, &path)?,
        }],
    }))
}
