//! Translation between native payloads and the canonical model.
//!
//! Pure functions driven by [`PlatformMapping`] tables; no backend has its
//! own translator type.

use serde_json::{Map, Value};
use std::collections::HashSet;

use super::mapping::{FieldCodec, FieldMapping, IdPointer, PlatformMapping};
use super::marker::strip_marker;
use crate::core::{ErrorKind, Failure, Outcome};
use crate::model::{
    Backend, CanonicalState, CanonicalWorkItem, WorkItemDraft, WorkItemPatch, WorkItemType,
    STATE_OVERFLOW_KEY,
};

/// One write into a native document: a JSON pointer and its new value.
///
/// `Value::Null` clears the target.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeChange {
    /// RFC 6901 pointer into the native document.
    pub pointer: String,
    /// New value.
    pub value: Value,
}

impl NativeChange {
    fn new(pointer: impl Into<String>, value: Value) -> Self {
        Self {
            pointer: pointer.into(),
            value,
        }
    }
}

/// Reads a native work item into the canonical shape.
///
/// Fails with `Unknown` when the payload has no id or an unknown type.
pub fn to_canonical(native: &Value, backend: Backend) -> Outcome<CanonicalWorkItem> {
    let mapping = PlatformMapping::of(backend);

    let id = read_id(native, mapping.id)
        .ok_or_else(|| malformed(backend, format!("missing id at {}", mapping.id.pointer)))?;
    let version = read_id(native, mapping.version).unwrap_or_default();

    let item_type = match native.pointer(mapping.item_type).and_then(Value::as_str) {
        Some(name) => mapping
            .canonical_type(name)
            .ok_or_else(|| malformed(backend, format!("unknown work item type '{name}'")))?,
        None => mapping
            .default_type
            .ok_or_else(|| malformed(backend, format!("missing type at {}", mapping.item_type)))?,
    };

    let title = native
        .pointer(mapping.title)
        .and_then(Value::as_str)
        .unwrap_or_default();

    let mut item = CanonicalWorkItem::new(id, item_type, title, version);

    let status = native
        .pointer(mapping.state)
        .and_then(Value::as_str)
        .ok_or_else(|| malformed(backend, format!("missing state at {}", mapping.state)))?;
    let name = match mapping
        .state_reason
        .and_then(|pointer| native.pointer(pointer))
        .and_then(Value::as_str)
    {
        Some(reason) => format!("{status}:{reason}"),
        None => status.to_string(),
    };
    match mapping
        .canonical_state(&name)
        .or_else(|| mapping.canonical_state(status))
    {
        Some(state) => item.state = state,
        None => item = item.with_unrecognized_state(name),
    }

    item.parent_id = read_id(native, mapping.parent);

    for field in mapping.fields {
        if let Some(value) = native.pointer(field.pointer).filter(|v| !v.is_null()) {
            item.fields
                .insert(field.canonical.to_string(), decode(field.codec, value));
        }
    }
    strip_marker(mapping.key_marker, &mut item.fields);

    if let Some(container) = native.pointer(mapping.container).and_then(Value::as_object) {
        let claimed: HashSet<&str> = mapping.claimed_keys().collect();
        for (key, value) in container {
            if !claimed.contains(key.as_str()) {
                item.overflow.insert(key.clone(), value.clone());
            }
        }
    }

    Ok(item)
}

/// Writes a canonical item as a full native document.
///
/// Fails with `ValidationFailed` when the item uses a field the backend
/// cannot represent. Null fields are absent and are not written.
pub fn from_canonical(item: &CanonicalWorkItem, backend: Backend) -> Outcome<Value> {
    let mapping = PlatformMapping::of(backend);
    let mut doc = Value::Object(Map::new());

    set_pointer(&mut doc, mapping.id.pointer, encode_id(mapping.id, item.id()));
    if !item.version_token().is_empty() {
        set_pointer(
            &mut doc,
            mapping.version.pointer,
            encode_id(mapping.version, item.version_token()),
        );
    }

    let mut changes = vec![
        NativeChange::new(mapping.title, Value::String(item.title.clone())),
        type_change(mapping, item.item_type)?,
    ];
    changes.extend(state_change(mapping, item.state, item.native_state())?);
    if let Some(parent) = &item.parent_id {
        changes.push(parent_change(mapping, parent)?);
    }
    for (name, value) in item.fields.iter().filter(|(_, v)| !v.is_null()) {
        changes.push(field_change(mapping, name, value)?);
    }
    changes.extend(overflow_changes(mapping, &item.overflow)?);

    for change in changes {
        set_pointer(&mut doc, &change.pointer, change.value);
    }
    Ok(doc)
}

/// The native writes that create `draft`.
pub fn draft_changes(draft: &WorkItemDraft, backend: Backend) -> Outcome<Vec<NativeChange>> {
    let mapping = PlatformMapping::of(backend);

    let mut changes = vec![
        NativeChange::new(mapping.title, Value::String(draft.title.clone())),
        type_change(mapping, draft.item_type)?,
    ];
    if let Some(state) = draft.state {
        changes.extend(state_change(mapping, state, None)?);
    }
    if let Some(parent) = &draft.parent_id {
        changes.push(parent_change(mapping, parent)?);
    }
    for (name, value) in &draft.fields {
        changes.push(field_change(mapping, name, value)?);
    }
    Ok(changes)
}

/// The native writes that apply `patch`.
///
/// Overflow keys the backend computes itself are left out, so a patch
/// built from a whole item only writes what the backend accepts.
pub fn patch_changes(patch: &WorkItemPatch, backend: Backend) -> Outcome<Vec<NativeChange>> {
    let mapping = PlatformMapping::of(backend);
    let mut changes = Vec::new();

    if let Some(title) = &patch.title {
        changes.push(NativeChange::new(mapping.title, Value::String(title.clone())));
    }
    if let Some(state) = patch.state {
        let native = patch.overflow.get(STATE_OVERFLOW_KEY).and_then(Value::as_str);
        changes.extend(state_change(mapping, state, native)?);
    }
    if let Some(parent) = &patch.parent_id {
        changes.push(parent_change(mapping, parent)?);
    }
    for (name, value) in &patch.fields {
        changes.push(field_change(mapping, name, value)?);
    }
    let writable = patch
        .overflow
        .iter()
        .filter(|(key, _)| !mapping.is_read_only(key));
    changes.extend(overflow_changes(mapping, writable)?);
    Ok(changes)
}

/// Reads the item id from a native payload.
#[must_use]
pub fn native_id(native: &Value, backend: Backend) -> Option<String> {
    read_id(native, PlatformMapping::of(backend).id)
}

/// Reads the version token from a native payload.
#[must_use]
pub fn native_version(native: &Value, backend: Backend) -> Option<String> {
    read_id(native, PlatformMapping::of(backend).version)
}

/// Encodes a canonical id for the wire, as a number where the backend
/// uses numeric ids.
#[must_use]
pub fn encode_id(pointer: IdPointer, id: &str) -> Value {
    if pointer.numeric {
        if let Ok(n) = id.parse::<u64>() {
            if n.to_string() == id {
                return Value::from(n);
            }
        }
    }
    Value::String(id.to_string())
}

fn read_id(native: &Value, pointer: IdPointer) -> Option<String> {
    match native.pointer(pointer.pointer)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn type_change(mapping: &PlatformMapping, item_type: WorkItemType) -> Outcome<NativeChange> {
    let native = mapping.native_type(item_type).ok_or_else(|| {
        unsupported(mapping.backend, format!("work item type '{item_type}'"))
    })?;
    Ok(NativeChange::new(mapping.item_type, Value::from(native)))
}

/// The writes that set `state`; a `state:reason` name is split across the
/// state and reason pointers.
fn state_change(
    mapping: &PlatformMapping,
    state: CanonicalState,
    native: Option<&str>,
) -> Outcome<Vec<NativeChange>> {
    let name = match state {
        CanonicalState::Unrecognized => native.ok_or_else(|| {
            Failure::local(
                ErrorKind::ValidationFailed,
                format!("unrecognized state needs its native value under '{STATE_OVERFLOW_KEY}'"),
            )
        })?,
        mapped => mapping
            .native_state(mapped)
            .ok_or_else(|| unsupported(mapping.backend, format!("state '{mapped}'")))?,
    };
    let Some(reason_pointer) = mapping.state_reason else {
        return Ok(vec![NativeChange::new(mapping.state, Value::from(name))]);
    };
    let mut changes = Vec::with_capacity(2);
    match name.split_once(':') {
        Some((status, reason)) => {
            changes.push(NativeChange::new(mapping.state, Value::from(status)));
            changes.push(NativeChange::new(reason_pointer, Value::from(reason)));
        }
        None => changes.push(NativeChange::new(mapping.state, Value::from(name))),
    }
    Ok(changes)
}

fn parent_change(mapping: &PlatformMapping, parent: &str) -> Outcome<NativeChange> {
    if parent.trim().is_empty() {
        return Err(Failure::local(ErrorKind::ValidationFailed, "parent id is empty"));
    }
    Ok(NativeChange::new(mapping.parent.pointer, encode_id(mapping.parent, parent)))
}

fn field_change(mapping: &PlatformMapping, name: &str, value: &Value) -> Outcome<NativeChange> {
    let field = mapping
        .field(name)
        .ok_or_else(|| unsupported(mapping.backend, format!("field '{name}'")))?;
    Ok(NativeChange::new(field.pointer, encode(field, value)?))
}

fn overflow_changes<'a>(
    mapping: &PlatformMapping,
    overflow: impl IntoIterator<Item = (&'a String, &'a Value)>,
) -> Outcome<Vec<NativeChange>> {
    let claimed: HashSet<&str> = mapping.claimed_keys().collect();
    overflow
        .into_iter()
        .filter(|(key, _)| key.as_str() != STATE_OVERFLOW_KEY)
        .map(|(key, value)| {
            if claimed.contains(key.as_str()) {
                return Err(Failure::local(
                    ErrorKind::ValidationFailed,
                    format!("overflow key '{key}' shadows a mapped {} field", mapping.backend),
                ));
            }
            let pointer = format!("{}/{}", mapping.container, escape_segment(key));
            Ok(NativeChange::new(pointer, value.clone()))
        })
        .collect()
}

fn decode(codec: FieldCodec, value: &Value) -> Value {
    match (codec, value) {
        (FieldCodec::SemicolonList, Value::String(tags)) => tags
            .split(';')
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(Value::from)
            .collect(),
        (FieldCodec::NameList, Value::Array(entries)) => entries
            .iter()
            .filter_map(|entry| match entry {
                Value::String(_) => Some(entry.clone()),
                Value::Object(obj) => obj.get("name").cloned(),
                _ => None,
            })
            .collect(),
        _ => value.clone(),
    }
}

/// Encodes a canonical value; list codecs only take entries that decode
/// back unchanged.
fn encode(field: &FieldMapping, value: &Value) -> Outcome<Value> {
    match (field.codec, value) {
        (FieldCodec::Plain, _) | (_, Value::Null) => Ok(value.clone()),
        (FieldCodec::SemicolonList, Value::Array(items)) => {
            let tags = list_entries(field, items)?;
            if let Some(tag) = tags.iter().find(|tag| tag.contains(';')) {
                return Err(invalid_entry(field, tag, "contains ';'"));
            }
            Ok(Value::String(tags.join("; ")))
        }
        (FieldCodec::NameList, Value::Array(items)) => {
            list_entries(field, items)?;
            Ok(value.clone())
        }
        _ => Err(Failure::local(
            ErrorKind::ValidationFailed,
            format!("field '{}' expects a list of strings", field.canonical),
        )),
    }
}

fn list_entries<'a>(field: &FieldMapping, items: &'a [Value]) -> Outcome<Vec<&'a str>> {
    items
        .iter()
        .map(|item| {
            let entry = item.as_str().ok_or_else(|| {
                Failure::local(
                    ErrorKind::ValidationFailed,
                    format!("field '{}' expects a list of strings, got {item}", field.canonical),
                )
            })?;
            if entry.trim().is_empty() {
                return Err(invalid_entry(field, entry, "is empty"));
            }
            if entry.trim() != entry {
                return Err(invalid_entry(field, entry, "has surrounding whitespace"));
            }
            Ok(entry)
        })
        .collect()
}

fn invalid_entry(field: &FieldMapping, entry: &str, problem: &str) -> Failure {
    Failure::local(
        ErrorKind::ValidationFailed,
        format!("field '{}' entry '{entry}' {problem}", field.canonical),
    )
}

/// Writes `value` at `pointer`, creating intermediate objects.
pub(crate) fn set_pointer(doc: &mut Value, pointer: &str, value: Value) {
    let mut target = doc;
    let segments: Vec<String> = pointer
        .split('/')
        .skip(1)
        .map(unescape_segment)
        .collect();

    let Some((last, parents)) = segments.split_last() else {
        *target = value;
        return;
    };

    for segment in parents {
        if !target.is_object() {
            *target = Value::Object(Map::new());
        }
        let Value::Object(map) = target else { return };
        target = map
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(map) = target {
        map.insert(last.clone(), value);
    }
}

fn escape_segment(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

fn unescape_segment(segment: &str) -> String {
    segment.replace("~1", "/").replace("~0", "~")
}

fn malformed(backend: Backend, detail: String) -> Failure {
    Failure::terminal(ErrorKind::Unknown, format!("malformed {backend} payload: {detail}"))
}

fn unsupported(backend: Backend, what: String) -> Failure {
    Failure::local(
        ErrorKind::ValidationFailed,
        format!("{backend} cannot represent {what}"),
    )
}
