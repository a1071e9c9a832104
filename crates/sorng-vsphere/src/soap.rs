//! VIM25 SOAP codec.
//!
//! Builds request envelopes from [`VimValue`] arguments and decodes response
//! envelopes into [`VimValue`]s. Decoding goes through a small generic
//! element tree ([`XmlNode`]) so the value rules live in one place:
//!
//! - `xsd` scalars are typed by their `xsi:type`
//! - a node carrying a bare `type` attribute is a managed object reference
//! - `ArrayOf*` envelopes are unwrapped exactly once into a flat list
//! - any other element with children is a data object

use crate::error::{SoapFault, VsphereError, VsphereResult};
use crate::types::{DataObject, ManagedObjectReference, VimValue};

use chrono::{DateTime, Utc};
use log::trace;
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::{BTreeMap, HashSet};
use std::str;

// ─── Constants ───────────────────────────────────────────────────────

pub const NS_SOAP_ENV: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const NS_XSD: &str = "http://www.w3.org/2001/XMLSchema";
pub const NS_XSI: &str = "http://www.w3.org/2001/XMLSchema-instance";
pub const NS_VIM25: &str = "urn:vim25";

const ARRAY_PREFIX: &str = "ArrayOf";

/// Fault types that mean "your session or credentials are no good".
/// `NoPermission` is refused authorization on a live session and stays a
/// `RemoteFault`.
const AUTH_FAULTS: &[&str] = &["InvalidLogin", "NotAuthenticated"];

// ─── Element tree ────────────────────────────────────────────────────

/// One XML element, reduced to what the VIM25 value rules need.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlNode {
    /// Local element name (namespace prefix stripped)
    pub name: String,
    /// Local part of `xsi:type`
    pub xsi_type: Option<String>,
    /// Bare `type` attribute, present on managed object references
    pub ref_type: Option<String>,
    pub text: String,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.as_str())
    }
}

/// Parse a document and return its root element.
pub fn parse_document(xml: &str) -> VsphereResult<XmlNode> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => stack.push(node_from_start(e)?),
            Ok(Event::Empty(ref e)) => {
                let node = node_from_start(e)?;
                attach(&mut stack, &mut root, node);
            }
            Ok(Event::End(_)) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| VsphereError::parse("Unbalanced closing tag"))?;
                attach(&mut stack, &mut root, node);
            }
            Ok(Event::Text(ref e)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&e.unescape()?);
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(top) = stack.last_mut() {
                    let raw = e.into_inner();
                    let text = str::from_utf8(&raw)
                        .map_err(|_| VsphereError::parse("Invalid UTF-8 in CDATA"))?;
                    top.text.push_str(text);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(VsphereError::parse(format!(
                    "XML error at position {}: {e}",
                    reader.buffer_position()
                )))
            }
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(VsphereError::parse("Unexpected end of document"));
    }
    root.ok_or_else(|| VsphereError::parse("Empty XML document"))
}

fn node_from_start(e: &BytesStart) -> VsphereResult<XmlNode> {
    let name = str::from_utf8(e.local_name().as_ref())
        .map_err(|_| VsphereError::parse("Invalid UTF-8 in tag name"))?
        .to_string();
    let mut node = XmlNode {
        name,
        ..XmlNode::default()
    };

    for attr in e.attributes() {
        let attr = attr?;
        let key = attr.key.as_ref();
        if key == b"type" {
            node.ref_type = Some(attr.unescape_value()?.to_string());
        } else if key.ends_with(b":type") {
            let value = attr.unescape_value()?;
            node.xsi_type = Some(strip_prefix(&value).to_string());
        }
    }
    Ok(node)
}

fn attach(stack: &mut [XmlNode], root: &mut Option<XmlNode>, node: XmlNode) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => *root = Some(node),
    }
}

fn strip_prefix(qname: &str) -> &str {
    qname.rsplit(':').next().unwrap_or(qname)
}

// ─── Value decoding ──────────────────────────────────────────────────

/// Decode one element into a value.
pub fn decode_value(node: &XmlNode) -> VimValue {
    let xsi = node.xsi_type.as_deref();

    // Array envelopes: unwrap exactly this one level. Children keep their
    // own decoding, so a nested ArrayOfArrayOf* stays nested.
    if xsi.is_some_and(|t| t.starts_with(ARRAY_PREFIX)) {
        return VimValue::List(node.children.iter().map(decode_value).collect());
    }

    if let Some(ref type_name) = node.ref_type {
        if node.children.is_empty() {
            return VimValue::Ref(ManagedObjectReference::new(
                type_name.clone(),
                node.text.trim(),
            ));
        }
    }

    if !node.children.is_empty() {
        return VimValue::Object(decode_object(node));
    }

    let text = node.text.as_str();
    match xsi {
        Some("string") | Some("anyURI") | Some("base64Binary") | Some("anyType") => {
            VimValue::String(text.to_string())
        }
        Some("int") | Some("long") | Some("short") | Some("byte") => text
            .trim()
            .parse()
            .map(VimValue::Int)
            .unwrap_or_else(|_| VimValue::String(text.to_string())),
        Some("float") | Some("double") => text
            .trim()
            .parse()
            .map(VimValue::Float)
            .unwrap_or_else(|_| VimValue::String(text.to_string())),
        Some("boolean") => match text.trim() {
            "true" | "1" => VimValue::Bool(true),
            "false" | "0" => VimValue::Bool(false),
            _ => VimValue::String(text.to_string()),
        },
        Some("dateTime") => DateTime::parse_from_rfc3339(text.trim())
            .map(|dt| VimValue::DateTime(dt.with_timezone(&Utc)))
            .unwrap_or_else(|_| VimValue::String(text.to_string())),
        // Enumerations carry their value as text.
        Some(_) if !text.trim().is_empty() => VimValue::String(text.to_string()),
        // A typed object with every field unset.
        Some(other) => VimValue::Object(DataObject::new(other)),
        None => VimValue::String(text.to_string()),
    }
}

/// Decode an element's children as data-object fields. Repeated child
/// names collapse into one list field.
fn decode_object(node: &XmlNode) -> DataObject {
    let mut obj = DataObject {
        type_name: node.xsi_type.clone(),
        fields: Vec::with_capacity(node.children.len()),
    };
    let mut repeated: HashSet<&str> = HashSet::new();

    for child in &node.children {
        let value = decode_value(child);
        match obj.fields.iter_mut().find(|(k, _)| *k == child.name) {
            None => obj.fields.push((child.name.clone(), value)),
            Some((_, existing)) => {
                if repeated.insert(child.name.as_str()) {
                    let first = std::mem::replace(existing, VimValue::Null);
                    *existing = VimValue::List(vec![first, value]);
                } else if let VimValue::List(items) = existing {
                    items.push(value);
                }
            }
        }
    }
    obj
}

// ─── Envelope encoding ───────────────────────────────────────────────

/// Build the request envelope for `operation` against `this`.
pub fn build_envelope(
    operation: &str,
    this: &ManagedObjectReference,
    args: &[(String, VimValue)],
) -> String {
    let mut body = String::new();
    write_value(&mut body, "_this", &VimValue::Ref(this.clone()));
    for (name, value) in args {
        write_value(&mut body, name, value);
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soapenv:Envelope xmlns:soapenv="{NS_SOAP_ENV}" xmlns:xsd="{NS_XSD}" xmlns:xsi="{NS_XSI}">
<soapenv:Body><{operation} xmlns="{NS_VIM25}">{body}</{operation}></soapenv:Body>
</soapenv:Envelope>"#
    )
}

/// Serialize one named value. Lists become repeated elements and nulls are
/// omitted.
pub fn write_value(out: &mut String, name: &str, value: &VimValue) {
    match value {
        VimValue::Null => {}
        VimValue::List(items) => {
            for item in items {
                write_value(out, name, item);
            }
        }
        VimValue::Ref(r) => {
            out.push_str(&format!(
                r#"<{name} type="{}">{}</{name}>"#,
                escape(r.type_name.as_str()),
                escape(r.value.as_str())
            ));
        }
        VimValue::Object(obj) => {
            match obj.type_name {
                Some(ref t) => out.push_str(&format!(r#"<{name} xsi:type="{}">"#, escape(t.as_str()))),
                None => out.push_str(&format!("<{name}>")),
            }
            for (field, v) in &obj.fields {
                write_value(out, field, v);
            }
            out.push_str(&format!("</{name}>"));
        }
        scalar => {
            let text = scalar_text(scalar);
            out.push_str(&format!("<{name}>{}</{name}>", escape(text.as_str())));
        }
    }
}

fn scalar_text(value: &VimValue) -> String {
    match value {
        VimValue::Bool(b) => b.to_string(),
        VimValue::Int(i) => i.to_string(),
        VimValue::Float(f) => f.to_string(),
        VimValue::String(s) => s.clone(),
        VimValue::DateTime(dt) => dt.to_rfc3339(),
        _ => String::new(),
    }
}

// ─── Response decoding ───────────────────────────────────────────────

/// Decode the response to `operation`.
///
/// Zero `returnval` elements decode to `Null` (void operations), one to its
/// value, several to a list.
pub fn parse_response(xml: &str, operation: &str) -> VsphereResult<VimValue> {
    let envelope = parse_document(xml)?;
    let body = envelope
        .child("Body")
        .ok_or_else(|| VsphereError::parse("SOAP envelope has no Body"))?;

    if let Some(fault) = body.child("Fault") {
        return Err(fault_to_error(parse_fault(fault)));
    }

    let response_name = format!("{operation}Response");
    let response = body.child(&response_name).ok_or_else(|| {
        VsphereError::parse(format!("SOAP body has no {response_name} element"))
    })?;

    let mut values: Vec<VimValue> = response.children_named("returnval").map(decode_value).collect();
    trace!("{operation} returned {} value(s)", values.len());
    Ok(match values.len() {
        0 => VimValue::Null,
        1 => values.remove(0),
        _ => VimValue::List(values),
    })
}

/// Extract the fault carried by a SOAP `Fault` element.
pub fn parse_fault(fault: &XmlNode) -> SoapFault {
    let mut out = SoapFault {
        code: fault.child_text("faultcode").map(|c| strip_prefix(c).to_string()).unwrap_or_default(),
        message: fault.child_text("faultstring").unwrap_or_default().to_string(),
        ..SoapFault::default()
    };

    if let Some(detail) = fault.child("detail").and_then(|d| d.children.first()) {
        let fault_type = detail
            .xsi_type
            .clone()
            .unwrap_or_else(|| detail.name.trim_end_matches("Fault").to_string());
        out.fault_type = Some(fault_type);
        flatten_fields(detail, "", &mut out.fields);
    }
    out
}

fn flatten_fields(node: &XmlNode, prefix: &str, into: &mut BTreeMap<String, String>) {
    for child in &node.children {
        let key = if prefix.is_empty() {
            child.name.clone()
        } else {
            format!("{prefix}.{}", child.name)
        };
        if child.children.is_empty() {
            into.insert(key, child.text.clone());
        } else {
            flatten_fields(child, &key, into);
        }
    }
}

/// Classify a fault into the crate's error taxonomy.
pub fn fault_to_error(fault: SoapFault) -> VsphereError {
    let fault_type = fault.fault_type.clone().unwrap_or_default();
    if AUTH_FAULTS.contains(&fault_type.as_str()) {
        let msg = fault.message.clone();
        return VsphereError::auth(msg).with_fault(fault);
    }
    if fault_type == "MethodNotFound" || fault.message.contains("Unable to resolve WSDL method name") {
        let msg = fault.message.clone();
        return VsphereError::new(crate::error::VsphereErrorKind::UnknownOperation, msg)
            .with_fault(fault);
    }
    VsphereError::remote_fault(fault)
}
