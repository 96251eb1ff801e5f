//! Diff encoder.
//!
//! Walks a value through its [`TypeEncoder`]s and writes JSON. Nodes that
//! were never sent are written in full and tagged with `"$m":1`. Nodes that
//! changed are written field by field, leaving out subtrees whose nodes are
//! synced. Lists of nodes are written as `$a` edit scripts (see
//! [`list`](self::list)). Every node that gets written is marked synced.

mod list;
mod text;

pub use text::{format_float, write_escaped, FloatBits};

use crate::config::SessionConfig;
use crate::error::{Result, TetherError};
use crate::model::{Model, ModelState, Slot};
use crate::reflect::{
    NodeKind, Reflect, ReflectMap, ReflectRef, StructDescriptor, TypeEncoder, TypeRegistry,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::{BufMut, Bytes, BytesMut};
use std::collections::HashSet;

/// Frame sent when there is nothing to synchronize.
pub const NULL_SYNC: &[u8] = br#"{"m":null}"#;

#[derive(Clone, Copy)]
struct NodeCtx<'v> {
    model: &'v Model,
    state: ModelState,
}

#[derive(Clone, Copy)]
struct ListCtx<'v> {
    parent: NodeCtx<'v>,
    slot: Slot,
}

#[derive(Clone, Copy, Default)]
struct EncOpts<'v> {
    quoted: bool,
    node: Option<NodeCtx<'v>>,
    list: Option<ListCtx<'v>>,
}

impl<'v> EncOpts<'v> {
    fn node(ctx: NodeCtx<'v>) -> Self {
        Self {
            node: Some(ctx),
            ..Self::default()
        }
    }
}

/// Produces synchronization frames for a model root.
#[derive(Debug, Clone)]
pub struct DiffEncoder {
    types: &'static TypeRegistry,
    escape_html: bool,
    cycle_threshold: usize,
}

impl DiffEncoder {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            types: TypeRegistry::global(),
            escape_html: config.escape_html,
            cycle_threshold: config.cycle_threshold,
        }
    }

    /// Encode `{"m": ...}` for `root`.
    ///
    /// An absent or synced root yields `{"m":null}`. Otherwise the value is
    /// written as a snapshot or diff and the root is marked synced. When
    /// encoding fails the root is reset to new so the next attempt sends a
    /// full snapshot.
    pub fn encode<M: Reflect>(&self, root: Option<&M>) -> Result<Bytes> {
        let Some(root) = root else {
            return Ok(Bytes::from_static(NULL_SYNC));
        };
        let model = root.node_model();
        if model.map(Model::state) == Some(ModelState::Synced) {
            return Ok(Bytes::from_static(NULL_SYNC));
        }

        let cell = self.types.encoder_for::<M>();
        let mut state = EncodeState::new(self);
        state.buf.put_slice(b"{\"m\":");

        let result = match model {
            Some(model) => state
                .enter_node(model, None, None, root.type_name())
                .and_then(|node_state| {
                    let ctx = NodeCtx {
                        model,
                        state: node_state,
                    };
                    state.encode_value(cell.get(), root, EncOpts::node(ctx))
                }),
            None => state.encode_value(cell.get(), root, EncOpts::default()),
        };

        match result {
            Ok(()) => {
                state.buf.put_u8(b'}');
                if let Some(model) = model {
                    model.mark_synced();
                }
                Ok(state.buf.freeze())
            }
            Err(err) => {
                if let Some(model) = model {
                    model.mark_new();
                }
                Err(err)
            }
        }
    }
}

impl Default for DiffEncoder {
    fn default() -> Self {
        Self::new(&SessionConfig::default())
    }
}

/// Encode `root` with default settings. See [`DiffEncoder::encode`].
pub fn encode_diff<M: Reflect>(root: Option<&M>) -> Result<Bytes> {
    DiffEncoder::default().encode(root)
}

struct EncodeState {
    buf: BytesMut,
    escape_html: bool,
    cycle_threshold: usize,
    ptr_level: usize,
    ptr_seen: HashSet<usize>,
    nodes_seen: HashSet<usize>,
}

impl EncodeState {
    fn new(encoder: &DiffEncoder) -> Self {
        Self {
            buf: BytesMut::with_capacity(256),
            escape_html: encoder.escape_html,
            cycle_threshold: encoder.cycle_threshold,
            ptr_level: 0,
            ptr_seen: HashSet::new(),
            nodes_seen: HashSet::new(),
        }
    }

    /// Check where a node is found and settle its state for this pass.
    ///
    /// Children of a new node are new as well. A node reached twice in one
    /// pass is shared between parents, which cannot be mirrored.
    fn enter_node(
        &mut self,
        model: &Model,
        parent: Option<NodeCtx<'_>>,
        slot: Option<Slot>,
        type_name: &'static str,
    ) -> Result<ModelState> {
        if !self.nodes_seen.insert(model.identity()) {
            return Err(TetherError::SharedNode { type_name });
        }
        if let Some(parent) = parent {
            if parent.state == ModelState::New {
                model.mark_new();
            }
        }
        Ok(model.test_and_reparent(parent.map(|p| p.model), slot))
    }

    fn put_display(&mut self, value: impl std::fmt::Display, quoted: bool) {
        if quoted {
            self.buf.put_u8(b'"');
        }
        self.buf.put_slice(value.to_string().as_bytes());
        if quoted {
            self.buf.put_u8(b'"');
        }
    }

    fn encode_value<'v>(
        &mut self,
        encoder: &TypeEncoder,
        value: &'v dyn Reflect,
        opts: EncOpts<'v>,
    ) -> Result<()> {
        match (encoder, value.reflect()) {
            (TypeEncoder::Bool, ReflectRef::Bool(b)) => self.put_display(b, opts.quoted),
            (TypeEncoder::Int, ReflectRef::Int(i)) => self.put_display(i, opts.quoted),
            (TypeEncoder::Uint, ReflectRef::Uint(u)) => self.put_display(u, opts.quoted),
            (TypeEncoder::Float32, ReflectRef::Float(f)) => {
                let text = format_float(f, FloatBits::F32)?;
                self.put_display(text, opts.quoted);
            }
            (TypeEncoder::Float64, ReflectRef::Float(f)) => {
                let text = format_float(f, FloatBits::F64)?;
                self.put_display(text, opts.quoted);
            }
            (TypeEncoder::Str, ReflectRef::Str(s)) => {
                if opts.quoted {
                    let mut inner = Vec::with_capacity(s.len() + 2);
                    write_escaped(&mut inner, s, self.escape_html);
                    write_escaped(&mut self.buf, &String::from_utf8_lossy(&inner), self.escape_html);
                } else {
                    write_escaped(&mut self.buf, s, self.escape_html);
                }
            }
            (TypeEncoder::Bytes, ReflectRef::Bytes(b)) => {
                self.buf.put_u8(b'"');
                self.buf.put_slice(STANDARD.encode(b).as_bytes());
                self.buf.put_u8(b'"');
            }
            (TypeEncoder::Json, ReflectRef::Json(v)) => self.encode_json(v)?,
            (TypeEncoder::Ptr(_), ReflectRef::Ptr(None)) => self.buf.put_slice(b"null"),
            (TypeEncoder::Ptr(elem), ReflectRef::Ptr(Some(inner))) => {
                self.encode_pointee(elem.get(), inner, opts)?;
            }
            (TypeEncoder::Seq(elem), ReflectRef::Seq(seq)) => {
                self.encode_seq(elem.get(), seq, opts)?;
            }
            (TypeEncoder::Map(elem), ReflectRef::Map(map)) => self.encode_map(elem.get(), map)?,
            (TypeEncoder::Struct(desc), ReflectRef::Struct) => {
                self.encode_struct(desc, value, opts)?;
            }
            (TypeEncoder::Unsupported(type_name), _) => {
                return Err(TetherError::UnsupportedType { type_name });
            }
            _ => {
                return Err(TetherError::UnsupportedType {
                    type_name: value.type_name(),
                });
            }
        }
        Ok(())
    }

    fn encode_pointee<'v>(
        &mut self,
        encoder: &TypeEncoder,
        inner: &'v dyn Reflect,
        opts: EncOpts<'v>,
    ) -> Result<()> {
        self.ptr_level += 1;
        let tracked = if self.ptr_level > self.cycle_threshold {
            let addr = inner as *const dyn Reflect as *const () as usize;
            if !self.ptr_seen.insert(addr) {
                self.ptr_level -= 1;
                return Err(TetherError::Cycle {
                    type_name: inner.type_name(),
                });
            }
            Some(addr)
        } else {
            None
        };
        let result = self.encode_value(encoder, inner, opts);
        if let Some(addr) = tracked {
            self.ptr_seen.remove(&addr);
        }
        self.ptr_level -= 1;
        result
    }

    fn encode_map(&mut self, encoder: &TypeEncoder, map: &dyn ReflectMap) -> Result<()> {
        let mut entries = map.entries();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        self.buf.put_u8(b'{');
        for (i, (key, value)) in entries.into_iter().enumerate() {
            if i > 0 {
                self.buf.put_u8(b',');
            }
            write_escaped(&mut self.buf, &key, self.escape_html);
            self.buf.put_u8(b':');
            self.encode_value(encoder, value, EncOpts::default())?;
        }
        self.buf.put_u8(b'}');
        Ok(())
    }

    fn encode_json(&mut self, value: &serde_json::Value) -> Result<()> {
        use serde_json::Value;
        match value {
            Value::Null => self.buf.put_slice(b"null"),
            Value::Bool(b) => self.put_display(b, false),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    self.put_display(i, false);
                } else if let Some(u) = n.as_u64() {
                    self.put_display(u, false);
                } else {
                    let f = n.as_f64().unwrap_or(f64::NAN);
                    let text = format_float(f, FloatBits::F64)?;
                    self.put_display(text, false);
                }
            }
            Value::String(s) => write_escaped(&mut self.buf, s, self.escape_html),
            Value::Array(items) => {
                self.buf.put_u8(b'[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.buf.put_u8(b',');
                    }
                    self.encode_json(item)?;
                }
                self.buf.put_u8(b']');
            }
            Value::Object(object) => {
                let mut keys: Vec<&String> = object.keys().collect();
                keys.sort();
                self.buf.put_u8(b'{');
                for (i, key) in keys.into_iter().enumerate() {
                    if i > 0 {
                        self.buf.put_u8(b',');
                    }
                    write_escaped(&mut self.buf, key, self.escape_html);
                    self.buf.put_u8(b':');
                    self.encode_json(&object[key])?;
                }
                self.buf.put_u8(b'}');
            }
        }
        Ok(())
    }

    fn encode_struct<'v>(
        &mut self,
        desc: &StructDescriptor,
        value: &'v dyn Reflect,
        opts: EncOpts<'v>,
    ) -> Result<()> {
        let owner = value.as_any();
        let mut first = true;
        self.buf.put_u8(b'{');
        if let Some(node) = opts.node {
            if node.state == ModelState::New {
                self.buf.put_slice(b"\"$m\":1");
                first = false;
            }
        }

        for (position, field) in desc.fields().iter().enumerate() {
            let Some(field_value) = field.resolve(owner) else {
                continue;
            };
            if field.omit_empty() && field_value.reflect().is_empty() {
                continue;
            }

            let mut field_opts = EncOpts {
                quoted: field.quoted(),
                ..EncOpts::default()
            };
            let mut child = None;
            if let Some(node) = opts.node {
                let slot = Slot::new(desc.type_id(), position);
                match field.node_kind() {
                    NodeKind::Node | NodeKind::NodePtr => match field_value.node_model() {
                        None => {
                            if node.state == ModelState::ChildDirty {
                                continue;
                            }
                        }
                        Some(model) => {
                            let state = self.enter_node(
                                model,
                                Some(node),
                                Some(slot),
                                field_value.type_name(),
                            )?;
                            if state == ModelState::Synced {
                                continue;
                            }
                            let ctx = NodeCtx { model, state };
                            field_opts.node = Some(ctx);
                            child = Some(ctx);
                        }
                    },
                    NodeKind::NodeList | NodeKind::NodePtrList => {
                        field_opts.list = Some(ListCtx { parent: node, slot });
                    }
                    NodeKind::Plain => {
                        if node.state == ModelState::ChildDirty {
                            continue;
                        }
                    }
                }
            }

            if !first {
                self.buf.put_u8(b',');
            }
            first = false;
            self.buf.put_slice(field.key(self.escape_html));
            self.encode_value(field.encoder().get(), field_value, field_opts)?;
            if let Some(ctx) = child {
                ctx.model.mark_synced();
            }
        }

        self.buf.put_u8(b'}');
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflect::{Fields, Structure};
    use std::collections::HashMap;

    struct Plain {
        flag: bool,
        count: i32,
        label: String,
        blob: Bytes,
        tags: HashMap<String, u8>,
        extra: serde_json::Value,
    }

    impl Structure for Plain {
        fn declare(fields: &mut Fields<Self>) {
            fields
                .field("Flag", |p| &p.flag)
                .tagged("Count", "count,string", |p| &p.count)
                .tagged("Label", "label,omitempty", |p| &p.label)
                .field("Blob", |p| &p.blob)
                .field("Tags", |p| &p.tags)
                .field("Extra", |p| &p.extra);
        }
    }

    crate::reflect_struct!(Plain);

    struct Loop;

    impl Reflect for Loop {
        fn build_encoder(types: &TypeRegistry) -> TypeEncoder {
            TypeEncoder::Ptr(types.encoder_for::<Loop>())
        }

        fn reflect(&self) -> ReflectRef<'_> {
            ReflectRef::Ptr(Some(self))
        }
    }

    struct Opaque;

    impl Reflect for Opaque {
        fn build_encoder(_: &TypeRegistry) -> TypeEncoder {
            TypeEncoder::Unsupported("Opaque")
        }

        fn reflect(&self) -> ReflectRef<'_> {
            ReflectRef::Struct
        }
    }

    fn text(bytes: Bytes) -> String {
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_absent_root_is_null() {
        assert_eq!(text(encode_diff::<i32>(None).unwrap()), r#"{"m":null}"#);
    }

    #[test]
    fn test_plain_struct_snapshot() {
        let mut tags = HashMap::new();
        tags.insert("b".to_string(), 2);
        tags.insert("a".to_string(), 1);
        let value = Plain {
            flag: true,
            count: 42,
            label: String::new(),
            blob: Bytes::from_static(b"hi"),
            tags,
            extra: serde_json::json!({"z": [1.5, null], "a": "<x>"}),
        };

        let out = text(encode_diff(Some(&value)).unwrap());
        assert_eq!(
            out,
            r#"{"m":{"Flag":true,"count":"42","Blob":"aGk=","Tags":{"a":1,"b":2},"Extra":{"a":"\u003cx\u003e","z":[1.5,null]}}}"#
        );
    }

    #[test]
    fn test_quoted_string_is_double_encoded() {
        struct Quoted {
            name: String,
        }
        impl Structure for Quoted {
            fn declare(fields: &mut Fields<Self>) {
                fields.tagged("Name", ",string", |q| &q.name);
            }
        }
        crate::reflect_struct!(Quoted);

        let value = Quoted { name: "a\"b".into() };
        let out = text(encode_diff(Some(&value)).unwrap());
        assert_eq!(out, r#"{"m":{"Name":"\"a\\\"b\""}}"#);
    }

    #[test]
    fn test_nan_is_rejected() {
        let err = encode_diff(Some(&f64::NAN)).unwrap_err();
        assert!(matches!(err, TetherError::UnsupportedValue { .. }));
    }

    #[test]
    fn test_unsupported_type() {
        let err = encode_diff(Some(&vec![Opaque])).unwrap_err();
        assert!(matches!(
            err,
            TetherError::UnsupportedType {
                type_name: "Opaque"
            }
        ));
    }

    #[test]
    fn test_cycle_detected_past_threshold() {
        let encoder = DiffEncoder::new(&SessionConfig {
            cycle_threshold: 4,
            ..SessionConfig::default()
        });
        let err = encoder.encode(Some(&Loop)).unwrap_err();
        assert!(matches!(err, TetherError::Cycle { .. }));
    }

    #[test]
    fn test_html_escaping_can_be_disabled() {
        let encoder = DiffEncoder::new(&SessionConfig {
            escape_html: false,
            ..SessionConfig::default()
        });
        let out = text(encoder.encode(Some(&"<b>".to_string())).unwrap());
        assert_eq!(out, r#"{"m":"<b>"}"#);
    }

    #[test]
    fn test_encoder_debug_shows_settings() {
        let encoder = DiffEncoder::new(&SessionConfig::default());
        let debug = format!("{encoder:?}");
        assert!(debug.starts_with("DiffEncoder"));
        assert!(debug.contains("escape_html: true"));
        assert!(debug.contains("TypeRegistry"));
    }
}
