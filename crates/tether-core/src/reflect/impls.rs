//! `Reflect` impls for scalars, pointers, sequences and maps.
//!
//! `Vec<u8>` is a sequence of numbers like any other vector; use
//! `bytes::Bytes` for base64-encoded binary data.

use super::{NodeKind, Reflect, ReflectMap, ReflectRef, ReflectSeq, TypeEncoder, TypeRegistry};
use crate::model::Model;
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

fn pointer_kind(inner: NodeKind) -> NodeKind {
    match inner {
        NodeKind::Node | NodeKind::NodePtr => NodeKind::NodePtr,
        _ => NodeKind::Plain,
    }
}

fn list_kind(inner: NodeKind) -> NodeKind {
    match inner {
        NodeKind::Node => NodeKind::NodeList,
        NodeKind::NodePtr => NodeKind::NodePtrList,
        _ => NodeKind::Plain,
    }
}

macro_rules! reflect_signed {
    ($($ty:ty),*) => {
        $(
            impl Reflect for $ty {
                fn build_encoder(_: &TypeRegistry) -> TypeEncoder {
                    TypeEncoder::Int
                }

                fn reflect(&self) -> ReflectRef<'_> {
                    ReflectRef::Int(*self as i64)
                }

                fn quotable() -> bool {
                    true
                }
            }
        )*
    };
}

macro_rules! reflect_unsigned {
    ($($ty:ty),*) => {
        $(
            impl Reflect for $ty {
                fn build_encoder(_: &TypeRegistry) -> TypeEncoder {
                    TypeEncoder::Uint
                }

                fn reflect(&self) -> ReflectRef<'_> {
                    ReflectRef::Uint(*self as u64)
                }

                fn quotable() -> bool {
                    true
                }
            }
        )*
    };
}

reflect_signed!(i8, i16, i32, i64, isize);
reflect_unsigned!(u8, u16, u32, u64, usize);

impl Reflect for bool {
    fn build_encoder(_: &TypeRegistry) -> TypeEncoder {
        TypeEncoder::Bool
    }

    fn reflect(&self) -> ReflectRef<'_> {
        ReflectRef::Bool(*self)
    }

    fn quotable() -> bool {
        true
    }
}

impl Reflect for f32 {
    fn build_encoder(_: &TypeRegistry) -> TypeEncoder {
        TypeEncoder::Float32
    }

    fn reflect(&self) -> ReflectRef<'_> {
        ReflectRef::Float(f64::from(*self))
    }

    fn quotable() -> bool {
        true
    }
}

impl Reflect for f64 {
    fn build_encoder(_: &TypeRegistry) -> TypeEncoder {
        TypeEncoder::Float64
    }

    fn reflect(&self) -> ReflectRef<'_> {
        ReflectRef::Float(*self)
    }

    fn quotable() -> bool {
        true
    }
}

impl Reflect for String {
    fn build_encoder(_: &TypeRegistry) -> TypeEncoder {
        TypeEncoder::Str
    }

    fn reflect(&self) -> ReflectRef<'_> {
        ReflectRef::Str(self)
    }

    fn quotable() -> bool {
        true
    }
}

impl Reflect for &'static str {
    fn build_encoder(_: &TypeRegistry) -> TypeEncoder {
        TypeEncoder::Str
    }

    fn reflect(&self) -> ReflectRef<'_> {
        ReflectRef::Str(self)
    }

    fn quotable() -> bool {
        true
    }
}

impl Reflect for Bytes {
    fn build_encoder(_: &TypeRegistry) -> TypeEncoder {
        TypeEncoder::Bytes
    }

    fn reflect(&self) -> ReflectRef<'_> {
        ReflectRef::Bytes(self)
    }
}

impl Reflect for serde_json::Value {
    fn build_encoder(_: &TypeRegistry) -> TypeEncoder {
        TypeEncoder::Json
    }

    fn reflect(&self) -> ReflectRef<'_> {
        ReflectRef::Json(self)
    }
}

impl<T: Reflect> Reflect for Option<T> {
    fn build_encoder(types: &TypeRegistry) -> TypeEncoder {
        TypeEncoder::Ptr(types.encoder_for::<T>())
    }

    fn reflect(&self) -> ReflectRef<'_> {
        ReflectRef::Ptr(self.as_ref().map(|v| v as &dyn Reflect))
    }

    fn node_kind() -> NodeKind {
        pointer_kind(T::node_kind())
    }

    fn quotable() -> bool {
        T::quotable()
    }

    fn node_model(&self) -> Option<&Model> {
        self.as_ref().and_then(|v| v.node_model())
    }
}

impl<T: Reflect> Reflect for Box<T> {
    fn build_encoder(types: &TypeRegistry) -> TypeEncoder {
        TypeEncoder::Ptr(types.encoder_for::<T>())
    }

    fn reflect(&self) -> ReflectRef<'_> {
        ReflectRef::Ptr(Some(&**self as &dyn Reflect))
    }

    fn node_kind() -> NodeKind {
        pointer_kind(T::node_kind())
    }

    fn quotable() -> bool {
        T::quotable()
    }

    fn node_model(&self) -> Option<&Model> {
        (**self).node_model()
    }
}

impl<T: Reflect> Reflect for Arc<T> {
    fn build_encoder(types: &TypeRegistry) -> TypeEncoder {
        TypeEncoder::Ptr(types.encoder_for::<T>())
    }

    fn reflect(&self) -> ReflectRef<'_> {
        ReflectRef::Ptr(Some(&**self as &dyn Reflect))
    }

    fn node_kind() -> NodeKind {
        pointer_kind(T::node_kind())
    }

    fn quotable() -> bool {
        T::quotable()
    }

    fn node_model(&self) -> Option<&Model> {
        (**self).node_model()
    }
}

impl<T: Reflect> ReflectSeq for Vec<T> {
    fn len(&self) -> usize {
        self.len()
    }

    fn element(&self, index: usize) -> &dyn Reflect {
        &self[index]
    }
}

impl<T: Reflect> Reflect for Vec<T> {
    fn build_encoder(types: &TypeRegistry) -> TypeEncoder {
        TypeEncoder::Seq(types.encoder_for::<T>())
    }

    fn reflect(&self) -> ReflectRef<'_> {
        ReflectRef::Seq(self)
    }

    fn node_kind() -> NodeKind {
        list_kind(T::node_kind())
    }
}

impl<T: Reflect, const N: usize> ReflectSeq for [T; N] {
    fn len(&self) -> usize {
        N
    }

    fn element(&self, index: usize) -> &dyn Reflect {
        &self[index]
    }
}

impl<T: Reflect, const N: usize> Reflect for [T; N] {
    fn build_encoder(types: &TypeRegistry) -> TypeEncoder {
        TypeEncoder::Seq(types.encoder_for::<T>())
    }

    fn reflect(&self) -> ReflectRef<'_> {
        ReflectRef::Seq(self)
    }

    fn node_kind() -> NodeKind {
        list_kind(T::node_kind())
    }
}

/// Map keys the encoder can render. Keys are written as strings and sorted by
/// that string form.
pub trait MapKey: Send + Sync + 'static {
    fn key_string(&self) -> String;
}

impl MapKey for String {
    fn key_string(&self) -> String {
        self.clone()
    }
}

impl MapKey for &'static str {
    fn key_string(&self) -> String {
        (*self).to_string()
    }
}

macro_rules! map_key_int {
    ($($ty:ty),*) => {
        $(
            impl MapKey for $ty {
                fn key_string(&self) -> String {
                    self.to_string()
                }
            }
        )*
    };
}

map_key_int!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl<K: MapKey, V: Reflect> ReflectMap for HashMap<K, V> {
    fn len(&self) -> usize {
        self.len()
    }

    fn entries(&self) -> Vec<(String, &dyn Reflect)> {
        self.iter()
            .map(|(k, v)| (k.key_string(), v as &dyn Reflect))
            .collect()
    }
}

impl<K: MapKey, V: Reflect> Reflect for HashMap<K, V> {
    fn build_encoder(types: &TypeRegistry) -> TypeEncoder {
        TypeEncoder::Map(types.encoder_for::<V>())
    }

    fn reflect(&self) -> ReflectRef<'_> {
        ReflectRef::Map(self)
    }
}

impl<K: MapKey, V: Reflect> ReflectMap for BTreeMap<K, V> {
    fn len(&self) -> usize {
        self.len()
    }

    fn entries(&self) -> Vec<(String, &dyn Reflect)> {
        self.iter()
            .map(|(k, v)| (k.key_string(), v as &dyn Reflect))
            .collect()
    }
}

impl<K: MapKey, V: Reflect> Reflect for BTreeMap<K, V> {
    fn build_encoder(types: &TypeRegistry) -> TypeEncoder {
        TypeEncoder::Map(types.encoder_for::<V>())
    }

    fn reflect(&self) -> ReflectRef<'_> {
        ReflectRef::Map(self)
    }
}
