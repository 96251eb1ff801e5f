//! Registration-time type introspection.
//!
//! Types taking part in synchronization implement [`Reflect`]. Scalars,
//! pointers, sequences, maps and `serde_json::Value` are covered here;
//! structures describe their fields once through [`Structure::declare`] and
//! get their `Reflect` impl from [`reflect_struct!`](crate::reflect_struct).
//!
//! ```rust,ignore
//! use tether_core::{reflect_struct, Fields, Model, Structure};
//!
//! #[derive(Default)]
//! struct Person {
//!     model: Model,
//!     name: String,
//!     age: u32,
//! }
//!
//! impl Structure for Person {
//!     fn declare(fields: &mut Fields<Self>) {
//!         fields
//!             .field("Name", |p| &p.name)
//!             .tagged("Age", "age,omitempty", |p| &p.age);
//!     }
//! }
//!
//! reflect_struct!(Person, node = model);
//! ```

mod fields;
mod impls;
mod registry;

pub use fields::{Field, Fields, StructDescriptor, Structure};
pub use impls::MapKey;
pub use registry::{EncoderCell, TypeEncoder, TypeRegistry};

use crate::model::Model;
use std::any::Any;

/// Upcast to `&dyn Any` for trait objects.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// How a field relates to synchronizable nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Ordinary data.
    Plain,
    /// A node held by value.
    Node,
    /// An optional or boxed node.
    NodePtr,
    /// A sequence of nodes held by value.
    NodeList,
    /// A sequence of optional or boxed nodes.
    NodePtrList,
}

/// A borrowed view of a value, shaped for the encoder.
pub enum ReflectRef<'a> {
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    Str(&'a str),
    Bytes(&'a [u8]),
    Ptr(Option<&'a dyn Reflect>),
    Seq(&'a dyn ReflectSeq),
    Map(&'a dyn ReflectMap),
    Struct,
    Json(&'a serde_json::Value),
}

impl ReflectRef<'_> {
    /// Emptiness as understood by the `omitempty` tag option.
    pub fn is_empty(&self) -> bool {
        match self {
            ReflectRef::Bool(b) => !b,
            ReflectRef::Int(i) => *i == 0,
            ReflectRef::Uint(u) => *u == 0,
            ReflectRef::Float(f) => *f == 0.0,
            ReflectRef::Str(s) => s.is_empty(),
            ReflectRef::Bytes(b) => b.is_empty(),
            ReflectRef::Ptr(p) => p.is_none(),
            ReflectRef::Seq(s) => s.is_empty(),
            ReflectRef::Map(m) => m.is_empty(),
            ReflectRef::Struct => false,
            ReflectRef::Json(v) => v.is_null(),
        }
    }
}

/// A value the diff encoder can walk.
pub trait Reflect: AsAny + Send + Sync {
    /// Build the encoder for this type. Called at most once per registry.
    fn build_encoder(types: &TypeRegistry) -> TypeEncoder
    where
        Self: Sized;

    fn reflect(&self) -> ReflectRef<'_>;

    fn node_kind() -> NodeKind
    where
        Self: Sized,
    {
        NodeKind::Plain
    }

    /// Whether the `string` tag option applies to this type.
    fn quotable() -> bool
    where
        Self: Sized,
    {
        false
    }

    /// The node header, when this value is (or points to) a node.
    fn node_model(&self) -> Option<&Model> {
        None
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Indexed access to a sequence of reflected values.
pub trait ReflectSeq {
    fn len(&self) -> usize;
    fn element(&self, index: usize) -> &dyn Reflect;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Access to the entries of a reflected map, keys already stringified.
pub trait ReflectMap {
    fn len(&self) -> usize;
    fn entries(&self) -> Vec<(String, &dyn Reflect)>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Implement [`Reflect`] for a type that implements [`Structure`].
///
/// `reflect_struct!(T, node = field)` also makes `T` a synchronizable node
/// whose [`Model`] header is stored in `field`.
#[macro_export]
macro_rules! reflect_struct {
    ($ty:ty) => {
        impl $crate::reflect::Reflect for $ty {
            fn build_encoder(
                types: &$crate::reflect::TypeRegistry,
            ) -> $crate::reflect::TypeEncoder {
                $crate::reflect::TypeEncoder::structure::<Self>(types)
            }

            fn reflect(&self) -> $crate::reflect::ReflectRef<'_> {
                $crate::reflect::ReflectRef::Struct
            }
        }
    };
    ($ty:ty, node = $field:ident) => {
        impl $crate::model::Node for $ty {
            fn model(&self) -> &$crate::model::Model {
                &self.$field
            }
        }

        impl $crate::reflect::Reflect for $ty {
            fn build_encoder(
                types: &$crate::reflect::TypeRegistry,
            ) -> $crate::reflect::TypeEncoder {
                $crate::reflect::TypeEncoder::structure::<Self>(types)
            }

            fn reflect(&self) -> $crate::reflect::ReflectRef<'_> {
                $crate::reflect::ReflectRef::Struct
            }

            fn node_kind() -> $crate::reflect::NodeKind {
                $crate::reflect::NodeKind::Node
            }

            fn node_model(&self) -> Option<&$crate::model::Model> {
                Some(&self.$field)
            }
        }
    };
}
