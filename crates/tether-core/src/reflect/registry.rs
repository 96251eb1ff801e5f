//! Per-type encoder cache.
//!
//! Each type gets one [`EncoderCell`]. The cell is installed in the registry
//! before its encoder is built, so a self-referential type picks up its own
//! (still pending) cell instead of recursing forever. Concurrent first users
//! of a type share that cell and block in [`EncoderCell::get`] until the one
//! build publishes its result.

use super::fields::{StructDescriptor, Structure};
use super::Reflect;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, OnceLock, PoisonError, RwLock};
use tracing::debug;

/// How values of one type are written.
pub enum TypeEncoder {
    Bool,
    Int,
    Uint,
    Float32,
    Float64,
    Str,
    Bytes,
    Json,
    Ptr(Arc<EncoderCell>),
    Seq(Arc<EncoderCell>),
    Map(Arc<EncoderCell>),
    Struct(Arc<StructDescriptor>),
    /// Values of this type fail to encode with `UnsupportedType`.
    Unsupported(&'static str),
}

impl TypeEncoder {
    /// Encoder for a declared structure.
    pub fn structure<S: Structure>(types: &TypeRegistry) -> Self {
        TypeEncoder::Struct(Arc::new(StructDescriptor::build::<S>(types)))
    }
}

impl std::fmt::Debug for TypeEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeEncoder::Bool => write!(f, "Bool"),
            TypeEncoder::Int => write!(f, "Int"),
            TypeEncoder::Uint => write!(f, "Uint"),
            TypeEncoder::Float32 => write!(f, "Float32"),
            TypeEncoder::Float64 => write!(f, "Float64"),
            TypeEncoder::Str => write!(f, "Str"),
            TypeEncoder::Bytes => write!(f, "Bytes"),
            TypeEncoder::Json => write!(f, "Json"),
            TypeEncoder::Ptr(cell) => write!(f, "Ptr({})", cell.type_name()),
            TypeEncoder::Seq(cell) => write!(f, "Seq({})", cell.type_name()),
            TypeEncoder::Map(cell) => write!(f, "Map({})", cell.type_name()),
            TypeEncoder::Struct(desc) => write!(f, "Struct({})", desc.type_name()),
            TypeEncoder::Unsupported(name) => write!(f, "Unsupported({})", name),
        }
    }
}

/// Slot holding the encoder of one type, published once.
pub struct EncoderCell {
    type_name: &'static str,
    ready: OnceLock<TypeEncoder>,
    lock: Mutex<()>,
    published: Condvar,
}

impl EncoderCell {
    fn pending(type_name: &'static str) -> Self {
        Self {
            type_name,
            ready: OnceLock::new(),
            lock: Mutex::new(()),
            published: Condvar::new(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is_ready(&self) -> bool {
        self.ready.get().is_some()
    }

    /// The published encoder, waiting for it if another thread is still
    /// building it.
    pub fn get(&self) -> &TypeEncoder {
        if let Some(encoder) = self.ready.get() {
            return encoder;
        }
        let mut guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(encoder) = self.ready.get() {
                return encoder;
            }
            guard = self
                .published
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn publish(&self, encoder: TypeEncoder) {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = self.ready.set(encoder);
        self.published.notify_all();
    }
}

impl std::fmt::Debug for EncoderCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncoderCell")
            .field("type", &self.type_name)
            .field("encoder", &self.ready.get())
            .finish()
    }
}

/// Publishes an `Unsupported` encoder if a build unwinds, so waiters wake up.
struct PublishOnUnwind<'a> {
    cell: &'a EncoderCell,
    armed: bool,
}

impl Drop for PublishOnUnwind<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.cell.publish(TypeEncoder::Unsupported(self.cell.type_name));
        }
    }
}

/// Registry of encoder cells keyed by type.
pub struct TypeRegistry {
    cells: RwLock<HashMap<TypeId, Arc<EncoderCell>>>,
    builds: AtomicUsize,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self {
            cells: RwLock::new(HashMap::new()),
            builds: AtomicUsize::new(0),
        }
    }

    /// Process-wide registry used by the diff encoder.
    pub fn global() -> &'static TypeRegistry {
        static GLOBAL: OnceLock<TypeRegistry> = OnceLock::new();
        GLOBAL.get_or_init(TypeRegistry::new)
    }

    /// Cell for `T`, building the encoder on first use.
    ///
    /// The returned cell may still be pending when called from inside the
    /// build of a type that refers back to `T`.
    pub fn encoder_for<T: Reflect>(&self) -> Arc<EncoderCell> {
        let id = TypeId::of::<T>();
        if let Some(cell) = self
            .cells
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
        {
            return Arc::clone(cell);
        }

        let cell = {
            let mut cells = self.cells.write().unwrap_or_else(PoisonError::into_inner);
            if let Some(cell) = cells.get(&id) {
                return Arc::clone(cell);
            }
            let cell = Arc::new(EncoderCell::pending(std::any::type_name::<T>()));
            cells.insert(id, Arc::clone(&cell));
            cell
        };

        debug!("Building encoder for {}", cell.type_name());
        let mut guard = PublishOnUnwind {
            cell: &cell,
            armed: true,
        };
        let encoder = T::build_encoder(self);
        guard.armed = false;
        drop(guard);
        cell.publish(encoder);
        self.builds.fetch_add(1, Ordering::Relaxed);
        cell
    }

    /// Field layout of `T`, if it is a declared structure.
    pub fn descriptor<T: Reflect>(&self) -> Option<Arc<StructDescriptor>> {
        match self.encoder_for::<T>().get() {
            TypeEncoder::Struct(desc) => Some(Arc::clone(desc)),
            _ => None,
        }
    }

    /// Number of types registered so far.
    pub fn len(&self) -> usize {
        self.cells
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of encoder builds completed.
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.len())
            .field("builds", &self.builds())
            .finish()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
