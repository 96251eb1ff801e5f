//! Field declaration and resolution for structured types.
//!
//! A structure lists its members once through [`Fields`]. Resolution walks
//! embedded structures breadth first and applies the visibility rules of
//! anonymous embedding:
//!
//! - a shallower field hides deeper fields of the same wire name
//! - at equal depth a field named by its tag beats an untagged one
//! - two fields of equal depth and equal tag presence cancel each other out
//!
//! Surviving fields are ordered by their index path.

use super::registry::{EncoderCell, TypeRegistry};
use super::{NodeKind, Reflect};
use crate::encode::write_escaped;
use bytes::Bytes;
use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use std::sync::Arc;

/// A structured type that declares its fields.
pub trait Structure: Reflect + Sized {
    fn declare(fields: &mut Fields<Self>);
}

trait Access: Send + Sync {
    fn get<'a>(&self, owner: &'a dyn Any) -> Option<&'a dyn Reflect>;
}

struct FieldAccess<S, F> {
    get: fn(&S) -> &F,
}

impl<S: 'static, F: Reflect> Access for FieldAccess<S, F> {
    fn get<'a>(&self, owner: &'a dyn Any) -> Option<&'a dyn Reflect> {
        owner
            .downcast_ref::<S>()
            .map(|s| (self.get)(s) as &dyn Reflect)
    }
}

trait Step: Send + Sync {
    fn step<'a>(&self, owner: &'a dyn Any) -> Option<&'a dyn Any>;
}

struct EmbedValue<S, E> {
    get: fn(&S) -> &E,
}

impl<S: 'static, E: 'static> Step for EmbedValue<S, E> {
    fn step<'a>(&self, owner: &'a dyn Any) -> Option<&'a dyn Any> {
        owner
            .downcast_ref::<S>()
            .map(|s| (self.get)(s) as &dyn Any)
    }
}

struct EmbedPtr<S, E> {
    get: fn(&S) -> Option<&E>,
}

impl<S: 'static, E: 'static> Step for EmbedPtr<S, E> {
    fn step<'a>(&self, owner: &'a dyn Any) -> Option<&'a dyn Any> {
        owner
            .downcast_ref::<S>()
            .and_then(|s| (self.get)(s))
            .map(|e| e as &dyn Any)
    }
}

struct FieldDecl {
    name: &'static str,
    tag: Option<&'static str>,
    access: Arc<dyn Access>,
    node_kind: NodeKind,
    quotable: bool,
    type_name: &'static str,
    encoder: fn(&TypeRegistry) -> Arc<EncoderCell>,
}

struct EmbedDecl {
    type_id: TypeId,
    step: Arc<dyn Step>,
    members: fn() -> Vec<Member>,
}

enum Member {
    Field(FieldDecl),
    Embedded(EmbedDecl),
}

fn declared_members<S: Structure>() -> Vec<Member> {
    let mut fields = Fields::<S>::new();
    S::declare(&mut fields);
    fields.members
}

/// Builder passed to [`Structure::declare`].
pub struct Fields<S> {
    members: Vec<Member>,
    _owner: PhantomData<fn(&S)>,
}

impl<S: Structure> Fields<S> {
    fn new() -> Self {
        Self {
            members: Vec::new(),
            _owner: PhantomData,
        }
    }

    /// Declare a field written under `name`.
    pub fn field<F: Reflect>(&mut self, name: &'static str, get: fn(&S) -> &F) -> &mut Self {
        self.push(name, None, get)
    }

    /// Declare a field with a tag of the form `name,option,...`.
    ///
    /// A tag of `-` hides the field. The options are `omitempty` and `string`.
    /// An empty or invalid tag name keeps the declared name.
    pub fn tagged<F: Reflect>(
        &mut self,
        name: &'static str,
        tag: &'static str,
        get: fn(&S) -> &F,
    ) -> &mut Self {
        self.push(name, Some(tag), get)
    }

    /// Embed the fields of another structure as if they were declared here.
    pub fn embed<E: Structure>(&mut self, get: fn(&S) -> &E) -> &mut Self {
        self.members.push(Member::Embedded(EmbedDecl {
            type_id: TypeId::of::<E>(),
            step: Arc::new(EmbedValue { get }),
            members: declared_members::<E>,
        }));
        self
    }

    /// Embed through an optional reference. Fields behind an absent embed
    /// are skipped.
    pub fn embed_ptr<E: Structure>(&mut self, get: fn(&S) -> Option<&E>) -> &mut Self {
        self.members.push(Member::Embedded(EmbedDecl {
            type_id: TypeId::of::<E>(),
            step: Arc::new(EmbedPtr { get }),
            members: declared_members::<E>,
        }));
        self
    }

    fn push<F: Reflect>(
        &mut self,
        name: &'static str,
        tag: Option<&'static str>,
        get: fn(&S) -> &F,
    ) -> &mut Self {
        self.members.push(Member::Field(FieldDecl {
            name,
            tag,
            access: Arc::new(FieldAccess { get }),
            node_kind: F::node_kind(),
            quotable: F::quotable(),
            type_name: std::any::type_name::<F>(),
            encoder: TypeRegistry::encoder_for::<F>,
        }));
        self
    }
}

/// Split a tag into its name and options.
fn parse_tag(tag: &str) -> (&str, TagOptions<'_>) {
    match tag.split_once(',') {
        Some((name, options)) => (name, TagOptions(options)),
        None => (tag, TagOptions("")),
    }
}

struct TagOptions<'a>(&'a str);

impl TagOptions<'_> {
    fn contains(&self, option: &str) -> bool {
        !self.0.is_empty() && self.0.split(',').any(|o| o == option)
    }
}

fn is_valid_tag(name: &str) -> bool {
    !name.is_empty()
        && name.chars().all(|c| {
            "!#$%&()*+-./:<=>?@[]^_{|}~ ".contains(c) || c.is_alphabetic() || c.is_numeric()
        })
}

#[derive(Clone)]
struct Candidate {
    name: String,
    tagged: bool,
    index: Vec<usize>,
    omit_empty: bool,
    quoted: bool,
    node_kind: NodeKind,
    type_name: &'static str,
    path: Vec<Arc<dyn Step>>,
    access: Arc<dyn Access>,
    encoder: fn(&TypeRegistry) -> Arc<EncoderCell>,
}

struct Level {
    type_id: TypeId,
    index: Vec<usize>,
    path: Vec<Arc<dyn Step>>,
    members: fn() -> Vec<Member>,
}

fn visible_fields(root: Level) -> Vec<Candidate> {
    let mut next = vec![root];
    let mut next_count: HashMap<TypeId, usize> = HashMap::new();
    let mut visited = HashSet::new();
    let mut found = Vec::new();

    while !next.is_empty() {
        let current = std::mem::take(&mut next);
        let count = std::mem::take(&mut next_count);

        for level in current {
            if !visited.insert(level.type_id) {
                continue;
            }
            // A type queued more than once at this depth contributes every
            // field twice so that the duplicates cancel below.
            let repeated = count.get(&level.type_id).copied().unwrap_or(0) > 1;

            for (i, member) in (level.members)().into_iter().enumerate() {
                let mut index = level.index.clone();
                index.push(i);
                match member {
                    Member::Field(decl) => {
                        let tag = decl.tag.unwrap_or("");
                        if tag == "-" {
                            continue;
                        }
                        let (tag_name, options) = parse_tag(tag);
                        let tagged = is_valid_tag(tag_name);
                        let candidate = Candidate {
                            name: (if tagged { tag_name } else { decl.name }).to_string(),
                            tagged,
                            index,
                            omit_empty: options.contains("omitempty"),
                            quoted: options.contains("string") && decl.quotable,
                            node_kind: decl.node_kind,
                            type_name: decl.type_name,
                            path: level.path.clone(),
                            access: decl.access,
                            encoder: decl.encoder,
                        };
                        if repeated {
                            found.push(candidate.clone());
                        }
                        found.push(candidate);
                    }
                    Member::Embedded(decl) => {
                        let queued = next_count.entry(decl.type_id).or_insert(0);
                        *queued += 1;
                        if *queued == 1 {
                            let mut path = level.path.clone();
                            path.push(decl.step);
                            next.push(Level {
                                type_id: decl.type_id,
                                index,
                                path,
                                members: decl.members,
                            });
                        }
                    }
                }
            }
        }
    }

    found.sort_by(|a, b| {
        a.name
            .cmp(&b.name)
            .then(a.index.len().cmp(&b.index.len()))
            .then(b.tagged.cmp(&a.tagged))
            .then(a.index.cmp(&b.index))
    });

    let mut dominant = Vec::with_capacity(found.len());
    for group in found.chunk_by(|a, b| a.name == b.name) {
        let conflict = group.len() > 1
            && group[0].index.len() == group[1].index.len()
            && group[0].tagged == group[1].tagged;
        if !conflict {
            dominant.push(group[0].clone());
        }
    }
    dominant.sort_by(|a, b| a.index.cmp(&b.index));
    dominant
}

fn object_key(name: &str, escape_html: bool) -> Bytes {
    let mut key = Vec::with_capacity(name.len() + 3);
    write_escaped(&mut key, name, escape_html);
    key.push(b':');
    Bytes::from(key)
}

/// One resolved field of a structure.
pub struct Field {
    name: String,
    tagged: bool,
    index: Vec<usize>,
    omit_empty: bool,
    quoted: bool,
    node_kind: NodeKind,
    type_name: &'static str,
    key_html: Bytes,
    key_plain: Bytes,
    path: Vec<Arc<dyn Step>>,
    access: Arc<dyn Access>,
    encoder: Arc<EncoderCell>,
}

impl Field {
    fn from_candidate(candidate: Candidate, types: &TypeRegistry) -> Self {
        Self {
            key_html: object_key(&candidate.name, true),
            key_plain: object_key(&candidate.name, false),
            encoder: (candidate.encoder)(types),
            name: candidate.name,
            tagged: candidate.tagged,
            index: candidate.index,
            omit_empty: candidate.omit_empty,
            quoted: candidate.quoted,
            node_kind: candidate.node_kind,
            type_name: candidate.type_name,
            path: candidate.path,
            access: candidate.access,
        }
    }

    /// Wire name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the wire name came from a tag.
    pub fn is_tagged(&self) -> bool {
        self.tagged
    }

    /// Member positions from the outer structure down to this field.
    pub fn index(&self) -> &[usize] {
        &self.index
    }

    /// Embedding depth, 0 for fields declared on the structure itself.
    pub fn depth(&self) -> usize {
        self.index.len() - 1
    }

    pub fn omit_empty(&self) -> bool {
        self.omit_empty
    }

    pub fn quoted(&self) -> bool {
        self.quoted
    }

    pub fn node_kind(&self) -> NodeKind {
        self.node_kind
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// `"name":` ready to be written.
    pub(crate) fn key(&self, escape_html: bool) -> &[u8] {
        if escape_html {
            &self.key_html
        } else {
            &self.key_plain
        }
    }

    pub(crate) fn encoder(&self) -> &EncoderCell {
        &self.encoder
    }

    /// Read this field from an instance of the owning structure. `None` when
    /// an embedded pointer on the way is absent.
    pub(crate) fn resolve<'a>(&self, owner: &'a dyn Any) -> Option<&'a dyn Reflect> {
        let mut current = owner;
        for step in &self.path {
            current = step.step(current)?;
        }
        self.access.get(current)
    }
}

impl std::fmt::Debug for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("index", &self.index)
            .field("tagged", &self.tagged)
            .field("omit_empty", &self.omit_empty)
            .field("quoted", &self.quoted)
            .field("node_kind", &self.node_kind)
            .field("type", &self.type_name)
            .finish()
    }
}

/// Resolved field layout of a structure.
#[derive(Debug)]
pub struct StructDescriptor {
    type_id: TypeId,
    type_name: &'static str,
    fields: Vec<Field>,
    name_index: HashMap<String, usize>,
}

impl StructDescriptor {
    pub(crate) fn build<S: Structure>(types: &TypeRegistry) -> Self {
        let root = Level {
            type_id: TypeId::of::<S>(),
            index: Vec::new(),
            path: Vec::new(),
            members: declared_members::<S>,
        };
        let fields: Vec<Field> = visible_fields(root)
            .into_iter()
            .map(|candidate| Field::from_candidate(candidate, types))
            .collect();
        let name_index = fields
            .iter()
            .enumerate()
            .map(|(i, field)| (field.name.clone(), i))
            .collect();
        Self {
            type_id: TypeId::of::<S>(),
            type_name: std::any::type_name::<S>(),
            fields,
            name_index,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub(crate) fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Look a field up by wire name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.name_index.get(name).map(|&i| &self.fields[i])
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
