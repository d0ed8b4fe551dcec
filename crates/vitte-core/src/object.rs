//! object.rs — modèle d'objets gérés par le tas GC de Vitte.
//!
//! Chaque objet vit dans l'arène de [`crate::heap::Heap`] et n'est jamais
//! référencé directement : seul un [`ObjRef`] (index stable, `Copy`) circule
//! dans les valeurs et les piles. Le jeu de variantes est fermé et fixé ici ;
//! ajouter une variante ajoute un bras à chaque `match` exhaustif plutôt que
//! de basculer sur un vtable dynamique (cf. DESIGN.md §object model).

use std::fmt;

use crate::chunk::Chunk;
use crate::table::Table;
use crate::value::Value;

/// Référence stable vers un objet géré : un simple index dans l'arène du tas.
///
/// `Copy` à dessein : une `ObjRef` se manipule comme un pointeur léger, sans
/// jamais emprunter le tas. La validité (objet vivant, bonne variante) est un
/// invariant maintenu par le GC et par les sites d'appel, pas par le type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjRef(pub(crate) u32);

impl ObjRef {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj#{}", self.0)
    }
}

/// Discriminant d'objet, pour les messages d'erreur et `kind()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjKind {
    String,
    Function,
    Native,
    Closure,
    Upvalue,
    Class,
    Instance,
    BoundMethod,
}

impl fmt::Display for ObjKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ObjKind::String => "string",
            ObjKind::Function => "function",
            ObjKind::Native => "native fn",
            ObjKind::Closure => "closure",
            ObjKind::Upvalue => "upvalue",
            ObjKind::Class => "class",
            ObjKind::Instance => "instance",
            ObjKind::BoundMethod => "bound method",
        };
        f.write_str(s)
    }
}

/// Chaîne immuable internée. Les octets sont conservés bruts (spec §9 :
/// "Preserve byte-level semantics") mais le langage ne consomme ici que des
/// sources déjà valides UTF-8 (Rust `&str`), donc `bytes` reste `Vec<u8>`
/// pour fidélité sans jamais contenir de séquences invalides en pratique.
#[derive(Debug, Clone)]
pub struct ObjString {
    pub bytes: Vec<u8>,
    /// FNV-1a précalculé, utilisé par la table de hachage et l'interning.
    pub hash: u64,
}

impl ObjString {
    pub fn new(bytes: Vec<u8>) -> Self {
        let hash = fnv1a_hash(&bytes);
        Self { bytes, hash }
    }

    pub fn as_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// FNV-1a 64-bit, utilisé pour l'interning et le hachage de la table.
pub fn fnv1a_hash(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut h = OFFSET_BASIS;
    for &b in bytes {
        h ^= b as u64;
        h = h.wrapping_mul(PRIME);
    }
    h
}

/// Fonction au sens du langage : arité, upvalues attendues, chunk compilé.
#[derive(Debug, Clone)]
pub struct ObjFunction {
    pub arity: u8,
    pub upvalue_count: u8,
    pub chunk: Chunk,
    /// `None` pour le chunk de script top-level (s'affiche `<script>`).
    pub name: Option<ObjRef>,
}

impl ObjFunction {
    pub fn new(name: Option<ObjRef>) -> Self {
        Self { arity: 0, upvalue_count: 0, chunk: Chunk::new(), name }
    }
}

/// Fonction native (hôte) : `(argc, argv) -> Value`. Aucune erreur
/// utilisateur n'est levée depuis une native (spec §4.6) ; la convention de
/// signalement est laissée à chaque native (ex: renvoyer `Nil`).
pub type NativeFn = fn(args: &[Value]) -> Value;

pub struct ObjNative {
    pub name: ObjRef,
    pub function: NativeFn,
}

impl fmt::Debug for ObjNative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjNative {{ name: {:?}, .. }}", self.name)
    }
}

/// Soit ouvert (pointe une case encore vivante de la pile de valeurs), soit
/// fermé (la valeur a été rapatriée dans l'upvalue lui-même).
#[derive(Debug, Clone)]
pub enum UpvalueState {
    Open(usize),
    Closed(Value),
}

#[derive(Debug, Clone)]
pub struct ObjUpvalue {
    pub state: UpvalueState,
}

impl ObjUpvalue {
    pub fn open(stack_slot: usize) -> Self {
        Self { state: UpvalueState::Open(stack_slot) }
    }

    pub fn location(&self) -> Option<usize> {
        match self.state {
            UpvalueState::Open(slot) => Some(slot),
            UpvalueState::Closed(_) => None,
        }
    }
}

/// Fermeture : fonction + upvalues capturées (longueur == `function.upvalue_count`).
#[derive(Debug, Clone)]
pub struct ObjClosure {
    pub function: ObjRef,
    pub upvalues: Vec<ObjRef>,
}

#[derive(Debug, Clone)]
pub struct ObjClass {
    pub name: ObjRef,
    pub methods: Table<Value>,
}

impl ObjClass {
    pub fn new(name: ObjRef) -> Self {
        Self { name, methods: Table::new() }
    }
}

#[derive(Debug, Clone)]
pub struct ObjInstance {
    pub class: ObjRef,
    pub fields: Table<Value>,
}

impl ObjInstance {
    pub fn new(class: ObjRef) -> Self {
        Self { class, fields: Table::new() }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ObjBoundMethod {
    pub receiver: Value,
    pub method: ObjRef,
}

/// Union fermée de tout ce que le tas GC peut héberger.
#[derive(Debug)]
pub enum Object {
    String(ObjString),
    Function(ObjFunction),
    Native(ObjNative),
    Closure(ObjClosure),
    Upvalue(ObjUpvalue),
    Class(ObjClass),
    Instance(ObjInstance),
    BoundMethod(ObjBoundMethod),
}

impl Object {
    pub fn kind(&self) -> ObjKind {
        match self {
            Object::String(_) => ObjKind::String,
            Object::Function(_) => ObjKind::Function,
            Object::Native(_) => ObjKind::Native,
            Object::Closure(_) => ObjKind::Closure,
            Object::Upvalue(_) => ObjKind::Upvalue,
            Object::Class(_) => ObjKind::Class,
            Object::Instance(_) => ObjKind::Instance,
            Object::BoundMethod(_) => ObjKind::BoundMethod,
        }
    }

    /// Taille approximative utilisée par la politique de déclenchement du GC.
    /// N'a pas besoin d'être exacte : seule la tendance de croissance compte.
    pub fn approx_size(&self) -> usize {
        let base = std::mem::size_of::<Object>();
        base + match self {
            Object::String(s) => s.bytes.len(),
            Object::Function(f) => f.chunk.code.len() + f.chunk.constants.len() * 16,
            Object::Closure(c) => c.upvalues.len() * 4,
            Object::Class(c) => c.methods.len() * 24,
            Object::Instance(i) => i.fields.len() * 24,
            _ => 0,
        }
    }
}
