//! heap.rs — tas géré et ramasse-miettes mark-sweep de Vitte.
//!
//! Arène d'objets adressée par [`ObjRef`] (spec §4.1/§9 : "model objects as
//! an arena of tagged-variant cells keyed by stable indices", plutôt que
//! `Rc<RefCell<T>>` ou `Box<dyn Any>`). Le cycle de collecte suit les trois
//! phases de la spec : marquer les racines (fournies par l'appelant, qui seul
//! connaît son jeu de racines — VM ou compilateur), tracer par parcours en
//! largeur d'une pile grise, puis balayer (d'abord les clés mortes de la
//! table d'interning, poids faible, puis les cellules non marquées).

use crate::chunk::Chunk;
use crate::object::{fnv1a_hash, Object, ObjFunction, ObjRef};
use crate::object::{ObjBoundMethod, ObjClass, ObjClosure, ObjInstance, ObjNative, ObjString, ObjUpvalue, UpvalueState};
use crate::ops::OpCode;
use crate::table::Table;
use crate::value::Value;

/// Seuil initial de déclenchement du GC, en octets approximatifs alloués.
const INITIAL_GC_THRESHOLD: usize = 1024 * 1024;
/// Facteur de croissance heuristique du seuil après chaque collecte (spec §4.1).
const GC_GROWTH_FACTOR: usize = 2;

struct Cell {
    object: Object,
    marked: bool,
}

/// Statistiques de collecte, exposées en lecture seule (ambiant, pas une
/// fonctionnalité du langage).
#[derive(Debug, Default, Clone, Copy)]
pub struct GcStats {
    pub bytes_allocated: usize,
    pub next_gc: usize,
    pub collections: u64,
}

pub struct Heap {
    arena: Vec<Option<Cell>>,
    free_list: Vec<u32>,
    strings: Table<()>,
    gray_stack: Vec<ObjRef>,
    bytes_allocated: usize,
    next_gc: usize,
    stress_gc: bool,
    collections: u64,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Heap {
    pub fn new() -> Self {
        Self {
            arena: Vec::new(),
            free_list: Vec::new(),
            strings: Table::new(),
            gray_stack: Vec::new(),
            bytes_allocated: 0,
            next_gc: INITIAL_GC_THRESHOLD,
            stress_gc: false,
            collections: 0,
        }
    }

    /// Force une collecte avant chaque allocation quand `on`, pour les tests
    /// et le mode `--stress-gc` du CLI.
    pub fn set_stress_gc(&mut self, on: bool) {
        self.stress_gc = on;
    }

    /// Fixe le seuil de déclenchement initial, pour l'option `--gc-threshold`
    /// du CLI (remplace `INITIAL_GC_THRESHOLD`).
    pub fn set_gc_threshold(&mut self, bytes: usize) {
        self.next_gc = bytes;
    }

    pub fn stats(&self) -> GcStats {
        GcStats { bytes_allocated: self.bytes_allocated, next_gc: self.next_gc, collections: self.collections }
    }

    pub fn should_collect(&self) -> bool {
        self.stress_gc || self.bytes_allocated > self.next_gc
    }

    pub fn strings(&self) -> &Table<()> {
        &self.strings
    }

    fn cell(&self, r: ObjRef) -> &Cell {
        self.arena[r.index()].as_ref().expect("dangling ObjRef")
    }

    fn cell_mut(&mut self, r: ObjRef) -> &mut Cell {
        self.arena[r.index()].as_mut().expect("dangling ObjRef")
    }

    pub fn object(&self, r: ObjRef) -> &Object {
        &self.cell(r).object
    }

    pub fn object_mut(&mut self, r: ObjRef) -> &mut Object {
        &mut self.cell_mut(r).object
    }

    /// Alloue un objet et renvoie sa référence stable. Réutilise un slot du
    /// free-list laissé par une collecte précédente plutôt que de croître
    /// l'arène sans limite.
    pub fn alloc(&mut self, object: Object) -> ObjRef {
        self.bytes_allocated += object.approx_size();
        let cell = Cell { object, marked: false };
        if let Some(index) = self.free_list.pop() {
            self.arena[index as usize] = Some(cell);
            ObjRef(index)
        } else {
            self.arena.push(Some(cell));
            ObjRef((self.arena.len() - 1) as u32)
        }
    }

    /// Interne une chaîne : renvoie la référence existante si le contenu est
    /// déjà connu, sinon alloue une nouvelle `ObjString` et l'enregistre.
    pub fn intern_str(&mut self, s: &str) -> ObjRef {
        let bytes = s.as_bytes().to_vec();
        let hash = fnv1a_hash(&bytes);
        // La table d'interning vit *dans* le tas qu'elle indexe ; on la sort
        // temporairement pour que `find_string`/`set` puissent reprendre une
        // référence `&Heap` sans se heurter à un double emprunt de `self`.
        let mut strings = std::mem::take(&mut self.strings);
        let found = strings.find_string(self, &bytes, hash);
        let result = if let Some(existing) = found {
            existing
        } else {
            let r = self.alloc(Object::String(ObjString::new(bytes)));
            strings.set(self, r, ());
            r
        };
        self.strings = strings;
        result
    }

    pub fn alloc_function(&mut self, function: ObjFunction) -> ObjRef {
        self.alloc(Object::Function(function))
    }

    pub fn alloc_native(&mut self, name: ObjRef, function: crate::object::NativeFn) -> ObjRef {
        self.alloc(Object::Native(ObjNative { name, function }))
    }

    pub fn alloc_closure(&mut self, closure: ObjClosure) -> ObjRef {
        self.alloc(Object::Closure(closure))
    }

    pub fn alloc_upvalue(&mut self, upvalue: ObjUpvalue) -> ObjRef {
        self.alloc(Object::Upvalue(upvalue))
    }

    pub fn alloc_class(&mut self, class: ObjClass) -> ObjRef {
        self.alloc(Object::Class(class))
    }

    pub fn alloc_instance(&mut self, instance: ObjInstance) -> ObjRef {
        self.alloc(Object::Instance(instance))
    }

    pub fn alloc_bound_method(&mut self, bound: ObjBoundMethod) -> ObjRef {
        self.alloc(Object::BoundMethod(bound))
    }

    pub fn as_string(&self, r: ObjRef) -> &ObjString {
        match self.object(r) {
            Object::String(s) => s,
            other => panic!("expected string, found {}", other.kind()),
        }
    }

    pub fn as_function(&self, r: ObjRef) -> &ObjFunction {
        match self.object(r) {
            Object::Function(f) => f,
            other => panic!("expected function, found {}", other.kind()),
        }
    }

    pub fn as_function_mut(&mut self, r: ObjRef) -> &mut ObjFunction {
        match self.object_mut(r) {
            Object::Function(f) => f,
            other => panic!("expected function, found {}", other.kind()),
        }
    }

    pub fn as_native(&self, r: ObjRef) -> &ObjNative {
        match self.object(r) {
            Object::Native(n) => n,
            other => panic!("expected native fn, found {}", other.kind()),
        }
    }

    pub fn as_closure(&self, r: ObjRef) -> &ObjClosure {
        match self.object(r) {
            Object::Closure(c) => c,
            other => panic!("expected closure, found {}", other.kind()),
        }
    }

    pub fn as_upvalue(&self, r: ObjRef) -> &ObjUpvalue {
        match self.object(r) {
            Object::Upvalue(u) => u,
            other => panic!("expected upvalue, found {}", other.kind()),
        }
    }

    pub fn as_upvalue_mut(&mut self, r: ObjRef) -> &mut ObjUpvalue {
        match self.object_mut(r) {
            Object::Upvalue(u) => u,
            other => panic!("expected upvalue, found {}", other.kind()),
        }
    }

    pub fn as_class(&self, r: ObjRef) -> &ObjClass {
        match self.object(r) {
            Object::Class(c) => c,
            other => panic!("expected class, found {}", other.kind()),
        }
    }

    pub fn as_class_mut(&mut self, r: ObjRef) -> &mut ObjClass {
        match self.object_mut(r) {
            Object::Class(c) => c,
            other => panic!("expected class, found {}", other.kind()),
        }
    }

    pub fn as_instance(&self, r: ObjRef) -> &ObjInstance {
        match self.object(r) {
            Object::Instance(i) => i,
            other => panic!("expected instance, found {}", other.kind()),
        }
    }

    pub fn as_instance_mut(&mut self, r: ObjRef) -> &mut ObjInstance {
        match self.object_mut(r) {
            Object::Instance(i) => i,
            other => panic!("expected instance, found {}", other.kind()),
        }
    }

    pub fn as_bound_method(&self, r: ObjRef) -> &ObjBoundMethod {
        match self.object(r) {
            Object::BoundMethod(b) => b,
            other => panic!("expected bound method, found {}", other.kind()),
        }
    }

    pub fn get_instance_field(&self, instance: ObjRef, key: ObjRef) -> Option<Value> {
        self.as_instance(instance).fields.get(self, key).copied()
    }

    /// La table de champs vit dans la cellule de l'instance elle-même,
    /// donc on l'en sort le temps de l'appel (même figure que [`Heap::intern_str`]).
    pub fn set_instance_field(&mut self, instance: ObjRef, key: ObjRef, value: Value) {
        let mut fields = std::mem::take(&mut self.as_instance_mut(instance).fields);
        fields.set(self, key, value);
        self.as_instance_mut(instance).fields = fields;
    }

    pub fn get_class_method(&self, class: ObjRef, key: ObjRef) -> Option<Value> {
        self.as_class(class).methods.get(self, key).copied()
    }

    pub fn set_class_method(&mut self, class: ObjRef, key: ObjRef, value: Value) {
        let mut methods = std::mem::take(&mut self.as_class_mut(class).methods);
        methods.set(self, key, value);
        self.as_class_mut(class).methods = methods;
    }

    pub fn mark_value(&mut self, value: Value) {
        if let Value::Obj(r) = value {
            self.mark_object(r);
        }
    }

    pub fn mark_object(&mut self, r: ObjRef) {
        if let Some(Some(cell)) = self.arena.get_mut(r.index()) {
            if cell.marked {
                return;
            }
            cell.marked = true;
            self.gray_stack.push(r);
        }
    }

    fn trace_references(&mut self) {
        while let Some(r) = self.gray_stack.pop() {
            let refs = match self.arena.get(r.index()).and_then(|c| c.as_ref()) {
                Some(cell) => outgoing_refs(&cell.object),
                None => continue,
            };
            for obj in refs.objs {
                self.mark_object(obj);
            }
            for value in refs.values {
                self.mark_value(value);
            }
        }
    }

    /// Supprime de la table d'interning les clés qui n'ont pas été marquées
    /// par le parcours précédent (spec §4.1 point 3 : l'interning table ne
    /// garde aucune chaîne en vie par elle-même).
    fn sweep_weak_strings(&mut self) {
        let arena = &self.arena;
        self.strings.remove_unmarked_keys(|r| {
            arena.get(r.index()).and_then(|c| c.as_ref()).map(|c| c.marked).unwrap_or(false)
        });
    }

    fn sweep(&mut self) {
        for (index, slot) in self.arena.iter_mut().enumerate() {
            match slot {
                Some(cell) if cell.marked => cell.marked = false,
                Some(cell) => {
                    self.bytes_allocated = self.bytes_allocated.saturating_sub(cell.object.approx_size());
                    *slot = None;
                    self.free_list.push(index as u32);
                }
                None => {}
            }
        }
    }

    /// Lance une collecte si le seuil courant est dépassé (ou si le mode
    /// stress est actif). `mark_roots` est fourni par l'appelant: `Heap` ne
    /// connaît ni la pile de la VM ni l'état du compilateur.
    pub fn maybe_collect<F: FnOnce(&mut Heap)>(&mut self, mark_roots: F) {
        if self.should_collect() {
            self.collect_with(mark_roots);
        }
    }

    pub fn collect_with<F: FnOnce(&mut Heap)>(&mut self, mark_roots: F) {
        #[cfg(feature = "tracing")]
        let before = self.bytes_allocated;

        mark_roots(self);
        self.trace_references();
        self.sweep_weak_strings();
        self.sweep();
        self.collections += 1;
        self.next_gc = self.bytes_allocated.max(INITIAL_GC_THRESHOLD) * GC_GROWTH_FACTOR;

        #[cfg(feature = "tracing")]
        tracing::debug!(before, after = self.bytes_allocated, next_gc = self.next_gc, "gc collection");
    }

    /// Journalise le désassemblage de `function` à la fin de la compilation,
    /// si le tracing est actif (SPEC_FULL.md §1 : "chunk disassembly on
    /// compile" est une trace ambiante, pas une fonctionnalité exposée au
    /// langage). No-op sans la feature `tracing`.
    pub fn trace_compiled_function(&self, function: ObjRef, label: &str) {
        #[cfg(feature = "tracing")]
        tracing::debug!(name = %label, "{}", self.disassemble_function(function, label));
        #[cfg(not(feature = "tracing"))]
        {
            let _ = (function, label);
        }
    }

    /// Désassemble une fonction compilée en texte humain : une ligne par
    /// instruction, avec les opérandes résolus quand c'est utile (constantes,
    /// cibles de saut, tête d'upvalue de `OP_CLOSURE`).
    pub fn disassemble_function(&self, function: ObjRef, name: &str) -> String {
        use std::fmt::Write as _;
        let chunk = &self.as_function(function).chunk;
        let mut out = String::new();
        let _ = writeln!(out, "== {name} ==");
        let mut offset = 0usize;
        while offset < chunk.len() {
            offset = self.disassemble_instruction(chunk, offset, &mut out);
        }
        out
    }

    fn disassemble_instruction(&self, chunk: &Chunk, offset: usize, out: &mut String) -> usize {
        use std::fmt::Write as _;
        let line = chunk.line_at(offset);
        let op = match OpCode::try_from(chunk.code[offset]) {
            Ok(op) => op,
            Err(byte) => {
                let _ = writeln!(out, "{offset:04} (line {line:>4}) unknown opcode {byte}");
                return offset + 1;
            }
        };
        match op {
            OpCode::Constant | OpCode::GetGlobal | OpCode::DefineGlobal | OpCode::SetGlobal | OpCode::Class => {
                let idx = chunk.code[offset + 1];
                let preview = self.preview_constant(chunk.constant(idx));
                let _ = writeln!(out, "{offset:04} (line {line:>4}) {:<18} {idx:>3} '{preview}'", op.mnemonic());
                offset + 2
            }
            OpCode::GetLocal | OpCode::SetLocal | OpCode::GetUpvalue | OpCode::SetUpvalue
            | OpCode::Call | OpCode::GetProperty | OpCode::SetProperty | OpCode::Method => {
                let idx = chunk.code[offset + 1];
                let _ = writeln!(out, "{offset:04} (line {line:>4}) {:<18} {idx:>3}", op.mnemonic());
                offset + 2
            }
            OpCode::Jump | OpCode::JumpIfFalse | OpCode::Loop => {
                let jump = chunk.read_u16(offset + 1) as usize;
                let target =
                    if op == OpCode::Loop { offset + 3 - jump } else { offset + 3 + jump };
                let _ = writeln!(out, "{offset:04} (line {line:>4}) {:<18} -> {target:04}", op.mnemonic());
                offset + 3
            }
            OpCode::Closure => {
                let const_idx = chunk.code[offset + 1];
                let value = chunk.constant(const_idx);
                let preview = self.preview_constant(value);
                let _ = writeln!(out, "{offset:04} (line {line:>4}) {:<18} {const_idx:>3} '{preview}'", op.mnemonic());
                let mut pos = offset + 2;
                let upvalue_count = value
                    .as_obj()
                    .map(|func_ref| self.as_function(func_ref).upvalue_count)
                    .unwrap_or(0);
                for _ in 0..upvalue_count {
                    let is_local = chunk.code[pos];
                    let index = chunk.code[pos + 1];
                    let kind = if is_local == 1 { "local" } else { "upvalue" };
                    let _ = writeln!(out, "{pos:04}      |      {kind} {index}");
                    pos += 2;
                }
                pos
            }
            _ => {
                let _ = writeln!(out, "{offset:04} (line {line:>4}) {}", op.mnemonic());
                offset + 1
            }
        }
    }

    /// Aperçu humain d'une constante (chaîne, nom de fonction, ou `Display`
    /// générique pour le reste), pour l'annotation du désassemblage.
    fn preview_constant(&self, value: Value) -> String {
        match value {
            Value::Obj(r) => match self.object(r) {
                Object::String(s) => s.as_str().to_string(),
                Object::Function(f) => match f.name {
                    Some(name) => format!("<fn {}>", self.as_string(name).as_str()),
                    None => "<script>".to_string(),
                },
                other => other.kind().to_string(),
            },
            other => other.to_string(),
        }
    }
}

struct Refs {
    objs: Vec<ObjRef>,
    values: Vec<Value>,
}

fn outgoing_refs(object: &Object) -> Refs {
    let mut refs = Refs { objs: Vec::new(), values: Vec::new() };
    match object {
        Object::String(_) => {}
        Object::Function(f) => {
            if let Some(name) = f.name {
                refs.objs.push(name);
            }
            refs.values.extend(f.chunk.constants.iter().copied());
        }
        Object::Native(n) => refs.objs.push(n.name),
        Object::Closure(c) => {
            refs.objs.push(c.function);
            refs.objs.extend(c.upvalues.iter().copied());
        }
        Object::Upvalue(u) => {
            if let UpvalueState::Closed(value) = u.state {
                refs.values.push(value);
            }
        }
        Object::Class(c) => {
            refs.objs.push(c.name);
            for (key, value) in c.methods.iter() {
                refs.objs.push(key);
                refs.values.push(*value);
            }
        }
        Object::Instance(i) => {
            refs.objs.push(i.class);
            for (key, value) in i.fields.iter() {
                refs.objs.push(key);
                refs.values.push(*value);
            }
        }
        Object::BoundMethod(b) => {
            refs.values.push(b.receiver);
            refs.objs.push(b.method);
        }
    }
    refs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_returns_same_ref_for_equal_content() {
        let mut heap = Heap::new();
        let a = heap.intern_str("hello");
        let b = heap.intern_str("hello");
        let c = heap.intern_str("world");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn collect_frees_unreached_strings_and_keeps_rooted_ones() {
        let mut heap = Heap::new();
        let kept = heap.intern_str("kept");
        let _dropped = heap.intern_str("dropped");
        heap.collect_with(|h| h.mark_object(kept));
        assert_eq!(heap.as_string(kept).as_str(), "kept");
        assert!(!heap.free_list.is_empty());
    }

    #[test]
    fn reused_slot_is_picked_up_from_free_list() {
        let mut heap = Heap::new();
        let a = heap.intern_str("a");
        heap.collect_with(|_| {});
        assert!(!heap.free_list.is_empty());
        let before = heap.arena.len();
        let _new_string = heap.alloc(Object::String(ObjString::new(b"fresh".to_vec())));
        assert_eq!(heap.arena.len(), before, "should reuse freed slot instead of growing");
        assert_ne!(a.index(), usize::MAX);
    }

    #[test]
    fn mark_sweep_follows_closure_upvalues_transitively() {
        let mut heap = Heap::new();
        let name = heap.intern_str("f");
        let function = heap.alloc_function(ObjFunction::new(Some(name)));
        let captured = heap.intern_str("captured-string");
        let upvalue = heap.alloc_upvalue(ObjUpvalue { state: UpvalueState::Closed(Value::Obj(captured)) });
        let closure = heap.alloc_closure(ObjClosure { function, upvalues: vec![upvalue] });

        heap.collect_with(|h| h.mark_object(closure));

        assert_eq!(heap.as_string(heap.as_function(heap.as_closure(closure).function).name.unwrap()).as_str(), "f");
        assert_eq!(heap.as_string(captured).as_str(), "captured-string");
    }
}
