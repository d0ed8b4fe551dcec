//! table.rs — table de hachage à adressage ouvert, clés = chaînes internées.
//!
//! Sondage linéaire, tombstones, redimensionnement à charge 0.75 (spec §4.3).
//! Comme toutes les clés passées à [`Table::get`]/[`set`]/[`delete`] sont déjà
//! internées (même contenu ⇒ même [`ObjRef`]), comparer des clés se réduit à
//! comparer des indices — seul [`Table::find_string`] (utilisé pendant
//! l'interning lui-même, avant qu'une référence canonique existe) compare des
//! octets bruts via le tas.

use crate::heap::Heap;
use crate::object::ObjRef;

const MIN_CAPACITY: usize = 8;
const MAX_LOAD: f64 = 0.75;

#[derive(Clone)]
enum Slot<V> {
    Empty,
    Tombstone,
    Occupied { key: ObjRef, value: V },
}

/// Table générique : sert aux globales, aux méthodes de classe, aux champs
/// d'instance (`Table<Value>`) et à l'ensemble d'interning (`Table<()>`).
#[derive(Clone)]
pub struct Table<V> {
    slots: Vec<Slot<V>>,
    /// Occupées + tombstones (c'est ce compteur qui déclenche le resize).
    count: usize,
    /// Occupées seulement.
    len: usize,
}

impl<V> Default for Table<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Table<V> {
    pub fn new() -> Self {
        Self { slots: Vec::new(), count: 0, len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn key_hash(heap: &Heap, key: ObjRef) -> u64 {
        heap.as_string(key).hash
    }

    /// Trouve l'index où `key` vit, ou le premier slot libre/tombstone
    /// réutilisable sur le chemin de sondage.
    fn find_slot(slots: &[Slot<V>], hash: u64, key: ObjRef) -> usize {
        let capacity = slots.len() as u64;
        let mut index = (hash % capacity) as usize;
        let mut tombstone: Option<usize> = None;
        loop {
            match &slots[index] {
                Slot::Empty => return tombstone.unwrap_or(index),
                Slot::Tombstone => {
                    if tombstone.is_none() {
                        tombstone = Some(index);
                    }
                }
                Slot::Occupied { key: k, .. } if *k == key => return index,
                Slot::Occupied { .. } => {}
            }
            index = (index + 1) % slots.len();
        }
    }

    fn grow(&mut self, heap: &Heap) {
        let new_cap = (self.capacity() * 2).max(MIN_CAPACITY);
        let mut new_slots: Vec<Slot<V>> = (0..new_cap).map(|_| Slot::Empty).collect();
        let mut live = 0usize;
        for slot in std::mem::take(&mut self.slots) {
            if let Slot::Occupied { key, value } = slot {
                let hash = Self::key_hash(heap, key);
                let idx = Self::find_slot(&new_slots, hash, key);
                new_slots[idx] = Slot::Occupied { key, value };
                live += 1;
            }
        }
        self.slots = new_slots;
        self.count = live;
        self.len = live;
    }

    /// Insère ou remplace. Renvoie `true` si la clé était absente (nouvelle entrée).
    pub fn set(&mut self, heap: &Heap, key: ObjRef, value: V) -> bool {
        if (self.count + 1) as f64 > self.capacity() as f64 * MAX_LOAD {
            self.grow(heap);
        }
        let hash = Self::key_hash(heap, key);
        let idx = Self::find_slot(&self.slots, hash, key);
        let was_new = !matches!(self.slots[idx], Slot::Occupied { .. });
        let was_tombstone = matches!(self.slots[idx], Slot::Tombstone);
        self.slots[idx] = Slot::Occupied { key, value };
        if was_new {
            self.len += 1;
            if !was_tombstone {
                self.count += 1;
            }
        }
        was_new
    }

    pub fn get(&self, heap: &Heap, key: ObjRef) -> Option<&V> {
        if self.slots.is_empty() {
            return None;
        }
        let hash = Self::key_hash(heap, key);
        let idx = Self::find_slot(&self.slots, hash, key);
        match &self.slots[idx] {
            Slot::Occupied { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn contains(&self, heap: &Heap, key: ObjRef) -> bool {
        self.get(heap, key).is_some()
    }

    /// Écrit une tombstone (count inchangé) : les chaînes de sondage restent intactes.
    pub fn delete(&mut self, heap: &Heap, key: ObjRef) -> bool {
        if self.slots.is_empty() {
            return false;
        }
        let hash = Self::key_hash(heap, key);
        let idx = Self::find_slot(&self.slots, hash, key);
        if matches!(self.slots[idx], Slot::Occupied { .. }) {
            self.slots[idx] = Slot::Tombstone;
            self.len -= 1;
            true
        } else {
            false
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjRef, &V)> {
        self.slots.iter().filter_map(|s| match s {
            Slot::Occupied { key, value } => Some((*key, value)),
            _ => None,
        })
    }

    pub fn add_all(&mut self, heap: &Heap, other: &Table<V>)
    where
        V: Clone,
    {
        for (key, value) in other.iter() {
            self.set(heap, key, value.clone());
        }
    }

    /// Unique entrée non pré-internée : sonde par hash brut et compare
    /// longueur + hash + octets pour détecter qu'une chaîne candidate est
    /// déjà internée. `V` doit être `()` en pratique (ensemble d'interning).
    pub fn find_string(&self, heap: &Heap, bytes: &[u8], hash: u64) -> Option<ObjRef> {
        if self.slots.is_empty() {
            return None;
        }
        let capacity = self.slots.len() as u64;
        let mut index = (hash % capacity) as usize;
        loop {
            match &self.slots[index] {
                Slot::Empty => return None,
                Slot::Occupied { key, .. } => {
                    let candidate = heap.as_string(*key);
                    if candidate.hash == hash && candidate.bytes == bytes {
                        return Some(*key);
                    }
                }
                Slot::Tombstone => {}
            }
            index = (index + 1) % self.slots.len();
        }
    }

    /// Retire les entrées dont la clé n'est plus marquée (phase "poids
    /// faible" du GC avant le sweep — spec §4.1 point 3). Ne s'applique qu'à
    /// la table d'interning, qui ne doit pas maintenir des chaînes en vie.
    pub fn remove_unmarked_keys(&mut self, is_marked: impl Fn(ObjRef) -> bool) {
        for slot in &mut self.slots {
            if let Slot::Occupied { key, .. } = slot {
                if !is_marked(*key) {
                    *slot = Slot::Tombstone;
                    self.len -= 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::Heap;

    #[test]
    fn round_trip_set_get() {
        let mut heap = Heap::new();
        let mut table: Table<i64> = Table::new();
        let k1 = heap.intern_str("alpha");
        let k2 = heap.intern_str("beta");
        assert!(table.set(&heap, k1, 1));
        assert!(table.set(&heap, k2, 2));
        assert!(!table.set(&heap, k1, 10));
        assert_eq!(table.get(&heap, k1), Some(&10));
        assert_eq!(table.get(&heap, k2), Some(&2));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn delete_leaves_tombstone_but_preserves_probe_chain() {
        let mut heap = Heap::new();
        let mut table: Table<i64> = Table::new();
        let names: Vec<_> = (0..20).map(|i| heap.intern_str(&format!("k{i}"))).collect();
        for (i, &k) in names.iter().enumerate() {
            table.set(&heap, k, i as i64);
        }
        assert!(table.delete(&heap, names[3]));
        assert_eq!(table.get(&heap, names[3]), None);
        // Toutes les autres clés doivent rester lisibles malgré la tombstone.
        for (i, &k) in names.iter().enumerate() {
            if i == 3 {
                continue;
            }
            assert_eq!(table.get(&heap, k), Some(&(i as i64)));
        }
    }

    #[test]
    fn grow_collapses_tombstones_and_resets_count() {
        let mut heap = Heap::new();
        let mut table: Table<i64> = Table::new();
        for i in 0..50 {
            let k = heap.intern_str(&format!("n{i}"));
            table.set(&heap, k, i);
        }
        for i in 0..25 {
            let k = heap.intern_str(&format!("n{i}"));
            table.delete(&heap, k);
        }
        assert_eq!(table.len(), 25);
        for i in 25..50 {
            let k = heap.intern_str(&format!("n{i}"));
            assert_eq!(table.get(&heap, k), Some(&i));
        }
    }

    #[test]
    fn find_string_detects_existing_intern_without_prior_reference() {
        let mut heap = Heap::new();
        let r = heap.intern_str("hello");
        let hash = crate::object::fnv1a_hash(b"hello");
        let found = heap.strings().find_string(&heap, b"hello", hash);
        assert_eq!(found, Some(r));
    }
}
