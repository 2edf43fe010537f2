//! Runtime objects and per-class object registries.

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::util::fold_name;
use crate::value::Value;

/// Identifies a live (or formerly-live) object. Indexes [`ObjectTable`];
/// stable for the lifetime of the object, including across `delete`
/// (subsequent dereferences simply resolve to null).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(pub u32);

/// A live class instance.
///
/// Field storage is keyed by folded (case-insensitive) name per
/// `crate::util::fold_name`; `IndexMap` keeps declaration order so debug
/// dumps and `foreach`-style field iteration stay deterministic.
#[derive(Debug)]
pub struct RuntimeObject {
    pub class_name: String,
    pub fields: IndexMap<String, Value, ahash::RandomState>,
    pub index_in_class_list: usize,
    pub ref_count: u32,
    pub marked_for_deletion: bool,
}

impl RuntimeObject {
    pub fn new(class_name: String, index_in_class_list: usize) -> Self {
        Self {
            class_name,
            fields: IndexMap::default(),
            index_in_class_list,
            ref_count: 1,
            marked_for_deletion: false,
        }
    }

    pub fn get_field(&self, name: &str) -> Option<&Value> {
        self.fields.get(&fold_name(name))
    }

    pub fn set_field(&mut self, name: &str, value: Value) {
        self.fields.insert(fold_name(name), value);
    }
}

/// Owns every live and zombie object created during a VM session.
///
/// Objects are never physically removed from the table on `delete` —
/// `ObjectId`s must stay valid forever so a dangling reference resolves to
/// null instead of reusing a stale slot for an unrelated object.
#[derive(Debug, Default)]
pub struct ObjectTable {
    objects: Vec<Option<RuntimeObject>>,
    /// Per-class ordered list of live object ids, used by `listaobj`
    /// iteration and by `New`'s "append to the class's object list" rule.
    class_lists: AHashMap<String, Vec<ObjectId>>,
}

impl ObjectTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self, class_name: &str) -> ObjectId {
        let folded = fold_name(class_name);
        let list = self.class_lists.entry(folded).or_default();
        let index_in_class_list = list.len();
        let id = ObjectId(self.objects.len() as u32);
        self.objects.push(Some(RuntimeObject::new(class_name.to_owned(), index_in_class_list)));
        list.push(id);
        id
    }

    pub fn get(&self, id: ObjectId) -> Option<&RuntimeObject> {
        self.objects.get(id.0 as usize).and_then(Option::as_ref).filter(|o| !o.marked_for_deletion)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut RuntimeObject> {
        self.objects.get_mut(id.0 as usize).and_then(Option::as_mut).filter(|o| !o.marked_for_deletion)
    }

    /// Marks `id` for deletion and detaches it from its class's object
    /// list. The slot is kept (as a tombstone) so the id stays stable.
    pub fn delete(&mut self, id: ObjectId) {
        let Some(Some(obj)) = self.objects.get_mut(id.0 as usize) else {
            return;
        };
        if obj.marked_for_deletion {
            return;
        }
        obj.marked_for_deletion = true;
        let folded = fold_name(&obj.class_name);
        let removed_index = obj.index_in_class_list;
        if let Some(list) = self.class_lists.get_mut(&folded) {
            if let Some(pos) = list.iter().position(|&existing| existing == id) {
                list.remove(pos);
                for (new_index, &later_id) in list.iter().enumerate().skip(pos) {
                    if let Some(Some(later)) = self.objects.get_mut(later_id.0 as usize) {
                        later.index_in_class_list = new_index;
                    }
                }
            }
        }
        let _ = removed_index;
    }

    pub fn class_list(&self, class_name: &str) -> &[ObjectId] {
        self.class_lists.get(&fold_name(class_name)).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delete_is_idempotent_and_detaches_from_class_list() {
        let mut table = ObjectTable::new();
        let a = table.allocate("Forma");
        let b = table.allocate("Forma");
        assert_eq!(table.class_list("forma").len(), 2);

        table.delete(a);
        table.delete(a);
        assert!(table.get(a).is_none());
        assert_eq!(table.class_list("FORMA"), &[b]);
    }
}
