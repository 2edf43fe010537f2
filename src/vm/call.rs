//! Method dispatch, instance construction/deletion and lazy constant
//! evaluation.

use ahash::AHashSet;

use crate::class::ClassLoader;
use crate::object::ObjectId;
use crate::resource::ResourceTracker;
use crate::tracer::VmTracer;
use crate::util::fold_name;
use crate::value::Value;

use super::dynamic;
use super::{Frame, RunFault, Vm};

/// `class_name` followed by its resolved ancestors, most-derived first —
/// the order constructors zero-initialize fields and method/variable
/// lookup walks.
fn ancestor_chain(loader: &ClassLoader, class_name: &str) -> Vec<String> {
    let mut chain = vec![class_name.to_owned()];
    if let Some(bases) = loader.resolved_bases(class_name) {
        chain.extend(bases.ancestors.iter().cloned());
    }
    chain
}

impl<R: ResourceTracker, T: VmTracer> Vm<R, T> {
    /// Runs a bytecode thunk to completion in its own call stack. Used for
    /// lazily-evaluated constants (`ConstantValue::Thunk`); recursion here
    /// is bounded by how deeply one constant's initializer references
    /// another, never by ordinary method-call nesting (that uses the
    /// iterative frame stack in `run_frames`).
    pub(super) fn eval_thunk<'u>(
        &mut self,
        loader: &'u ClassLoader,
        code: &'u crate::bytecode::Code,
        strings: &'u crate::intern::StringPool,
        defining_class: &'u str,
        receiver: Option<ObjectId>,
    ) -> Result<Value, RunFault> {
        let mut sub_frames = vec![Frame {
            code,
            strings,
            defining_class,
            ip: 0,
            locals: vec![Value::Null; code.num_locals as usize],
            receiver,
            args: Vec::new(),
        }];
        let mut sub_stack = Vec::new();
        self.run_frames(loader, &mut sub_frames, &mut sub_stack)
    }

    /// Resolves the value pushed by `LoadThis`/a receiver expression into
    /// the class to search and, for instances, the object itself.
    pub(super) fn resolve_receiver(&self, value: &Value) -> Option<(String, Option<ObjectId>)> {
        match value {
            Value::Object(id) => self.objects.get(*id).map(|o| (o.class_name.clone(), Some(*id))),
            Value::Str(s) => Some((s.to_string(), None)),
            _ => None,
        }
    }

    /// `New <class>(argc)`: allocates the object, zero-initializes every
    /// declared field across the ancestor chain (most-derived declaration
    /// wins), then runs `construtor` if the class or an ancestor defines
    /// one (case-insensitive, optional).
    pub(super) fn exec_new(&mut self, loader: &ClassLoader, class_name: &str, args: Vec<Value>) -> Result<Value, RunFault> {
        let id = self.objects.allocate(class_name);
        self.tracer.on_new(class_name);

        let mut seen: AHashSet<String> = AHashSet::new();
        for cls in ancestor_chain(loader, class_name) {
            let Some(unit) = loader.unit(&cls) else { continue };
            for var in &unit.variables {
                let folded = fold_name(&var.name);
                if !seen.insert(folded.clone()) {
                    continue;
                }
                if var.common {
                    self.commons
                        .entry(fold_name(&unit.class_name))
                        .or_default()
                        .entry(folded)
                        .or_insert_with(|| dynamic::default_for_variable(var));
                } else if let Some(obj) = self.objects.get_mut(id) {
                    if obj.get_field(&folded).is_none() {
                        obj.set_field(&folded, dynamic::default_for_variable(var));
                    }
                }
            }
        }

        if let Some((owner, func)) = loader.find_method(class_name, "construtor") {
            let strings = &loader.unit(owner).expect("owner returned by find_method").strings;
            let mut sub_frames = vec![Frame {
                code: &func.code,
                strings,
                defining_class: owner,
                ip: 0,
                locals: vec![Value::Null; func.code.num_locals as usize],
                receiver: Some(id),
                args,
            }];
            let mut sub_stack = Vec::new();
            self.run_frames(loader, &mut sub_frames, &mut sub_stack)?;
        }

        Ok(Value::Object(id))
    }

    /// `apaga`/`Delete`: runs `destrutor` if present, then tombstones the
    /// object. Deleting a non-object value or an already-deleted id is a
    /// silent no-op.
    pub(super) fn exec_delete(&mut self, loader: &ClassLoader, value: Value) -> Result<(), RunFault> {
        let Value::Object(id) = value else { return Ok(()) };
        let Some(class_name) = self.objects.get(id).map(|o| o.class_name.clone()) else {
            return Ok(());
        };
        if let Some((owner, func)) = loader.find_method(&class_name, "destrutor") {
            let strings = &loader.unit(owner).expect("owner returned by find_method").strings;
            let mut sub_frames = vec![Frame {
                code: &func.code,
                strings,
                defining_class: owner,
                ip: 0,
                locals: vec![Value::Null; func.code.num_locals as usize],
                receiver: Some(id),
                args: Vec::new(),
            }];
            let mut sub_stack = Vec::new();
            self.run_frames(loader, &mut sub_frames, &mut sub_stack)?;
        }
        self.tracer.on_delete(&class_name);
        self.objects.delete(id);
        Ok(())
    }
}
