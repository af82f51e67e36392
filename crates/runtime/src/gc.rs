//! Mark-and-sweep garbage collection.
//!
//! Every allocation goes through [`Vm::alloc`], which triggers a collection
//! once the live-object count reaches the threshold. Roots are the stack
//! slots below `sp`; additionally the contents of every live array and
//! instance are marked, so values reachable through any container survive.
//! Sweep unlinks and frees unmarked cells and doubles the threshold to
//! twice the surviving population.

use opal_core::object::{Obj, ObjKind};
use opal_core::value::Value;
use tracing::trace;

use crate::vm::Vm;

fn mark(value: Value) {
    if value.is_object() {
        // SAFETY: object values reachable from the roots point at cells in
        // the VM's live list; the sweep below is the only thing that frees
        // them, and it runs after marking completes.
        unsafe {
            (*value.as_object()).marked = true;
        }
    }
}

impl Vm {
    /// Allocate a heap cell, collecting first if the threshold is reached.
    /// The new cell is linked into the live list and is *not* protected
    /// from the next collection until it becomes reachable, so callers push
    /// the value (or keep its sources on the stack) before allocating again.
    pub(crate) fn alloc(&mut self, kind: ObjKind) -> *mut Obj {
        if self.num_objects >= self.max_objects {
            self.collect();
        }

        let obj = Box::new(Obj {
            kind,
            marked: false,
            next: self.first_obj,
        });
        let ptr = Box::into_raw(obj);
        self.first_obj = ptr;
        self.num_objects += 1;
        self.stats.allocations += 1;
        if self.num_objects > self.stats.peak_objects {
            self.stats.peak_objects = self.num_objects;
        }
        ptr
    }

    /// One full mark-and-sweep cycle.
    pub(crate) fn collect(&mut self) {
        trace!(objects = self.num_objects, "collecting garbage");

        // Mark phase: stack roots, then the contents of every live container
        for slot in 0..self.sp {
            mark(self.stack[slot]);
        }
        let mut current = self.first_obj;
        while !current.is_null() {
            // SAFETY: `current` walks the intrusive live list; every node
            // in it is a valid allocation owned by this VM.
            unsafe {
                if let Some(children) = (*current).children() {
                    for child in children {
                        mark(*child);
                    }
                }
                current = (*current).next;
            }
        }

        // Sweep phase: unlink and free unmarked cells, clear the marks of
        // the survivors
        let mut freed = 0usize;
        let mut link: *mut *mut Obj = &mut self.first_obj;
        // SAFETY: `link` always points either at `first_obj` or at the
        // `next` field of a live node; unreached nodes are boxed exactly
        // once and freed exactly once here.
        unsafe {
            while !(*link).is_null() {
                let obj = *link;
                if (*obj).marked {
                    (*obj).marked = false;
                    link = &mut (*obj).next;
                } else {
                    *link = (*obj).next;
                    drop(Box::from_raw(obj));
                    freed += 1;
                }
            }
        }

        self.num_objects -= freed;
        self.stats.objects_freed += freed as u64;
        self.stats.collections += 1;
        self.max_objects = (self.num_objects * 2).max(8);

        trace!(freed, live = self.num_objects, "sweep finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reachable_values_survive_sweep() {
        let mut vm = Vm::with_output(Box::new(std::io::sink()));
        let obj = vm.alloc(ObjKind::Str("rooted".to_string()));
        vm.push(Value::object(obj));
        // Garbage that nothing references
        for _ in 0..10 {
            vm.alloc(ObjKind::Str("garbage".to_string()));
        }

        vm.collect();
        assert_eq!(vm.num_objects(), 1);
        // SAFETY: the rooted object survived the sweep.
        unsafe {
            assert_eq!((*obj).as_str().unwrap(), "rooted");
        }
        vm.pop();
    }

    #[test]
    fn test_container_contents_survive_sweep() {
        let mut vm = Vm::with_output(Box::new(std::io::sink()));
        let inner = vm.alloc(ObjKind::Str("inner".to_string()));
        let array = vm.alloc(ObjKind::Array(vec![Value::object(inner)]));
        vm.push(Value::object(array));

        vm.collect();
        assert_eq!(vm.num_objects(), 2);

        // Dropping the root releases both on the following sweeps
        vm.pop();
        vm.collect();
        // The array goes first; its former child is unreferenced next round
        vm.collect();
        assert_eq!(vm.num_objects(), 0);
    }

    #[test]
    fn test_threshold_doubles_after_sweep() {
        let mut vm = Vm::with_output(Box::new(std::io::sink()));
        for _ in 0..6 {
            let obj = vm.alloc(ObjKind::Str("keep".to_string()));
            vm.push(Value::object(obj));
        }
        vm.collect();
        assert_eq!(vm.num_objects(), 6);
        assert_eq!(vm.max_objects, 12);
    }

    #[test]
    fn test_allocation_triggers_collection_at_threshold() {
        let mut vm = Vm::with_output(Box::new(std::io::sink()));
        // Initial threshold is 8: the ninth allocation must sweep the
        // eight unreachable ones before linking itself
        for _ in 0..9 {
            vm.alloc(ObjKind::Str("x".to_string()));
        }
        assert_eq!(vm.stats.collections, 1);
        assert_eq!(vm.num_objects(), 1);
    }
}
