//! Nested block programs and the per-template program cache.
//!
//! A compiled template renders each `{{#block}}...{{/block}}` body through a
//! [`BlockFn`] emitted by the compiler. Helpers never see block functions
//! directly: they receive [`Program`]s, which close over the block function,
//! an optional data snapshot and, for depth-aware blocks, ancestor contexts.

use crate::errors::RenderResult;
use crate::value::Value;
use crate::vm::Frame;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

#[cfg(test)]
#[path = "program_tests.rs"]
mod tests;

/// A generated block-rendering function.
///
/// Arguments are the current frame, the block's context, the resolved data
/// and the ancestor contexts captured by [`program_with_depth`].
pub type BlockFn =
    Arc<dyn Fn(&Frame<'_>, &Value, Option<&Value>, &[Value]) -> RenderResult + Send + Sync>;

/// Wraps a closure as a [`BlockFn`].
pub fn block_fn<F>(f: F) -> BlockFn
where
    F: Fn(&Frame<'_>, &Value, Option<&Value>, &[Value]) -> RenderResult + Send + Sync + 'static,
{
    Arc::new(f)
}

/// A callable nested block.
///
/// Cloning a program is cheap and keeps its identity, see [`Program::ptr_eq`].
#[derive(Clone)]
pub struct Program {
    inner: Arc<ProgramInner>,
}

struct ProgramInner {
    block: BlockFn,
    data: Option<Value>,
    depths: Vec<Value>,
}

/// Wraps `block` so that caller-supplied data takes precedence over `data`.
///
/// # Examples
///
/// ```rust
/// # use template_runtime::{block_fn, program, Value};
/// let block = block_fn(|_, context, _, _| Ok(context.to_string()));
/// let wrapped = program(block, Some(Value::from("captured")));
/// assert_eq!(wrapped.data(), Some(&Value::from("captured")));
/// ```
pub fn program(block: BlockFn, data: Option<Value>) -> Program {
    program_with_depth(block, data, Vec::new())
}

/// Like [`program`], additionally appending `depths` after the context and
/// data when the block is invoked.
///
/// The captured values are the ancestor scopes a block addresses with
/// `../` paths.
pub fn program_with_depth(block: BlockFn, data: Option<Value>, depths: Vec<Value>) -> Program {
    Program {
        inner: Arc::new(ProgramInner {
            block,
            data,
            depths,
        }),
    }
}

impl Program {
    /// Renders the block against `context`.
    ///
    /// Truthy `data` overrides the data captured when the program was
    /// created; falsy `data` counts as absent.
    ///
    /// # Errors
    ///
    /// Returns whatever the block function returns.
    pub fn call(&self, frame: &Frame<'_>, context: &Value, data: Option<&Value>) -> RenderResult {
        let data = data
            .filter(|data| data.is_truthy())
            .or(self.inner.data.as_ref());
        (self.inner.block)(frame, context, data, &self.inner.depths)
    }

    /// The data snapshot captured at creation.
    pub fn data(&self) -> Option<&Value> {
        self.inner.data.as_ref()
    }

    /// The ancestor contexts captured at creation.
    pub fn depths(&self) -> &[Value] {
        &self.inner.depths
    }

    /// Whether both handles refer to the same program instance.
    pub fn ptr_eq(a: &Program, b: &Program) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program")
            .field("data", &self.inner.data)
            .field("depths", &self.inner.depths.len())
            .finish_non_exhaustive()
    }
}

/// Index-addressed cache of programs owned by one compiled template.
///
/// Slots are populated lazily and the first population wins, so every
/// render of the template reuses one program per nested block.
#[derive(Default)]
pub struct ProgramRegistry {
    programs: RwLock<Vec<Option<Program>>>,
}

impl ProgramRegistry {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the program for block `index`.
    ///
    /// Supplying truthy `data` always builds a fresh program scoped to it
    /// and leaves the cache untouched. Otherwise, falsy data included, the
    /// cached program is returned, creating it from `block` on first use.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use template_runtime::{block_fn, Program, ProgramRegistry, Value};
    /// let registry = ProgramRegistry::new();
    /// let block = block_fn(|_, _, _, _| Ok(String::new()));
    ///
    /// let first = registry.get(0, &block, None);
    /// assert!(Program::ptr_eq(&first, &registry.get(0, &block, Some(Value::Null))));
    /// assert!(!Program::ptr_eq(&first, &registry.get(0, &block, Some(Value::from("d")))));
    /// ```
    pub fn get(&self, index: usize, block: &BlockFn, data: Option<Value>) -> Program {
        if let Some(data) = data.filter(Value::is_truthy) {
            return program(Arc::clone(block), Some(data));
        }

        {
            let programs = self.programs.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(Some(cached)) = programs.get(index) {
                return cached.clone();
            }
        }

        let mut programs = self.programs.write().unwrap_or_else(PoisonError::into_inner);
        if programs.len() <= index {
            programs.resize(index + 1, None);
        }
        programs[index]
            .get_or_insert_with(|| {
                debug!("Program cache populated for block {}", index);
                program(Arc::clone(block), None)
            })
            .clone()
    }

    /// Number of populated slots.
    pub fn len(&self) -> usize {
        self.programs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|slot| slot.is_some())
            .count()
    }

    /// Whether no slot has been populated yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
