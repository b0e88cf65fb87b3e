//! Invocation contexts.
//!
//! A [`Context`] is the unit an embedder runs entry points through. It
//! owns one [`Interpreter`], the mount table its programs see, and the
//! services they run under (allocator, console, lifecycle hooks).
//! Contexts are independent: each owns its register stack, stacktrace
//! and memory checker exclusively, so separate contexts may execute
//! concurrently over one shared program as long as each stays on its
//! own thread.

use std::fmt;
use std::sync::Arc;

use builtins::{Console, StdoutConsole};
use core_types::{AtomId, InstanceId, Register, Trap, TrapKind};
use ir_system::AtomMapping;
use memory_manager::{Allocator, SystemAllocator, TrackedBlock};

use crate::dispatch::{Interpreter, MAX_CALL_DEPTH};
use crate::program::Program;
use crate::vfs::{LocalFilesystem, MountTable, VirtualFilesystem};

/// Decides whether a new context may be created. Returning false
/// vetoes the creation.
pub type CreateHook = Box<dyn Fn() -> bool + Send + Sync>;

/// Observes the teardown of a context, after leak reporting.
pub type TeardownHook = Box<dyn FnMut() + Send>;

/// Services and limits a context is built with.
pub struct ContextConfig {
    allocator: Arc<dyn Allocator>,
    console: Arc<dyn Console>,
    max_call_depth: usize,
    on_create: Option<CreateHook>,
    on_teardown: Option<TeardownHook>,
}

impl ContextConfig {
    /// Starts from the defaults: system allocator, process console, no
    /// hooks.
    pub fn new() -> Self {
        ContextConfig {
            allocator: Arc::new(SystemAllocator::new()),
            console: Arc::new(StdoutConsole::new()),
            max_call_depth: MAX_CALL_DEPTH,
            on_create: None,
            on_teardown: None,
        }
    }

    /// Routes program heap operations through `allocator`.
    pub fn with_allocator(mut self, allocator: Arc<dyn Allocator>) -> Self {
        self.allocator = allocator;
        self
    }

    /// Sends console intrinsics and diagnostics to `console`.
    pub fn with_console(mut self, console: Arc<dyn Console>) -> Self {
        self.console = console;
        self
    }

    /// Replaces the call depth limit.
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    /// Installs the veto consulted before a context is created.
    pub fn with_create_hook(mut self, hook: CreateHook) -> Self {
        self.on_create = Some(hook);
        self
    }

    /// Installs the observer run when the context is dropped.
    pub fn with_teardown_hook(mut self, hook: TeardownHook) -> Self {
        self.on_teardown = Some(hook);
        self
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        ContextConfig::new()
    }
}

impl fmt::Debug for ContextConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextConfig")
            .field("max_call_depth", &self.max_call_depth)
            .field("has_create_hook", &self.on_create.is_some())
            .field("has_teardown_hook", &self.on_teardown.is_some())
            .finish_non_exhaustive()
    }
}

/// One logical thread of execution over a program.
///
/// Dropping a context reports blocks the program never released, frees
/// them, and then runs the teardown observer.
pub struct Context {
    interpreter: Interpreter,
    vfs: Arc<MountTable>,
    on_teardown: Option<TeardownHook>,
}

impl Context {
    /// Creates a context over `map` with the default configuration.
    pub fn new(map: Arc<dyn AtomMapping>) -> Self {
        Context::build(Arc::new(Program::new(map)), ContextConfig::new())
    }

    /// Creates a configured context over `map`.
    ///
    /// Returns `None` when the configuration's create hook vetoes the
    /// context.
    pub fn with_config(map: Arc<dyn AtomMapping>, config: ContextConfig) -> Option<Self> {
        Context::with_program(Arc::new(Program::new(map)), config)
    }

    /// Creates a configured context over a prepared program, the route
    /// for embedders that register their own intrinsics.
    ///
    /// Returns `None` when the configuration's create hook vetoes the
    /// context.
    pub fn with_program(program: Arc<Program>, config: ContextConfig) -> Option<Self> {
        if let Some(hook) = &config.on_create {
            if !hook() {
                return None;
            }
        }
        Some(Context::build(program, config))
    }

    fn build(program: Arc<Program>, config: ContextConfig) -> Self {
        let vfs = Arc::new(MountTable::new());
        // The root mount is the fallback when nothing longer matches.
        vfs.mount("/", Arc::new(LocalFilesystem::new(".")));

        let mut interpreter = Interpreter::new(
            program,
            config.allocator,
            config.console,
            Arc::clone(&vfs),
        );
        interpreter.set_max_call_depth(config.max_call_depth);

        Context {
            interpreter,
            vfs,
            on_teardown: config.on_teardown,
        }
    }

    /// Runs one atom instance to completion.
    ///
    /// `args` are copied into the entry frame the same way pushed
    /// arguments reach a callee. `Err` means the invocation aborted:
    /// the diagnostic has been written, surviving heap blocks have
    /// been released and the context is ready for the next call.
    pub fn invoke(
        &mut self,
        atom: AtomId,
        instance: InstanceId,
        args: &[Register],
    ) -> Result<Register, Trap> {
        self.interpreter.execute(atom, instance, args)
    }

    /// Runs instance 0 of an atom, the conventional instance of a
    /// plain function.
    pub fn invoke_atom(&mut self, atom: AtomId, args: &[Register]) -> Result<Register, Trap> {
        self.invoke(atom, InstanceId(0), args)
    }

    /// Runs a function found by source-level name.
    pub fn invoke_name(&mut self, name: &str, args: &[Register]) -> Result<Register, Trap> {
        let atom = self
            .interpreter
            .program()
            .mapping()
            .find(name)
            .ok_or_else(|| {
                Trap::new(TrapKind::UnknownAtom, format!("no atom named '{}'", name))
            })?;
        self.invoke_atom(atom, args)
    }

    /// The program this context executes.
    pub fn program(&self) -> &Program {
        self.interpreter.program()
    }

    /// Adds a filesystem backend under `prefix`.
    pub fn mount(&self, prefix: impl Into<String>, fs: Arc<dyn VirtualFilesystem>) {
        self.vfs.mount(prefix, fs);
    }

    /// The mount table programs resolve paths through.
    pub fn vfs(&self) -> &MountTable {
        self.vfs.as_ref()
    }

    /// The interpreter, for diagnostics.
    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    /// Number of heap blocks the program has not released.
    pub fn live_block_count(&self) -> usize {
        self.interpreter.live_block_count()
    }

    /// Payload bytes the program has not released.
    pub fn live_block_bytes(&self) -> usize {
        self.interpreter.live_block_bytes()
    }

    /// Blocks the program has not released, sorted by address.
    pub fn leaks(&self) -> Vec<(usize, TrackedBlock)> {
        self.interpreter.leaks()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("interpreter", &self.interpreter)
            .field("vfs", &self.vfs)
            .finish_non_exhaustive()
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.interpreter.report_leaks();
        self.interpreter.purge_heap();
        if let Some(hook) = &mut self.on_teardown {
            hook();
        }
    }
}
