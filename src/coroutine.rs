//! Coroutine contexts, the per-thread registry and the public operations.
//!
//! The model is strictly single-threaded cooperative: each thread owns an
//! independent registry of contexts, exactly one of which is `Running` at any
//! instant. Control moves only through [`switch`], which carries one owned
//! value in each direction. The thread's original flow of execution is
//! represented by an implicit root context, materialized the first time this
//! module is touched on a thread.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::process;

use crate::arch::{self, SavedRegs};
use crate::error::{Error, Result};
use crate::stack::{OsStack, Stack};

/// Opaque payload carried across a switch.
///
/// Ownership moves into [`switch`] and back out of whichever pending `switch`
/// call the transfer resumes; the value is never aliased across the boundary.
pub type Transfer = Box<dyn Any>;

/// Opaque identifier of a live context on the current thread.
///
/// Handles are single-use: after [`delete`] the handle is dead and every
/// operation on it fails. Handles are not `Send`, so a context can never be
/// switched into from a thread other than the one that created it.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    id: NonZeroUsize,
    // Contexts are confined to the thread whose registry owns them.
    _not_send: PhantomData<*mut ()>,
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({})", self.id)
    }
}

fn handle(id: NonZeroUsize) -> Handle {
    Handle {
        id,
        _not_send: PhantomData,
    }
}

/// Lifecycle of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Created but never switched into; the entry action has not run.
    Created,
    /// Currently executing. Exactly one context per thread is `Running`.
    Running,
    /// Parked inside a `switch` call, waiting to be switched back into.
    Suspended,
    /// The entry action returned (or panicked). Terminal; only `delete` may
    /// act on the context now.
    Finished,
}

impl Status {
    /// Whether a switch into a context in this state is legal.
    pub const fn is_resumable(self) -> bool {
        matches!(self, Status::Created | Status::Suspended)
    }

    /// Whether the context has terminated.
    pub const fn is_terminated(self) -> bool {
        matches!(self, Status::Finished)
    }
}

type Action = Box<dyn FnOnce(Transfer) -> Transfer>;

struct Context {
    regs: SavedRegs,
    status: Status,
    parent: NonZeroUsize,
    // None only for the root context, which runs on the thread's own stack.
    stack: Option<OsStack>,
    // Consumed by the first switch-in.
    action: Option<Action>,
}

/// Value parked in the registry while control crosses between two stacks.
enum Payload {
    Value(Transfer),
    Panic(Box<dyn Any + Send>),
}

const ROOT_ID: NonZeroUsize = NonZeroUsize::MIN;

struct Registry {
    table: HashMap<NonZeroUsize, Box<Context>>,
    current: NonZeroUsize,
    next_id: usize,
    // In-flight transfer value. Some only for the duration of one switch.
    payload: Option<Payload>,
}

impl Registry {
    fn new() -> Registry {
        let root = Box::new(Context {
            regs: SavedRegs::default(),
            status: Status::Running,
            parent: ROOT_ID,
            stack: None,
            action: None,
        });
        let mut table = HashMap::new();
        table.insert(ROOT_ID, root);
        Registry {
            table,
            current: ROOT_ID,
            next_id: ROOT_ID.get() + 1,
            payload: None,
        }
    }

    fn alloc_id(&mut self) -> NonZeroUsize {
        let id = NonZeroUsize::new(self.next_id).expect("context id counter overflowed");
        self.next_id += 1;
        id
    }
}

thread_local! {
    static REGISTRY: RefCell<Registry> = RefCell::new(Registry::new());
}

/// Returns the handle of the currently executing context.
///
/// Never fails. On a thread where no coroutine has ever run this returns the
/// implicit root context representing the original caller.
pub fn current() -> Handle {
    REGISTRY.with(|r| handle(r.borrow().current))
}

/// Reports the lifecycle status of a context, or `None` once it has been
/// deleted.
pub fn status(h: Handle) -> Option<Status> {
    REGISTRY.with(|r| r.borrow().table.get(&h.id).map(|c| c.status))
}

/// Creates a new context that will run `action` on its own `stack_size`-byte
/// stack when first switched into.
///
/// Creation allocates but never transfers control: the current context keeps
/// running and `action` is not invoked until the first [`switch`] into the
/// returned handle, which passes the switched value as its argument.
///
/// `parent` is the context control falls back to when `action` returns; it is
/// not validated here (the only failure of `create` is stack allocation) and
/// a parent that is gone by completion time is replaced by the root context.
pub fn create<F>(parent: Handle, action: F, stack_size: usize) -> Result<Handle>
where
    F: FnOnce(Transfer) -> Transfer + 'static,
{
    let stack = OsStack::new(stack_size)?;
    let top = stack.end();
    REGISTRY.with(|r| {
        let mut r = r.borrow_mut();
        let id = r.alloc_id();
        let mut ctx = Box::new(Context {
            regs: SavedRegs::default(),
            status: Status::Created,
            parent: parent.id,
            stack: Some(stack),
            action: Some(Box::new(action)),
        });
        // The box address is stable for the context's whole life; the entry
        // trampoline receives it as its argument.
        let arg = &mut *ctx as *mut Context as usize;
        unsafe { arch::init_context(&mut ctx.regs, top.cast(), entry, arg, finish) };
        r.table.insert(id, ctx);
        Ok(handle(id))
    })
}

/// Transfers control and `value` to `target`, suspending the caller until
/// some context switches back.
///
/// A `Created` target starts executing its action with `value` as argument; a
/// `Suspended` target resumes exactly after its own pending `switch` call,
/// which then returns `value`. This call returns once another context
/// switches back into the caller, yielding the value carried by that
/// return-switch; if the target's action returns, completion behaves like an
/// automatic switch to its parent carrying the action's result.
///
/// Fails with [`Error::InvalidTarget`] for an unknown, deleted, `Finished` or
/// `Running` handle (including `current()` itself); no transfer occurs and no
/// state changes, but `value` is consumed either way.
///
/// # Panics
///
/// If the resumption that wakes this call was caused by the target's action
/// panicking, the panic resumes here.
pub fn switch(target: Handle, value: Transfer) -> Result<Transfer> {
    let (save, restore) = REGISTRY.with(|r| {
        let mut r = r.borrow_mut();
        match r.table.get(&target.id) {
            Some(t) if t.status.is_resumable() => {}
            _ => return Err(Error::InvalidTarget),
        }

        let cur = r.current;
        let caller = r
            .table
            .get_mut(&cur)
            .expect("current context missing from registry");
        caller.status = Status::Suspended;
        let save = &mut caller.regs as *mut SavedRegs;

        let t = r
            .table
            .get_mut(&target.id)
            .expect("validated target missing from registry");
        t.status = Status::Running;
        let restore = &t.regs as *const SavedRegs;

        r.current = target.id;
        r.payload = Some(Payload::Value(value));
        Ok((save, restore))
    })?;

    // The registry borrow is released; the pointers stay valid because the
    // boxed records never move and a Suspended/Running context cannot be
    // deleted out from under a pending switch on this thread.
    unsafe { arch::switch_context(save, restore) };

    // Somebody switched back into us: they marked us Running, set current,
    // and parked the carried value.
    take_payload()
}

/// Deletes a context, releasing its stack and dropping its entry action if
/// it never ran.
///
/// Deleting a `Suspended` context that never ran to completion is legal; its
/// stack is unmapped without unwinding, so destructors of values live on that
/// stack do not run. Fails with [`Error::InvalidState`] when the target is
/// `Running`, is the root context, or the handle was already deleted: handles
/// are strictly single-use and `delete` is never a silent no-op.
pub fn delete(h: Handle) -> Result<()> {
    REGISTRY.with(|r| {
        let mut r = r.borrow_mut();
        if h.id == ROOT_ID {
            return Err(Error::InvalidState);
        }
        match r.table.get(&h.id) {
            None => Err(Error::InvalidState),
            Some(c) if c.status == Status::Running => Err(Error::InvalidState),
            Some(_) => {
                r.table.remove(&h.id);
                Ok(())
            }
        }
    })
}

fn take_payload() -> Result<Transfer> {
    let payload = REGISTRY.with(|r| r.borrow_mut().payload.take());
    match payload {
        Some(Payload::Value(v)) => Ok(v),
        Some(Payload::Panic(p)) => panic::resume_unwind(p),
        None => unreachable!("resumed without an in-flight transfer value"),
    }
}

/// Entry function run by the architecture trampoline on the context's own
/// stack. `arg` is the address of the context's boxed record.
extern "C" fn entry(arg: usize) {
    let ctx = arg as *mut Context;
    // Nothing may unwind past this frame into the trampoline.
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let input = match REGISTRY.with(|r| r.borrow_mut().payload.take()) {
            Some(Payload::Value(v)) => v,
            Some(Payload::Panic(p)) => panic::resume_unwind(p),
            None => unreachable!("entered a context without a transfer value"),
        };
        let action = unsafe { (*ctx).action.take() }.expect("entry action already consumed");
        action(input)
    }));
    let payload = match result {
        Ok(v) => Payload::Value(v),
        Err(p) => Payload::Panic(p),
    };
    REGISTRY.with(|r| r.borrow_mut().payload = Some(payload));
}

/// Finalization hook called by the trampoline after `entry` returns. Marks
/// the context Finished and hands control (and the parked result) to the
/// parent, or to the root when the parent is gone. Never returns: a Finished
/// context fails switch validation, so nothing can resume its saved state.
extern "C" fn finish() -> ! {
    let (save, restore) = REGISTRY.with(|r| {
        let mut r = r.borrow_mut();
        let cur = r.current;
        let ctx = r
            .table
            .get_mut(&cur)
            .expect("finishing context missing from registry");
        ctx.status = Status::Finished;
        let save = &mut ctx.regs as *mut SavedRegs;
        let parent = ctx.parent;

        // The root is always alive and, while anything else runs, always
        // Suspended, so there is always somewhere to deliver the result.
        let next = match r.table.get(&parent) {
            Some(p) if p.status == Status::Suspended => parent,
            _ => ROOT_ID,
        };
        let p = r
            .table
            .get_mut(&next)
            .expect("root context missing from registry");
        p.status = Status::Running;
        let restore = &p.regs as *const SavedRegs;
        r.current = next;
        (save, restore)
    });
    unsafe { arch::switch_context(save, restore) };
    process::abort()
}
