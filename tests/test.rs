use std::cell::Cell;
use std::rc::Rc;

use costack::{
    create, current, delete, stack, status, switch, Error, Handle, Status, Transfer,
    DEFAULT_STACK_SIZE, MIN_STACK_SIZE,
};

fn boxed(n: usize) -> Transfer {
    Box::new(n)
}

fn unboxed(v: Transfer) -> usize {
    *v.downcast::<usize>().unwrap()
}

#[test]
fn create_does_not_switch() {
    let root = current();
    let h = create(root, |v| v, DEFAULT_STACK_SIZE).unwrap();
    assert_eq!(current(), root);
    assert_eq!(status(h), Some(Status::Created));
    delete(h).unwrap();
}

#[test]
fn first_switch_runs_action_once() {
    let root = current();
    let calls = Rc::new(Cell::new(0u32));
    let seen = Rc::new(Cell::new(0usize));
    let c = calls.clone();
    let s = seen.clone();
    let h = create(
        root,
        move |mut v| {
            c.set(c.get() + 1);
            s.set(unboxed(v));
            loop {
                v = switch(root, boxed(0)).unwrap();
            }
        },
        DEFAULT_STACK_SIZE,
    )
    .unwrap();

    switch(h, boxed(7)).unwrap();
    switch(h, boxed(8)).unwrap();
    assert_eq!(calls.get(), 1);
    assert_eq!(seen.get(), 7);
    delete(h).unwrap();
}

#[test]
fn current_tracks_running_context() {
    let root = current();
    let observed = Rc::new(Cell::new(None::<Handle>));
    let o = observed.clone();
    let h = create(
        root,
        move |v| {
            o.set(Some(current()));
            v
        },
        DEFAULT_STACK_SIZE,
    )
    .unwrap();

    switch(h, boxed(0)).unwrap();
    assert_eq!(observed.get(), Some(h));
    assert_eq!(current(), root);
    delete(h).unwrap();
}

#[test]
fn add_one_scenario() {
    let root = current();
    let h = create(
        root,
        move |mut v| loop {
            let n = unboxed(v);
            v = switch(root, boxed(n + 1)).unwrap();
        },
        DEFAULT_STACK_SIZE,
    )
    .unwrap();

    assert_eq!(unboxed(switch(h, boxed(5)).unwrap()), 6);
    assert_eq!(unboxed(switch(h, boxed(10)).unwrap()), 11);

    delete(h).unwrap();
    assert!(matches!(delete(h), Err(Error::InvalidState)));
}

#[test]
fn round_trip_and_completion() {
    let root = current();
    let h = create(
        root,
        move |v| {
            // Yield x, resume with y, return z without an explicit switch.
            let x = unboxed(v) + 1;
            let y = unboxed(switch(root, boxed(x)).unwrap());
            boxed(y * 2)
        },
        DEFAULT_STACK_SIZE,
    )
    .unwrap();

    assert_eq!(unboxed(switch(h, boxed(41)).unwrap()), 42);
    assert_eq!(status(h), Some(Status::Suspended));

    // The action's return value arrives as an automatic switch to the parent.
    assert_eq!(unboxed(switch(h, boxed(10)).unwrap()), 20);
    assert_eq!(status(h), Some(Status::Finished));

    assert!(matches!(switch(h, boxed(0)), Err(Error::InvalidTarget)));
    delete(h).unwrap();
    assert_eq!(status(h), None);
}

#[test]
fn switch_into_current_is_rejected() {
    let root = current();
    assert!(matches!(switch(root, boxed(0)), Err(Error::InvalidTarget)));
    assert_eq!(current(), root);
}

#[test]
fn switch_into_deleted_handle_is_rejected() {
    let root = current();
    let h = create(root, |v| v, DEFAULT_STACK_SIZE).unwrap();
    delete(h).unwrap();
    assert!(matches!(switch(h, boxed(0)), Err(Error::InvalidTarget)));
}

#[test]
fn delete_root_is_rejected() {
    assert!(matches!(delete(current()), Err(Error::InvalidState)));
}

#[test]
fn delete_created_drops_unexecuted_action() {
    let root = current();
    let alive = Rc::new(());
    let probe = alive.clone();
    let h = create(
        root,
        move |v| {
            let _hold = probe;
            v
        },
        DEFAULT_STACK_SIZE,
    )
    .unwrap();

    assert_eq!(Rc::strong_count(&alive), 2);
    delete(h).unwrap();
    assert_eq!(Rc::strong_count(&alive), 1);
}

#[test]
fn nested_contexts_chain_to_parent() {
    let root = current();
    let a = create(
        root,
        move |v| {
            let n = unboxed(v);
            let b = create(
                current(),
                move |w| boxed(unboxed(w) + 1),
                DEFAULT_STACK_SIZE,
            )
            .unwrap();
            // b's parent is a: its return value lands back here.
            let r = unboxed(switch(b, boxed(n * 10)).unwrap());
            delete(b).unwrap();
            boxed(r)
        },
        DEFAULT_STACK_SIZE,
    )
    .unwrap();

    assert_eq!(unboxed(switch(a, boxed(4)).unwrap()), 41);
    assert_eq!(status(a), Some(Status::Finished));
    delete(a).unwrap();
}

#[test]
fn orphaned_context_completes_to_root() {
    let root = current();
    let child = Rc::new(Cell::new(None::<Handle>));
    let slot = child.clone();
    let p = create(
        root,
        move |v| {
            let c = create(
                current(),
                move |w| {
                    // Yield straight to the root, then finish.
                    switch(root, w).unwrap()
                },
                DEFAULT_STACK_SIZE,
            )
            .unwrap();
            slot.set(Some(c));
            switch(c, v).unwrap()
        },
        DEFAULT_STACK_SIZE,
    )
    .unwrap();

    // p starts c; c yields to us directly, leaving both suspended.
    assert_eq!(unboxed(switch(p, boxed(3)).unwrap()), 3);
    let c = child.get().unwrap();
    assert_eq!(status(p), Some(Status::Suspended));
    assert_eq!(status(c), Some(Status::Suspended));

    // c's parent disappears; completion falls back to the root.
    delete(p).unwrap();
    assert_eq!(unboxed(switch(c, boxed(9)).unwrap()), 9);
    assert_eq!(status(c), Some(Status::Finished));
    delete(c).unwrap();
}

#[test]
fn action_panic_propagates_to_resumer() {
    let root = current();
    let h = create(
        root,
        |_| -> Transfer { panic!("coroutine failed") },
        DEFAULT_STACK_SIZE,
    )
    .unwrap();

    let err = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _ = switch(h, boxed(0));
    }))
    .unwrap_err();
    assert_eq!(
        err.downcast_ref::<&str>().copied(),
        Some("coroutine failed")
    );

    // The panic finished the context; the rest of the thread keeps working.
    assert_eq!(current(), root);
    assert_eq!(status(h), Some(Status::Finished));
    delete(h).unwrap();
}

#[test]
fn independent_registry_per_thread() {
    let out = std::thread::spawn(|| {
        let root = current();
        let h = create(
            root,
            move |v| boxed(unboxed(v) + 1),
            DEFAULT_STACK_SIZE,
        )
        .unwrap();
        let r = unboxed(switch(h, boxed(1)).unwrap());
        delete(h).unwrap();
        r
    })
    .join()
    .unwrap();
    assert_eq!(out, 2);
}

#[test]
fn stress_sequential_no_stack_leak() {
    let root = current();
    let before = stack::allocated_bytes();
    for i in 0..10_000usize {
        let h = create(
            root,
            move |mut v| loop {
                v = switch(root, v).unwrap();
            },
            MIN_STACK_SIZE,
        )
        .unwrap();
        // In and straight back out.
        assert_eq!(unboxed(switch(h, boxed(i)).unwrap()), i);
        delete(h).unwrap();
    }
    assert_eq!(stack::allocated_bytes(), before);
    assert_eq!(stack::allocated_stacks(), 0);
}

#[test]
fn stress_batch_no_stack_leak() {
    let root = current();
    let before = stack::allocated_bytes();
    let handles: Vec<Handle> = (0..512)
        .map(|_| {
            create(
                root,
                move |mut v| loop {
                    v = switch(root, v).unwrap();
                },
                MIN_STACK_SIZE,
            )
            .unwrap()
        })
        .collect();

    for (i, &h) in handles.iter().enumerate() {
        assert_eq!(unboxed(switch(h, boxed(i)).unwrap()), i);
    }
    for h in handles {
        delete(h).unwrap();
    }
    assert_eq!(stack::allocated_bytes(), before);
}
