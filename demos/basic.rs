use costack::{create, current, delete, switch, DEFAULT_STACK_SIZE};

fn main() {
    let root = current();
    let adder = create(
        root,
        move |mut v| loop {
            let n = *v.downcast::<usize>().unwrap();
            v = switch(root, Box::new(n + 1)).unwrap();
        },
        DEFAULT_STACK_SIZE,
    )
    .unwrap();

    let mut e = 0usize;
    for _ in 1..10 {
        e = *switch(adder, Box::new(e)).unwrap().downcast().unwrap();
    }
    println!("e: {}", e);
    delete(adder).unwrap();
}
