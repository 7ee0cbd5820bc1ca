#![allow(unused_macros)]

// Lock poisoning is not propagated.
macro_rules! read_lock {
    ($rwlock:expr) => {
        $rwlock
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    };
}

macro_rules! write_lock {
    ($rwlock:expr) => {
        $rwlock
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    };
}

macro_rules! with_read {
    ($rwlock:expr, $closure:expr) => {{
        let guard = read_lock!($rwlock);
        $closure(&*guard)
    }};
}

macro_rules! with_write {
    ($rwlock:expr, $closure:expr) => {{
        let mut guard = write_lock!($rwlock);
        $closure(&mut *guard)
    }};
}
