#![allow(unused_macros)]

/// Helper macro for locking items
///
/// ```rust, ignore
///  let mut data = lock!(my_mutex);
///  data.some_field = 42;
/// ```
macro_rules! lock {
    ($lock:expr) => {
        $lock.lock().expect("Failed to acquire lock")
    };
}

/// Helper macro for locking items, mapping poisoning to [`crate::Error::LockError`]
///
/// ```rust, ignore
///  let mut graph = try_lock!(self.graph)?;
///  graph.rebuild(&batch, &diagnostics);
/// ```
macro_rules! try_lock {
    ($lock:expr) => {
        $lock.lock().map_err(|_| crate::Error::LockError)
    };
}
