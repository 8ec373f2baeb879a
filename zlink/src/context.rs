//! Context: the I/O thread pool sockets are constructed on.
//!
//! Unlike libzmq, a zlink socket is not bound to its context at the type
//! level — each socket constructor (`DealerSocket::connect`, `RouterSocket::
//! bind`, ...) is a plain `async fn` that can run on any `compio` runtime.
//! [`Context`] exists to own a small pool of OS threads, each driving its
//! own `compio::runtime::Runtime`, and to hand out round-robin access to
//! that pool so an application doesn't have to manage raw `std::thread`s
//! itself. Socket tasks spawned via [`Context::socket`] live on the runtime
//! of whichever thread they were assigned to for as long as the context is
//! alive.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::JoinHandle;

/// Options controlling a [`Context`]'s thread pool.
///
/// # ZeroMQ Compatibility
///
/// `io_threads` corresponds to `ZMQ_IO_THREADS`, `max_sockets` to
/// `ZMQ_MAX_SOCKETS`.
#[derive(Debug, Clone)]
pub struct ContextOptions {
    /// Number of OS threads in the I/O pool.
    pub io_threads: usize,
    /// Soft cap on the number of sockets an application should construct
    /// against this context. Not enforced by `Context` itself (no socket
    /// registry is kept); exposed so applications can check their own
    /// bookkeeping against it.
    pub max_sockets: usize,
    /// Prefix used to name spawned OS threads (`"{prefix}-{index}"`).
    pub thread_name_prefix: String,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            io_threads: 1,
            max_sockets: 1024,
            thread_name_prefix: "zlink-io".to_string(),
        }
    }
}

impl ContextOptions {
    /// Start from the defaults (`io_threads: 1`, `max_sockets: 1024`).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of I/O threads (clamped to at least 1).
    #[must_use]
    pub fn with_io_threads(mut self, io_threads: usize) -> Self {
        self.io_threads = io_threads.max(1);
        self
    }

    /// Set the soft socket-count cap.
    #[must_use]
    pub fn with_max_sockets(mut self, max_sockets: usize) -> Self {
        self.max_sockets = max_sockets;
        self
    }

    /// Set the thread name prefix.
    #[must_use]
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }
}

/// A unit of work dispatched to an I/O thread. Runs synchronously on the
/// thread's current task (inside its `compio` runtime); typically just
/// spawns an async task via `compio::runtime::spawn` and returns.
type Job = Box<dyn FnOnce() + Send + 'static>;

struct IoThread {
    mailbox_tx: flume::Sender<Job>,
    handle: Option<JoinHandle<()>>,
}

/// Owns a pool of I/O threads that socket construction and work can be
/// dispatched onto, round robin.
///
/// # Example
///
/// ```rust,no_run
/// use zlink::Context;
/// use zlink::zmq::DealerSocket;
///
/// let ctx = Context::new(2);
/// let socket: std::io::Result<DealerSocket> =
///     ctx.socket(|| async { DealerSocket::connect("127.0.0.1:5555").await });
/// ```
pub struct Context {
    threads: Vec<IoThread>,
    cursor: AtomicUsize,
    options: ContextOptions,
}

impl Context {
    /// Create a context with `io_threads` I/O threads and default options.
    #[must_use]
    pub fn new(io_threads: usize) -> Self {
        Self::with_options(ContextOptions::new().with_io_threads(io_threads))
    }

    /// Create a context with custom options.
    #[must_use]
    pub fn with_options(options: ContextOptions) -> Self {
        let count = options.io_threads.max(1);
        let mut threads = Vec::with_capacity(count);
        for i in 0..count {
            let (mailbox_tx, mailbox_rx) = flume::unbounded::<Job>();
            let name = format!("{}-{i}", options.thread_name_prefix);
            let handle = std::thread::Builder::new()
                .name(name)
                .spawn(move || io_thread_main(mailbox_rx))
                .expect("failed to spawn zlink io thread");
            threads.push(IoThread {
                mailbox_tx,
                handle: Some(handle),
            });
        }
        Self {
            threads,
            cursor: AtomicUsize::new(0),
            options,
        }
    }

    /// The options this context was constructed with.
    #[must_use]
    pub const fn options(&self) -> &ContextOptions {
        &self.options
    }

    /// Number of I/O threads in the pool.
    #[must_use]
    pub fn io_threads(&self) -> usize {
        self.threads.len()
    }

    fn next_thread(&self) -> usize {
        self.cursor.fetch_add(1, Ordering::Relaxed) % self.threads.len()
    }

    /// Run an async constructor to completion on the next I/O thread
    /// (round robin) and return its result, blocking the caller until it
    /// completes.
    ///
    /// Use this from outside any `compio` runtime (e.g. a synchronous
    /// `main`). Calling it from within a runtime thread risks deadlocking
    /// that thread's reactor if `ctor` never completes; prefer
    /// [`Context::socket_async`] there instead.
    pub fn socket<F, Fut, T>(&self, ctor: F) -> T
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = flume::bounded(1);
        self.dispatch(ctor, reply_tx);
        reply_rx
            .recv()
            .expect("zlink io thread exited before completing socket construction")
    }

    /// Async counterpart to [`Context::socket`]; awaits the result instead
    /// of blocking the calling thread.
    pub async fn socket_async<F, Fut, T>(&self, ctor: F) -> T
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = flume::bounded(1);
        self.dispatch(ctor, reply_tx);
        reply_rx
            .recv_async()
            .await
            .expect("zlink io thread exited before completing socket construction")
    }

    fn dispatch<F, Fut, T>(&self, ctor: F, reply_tx: flume::Sender<T>)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + 'static,
        T: Send + 'static,
    {
        let idx = self.next_thread();
        let job: Job = Box::new(move || {
            compio::runtime::spawn(async move {
                let result = ctor().await;
                let _ = reply_tx.send(result);
            })
            .detach();
        });
        self.threads[idx]
            .mailbox_tx
            .send(job)
            .expect("zlink io thread mailbox closed");
    }

    /// Terminate the context: close every thread's mailbox and join the
    /// threads. Any socket tasks still running on the pool are dropped
    /// along with the thread's runtime — callers should finish or hand off
    /// in-flight sockets before calling this, matching `ZMQ_LINGER`
    /// expectations.
    pub fn term(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        for thread in &mut self.threads {
            // Dropping the sender side closes the mailbox; `io_thread_main`'s
            // `recv_async` loop then exits and the runtime is torn down.
            let (closed_tx, _closed_rx) = flume::unbounded::<Job>();
            let _ = std::mem::replace(&mut thread.mailbox_tx, closed_tx);
        }
        for thread in &mut self.threads {
            if let Some(handle) = thread.handle.take() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn io_thread_main(mailbox_rx: flume::Receiver<Job>) {
    compio::runtime::Runtime::new()
        .expect("failed to start zlink io thread's compio runtime")
        .block_on(async move {
            while let Ok(job) = mailbox_rx.recv_async().await {
                job();
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_options_defaults() {
        let opts = ContextOptions::new();
        assert_eq!(opts.io_threads, 1);
        assert_eq!(opts.max_sockets, 1024);
        assert_eq!(opts.thread_name_prefix, "zlink-io");
    }

    #[test]
    fn test_context_options_builder() {
        let opts = ContextOptions::new()
            .with_io_threads(0)
            .with_max_sockets(16)
            .with_thread_name_prefix("test");
        assert_eq!(opts.io_threads, 1); // clamped
        assert_eq!(opts.max_sockets, 16);
        assert_eq!(opts.thread_name_prefix, "test");
    }

    #[test]
    fn test_context_runs_socket_constructor() {
        let ctx = Context::new(2);
        assert_eq!(ctx.io_threads(), 2);

        let value = ctx.socket(|| async { 40 + 2 });
        assert_eq!(value, 42);

        ctx.term();
    }
}
