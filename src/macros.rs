/// Macro to simplify creating a closure accepted by [`FunctionJob::new`](crate::FunctionJob::new).
///
/// Takes an optional setup block, then the name to bind the cancellation token
/// to, then the async body. Handles the necessary boxing (`Box::pin`).
///
/// The setup block runs on every execution, before the body future is built,
/// which is the place to clone `Arc`s the body needs to own.
///
/// # Usage
///
/// ```ignore
/// # use firekeeper::{job_fn, FunctionJob};
/// # use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
/// # use std::time::Duration;
/// # let counter = Arc::new(AtomicUsize::new(0));
/// // With setup block:
/// let job = FunctionJob::new(1, "counting job", job_fn! {
///     {
///         let job_counter = counter.clone();
///     }
///     |cancel| {
///         job_counter.fetch_add(1, Ordering::SeqCst);
///         tokio::select! {
///             _ = cancel.cancelled() => {}
///             _ = tokio::time::sleep(Duration::from_millis(10)) => {}
///         }
///     }
/// });
///
/// // Without setup block:
/// let job = FunctionJob::new(2, "simple job", job_fn! {
///     |_cancel| {
///         println!("Simple job executing");
///     }
/// });
/// ```
#[macro_export]
macro_rules! job_fn {
    // Matcher 1: setup block, token binding, main logic block
    (
        { $($setup_stmts:stmt);* $(;)? }
        |$cancel:ident| $main_block:block
    ) => {
        move |$cancel: $crate::CancellationToken| {
            $($setup_stmts;)*

            let fut = async move { $main_block };

            Box::pin(fut) as std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'static>>
        }
    };

    // Matcher 2: token binding and main logic block only
    (
        |$cancel:ident| $main_block:block
    ) => {
        move |$cancel: $crate::CancellationToken| {
            let fut = async move { $main_block };

            Box::pin(fut) as std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'static>>
        }
    };
}
