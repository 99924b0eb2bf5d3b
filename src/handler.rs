//! Handler trait and type erasure.
//!
//! The server drives exactly one handler. Two kinds of value qualify:
//!
//! ```text
//! async fn hello(req: Request) -> impl IntoResponse   ← a plain function
//! Pipeline<I, O, C>                                    ← a phased pipeline
//!        ↓ server.serve(handler)
//! handler.into_boxed_handler()                          ← Handler impl
//!        ↓  stored as BoxedHandler = Arc<dyn ErasedHandler>
//! handler.call(req)  at request time                    ← one vtable dispatch
//!        ↓
//! Box::pin(async { … .into_response() })                ← BoxFuture
//! ```
//!
//! The per-request cost is one `Arc` clone and one virtual call.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::contract::Input;
use crate::pipeline::Pipeline;
use crate::request::Request;
use crate::response::{IntoResponse, Response};

// ── Internal types ────────────────────────────────────────────────────────────

/// A type-erased future that resolves to a [`Response`].
///
/// `Send + 'static` so tokio can move it across worker threads.
pub(crate) type HandlerFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of the public `Handler` trait's `into_boxed_handler` method.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request) -> HandlerFuture;
}

/// A type-erased handler shared across concurrent connections.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Anything the [`Server`](crate::Server) can drive.
///
/// Satisfied by every `async fn name(req: Request) -> impl IntoResponse` and by
/// every [`Pipeline`]. Sealed: only the impls in this module exist.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

// ── Functions ─────────────────────────────────────────────────────────────────

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

/// Bridges a concrete function `F` to [`ErasedHandler`].
struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: Request) -> HandlerFuture {
        let fut = (self.0)(req);
        Box::pin(async move { fut.await.into_response() })
    }
}

// ── Pipelines ─────────────────────────────────────────────────────────────────

impl<I, O, C> private::Sealed for Pipeline<I, O, C>
where
    I: Input + Send + 'static,
    O: Send + 'static,
    C: Send + 'static,
{
}

impl<I, O, C> Handler for Pipeline<I, O, C>
where
    I: Input + Send + 'static,
    O: Send + 'static,
    C: Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(PipelineHandler(Arc::new(self)))
    }
}

/// Owns the pipeline behind an `Arc` so each request future can hold its own
/// reference for `'static`.
struct PipelineHandler<I, O, C>(Arc<Pipeline<I, O, C>>);

impl<I, O, C> ErasedHandler for PipelineHandler<I, O, C>
where
    I: Input + Send + 'static,
    O: Send + 'static,
    C: Send + 'static,
{
    fn call(&self, req: Request) -> HandlerFuture {
        let pipeline = Arc::clone(&self.0);
        Box::pin(async move { pipeline.handle(&req).await })
    }
}
