//! Capability contracts: what a phase implementation must provide.
//!
//! Every phase of a [`Pipeline`](crate::Pipeline) is a small trait. Concrete
//! types implement them directly; plain functions and closures get them for
//! free through the blanket impls at the bottom of this module.
//!
//! | Phase | Contract | May fail? |
//! |---|---|---|
//! | authenticate | [`Authenticator<C>`] | yes, before anything else runs |
//! | deserialize | [`Deserializer<I>`] | no: bad input surfaces through [`Input::validate`] |
//! | validate | [`Input`] | yes |
//! | process | [`Processor<I, O, C>`] | yes, or `Ok(None)` for "nothing there" |
//! | authorize | [`Output::Authorizable`] / [`Authorizer<C>`] | yes |
//! | serialize | [`Serializer<T>`] | no: it always produces a response |

use std::future::Future;
use std::pin::Pin;

use crate::error::BoxError;
use crate::request::Request;
use crate::response::Response;

/// A heap-allocated, type-erased future borrowed for `'a`.
///
/// `Send` so the pipeline's own future can move between tokio worker threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a [`Processor`] hands back: an output, nothing (`Ok(None)`), or an error.
pub type Processed<O, C = ()> = Result<Option<Output<O, C>>, BoxError>;

/// Hook run by the pipeline against an [`Output::Authorizable`] value.
pub type AuthorizeFn<O, C> = Box<dyn FnOnce(&O, Option<&C>) -> Result<(), BoxError> + Send>;

// ── Phase contracts ───────────────────────────────────────────────────────────

/// Phase I: checks the caller's credentials.
///
/// The returned context is opaque to the pipeline. It is passed back, by
/// reference, to the authorization hook of the same request.
pub trait Authenticator<C>: Send + Sync {
    fn authenticate<'a>(&'a self, req: &'a Request) -> BoxFuture<'a, Result<C, BoxError>>;
}

/// Phase II: turns a request into an input value.
///
/// Deserialization cannot fail. Anything malformed must be captured in the
/// input and reported by [`Input::validate`].
pub trait Deserializer<I>: Send + Sync {
    fn deserialize(&self, req: &Request) -> I;
}

/// Self-validation of a deserialized input.
pub trait Input {
    fn validate(&self) -> Result<(), BoxError>;
}

/// Phase III: the business logic.
///
/// `Ok(None)` means the input referred to nothing. The pipeline answers it
/// with the not-found serializer, not the processing-error one.
pub trait Processor<I, O, C = ()>: Send + Sync {
    fn process(&self, input: I) -> BoxFuture<'_, Processed<O, C>>;
}

/// Optional authorization capability of an output value.
///
/// `context` is `None` when the pipeline has no authenticator.
pub trait Authorizer<C> {
    fn authorize(&self, context: Option<&C>) -> Result<(), BoxError>;
}

/// Phase IV: writes one complete response for a value.
///
/// Used for the success value and for every error kind. A serializer deals
/// with its own encoding failures; nothing it does is reported back to the
/// pipeline.
pub trait Serializer<T>: Send + Sync {
    fn serialize(&self, value: T, req: &Request) -> Response;
}

// ── Output ────────────────────────────────────────────────────────────────────

/// A processor's result, tagged with whether it needs an authorization check.
pub enum Output<O, C = ()> {
    /// Sent to the success serializer as is.
    Plain(O),
    /// Sent to the success serializer only if `authorize` accepts the caller.
    Authorizable { value: O, authorize: AuthorizeFn<O, C> },
}

impl<O, C> Output<O, C> {
    pub fn plain(value: O) -> Self {
        Self::Plain(value)
    }

    /// Attaches an ad-hoc authorization check to `value`.
    ///
    /// ```rust
    /// use resdk::Output;
    ///
    /// struct Doc { owner: u64 }
    ///
    /// let out: Output<Doc, u64> = Output::authorizable(Doc { owner: 7 }, |doc, caller| {
    ///     match caller {
    ///         Some(id) if *id == doc.owner => Ok(()),
    ///         _ => Err("not the owner".into()),
    ///     }
    /// });
    /// ```
    pub fn authorizable<F>(value: O, authorize: F) -> Self
    where
        F: FnOnce(&O, Option<&C>) -> Result<(), BoxError> + Send + 'static,
    {
        Self::Authorizable { value, authorize: Box::new(authorize) }
    }

    /// Authorizes `value` through its own [`Authorizer`] impl.
    pub fn guarded(value: O) -> Self
    where
        O: Authorizer<C> + 'static,
        C: 'static,
    {
        Self::authorizable(value, |value: &O, context: Option<&C>| value.authorize(context))
    }

    pub fn value(&self) -> &O {
        match self {
            Self::Plain(value) | Self::Authorizable { value, .. } => value,
        }
    }

    pub fn is_authorizable(&self) -> bool {
        matches!(self, Self::Authorizable { .. })
    }
}

// ── Blanket implementations ───────────────────────────────────────────────────

/// `Fn(&Request) -> impl Future<Output = Result<C, BoxError>>`.
///
/// The future must own what it needs: copy headers out of the request before
/// the `async move` block.
impl<F, Fut, C> Authenticator<C> for F
where
    F: Fn(&Request) -> Fut + Send + Sync,
    Fut: Future<Output = Result<C, BoxError>> + Send + 'static,
{
    fn authenticate<'a>(&'a self, req: &'a Request) -> BoxFuture<'a, Result<C, BoxError>> {
        Box::pin(self(req))
    }
}

impl<F, I> Deserializer<I> for F
where
    F: Fn(&Request) -> I + Send + Sync,
{
    fn deserialize(&self, req: &Request) -> I {
        self(req)
    }
}

/// `Fn(I) -> impl Future<Output = Processed<O, C>>`, which covers `async fn`
/// items taking the input by value.
impl<F, Fut, I, O, C> Processor<I, O, C> for F
where
    F: Fn(I) -> Fut + Send + Sync,
    Fut: Future<Output = Processed<O, C>> + Send + 'static,
{
    fn process(&self, input: I) -> BoxFuture<'_, Processed<O, C>> {
        Box::pin(self(input))
    }
}

impl<F, T> Serializer<T> for F
where
    F: Fn(T, &Request) -> Response + Send + Sync,
{
    fn serialize(&self, value: T, req: &Request) -> Response {
        self(value, req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Owned {
        owner: &'static str,
    }

    impl Authorizer<String> for Owned {
        fn authorize(&self, context: Option<&String>) -> Result<(), BoxError> {
            match context {
                Some(user) if user == self.owner => Ok(()),
                _ => Err("denied".into()),
            }
        }
    }

    fn run_hook(out: Output<Owned, String>, context: Option<&String>) -> Result<(), BoxError> {
        match out {
            Output::Plain(_) => Ok(()),
            Output::Authorizable { value, authorize } => authorize(&value, context),
        }
    }

    #[test]
    fn plain_is_not_authorizable() {
        let out: Output<u32> = Output::plain(3);
        assert!(!out.is_authorizable());
        assert_eq!(*out.value(), 3);
    }

    #[test]
    fn guarded_delegates_to_authorizer() {
        let alice = "alice".to_owned();
        let bob = "bob".to_owned();

        let out = Output::guarded(Owned { owner: "alice" });
        assert!(out.is_authorizable());
        assert!(run_hook(out, Some(&alice)).is_ok());

        let denied = run_hook(Output::guarded(Owned { owner: "alice" }), Some(&bob)).unwrap_err();
        assert_eq!(denied.to_string(), "denied");

        assert!(run_hook(Output::guarded(Owned { owner: "alice" }), None).is_err());
    }

    #[test]
    fn closures_are_deserializers() {
        let deserializer = |req: &Request| req.path().to_owned();
        let req: Request = http::Request::builder()
            .uri("/things/1")
            .body(bytes::Bytes::new())
            .unwrap()
            .into();
        assert_eq!(Deserializer::<String>::deserialize(&deserializer, &req), "/things/1");
    }
}
