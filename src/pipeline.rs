//! The request pipeline.
//!
//! A [`Pipeline`] runs the same fixed sequence for every request:
//!
//! ```text
//! Received
//!   │ authenticator?  ── Err ──▶ authentication-error serializer
//!   │ deserialize
//!   │ validate        ── Err ──▶ validation-error serializer
//!   │ process         ── Err ──▶ processing-error serializer
//!   │                 ── None ─▶ not-found serializer (NotFound)
//!   │ authorize?      ── Err ──▶ authorization-error serializer
//!   ▼
//! success serializer
//! ```
//!
//! Each arrow is terminal. Exactly one serializer runs, once. The pipeline
//! does not log, retry, or recover: the serializer that gets the error owns
//! the response.

use std::sync::Arc;

use http::StatusCode;

use crate::contract::{Authenticator, Deserializer, Input, Output, Processor, Serializer};
use crate::error::{BoxError, Error, NotFound};
use crate::request::Request;
use crate::response::Response;

/// The terminal state a request ended in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
    Success,
    Authentication,
    Validation,
    Processing,
    NotFound,
    Authorization,
}

impl Outcome {
    /// The status code conventionally paired with this outcome.
    pub fn status_hint(self) -> StatusCode {
        match self {
            Self::Success        => StatusCode::OK,
            Self::Authentication => StatusCode::UNAUTHORIZED,
            Self::Validation     => StatusCode::BAD_REQUEST,
            Self::Processing     => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound       => StatusCode::NOT_FOUND,
            Self::Authorization  => StatusCode::FORBIDDEN,
        }
    }
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

/// One configured request pipeline.
///
/// `I` is the deserialized input, `O` the processor's output and `C` the
/// authentication context. Immutable once built; share it behind an `Arc`
/// (or hand it to [`Server::serve`](crate::Server::serve)) and call it from
/// as many requests as you like.
pub struct Pipeline<I, O, C = ()> {
    authenticator: Option<Arc<dyn Authenticator<C>>>,
    deserializer: Arc<dyn Deserializer<I>>,
    processor: Arc<dyn Processor<I, O, C>>,
    success: Arc<dyn Serializer<O>>,
    authentication_error: Arc<dyn Serializer<BoxError>>,
    validation_error: Arc<dyn Serializer<BoxError>>,
    processing_error: Arc<dyn Serializer<BoxError>>,
    not_found: Arc<dyn Serializer<BoxError>>,
    authorization_error: Arc<dyn Serializer<BoxError>>,
}

impl<I, O, C> Pipeline<I, O, C>
where
    I: Input,
{
    pub fn builder() -> PipelineBuilder<I, O, C> {
        PipelineBuilder::default()
    }

    /// Runs the pipeline and returns the serialized response.
    pub async fn handle(&self, req: &Request) -> Response {
        self.run(req).await.1
    }

    /// Runs the pipeline, reporting which outcome produced the response.
    pub async fn run(&self, req: &Request) -> (Outcome, Response) {
        let context = match &self.authenticator {
            Some(authenticator) => match authenticator.authenticate(req).await {
                Ok(context) => Some(context),
                Err(err) => {
                    let res = self.authentication_error.serialize(err, req);
                    return (Outcome::Authentication, res);
                }
            },
            None => None,
        };

        let input = self.deserializer.deserialize(req);
        if let Err(err) = input.validate() {
            return (Outcome::Validation, self.validation_error.serialize(err, req));
        }

        let output = match self.processor.process(input).await {
            Ok(Some(output)) => output,
            Ok(None) => {
                return (Outcome::NotFound, self.not_found.serialize(Box::new(NotFound), req));
            }
            Err(err) => return (Outcome::Processing, self.processing_error.serialize(err, req)),
        };

        let value = match output {
            Output::Plain(value) => value,
            Output::Authorizable { value, authorize } => {
                if let Err(err) = authorize(&value, context.as_ref()) {
                    return (Outcome::Authorization, self.authorization_error.serialize(err, req));
                }
                value
            }
        };

        (Outcome::Success, self.success.serialize(value, req))
    }
}

// ── PipelineBuilder ───────────────────────────────────────────────────────────

/// Collects a pipeline's collaborators.
///
/// Every slot except the authenticator is mandatory; [`build`](Self::build)
/// names the first one left empty. See
/// [`json_defaults`](Self::json_defaults) to fill the serializer slots.
pub struct PipelineBuilder<I, O, C = ()> {
    pub(crate) authenticator: Option<Arc<dyn Authenticator<C>>>,
    pub(crate) deserializer: Option<Arc<dyn Deserializer<I>>>,
    pub(crate) processor: Option<Arc<dyn Processor<I, O, C>>>,
    pub(crate) success: Option<Arc<dyn Serializer<O>>>,
    pub(crate) authentication_error: Option<Arc<dyn Serializer<BoxError>>>,
    pub(crate) validation_error: Option<Arc<dyn Serializer<BoxError>>>,
    pub(crate) processing_error: Option<Arc<dyn Serializer<BoxError>>>,
    pub(crate) not_found: Option<Arc<dyn Serializer<BoxError>>>,
    pub(crate) authorization_error: Option<Arc<dyn Serializer<BoxError>>>,
}

impl<I, O, C> Default for PipelineBuilder<I, O, C> {
    fn default() -> Self {
        Self {
            authenticator: None,
            deserializer: None,
            processor: None,
            success: None,
            authentication_error: None,
            validation_error: None,
            processing_error: None,
            not_found: None,
            authorization_error: None,
        }
    }
}

impl<I, O, C> PipelineBuilder<I, O, C> {
    /// Phase I. Leave unset when the endpoint needs no authentication.
    pub fn authenticator(mut self, authenticator: impl Authenticator<C> + 'static) -> Self {
        self.authenticator = Some(Arc::new(authenticator));
        self
    }

    /// Phase II.
    pub fn deserializer(mut self, deserializer: impl Deserializer<I> + 'static) -> Self {
        self.deserializer = Some(Arc::new(deserializer));
        self
    }

    /// Phase III.
    pub fn processor(mut self, processor: impl Processor<I, O, C> + 'static) -> Self {
        self.processor = Some(Arc::new(processor));
        self
    }

    pub fn success(mut self, serializer: impl Serializer<O> + 'static) -> Self {
        self.success = Some(Arc::new(serializer));
        self
    }

    pub fn authentication_error(mut self, serializer: impl Serializer<BoxError> + 'static) -> Self {
        self.authentication_error = Some(Arc::new(serializer));
        self
    }

    pub fn validation_error(mut self, serializer: impl Serializer<BoxError> + 'static) -> Self {
        self.validation_error = Some(Arc::new(serializer));
        self
    }

    pub fn processing_error(mut self, serializer: impl Serializer<BoxError> + 'static) -> Self {
        self.processing_error = Some(Arc::new(serializer));
        self
    }

    pub fn not_found(mut self, serializer: impl Serializer<BoxError> + 'static) -> Self {
        self.not_found = Some(Arc::new(serializer));
        self
    }

    pub fn authorization_error(mut self, serializer: impl Serializer<BoxError> + 'static) -> Self {
        self.authorization_error = Some(Arc::new(serializer));
        self
    }

    /// Freezes the configuration.
    pub fn build(self) -> Result<Pipeline<I, O, C>, Error> {
        Ok(Pipeline {
            authenticator: self.authenticator,
            deserializer: self.deserializer.ok_or(Error::Missing("deserializer"))?,
            processor: self.processor.ok_or(Error::Missing("processor"))?,
            success: self.success.ok_or(Error::Missing("success serializer"))?,
            authentication_error: self
                .authentication_error
                .ok_or(Error::Missing("authentication-error serializer"))?,
            validation_error: self
                .validation_error
                .ok_or(Error::Missing("validation-error serializer"))?,
            processing_error: self
                .processing_error
                .ok_or(Error::Missing("processing-error serializer"))?,
            not_found: self.not_found.ok_or(Error::Missing("not-found serializer"))?,
            authorization_error: self
                .authorization_error
                .ok_or(Error::Missing("authorization-error serializer"))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::contract::{BoxFuture, Processed};

    struct Query(Option<u32>);

    impl Input for Query {
        fn validate(&self) -> Result<(), BoxError> {
            match self.0 {
                Some(_) => Ok(()),
                None => Err("missing field id".into()),
            }
        }
    }

    fn query(req: &Request) -> Query {
        Query(req.query().and_then(|q| q.strip_prefix("id=")).and_then(|id| id.parse().ok()))
    }

    async fn echo(input: Query) -> Processed<u32> {
        match input.0 {
            Some(0) => Ok(None),
            Some(13) => Err("unlucky".into()),
            Some(id) => Ok(Some(Output::plain(id))),
            None => unreachable!("validated"),
        }
    }

    fn tagged(tag: &'static str) -> impl Fn(BoxError, &Request) -> Response + Send + Sync {
        move |err: BoxError, _req: &Request| Response::text(format!("{tag}: {err}"))
    }

    fn builder() -> PipelineBuilder<Query, u32> {
        Pipeline::builder()
            .deserializer(query)
            .processor(echo)
            .success(|id: u32, _req: &Request| Response::text(id.to_string()))
            .authentication_error(tagged("authn"))
            .validation_error(tagged("validation"))
            .processing_error(tagged("processing"))
            .not_found(tagged("not-found"))
            .authorization_error(tagged("authz"))
    }

    fn get(uri: &str) -> Request {
        http::Request::builder().uri(uri).body(Bytes::new()).unwrap().into()
    }

    #[tokio::test]
    async fn each_phase_reaches_its_serializer() {
        let pipeline = builder().build().unwrap();

        let cases = [
            ("/?id=5", Outcome::Success, "5"),
            ("/", Outcome::Validation, "validation: missing field id"),
            ("/?id=13", Outcome::Processing, "processing: unlucky"),
            ("/?id=0", Outcome::NotFound, "not-found: Not found"),
        ];
        for (uri, outcome, body) in cases {
            let (got, res) = pipeline.run(&get(uri)).await;
            assert_eq!(got, outcome, "{uri}");
            assert_eq!(res.body(), body.as_bytes(), "{uri}");
        }
    }

    #[test]
    fn build_names_missing_slot() {
        let err = PipelineBuilder::<Query, u32>::default().build().err().unwrap();
        assert!(matches!(err, Error::Missing("deserializer")));

        let err = PipelineBuilder::<Query, u32>::default()
            .deserializer(query)
            .processor(echo)
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, Error::Missing("success serializer")));
    }

    struct Rejecting;

    impl Authenticator<()> for Rejecting {
        fn authenticate<'a>(&'a self, _req: &'a Request) -> BoxFuture<'a, Result<(), BoxError>> {
            Box::pin(async { Err::<(), BoxError>("no token".into()) })
        }
    }

    #[tokio::test]
    async fn authentication_failure_stops_everything() {
        let pipeline = builder().authenticator(Rejecting).build().unwrap();
        let (outcome, res) = pipeline.run(&get("/?id=5")).await;
        assert_eq!(outcome, Outcome::Authentication);
        assert_eq!(res.body(), b"authn: no token");
    }

    #[test]
    fn status_hints() {
        assert_eq!(Outcome::Success.status_hint(), StatusCode::OK);
        assert_eq!(Outcome::Authentication.status_hint(), StatusCode::UNAUTHORIZED);
        assert_eq!(Outcome::Authorization.status_hint(), StatusCode::FORBIDDEN);
        assert_eq!(Outcome::NotFound.status_hint(), StatusCode::NOT_FOUND);
    }
}
