//! # resdk
//!
//! A phased request pipeline for HTTP handlers.
//!
//! Every request goes through the same steps, each one a pluggable
//! collaborator:
//!
//! 1. **authenticate**: optional, yields a context for step 4
//! 2. **deserialize + validate**: request → input, input checks itself
//! 3. **process**: input → output, nothing, or an error
//! 4. **authorize**: only for outputs that ask for it
//! 5. **serialize**: one serializer per outcome writes the response
//!
//! The first failing step picks the serializer and ends the request. The
//! pipeline itself has no opinions about formats; [`json`] supplies a
//! default serializer family with the usual status codes.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use resdk::{BoxError, Input, Output, Pipeline, Processed, Request, Server};
//! use serde::Serialize;
//!
//! struct GetUser { id: Option<u64> }
//!
//! impl Input for GetUser {
//!     fn validate(&self) -> Result<(), BoxError> {
//!         self.id.map(|_| ()).ok_or_else(|| "id must be a number".into())
//!     }
//! }
//!
//! #[derive(Serialize)]
//! struct User { id: u64, name: &'static str }
//!
//! fn read(req: &Request) -> GetUser {
//!     GetUser { id: req.path().trim_start_matches("/users/").parse().ok() }
//! }
//!
//! async fn find(input: GetUser) -> Processed<User> {
//!     Ok(input.id.filter(|id| *id == 1).map(|id| Output::plain(User { id, name: "alice" })))
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), resdk::Error> {
//!     let pipeline = Pipeline::builder()
//!         .deserializer(read)
//!         .processor(find)
//!         .build_json()?;
//!
//!     Server::bind("0.0.0.0:3000")?.serve(pipeline).await
//! }
//! ```

mod contract;
mod error;
mod handler;
mod pipeline;
mod request;
mod response;
mod server;

pub mod json;

pub use contract::{
    Authenticator, AuthorizeFn, Authorizer, BoxFuture, Deserializer, Input, Output, Processed,
    Processor, Serializer,
};
pub use error::{BoxError, Error, NotFound};
pub use handler::Handler;
pub use pipeline::{Outcome, Pipeline, PipelineBuilder};
pub use request::Request;
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use server::{DEFAULT_BODY_LIMIT, DEFAULT_DRAIN_TIMEOUT, Server};
