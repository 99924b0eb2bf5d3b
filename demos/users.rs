//! Minimal resdk example: one authenticated, authorized JSON endpoint.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example users
//!
//! Try:
//!   curl -i http://localhost:3000/users/1                          # 401
//!   curl -i -H 'authorization: Bearer alice' localhost:3000/users/1  # 200
//!   curl -i -H 'authorization: Bearer bob'   localhost:3000/users/1  # 403
//!   curl -i -H 'authorization: Bearer bob'   localhost:3000/users/x  # 400
//!   curl -i -H 'authorization: Bearer bob'   localhost:3000/users/9  # 404

use resdk::json::JsonError;
use resdk::{
    Authenticator, Authorizer, BoxError, BoxFuture, Input, Output, Pipeline, Processed, Request,
    Server,
};
use serde::Serialize;
use serde_json::json;

/// Who is calling. Produced by `BearerAuth`, checked by `User::authorize`.
struct Caller {
    name: String,
}

struct BearerAuth;

impl Authenticator<Caller> for BearerAuth {
    fn authenticate<'a>(&'a self, req: &'a Request) -> BoxFuture<'a, Result<Caller, BoxError>> {
        let caller = req
            .header("authorization")
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(|name| Caller { name: name.to_owned() })
            .ok_or_else(|| BoxError::from("missing bearer token"));
        Box::pin(async move { caller })
    }
}

// GET /users/{id}
struct GetUser {
    raw: String,
}

impl GetUser {
    fn id(&self) -> Option<u64> {
        self.raw.parse().ok()
    }
}

impl Input for GetUser {
    fn validate(&self) -> Result<(), BoxError> {
        match self.id() {
            Some(_) => Ok(()),
            None => Err(Box::new(JsonError::new(
                "invalid id",
                json!({ "id": format!("`{}` is not a number", self.raw) }),
            ))),
        }
    }
}

fn get_user(req: &Request) -> GetUser {
    GetUser { raw: req.path().trim_start_matches("/users/").to_owned() }
}

#[derive(Serialize)]
struct User {
    id: u64,
    name: &'static str,
}

/// Only the user themselves may read their record.
impl Authorizer<Caller> for User {
    fn authorize(&self, caller: Option<&Caller>) -> Result<(), BoxError> {
        match caller {
            Some(caller) if caller.name == self.name => Ok(()),
            _ => Err("not your record".into()),
        }
    }
}

async fn find_user(input: GetUser) -> Processed<User, Caller> {
    // Real app: a database lookup.
    Ok(match input.id() {
        Some(1) => Some(Output::guarded(User { id: 1, name: "alice" })),
        Some(2) => Some(Output::guarded(User { id: 2, name: "bob" })),
        _ => None,
    })
}

#[tokio::main]
async fn main() -> Result<(), resdk::Error> {
    tracing_subscriber::fmt::init();

    let users = Pipeline::builder()
        .authenticator(BearerAuth)
        .deserializer(get_user)
        .processor(find_user)
        .build_json()?;

    Server::bind("0.0.0.0:3000")?.serve(users).await
}
