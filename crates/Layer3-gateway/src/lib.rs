//! # taskrelay-gateway
//!
//! Entry point for clients: submit an input, get a request id back, poll the
//! id for progress. The same API is exposed over HTTP by [`http::router`].

pub mod gateway;
pub mod http;

pub use gateway::{RequestGateway, DEFAULT_MAX_WAIT};
pub use http::{router, serve, ApiError, ExecuteRequest, ExecuteResponse, StatusQuery};
