//! S3 HTTP routing, request parsing, response building, and hyper service for casgate.
//!
//! This crate is the HTTP face of the gateway. It handles:
//!
//! - **Routing** ([`router`]): Maps HTTP requests to S3 operations by examining
//!   method, path, query parameters, and headers. Supports both path-style and
//!   virtual-hosted-style bucket addressing.
//!
//! - **Request extraction** ([`request`]): Reads canned ACLs, object metadata,
//!   payload sizes and listing parameters out of request parts.
//!
//! - **Response building** ([`response`]): Object headers, XML documents and
//!   bodiless responses.
//!
//! - **Dispatch** ([`dispatch`]): Routes identified S3 operations to the business logic
//!   handler via the [`S3Handler`](dispatch::S3Handler) trait.
//!
//! - **Handler** ([`handler`]): [`GatewayHandler`], which runs each operation
//!   against a [`CasGateway`](casgate_core::CasGateway).
//!
//! - **Service** ([`service`]): The main [`S3HttpService`](service::S3HttpService) that
//!   implements hyper's `Service` trait, tying routing, auth and dispatch together.
//!
//! # Architecture
//!
//! ```text
//! HTTP Request
//!   -> S3HttpService (hyper Service)
//!     -> Health check interception
//!     -> S3Router (virtual hosting + operation identification)
//!     -> Authentication (SigV4 header / presigned, body verification)
//!     -> dispatch_operation (S3Handler trait)
//!     -> Common response headers (x-amz-request-id, Server)
//!   <- HTTP Response
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use casgate_core::{CasGateway, GatewayConfig};
//! use casgate_http::{GatewayHandler, S3HttpConfig, S3HttpService};
//!
//! let gateway = Arc::new(CasGateway::in_memory(GatewayConfig::default()));
//! let service = S3HttpService::new(GatewayHandler::new(gateway), S3HttpConfig::default());
//! // Use `service` with hyper server.
//! ```

pub mod body;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod operation;
pub mod request;
pub mod response;
pub mod router;
pub mod service;

// Re-export key types for convenience.
pub use body::S3ResponseBody;
pub use dispatch::{S3Handler, S3Request, dispatch_operation};
pub use error::S3Error;
pub use handler::GatewayHandler;
pub use operation::S3Operation;
pub use router::{RoutingContext, S3Router};
pub use service::{S3HttpConfig, S3HttpService};
