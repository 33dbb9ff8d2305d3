//! S3 operation dispatch: routes a resolved operation to the handler.
//!
//! [`dispatch_operation`] bridges the routing and authentication layers with the
//! gateway. By the time it runs the request has been routed to an
//! [`S3Operation`], its caller resolved to a [`Principal`], and its body
//! wrapped in whatever verification the authentication scheme requires.

use std::future::Future;
use std::pin::Pin;

use casgate_core::acl::Principal;
use casgate_core::store::ByteStream;

use crate::body::S3ResponseBody;
use crate::error::S3Error;
use crate::operation::S3Operation;
use crate::router::RoutingContext;

/// An authenticated request on its way to the handler.
pub struct S3Request {
    /// The HTTP request head.
    pub parts: http::request::Parts,
    /// The request body, already decoded from `aws-chunked` framing and
    /// checked against the signed payload hash as it is read.
    pub body: ByteStream,
    /// Who sent the request.
    pub principal: Principal,
    /// Whether the body arrived `aws-chunked` encoded.
    pub chunked: bool,
}

impl std::fmt::Debug for S3Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Request")
            .field("method", &self.parts.method)
            .field("uri", &self.parts.uri)
            .field("principal", &self.principal)
            .field("chunked", &self.chunked)
            .finish_non_exhaustive()
    }
}

/// The boxed future an [`S3Handler`] returns.
pub type HandlerFuture =
    Pin<Box<dyn Future<Output = Result<http::Response<S3ResponseBody>, S3Error>> + Send>>;

/// Trait that the gateway implements for the HTTP layer.
///
/// This is the boundary between the HTTP layer and the S3 business logic.
///
/// # Object Safety
///
/// The method returns a boxed future so the trait can be used as
/// `Arc<dyn S3Handler>` for dynamic dispatch in the service layer.
pub trait S3Handler: Send + Sync + 'static {
    /// Handle an S3 operation and produce an HTTP response.
    fn handle_operation(&self, op: S3Operation, req: S3Request, ctx: RoutingContext)
    -> HandlerFuture;
}

/// Dispatch a routed S3 request to the handler.
///
/// Called by [`S3HttpService`](crate::service::S3HttpService) after routing and
/// authentication.
pub async fn dispatch_operation<H: S3Handler + ?Sized>(
    handler: &H,
    req: S3Request,
    ctx: RoutingContext,
) -> Result<http::Response<S3ResponseBody>, S3Error> {
    let op = ctx.operation;
    tracing::debug!(
        operation = %op,
        bucket = ?ctx.bucket,
        key = ?ctx.key,
        principal = %req.principal,
        "dispatching S3 operation"
    );
    handler.handle_operation(op, req, ctx).await
}
