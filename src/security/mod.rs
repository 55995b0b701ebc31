//! Cross-origin access for browser front ends.
//!
//! - [`CorsMiddleware`] — `Access-Control-*` header injection and preflight
//!   (`OPTIONS`) short-circuiting.

use std::pin::Pin;

use crate::{
    Method, Response, StatusCode,
    context::Context,
    middleware::{Middleware, Next},
};

/// CORS middleware with an open policy.
///
/// Every response carries `Access-Control-Allow-Origin: *`, whether or not the
/// request sent an `Origin` header. `OPTIONS` requests are answered as
/// preflights with `204 No Content`; the downstream handler is **not** called.
///
/// | Setting          | Value                          |
/// |------------------|--------------------------------|
/// | Allowed origins  | `*`                            |
/// | Allowed methods  | `GET`, `POST`, `OPTIONS`       |
/// | Allowed headers  | `Content-Type`, `Authorization`|
pub struct CorsMiddleware {
    allowed_methods: String,
    allowed_headers: String,
}

impl Default for CorsMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl CorsMiddleware {
    pub fn new() -> Self {
        Self {
            allowed_methods: "GET, POST, OPTIONS".to_owned(),
            allowed_headers: "Content-Type, Authorization".to_owned(),
        }
    }
}

impl Middleware for CorsMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        let methods = self.allowed_methods.clone();
        let headers = self.allowed_headers.clone();

        Box::pin(async move {
            let mut resp = if ctx.request().method() == &Method::Options {
                Response::new(StatusCode::NoContent).header("Access-Control-Max-Age", "3600")
            } else {
                next.run(ctx).await
            };

            resp.add_header("Access-Control-Allow-Origin", "*");
            resp.add_header("Access-Control-Allow-Methods", methods);
            resp.add_header("Access-Control-Allow-Headers", headers);
            resp
        })
    }
}
