//! Webhook signature checks for Actix Web.
//!
//! The payment layer signs every webhook body with HMAC-SHA256, keyed with the shared `ASP_HMAC_SECRET`, and sends the
//! base64-encoded signature in the `X-Settlement-Hmac-Sha256` header. Wrap the webhook scope with
//! [`HmacMiddlewareFactory`] and unsigned or tampered requests are rejected with `403 Forbidden` before any settlement
//! work starts.
//!
//! The body has to be read in full to check it, so the middleware buffers it and puts it back on the request for the
//! handler.

use std::{
    future::{ready, Ready},
    rc::Rc,
};

use actix_http::h1;
use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    error::{ErrorBadRequest, ErrorForbidden},
    web,
    Error,
};
use asp_common::Secret;
use futures::future::LocalBoxFuture;
use log::{trace, warn};
use thiserror::Error;

use crate::helpers::verify_hmac;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignatureRejection {
    #[error("No HMAC signature found.")]
    Missing,
    #[error("The HMAC signature header is not valid text.")]
    Unreadable,
    #[error("Invalid HMAC signature.")]
    Mismatch,
}

/// What a webhook scope expects of its callers
struct SignaturePolicy {
    header: String,
    key: Secret<String>,
    // When false, every request is let through unchecked
    enabled: bool,
}

impl SignaturePolicy {
    fn check(&self, req: &ServiceRequest, body: &[u8]) -> Result<(), SignatureRejection> {
        let signature = req.headers().get(&self.header).ok_or(SignatureRejection::Missing)?;
        let signature = signature.to_str().map_err(|_| SignatureRejection::Unreadable)?;
        if verify_hmac(self.key.reveal(), body, signature) {
            Ok(())
        } else {
            Err(SignatureRejection::Mismatch)
        }
    }
}

pub struct HmacMiddlewareFactory {
    policy: Rc<SignaturePolicy>,
}

impl HmacMiddlewareFactory {
    pub fn new(hmac_header: &str, key: Secret<String>, enabled: bool) -> Self {
        let policy = SignaturePolicy { header: hmac_header.to_string(), key, enabled };
        Self { policy: Rc::new(policy) }
    }
}

impl<S, B> Transform<S, ServiceRequest> for HmacMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = HmacMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(HmacMiddlewareService { policy: Rc::clone(&self.policy), service: Rc::new(service) }))
    }
}

pub struct HmacMiddlewareService<S> {
    policy: Rc<SignaturePolicy>,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for HmacMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let policy = Rc::clone(&self.policy);
        Box::pin(async move {
            if !policy.enabled {
                trace!("🔐️ HMAC checks are disabled. Allowing {}", req.path());
                return service.call(req).await;
            }
            let body = req.extract::<web::Bytes>().await.map_err(|e| {
                warn!("🔐️ Could not read the body of {}: {e}", req.path());
                ErrorBadRequest("Failed to extract request data.")
            })?;
            match policy.check(&req, &body) {
                Ok(()) => {
                    trace!("🔐️ HMAC check for {} ✅️", req.path());
                    req.set_payload(replay_body(body));
                    service.call(req).await
                },
                Err(rejection) => {
                    warn!("🔐️ Rejected webhook call to {}: {rejection}", req.path());
                    Err(ErrorForbidden(rejection.to_string()))
                },
            }
        })
    }
}

fn replay_body(buf: web::Bytes) -> Payload {
    let (_, mut pl) = h1::Payload::create(true);
    pl.unread_data(buf);
    Payload::from(pl)
}
