use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tracing::debug;

use crate::config::Settings;
use crate::error::TransportError;
use crate::ports::PushTransport;
use crate::types::SubscriptionDescriptor;
use crate::vapid::{load_vapid_config, VapidConfig, VapidConfigStatus};

#[derive(Debug, thiserror::Error)]
pub enum TransportSetupError {
    #[error("VAPID configuration is missing")]
    MissingVapid,
    #[error("VAPID configuration is incomplete; set private key, public key and subject")]
    IncompleteVapid,
    #[error("failed to init web-push client: {0}")]
    Client(#[from] web_push::WebPushError),
}

/// Push transport backed by the `web-push` crate.
#[derive(Clone)]
pub struct WebPushTransport {
    vapid: VapidConfig,
    client: Arc<web_push::WebPushClient>,
    ttl: u32,
    timeout: Duration,
}

impl WebPushTransport {
    pub fn new(
        vapid: VapidConfig,
        ttl: u32,
        timeout: Duration,
    ) -> Result<Self, web_push::WebPushError> {
        let client = web_push::WebPushClient::new()?;
        Ok(Self {
            vapid,
            client: Arc::new(client),
            ttl,
            timeout,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, TransportSetupError> {
        let vapid = match load_vapid_config(settings) {
            VapidConfigStatus::Ready(vapid) => vapid,
            VapidConfigStatus::Incomplete => return Err(TransportSetupError::IncompleteVapid),
            VapidConfigStatus::Missing => return Err(TransportSetupError::MissingVapid),
        };
        Ok(Self::new(vapid, settings.push_ttl_secs, settings.push_timeout())?)
    }

    pub fn public_key(&self) -> &str {
        &self.vapid.public_key
    }

    async fn deliver(
        &self,
        descriptor: &SubscriptionDescriptor,
        payload: &str,
    ) -> Result<(), web_push::WebPushError> {
        let subscription_info = web_push::SubscriptionInfo::new(
            descriptor.endpoint.clone(),
            descriptor.keys.p256dh.clone(),
            descriptor.keys.auth.clone(),
        );
        let mut builder = web_push::WebPushMessageBuilder::new(&subscription_info)?;
        builder.set_payload(web_push::ContentEncoding::Aes128Gcm, payload.as_bytes());
        builder.set_ttl(self.ttl);
        let mut signature_builder = web_push::VapidSignatureBuilder::from_base64(
            &self.vapid.private_key,
            web_push::URL_SAFE_NO_PAD,
            &subscription_info,
        )?;
        signature_builder.add_claim("sub", self.vapid.subject.as_str());
        builder.set_vapid_signature(signature_builder.build()?);
        self.client.send(builder.build()?).await?;
        Ok(())
    }
}

impl PushTransport for WebPushTransport {
    fn send<'a>(
        &'a self,
        descriptor: &'a SubscriptionDescriptor,
        payload: &'a str,
    ) -> BoxFuture<'a, Result<(), TransportError>> {
        Box::pin(async move {
            match tokio::time::timeout(self.timeout, self.deliver(descriptor, payload)).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(err)) => Err(classify(err)),
                Err(_) => {
                    debug!(endpoint = %descriptor.endpoint, "push send timed out");
                    Err(TransportError::transient(format!(
                        "push send timed out after {}s",
                        self.timeout.as_secs()
                    )))
                }
            }
        })
    }
}

/// Only a 410 from the push service retires a subscription.
pub fn classify(err: web_push::WebPushError) -> TransportError {
    if matches!(err, web_push::WebPushError::EndpointNotValid) {
        TransportError::gone(err.to_string())
    } else {
        TransportError::transient(err.to_string())
    }
}
