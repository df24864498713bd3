//! Webhook delivery for observed payments.
//!
//! Builds the signed form payload for a payment, POSTs it to the configured
//! endpoint and classifies the reply. Only `200` with a body of exactly
//! `success` counts as delivered; everything else is a [`DeliveryError`].

pub mod error;
pub mod signing;
pub mod webhook;

pub use error::DeliveryError;
pub use signing::sign;
pub use webhook::{WebhookClient, WebhookPayload};
