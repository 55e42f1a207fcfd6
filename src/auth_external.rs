//! Narrow interfaces for the collaborators named out-of-scope in §1: OTP
//! issuance/SMS delivery and JWT/cookie signing. Injected as `Extension`s,
//! mirroring how the teacher injects `BasicClient` OAuth clients rather than
//! hand-rolling provider logic inline. The default implementations log via
//! `tracing` instead of calling a real SMS/JWT vendor, the same substitution
//! the teacher's test harness makes for its OAuth providers.

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::models::UserRecord;

#[derive(Debug, Error)]
pub enum ExternalError {
    #[error("external collaborator unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait OtpGateway: Send + Sync {
    async fn send_otp(&self, phone_number: &str) -> Result<(), ExternalError>;
    async fn verify_otp(&self, phone_number: &str, otp: &str) -> Result<bool, ExternalError>;
}

pub trait TokenIssuer: Send + Sync {
    fn issue_access_token(&self, user: &UserRecord) -> String;
    fn issue_refresh_token(&self, user: &UserRecord) -> String;
}

/// Logs instead of sending a real SMS. Accepts the literal OTP `"000000"`
/// for local development and testing.
#[derive(Debug, Clone, Default)]
pub struct LoggingOtpGateway;

#[async_trait]
impl OtpGateway for LoggingOtpGateway {
    async fn send_otp(&self, phone_number: &str) -> Result<(), ExternalError> {
        info!(%phone_number, "would send OTP 000000 via SMS gateway");
        Ok(())
    }

    async fn verify_otp(&self, phone_number: &str, otp: &str) -> Result<bool, ExternalError> {
        info!(%phone_number, "verifying OTP against logging gateway");
        Ok(otp == "000000")
    }
}

/// Issues opaque, unsigned development tokens shaped like the three-part
/// bearer token `authenticate` expects: `header.payload.signature`, with
/// `payload` the base64url-encoded claims `sub`/`username`/`phoneNumber`.
#[derive(Debug, Clone, Default)]
pub struct DevTokenIssuer;

impl DevTokenIssuer {
    fn encode(user: &UserRecord) -> String {
        let claims = serde_json::json!({
            "sub": user.id.0,
            "username": user.username,
            "phoneNumber": user.phone_number,
        });
        let payload = base64::encode_config(claims.to_string(), base64::URL_SAFE_NO_PAD);
        format!("devheader.{payload}.devsignature")
    }
}

impl TokenIssuer for DevTokenIssuer {
    fn issue_access_token(&self, user: &UserRecord) -> String {
        Self::encode(user)
    }

    fn issue_refresh_token(&self, user: &UserRecord) -> String {
        Self::encode(user)
    }
}
