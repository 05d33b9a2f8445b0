//! Credential endpoints: sign-in, registration, email verification and
//! password reset.
//!
//! Login, registration and password reset are auth-bypass endpoints: a 401
//! from them is returned to the caller as is and never triggers a refresh.

use serde::Serialize;

use crate::client::{ApiClient, RequestOptions};
use crate::error::Error;
use crate::types::{AccessToken, TokenPayload};

pub(crate) const LOGIN_PATH: &str = "/auth/login";
pub(crate) const REGISTER_PATH: &str = "/auth/register";
pub(crate) const FORGOT_PASSWORD_PATH: &str = "/auth/forgot-password";
pub(crate) const VERIFY_EMAIL_PATH: &str = "/auth/verify-email";
pub(crate) const RESEND_VERIFICATION_PATH: &str = "/auth/resend-verification";

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct EmailOnly<'a> {
    email: &'a str,
}

#[derive(Serialize)]
struct VerifyEmail<'a> {
    email: &'a str,
    code: &'a str,
}

/// New student account.
///
/// ```rust,ignore
/// let req = RegisterRequest::new("Lina", "Haddad", "lina@example.com", "s3cret!")
///     .with_phone_number("+962700000000");
/// ```
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct RegisterRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
}

impl RegisterRequest {
    #[must_use]
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            email: email.into(),
            password: password.into(),
            phone_number: None,
        }
    }

    #[must_use]
    pub fn with_phone_number(mut self, phone: impl Into<String>) -> Self {
        self.phone_number = Some(phone.into());
        self
    }
}

impl ApiClient {
    /// Exchange email and password for an access token.
    ///
    /// The server also sets the refresh cookie on this response. The token is
    /// returned, not installed; pass it to
    /// [`SessionController::login`](crate::SessionController::login).
    ///
    /// # Errors
    ///
    /// Returns [`Error::HttpStatus`] for rejected credentials, or
    /// [`Error::MissingToken`] if the response carries no token.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AccessToken, Error> {
        let response = self
            .post(LOGIN_PATH, &Credentials { email, password }, RequestOptions::new())
            .await?;
        response
            .data::<TokenPayload>()?
            .access_token
            .ok_or(Error::MissingToken)
    }

    /// # Errors
    ///
    /// Returns [`Error::HttpStatus`] (409 when the email is taken).
    pub async fn register(&self, request: &RegisterRequest) -> Result<(), Error> {
        self.post(REGISTER_PATH, request, RequestOptions::new())
            .await
            .map(drop)
    }

    /// Ask the server to send a password-reset email.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn forgot_password(&self, email: &str) -> Result<(), Error> {
        self.post(FORGOT_PASSWORD_PATH, &EmailOnly { email }, RequestOptions::new())
            .await
            .map(drop)
    }

    /// # Errors
    ///
    /// Returns [`Error::HttpStatus`] for a wrong or expired code.
    pub async fn verify_email(&self, email: &str, code: &str) -> Result<(), Error> {
        self.post(VERIFY_EMAIL_PATH, &VerifyEmail { email, code }, RequestOptions::new())
            .await
            .map(drop)
    }

    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn resend_verification(&self, email: &str) -> Result<(), Error> {
        self.post(RESEND_VERIFICATION_PATH, &EmailOnly { email }, RequestOptions::new())
            .await
            .map(drop)
    }
}
