//! SASL authenticators and mechanism selection.
//!
//! An [`Authenticator`] drives one side of an `AUTH` exchange: [`start`]
//! names the mechanism and optionally supplies an initial response, then
//! [`next`] answers each server challenge. The client handles the base64
//! framing.
//!
//! [`start`]: Authenticator::start
//! [`next`]: Authenticator::next

use std::fmt;
use std::sync::Arc;

use hmac::{Hmac, Mac};
use md5::Md5;

use crate::connection::ServerInfo;
use crate::error::{Error, Result};
use crate::types::AuthMechanism;

const LOGIN_USERNAME_CHALLENGE: &[u8] = b"Username:";
const LOGIN_PASSWORD_CHALLENGE: &[u8] = b"Password:";

/// One side of a SASL exchange.
pub trait Authenticator: Send + Sync {
    /// Begins authentication.
    ///
    /// Returns the mechanism name and an optional initial response sent with
    /// the `AUTH` command.
    ///
    /// # Errors
    ///
    /// An error aborts the exchange before anything is sent.
    fn start(&self, server: &ServerInfo) -> Result<(String, Option<Vec<u8>>)>;

    /// Continues authentication.
    ///
    /// `challenge` is the decoded server data. When `more` is true the server
    /// expects a response; when false the exchange has succeeded and the
    /// method should return `None`.
    ///
    /// # Errors
    ///
    /// An error cancels the exchange.
    fn next(&self, challenge: &[u8], more: bool) -> Result<Option<Vec<u8>>>;
}

/// Username, password and optional CRAM-MD5 shared secret.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Login name.
    pub username: String,
    /// Password.
    pub password: String,
    /// CRAM-MD5 shared secret; the password is used when unset.
    pub cram_md5_secret: Option<String>,
}

impl Credentials {
    /// Creates credentials from a username and password.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            cram_md5_secret: None,
        }
    }

    /// Returns the key used for CRAM-MD5.
    #[must_use]
    pub fn cram_md5_key(&self) -> &str {
        self.cram_md5_secret.as_deref().unwrap_or(&self.password)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field(
                "cram_md5_secret",
                &self.cram_md5_secret.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Picks an authenticator from the server's `AUTH` parameters.
///
/// Preference order is CRAM-MD5, then PLAIN, then LOGIN. LOGIN is used
/// whenever neither of the others is advertised.
#[must_use]
pub fn select_authenticator(
    advertised: &str,
    credentials: &Credentials,
    host: &str,
) -> Arc<dyn Authenticator> {
    let mechanisms = AuthMechanism::parse_list(advertised);

    if mechanisms.contains(&AuthMechanism::CramMd5) {
        Arc::new(CramMd5Auth::new(
            &credentials.username,
            credentials.cram_md5_key(),
        ))
    } else if mechanisms.contains(&AuthMechanism::Plain) {
        Arc::new(PlainAuth::new(
            "",
            &credentials.username,
            &credentials.password,
            host,
        ))
    } else {
        Arc::new(LoginAuth::new(&credentials.username, &credentials.password))
    }
}

fn is_localhost(name: &str) -> bool {
    matches!(name, "localhost" | "127.0.0.1" | "::1")
}

/// `PLAIN` (RFC 4616).
///
/// Refuses to send credentials unless the connection is TLS-protected or the
/// server is localhost, and only to the host it was created for.
#[derive(Clone)]
pub struct PlainAuth {
    identity: String,
    username: String,
    password: String,
    host: String,
}

impl PlainAuth {
    /// Creates a PLAIN authenticator bound to `host`.
    #[must_use]
    pub fn new(
        identity: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        host: impl Into<String>,
    ) -> Self {
        Self {
            identity: identity.into(),
            username: username.into(),
            password: password.into(),
            host: host.into(),
        }
    }
}

impl fmt::Debug for PlainAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlainAuth")
            .field("identity", &self.identity)
            .field("username", &self.username)
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

impl Authenticator for PlainAuth {
    fn start(&self, server: &ServerInfo) -> Result<(String, Option<Vec<u8>>)> {
        if !server.tls && !is_localhost(&server.name) {
            return Err(Error::Sasl("unencrypted connection".into()));
        }
        if server.name != self.host {
            return Err(Error::Sasl("wrong host name".into()));
        }

        let response = format!("{}\0{}\0{}", self.identity, self.username, self.password);
        Ok((
            AuthMechanism::Plain.as_str().to_string(),
            Some(response.into_bytes()),
        ))
    }

    fn next(&self, challenge: &[u8], more: bool) -> Result<Option<Vec<u8>>> {
        if more {
            return Err(Error::UnexpectedChallenge(
                String::from_utf8_lossy(challenge).into_owned(),
            ));
        }
        Ok(None)
    }
}

/// `CRAM-MD5` (RFC 2195).
#[derive(Clone)]
pub struct CramMd5Auth {
    username: String,
    secret: String,
}

impl CramMd5Auth {
    /// Creates a CRAM-MD5 authenticator.
    #[must_use]
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: secret.into(),
        }
    }

    fn digest(&self, challenge: &[u8]) -> Result<String> {
        let mut mac = Hmac::<Md5>::new_from_slice(self.secret.as_bytes())
            .map_err(|e| Error::Sasl(format!("invalid CRAM-MD5 key: {e}")))?;
        mac.update(challenge);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

impl fmt::Debug for CramMd5Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CramMd5Auth")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl Authenticator for CramMd5Auth {
    fn start(&self, _server: &ServerInfo) -> Result<(String, Option<Vec<u8>>)> {
        Ok((AuthMechanism::CramMd5.as_str().to_string(), None))
    }

    fn next(&self, challenge: &[u8], more: bool) -> Result<Option<Vec<u8>>> {
        if !more {
            return Ok(None);
        }
        let response = format!("{} {}", self.username, self.digest(challenge)?);
        Ok(Some(response.into_bytes()))
    }
}

/// `LOGIN`: answers the `Username:` and `Password:` prompts.
#[derive(Clone)]
pub struct LoginAuth {
    username: String,
    password: String,
}

impl LoginAuth {
    /// Creates a LOGIN authenticator.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for LoginAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginAuth")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl Authenticator for LoginAuth {
    fn start(&self, _server: &ServerInfo) -> Result<(String, Option<Vec<u8>>)> {
        Ok((AuthMechanism::Login.as_str().to_string(), None))
    }

    fn next(&self, challenge: &[u8], more: bool) -> Result<Option<Vec<u8>>> {
        if !more {
            return Ok(None);
        }

        match challenge {
            LOGIN_USERNAME_CHALLENGE => Ok(Some(self.username.clone().into_bytes())),
            LOGIN_PASSWORD_CHALLENGE => Ok(Some(self.password.clone().into_bytes())),
            other => Err(Error::UnexpectedChallenge(
                String::from_utf8_lossy(other).into_owned(),
            )),
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    fn server(name: &str, tls: bool) -> ServerInfo {
        ServerInfo {
            name: name.to_string(),
            tls,
            ..ServerInfo::default()
        }
    }

    fn credentials() -> Credentials {
        Credentials::new("user", "pass")
    }

    fn mechanism_of(auth: &Arc<dyn Authenticator>) -> String {
        auth.start(&server("localhost", true)).unwrap().0
    }

    mod selection_tests {
        use super::*;

        #[test]
        fn prefers_cram_md5() {
            let auth = select_authenticator("PLAIN LOGIN CRAM-MD5", &credentials(), "localhost");
            assert_eq!(mechanism_of(&auth), "CRAM-MD5");
        }

        #[test]
        fn plain_over_login() {
            let auth = select_authenticator("LOGIN PLAIN", &credentials(), "localhost");
            assert_eq!(mechanism_of(&auth), "PLAIN");
        }

        #[test]
        fn login_fallback() {
            let auth = select_authenticator("LOGIN", &credentials(), "localhost");
            assert_eq!(mechanism_of(&auth), "LOGIN");

            let auth = select_authenticator("XOAUTH2", &credentials(), "localhost");
            assert_eq!(mechanism_of(&auth), "LOGIN");
        }

        #[test]
        fn case_insensitive_tokens() {
            let auth = select_authenticator("plain cram-md5", &credentials(), "localhost");
            assert_eq!(mechanism_of(&auth), "CRAM-MD5");
        }

        #[test]
        fn token_not_substring() {
            let auth = select_authenticator("XPLAIN", &credentials(), "localhost");
            assert_eq!(mechanism_of(&auth), "LOGIN");
        }

        #[test]
        fn cram_secret_falls_back_to_password() {
            let challenge = b"<1896.697170952@postoffice.reston.mci.net>";

            let creds = Credentials::new("tim", "tanstaaftanstaaf");
            let auth = select_authenticator("CRAM-MD5", &creds, "localhost");
            let with_password = auth.next(challenge, true).unwrap().unwrap();

            let mut creds = Credentials::new("tim", "something else");
            creds.cram_md5_secret = Some("tanstaaftanstaaf".into());
            let auth = select_authenticator("CRAM-MD5", &creds, "localhost");
            let with_secret = auth.next(challenge, true).unwrap().unwrap();

            assert_eq!(with_password, with_secret);
        }
    }

    mod plain_tests {
        use super::*;

        #[test]
        fn initial_response() {
            let auth = PlainAuth::new("", "user", "pass", "smtp.example.com");
            let (mechanism, initial) = auth.start(&server("smtp.example.com", true)).unwrap();
            assert_eq!(mechanism, "PLAIN");
            assert_eq!(initial.unwrap(), b"\0user\0pass");
        }

        #[test]
        fn identity_is_included() {
            let auth = PlainAuth::new("admin", "user", "pass", "localhost");
            let (_, initial) = auth.start(&server("localhost", false)).unwrap();
            assert_eq!(initial.unwrap(), b"admin\0user\0pass");
        }

        #[test]
        fn refuses_cleartext_remote_host() {
            let auth = PlainAuth::new("", "user", "pass", "smtp.example.com");
            let err = auth.start(&server("smtp.example.com", false)).unwrap_err();
            assert!(matches!(err, Error::Sasl(_)));
        }

        #[test]
        fn allows_cleartext_localhost() {
            for host in ["localhost", "127.0.0.1", "::1"] {
                let auth = PlainAuth::new("", "user", "pass", host);
                assert!(auth.start(&server(host, false)).is_ok());
            }
        }

        #[test]
        fn refuses_wrong_host() {
            let auth = PlainAuth::new("", "user", "pass", "smtp.example.com");
            let err = auth.start(&server("evil.example.com", true)).unwrap_err();
            assert!(matches!(err, Error::Sasl(_)));
        }

        #[test]
        fn challenge_is_unexpected() {
            let auth = PlainAuth::new("", "user", "pass", "localhost");
            assert!(matches!(
                auth.next(b"more?", true),
                Err(Error::UnexpectedChallenge(_))
            ));
            assert_eq!(auth.next(b"", false).unwrap(), None);
        }
    }

    mod cram_md5_tests {
        use super::*;

        #[test]
        fn rfc2195_example() {
            let auth = CramMd5Auth::new("tim", "tanstaaftanstaaf");
            let (mechanism, initial) = auth.start(&server("smtp.example.com", false)).unwrap();
            assert_eq!(mechanism, "CRAM-MD5");
            assert!(initial.is_none());

            let response = auth
                .next(b"<1896.697170952@postoffice.reston.mci.net>", true)
                .unwrap()
                .unwrap();
            assert_eq!(response, b"tim b913a602c7eda7a495b4e6e7334d3890");
        }

        #[test]
        fn done_returns_none() {
            let auth = CramMd5Auth::new("tim", "secret");
            assert_eq!(auth.next(b"2.7.0 Authentication successful", false).unwrap(), None);
        }
    }

    mod login_tests {
        use super::*;

        #[test]
        fn start() {
            let auth = LoginAuth::new("user", "pass");
            let (mechanism, initial) = auth.start(&server("smtp.example.com", false)).unwrap();
            assert_eq!(mechanism, "LOGIN");
            assert!(initial.is_none());
        }

        #[test]
        fn answers_prompts() {
            let auth = LoginAuth::new("user", "pass");
            assert_eq!(auth.next(b"Username:", true).unwrap().unwrap(), b"user");
            assert_eq!(auth.next(b"Password:", true).unwrap().unwrap(), b"pass");
        }

        #[test]
        fn unexpected_challenge() {
            let auth = LoginAuth::new("user", "pass");
            let err = auth.next(b"Unknown:", true).unwrap_err();
            assert!(matches!(err, Error::UnexpectedChallenge(ref c) if c == "Unknown:"));
        }

        #[test]
        fn done_returns_none() {
            let auth = LoginAuth::new("user", "pass");
            assert_eq!(auth.next(b"Unknown:", false).unwrap(), None);
        }
    }

    #[test]
    fn credentials_debug_redacts() {
        let mut creds = Credentials::new("user", "hunter2");
        creds.cram_md5_secret = Some("s3cret".into());
        let debug = format!("{creds:?}");
        assert!(debug.contains("user"));
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("s3cret"));
    }
}
