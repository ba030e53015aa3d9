//! Account and registration state
//!
//! Exactly one account exists at a time. It is created by a login request,
//! follows the engine's registration notifications, and is dropped on
//! unregister.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::{AccountParams, EngineAccountId, EngineRegistrationState, SipAddress, Transport};
use crate::error::{BridgeError, BridgeResult};

/// Registration state of the account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationState {
    Unregistered,
    Registering,
    Registered,
    Failed(String),
    Cleared,
}

impl RegistrationState {
    /// Map an engine registration notification
    pub fn from_engine(state: EngineRegistrationState, message: &str) -> Self {
        match state {
            EngineRegistrationState::None => RegistrationState::Unregistered,
            EngineRegistrationState::Progress => RegistrationState::Registering,
            EngineRegistrationState::Ok => RegistrationState::Registered,
            EngineRegistrationState::Cleared => RegistrationState::Cleared,
            EngineRegistrationState::Failed => RegistrationState::Failed(message.to_string()),
        }
    }

    pub fn is_registered(&self) -> bool {
        matches!(self, RegistrationState::Registered)
    }

    /// Registered, Failed and Cleared settle a pending login
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            RegistrationState::Registered | RegistrationState::Failed(_) | RegistrationState::Cleared
        )
    }
}

/// Authentication credentials
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// The single SIP account
#[derive(Debug, Clone)]
pub struct Account {
    pub id: Uuid,
    pub domain: String,
    pub credentials: Credentials,
    pub transport: Transport,
    pub state: RegistrationState,
    /// Engine handle, set once `register` has been accepted
    pub engine_account: Option<EngineAccountId>,
    pub created_at: DateTime<Utc>,
    pub registered_at: Option<DateTime<Utc>>,
}

impl Account {
    /// Build an account from a login request
    ///
    /// Fails with `InvalidAddress` when `user@domain` is not a usable SIP
    /// identity.
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        domain: impl Into<String>,
        transport: Transport,
    ) -> BridgeResult<Self> {
        let username = username.into();
        let domain = domain.into();
        let identity = format!("sip:{}@{}", username, domain);

        if username.trim().is_empty() || domain.trim().is_empty() || SipAddress::parse(&identity).is_none() {
            return Err(BridgeError::invalid_address(identity));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            domain,
            credentials: Credentials {
                username,
                password: password.into(),
            },
            transport,
            state: RegistrationState::Unregistered,
            engine_account: None,
            created_at: Utc::now(),
            registered_at: None,
        })
    }

    pub fn username(&self) -> &str {
        &self.credentials.username
    }

    /// `sip:<user>@<domain>`
    pub fn identity(&self) -> String {
        format!("sip:{}@{}", self.credentials.username, self.domain)
    }

    /// `sip:<domain>;transport=<t>`
    pub fn server_address(&self) -> String {
        format!("sip:{};transport={}", self.domain, self.transport.as_str())
    }

    /// Parameters the engine registers with
    pub fn params(&self, keep_preview_ratio: bool) -> AccountParams {
        AccountParams {
            identity: self.identity(),
            server_address: self.server_address(),
            username: self.credentials.username.clone(),
            password: self.credentials.password.clone(),
            domain: self.domain.clone(),
            transport: self.transport,
            register_enabled: true,
            keep_preview_ratio,
        }
    }

    /// Whether a notification for `account` concerns this account
    pub fn is_engine_account(&self, account: EngineAccountId) -> bool {
        self.engine_account == Some(account)
    }

    pub fn set_state(&mut self, state: RegistrationState) {
        if state.is_registered() && !self.state.is_registered() {
            self.registered_at = Some(Utc::now());
        }
        self.state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_account_binding() {
        let mut account = Account::new("alice", "secret", "example.com", Transport::Tcp).unwrap();
        assert!(!account.is_engine_account(EngineAccountId(1)));

        account.engine_account = Some(EngineAccountId(2));
        assert!(account.is_engine_account(EngineAccountId(2)));
        assert!(!account.is_engine_account(EngineAccountId(1)));
    }

    #[test]
    fn test_account_addresses() {
        let account = Account::new("alice", "secret", "sip.example.com", Transport::Tcp).unwrap();
        assert_eq!(account.identity(), "sip:alice@sip.example.com");
        assert_eq!(account.server_address(), "sip:sip.example.com;transport=tcp");

        let params = account.params(true);
        assert!(params.register_enabled);
        assert!(params.keep_preview_ratio);
        assert_eq!(params.password, "secret");
        assert_eq!(params.domain, "sip.example.com");
    }

    #[test]
    fn test_invalid_identity_rejected() {
        assert!(matches!(
            Account::new("", "pw", "example.com", Transport::Udp),
            Err(BridgeError::InvalidAddress { .. })
        ));
        assert!(matches!(
            Account::new("bob", "pw", " ", Transport::Udp),
            Err(BridgeError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let account = Account::new("alice", "hunter2", "example.com", Transport::Tls).unwrap();
        let rendered = format!("{:?}", account);
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_state_mapping_and_timestamps() {
        assert_eq!(
            RegistrationState::from_engine(EngineRegistrationState::Failed, "403 Forbidden"),
            RegistrationState::Failed("403 Forbidden".to_string())
        );
        assert!(!RegistrationState::Registering.is_final());
        assert!(RegistrationState::Cleared.is_final());

        let mut account = Account::new("alice", "pw", "example.com", Transport::Tcp).unwrap();
        account.set_state(RegistrationState::Registering);
        assert!(account.registered_at.is_none());
        account.set_state(RegistrationState::Registered);
        assert!(account.registered_at.is_some());
    }
}
