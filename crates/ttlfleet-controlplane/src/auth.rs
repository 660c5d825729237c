//! # Authorization Gate
//!
//! Bearer JWTs (HS256) carry the caller's roles. Every operation names the
//! roles allowed to run it; the gate runs before any provider call.

use crate::error::{ControlError, Result};
use chrono::{TimeDelta, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;

/// Caller role
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Admin,
    PowerUser,
    User,
}

impl FromStr for Role {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "admin" => Ok(Role::Admin),
            "power-user" => Ok(Role::PowerUser),
            "user" => Ok(Role::User),
            other => Err(ControlError::Unauthorized(format!("unknown role '{}'", other))),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::PowerUser => write!(f, "power-user"),
            Role::User => write!(f, "user"),
        }
    }
}

/// Operations subject to authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    List,
    Help,
    Create,
    Start,
    Stop,
    Reboot,
    Extend,
    Prune,
    Retype,
}

impl Operation {
    pub fn allowed_roles(self) -> &'static [Role] {
        match self {
            Operation::Create | Operation::Retype => &[Role::Admin],
            Operation::Start
            | Operation::Stop
            | Operation::Reboot
            | Operation::Extend
            | Operation::Prune => &[Role::Admin, Role::PowerUser],
            Operation::List | Operation::Help => &[Role::Admin, Role::PowerUser, Role::User],
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Operation::List => "list",
            Operation::Help => "help",
            Operation::Create => "create",
            Operation::Start => "start",
            Operation::Stop => "stop",
            Operation::Reboot => "reboot",
            Operation::Extend => "extend",
            Operation::Prune => "prune",
            Operation::Retype => "retype",
        };
        write!(f, "{}", s)
    }
}

/// An authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub subject: String,
    pub roles: BTreeSet<Role>,
}

impl Caller {
    pub fn new(subject: impl Into<String>, roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            subject: subject.into(),
            roles: roles.into_iter().collect(),
        }
    }

    pub fn authorize(&self, operation: Operation) -> Result<()> {
        if operation
            .allowed_roles()
            .iter()
            .any(|role| self.roles.contains(role))
        {
            return Ok(());
        }
        tracing::warn!("{} may not {}", self.subject, operation);
        Err(ControlError::Forbidden(format!(
            "{} may not {}",
            self.subject, operation
        )))
    }
}

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Role names; unknown names are ignored
    #[serde(default)]
    pub roles: Vec<String>,
}

/// HS256 token verifier and issuer
#[derive(Clone)]
pub struct Authorizer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for Authorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authorizer")
            .field("algorithm", &Algorithm::HS256)
            .finish()
    }
}

impl Authorizer {
    pub fn new(secret: &[u8]) -> Result<Self> {
        if secret.is_empty() {
            return Err(ControlError::InvalidConfig(
                "JWT signing secret is empty".to_string(),
            ));
        }
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "sub"]);
        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        })
    }

    /// Verify a token and return its caller
    pub fn verify(&self, token: &str) -> Result<Caller> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            tracing::debug!("JWT validation failed: {}", e);
            ControlError::Unauthorized(e.to_string())
        })?;

        let roles = data
            .claims
            .roles
            .iter()
            .filter_map(|name| name.parse::<Role>().ok());
        Ok(Caller::new(data.claims.sub, roles))
    }

    /// Verify the value of an `Authorization: Bearer <token>` header
    pub fn verify_header(&self, header: Option<&str>) -> Result<Caller> {
        let header = header
            .ok_or_else(|| ControlError::Unauthorized("missing authorization header".to_string()))?;
        let token = header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                ControlError::Unauthorized("expected a bearer token".to_string())
            })?;
        self.verify(token)
    }

    /// Issue a token valid for `lifetime`
    pub fn issue(&self, subject: &str, roles: &[Role], lifetime: TimeDelta) -> Result<String> {
        let claims = Claims {
            sub: subject.to_string(),
            exp: (Utc::now() + lifetime).timestamp(),
            roles: roles.iter().map(Role::to_string).collect(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| ControlError::InvalidConfig(format!("failed to sign token: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authorizer() -> Authorizer {
        Authorizer::new(b"test-secret").unwrap()
    }

    #[test]
    fn test_role_matrix() {
        let admin = Caller::new("ada", [Role::Admin]);
        let power = Caller::new("pat", [Role::PowerUser]);
        let user = Caller::new("uli", [Role::User]);

        for op in [Operation::Create, Operation::Retype] {
            assert!(admin.authorize(op).is_ok());
            assert!(power.authorize(op).is_err());
            assert!(user.authorize(op).is_err());
        }
        for op in [
            Operation::Start,
            Operation::Stop,
            Operation::Reboot,
            Operation::Extend,
            Operation::Prune,
        ] {
            assert!(admin.authorize(op).is_ok());
            assert!(power.authorize(op).is_ok());
            assert!(matches!(user.authorize(op), Err(ControlError::Forbidden(_))));
        }
        for op in [Operation::List, Operation::Help] {
            assert!(user.authorize(op).is_ok());
        }
        assert!(Caller::new("nobody", Vec::<Role>::new()).authorize(Operation::List).is_err());
    }

    #[test]
    fn test_issue_and_verify() {
        let auth = authorizer();
        let token = auth
            .issue("ada", &[Role::Admin, Role::User], TimeDelta::hours(1))
            .unwrap();

        let caller = auth.verify_header(Some(&format!("Bearer {}", token))).unwrap();
        assert_eq!(caller.subject, "ada");
        assert!(caller.roles.contains(&Role::Admin));
        assert!(caller.roles.contains(&Role::User));
    }

    #[test]
    fn test_rejects_bad_tokens() {
        let auth = authorizer();
        let expired = auth
            .issue("ada", &[Role::Admin], TimeDelta::hours(-2))
            .unwrap();
        assert!(matches!(auth.verify(&expired), Err(ControlError::Unauthorized(_))));

        let foreign = Authorizer::new(b"other-secret")
            .unwrap()
            .issue("ada", &[Role::Admin], TimeDelta::hours(1))
            .unwrap();
        assert!(matches!(auth.verify(&foreign), Err(ControlError::Unauthorized(_))));

        assert!(matches!(auth.verify_header(None), Err(ControlError::Unauthorized(_))));
        assert!(matches!(
            auth.verify_header(Some("Basic abc")),
            Err(ControlError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_unknown_roles_are_ignored() {
        let auth = authorizer();
        let claims = Claims {
            sub: "guest".to_string(),
            exp: (Utc::now() + TimeDelta::hours(1)).timestamp(),
            roles: vec!["guest".to_string(), "user".to_string()],
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();

        let caller = auth.verify(&token).unwrap();
        assert_eq!(caller.roles.into_iter().collect::<Vec<_>>(), vec![Role::User]);
    }
}
