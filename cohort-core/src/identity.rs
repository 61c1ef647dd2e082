//! Visitor identity types and the external identity-resolver seam.
//!
//! The engine never resolves cookies or sessions itself; it consumes an
//! opaque [`VisitorIdentity`] supplied by an [`IdentityResolver`]. Exactly
//! one branch of the identity identifies a physical visitor at a time.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{AnonymousId, UserId};

/// A stable identity for one physical visitor.
///
/// A discriminated union, pattern-matched at every consumer: either an
/// authenticated account id or an anonymous visitor id minted on first
/// contact, never both.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VisitorIdentity {
    /// A signed-in account
    Authenticated { user_id: UserId },
    /// An anonymous visitor tracked by a minted id
    Anonymous { anonymous_id: AnonymousId },
}

impl VisitorIdentity {
    /// Identity for an authenticated account.
    #[must_use]
    pub fn authenticated(user_id: UserId) -> Self {
        Self::Authenticated { user_id }
    }

    /// Identity for an anonymous visitor.
    #[must_use]
    pub fn anonymous(anonymous_id: AnonymousId) -> Self {
        Self::Anonymous { anonymous_id }
    }
}

/// A resolved visitor, as handed to the engine by the resolver.
#[derive(Debug, Clone)]
pub struct Visitor {
    /// The stable identity
    pub identity: VisitorIdentity,

    /// Whether the visitor has passed the human-confirmation check.
    /// Unconfirmed traffic (bots) never consumes an assignment slot.
    pub confirmed_human: bool,

    /// Remote address, when known (forwarded to analytics only)
    pub remote_addr: Option<IpAddr>,
}

impl Visitor {
    /// A confirmed-human visitor with no known address (test helper and
    /// trusted-pipeline shorthand).
    #[must_use]
    pub fn confirmed(identity: VisitorIdentity) -> Self {
        Self {
            identity,
            confirmed_human: true,
            remote_addr: None,
        }
    }
}

/// Raw request attributes the resolver works from.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Opaque visitor token (cookie/header value), if the client sent one
    pub visitor_token: Option<String>,
    /// Remote address, if known
    pub remote_addr: Option<IpAddr>,
}

/// External collaborator that maps inbound requests to visitors.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Resolve the request to a stable visitor, minting an anonymous id
    /// when the client carries none.
    async fn resolve(&self, ctx: &RequestContext) -> Visitor;

    /// Mark the requesting visitor as confirmed-human.
    async fn confirm_human(&self, ctx: &RequestContext);
}

/// In-memory resolver for tests and single-process deployments.
///
/// Tokens of the form `user:<uuid>` resolve to authenticated identities;
/// any other UUID token is an anonymous visitor id. Human confirmation is
/// tracked per token.
pub struct MemoryResolver {
    confirmed: RwLock<HashSet<String>>,
    trust_all: bool,
}

impl MemoryResolver {
    /// Resolver that requires an explicit `confirm_human` per token.
    #[must_use]
    pub fn new() -> Self {
        Self {
            confirmed: RwLock::new(HashSet::new()),
            trust_all: false,
        }
    }

    /// Resolver that treats every visitor as already confirmed, for
    /// deployments where bot filtering happens upstream.
    #[must_use]
    pub fn trusting() -> Self {
        Self {
            confirmed: RwLock::new(HashSet::new()),
            trust_all: true,
        }
    }

    fn identity_for(token: &str) -> VisitorIdentity {
        if let Some(raw) = token.strip_prefix("user:") {
            if let Ok(id) = Uuid::parse_str(raw) {
                return VisitorIdentity::authenticated(UserId(id));
            }
        }
        match Uuid::parse_str(token) {
            Ok(id) => VisitorIdentity::anonymous(AnonymousId(id)),
            Err(_) => VisitorIdentity::anonymous(AnonymousId::new()),
        }
    }
}

impl Default for MemoryResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityResolver for MemoryResolver {
    async fn resolve(&self, ctx: &RequestContext) -> Visitor {
        let (identity, confirmed_human) = match &ctx.visitor_token {
            Some(token) => {
                let confirmed =
                    self.trust_all || self.confirmed.read().unwrap_or_else(|e| e.into_inner()).contains(token);
                (Self::identity_for(token), confirmed)
            }
            None => (
                VisitorIdentity::anonymous(AnonymousId::new()),
                self.trust_all,
            ),
        };
        Visitor {
            identity,
            confirmed_human,
            remote_addr: ctx.remote_addr,
        }
    }

    async fn confirm_human(&self, ctx: &RequestContext) {
        if let Some(token) = &ctx.visitor_token {
            self.confirmed
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .insert(token.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visitor_identity_serialization_roundtrip() {
        let identities = [
            VisitorIdentity::authenticated(UserId(Uuid::nil())),
            VisitorIdentity::anonymous(AnonymousId(Uuid::nil())),
        ];

        for identity in identities {
            let json = serde_json::to_string(&identity).unwrap();
            let parsed: VisitorIdentity = serde_json::from_str(&json).unwrap();
            assert_eq!(identity, parsed);
        }
    }

    #[test]
    fn visitor_identity_branches_are_distinct() {
        let user = VisitorIdentity::authenticated(UserId(Uuid::nil()));
        let anon = VisitorIdentity::anonymous(AnonymousId(Uuid::nil()));
        assert_ne!(user, anon);
    }

    #[tokio::test]
    async fn resolver_is_stable_for_the_same_token() {
        let resolver = MemoryResolver::trusting();
        let ctx = RequestContext {
            visitor_token: Some(Uuid::now_v7().to_string()),
            remote_addr: None,
        };

        let first = resolver.resolve(&ctx).await;
        let second = resolver.resolve(&ctx).await;
        assert_eq!(first.identity, second.identity);
    }

    #[tokio::test]
    async fn resolver_maps_user_tokens_to_authenticated_identities() {
        let resolver = MemoryResolver::trusting();
        let id = Uuid::now_v7();
        let ctx = RequestContext {
            visitor_token: Some(format!("user:{id}")),
            remote_addr: None,
        };

        let visitor = resolver.resolve(&ctx).await;
        assert_eq!(
            visitor.identity,
            VisitorIdentity::authenticated(UserId(id))
        );
    }

    #[tokio::test]
    async fn resolver_requires_confirmation_unless_trusting() {
        let resolver = MemoryResolver::new();
        let ctx = RequestContext {
            visitor_token: Some(Uuid::now_v7().to_string()),
            remote_addr: None,
        };

        assert!(!resolver.resolve(&ctx).await.confirmed_human);

        resolver.confirm_human(&ctx).await;
        assert!(resolver.resolve(&ctx).await.confirmed_human);
    }

    #[tokio::test]
    async fn resolver_mints_fresh_anonymous_ids_without_a_token() {
        let resolver = MemoryResolver::trusting();
        let ctx = RequestContext::default();

        let first = resolver.resolve(&ctx).await;
        let second = resolver.resolve(&ctx).await;
        assert_ne!(first.identity, second.identity);
    }
}
