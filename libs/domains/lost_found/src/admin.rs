//! Admin privilege management

use chrono::{SubsecRound, Utc};
use std::sync::Arc;
use tracing::instrument;
use validator::ValidateEmail;

use crate::error::{LifecycleError, LifecycleResult};
use crate::models::{AdminPrincipal, Principal, normalize_email};
use crate::repository::AdminRepository;

/// Name recorded as grantor for start-up grants
pub const SYSTEM_GRANTOR: &str = "system";

/// An authenticated principal that passed the admin check.
///
/// Only [`AdminService::authorize`] hands these out, so every engine
/// operation that takes one is admin-only.
#[derive(Debug, Clone)]
pub struct AdminContext {
    principal: Principal,
}

impl AdminContext {
    pub(crate) fn new(principal: Principal) -> Self {
        Self { principal }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn email(&self) -> &str {
        &self.principal.email
    }

    /// Display name, falling back to the email when the provider had none
    pub fn actor_name(&self) -> &str {
        if self.principal.display_name.trim().is_empty() {
            &self.principal.email
        } else {
            &self.principal.display_name
        }
    }
}

pub struct AdminService<A: AdminRepository> {
    repository: Arc<A>,
}

impl<A: AdminRepository> Clone for AdminService<A> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
        }
    }
}

impl<A: AdminRepository> AdminService<A> {
    pub fn new(repository: A) -> Self {
        Self {
            repository: Arc::new(repository),
        }
    }

    /// Admin lookup; storage failures count as "not an admin".
    #[instrument(skip(self))]
    pub async fn is_admin(&self, email: &str) -> bool {
        match self.repository.get(&normalize_email(email)).await {
            Ok(record) => record.is_some(),
            Err(e) => {
                tracing::warn!(email = %email, error = %e, "Admin lookup failed, treating as non-admin");
                false
            }
        }
    }

    #[instrument(skip(self, principal), fields(email = %principal.email))]
    pub async fn authorize(&self, principal: &Principal) -> LifecycleResult<AdminContext> {
        if self.is_admin(&principal.email).await {
            Ok(AdminContext::new(principal.clone()))
        } else {
            Err(LifecycleError::Forbidden(format!(
                "{} is not an admin",
                principal.email
            )))
        }
    }

    #[instrument(skip(self, actor), fields(actor = %actor.email()))]
    pub async fn grant(&self, actor: &AdminContext, email: &str) -> LifecycleResult<AdminPrincipal> {
        self.grant_as(actor.actor_name(), email).await
    }

    async fn grant_as(&self, granted_by: &str, email: &str) -> LifecycleResult<AdminPrincipal> {
        let email = normalize_email(email);
        if !email.validate_email() {
            return Err(LifecycleError::Validation(format!("invalid email: {email}")));
        }

        if self.repository.get(&email).await?.is_some() {
            return Err(LifecycleError::AlreadyAdmin(email));
        }

        self.repository
            .upsert(AdminPrincipal {
                email,
                granted_at: Utc::now().trunc_subsecs(3),
                granted_by: granted_by.to_string(),
            })
            .await
    }

    #[instrument(skip(self, actor), fields(actor = %actor.email()))]
    pub async fn revoke(&self, actor: &AdminContext, email: &str) -> LifecycleResult<()> {
        let email = normalize_email(email);
        if email == actor.email() {
            return Err(LifecycleError::SelfRevocation);
        }

        if !self.repository.delete(&email).await? {
            return Err(LifecycleError::AdminNotFound(email));
        }

        tracing::info!(email = %email, "Admin revoked");
        Ok(())
    }

    /// Admin records, most recently granted first.
    #[instrument(skip(self))]
    pub async fn list(&self) -> LifecycleResult<Vec<AdminPrincipal>> {
        let mut admins = self.repository.list().await?;
        admins.sort_by(|a, b| b.granted_at.cmp(&a.granted_at));
        Ok(admins)
    }

    /// Grant every listed email that is not an admin yet.
    ///
    /// Returns how many records were created.
    #[instrument(skip(self, emails))]
    pub async fn bootstrap(&self, emails: &[String]) -> LifecycleResult<usize> {
        let mut granted = 0;
        for email in emails {
            match self.grant_as(SYSTEM_GRANTOR, email).await {
                Ok(_) => granted += 1,
                Err(LifecycleError::AlreadyAdmin(_)) => {}
                Err(e) => return Err(e),
            }
        }
        if granted > 0 {
            tracing::info!(granted, "Bootstrapped admin accounts");
        }
        Ok(granted)
    }
}
