//! ACME client backed by instant-acme
//!
//! `instant-acme` generates the ECDSA P-256 account key when the account is
//! created; the key lives only as long as the [`InstantAcmeAccount`].

use async_trait::async_trait;
use instant_acme::{
    Account, AccountCredentials, AuthorizationStatus, ChallengeType, Identifier, NewAccount,
    NewOrder, Order,
};
use tracing::{debug, info};

use super::error::AcmeError;
use super::protocol::{
    AcmeAccount, AcmeDirectory, AcmeOrder, NewAccountRequest, OrderSnapshot, OrderStatus,
    PendingChallenge, Registration,
};

/// CA directory reached over HTTPS
#[derive(Debug, Default, Clone, Copy)]
pub struct InstantAcmeDirectory;

#[async_trait]
impl AcmeDirectory for InstantAcmeDirectory {
    async fn register(
        &self,
        request: NewAccountRequest<'_>,
    ) -> Result<Box<dyn AcmeAccount>, AcmeError> {
        info!(
            email = %request.email,
            directory = %request.directory_url,
            "Registering ACME account"
        );

        let contact = format!("mailto:{}", request.email);
        let (account, credentials) = Account::create(
            &NewAccount {
                contact: &[&contact],
                terms_of_service_agreed: true,
                only_return_existing: false,
            },
            request.directory_url,
            None,
        )
        .await
        .map_err(|e| AcmeError::Registration(e.to_string()))?;

        let registration = Registration {
            account_url: account_url(&credentials)?,
        };
        debug!(account_url = %registration.account_url, "ACME account registered");

        Ok(Box::new(InstantAcmeAccount {
            account,
            registration,
        }))
    }
}

/// The account URL is only exposed through the serialized credentials
fn account_url(credentials: &AccountCredentials) -> Result<String, AcmeError> {
    let value = serde_json::to_value(credentials)
        .map_err(|e| AcmeError::Registration(format!("Failed to read credentials: {}", e)))?;
    value
        .get("id")
        .and_then(|id| id.as_str())
        .map(str::to_string)
        .ok_or_else(|| AcmeError::Registration("CA returned no account URL".to_string()))
}

pub struct InstantAcmeAccount {
    account: Account,
    registration: Registration,
}

#[async_trait]
impl AcmeAccount for InstantAcmeAccount {
    fn registration(&self) -> &Registration {
        &self.registration
    }

    async fn new_order(&self, identifiers: &[String]) -> Result<Box<dyn AcmeOrder>, AcmeError> {
        let identifiers: Vec<Identifier> = identifiers
            .iter()
            .map(|d| Identifier::Dns(d.clone()))
            .collect();

        let order = self
            .account
            .new_order(&NewOrder {
                identifiers: &identifiers,
            })
            .await
            .map_err(|e| AcmeError::OrderCreation(e.to_string()))?;

        Ok(Box::new(InstantAcmeOrder { order }))
    }
}

pub struct InstantAcmeOrder {
    order: Order,
}

#[async_trait]
impl AcmeOrder for InstantAcmeOrder {
    async fn dns01_challenges(&mut self) -> Result<Vec<PendingChallenge>, AcmeError> {
        let authorizations = self.order.authorizations().await.map_err(|e| {
            AcmeError::OrderCreation(format!("Failed to get authorizations: {}", e))
        })?;

        let mut challenges = Vec::with_capacity(authorizations.len());
        for authz in &authorizations {
            let Identifier::Dns(domain) = &authz.identifier;
            debug!(domain = %domain, status = ?authz.status, "Processing DNS-01 authorization");

            match authz.status {
                AuthorizationStatus::Valid => {
                    debug!(domain = %domain, "Authorization already valid");
                    continue;
                }
                AuthorizationStatus::Pending => {}
                ref other => {
                    return Err(AcmeError::Authorization {
                        domain: domain.clone(),
                        message: format!("authorization status is {:?}", other),
                    })
                }
            }

            let challenge = authz
                .challenges
                .iter()
                .find(|c| c.r#type == ChallengeType::Dns01)
                .ok_or_else(|| AcmeError::NoDns01Challenge(domain.clone()))?;

            let key_authorization = self.order.key_authorization(challenge);
            challenges.push(PendingChallenge {
                domain: domain.clone(),
                token: challenge.token.clone(),
                key_authorization: key_authorization.as_str().to_string(),
                url: challenge.url.clone(),
            });
        }

        Ok(challenges)
    }

    async fn set_challenge_ready(&mut self, challenge_url: &str) -> Result<(), AcmeError> {
        self.order
            .set_challenge_ready(challenge_url)
            .await
            .map_err(|e| AcmeError::ChallengeValidation {
                domain: challenge_url.to_string(),
                message: e.to_string(),
            })
    }

    async fn refresh(&mut self) -> Result<OrderSnapshot, AcmeError> {
        let state = self.order.refresh().await?;
        let status = match state.status {
            instant_acme::OrderStatus::Pending => OrderStatus::Pending,
            instant_acme::OrderStatus::Ready => OrderStatus::Ready,
            instant_acme::OrderStatus::Processing => OrderStatus::Processing,
            instant_acme::OrderStatus::Valid => OrderStatus::Valid,
            instant_acme::OrderStatus::Invalid => OrderStatus::Invalid,
        };

        Ok(OrderSnapshot {
            status,
            certificate_url: state.certificate.clone(),
            error: state
                .error
                .as_ref()
                .and_then(|problem| problem.detail.clone().or_else(|| problem.r#type.clone())),
        })
    }

    async fn finalize(&mut self, csr_der: &[u8]) -> Result<(), AcmeError> {
        self.order
            .finalize(csr_der)
            .await
            .map_err(|e| AcmeError::Finalization(e.to_string()))
    }

    async fn certificate_chain(&mut self) -> Result<Option<String>, AcmeError> {
        self.order
            .certificate()
            .await
            .map_err(|e| AcmeError::Finalization(format!("Failed to get certificate: {}", e)))
    }
}
