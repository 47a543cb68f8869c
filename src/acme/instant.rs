// ACME client built on instant-acme
// Fresh account key per run, HTTP-01 only

use super::{AcmeClient, IssuedCertificate};
use crate::challenge::ChallengeResponder;
use crate::error::{AcmeError, AcmeStage};
use async_trait::async_trait;
use instant_acme::{
    Account, AuthorizationStatus, ChallengeType, Identifier, NewAccount, NewOrder, OrderStatus,
    RetryPolicy,
};
use tracing::{debug, info, warn};

pub struct InstantAcmeClient {
    directory_url: String,
    contact_email: Option<String>,
}

impl InstantAcmeClient {
    pub fn new(directory_url: impl Into<String>, contact_email: Option<String>) -> Self {
        Self {
            directory_url: directory_url.into(),
            contact_email,
        }
    }

    /// Register a throwaway account; the key pair is generated by the builder
    async fn register(&self) -> Result<Account, AcmeError> {
        let contact = self.contact_email.as_ref().map(|email| format!("mailto:{}", email));
        let contact: Vec<&str> = contact.iter().map(String::as_str).collect();

        let builder = Account::builder()
            .map_err(|e| AcmeError::new(AcmeStage::Registration, e.to_string()))?;
        let (account, _credentials) = builder
            .create(
                &NewAccount {
                    contact: &contact,
                    terms_of_service_agreed: true,
                    only_return_existing: false,
                },
                self.directory_url.clone(),
                None,
            )
            .await
            .map_err(|e| AcmeError::new(AcmeStage::Registration, e.to_string()))?;

        debug!(directory = %self.directory_url, "ACME account registered");
        Ok(account)
    }
}

#[async_trait]
impl AcmeClient for InstantAcmeClient {
    async fn obtain_certificate(
        &self,
        domains: &[String],
        responder: &dyn ChallengeResponder,
    ) -> Result<IssuedCertificate, AcmeError> {
        let account = self.register().await?;

        let identifiers: Vec<Identifier> = domains.iter().map(|d| Identifier::Dns(d.clone())).collect();
        let mut order = account
            .new_order(&NewOrder::new(identifiers.as_slice()))
            .await
            .map_err(|e| AcmeError::new(AcmeStage::Order, e.to_string()))?;

        let mut presented: Vec<(String, String)> = Vec::new();
        let challenge_result = async {
            let mut authorizations = order.authorizations();
            while let Some(result) = authorizations.next().await {
                let mut authz = result.map_err(|e| AcmeError::new(AcmeStage::Challenge, e.to_string()))?;
                match &authz.status {
                    AuthorizationStatus::Pending => {}
                    AuthorizationStatus::Valid => continue,
                    status => {
                        return Err(AcmeError::new(
                            AcmeStage::Challenge,
                            format!("unexpected authorization status {:?}", status),
                        ));
                    }
                }

                let mut challenge = authz.challenge(ChallengeType::Http01).ok_or_else(|| {
                    AcmeError::new(AcmeStage::Challenge, "no HTTP-01 challenge offered")
                })?;
                let domain = challenge.identifier().to_string();
                let token = challenge.token.clone();
                let key_authorization = challenge.key_authorization().as_str().to_string();

                // Recorded first so a partial fan-out still gets cleaned up
                presented.push((domain.clone(), token.clone()));
                responder
                    .present(&domain, &token, &key_authorization)
                    .await
                    .map_err(|e| AcmeError::new(AcmeStage::Challenge, e.to_string()))?;

                challenge
                    .set_ready()
                    .await
                    .map_err(|e| AcmeError::new(AcmeStage::Challenge, e.to_string()))?;
                info!(domain = %domain, "Challenge presented on all hosts");
            }

            let status = order
                .poll_ready(&RetryPolicy::default())
                .await
                .map_err(|e| AcmeError::new(AcmeStage::Challenge, e.to_string()))?;
            if status != OrderStatus::Ready {
                return Err(AcmeError::new(
                    AcmeStage::Challenge,
                    format!("order is {:?} after validation", status),
                ));
            }
            Ok::<(), AcmeError>(())
        }
        .await;

        for (domain, token) in &presented {
            if let Err(e) = responder.clean_up(domain, token).await {
                warn!(domain = %domain, error = %e, "Challenge clean-up failed");
            }
        }
        challenge_result?;

        let key_pem = order
            .finalize()
            .await
            .map_err(|e| AcmeError::new(AcmeStage::Finalize, e.to_string()))?;
        let chain_pem = order
            .poll_certificate(&RetryPolicy::default())
            .await
            .map_err(|e| AcmeError::new(AcmeStage::Finalize, e.to_string()))?;

        Ok(IssuedCertificate { chain_pem, key_pem })
    }
}
