//! Contact-to-account reconciliation.
//!
//! # Responsibility
//! - Resolve a contact from a locator and make sure exactly one account is
//!   keyed to it.
//! - Link pre-existing accounts found by email to their contact.
//!
//! # Invariants
//! - Never deletes or recreates an account.
//! - Never retries; callers own retry policy.
//! - A back-reference is only written while account and contact emails match,
//!   and is never re-validated afterward.
//! - A back-reference held by a live contact with the same email is kept;
//!   contacts sharing an email do not steal the link from each other.
//! - "Creation found an existing account" is `AlreadyLinked`, not an error.

use crate::availability::{Availability, Dependency};
use crate::input::InputError;
use crate::logging::mask_email;
use crate::model::account::{Account, AccountId, CreateAccountOptions};
use crate::model::contact::{Contact, ContactId};
use crate::model::emails_match;
use crate::repo::account_repo::AccountPlatform;
use crate::repo::contact_repo::ContactDirectory;
use crate::repo::RepoError;
use crate::token::TokenError;
use log::{debug, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Key set identifying which contact/account to reconcile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    ContactId(ContactId),
    Email(String),
    /// Account id as carried by an update event; may be absent or stale.
    Pair {
        account_id: Option<AccountId>,
        contact_id: ContactId,
    },
}

impl Locator {
    fn contact_id(&self) -> Option<ContactId> {
        match self {
            Self::ContactId(id) | Self::Pair { contact_id: id, .. } => Some(*id),
            Self::Email(_) => None,
        }
    }

    fn account_id(&self) -> Option<AccountId> {
        match self {
            Self::Pair { account_id, .. } => *account_id,
            _ => None,
        }
    }
}

impl Display for Locator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ContactId(id) => write!(f, "contact_id={id}"),
            Self::Email(email) => write!(f, "email={}", mask_email(email)),
            Self::Pair {
                account_id: Some(account_id),
                contact_id,
            } => write!(f, "account_id={account_id} contact_id={contact_id}"),
            Self::Pair {
                account_id: None,
                contact_id,
            } => write!(f, "account_id=none contact_id={contact_id}"),
        }
    }
}

/// Successful reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// A new account was created for the contact.
    Created(Account),
    /// An account already existed (found, or won a creation race).
    AlreadyLinked(Account),
}

impl ReconcileOutcome {
    pub fn account(&self) -> &Account {
        match self {
            Self::Created(account) | Self::AlreadyLinked(account) => account,
        }
    }

    pub fn account_id(&self) -> AccountId {
        self.account().id
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Created(_) => "created",
            Self::AlreadyLinked(_) => "already_linked",
        }
    }
}

/// Reconciliation and trigger-boundary failures.
#[derive(Debug)]
pub enum ReconcileError {
    InvalidInput(InputError),
    AuthFailed(TokenError),
    ContactNotFound(Locator),
    /// Contact exists but has no email to key an account by.
    InvalidContact(ContactId),
    CreationFailed(String),
    DependencyUnavailable(Dependency),
    /// A collaborator read failed.
    Store(RepoError),
}

impl ReconcileError {
    /// Stable snake_case code for logs and response envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::AuthFailed(_) => "auth_failed",
            Self::ContactNotFound(_) => "contact_not_found",
            Self::InvalidContact(_) => "invalid_contact",
            Self::CreationFailed(_) => "creation_failed",
            Self::DependencyUnavailable(_) => "dependency_unavailable",
            Self::Store(_) => "store_error",
        }
    }
}

impl Display for ReconcileError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInput(err) => write!(f, "invalid input: {err}"),
            Self::AuthFailed(err) => write!(f, "request rejected: {err}"),
            Self::ContactNotFound(locator) => write!(f, "contact not found ({locator})"),
            Self::InvalidContact(id) => write!(f, "contact {id} has no email address"),
            Self::CreationFailed(reason) => write!(f, "account creation failed: {reason}"),
            Self::DependencyUnavailable(dependency) => {
                write!(f, "{} is not active", dependency.description())
            }
            Self::Store(err) => write!(f, "store access failed: {err}"),
        }
    }
}

impl Error for ReconcileError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidInput(err) => Some(err),
            Self::AuthFailed(err) => Some(err),
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ReconcileError {
    fn from(value: RepoError) -> Self {
        Self::Store(value)
    }
}

impl From<InputError> for ReconcileError {
    fn from(value: InputError) -> Self {
        Self::InvalidInput(value)
    }
}

impl From<TokenError> for ReconcileError {
    fn from(value: TokenError) -> Self {
        Self::AuthFailed(value)
    }
}

pub type ReconcileResult = Result<ReconcileOutcome, ReconcileError>;

/// Idempotent contact -> account upsert over injected collaborators.
pub struct Reconciler<C: ContactDirectory, P: AccountPlatform> {
    contacts: C,
    platform: P,
    availability: Availability,
}

impl<C: ContactDirectory, P: AccountPlatform> Reconciler<C, P> {
    pub fn new(contacts: C, platform: P, availability: Availability) -> Self {
        Self {
            contacts,
            platform,
            availability,
        }
    }

    pub fn contacts(&self) -> &C {
        &self.contacts
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Fails with `DependencyUnavailable` when an integration is inactive.
    pub fn ensure_available(&self) -> Result<(), ReconcileError> {
        match self.availability.first_missing() {
            Some(dependency) => {
                warn!(
                    "event=reconcile module=reconciler status=error error_code=dependency_unavailable dependency={}",
                    dependency
                );
                Err(ReconcileError::DependencyUnavailable(dependency))
            }
            None => Ok(()),
        }
    }

    /// Ensures exactly one account exists for the contact `locator` resolves to.
    pub fn reconcile(&self, locator: &Locator) -> ReconcileResult {
        self.ensure_available()?;

        let contact = self.resolve_contact(locator)?;
        if !contact.has_email() {
            warn!(
                "event=reconcile module=reconciler status=error error_code=invalid_contact contact_id={}",
                contact.id
            );
            return Err(ReconcileError::InvalidContact(contact.id));
        }

        if let Some(account) = self.resolve_account(locator, &contact)? {
            let account = self.link_best_effort(account, &contact);
            info!(
                "event=reconcile module=reconciler status=ok outcome=already_linked account_id={} contact_id={}",
                account.id, contact.id
            );
            return Ok(ReconcileOutcome::AlreadyLinked(account));
        }

        let created = self
            .platform
            .create_account(contact.id, &CreateAccountOptions::for_reconcile())
            .map_err(|err| {
                warn!(
                    "event=reconcile module=reconciler status=error error_code=creation_failed contact_id={} error={}",
                    contact.id, err
                );
                ReconcileError::CreationFailed(err.to_string())
            })?;

        if created.newly_created {
            info!(
                "event=reconcile module=reconciler status=ok outcome=created account_id={} contact_id={}",
                created.account.id, contact.id
            );
            Ok(ReconcileOutcome::Created(created.account))
        } else {
            // Lost a creation race; the winner's account is the answer.
            let account = self.link_best_effort(created.account, &contact);
            info!(
                "event=reconcile module=reconciler status=ok outcome=already_linked reason=race account_id={} contact_id={}",
                account.id, contact.id
            );
            Ok(ReconcileOutcome::AlreadyLinked(account))
        }
    }

    /// Returns the first contact with `email`, if any.
    pub fn find_contact_by_email(&self, email: &str) -> Result<Option<Contact>, RepoError> {
        let mut contacts = self.contacts.get_contacts_by_email(email)?;
        if contacts.len() > 1 {
            debug!(
                "event=contact_lookup module=reconciler status=ok matches={} email={} policy=first",
                contacts.len(),
                mask_email(email)
            );
        }
        Ok(if contacts.is_empty() {
            None
        } else {
            Some(contacts.swap_remove(0))
        })
    }

    fn resolve_contact(&self, locator: &Locator) -> Result<Contact, ReconcileError> {
        let contact = match locator {
            Locator::Email(email) => self.find_contact_by_email(email)?,
            _ => match locator.contact_id() {
                Some(id) => self.contacts.get_contact_by_id(id)?,
                None => None,
            },
        };
        contact.ok_or_else(|| {
            info!(
                "event=reconcile module=reconciler status=error error_code=contact_not_found {}",
                locator
            );
            ReconcileError::ContactNotFound(locator.clone())
        })
    }

    fn resolve_account(
        &self,
        locator: &Locator,
        contact: &Contact,
    ) -> Result<Option<Account>, ReconcileError> {
        if let Some(account_id) = locator.account_id() {
            if let Some(account) = self.platform.get_account_by_id(account_id)? {
                return Ok(Some(account));
            }
            debug!(
                "event=account_lookup module=reconciler status=skip reason=unknown_account_id account_id={} contact_id={}",
                account_id, contact.id
            );
        }
        Ok(self.platform.get_account_by_email(&contact.email)?)
    }

    /// Points `account` at `contact` when unset or stale; failures only log.
    ///
    /// A back-reference is stale when the linked contact is gone or no longer
    /// carries the account's email. If the contact already owns another
    /// account, that account is returned instead.
    fn link_best_effort(&self, mut account: Account, contact: &Contact) -> Account {
        if account.is_linked_to(contact.id) {
            return account;
        }
        if !emails_match(&account.email, &contact.email) {
            debug!(
                "event=account_link module=reconciler status=skip reason=email_mismatch account_id={} contact_id={}",
                account.id, contact.id
            );
            return account;
        }
        if let Some(previous) = account.linked_contact_id {
            match self.contacts.get_contact_by_id(previous) {
                Ok(Some(owner)) if emails_match(&account.email, &owner.email) => {
                    debug!(
                        "event=account_link module=reconciler status=skip reason=linked_to_live_contact account_id={} contact_id={} previous={}",
                        account.id, contact.id, previous
                    );
                    return account;
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(
                        "event=account_link module=reconciler status=error reason=owner_lookup account_id={} contact_id={} previous={} error={}",
                        account.id, contact.id, previous, err
                    );
                    return account;
                }
            }
        }

        match self
            .platform
            .set_account_contact_link(account.id, contact.id)
        {
            Ok(()) => {
                info!(
                    "event=account_link module=reconciler status=ok account_id={} contact_id={} previous={}",
                    account.id,
                    contact.id,
                    account
                        .linked_contact_id
                        .map_or_else(|| "none".to_string(), |id| id.to_string())
                );
                account.linked_contact_id = Some(contact.id);
                account
            }
            Err(RepoError::Conflict(reason)) => {
                match self.platform.get_account_by_linked_contact(contact.id) {
                    Ok(Some(owned)) => {
                        info!(
                            "event=account_link module=reconciler status=skip reason=contact_owns_account account_id={} contact_id={} email_account_id={}",
                            owned.id, contact.id, account.id
                        );
                        owned
                    }
                    Ok(None) => {
                        warn!(
                            "event=account_link module=reconciler status=error account_id={} contact_id={} error={}",
                            account.id, contact.id, reason
                        );
                        account
                    }
                    Err(err) => {
                        warn!(
                            "event=account_link module=reconciler status=error account_id={} contact_id={} error={}",
                            account.id, contact.id, err
                        );
                        account
                    }
                }
            }
            Err(err) => {
                warn!(
                    "event=account_link module=reconciler status=error account_id={} contact_id={} error={}",
                    account.id, contact.id, err
                );
                account
            }
        }
    }
}
