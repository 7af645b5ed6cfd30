//! Sign-in, self-registration and account activation.

use chrono::{Duration, Utc};
use tracing::{info, warn};

use crate::config::RollcallConfig;
use crate::db::repository::{AuditRepository, UserRepository};
use crate::error::{Result, RollcallError};
use crate::identity::{is_email, is_valid_username, normalize_email};
use crate::mail::{MailMessage, Mailer};
use crate::models::common::RoleType;
use crate::models::user::{NewUser, User};
use crate::passwords::{hash_password, validate_password, verify_password};

/// Result of a sign-in attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum LoginOutcome {
    Success(User),
    Invalid,
    /// Too many failed attempts; the account is disabled until reactivated.
    LockedOut,
}

/// Fields of the curator sign-up form.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct SignupForm {
    pub username: String,
    pub email: String,
    pub password1: String,
    pub password2: String,
}

pub struct Authenticator<'a, R: ?Sized> {
    repo: &'a R,
    mailer: &'a dyn Mailer,
    config: &'a RollcallConfig,
}

impl<'a, R> Authenticator<'a, R>
where
    R: UserRepository + AuditRepository + ?Sized,
{
    pub fn new(repo: &'a R, mailer: &'a dyn Mailer, config: &'a RollcallConfig) -> Self {
        Self {
            repo,
            mailer,
            config,
        }
    }

    /// Check a login (username, email or student code) and password.
    ///
    /// A login equal to its password is a student code and skips the attempt
    /// counter. Staff logins count failures and lock the account once
    /// `auth.max_attempts` is reached, mailing a reactivation link.
    pub async fn authenticate(
        &self,
        login: &str,
        password: &str,
        ip: Option<&str>,
    ) -> Result<LoginOutcome> {
        let login = login.trim();
        if login.is_empty() || password.is_empty() {
            return Ok(LoginOutcome::Invalid);
        }

        if login == password {
            return self.authenticate_student(login, password, ip).await;
        }

        let user = if is_email(login) {
            self.repo.get_user_by_email(&normalize_email(login)).await?
        } else {
            self.repo.get_user_by_username(login).await?
        };
        let Some(user) = user else {
            self.audit("login_failed", Some(login), Some("unknown user"), ip)
                .await;
            return Ok(LoginOutcome::Invalid);
        };

        if !user.is_active && user.profile.locked_at.is_some() {
            self.audit("login_failed", Some(&user.username), Some("account locked"), ip)
                .await;
            return Ok(LoginOutcome::LockedOut);
        }

        if user.is_active && self.password_matches(user.id, password).await? {
            if user.profile.attempts_count > 0 {
                self.repo.reset_login_attempts(user.id).await?;
            }
            self.audit("login", Some(&user.username), None, ip).await;
            return Ok(LoginOutcome::Success(user));
        }

        let attempts = self.repo.record_failed_login(user.id).await?;
        if attempts >= self.config.auth.max_attempts {
            self.repo.lock_user(user.id, Utc::now()).await?;
            warn!(username = %user.username, attempts, "account locked after failed logins");
            self.audit(
                "account_locked",
                Some(&user.username),
                Some(&format!("{attempts} failed attempts")),
                ip,
            )
            .await;
            if let Some(email) = &user.email {
                let message = MailMessage {
                    from: self.config.mail.from_address.clone(),
                    to: email.clone(),
                    subject: "Account activation".into(),
                    body: format!(
                        "The login attempt limit for your account was reached and it has been disabled.\n\
                         To activate it again, open {}\n",
                        self.activation_link(&user.username)
                    ),
                };
                if let Err(e) = self.mailer.send(&message).await {
                    warn!(username = %user.username, error = %e, "could not send reactivation mail");
                }
            }
            return Ok(LoginOutcome::LockedOut);
        }

        self.audit(
            "login_failed",
            Some(&user.username),
            Some(&format!("attempt {attempts}")),
            ip,
        )
        .await;
        Ok(LoginOutcome::Invalid)
    }

    async fn authenticate_student(
        &self,
        code: &str,
        password: &str,
        ip: Option<&str>,
    ) -> Result<LoginOutcome> {
        let Some(user) = self.repo.get_user_by_username(code).await? else {
            self.audit("login_failed", Some(code), Some("unknown code"), ip)
                .await;
            return Ok(LoginOutcome::Invalid);
        };
        if user.is_active && self.password_matches(user.id, password).await? {
            self.audit("login", Some(&user.username), Some("student code"), ip)
                .await;
            Ok(LoginOutcome::Success(user))
        } else {
            self.audit("login_failed", Some(code), Some("student code"), ip)
                .await;
            Ok(LoginOutcome::Invalid)
        }
    }

    async fn password_matches(&self, user_id: i64, password: &str) -> Result<bool> {
        Ok(self
            .repo
            .get_password_hash(user_id)
            .await?
            .is_some_and(|hash| verify_password(password, &hash)))
    }

    /// Register a curator account.
    pub async fn signup(&self, form: &SignupForm, ip: Option<&str>) -> Result<User> {
        let username = form.username.trim();
        if !is_valid_username(username) {
            return Err(RollcallError::Validation(
                "enter a valid username: letters, digits and @ . + - _ only".into(),
            ));
        }
        if self.repo.get_user_by_username(username).await?.is_some() {
            return Err(RollcallError::Validation(
                "a user with that username already exists".into(),
            ));
        }

        if form.email.trim().is_empty() {
            return Err(RollcallError::Validation("email is required".into()));
        }
        if !is_email(&form.email) {
            return Err(RollcallError::Validation(
                "enter a valid email address".into(),
            ));
        }
        let email = normalize_email(&form.email);
        if self.repo.get_user_by_email(&email).await?.is_some() {
            return Err(RollcallError::Validation(
                "a user with this email already exists".into(),
            ));
        }

        if form.password1 != form.password2 {
            return Err(RollcallError::Validation(
                "the two password fields didn't match".into(),
            ));
        }
        if username == form.password1 {
            return Err(RollcallError::Validation(
                "login and password must differ".into(),
            ));
        }
        validate_password(&form.password1, username)?;

        let is_active = self.config.rollcall.default_user_is_active;
        let user = self
            .repo
            .create_user(&NewUser {
                username: username.to_string(),
                email: Some(email.clone()),
                password_hash: hash_password(&form.password1)?,
                first_name: String::new(),
                last_name: String::new(),
                middle_name: "-".into(),
                role: RoleType::Curator,
                is_active,
            })
            .await?;

        info!(username = %user.username, is_active, "curator signed up");
        self.audit("signup", Some(&user.username), None, ip).await;

        if !is_active {
            let message = MailMessage {
                from: self.config.mail.from_address.clone(),
                to: email,
                subject: "Confirm your email".into(),
                body: format!(
                    "Welcome to {}!\nTo activate your account, open {}\n",
                    self.config.rollcall.instance_name,
                    self.activation_link(&user.username)
                ),
            };
            if let Err(e) = self.mailer.send(&message).await {
                warn!(username = %user.username, error = %e, "could not send confirmation mail");
            }
        }

        Ok(user)
    }

    /// Follow an activation link.
    ///
    /// A locked account can be reactivated within `lockout_reactivation_days`
    /// of the lockout; a fresh sign-up within `signup_activation_hours` of
    /// registering. Anything else is reported as not found.
    pub async fn activate(&self, username: &str, ip: Option<&str>) -> Result<User> {
        let user = self
            .repo
            .get_user_by_username(username)
            .await?
            .ok_or_else(|| RollcallError::NotFound(format!("user {username}")))?;

        let now = Utc::now();
        let eligible = match user.profile.locked_at {
            Some(locked_at) => {
                now - locked_at <= Duration::days(self.config.auth.lockout_reactivation_days)
            }
            None => {
                now - user.date_joined <= Duration::hours(self.config.auth.signup_activation_hours)
            }
        };
        if !eligible {
            return Err(RollcallError::NotFound("activation link expired".into()));
        }

        self.repo.activate_user(user.id).await?;
        info!(username = %user.username, "account activated");
        self.audit("account_activated", Some(&user.username), None, ip)
            .await;

        self.repo
            .get_user(user.id)
            .await?
            .ok_or_else(|| RollcallError::NotFound(format!("user {username}")))
    }

    pub fn activation_link(&self, username: &str) -> String {
        let base = self
            .config
            .rollcall
            .public_url
            .as_deref()
            .unwrap_or("")
            .trim_end_matches('/');
        format!("{base}/users/activate/{username}")
    }

    async fn audit(&self, action: &str, username: Option<&str>, details: Option<&str>, ip: Option<&str>) {
        if let Err(e) = self.repo.log_action(action, username, details, ip).await {
            warn!(action, error = %e, "failed to write audit log");
        }
    }
}
