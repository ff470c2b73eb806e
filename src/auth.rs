//! Login/register form state and credential submission.

use crate::envelope;
use crate::error::ApiError;
use crate::http::ApiClient;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::{Duration, Instant};

pub const DEFAULT_NOTICE_TTL_MS: u64 = 3_000;

/// Characters that count toward the "special character" criterion.
pub const SPECIAL_CHARS: &str = "!@#$%^&*(),.?\":{}|<>";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    #[default]
    Login,
    Register,
}

impl AuthMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "Login",
            Self::Register => "Register",
        }
    }
}

/// What happens after a successful registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RegisterPolicy {
    /// Log in immediately with the same credentials
    #[default]
    AutoLogin,
    /// Switch back to the login form and tell the user to log in
    ManualLogin,
}

impl RegisterPolicy {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "autologin" | "auto-login" | "auto_login" | "auto" => Some(Self::AutoLogin),
            "manuallogin" | "manual-login" | "manual_login" | "manual" => Some(Self::ManualLogin),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AutoLogin => "autoLogin",
            Self::ManualLogin => "manualLogin",
        }
    }
}

/// Transient form contents. Never persisted or logged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl Credentials {
    fn clear_passwords(&mut self) {
        self.password.clear();
        self.confirm_password.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrengthLabel {
    Weak,
    Medium,
    Strong,
}

impl StrengthLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Weak => "Weak",
            Self::Medium => "Medium",
            Self::Strong => "Strong",
        }
    }
}

/// Advisory password score, 0 through 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordStrength {
    pub score: u8,
}

impl PasswordStrength {
    pub const MAX_SCORE: u8 = 4;

    pub fn of(password: &str) -> Self {
        let criteria = [
            password.chars().count() >= 6,
            password.chars().any(|c| c.is_ascii_uppercase()),
            password.chars().any(|c| c.is_ascii_digit()),
            password.chars().any(|c| SPECIAL_CHARS.contains(c)),
        ];
        Self {
            score: criteria.iter().filter(|met| **met).count() as u8,
        }
    }

    pub fn label(&self) -> StrengthLabel {
        match self.score {
            0 | 1 => StrengthLabel::Weak,
            2 | 3 => StrengthLabel::Medium,
            _ => StrengthLabel::Strong,
        }
    }

    /// Proportional indicator, e.g. `[###############.....] Medium`.
    pub fn bar(&self, width: usize) -> String {
        let filled = width * self.score as usize / Self::MAX_SCORE as usize;
        format!(
            "[{}{}] {}",
            "#".repeat(filled),
            ".".repeat(width - filled),
            self.label().as_str()
        )
    }
}

#[derive(Debug, Clone)]
struct Notice {
    text: String,
    shown_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    /// Token stored; the dashboard is now reachable
    Authenticated,
    /// Registered under the manual-login policy; back on the login form
    Registered,
    /// Nothing stored; `error()` says why
    Failed,
}

pub struct AuthFlow {
    mode: AuthMode,
    form: Credentials,
    error: Option<String>,
    notice: Option<Notice>,
    policy: RegisterPolicy,
    notice_ttl: Duration,
}

impl AuthFlow {
    pub fn new(policy: RegisterPolicy, notice_ttl: Duration) -> Self {
        Self {
            mode: AuthMode::default(),
            form: Credentials::default(),
            error: None,
            notice: None,
            policy,
            notice_ttl,
        }
    }

    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn policy(&self) -> RegisterPolicy {
        self.policy
    }

    /// Success notice, while it has not yet auto-dismissed.
    pub fn notice(&self) -> Option<&str> {
        self.notice_at(Instant::now())
    }

    pub fn notice_at(&self, now: Instant) -> Option<&str> {
        self.notice
            .as_ref()
            .filter(|n| now.saturating_duration_since(n.shown_at) < self.notice_ttl)
            .map(|n| n.text.as_str())
    }

    /// Switch between Login and Register, clearing messages and the form.
    pub fn toggle_mode(&mut self) {
        self.mode = match self.mode {
            AuthMode::Login => AuthMode::Register,
            AuthMode::Register => AuthMode::Login,
        };
        self.reset();
    }

    /// Back to an empty form with no messages, mode unchanged.
    pub fn reset(&mut self) {
        self.form = Credentials::default();
        self.error = None;
        self.notice = None;
    }

    /// Strength of `password`; only rated while registering.
    pub fn strength(&self, password: &str) -> Option<PasswordStrength> {
        match self.mode {
            AuthMode::Register => Some(PasswordStrength::of(password)),
            AuthMode::Login => None,
        }
    }

    pub fn submit_login(&mut self, api: &ApiClient, email: &str, password: &str) -> AuthOutcome {
        self.form.email = email.to_string();
        self.form.password = password.to_string();
        self.begin();

        if email.trim().is_empty() || password.is_empty() {
            self.fail("Email and password are required")
        } else {
            self.login_with_form(api, "login", "Token not received")
        }
    }

    pub fn submit_register(
        &mut self,
        api: &ApiClient,
        name: &str,
        email: &str,
        password: &str,
        confirm_password: &str,
    ) -> AuthOutcome {
        self.form = Credentials {
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            confirm_password: confirm_password.to_string(),
        };
        self.begin();

        if [name, email, password, confirm_password]
            .iter()
            .any(|f| f.trim().is_empty())
        {
            self.fail("All fields are required")
        } else {
            self.register_with_form(api)
        }
    }

    fn begin(&mut self) {
        self.error = None;
        self.notice = None;
    }

    fn fail(&mut self, message: &str) -> AuthOutcome {
        self.error = Some(message.to_string());
        AuthOutcome::Failed
    }

    fn register_with_form(&mut self, api: &ApiClient) -> AuthOutcome {
        let body = json!({
            "name": self.form.name,
            "email": self.form.email,
            "password": self.form.password,
            "confirmPassword": self.form.confirm_password,
        });

        if let Err(e) = api.post("/auth/register", body) {
            // Fields stay as typed after a failed registration
            let message = e.user_message("Registration failed");
            let _ = api.log().auth("register", &self.form.email, Some(&message));
            return self.fail(&message);
        }
        let _ = api.log().auth("register", &self.form.email, None);

        match self.policy {
            RegisterPolicy::AutoLogin => self.login_with_form(api, "auto_login", "Auto-login failed"),
            RegisterPolicy::ManualLogin => {
                self.form = Credentials::default();
                self.mode = AuthMode::Login;
                self.notice = Some(Notice {
                    text: "Registration successful! Please log in.".to_string(),
                    shown_at: Instant::now(),
                });
                AuthOutcome::Registered
            }
        }
    }

    fn login_with_form(&mut self, api: &ApiClient, action: &str, no_token: &str) -> AuthOutcome {
        let email = self.form.email.clone();
        let result = request_token(api, &email, &self.form.password);

        match result {
            Ok(Some(token)) => match api.session().store(&token) {
                Ok(()) => {
                    let _ = api.log().auth(action, &email, None);
                    AuthOutcome::Authenticated
                }
                Err(e) => self.fail(&format!("Could not save session: {}", e)),
            },
            Ok(None) => {
                let _ = api.log().auth(action, &email, Some(no_token));
                self.fail(no_token)
            }
            Err(e) => {
                let message = e.user_message("Login failed");
                let _ = api.log().auth(action, &email, Some(&message));
                self.form.clear_passwords();
                self.fail(&message)
            }
        }
    }
}

/// POST credentials to the login endpoint and pull out the token, if any.
fn request_token(api: &ApiClient, email: &str, password: &str) -> Result<Option<String>, ApiError> {
    let body = api.post(
        "/auth/login",
        json!({ "email": email, "password": password }),
    )?;
    Ok(envelope::extract_token(&body))
}
