//! Top-level view state: which screen is mounted and how session events
//! move between them.

use crate::auth::{AuthFlow, AuthOutcome};
use crate::http::ApiClient;
use crate::manager::{DeleteOutcome, MessManager, SubmitOutcome};
use crate::session::SessionEvent;
use anyhow::{anyhow, Result};
use std::sync::mpsc::Receiver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Login,
    Dashboard,
}

impl View {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Dashboard => "dashboard",
        }
    }
}

/// Session gate: where a request for `requested` actually lands.
pub fn route(requested: View, authenticated: bool) -> View {
    match (requested, authenticated) {
        (View::Dashboard, false) => View::Login,
        (View::Login, true) => View::Dashboard,
        (view, _) => view,
    }
}

pub struct App {
    api: ApiClient,
    events: Receiver<SessionEvent>,
    view: View,
    auth: AuthFlow,
    manager: MessManager,
    banner: Option<String>,
}

impl App {
    pub fn new(api: ApiClient, auth: AuthFlow) -> Self {
        let events = api.session().subscribe();
        Self {
            api,
            events,
            view: View::Login,
            auth,
            manager: MessManager::new(),
            banner: None,
        }
    }

    /// Mount the first view: the dashboard if a token is already stored.
    pub fn start(&mut self) -> View {
        self.navigate(View::Dashboard);
        // The mount load may have been rejected
        self.sync();
        self.view
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn auth(&self) -> &AuthFlow {
        &self.auth
    }

    pub fn manager(&self) -> &MessManager {
        &self.manager
    }

    /// One-shot message set by a forced view change, taken by the renderer.
    pub fn take_banner(&mut self) -> Option<String> {
        self.banner.take()
    }

    /// Request a view; the gate may redirect. Mounting the dashboard loads
    /// the list once.
    pub fn navigate(&mut self, requested: View) -> View {
        let target = route(requested, self.api.session().is_authenticated());
        match target {
            View::Dashboard if self.view != View::Dashboard => {
                self.view = View::Dashboard;
                let _ = self.manager.load(&self.api);
            }
            View::Login if self.view != View::Login => {
                self.view = View::Login;
                self.manager = MessManager::new();
            }
            _ => {}
        }
        target
    }

    /// Drain session events and re-check the gate.
    pub fn sync(&mut self) {
        let events: Vec<SessionEvent> = self.events.try_iter().collect();
        for event in events {
            match event {
                SessionEvent::Expired if self.view == View::Dashboard => {
                    self.banner = Some("Session expired. Please log in again.".to_string());
                    self.navigate(View::Login);
                }
                SessionEvent::LoggedOut => {
                    self.navigate(View::Login);
                }
                _ => {}
            }
        }

        // Token removed by someone else (another process sharing the file)
        if self.view == View::Dashboard && !self.api.session().is_authenticated() {
            self.navigate(View::Login);
        }
    }

    fn require(&self, view: View) -> Result<()> {
        if self.view == view {
            return Ok(());
        }
        match view {
            View::Dashboard => Err(anyhow!("Not logged in. Use 'login' or 'register' first.")),
            View::Login => Err(anyhow!("Already logged in. Use 'logout' first.")),
        }
    }

    pub fn toggle_auth_mode(&mut self) -> Result<()> {
        self.require(View::Login)?;
        self.auth.toggle_mode();
        Ok(())
    }

    pub fn login(&mut self, email: &str, password: &str) -> Result<AuthOutcome> {
        self.require(View::Login)?;
        let outcome = self.auth.submit_login(&self.api, email, password);
        self.after_auth(outcome);
        Ok(outcome)
    }

    pub fn register(
        &mut self,
        name: &str,
        email: &str,
        password: &str,
        confirm_password: &str,
    ) -> Result<AuthOutcome> {
        self.require(View::Login)?;
        let outcome =
            self.auth
                .submit_register(&self.api, name, email, password, confirm_password);
        self.after_auth(outcome);
        Ok(outcome)
    }

    fn after_auth(&mut self, outcome: AuthOutcome) {
        self.sync();
        if outcome == AuthOutcome::Authenticated {
            self.auth.reset();
            self.navigate(View::Dashboard);
        }
    }

    pub fn reload(&mut self) -> Result<()> {
        self.require(View::Dashboard)?;
        let _ = self.manager.load(&self.api);
        self.sync();
        Ok(())
    }

    pub fn set_field(&mut self, name: &str, value: &str) -> Result<()> {
        self.require(View::Dashboard)?;
        self.manager.set_field(name, value)
    }

    pub fn edit(&mut self, id: &str) -> Result<()> {
        self.require(View::Dashboard)?;
        self.manager.begin_edit_by_id(id)
    }

    pub fn cancel_edit(&mut self) -> Result<()> {
        self.require(View::Dashboard)?;
        self.manager.cancel_edit();
        Ok(())
    }

    pub fn submit(&mut self) -> Result<SubmitOutcome> {
        self.require(View::Dashboard)?;
        let outcome = self.manager.submit(&self.api);
        self.sync();
        Ok(outcome)
    }

    pub fn delete<F>(&mut self, id: &str, confirm: F) -> Result<DeleteOutcome>
    where
        F: FnOnce(&str) -> bool,
    {
        self.require(View::Dashboard)?;
        let outcome = self.manager.delete(&self.api, id, confirm);
        self.sync();
        Ok(outcome)
    }

    pub fn logout(&mut self) -> Result<()> {
        self.require(View::Dashboard)?;
        self.manager.logout(self.api.session())?;
        self.sync();
        Ok(())
    }
}
