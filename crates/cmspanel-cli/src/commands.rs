use std::io::{self, Write};

use anyhow::{anyhow, bail, Context, Result};
use futures::future::join_all;
use serde_json::Value;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, warn};

use cmspanel_core::models::{ProfilePatch, SettingsPatch, UserProfile};
use cmspanel_core::{Config, NotificationPoller, Resource, SessionController, SessionEvent};

use crate::{Command, Toggle};

/// Environment variable with the password for non-interactive logins
const PASSWORD_ENV: &str = "CMSPANEL_PASSWORD";

pub struct Panel {
    config: Config,
    session: SessionController,
    events: broadcast::Receiver<SessionEvent>,
}

impl Panel {
    pub fn new(
        config: Config,
        session: SessionController,
        events: broadcast::Receiver<SessionEvent>,
    ) -> Self {
        Self {
            config,
            session,
            events,
        }
    }

    pub async fn run(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Login { email } => self.login(email).await,
            Command::Logout => {
                self.session.logout().await;
                println!("Logged out.");
                Ok(())
            }
            Command::Whoami => {
                let user = self.require_session().await?;
                print_user(&user);
                Ok(())
            }
            Command::List { resource } => {
                self.require_session().await?;
                let records: Vec<Value> = self.session.api().list(resource).await?;
                print_json(&records)
            }
            Command::Get { resource, id } => {
                self.require_session().await?;
                let record: Value = self.session.api().fetch(resource, &id).await?;
                print_json(&record)
            }
            Command::Create { resource, data } => {
                self.require_editor_of(resource).await?;
                let body = parse_data(&data)?;
                let created: Value = self.session.api().create(resource, &body).await?;
                print_json(&created)
            }
            Command::Update { resource, id, data } => {
                self.require_editor_of(resource).await?;
                let body = parse_data(&data)?;
                let updated: Value = self.session.api().update(resource, &id, &body).await?;
                print_json(&updated)
            }
            Command::Delete { resource, id } => {
                self.require_editor_of(resource).await?;
                self.session.api().remove(resource, &id).await?;
                println!("Deleted {} {}.", resource, id);
                Ok(())
            }
            Command::Settings {
                maintenance,
                coming_soon,
            } => self.settings(maintenance, coming_soon).await,
            Command::Notifications { watch, read } => self.notifications(watch, read).await,
            Command::Profile { name, email } => self.profile(name, email).await,
            Command::Dashboard => self.dashboard().await,
        }
    }

    /// Navigation guard: everything except login and logout needs a
    /// session the server still accepts
    async fn require_session(&self) -> Result<UserProfile> {
        let state = self.session.check_auth().await;
        let snapshot = self.session.snapshot();
        match snapshot.user {
            Some(user) if state.is_authenticated() => Ok(user),
            _ => {
                let reason = snapshot.error.unwrap_or_else(|| "Not logged in.".to_string());
                bail!("{} Run `cmspanel login` first.", reason)
            }
        }
    }

    async fn require_admin(&self) -> Result<UserProfile> {
        let user = self.require_session().await?;
        if !user.role.can_manage_site() {
            bail!("This needs an admin account (signed in as {}).", user.role);
        }
        Ok(user)
    }

    /// Editors manage content; users are admin-only
    async fn require_editor_of(&self, resource: Resource) -> Result<UserProfile> {
        match resource {
            Resource::Users => self.require_admin().await,
            _ => self.require_session().await,
        }
    }

    async fn login(&mut self, email: Option<String>) -> Result<()> {
        let email = match email.or_else(|| self.config.last_email.clone()) {
            Some(email) => email,
            None => prompt("Email: ")?,
        };
        let password = match std::env::var(PASSWORD_ENV) {
            Ok(password) if !password.is_empty() => password,
            _ => rpassword::prompt_password(format!("Password for {}: ", email))?,
        };

        println!("Signing in...");
        if !self.session.login(&email, &password).await {
            let reason = self
                .session
                .snapshot()
                .error
                .unwrap_or_else(|| "Login failed".to_string());
            bail!(reason);
        }

        self.config.last_email = Some(email);
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }

        if let Some(user) = self.session.user() {
            println!("Logged in as {} ({}).", user.display_name(), user.role);
        }
        Ok(())
    }

    async fn settings(&self, maintenance: Option<Toggle>, coming_soon: Option<Toggle>) -> Result<()> {
        let patch = SettingsPatch {
            maintenance_mode: maintenance.map(bool::from),
            coming_soon_mode: coming_soon.map(bool::from),
        };

        let settings = if patch.is_empty() {
            self.require_session().await?;
            self.session.api().website_settings().await?
        } else {
            self.require_admin().await?;
            self.session.api().update_website_settings(&patch).await?
        };

        println!("Maintenance mode: {}", on_off(settings.maintenance_mode));
        println!("Coming soon mode: {}", on_off(settings.coming_soon_mode));
        if settings.is_public_site_hidden() {
            println!("Visitors currently do not see the live site.");
        }
        Ok(())
    }

    async fn notifications(&mut self, watch: bool, read: Option<i64>) -> Result<()> {
        self.require_session().await?;
        let api = self.session.api();

        if let Some(id) = read {
            api.mark_notification_read(id).await?;
            println!("Marked notification {} as read.", id);
            return Ok(());
        }

        if !watch {
            let notifications = api.notifications().await?;
            let unread = notifications.iter().filter(|n| !n.read).count();
            for n in &notifications {
                println!("{} #{} {} {}", if n.read { " " } else { "*" }, n.id, n.created_at.format("%Y-%m-%d %H:%M"), n.title);
            }
            println!("{} unread of {}.", unread, notifications.len());
            return Ok(());
        }

        let poller = NotificationPoller::spawn(api.clone(), self.config.poll_interval());
        let mut feed = poller.subscribe();
        println!("Watching notifications (Ctrl-C to stop)...");

        loop {
            tokio::select! {
                changed = feed.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let current = feed.borrow_and_update().clone();
                    for n in &current.arrivals {
                        println!("New: #{} {}", n.id, n.title);
                    }
                    if let Some(ref error) = current.last_error {
                        debug!(error = %error, "Poll error");
                    }
                    if current.stopped {
                        break;
                    }
                }
                event = self.events.recv() => {
                    match event {
                        Ok(SessionEvent::Expired { message }) => {
                            route_to_login(&message);
                            break;
                        }
                        Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }

        poller.stop();
        Ok(())
    }

    async fn profile(&self, name: Option<String>, email: Option<String>) -> Result<()> {
        let user = self.require_session().await?;
        let patch = ProfilePatch {
            name,
            email,
            role: None,
        };
        if patch.is_empty() {
            print_user(&user);
            return Ok(());
        }

        self.session.api().update_profile(&patch).await?;
        self.session.update_user(&patch);
        if let Some(user) = self.session.user() {
            print_user(&user);
        }
        Ok(())
    }

    async fn dashboard(&self) -> Result<()> {
        let user = self.require_session().await?;
        let api = self.session.api();

        let resources: Vec<Resource> = Resource::ALL
            .into_iter()
            .filter(|r| *r != Resource::Users || user.role.can_manage_site())
            .collect();

        let counts = join_all(resources.iter().map(|resource| async move {
            let records: Result<Vec<Value>, _> = api.list(*resource).await;
            (*resource, records.map(|r| r.len()))
        }))
        .await;

        println!("Signed in as {} ({})", user.display_name(), user.role);
        for (resource, count) in counts {
            match count {
                Ok(count) => println!("  {:<10} {}", resource.name(), count),
                Err(e) => println!("  {:<10} unavailable ({})", resource.name(), e),
            }
        }

        if let Ok(settings) = api.website_settings().await {
            println!(
                "  maintenance {} / coming soon {}",
                on_off(settings.maintenance_mode),
                on_off(settings.coming_soon_mode)
            );
        }
        Ok(())
    }

    /// React to what happened to the session while the command ran. An
    /// expired session sends the user back to login.
    pub fn route_session_events(&mut self) {
        loop {
            match self.events.try_recv() {
                Ok(SessionEvent::Expired { message }) => route_to_login(&message),
                Ok(event) => debug!(?event, "Session event"),
                Err(TryRecvError::Lagged(skipped)) => debug!(skipped, "Missed session events"),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
    }
}

fn route_to_login(message: &str) {
    eprintln!("{}", message);
    eprintln!("Run `cmspanel login` to sign in again.");
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim().to_string();
    if input.is_empty() {
        return Err(anyhow!("No input given"));
    }
    Ok(input)
}

fn parse_data(data: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(data).context("--data must be a JSON object")?;
    if !value.is_object() {
        bail!("--data must be a JSON object");
    }
    Ok(value)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_user(user: &UserProfile) {
    println!("{} <{}>", user.display_name(), user.email);
    println!("Role: {}", user.role);
}

fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_data_requires_object() {
        assert!(parse_data(r#"{"title":"Hello"}"#).is_ok());
        assert!(parse_data("[1,2]").is_err());
        assert!(parse_data("not json").is_err());
    }

    #[test]
    fn test_toggle_into_bool() {
        assert!(bool::from(Toggle::On));
        assert!(!bool::from(Toggle::Off));
        assert_eq!(on_off(true), "on");
    }
}
