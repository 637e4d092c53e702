//! CRUD endpoints for the content collections, website toggles and
//! notifications. All of them go through the session interception in
//! [`ApiClient`].

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{ApiClient, ApiError};
use crate::models::{Notification, SettingsPatch, WebsiteSettings};

/// Content collections managed through the admin panel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Portfolio,
    Posts,
    Pages,
    Team,
    Menus,
    Media,
    Messages,
    Users,
}

impl Resource {
    pub const ALL: [Resource; 8] = [
        Resource::Portfolio,
        Resource::Posts,
        Resource::Pages,
        Resource::Team,
        Resource::Menus,
        Resource::Media,
        Resource::Messages,
        Resource::Users,
    ];

    pub fn path(&self) -> &'static str {
        match self {
            Resource::Portfolio => "/portfolio",
            Resource::Posts => "/posts",
            Resource::Pages => "/pages",
            Resource::Team => "/team",
            Resource::Menus => "/menus",
            Resource::Media => "/media",
            Resource::Messages => "/messages",
            Resource::Users => "/users",
        }
    }

    pub fn name(&self) -> &'static str {
        self.path().trim_start_matches('/')
    }

    fn item_path(&self, id: &str) -> String {
        format!("{}/{}", self.path(), id)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Resource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "portfolio" | "projects" => Ok(Resource::Portfolio),
            "posts" | "post" | "blog" => Ok(Resource::Posts),
            "pages" | "page" => Ok(Resource::Pages),
            "team" | "members" => Ok(Resource::Team),
            "menus" | "menu" => Ok(Resource::Menus),
            "media" | "files" => Ok(Resource::Media),
            "messages" | "message" | "contact" => Ok(Resource::Messages),
            "users" | "user" => Ok(Resource::Users),
            other => Err(format!(
                "Unknown resource '{}' (expected one of: {})",
                other,
                Resource::ALL.map(|r| r.name()).join(", ")
            )),
        }
    }
}

/// Some list endpoints wrap their records in `data`
#[derive(Deserialize)]
#[serde(untagged)]
enum ListEnvelope<T> {
    Wrapped { data: Vec<T> },
    Bare(Vec<T>),
}

impl<T> ListEnvelope<T> {
    fn into_items(self) -> Vec<T> {
        match self {
            ListEnvelope::Wrapped { data } => data,
            ListEnvelope::Bare(items) => items,
        }
    }
}

impl ApiClient {
    // ===== Content collections =====

    pub async fn list<T: DeserializeOwned>(&self, resource: Resource) -> Result<Vec<T>, ApiError> {
        let envelope: ListEnvelope<T> = self.send_json(self.get(resource.path())).await?;
        Ok(envelope.into_items())
    }

    pub async fn fetch<T: DeserializeOwned>(&self, resource: Resource, id: &str) -> Result<T, ApiError> {
        self.send_json(self.get(&resource.item_path(id))).await
    }

    pub async fn create<T, B>(&self, resource: Resource, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send_json(self.post(resource.path()).json(body)).await
    }

    pub async fn update<T, B>(&self, resource: Resource, id: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send_json(self.put(&resource.item_path(id)).json(body)).await
    }

    pub async fn remove(&self, resource: Resource, id: &str) -> Result<(), ApiError> {
        self.send_empty(self.delete(&resource.item_path(id))).await
    }

    // ===== Website settings =====

    pub async fn website_settings(&self) -> Result<WebsiteSettings, ApiError> {
        self.send_json(self.get("/settings/website")).await
    }

    pub async fn update_website_settings(&self, patch: &SettingsPatch) -> Result<WebsiteSettings, ApiError> {
        self.send_json(self.put("/settings/website").json(patch)).await
    }

    // ===== Notifications =====

    pub async fn notifications(&self) -> Result<Vec<Notification>, ApiError> {
        let envelope: ListEnvelope<Notification> = self.send_json(self.get("/notifications")).await?;
        Ok(envelope.into_items())
    }

    pub async fn mark_notification_read(&self, id: i64) -> Result<(), ApiError> {
        self.send_empty(self.put(&format!("/notifications/{}/read", id))).await
    }
}
