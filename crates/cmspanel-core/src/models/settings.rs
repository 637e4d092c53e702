use serde::{Deserialize, Serialize};

/// Site-wide toggles controlling what visitors of the public site see.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct WebsiteSettings {
    #[serde(default)]
    pub maintenance_mode: bool,
    #[serde(default)]
    pub coming_soon_mode: bool,
}

impl WebsiteSettings {
    /// Whether visitors currently see something other than the live site
    pub fn is_public_site_hidden(&self) -> bool {
        self.maintenance_mode || self.coming_soon_mode
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maintenance_mode: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coming_soon_mode: Option<bool>,
}

impl SettingsPatch {
    pub fn is_empty(&self) -> bool {
        self.maintenance_mode.is_none() && self.coming_soon_mode.is_none()
    }
}
