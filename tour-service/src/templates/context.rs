//! Data shared by every page: the title and the signed-in user, if any

use serde::Deserialize;

use crate::store::Document;

/// The signed-in user as the navigation bar shows it
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct NavUser {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub photo: String,
    #[serde(default)]
    pub role: String,
}

impl NavUser {
    pub fn from_document(doc: &Document) -> Self {
        serde_json::from_value(serde_json::Value::Object(doc.clone())).unwrap_or_default()
    }

    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or(&self.name)
    }

    pub fn photo_or_default(&self) -> &str {
        if self.photo.is_empty() {
            "default.jpg"
        } else {
            &self.photo
        }
    }
}

/// Common context for every page template
#[derive(Debug, Clone, Default)]
pub struct PageContext {
    pub title: String,
    pub user: Option<NavUser>,
}

impl PageContext {
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            user: None,
        }
    }

    #[must_use]
    pub fn with_user(mut self, user: Option<&Document>) -> Self {
        self.user = user.map(NavUser::from_document);
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}
