use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::Result;
use crate::repository::{str_field, FieldSpec, Resource, SaveContext};
use crate::store::{timestamp, Document, FieldError, Filter, FilterCondition};

/// Account role, checked by route guards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    User,
    Guide,
    LeadGuide,
    Admin,
}

impl Role {
    pub const ALL: &'static [&'static str] = &["user", "guide", "lead-guide", "admin"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Guide => "guide",
            Role::LeadGuide => "lead-guide",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "guide" => Ok(Role::Guide),
            "lead-guide" => Ok(Role::LeadGuide),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// A registered account
pub struct User;

impl User {
    pub const PASSWORD: &'static str = "password";
    pub const PASSWORD_CONFIRM: &'static str = "passwordConfirm";
    pub const PASSWORD_CHANGED_AT: &'static str = "passwordChangedAt";
    pub const RESET_TOKEN: &'static str = "passwordResetToken";
    pub const RESET_EXPIRES: &'static str = "passwordResetExpires";

    /// Role stored on a user document; unknown values fall back to `user`
    pub fn role(doc: &Document) -> Role {
        str_field(doc, "role")
            .and_then(|r| r.parse().ok())
            .unwrap_or(Role::User)
    }
}

impl Resource for User {
    const COLLECTION: &'static str = "users";
    const ENTITY: &'static str = "User";
    const UNIQUE: &'static [&'static [&'static str]] = &[&["email"]];

    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::string("name")
            .required("Please tell us your name!")
            .trim(),
        FieldSpec::string("email")
            .required("Please provide an email")
            .trim()
            .lowercase()
            .email("Please provide a valid email"),
        FieldSpec::string("photo").default(|| json!("default.jpg")),
        FieldSpec::string("role")
            .default(|| json!("user"))
            .one_of(Role::ALL, "Role is either: user, guide, lead-guide or admin"),
        FieldSpec::string(User::PASSWORD)
            .required("Please provide a password")
            .min_length(8, "A password must contain at least 8 characters")
            .hidden(),
        FieldSpec::string(User::PASSWORD_CONFIRM).hidden(),
        FieldSpec::date(User::PASSWORD_CHANGED_AT).hidden(),
        FieldSpec::string(User::RESET_TOKEN).hidden(),
        FieldSpec::date(User::RESET_EXPIRES).hidden(),
        FieldSpec::boolean("active").default(|| json!(true)).hidden(),
    ];

    fn validate(doc: &Document, ctx: &SaveContext<'_>) -> Vec<FieldError> {
        if !ctx.is_modified(User::PASSWORD) {
            return Vec::new();
        }
        match (str_field(doc, User::PASSWORD_CONFIRM), str_field(doc, User::PASSWORD)) {
            (None, _) | (Some(""), _) => vec![FieldError::new(
                User::PASSWORD_CONFIRM,
                "Please confirm your password",
            )],
            (Some(confirm), Some(password)) if confirm != password => vec![FieldError::new(
                User::PASSWORD_CONFIRM,
                "Passwords are not the same!",
            )],
            _ => Vec::new(),
        }
    }

    fn before_save(doc: &mut Document, ctx: &SaveContext<'_>) -> Result<()> {
        // The confirmation is only ever compared, never stored
        doc.remove(User::PASSWORD_CONFIRM);

        if !ctx.is_modified(User::PASSWORD) {
            return Ok(());
        }
        if let Some(password) = str_field(doc, User::PASSWORD) {
            let hash = ctx.hasher.hash(password)?;
            doc.insert(User::PASSWORD.to_string(), Value::String(hash));
        }
        if !ctx.is_new {
            // Backdated so a token signed right after the change stays valid
            let changed = Utc::now() - Duration::seconds(1);
            doc.insert(
                User::PASSWORD_CHANGED_AT.to_string(),
                Value::String(timestamp(changed)),
            );
        }
        Ok(())
    }

    fn default_scope() -> Filter {
        Filter::new().and(FilterCondition::ne("active", false))
    }
}
