//! Page templates and the view models they render

use askama::Template;
use chrono::DateTime;
use serde::Deserialize;

use super::context::{NavUser, PageContext};
use crate::store::Document;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GeoPoint {
    pub description: String,
    pub address: String,
    pub coordinates: Vec<f64>,
    pub day: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GuideView {
    pub name: String,
    pub role: String,
    pub photo: String,
}

impl GuideView {
    pub fn title(&self) -> &str {
        match self.role.as_str() {
            "lead-guide" => "Lead guide",
            _ => "Tour guide",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReviewView {
    pub review: String,
    pub rating: f64,
    pub user: Option<GuideView>,
}

impl ReviewView {
    pub fn author(&self) -> &str {
        self.user.as_ref().map_or("Anonymous", |u| u.name.as_str())
    }

    pub fn author_photo(&self) -> &str {
        self.user
            .as_ref()
            .map(|u| u.photo.as_str())
            .filter(|p| !p.is_empty())
            .unwrap_or("default.jpg")
    }

    /// One css class per star, filled up to the rating
    pub fn star_classes(&self) -> Vec<&'static str> {
        (1..=5)
            .map(|star| {
                if self.rating >= f64::from(star) {
                    "reviews__star--active"
                } else {
                    "reviews__star--inactive"
                }
            })
            .collect()
    }
}

/// A tour as the pages show it
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TourView {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub image_cover: String,
    pub images: Vec<String>,
    pub difficulty: String,
    pub duration: f64,
    pub summary: String,
    pub description: String,
    pub start_location: GeoPoint,
    pub start_dates: Vec<String>,
    pub locations: Vec<GeoPoint>,
    pub max_group_size: f64,
    pub price: f64,
    pub ratings_average: f64,
    pub ratings_quantity: f64,
    pub guides: Vec<GuideView>,
    pub reviews: Vec<ReviewView>,
}

impl TourView {
    pub fn from_document(doc: Document) -> Self {
        serde_json::from_value(serde_json::Value::Object(doc)).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "tour document does not fit the page view");
            Self::default()
        })
    }

    /// First start date as "June 2025"
    pub fn next_date(&self) -> String {
        self.start_dates
            .first()
            .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
            .map_or_else(|| "To be announced".to_string(), |d| d.format("%B %Y").to_string())
    }

    pub fn paragraphs(&self) -> Vec<&str> {
        self.description
            .split('\n')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect()
    }
}

#[derive(Template)]
#[template(path = "overview.html")]
pub struct OverviewPage {
    pub ctx: PageContext,
    pub tours: Vec<TourView>,
}

#[derive(Template)]
#[template(path = "tour.html")]
pub struct TourPage {
    pub ctx: PageContext,
    pub tour: TourView,
}

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginPage {
    pub ctx: PageContext,
}

#[derive(Template)]
#[template(path = "account.html")]
pub struct AccountPage {
    pub ctx: PageContext,
    pub user: NavUser,
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorPage {
    pub ctx: PageContext,
    pub message: String,
}
