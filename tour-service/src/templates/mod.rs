//! Server-rendered pages using askama
//!
//! Templates live in `tour-service/templates/` and are compiled into the
//! binary. Every page embeds a [`PageContext`] so the layout can show the
//! page title and the signed-in user.

mod context;
mod pages;
mod response;

pub use context::{NavUser, PageContext};
pub use pages::{
    AccountPage, ErrorPage, GeoPoint, GuideView, LoginPage, OverviewPage, ReviewView, TourPage,
    TourView,
};
pub use response::HtmlTemplate;
