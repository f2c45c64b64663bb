use serde_json::{json, Value};

use super::review::REVIEW_AUTHOR;
use super::slugify;
use crate::error::Result;
use crate::repository::schema::round_to_tenth;
use crate::repository::{FieldKind, FieldSpec, Link, Relation, Resource, SaveContext};
use crate::store::{Document, FieldError, Filter, FilterCondition};

const DIFFICULTIES: &[&str] = &["easy", "medium", "difficult"];

/// A bookable tour
pub struct Tour;

/// Guides embedded on every tour read
pub const TOUR_GUIDES: Relation = Relation {
    path: "guides",
    target: "users",
    link: Link::Reference { local: "guides" },
    select: &["name", "email", "role", "photo"],
    nested: &[],
};

/// Reviews loaded when a single tour is requested
pub const TOUR_REVIEWS: Relation = Relation {
    path: "reviews",
    target: "reviews",
    link: Link::Virtual { foreign: "tour" },
    select: &["review", "rating", "tour", "user", "createdAt"],
    nested: &[REVIEW_AUTHOR],
};

impl Resource for Tour {
    const COLLECTION: &'static str = "tours";
    const ENTITY: &'static str = "Tour";
    const UNIQUE: &'static [&'static [&'static str]] = &[&["name"]];
    const RELATIONS: &'static [Relation] = &[TOUR_GUIDES];

    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::string("name")
            .required("A tour must have a name")
            .trim()
            .max_length(40, "A tour name must have less than or equal to 40 characters")
            .min_length(10, "A tour name must have more than or equal to 10 characters"),
        FieldSpec::string("slug"),
        FieldSpec::number("duration").required("A tour must have a duration"),
        FieldSpec::number("maxGroupSize").required("A tour must have a group size"),
        FieldSpec::string("difficulty")
            .required("A tour must have a difficulty")
            .one_of(DIFFICULTIES, "Difficulty is either: (easy, medium or difficult)"),
        FieldSpec::number("ratingsAverage")
            .default(|| json!(4.5))
            .min(1.0, "Rating must be above 1.0")
            .max(5.0, "Rating must be lower or equal to 5.0")
            .setter(round_to_tenth),
        FieldSpec::number("ratingsQuantity").default(|| json!(0)),
        FieldSpec::number("price").required("A tour must have a price"),
        FieldSpec::number("priceDiscount"),
        FieldSpec::string("summary")
            .trim()
            .required("A tour must have a summary"),
        FieldSpec::string("description").trim(),
        FieldSpec::string("imageCover").required("A tour must have a cover image"),
        FieldSpec::new("images", FieldKind::StringList),
        FieldSpec::new("startDates", FieldKind::DateList),
        FieldSpec::boolean("secretTour").default(|| json!(false)),
        FieldSpec::new("startLocation", FieldKind::Object),
        FieldSpec::new("locations", FieldKind::ObjectList),
        FieldSpec::new("guides", FieldKind::IdList),
    ];

    fn validate(doc: &Document, ctx: &SaveContext<'_>) -> Vec<FieldError> {
        if !ctx.is_modified("priceDiscount") && !ctx.is_modified("price") {
            return Vec::new();
        }
        let discount = doc.get("priceDiscount").and_then(Value::as_f64);
        let price = doc.get("price").and_then(Value::as_f64);
        match (discount, price) {
            (Some(discount), Some(price)) if discount >= price => vec![FieldError::new(
                "priceDiscount",
                format!("Discount ({discount}) must be less than the price"),
            )],
            _ => Vec::new(),
        }
    }

    fn before_save(doc: &mut Document, ctx: &SaveContext<'_>) -> Result<()> {
        if ctx.is_new || ctx.is_modified("name") {
            if let Some(name) = doc.get("name").and_then(Value::as_str) {
                let slug = slugify(name);
                doc.insert("slug".to_string(), Value::String(slug));
            }
        }
        Ok(())
    }

    fn default_scope() -> Filter {
        Filter::new().and(FilterCondition::ne("secretTour", true))
    }

    fn decorate(doc: &mut Document) {
        if let Some(duration) = doc.get("duration").and_then(Value::as_f64) {
            doc.insert("durationInWeeks".to_string(), json!(duration / 7.0));
        }
    }
}
