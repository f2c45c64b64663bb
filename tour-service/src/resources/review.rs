use serde_json::{json, Value};

use super::Tour;
use crate::error::Result;
use crate::repository::schema::round_to_tenth;
use crate::repository::{str_field, FieldSpec, Link, Relation, Resource};
use crate::store::{Document, DocumentStore, Filter, FilterCondition, Projection, ReadQuery};

/// Rating assumed for a tour nobody has reviewed yet
pub const DEFAULT_RATING: f64 = 4.5;

/// A user's rating of a tour they went on
pub struct Review;

/// Author shown next to each review
pub const REVIEW_AUTHOR: Relation = Relation {
    path: "user",
    target: "users",
    link: Link::Reference { local: "user" },
    select: &["name", "photo"],
    nested: &[],
};

impl Resource for Review {
    const COLLECTION: &'static str = "reviews";
    const ENTITY: &'static str = "Review";
    const UNIQUE: &'static [&'static [&'static str]] = &[&["tour", "user"]];
    const RELATIONS: &'static [Relation] = &[REVIEW_AUTHOR];

    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::string("review")
            .required("Review can not be empty!")
            .trim(),
        FieldSpec::number("rating")
            .min(1.0, "Rating must be above 1.0")
            .max(5.0, "Rating must be lower or equal to 5.0"),
        FieldSpec::id("tour").required("Review must belong to a tour."),
        FieldSpec::id("user").required("Review must belong to a user"),
    ];

    /// Keep the tour's rating summary in step with its reviews
    async fn after_write(store: &dyn DocumentStore, doc: &Document) -> Result<()> {
        match str_field(doc, "tour") {
            Some(tour_id) => recalculate_ratings(store, tour_id).await,
            None => Ok(()),
        }
    }
}

/// Recompute `ratingsQuantity` and `ratingsAverage` on one tour
pub async fn recalculate_ratings(store: &dyn DocumentStore, tour_id: &str) -> Result<()> {
    let query = ReadQuery {
        filter: Filter::new().and(FilterCondition::eq("tour", tour_id)),
        projection: Projection::Include(vec!["rating".to_string()]),
        ..ReadQuery::default()
    };
    let ratings: Vec<f64> = store
        .find(Review::COLLECTION, &query)
        .await?
        .iter()
        .filter_map(|r| r.get("rating").and_then(Value::as_f64))
        .collect();

    let (quantity, average) = if ratings.is_empty() {
        (0, DEFAULT_RATING)
    } else {
        let sum: f64 = ratings.iter().sum();
        (ratings.len(), sum / ratings.len() as f64)
    };

    let Some(mut tour) = store.find_by_id(Tour::COLLECTION, tour_id).await? else {
        return Ok(());
    };
    tour.insert("ratingsQuantity".to_string(), json!(quantity));
    tour.insert("ratingsAverage".to_string(), round_to_tenth(json!(average)));
    store.replace(Tour::COLLECTION, tour_id, tour).await?;

    tracing::debug!(tour = tour_id, quantity, average, "tour ratings recalculated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[tokio::test]
    async fn test_ratings_follow_reviews() {
        let store = MemoryStore::new();
        let tour = store
            .insert("tours", doc(json!({ "name": "The Forest Hiker" })))
            .await
            .unwrap();
        let tour_id = tour["id"].as_str().unwrap().to_string();

        for rating in [4, 5, 5] {
            let review = store
                .insert("reviews", doc(json!({ "tour": tour_id, "rating": rating })))
                .await
                .unwrap();
            Review::after_write(&store, &review).await.unwrap();
        }

        let tour = store.find_by_id("tours", &tour_id).await.unwrap().unwrap();
        assert_eq!(tour["ratingsQuantity"], json!(3));
        assert_eq!(tour["ratingsAverage"], json!(4.7));
    }

    #[tokio::test]
    async fn test_ratings_reset_when_last_review_removed() {
        let store = MemoryStore::new();
        let tour = store
            .insert("tours", doc(json!({ "name": "The Sea Explorer", "ratingsAverage": 3.0 })))
            .await
            .unwrap();
        let tour_id = tour["id"].as_str().unwrap().to_string();

        recalculate_ratings(&store, &tour_id).await.unwrap();

        let tour = store.find_by_id("tours", &tour_id).await.unwrap().unwrap();
        assert_eq!(tour["ratingsQuantity"], json!(0));
        assert_eq!(tour["ratingsAverage"], json!(4.5));
    }
}
