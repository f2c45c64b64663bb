use serde_json::json;

use crate::repository::{FieldSpec, Link, Relation, Resource};

/// A paid place on a tour
pub struct Booking;

impl Resource for Booking {
    const COLLECTION: &'static str = "bookings";
    const ENTITY: &'static str = "Booking";
    const RELATIONS: &'static [Relation] = &[
        Relation {
            path: "user",
            target: "users",
            link: Link::Reference { local: "user" },
            select: &["name", "email"],
            nested: &[],
        },
        Relation {
            path: "tour",
            target: "tours",
            link: Link::Reference { local: "tour" },
            select: &["name", "slug", "imageCover"],
            nested: &[],
        },
    ];

    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::id("tour").required("Booking must belong to a Tour!"),
        FieldSpec::id("user").required("Booking must belong to a User!"),
        FieldSpec::number("price").required("Booking must have a price."),
        FieldSpec::boolean("paid").default(|| json!(true)),
    ];
}
