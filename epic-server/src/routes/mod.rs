//! Route units of the sample application

use crate::controllers;
use epic::prelude::*;

/// Theme pages: `/`, `/page`, `/post`.
pub struct Pages;

impl RouteUnit for Pages {
    fn name(&self) -> &str {
        "pages"
    }

    fn register(&self, epic: &mut Epic) {
        epic.route("/", get(controllers::home))
            .route("/page", get(controllers::page))
            .route("/post", get(controllers::post));
    }
}

/// Multipart uploads into the configured upload directory.
pub struct Uploads;

impl RouteUnit for Uploads {
    fn name(&self) -> &str {
        "uploads"
    }

    fn register(&self, epic: &mut Epic) {
        epic.route("/upload", post(controllers::upload));
    }
}
