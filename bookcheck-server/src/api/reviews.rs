//! Review submission

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use bookcheck_common::api::Envelope;
use bookcheck_common::models::Review;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::auth::CurrentUser;
use crate::error::ApiResult;
use crate::AppState;

/// Body of POST /api/books/:id/reviews
///
/// `rating` stays untyped so numeric strings can be coerced and everything
/// else reported as a validation error rather than a parse failure.
#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    #[serde(default)]
    pub rating: Value,
    pub comment: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewBody {
    pub message: String,
    pub review: Review,
    pub reviews: Vec<Review>,
    pub avg_rating: f64,
}

/// POST /api/books/:id/reviews
///
/// Upsert: a second submission by the same user replaces the first.
pub async fn post_review(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(id): Path<String>,
    body: Result<Json<ReviewRequest>, JsonRejection>,
) -> ApiResult<Json<Envelope<ReviewBody>>> {
    let Json(req) = body?;

    let outcome = state
        .books
        .upsert_review(&id, Some(&caller), &req.rating, req.comment)
        .await?;

    Ok(Json(Envelope::ok(ReviewBody {
        message: "Review saved".to_string(),
        review: outcome.review,
        reviews: outcome.reviews,
        avg_rating: outcome.avg_rating,
    })))
}
