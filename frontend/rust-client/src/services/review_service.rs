use async_trait::async_trait;
use validator::Validate;

use super::ApiClient;
use crate::error::{ClientError, Result};
use crate::models::review::{CreateReviewRequest, EmployerResponse, ResponseRequest, Review};

#[async_trait]
pub trait ReviewApi: Send + Sync {
    async fn list_for_employer(&self, employer_id: i64) -> Result<Vec<Review>>;
    async fn create(&self, req: &CreateReviewRequest) -> Result<Review>;
    async fn delete(&self, review_id: i64) -> Result<()>;
    async fn add_response(&self, review_id: i64, text: &str) -> Result<EmployerResponse>;
    async fn update_response(&self, review_id: i64, text: &str) -> Result<EmployerResponse>;
    async fn delete_response(&self, review_id: i64) -> Result<()>;
}

#[derive(Clone)]
pub struct ReviewService {
    api: ApiClient,
}

impl ReviewService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

fn validation_error(errors: validator::ValidationErrors) -> ClientError {
    let message = errors
        .field_errors()
        .values()
        .flat_map(|errs| errs.iter())
        .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
        .next()
        .unwrap_or_else(|| "Invalid review".to_string());
    ClientError::Validation(message)
}

#[async_trait]
impl ReviewApi for ReviewService {
    async fn list_for_employer(&self, employer_id: i64) -> Result<Vec<Review>> {
        self.api
            .get(
                "/reviews/employer/:id",
                &format!("/reviews/employer/{}", employer_id),
            )
            .await
    }

    async fn create(&self, req: &CreateReviewRequest) -> Result<Review> {
        req.validate().map_err(validation_error)?;
        let review: Review = self.api.post("/reviews", "/reviews", req).await?;
        tracing::info!(
            "Review created: id={}, employer={}",
            review.id,
            review.employer_id
        );
        Ok(review)
    }

    async fn delete(&self, review_id: i64) -> Result<()> {
        self.api
            .delete("/reviews/:id", &format!("/reviews/{}", review_id))
            .await
    }

    async fn add_response(&self, review_id: i64, text: &str) -> Result<EmployerResponse> {
        let req = ResponseRequest {
            text: text.trim().to_string(),
        };
        req.validate().map_err(validation_error)?;
        self.api
            .post(
                "/reviews/:id/response",
                &format!("/reviews/{}/response", review_id),
                &req,
            )
            .await
    }

    async fn update_response(&self, review_id: i64, text: &str) -> Result<EmployerResponse> {
        let req = ResponseRequest {
            text: text.trim().to_string(),
        };
        req.validate().map_err(validation_error)?;
        self.api
            .put(
                "/reviews/:id/response",
                &format!("/reviews/{}/response", review_id),
                &req,
            )
            .await
    }

    async fn delete_response(&self, review_id: i64) -> Result<()> {
        self.api
            .delete(
                "/reviews/:id/response",
                &format!("/reviews/{}/response", review_id),
            )
            .await
    }
}
