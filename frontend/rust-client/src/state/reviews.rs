use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use crate::error::Result;
use crate::metrics;
use crate::models::review::{CreateReviewRequest, EmployerResponse, Review};
use crate::services::ReviewApi;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalStatus {
    /// Created by this client and not yet seen in a server listing.
    Pending { since: DateTime<Utc> },
    Confirmed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewEntry {
    pub review: Review,
    pub status: LocalStatus,
}

/// Local review list reconciled against eventually consistent listings.
#[derive(Debug, Clone)]
pub struct ReviewBoard {
    entries: Vec<ReviewEntry>,
    current_user: Option<i64>,
    grace: Duration,
    // id -> (position, entry) for deletes awaiting the server
    removed: HashMap<i64, (usize, ReviewEntry)>,
    // confirmed deletes, hidden from stale listings until the grace expires
    tombstones: HashMap<i64, DateTime<Utc>>,
    // id -> response before an optimistic change
    response_backup: HashMap<i64, Option<EmployerResponse>>,
}

impl ReviewBoard {
    pub fn new(current_user: Option<i64>, grace: Duration) -> Self {
        Self {
            entries: Vec::new(),
            current_user,
            grace,
            removed: HashMap::new(),
            tombstones: HashMap::new(),
            response_backup: HashMap::new(),
        }
    }

    pub fn entries(&self) -> &[ReviewEntry] {
        &self.entries
    }

    pub fn reviews(&self) -> Vec<Review> {
        self.entries.iter().map(|e| e.review.clone()).collect()
    }

    pub fn get(&self, id: i64) -> Option<&ReviewEntry> {
        self.entries.iter().find(|e| e.review.id == id)
    }

    /// Whether the "write a review" form should be shown.
    pub fn can_write_review(&self) -> bool {
        match self.current_user {
            Some(user) => !self.entries.iter().any(|e| e.review.user_id == user),
            None => false,
        }
    }

    /// Puts a just-created review at the head of the list.
    pub fn insert_pending(&mut self, review: Review, now: DateTime<Utc>) {
        self.entries.retain(|e| e.review.id != review.id);
        self.tombstones.remove(&review.id);
        self.entries.insert(
            0,
            ReviewEntry {
                review,
                status: LocalStatus::Pending { since: now },
            },
        );
    }

    /// Replaces the list with a server listing, keeping recent local
    /// creations the listing does not include yet.
    pub fn merge_server(&mut self, server: Vec<Review>, now: DateTime<Utc>) {
        let grace = self.grace;
        self.tombstones.retain(|_, at| now - *at < grace);

        let mut seen = HashSet::new();
        let confirmed: Vec<ReviewEntry> = server
            .into_iter()
            .filter(|r| !self.removed.contains_key(&r.id) && !self.tombstones.contains_key(&r.id))
            .filter(|r| seen.insert(r.id))
            .map(|review| ReviewEntry {
                review,
                status: LocalStatus::Confirmed,
            })
            .collect();

        let pending: Vec<ReviewEntry> = self
            .entries
            .drain(..)
            .filter(|e| match e.status {
                LocalStatus::Pending { since } => !seen.contains(&e.review.id) && now - since < grace,
                LocalStatus::Confirmed => false,
            })
            .collect();

        let local_only = pending.len();
        self.entries = pending;
        self.entries.extend(confirmed);

        tracing::debug!(
            "Merged reviews: {} entries ({} local only)",
            self.entries.len(),
            local_only
        );
    }

    /// Removes a review ahead of the server call. Returns false when the id
    /// is unknown.
    pub fn remove_optimistic(&mut self, id: i64) -> bool {
        match self.entries.iter().position(|e| e.review.id == id) {
            Some(index) => {
                let entry = self.entries.remove(index);
                self.removed.insert(id, (index, entry));
                true
            }
            None => false,
        }
    }

    pub fn confirm_delete(&mut self, id: i64, now: DateTime<Utc>) {
        if self.removed.remove(&id).is_some() {
            self.tombstones.insert(id, now);
        }
    }

    /// Puts a review back where it was after a failed delete.
    pub fn rollback_delete(&mut self, id: i64) {
        if let Some((index, entry)) = self.removed.remove(&id) {
            if self.entries.iter().any(|e| e.review.id == id) {
                return;
            }
            let index = index.min(self.entries.len());
            self.entries.insert(index, entry);
        }
    }

    /// Sets an employer response optimistically, remembering the previous
    /// value for [`rollback_response`](Self::rollback_response).
    pub fn set_response(&mut self, review_id: i64, response: Option<EmployerResponse>) -> bool {
        let Some(entry) = self.entries.iter_mut().find(|e| e.review.id == review_id) else {
            return false;
        };
        let previous = std::mem::replace(&mut entry.review.employer_response, response);
        self.response_backup.entry(review_id).or_insert(previous);
        true
    }

    pub fn confirm_response(&mut self, review_id: i64, response: Option<EmployerResponse>) {
        self.response_backup.remove(&review_id);
        if let Some(entry) = self.entries.iter_mut().find(|e| e.review.id == review_id) {
            entry.review.employer_response = response;
        }
    }

    pub fn rollback_response(&mut self, review_id: i64) {
        if let Some(previous) = self.response_backup.remove(&review_id) {
            if let Some(entry) = self.entries.iter_mut().find(|e| e.review.id == review_id) {
                entry.review.employer_response = previous;
            }
        }
    }
}

/// Reviews of one employer, wired to the API with optimistic updates.
pub struct ReviewFeed<A> {
    api: Arc<A>,
    employer_id: i64,
    board: Mutex<ReviewBoard>,
}

impl<A: ReviewApi> ReviewFeed<A> {
    pub fn new(api: Arc<A>, employer_id: i64, current_user: Option<i64>, grace: Duration) -> Self {
        Self {
            api,
            employer_id,
            board: Mutex::new(ReviewBoard::new(current_user, grace)),
        }
    }

    pub async fn snapshot(&self) -> Vec<Review> {
        self.board.lock().await.reviews()
    }

    pub async fn can_write_review(&self) -> bool {
        self.board.lock().await.can_write_review()
    }

    pub async fn refresh(&self) -> Result<Vec<Review>> {
        let server = self.api.list_for_employer(self.employer_id).await?;
        let mut board = self.board.lock().await;
        board.merge_server(server, Utc::now());
        Ok(board.reviews())
    }

    /// Creates a review; the form data is left untouched on failure.
    pub async fn submit(&self, req: &CreateReviewRequest) -> Result<Review> {
        let review = self.api.create(req).await?;
        self.board
            .lock()
            .await
            .insert_pending(review.clone(), Utc::now());
        Ok(review)
    }

    pub async fn delete(&self, review_id: i64) -> Result<()> {
        if !self.board.lock().await.remove_optimistic(review_id) {
            tracing::debug!("Deleting review {} not shown locally", review_id);
        }

        match self.api.delete(review_id).await {
            Ok(()) => {
                self.board.lock().await.confirm_delete(review_id, Utc::now());
                tracing::info!("Review {} deleted", review_id);
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Delete of review {} failed, restoring: {}", review_id, e);
                metrics::record_review_rollback("delete");
                self.board.lock().await.rollback_delete(review_id);
                Err(e)
            }
        }
    }

    /// Adds or edits the employer response to a review.
    pub async fn respond(&self, review_id: i64, text: &str) -> Result<EmployerResponse> {
        let had_response = {
            let mut board = self.board.lock().await;
            let had = board
                .get(review_id)
                .map(|e| e.review.employer_response.is_some())
                .unwrap_or(false);
            board.set_response(
                review_id,
                Some(EmployerResponse {
                    text: text.trim().to_string(),
                    created_at: None,
                }),
            );
            had
        };

        let result = if had_response {
            self.api.update_response(review_id, text).await
        } else {
            self.api.add_response(review_id, text).await
        };

        let mut board = self.board.lock().await;
        match result {
            Ok(response) => {
                board.confirm_response(review_id, Some(response.clone()));
                Ok(response)
            }
            Err(e) => {
                metrics::record_review_rollback("response");
                board.rollback_response(review_id);
                Err(e)
            }
        }
    }

    pub async fn delete_response(&self, review_id: i64) -> Result<()> {
        self.board.lock().await.set_response(review_id, None);

        let result = self.api.delete_response(review_id).await;
        let mut board = self.board.lock().await;
        match result {
            Ok(()) => {
                board.confirm_response(review_id, None);
                Ok(())
            }
            Err(e) => {
                metrics::record_review_rollback("response");
                board.rollback_response(review_id);
                Err(e)
            }
        }
    }
}
