/// Vote endpoints
use crate::{
    api::{
        extract::{ApiJson, ApiPath},
        MessageResponse,
    },
    auth::{AuthUser, OptionalAuthUser},
    context::AppContext,
    error::ApiResult,
    metrics,
    votes::{VoteCounts, VoteOutcome, VoteRequest, VoteType},
};
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

/// Build vote routes
pub fn routes() -> Router<AppContext> {
    Router::new().route(
        "/api/vote/:report_id",
        get(get_votes).post(cast_vote).delete(remove_vote),
    )
}

#[derive(Debug, Serialize)]
pub struct VoteResponse {
    pub message: String,
    #[serde(flatten)]
    pub outcome: VoteOutcome,
}

/// Cast, switch or withdraw a vote
async fn cast_vote(
    State(ctx): State<AppContext>,
    user: AuthUser,
    ApiPath(report_id): ApiPath<i64>,
    ApiJson(req): ApiJson<VoteRequest>,
) -> ApiResult<Json<VoteResponse>> {
    let submitted = VoteType::from_str(&req.vote_type)?;
    let outcome = ctx.votes.cast(report_id, user.id, submitted).await?;

    let (state, message) = match outcome.current_vote {
        Some(vote) => (vote.as_str(), "Vote recorded"),
        None => ("withdrawn", "Vote removed"),
    };
    metrics::VOTES_TOTAL.with_label_values(&[state]).inc();

    Ok(Json(VoteResponse {
        message: message.to_string(),
        outcome,
    }))
}

/// Tallies, plus the caller's own vote when signed in
async fn get_votes(
    State(ctx): State<AppContext>,
    OptionalAuthUser(user): OptionalAuthUser,
    ApiPath(report_id): ApiPath<i64>,
) -> ApiResult<Json<VoteCounts>> {
    let counts = ctx
        .votes
        .counts(report_id, user.map(|u| u.id))
        .await?;
    Ok(Json(counts))
}

async fn remove_vote(
    State(ctx): State<AppContext>,
    user: AuthUser,
    ApiPath(report_id): ApiPath<i64>,
) -> ApiResult<Json<MessageResponse>> {
    ctx.votes.remove(report_id, user.id).await?;
    metrics::VOTES_TOTAL.with_label_values(&["withdrawn"]).inc();

    Ok(Json(MessageResponse::new("Vote removed")))
}
