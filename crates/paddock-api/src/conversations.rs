use std::sync::Arc;

use axum::{Extension, Json, extract::State, response::IntoResponse};

use paddock_types::api::{Claims, ConversationSummary};

use crate::auth::AppStateInner;
use crate::convert::{parse_ts, peer_from_row};
use crate::error::{ApiError, run_blocking};

/// The message-history-driven conversation list. Pairs the gate no longer
/// allows are excluded by the store, so a revoked connection makes its
/// conversation vanish here while the rows stay put.
pub async fn list_conversations(
    State(state): State<Arc<AppStateInner>>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let viewer = claims.sub;

    let db = state.clone();
    let rows = run_blocking(move || db.db.list_conversations(viewer)).await?;

    let list: Vec<ConversationSummary> = rows
        .iter()
        .map(|r| ConversationSummary {
            peer: peer_from_row(&r.peer),
            last_message: r.last_message.body.clone(),
            last_message_kind: r.last_message.kind,
            last_message_at: parse_ts("created_at", &r.last_message.created_at),
            unread_count: r.unread_count,
        })
        .collect();

    Ok(Json(list))
}
