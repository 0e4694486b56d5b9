//! Authenticated entry point for every structural lobby command.

use std::{future::Future, time::Duration};

use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::RetrySettings,
    dto::lobby::{
        CreateLobbyRequest, KickMemberRequest, LobbyDetail, MembershipResponse, UpdateLobbyRequest,
    },
    error::ServiceError,
    services::identity::Actor,
    state::{SharedState, membership::MembershipError},
};

/// A structural change requested by a caller.
#[derive(Debug)]
pub enum LobbyCommand {
    Create(CreateLobbyRequest),
    Join {
        lobby_id: Uuid,
    },
    Leave {
        lobby_id: Uuid,
    },
    Kick {
        lobby_id: Uuid,
        request: KickMemberRequest,
    },
    Update {
        lobby_id: Uuid,
        request: UpdateLobbyRequest,
    },
}

impl LobbyCommand {
    fn name(&self) -> &'static str {
        match self {
            LobbyCommand::Create(_) => "create",
            LobbyCommand::Join { .. } => "join",
            LobbyCommand::Leave { .. } => "leave",
            LobbyCommand::Kick { .. } => "kick",
            LobbyCommand::Update { .. } => "update",
        }
    }
}

/// Result of a successful command.
#[derive(Debug)]
pub enum CommandOutcome {
    Created(LobbyDetail),
    Membership(MembershipResponse),
}

/// Resolve the caller or reject the request as unauthorized.
pub fn authenticate(actor: Option<Actor>) -> Result<Actor, ServiceError> {
    actor.ok_or_else(|| ServiceError::Unauthorized("missing or unknown caller identity".into()))
}

/// Check the caller, validate the payload and run the command, retrying
/// transient store failures within the configured budget.
pub async fn execute(
    state: &SharedState,
    actor: Option<Actor>,
    command: LobbyCommand,
) -> Result<CommandOutcome, ServiceError> {
    let actor = authenticate(actor)?;
    let operation = command.name();
    debug!(operation, user_id = %actor.user_id, "executing lobby command");

    let engine = state.membership_engine().await?;
    let policy = state.config().retry;
    let user_id = actor.user_id;

    match command {
        LobbyCommand::Create(request) => {
            request.validate()?;
            let (lobby, leader) = engine.plan_lobby(request.into_new_lobby(user_id))?;
            let snapshot = with_retry(policy, operation, || {
                engine.insert_lobby(lobby.clone(), leader.clone())
            })
            .await?;
            Ok(CommandOutcome::Created(LobbyDetail::from(&snapshot)))
        }
        LobbyCommand::Join { lobby_id } => {
            with_retry(policy, operation, || engine.join_lobby(lobby_id, user_id))
                .await
                .map(|outcome| CommandOutcome::Membership(outcome.into()))
        }
        LobbyCommand::Leave { lobby_id } => {
            with_retry(policy, operation, || engine.leave_lobby(lobby_id, user_id))
                .await
                .map(|outcome| CommandOutcome::Membership(outcome.into()))
        }
        LobbyCommand::Kick { lobby_id, request } => with_retry(policy, operation, || {
            engine.kick_member(lobby_id, user_id, request.membership_id)
        })
        .await
        .map(|outcome| CommandOutcome::Membership(outcome.into())),
        LobbyCommand::Update { lobby_id, request } => {
            request.validate()?;
            let patch = request.into_patch();
            with_retry(policy, operation, || {
                engine.update_lobby(lobby_id, user_id, patch.clone())
            })
            .await
            .map(|outcome| CommandOutcome::Membership(outcome.into()))
        }
    }
}

async fn with_retry<T, F, Fut>(
    policy: RetrySettings,
    operation: &'static str,
    mut attempt_once: F,
) -> Result<T, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, MembershipError>>,
{
    let mut attempt = 1;
    loop {
        match attempt_once().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                let delay = backoff_delay(&policy, attempt);
                warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient failure; retrying"
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                if err.is_transient() {
                    warn!(operation, attempts = attempt, error = %err, "retry budget exhausted");
                }
                return Err(err.into());
            }
        }
    }
}

/// Exponential backoff with equal jitter: half the capped delay plus a random
/// share of the other half.
fn backoff_delay(policy: &RetrySettings, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let capped = policy
        .base_delay
        .saturating_mul(1 << exponent)
        .min(policy.max_delay);
    let half = capped / 2;
    let jitter_ms = rand::rng().random_range(0..=half.as_millis() as u64);
    half + Duration::from_millis(jitter_ms)
}
